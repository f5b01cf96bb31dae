//! Interface of the underlying chain RPC client.
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use sha3::{Digest as _, Keccak256};

use crate::types::{H160, H256, U256};

/// Block header fields needed by the client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub number: u64,
    pub hash: H256,
    pub parent_hash: H256,
}

/// A read-only contract call or gas estimation request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallMsg {
    pub from: Option<H160>,
    pub to: Option<H160>,
    pub gas: Option<u64>,
    pub gas_price: Option<U256>,
    pub value: Option<U256>,
    pub data: Vec<u8>,
}

/// An unsigned transaction handed to the backend for signing and submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, cbor::Encode, cbor::Decode)]
pub struct Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas: u64,
    #[cbor(optional)]
    pub to: Option<H160>,
    pub value: U256,
    pub data: Vec<u8>,
}

impl Transaction {
    /// Identity of the transaction.
    pub fn hash(&self) -> H256 {
        H256::from_slice(&Keccak256::digest(cbor::to_vec(self.clone())))
    }

    /// Whether the transaction deploys a contract.
    pub fn is_deploy(&self) -> bool {
        self.to.is_none()
    }
}

/// An emitted event log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Log {
    pub address: H160,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub tx_hash: H256,
    pub index: u64,
}

/// Log filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterQuery {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub addresses: Vec<H160>,
    pub topics: Vec<Vec<H256>>,
}

/// Receipt of an executed transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: H256,
    pub status: u64,
    pub gas_used: u64,
    pub block_number: u64,
    pub logs: Vec<Log>,
}

/// Chain RPC client.
///
/// A `None` block number refers to the latest block.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn header_by_number(&self, number: Option<u64>) -> anyhow::Result<Header>;

    async fn pending_nonce_at(&self, account: H160) -> anyhow::Result<u64>;

    async fn call_contract(&self, call: CallMsg, block: Option<u64>) -> anyhow::Result<Vec<u8>>;

    async fn estimate_gas(&self, call: CallMsg) -> anyhow::Result<u64>;

    /// Sign and submit the transaction.
    async fn send_transaction(&self, tx: Transaction) -> anyhow::Result<H256>;

    async fn filter_logs(&self, query: FilterQuery) -> anyhow::Result<Vec<Log>>;

    async fn subscribe_filter_logs(
        &self,
        query: FilterQuery,
    ) -> anyhow::Result<BoxStream<'static, anyhow::Result<Log>>>;

    async fn transaction_receipt(&self, tx_hash: H256) -> anyhow::Result<Option<Receipt>>;
}
