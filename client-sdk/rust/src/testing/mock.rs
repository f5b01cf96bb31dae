//! Mock runtime, key source and chain backend for use in tests.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt as _};

use crate::{
    backend::{Backend, CallMsg, FilterQuery, Header, Log, Receipt, Transaction},
    callformat::Cipher,
    crypto::{deoxysii, x25519::KeyPair},
    keymanager::{PublicKeySource, RuntimePublicKey},
    signed_call::hash_call_toplevel,
    signer::recover_address,
    types::{
        Call, CallEnvelopeX25519DeoxysII, CallFormat, CallResult, Failure,
        ResultEnvelopeX25519DeoxysII, SignedCallDataPack, SimulateCallQuery, H160, H256,
    },
};

/// The confidential runtime side of the call data encryption.
pub struct MockRuntime {
    keypair: KeyPair,
    pub epoch: u64,
}

impl MockRuntime {
    /// Create a runtime whose key is deterministic in the epoch.
    pub fn new(epoch: u64) -> Self {
        let mut secret = [0x42u8; 32];
        secret[..8].copy_from_slice(&epoch.to_le_bytes());
        Self {
            keypair: KeyPair::from_secret_bytes(secret),
            epoch,
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    /// Key record as a gateway would return it.
    pub fn runtime_public_key(&self) -> RuntimePublicKey {
        RuntimePublicKey {
            key: self.public_key(),
            checksum: vec![0xcc; 32],
            signature: vec![0x55; 64],
            epoch: self.epoch,
        }
    }

    /// A fresh client cipher encrypting to this runtime.
    pub fn client_cipher(&self) -> Cipher {
        Cipher::new_x25519_deoxysii(KeyPair::generate(), &self.public_key(), Some(self.epoch))
            .unwrap()
    }

    /// Open an encrypted call envelope, returning the plaintext call data and the client key.
    pub fn open_call_with_pk(&self, call: &Call) -> Result<(Vec<u8>, [u8; 32])> {
        if call.format != CallFormat::EncryptedX25519DeoxysII {
            return Err(anyhow!("call is not encrypted"));
        }
        let envelope: CallEnvelopeX25519DeoxysII = cbor::from_value(call.body.clone())?;
        let key = self.keypair.derive_symmetric(&envelope.pk)?;
        let data = deoxysii::open(&key, &envelope.nonce, &envelope.data, b"")?;
        let inner: Call = cbor::from_slice(&data)?;
        if inner.format != CallFormat::Plain {
            return Err(anyhow!("nested encrypted call"));
        }
        Ok((cbor::from_value(inner.body)?, envelope.pk))
    }

    /// Open an encrypted call envelope.
    pub fn open_call(&self, call: &Call) -> Result<Vec<u8>> {
        self.open_call_with_pk(call).map(|(data, _)| data)
    }

    /// Seal a call result for the given client.
    pub fn seal_result(&self, client_pk: &[u8; 32], result: CallResult) -> ResultEnvelopeX25519DeoxysII {
        self.seal_raw(client_pk, &cbor::to_vec(result))
    }

    /// Seal arbitrary bytes for the given client.
    pub fn seal_raw(&self, client_pk: &[u8; 32], plaintext: &[u8]) -> ResultEnvelopeX25519DeoxysII {
        let key = self.keypair.derive_symmetric(client_pk).unwrap();
        let nonce = deoxysii::generate_nonce();
        ResultEnvelopeX25519DeoxysII {
            nonce,
            data: deoxysii::seal(&key, &nonce, plaintext, b""),
        }
    }
}

/// A key source serving the key of a [`MockRuntime`] at a configurable epoch.
#[derive(Default)]
pub struct MockKeySource {
    epoch: Mutex<Option<u64>>,
    fetches: AtomicUsize,
}

impl MockKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_epoch(&self, epoch: u64) {
        *self.epoch.lock().unwrap() = Some(epoch);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublicKeySource for MockKeySource {
    async fn fetch_public_key(&self) -> Result<RuntimePublicKey> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let epoch = (*self.epoch.lock().unwrap()).ok_or_else(|| anyhow!("key manager not ready"))?;
        Ok(MockRuntime::new(epoch).runtime_public_key())
    }
}

/// How the mock backend saw a call arrive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// No envelope at all.
    Raw,
    /// Plain envelope.
    Plain,
    /// Encrypted envelope without a signature.
    Encrypted,
    /// Signed data pack with the given verified caller.
    Signed(H160),
}

/// A call as received by the mock backend.
#[derive(Clone, Debug)]
pub struct ReceivedCall {
    pub msg: CallMsg,
    pub kind: CallKind,
    pub plaintext: Vec<u8>,
}

/// A chain backend fronting a [`MockRuntime`] running an echo contract.
///
/// Calls return their own plaintext call data. Signed queries are verified the way the runtime
/// verifies them.
pub struct MockBackend {
    pub runtime: MockRuntime,
    pub chain_id: u64,
    pub head: Header,
    pub nonce: u64,
    pub logs: Vec<Log>,
    /// Response returned for calls without an envelope.
    pub raw_response: Vec<u8>,
    calls: Mutex<Vec<ReceivedCall>>,
    transactions: Mutex<Vec<Transaction>>,
    header_requests: AtomicUsize,
}

impl MockBackend {
    pub fn new(runtime: MockRuntime, chain_id: u64) -> Self {
        Self {
            runtime,
            chain_id,
            head: Header {
                number: 100,
                hash: H256::repeat_byte(0x10),
                parent_hash: H256::repeat_byte(0x09),
            },
            nonce: 3,
            logs: Vec::new(),
            raw_response: b"raw".to_vec(),
            calls: Mutex::new(Vec::new()),
            transactions: Mutex::new(Vec::new()),
            header_requests: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<ReceivedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.transactions.lock().unwrap().clone()
    }

    pub fn header_requests(&self) -> usize {
        self.header_requests.load(Ordering::SeqCst)
    }

    fn failure(message: &str) -> Vec<u8> {
        cbor::to_vec(CallResult::Failed(Failure {
            module: "evm".to_string(),
            code: 10,
            message: message.to_string(),
        }))
    }

    fn verify_signed(&self, msg: &CallMsg, pack: &SignedCallDataPack, data: &[u8]) -> Result<H160> {
        let expected_anchor = self.head.number - 1;
        if pack.leash.block_number != expected_anchor || pack.leash.block_hash != self.head.parent_hash {
            return Err(anyhow!("unexpected base block"));
        }
        if pack.leash.nonce < self.nonce {
            return Err(anyhow!("stale nonce"));
        }
        let query = SimulateCallQuery {
            gas_price: msg.gas_price.unwrap_or_default(),
            gas_limit: msg.gas.unwrap_or_default(),
            caller: msg.from.unwrap_or_default(),
            address: msg.to.unwrap_or_default(),
            value: msg.value.unwrap_or_default(),
            data: data.to_vec(),
        };
        let digest = hash_call_toplevel(self.chain_id, &query, &pack.leash);
        let signer = recover_address(&digest, &pack.signature)?;
        if signer != query.caller {
            return Err(anyhow!("signer != caller"));
        }
        Ok(signer)
    }

    /// Execute a call, returning the raw response and recording how it arrived.
    fn execute(&self, msg: CallMsg) -> Vec<u8> {
        let (kind, plaintext, response) = self.dispatch(&msg);
        self.calls.lock().unwrap().push(ReceivedCall {
            msg,
            kind,
            plaintext,
        });
        response
    }

    fn dispatch(&self, msg: &CallMsg) -> (CallKind, Vec<u8>, Vec<u8>) {
        if msg.data.is_empty() {
            return (CallKind::Raw, Vec::new(), self.raw_response.clone());
        }

        let (call, signed) = match cbor::from_slice::<SignedCallDataPack>(&msg.data) {
            Ok(pack) => (pack.data.clone(), Some(pack)),
            Err(_) => match cbor::from_slice::<Call>(&msg.data) {
                Ok(call) => (call, None),
                Err(_) => return (CallKind::Raw, msg.data.clone(), Self::failure("malformed call")),
            },
        };

        let (plaintext, client_pk) = match call.format {
            CallFormat::Plain => match cbor::from_value::<Vec<u8>>(call.body.clone()) {
                Ok(data) => (data, None),
                Err(_) => return (CallKind::Raw, Vec::new(), Self::failure("malformed body")),
            },
            CallFormat::EncryptedX25519DeoxysII => match self.runtime.open_call_with_pk(&call) {
                Ok((data, pk)) => (data, Some(pk)),
                Err(err) => return (CallKind::Raw, Vec::new(), Self::failure(&err.to_string())),
            },
        };

        let kind = match (&signed, client_pk) {
            (Some(pack), _) => match self.verify_signed(msg, pack, &plaintext) {
                Ok(caller) => CallKind::Signed(caller),
                Err(err) => {
                    return (
                        CallKind::Raw,
                        plaintext,
                        Self::failure(&format!("invalid signed simulate call query: {}", err)),
                    )
                }
            },
            (None, Some(_)) => CallKind::Encrypted,
            (None, None) => CallKind::Plain,
        };

        let output = CallResult::Ok(cbor::Value::ByteString(plaintext.clone()));
        let response = match client_pk {
            Some(pk) => cbor::to_vec(CallResult::Unknown(cbor::to_value(
                self.runtime.seal_result(&pk, output),
            ))),
            None => cbor::to_vec(output),
        };
        (kind, plaintext, response)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn header_by_number(&self, number: Option<u64>) -> Result<Header> {
        self.header_requests.fetch_add(1, Ordering::SeqCst);
        match number {
            None => Ok(self.head.clone()),
            Some(n) if n == self.head.number => Ok(self.head.clone()),
            Some(n) => Err(anyhow!("block {} not found", n)),
        }
    }

    async fn pending_nonce_at(&self, _account: H160) -> Result<u64> {
        Ok(self.nonce)
    }

    async fn call_contract(&self, call: CallMsg, _block: Option<u64>) -> Result<Vec<u8>> {
        Ok(self.execute(call))
    }

    async fn estimate_gas(&self, call: CallMsg) -> Result<u64> {
        let response = self.execute(call);
        match cbor::from_slice::<CallResult>(&response) {
            Ok(CallResult::Failed(failure)) => Err(anyhow!(failure.message())),
            _ => Ok(21_000),
        }
    }

    async fn send_transaction(&self, tx: Transaction) -> Result<H256> {
        let hash = tx.hash();
        self.transactions.lock().unwrap().push(tx);
        Ok(hash)
    }

    async fn filter_logs(&self, query: FilterQuery) -> Result<Vec<Log>> {
        Ok(self
            .logs
            .iter()
            .filter(|log| query.addresses.is_empty() || query.addresses.contains(&log.address))
            .cloned()
            .collect())
    }

    async fn subscribe_filter_logs(
        &self,
        query: FilterQuery,
    ) -> Result<BoxStream<'static, Result<Log>>> {
        let logs = self.filter_logs(query).await?;
        Ok(stream::iter(logs.into_iter().map(Ok)).boxed())
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<Receipt>> {
        let receipts: HashMap<H256, Receipt> = self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .map(|tx| {
                let hash = tx.hash();
                (
                    hash,
                    Receipt {
                        tx_hash: hash,
                        status: 1,
                        gas_used: tx.gas,
                        block_number: self.head.number,
                        logs: Vec::new(),
                    },
                )
            })
            .collect();
        Ok(receipts.get(&tx_hash).cloned())
    }
}

