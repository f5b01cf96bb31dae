//! Confidential call dispatcher.
use std::{collections::HashSet, marker::PhantomData, sync::Arc};

use futures_util::stream::BoxStream;

use crate::{
    backend::{Backend, CallMsg, FilterQuery, Header, Log, Receipt, Transaction},
    callformat::Cipher,
    config::Config,
    keymanager::{KeyCache, PublicKeySource},
    logger::get_logger,
    signed_call::{build_signed_call, make_leash},
    signer::Signer,
    types::{
        Call, CallEnvelopeX25519DeoxysII, CallFormat, SignedCallDataPack, SimulateCallQuery,
        H160, H256, U256,
    },
    Error,
};

/// Identities of transactions already packed during a send operation.
#[derive(Debug, Default)]
pub struct PackedTransactions {
    hashes: HashSet<H256>,
}

impl PackedTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, tx: &Transaction) -> bool {
        self.hashes.contains(&tx.hash())
    }

    fn insert(&mut self, tx: &Transaction) {
        self.hashes.insert(tx.hash());
    }
}

enum CipherSource<Cfg: Config> {
    Fixed(Arc<Cipher>),
    Cache(KeyCache<Cfg>),
}

/// The path a call takes through the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    /// No call data; nothing to protect.
    PassThrough,
    /// Encrypted, caller identity not asserted.
    Anonymous,
    /// Signed and encrypted.
    Signed,
}

/// A client wrapping a chain backend so that call data is end-to-end encrypted with the
/// confidential runtime.
pub struct Client<Cfg: Config, B: Backend> {
    backend: Arc<B>,
    cipher: CipherSource<Cfg>,
    signer: Option<Arc<dyn Signer>>,
    logger: slog::Logger,
    _cfg: PhantomData<Cfg>,
}

impl<Cfg: Config, B: Backend> Client<Cfg, B> {
    /// Create a client fetching the runtime public key from `keys`.
    pub fn new(backend: Arc<B>, keys: Arc<dyn PublicKeySource>) -> Self {
        Self::with_source(backend, CipherSource::Cache(KeyCache::new(keys)))
    }

    /// Create a client that always uses the given cipher.
    pub fn with_cipher(backend: Arc<B>, cipher: Cipher) -> Self {
        Self::with_source(backend, CipherSource::Fixed(Arc::new(cipher)))
    }

    fn with_source(backend: Arc<B>, cipher: CipherSource<Cfg>) -> Self {
        Self {
            backend,
            cipher,
            signer: None,
            logger: get_logger("client"),
            _cfg: PhantomData,
        }
    }

    /// Use `signer` to authenticate queries sent from its address.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Cipher for the current runtime key.
    pub async fn cipher(&self) -> Result<Arc<Cipher>, Error> {
        match &self.cipher {
            CipherSource::Fixed(cipher) => Ok(cipher.clone()),
            CipherSource::Cache(cache) => cache.cipher().await,
        }
    }

    fn route(&self, call: &CallMsg) -> Route {
        if call.data.is_empty() {
            return Route::PassThrough;
        }
        match (call.from, &self.signer) {
            (Some(from), Some(_)) if !from.is_zero() => Route::Signed,
            _ => Route::Anonymous,
        }
    }

    /// Pack the call data for its route, returning the cipher needed to decode the result.
    async fn pack_call(&self, mut call: CallMsg) -> Result<(CallMsg, Option<Arc<Cipher>>), Error> {
        let route = self.route(&call);
        slog::debug!(self.logger, "packing call";
            "route" => ?route,
            "to" => ?call.to,
            "data_len" => call.data.len(),
        );

        let signer = match (route, &self.signer) {
            (Route::PassThrough, _) => return Ok((call, None)),
            (Route::Signed, Some(signer)) => signer.clone(),
            _ => {
                let cipher = self.cipher().await?;
                call.data = cipher.encrypt_encode(&call.data);
                return Ok((call, Some(cipher)));
            }
        };

        let from = call.from.unwrap_or_default();
        let head = self
            .backend
            .header_by_number(None)
            .await
            .map_err(Error::Backend)?;
        let nonce = self
            .backend
            .pending_nonce_at(from)
            .await
            .map_err(Error::Backend)?;
        let leash = make_leash(nonce, &head, Cfg::DEFAULT_BLOCK_RANGE);

        let gas_limit = call.gas.unwrap_or(Cfg::DEFAULT_GAS_LIMIT);
        let gas_price = call
            .gas_price
            .unwrap_or_else(|| U256::from(Cfg::DEFAULT_GAS_PRICE));
        let query = SimulateCallQuery {
            gas_price,
            gas_limit,
            caller: from,
            address: call.to.unwrap_or_default(),
            value: call.value.unwrap_or_default(),
            data: std::mem::take(&mut call.data),
        };

        let cipher = self.cipher().await?;
        let pack = build_signed_call(signer.as_ref(), Cfg::CHAIN_ID, &query, leash)
            .await?
            .encrypt_data(&cipher);

        call.gas = Some(gas_limit);
        call.gas_price = Some(gas_price);
        call.data = cbor::to_vec(pack);
        Ok((call, Some(cipher)))
    }

    /// Execute a read-only call, returning the decrypted output.
    pub async fn call_contract(&self, call: CallMsg, block: Option<u64>) -> Result<Vec<u8>, Error> {
        let (call, cipher) = self.pack_call(call).await?;
        let raw = self
            .backend
            .call_contract(call, block)
            .await
            .map_err(Error::Backend)?;
        match cipher {
            Some(cipher) => cipher.decrypt_call_result(&raw),
            None => Ok(raw),
        }
    }

    /// Estimate gas of a call, packing it the same way [`Client::call_contract`] does.
    pub async fn estimate_gas(&self, call: CallMsg) -> Result<u64, Error> {
        let (call, _) = self.pack_call(call).await?;
        self.backend
            .estimate_gas(call)
            .await
            .map_err(Error::Backend)
    }

    /// Encrypt the transaction data unless it is already packed.
    ///
    /// Nonce, gas and value are left untouched. Packing an already packed transaction returns
    /// it unchanged.
    pub async fn pack_transaction(
        &self,
        mut tx: Transaction,
        packed: &mut PackedTransactions,
    ) -> Result<Transaction, Error> {
        if packed.contains(&tx) || tx.data.is_empty() {
            return Ok(tx);
        }
        if tx.is_deploy() && !Cfg::ENCRYPT_DEPLOYS {
            slog::debug!(self.logger, "not encrypting contract deployment");
            return Ok(tx);
        }
        if already_packed(&tx.data)? {
            packed.insert(&tx);
            return Ok(tx);
        }

        let cipher = self.cipher().await?;
        tx.data = cipher.encrypt_encode(&tx.data);
        packed.insert(&tx);
        Ok(tx)
    }

    /// Pack and submit a transaction.
    pub async fn send_transaction(&self, tx: Transaction) -> Result<H256, Error> {
        let mut packed = PackedTransactions::new();
        let tx = self.pack_transaction(tx, &mut packed).await?;
        slog::debug!(self.logger, "sending transaction";
            "nonce" => tx.nonce,
            "to" => ?tx.to,
        );
        self.backend
            .send_transaction(tx)
            .await
            .map_err(Error::Backend)
    }

    /// Gas price to use for calls and transactions.
    pub fn suggest_gas_price(&self) -> U256 {
        U256::from(Cfg::DEFAULT_GAS_PRICE)
    }

    pub async fn header_by_number(&self, number: Option<u64>) -> Result<Header, Error> {
        self.backend
            .header_by_number(number)
            .await
            .map_err(Error::Backend)
    }

    pub async fn pending_nonce_at(&self, account: H160) -> Result<u64, Error> {
        self.backend
            .pending_nonce_at(account)
            .await
            .map_err(Error::Backend)
    }

    pub async fn filter_logs(&self, query: FilterQuery) -> Result<Vec<Log>, Error> {
        self.backend
            .filter_logs(query)
            .await
            .map_err(Error::Backend)
    }

    pub async fn subscribe_filter_logs(
        &self,
        query: FilterQuery,
    ) -> Result<BoxStream<'static, anyhow::Result<Log>>, Error> {
        self.backend
            .subscribe_filter_logs(query)
            .await
            .map_err(Error::Backend)
    }

    pub async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<Receipt>, Error> {
        self.backend
            .transaction_receipt(tx_hash)
            .await
            .map_err(Error::Backend)
    }
}

/// Whether the data already carries a call envelope or a signed data pack.
///
/// Data that looks like an envelope but does not decode as one is rejected.
fn already_packed(data: &[u8]) -> Result<bool, Error> {
    let value: cbor::Value = match cbor::from_slice(data) {
        Ok(value) => value,
        Err(_) => return Ok(false),
    };
    let has_field = |name: &str| match &value {
        cbor::Value::Map(fields) => fields
            .iter()
            .any(|(key, _)| matches!(key, cbor::Value::TextString(key) if key == name)),
        _ => false,
    };

    if has_field("leash") && has_field("signature") {
        return cbor::from_value::<SignedCallDataPack>(value)
            .map(|_| true)
            .map_err(|_| Error::MalformedEnvelope);
    }
    if has_field("body") {
        let call: Call = cbor::from_value(value).map_err(|_| Error::MalformedEnvelope)?;
        return match call.format {
            CallFormat::Plain => match call.body {
                cbor::Value::ByteString(_) => Ok(true),
                _ => Err(Error::MalformedEnvelope),
            },
            CallFormat::EncryptedX25519DeoxysII => {
                cbor::from_value::<CallEnvelopeX25519DeoxysII>(call.body)
                    .map(|_| true)
                    .map_err(|_| Error::MalformedEnvelope)
            }
        };
    }
    Ok(false)
}
