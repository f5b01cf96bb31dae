//! Runtime call data public key handling.
use std::{marker::PhantomData, sync::Arc, time::Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{callformat::Cipher, config::Config, logger::get_logger, Error};

/// JSON-RPC method returning the runtime's call data public key.
pub const CALL_DATA_PUBLIC_KEY_METHOD: &str = "oasis_callDataPublicKey";

/// The runtime's ephemeral call data public key, as signed by the key manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimePublicKey {
    /// X25519 public key.
    pub key: [u8; 32],
    /// Checksum of the key manager state.
    pub checksum: Vec<u8>,
    /// Key manager signature over the key and checksum.
    pub signature: Vec<u8>,
    /// Epoch of the ephemeral key.
    pub epoch: u64,
}

impl RuntimePublicKey {
    /// Create a new public key record, checking the key length.
    pub fn new(key: &[u8], checksum: Vec<u8>, signature: Vec<u8>, epoch: u64) -> Result<Self, Error> {
        let key = key
            .try_into()
            .map_err(|_| Error::InvalidPublicKeyLength(key.len()))?;
        Ok(Self {
            key,
            checksum,
            signature,
            epoch,
        })
    }
}

/// Source of the runtime's current call data public key.
#[async_trait]
pub trait PublicKeySource: Send + Sync {
    /// Fetch the current public key.
    async fn fetch_public_key(&self) -> anyhow::Result<RuntimePublicKey>;
}

/// Build the JSON-RPC request body asking a gateway for the call data public key.
pub fn call_data_public_key_request(id: u64) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": CALL_DATA_PUBLIC_KEY_METHOD,
        "params": [],
        "id": id,
    })
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<CallDataPublicKeyResponse>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct CallDataPublicKeyResponse {
    key: String,
    #[serde(default)]
    checksum: String,
    #[serde(default)]
    signature: String,
    #[serde(default)]
    epoch: u64,
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, Error> {
    let value = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(value).map_err(|err| Error::KeyFetch(anyhow::anyhow!("bad {}: {}", field, err)))
}

/// Parse a gateway's JSON-RPC response to [`call_data_public_key_request`].
pub fn parse_call_data_public_key(body: &[u8]) -> Result<RuntimePublicKey, Error> {
    let response: JsonRpcResponse =
        serde_json::from_slice(body).map_err(|err| Error::KeyFetch(err.into()))?;
    if let Some(err) = response.error {
        return Err(Error::KeyFetch(anyhow::anyhow!(
            "gateway error {}: {}",
            err.code,
            err.message
        )));
    }
    let result = response
        .result
        .ok_or_else(|| Error::KeyFetch(anyhow::anyhow!("missing result")))?;

    RuntimePublicKey::new(
        &decode_hex("key", &result.key)?,
        decode_hex("checksum", &result.checksum)?,
        decode_hex("signature", &result.signature)?,
        result.epoch,
    )
}

struct CachedKey {
    key: RuntimePublicKey,
    cipher: Arc<Cipher>,
    fetched_at: Instant,
    stale: bool,
}

impl CachedKey {
    fn refreshed(&mut self, now: Instant) -> Arc<Cipher> {
        self.fetched_at = now;
        self.stale = false;
        self.cipher.clone()
    }
}

/// Cache of the runtime public key and the cipher derived for it.
///
/// The key is refetched once it is older than [`Config::PUBLIC_KEY_CACHE_EXPIRATION`]. A new
/// cipher (with a new ephemeral key pair) is derived only when the runtime key changes; keys
/// from an older epoch than the cached one are ignored.
pub struct KeyCache<Cfg: Config> {
    source: Arc<dyn PublicKeySource>,
    state: Mutex<Option<CachedKey>>,
    logger: slog::Logger,
    _cfg: PhantomData<Cfg>,
}

impl<Cfg: Config> KeyCache<Cfg> {
    /// Create a new empty cache over the given key source.
    pub fn new(source: Arc<dyn PublicKeySource>) -> Self {
        Self {
            source,
            state: Mutex::new(None),
            logger: get_logger("keymanager"),
            _cfg: PhantomData,
        }
    }

    /// Current cipher, fetching the runtime key when needed.
    pub async fn cipher(&self) -> Result<Arc<Cipher>, Error> {
        let mut state = self.state.lock().await;
        if let Some(cached) = state.as_ref() {
            if !cached.stale && cached.fetched_at.elapsed() < Cfg::PUBLIC_KEY_CACHE_EXPIRATION {
                return Ok(cached.cipher.clone());
            }
        }

        let fetched = self
            .source
            .fetch_public_key()
            .await
            .map_err(Error::KeyFetch)?;
        let now = Instant::now();

        if let Some(cached) = state.as_mut() {
            if fetched.epoch < cached.key.epoch {
                slog::warn!(self.logger, "ignoring runtime public key from older epoch";
                    "epoch" => fetched.epoch,
                    "cached_epoch" => cached.key.epoch,
                );
                return Ok(cached.refreshed(now));
            }
            if fetched.epoch == cached.key.epoch && fetched.key == cached.key.key {
                return Ok(cached.refreshed(now));
            }
        }

        slog::info!(self.logger, "deriving cipher for runtime public key";
            "epoch" => fetched.epoch,
            "previous_epoch" => ?state.as_ref().map(|cached| cached.key.epoch),
        );
        let cipher = Arc::new(Cipher::from_runtime_public_key(&fetched)?);
        *state = Some(CachedKey {
            key: fetched,
            cipher: cipher.clone(),
            fetched_at: now,
            stale: false,
        });
        Ok(cipher)
    }

    /// The cached runtime public key, if any.
    pub async fn public_key(&self) -> Option<RuntimePublicKey> {
        self.state.lock().await.as_ref().map(|cached| cached.key.clone())
    }

    /// Drop the cached key so the next call refetches it.
    pub async fn invalidate(&self) {
        if let Some(cached) = self.state.lock().await.as_mut() {
            cached.stale = true;
        }
    }
}
