//! Dispatcher tests against the mock backend.
use std::sync::Arc;

use futures_util::StreamExt as _;

use crate::{
    backend::{CallMsg, FilterQuery, Log, Transaction},
    callformat::Cipher,
    client::{Client, PackedTransactions},
    config::{Config, Localnet},
    testing::{
        keys,
        mock::{CallKind, MockBackend, MockKeySource, MockRuntime},
    },
    types::{Call, CallFormat, SignedCallDataPack, H160, H256, U256},
    Error,
};

const EPOCH: u64 = 4;

fn setup() -> (Arc<MockBackend>, Client<Localnet, MockBackend>) {
    let backend = Arc::new(MockBackend::new(MockRuntime::new(EPOCH), Localnet::CHAIN_ID));
    let key_source = Arc::new(MockKeySource::new());
    key_source.set_epoch(EPOCH);
    let client = Client::new(backend.clone(), key_source).with_signer(Arc::new(keys::alice::signer()));
    (backend, client)
}

fn contract() -> H160 {
    H160::repeat_byte(0xc0)
}

#[tokio::test]
async fn test_signed_call() {
    let (backend, client) = setup();

    let output = client
        .call_contract(
            CallMsg {
                from: Some(keys::alice::address()),
                to: Some(contract()),
                data: b"balanceOf".to_vec(),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(output, b"balanceOf");

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, CallKind::Signed(keys::alice::address()));
    assert_eq!(calls[0].plaintext, b"balanceOf");

    // Defaults were filled in and signed over.
    assert_eq!(calls[0].msg.gas, Some(Localnet::DEFAULT_GAS_LIMIT));
    assert_eq!(
        calls[0].msg.gas_price,
        Some(U256::from(Localnet::DEFAULT_GAS_PRICE))
    );

    // The wire pack carries the encrypted body and a leash one block behind the head.
    let pack: SignedCallDataPack = cbor::from_slice(&calls[0].msg.data).unwrap();
    assert_eq!(pack.data.format, CallFormat::EncryptedX25519DeoxysII);
    assert_eq!(pack.leash.block_number, backend.head.number - 1);
    assert_eq!(pack.leash.block_hash, backend.head.parent_hash);
    assert_eq!(pack.leash.block_range, Localnet::DEFAULT_BLOCK_RANGE);
    assert_eq!(pack.leash.nonce, backend.nonce);
}

#[tokio::test]
async fn test_signed_call_keeps_explicit_gas() {
    let (backend, client) = setup();

    client
        .call_contract(
            CallMsg {
                from: Some(keys::alice::address()),
                to: Some(contract()),
                gas: Some(50_000),
                gas_price: Some(U256::from(7u64)),
                value: Some(U256::from(1u64)),
                data: vec![1, 2, 3],
            },
            None,
        )
        .await
        .unwrap();

    let calls = backend.calls();
    assert_eq!(calls[0].kind, CallKind::Signed(keys::alice::address()));
    assert_eq!(calls[0].msg.gas, Some(50_000));
    assert_eq!(calls[0].msg.gas_price, Some(U256::from(7u64)));
}

#[tokio::test]
async fn test_anonymous_call() {
    let (backend, client) = setup();

    for from in [None, Some(H160::zero())] {
        let output = client
            .call_contract(
                CallMsg {
                    from,
                    to: Some(contract()),
                    data: b"totalSupply".to_vec(),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(output, b"totalSupply");
    }

    let calls = backend.calls();
    assert!(calls.iter().all(|c| c.kind == CallKind::Encrypted));
    assert!(calls.iter().all(|c| c.msg.gas.is_none()));
    // No chain state was needed.
    assert_eq!(backend.header_requests(), 0);
}

#[tokio::test]
async fn test_call_without_signer_is_anonymous() {
    let backend = Arc::new(MockBackend::new(MockRuntime::new(EPOCH), Localnet::CHAIN_ID));
    let client: Client<Localnet, _> =
        Client::with_cipher(backend.clone(), backend.runtime.client_cipher());

    let output = client
        .call_contract(
            CallMsg {
                from: Some(keys::bob::address()),
                to: Some(contract()),
                data: vec![9],
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(output, vec![9]);
    assert_eq!(backend.calls()[0].kind, CallKind::Encrypted);
}

#[tokio::test]
async fn test_signer_mismatch() {
    let (backend, client) = setup();

    let err = client
        .call_contract(
            CallMsg {
                from: Some(keys::bob::address()),
                to: Some(contract()),
                data: vec![1],
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Signing(_)));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_empty_call_passes_through() {
    let (backend, client) = setup();

    let output = client
        .call_contract(
            CallMsg {
                from: Some(keys::alice::address()),
                to: Some(contract()),
                value: Some(U256::from(5u64)),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(output, backend.raw_response);
    assert_eq!(backend.calls()[0].kind, CallKind::Raw);
    assert!(backend.calls()[0].msg.data.is_empty());
}

#[tokio::test]
async fn test_plain_cipher_call() {
    let backend = Arc::new(MockBackend::new(MockRuntime::new(EPOCH), Localnet::CHAIN_ID));
    let client: Client<Localnet, _> = Client::with_cipher(backend.clone(), Cipher::Plain)
        .with_signer(Arc::new(keys::alice::signer()));

    let output = client
        .call_contract(
            CallMsg {
                from: Some(keys::alice::address()),
                to: Some(contract()),
                data: vec![4, 5, 6],
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(output, vec![4, 5, 6]);

    // Signed, with the body left in a plain envelope.
    let calls = backend.calls();
    assert_eq!(calls[0].kind, CallKind::Signed(keys::alice::address()));
    let pack: SignedCallDataPack = cbor::from_slice(&calls[0].msg.data).unwrap();
    assert_eq!(pack.data, Call::plain(vec![4, 5, 6]));
}

#[tokio::test]
async fn test_call_with_unknown_key_fails() {
    let backend = Arc::new(MockBackend::new(MockRuntime::new(EPOCH), Localnet::CHAIN_ID));
    // Cipher derived for a key the runtime no longer holds.
    let client: Client<Localnet, _> =
        Client::with_cipher(backend.clone(), MockRuntime::new(EPOCH - 1).client_cipher());

    let err = client
        .call_contract(
            CallMsg {
                to: Some(contract()),
                data: vec![1],
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(err.is_call_failure());
}

#[tokio::test]
async fn test_estimate_gas() {
    let (backend, client) = setup();

    let gas = client
        .estimate_gas(CallMsg {
            from: Some(keys::alice::address()),
            to: Some(contract()),
            data: vec![1, 2],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(gas, 21_000);
    assert_eq!(
        backend.calls()[0].kind,
        CallKind::Signed(keys::alice::address())
    );

    client
        .estimate_gas(CallMsg {
            to: Some(contract()),
            data: vec![1, 2],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(backend.calls()[1].kind, CallKind::Encrypted);
}

fn transfer_tx(data: Vec<u8>) -> Transaction {
    Transaction {
        chain_id: Localnet::CHAIN_ID,
        nonce: 11,
        gas_price: U256::from(100u64),
        gas: 90_000,
        to: Some(contract()),
        value: U256::from(3u64),
        data,
    }
}

#[tokio::test]
async fn test_send_transaction() {
    let (backend, client) = setup();

    let hash = client
        .send_transaction(transfer_tx(b"transfer".to_vec()))
        .await
        .unwrap();

    let txs = backend.transactions();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].hash(), hash);
    // Only the data changes.
    assert_eq!(txs[0].nonce, 11);
    assert_eq!(txs[0].gas, 90_000);
    assert_eq!(txs[0].gas_price, U256::from(100u64));
    assert_eq!(txs[0].value, U256::from(3u64));

    let call: Call = cbor::from_slice(&txs[0].data).unwrap();
    assert_eq!(backend.runtime.open_call(&call).unwrap(), b"transfer");

    let receipt = client.transaction_receipt(hash).await.unwrap().unwrap();
    assert_eq!(receipt.status, 1);
    assert!(client
        .transaction_receipt(H256::zero())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_send_value_transfer_and_deploy() {
    let (backend, client) = setup();

    // Value transfer carries no envelope.
    client.send_transaction(transfer_tx(vec![])).await.unwrap();

    // Deployments are not encrypted.
    let deploy = Transaction {
        to: None,
        ..transfer_tx(vec![0x60, 0x80, 0x60, 0x40])
    };
    client.send_transaction(deploy.clone()).await.unwrap();

    let txs = backend.transactions();
    assert!(txs[0].data.is_empty());
    assert_eq!(txs[1], deploy);
}

#[tokio::test]
async fn test_pack_transaction_idempotent() {
    let (_backend, client) = setup();

    let mut packed = PackedTransactions::new();
    let once = client
        .pack_transaction(transfer_tx(b"payload".to_vec()), &mut packed)
        .await
        .unwrap();
    assert!(packed.contains(&once));

    let twice = client
        .pack_transaction(once.clone(), &mut packed)
        .await
        .unwrap();
    assert_eq!(twice, once);

    // A fresh send operation recognizes the envelope too.
    let mut fresh = PackedTransactions::new();
    let again = client
        .pack_transaction(once.clone(), &mut fresh)
        .await
        .unwrap();
    assert_eq!(again, once);
}

#[tokio::test]
async fn test_pack_transaction_idempotent_plain() {
    let backend = Arc::new(MockBackend::new(MockRuntime::new(EPOCH), Localnet::CHAIN_ID));
    let client: Client<Localnet, _> = Client::with_cipher(backend, Cipher::Plain);

    let once = client
        .pack_transaction(transfer_tx(b"payload".to_vec()), &mut PackedTransactions::new())
        .await
        .unwrap();
    assert_eq!(once.data, Cipher::Plain.encrypt_encode(b"payload"));

    let again = client
        .pack_transaction(once.clone(), &mut PackedTransactions::new())
        .await
        .unwrap();
    assert_eq!(again, once);
}

#[tokio::test]
async fn test_pack_transaction_rejects_bogus_envelope() {
    let (backend, client) = setup();

    let bogus = cbor::to_vec(Call {
        format: CallFormat::EncryptedX25519DeoxysII,
        body: cbor::Value::ByteString(vec![0xff; 8]),
    });
    let err = client
        .send_transaction(transfer_tx(bogus))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedEnvelope));
    assert!(backend.transactions().is_empty());
}

#[tokio::test]
async fn test_key_fetch_failure() {
    let backend = Arc::new(MockBackend::new(MockRuntime::new(EPOCH), Localnet::CHAIN_ID));
    let client: Client<Localnet, _> = Client::new(backend.clone(), Arc::new(MockKeySource::new()));

    let err = client
        .call_contract(
            CallMsg {
                to: Some(contract()),
                data: vec![1],
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::KeyFetch(_)));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_passthrough_methods() {
    let log = Log {
        address: contract(),
        topics: vec![H256::repeat_byte(1)],
        data: vec![1],
        block_number: 99,
        ..Default::default()
    };
    let mut backend = MockBackend::new(MockRuntime::new(EPOCH), Localnet::CHAIN_ID);
    backend.logs = vec![
        log.clone(),
        Log {
            address: H160::repeat_byte(0xee),
            ..Default::default()
        },
    ];
    let backend = Arc::new(backend);
    let client: Client<Localnet, _> =
        Client::with_cipher(backend.clone(), backend.runtime.client_cipher());

    assert_eq!(client.header_by_number(None).await.unwrap(), backend.head);
    assert!(client.header_by_number(Some(1)).await.is_err());
    assert_eq!(
        client
            .pending_nonce_at(keys::alice::address())
            .await
            .unwrap(),
        backend.nonce
    );
    assert_eq!(
        client.suggest_gas_price(),
        U256::from(Localnet::DEFAULT_GAS_PRICE)
    );

    let query = FilterQuery {
        addresses: vec![contract()],
        ..Default::default()
    };
    assert_eq!(client.filter_logs(query.clone()).await.unwrap(), vec![log.clone()]);

    let streamed: Vec<Log> = client
        .subscribe_filter_logs(query)
        .await
        .unwrap()
        .map(|log| log.unwrap())
        .collect()
        .await;
    assert_eq!(streamed, vec![log]);
}

#[tokio::test]
async fn test_concurrent_calls_share_cipher() {
    let (backend, client) = setup();
    let client = Arc::new(client);

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .call_contract(
                        CallMsg {
                            to: Some(contract()),
                            data: vec![i; 4],
                            ..Default::default()
                        },
                        None,
                    )
                    .await
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap().unwrap(), vec![i as u8; 4]);
    }
    assert_eq!(backend.calls().len(), 8);

    let cipher = client.cipher().await.unwrap();
    assert_eq!(cipher.epoch(), Some(EPOCH));
    assert!(cipher.public_key().is_some());
}
