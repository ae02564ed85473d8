//! Wallet connector: proposal approval, request guards and pairing

mod common;

use cardano_wc::core::consts::methods;
use cardano_wc::core::namespace::build_required;
use cardano_wc::relay::{ConnectParams, RelayEvent, SessionRequest};
use cardano_wc::{ChainId, DappRelay, Error, MemoryHub, NetworkId, Relay, RpcRequest, StaticWallet, WalletConnector};
use common::*;
use serde_json::json;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime { tokio::runtime::Runtime::new().unwrap() }

fn rpc_code(outcome: cardano_wc::Result<serde_json::Value>) -> i64 {
    match outcome {
        Err(Error::Rpc(e)) => e.code,
        other => panic!("expected an rpc error, got {other:?}"),
    }
}

/// Required-only methods, so anything outside the base set is refused.
fn narrow_grant(chains: &[ChainId]) -> ConnectParams {
    ConnectParams {
        namespaces: build_required(chains, false),
        optional_namespaces: build_required(chains, false),
        pairing_topic: None,
    }
}

/// Test: requests outside the grant or the wallet's chain are refused with the matching code
#[test]
fn requests_outside_the_grant_are_refused() {
    runtime().block_on(async {
        let hub = MemoryHub::new();
        let signer = Arc::new(static_wallet());
        let wallet = serve(WalletConnector::new(Arc::new(hub.wallet()), signer.clone(), ChainId::PREPROD));
        let relay = dapp(&hub, "guarded");
        let session = relay.connect(narrow_grant(&[ChainId::PREPROD, ChainId::MAINNET])).await.unwrap();

        // granted chain, but the wallet is elsewhere
        let outcome = relay.request(&session.topic, &ChainId::MAINNET, RpcRequest::bare(methods::GET_USED_ADDRESSES)).await;
        assert_eq!(rpc_code(outcome), 5100);

        // the relay refuses ungranted methods before they reach the wallet
        let outcome = relay.request(&session.topic, &ChainId::PREPROD, RpcRequest::bare(methods::GET_BALANCE)).await;
        assert_eq!(rpc_code(outcome), 1001);

        // and so does the wallet itself
        let request = SessionRequest {
            id: 7,
            topic: session.topic.clone(),
            chain_id: ChainId::PREPROD,
            request: RpcRequest::bare(methods::GET_BALANCE),
        };
        let response = wallet.connector.answer(&request).await;
        assert_eq!(response.id, 7);
        assert_eq!(response.outcome.unwrap_err().code, 1001);

        let outcome = relay.request(&session.topic, &ChainId::PREPROD, RpcRequest::bare(methods::SIGN_TX)).await;
        assert_eq!(rpc_code(outcome), -32602);

        let signed = relay
            .request(&session.topic, &ChainId::PREPROD, RpcRequest::new(methods::SIGN_TX, vec![json!("84a0"), json!(true)]))
            .await
            .unwrap();
        assert!(signed.as_str().unwrap().starts_with("a100"));
        assert_eq!(signer.signed(), vec!["84a0".to_string()]);

        wallet.stop().await;
    });
}

/// Test: an account the session never granted is refused
#[test]
fn foreign_account_is_refused() {
    runtime().block_on(async {
        let hub = MemoryHub::new();
        let wallet = wallet_side(&hub, ChainId::PREPROD);
        let relay = dapp(&hub, "foreign");
        let session = relay.connect(proposal(&[ChainId::PREPROD], &ChainId::all())).await.unwrap();

        let other = StaticWallet::new().with_addresses(NetworkId::Testnet, "addr_test1other", "stake_test1other");
        let imposter = WalletConnector::new(Arc::new(hub.wallet()), Arc::new(other), ChainId::PREPROD);
        let request = SessionRequest {
            id: 1,
            topic: session.topic.clone(),
            chain_id: ChainId::PREPROD,
            request: RpcRequest::bare(methods::GET_USED_ADDRESSES),
        };
        assert_eq!(imposter.answer(&request).await.outcome.unwrap_err().code, 5103);
        assert_eq!(wallet.connector.answer(&request).await.outcome.unwrap(), json!([TESTNET_BASE]));

        wallet.stop().await;
    });
}

/// Test: unservable proposals are rejected and the wallet keeps serving
#[test]
fn unservable_proposals_are_rejected() {
    runtime().block_on(async {
        let hub = MemoryHub::new();
        let testnet_only = StaticWallet::new().with_addresses(NetworkId::Testnet, TESTNET_BASE, TESTNET_STAKE);
        let wallet = serve(WalletConnector::new(Arc::new(hub.wallet()), Arc::new(testnet_only), ChainId::PREPROD));
        let relay = dapp(&hub, "picky");

        // required chain missing from the optional grant
        let outcome = relay.connect(proposal(&[ChainId::PREVIEW], &[ChainId::PREPROD])).await;
        assert!(matches!(outcome, Err(Error::Rpc(e)) if e.code == 5100));

        // no address for the required network
        let outcome = relay.connect(proposal(&[ChainId::MAINNET], &ChainId::all())).await;
        assert!(matches!(outcome, Err(Error::Rpc(e)) if e.code == 5100));

        // foreign namespace key
        let mut params = proposal(&[ChainId::PREPROD], &ChainId::all());
        let cardano = params.namespaces.remove("cip34").unwrap();
        params.namespaces.insert("eip155".into(), cardano);
        let outcome = relay.connect(params).await;
        assert!(matches!(outcome, Err(Error::Rpc(e)) if e.code == 5104));

        let session = relay.connect(proposal(&[ChainId::PREPROD], &ChainId::all())).await.unwrap();
        assert_eq!(wallet.connector.sessions().await.unwrap().len(), 1);
        assert!(wallet.connector.session(&session.topic).await.is_ok());

        wallet.stop().await;
    });
}

/// Test: a proposal held back until the wallet pairs with the shown URI
#[test]
fn pairing_uri_delivers_the_proposal() {
    runtime().block_on(async {
        let hub = MemoryHub::new();
        hub.set_auto_pair(false).unwrap();
        let wallet = wallet_side(&hub, ChainId::PREPROD);
        let relay = dapp(&hub, "paired");
        let mut dapp_events = relay.subscribe();

        let proposer = relay.clone();
        let connecting = tokio::spawn(async move { proposer.connect(proposal(&[ChainId::PREPROD], &ChainId::all())).await });

        let uri = loop {
            if let RelayEvent::DisplayUri(uri) = dapp_events.recv().await.unwrap() {
                break uri;
            }
        };
        assert_eq!(hub.pending_proposals().unwrap(), 1);
        wallet.connector.pair(&uri).await.unwrap();

        let session = connecting.await.unwrap().unwrap();
        assert_eq!(hub.pending_proposals().unwrap(), 0);
        let pairing = wallet.connector.pairing(&session.pairing_topic).await.unwrap();
        assert!(pairing.active);
        assert_eq!(pairing.peer_metadata.unwrap().name, "paired");

        relay.ping(&session.topic).await.unwrap();
        wallet.connector.ping(&session.topic).await.unwrap();
        let expiry = wallet.connector.session_expiry(&session.topic).await.unwrap();
        assert!(expiry > chrono::Utc::now() + chrono::Duration::days(6));

        wallet.stop().await;
    });
}
