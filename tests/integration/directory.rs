use crate::*;

use burrow_core::addr::Multiaddr;
use burrow_core::wire::{auth_digest, Namespace, AUTH_HEADER, ROUTE_PREFIX};
use burrow_services::{
    ContentRouting, FingerprintRouting, P2pHost, PeerRouting, RouteError, ServerIdentity,
};

/// Registration publishes addresses, the fingerprint mapping and the group
/// membership in one call.
#[tokio::test]
async fn register_then_resolve_fingerprint() {
    let server = start_server().await.unwrap();
    let alice = host("QmAlice").await.unwrap();
    let client = client(&server, "alice-fp", alice.clone());

    client.register("clients").await.unwrap();

    let id = client.find_peer_id("alice-fp").await.unwrap();
    assert_eq!(id.as_ref(), Some(alice.id()));

    let info = client.find_peer(alice.id()).await.unwrap().unwrap();
    assert_eq!(info.addrs, alice.addrs());

    let group = client.providers(&Namespace::derive("clients")).await.unwrap();
    assert_eq!(group.len(), 1);
    assert_eq!(&group[0].id, alice.id());
}

#[tokio::test]
async fn unknown_lookups_are_absent_not_errors() {
    let server = start_server().await.unwrap();
    let client = RendezvousClient::lookup_only(&server.url, SECRET);

    assert!(client.find_peer(&"QmNobody".parse().unwrap()).await.unwrap().is_none());
    assert!(client.find_peer_id("no-such-fp").await.unwrap().is_none());
    assert!(client
        .providers(&Namespace::derive("empty"))
        .await
        .unwrap()
        .is_empty());
    assert!(client.server_id().await.unwrap().is_none());
}

/// A malformed address list is rejected with a server error and leaves
/// every table untouched.
#[tokio::test]
async fn malformed_registration_writes_nothing() {
    let server = start_server().await.unwrap();
    let ns = Namespace::derive("clients");

    let resp = reqwest::Client::new()
        .post(format!("{}{ROUTE_PREFIX}{ns}", server.url))
        .header(AUTH_HEADER, auth_digest(SECRET))
        .form(&[
            ("id", "QmMallory"),
            ("addrs", "/ip4/10.0.0.1/tcp/4001,/ip4/not-an-ip/tcp/1"),
            ("fingerprint", "mallory-fp"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], false);

    let directory = &server.state.directory;
    assert!(directory.find(&"QmMallory".parse().unwrap()).is_err());
    assert!(directory.find_peer_id("mallory-fp").is_none());
    assert!(directory.find_providers(&ns).is_err());
}

/// Loopback addresses registered from a loopback requester stay as they are.
#[tokio::test]
async fn loopback_registration_from_loopback_is_kept() {
    let server = start_server().await.unwrap();
    let bob = host("QmBob").await.unwrap();
    let client = client(&server, "bob-fp", bob.clone());
    client.register("clients").await.unwrap();

    let info = client.find_peer(bob.id()).await.unwrap().unwrap();
    let port = bob.local_addr().port();
    let expected: Multiaddr = format!("/ip4/127.0.0.1/tcp/{port}").parse().unwrap();
    assert_eq!(info.addrs, vec![expected]);
}

#[tokio::test]
async fn logout_removes_mapping_once() {
    let server = start_server().await.unwrap();
    let carol = host("QmCarol").await.unwrap();
    let client = client(&server, "carol-fp", carol.clone());
    client.register("clients").await.unwrap();

    client.logout("carol-fp").await.unwrap();
    assert!(client.find_peer_id("carol-fp").await.unwrap().is_none());

    match client.logout("carol-fp").await {
        Err(RouteError::Rejected(msg)) => assert_eq!(msg, "failed to delete"),
        other => panic!("expected rejection, got {other:?}"),
    }

    // The peer record itself survives logout.
    assert!(client.find_peer(carol.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn server_id_last_write_wins() {
    let server = start_server().await.unwrap();
    let first = host("QmRelayOne").await.unwrap();
    let second = host("QmRelayTwo").await.unwrap();

    client(&server, "", first.clone()).set_server_id().await.unwrap();
    client(&server, "", second.clone()).set_server_id().await.unwrap();

    // Fresh client so nothing is cached.
    let reader = RendezvousClient::lookup_only(&server.url, SECRET);
    assert_eq!(reader.server_id().await.unwrap().as_ref(), Some(second.id()));
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let server = start_server().await.unwrap();
    let dave = host("QmDave").await.unwrap();
    let intruder = RendezvousClient::new(&server.url, "not-the-secret", "dave-fp", dave.clone());

    assert!(matches!(
        intruder.provide(&Namespace::derive("clients"), true).await,
        Err(RouteError::Rejected(_))
    ));
    assert!(matches!(
        intruder.find_peer_id("dave-fp").await,
        Err(RouteError::Rejected(_))
    ));
    assert_eq!(server.state.directory.peer_count(), 0);
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    // Bind then drop to get a port with nobody listening.
    let port = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let client = RendezvousClient::lookup_only(&format!("http://127.0.0.1:{port}"), SECRET);
    assert!(matches!(
        client.find_peer_id("anything").await,
        Err(RouteError::Http(_))
    ));
}
