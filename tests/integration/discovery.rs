use crate::*;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use burrow_core::wire::Namespace;
use burrow_services::{ContentRouting, P2pHost, Reachability, ReachabilityWatcher};

#[tokio::test]
async fn provider_stream_yields_each_member_once() {
    let server = start_server().await.unwrap();
    let ns = Namespace::derive("swarm");

    let mut expected = Vec::new();
    for name in ["QmOne", "QmTwo", "QmThree"] {
        let h = host(name).await.unwrap();
        let c = client(&server, "", h.clone());
        c.provide(&ns, true).await.unwrap();
        // Providing twice must not duplicate the entry.
        c.provide(&ns, true).await.unwrap();
        expected.push(h.id().clone());
    }

    let reader = RendezvousClient::lookup_only(&server.url, SECRET);
    let cancel = CancellationToken::new();
    let mut stream = reader.find_providers(&ns, &cancel);
    let mut seen = Vec::new();
    while let Some(info) = stream.next_provider().await {
        seen.push(info.id);
    }
    seen.sort();
    expected.sort();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn cancelled_lookup_ends_early() {
    let server = start_server().await.unwrap();
    let ns = Namespace::derive("swarm");
    let h = host("QmOnly").await.unwrap();
    client(&server, "", h).provide(&ns, true).await.unwrap();

    let reader = RendezvousClient::lookup_only(&server.url, SECRET);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut stream = reader.find_providers(&ns, &cancel);
    assert!(stream.next_provider().await.is_none());
}

#[tokio::test]
async fn local_provide_is_not_published() {
    let server = start_server().await.unwrap();
    let ns = Namespace::derive("quiet");
    let h = host("QmQuiet").await.unwrap();
    client(&server, "", h).provide(&ns, false).await.unwrap();
    assert_eq!(server.state.directory.peer_count(), 0);
}

/// A peer that learns it is behind NAT publishes itself into its group
/// after the settle delay.
#[tokio::test]
async fn private_reachability_triggers_provide() {
    let server = start_server().await.unwrap();
    let ns = Namespace::derive("nat-group");
    let h = host("QmBehindNat").await.unwrap();
    let c = client(&server, "nat-fp", h.clone());

    let watcher = ReachabilityWatcher::new(c.clone(), ns.clone(), Duration::from_millis(50))
        .spawn(h.subscribe_reachability());
    h.report_reachability(Reachability::Private);

    let published = tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(published, 1);

    let group = c.providers(&ns).await.unwrap();
    assert_eq!(group.len(), 1);
    assert_eq!(&group[0].id, h.id());
}

#[tokio::test]
async fn public_reachability_publishes_nothing() {
    let server = start_server().await.unwrap();
    let ns = Namespace::derive("open-group");
    let h = host("QmOpen").await.unwrap();
    let c = client(&server, "", h.clone());

    let watcher = ReachabilityWatcher::new(c, ns.clone(), Duration::ZERO)
        .spawn(h.subscribe_reachability());
    h.report_reachability(Reachability::Public);

    let published = tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(published, 0);
    assert!(server.state.directory.find_providers(&ns).is_err());
}
