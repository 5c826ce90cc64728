use crate::*;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use burrow_services::tunnel::{serve_inbound, Dialers, DirectDialer, OverlayDialer};
use burrow_services::{BufferPool, ConnContext, Route, Tunnel};

const LINGER: Duration = Duration::from_secs(2);

/// Reads everything, then answers with the upper-cased bytes and closes.
async fn upper_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                sock.read_to_end(&mut buf).await.unwrap();
                sock.write_all(&buf.to_ascii_uppercase()).await.unwrap();
                sock.shutdown().await.unwrap();
            });
        }
    });
    addr
}

/// Local ingress that sends every accepted connection to `target`.
async fn ingress(tunnel: Tunnel, target: String, route: Route) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            let ctx = ConnContext::new(target.clone(), route, Box::new(sock));
            if tunnel.enqueue(ctx).await.is_err() {
                break;
            }
        }
    });
    addr
}

async fn round_trip(ingress: &str, payload: &[u8]) -> Vec<u8> {
    let mut app = TcpStream::connect(ingress).await.unwrap();
    app.write_all(payload).await.unwrap();
    app.shutdown().await.unwrap();
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), app.read_to_end(&mut reply))
        .await
        .unwrap()
        .unwrap();
    reply
}

#[tokio::test]
async fn direct_route_half_close() {
    let target = upper_server().await;
    let (tunnel, _dispatcher) =
        Tunnel::spawn(Dialers::direct_only(), BufferPool::default(), LINGER);
    let addr = ingress(tunnel, target, Route::Direct).await;

    // Larger than one relay buffer so the copy loops turn over.
    let payload = b"burrow ".repeat(10_000);
    let reply = round_trip(&addr, &payload).await;
    assert_eq!(reply, payload.to_ascii_uppercase());
}

/// Entry peer finds the exit by fingerprint through the rendezvous server,
/// opens a tunnel stream to it, and the exit dials the target.
#[tokio::test]
async fn overlay_route_through_exit_peer() {
    let server = start_server().await.unwrap();
    let target = upper_server().await;

    let exit = host("QmExitPeer").await.unwrap();
    client(&server, "exit-fp", exit.clone())
        .register("clients")
        .await
        .unwrap();
    let (exit_tunnel, _exit_dispatcher) =
        Tunnel::spawn(Dialers::direct_only(), BufferPool::default(), LINGER);
    serve_inbound(exit.as_ref(), exit_tunnel);

    let entry = host("QmEntryPeer").await.unwrap();
    let entry_client = client(&server, "entry-fp", entry.clone());
    entry_client.register("clients").await.unwrap();
    let overlay = OverlayDialer::new(
        entry,
        entry_client.clone(),
        entry_client,
        "exit-fp",
    );
    let (tunnel, _dispatcher) = Tunnel::spawn(
        Dialers {
            direct: std::sync::Arc::new(DirectDialer),
            overlay: Some(std::sync::Arc::new(overlay)),
        },
        BufferPool::default(),
        LINGER,
    );
    let addr = ingress(tunnel, target, Route::Overlay).await;

    let reply = round_trip(&addr, b"hello from the entry peer").await;
    assert_eq!(reply, b"HELLO FROM THE ENTRY PEER");

    // Several connections share the same exit.
    for i in 0..3 {
        let msg = format!("connection {i}");
        let reply = round_trip(&addr, msg.as_bytes()).await;
        assert_eq!(reply, msg.to_uppercase().into_bytes());
    }
}

/// An exit fingerprint nobody registered makes the dial fail; the ingress
/// side sees its connection closed with no data.
#[tokio::test]
async fn overlay_route_with_unknown_exit_closes_ingress() {
    let server = start_server().await.unwrap();
    let target = upper_server().await;

    let entry = host("QmLonelyEntry").await.unwrap();
    let entry_client = client(&server, "lonely-fp", entry.clone());
    entry_client.register("clients").await.unwrap();
    let overlay = OverlayDialer::new(entry, entry_client.clone(), entry_client, "missing-fp");
    let (tunnel, _dispatcher) = Tunnel::spawn(
        Dialers {
            direct: std::sync::Arc::new(DirectDialer),
            overlay: Some(std::sync::Arc::new(overlay)),
        },
        BufferPool::default(),
        LINGER,
    );
    let addr = ingress(tunnel, target, Route::Overlay).await;

    let mut app = TcpStream::connect(&addr).await.unwrap();
    let mut reply = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(10), app.read_to_end(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}
