//! Rendezvous client: the routing capabilities backed by the HTTP service.
//!
//! One client per process, bound to one server, one secret and one
//! fingerprint. Nothing the server returns is cached except the relay
//! peer's identity, which is kept once learned.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use burrow_core::addr::{join_addr_list, AddrInfo, PeerId};
use burrow_core::wire::{
    auth_digest, IdResp, Namespace, PeerResp, ProvidersResp, StatusResp, AUTH_HEADER,
    FINGERPRINTS_PREFIX, PROVIDERS_PREFIX, RELAY_RENDEZVOUS, ROUTE_PREFIX, SERVER_ID_PATH,
};
use burrow_services::routing::provider_channel;
use burrow_services::{
    ContentRouting, FingerprintRouting, P2pHost, PeerRouting, ProviderStream, RouteError,
    ServerIdentity,
};

/// Entries buffered between the lookup task and the consumer.
const PROVIDER_BUFFER: usize = 8;

#[derive(Clone)]
pub struct RendezvousClient {
    http: reqwest::Client,
    server_url: Arc<str>,
    digest: Arc<str>,
    fingerprint: Arc<str>,
    /// Local host whose identity and addresses get published. `None` for
    /// lookup-only clients such as the CLI.
    host: Option<Arc<dyn P2pHost>>,
    server_id: Arc<OnceLock<PeerId>>,
}

impl RendezvousClient {
    pub fn new(
        server_url: &str,
        secret: &str,
        fingerprint: &str,
        host: Arc<dyn P2pHost>,
    ) -> Self {
        let mut client = Self::lookup_only(server_url, secret);
        client.fingerprint = fingerprint.into();
        client.host = Some(host);
        client
    }

    /// A client that can query and log out but not publish.
    pub fn lookup_only(server_url: &str, secret: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            server_url: server_url.trim_end_matches('/').into(),
            digest: auth_digest(secret).into(),
            fingerprint: "".into(),
            host: None,
            server_id: Arc::new(OnceLock::new()),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Startup registration under a named group. Relay peers are found
    /// through the relay group instead, so that name is skipped.
    pub async fn register(&self, name: &str) -> Result<(), RouteError> {
        if name == RELAY_RENDEZVOUS {
            tracing::debug!("relay namespace, skipping registration");
            return Ok(());
        }
        self.provide(&Namespace::derive(name), true).await
    }

    /// Every provider of `namespace` in one call, for callers that do not
    /// need the lazy stream.
    pub async fn providers(&self, namespace: &Namespace) -> Result<Vec<AddrInfo>, RouteError> {
        Ok(self.fetch_providers(namespace).await?.into_values().collect())
    }

    fn local_host(&self) -> Result<&Arc<dyn P2pHost>, RouteError> {
        self.host
            .as_ref()
            .ok_or(RouteError::Rejected("client has no local host"))
    }

    // ── HTTP plumbing ─────────────────────────────────────────────────────────

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.server_url, path))
            .header(AUTH_HEADER, &*self.digest)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, RouteError> {
        let resp: Response = req.send().await.map_err(RouteError::http)?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(RouteError::Rejected("unauthorized: rendezvous secret mismatch"));
        }
        let body = resp.bytes().await.map_err(RouteError::http)?;
        serde_json::from_slice(&body).map_err(|e| RouteError::Decode(e.to_string()))
    }

    async fn fetch_providers(
        &self,
        namespace: &Namespace,
    ) -> Result<std::collections::HashMap<String, AddrInfo>, RouteError> {
        let resp: ProvidersResp = self
            .send(self.request(Method::GET, &format!("{PROVIDERS_PREFIX}{namespace}")))
            .await?;
        Ok(if resp.status {
            resp.addr_infos.unwrap_or_default()
        } else {
            Default::default()
        })
    }
}

// ── Capabilities ──────────────────────────────────────────────────────────────

#[async_trait]
impl PeerRouting for RendezvousClient {
    async fn find_peer(&self, id: &PeerId) -> Result<Option<AddrInfo>, RouteError> {
        let resp: PeerResp = self
            .send(self.request(Method::GET, &format!("{ROUTE_PREFIX}{id}")))
            .await?;
        Ok(if resp.status { resp.addr_info } else { None })
    }
}

#[async_trait]
impl ContentRouting for RendezvousClient {
    async fn provide(&self, namespace: &Namespace, bcast: bool) -> Result<(), RouteError> {
        if !bcast {
            return Ok(());
        }
        let host = self.local_host()?;
        let id = host.id().to_string();
        let addrs = join_addr_list(&host.addrs());
        let form = [
            ("id", id.as_str()),
            ("addrs", addrs.as_str()),
            ("fingerprint", &*self.fingerprint),
        ];

        let resp: StatusResp = self
            .send(
                self.request(Method::POST, &format!("{ROUTE_PREFIX}{namespace}"))
                    .form(&form),
            )
            .await?;
        if !resp.status {
            return Err(RouteError::Rejected("provide rejected by rendezvous server"));
        }
        tracing::info!(peer = %id, %addrs, namespace = %namespace, "provided");
        Ok(())
    }

    fn find_providers(&self, namespace: &Namespace, cancel: &CancellationToken) -> ProviderStream {
        let (sink, stream) = provider_channel(PROVIDER_BUFFER, cancel);
        let client = self.clone();
        let namespace = namespace.clone();

        tokio::spawn(async move {
            let group = tokio::select! {
                _ = sink.cancelled() => return,
                group = client.fetch_providers(&namespace) => group,
            };
            let group = match group {
                Ok(g) => g,
                Err(e) => {
                    tracing::warn!(namespace = %namespace, error = %e, "provider lookup failed");
                    return;
                }
            };
            for info in group.into_values() {
                if !sink.send(info).await {
                    tracing::debug!(namespace = %namespace, "provider lookup cancelled");
                    return;
                }
            }
        });
        stream
    }
}

#[async_trait]
impl FingerprintRouting for RendezvousClient {
    async fn find_peer_id(&self, fingerprint: &str) -> Result<Option<PeerId>, RouteError> {
        let resp: IdResp = self
            .send(self.request(Method::GET, &format!("{FINGERPRINTS_PREFIX}{fingerprint}")))
            .await?;
        Ok(resp.peer_id)
    }

    async fn logout(&self, fingerprint: &str) -> Result<(), RouteError> {
        let resp: StatusResp = self
            .send(self.request(
                Method::DELETE,
                &format!("{FINGERPRINTS_PREFIX}{fingerprint}"),
            ))
            .await?;
        if !resp.status {
            return Err(RouteError::Rejected("failed to delete"));
        }
        Ok(())
    }
}

#[async_trait]
impl ServerIdentity for RendezvousClient {
    async fn server_id(&self) -> Result<Option<PeerId>, RouteError> {
        if let Some(id) = self.server_id.get() {
            return Ok(Some(id.clone()));
        }
        let resp: IdResp = self.send(self.request(Method::GET, SERVER_ID_PATH)).await?;
        if let Some(id) = &resp.peer_id {
            let _ = self.server_id.set(id.clone());
        }
        Ok(resp.peer_id)
    }

    async fn set_server_id(&self) -> Result<(), RouteError> {
        let id = self.local_host()?.id().clone();
        let resp: StatusResp = self
            .send(self.request(Method::POST, &format!("{SERVER_ID_PATH}/{id}")))
            .await?;
        if !resp.status {
            return Err(RouteError::Rejected("failed to register server id"));
        }
        let _ = self.server_id.set(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_only_client_cannot_publish() {
        let client = RendezvousClient::lookup_only("http://127.0.0.1:1/", "s");
        assert_eq!(&*client.server_url, "http://127.0.0.1:1");
        assert!(matches!(
            client.provide(&Namespace::derive("clients"), true).await,
            Err(RouteError::Rejected(_))
        ));
        assert!(matches!(
            client.set_server_id().await,
            Err(RouteError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn provide_without_bcast_sends_nothing() {
        // Port 1 is never listening; any request would fail.
        let client = RendezvousClient::lookup_only("http://127.0.0.1:1", "s");
        client
            .provide(&Namespace::derive("clients"), false)
            .await
            .unwrap();
        client.register(RELAY_RENDEZVOUS).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_server_is_an_http_error() {
        let client = RendezvousClient::lookup_only("http://127.0.0.1:1", "s");
        let id: PeerId = "QmA".parse().unwrap();
        assert!(matches!(client.find_peer(&id).await, Err(RouteError::Http(_))));
    }
}
