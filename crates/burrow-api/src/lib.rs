//! burrow-api: the rendezvous HTTP service.
//!
//! Routes, all behind the shared-secret gate:
//!
//! | method | path                           | handler                      |
//! |--------|--------------------------------|------------------------------|
//! | GET    | /route/{id}                    | peer addresses               |
//! | POST   | /route/{namespace}             | register (form id/addrs/fingerprint) |
//! | GET    | /route/providers/{namespace}   | provider group               |
//! | GET    | /route/fingerprints/{fp}       | fingerprint → peer id        |
//! | DELETE | /route/fingerprints/{fp}       | logout                       |
//! | GET    | /route/server-id               | relay peer id                |
//! | POST   | /route/server-id/{id}          | set relay peer id            |

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;

use anyhow::Context;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/route/{key}",
            get(handlers::handle_get_peer).post(handlers::handle_new_peer),
        )
        .route(
            "/route/providers/{namespace}",
            get(handlers::handle_get_provider),
        )
        .route(
            "/route/fingerprints/{fingerprint}",
            get(handlers::handle_get_peer_id).delete(handlers::handle_delete_fingerprint),
        )
        .route("/route/server-id", get(handlers::handle_get_server_id))
        .route("/route/server-id/{id}", post(handlers::handle_set_server_id))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the rendezvous port on all interfaces. 0 = OS-assigned.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("bind rendezvous API on port {port}"))
}

pub async fn serve(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "rendezvous API listening");
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{header, Method, Request, Response};
    use tower::ServiceExt;

    pub const SECRET: &str = "test-secret";

    /// Router with a fixed observed peer address.
    pub fn app(remote: &str) -> (ApiState, Router) {
        let state = ApiState::new(SECRET);
        let remote: SocketAddr = remote.parse().unwrap();
        let app = router(state.clone()).layer(MockConnectInfo(remote));
        (state, app)
    }

    pub async fn oneshot(app: &Router, req: Request<Body>) -> Response<Body> {
        app.clone().oneshot(req).await.unwrap()
    }

    fn authed(method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("auth", burrow_core::wire::auth_digest(SECRET))
    }

    pub async fn get(app: &Router, uri: &str) -> Response<Body> {
        oneshot(app, authed(Method::GET, uri).body(Body::empty()).unwrap()).await
    }

    pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
        oneshot(app, authed(Method::DELETE, uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_empty(app: &Router, uri: &str) -> Response<Body> {
        oneshot(app, authed(Method::POST, uri).body(Body::empty()).unwrap()).await
    }

    pub async fn form_post(app: &Router, uri: &str, body: &str) -> Response<Body> {
        let req = authed(Method::POST, uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        oneshot(app, req).await
    }

    pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
