//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, CORS)
//! - Bind server to listener
//! - Close the backend connection on shutdown

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::bridge::ConnectionManager;
use crate::config::{BridgeConfig, CorsConfig};
use crate::http::{query, websocket};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
}

/// HTTP front of the bridge.
pub struct HttpServer {
    router: Router,
    config: Arc<BridgeConfig>,
    manager: Arc<ConnectionManager>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: BridgeConfig) -> Self {
        let manager = Arc::new(ConnectionManager::from_config(&config.timeouts));
        Self::with_manager(config, manager)
    }

    /// Create a server around an existing manager.
    pub fn with_manager(config: BridgeConfig, manager: Arc<ConnectionManager>) -> Self {
        let config = Arc::new(config);
        let state = AppState {
            manager: Arc::clone(&manager),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            manager,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &BridgeConfig, state: AppState) -> Router {
        let router = Router::new()
            .route(&config.routes.ws_path, get(websocket::upgrade_handler))
            .route(&config.routes.query_path, get(query::query_handler))
            .route(&config.routes.status_path, get(query::status_handler))
            .with_state(state);

        let router = if config.cors.enabled {
            router.layer(cors_layer(&config.cors))
        } else {
            router
        };

        router.layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            ws_path = %self.config.routes.ws_path,
            query_path = %self.config.routes.query_path,
            "HTTP server starting"
        );

        let manager = Arc::clone(&self.manager);
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
                manager.close().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The Axum router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn manager(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.manager)
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

/// Any origin, the methods browsers use against the bridge, JSON bodies.
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(config.max_age_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let mut config = BridgeConfig::default();
        config.timeouts.read_timeout_ms = 100;
        HttpServer::new(config)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn query_without_peer_is_server_error() {
        let response = server()
            .router()
            .oneshot(Request::get("/query").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "no active backend connection");
    }

    #[tokio::test]
    async fn query_rejects_other_methods() {
        let response = server()
            .router()
            .oneshot(Request::post("/query").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn preflight_gets_cors_headers() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/query")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_MAX_AGE], "3600");
    }

    #[tokio::test]
    async fn cors_can_be_disabled() {
        let mut config = BridgeConfig::default();
        config.cors.enabled = false;
        let response = HttpServer::new(config)
            .router()
            .oneshot(
                Request::get("/query")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn status_reports_disconnected() {
        let response = server()
            .router()
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let status: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(status["connected"], false);
        assert_eq!(status["pending"], 0);
        assert_eq!(status["table"]["registered"], 0);
    }

    #[tokio::test]
    async fn custom_paths_are_honoured() {
        let mut config = BridgeConfig::default();
        config.routes.query_path = "/ask".into();
        let router = HttpServer::new(config).router();

        let moved = router
            .clone()
            .oneshot(Request::get("/query").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(moved.status(), StatusCode::NOT_FOUND);

        let custom = router
            .oneshot(Request::get("/ask").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(custom.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
