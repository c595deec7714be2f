//! Test server harness for E2E testing
//!
//! Provides `TestInventoryServer` for spawning real inventory server
//! instances in tests, pointed at a mock JWKS endpoint.

use crate::token_builders::{TEST_AUDIENCE, TEST_ISSUER_DOMAIN};
use inventory_service::auth::{JwksClient, TokenAdmissionGate};
use inventory_service::config::Config;
use inventory_service::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the inventory server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_listing() -> Result<()> {
///     let jwks = MockServer::start().await;
///     mount_jwks(&jwks, jwks_json(&[&TestKeypair::primary()])).await;
///     let server = TestInventoryServer::spawn(&jwks_url(&jwks)).await?;
///
///     let response = reqwest::Client::new()
///         .get(format!("{}/api/v1/inventory", server.url()))
///         .bearer_auth(token)
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestInventoryServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestInventoryServer {
    /// Spawn a server that fetches signing keys from `jwks_url`.
    pub async fn spawn(jwks_url: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(jwks_url, HashMap::new()).await
    }

    /// Spawn with extra configuration variables layered over the test defaults.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn_with_vars(
        jwks_url: &str,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("ISSUER_DOMAIN".to_string(), TEST_ISSUER_DOMAIN.to_string()),
            ("API_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
            ("JWKS_URL".to_string(), jwks_url.to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let jwks_client = JwksClient::from_config(&config)
            .map_err(|e| anyhow::anyhow!("Failed to create JWKS client: {}", e))?;
        let gate = Arc::new(TokenAdmissionGate::new(jwks_client, &config));
        let state = Arc::new(AppState { gate });

        // A recorder per server, not installed globally, so many test servers
        // can coexist in one process.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// URL of the protected inventory endpoint.
    pub fn inventory_url(&self) -> String {
        format!("http://{}/api/v1/inventory", self.addr)
    }

    /// Shared application state, for inspecting the key cache.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for TestInventoryServer {
    fn drop(&mut self) {
        // Abort the server task so the port is released when the test ends.
        self._handle.abort();
    }
}
