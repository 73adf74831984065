use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

use identity_verifier_service::common::channel::PageChannel;
use identity_verifier_service::common::fetcher::{HttpResultFetcher, ResultFetcher};
use identity_verifier_service::common::reconcile;
use identity_verifier_service::common::types::CallbackParams;

// Environment-driven service configuration
struct CallbackConfig {
    bind_addr: String,
    backend_url: String,
    fetch_timeout: Duration,
    diagnostics: bool,
}

impl CallbackConfig {
    fn from_env() -> Self {
        CallbackConfig {
            bind_addr: env::var("CALLBACK_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string()),
            backend_url: env::var("BACKEND_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            fetch_timeout: Duration::from_secs(
                env::var("FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            diagnostics: env::var("POPUP_DIAGNOSTICS").map(|v| v == "1").unwrap_or(false),
        }
    }
}

#[derive(Clone)]
struct AppState {
    fetcher: Arc<dyn ResultFetcher>,
    fetch_timeout: Duration,
    diagnostics: bool,
}

// Create a new router with the provider-redirect callback route
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/identity/callback", get(handle_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Handle the provider redirect landing in the popup. Always answers 200
// with the terminal popup page; malformed redirects degrade to a FAIL
// envelope inside it, never to an error response.
async fn handle_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    let mut channel = PageChannel::new(state.diagnostics);
    let (envelope, outcome) = reconcile::run(
        params,
        state.fetcher.as_ref(),
        &mut channel,
        state.fetch_timeout,
    )
    .await;

    info!(kind = ?envelope.kind, ?outcome, "callback reconciled");
    Html(channel.into_page())
}


#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = CallbackConfig::from_env();
    let state = AppState {
        fetcher: Arc::new(HttpResultFetcher::new(config.backend_url.clone())),
        fetch_timeout: config.fetch_timeout,
        diagnostics: config.diagnostics,
    };
    let app = create_router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    info!("Callback service listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
