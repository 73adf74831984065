use std::env;
use std::sync::Arc;
use std::time::Duration;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tracing::info;

use identity_verifier_service::common::channel::PageChannel;
use identity_verifier_service::common::fetcher::{HttpResultFetcher, ResultFetcher};
use identity_verifier_service::common::reconcile;
use identity_verifier_service::common::types::CallbackParams;

#[derive(Clone)]
struct LambdaState {
    fetcher: Arc<dyn ResultFetcher>,
    fetch_timeout: Duration,
    diagnostics: bool,
}

/// Main function for the Lambda handler
#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .with_line_number(false)
        .init();

    let backend_url =
        env::var("BACKEND_API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let state = LambdaState {
        fetcher: Arc::new(HttpResultFetcher::new(backend_url)),
        fetch_timeout: Duration::from_secs(
            env::var("FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        ),
        diagnostics: env::var("POPUP_DIAGNOSTICS").map(|v| v == "1").unwrap_or(false),
    };

    run(service_fn(|event| handle_request(event, state.clone()))).await
}

/// Handle the incoming request
async fn handle_request(event: Request, state: LambdaState) -> Result<Response<Body>, Error> {
    let path = event.uri().path();

    // Handle both root path and the callback path
    if path == "/" || path == "/identity/callback" {
        handle_callback(event, state).await
    } else {
        Ok(Response::builder()
            .status(404)
            .body(Body::from("Not Found"))?)
    }
}

/// Handle the provider redirect landing in the popup
async fn handle_callback(event: Request, state: LambdaState) -> Result<Response<Body>, Error> {
    let params = event
        .uri()
        .query()
        .map(CallbackParams::from_query)
        .unwrap_or_default();

    let mut channel = PageChannel::new(state.diagnostics);
    let (envelope, outcome) = reconcile::run(
        params,
        state.fetcher.as_ref(),
        &mut channel,
        state.fetch_timeout,
    )
    .await;

    info!(kind = ?envelope.kind, ?outcome, "callback reconciled");

    Ok(Response::builder()
        .status(200)
        .header("content-type", "text/html; charset=utf-8")
        .body(Body::from(channel.into_page()))?)
}
