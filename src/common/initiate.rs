//! Starting a verification: request the opaque payload from the backend and
//! build the provider submission for the popup window.
//!
//! The provider's endpoint and form field names are fixed by its contract
//! and reproduced verbatim; this module designs nothing on that side of the
//! boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::channel::escape_html;
use super::types::ServiceKind;

pub const PROVIDER_ENDPOINT_URL: &str =
    "https://nice.checkplus.co.kr/CheckPlusSafeModel/checkplus.cb";
pub const PROVIDER_METHOD_FIELD: &str = "m";
pub const PROVIDER_METHOD_VALUE: &str = "checkplusService";
pub const PROVIDER_PAYLOAD_FIELD: &str = "EncodeData";

pub const POPUP_NAME: &str = "identity_verify_popup";
pub const POPUP_WIDTH: u32 = 500;
pub const POPUP_HEIGHT: u32 = 550;

#[derive(Debug, Error)]
pub enum InitiateError {
    #[error("payload request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payload request returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("backend issued an empty payload")]
    EmptyPayload,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayloadRequest<'a> {
    service_type: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadResponse {
    encoded_payload: String,
}

/// Everything the opener needs to launch the popup: the window identity and
/// the document that auto-submits the provider form inside it.
#[derive(Clone, Debug)]
pub struct PopupLaunch {
    pub service: ServiceKind,
    pub window_name: String,
    pub form_document: String,
}

/// Requests the encoded payload for the chosen service and builds the popup
/// submission. If the backend call fails, no popup artifacts are produced;
/// the error is surfaced synchronously to the caller.
pub async fn initiate(
    service: ServiceKind,
    client: &reqwest::Client,
    backend_url: &str,
) -> Result<PopupLaunch, InitiateError> {
    let response = client
        .post(format!(
            "{}/api/identity/payload",
            backend_url.trim_end_matches('/')
        ))
        .json(&PayloadRequest {
            service_type: service.as_str(),
        })
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(InitiateError::Status(response.status()));
    }

    let payload: PayloadResponse = response.json().await?;
    if payload.encoded_payload.is_empty() {
        return Err(InitiateError::EmptyPayload);
    }

    Ok(PopupLaunch {
        service,
        window_name: POPUP_NAME.to_string(),
        form_document: provider_form(&payload.encoded_payload),
    })
}

/// Feature string for `window.open`, centering the proofing popup on the
/// opener's screen.
pub fn popup_features(screen_width: u32, screen_height: u32) -> String {
    let left = screen_width.saturating_sub(POPUP_WIDTH) / 2;
    let top = screen_height.saturating_sub(POPUP_HEIGHT) / 2;
    format!(
        "width={POPUP_WIDTH},height={POPUP_HEIGHT},left={left},top={top},resizable=no,scrollbars=yes"
    )
}

/// The popup's initial document: a form against the provider's endpoint,
/// submitted on load. Field names are provider-mandated.
fn provider_form(encoded_payload: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="ko">
<head>
<meta charset="utf-8">
<title>본인확인</title>
</head>
<body onload="document.forms[0].submit()">
<form method="post" action="{action}">
<input type="hidden" name="{method_field}" value="{method_value}">
<input type="hidden" name="{payload_field}" value="{payload}">
</form>
</body>
</html>
"#,
        action = PROVIDER_ENDPOINT_URL,
        method_field = PROVIDER_METHOD_FIELD,
        method_value = PROVIDER_METHOD_VALUE,
        payload_field = PROVIDER_PAYLOAD_FIELD,
        payload = escape_html(encoded_payload),
    )
}
