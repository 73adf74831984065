use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker identifying envelopes produced by this subsystem. Receivers must
/// check it before trusting any other field of a cross-window message.
pub const ENVELOPE_SOURCE: &str = "identity-verification";

/// Service variants the verification flow can be started for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceKind {
    #[serde(rename = "REGISTER")]
    Register,
    #[serde(rename = "FIND_ID")]
    FindId,
    #[serde(rename = "RESET_PASSWORD")]
    ResetPassword,
}

impl ServiceKind {
    /// Parses the wire value. Unknown values yield `None`; callers decide
    /// whether that is a hard rejection (initiation) or a degraded
    /// classification (callback).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "REGISTER" => Some(ServiceKind::Register),
            "FIND_ID" => Some(ServiceKind::FindId),
            "RESET_PASSWORD" => Some(ServiceKind::ResetPassword),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Register => "REGISTER",
            ServiceKind::FindId => "FIND_ID",
            ServiceKind::ResetPassword => "RESET_PASSWORD",
        }
    }
}

/// Raw query values carried by the provider redirect. Parsed once when the
/// callback route loads and immutable afterwards.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackParams {
    pub status: Option<String>,
    pub key: Option<String>,
    pub service_type: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub is_joined: Option<String>,
    pub found_id: Option<String>,
}

impl CallbackParams {
    /// Parses a raw query string. Used by frontends that do not go through
    /// the axum `Query` extractor (the lambda handler, the simulator).
    pub fn from_query(query: &str) -> Self {
        let mut params = CallbackParams::default();
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.into_owned();
            match name.as_ref() {
                "status" => params.status = Some(value),
                "key" => params.key = Some(value),
                "serviceType" => params.service_type = Some(value),
                "message" => params.message = Some(value),
                "error" => params.error = Some(value),
                "errorCode" => params.error_code = Some(value),
                "email" => params.email = Some(value),
                "username" => params.username = Some(value),
                "isJoined" => params.is_joined = Some(value),
                "foundId" => params.found_id = Some(value),
                _ => {}
            }
        }
        params
    }

    pub fn service_kind(&self) -> Option<ServiceKind> {
        self.service_type.as_deref().and_then(ServiceKind::parse)
    }

    /// Whether the redirect already marks the user as a pre-existing member
    pub fn joined(&self) -> bool {
        self.joined_flag().unwrap_or(false)
    }

    pub fn joined_flag(&self) -> Option<bool> {
        let raw = self.is_joined.as_deref()?;
        Some(raw.eq_ignore_ascii_case("true") || raw == "1")
    }

    /// Whether the redirect carries an explicit error parameter
    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|v| !v.is_empty())
            || self.error_code.as_deref().is_some_and(|v| !v.is_empty())
    }
}

/// Personal data returned by the provider for a newly verified user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub mobile_no: Option<String>,
    /// Opaque identity-correlation tokens issued by the provider
    pub ci: Option<String>,
    pub di: Option<String>,
    pub is_foreigner: Option<bool>,
}

/// Enriched verification record stored by the backend when the provider
/// notifies it out-of-band. Read at most once per popup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub verification_key: String,
    pub status: String,
    pub user_data: Option<UserData>,
    pub is_joined: Option<bool>,
    pub existing_username: Option<String>,
    pub message: Option<String>,
    pub error_code: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Reconciled outcome of one popup lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "OTHER")]
    Other,
}

/// The single message delivered to the opener window. Exactly one envelope
/// is produced per popup lifecycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub nice_service_type: Option<String>,
    /// Raw redirect status, passed through for the opener to branch on
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<UserData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_joined: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    /// Builds an envelope of the given kind with every redirect-carried
    /// field passed through. Fetch-derived fields are filled in by the
    /// reconciler afterwards.
    pub fn base(kind: EnvelopeKind, params: &CallbackParams) -> Self {
        Envelope {
            source: ENVELOPE_SOURCE.to_string(),
            kind,
            nice_service_type: params.service_kind().map(|k| k.as_str().to_string()),
            status: params.status.clone(),
            verification_key: params.key.clone(),
            user_data: None,
            error: None,
            error_code: params.error_code.clone(),
            email: params.email.clone(),
            is_joined: params.joined_flag(),
            username: params.username.clone(),
            found_id: params.found_id.clone(),
            message: params.message.clone(),
        }
    }
}
