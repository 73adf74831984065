//! Closed status taxonomy for the provider redirect.
//!
//! Each service variant enumerates its own legal status tokens, so the
//! mapping to an outcome is an exhaustive match instead of a chain of string
//! comparisons with a default arm. The provider has been observed sending
//! both `SUCCESS` and `success`; that token alone matches case-insensitively.

use super::types::ServiceKind;

/// What a recognized status means for the envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Success,
    Fail,
    /// Terminal but neither success nor failure; the opener branches on the
    /// raw status itself
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterStatus {
    Success,
    Fail,
    Error,
}

impl RegisterStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("SUCCESS") {
            return Some(RegisterStatus::Success);
        }
        match raw {
            "fail" => Some(RegisterStatus::Fail),
            "ERROR" => Some(RegisterStatus::Error),
            _ => None,
        }
    }

    pub fn disposition(self) -> Disposition {
        match self {
            RegisterStatus::Success => Disposition::Success,
            RegisterStatus::Fail => Disposition::Fail,
            RegisterStatus::Error => Disposition::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindIdStatus {
    Success,
    /// The found username was sent to the member's email
    IdSent,
    Fail,
    AccountNotFound,
    Error,
}

impl FindIdStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("SUCCESS") {
            return Some(FindIdStatus::Success);
        }
        match raw {
            "id_sent" => Some(FindIdStatus::IdSent),
            "fail" => Some(FindIdStatus::Fail),
            "ACCOUNT_NOT_FOUND" => Some(FindIdStatus::AccountNotFound),
            "ERROR" => Some(FindIdStatus::Error),
            _ => None,
        }
    }

    pub fn disposition(self) -> Disposition {
        match self {
            FindIdStatus::Success | FindIdStatus::IdSent => Disposition::Success,
            FindIdStatus::Fail => Disposition::Fail,
            FindIdStatus::AccountNotFound | FindIdStatus::Error => Disposition::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetPasswordStatus {
    Success,
    /// A reset link was sent to the member's email
    PasswordResetSent,
    Fail,
    AccountNotFound,
    Error,
}

impl ResetPasswordStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("SUCCESS") {
            return Some(ResetPasswordStatus::Success);
        }
        match raw {
            "password_reset_sent" => Some(ResetPasswordStatus::PasswordResetSent),
            "fail" => Some(ResetPasswordStatus::Fail),
            "ACCOUNT_NOT_FOUND" => Some(ResetPasswordStatus::AccountNotFound),
            "ERROR" => Some(ResetPasswordStatus::Error),
            _ => None,
        }
    }

    pub fn disposition(self) -> Disposition {
        match self {
            ResetPasswordStatus::Success | ResetPasswordStatus::PasswordResetSent => {
                Disposition::Success
            }
            ResetPasswordStatus::Fail => Disposition::Fail,
            ResetPasswordStatus::AccountNotFound | ResetPasswordStatus::Error => Disposition::Other,
        }
    }
}

/// Status token bound to the service variant it is legal for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceStatus {
    Register(RegisterStatus),
    FindId(FindIdStatus),
    ResetPassword(ResetPasswordStatus),
}

impl ServiceStatus {
    pub fn parse(kind: ServiceKind, raw: &str) -> Option<Self> {
        match kind {
            ServiceKind::Register => RegisterStatus::parse(raw).map(ServiceStatus::Register),
            ServiceKind::FindId => FindIdStatus::parse(raw).map(ServiceStatus::FindId),
            ServiceKind::ResetPassword => {
                ResetPasswordStatus::parse(raw).map(ServiceStatus::ResetPassword)
            }
        }
    }

    pub fn disposition(self) -> Disposition {
        match self {
            ServiceStatus::Register(status) => status.disposition(),
            ServiceStatus::FindId(status) => status.disposition(),
            ServiceStatus::ResetPassword(status) => status.disposition(),
        }
    }
}

/// `true` for the success token that gates the result fetch
pub fn is_success_token(raw: &str) -> bool {
    raw.eq_ignore_ascii_case("SUCCESS")
}

/// Classification for redirects whose service type is missing or unknown:
/// the union of every recognized token.
pub fn classify_generic(raw: &str) -> Option<Disposition> {
    if is_success_token(raw) {
        return Some(Disposition::Success);
    }
    match raw {
        "id_sent" | "password_reset_sent" => Some(Disposition::Success),
        "fail" => Some(Disposition::Fail),
        "ACCOUNT_NOT_FOUND" | "ERROR" => Some(Disposition::Other),
        _ => None,
    }
}

/// Classifies a raw status for an optionally-known service variant.
/// `None` means the token is not recognized at all.
pub fn classify(kind: Option<ServiceKind>, raw: &str) -> Option<Disposition> {
    match kind {
        Some(kind) => ServiceStatus::parse(kind, raw).map(ServiceStatus::disposition),
        None => classify_generic(raw),
    }
}
