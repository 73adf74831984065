//! Reconciliation of a provider redirect into a single message envelope.
//!
//! One popup lifecycle moves through
//! `Parsing -> (WaitingOnFetch | Ready) -> Delivering -> Closed`. The split
//! into [`Reconciler::next`] and [`deliver`] makes the race rule structural:
//! no envelope value exists while a required fetch is still pending, so
//! nothing can be delivered early, and `deliver` consumes the envelope so
//! nothing can be delivered twice.

use std::time::Duration;

use tracing::warn;

use super::channel::OpenerChannel;
use super::fetcher::{FetchError, ResultFetcher};
use super::status::{self, Disposition};
use super::types::{CallbackParams, Envelope, EnvelopeKind, ServiceKind, VerificationResult};

/// Substituted when a failure carries no message of its own
pub const GENERIC_FAILURE_MESSAGE: &str = "본인확인에 실패했습니다.";

/// Diagnostic codes carried in FAIL envelopes
pub mod error_codes {
    pub const FETCH_ERROR: &str = "FETCH_ERROR";
    pub const FETCH_TIMEOUT: &str = "FETCH_TIMEOUT";
    pub const MISSING_DATA: &str = "MISSING_DATA";
    pub const INVALID_CALLBACK_STATUS: &str = "INVALID_CALLBACK_STATUS";
}

/// Outcome of stepping out of the parsing state
#[derive(Debug)]
pub enum Step {
    /// The redirect alone cannot settle the outcome; the stored result must
    /// be fetched before anything may be delivered.
    WaitingOnFetch { verification_key: String },
    /// The envelope is fully determined by the redirect.
    Ready(Envelope),
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The opener was gone or the send failed; reported locally only.
    OpenerUnreachable,
}

pub struct Reconciler {
    params: CallbackParams,
}

impl Reconciler {
    pub fn new(params: CallbackParams) -> Self {
        Reconciler { params }
    }

    /// Decides whether the stored result must be fetched first. The fetch
    /// applies only to a successful new-registration redirect: REGISTER,
    /// key present, success status, no error parameter, and not already a
    /// member. A joined member's username arrives in the redirect itself.
    pub fn next(&self) -> Step {
        match self.fetch_key() {
            Some(key) => Step::WaitingOnFetch {
                verification_key: key.to_string(),
            },
            None => Step::Ready(self.classify_direct()),
        }
    }

    /// Settles a pending fetch into the final envelope.
    pub fn settle_fetch(&self, outcome: Result<VerificationResult, FetchError>) -> Envelope {
        match outcome {
            Err(err) => self.failure(error_codes::FETCH_ERROR, err.to_string()),
            Ok(result) => match result.user_data {
                // server-side inconsistency: a success record without data
                None => self.failure(
                    error_codes::MISSING_DATA,
                    "verification result carried no user data",
                ),
                Some(user_data) => {
                    let mut envelope = Envelope::base(EnvelopeKind::Success, &self.params);
                    envelope.user_data = Some(user_data);
                    envelope.is_joined = Some(false);
                    if envelope.message.is_none() {
                        envelope.message = result.message;
                    }
                    envelope
                }
            },
        }
    }

    /// Fallback when the fetch never settles within the bound.
    pub fn fetch_timed_out(&self) -> Envelope {
        self.failure(
            error_codes::FETCH_TIMEOUT,
            "verification result was not available in time",
        )
    }

    fn fetch_key(&self) -> Option<&str> {
        let params = &self.params;
        if params.service_kind() != Some(ServiceKind::Register) {
            return None;
        }
        if params.has_error() || params.joined() {
            return None;
        }
        if !status::is_success_token(params.status.as_deref()?) {
            return None;
        }
        params.key.as_deref()
    }

    fn classify_direct(&self) -> Envelope {
        let params = &self.params;

        // explicit error parameters override whatever the status claims
        if params.has_error() {
            let message = params
                .error
                .clone()
                .or_else(|| params.message.clone())
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
            let mut envelope = Envelope::base(EnvelopeKind::Fail, params);
            envelope.error = Some(message);
            return envelope;
        }

        let Some(raw) = params.status.as_deref() else {
            return self.invalid_status();
        };

        match status::classify(params.service_kind(), raw) {
            Some(Disposition::Success) => Envelope::base(EnvelopeKind::Success, params),
            Some(Disposition::Fail) => {
                let mut envelope = Envelope::base(EnvelopeKind::Fail, params);
                envelope.error = Some(
                    params
                        .message
                        .clone()
                        .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
                );
                envelope
            }
            Some(Disposition::Other) => Envelope::base(EnvelopeKind::Other, params),
            None => self.invalid_status(),
        }
    }

    fn invalid_status(&self) -> Envelope {
        self.failure(
            error_codes::INVALID_CALLBACK_STATUS,
            GENERIC_FAILURE_MESSAGE,
        )
    }

    fn failure(&self, code: &str, message: impl Into<String>) -> Envelope {
        let mut envelope = Envelope::base(EnvelopeKind::Fail, &self.params);
        envelope.error_code = Some(code.to_string());
        envelope.error = Some(message.into());
        envelope
    }
}

/// Hands the envelope to the channel and closes it. Consuming the envelope
/// here keeps the delivery single-shot; the close happens whether or not
/// the send reached an opener.
pub fn deliver<C>(envelope: Envelope, channel: &mut C) -> (Envelope, DeliveryOutcome)
where
    C: OpenerChannel + ?Sized,
{
    let outcome = match channel.deliver(&envelope) {
        Ok(()) => DeliveryOutcome::Delivered,
        Err(err) => {
            warn!("envelope did not reach the opener: {err}");
            DeliveryOutcome::OpenerUnreachable
        }
    };
    channel.close();
    (envelope, outcome)
}

/// Drives one full popup lifecycle: parse, fetch if required (bounded),
/// deliver once, close once.
pub async fn run<F, C>(
    params: CallbackParams,
    fetcher: &F,
    channel: &mut C,
    fetch_timeout: Duration,
) -> (Envelope, DeliveryOutcome)
where
    F: ResultFetcher + ?Sized,
    C: OpenerChannel + ?Sized,
{
    let reconciler = Reconciler::new(params);

    let envelope = match reconciler.next() {
        Step::Ready(envelope) => envelope,
        Step::WaitingOnFetch { verification_key } => {
            match tokio::time::timeout(fetch_timeout, fetcher.fetch(&verification_key)).await {
                Ok(outcome) => reconciler.settle_fetch(outcome),
                Err(_) => {
                    warn!(verification_key, "verification result fetch timed out");
                    reconciler.fetch_timed_out()
                }
            }
        }
    };

    deliver(envelope, channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        register_result, sample_user_data, RecordingChannel, StubFetcher,
    };
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use tokio::sync::oneshot;
    use tokio::sync::Mutex;

    const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

    fn params(query: &str) -> CallbackParams {
        CallbackParams::from_query(query)
    }

    #[test]
    fn test_register_success_waits_on_fetch() {
        let reconciler = Reconciler::new(params("serviceType=REGISTER&status=SUCCESS&key=abc123"));
        assert_matches!(
            reconciler.next(),
            Step::WaitingOnFetch { verification_key } if verification_key == "abc123"
        );
    }

    #[test]
    fn test_lowercase_success_also_waits_on_fetch() {
        let reconciler = Reconciler::new(params("serviceType=REGISTER&status=success&key=abc123"));
        assert_matches!(reconciler.next(), Step::WaitingOnFetch { .. });
    }

    #[test]
    fn test_joined_member_short_circuits_fetch() {
        let reconciler = Reconciler::new(params(
            "serviceType=REGISTER&status=SUCCESS&key=abc123&isJoined=true&username=kim01",
        ));

        let envelope = assert_matches!(reconciler.next(), Step::Ready(envelope) => envelope);
        assert_eq!(envelope.kind, EnvelopeKind::Success);
        assert_eq!(envelope.is_joined, Some(true));
        assert_eq!(envelope.username.as_deref(), Some("kim01"));
        assert!(envelope.user_data.is_none());
    }

    #[test]
    fn test_error_parameter_skips_fetch_and_fails() {
        let reconciler = Reconciler::new(params(
            "serviceType=REGISTER&status=SUCCESS&key=abc123&errorCode=E999",
        ));

        let envelope = assert_matches!(reconciler.next(), Step::Ready(envelope) => envelope);
        assert_eq!(envelope.kind, EnvelopeKind::Fail);
        assert_eq!(envelope.error_code.as_deref(), Some("E999"));
        assert_eq!(envelope.error.as_deref(), Some(GENERIC_FAILURE_MESSAGE));
    }

    #[test]
    fn test_missing_key_classifies_directly() {
        let reconciler = Reconciler::new(params("serviceType=REGISTER&status=SUCCESS"));
        assert_matches!(reconciler.next(), Step::Ready(_));
    }

    #[test]
    fn test_find_id_sent_classifies_without_fetch() {
        let reconciler =
            Reconciler::new(params("serviceType=FIND_ID&status=id_sent&email=a%40b.com"));

        let envelope = assert_matches!(reconciler.next(), Step::Ready(envelope) => envelope);
        assert_eq!(envelope.kind, EnvelopeKind::Success);
        assert_eq!(envelope.status.as_deref(), Some("id_sent"));
        assert_eq!(envelope.email.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn test_reset_password_fail_preserves_message() {
        let reconciler = Reconciler::new(params(
            "serviceType=RESET_PASSWORD&status=fail&message=%EB%B3%B8%EC%9D%B8%ED%99%95%EC%9D%B8%20%EC%8B%A4%ED%8C%A8",
        ));

        let envelope = assert_matches!(reconciler.next(), Step::Ready(envelope) => envelope);
        assert_eq!(envelope.kind, EnvelopeKind::Fail);
        assert_eq!(envelope.error.as_deref(), Some("본인확인 실패"));
    }

    #[test]
    fn test_account_not_found_is_other() {
        let reconciler =
            Reconciler::new(params("serviceType=FIND_ID&status=ACCOUNT_NOT_FOUND"));

        let envelope = assert_matches!(reconciler.next(), Step::Ready(envelope) => envelope);
        assert_eq!(envelope.kind, EnvelopeKind::Other);
        assert_eq!(envelope.status.as_deref(), Some("ACCOUNT_NOT_FOUND"));
    }

    #[test]
    fn test_unknown_status_is_invalid() {
        for query in [
            "serviceType=FIND_ID",
            "serviceType=FIND_ID&status=pending",
            "serviceType=NOT_A_SERVICE&status=whatever",
        ] {
            let reconciler = Reconciler::new(params(query));
            let envelope = assert_matches!(reconciler.next(), Step::Ready(envelope) => envelope);
            assert_eq!(envelope.kind, EnvelopeKind::Fail);
            assert_eq!(
                envelope.error_code.as_deref(),
                Some(error_codes::INVALID_CALLBACK_STATUS)
            );
        }
    }

    #[test]
    fn test_unknown_service_type_still_classifies() {
        let reconciler = Reconciler::new(params("serviceType=NOT_A_SERVICE&status=SUCCESS"));
        let envelope = assert_matches!(reconciler.next(), Step::Ready(envelope) => envelope);
        assert_eq!(envelope.kind, EnvelopeKind::Success);
        assert!(envelope.nice_service_type.is_none());
    }

    #[test]
    fn test_settle_fetch_success_copies_user_data() {
        let reconciler = Reconciler::new(params("serviceType=REGISTER&status=SUCCESS&key=abc123"));
        let envelope = reconciler.settle_fetch(Ok(register_result("abc123")));

        assert_eq!(envelope.kind, EnvelopeKind::Success);
        assert_eq!(envelope.is_joined, Some(false));
        assert_eq!(envelope.user_data, Some(sample_user_data()));
        assert_eq!(envelope.verification_key.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_settle_fetch_error_preserves_message() {
        let reconciler = Reconciler::new(params("serviceType=REGISTER&status=SUCCESS&key=abc123"));
        let error = FetchError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let message = error.to_string();
        let envelope = reconciler.settle_fetch(Err(error));

        assert_eq!(envelope.kind, EnvelopeKind::Fail);
        assert_eq!(envelope.error_code.as_deref(), Some(error_codes::FETCH_ERROR));
        assert_eq!(envelope.error.as_deref(), Some(message.as_str()));
    }

    #[test]
    fn test_settle_fetch_without_user_data_is_missing_data() {
        let reconciler = Reconciler::new(params("serviceType=REGISTER&status=SUCCESS&key=abc123"));
        let mut result = register_result("abc123");
        result.user_data = None;
        let envelope = reconciler.settle_fetch(Ok(result));

        assert_eq!(envelope.kind, EnvelopeKind::Fail);
        assert_eq!(
            envelope.error_code.as_deref(),
            Some(error_codes::MISSING_DATA)
        );
    }

    #[tokio::test]
    async fn test_run_delivers_and_closes_exactly_once() {
        let fetcher = StubFetcher::result(register_result("abc123"));
        let channel = RecordingChannel::new();
        let mut handle = channel.clone();

        let (envelope, outcome) = run(
            params("serviceType=REGISTER&status=SUCCESS&key=abc123"),
            &fetcher,
            &mut handle,
            FETCH_TIMEOUT,
        )
        .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(envelope.kind, EnvelopeKind::Success);
        let record = channel.record();
        assert_eq!(record.delivered.len(), 1);
        assert_eq!(record.closes, 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_run_skips_fetch_for_non_register() {
        let fetcher = StubFetcher::status(500);
        let channel = RecordingChannel::new();
        let mut handle = channel.clone();

        let (envelope, _) = run(
            params("serviceType=FIND_ID&status=id_sent&email=a%40b.com"),
            &fetcher,
            &mut handle,
            FETCH_TIMEOUT,
        )
        .await;

        assert_eq!(envelope.kind, EnvelopeKind::Success);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_skips_fetch_for_joined_member() {
        let fetcher = StubFetcher::status(500);
        let channel = RecordingChannel::new();
        let mut handle = channel.clone();

        let (envelope, _) = run(
            params("serviceType=REGISTER&status=SUCCESS&key=abc123&isJoined=true&username=kim01"),
            &fetcher,
            &mut handle,
            FETCH_TIMEOUT,
        )
        .await;

        assert_eq!(envelope.kind, EnvelopeKind::Success);
        assert_eq!(envelope.is_joined, Some(true));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_times_out_into_fail_envelope() {
        let fetcher = StubFetcher::hanging();
        let channel = RecordingChannel::new();
        let mut handle = channel.clone();

        let (envelope, outcome) = run(
            params("serviceType=REGISTER&status=SUCCESS&key=abc123"),
            &fetcher,
            &mut handle,
            Duration::from_millis(20),
        )
        .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(envelope.kind, EnvelopeKind::Fail);
        assert_eq!(
            envelope.error_code.as_deref(),
            Some(error_codes::FETCH_TIMEOUT)
        );
        // the popup still closed
        assert_eq!(channel.record().closes, 1);
    }

    #[tokio::test]
    async fn test_run_closes_even_when_opener_is_gone() {
        let fetcher = StubFetcher::status(500);
        let channel = RecordingChannel::unreachable();
        let mut handle = channel.clone();

        let (_, outcome) = run(
            params("serviceType=FIND_ID&status=id_sent"),
            &fetcher,
            &mut handle,
            FETCH_TIMEOUT,
        )
        .await;

        assert_eq!(outcome, DeliveryOutcome::OpenerUnreachable);
        let record = channel.record();
        assert!(record.delivered.is_empty());
        assert_eq!(record.closes, 1);
    }

    /// Fetcher that resolves only when the test fires its gate
    struct GatedFetcher {
        rx: Mutex<Option<oneshot::Receiver<VerificationResult>>>,
    }

    #[async_trait]
    impl ResultFetcher for GatedFetcher {
        async fn fetch(&self, _key: &str) -> Result<VerificationResult, FetchError> {
            let rx = self.rx.lock().await.take().expect("fetch called once");
            Ok(rx.await.expect("gate dropped"))
        }
    }

    #[tokio::test]
    async fn test_no_delivery_before_fetch_settles() {
        let (tx, rx) = oneshot::channel();
        let fetcher = GatedFetcher {
            rx: Mutex::new(Some(rx)),
        };
        let channel = RecordingChannel::new();
        let mut handle = channel.clone();
        let request = params("serviceType=REGISTER&status=SUCCESS&key=abc123");

        let task = tokio::spawn(async move {
            run(request, &fetcher, &mut handle, FETCH_TIMEOUT).await
        });

        // the reconciler is suspended on the fetch; nothing delivered yet
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(channel.record().delivered.is_empty());
        assert_eq!(channel.record().closes, 0);

        tx.send(register_result("abc123")).unwrap();
        let (envelope, outcome) = task.await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(envelope.kind, EnvelopeKind::Success);
        let record = channel.record();
        assert_eq!(record.delivered.len(), 1);
        assert_eq!(record.closes, 1);
    }

    #[test]
    fn test_run_with_block_on_driver() {
        // the driver has no runtime requirements beyond a timer
        let fetcher = StubFetcher::status(404);
        let channel = RecordingChannel::new();
        let mut handle = channel.clone();

        let (envelope, _) = tokio_test::block_on(run(
            params("serviceType=REGISTER&status=SUCCESS&key=abc123"),
            &fetcher,
            &mut handle,
            FETCH_TIMEOUT,
        ));

        assert_eq!(envelope.kind, EnvelopeKind::Fail);
        assert_eq!(envelope.error_code.as_deref(), Some(error_codes::FETCH_ERROR));
        assert_eq!(channel.record().delivered.len(), 1);
    }
}
