//! Shared helpers for exercising the reconciliation flow in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};

use crate::common::channel::{ChannelError, OpenerChannel};
use crate::common::fetcher::{FetchError, ResultFetcher};
use crate::common::types::{Envelope, UserData, VerificationResult};

/// Canned user data matching the simulator's derivation scheme
pub fn sample_user_data() -> UserData {
    let (ci, di) = correlation_tokens("Kim", "19900101", "01012345678");
    UserData {
        name: Some("Kim".to_string()),
        birth_date: Some("19900101".to_string()),
        gender: Some("F".to_string()),
        mobile_no: Some("01012345678".to_string()),
        ci: Some(ci),
        di: Some(di),
        is_foreigner: Some(false),
    }
}

/// A stored result for a successful new-registration verification
pub fn register_result(verification_key: &str) -> VerificationResult {
    VerificationResult {
        verification_key: verification_key.to_string(),
        status: "SUCCESS".to_string(),
        user_data: Some(sample_user_data()),
        is_joined: Some(false),
        existing_username: None,
        message: None,
        error_code: None,
        verified_at: Some(chrono::Utc::now()),
    }
}

/// Derives opaque correlation tokens the way the simulator does
pub fn correlation_tokens(name: &str, birth_date: &str, mobile_no: &str) -> (String, String) {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(birth_date.as_bytes());
    hasher.update(mobile_no.as_bytes());
    let ci = BASE64.encode(hasher.finalize());

    let mut hasher = Sha256::new();
    hasher.update(mobile_no.as_bytes());
    let di = BASE64.encode(hasher.finalize());

    (ci, di)
}

#[derive(Clone, Debug, Default)]
pub struct ChannelRecord {
    pub delivered: Vec<Envelope>,
    pub closes: usize,
}

/// Channel fake that records every delivery and close. Clones share the
/// same record, so a test can keep one handle while the reconciler owns
/// another.
#[derive(Clone)]
pub struct RecordingChannel {
    inner: Arc<Mutex<ChannelRecord>>,
    reachable: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        RecordingChannel {
            inner: Arc::new(Mutex::new(ChannelRecord::default())),
            reachable: true,
        }
    }

    /// A channel whose opener is already gone: every send fails, closes
    /// still count.
    pub fn unreachable() -> Self {
        RecordingChannel {
            inner: Arc::new(Mutex::new(ChannelRecord::default())),
            reachable: false,
        }
    }

    pub fn record(&self) -> ChannelRecord {
        self.inner.lock().unwrap().clone()
    }
}

impl OpenerChannel for RecordingChannel {
    fn deliver(&mut self, envelope: &Envelope) -> Result<(), ChannelError> {
        if !self.reachable {
            return Err(ChannelError::OpenerUnreachable);
        }
        self.inner.lock().unwrap().delivered.push(envelope.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.inner.lock().unwrap().closes += 1;
    }
}

enum CannedFetch {
    Result(VerificationResult),
    Status(u16),
    Hang,
}

/// Fetcher fake returning a canned response and counting attempts
#[derive(Clone)]
pub struct StubFetcher {
    inner: Arc<StubInner>,
}

struct StubInner {
    canned: CannedFetch,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn result(result: VerificationResult) -> Self {
        Self::with(CannedFetch::Result(result))
    }

    pub fn status(code: u16) -> Self {
        Self::with(CannedFetch::Status(code))
    }

    /// Never resolves; for exercising the timeout bound
    pub fn hanging() -> Self {
        Self::with(CannedFetch::Hang)
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    fn with(canned: CannedFetch) -> Self {
        StubFetcher {
            inner: Arc::new(StubInner {
                canned,
                calls: AtomicUsize::new(0),
            }),
        }
    }
}

#[async_trait]
impl ResultFetcher for StubFetcher {
    async fn fetch(&self, _verification_key: &str) -> Result<VerificationResult, FetchError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        match &self.inner.canned {
            CannedFetch::Result(result) => Ok(result.clone()),
            CannedFetch::Status(code) => Err(FetchError::Status(
                reqwest::StatusCode::from_u16(*code).unwrap(),
            )),
            CannedFetch::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
