//! One-shot retrieval of the enriched verification result.
//!
//! Used only for the new-registration flow, where the redirect alone does
//! not carry the verified personal data. At most one attempt is made; the
//! future can be dropped if the popup is torn down first.

use async_trait::async_trait;
use thiserror::Error;

use super::types::VerificationResult;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("verification result request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("verification result request returned status {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait ResultFetcher: Send + Sync {
    async fn fetch(&self, verification_key: &str) -> Result<VerificationResult, FetchError>;
}

/// Fetches the stored result from the backend REST API
pub struct HttpResultFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpResultFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpResultFetcher {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn result_url(&self, verification_key: &str) -> String {
        format!(
            "{}/api/identity/results/{}",
            self.base_url.trim_end_matches('/'),
            verification_key
        )
    }
}

#[async_trait]
impl ResultFetcher for HttpResultFetcher {
    async fn fetch(&self, verification_key: &str) -> Result<VerificationResult, FetchError> {
        let response = self
            .client
            .get(self.result_url(verification_key))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        Ok(response.json::<VerificationResult>().await?)
    }
}
