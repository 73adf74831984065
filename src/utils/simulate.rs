use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use identity_verifier_service::common::types::{UserData, VerificationResult};

// Mints a provider-style redirect against a local callback service, for
// exercising the popup flow without the real provider round trip.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let scenario = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "register-new".to_string());
    let callback_base = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "http://localhost:3000".to_string());

    let key = Uuid::new_v4().to_string();
    let mut url = Url::parse(&callback_base)?;
    url.set_path("/identity/callback");

    match scenario.as_str() {
        "register-new" => {
            url.query_pairs_mut()
                .append_pair("serviceType", "REGISTER")
                .append_pair("status", "SUCCESS")
                .append_pair("key", &key);
        }
        "register-joined" => {
            url.query_pairs_mut()
                .append_pair("serviceType", "REGISTER")
                .append_pair("status", "SUCCESS")
                .append_pair("key", &key)
                .append_pair("isJoined", "true")
                .append_pair("username", "kim01");
        }
        "find-id" => {
            url.query_pairs_mut()
                .append_pair("serviceType", "FIND_ID")
                .append_pair("status", "id_sent")
                .append_pair("email", "member@example.com");
        }
        "reset-password" => {
            url.query_pairs_mut()
                .append_pair("serviceType", "RESET_PASSWORD")
                .append_pair("status", "password_reset_sent")
                .append_pair("email", "member@example.com");
        }
        "failure" => {
            url.query_pairs_mut()
                .append_pair("serviceType", "REGISTER")
                .append_pair("status", "fail")
                .append_pair("message", "본인확인에 실패했습니다.");
        }
        other => {
            return Err(format!(
                "Unknown scenario: {other} (expected register-new, register-joined, find-id, reset-password or failure)"
            )
            .into());
        }
    }

    println!("Callback URL: {url}");

    if scenario == "register-new" {
        // what the backend would have stored under the key before the
        // provider redirected
        let result = stored_result(&key);
        println!("Stored result: {}", serde_json::to_string_pretty(&result)?);
    }

    Ok(())
}

fn stored_result(verification_key: &str) -> VerificationResult {
    let name = "김민준";
    let birth_date = "19900101";
    let mobile_no = random_mobile();
    let (ci, di) = correlation_tokens(name, birth_date, &mobile_no);

    VerificationResult {
        verification_key: verification_key.to_string(),
        status: "SUCCESS".to_string(),
        user_data: Some(UserData {
            name: Some(name.to_string()),
            birth_date: Some(birth_date.to_string()),
            gender: Some("M".to_string()),
            mobile_no: Some(mobile_no),
            ci: Some(ci),
            di: Some(di),
            is_foreigner: Some(false),
        }),
        is_joined: Some(false),
        existing_username: None,
        message: None,
        error_code: None,
        verified_at: Some(chrono::Utc::now()),
    }
}

/// Derives stable opaque correlation tokens from the generated identity,
/// the way the provider derives its duplication-check values.
fn correlation_tokens(name: &str, birth_date: &str, mobile_no: &str) -> (String, String) {
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

fn random_mobile() -> String {
    let mut rng = rand::thread_rng();
    format!("010{:08}", rng.gen_range(0..100_000_000u32))
}
