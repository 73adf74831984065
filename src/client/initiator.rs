use identity_verifier_service::common::initiate::{initiate, popup_features};
use identity_verifier_service::common::types::ServiceKind;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Service kind from the command line; unknown values are rejected
    // before any network call
    let service_arg = std::env::args().nth(1).unwrap_or_else(|| "REGISTER".to_string());
    let service = ServiceKind::parse(&service_arg).ok_or_else(|| {
        format!("Unknown service type: {service_arg} (expected REGISTER, FIND_ID or RESET_PASSWORD)")
    })?;

    // Backend URL from the command line or environment
    let backend_url = std::env::args()
        .nth(2)
        .or_else(|| std::env::var("BACKEND_API_URL").ok())
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    println!("Requesting {} verification payload from: {}", service.as_str(), backend_url);

    let client = reqwest::Client::new();
    let launch = initiate(service, &client, &backend_url).await?;

    // A browser shell opens the named window with these features and loads
    // the form document into it; here we write the document out instead
    let out_path = std::env::temp_dir().join("identity_verify_popup.html");
    std::fs::write(&out_path, &launch.form_document)?;

    println!("Popup window name: {}", launch.window_name);
    println!("Popup features: {}", popup_features(1920, 1080));
    println!("Provider form written to: {}", out_path.display());
    Ok(())
}
