use crate::model::SubsError;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Download subscription text. `insecure` skips certificate validation;
/// plenty of subscription servers run on self-signed hosts and the panel
/// operator opts in explicitly.
pub async fn fetch_subscription(url: &str, insecure: bool) -> Result<String, SubsError> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .danger_accept_invalid_certs(insecure)
        .build()
        .map_err(|e| SubsError::Fetch(e.to_string()))?;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| SubsError::Fetch(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(SubsError::Fetch(format!("HTTP status: {}", resp.status())));
    }
    resp.text().await.map_err(|e| SubsError::Fetch(e.to_string()))
}
