use axum::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod poll;
pub mod replicate;

pub use replicate::ReplicateGateway;

/// Errors from the hosted inference provider.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },
    #[error("provider job did not finish after {attempts} polls")]
    Timeout { attempts: u32 },
    #[error("provider job failed: {0}")]
    JobFailed(String),
    #[error("provider returned no output")]
    EmptyOutput,
    #[error("provider call failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Abstraction over a hosted model endpoint. Implementations issue the
/// outbound HTTP calls and hand back one de-referenced output URL; they
/// never touch storage or the quota ledger.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn run(&self, model: &str, image_url: &str) -> Result<String, GatewayError>;
}

/// Collapse the provider output shapes seen in the wild (bare string,
/// array of URLs, object with a `url` field) into a single URL.
pub fn normalize_output(output: &Value) -> Result<String, GatewayError> {
    let url = match output {
        Value::String(s) => s.clone(),
        Value::Array(items) => match items.first() {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(GatewayError::EmptyOutput),
        },
        Value::Object(map) => match map.get("url") {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(GatewayError::EmptyOutput),
        },
        _ => return Err(GatewayError::EmptyOutput),
    };
    if url.is_empty() {
        return Err(GatewayError::EmptyOutput);
    }
    Ok(url)
}

#[cfg(test)]
mod normalize_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_string() {
        let out = normalize_output(&json!("https://cdn/restored_A.png")).unwrap();
        assert_eq!(out, "https://cdn/restored_A.png");
    }

    #[test]
    fn array_takes_first() {
        let out = normalize_output(&json!(["https://cdn/r_B.png", "https://cdn/alt.png"])).unwrap();
        assert_eq!(out, "https://cdn/r_B.png");
    }

    #[test]
    fn object_with_url() {
        let out = normalize_output(&json!({"url": "https://cdn/c_B.png"})).unwrap();
        assert_eq!(out, "https://cdn/c_B.png");
    }

    #[test]
    fn equivalent_payloads_normalize_identically() {
        let a = normalize_output(&json!("https://x/r.jpg")).unwrap();
        let b = normalize_output(&json!(["https://x/r.jpg"])).unwrap();
        let c = normalize_output(&json!({"url": "https://x/r.jpg"})).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn empty_cases_fail() {
        assert!(matches!(
            normalize_output(&json!("")),
            Err(GatewayError::EmptyOutput)
        ));
        assert!(matches!(
            normalize_output(&json!([])),
            Err(GatewayError::EmptyOutput)
        ));
        assert!(matches!(
            normalize_output(&json!({"other": 1})),
            Err(GatewayError::EmptyOutput)
        ));
        assert!(matches!(
            normalize_output(&json!(null)),
            Err(GatewayError::EmptyOutput)
        ));
        assert!(matches!(
            normalize_output(&json!(42)),
            Err(GatewayError::EmptyOutput)
        ));
    }
}
