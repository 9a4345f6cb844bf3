use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body for POST /restore and POST /pipeline. Identity comes from the
/// bearer token, never from the body.
#[derive(Debug, Deserialize)]
pub struct PipelineRequest {
    pub image_url: String,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub ok: bool,
    pub id: Uuid,
    pub input_url: String,
    pub restored_url: String,
}

#[derive(Debug, Serialize)]
pub struct PipelineResponse {
    pub ok: bool,
    pub id: Uuid,
    pub input_url: String,
    pub restored_url: String,
    pub colorized_url: Option<String>,
    /// Set when colorization failed but the restored image is still usable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub input_url: String,
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn warning_omitted_when_absent() {
        let resp = PipelineResponse {
            ok: true,
            id: Uuid::new_v4(),
            input_url: "https://fake.local/in.jpg".into(),
            restored_url: "https://fake.local/r.jpg".into(),
            colorized_url: Some("https://fake.local/c.jpg".into()),
            warning: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("warning"));
    }

    #[test]
    fn warning_present_on_partial_success() {
        let resp = PipelineResponse {
            ok: true,
            id: Uuid::new_v4(),
            input_url: "https://fake.local/in.jpg".into(),
            restored_url: "https://fake.local/r.jpg".into(),
            colorized_url: None,
            warning: Some("colorize stage failed".into()),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"warning\":\"colorize stage failed\""));
        assert!(json.contains("\"colorized_url\":null"));
    }
}
