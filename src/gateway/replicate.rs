use std::time::Duration;

use axum::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::poll::{poll_until_terminal, PollOutcome, RetryPolicy};
use super::{normalize_output, GatewayError, ModelGateway};
use crate::config::ReplicateConfig;

/// Gateway for Replicate-style prediction APIs. Creating a prediction with
/// `Prefer: wait` covers synchronous providers; anything still running when
/// the create call returns is polled to a terminal state.
pub struct ReplicateGateway {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    policy: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct CreatePrediction<'a> {
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    image: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Prediction {
    fn into_outcome(self) -> Result<PollOutcome<String>, GatewayError> {
        match self.status {
            PredictionStatus::Succeeded => {
                let output = self.output.ok_or(GatewayError::EmptyOutput)?;
                Ok(PollOutcome::Ready(normalize_output(&output)?))
            }
            PredictionStatus::Failed | PredictionStatus::Canceled => {
                let detail = match self.error {
                    Some(Value::String(s)) => s,
                    Some(other) => other.to_string(),
                    None => "unknown provider error".into(),
                };
                Ok(PollOutcome::Failed(detail))
            }
            PredictionStatus::Starting | PredictionStatus::Processing => Ok(PollOutcome::Pending),
        }
    }
}

impl ReplicateGateway {
    pub fn new(cfg: &ReplicateConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_token: cfg.api_token.clone(),
            policy: RetryPolicy {
                max_attempts: cfg.poll_max_attempts,
                initial_delay: Duration::from_millis(cfg.poll_initial_delay_ms),
                backoff_step: Duration::from_millis(cfg.poll_backoff_step_ms),
            },
        })
    }

    async fn read_prediction(resp: reqwest::Response) -> Result<Prediction, GatewayError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<Prediction>().await?)
    }

    async fn create_prediction(
        &self,
        model: &str,
        image_url: &str,
    ) -> Result<Prediction, GatewayError> {
        let url = format!("{}/v1/models/{}/predictions", self.base_url, model);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&CreatePrediction {
                input: PredictionInput { image: image_url },
            })
            .send()
            .await?;
        Self::read_prediction(resp).await
    }

    async fn fetch_prediction(&self, id: &str) -> Result<Prediction, GatewayError> {
        let url = format!("{}/v1/predictions/{}", self.base_url, id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        Self::read_prediction(resp).await
    }
}

#[async_trait]
impl ModelGateway for ReplicateGateway {
    #[instrument(skip(self), fields(model = %model))]
    async fn run(&self, model: &str, image_url: &str) -> Result<String, GatewayError> {
        let created = self.create_prediction(model, image_url).await?;
        let id = created.id.clone();
        debug!(prediction_id = %id, status = ?created.status, "prediction created");

        // Synchronous providers are already terminal here.
        match created.into_outcome()? {
            PollOutcome::Ready(url) => return Ok(url),
            PollOutcome::Failed(detail) => return Err(GatewayError::JobFailed(detail)),
            PollOutcome::Pending => {}
        }

        let result = poll_until_terminal(&self.policy, || {
            let id = id.clone();
            async move { self.fetch_prediction(&id).await?.into_outcome() }
        })
        .await;

        if let Err(GatewayError::Timeout { attempts }) = &result {
            warn!(prediction_id = %id, attempts, "prediction polling exhausted");
        }
        result
    }
}

#[cfg(test)]
mod prediction_tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> Prediction {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn succeeded_prediction_yields_url() {
        let p = parse(json!({
            "id": "job-1",
            "status": "succeeded",
            "output": ["https://cdn/r_B.png"]
        }));
        match p.into_outcome().unwrap() {
            PollOutcome::Ready(url) => assert_eq!(url, "https://cdn/r_B.png"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn succeeded_without_output_is_empty() {
        let p = parse(json!({"id": "job-1", "status": "succeeded"}));
        assert!(matches!(p.into_outcome(), Err(GatewayError::EmptyOutput)));
    }

    #[test]
    fn failed_prediction_carries_detail() {
        let p = parse(json!({
            "id": "job-1",
            "status": "failed",
            "error": "out of memory"
        }));
        match p.into_outcome().unwrap() {
            PollOutcome::Failed(detail) => assert!(detail.contains("out of memory")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn processing_prediction_is_pending() {
        let p = parse(json!({"id": "job-1", "status": "processing"}));
        assert!(matches!(p.into_outcome().unwrap(), PollOutcome::Pending));
    }
}
