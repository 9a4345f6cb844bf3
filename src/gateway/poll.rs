use std::future::Future;
use std::time::Duration;

use super::GatewayError;

/// Bounded polling schedule for asynchronous provider jobs.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Added on top of `initial_delay` once per completed attempt
    /// (linear backoff).
    pub backoff_step: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay + self.backoff_step * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_delay: Duration::from_millis(1500),
            backoff_step: Duration::from_millis(500),
        }
    }
}

/// One observation of a remote job.
#[derive(Debug)]
pub enum PollOutcome<T> {
    Pending,
    Ready(T),
    Failed(String),
}

/// Poll `fetch` until the job reaches a terminal state or the policy is
/// exhausted. Performs exactly one fetch per attempt and sleeps only
/// between attempts, so a job that is ready on attempt N costs N polls.
pub async fn poll_until_terminal<T, F, Fut>(
    policy: &RetryPolicy,
    mut fetch: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollOutcome<T>, GatewayError>>,
{
    for attempt in 0..policy.max_attempts {
        match fetch().await? {
            PollOutcome::Ready(value) => return Ok(value),
            PollOutcome::Failed(detail) => return Err(GatewayError::JobFailed(detail)),
            PollOutcome::Pending => {
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }
    Err(GatewayError::Timeout {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod poll_tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            backoff_step: Duration::from_millis(1),
        }
    }

    #[test]
    fn delay_grows_linearly() {
        let p = RetryPolicy {
            max_attempts: 30,
            initial_delay: Duration::from_millis(1500),
            backoff_step: Duration::from_millis(500),
        };
        assert_eq!(p.delay_for(0), Duration::from_millis(1500));
        assert_eq!(p.delay_for(1), Duration::from_millis(2000));
        assert_eq!(p.delay_for(4), Duration::from_millis(3500));
    }

    #[tokio::test]
    async fn ready_on_nth_attempt_costs_n_polls() {
        let calls = AtomicU32::new(0);
        let out = poll_until_terminal(&fast_policy(30), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 6 {
                    Ok(PollOutcome::Pending)
                } else {
                    Ok(PollOutcome::Ready("https://x/result.jpg".to_string()))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, "https://x/result.jpg");
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn never_terminal_times_out() {
        let calls = AtomicU32::new(0);
        let err = poll_until_terminal::<String, _, _>(&fast_policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(PollOutcome::Pending) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { attempts: 5 }));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn failed_job_stops_immediately() {
        let calls = AtomicU32::new(0);
        let err = poll_until_terminal::<String, _, _>(&fast_policy(30), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(PollOutcome::Failed("NSFW content detected".to_string())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::JobFailed(d) if d.contains("NSFW")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_error_propagates() {
        let err = poll_until_terminal::<String, _, _>(&fast_policy(3), || async {
            Err(GatewayError::RequestFailed {
                status: 500,
                body: "boom".into(),
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::RequestFailed { status: 500, .. }));
    }
}
