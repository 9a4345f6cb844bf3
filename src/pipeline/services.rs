use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::history::repo::{HistoryRecord, HistoryStatus};
use crate::profiles::repo::{Profile, UsageOutcome};
use crate::relay::{self, Stage};
use crate::state::AppState;

/// Result of one pipeline invocation.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub record_id: Uuid,
    pub input_url: String,
    pub restored_url: String,
    pub colorized_url: Option<String>,
    /// Upstream detail when stage 2 failed but stage 1 survived.
    pub warning: Option<String>,
}

pub(crate) fn validate_image_url(image_url: &str) -> Result<(), ApiError> {
    let trimmed = image_url.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidRequest("image_url is required".into()));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ApiError::InvalidRequest(
            "image_url must be an http(s) URL".into(),
        ));
    }
    Ok(())
}

/// The one entry point composing gateway, relay, journal and ledger.
///
/// Ordering per invocation: entitlement → restore → relay → (colorize →
/// relay) → usage. Committed steps are never rolled back; any stage error
/// marks the record failed (best effort) and surfaces the upstream detail.
#[instrument(skip(state), fields(user_id = %user_id, colorize))]
pub async fn run_pipeline(
    state: &AppState,
    user_id: Uuid,
    image_url: &str,
    colorize: bool,
) -> Result<PipelineOutcome, ApiError> {
    validate_image_url(image_url)?;

    // Fail fast before any provider cost, and before a history row exists.
    let profile = Profile::find(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    if !profile.is_allowed(state.config.trial_limit) {
        info!(trial_count = profile.trial_count, "trial limit reached");
        return Err(ApiError::TrialLimitReached);
    }

    let record = HistoryRecord::insert(&state.db, user_id, image_url).await?;

    // Stage 1: restore.
    let (restored_url, restored_from) = match run_stage(
        state,
        user_id,
        &state.config.replicate.restore_model,
        image_url,
        Stage::Restore,
    )
    .await
    {
        Ok(v) => v,
        Err(e) => return Err(fail_record(state, record.id, e).await),
    };

    let next = if colorize {
        HistoryStatus::Colorizing
    } else {
        HistoryStatus::Done
    };
    // Journal failures also terminate the record; without this a DB hiccup
    // here would strand it in `restoring`.
    if let Err(e) = HistoryRecord::set_restored(
        &state.db,
        record.id,
        &restored_url,
        next,
        &json!({ "restored_from": restored_from }),
    )
    .await
    {
        return Err(fail_record(state, record.id, e.into()).await);
    }

    // Stage 2: colorize, fed from the *stored* stage-1 URL so the run never
    // depends on the provider's short-lived link. A failure here keeps the
    // restored result and surfaces as a warning.
    let mut colorized_url = None;
    let mut warning = None;
    if colorize {
        match run_stage(
            state,
            user_id,
            &state.config.replicate.colorize_model,
            &restored_url,
            Stage::Colorize,
        )
        .await
        {
            Ok((stored, colorized_from)) => {
                if let Err(e) = HistoryRecord::set_colorized(
                    &state.db,
                    record.id,
                    &stored,
                    &json!({ "colorized_from": colorized_from }),
                )
                .await
                {
                    return Err(fail_record(state, record.id, e.into()).await);
                }
                colorized_url = Some(stored);
            }
            Err(e) => {
                let detail = e.to_string();
                warn!(record_id = %record.id, error = %detail, "colorize stage failed, returning restored result");
                if let Err(mark_err) = HistoryRecord::mark_failed(&state.db, record.id, &detail).await
                {
                    warn!(record_id = %record.id, error = %mark_err, "failed to mark history record");
                }
                warning = Some(detail);
            }
        }
    }

    // A trial is only spent on a fully successful run; a run that ended in
    // `failed` stays free. Ledger trouble after the image already exists
    // must not mask the result.
    if warning.is_none() {
        match Profile::record_usage(&state.db, user_id, state.config.trial_limit).await {
            Ok(UsageOutcome::Recorded(count)) => {
                info!(trial_count = count, "trial usage recorded")
            }
            Ok(UsageOutcome::Unmetered) => {}
            Ok(UsageOutcome::Exhausted) => {
                warn!("usage update found counter already exhausted")
            }
            Err(e) => warn!(error = %e, "ledger update failed after successful run"),
        }
    }

    Ok(PipelineOutcome {
        record_id: record.id,
        input_url: image_url.to_string(),
        restored_url,
        colorized_url,
        warning,
    })
}

/// One model stage: gateway call, then relay into durable storage.
/// Returns the stored URL plus the ephemeral provider URL for provenance.
async fn run_stage(
    state: &AppState,
    user_id: Uuid,
    model: &str,
    input_url: &str,
    stage: Stage,
) -> Result<(String, String), ApiError> {
    let provider_url = state.gateway.run(model, input_url).await?;
    let stored_url = relay::save_remote(state, &provider_url, user_id, stage).await?;
    Ok((stored_url, provider_url))
}

/// Best-effort terminal update; the original error always wins.
async fn fail_record(state: &AppState, record_id: Uuid, err: ApiError) -> ApiError {
    if let Err(mark_err) = HistoryRecord::mark_failed(&state.db, record_id, &err.to_string()).await
    {
        warn!(record_id = %record_id, error = %mark_err, "failed to mark history record");
    }
    err
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_image_url("https://cdn/x.png").is_ok());
        assert!(validate_image_url("http://cdn/x.png").is_ok());
    }

    #[test]
    fn rejects_empty_and_non_url_input() {
        assert!(matches!(
            validate_image_url(""),
            Err(ApiError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_image_url("   "),
            Err(ApiError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_image_url("ftp://cdn/x.png"),
            Err(ApiError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_image_url("not a url"),
            Err(ApiError::InvalidRequest(_))
        ));
    }
}
