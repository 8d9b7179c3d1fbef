use atro_model::{DashboardEvent, ResponseAction, ResponseActionPatch};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// What the response worker publishes after running an action.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFeedback {
    pub action: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub successful: bool,
}

/// Stamp `lastExecuted` on the named action after a successful run.
///
/// Returns the updated action, or `None` when the run failed or no action
/// carries that name.
pub async fn record_response_feedback(
    state: &AppState,
    payload: &str,
) -> AppResult<Option<ResponseAction>> {
    let feedback: ResponseFeedback = serde_json::from_str(payload).map_err(|err| {
        AppError::bad_request(format!("malformed response feedback: {err}"))
    })?;

    if !feedback.successful {
        debug!(action = %feedback.action, "response action reported failure");
        return Ok(None);
    }

    let Some(action) = state
        .store
        .find_response_action_by_name(&feedback.action)
        .await?
    else {
        debug!(action = %feedback.action, "feedback for unknown response action");
        return Ok(None);
    };

    let updated = state
        .store
        .update_response_action(action.id, ResponseActionPatch::executed_at(Utc::now()))
        .await?;
    if let Some(updated) = &updated {
        debug!(
            action_id = %updated.id,
            command = feedback.command.as_deref().unwrap_or_default(),
            "response action executed"
        );
        state
            .bus
            .publish(DashboardEvent::ResponseActionUpdated(updated.clone()));
    }
    Ok(updated)
}
