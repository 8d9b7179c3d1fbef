//! Dashboard command handling.
//!
//! Every command ends in a store or supervisor call whose result reaches
//! all clients through the event bus, never as a direct reply.

use atro_core::{
    cache::{DEFAULT_CONTEXT_TTL, namespaces, set_json},
    supervisor::BatchOutcome,
};
use atro_model::{
    AgentSelection, DashboardCommand, DashboardEvent, Insight, LogId, Metadata,
    NewInsight, ResponseAction, ResponseActionPatch, ToggleResponseAction,
};
use serde_json::json;
use tracing::{info, warn};

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// Cache key under which a log's classification is shared with workers.
pub fn analysis_key(log_id: LogId) -> String {
    format!("analysis:log:{log_id}")
}

pub async fn dispatch(state: &AppState, command: DashboardCommand) -> AppResult<()> {
    match command {
        DashboardCommand::StartAgents(selection) => {
            start_agents(state, &selection).await?;
        }
        DashboardCommand::StopAgents(selection) => {
            stop_agents(state, &selection).await?;
        }
        DashboardCommand::ToggleResponseAction(toggle) => {
            toggle_response_action(state, toggle).await?;
        }
        DashboardCommand::AnalyzeLog(request) => {
            analyze_log(state, request.log_id).await?;
        }
    }
    Ok(())
}

pub async fn start_agents(
    state: &AppState,
    selection: &AgentSelection,
) -> AppResult<BatchOutcome> {
    let outcome = state.supervisor.start_many(selection.ids()).await?;
    log_batch("start", &outcome);
    Ok(outcome)
}

pub async fn stop_agents(
    state: &AppState,
    selection: &AgentSelection,
) -> AppResult<BatchOutcome> {
    let outcome = state.supervisor.stop_many(selection.ids()).await?;
    log_batch("stop", &outcome);
    Ok(outcome)
}

fn log_batch(operation: &'static str, outcome: &BatchOutcome) {
    info!(
        operation,
        changed = outcome.changed.len(),
        unchanged = outcome.unchanged.len(),
        failed = outcome.failed.len(),
        "agent batch finished"
    );
}

pub async fn toggle_response_action(
    state: &AppState,
    toggle: ToggleResponseAction,
) -> AppResult<ResponseAction> {
    let updated = state
        .store
        .update_response_action(toggle.id, ResponseActionPatch::status(toggle.status))
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("response action {} not found", toggle.id))
        })?;

    info!(action_id = %updated.id, status = %updated.status, "response action toggled");
    state
        .bus
        .publish(DashboardEvent::ResponseActionUpdated(updated.clone()));
    Ok(updated)
}

/// Classify one log entry and record the result as an insight.
///
/// Classifier failures never surface here: the analyzer substitutes its
/// default classification, which is stored like any other.
pub async fn analyze_log(state: &AppState, log_id: LogId) -> AppResult<Insight> {
    let log = state
        .store
        .get_log(log_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("log {log_id} not found")))?;

    let text = format!("[{}] {}: {}", log.level, log.source, log.message);
    let classification = state.analyzer.analyze(&text).await;

    let mut metadata = Metadata::new();
    metadata.insert("logId".to_string(), json!(log.id.as_i64()));
    metadata.insert("confidence".to_string(), json!(classification.confidence));
    metadata.insert(
        "classifier".to_string(),
        json!(state.analyzer.classifier_name()),
    );

    let recommendation = Some(classification.recommendation.clone())
        .filter(|recommendation| !recommendation.is_empty());
    let insight = state
        .store
        .create_insight(NewInsight {
            analysis: classification.analysis.clone(),
            severity: classification.severity,
            recommendation,
            incident_id: None,
            metadata,
        })
        .await?;

    state.bus.publish(DashboardEvent::NewInsight(insight.clone()));

    if let Err(err) = set_json(
        state.cache.as_ref(),
        namespaces::CONTEXT,
        &analysis_key(log.id),
        &classification,
        Some(DEFAULT_CONTEXT_TTL),
    )
    .await
    {
        warn!(log_id = %log.id, error = %err, "could not share analysis context");
    }

    Ok(insight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_keys_are_per_log() {
        assert_eq!(analysis_key(LogId(12)), "analysis:log:12");
    }
}
