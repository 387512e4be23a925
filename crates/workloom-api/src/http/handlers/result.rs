//! Polling endpoint: reports a workflow's status and, once completed, its
//! full hash report.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use workloom_infra::workflow::image_hash::IMAGE_HASH_WORKFLOW;
use workloom_types::workflow::{InstanceStatus, WorkflowInstance};

use crate::http::error::ApiError;
use crate::state::AppState;

/// GET /api/result/{workflow_id}
///
/// - Completed: `{status: "completed", result: {...}}` where the result
///   merges the workflow output with the instance's timestamps.
/// - Failed: HTTP 500 with `{status: "failed", error}` -- never a partial
///   hash list.
/// - Otherwise: `{status: "running", message}`.
pub async fn workflow_result(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let handle = state
        .client
        .load(workflow_id, IMAGE_HASH_WORKFLOW)
        .await
        .map_err(ApiError::from)?;
    let instance = handle.instance().await.map_err(ApiError::from)?;

    let response = match instance.status {
        InstanceStatus::Completed => {
            let output = instance.output.clone().ok_or_else(|| {
                ApiError::Internal(format!("completed workflow {workflow_id} has no output"))
            })?;
            Json(json!({
                "status": "completed",
                "result": completed_result(output, &instance),
            }))
            .into_response()
        }
        InstanceStatus::Failed => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "failed",
                "error": "Workflow execution failed",
            })),
        )
            .into_response(),
        InstanceStatus::Running => Json(json!({
            "status": "running",
            "message": "Workflow is still running",
        }))
        .into_response(),
    };

    Ok(response)
}

/// Merge the workflow output with the instance's lifecycle timestamps.
///
/// The definition itself never reads the clock, so `startedAt` and
/// `completedAt` come from the instance record.
fn completed_result(output: Value, instance: &WorkflowInstance) -> Value {
    let mut result: Map<String, Value> = match output {
        Value::Object(map) => map,
        other => Map::from_iter([("output".to_string(), other)]),
    };
    result.insert(
        "startedAt".to_string(),
        json!(instance.created_at.to_rfc3339()),
    );
    result.insert(
        "completedAt".to_string(),
        json!(instance.completed_at.map(|t| t.to_rfc3339())),
    );
    Value::Object(result)
}
