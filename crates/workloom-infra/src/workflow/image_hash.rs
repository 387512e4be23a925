//! The image-hash workflow: fan out one hash activity per requested
//! algorithm, join the results into a single report.
//!
//! The step function is pure: it never reads the clock. Timestamps in the
//! client-facing result (`startedAt`/`completedAt`) come from the instance
//! row and are merged in by the API layer; `computedAt` inside each hash
//! entry comes from the activity, which is free to read the clock because
//! its outcome is persisted, not replayed.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use workloom_core::workflow::definition::{ActivityStub, NextAction, WorkflowDefinition};
use workloom_types::error::WorkflowError;
use workloom_types::hash::{ByteSource, HashAlgorithm, HashResult};

use crate::activity::hash::COMPUTE_HASH_ACTIVITY;

/// Registered name of the image-hash workflow.
pub const IMAGE_HASH_WORKFLOW: &str = "image-hash";

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

/// Start input, camelCase to match the upload API payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHashInput {
    pub file_name: String,
    pub image: ByteSource,
    pub algorithms: Vec<HashAlgorithm>,
}

/// Workflow output; the API layer adds `startedAt`/`completedAt` from the
/// instance record when building the polling response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHashOutput {
    pub file_name: String,
    pub file_size: u64,
    pub hashes: Vec<HashResult>,
}

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

pub struct ImageHashWorkflow;

impl WorkflowDefinition for ImageHashWorkflow {
    fn name(&self) -> &str {
        IMAGE_HASH_WORKFLOW
    }

    fn step(&self, input: &Value, completed: &[Vec<Value>]) -> Result<NextAction, WorkflowError> {
        let input: ImageHashInput = serde_json::from_value(input.clone())
            .map_err(|e| WorkflowError::Definition(format!("invalid image-hash input: {e}")))?;

        match completed {
            // First pass: one hash activity per algorithm, all dispatched in
            // the same drive pass.
            [] => {
                let image = serde_json::to_value(&input.image)
                    .map_err(|e| WorkflowError::Definition(format!("serialize image: {e}")))?;
                Ok(NextAction::ScheduleActivities(
                    input
                        .algorithms
                        .iter()
                        .map(|algorithm| {
                            ActivityStub::new(
                                COMPUTE_HASH_ACTIVITY,
                                vec![image.clone(), json!(algorithm)],
                            )
                        })
                        .collect(),
                ))
            }
            // Second pass: every digest is in; results arrive in stub order,
            // so `hashes` lines up with `algorithms`.
            [results] => {
                let hashes: Vec<HashResult> = results
                    .iter()
                    .map(|v| serde_json::from_value(v.clone()))
                    .collect::<Result<_, _>>()
                    .map_err(|e| {
                        WorkflowError::Definition(format!("invalid hash result: {e}"))
                    })?;

                let output = ImageHashOutput {
                    file_name: input.file_name,
                    file_size: input.image.len() as u64,
                    hashes,
                };
                serde_json::to_value(output)
                    .map(NextAction::Complete)
                    .map_err(|e| WorkflowError::Definition(format!("serialize output: {e}")))
            }
            _ => Err(WorkflowError::Definition(
                "image-hash workflow has exactly one fan-out".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
