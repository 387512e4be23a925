//! `wloom submit` -- start a hash workflow for a local file.

use std::path::Path;
use std::time::Duration;

use serde_json::json;

use workloom_infra::workflow::image_hash::{IMAGE_HASH_WORKFLOW, ImageHashInput};
use workloom_types::hash::{ByteSource, HashAlgorithm};

use crate::state::AppState;

use super::status::print_instance;

/// Read the file, start an image-hash instance, optionally wait for it.
///
/// The workflow only makes progress while workers are running (`wloom work`
/// or `wloom serve --with-workers`).
pub async fn submit(
    state: &AppState,
    file: &Path,
    algorithms: &[String],
    wait: bool,
    json_output: bool,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file).await?;

    let algorithms: Vec<HashAlgorithm> = if algorithms.is_empty() {
        HashAlgorithm::ALL.to_vec()
    } else {
        algorithms
            .iter()
            .map(|s| s.parse().map_err(anyhow::Error::msg))
            .collect::<anyhow::Result<_>>()?
    };

    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.bin")
        .to_string();

    let input = ImageHashInput {
        file_name: file_name.clone(),
        image: ByteSource::from_bytes(&bytes),
        algorithms,
    };

    let handle = state
        .client
        .make(IMAGE_HASH_WORKFLOW)?
        .start(serde_json::to_value(input)?)
        .await?;

    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "workflowId": handle.id(),
                "fileName": file_name,
                "fileSize": bytes.len(),
            }))?
        );
    } else {
        println!();
        println!(
            "  {} Started workflow {} for '{}' ({} bytes)",
            console::style("⚙").bold(),
            console::style(handle.id()).cyan(),
            file_name,
            bytes.len()
        );
    }

    if wait {
        loop {
            let instance = handle.instance().await?;
            if instance.status.is_terminal() {
                print_instance(&instance, json_output)?;
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    } else if !json_output {
        println!(
            "  {}",
            console::style(format!("Poll with: wloom status {}", handle.id())).dim()
        );
        println!();
    }

    Ok(())
}
