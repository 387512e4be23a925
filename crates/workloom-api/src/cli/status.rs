//! `wloom status` -- inspect one workflow instance or list recent ones.

use comfy_table::{Table, presets::UTF8_FULL};
use uuid::Uuid;

use workloom_infra::workflow::image_hash::ImageHashOutput;
use workloom_types::workflow::{InstanceStatus, WorkflowInstance};

use crate::state::AppState;

pub async fn status(
    state: &AppState,
    workflow_id: Option<Uuid>,
    limit: u32,
    json_output: bool,
) -> anyhow::Result<()> {
    match workflow_id {
        Some(id) => {
            let instance = state.client.instance(id).await?;
            print_instance(&instance, json_output)
        }
        None => list_instances(state, limit, json_output).await,
    }
}

async fn list_instances(state: &AppState, limit: u32, json_output: bool) -> anyhow::Result<()> {
    let instances = state.client.list(limit).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&instances)?);
        return Ok(());
    }

    if instances.is_empty() {
        println!();
        println!("  No workflow instances yet.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["ID", "WORKFLOW", "STATUS", "STARTED", "COMPLETED"]);
    for instance in &instances {
        table.add_row([
            instance.id.to_string(),
            instance.workflow_name.clone(),
            styled_status(instance.status),
            instance.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            instance
                .completed_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Print one instance, including its hash report when completed.
pub fn print_instance(instance: &WorkflowInstance, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(instance)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}  {}",
        console::style("Workflow").bold(),
        console::style(instance.id).cyan(),
        styled_status(instance.status)
    );

    match instance.status {
        InstanceStatus::Completed => {
            if let Some(output) = &instance.output {
                match serde_json::from_value::<ImageHashOutput>(output.clone()) {
                    Ok(report) => {
                        println!(
                            "  {} ({} bytes)",
                            console::style(&report.file_name).bold(),
                            report.file_size
                        );
                        let mut table = Table::new();
                        table.load_preset(UTF8_FULL);
                        table.set_header(["ALGORITHM", "DIGEST"]);
                        for hash in &report.hashes {
                            table.add_row([hash.algorithm.to_string(), hash.digest.clone()]);
                        }
                        println!("{table}");
                    }
                    Err(_) => println!("  output: {output}"),
                }
            }
        }
        InstanceStatus::Failed => {
            if let Some(error) = &instance.error {
                println!("  {} {error}", console::style("error:").red());
            }
        }
        InstanceStatus::Running => {
            println!("  {}", console::style("Still running...").dim());
        }
    }
    println!();
    Ok(())
}

fn styled_status(status: InstanceStatus) -> String {
    match status {
        InstanceStatus::Running => console::style("running").yellow().to_string(),
        InstanceStatus::Completed => console::style("completed").green().to_string(),
        InstanceStatus::Failed => console::style("failed").red().to_string(),
    }
}
