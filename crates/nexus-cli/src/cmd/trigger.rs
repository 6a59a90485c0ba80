use crate::output::print_json;
use nexus_api::{NexusClient, TriggerRunRequest};
use nexus_sync::SyncConfig;

pub async fn run(
    config: &SyncConfig,
    project: &str,
    description: &str,
    sources: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let client = NexusClient::new(&config.api_base);
    let run = client
        .trigger_run(&TriggerRunRequest {
            project_id: project.to_string(),
            sources: sources.to_vec(),
            description: description.to_string(),
        })
        .await?;

    if json {
        return print_json(&run);
    }
    println!("Triggered run {} ({})", run.id, run.status);
    println!("Follow it with: nexus watch");
    Ok(())
}
