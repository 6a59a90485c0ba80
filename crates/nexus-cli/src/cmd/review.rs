use crate::output::print_json;
use nexus_api::{ActionKind, NexusClient};
use nexus_sync::SyncConfig;

pub async fn run(
    config: &SyncConfig,
    project: &str,
    run_id: &str,
    diff_id: Option<&str>,
    action: ActionKind,
    json: bool,
) -> anyhow::Result<()> {
    let client = NexusClient::new(&config.api_base);

    if let Some(diff_id) = diff_id {
        let resp = client.diff_action(project, run_id, diff_id, action).await?;
        if json {
            return print_json(&resp);
        }
        println!("Diff {} {}", resp.diff.id, action);
        if let Some(result) = &resp.diff.execution_result {
            println!("Execution result: {}", serde_json::to_string_pretty(result)?);
        }
        println!(
            "Run {} now {} ({} diffs still pending)",
            resp.run.id,
            resp.run.status,
            resp.run.pending_diffs()
        );
        return Ok(());
    }

    let run = client.run_action(project, run_id, action).await?;
    if json {
        return print_json(&run);
    }
    println!("Run {} {} -> {}", run.id, action, run.status);
    Ok(())
}
