use crate::output::{print_json, print_table};
use nexus_api::{NexusClient, Run};
use nexus_sync::SyncConfig;

pub async fn run(
    config: &SyncConfig,
    project: &str,
    id: Option<&str>,
    logs: bool,
    json: bool,
) -> anyhow::Result<()> {
    let client = NexusClient::new(&config.api_base);

    let Some(run_id) = id else {
        let runs = client.list_runs(project).await?;
        return list(&runs, json);
    };

    if logs {
        let run_logs = client.run_logs(project, run_id).await?;
        if json {
            return print_json(&run_logs);
        }
        for entry in &run_logs.logs {
            println!(
                "{:<10} {:<14} {:<7} {}",
                entry.timestamp,
                format!("<{}>", entry.stage),
                entry.level,
                entry.message
            );
        }
        println!("({} entries)", run_logs.count);
        return Ok(());
    }

    let run = client.get_run(project, run_id).await?;
    if json {
        return print_json(&run);
    }
    detail(&run);
    Ok(())
}

fn list(runs: &[Run], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&runs);
    }
    if runs.is_empty() {
        println!("No runs yet. Start one with: nexus trigger <description>");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = runs
        .iter()
        .map(|r| {
            vec![
                r.id.clone(),
                r.status.to_string(),
                r.current_stage.map(|s| s.to_string()).unwrap_or_default(),
                r.pending_diffs().to_string(),
                r.created_at.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "STAGE", "PENDING", "CREATED"], rows);
    Ok(())
}

fn detail(run: &Run) {
    println!("Run: {} ({})", run.id, run.name);
    println!("Status: {}", run.status);
    if let Some(stage) = run.current_stage {
        println!("Stage: {stage}");
    }
    if !run.sources.is_empty() {
        println!("Sources: {}", run.sources.join(", "));
    }

    if !run.nodes.is_empty() {
        println!("\nTimeline:");
        for node in &run.nodes {
            let marker = match node.status {
                nexus_api::NodeStatus::Completed => "x",
                nexus_api::NodeStatus::Active => ">",
                nexus_api::NodeStatus::Error => "!",
                nexus_api::NodeStatus::Pending => " ",
            };
            println!(
                "  [{marker}] {:<14} {} — {}",
                node.stage.to_string(),
                node.title,
                node.description
            );
        }
    }

    if !run.diffs.is_empty() {
        println!("\nProposals:");
        let rows: Vec<Vec<String>> = run
            .diffs
            .iter()
            .map(|d| {
                vec![
                    d.id.clone(),
                    format!("{:?}", d.status).to_lowercase(),
                    d.platform.clone(),
                    d.title.clone(),
                ]
            })
            .collect();
        print_table(&["ID", "STATUS", "PLATFORM", "TITLE"], rows);
    }
}
