use crate::output::{health_cell, latency_cell, print_json, print_table};
use nexus_api::NexusClient;
use nexus_sync::SyncConfig;

pub async fn run(
    config: &SyncConfig,
    project: &str,
    test: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let client = NexusClient::new(&config.api_base);

    if let Some(conn_id) = test {
        let resp = client.test_connection(project, conn_id).await?;
        if json {
            return print_json(&resp);
        }
        println!("{}: {} {}", conn_id, resp.status, resp.message);
        return Ok(());
    }

    let connections = client.list_connections(project).await?;
    if json {
        return print_json(&connections);
    }
    if connections.is_empty() {
        println!("No connections stored for project '{project}'.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = connections
        .iter()
        .map(|c| {
            vec![
                c.id.clone(),
                c.name.clone(),
                c.status.to_string(),
                health_cell(c.health),
                latency_cell(c.latency),
                c.last_sync.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "STATUS", "HEALTH", "LATENCY", "LAST SYNC"], rows);
    Ok(())
}
