use crate::output::{health_cell, latency_cell, print_json, print_table};
use nexus_api::NexusClient;
use nexus_sync::SyncConfig;

pub async fn run(config: &SyncConfig, project: &str, json: bool) -> anyhow::Result<()> {
    let client = NexusClient::new(&config.api_base);

    let health = client.health().await?;
    let services = client.services_status().await?;
    let activity = client.activity_stats(project).await?;

    if json {
        return print_json(&serde_json::json!({
            "health": health,
            "services": services,
            "activity": activity,
        }));
    }

    println!("Backend: {} (v{})", health.status, health.version);

    if !services.is_empty() {
        println!("\nServices:");
        let rows: Vec<Vec<String>> = services
            .iter()
            .map(|s| {
                vec![
                    s.name.clone(),
                    s.status.to_string(),
                    health_cell(s.health),
                    latency_cell(s.latency),
                    s.last_sync.clone(),
                ]
            })
            .collect();
        print_table(&["SERVICE", "STATUS", "HEALTH", "LATENCY", "LAST SYNC"], rows);
    }

    println!(
        "\nActivity: {} events today ({} all time), {} syncs, {} active agents",
        activity.total_events,
        activity.total_events_all_time,
        activity.total_syncs,
        activity.active_agents
    );
    for platform in &activity.platforms {
        println!(
            "  {:<10} {} events ({}{})",
            platform.name,
            platform.events,
            if platform.change >= 0 { "+" } else { "" },
            platform.change
        );
    }
    Ok(())
}
