use crate::output::print_json;
use nexus_api::NexusClient;
use nexus_sync::SyncConfig;

pub async fn run(config: &SyncConfig, json: bool) -> anyhow::Result<()> {
    let client = NexusClient::new(&config.api_base);
    let resp = client.admin_reset().await?;
    if json {
        return print_json(&resp);
    }
    println!(
        "Backend reset: {} keys flushed, defaults re-seeded",
        resp.flushed_keys
    );
    Ok(())
}
