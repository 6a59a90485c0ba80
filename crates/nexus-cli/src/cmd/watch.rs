use crate::output::print_json;
use nexus_sync::{ChannelEvent, EventBuffer, PushChannel, SyncConfig};
use tokio::sync::broadcast::error::RecvError;
use url::Url;

pub async fn run(config: &SyncConfig, project: &str, json: bool) -> anyhow::Result<()> {
    let ws_base = Url::parse(&config.ws_base)?;
    let mut channel = PushChannel::connect(ws_base, project);
    let mut events = channel.subscribe();
    let mut connected = channel.connected();
    let mut buffer = EventBuffer::with_capacity(config.event_capacity, config.notification_capacity);

    eprintln!("watching project '{project}' — ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = connected.changed() => {
                if changed.is_err() {
                    break;
                }
                let up = *connected.borrow_and_update();
                eprintln!("[channel {}]", if up { "connected" } else { "disconnected, retrying" });
            }
            event = events.recv() => match event {
                Ok(ChannelEvent::Pulse(pulse)) => {
                    if json {
                        print_json(&pulse)?;
                    } else {
                        println!(
                            "{:<10} {:<12} {:<10} {} -> {}",
                            pulse.timestamp,
                            format!("[{}]", status_label(pulse.status)),
                            pulse.agent,
                            pulse.action,
                            pulse.target
                        );
                    }
                    buffer.push(pulse);
                }
                Ok(ChannelEvent::Telemetry(entry)) => {
                    if json {
                        print_json(&entry)?;
                    } else {
                        println!(
                            "{:<10} {:<12} {:<10} {}",
                            entry.timestamp,
                            format!("<{}>", entry.stage),
                            entry.level,
                            entry.message
                        );
                    }
                }
                Ok(ChannelEvent::Health(services)) => {
                    let degraded = services
                        .iter()
                        .filter(|s| s.status != nexus_api::ConnectionStatus::Connected)
                        .count();
                    if degraded > 0 {
                        eprintln!("[health: {degraded}/{} services degraded]", services.len());
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    eprintln!("[{missed} events dropped, feed lagging]");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    if !json && buffer.unread() > 0 {
        eprintln!("{} completed/errored pulses this session", buffer.unread());
    }
    channel.disconnect();
    Ok(())
}

fn status_label(status: nexus_api::PulseStatus) -> &'static str {
    match status {
        nexus_api::PulseStatus::Processing => "processing",
        nexus_api::PulseStatus::Completed => "completed",
        nexus_api::PulseStatus::Error => "error",
    }
}
