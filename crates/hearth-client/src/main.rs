use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hearth_client::pending_count;
use hearth_client::{ClientConfig, HearthClient, SendOutcome, SyncOutcome};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hearth", version, about = "Offline-first chat outbox")]
struct Cli {
    /// Config file (defaults to ~/.config/hearth/config.toml)
    #[arg(long, global = true, env = "HEARTH_CONFIG")]
    config: Option<PathBuf>,

    /// Keep the pending queue in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a message, queueing it if the store cannot be reached
    Send {
        #[arg(long)]
        room: String,
        /// Image to attach
        #[arg(long)]
        image: Option<PathBuf>,
        text: Vec<String>,
    },
    /// Run one reconciliation pass
    Sync,
    /// List queued messages
    Pending {
        #[arg(long)]
        room: Option<String>,
    },
    /// Follow a room; lines typed on stdin are sent to it
    Watch {
        #[arg(long)]
        room: String,
    },
    /// Drop every queued message
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearth=info,hearth_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let client = HearthClient::from_config(config, cli.ephemeral).await?;

    match cli.command {
        Command::Send { room, image, text } => send(&client, &room, image, &text.join(" ")).await,
        Command::Sync => sync(&client).await,
        Command::Pending { room } => pending(&client, room.as_deref()).await,
        Command::Watch { room } => watch(&client, &room).await,
        Command::Clear => {
            client.queue.clear_all().await?;
            println!("Pending queue cleared");
            Ok(())
        }
    }
}

async fn send(client: &HearthClient, room: &str, image: Option<PathBuf>, text: &str) -> Result<()> {
    let image = match image {
        Some(path) => Some(hearth_client::image::load(&path).await?),
        None => None,
    };

    let online = client.health_check().check().await;
    match client.composer(None).send(room, text, image).await? {
        SendOutcome::Sent(message) => println!("Sent {}", message.id),
        SendOutcome::Queued(record) => {
            println!("Queued {} ({})", record.id, if online { "will retry" } else { "offline" });
            // Online but queued: drain now rather than waiting for the next run
            if online {
                report(client.reconciler.run().await);
            }
        }
    }
    Ok(())
}

async fn sync(client: &HearthClient) -> Result<()> {
    if !client.health_check().check().await {
        println!("Offline, {} messages stay queued", client.queue.count().await);
        return Ok(());
    }
    report(client.reconciler.run().await);
    Ok(())
}

fn report(outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Completed(report) => println!(
            "Synced {} of {} ({} failed, {} uploads)",
            report.synced, report.attempted, report.failed, report.uploads
        ),
        SyncOutcome::AlreadyRunning => println!("A sync is already running"),
    }
}

async fn pending(client: &HearthClient, room: Option<&str>) -> Result<()> {
    let records = match room {
        Some(room) => client.queue.get_for_room(room).await,
        None => client.queue.get_all().await,
    };

    if records.is_empty() {
        println!("Nothing pending");
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {:<10} {:?} retries={} {}{}",
            record.id,
            record.room_id,
            record.status,
            record.retry_count,
            record.message,
            if record.has_image() { " [image]" } else { "" }
        );
    }
    if let Some(banner) = pending_count::banner(records.len()) {
        println!("{}", banner);
    }
    Ok(())
}

async fn watch(client: &HearthClient, room: &str) -> Result<()> {
    let health = client.health_check();
    health.check().await;
    let health_task = health.spawn(client.config.health_interval());

    let projector_task = client.projector.clone().spawn();
    let (sync, sync_task) = client.start_sync();
    let composer = client.composer(Some(sync.clone()));

    if let Err(e) = client.load_room(room).await {
        tracing::warn!("Could not load room history: {}", e);
    }

    let feed = match client.connect_live().await {
        Ok(feed) => {
            feed.subscribe_room(room).await;
            Some(feed)
        }
        Err(e) => {
            tracing::warn!("Live feed unavailable, showing local changes only: {}", e);
            None
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut shown = HashSet::new();
    let mut last_banner = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for entry in client.room_view(room).await {
                    if shown.insert((entry.key(), entry.delivery())) {
                        println!("{}", entry);
                    }
                }

                let banner = pending_count::banner(client.state.pending_count().await);
                if banner != last_banner {
                    if let Some(text) = &banner {
                        println!("-- {} --", text);
                    }
                    last_banner = banner;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    break;
                }
                if line == "/retry" {
                    sync.trigger();
                    continue;
                }

                let result = match line.strip_prefix("/image ") {
                    Some(rest) => {
                        let (path, caption) = rest.split_once(' ').unwrap_or((rest, ""));
                        match hearth_client::image::load(Path::new(path)).await {
                            Ok(image) => composer.send(room, caption, Some(image)).await,
                            Err(e) => Err(e),
                        }
                    }
                    None => composer.send(room, line, None).await,
                };
                if let Err(e) = result {
                    eprintln!("Not sent: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    sync.shutdown().await;
    let _ = sync_task.await;
    health_task.abort();
    projector_task.abort();
    if let Some(feed) = feed {
        feed.unsubscribe_room(room).await;
    }
    Ok(())
}
