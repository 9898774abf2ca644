//! Paceline - GPS and heart-rate workout recorder
//!
//! Command-line front end.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use paceline::backup::{BackupService, HttpRemoteBackup};
use paceline::metrics::format_pace;
use paceline::recording::{SessionOrchestrator, SessionState};
use paceline::sensors::{BleHeartRateLink, HeartRateEvent, HeartRateManager};
use paceline::storage::config::{get_data_dir, load_config_from, AppConfig};
use paceline::storage::database::{self, Database, SharedDatabase};
use paceline::storage::settings::SettingKey;
use paceline::tracking::{ExternalLocationSource, PermissionStatus, PositionFix, PositionIngestor};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type Session = SessionOrchestrator<ExternalLocationSource, BleHeartRateLink, HttpRemoteBackup>;

#[derive(Parser)]
#[command(name = "paceline")]
#[command(about = "GPS and heart-rate workout recorder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Location permission reported by the platform
    #[arg(long, global = true, value_enum, default_value_t = PermissionStatus::Granted)]
    location_permission: PermissionStatus,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new workout and record heart rate until interrupted
    Start {
        /// Create the workout and exit immediately
        #[arg(long)]
        detach: bool,
    },

    /// Re-attach to a workout left active and record until interrupted
    Resume,

    /// Finish the active workout and back up the database
    Finish,

    /// Delete the active workout and its samples
    Discard,

    /// Show the session state and live statistics
    Status,

    /// List recorded workouts
    List {
        /// Maximum number of workouts to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show summary and splits of one workout as JSON
    Show { id: i64 },

    /// Read GPS fixes as JSON lines from stdin and store them
    Ingest,

    /// Scan for heart-rate monitors
    Scan {
        /// Scan duration in seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },

    /// Connect to a heart-rate monitor and remember it
    Pair { device_id: String },

    /// Back up the database now
    Backup,

    /// Check that the backup endpoint is reachable
    Probe,

    /// Set a setting (an empty value removes it)
    Set { key: SettingKey, value: String },

    /// Print a setting
    Get {
        key: SettingKey,

        /// Print secret values in clear
        #[arg(long)]
        reveal: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(get_data_dir);
    let config = load_config_from(&data_dir.join("config.toml"), data_dir)
        .context("Failed to load configuration")?;

    tracing::debug!("Using data directory {}", config.data_dir.display());

    let permission = cli.location_permission;

    match cli.command {
        Commands::Start { detach } => cmd_start(&config, permission, detach).await,
        Commands::Resume => cmd_resume(&config, permission).await,
        Commands::Finish => cmd_finish(&config, permission).await,
        Commands::Discard => {
            let session = build_session(&config, permission)?;
            session.discard().await?;
            println!("Workout discarded");
            Ok(())
        }
        Commands::Status => cmd_status(&config, permission).await,
        Commands::List { limit } => cmd_list(&config, permission, limit),
        Commands::Show { id } => {
            let session = build_session(&config, permission)?;
            let Some(detail) = session.workout_detail(id)? else {
                bail!("Workout {} not found", id);
            };
            println!("{}", serde_json::to_string_pretty(&detail)?);
            Ok(())
        }
        Commands::Ingest => cmd_ingest(&config),
        Commands::Scan { seconds } => cmd_scan(&config, Duration::from_secs(seconds)).await,
        Commands::Pair { device_id } => cmd_pair(&config, &device_id).await,
        Commands::Backup => {
            let session = build_session(&config, permission)?;
            let status = session.backup().run().await;
            println!("Backup: {}", status);
            Ok(())
        }
        Commands::Probe => {
            let session = build_session(&config, permission)?;
            session.backup().probe_remote().await?;
            println!("Backup endpoint reachable");
            Ok(())
        }
        Commands::Set { key, value } => cmd_set(&config, permission, key, &value).await,
        Commands::Get { key, reveal } => cmd_get(&config, key, reveal),
    }
}

fn open_database(config: &AppConfig) -> Result<SharedDatabase> {
    let path = config.database_path();
    let db = Database::open(&path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(db.into_shared())
}

fn heart_rate_manager(
    config: &AppConfig,
    db: &SharedDatabase,
) -> HeartRateManager<BleHeartRateLink> {
    HeartRateManager::new(
        BleHeartRateLink::new(),
        db.clone(),
        config.heart_rate_config(),
    )
}

fn build_session(config: &AppConfig, permission: PermissionStatus) -> Result<Session> {
    let db = open_database(config)?;
    let backup = BackupService::new(
        db.clone(),
        HttpRemoteBackup::new()?,
        config.backup_config(),
    );

    Ok(SessionOrchestrator::new(
        db.clone(),
        ExternalLocationSource::new(permission),
        heart_rate_manager(config, &db),
        backup,
        config.filter_config(),
    ))
}

async fn cmd_start(config: &AppConfig, permission: PermissionStatus, detach: bool) -> Result<()> {
    let session = build_session(config, permission)?;
    let workout = session.start().await?;
    println!("Started workout {}", workout.id);

    if detach {
        return Ok(());
    }
    record_until_interrupted(&session).await
}

async fn cmd_resume(config: &AppConfig, permission: PermissionStatus) -> Result<()> {
    let session = build_session(config, permission)?;

    match session.resume().await? {
        SessionState::Idle => {
            println!("No active workout");
            Ok(())
        }
        SessionState::Active(workout) => {
            println!("Resumed workout {}", workout.id);
            record_until_interrupted(&session).await
        }
    }
}

/// Keep the heart-rate producer running and log live stats until Ctrl-C.
async fn record_until_interrupted(session: &Session) -> Result<()> {
    let mut events = session.heart_rate().subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                match session.live_stats() {
                    Ok(Some(stats)) => tracing::info!(
                        "{:.0} s, {:.2} km, pace {}, HR {}",
                        stats.elapsed_secs,
                        stats.distance_meters / 1000.0,
                        stats.current_pace_secs_per_km.map_or("--:--".to_string(), format_pace),
                        stats.last_heart_rate.map_or("--".to_string(), |bpm| bpm.to_string()),
                    ),
                    Ok(None) => {
                        tracing::info!("Workout ended elsewhere");
                        break;
                    }
                    Err(e) => tracing::warn!("Failed to compute live stats: {}", e),
                }
            }
            event = events.recv() => {
                if let Ok(HeartRateEvent::ReconnectAbandoned) = event {
                    tracing::warn!("Heart-rate monitor lost; GPS recording continues");
                }
            }
        }
    }

    session.shutdown().await;
    println!("Recording paused; run `paceline resume` or `paceline finish`");
    Ok(())
}

async fn cmd_finish(config: &AppConfig, permission: PermissionStatus) -> Result<()> {
    let session = build_session(config, permission)?;
    let workout = session.finish().await?;

    println!(
        "Finished workout {}: {:.2} km, avg pace {}, avg HR {}",
        workout.id,
        workout.distance_meters.unwrap_or(0.0) / 1000.0,
        workout
            .avg_pace_secs_per_km
            .map_or("--:--".to_string(), format_pace),
        workout
            .avg_heart_rate
            .map_or("--".to_string(), |hr| format!("{:.0}", hr)),
    );

    if let Some(status) = session.wait_for_backup().await {
        println!("Backup: {}", status);
    }
    Ok(())
}

async fn cmd_status(config: &AppConfig, permission: PermissionStatus) -> Result<()> {
    let session = build_session(config, permission)?;

    match session.live_stats()? {
        None => println!("Idle"),
        Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
    }
    println!("Backup: {}", session.backup().refresh_status().await);
    Ok(())
}

fn cmd_list(config: &AppConfig, permission: PermissionStatus, limit: u32) -> Result<()> {
    let session = build_session(config, permission)?;

    for workout in session.list_workouts(Some(limit))? {
        let state = if workout.is_active() { "active" } else { "done" };
        println!(
            "{:>5}  {}  {:>6}  {:>8.2} km  {}",
            workout.id,
            workout.started_at.format("%Y-%m-%d %H:%M"),
            state,
            workout.distance_meters.unwrap_or(0.0) / 1000.0,
            workout
                .avg_pace_secs_per_km
                .map_or("--:--".to_string(), format_pace),
        );
    }
    Ok(())
}

fn cmd_ingest(config: &AppConfig) -> Result<()> {
    let ingestor = PositionIngestor::new(config.database_path());
    let mut inserted = 0;
    let mut dropped = 0;
    let mut failed = 0;

    for line in std::io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let fix: PositionFix = match serde_json::from_str(&line) {
            Ok(fix) => fix,
            Err(e) => {
                tracing::warn!("Skipping malformed fix: {}", e);
                failed += 1;
                continue;
            }
        };

        let report = ingestor.handle(&[fix]);
        inserted += report.inserted;
        dropped += report.dropped;
        failed += report.failed;
    }

    println!("Inserted {}, dropped {}, failed {}", inserted, dropped, failed);
    Ok(())
}

async fn cmd_scan(config: &AppConfig, duration: Duration) -> Result<()> {
    let db = open_database(config)?;
    let manager = heart_rate_manager(config, &db);
    let mut events = manager.subscribe();

    manager.scan().await?;

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(HeartRateEvent::Discovered(device)) => {
                    println!("{}\t{}", device.device_id, device.display_name());
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

async fn cmd_pair(config: &AppConfig, device_id: &str) -> Result<()> {
    let db = open_database(config)?;
    let manager = heart_rate_manager(config, &db);
    let mut events = manager.subscribe();

    manager.connect(device_id).await?;
    println!("Paired with {}", device_id);

    let first = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(HeartRateEvent::HeartRate { bpm, .. }) => return Some(bpm),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await;

    if let Ok(Some(bpm)) = first {
        println!("Current heart rate: {} bpm", bpm);
    }

    manager.shutdown().await;
    Ok(())
}

async fn cmd_set(
    config: &AppConfig,
    permission: PermissionStatus,
    key: SettingKey,
    value: &str,
) -> Result<()> {
    {
        let db = open_database(config)?;
        let db = database::lock(&db)?;

        if value.is_empty() {
            db.remove_setting(key)?;
            println!("Removed {}", key);
        } else {
            db.set_setting(key, value)?;
            println!("Set {}", key);
        }
    }

    if matches!(
        key,
        SettingKey::BackupUrl | SettingKey::BackupUsername | SettingKey::BackupPassword
    ) {
        let session = build_session(config, permission)?;
        println!("Backup: {}", session.backup().refresh_status().await);
    }
    Ok(())
}

fn cmd_get(config: &AppConfig, key: SettingKey, reveal: bool) -> Result<()> {
    let db = open_database(config)?;
    let value = database::lock(&db)?.get_setting(key)?;

    match value {
        None => println!("{} is not set", key),
        Some(_) if key.is_secret() && !reveal => println!("********"),
        Some(value) => println!("{}", value),
    }
    Ok(())
}
