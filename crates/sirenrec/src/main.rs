//! `sirenrec` - CLI for the sirenrec alert recorder
//!
//! This binary records alerts with the host's recorder program and inspects
//! the alerts and segments it left behind.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use sirenrec::cli::{AlertsCommand, Cli, Command, ConfigCommand, RecordCommand};
use sirenrec::segmenter::leftover_segments;
use sirenrec::{
    init_logging, AlertController, AlertId, ChunkUploader, Collaborators, CommandDevice, Config,
    FsObjectStore, SessionSettings, SqliteMetadataStore, StaticIdentity, StaticPermission,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // `config validate` loads the file itself and fails on an invalid one
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        return handle_validate(file.clone().or_else(|| cli.config.clone()));
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Record(cmd) => handle_record(&config, &cmd).await,
        Command::Alerts(cmd) => handle_alerts(&config, cmd),
        Command::Pending(cmd) => handle_pending(&config, cmd.json),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Config(cmd) => handle_config(&config, &cmd),
    }
}

fn open_store(config: &Config) -> Result<Arc<SqliteMetadataStore>> {
    let path = config.database_path();
    let store = SqliteMetadataStore::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn handle_record(config: &Config, cmd: &RecordCommand) -> Result<()> {
    let metadata = open_store(config)?;
    let identity = Arc::new(StaticIdentity::from_config(
        config.identity.user_id.as_deref(),
    ));
    let objects = Arc::new(FsObjectStore::new(config.object_store_dir()));

    let uploader = ChunkUploader::new(objects, metadata.clone(), identity.clone(), config);
    let controller = AlertController::new(
        Collaborators {
            device: Box::new(CommandDevice::new(&config.capture)),
            metadata: metadata.clone(),
            identity,
            permission: Arc::new(StaticPermission::new(config.capture.microphone_permission)),
        },
        uploader,
        SessionSettings::from_config(config),
    );

    let alert_id = controller
        .start()
        .await
        .context("failed to start recording")?;
    println!("Recording alert {alert_id}. Press Ctrl-C to stop.");

    match cmd.duration {
        Some(secs) => {
            tokio::select! {
                res = tokio::signal::ctrl_c() => res.context("failed to listen for Ctrl-C")?,
                () = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?,
    }

    println!("Stopping...");
    let stopped = controller.stop().await;
    controller.wait_for_uploads().await;

    if let Some(stopped) = stopped {
        let chunks = metadata.list_chunks(&stopped.alert_id)?;
        let bytes: u64 = chunks.iter().map(|c| c.size_bytes).sum();
        println!("Alert:          {}", stopped.alert_id);
        println!("Chunks stored:  {}", chunks.len());
        println!("Bytes stored:   {bytes}");
        if !stopped.final_chunk_uploaded {
            println!("Final segment was not uploaded; see `sirenrec pending`.");
        }
    }
    Ok(())
}

fn handle_alerts(config: &Config, cmd: AlertsCommand) -> Result<()> {
    let store = open_store(config)?;

    match cmd {
        AlertsCommand::List { limit, json } => {
            let alerts = store.list_alerts(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&alerts)?);
            } else if alerts.is_empty() {
                println!("No alerts recorded.");
            } else {
                println!("{:<22} {:<10} {:<26} COMPLETED", "ID", "STATUS", "STARTED");
                for alert in alerts {
                    let completed = alert
                        .completed_at
                        .map_or_else(|| "-".to_string(), |at| at.to_rfc3339());
                    println!(
                        "{:<22} {:<10} {:<26} {completed}",
                        alert.id.as_str(),
                        alert.status.to_string(),
                        alert.started_at.to_rfc3339(),
                    );
                }
            }
        }
        AlertsCommand::Show { id, json } => {
            let id = AlertId::new(id);
            let Some(alert) = store.get_alert(&id)? else {
                bail!("alert not found: {id}");
            };
            let chunks = store.list_chunks(&id)?;

            if json {
                let value = serde_json::json!({ "alert": alert, "chunks": chunks });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Alert:     {}", alert.id);
                println!("Owner:     {}", alert.owner);
                println!("Status:    {}", alert.status);
                println!("Started:   {}", alert.started_at.to_rfc3339());
                if let Some(completed_at) = alert.completed_at {
                    println!("Completed: {}", completed_at.to_rfc3339());
                }
                println!();
                println!("Chunks ({}):", chunks.len());
                for chunk in chunks {
                    println!(
                        "  #{:<4} {:>10} bytes  {}",
                        chunk.sequence_index, chunk.size_bytes, chunk.remote_key
                    );
                }
            }
        }
    }
    Ok(())
}

fn handle_pending(config: &Config, json: bool) -> Result<()> {
    let dir = config.working_dir();
    let leftovers = leftover_segments(&dir, &config.recording.file_extension)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&leftovers)?);
    } else if leftovers.is_empty() {
        println!("No segments waiting in {}", dir.display());
    } else {
        for segment in leftovers {
            let alert = segment
                .alert_id
                .map_or_else(|| "?".to_string(), |id| id.to_string());
            println!(
                "{:<22} {:>10} bytes  {}",
                alert,
                segment.size_bytes,
                segment.path.display()
            );
        }
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let stats = store.stats()?;
    let pending = leftover_segments(&config.working_dir(), &config.recording.file_extension)?;

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "object_store_dir": config.object_store_dir(),
            "working_dir": config.working_dir(),
            "stats": stats,
            "pending_segments": pending.len(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("sirenrec status");
        println!("---------------");
        println!("Database:         {}", config.database_path().display());
        println!("Object store:     {}", config.object_store_dir().display());
        println!("Working dir:      {}", config.working_dir().display());
        println!();
        println!("Alerts:           {}", stats.total_alerts);
        println!("  recording:      {}", stats.recording_alerts);
        println!("Chunks:           {}", stats.total_chunks);
        println!("Bytes stored:     {}", stats.total_bytes);
        println!("Database size:    {}", stats.db_size_bytes);
        println!("Pending segments: {}", pending.len());
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Recording]");
                println!("  Chunk interval (s): {}", config.recording.chunk_interval_secs);
                println!("  Working dir:        {}", config.working_dir().display());
                println!("  File extension:     {}", config.recording.file_extension);
                println!("  Content type:       {}", config.recording.content_type);
                println!();
                println!("[Upload]");
                println!("  Max attempts:       {}", config.upload.max_attempts);
                println!("  Retry delay (ms):   {}", config.upload.retry_delay_ms);
                println!("  Key prefix:         {}", config.upload.key_prefix);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Object store:       {}", config.object_store_dir().display());
                println!();
                println!("[Capture]");
                println!("  Program:            {}", config.capture.program);
                println!("  Arguments:          {}", config.capture.args.join(" "));
                println!("  Mic permission:     {}", config.capture.microphone_permission);
                println!();
                println!("[Identity]");
                println!(
                    "  User:               {}",
                    config.identity.user_id.as_deref().unwrap_or("(signed out)")
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            handle_validate(file.clone())?;
        }
    }
    Ok(())
}

fn handle_validate(file: Option<std::path::PathBuf>) -> Result<()> {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    Config::load_from(Some(path)).context("configuration is invalid")?;
    println!("Configuration is valid.");
    Ok(())
}
