// Concurrent stage script simulation

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use hotbackup_core::{BackupConfig, BackupStageName};
use hotbackup_stage::{BackupStageService, CoordinatorStatistics};
use hotbackup_testkit::{InMemoryLockManager, RecordingStorageEngine, ScriptedTableCache};
use serde::Serialize;

/// Options of the `run` subcommand.
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub sessions: usize,
    pub stages: String,
    pub copy_ms: u64,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct SessionReport {
    session: String,
    completed: Vec<BackupStageName>,
    error: Option<String>,
    elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
struct RunReport {
    sessions: Vec<SessionReport>,
    statistics: CoordinatorStatistics,
    tickets_still_granted: usize,
}

/// Run the stage script on `options.sessions` concurrent sessions and report.
pub async fn run(options: RunOptions) -> anyhow::Result<()> {
    let config = load_config(options.config.as_deref())?;
    let script = parse_script(&options.stages)?;
    anyhow::ensure!(options.sessions > 0, "at least one session is required");

    let locks = InMemoryLockManager::new();
    let service = Arc::new(
        BackupStageService::builder()
            .with_config(config)
            .with_lock_manager(Arc::new(locks.clone()))
            .with_table_cache(Arc::new(ScriptedTableCache::new()))
            .with_storage_engine(Arc::new(RecordingStorageEngine::new("InnoDB")))
            .with_storage_engine(Arc::new(RecordingStorageEngine::unsupported("MEMORY")))
            .build()
            .context("failed to build backup stage service")?,
    );
    tracing::info!(sessions = options.sessions, stages = %options.stages, "starting simulation");

    let copy_time = Duration::from_millis(options.copy_ms);
    let tasks: Vec<_> = (0..options.sessions)
        .map(|_| {
            let service = service.clone();
            let script = script.clone();
            tokio::spawn(async move { run_session(&service, &script, copy_time).await })
        })
        .collect();

    let mut sessions = Vec::with_capacity(tasks.len());
    for task in tasks {
        sessions.push(task.await.context("session task panicked")?);
    }

    let report = RunReport {
        sessions,
        statistics: service.coordinator().statistics(),
        tickets_still_granted: locks.granted_count(),
    };
    print_report(&report, options.json)
}

async fn run_session(
    service: &BackupStageService,
    script: &[BackupStageName],
    copy_time: Duration,
) -> SessionReport {
    let started = Instant::now();
    let mut session = service.new_session();
    let mut completed = Vec::new();
    let mut error = None;

    for (index, stage) in script.iter().enumerate() {
        if index + 1 == script.len() && !copy_time.is_zero() {
            tokio::time::sleep(copy_time).await;
        }
        match service.advance_backup_stage(&mut session, *stage).await {
            Ok(()) => completed.push(*stage),
            Err(err) => {
                tracing::warn!(session = %session.id(), stage = %stage, error = %err, "stage request failed");
                error = Some(format_error_chain(&err));
                break;
            }
        }
    }

    // A disconnecting client ends its backup whatever state it is in.
    service.end_backup(&mut session).await;

    SessionReport {
        session: session.id().to_string(),
        completed,
        error,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<BackupConfig> {
    let mut config = match path {
        Some(path) => BackupConfig::load_from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => BackupConfig::default(),
    };
    config
        .merge_with_env()
        .context("invalid HOTBACKUP_* override")?;
    config.validate()?;
    Ok(config)
}

fn parse_script(stages: &str) -> anyhow::Result<Vec<BackupStageName>> {
    let script = stages
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.parse::<BackupStageName>())
        .collect::<Result<Vec<_>, _>>()?;
    anyhow::ensure!(!script.is_empty(), "the stage script is empty");
    Ok(script)
}

fn format_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for session in &report.sessions {
        let completed: Vec<_> = session.completed.iter().map(|s| s.as_str()).collect();
        println!(
            "{}  [{}]  {}ms",
            session.session,
            completed.join(" -> "),
            session.elapsed_ms
        );
        if let Some(error) = &session.error {
            println!("    error: {error}");
        }
    }

    let stats = &report.statistics;
    println!();
    println!("backups started:  {}", stats.backups_started);
    println!("backups ended:    {}", stats.backups_ended);
    println!("cancelled waits:  {}", stats.cancelled_waits);
    println!("timed-out waits:  {}", stats.timed_out_waits);
    println!("tickets granted:  {}", report.tickets_still_granted);
    Ok(())
}
