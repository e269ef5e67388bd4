//! BreakTime - break session tracker
//!
//! CLI entry point: runs the daemon or talks to it over IPC.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use breaktime::cli::{Cli, Command, DaemonCommand, OutputFormat, generate_after_help};
use breaktime::clock::{Clock, SystemClock};
use breaktime::config::Config;
use breaktime::daemon::{DaemonManager, StopOutcome};
use breaktime::domain::{EventKind, parse_action_code};
use breaktime::ipc::{self, CommandHandler, DaemonClient, Reply};
use breaktime::notify::{Notifier, OutboxNotifier};
use breaktime::render;
use breaktime::scheduler::{DailyReport, ReminderScheduler};
use breaktime::state::{BreakTracker, Reconciler, SessionTable};
use breaktime::store::{EventLog, JsonlEventLog};
use breaktime::sync::{BreakerPhase, CircuitBreaker, GraphSyncGateway, SyncWorker};
use breaktime::watcher::{ResetWatcher, request_reset};

/// Notifications kept for the chat bridge before the oldest are dropped
const OUTBOX_CAPACITY: usize = 1024;

/// How long shutdown waits for the sync queue to drain
const SYNC_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn setup_logging(log_dir: &Path, verbose: bool) -> Result<()> {
    fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("breaktime.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(&config.storage.log_dir(), cli.verbose).context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Daemon { command } => match command {
            DaemonCommand::Start { foreground } => cmd_start(&config, cli.config.as_deref(), foreground).await,
            DaemonCommand::Stop => cmd_stop().await,
            DaemonCommand::Status { format } => cmd_status(format).await,
        },
        Command::RunDaemon => run_daemon(&config).await,
        Command::Out { category, reason, who } => {
            let reply = client()?
                .break_action(&who.requester(), EventKind::Out, category, reason)
                .await?;
            print_reply(&reply)
        }
        Command::Back { category, who } => {
            let reply = client()?
                .break_action(&who.requester(), EventKind::Back, category, None)
                .await?;
            print_reply(&reply)
        }
        Command::Press { code, reason, who } => {
            let (category, kind) = parse_action_code(&code).map_err(|e| eyre::eyre!(e))?;
            let reason = if kind == EventKind::Out { reason } else { None };
            let reply = client()?.break_action(&who.requester(), kind, category, reason).await?;
            print_reply(&reply)
        }
        Command::Reason { text, who } => {
            let reply = client()?.provide_reason(&who.requester(), &text).await?;
            print_reply(&reply)
        }
        Command::Cancel { who } => {
            let reply = client()?.cancel_reason(&who.requester()).await?;
            print_reply(&reply)
        }
        Command::Summary { date, who } => {
            let reply = client()?.summary(who.person_id, &who.display_name(), date).await?;
            print_reply(&reply)
        }
        Command::Active { format } => cmd_active(format).await,
        Command::Reconcile => {
            let stats = client()?.reconcile().await?;
            println!("{}", render::recovery(&stats));
            Ok(())
        }
        Command::Reset => {
            let flag = config.recovery.reset_flag_path(&config.storage);
            request_reset(&flag)?;
            println!("Reset requested: {}", flag.display());
            println!("The daemon applies it within {} seconds.", config.recovery.poll_secs);
            Ok(())
        }
        Command::Notifications { format } => cmd_notifications(format).await,
    }
}

fn client() -> Result<DaemonClient> {
    let client = DaemonClient::new();
    if !client.socket_exists() {
        return Err(eyre::eyre!("BreakTime daemon is not running. Start it with `bt daemon start`."));
    }
    Ok(client)
}

fn print_reply(reply: &Reply) -> Result<()> {
    if reply.success {
        println!("{} {}", "✓".green(), reply.text);
        Ok(())
    } else {
        eprintln!("{} {}", "✗".red(), reply.text);
        std::process::exit(1);
    }
}

async fn cmd_active(format: OutputFormat) -> Result<()> {
    let sessions = client()?.active().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sessions)?),
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("Nobody is on a break.");
            }
            let now = SystemClock.now();
            for session in &sessions {
                println!("{}", render::session_line(session, now));
            }
        }
    }
    Ok(())
}

async fn cmd_notifications(format: OutputFormat) -> Result<()> {
    let items = client()?.notifications().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            for item in &items {
                println!("[{}] {}: {}", item.created_at, item.to.to_string().cyan(), item.text);
            }
        }
    }
    Ok(())
}

/// Start the daemon
async fn cmd_start(config: &Config, config_path: Option<&Path>, foreground: bool) -> Result<()> {
    debug!(foreground, "cmd_start: called");
    let daemon = DaemonManager::new();

    if let Some(pid) = daemon.running_pid() {
        println!("BreakTime is already running (PID: {})", pid);
        return Ok(());
    }

    if foreground {
        println!("Starting BreakTime in foreground mode...");
        run_daemon(config).await
    } else {
        let pid = daemon.start(config_path)?;
        println!("BreakTime started (PID: {})", pid);
        Ok(())
    }
}

/// Stop the daemon
///
/// Asks over the socket first, then signals the process.
async fn cmd_stop() -> Result<()> {
    debug!("cmd_stop: called");
    let daemon = DaemonManager::new();

    let Some(pid) = daemon.running_pid() else {
        println!("BreakTime is not running");
        return Ok(());
    };

    let client = DaemonClient::new();
    if client.socket_exists() {
        match client.shutdown().await {
            Ok(()) => {
                let mut attempts = 0;
                while daemon.is_running() && attempts < 50 {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    attempts += 1;
                }
                if !daemon.is_running() {
                    println!("BreakTime stopped gracefully via IPC (was PID: {})", pid);
                    return Ok(());
                }
                debug!("cmd_stop: IPC shutdown timed out, falling back to SIGTERM");
            }
            Err(e) => debug!(error = %e, "cmd_stop: IPC shutdown failed, falling back to SIGTERM"),
        }
    }

    match daemon.stop()? {
        StopOutcome::Terminated => println!("BreakTime stopped (was PID: {})", pid),
        StopOutcome::Killed => println!("BreakTime killed after ignoring SIGTERM (was PID: {})", pid),
    }
    Ok(())
}

/// Show daemon status
async fn cmd_status(format: OutputFormat) -> Result<()> {
    let daemon = DaemonManager::new();
    let status = daemon.status();

    let health = if status.running {
        DaemonClient::new().status().await.ok()
    } else {
        None
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": status.running,
                "pid": status.pid,
                "version": status.version,
                "responsive": health.is_some(),
                "pid_file": status.pid_file.to_string_lossy(),
                "health": health,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("BreakTime Status");
            println!("----------------");
            match status.pid {
                Some(pid) => println!("Status: {} (PID: {})", "running".green(), pid),
                None => println!("Status: {}", "stopped".red()),
            }
            if let Some(health) = &health {
                println!("Version: {}", health.version);
                if !daemon.version_matches() {
                    println!("{}", "Daemon version differs from this CLI; restart it.".yellow());
                }
                println!("Active breaks: {}", health.active_sessions);
                match &health.sync {
                    Some(sync) => {
                        let phase = match sync.phase {
                            BreakerPhase::Closed => sync.phase.to_string().green(),
                            BreakerPhase::HalfOpen => sync.phase.to_string().yellow(),
                            BreakerPhase::Open => sync.phase.to_string().red(),
                        };
                        println!("Sync: {} via {}", phase, sync.gateway);
                        println!(
                            "  pushed {} of {} (failed {}, skipped {}, trips {}, dropped {})",
                            sync.breaker.succeeded,
                            sync.breaker.attempted,
                            sync.breaker.failed,
                            sync.breaker.short_circuited,
                            sync.breaker.trips,
                            sync.dropped
                        );
                    }
                    None => println!("Sync: {}", "disabled".dimmed()),
                }
            } else if status.running {
                println!("{}", "Daemon is not answering on its IPC socket".yellow());
            }
            println!("PID file: {}", status.pid_file.display());
        }
    }
    Ok(())
}

/// Run the daemon until Ctrl+C, SIGTERM or an IPC shutdown request
async fn run_daemon(config: &Config) -> Result<()> {
    info!("Daemon starting...");
    config.validate().context("Invalid configuration")?;

    let daemon = DaemonManager::new();
    daemon.register_self()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let database = config.storage.database_path();
    let log: Arc<dyn EventLog> = Arc::new(
        JsonlEventLog::open(&database, &config.storage.file_prefix)
            .context(format!("Failed to open event log at {}", database.display()))?,
    );
    info!(?database, "Event log opened");

    let table = SessionTable::new();

    let (sync_handle, sync_join) = if config.sync.enabled {
        let gateway = GraphSyncGateway::from_config(&config.sync).context("Failed to configure sync gateway")?;
        let breaker = Arc::new(CircuitBreaker::new(config.sync.breaker()));
        let (handle, join) = SyncWorker::spawn(Arc::new(gateway), breaker, config.sync.queue_capacity);
        (Some(handle), Some(join))
    } else {
        info!("Sync disabled");
        (None, None)
    };

    let mut tracker = BreakTracker::new(table.clone(), log.clone(), clock.clone())
        .with_reason_timeout(config.reminders.reason_timeout());
    let mut reconciler = Reconciler::new(log.clone(), table.clone(), clock.clone(), config.recovery.lookback_days);
    if let Some(handle) = &sync_handle {
        tracker = tracker.with_sync(handle.clone());
        reconciler = reconciler.with_sync(handle.clone());
    }
    let tracker = Arc::new(tracker);
    let reconciler = Arc::new(reconciler);

    let stats = reconciler.run().await;
    info!("Startup reconciliation: {}", stats);

    let outbox = Arc::new(OutboxNotifier::new(OUTBOX_CAPACITY));
    let notifier: Arc<dyn Notifier> = outbox.clone();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let mut tasks = Vec::new();
    let reminders = ReminderScheduler::new(table.clone(), notifier.clone(), clock.clone(), config.reminders.clone());
    tasks.push(tokio::spawn(reminders.run(shutdown_rx.clone())));

    if config.report.enabled {
        let report = DailyReport::new(log.clone(), notifier.clone(), clock.clone(), config.report.send_summaries);
        tasks.push(tokio::spawn(report.run(shutdown_rx.clone())));
    }

    let watcher = ResetWatcher::new(
        config.recovery.reset_flag_path(&config.storage),
        config.recovery.poll_interval(),
        reconciler.clone(),
    );
    tasks.push(tokio::spawn(watcher.run(shutdown_rx.clone())));

    let (listener, socket_path) = ipc::listener::create_listener()?;
    info!(?socket_path, "IPC socket listening");
    let mut handler = CommandHandler::new(tracker.clone(), reconciler.clone(), outbox.clone(), clock.clone());
    if let Some(handle) = &sync_handle {
        handler = handler.with_sync_monitor(handle.monitor());
    }
    let handler = Arc::new(handler);
    tasks.push(tokio::spawn(ipc::listener::serve(listener, handler, shutdown_tx.clone())));

    info!("Daemon running. Press Ctrl+C to stop.");
    wait_for_shutdown(&mut shutdown_rx).await?;
    shutdown_tx.send_replace(true);

    info!("Daemon shutting down...");
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Background task failed");
        }
    }

    drop(tracker);
    drop(reconciler);
    drop(sync_handle);
    if let Some(join) = sync_join
        && tokio::time::timeout(SYNC_DRAIN_TIMEOUT, join).await.is_err()
    {
        warn!("Sync queue did not drain before shutdown");
    }

    ipc::listener::cleanup_socket(&socket_path);
    daemon.unregister_self();
    info!("Daemon stopped");
    Ok(())
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => warn!("SIGINT received"),
        _ = sigterm.recv() => warn!("SIGTERM received"),
        _ = shutdown.wait_for(|stop| *stop) => info!("Shutdown requested"),
    }
    Ok(())
}
