use std::sync::Arc;
use std::time::Duration;

use beacon_api::ping::ChannelClient;
use beacon_core::config::BeaconCfg;
use beacon_core::monitor::net::ReachabilityProbe;
use beacon_core::monitor::power::PowerSupplyProbe;
use beacon_core::monitor::{spawn_net_monitor, spawn_power_monitor};
use beacon_core::runtime::{Engine, EngineEvent};
use beacon_core::store::{self, event_log};
use beacon_core::types::{Command, StatusSnapshot};
use rustyline::error::ReadlineError;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

const DB_CONNECT_TIMEOUT_SECS: u64 = 3;
const DEFAULT_DB_URL: &str = "sqlite://beacon.db?mode=rwc";

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut startup_notice: Option<String> = None;
    let pool = open_store(&mut startup_notice).await?;

    let cfg = Arc::new(BeaconCfg::load(&pool).await?);
    let client: Arc<dyn ChannelClient> = Arc::new(beacon_api::http::from_env());

    let (mut engine, event_tx, status_rx) =
        Engine::new(Arc::clone(&cfg), pool.clone(), client).await?;
    let token = engine.token();
    spawn_signal_canceler(token.clone());

    // Condition monitors feed the engine through a forwarder task, so the
    // engine's event channel stays its only entry point.
    let (cond_tx, mut cond_rx) = mpsc::channel(16);
    spawn_power_monitor(
        PowerSupplyProbe::new(),
        cond_tx.clone(),
        cfg.power_poll_interval(),
        token.clone(),
    );
    spawn_net_monitor(
        ReachabilityProbe::new(cfg.net_probe_addr.clone(), cfg.net_probe_timeout()),
        cond_tx,
        cfg.net_poll_interval(),
        token.clone(),
    );
    let forward_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(change) = cond_rx.recv().await {
            if forward_tx.send(EngineEvent::Condition(change)).await.is_err() {
                break;
            }
        }
    });

    let repl_token = token.clone();
    let engine_fut = async move { engine.run().await };
    let repl_fut = run_repl(pool, event_tx, status_rx, repl_token, startup_notice);
    tokio::pin!(engine_fut);
    tokio::pin!(repl_fut);

    tokio::select! {
        _ = &mut engine_fut => {
            token.cancel();
            (&mut repl_fut).await
        }
        result = &mut repl_fut => {
            token.cancel();
            (&mut engine_fut).await;
            result
        }
    }
}

/// Open the sqlite store named by `DATABASE_URL` (default `beacon.db` in the
/// working directory) and run migrations. Any failure falls back to an
/// ephemeral in-memory store with a user-visible notice.
async fn open_store(startup_notice: &mut Option<String>) -> anyhow::Result<SqlitePool> {
    let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_URL.to_owned());

    let reason = match tokio::time::timeout(
        Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
        store::connect(&url),
    )
    .await
    {
        Ok(Ok(pool)) => match MIGRATOR.run(&pool).await {
            Ok(()) => return Ok(pool),
            Err(e) => format!("database migration failed: {e}"),
        },
        Ok(Err(e)) => format!("cannot open {url}: {e}"),
        Err(_) => format!("database open timed out ({DB_CONNECT_TIMEOUT_SECS}s)"),
    };

    *startup_notice = Some(format!(
        "note: {reason}; using an in-memory store — settings and logs will not survive this run"
    ));
    let pool = store::connect("sqlite::memory:").await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

async fn run_repl(
    pool: SqlitePool,
    event_tx: mpsc::Sender<EngineEvent>,
    status_rx: watch::Receiver<StatusSnapshot>,
    token: CancellationToken,
    startup_notice: Option<String>,
) -> anyhow::Result<()> {
    if let Some(notice) = startup_notice {
        println!("{notice}");
    }
    println!("beacon — type 'help' for commands");

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<InputEvent>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    spawn_input_thread(line_tx, ready_rx);
    request_next_prompt(&ready_tx);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                match line {
                    InputEvent::Line(line) => {
                        let text = line.trim();
                        if !text.is_empty()
                            && !dispatch(text, &pool, &event_tx, &status_rx).await
                        {
                            token.cancel();
                            break;
                        }
                        request_next_prompt(&ready_tx);
                    }
                    InputEvent::Interrupted | InputEvent::Eof => {
                        token.cancel();
                        break;
                    }
                    InputEvent::Error(err) => {
                        eprintln!("input error: {err}");
                        token.cancel();
                        break;
                    }
                }
            }
        }
    }
    drop(ready_tx);
    println!();
    Ok(())
}

/// Execute one REPL command. Returns `false` when the user asked to quit.
async fn dispatch(
    text: &str,
    pool: &SqlitePool,
    event_tx: &mpsc::Sender<EngineEvent>,
    status_rx: &watch::Receiver<StatusSnapshot>,
) -> bool {
    let parts: Vec<&str> = text.split_whitespace().collect();
    match parts.as_slice() {
        ["help"] => print_help(),
        ["status"] => print_status(&status_rx.borrow()),
        ["key"] => {
            send_command(event_tx, Command::SetChannelKey(String::new())).await;
            println!("channel key cleared");
        }
        ["key", value] => {
            send_command(event_tx, Command::SetChannelKey((*value).to_owned())).await;
        }
        ["auto", state @ ("on" | "off")] => {
            send_command(event_tx, Command::SetAutoPing(*state == "on")).await;
        }
        ["test"] => {
            send_command(event_tx, Command::TestRequest).await;
        }
        ["logs", rest @ ..] => print_logs(pool, rest).await,
        ["quit"] | ["exit"] | ["q"] => return false,
        _ => println!("unknown command; type 'help'"),
    }
    true
}

async fn send_command(event_tx: &mpsc::Sender<EngineEvent>, command: Command) {
    if event_tx.send(EngineEvent::Command(command)).await.is_err() {
        eprintln!("engine is gone");
    }
}

fn print_help() {
    println!("commands:");
    println!("  status            show gate status and conditions");
    println!("  key <VALUE>       set the channel key (no value clears it)");
    println!("  auto on|off       toggle automatic pinging");
    println!("  test              send a manual test request");
    println!("  logs [N] [--json] show the newest N event records (default 20)");
    println!("  quit              exit");
}

fn print_status(snap: &StatusSnapshot) {
    let yn = |v: bool| if v { "yes" } else { "no" };
    println!("status:    {}", snap.status.as_str());
    println!("eligible:  {}", yn(snap.eligible));
    println!(
        "charging {}, connected {}, auto {}, key {}",
        yn(snap.conditions.charging),
        yn(snap.conditions.connected),
        if snap.auto_enabled { "on" } else { "off" },
        if snap.conditions.identifier_present {
            snap.channel_key.as_str()
        } else {
            "(unset)"
        }
    );
    match &snap.last_request_at {
        Some(at) => println!("last request: {}", at.to_rfc3339()),
        None => println!("last request: never"),
    }
}

async fn print_logs(pool: &SqlitePool, args: &[&str]) {
    let mut json = false;
    let mut limit: i64 = 20;
    for arg in args {
        if *arg == "--json" {
            json = true;
        } else if let Ok(n) = arg.parse::<i64>() {
            limit = n;
        } else {
            println!("usage: logs [N] [--json]");
            return;
        }
    }

    let records = match event_log::list_recent(pool, limit).await {
        Ok(records) => records,
        Err(e) => {
            eprintln!("failed to read event log: {e}");
            return;
        }
    };
    if records.is_empty() {
        println!("no events recorded yet");
        return;
    }
    for record in records {
        if json {
            match serde_json::to_string(&record) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("failed to encode record: {e}"),
            }
        } else {
            println!(
                "{}  {:<20}  {}",
                record.timestamp.to_rfc3339(),
                record.event_type.as_db_str(),
                record.detail.as_deref().unwrap_or("-")
            );
        }
    }
}

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

fn spawn_input_thread(
    line_tx: mpsc::UnboundedSender<InputEvent>,
    ready_rx: std::sync::mpsc::Receiver<()>,
) {
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            match editor.readline("beacon> ") {
                Ok(line) => {
                    if line_tx.send(InputEvent::Line(line)).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    let _ = line_tx.send(InputEvent::Interrupted);
                    break;
                }
                Err(ReadlineError::Eof) => {
                    let _ = line_tx.send(InputEvent::Eof);
                    break;
                }
                Err(e) => {
                    let _ = line_tx.send(InputEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    });
}

fn request_next_prompt(ready_tx: &std::sync::mpsc::Sender<()>) {
    let _ = ready_tx.send(());
}

fn spawn_signal_canceler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to register SIGINT handler");
                    return;
                }
            };
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to register SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
            tracing::info!("shutdown signal received");
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        }
        token.cancel();
    });
}
