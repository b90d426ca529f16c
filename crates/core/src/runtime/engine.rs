use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use beacon_api::ping::ChannelClient;

use crate::config::BeaconCfg;
use crate::gate::{Effect, GateState, Input};
use crate::monitor::ConditionChange;
use crate::store::{event_log, settings};
use crate::types::{Command, EventRecord, StatusSnapshot, normalize_channel_key};

/// An event entering the engine's owning context: a deduplicated condition
/// update, a user command, or the completion of an in-flight ping.
#[derive(Debug)]
pub enum EngineEvent {
    Condition(ConditionChange),
    Command(Command),
    PingDone {
        success: bool,
        status_code: Option<u16>,
    },
}

/// The engine owns all mutable state. Gate transitions, timer ticks and
/// ping completions are serialized on its task; ping futures are spawned
/// and report back through the event channel, so no lock guards any of it.
pub struct Engine {
    cfg: Arc<BeaconCfg>,
    pool: SqlitePool,
    client: Arc<dyn ChannelClient>,
    token: CancellationToken,
    event_rx: mpsc::Receiver<EngineEvent>,
    /// Sender clone handed to spawned ping tasks for completion reports.
    event_tx: mpsc::Sender<EngineEvent>,
    gate: GateState,
    /// Periodic trigger; `None` while the gate is closed.
    ticker: Option<Interval>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl Engine {
    /// Create an engine, restoring the gate from persisted settings.
    /// Returns (engine, event sender, status receiver).
    pub async fn new(
        cfg: Arc<BeaconCfg>,
        pool: SqlitePool,
        client: Arc<dyn ChannelClient>,
    ) -> Result<
        (
            Self,
            mpsc::Sender<EngineEvent>,
            watch::Receiver<StatusSnapshot>,
        ),
        sqlx::Error,
    > {
        let channel_key = settings::get(&pool, settings::CHANNEL_KEY)
            .await?
            .unwrap_or_default();
        let auto_enabled = settings::get_bool(&pool, settings::AUTO_PING).await?;
        let gate = GateState::restore(channel_key, auto_enabled);

        let (tx, rx) = mpsc::channel(64);
        let (status_tx, status_rx) = watch::channel(gate.snapshot());
        let engine = Self {
            cfg,
            pool,
            client,
            token: CancellationToken::new(),
            event_rx: rx,
            event_tx: tx.clone(),
            gate,
            ticker: None,
            status_tx,
        };
        Ok((engine, tx, status_rx))
    }

    /// Cancellation token for shutting the engine down from outside.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run until cancelled or every event sender is dropped.
    pub async fn run(&mut self) {
        tracing::info!(
            interval_secs = self.cfg.ping_interval_secs,
            "beacon engine started"
        );
        let token = self.token.clone();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = self.event_rx.recv() => {
                    let Some(event) = event else { break };
                    self.handle(event).await;
                }
                _ = next_tick(&mut self.ticker), if self.ticker.is_some() => {
                    let effects = self.gate.apply(Input::Tick);
                    self.execute(effects).await;
                    self.publish();
                }
            }
        }
        tracing::info!("beacon engine stopped");
    }

    async fn handle(&mut self, event: EngineEvent) {
        let input = match event {
            EngineEvent::Condition(ConditionChange::Charging(charging)) => {
                Input::ChargingChanged(charging)
            }
            EngineEvent::Condition(ConditionChange::Connectivity(connected)) => {
                Input::ConnectivityChanged(connected)
            }
            EngineEvent::Command(Command::SetChannelKey(raw)) => {
                Input::SetChannelKey(normalize_channel_key(&raw))
            }
            EngineEvent::Command(Command::SetAutoPing(enabled)) => Input::SetAutoPing(enabled),
            EngineEvent::Command(Command::TestRequest) => Input::ManualRequest,
            EngineEvent::PingDone {
                success,
                status_code,
            } => Input::PingCompleted {
                success,
                status_code,
                at: Utc::now(),
            },
        };
        let effects = self.gate.apply(input);
        self.execute(effects).await;
        self.publish();
    }

    async fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SendPing { channel_key } => self.spawn_ping(channel_key),
                Effect::ArmTimer => {
                    let period = self.cfg.ping_interval();
                    let mut interval =
                        tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                    // A missed period is skipped, never queued.
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    self.ticker = Some(interval);
                }
                Effect::CancelTimer => self.ticker = None,
                Effect::Append { event_type, detail } => {
                    let record = EventRecord::new(event_type, detail);
                    // A failed log write is diagnostic-only; engine state and
                    // user-visible status are unaffected.
                    if let Err(e) = event_log::append(&self.pool, &record).await {
                        tracing::warn!(
                            error = %e,
                            event_type = event_type.as_db_str(),
                            "failed to append event record"
                        );
                    }
                }
                Effect::PersistChannelKey(key) => {
                    if let Err(e) = settings::set(&self.pool, settings::CHANNEL_KEY, &key).await {
                        tracing::warn!(error = %e, "failed to persist channel key");
                    }
                }
                Effect::PersistAutoPing(enabled) => {
                    if let Err(e) = settings::set_bool(&self.pool, settings::AUTO_PING, enabled).await
                    {
                        tracing::warn!(error = %e, "failed to persist auto-ping flag");
                    }
                }
            }
        }
    }

    /// Fire one ping. Outcomes come back through the event channel; a slow
    /// response does not delay the next tick, so overlapping pings are
    /// possible and their outcomes are logged in completion order.
    fn spawn_ping(&self, channel_key: String) {
        let client = Arc::clone(&self.client);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let done = match client.channel_ping(&channel_key).await {
                Ok(receipt) => {
                    tracing::info!(status_code = receipt.status_code, "channel ping succeeded");
                    EngineEvent::PingDone {
                        success: true,
                        status_code: Some(receipt.status_code),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "channel ping failed");
                    EngineEvent::PingDone {
                        success: false,
                        status_code: e.status_code(),
                    }
                }
            };
            let _ = tx.send(done).await;
        });
    }

    fn publish(&self) {
        let _ = self.status_tx.send(self.gate.snapshot());
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
