pub mod config;
pub mod doctor;
pub mod health;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use skyscan_nav::{FlightError, FlightResult, MissionReport};
use skyscan_proto::command::{Outbound, Request};
use skyscan_session::{FlightSessionCoordinator, ManualCommand, SessionStatus};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use config::{ServerConfig, TelemetryConfig};
pub use health::LinkHealth;

/// One connected operator console.
struct Client {
    tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    telemetry: Option<JoinHandle<()>>,
}

impl Client {
    async fn send(&self, out: Outbound) {
        let _ = self.tx.send(out).await;
    }
}

/// Line-delimited JSON front end for a `FlightSessionCoordinator`. Marshals
/// requests and responses; every decision stays in the coordinator.
pub struct LinkServer {
    coord: Arc<FlightSessionCoordinator>,
    cfg: TelemetryConfig,
}

impl LinkServer {
    pub fn new(coord: Arc<FlightSessionCoordinator>, cfg: TelemetryConfig) -> Self {
        Self { coord, cfg }
    }

    pub async fn serve(self: Arc<Self>, bind: &str, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(bind).await.with_context(|| format!("bind {}", bind))?;
        info!("link: listening on {}", listener.local_addr()?);
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("link: shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => accepted.context("accept")?,
            };
            stream.set_nodelay(true).ok();
            let this = self.clone();
            let cancel = shutdown.child_token();
            tokio::spawn(this.handle_client(stream, peer.to_string(), cancel));
        }
    }

    /// Serve one client until it disconnects or `cancel` fires. Losing the
    /// client triggers the session failsafe.
    pub async fn handle_client<S>(self: Arc<Self>, stream: S, peer: String, cancel: CancellationToken)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        info!(%peer, "link: client connected");
        let (rd, wr) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(write_lines(wr, rx, peer.clone()));
        tokio::spawn(heartbeat_loop(self.coord.clone(), self.cfg.clone(), tx.clone(), cancel.clone()));

        let mut client = Client { tx, cancel: cancel.clone(), telemetry: None };
        let mut lines = BufReader::new(rd).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => self.on_line(&line, &mut client).await,
                Ok(None) => break,
                Err(e) => {
                    warn!(%peer, "link: read failed: {}", e);
                    break;
                }
            }
        }

        cancel.cancel();
        warn!(%peer, "link: client gone, triggering failsafe");
        self.coord.failsafe().await;
        info!(%peer, "link: client disconnected");
    }

    async fn on_line(&self, line: &str, client: &mut Client) {
        let req: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                client.send(Outbound::Error { error: format!("bad request: {}", e) }).await;
                return;
            }
        };
        debug!(?req, "link: request");
        if let Some(out) = self.dispatch(req, client).await {
            client.send(out).await;
        }
    }

    async fn dispatch(&self, req: Request, client: &mut Client) -> Option<Outbound> {
        let c = &self.coord;
        let out = match &req {
            Request::Connect => reply(&req, c.connect().await),
            Request::Disconnect => reply(&req, c.disconnect().await),
            Request::Arm => reply(&req, c.arm().await),
            Request::Disarm => reply(&req, c.disarm().await),
            Request::ThrottleUp => reply(&req, c.manual(ManualCommand::ThrottleUp).await),
            Request::ThrottleDown => reply(&req, c.manual(ManualCommand::ThrottleDown).await),
            Request::RollRight => reply(&req, c.manual(ManualCommand::RollRight).await),
            Request::RollLeft => reply(&req, c.manual(ManualCommand::RollLeft).await),
            Request::PitchForward => reply(&req, c.manual(ManualCommand::PitchForward).await),
            Request::PitchBackward => reply(&req, c.manual(ManualCommand::PitchBackward).await),
            Request::YawClockwise => reply(&req, c.manual(ManualCommand::YawClockwise).await),
            Request::YawAnticlockwise => reply(&req, c.manual(ManualCommand::YawAnticlockwise).await),
            Request::Land => reply(&req, c.land().await),
            Request::ModeSwitch { mode } => reply(&req, c.mode_switch(mode).await),
            // long-running: answer from a task so disarm and land stay responsive
            Request::SetAltitude { height } => {
                let (coord, height) = (c.clone(), *height);
                reply_later(req.clone(), client, async move { coord.set_altitude(height).await });
                return None;
            }
            Request::StartScan { waypoints, speed } => {
                let (coord, waypoints, speed) = (c.clone(), waypoints.clone(), *speed);
                reply_later(req.clone(), client, async move {
                    coord.start_scan_mission(&waypoints, speed).await.map(|r| describe(&r))
                });
                return None;
            }
            Request::Telemetry => self.start_telemetry(&req, client),
            Request::Monitoring => {
                tokio::spawn(watch_vehicle_link(
                    c.subscribe_status(),
                    req.clone(),
                    client.tx.clone(),
                    client.cancel.clone(),
                ));
                return None;
            }
            Request::Ack { message } => {
                c.acknowledge(message);
                return None;
            }
        };
        Some(out)
    }

    fn start_telemetry(&self, req: &Request, client: &mut Client) -> Outbound {
        if client.telemetry.as_ref().is_some_and(|t| !t.is_finished()) {
            return Outbound::response(req, true, "telemetry already streaming");
        }
        if !self.coord.status().connected() {
            return Outbound::response(req, false, FlightError::NotConnected.to_string());
        }
        let every = self.cfg.interval();
        client.telemetry =
            Some(tokio::spawn(stream_telemetry(self.coord.clone(), client.tx.clone(), every, client.cancel.clone())));
        Outbound::response(req, true, format!("streaming every {} ms", self.cfg.interval_ms))
    }
}

/// Vehicle faults become `error` events; refusals are unsuccessful responses.
fn reply<T: Display>(req: &Request, result: FlightResult<T>) -> Outbound {
    match result {
        Ok(v) => Outbound::response(req, true, v.to_string()),
        Err(FlightError::UnexpectedFault(e)) => Outbound::Error { error: format!("{}: {:#}", req.response_name(), e) },
        Err(e) => Outbound::response(req, false, e.to_string()),
    }
}

fn reply_later<T, F>(req: Request, client: &Client, fut: F)
where
    T: Display,
    F: Future<Output = FlightResult<T>> + Send + 'static,
{
    let tx = client.tx.clone();
    tokio::spawn(async move {
        let out = reply(&req, fut.await);
        let _ = tx.send(out).await;
    });
}

fn describe(report: &MissionReport) -> String {
    let terminal = report.terminal_mode.as_ref().map_or_else(|| "unconfirmed".to_string(), |m| m.to_string());
    format!(
        "{} waypoints reached (attempts {:?}), terminal mode {}",
        report.waypoints_reached, report.attempts, terminal
    )
}

async fn write_lines<W>(mut wr: W, mut rx: mpsc::Receiver<Outbound>, peer: String)
where
    W: AsyncWrite + Unpin,
{
    while let Some(out) = rx.recv().await {
        let mut line = match serde_json::to_vec(&out) {
            Ok(v) => v,
            Err(e) => {
                error!("link: cannot encode {:?}: {}", out, e);
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = wr.write_all(&line).await {
            debug!(%peer, "link: write failed: {}", e);
            break;
        }
        let _ = wr.flush().await;
    }
}

/// Answer a `monitoring` request once the vehicle link is down. Fires at
/// once when nothing is connected.
async fn watch_vehicle_link(
    mut status: watch::Receiver<SessionStatus>,
    req: Request,
    tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
) {
    let lost = tokio::select! {
        _ = cancel.cancelled() => false,
        seen = status.wait_for(|s| !s.connected()) => seen.is_ok(),
    };
    if lost {
        info!("link: vehicle link down, notifying monitor");
        let _ = tx.send(Outbound::response(&req, true, "vehicle disconnected")).await;
    }
}

async fn stream_telemetry(
    coord: Arc<FlightSessionCoordinator>,
    tx: mpsc::Sender<Outbound>,
    every: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }
        let Some(snap) = coord.collect_telemetry().await else {
            info!("link: vehicle not connected, telemetry stream stopped");
            break;
        };
        if snap.ok_count() < 6 {
            debug!(faults = ?snap.faults(), "telemetry channels faulted");
        }
        if tx.send(Outbound::Telemetry(snap)).await.is_err() {
            break;
        }
    }
}

/// Push heartbeats, grade the client's acks and, when configured, land the
/// vehicle once acks stop for longer than `ack_timeout_s`.
async fn heartbeat_loop(
    coord: Arc<FlightSessionCoordinator>,
    cfg: TelemetryConfig,
    tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
) {
    let every = cfg.heartbeat_interval();
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut health = LinkHealth::default();
    let started = Instant::now();
    let mut failsafe_sent = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        if health.heartbeats_sent > 0 {
            let was_degraded = health.is_degraded();
            health.on_window(coord.ack_age().is_some_and(|age| age < every));
            if health.is_degraded() && !was_degraded {
                warn!(quality = health.quality, missed = health.consecutive_missed, "link: client stopped acking");
            }
        }

        if let Some(limit) = cfg.ack_timeout() {
            let silent = coord.ack_age().unwrap_or_else(|| started.elapsed());
            if silent >= limit {
                if !failsafe_sent {
                    warn!("link: no ack for {:.1}s, triggering failsafe", silent.as_secs_f32());
                    coord.failsafe().await;
                    failsafe_sent = true;
                }
            } else {
                failsafe_sent = false;
            }
        }

        if tx.send(Outbound::Heartbeat(coord.heartbeat())).await.is_err() {
            break;
        }
        health.heartbeats_sent += 1;
    }
}
