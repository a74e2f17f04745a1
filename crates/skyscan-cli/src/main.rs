use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use skyscan_fc::sim::SimConfig;
use skyscan_fc::{run_fc_autodetect, ConnectionKind, VehicleConfig};
use skyscan_link::{doctor as link_doctor, LinkServer, ServerConfig, TelemetryConfig};
use skyscan_nav::{doctor as nav_doctor, waypoints_from_triples, PlannerConfig};
use skyscan_session::{ConfigConnector, FlightSessionCoordinator};

#[derive(Debug, Parser)]
#[command(name = "skyscan", version, about = "skyscan - UAV ground control and scan missions")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config file.
    Doctor,
    /// Accept operator consoles and drive the vehicle.
    Serve,
    /// Fly one scan mission from a mission file and exit.
    Scan {
        #[arg(long)]
        mission: String,
    },
    Fc { #[command(subcommand)] cmd: FcCmd },
}

#[derive(Debug, Subcommand)]
enum FcCmd {
    /// Probe serial ports/bauds for MAVLink heartbeats.
    Autodetect,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    server: ServerConfig,
    vehicle: VehicleConfig,
    planner: PlannerConfig,
    telemetry: TelemetryConfig,
    sim: SimConfig,
}

#[derive(Debug, serde::Deserialize)]
struct MissionFile {
    groundspeed: f64,
    waypoints: Vec<Vec<f64>>,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    toml::from_str(&s).context("parse config toml")
}

fn load_mission(path: &str) -> Result<MissionFile> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read mission {}", path))?;
    toml::from_str(&s).context("parse mission toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Serve => serve(cfg).await?,
        Command::Scan { mission } => scan(cfg, &mission).await?,
        Command::Fc { cmd } => fc_cmd(&cfg, cmd).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    link_doctor::check_server(&cfg.server)?;
    link_doctor::check_telemetry(&cfg.telemetry)?;
    nav_doctor::check_planner(&cfg.planner)?;

    let v = &cfg.vehicle;
    match v.connection {
        ConnectionKind::Serial if v.autodetect => info!("doctor: fc autodetect enabled (OK)"),
        ConnectionKind::Serial => {
            anyhow::ensure!(v.serial_dev.as_ref().is_some_and(|s| !s.is_empty()), "vehicle.serial_dev missing");
            anyhow::ensure!(v.baud > 0, "vehicle.baud invalid");
        }
        ConnectionKind::Tcp => {
            anyhow::ensure!(v.tcp_address.contains(':'), "vehicle.tcp_address must be host:port");
        }
        ConnectionKind::Sim => warn!("doctor: vehicle.connection = sim, no hardware will be flown"),
    }
    if let Some(hz) = v.send_heartbeat_hz {
        anyhow::ensure!(hz >= 0.2, "vehicle.send_heartbeat_hz should be >= 0.2");
    }

    info!("doctor: OK");
    println!("doctor: OK");
    Ok(())
}

async fn fc_cmd(cfg: &Config, cmd: FcCmd) -> Result<()> {
    match cmd {
        FcCmd::Autodetect => {
            let vehicle = cfg.vehicle.clone();
            let res = tokio::task::spawn_blocking(move || run_fc_autodetect(&vehicle)).await?;
            if let Some((dev, baud)) = res.chosen {
                println!("CHOSEN: {} @ {}", dev, baud);
            } else {
                println!("CHOSEN: none");
            }
            for p in res.probes {
                println!("probe dev={} baud={} hb={} {}ms note={}", p.dev, p.baud, p.hb_seen, p.elapsed_ms, p.note);
            }
            Ok(())
        }
    }
}

fn coordinator(cfg: &Config) -> Arc<FlightSessionCoordinator> {
    let connector = ConfigConnector::new(cfg.vehicle.clone(), cfg.sim.clone());
    Arc::new(FlightSessionCoordinator::new(Arc::new(connector), cfg.planner.clone()))
}

async fn serve(cfg: Config) -> Result<()> {
    info!("serve: starting");
    let coord = coordinator(&cfg);
    let server = Arc::new(LinkServer::new(coord.clone(), cfg.telemetry.clone()));

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("serve: interrupt received");
        }
        on_signal.cancel();
    });

    server.serve(&cfg.server.bind, shutdown).await?;
    if coord.status().connected() {
        coord.failsafe().await;
        coord.disconnect().await.ok();
    }
    Ok(())
}

async fn scan(cfg: Config, path: &str) -> Result<()> {
    let mission = load_mission(path)?;
    let waypoints = waypoints_from_triples(&mission.waypoints)?;
    nav_doctor::check_mission(&waypoints, mission.groundspeed)?;

    let coord = coordinator(&cfg);
    println!("{}", coord.connect().await?);

    let outcome = tokio::select! {
        r = coord.start_scan_mission(&mission.waypoints, mission.groundspeed) => r,
        _ = tokio::signal::ctrl_c() => {
            warn!("scan: interrupted, landing");
            coord.land().await.ok();
            anyhow::bail!("scan interrupted");
        }
    };

    match outcome {
        Ok(report) => {
            println!("scan: OK, {} waypoints reached", report.waypoints_reached);
            for (i, attempts) in report.attempts.iter().enumerate() {
                println!("  waypoint {} reached after {} attempt(s)", i + 1, attempts);
            }
            match report.terminal_mode {
                Some(mode) => println!("  terminal mode {}", mode),
                None => println!("  terminal mode not confirmed"),
            }
            Ok(())
        }
        Err(e) => {
            println!("scan: FAILED ({}): {}", e.kind(), e);
            Err(e.into())
        }
    }
}
