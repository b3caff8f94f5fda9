use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use tickhttp::clock::{Clock, SystemClock};
use tickhttp::config::Config;
use tickhttp::device::{self, Display, Reading, Sensor, Style};
use tickhttp::schedule::Periodic;
use tickhttp::server::{RouteMap, Server};
use tickhttp::transport::tcp::TcpBinder;

/// Serve a route map, and optionally republish sensor readings, one tick at a time.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Config file (YAML, or NAME=value lines)
    #[arg(short, long, env = "TICKHTTP_CONFIG")]
    config: Option<PathBuf>,

    /// Listening port, overriding the config
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Tick period in ms, overriding the config
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(5..=30000))]
    interval: Option<u64>,

    /// Extra route as PATH=TEXT; repeatable
    #[arg(short, long = "map", value_parser = parse_route)]
    map: Vec<(String, String)>,
}

fn parse_route(s: &str) -> Result<(String, String), String> {
    let (path, text) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PATH=TEXT, got `{s}`"))?;
    Ok((path.trim().to_string(), text.trim().to_string()))
}

struct SensorSlot {
    name: String,
    schedule: Periodic,
    sensor: Box<dyn Sensor>,
    latest: Reading,
}

struct DisplaySlot {
    schedule: Periodic,
    display: Box<dyn Display>,
    lines: Vec<String>,
    shown: Vec<Option<String>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        cfg.server.port = port;
    }
    if let Some(interval) = args.interval {
        cfg.tick_period_ms = interval;
    }

    let mut sensors = Vec::new();
    for (i, sc) in cfg.sensors.iter().enumerate() {
        let sensor = device::build_sensor(sc)
            .with_context(|| format!("setting up sensor {}", sc.name))?;
        sensors.push(SensorSlot {
            name: sc.name.clone(),
            schedule: Periodic::new(sc.interval_s, cfg.tick_period_ms, i as u64 + 1),
            sensor,
            latest: Reading::ZERO,
        });
    }

    let mut display = match &cfg.display {
        Some(dc) => {
            let mut display = device::build_display(dc.kind).context("setting up display")?;
            display.clear();
            Some(DisplaySlot {
                schedule: Periodic::new(dc.interval_s, cfg.tick_period_ms, 0),
                display,
                lines: dc.lines.clone(),
                shown: vec![None; dc.lines.len()],
            })
        }
        None => None,
    };

    let mut server = Server::new(TcpBinder::default(), cfg.server.clone());
    server.set_routes(args.map);
    server.start()?;

    let clock = SystemClock;
    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.tick_period_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }

        let now = clock.now_ms();

        for slot in &mut sensors {
            let SensorSlot { schedule, sensor, latest, .. } = slot;
            schedule.tick(|| match sensor.get() {
                Some(reading) => {
                    *latest = reading;
                    true
                }
                None => false,
            });
        }

        let readings: Vec<(&str, Reading)> = sensors
            .iter()
            .map(|s| (s.name.as_str(), s.latest))
            .collect();

        if let Some(slot) = display.as_mut() {
            let DisplaySlot { schedule, display, lines, shown } = slot;
            schedule.tick(|| {
                for (i, template) in lines.iter().enumerate() {
                    let text = device::fill(template, now / 1000, &readings, Style::Display);
                    if shown[i].as_deref() != Some(text.as_str()) {
                        display.show(&text, i + 1);
                        shown[i] = Some(text);
                    }
                }
                true
            });
        }

        let mut overlay = RouteMap::new();
        if let Some(content) = &cfg.server.content {
            let body = device::fill(content, now / 1000, &readings, Style::Web);
            overlay.insert(cfg.server.path.clone(), format!("{body}\r\n"));
        }

        let report = server.serve_with(&overlay, now);
        if report != Default::default() {
            debug!(?report, "Tick");
        }
    }

    server.stop();
    Ok(())
}
