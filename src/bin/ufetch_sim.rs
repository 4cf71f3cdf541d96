use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use ufetch_rs::app::DataSink;
use ufetch_rs::mac::{Auv, AuvStats, CommMode, HeadNode, HeadStats, SensorNode, SensorStats, TxMode};
use ufetch_rs::net::{NetWorld, PacketKind, Stats};
use ufetch_rs::sim::{ScenarioSpec, SimTime, Simulator};
use ufetch_rs::topo::{BuildOpts, ClusterLayout, build_scenario};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    RtsCts,
    Direct,
}

impl From<ModeArg> for CommMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::RtsCts => CommMode::RtsCts,
            ModeArg::Direct => CommMode::Direct,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TxModeArg {
    Spaced,
    Burst,
}

impl From<TxModeArg> for TxMode {
    fn from(m: TxModeArg) -> Self {
        match m {
            TxModeArg::Spaced => TxMode::Spaced,
            TxModeArg::Burst => TxMode::Burst,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "ufetch-sim",
    about = "Run an AUV-assisted UFetch data collection scenario"
)]
struct Args {
    /// Path to scenario.json
    #[arg(long)]
    scenario: PathBuf,

    /// Simulated duration in seconds
    #[arg(long, default_value_t = 3600.0)]
    until_s: f64,

    /// Seed for backoff and channel randomness (overrides the scenario seed)
    #[arg(long)]
    seed: Option<u64>,

    /// HN <-> AUV exchange mode (overrides the scenario default)
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Spacing between consecutive DATA packets (overrides the scenario default)
    #[arg(long, value_enum)]
    tx_mode: Option<TxModeArg>,

    /// Output protocol event log as JSON
    #[arg(long)]
    viz_json: Option<PathBuf>,

    /// Output run summary as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct NodeSummary<S> {
    id: usize,
    name: String,
    queued: usize,
    stats: S,
}

#[derive(Debug, Serialize)]
struct Summary {
    sim_time_s: f64,
    events: u64,
    comm_mode: CommMode,
    network: Stats,
    sink: DataSink,
    auv: Option<AuvStats>,
    heads: Vec<NodeSummary<HeadStats>>,
    sensors: Vec<NodeSummary<SensorStats>>,
}

fn collect_summary(sim: &Simulator, world: &NetWorld, layout: &ClusterLayout, mode: CommMode) -> Summary {
    let net = &world.net;
    let heads = layout
        .heads
        .iter()
        .filter_map(|&id| {
            net.node::<HeadNode>(id).map(|h| NodeSummary {
                id: id.0,
                name: net.name(id).to_string(),
                queued: h.uplink_len() + h.local_len(),
                stats: h.stats().clone(),
            })
        })
        .collect();
    let sensors = layout
        .all_sensors()
        .filter_map(|id| {
            net.node::<SensorNode>(id).map(|s| NodeSummary {
                id: id.0,
                name: net.name(id).to_string(),
                queued: s.queue_len(),
                stats: s.stats().clone(),
            })
        })
        .collect();
    Summary {
        sim_time_s: sim.now().as_secs_f64(),
        events: sim.executed(),
        comm_mode: mode,
        network: net.stats.clone(),
        sink: net.sink.clone(),
        auv: net.node::<Auv>(layout.auv).map(|a| a.stats().clone()),
        heads,
        sensors,
    }
}

fn print_summary(s: &Summary) {
    println!(
        "summary sim_time_s={:.3} events={} mode={} delivered={} mean_latency_s={:.3} collisions={} corrupted_rx={}",
        s.sim_time_s,
        s.events,
        s.comm_mode.label(),
        s.sink.received,
        s.sink.mean_latency_s().unwrap_or(0.0),
        s.network.collisions,
        s.network.rx_corrupted,
    );
    let tx = PacketKind::ALL
        .iter()
        .map(|k| format!("{}={}", k.label(), s.network.tx_of(*k)))
        .collect::<Vec<_>>()
        .join(" ");
    println!("tx {tx}");
    if !s.network.drops.is_empty() {
        let drops = s
            .network
            .drops
            .iter()
            .map(|(code, n)| format!("{code}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("drops {drops}");
    }
    for (origin, n) in &s.sink.by_origin {
        println!("delivered origin={origin} count={n}");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    let spec = match ScenarioSpec::load(&args.scenario) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };

    let opts = BuildOpts {
        comm_mode: args.mode.map(Into::into),
        tx_mode: args.tx_mode.map(Into::into),
        seed: args.seed,
        viz: args.viz_json.is_some(),
    };
    let mode = opts.comm_mode.unwrap_or_else(|| spec.comm_mode());

    let mut sim = Simulator::default();
    let (mut world, layout) = build_scenario(&mut sim, &spec, &opts);
    sim.run_until(SimTime::from_secs_f64(args.until_s), &mut world);

    let summary = collect_summary(&sim, &world, &layout, mode);
    print_summary(&summary);

    if let Some(path) = args.summary_json {
        let json = serde_json::to_string_pretty(&summary).expect("serialize summary");
        fs::write(&path, json).expect("write summary json");
        eprintln!("wrote summary to {}", path.display());
    }

    if let Some(path) = args.viz_json {
        if let Some(v) = world.net.viz.take() {
            let json = serde_json::to_string_pretty(&v.events).expect("serialize viz events");
            fs::write(&path, json).expect("write viz json");
            eprintln!("wrote viz events to {}", path.display());
        }
    }
}
