use clap::{Parser, Subcommand};
use serde::Serialize;
use sll_common::db::circuit::DelayTable;
use sll_common::util::config::Config;
use sll_common::util::generator::{self, Benchmark};
use sll_common::util::logger;
use sll_router::{SllNetTable, check};
use sll_timing::TimingGraph;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Overrides the generator seed from the configuration.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, time and route a benchmark, then verify the result.
    Route {
        /// Write the routing summary as TOML.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
    /// Build the timing graph and report delays and the critical path.
    Timing,
    /// Summarize the synthetic benchmark.
    Generate,
}

#[derive(Serialize)]
struct ReportFile {
    legal: bool,
    trials: usize,
    elapsed_ms: u64,
    wirelength: i64,
    max_delay_ns: f64,
    overused_nodes: usize,
    nets: usize,
    connections: usize,
    cross_die_connections: usize,
    pres_fac_history: Vec<f64>,
    reroute_history: Vec<usize>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    let mut config = if args.config.exists() {
        log::info!("Loading configuration from {:?}", args.config);
        let config_str = std::fs::read_to_string(&args.config)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config TOML: {}", e))?
    } else {
        log::warn!(
            "Configuration file {:?} not found. Using internal defaults.",
            args.config
        );
        Config::default()
    };
    if let Some(seed) = args.seed {
        config.generator.seed = seed;
    }

    let command = args.command.unwrap_or(Commands::Route { report: None });
    match command {
        Commands::Generate => {
            let bench = generate(&config)?;
            summarize(&bench);
        }
        Commands::Timing => run_timing(&config)?,
        Commands::Route { report } => {
            if !run_routing(&config, report.as_deref())? {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn generate(config: &Config) -> anyhow::Result<Benchmark> {
    generator::generate(&config.generator, &config.delay)
        .map_err(|e| anyhow::anyhow!("Benchmark generation failed: {}", e))
}

fn summarize(bench: &Benchmark) {
    let cross_die = bench.nets.iter().filter(|n| n.crossing_x.is_some()).count();
    let sinks: usize = bench.nets.iter().map(|n| n.sinks.len()).sum();
    log::info!(
        "Benchmark: {} dies, {} blocks, {} pins, {} clock domains",
        bench.circuit.num_dies,
        bench.circuit.num_blocks(),
        bench.circuit.num_pins(),
        bench.circuit.num_clock_domains()
    );
    log::info!(
        "Nets: {} ({} cross-die), {} sinks, {} route nodes",
        bench.nets.len(),
        cross_die,
        sinks,
        bench.rrg.num_nodes()
    );
}

fn build_timing(config: &Config, bench: &Benchmark) -> anyhow::Result<TimingGraph> {
    let delays = DelayTable::from_config(&config.delay);
    let mut timing = TimingGraph::build(&bench.circuit, &delays)
        .map_err(|e| anyhow::anyhow!("Timing graph construction failed: {}", e))?;
    timing.initialize_timing(&config.timing);
    Ok(timing)
}

fn run_timing(config: &Config) -> anyhow::Result<()> {
    let bench = generate(config)?;
    summarize(&bench);
    let mut timing = build_timing(config, &bench)?;
    timing.summary().log_report(&bench.circuit);
    for line in timing.critical_path_string(&bench.circuit).lines() {
        log::info!("{}", line);
    }
    Ok(())
}

/// Returns whether the routing is legal.
fn run_routing(config: &Config, report_path: Option<&Path>) -> anyhow::Result<bool> {
    let mut bench = generate(config)?;
    summarize(&bench);
    let timing = build_timing(config, &bench)?;
    let table = SllNetTable::from_generated(&bench.nets);

    log::info!("Starting Routing...");
    let (mut router, report) = sll_router::route(&mut bench.circuit, &bench.rrg, &table, Some(timing), config)
        .map_err(|e| anyhow::anyhow!("Routing aborted: {}", e))?;

    if report.legal {
        check::run(&router).map_err(|e| anyhow::anyhow!("Verification Failed: {}", e))?;
    }

    if let Some(timing) = router.timing_mut() {
        timing.summary().log_report(&bench.circuit);
        for line in timing.critical_path_string(&bench.circuit).lines() {
            log::info!("{}", line);
        }
    }

    if let Some(path) = report_path {
        let netlist = router.netlist();
        let file = ReportFile {
            legal: report.legal,
            trials: report.trials,
            elapsed_ms: report.elapsed_ms as u64,
            wirelength: report.wirelength,
            max_delay_ns: report.max_delay,
            overused_nodes: report.overused.len(),
            nets: netlist.num_nets(),
            connections: netlist.num_connections(),
            cross_die_connections: netlist.connections.iter().filter(|c| c.is_cross_die()).count(),
            pres_fac_history: report.pres_fac_history.clone(),
            reroute_history: report.reroute_history.clone(),
        };
        prepare_output_dir(path)?;
        std::fs::write(path, toml::to_string_pretty(&file)?)?;
        log::info!("Wrote routing report to {:?}", path);
    }

    Ok(report.legal)
}

fn prepare_output_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() && !parent.as_os_str().is_empty() {
            log::info!("Creating output directory: {:?}", parent);
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
