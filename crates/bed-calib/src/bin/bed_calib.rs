//! `bed-calib`: dry runs of the bed calibration against a simulated printer.
//!
//! - `init-config`: write a default JSON configuration,
//! - `simulate`: run coarse detection and refinement (or the diagnostic
//!   scan) and write a JSON report.

use std::path::PathBuf;
use std::process::ExitCode;

use bed_calib::core::{
    ByteStore, CalibrationStorage, FileStore, MemoryStore, StorageError, World2Machine,
};
use bed_calib::io::{CalibrationConfig, CalibrationReport, ConfigError};
use bed_calib::probe::SimulatedBed;
use bed_calib::{BedCalibrator, GridMesh, LogStatus, Machine, NoWatchdog, RefineStrategy};
use clap::{Parser, Subcommand, ValueEnum};

#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

#[derive(Parser, Debug)]
#[command(name = "bed-calib", version)]
#[command(about = "Printer bed skew and offset calibration against a simulated bed")]
struct Args {
    /// Log level filter (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: log::LevelFilter,

    /// Emit JSON logs through the tracing subscriber
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the calibration against the simulated bed of a config file
    Simulate {
        /// JSON configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Report path, overrides the config
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Refinement strategy for the points behind the first row
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Extra diagnostic output, overrides the config
        #[arg(short, long)]
        verbosity: Option<i8>,

        /// Refine with the stored correction instead of running the coarse pass first
        #[arg(long)]
        skip_coarse: bool,

        /// Only run the diagnostic scan
        #[arg(long, conflicts_with = "skip_coarse")]
        scan: bool,
    },

    /// Write a default configuration
    InitConfig {
        #[arg(short, long, default_value = "bed_calib.json")]
        out: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Star,
    Cross,
}

impl From<StrategyArg> for RefineStrategy {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::Star => RefineStrategy::Star,
            StrategyArg::Cross => RefineStrategy::Cross,
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Logger(#[from] log::SetLoggerError),
}

fn init_logging(args: &Args) -> Result<(), CliError> {
    #[cfg(feature = "tracing")]
    {
        let _ = LogTracer::init();
        log::set_max_level(args.log_level);
        bed_calib::core::init_tracing(args.json_log);
        Ok(())
    }
    #[cfg(not(feature = "tracing"))]
    {
        bed_calib::core::init_with_level(args.log_level)?;
        Ok(())
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ExitCode, CliError> {
    init_logging(args)?;
    match &args.command {
        Command::InitConfig { out } => {
            CalibrationConfig::default().write_json(out)?;
            println!("wrote default config to {}", out.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Simulate {
            config,
            out,
            strategy,
            verbosity,
            skip_coarse,
            scan,
        } => {
            let mut cfg = CalibrationConfig::load_json(config)?;
            if let Some(s) = strategy {
                cfg.strategy = (*s).into();
            }
            if let Some(v) = verbosity {
                cfg.verbosity = *v;
            }
            if let Some(out) = out {
                cfg.output_path = Some(out.to_string_lossy().into_owned());
            }
            simulate(&cfg, config, *skip_coarse, *scan)
        }
    }
}

fn simulate(
    cfg: &CalibrationConfig,
    config_path: &std::path::Path,
    skip_coarse: bool,
    scan_only: bool,
) -> Result<ExitCode, CliError> {
    let params = cfg.params.clone();
    let mut bed = SimulatedBed::from_config(&cfg.sim, params.limits);
    let mut store: Box<dyn ByteStore> = match &cfg.storage_path {
        Some(path) => Box::new(FileStore::open(path)?),
        None => Box::new(MemoryStore::new()),
    };
    let mut w2m = World2Machine::initialize(&mut CalibrationStorage::new(&mut *store));
    let mut mesh = GridMesh::new();
    let calib = BedCalibrator::new(params);
    let v = cfg.verbosity;

    let mut report = CalibrationReport::new(config_path);
    let mut failed = false;
    {
        let mut m = Machine {
            motion: &mut bed,
            storage: &mut *store,
            mesh: &mut mesh,
            watchdog: &mut NoWatchdog,
            status: &mut LogStatus,
            w2m: &mut w2m,
        };

        if scan_only {
            let run = calib.scan(&mut m, v);
            println!("scan complete: {}", run.complete);
            failed = !run.complete;
            report.scan = Some(run);
        } else {
            if !skip_coarse {
                let run = calib.coarse(&mut m, v);
                println!("coarse: {}", run.result);
                failed = run.result.is_failed();
                report.coarse = Some(run);
            }
            if !failed {
                let run = calib.refine(&mut m, cfg.strategy, v);
                println!("refine: {}", run.result);
                failed = run.result.is_failed();
                report.refine = Some(run);
            }
        }
    }

    report.correction = w2m.correction();
    report.z_jitter = CalibrationStorage::new(&mut *store).z_jitter()?;
    report.moves = bed.moves();

    let out = cfg.output_path();
    report.write_json(&out)?;
    println!("wrote report to {}", out.display());

    Ok(if failed {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}
