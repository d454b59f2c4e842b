//! tinsimp: streaming terrain simplification into error-bounded TINs
//!
//! Reads a line stream from stdin (or `--input`) and writes the simplified
//! stream to stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::PathBuf;
use std::time::Duration;
use tinsimp_pipeline::{DecimationProcessor, ProcessorConfig, RefinementProcessor, SchedulerConfig};
use tinsimp_simplification::{
    DecimationConfig, RefinementConfig, RefinementStrategy, SeamPolicy, SeedConfig,
};

#[derive(Parser)]
#[command(name = "tinsimp")]
#[command(about = "streaming terrain simplification -- error-bounded TINs from point streams")]
#[command(author, version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::WarnLevel>,
}

#[derive(Subcommand)]
enum Command {
    /// Refine a cell stream: keep the fewest points that reproduce the terrain
    Refine(RefineArgs),
    /// Decimate a star stream: drop vertices that do not change the surface
    Decimate(DecimateArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    TriangleScan,
    LazyRecheck,
}

impl From<Strategy> for RefinementStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::TriangleScan => RefinementStrategy::TriangleScan,
            Strategy::LazyRecheck => RefinementStrategy::LazyRecheck,
        }
    }
}

#[derive(Args)]
struct RefineArgs {
    /// Maximum vertical error of the output surface
    #[arg(long, default_value_t = 0.2)]
    threshold: f64,

    /// Cells refined concurrently (default: number of CPUs)
    #[arg(long)]
    workers: Option<usize>,

    /// Nearest points averaged for each corner elevation
    #[arg(long, default_value_t = 10)]
    neighbors: usize,

    /// Inward offset of the corners on the maximum cell edges
    #[arg(long, default_value_t = 1e-5)]
    corner_inset: f64,

    #[arg(long, value_enum, default_value_t = Strategy::TriangleScan)]
    strategy: Strategy,

    /// Leave the four seeded corners out of each cell's output
    #[arg(long)]
    strip_corners: bool,

    /// Always keep points within this distance of a cell edge
    #[arg(long, value_name = "TOL")]
    pin_edges: Option<f64>,

    /// The stream starts with sprinkle points, passed through until `# endsprinkle`
    #[arg(long)]
    sprinkle: bool,

    /// Wait between checks while all workers are busy, in milliseconds
    #[arg(long, default_value_t = 50)]
    poll_ms: u64,

    /// Read from this file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,
}

#[derive(Args)]
struct DecimateArgs {
    /// Vertices whose removal changes z by less than this are removed
    #[arg(long, default_value_t = 0.2)]
    threshold: f64,

    /// Removals between full queue recomputations
    #[arg(long, default_value_t = 100)]
    refresh_interval: usize,

    /// Vertices received between decimation rounds
    #[arg(long, default_value_t = 100_000)]
    batch_size: usize,

    /// Recompute each popped removal delta before acting on it
    #[arg(long)]
    recheck_on_pop: bool,

    /// Skip the final verification pass
    #[arg(long)]
    no_verify: bool,

    /// Read from this file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,
}

fn open_input(path: &Option<PathBuf>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("cannot open input file {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn refine(args: RefineArgs) -> Result<()> {
    let seam = match args.pin_edges {
        Some(tolerance) => SeamPolicy::PinCellEdges { tolerance },
        None => SeamPolicy::ErrorDriven,
    };
    let refinement = RefinementConfig::default()
        .with_threshold(args.threshold)
        .with_strategy(args.strategy.into())
        .with_seeding(
            SeedConfig::default()
                .with_neighbors(args.neighbors)
                .with_corner_inset(args.corner_inset),
        )
        .with_seam(seam)
        .with_strip_corners(args.strip_corners);

    let mut scheduler = SchedulerConfig::default().with_poll_interval(Duration::from_millis(args.poll_ms));
    if let Some(workers) = args.workers {
        scheduler = scheduler.with_max_workers(workers);
    }

    let config = ProcessorConfig::default()
        .with_refinement(refinement)
        .with_scheduler(scheduler)
        .with_expect_sprinkle(args.sprinkle);
    info!(
        "Refining with threshold {} ({} strategy, {} workers)",
        refinement.threshold, refinement.strategy, config.scheduler.max_workers
    );

    let input = open_input(&args.input)?;
    let sink = BufWriter::new(io::stdout());
    let mut processor = RefinementProcessor::new(config, sink).context("invalid refinement settings")?;
    processor
        .run(input)
        .with_context(|| format!("refinement stopped at line {}", processor.line_number()))?;
    let (summary, _) = processor.finish().context("refinement did not complete")?;

    info!(
        "{} lines, {} points, {} cells, {} vertices written, peak {} workers, {} stalls",
        summary.lines,
        summary.points,
        summary.cells_finalized,
        summary.scheduler.vertices_written,
        summary.scheduler.peak_live,
        summary.scheduler.stalls
    );
    Ok(())
}

fn decimate(args: DecimateArgs) -> Result<()> {
    let config = DecimationConfig::default()
        .with_threshold(args.threshold)
        .with_refresh_interval(args.refresh_interval)
        .with_batch_size(args.batch_size)
        .with_recheck_on_pop(args.recheck_on_pop)
        .with_verify(!args.no_verify);
    info!("Decimating with threshold {}", config.threshold);

    let input = open_input(&args.input)?;
    let sink = BufWriter::new(io::stdout());
    let mut processor = DecimationProcessor::new(config, sink).context("invalid decimation settings")?;
    processor
        .run(input)
        .with_context(|| format!("decimation stopped at line {}", processor.line_number()))?;
    let (summary, stats, _) = processor.finish().context("decimation did not complete")?;

    info!(
        "{} lines, {} vertices received, {} removed, {} faces written",
        summary.lines, stats.received, stats.removed, stats.written_faces
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    match cli.command {
        Command::Refine(args) => refine(args),
        Command::Decimate(args) => decimate(args),
    }
}
