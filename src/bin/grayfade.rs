use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "grayfade", version)]
struct Cli {
    /// Log debug events.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fade with cooperating row-partitioned workers.
    Dist(DistArgs),
    /// Fade in one process on a rayon thread pool.
    Threaded(ThreadedArgs),
    /// Fade in one process on one thread.
    Sequential(SequentialArgs),
    /// Time the sequential reference and derive speedup/efficiency of a parallel run.
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Directory for the frame PNGs.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// File name prefix for the frame PNGs.
    #[arg(long)]
    prefix: Option<String>,

    /// Skip frames that fail to encode instead of aborting.
    #[arg(long)]
    skip_failed_frames: bool,
}

#[derive(Parser, Debug)]
struct DistArgs {
    /// Input image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Pipeline options JSON; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of workers, the coordinator included.
    #[arg(long)]
    workers: Option<usize>,

    /// Rayon threads inside each worker.
    #[arg(long)]
    threads_per_worker: Option<usize>,

    /// Number of frames.
    #[arg(long)]
    frames: Option<u64>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Parser, Debug)]
struct ThreadedArgs {
    /// Input image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Rayon worker threads.
    #[arg(long)]
    threads: usize,

    /// Number of frames.
    #[arg(long, default_value_t = grayfade::DEFAULT_FRAME_COUNT)]
    frames: u64,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Parser, Debug)]
struct SequentialArgs {
    /// Input image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Number of frames.
    #[arg(long, default_value_t = grayfade::DEFAULT_FRAME_COUNT)]
    frames: u64,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Side length the image is resized to before timing.
    #[arg(long)]
    size: u32,

    /// Input image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Measured parallel time in seconds.
    #[arg(long, requires = "processors")]
    parallel_secs: Option<f64>,

    /// Processor count of the parallel run.
    #[arg(long, requires = "parallel_secs")]
    processors: Option<usize>,

    /// Number of frames.
    #[arg(long, default_value_t = grayfade::DEFAULT_FRAME_COUNT)]
    frames: u64,
}

fn main() -> anyhow::Result<()> {
    // Usage errors exit 1 like every other failure; --help and --version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };
    init_tracing(cli.verbose, cli.quiet);
    match cli.cmd {
        Command::Dist(args) => cmd_dist(args),
        Command::Threaded(args) => cmd_threaded(args),
        Command::Sequential(args) => cmd_sequential(args),
        Command::Analyze(args) => cmd_analyze(args),
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else if quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_opts_json(path: &Path) -> anyhow::Result<grayfade::PipelineOpts> {
    let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
    let r = BufReader::new(f);
    let opts = serde_json::from_reader(r).with_context(|| "parse pipeline options JSON")?;
    Ok(opts)
}

fn load_source(path: &Path) -> anyhow::Result<grayfade::PixelBuffer> {
    grayfade::codec::decode(path).with_context(|| format!("load source '{}'", path.display()))
}

fn encode_policy(output: &OutputArgs) -> grayfade::EncodeErrorPolicy {
    if output.skip_failed_frames {
        grayfade::EncodeErrorPolicy::Skip
    } else {
        grayfade::EncodeErrorPolicy::Abort
    }
}

fn png_sink(output: &OutputArgs, default_prefix: String) -> grayfade::PngSequenceSink {
    grayfade::PngSequenceSink::new(grayfade::OutputOpts {
        dir: output.out_dir.clone(),
        prefix: output.prefix.clone().unwrap_or(default_prefix),
    })
}

fn report_done(label: &str, report: &grayfade::RunReport, out_dir: &Path) {
    println!(
        "{label} compute time: {} ms",
        report.compute_elapsed.as_millis()
    );
    eprintln!(
        "wrote {} frames to {}{}",
        report.frames_emitted,
        out_dir.display(),
        if report.frames_skipped > 0 {
            format!(" ({} skipped)", report.frames_skipped)
        } else {
            String::new()
        }
    );
}

fn cmd_dist(args: DistArgs) -> anyhow::Result<()> {
    let mut opts = match &args.config {
        Some(path) => read_opts_json(path)?,
        None => grayfade::PipelineOpts::default(),
    };
    if let Some(n) = args.workers {
        opts.workers = n;
    }
    if args.threads_per_worker.is_some() {
        opts.threads_per_worker = args.threads_per_worker;
    }
    if let Some(n) = args.frames {
        opts.frame_count = n;
    }
    if args.output.skip_failed_frames {
        opts.on_encode_error = grayfade::EncodeErrorPolicy::Skip;
    }
    opts.validate()?;

    let source = load_source(&args.in_path)?;
    let mut sink = png_sink(&args.output, "frame_dist".to_owned());
    let report = grayfade::run_distributed(&source, &opts, &mut sink)?;
    report_done(
        &format!("distributed ({} workers)", opts.workers),
        &report,
        &args.output.out_dir,
    );
    Ok(())
}

fn cmd_threaded(args: ThreadedArgs) -> anyhow::Result<()> {
    let opts = grayfade::LocalRunOpts {
        frame_count: args.frames,
        threads: Some(args.threads),
        on_encode_error: encode_policy(&args.output),
    };
    let source = load_source(&args.in_path)?;
    let mut sink = png_sink(&args.output, format!("frame_threaded_{}", args.threads));
    let report = grayfade::run_local(&source, &opts, &mut sink)?;
    report_done(
        &format!("threaded ({} threads)", args.threads),
        &report,
        &args.output.out_dir,
    );
    Ok(())
}

fn cmd_sequential(args: SequentialArgs) -> anyhow::Result<()> {
    let opts = grayfade::LocalRunOpts {
        frame_count: args.frames,
        threads: None,
        on_encode_error: encode_policy(&args.output),
    };
    let source = load_source(&args.in_path)?;
    let mut sink = png_sink(&args.output, "frame_seq".to_owned());
    let report = grayfade::run_local(&source, &opts, &mut sink)?;
    report_done("sequential", &report, &args.output.out_dir);
    Ok(())
}

fn cmd_analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let source = load_source(&args.in_path)?;
    let source = grayfade::codec::resize_square(&source, args.size)?;

    println!(
        "measuring sequential time for {}x{}...",
        args.size, args.size
    );
    let sequential = grayfade::measure_sequential(&source, args.frames)?;
    let sequential_secs = sequential.as_secs_f64();
    println!("sequential time:   {sequential_secs:.4} s");

    let (Some(parallel_secs), Some(processors)) = (args.parallel_secs, args.processors) else {
        println!("pass --parallel-secs and --processors to derive speedup and efficiency");
        return Ok(());
    };
    let report = grayfade::PerformanceReport::new(sequential_secs, parallel_secs, processors)?;
    println!("----------------------------------");
    println!("parallel time:     {:.4} s", report.parallel_secs);
    println!("processors:        {}", report.processors);
    println!("speedup:           {:.4}", report.speedup);
    println!("efficiency:        {:.4}", report.efficiency);
    Ok(())
}
