use clap::{Args, Parser, Subcommand};
use blockflow::convert::{compress_file, decompress_file};
use blockflow::options::ConvertOptions;
use blockflow::pipeline::RunReport;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blockflow", version, about = "Multi-threaded block compression")]
struct Cli {
    /// Log pipeline stages at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a framed block stream
    Compress(ConvertArgs),
    /// Restore a file produced by `compress`
    Decompress(ConvertArgs),
}

#[derive(Args)]
struct ConvertArgs {
    source: PathBuf,
    destination: PathBuf,
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Block size in bytes
    #[arg(short, long)]
    block_size: Option<usize>,
    /// Codec: gzip (default), zstd, lz4, brotli, lzma, none
    #[arg(short, long)]
    codec: Option<String>,
    /// Compression level (gzip 0-9; zstd 1-22; brotli 0-11; ignored otherwise)
    #[arg(short, long)]
    level: Option<i32>,
    /// Worker threads (default: available parallelism)
    #[arg(short, long)]
    workers: Option<usize>,
    /// Bounded wait for each queue operation, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl ConvertArgs {
    fn options(&self) -> blockflow::Result<ConvertOptions> {
        let mut opts = match &self.config {
            Some(path) => ConvertOptions::from_json_file(path)?,
            None       => ConvertOptions::default(),
        };
        if let Some(v) = self.block_size  { opts.block_size = v; }
        if let Some(v) = &self.codec      { opts.codec = v.clone(); }
        if let Some(v) = self.level       { opts.level = v; }
        if let Some(v) = self.workers     { opts.workers = Some(v); }
        if let Some(v) = self.timeout_ms  { opts.queue_timeout_ms = v; }
        Ok(opts)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();

    let (args, compress) = match &cli.command {
        Commands::Compress(args)   => (args, true),
        Commands::Decompress(args) => (args, false),
    };

    match run(args, compress) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            eprintln!("\n{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &ConvertArgs, compress: bool) -> blockflow::Result<RunReport> {
    let opts = args.options()?;
    info!(
        source = %args.source.display(),
        destination = %args.destination.display(),
        codec = %opts.codec,
        block_size = opts.block_size,
        "{}",
        if compress { "compressing" } else { "decompressing" }
    );

    let existed = args.destination.exists();
    let result = if compress {
        compress_file(&args.source, &args.destination, &opts)
    } else {
        decompress_file(&args.source, &args.destination, &opts)
    };
    if result.is_err() && !existed {
        discard_partial(&args.destination);
    }
    result
}

/// The library never rolls back; the CLI drops a destination it created.
fn discard_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            error!("could not remove partial output {}: {e}", path.display());
        }
    }
}

fn print_report(report: &RunReport) {
    let ratio = if report.bytes_in == 0 {
        1.0
    } else {
        report.bytes_out as f64 / report.bytes_in as f64
    };
    println!(
        "{:<10} {} block(s)  {} B → {} B  ({:.1}%)  {} worker(s)  {:.2?}",
        report.direction.name(),
        report.blocks_written,
        report.bytes_in,
        report.bytes_out,
        ratio * 100.0,
        report.workers,
        report.elapsed,
    );
}
