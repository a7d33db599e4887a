//! ResizeProbe CLI - resize a directory of images and chart memory usage
//!
//! Runs one of the stream, worker or direct variants and writes the resized
//! images plus PNG charts of the memory samples.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use resizeprobe::memory::bytes_to_mb;
use resizeprobe::{
    init_with_config, Config, CountingAllocator, ImageFormat, MemoryProbe, RunReport, Runner, Variant,
};

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

/// ResizeProbe - memory profile of batch image resizing
#[derive(Parser)]
#[command(
    name = "resizeprobe",
    version,
    about = "Resize a directory of images and chart the process memory along the way",
    long_about = "ResizeProbe resizes every image in a directory through one of three \
                  processing variants (stream, worker, direct), samples the process memory \
                  after each file and renders the samples as PNG line charts."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Input directory
    #[arg(short, long, value_name = "DIR", global = true)]
    input: Option<PathBuf>,

    /// Output directory for resized images
    #[arg(short, long, value_name = "DIR", global = true)]
    output: Option<PathBuf>,

    /// Directory charts are written to
    #[arg(short = 'd', long, value_name = "DIR", global = true)]
    charts_dir: Option<PathBuf>,

    /// Target width in pixels
    #[arg(short, long, value_name = "PIXELS", global = true)]
    width: Option<u32>,

    /// Output format (default: PNG for stream/worker, input format for direct)
    #[arg(short, long, value_enum, value_name = "FORMAT", global = true)]
    format: Option<CliImageFormat>,

    /// Number of samples taken after the last file
    #[arg(long, value_name = "COUNT", global = true)]
    idle_samples: Option<u32>,

    /// Pause before each idle sample
    #[arg(long, value_name = "MS", global = true)]
    idle_interval_ms: Option<u64>,

    /// Pause after each file (stream variant)
    #[arg(long, value_name = "MS", global = true)]
    settle_interval_ms: Option<u64>,

    /// Upper bound on concurrent workers (worker variant)
    #[arg(long, value_name = "COUNT", global = true)]
    max_workers: Option<usize>,

    /// TrueType font for chart text
    #[arg(long, value_name = "FILE", global = true)]
    font: Option<PathBuf>,

    /// Process input subdirectories too
    #[arg(short = 'R', long, global = true)]
    recursive: bool,

    /// Print the sample logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true, env = "RESIZEPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, conflicts_with = "verbose", global = true)]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Process the input directory and write memory charts
    Run {
        /// Processing variant
        #[arg(value_enum)]
        variant: CliVariant,
    },
    /// Validate configuration file
    Config {
        /// Configuration file to validate
        file: PathBuf,
    },
    /// Generate example configuration file
    ExampleConfig {
        /// Output file path
        #[arg(default_value = "resizeprobe.toml")]
        path: PathBuf,
        /// Use YAML format instead of TOML
        #[arg(long)]
        yaml: bool,
    },
    /// Show system memory and a sample of this process
    Info,
}

/// CLI-compatible image format enum
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
    Tiff,
    Bmp,
}

impl From<CliImageFormat> for ImageFormat {
    fn from(format: CliImageFormat) -> Self {
        match format {
            CliImageFormat::Jpeg => ImageFormat::Jpeg,
            CliImageFormat::Png => ImageFormat::Png,
            CliImageFormat::Webp => ImageFormat::WebP,
            CliImageFormat::Gif => ImageFormat::Gif,
            CliImageFormat::Tiff => ImageFormat::Tiff,
            CliImageFormat::Bmp => ImageFormat::Bmp,
        }
    }
}

/// CLI-compatible variant enum
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliVariant {
    Stream,
    Worker,
    Direct,
}

impl From<CliVariant> for Variant {
    fn from(variant: CliVariant) -> Self {
        match variant {
            CliVariant::Stream => Variant::Stream,
            CliVariant::Worker => Variant::Worker,
            CliVariant::Direct => Variant::Direct,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_cli(cli).await {
        eprintln!("{}: {:#}", style("Error").red().bold(), e);
        process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Config { file } => validate_config_file(file),
        Commands::ExampleConfig { path, yaml } => generate_example_config(path, *yaml),
        Commands::Info => {
            let config = load_config(&cli)?;
            init_with_config(&config)?;
            show_system_info();
            Ok(())
        }
        Commands::Run { variant } => {
            let config = load_config(&cli)?;
            init_with_config(&config)?;
            run_variant(&cli, config, (*variant).into()).await
        }
    }
}

/// Load the config file (if any) and merge CLI overrides on top
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(input) = &cli.input {
        config.processing.input_dir = input.clone();
    }
    if let Some(output) = &cli.output {
        config.processing.output_dir = output.clone();
    }
    if let Some(width) = cli.width {
        config.processing.width = width;
    }
    if let Some(format) = cli.format {
        config.processing.format = Some(format.into());
    }
    if cli.recursive {
        config.processing.recursive = true;
    }
    if let Some(count) = cli.idle_samples {
        config.sampling.idle_samples = count;
    }
    if let Some(ms) = cli.idle_interval_ms {
        config.sampling.idle_interval_ms = ms;
    }
    if let Some(ms) = cli.settle_interval_ms {
        config.sampling.settle_interval_ms = ms;
    }
    if let Some(max_workers) = cli.max_workers {
        config.workers.max_workers = Some(max_workers);
    }
    if let Some(dir) = &cli.charts_dir {
        config.chart.output_dir = Some(dir.clone());
    }
    if let Some(font) = &cli.font {
        config.chart.font = Some(font.clone());
    }

    if cli.quiet {
        config.logging.level = "error".to_string();
    } else if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}

async fn run_variant(cli: &Cli, config: Config, variant: Variant) -> anyhow::Result<()> {
    info!("Input: {:?}", config.processing.input_dir);
    info!("Output: {:?}", config.processing.output_dir);
    debug!("Configuration: {:?}", config);

    let probe = Arc::new(MemoryProbe::new());
    let mut runner = Runner::new(config, probe);

    if !cli.json && !cli.quiet {
        let progress = ProgressBar::new(0);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        runner = runner.with_progress(progress);
    }

    let report = runner
        .run(variant)
        .await
        .with_context(|| format!("{} variant failed", variant))?;

    print_summary(&report, cli.json)
}

/// Validate configuration file
fn validate_config_file(file_path: &Path) -> anyhow::Result<()> {
    let config = Config::from_file(file_path)?;
    config.validate()?;

    println!("{}: Configuration file is valid", style("Success").green().bold());
    println!("Input: {}", config.processing.input_dir.display());
    println!("Width: {}px", config.processing.width);
    println!(
        "Workers: {}",
        config
            .workers
            .max_workers
            .map_or_else(|| "one per file".to_string(), |n| n.to_string())
    );

    Ok(())
}

/// Generate example configuration file
fn generate_example_config(output_path: &Path, use_yaml: bool) -> anyhow::Result<()> {
    let output_path = if use_yaml {
        output_path.with_extension("yaml")
    } else {
        output_path.to_path_buf()
    };

    Config::default().to_file(&output_path)?;

    let format = if use_yaml { "YAML" } else { "TOML" };
    println!(
        "{}: Generated example {} configuration: {}",
        style("Success").green().bold(),
        format,
        output_path.display()
    );

    Ok(())
}

/// Show system information
fn show_system_info() {
    let probe = MemoryProbe::new();
    let system = probe.system_memory();
    let usage = probe.sample();

    println!("{}", style("ResizeProbe System Information").bold());
    println!();
    println!("{}: {}", style("Version").bold(), resizeprobe::VERSION);
    println!();

    println!("{}", style("System:").bold());
    println!("  CPUs: {}", num_cpus::get());
    println!(
        "  Memory: {:.2} GB total, {:.2} GB available",
        bytes_to_mb(system.total) / 1024.0,
        bytes_to_mb(system.available) / 1024.0
    );
    println!();

    println!("{}", style("This process:").bold());
    println!("  RSS: {:.2} MB", bytes_to_mb(usage.rss));
    println!("  Heap total: {:.2} MB", bytes_to_mb(usage.heap_total));
    println!("  Heap used: {:.2} MB", bytes_to_mb(usage.heap_used));
    println!("  External: {:.2} MB", bytes_to_mb(usage.external));
    println!();

    println!("{}", style("Supported Formats:").bold());
    println!("  Input: JPEG, PNG, WebP, GIF, TIFF, BMP");
    println!("  Output: JPEG, PNG, WebP, GIF, TIFF, BMP");
}

/// Print the run summary
fn print_summary(report: &RunReport, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        let json = serde_json::json!({
            "variant": report.variant,
            "processed": report.processed,
            "failed": report.failed,
            "samples": report.samples,
            "worker_samples": report.worker_samples,
            "charts": report.charts,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!();
    println!("{}", style("Processing Summary:").bold());
    println!("  {}: {}", style("Variant").cyan(), report.variant);
    println!("  {}: {}", style("Processed").green(), report.processed);
    if report.failed > 0 {
        println!("  {}: {}", style("Failed").red(), report.failed);
    }
    println!("  {}: {}", style("Samples").cyan(), report.samples.len());
    println!("  {}: {:.2}s", style("Duration").blue(), report.duration.as_secs_f64());

    if let Some(peak) = report.samples.iter().map(|s| s.rss).max() {
        println!("  {}: {:.2}MB", style("Peak RSS").cyan(), bytes_to_mb(peak));
    }
    for chart in &report.charts {
        println!("  {}: {}", style("Chart").cyan(), chart.display());
    }

    Ok(())
}
