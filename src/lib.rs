//! ResizeProbe - memory profile of batch image resizing
//!
//! Resizes a directory of images through one of three processing variants,
//! samples the process memory after every file and renders the samples as a
//! line chart.
//!
//! # Variants
//!
//! - **stream**: sequential, buffered streaming through the codec, with a
//!   settle pause after each file and idle samples at the end
//! - **worker**: one worker job per file; both the coordinator and the
//!   workers record samples, giving two charts
//! - **direct**: sequential, whole-file open and save, idle samples at the end
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use resizeprobe::{Config, MemoryProbe, Runner, Variant};
//!
//! # async fn demo() -> resizeprobe::Result<()> {
//! let runner = Runner::new(Config::default(), Arc::new(MemoryProbe::new()));
//! let report = runner.run(Variant::Stream).await?;
//!
//! println!("{} files, {} samples", report.processed, report.samples.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod chart;
pub mod config;
pub mod error;
pub mod memory;
pub mod parallel;
pub mod processing;
pub mod runner;
pub mod samples;

// Re-export commonly used types
pub use config::{Config, ImageFormat, ResizeConfig};
pub use error::{Result, ProbeError};
pub use memory::{CountingAllocator, MemoryProbe, MemoryUsage};
pub use processing::{Pipeline, ProcessingEngine};
pub use runner::{RunReport, Runner, Variant};
pub use samples::{MemorySample, SampleLog};

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging from `RUST_LOG`
///
/// Should be called once at program start; later calls leave the installed
/// subscriber in place.
pub fn init() -> Result<()> {
    if tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish()
    ).is_ok() {
        info!("ResizeProbe v{} initialized", VERSION);
    }

    check_system();
    Ok(())
}

/// Initialize logging from the `logging` section of `config`
///
/// Logs go to stderr so stdout stays free for `--json` output.
pub fn init_with_config(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.logging.level)
        .map_err(|e| ProbeError::config(format!("Invalid log filter {:?}: {}", config.logging.level, e)))?;

    let installed = if config.logging.json_format {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber).is_ok()
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber).is_ok()
    };

    if installed {
        info!("ResizeProbe v{} initialized with custom config", VERSION);
    }

    check_system();
    Ok(())
}

fn check_system() {
    let probe = MemoryProbe::new();
    let system = probe.system_memory();

    const MIN_MEMORY_MB: u64 = 256;
    if system.available < MIN_MEMORY_MB * 1024 * 1024 {
        warn!(
            "Low available memory: {}MB (recommended: >{}MB)",
            system.available / (1024 * 1024),
            MIN_MEMORY_MB
        );
    }

    if !memory::heap::is_tracking() {
        debug!("Counting allocator not installed, heap figures will read zero");
    }
    debug!("Detected {} CPU cores", num_cpus::get());
}
