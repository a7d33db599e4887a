//! The three processing variants
//!
//! Every variant enumerates the input directory, resizes each file, samples
//! memory and charts the samples. They differ in how files are dispatched
//! and which pipeline they run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chart::ChartRenderer;
use crate::config::{Config, ResizeConfig};
use crate::error::{Result, ProbeError};
use crate::memory::MemoryProbe;
use crate::parallel::WorkerPool;
use crate::processing::{discover_files, output_path_for, Pipeline, ProcessingEngine};
use crate::samples::{idle_label, MemorySample, SampleLog};

/// Processing variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Sequential, streamed pipeline, settle pause after each file
    Stream,
    /// One worker job per file, streamed pipeline
    Worker,
    /// Sequential, whole-file pipeline
    Direct,
}

impl Variant {
    pub fn pipeline(self) -> Pipeline {
        match self {
            Self::Stream | Self::Worker => Pipeline::Streamed,
            Self::Direct => Pipeline::Direct,
        }
    }

    /// File name of the chart built from the coordinator's samples
    pub fn chart_name(self) -> &'static str {
        match self {
            Self::Stream => "memoryUsageChart-stream.png",
            Self::Worker => "memoryUsageChart-from-master.png",
            Self::Direct => "memoryUsageChart-disk.png",
        }
    }

    /// File name of the chart built from the samples workers report
    pub fn worker_chart_name(self) -> Option<&'static str> {
        match self {
            Self::Worker => Some("memoryUsageData-from-workers.png"),
            Self::Stream | Self::Direct => None,
        }
    }

    /// Chart directory used when none is configured
    pub fn default_charts_dir(self) -> PathBuf {
        match self {
            Self::Worker => PathBuf::from("data"),
            Self::Stream | Self::Direct => PathBuf::from("."),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stream => "stream",
            Self::Worker => "worker",
            Self::Direct => "direct",
        };
        f.write_str(name)
    }
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub variant: Variant,
    /// Files resized successfully
    pub processed: usize,
    /// Files that failed and were skipped
    pub failed: usize,
    /// Samples taken by the coordinator
    pub samples: SampleLog,
    /// Samples reported by workers (worker variant only)
    pub worker_samples: Option<SampleLog>,
    /// Charts written
    pub charts: Vec<PathBuf>,
    pub duration: Duration,
}

/// Runs a variant end to end
pub struct Runner {
    config: Config,
    probe: Arc<MemoryProbe>,
    engine: ProcessingEngine,
    progress: Option<ProgressBar>,
}

impl Runner {
    pub fn new(config: Config, probe: Arc<MemoryProbe>) -> Self {
        let engine = ProcessingEngine::new(Arc::clone(probe.external()));
        Self {
            config,
            probe,
            engine,
            progress: None,
        }
    }

    /// Report per-file progress on `progress`
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process the input directory with `variant` and write its charts
    pub async fn run(&self, variant: Variant) -> Result<RunReport> {
        let start_time = Instant::now();
        let input_dir = &self.config.processing.input_dir;
        let files = discover_files(input_dir, self.config.processing.recursive)?;

        info!("Running {} variant on {} files from {:?}", variant, files.len(), input_dir);
        if let Some(progress) = &self.progress {
            progress.set_length(files.len() as u64);
        }

        let mut report = match variant {
            Variant::Stream | Variant::Direct => self.run_sequential(variant, files).await?,
            Variant::Worker => self.run_workers(files).await?,
        };

        if let Some(progress) = &self.progress {
            progress.finish_with_message("Processing complete");
        }

        report.charts = self.write_charts(&report)?;
        report.duration = start_time.elapsed();

        info!(
            "{} variant finished: {} processed, {} failed in {:.2}s",
            variant,
            report.processed,
            report.failed,
            report.duration.as_secs_f64()
        );
        Ok(report)
    }

    async fn run_sequential(&self, variant: Variant, files: Vec<PathBuf>) -> Result<RunReport> {
        let resize_config = self.resize_config();
        let settle = match variant {
            Variant::Stream => self.config.sampling.settle_interval(),
            Variant::Worker | Variant::Direct => Duration::ZERO,
        };

        let mut samples = SampleLog::new();
        let mut processed = 0;
        let mut failed = 0;

        for file in &files {
            let name = display_name(file);
            self.set_progress_message(&name);

            let output = self.output_path(file, variant);
            match self.process_one(file, &output, &resize_config, variant.pipeline()).await {
                Ok(()) => {
                    let usage = self.probe.sample();
                    info!("{}", usage);
                    samples.record(name, usage);
                    processed += 1;
                    self.inc_progress();

                    if !settle.is_zero() {
                        tokio::time::sleep(settle).await;
                    }
                }
                Err(e) => {
                    warn!("Failed to process {}: {}", file.display(), e);
                    failed += 1;
                    self.inc_progress();
                }
            }
        }

        self.take_idle_samples(&mut samples).await;

        Ok(RunReport {
            variant,
            processed,
            failed,
            samples,
            worker_samples: None,
            charts: Vec::new(),
            duration: Duration::ZERO,
        })
    }

    async fn process_one(
        &self,
        file: &Path,
        output: &Path,
        resize_config: &ResizeConfig,
        pipeline: Pipeline,
    ) -> Result<()> {
        let size = tokio::fs::metadata(file).await?.len();
        info!("Processing {}, size: {}", display_name(file), size);

        let result = self
            .engine
            .process_file(file, output, resize_config, pipeline)
            .await?;
        debug!(
            "Wrote {:?} ({} bytes, {:.1}% smaller)",
            result.output_path,
            result.output_size,
            result.size_reduction()
        );
        Ok(())
    }

    async fn take_idle_samples(&self, samples: &mut SampleLog) {
        let sampling = &self.config.sampling;
        if sampling.idle_samples > 0 {
            debug!(
                "Taking {} idle samples every {:?}",
                sampling.idle_samples,
                sampling.idle_interval()
            );
        }

        for n in 1..=sampling.idle_samples {
            tokio::time::sleep(sampling.idle_interval()).await;
            samples.record(idle_label(n), self.probe.sample());
        }
    }

    async fn run_workers(&self, files: Vec<PathBuf>) -> Result<RunReport> {
        let pool = WorkerPool::new(self.config.workers.max_workers);
        let resize_config = self.resize_config();
        let engine = self.engine.clone();
        let probe = Arc::clone(&self.probe);
        let input_dir = self.config.processing.input_dir.clone();
        let output_dir = self.config.processing.output_dir.clone();
        let format = resize_config.format.or_else(|| Pipeline::Streamed.default_format());
        let progress = self.progress.clone();

        let (master, messages) = tokio::task::spawn_blocking(move || {
            let mut master = SampleLog::new();
            let job_probe = Arc::clone(&probe);

            let messages = pool.run(
                files,
                |file| {
                    let output = output_path_for(file, &input_dir, &output_dir, format);
                    let size = std::fs::metadata(file)?.len();
                    info!("Processing {}, size: {}", display_name(file), size);

                    engine.process_file_blocking(file, &output, &resize_config, Pipeline::Streamed)?;

                    let usage = job_probe.sample();
                    info!("{}", usage);
                    Ok(MemorySample::new(display_name(file), usage))
                },
                |message| {
                    match &message.outcome {
                        Ok(_) => master.record(display_name(&message.file), probe.sample()),
                        Err(e) => warn!("Failed to process {}: {}", message.file.display(), e),
                    }
                    if let Some(progress) = &progress {
                        progress.inc(1);
                    }
                },
            )?;

            Ok::<_, ProbeError>((master, messages))
        })
        .await
        .map_err(|e| ProbeError::worker(format!("Task join error: {}", e)))??;

        let failed = messages.iter().filter(|m| m.outcome.is_err()).count();
        let worker_samples: SampleLog = messages
            .into_iter()
            .filter_map(|message| message.outcome.ok())
            .collect();

        Ok(RunReport {
            variant: Variant::Worker,
            processed: worker_samples.len(),
            failed,
            samples: master,
            worker_samples: Some(worker_samples),
            charts: Vec::new(),
            duration: Duration::ZERO,
        })
    }

    fn write_charts(&self, report: &RunReport) -> Result<Vec<PathBuf>> {
        let charts_dir = self.charts_dir(report.variant);
        let renderer = ChartRenderer::new(self.config.chart.clone())?;
        let mut charts = Vec::new();

        let mut logs = vec![(report.variant.chart_name(), &report.samples)];
        if let (Some(name), Some(worker_samples)) =
            (report.variant.worker_chart_name(), &report.worker_samples)
        {
            logs.push((name, worker_samples));
        }

        for (name, log) in logs {
            if log.is_empty() {
                warn!("No samples for {}, skipping chart", name);
                continue;
            }

            let path = charts_dir.join(name);
            renderer.write(&log.to_series(), &path)?;
            if self.config.chart.write_json {
                log.write_json(path.with_extension("json"))?;
            }
            charts.push(path);
        }

        Ok(charts)
    }

    fn charts_dir(&self, variant: Variant) -> PathBuf {
        self.config
            .chart
            .output_dir
            .clone()
            .unwrap_or_else(|| variant.default_charts_dir())
    }

    fn output_path(&self, file: &Path, variant: Variant) -> PathBuf {
        let processing = &self.config.processing;
        let format = self.resize_config().format.or_else(|| variant.pipeline().default_format());
        output_path_for(file, &processing.input_dir, &processing.output_dir, format)
    }

    fn resize_config(&self) -> ResizeConfig {
        self.config.processing.resize_config()
    }

    fn set_progress_message(&self, name: &str) {
        if let Some(progress) = &self.progress {
            progress.set_message(format!("Processing: {}", name));
        }
    }

    fn inc_progress(&self) {
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
    }
}

/// Label used for a file in logs and samples
fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn write_images(dir: &Path, count: u32) {
        std::fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            let image = image::RgbImage::from_fn(320 + i * 10, 240, |x, y| {
                image::Rgb([(x % 256) as u8, (y % 256) as u8, (i * 40 % 256) as u8])
            });
            image.save(dir.join(format!("photo-{}.jpg", i))).unwrap();
        }
    }

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.processing.input_dir = root.join("images");
        config.processing.output_dir = root.join("output");
        config.sampling.idle_samples = 3;
        config.sampling.idle_interval_ms = 1;
        config.sampling.settle_interval_ms = 1;
        config.chart.output_dir = Some(root.join("charts"));
        config
    }

    fn runner(config: Config) -> Runner {
        Runner::new(config, Arc::new(MemoryProbe::new()))
    }

    fn output_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).map_or(0, |entries| entries.count())
    }

    #[test]
    fn test_variant_names() {
        assert_eq!(Variant::Stream.chart_name(), "memoryUsageChart-stream.png");
        assert_eq!(Variant::Direct.chart_name(), "memoryUsageChart-disk.png");
        assert_eq!(Variant::Worker.chart_name(), "memoryUsageChart-from-master.png");
        assert_eq!(
            Variant::Worker.worker_chart_name(),
            Some("memoryUsageData-from-workers.png")
        );
        assert_eq!(Variant::Worker.default_charts_dir(), PathBuf::from("data"));
        assert_eq!(Variant::Stream.pipeline(), Pipeline::Streamed);
        assert_eq!(Variant::Direct.to_string(), "direct");
    }

    #[tokio::test]
    async fn test_stream_variant() {
        let dir = TempDir::new().unwrap();
        write_images(&dir.path().join("images"), 3);

        let report = runner(test_config(dir.path())).run(Variant::Stream).await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.samples.len(), 3 + 3);
        assert_eq!(report.samples.samples()[0].file, "photo-0.jpg");
        assert_eq!(report.samples.samples()[3].file, "timeout-test-1");
        assert_eq!(report.samples.samples()[5].file, "timeout-test-3");
        assert_eq!(output_count(&dir.path().join("output")), 3);
        assert!(dir.path().join("output").join("photo-0.jpg.png").exists());

        let chart = dir.path().join("charts").join("memoryUsageChart-stream.png");
        assert_eq!(report.charts, vec![chart.clone()]);
        assert!(chart.exists());
        assert!(chart.with_extension("json").exists());
    }

    #[tokio::test]
    async fn test_direct_variant_keeps_names() {
        let dir = TempDir::new().unwrap();
        write_images(&dir.path().join("images"), 2);

        let report = runner(test_config(dir.path())).run(Variant::Direct).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.samples.len(), 2 + 3);
        assert!(dir.path().join("output").join("photo-1.jpg").exists());
        assert!(dir
            .path()
            .join("charts")
            .join("memoryUsageChart-disk.png")
            .exists());
    }

    #[tokio::test]
    async fn test_worker_variant() {
        let dir = TempDir::new().unwrap();
        write_images(&dir.path().join("images"), 4);

        let mut config = test_config(dir.path());
        config.workers.max_workers = Some(2);
        let report = runner(config).run(Variant::Worker).await.unwrap();

        assert_eq!(report.processed, 4);
        assert_eq!(report.samples.len(), 4);
        let worker_samples = report.worker_samples.as_ref().unwrap();
        assert_eq!(worker_samples.len(), 4);

        // Worker results follow submission order
        let files: Vec<_> = worker_samples.iter().map(|s| s.file.as_str()).collect();
        assert_eq!(files, vec!["photo-0.jpg", "photo-1.jpg", "photo-2.jpg", "photo-3.jpg"]);

        assert_eq!(output_count(&dir.path().join("output")), 4);
        assert_eq!(report.charts.len(), 2);
        for chart in &report.charts {
            assert!(chart.exists());
        }
    }

    #[tokio::test]
    async fn test_bad_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images");
        write_images(&images, 2);
        std::fs::write(images.join("notes.txt"), b"not an image").unwrap();

        let mut config = test_config(dir.path());
        config.sampling.idle_samples = 0;

        let report = runner(config.clone()).run(Variant::Stream).await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.samples.len(), 2);

        let report = runner(config).run(Variant::Worker).await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.samples.len(), 2);
    }

    fn write_same_stem_images(images: &Path) {
        std::fs::create_dir_all(images).unwrap();
        let pixels = image::RgbImage::from_pixel(240, 160, image::Rgb([10, 200, 30]));
        pixels.save(images.join("photo.jpg")).unwrap();
        pixels.save(images.join("photo.png")).unwrap();
    }

    #[tokio::test]
    async fn test_same_stem_inputs_get_distinct_outputs() {
        for variant in [Variant::Stream, Variant::Worker] {
            let dir = TempDir::new().unwrap();
            write_same_stem_images(&dir.path().join("images"));

            let mut config = test_config(dir.path());
            config.sampling.idle_samples = 0;
            let report = runner(config).run(variant).await.unwrap();

            let output = dir.path().join("output");
            assert_eq!(report.processed, 2, "{}", variant);
            assert_eq!(output_count(&output), 2, "{}", variant);
            for name in ["photo.jpg.png", "photo.png.png"] {
                let written = image::open(output.join(name)).unwrap();
                assert_eq!(written.width(), 200, "{} {}", variant, name);
            }
        }
    }

    #[tokio::test]
    async fn test_failed_files_skip_settle_pause() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("a.txt"), b"not an image").unwrap();
        std::fs::write(images.join("b.txt"), b"not an image").unwrap();

        let mut config = test_config(dir.path());
        config.sampling.idle_samples = 0;
        config.sampling.settle_interval_ms = 2_000;
        let report = runner(config).run(Variant::Stream).await.unwrap();

        assert_eq!(report.failed, 2);
        assert!(report.duration < Duration::from_millis(2_000), "{:?}", report.duration);
    }

    #[tokio::test]
    async fn test_configured_format_applies_to_direct() {
        let dir = TempDir::new().unwrap();
        write_images(&dir.path().join("images"), 1);

        let mut config = test_config(dir.path());
        config.sampling.idle_samples = 0;
        config.processing.format = Some(crate::config::ImageFormat::Png);
        runner(config).run(Variant::Direct).await.unwrap();

        let output = dir.path().join("output").join("photo-0.jpg.png");
        let written = image::io::Reader::open(&output).unwrap().with_guessed_format().unwrap();
        assert_eq!(written.format(), Some(image::ImageFormat::Png));
    }

    #[tokio::test]
    async fn test_missing_input_directory() {
        let dir = TempDir::new().unwrap();
        let result = runner(test_config(dir.path())).run(Variant::Direct).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_directory_writes_idle_chart_only() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();

        let report = runner(test_config(dir.path())).run(Variant::Stream).await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.samples.len(), 3);
        assert_eq!(report.charts.len(), 1);

        let report = runner(test_config(dir.path())).run(Variant::Worker).await.unwrap();
        assert!(report.charts.is_empty());
    }
}
