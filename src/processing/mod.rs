//! Core image processing functionality

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::{ImageFormat, ResizeConfig};
use crate::error::{Result, ProbeError, ErrorContext};
use crate::memory::{image_buffer_size, ExternalMemory};

pub mod discovery;
pub mod formats;

pub use discovery::*;
pub use formats::*;

/// How a file travels from disk through the codec and back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// Buffered reader into the decoder, encoder into a buffered writer;
    /// output defaults to PNG
    Streamed,
    /// Whole-file open and save; output format follows the output extension
    Direct,
}

impl Pipeline {
    /// Output format used when the resize config doesn't name one
    pub fn default_format(self) -> Option<ImageFormat> {
        match self {
            Self::Streamed => Some(ImageFormat::Png),
            Self::Direct => None,
        }
    }
}

/// Core processing engine for image operations
#[derive(Clone)]
pub struct ProcessingEngine {
    external: Arc<ExternalMemory>,
}

impl ProcessingEngine {
    /// Create an engine that registers pixel buffers with `external`
    pub fn new(external: Arc<ExternalMemory>) -> Self {
        Self { external }
    }

    /// Process a single file on a blocking-task thread
    pub async fn process_file<P: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: P,
        config: &ResizeConfig,
        pipeline: Pipeline,
    ) -> Result<ProcessingResult> {
        let engine = self.clone();
        let input_path = input_path.as_ref().to_path_buf();
        let output_path = output_path.as_ref().to_path_buf();
        let config = config.clone();

        tokio::task::spawn_blocking(move || {
            engine.process_file_blocking(&input_path, &output_path, &config, pipeline)
        })
        .await
        .map_err(|e| ProbeError::worker(format!("Task join error: {}", e)))?
    }

    /// Process a single file on the current thread
    pub fn process_file_blocking(
        &self,
        input_path: &Path,
        output_path: &Path,
        config: &ResizeConfig,
        pipeline: Pipeline,
    ) -> Result<ProcessingResult> {
        let start_time = Instant::now();
        debug!("Processing file ({:?}): {:?} -> {:?}", pipeline, input_path, output_path);

        config.validate()?;

        let input_size = std::fs::metadata(input_path)
            .with_file_context(input_path.to_path_buf())?
            .len();

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)
                .with_file_context(output_path.to_path_buf())?;
        }

        let image = match pipeline {
            Pipeline::Streamed => decode_streamed(input_path),
            Pipeline::Direct => image::open(input_path).map_err(Into::into),
        }
        .with_file_context(input_path.to_path_buf())?;
        let decoded = self.external.track(image_buffer_size(&image));

        let (original_width, original_height) = (image.width(), image.height());
        let resized = resize_to_width(image, config)
            .with_file_context(input_path.to_path_buf())?;
        // The source buffer is gone once the resized copy exists
        drop(decoded);
        let _resized = self.external.track(image_buffer_size(&resized));
        let (width, height) = (resized.width(), resized.height());

        let format = config.format.or_else(|| pipeline.default_format());
        let written = match pipeline {
            Pipeline::Streamed => encode_streamed(resized, output_path, format.unwrap_or(ImageFormat::Png)),
            Pipeline::Direct => save_direct(resized, output_path, format),
        };
        written.with_file_context(output_path.to_path_buf())?;

        let output_size = std::fs::metadata(output_path)
            .with_file_context(output_path.to_path_buf())?
            .len();

        let processing_time = start_time.elapsed();
        debug!(
            "Resized {}x{} -> {}x{} in {:.2}s",
            original_width, original_height, width, height,
            processing_time.as_secs_f64()
        );

        Ok(ProcessingResult {
            input_path: input_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            input_size,
            output_size,
            original_width,
            original_height,
            width,
            height,
            processing_time,
        })
    }
}

fn decode_streamed(path: &Path) -> Result<image::DynamicImage> {
    let reader = image::io::Reader::new(BufReader::new(File::open(path)?))
        .with_guessed_format()?;
    Ok(reader.decode()?)
}

fn encode_streamed(image: image::DynamicImage, output_path: &Path, format: ImageFormat) -> Result<()> {
    let image = prepare_for_format(image, format);
    let mut writer = BufWriter::new(File::create(output_path)?);
    image.write_to(&mut writer, image::ImageFormat::from(format))?;
    writer.flush()?;
    Ok(())
}

fn save_direct(image: image::DynamicImage, output_path: &Path, format: Option<ImageFormat>) -> Result<()> {
    let format = match format {
        Some(format) => format,
        None => detect_format_from_path(output_path)?,
    };
    prepare_for_format(image, format)
        .save_with_format(output_path, image::ImageFormat::from(format))?;
    Ok(())
}

fn resize_to_width(image: image::DynamicImage, config: &ResizeConfig) -> Result<image::DynamicImage> {
    let (target_width, target_height) = calculate_dimensions(image.width(), image.height(), config.width)?;

    if target_width == image.width() && target_height == image.height() {
        debug!("No resize needed, dimensions already match target");
        return Ok(image);
    }

    Ok(image.resize_exact(target_width, target_height, config.filter.into()))
}

/// Target dimensions for resizing to `target_width`, keeping the aspect ratio
pub fn calculate_dimensions(
    original_width: u32,
    original_height: u32,
    target_width: u32,
) -> Result<(u32, u32)> {
    if original_width == 0 || original_height == 0 {
        return Err(ProbeError::invalid_parameters(format!(
            "Image has no pixels ({}x{})",
            original_width, original_height
        )));
    }
    if target_width == 0 {
        return Err(ProbeError::invalid_parameters("Target width must be positive"));
    }

    let aspect_ratio = f64::from(original_height) / f64::from(original_width);
    let height = (f64::from(target_width) * aspect_ratio).round() as u32;
    Ok((target_width, height.max(1)))
}

/// Output path for `input` under `output_dir`, mirroring its position below `input_root`
///
/// A forced `format` appends its extension to the full input name
/// (`photo.jpg` becomes `photo.jpg.png`).
pub fn output_path_for(
    input: &Path,
    input_root: &Path,
    output_dir: &Path,
    format: Option<ImageFormat>,
) -> PathBuf {
    let relative_path = input.strip_prefix(input_root).unwrap_or(input);
    let relative_path = if relative_path.is_absolute() {
        input.file_name().map_or(relative_path, Path::new)
    } else {
        relative_path
    };
    let mut output_path = output_dir.join(relative_path);

    // Outputs stay one-to-one with inputs, even for shared stems
    if let Some(format) = format {
        let mut file_name = output_path.file_name().map(OsString::from).unwrap_or_default();
        file_name.push(".");
        file_name.push(format.extension());
        output_path.set_file_name(file_name);
    }

    output_path
}

/// Result of processing an image
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub input_size: u64,
    pub output_size: u64,
    pub original_width: u32,
    pub original_height: u32,
    pub width: u32,
    pub height: u32,
    pub processing_time: Duration,
}

impl ProcessingResult {
    /// Get size reduction percentage
    pub fn size_reduction(&self) -> f64 {
        if self.input_size == 0 {
            return 0.0;
        }
        let reduction = self.input_size.saturating_sub(self.output_size);
        (reduction as f64 / self.input_size as f64) * 100.0
    }
}
