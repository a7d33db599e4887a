//! Image format detection and handling

use std::path::Path;
use crate::config::ImageFormat;
use crate::error::{Result, ProbeError};

/// Detect image format from file extension
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<ImageFormat> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| ProbeError::processing(
            "File has no extension to infer the image format from",
            Some(path.to_path_buf()),
        ))?;

    match extension.to_lowercase().as_str() {
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "png" => Ok(ImageFormat::Png),
        "webp" => Ok(ImageFormat::WebP),
        "gif" => Ok(ImageFormat::Gif),
        "tiff" | "tif" => Ok(ImageFormat::Tiff),
        "bmp" => Ok(ImageFormat::Bmp),
        other => Err(ProbeError::processing(
            format!("Unsupported image format: {}", other),
            Some(path.to_path_buf()),
        )),
    }
}

/// Convert our ImageFormat to image crate format
impl From<ImageFormat> for image::ImageFormat {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::WebP => image::ImageFormat::WebP,
            ImageFormat::Gif => image::ImageFormat::Gif,
            ImageFormat::Tiff => image::ImageFormat::Tiff,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
        }
    }
}

/// Adapt the pixel layout to what the target encoder accepts
///
/// The JPEG encoder rejects alpha channels, so those images are flattened
/// to RGB first.
pub fn prepare_for_format(image: image::DynamicImage, format: ImageFormat) -> image::DynamicImage {
    match format {
        ImageFormat::Jpeg if image.color().has_alpha() => {
            image::DynamicImage::ImageRgb8(image.to_rgb8())
        }
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format_from_path() {
        assert_eq!(detect_format_from_path("a/b/photo.JPG").unwrap(), ImageFormat::Jpeg);
        assert_eq!(detect_format_from_path("scan.tif").unwrap(), ImageFormat::Tiff);
        assert_eq!(detect_format_from_path("icon.png").unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_detect_format_failures() {
        let err = detect_format_from_path("notes.txt").unwrap_err();
        assert!(err.is_recoverable());
        assert!(detect_format_from_path("README").is_err());
    }

    #[test]
    fn test_prepare_for_jpeg_drops_alpha() {
        let rgba = image::DynamicImage::new_rgba8(2, 2);
        let prepared = prepare_for_format(rgba.clone(), ImageFormat::Jpeg);
        assert!(!prepared.color().has_alpha());

        let kept = prepare_for_format(rgba, ImageFormat::Png);
        assert!(kept.color().has_alpha());
    }
}
