//! Caption acquisition: configuration, the caption source seam and image loading.

mod image_source;
mod interrogator;

pub use image_source::{load_image, ImageSource};
pub use interrogator::InterrogatorClient;

use crate::prompt::SessionError;
use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "ViT-L-14/openai";
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8765";

/// Captioning fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionMode {
    Fast,
    Best,
}

impl CaptionMode {
    pub fn from_fast(fast: bool) -> Self {
        if fast {
            CaptionMode::Fast
        } else {
            CaptionMode::Best
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CaptionMode::Fast => "fast",
            CaptionMode::Best => "best",
        }
    }
}

/// Compute device the model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// CUDA when an NVIDIA driver is present, otherwise CPU
    Auto,
    Cuda,
    Cpu,
}

impl Device {
    pub fn resolve(self) -> Device {
        match self {
            Device::Auto if nvidia_driver_present() => Device::Cuda,
            Device::Auto => Device::Cpu,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }
}

fn nvidia_driver_present() -> bool {
    if cfg!(target_os = "windows") {
        std::path::Path::new(r"C:\Windows\System32\nvcuda.dll").exists()
    } else {
        std::path::Path::new("/proc/driver/nvidia/version").exists()
    }
}

/// Process-wide captioning settings, fixed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    pub endpoint: String,
    pub clip_model_name: String,
    pub device: Device,
    pub cache_dir: PathBuf,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            clip_model_name: DEFAULT_MODEL.to_string(),
            device: Device::Auto.resolve(),
            cache_dir: default_cache_dir(),
            timeout: Duration::from_secs(120),
        }
    }
}

pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("clip-prompt")
        .join("models")
}

/// Anything that can turn an image into a prompt.
///
/// The call is synchronous and may block for a long time. Presentation layers
/// that need to stay responsive run it on a blocking worker.
pub trait CaptionSource: Send + Sync {
    fn caption(&self, image: &DynamicImage, mode: CaptionMode) -> Result<String>;
}

/// Load an image and caption it. No image means no caption call at all.
pub fn acquire_caption(
    source: &dyn CaptionSource,
    image: &ImageSource,
    mode: CaptionMode,
) -> Result<String, SessionError> {
    let img = load_image(image)?;
    tracing::info!(
        source = %image,
        mode = mode.as_str(),
        width = img.width(),
        height = img.height(),
        "captioning image"
    );
    let prompt = source
        .caption(&img, mode)
        .map_err(|e| SessionError::Caption(format!("{e:#}")))?;
    Ok(prompt.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_fast_flag() {
        assert_eq!(CaptionMode::from_fast(true), CaptionMode::Fast);
        assert_eq!(CaptionMode::from_fast(false), CaptionMode::Best);
        assert_eq!(CaptionMode::Best.as_str(), "best");
    }

    #[test]
    fn test_device_resolve_never_auto() {
        assert_ne!(Device::Auto.resolve(), Device::Auto);
        assert_eq!(Device::Cpu.resolve(), Device::Cpu);
        assert_eq!(Device::Cuda.resolve(), Device::Cuda);
    }

    #[test]
    fn test_config_serializes_timeout_as_humantime() {
        let cfg = CaptionConfig {
            timeout: Duration::from_secs(90),
            device: Device::Cpu,
            ..Default::default()
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["timeout"], "1m 30s");
        assert_eq!(json["device"], "cpu");
        assert_eq!(json["clip_model_name"], DEFAULT_MODEL);
    }

    #[test]
    fn test_acquire_without_image_skips_caption() {
        struct Panics;
        impl CaptionSource for Panics {
            fn caption(&self, _: &DynamicImage, _: CaptionMode) -> Result<String> {
                panic!("caption must not be called without an image");
            }
        }
        let missing = ImageSource::File(PathBuf::from("/definitely/not/here.png"));
        let err = acquire_caption(&Panics, &missing, CaptionMode::Fast).unwrap_err();
        assert!(matches!(err, SessionError::NoImage(_)));
    }
}
