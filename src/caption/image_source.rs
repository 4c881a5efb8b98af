use crate::prompt::SessionError;
use image::{DynamicImage, RgbaImage};
use std::fmt;
use std::path::PathBuf;

/// Where the image to caption comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Clipboard,
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::File(path) => write!(f, "{}", path.display()),
            ImageSource::Clipboard => f.write_str("clipboard"),
        }
    }
}

pub fn load_image(source: &ImageSource) -> Result<DynamicImage, SessionError> {
    match source {
        ImageSource::File(path) => image::open(path).map_err(|e| {
            SessionError::NoImage(format!("Could not open image {}: {e}", path.display()))
        }),
        ImageSource::Clipboard => grab_clipboard_image(),
    }
}

fn grab_clipboard_image() -> Result<DynamicImage, SessionError> {
    let no_image = || SessionError::NoImage("No image in clipboard.".into());

    let mut clipboard = arboard::Clipboard::new().map_err(|e| {
        tracing::warn!("clipboard unavailable: {e}");
        no_image()
    })?;
    let data = match clipboard.get_image() {
        Ok(data) => data,
        Err(arboard::Error::ContentNotAvailable) => return Err(no_image()),
        Err(e) => {
            tracing::warn!("clipboard image read failed: {e}");
            return Err(no_image());
        }
    };

    RgbaImage::from_raw(data.width as u32, data.height as u32, data.bytes.into_owned())
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(no_image)
}
