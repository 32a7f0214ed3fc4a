use crate::error::{Notice, QaError, Stage, error_chain};
use crate::models::View;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

/// Load an image and apply its EXIF orientation.
pub fn load_oriented(path: &Path) -> Result<DynamicImage, QaError> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// PNG-encode an image for transport.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, QaError> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// The images supplied for one session. Any view may be missing.
#[derive(Debug, Clone, Default)]
pub struct SessionImages {
    images: BTreeMap<View, DynamicImage>,
    /// Views whose file could not be loaded
    notices: Vec<Notice>,
}

impl SessionImages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load each view from disk. An unreadable file leaves its view missing
    /// and records an input notice instead of failing the session.
    pub fn load<'a>(paths: impl IntoIterator<Item = (View, &'a Path)>) -> Self {
        let mut images = Self::new();
        for (view, path) in paths {
            match load_oriented(path) {
                Ok(img) => {
                    debug!(%view, path = %path.display(), width = img.width(), height = img.height(), "image loaded");
                    images.insert(view, img);
                }
                Err(e) => {
                    warn!(%view, path = %path.display(), error = %e, "cannot load image");
                    images.notices.push(Notice::new(
                        Stage::Input,
                        Some(view),
                        format!("cannot load {}: {}", path.display(), error_chain(&e)),
                    ));
                }
            }
        }
        images
    }

    pub fn with(mut self, view: View, image: DynamicImage) -> Self {
        self.images.insert(view, image);
        self
    }

    pub fn insert(&mut self, view: View, image: DynamicImage) {
        self.images.insert(view, image);
    }

    pub fn get(&self, view: View) -> Option<&DynamicImage> {
        self.images.get(&view)
    }

    pub fn contains(&self, view: View) -> bool {
        self.images.contains_key(&view)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }
}
