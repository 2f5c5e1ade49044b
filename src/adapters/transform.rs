//! JPEG re-encoding via the `image` crate.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;

use super::ImageTransformer;
use crate::domain::CacheError;

/// Decodes jpeg/png/webp/gif and writes baseline JPEG
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegTransformer;

impl ImageTransformer for JpegTransformer {
    fn transform(
        &self,
        bytes: &[u8],
        target_size: Option<u32>,
        quality: u8,
    ) -> Result<Vec<u8>, CacheError> {
        let decoded = image::load_from_memory(bytes)?;

        // Only ever shrink; thumbnail keeps the aspect ratio.
        let image = match target_size {
            Some(size) if decoded.width() > size || decoded.height() > size => {
                decoded.thumbnail(size, size)
            }
            _ => decoded,
        };

        let rgb = image.to_rgb8();
        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(&rgb)?;

        Ok(out.into_inner())
    }
}
