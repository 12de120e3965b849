//! Source rasterisation: page 1 of the scan → JPEG for recognition.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and the JPEG encode is
//! CPU-bound; both run on Tokio's blocking pool so worker threads never
//! stall while a page renders.
//!
//! ## Why keep the bitmap?
//!
//! The VLM receives the JPEG, but the QR decoder works on the lossless
//! bitmap: JPEG ringing around module edges costs real decode rate on
//! small codes. Both recognisers still see the same rendered page.

use crate::error::TivError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

/// Renders PDF pages to bitmaps.
///
/// Implementations are synchronous; callers move them onto the blocking pool.
pub trait PageRasterizer: Send + Sync {
    /// Render the first page at `scale` × its nominal (72 dpi) size.
    fn first_page(&self, pdf: &[u8], scale: f32) -> Result<DynamicImage, TivError>;

    /// Render every page at `target_width` pixels wide, in page order.
    fn all_pages(&self, pdf: &[u8], target_width: u32) -> Result<Vec<DynamicImage>, TivError>;
}

/// The rasterised source page, as both JPEG and bitmap.
#[derive(Debug, Clone)]
pub struct RasterImage {
    jpeg: Vec<u8>,
    bitmap: DynamicImage,
}

impl RasterImage {
    /// Encode `bitmap` as JPEG at `quality` (1–100).
    pub fn from_bitmap(bitmap: DynamicImage, quality: u8) -> Result<Self, TivError> {
        let jpeg = encode_jpeg(&bitmap, quality)?;
        Ok(Self { jpeg, bitmap })
    }

    pub fn jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn bitmap(&self) -> &DynamicImage {
        &self.bitmap
    }

    /// Base64 of the JPEG, with no `data:` header.
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.jpeg)
    }
}

/// Encode any bitmap as baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, TivError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(|e| TivError::render(format!("JPEG encoding failed: {e}")))?;
    debug!(
        "Encoded {}x{} bitmap → {} bytes JPEG (q={})",
        rgb.width(),
        rgb.height(),
        buf.len(),
        quality
    );
    Ok(buf)
}

/// Render page 1 of `pdf` and encode it for recognition.
pub async fn rasterize_source(
    rasterizer: Arc<dyn PageRasterizer>,
    pdf: Arc<[u8]>,
    scale: f32,
    quality: u8,
) -> Result<RasterImage, TivError> {
    tokio::task::spawn_blocking(move || {
        let bitmap = rasterizer.first_page(&pdf, scale)?;
        debug!("Source page 1 → {}x{} px", bitmap.width(), bitmap.height());
        RasterImage::from_bitmap(bitmap, quality)
    })
    .await
    .map_err(|e| TivError::Internal(format!("Rasterisation task panicked: {e}")))?
}
