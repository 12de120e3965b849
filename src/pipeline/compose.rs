//! Document rendering: filled DOCX → paginated raster PDF.
//!
//! The document is rasterised to one tall bitmap at the configured surface
//! width, cut into page bands by [`crate::pipeline::layout::plan_pages`],
//! and every band is re-encoded as JPEG (q=98) before being placed on its
//! page. The output PDF contains images only: no text layer, exactly what
//! the printed enmicado looks like.

use crate::config::{PageSize, PipelineConfig, StampPlacement};
use crate::error::TivError;
use crate::pipeline::layout::{plan_pages, PdfRect};
use crate::pipeline::office::DocumentRasterizer;
use crate::pipeline::raster::encode_jpeg;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, info};

/// JPEG quality of each page band.
pub const BAND_JPEG_QUALITY: u8 = 98;

/// A JPEG to draw at `rect` on its own page.
#[derive(Debug, Clone)]
pub struct PlacedImage {
    pub jpeg: Vec<u8>,
    pub rect: PdfRect,
}

/// Creates and edits PDFs made of raster images.
pub trait PdfAssembler: Send + Sync {
    /// Build a new PDF with one `page`-sized page per placed image.
    fn assemble(&self, page: PageSize, pages: &[PlacedImage]) -> Result<Vec<u8>, TivError>;

    /// Draw `image` on page 1 of an existing PDF.
    fn stamp_first_page(
        &self,
        pdf: &[u8],
        image: &DynamicImage,
        placement: StampPlacement,
    ) -> Result<Vec<u8>, TivError>;
}

/// Cut the surface into page bands and encode each one.
pub fn compose_pages(surface: &DynamicImage, page: PageSize) -> Result<Vec<PlacedImage>, TivError> {
    let plan = plan_pages(surface.width(), surface.height(), page);
    if plan.is_empty() {
        return Err(TivError::render("rendered document surface is empty"));
    }

    plan.iter()
        .map(|p| {
            let band = surface.crop_imm(0, p.band.top, surface.width(), p.band.height);
            let jpeg = encode_jpeg(&band, BAND_JPEG_QUALITY)?;
            debug!(
                "Band rows {}..{} → {} bytes",
                p.band.top,
                p.band.top + p.band.height,
                jpeg.len()
            );
            Ok(PlacedImage { jpeg, rect: p.rect })
        })
        .collect()
}

/// Run the whole document-rendering stage.
pub async fn render_document(
    documents: Arc<dyn DocumentRasterizer>,
    assembler: Arc<dyn PdfAssembler>,
    docx: Arc<[u8]>,
    config: &PipelineConfig,
) -> Result<Vec<u8>, TivError> {
    let surface = documents.rasterize(&docx, config.surface_width_px()).await?;
    info!(
        "Document surface: {}x{} px",
        surface.width(),
        surface.height()
    );

    let page = config.page_size;
    tokio::task::spawn_blocking(move || {
        let pages = compose_pages(&surface, page)?;
        info!("Assembling {} page(s)", pages.len());
        assembler.assemble(page, &pages)
    })
    .await
    .map_err(|e| TivError::Internal(format!("Assembly task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn striped_surface(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, y| {
            if y < height / 2 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }

    #[test]
    fn single_page_surface() {
        let pages = compose_pages(&striped_surface(240, 100), PageSize::A4).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(&pages[0].jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn tall_surface_yields_one_jpeg_per_band() {
        // 240 px wide: one A4 page ≈ 339 px tall, so 800 px needs 3 bands.
        let pages = compose_pages(&striped_surface(240, 800), PageSize::A4).unwrap();
        assert_eq!(pages.len(), 3);

        let first = image::load_from_memory(&pages[0].jpeg).unwrap();
        let last = image::load_from_memory(&pages[2].jpeg).unwrap();
        assert_eq!(first.width(), 240);
        // White top band, black bottom band.
        assert!(first.to_luma8().get_pixel(10, 10).0[0] > 200);
        assert!(last.to_luma8().get_pixel(10, 10).0[0] < 50);
    }

    #[test]
    fn empty_surface_is_a_render_error() {
        let err = compose_pages(&DynamicImage::new_rgb8(0, 0), PageSize::A4).unwrap_err();
        assert!(matches!(err, TivError::RenderFailed { .. }));
    }
}
