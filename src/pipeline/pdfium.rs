//! pdfium-backed page rendering and PDF assembly.
//!
//! One engine serves both directions: it rasterises the source scan and
//! the converted template ([`PageRasterizer`]), and it builds and stamps
//! the output PDFs ([`PdfAssembler`]).
//!
//! The library is located once at startup with `pdfium-auto` (honouring
//! `PDFIUM_LIB_PATH`, downloading into the user cache otherwise). Each
//! call binds from that path and drops the binding when done; every method
//! is blocking and must run on the blocking pool.

use crate::config::{PageSize, StampPlacement};
use crate::error::TivError;
use crate::pipeline::compose::{PdfAssembler, PlacedImage};
use crate::pipeline::raster::PageRasterizer;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PDFIUM_HINT: &str =
    "Set PDFIUM_LIB_PATH to a libpdfium build, or allow the one-time download into the user cache.";

pub struct PdfiumEngine {
    library: PathBuf,
}

impl PdfiumEngine {
    /// Locate (or download) libpdfium and check that it binds.
    pub fn locate() -> Result<Self, TivError> {
        let library = pdfium_auto::ensure_pdfium_library(None).map_err(|e| {
            TivError::MissingDependency {
                dependency: "pdfium",
                detail: e.to_string(),
                hint: PDFIUM_HINT,
            }
        })?;
        Self::from_library(library)
    }

    /// Use the libpdfium at `library`.
    pub fn from_library(library: PathBuf) -> Result<Self, TivError> {
        pdfium_auto::bind_pdfium_from_path(&library).map_err(|e| TivError::MissingDependency {
            dependency: "pdfium",
            detail: e.to_string(),
            hint: PDFIUM_HINT,
        })?;
        info!("pdfium bound from {}", library.display());
        Ok(Self { library })
    }

    pub fn library(&self) -> &Path {
        &self.library
    }

    fn bind(&self) -> Result<Pdfium, TivError> {
        pdfium_auto::bind_pdfium_from_path(&self.library)
            .map_err(|e| TivError::Internal(format!("pdfium re-bind failed: {e}")))
    }
}

fn open<'a>(pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<PdfDocument<'a>, TivError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| TivError::render(format!("cannot open PDF: {e:?}")))
}

impl PageRasterizer for PdfiumEngine {
    fn first_page(&self, pdf: &[u8], scale: f32) -> Result<DynamicImage, TivError> {
        let pdfium = self.bind()?;
        let document = open(&pdfium, pdf)?;
        let pages = document.pages();
        if pages.len() == 0 {
            return Err(TivError::render("source PDF has no pages"));
        }

        let page = pages
            .get(0)
            .map_err(|e| TivError::render(format!("cannot load page 1: {e:?}")))?;
        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| TivError::render(format!("cannot render page 1: {e:?}")))?;

        let image = bitmap.as_image();
        debug!("Rendered page 1 at {scale}× → {}x{} px", image.width(), image.height());
        Ok(image)
    }

    fn all_pages(&self, pdf: &[u8], target_width: u32) -> Result<Vec<DynamicImage>, TivError> {
        let pdfium = self.bind()?;
        let document = open(&pdfium, pdf)?;
        let config = PdfRenderConfig::new().set_target_width(target_width as i32);

        let mut images = Vec::with_capacity(document.pages().len() as usize);
        for (idx, page) in document.pages().iter().enumerate() {
            let bitmap = page.render_with_config(&config).map_err(|e| {
                TivError::render(format!("cannot render page {}: {e:?}", idx + 1))
            })?;
            images.push(bitmap.as_image());
        }
        debug!("Rendered {} page(s) at {target_width} px", images.len());
        Ok(images)
    }
}

impl PdfAssembler for PdfiumEngine {
    fn assemble(&self, page: PageSize, pages: &[PlacedImage]) -> Result<Vec<u8>, TivError> {
        let pdfium = self.bind()?;
        let mut document = pdfium
            .create_new_pdf()
            .map_err(|e| TivError::render(format!("cannot create PDF: {e:?}")))?;

        for (idx, placed) in pages.iter().enumerate() {
            let image = image::load_from_memory(&placed.jpeg)
                .map_err(|e| TivError::render(format!("page {} image: {e}", idx + 1)))?;
            let mut pdf_page = document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::Custom(
                    PdfPoints::new(page.width_pt),
                    PdfPoints::new(page.height_pt),
                ))
                .map_err(|e| TivError::render(format!("cannot add page {}: {e:?}", idx + 1)))?;
            pdf_page
                .objects_mut()
                .create_image_object(
                    PdfPoints::new(placed.rect.x),
                    PdfPoints::new(placed.rect.y),
                    &image,
                    Some(PdfPoints::new(placed.rect.width)),
                    Some(PdfPoints::new(placed.rect.height)),
                )
                .map_err(|e| TivError::render(format!("cannot draw page {}: {e:?}", idx + 1)))?;
        }

        document
            .save_to_bytes()
            .map_err(|e| TivError::render(format!("cannot serialise PDF: {e:?}")))
    }

    fn stamp_first_page(
        &self,
        pdf: &[u8],
        image: &DynamicImage,
        placement: StampPlacement,
    ) -> Result<Vec<u8>, TivError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| TivError::embed(format!("cannot open rendered PDF: {e:?}")))?;

        {
            let mut page = document
                .pages()
                .get(0)
                .map_err(|e| TivError::embed(format!("cannot load page 1: {e:?}")))?;
            let (x, y) = placement.origin(page.height().value);
            page.objects_mut()
                .create_image_object(
                    PdfPoints::new(x),
                    PdfPoints::new(y),
                    image,
                    Some(PdfPoints::new(placement.size)),
                    Some(PdfPoints::new(placement.size)),
                )
                .map_err(|e| TivError::embed(format!("cannot draw QR: {e:?}")))?;
            debug!("Stamped QR at ({x:.1}, {y:.1}) pt, {} pt square", placement.size);
        }

        document
            .save_to_bytes()
            .map_err(|e| TivError::embed(format!("cannot serialise PDF: {e:?}")))
    }
}
