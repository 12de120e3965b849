//! Pipeline stages of the TIV enmicado workflow.
//!
//! Each submodule implements one transformation step and talks to the
//! outside world only through a trait, so every stage can be tested with
//! in-memory fakes and the heavy collaborators (pdfium, LibreOffice, the
//! VLM) are injected once by [`crate::collaborators::Collaborators`].
//!
//! ## Data Flow
//!
//! ```text
//!                     ┌─▶ extract (VLM) ──┐
//! input ──▶ raster ───┤                   ├─▶ recognize ──▶ VehicleRecord
//! (PDF)    (pdfium)   └─▶ qr (decode) ────┘
//!
//! VehicleRecord ──▶ template ──▶ office ──▶ layout/compose ──▶ embed
//!                   (DOCX)      (bitmap)   (rendered PDF)     (final PDF)
//! ```
//!
//! 1. [`input`]: load and type-check the source scan and the template
//! 2. [`raster`]: page 1 → JPEG + bitmap on the blocking pool
//! 3. [`extract`] + [`postprocess`]: VLM field extraction and reply clean-up
//! 4. [`qr`]: decode the verification QR / regenerate it for stamping
//! 5. [`recognize`]: run 3 and 4 concurrently and join them
//! 6. [`template`]: substitute `«Name»` placeholders in the DOCX
//! 7. [`office`]: DOCX → one tall bitmap (LibreOffice + pdfium)
//! 8. [`layout`] + [`compose`]: paginate the bitmap into an image-only PDF
//! 9. [`embed`]: stamp the QR on page 1
//!
//! [`pdfium`] provides the production [`raster::PageRasterizer`] and
//! [`compose::PdfAssembler`].

pub mod compose;
pub mod embed;
pub mod extract;
pub mod input;
pub mod layout;
pub mod office;
pub mod pdfium;
pub mod postprocess;
pub mod qr;
pub mod raster;
pub mod recognize;
pub mod template;
