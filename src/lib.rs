//! # edgequake-tiv
//!
//! Turn a scanned Peruvian vehicle registration card (*Tarjeta de
//! Identificación Vehicular*, TIV) into the three enmicado artifacts: a
//! filled Word template, an image-only PDF of it, and that PDF with the
//! card's verification QR stamped on page 1.
//!
//! ## Why this crate?
//!
//! TIV scans are photographed, skewed and full of stamps. Classic OCR
//! loses the field labels; a Vision LLM reads the card the way a clerk
//! does and returns the fields as JSON. The QR on the card is decoded in
//! parallel with a conventional decoder so the verification payload is
//! exact, then regenerated as a crisp code for the final print.
//!
//! ## Workflow Overview
//!
//! ```text
//! source PDF
//!  │
//!  ├─ 1. Recognition  page 1 → JPEG ─┬─ VLM field extraction ─┐
//!  │                                 └─ QR decode ────────────┴─▶ VehicleRecord
//!  │                                       (user may edit fields here)
//!  ├─ 2. Fill         «Placeholder» substitution in the DOCX template
//!  ├─ 3. Render       LibreOffice + pdfium → paginated image-only A4 PDF
//!  └─ 4. Embed        regenerated QR stamped on page 1 → final PDF
//! ```
//!
//! Each stage consumes the previous stage's artifact; editing the record
//! or swapping the template drops every artifact built from the old input.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_tiv::{PipelineConfig, SourceDocument, TemplateDocument, Workflow};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     // First run may download pdfium with a blocking client.
//!     let mut workflow =
//!         tokio::task::block_in_place(|| Workflow::detect(PipelineConfig::default()))?;
//!
//!     let scan = std::fs::read("tiv.pdf")?;
//!     workflow.load_source(SourceDocument::from_bytes("tiv.pdf", None, scan)?);
//!     let template = std::fs::read("plantilla.docx")?;
//!     workflow.load_template(TemplateDocument::from_bytes("plantilla.docx", template)?);
//!
//!     let record = workflow.recognize().await?;
//!     println!("placa: {}", record.placa);
//!
//!     workflow.fill_template().await?;
//!     workflow.render_document().await?;
//!     if let Some(advisory) = workflow.embed_code().await? {
//!         eprintln!("{advisory}");
//!     }
//!     for artifact in workflow.state().artifacts().iter() {
//!         artifact.save_to(std::path::Path::new("out"))?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tiv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-tiv = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime dependencies
//!
//! | Dependency | Used by | Located via |
//! |------------|---------|-------------|
//! | pdfium     | recognition, rendering, embedding | `PDFIUM_LIB_PATH` or auto-download |
//! | LibreOffice (`soffice`) | rendering | `--soffice`, `SOFFICE_PATH`, `PATH` |
//! | Vision LLM | recognition | provider API key in the environment |
//!
//! [`Collaborators::detect`] checks all three up front.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{Artifact, ArtifactChain, ArtifactKind};
pub use collaborators::Collaborators;
pub use config::{PageSize, PipelineConfig, PipelineConfigBuilder, ReadinessPolicy, StampPlacement};
pub use error::{Advisory, TivError};
pub use normalize::TemplateFields;
pub use pipeline::input::{load_source, load_template, SourceDocument, TemplateDocument};
pub use progress::{NoopProgressCallback, ProgressCallback, WorkflowProgressCallback};
pub use record::{Recognizer, RecognizerStatus, RecognizerStatuses, VehicleRecord};
pub use workflow::{Commit, Finished, Phase, Stage, Workflow, WorkflowState};
