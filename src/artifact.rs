//! The three downloadable artifacts and the chain that keeps them consistent.
//!
//! [`ArtifactChain`] is the only place artifacts are stored. Its setters
//! enforce the ordering invariant directly: a rendered PDF can only be
//! stored while a filled DOCX exists, a final PDF only while a rendered PDF
//! exists, and storing any artifact clears everything downstream of it.

use crate::error::TivError;
use crate::workflow::Stage;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which stage an artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Stage 5: the template with every placeholder substituted.
    FilledTemplate,
    /// Stage 6: the paginated raster PDF, without the QR stamp.
    RenderedPdf,
    /// Stage 7: the rendered PDF with the QR stamped on page 1.
    FinalPdf,
}

impl ArtifactKind {
    /// Download name for this artifact given the record's plate.
    ///
    /// An empty plate falls back to `TEMP` for the DOCX and `TIV` for the PDFs.
    pub fn file_name(self, placa: &str) -> String {
        let placa = placa.trim();
        let (prefix, fallback, ext) = match self {
            ArtifactKind::FilledTemplate => ("1_ENMICADO_WORD", "TEMP", "docx"),
            ArtifactKind::RenderedPdf => ("2_ENMICADO_PDF", "TIV", "pdf"),
            ArtifactKind::FinalPdf => ("3_ENMICADO_FINAL_QR", "TIV", "pdf"),
        };
        let id = if placa.is_empty() {
            fallback.to_string()
        } else {
            sanitize_file_component(placa)
        };
        format!("{prefix}_{id}.{ext}")
    }

    pub fn media_type(self) -> &'static str {
        match self {
            ArtifactKind::FilledTemplate => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ArtifactKind::RenderedPdf | ArtifactKind::FinalPdf => "application/pdf",
        }
    }

    /// The stage that produces this artifact.
    pub fn stage(self) -> Stage {
        match self {
            ArtifactKind::FilledTemplate => Stage::FillTemplate,
            ArtifactKind::RenderedPdf => Stage::RenderDocument,
            ArtifactKind::FinalPdf => Stage::EmbedCode,
        }
    }
}

/// Plates never contain path separators, but edited values might.
fn sanitize_file_component(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// One produced document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    kind: ArtifactKind,
    file_name: String,
    bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, placa: &str, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            file_name: kind.file_name(placa),
            bytes,
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the artifact into `dir` under its download name.
    ///
    /// The bytes go to a temporary file in the same directory first and are
    /// renamed into place, so a crash never leaves a truncated document.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, TivError> {
        let target = dir.join(&self.file_name);
        let write_err = |source| TivError::OutputWriteFailed {
            path: target.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&self.bytes).map_err(write_err)?;
        tmp.flush().map_err(write_err)?;
        tmp.persist(&target).map_err(|e| write_err(e.error))?;

        info!("Wrote {} ({} bytes)", target.display(), self.bytes.len());
        Ok(target)
    }
}

/// Filled DOCX → rendered PDF → final PDF, each present only if its
/// predecessor is.
#[derive(Debug, Clone, Default)]
pub struct ArtifactChain {
    filled: Option<Artifact>,
    rendered: Option<Artifact>,
    finalized: Option<Artifact>,
}

impl ArtifactChain {
    pub fn filled(&self) -> Option<&Artifact> {
        self.filled.as_ref()
    }

    pub fn rendered(&self) -> Option<&Artifact> {
        self.rendered.as_ref()
    }

    pub fn finalized(&self) -> Option<&Artifact> {
        self.finalized.as_ref()
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&Artifact> {
        match kind {
            ArtifactKind::FilledTemplate => self.filled(),
            ArtifactKind::RenderedPdf => self.rendered(),
            ArtifactKind::FinalPdf => self.finalized(),
        }
    }

    /// Store a new filled DOCX and drop both PDFs.
    pub fn set_filled(&mut self, artifact: Artifact) {
        self.filled = Some(artifact);
        self.rendered = None;
        self.finalized = None;
    }

    /// Store a new rendered PDF and drop the final PDF.
    pub fn set_rendered(&mut self, artifact: Artifact) -> Result<(), TivError> {
        if self.filled.is_none() {
            return Err(TivError::PrecursorMissing {
                stage: Stage::RenderDocument,
                missing: "the filled DOCX",
            });
        }
        self.rendered = Some(artifact);
        self.finalized = None;
        Ok(())
    }

    pub fn set_finalized(&mut self, artifact: Artifact) -> Result<(), TivError> {
        if self.rendered.is_none() {
            return Err(TivError::PrecursorMissing {
                stage: Stage::EmbedCode,
                missing: "the rendered PDF",
            });
        }
        self.finalized = Some(artifact);
        Ok(())
    }

    /// Drop every artifact (an upstream input changed).
    pub fn invalidate(&mut self) {
        if self.filled.is_some() {
            debug!("Invalidating artifact chain");
        }
        *self = Self::default();
    }

    /// Present artifacts in production order.
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        [&self.filled, &self.rendered, &self.finalized]
            .into_iter()
            .flatten()
    }
}
