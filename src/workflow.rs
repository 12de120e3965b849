//! The enmicado workflow controller.
//!
//! [`Workflow`] owns the injected [`Collaborators`], the [`PipelineConfig`]
//! and the mutable [`WorkflowState`]. Every stage can be driven two ways:
//!
//! - **In one call** (`recognize`, `fill_template`, `render_document`,
//!   `embed_code`), holding `&mut Workflow` across the await.
//! - **Split** into `prepare_*` → [`RecognitionJob::run`] etc. → `commit_*`.
//!   `prepare_*` checks the stage's precursors and snapshots its inputs into
//!   an owned job; the job runs without borrowing the workflow; `commit_*`
//!   applies the result only if the state it was computed from is still
//!   current. A [`Workflow::reset`] or an input edit in between turns the
//!   late result into [`Commit::Discarded`].
//!
//! ## Ticket rules
//!
//! | change                                   | epoch | generation |
//! |------------------------------------------|-------|------------|
//! | `reset`                                  | +1    | +1         |
//! | `load_template`, `set_field`, recognition commit | | +1      |
//! | artifact commit (fill, render, embed)    |       | +1         |
//!
//! Recognition results are stale when the epoch moved. Artifact-stage
//! results are stale when either counter moved, so a render computed from a
//! DOCX that has since been refilled is never stored next to it.

use crate::artifact::{Artifact, ArtifactChain, ArtifactKind};
use crate::collaborators::Collaborators;
use crate::config::PipelineConfig;
use crate::error::{Advisory, TivError};
use crate::normalize::TemplateFields;
use crate::pipeline::compose::{render_document, PdfAssembler};
use crate::pipeline::embed::{embed_code, EmbedOutput};
use crate::pipeline::extract::FieldExtractor;
use crate::pipeline::input::{SourceDocument, TemplateDocument};
use crate::pipeline::office::DocumentRasterizer;
use crate::pipeline::qr::CodeCodec;
use crate::pipeline::raster::{rasterize_source, PageRasterizer};
use crate::pipeline::recognize::{recognize, RecognitionReport};
use crate::pipeline::template::TemplateEngine;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::record::{RecognizerStatuses, VehicleRecord};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The four stages of the workflow, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Recognition,
    FillTemplate,
    RenderDocument,
    EmbedCode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Recognition => "recognition",
            Stage::FillTemplate => "template filling",
            Stage::RenderDocument => "document rendering",
            Stage::EmbedCode => "QR embedding",
        })
    }
}

/// Where the user is: still choosing a source, or reviewing a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Upload,
    Review,
}

/// Everything the workflow knows. Read-only from the outside; all
/// mutation goes through [`Workflow`].
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    phase: Phase,
    source: Option<SourceDocument>,
    template: Option<TemplateDocument>,
    record: VehicleRecord,
    statuses: RecognizerStatuses,
    artifacts: ArtifactChain,
    advisory: Option<Advisory>,
    last_error: Option<String>,
    epoch: u64,
    generation: u64,
}

impl WorkflowState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn source(&self) -> Option<&SourceDocument> {
        self.source.as_ref()
    }

    pub fn template(&self) -> Option<&TemplateDocument> {
        self.template.as_ref()
    }

    pub fn record(&self) -> &VehicleRecord {
        &self.record
    }

    pub fn statuses(&self) -> RecognizerStatuses {
        self.statuses
    }

    pub fn artifacts(&self) -> &ArtifactChain {
        &self.artifacts
    }

    /// Notice left by the last embedding, if any.
    pub fn advisory(&self) -> Option<Advisory> {
        self.advisory
    }

    /// Message of the most recent failure; cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether `stage` has a current result. Derived from the artifact
    /// chain, so a later stage is never done while an earlier one is not.
    pub fn is_done(&self, stage: Stage) -> bool {
        match stage {
            Stage::Recognition => self.phase == Phase::Review,
            Stage::FillTemplate => self.artifacts.filled().is_some(),
            Stage::RenderDocument => self.artifacts.rendered().is_some(),
            Stage::EmbedCode => self.artifacts.finalized().is_some(),
        }
    }

    /// Whether every precursor of `stage` is available.
    pub fn is_ready(&self, stage: Stage) -> bool {
        self.precursor_missing(stage).is_none()
    }

    fn precursor_missing(&self, stage: Stage) -> Option<&'static str> {
        match stage {
            Stage::Recognition if self.source.is_none() => Some("the source document"),
            Stage::FillTemplate if self.template.is_none() => Some("the DOCX template"),
            Stage::FillTemplate if self.phase != Phase::Review => Some("a recognised record"),
            Stage::RenderDocument if self.artifacts.filled().is_none() => Some("the filled DOCX"),
            Stage::EmbedCode if self.artifacts.rendered().is_none() => Some("the rendered PDF"),
            _ => None,
        }
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            epoch: self.epoch,
            generation: self.generation,
        }
    }

    fn touch(&mut self) {
        self.generation += 1;
    }

    /// An input of the artifact chain changed.
    fn invalidate(&mut self) {
        self.artifacts.invalidate();
        self.advisory = None;
        self.touch();
    }
}

/// Snapshot of the state counters a job was prepared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    epoch: u64,
    generation: u64,
}

/// Output of a job, tagged with the state it was computed from.
#[derive(Debug)]
pub struct Finished<T> {
    ticket: Ticket,
    output: T,
}

impl<T> Finished<T> {
    pub fn output(&self) -> &T {
        &self.output
    }
}

/// What `commit_*` did with a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit<T> {
    /// The result was stored.
    Applied(T),
    /// The workflow moved on since the job was prepared; nothing changed.
    Discarded,
}

impl<T> Commit<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Commit::Applied(_))
    }

    pub fn into_applied(self) -> Option<T> {
        match self {
            Commit::Applied(value) => Some(value),
            Commit::Discarded => None,
        }
    }
}

// ── Jobs ─────────────────────────────────────────────────────────────────────

/// Stage 1: rasterise the source and run both recognisers.
pub struct RecognitionJob {
    ticket: Ticket,
    source: Arc<[u8]>,
    rasterizer: Arc<dyn PageRasterizer>,
    extractor: Arc<dyn FieldExtractor>,
    codec: Arc<dyn CodeCodec>,
    scale: f32,
    quality: u8,
    observer: ProgressCallback,
}

impl RecognitionJob {
    pub async fn run(self) -> Finished<RecognitionReport> {
        self.observer
            .on_status(Stage::Recognition, "Rendering PDF for visual analysis…");
        let report =
            match rasterize_source(self.rasterizer, self.source, self.scale, self.quality).await {
                Ok(image) => {
                    self.observer.on_status(
                        Stage::Recognition,
                        "Reading fields and verification code…",
                    );
                    recognize(
                        self.extractor,
                        self.codec,
                        Arc::new(image),
                        Arc::clone(&self.observer),
                    )
                    .await
                }
                Err(e) => RecognitionReport {
                    statuses: RecognizerStatuses::default(),
                    result: Err(e),
                },
            };
        Finished {
            ticket: self.ticket,
            output: report,
        }
    }
}

/// Stage 2: substitute the record into the template.
pub struct FillJob {
    ticket: Ticket,
    template: Arc<[u8]>,
    fields: TemplateFields,
    engine: Arc<dyn TemplateEngine>,
    observer: ProgressCallback,
}

impl FillJob {
    pub async fn run(self) -> Finished<Result<Vec<u8>, TivError>> {
        self.observer
            .on_status(Stage::FillTemplate, "Filling the Word template…");
        let (engine, template, fields) = (self.engine, self.template, self.fields);
        let output = tokio::task::spawn_blocking(move || engine.fill(&template, &fields))
            .await
            .map_err(|e| TivError::Internal(format!("Template task panicked: {e}")))
            .and_then(|r| r);
        Finished {
            ticket: self.ticket,
            output,
        }
    }
}

/// Stage 3: filled DOCX → paginated image-only PDF.
pub struct RenderJob {
    ticket: Ticket,
    docx: Arc<[u8]>,
    documents: Arc<dyn DocumentRasterizer>,
    assembler: Arc<dyn PdfAssembler>,
    config: PipelineConfig,
    observer: ProgressCallback,
}

impl RenderJob {
    pub async fn run(self) -> Finished<Result<Vec<u8>, TivError>> {
        self.observer.on_status(
            Stage::RenderDocument,
            "Rendering the document and building the PDF…",
        );
        let output = render_document(self.documents, self.assembler, self.docx, &self.config).await;
        Finished {
            ticket: self.ticket,
            output,
        }
    }
}

/// Stage 4: stamp the regenerated QR onto page 1.
pub struct EmbedJob {
    ticket: Ticket,
    rendered: Arc<[u8]>,
    qr_data: Option<String>,
    codec: Arc<dyn CodeCodec>,
    assembler: Arc<dyn PdfAssembler>,
    config: PipelineConfig,
    observer: ProgressCallback,
}

impl EmbedJob {
    pub async fn run(self) -> Finished<Result<EmbedOutput, TivError>> {
        self.observer
            .on_status(Stage::EmbedCode, "Stamping the verification QR…");
        let output = embed_code(
            self.codec,
            self.assembler,
            self.rendered,
            self.qr_data,
            &self.config,
        )
        .await;
        Finished {
            ticket: self.ticket,
            output,
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

/// Drives one TIV scan from upload to the stamped final PDF.
pub struct Workflow {
    collaborators: Collaborators,
    config: PipelineConfig,
    state: WorkflowState,
}

impl Workflow {
    pub fn new(collaborators: Collaborators, config: PipelineConfig) -> Self {
        Self {
            collaborators,
            config,
            state: WorkflowState::default(),
        }
    }

    /// Detect the production collaborators and build a workflow on them.
    pub fn detect(config: PipelineConfig) -> Result<Self, TivError> {
        let collaborators = Collaborators::detect(&config)?;
        Ok(Self::new(collaborators, config))
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn observer(&self) -> ProgressCallback {
        self.config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback))
    }

    /// Record a failure and hand the error back to the caller.
    fn fail(&mut self, stage: Stage, err: TivError) -> TivError {
        let message = err.to_string();
        warn!("{stage} failed: {message}");
        self.observer().on_stage_error(stage, &message);
        self.state.last_error = Some(message);
        err
    }

    fn gate(&mut self, stage: Stage) -> Result<(), TivError> {
        match self.state.precursor_missing(stage) {
            Some(missing) => Err(self.fail(stage, TivError::PrecursorMissing { stage, missing })),
            None => {
                self.observer().on_stage_start(stage);
                Ok(())
            }
        }
    }

    fn is_current(&self, stage: Stage, ticket: Ticket) -> bool {
        let current = self.state.ticket();
        let fresh = match stage {
            Stage::Recognition => ticket.epoch == current.epoch,
            _ => ticket == current,
        };
        if !fresh {
            debug!("Discarding stale {stage} result ({ticket:?}, now {current:?})");
        }
        fresh
    }

    // ── Inputs ───────────────────────────────────────────────────────────

    /// Accept a validated source scan. Does not reset anything else.
    pub fn load_source(&mut self, source: SourceDocument) {
        info!("Source loaded: {} ({} bytes)", source.name(), source.bytes().len());
        self.state.source = Some(source);
        self.state.last_error = None;
    }

    /// Replace the template; every artifact built from the old one is dropped.
    pub fn load_template(&mut self, template: TemplateDocument) {
        info!("Template loaded: {}", template.name());
        self.state.template = Some(template);
        self.state.last_error = None;
        self.state.invalidate();
    }

    /// Edit one record field by name.
    ///
    /// A recognition still in flight for the same upload overwrites the
    /// whole record, edits included, when it commits.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> Result<(), TivError> {
        self.state.record.set(name, value)?;
        debug!("Field {name} edited");
        self.state.invalidate();
        Ok(())
    }

    /// Replace the QR payload. An empty string counts as absent.
    pub fn set_verification_code(&mut self, code: Option<String>) {
        self.state.record.qr_data = code.filter(|c| !c.is_empty());
        self.state.invalidate();
    }

    /// Back to an empty upload. The template is kept; any job still in
    /// flight will be discarded when it tries to commit.
    pub fn reset(&mut self) {
        let template = self.state.template.take();
        let epoch = self.state.epoch + 1;
        let generation = self.state.generation + 1;
        self.state = WorkflowState {
            template,
            epoch,
            generation,
            ..WorkflowState::default()
        };
        info!("Workflow reset (epoch {epoch})");
    }

    // ── Stage 1: recognition ─────────────────────────────────────────────

    pub fn prepare_recognition(&mut self) -> Result<RecognitionJob, TivError> {
        self.gate(Stage::Recognition)?;
        let source = match self.state.source.as_ref() {
            Some(source) => source.shared_bytes(),
            None => return Err(TivError::Internal("source vanished after gating".into())),
        };
        Ok(RecognitionJob {
            ticket: self.state.ticket(),
            source,
            rasterizer: Arc::clone(&self.collaborators.rasterizer),
            extractor: Arc::clone(&self.collaborators.extractor),
            codec: Arc::clone(&self.collaborators.codec),
            scale: self.config.source_scale,
            quality: self.config.source_jpeg_quality,
            observer: self.observer(),
        })
    }

    /// Store a recognition result. Statuses are kept even on failure.
    pub fn commit_recognition(
        &mut self,
        finished: Finished<RecognitionReport>,
    ) -> Result<Commit<()>, TivError> {
        if !self.is_current(Stage::Recognition, finished.ticket) {
            return Ok(Commit::Discarded);
        }
        let RecognitionReport { statuses, result } = finished.output;
        self.state.statuses = statuses;
        match result {
            Ok(record) => {
                info!(
                    "Recognition committed: placa '{}', QR {}",
                    record.placa,
                    if record.qr_data.is_some() { "present" } else { "absent" }
                );
                self.state.record = record;
                self.state.phase = Phase::Review;
                self.state.last_error = None;
                self.state.invalidate();
                self.observer().on_stage_complete(Stage::Recognition, 0);
                Ok(Commit::Applied(()))
            }
            Err(e) => Err(self.fail(Stage::Recognition, e)),
        }
    }

    pub async fn recognize(&mut self) -> Result<&VehicleRecord, TivError> {
        let job = self.prepare_recognition()?;
        let finished = job.run().await;
        self.commit_recognition(finished)?;
        Ok(&self.state.record)
    }

    // ── Stage 2: template filling ────────────────────────────────────────

    pub fn prepare_fill(&mut self) -> Result<FillJob, TivError> {
        self.gate(Stage::FillTemplate)?;
        let template = match self.state.template.as_ref() {
            Some(template) => template.shared_bytes(),
            None => return Err(TivError::Internal("template vanished after gating".into())),
        };
        Ok(FillJob {
            ticket: self.state.ticket(),
            template,
            fields: TemplateFields::from_record(&self.state.record),
            engine: Arc::clone(&self.collaborators.templates),
            observer: self.observer(),
        })
    }

    pub fn commit_fill(
        &mut self,
        finished: Finished<Result<Vec<u8>, TivError>>,
    ) -> Result<Commit<()>, TivError> {
        if !self.is_current(Stage::FillTemplate, finished.ticket) {
            return Ok(Commit::Discarded);
        }
        let bytes = finished
            .output
            .map_err(|e| self.fail(Stage::FillTemplate, e))?;
        let artifact = Artifact::new(ArtifactKind::FilledTemplate, &self.state.record.placa, bytes);
        info!("Filled template: {} ({} bytes)", artifact.file_name(), artifact.len());
        let len = artifact.len();
        self.state.artifacts.set_filled(artifact);
        self.state.advisory = None;
        self.state.last_error = None;
        self.state.touch();
        self.observer().on_stage_complete(Stage::FillTemplate, len);
        Ok(Commit::Applied(()))
    }

    pub async fn fill_template(&mut self) -> Result<&Artifact, TivError> {
        let job = self.prepare_fill()?;
        let finished = job.run().await;
        self.commit_fill(finished)?;
        stored(self.state.artifacts.filled(), Stage::FillTemplate)
    }

    // ── Stage 3: document rendering ──────────────────────────────────────

    pub fn prepare_render(&mut self) -> Result<RenderJob, TivError> {
        self.gate(Stage::RenderDocument)?;
        let docx = match self.state.artifacts.filled() {
            Some(filled) => Arc::from(filled.bytes()),
            None => return Err(TivError::Internal("filled DOCX vanished after gating".into())),
        };
        Ok(RenderJob {
            ticket: self.state.ticket(),
            docx,
            documents: Arc::clone(&self.collaborators.documents),
            assembler: Arc::clone(&self.collaborators.assembler),
            config: self.config.clone(),
            observer: self.observer(),
        })
    }

    pub fn commit_render(
        &mut self,
        finished: Finished<Result<Vec<u8>, TivError>>,
    ) -> Result<Commit<()>, TivError> {
        if !self.is_current(Stage::RenderDocument, finished.ticket) {
            return Ok(Commit::Discarded);
        }
        let bytes = finished
            .output
            .map_err(|e| self.fail(Stage::RenderDocument, e))?;
        let artifact = Artifact::new(ArtifactKind::RenderedPdf, &self.state.record.placa, bytes);
        let len = artifact.len();
        info!("Rendered PDF: {} ({len} bytes)", artifact.file_name());
        if let Err(e) = self.state.artifacts.set_rendered(artifact) {
            return Err(self.fail(Stage::RenderDocument, e));
        }
        self.state.advisory = None;
        self.state.last_error = None;
        self.state.touch();
        self.observer().on_stage_complete(Stage::RenderDocument, len);
        Ok(Commit::Applied(()))
    }

    pub async fn render_document(&mut self) -> Result<&Artifact, TivError> {
        let job = self.prepare_render()?;
        let finished = job.run().await;
        self.commit_render(finished)?;
        stored(self.state.artifacts.rendered(), Stage::RenderDocument)
    }

    // ── Stage 4: QR embedding ────────────────────────────────────────────

    pub fn prepare_embed(&mut self) -> Result<EmbedJob, TivError> {
        self.gate(Stage::EmbedCode)?;
        let rendered = match self.state.artifacts.rendered() {
            Some(rendered) => Arc::from(rendered.bytes()),
            None => return Err(TivError::Internal("rendered PDF vanished after gating".into())),
        };
        Ok(EmbedJob {
            ticket: self.state.ticket(),
            rendered,
            qr_data: self.state.record.qr_data.clone(),
            codec: Arc::clone(&self.collaborators.codec),
            assembler: Arc::clone(&self.collaborators.assembler),
            config: self.config.clone(),
            observer: self.observer(),
        })
    }

    /// Store the final PDF. The applied value is the advisory, if any.
    pub fn commit_embed(
        &mut self,
        finished: Finished<Result<EmbedOutput, TivError>>,
    ) -> Result<Commit<Option<Advisory>>, TivError> {
        if !self.is_current(Stage::EmbedCode, finished.ticket) {
            return Ok(Commit::Discarded);
        }
        let EmbedOutput { bytes, advisory } = finished
            .output
            .map_err(|e| self.fail(Stage::EmbedCode, e))?;
        let artifact = Artifact::new(ArtifactKind::FinalPdf, &self.state.record.placa, bytes);
        let len = artifact.len();
        info!("Final PDF: {} ({len} bytes)", artifact.file_name());
        if let Err(e) = self.state.artifacts.set_finalized(artifact) {
            return Err(self.fail(Stage::EmbedCode, e));
        }
        if let Some(advisory) = advisory {
            self.observer().on_status(Stage::EmbedCode, &advisory.to_string());
        }
        self.state.advisory = advisory;
        self.state.last_error = None;
        self.state.touch();
        self.observer().on_stage_complete(Stage::EmbedCode, len);
        Ok(Commit::Applied(advisory))
    }

    pub async fn embed_code(&mut self) -> Result<Option<Advisory>, TivError> {
        let job = self.prepare_embed()?;
        let finished = job.run().await;
        match self.commit_embed(finished)? {
            Commit::Applied(advisory) => Ok(advisory),
            Commit::Discarded => Err(TivError::Internal(
                "QR embedding result was discarded".into(),
            )),
        }
    }
}

/// The artifact a one-call stage just committed.
fn stored(artifact: Option<&Artifact>, stage: Stage) -> Result<&Artifact, TivError> {
    artifact.ok_or_else(|| TivError::Internal(format!("{stage} result was discarded")))
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_read_naturally() {
        assert_eq!(Stage::Recognition.to_string(), "recognition");
        assert_eq!(Stage::EmbedCode.to_string(), "QR embedding");
    }

    #[test]
    fn fresh_state_gates_everything_but_nothing_is_done() {
        let state = WorkflowState::default();
        assert_eq!(state.phase(), Phase::Upload);
        for stage in [
            Stage::Recognition,
            Stage::FillTemplate,
            Stage::RenderDocument,
            Stage::EmbedCode,
        ] {
            assert!(!state.is_done(stage));
            assert!(!state.is_ready(stage));
        }
    }

    #[test]
    fn fill_needs_template_before_record() {
        let mut state = WorkflowState::default();
        assert_eq!(
            state.precursor_missing(Stage::FillTemplate),
            Some("the DOCX template")
        );
        state.template = Some(TemplateDocument::from_bytes("t.docx", b"PK\x03\x04".to_vec()).unwrap());
        assert_eq!(
            state.precursor_missing(Stage::FillTemplate),
            Some("a recognised record")
        );
        state.phase = Phase::Review;
        assert!(state.is_ready(Stage::FillTemplate));
    }

    #[test]
    fn invalidate_moves_generation_only() {
        let mut state = WorkflowState::default();
        let before = state.ticket();
        state.invalidate();
        let after = state.ticket();
        assert_eq!(before.epoch, after.epoch);
        assert_eq!(after.generation, before.generation + 1);
    }

    #[test]
    fn commit_helpers() {
        assert!(Commit::Applied(1).is_applied());
        assert_eq!(Commit::Applied(1).into_applied(), Some(1));
        assert_eq!(Commit::<u8>::Discarded.into_applied(), None);
    }
}
