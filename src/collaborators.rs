//! External collaborators, injected once into the workflow.
//!
//! [`Collaborators::detect`] is the startup capability check: it locates
//! pdfium, finds LibreOffice and resolves a VLM provider, failing fast with
//! [`TivError::MissingDependency`] instead of deferring the discovery to
//! whichever stage happens to need the missing piece first.

use crate::config::PipelineConfig;
use crate::error::TivError;
use crate::pipeline::compose::PdfAssembler;
use crate::pipeline::extract::{FieldExtractor, VisionFieldExtractor};
use crate::pipeline::office::{find_soffice, DocumentRasterizer, OfficeRasterizer};
use crate::pipeline::pdfium::PdfiumEngine;
use crate::pipeline::qr::{CodeCodec, QrCodec};
use crate::pipeline::raster::PageRasterizer;
use crate::pipeline::template::{DocxTemplateEngine, TemplateEngine};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Handles on every external service a workflow needs.
#[derive(Clone)]
pub struct Collaborators {
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub extractor: Arc<dyn FieldExtractor>,
    pub codec: Arc<dyn CodeCodec>,
    pub templates: Arc<dyn TemplateEngine>,
    pub documents: Arc<dyn DocumentRasterizer>,
    pub assembler: Arc<dyn PdfAssembler>,
}

impl Collaborators {
    /// Build the production collaborators, checking each one is available.
    ///
    /// Blocking: the first call may download pdfium. From async code wrap it
    /// in `tokio::task::block_in_place` or `spawn_blocking`.
    pub fn detect(config: &PipelineConfig) -> Result<Self, TivError> {
        let engine = Arc::new(PdfiumEngine::locate()?);
        let soffice = find_soffice(config.soffice_path.as_deref())?;
        info!("Using LibreOffice at {}", soffice.display());
        let provider = resolve_provider(config)?;
        info!(
            "VLM provider resolved ({})",
            config.provider_name.as_deref().unwrap_or("auto")
        );

        Ok(Self {
            rasterizer: engine.clone(),
            extractor: Arc::new(VisionFieldExtractor::new(
                provider,
                config.temperature,
                config.max_tokens,
                Duration::from_secs(config.api_timeout_secs),
            )),
            codec: Arc::new(QrCodec),
            templates: Arc::new(DocxTemplateEngine),
            documents: Arc::new(OfficeRasterizer::new(
                soffice,
                engine.clone(),
                Duration::from_secs(config.office_timeout_secs),
                config.readiness,
            )),
            assembler: engine,
        })
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

// ── Provider resolution ──────────────────────────────────────────────────────

/// Default vision model for a provider name.
fn default_model(provider: &str) -> &'static str {
    match provider {
        "gemini" | "google" => "gemini-2.5-flash",
        "anthropic" | "claude" => "claude-sonnet-4-20250514",
        "ollama" => "llava",
        _ => "gpt-4.1-mini",
    }
}

fn create_vision_provider(provider: &str, model: &str) -> Result<Arc<dyn LLMProvider>, TivError> {
    ProviderFactory::create_llm_provider(provider, model).map_err(|e| {
        TivError::MissingDependency {
            dependency: "vision LLM provider",
            detail: format!("'{provider}' ({model}) is not usable: {e}"),
            hint: "Set the provider's API key (e.g. GEMINI_API_KEY, OPENAI_API_KEY).",
        }
    })
}

/// Resolve the VLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    the provider's default vision model.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Gemini** when `GEMINI_API_KEY` is set: the scanner was tuned on
///    Gemini Flash and it reads Peruvian plates most reliably.
/// 5. **OpenAI** when `OPENAI_API_KEY` is set.
/// 6. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, TivError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(default_model(name));
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    for (key, provider) in [("GEMINI_API_KEY", "gemini"), ("OPENAI_API_KEY", "openai")] {
        if std::env::var(key).is_ok_and(|v| !v.is_empty()) {
            let model = config.model.as_deref().unwrap_or(default_model(provider));
            return create_vision_provider(provider, model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TivError::MissingDependency {
            dependency: "vision LLM provider",
            detail: format!("no provider could be auto-detected: {e}"),
            hint: "Set GEMINI_API_KEY or OPENAI_API_KEY, or pass --provider/--model.",
        })?;
    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_models_per_provider() {
        assert_eq!(default_model("gemini"), "gemini-2.5-flash");
        assert_eq!(default_model("openai"), "gpt-4.1-mini");
        assert_eq!(default_model("something-else"), "gpt-4.1-mini");
    }
}
