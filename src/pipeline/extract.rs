//! Structured extraction: source raster → [`VehicleRecord`] via a vision LLM.
//!
//! The module is deliberately thin: prompt wording lives in
//! [`crate::prompts`], reply clean-up in [`super::postprocess`]. What stays
//! here is the request shape, the timeout, and the decision of what counts
//! as "no usable payload".
//!
//! ## Message Layout
//!
//! 1. **System message**: the extraction prompt (layout heuristics,
//!    validation rules, key list).
//! 2. **User message**: the page JPEG as a base64 attachment with
//!    `detail: "high"`; without it the small print of the technical block
//!    is downsampled away.
//!
//! There is no retry: a failed extraction aborts recognition and the user
//! re-triggers it.

use crate::error::TivError;
use crate::pipeline::postprocess::{isolate_json, sanitize_record};
use crate::pipeline::raster::RasterImage;
use crate::prompts::extraction_prompt;
use crate::record::VehicleRecord;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Turns the rasterised source page into a structured record.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, image: &RasterImage) -> Result<VehicleRecord, TivError>;
}

/// [`FieldExtractor`] backed by an `edgequake-llm` vision provider.
pub struct VisionFieldExtractor {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl VisionFieldExtractor {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        temperature: f32,
        max_tokens: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
            timeout,
        }
    }

    /// Request options. No response schema is attached: the key list in
    /// [`extraction_prompt`] fixes the reply shape and
    /// [`isolate_json`] recovers the object.
    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl FieldExtractor for VisionFieldExtractor {
    async fn extract(&self, image: &RasterImage) -> Result<VehicleRecord, TivError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(extraction_prompt()),
            ChatMessage::user_with_images(
                "Extract the TIV fields from this image as a JSON object.",
                vec![ImageData::new(image.base64(), "image/jpeg").with_detail("high")],
            ),
        ];
        let options = self.options();

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| {
                TivError::extraction(format!(
                    "no reply within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| TivError::extraction(e.to_string()))?;

        debug!(
            "Extraction: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let record = parse_reply(&response.content)?;
        info!("Extracted record for plate '{}'", record.placa);
        Ok(record)
    }
}

/// Reply text → sanitised record.
pub fn parse_reply(reply: &str) -> Result<VehicleRecord, TivError> {
    if reply.trim().is_empty() {
        return Err(TivError::extraction("the service returned an empty reply"));
    }
    let json = isolate_json(reply)
        .ok_or_else(|| TivError::extraction("the reply contains no JSON object"))?;
    let value: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| TivError::extraction(format!("malformed JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| TivError::extraction("the reply is not a JSON object"))?;

    let mut record = VehicleRecord::from_json_object(object);
    sanitize_record(&mut record);

    let missing = record.missing_required();
    if !missing.is_empty() {
        warn!("Required fields left empty: {}", missing.join(", "));
    }
    Ok(record)
}
