//! Configuration types for the TIV workflow.
//!
//! Every knob of every stage lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The defaults are the enmicado office's
//! production settings: 2× source raster, JPEG 0.9, an 800 px × 3 document
//! surface, A4 pages, and a 200 px QR stamped 65 pt / 85 pt from the
//! top-left corner.

use crate::error::TivError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a TIV workflow.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_tiv::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .model("gemini-2.5-flash")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.source_scale, 2.0);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Magnification applied to page 1 of the source PDF before recognition. Default: 2.0.
    ///
    /// At 1× a TIV card renders at roughly 600 px wide and the small print of
    /// the technical block is unreadable to both the VLM and the QR finder.
    pub source_scale: f32,

    /// JPEG quality (1–100) of the rasterised source sent to the VLM. Default: 90.
    pub source_jpeg_quality: u8,

    /// LLM model identifier, e.g. "gemini-2.5-flash", "gpt-4.1-mini".
    /// If None, a per-provider default is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for extraction. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens of the extraction reply. Default: 2048.
    ///
    /// The reply is one flat JSON object of 34 short strings; 2 048 leaves
    /// ample headroom for models that echo whitespace.
    pub max_tokens: usize,

    /// Upper bound on the extraction call in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL sources in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Nominal width of the off-screen document surface, in CSS pixels. Default: 800.
    pub render_width_px: u32,

    /// Upscaling applied when rasterising the document surface. Default: 3.
    pub render_scale: u32,

    /// Physical size of every output page. Default: A4.
    pub page_size: PageSize,

    /// How long to wait for the rendered surface to become ready.
    pub readiness: ReadinessPolicy,

    /// Upper bound on the DOCX → PDF conversion process in seconds. Default: 120.
    pub office_timeout_secs: u64,

    /// Explicit path to the `soffice` binary. If None, `SOFFICE_PATH` and
    /// then `PATH` are searched.
    pub soffice_path: Option<PathBuf>,

    /// Pixel size of the regenerated QR image. Default: 200.
    pub code_size_px: u32,

    /// Where the QR image is drawn on page 1 of the final PDF.
    pub stamp: StampPlacement,

    /// Optional observer for stage and recogniser events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_scale: 2.0,
            source_jpeg_quality: 90,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 2048,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            render_width_px: 800,
            render_scale: 3,
            page_size: PageSize::A4,
            readiness: ReadinessPolicy::default(),
            office_timeout_secs: 120,
            soffice_path: None,
            code_size_px: 200,
            stamp: StampPlacement::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("source_scale", &self.source_scale)
            .field("source_jpeg_quality", &self.source_jpeg_quality)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("render_width_px", &self.render_width_px)
            .field("render_scale", &self.render_scale)
            .field("page_size", &self.page_size)
            .field("readiness", &self.readiness)
            .field("soffice_path", &self.soffice_path)
            .field("code_size_px", &self.code_size_px)
            .field("stamp", &self.stamp)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Pixel width of the rasterised document surface.
    pub fn surface_width_px(&self) -> u32 {
        self.render_width_px * self.render_scale
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn source_scale(mut self, scale: f32) -> Self {
        self.config.source_scale = scale;
        self
    }

    pub fn source_jpeg_quality(mut self, quality: u8) -> Self {
        self.config.source_jpeg_quality = quality;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn render_width_px(mut self, px: u32) -> Self {
        self.config.render_width_px = px;
        self
    }

    pub fn render_scale(mut self, scale: u32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn page_size(mut self, page: PageSize) -> Self {
        self.config.page_size = page;
        self
    }

    pub fn readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.config.readiness = policy;
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.office_timeout_secs = secs;
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn code_size_px(mut self, px: u32) -> Self {
        self.config.code_size_px = px;
        self
    }

    pub fn stamp(mut self, stamp: StampPlacement) -> Self {
        self.config.stamp = stamp;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, TivError> {
        let c = &self.config;
        if !(0.5..=6.0).contains(&c.source_scale) {
            return Err(TivError::InvalidConfig(format!(
                "source scale must be 0.5–6.0, got {}",
                c.source_scale
            )));
        }
        if c.source_jpeg_quality == 0 || c.source_jpeg_quality > 100 {
            return Err(TivError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.source_jpeg_quality
            )));
        }
        if c.render_width_px < 100 || c.render_scale == 0 || c.render_scale > 6 {
            return Err(TivError::InvalidConfig(format!(
                "document surface {}px × {} is out of range (width ≥ 100, scale 1–6)",
                c.render_width_px, c.render_scale
            )));
        }
        if c.code_size_px < 21 {
            return Err(TivError::InvalidConfig(format!(
                "QR image must be at least 21px, got {}",
                c.code_size_px
            )));
        }
        if c.stamp.size <= 0.0 || c.stamp.left < 0.0 || c.stamp.top < 0.0 {
            return Err(TivError::InvalidConfig(format!(
                "stamp placement must be non-negative with a positive size, got {:?}",
                c.stamp
            )));
        }
        if c.readiness.poll_interval.is_zero() || c.readiness.max_wait < c.readiness.poll_interval {
            return Err(TivError::InvalidConfig(
                "readiness poll interval must be > 0 and ≤ max wait".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Value types ──────────────────────────────────────────────────────────

/// Physical page size in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// ISO A4 portrait, 210 × 297 mm.
    pub const A4: PageSize = PageSize {
        width_pt: 595.28,
        height_pt: 841.89,
    };
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4
    }
}

/// Position and size of the QR stamp on page 1, in points measured from
/// the page's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StampPlacement {
    pub left: f32,
    pub top: f32,
    pub size: f32,
}

impl StampPlacement {
    /// Bottom-left corner of the stamp in PDF (bottom-up) coordinates.
    pub fn origin(&self, page_height_pt: f32) -> (f32, f32) {
        (self.left, page_height_pt - self.top - self.size)
    }
}

impl Default for StampPlacement {
    fn default() -> Self {
        Self {
            left: 65.0,
            top: 85.0,
            size: 60.0,
        }
    }
}

/// Bounded polling used instead of a blind settle delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            max_wait: Duration::from_secs(15),
        }
    }
}
