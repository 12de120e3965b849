//! QR embedding: rendered PDF + verification payload → final PDF.
//!
//! The QR is regenerated from the decoded payload rather than cropped out
//! of the scan, so the stamp is sharp at any print size.

use crate::config::PipelineConfig;
use crate::error::{Advisory, TivError};
use crate::pipeline::compose::PdfAssembler;
use crate::pipeline::qr::CodeCodec;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{info, warn};

/// Final PDF bytes plus any non-fatal notice.
#[derive(Debug, Clone)]
pub struct EmbedOutput {
    pub bytes: Vec<u8>,
    pub advisory: Option<Advisory>,
}

pub async fn embed_code(
    codec: Arc<dyn CodeCodec>,
    assembler: Arc<dyn PdfAssembler>,
    rendered: Arc<[u8]>,
    qr_data: Option<String>,
    config: &PipelineConfig,
) -> Result<EmbedOutput, TivError> {
    let Some(payload) = qr_data.filter(|p| !p.is_empty()) else {
        warn!("No QR payload; final PDF is the rendered PDF unchanged");
        return Ok(EmbedOutput {
            bytes: rendered.to_vec(),
            advisory: Some(Advisory::NoVerificationCode),
        });
    };

    let size_px = config.code_size_px;
    let stamp = config.stamp;
    tokio::task::spawn_blocking(move || {
        let code = codec
            .encode(&payload, size_px)
            .map_err(|e| match e {
                TivError::EmbedFailed { .. } => e,
                other => TivError::embed(other.to_string()),
            })?;
        let image = DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(code).to_rgb8());
        let bytes = assembler
            .stamp_first_page(&rendered, &image, stamp)
            .map_err(|e| match e {
                TivError::EmbedFailed { .. } => e,
                other => TivError::embed(other.to_string()),
            })?;
        info!("Stamped QR on page 1 ({} bytes)", bytes.len());
        Ok(EmbedOutput {
            bytes,
            advisory: None,
        })
    })
    .await
    .map_err(|e| TivError::Internal(format!("Embed task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PageSize, StampPlacement};
    use crate::pipeline::compose::PlacedImage;
    use crate::pipeline::qr::QrCodec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAssembler {
        stamps: Mutex<Vec<(u32, StampPlacement)>>,
    }

    impl PdfAssembler for RecordingAssembler {
        fn assemble(&self, _page: PageSize, _pages: &[PlacedImage]) -> Result<Vec<u8>, TivError> {
            Ok(b"%PDF".to_vec())
        }

        fn stamp_first_page(
            &self,
            pdf: &[u8],
            image: &DynamicImage,
            placement: StampPlacement,
        ) -> Result<Vec<u8>, TivError> {
            self.stamps.lock().unwrap().push((image.width(), placement));
            let mut out = pdf.to_vec();
            out.extend_from_slice(b"+QR");
            Ok(out)
        }
    }

    fn rendered() -> Arc<[u8]> {
        Arc::from(&b"%PDF-rendered"[..])
    }

    #[tokio::test]
    async fn no_payload_passes_through_with_advisory() {
        let assembler = Arc::new(RecordingAssembler::default());
        let out = embed_code(
            Arc::new(QrCodec),
            assembler.clone(),
            rendered(),
            None,
            &PipelineConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.bytes, b"%PDF-rendered");
        assert_eq!(out.advisory, Some(Advisory::NoVerificationCode));
        assert!(assembler.stamps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn payload_is_stamped_at_configured_placement() {
        let assembler = Arc::new(RecordingAssembler::default());
        let out = embed_code(
            Arc::new(QrCodec),
            assembler.clone(),
            rendered(),
            Some("00417".into()),
            &PipelineConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.bytes, b"%PDF-rendered+QR");
        assert_eq!(out.advisory, None);
        let stamps = assembler.stamps.lock().unwrap();
        assert_eq!(stamps.len(), 1);
        assert_eq!(stamps[0].0, 200);
        assert_eq!(stamps[0].1, StampPlacement::default());
    }

    #[tokio::test]
    async fn encode_failure_is_embed_error() {
        let config = PipelineConfig::builder().code_size_px(21).build().unwrap();
        let long = "X".repeat(300);
        let err = embed_code(
            Arc::new(QrCodec),
            Arc::new(RecordingAssembler::default()),
            rendered(),
            Some(long),
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TivError::EmbedFailed { .. }));
    }
}
