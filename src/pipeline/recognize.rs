//! Recognition: extraction and QR decode in parallel, joined into one record.
//!
//! Join policy:
//!
//! | extraction | decode     | result                                   |
//! |------------|------------|------------------------------------------|
//! | ok         | found      | record with `qr_data = Some(..)`         |
//! | ok         | none/panic | record with `qr_data = None`             |
//! | failed     | anything   | extraction error; decode result dropped  |
//!
//! Each recogniser reports its own status to the observer the moment it
//! settles, and the statuses are returned even when the join fails.

use crate::error::TivError;
use crate::pipeline::extract::FieldExtractor;
use crate::pipeline::qr::{decode_with_fallback, CodeCodec};
use crate::pipeline::raster::RasterImage;
use crate::progress::ProgressCallback;
use crate::record::{Recognizer, RecognizerStatus, RecognizerStatuses, VehicleRecord};
use std::sync::Arc;
use tracing::{info, warn};

/// Statuses of both recognisers plus the joined outcome.
#[derive(Debug)]
pub struct RecognitionReport {
    pub statuses: RecognizerStatuses,
    pub result: Result<VehicleRecord, TivError>,
}

pub async fn recognize(
    extractor: Arc<dyn FieldExtractor>,
    codec: Arc<dyn CodeCodec>,
    image: Arc<RasterImage>,
    observer: ProgressCallback,
) -> RecognitionReport {
    let extraction = {
        let image = Arc::clone(&image);
        let observer = Arc::clone(&observer);
        async move {
            let result = extractor.extract(&image).await;
            let status = if result.is_ok() {
                RecognizerStatus::Success
            } else {
                RecognizerStatus::Failed
            };
            observer.on_recognizer_status(Recognizer::Extraction, status);
            result
        }
    };

    let decode = {
        let observer = Arc::clone(&observer);
        async move {
            let joined = tokio::task::spawn_blocking(move || {
                let gray = image.bitmap().to_luma8();
                decode_with_fallback(codec.as_ref(), &gray)
            })
            .await;
            let code = joined.unwrap_or_else(|e| {
                warn!("QR decode task panicked: {e}");
                None
            });
            let status = if code.is_some() {
                RecognizerStatus::Success
            } else {
                RecognizerStatus::Failed
            };
            observer.on_recognizer_status(Recognizer::Code, status);
            code
        }
    };

    let (extracted, code) = tokio::join!(extraction, decode);

    let mut statuses = RecognizerStatuses::default();
    statuses.set(
        Recognizer::Extraction,
        if extracted.is_ok() {
            RecognizerStatus::Success
        } else {
            RecognizerStatus::Failed
        },
    );
    statuses.set(
        Recognizer::Code,
        if code.is_some() {
            RecognizerStatus::Success
        } else {
            RecognizerStatus::Failed
        },
    );

    let result = extracted.map(|mut record| {
        if code.is_none() {
            warn!("No QR code found in the source; the final PDF will not be stamped");
        }
        record.qr_data = code;
        info!(
            "Recognition joined: extraction ok, QR {}",
            if record.qr_data.is_some() { "found" } else { "absent" }
        );
        record
    });

    RecognitionReport { statuses, result }
}
