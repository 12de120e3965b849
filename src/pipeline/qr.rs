//! QR decode and encode.
//!
//! Decoding uses `rqrr` on the luminance of the rendered source page;
//! encoding uses `qrcode` at error-correction level M and draws the module
//! grid ourselves so the output is an exact `size × size` square with a
//! four-module quiet zone, which is what a phone camera needs to lock on
//! once the stamp is printed at 60 pt.

use crate::error::TivError;
use image::{GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};
use tracing::debug;

/// Luminance handling for one decode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Dark modules on a light background only.
    Upright,
    /// Try as-is, then with luminance inverted (light-on-dark codes).
    AttemptBoth,
}

/// Finds and produces scannable codes.
pub trait CodeCodec: Send + Sync {
    /// Decode the first readable code in `image`; `None` when there is none.
    fn decode(&self, image: &GrayImage, mode: DecodeMode) -> Option<String>;

    /// Render `text` as a `size_px` square code image.
    fn encode(&self, text: &str, size_px: u32) -> Result<GrayImage, TivError>;
}

/// Upright first, then both polarities, as the recogniser does.
pub fn decode_with_fallback(codec: &dyn CodeCodec, image: &GrayImage) -> Option<String> {
    codec
        .decode(image, DecodeMode::Upright)
        .or_else(|| codec.decode(image, DecodeMode::AttemptBoth))
}

const QUIET_ZONE: u32 = 4;

#[derive(Debug, Default, Clone, Copy)]
pub struct QrCodec;

impl QrCodec {
    fn scan(image: &GrayImage, invert: bool) -> Option<String> {
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            image.width() as usize,
            image.height() as usize,
            |x, y| {
                let v = image.get_pixel(x as u32, y as u32).0[0];
                if invert {
                    255 - v
                } else {
                    v
                }
            },
        );
        prepared
            .detect_grids()
            .into_iter()
            .find_map(|grid| match grid.decode() {
                Ok((_meta, content)) => Some(content),
                Err(e) => {
                    debug!("QR grid found but not decodable: {e:?}");
                    None
                }
            })
    }
}

impl CodeCodec for QrCodec {
    fn decode(&self, image: &GrayImage, mode: DecodeMode) -> Option<String> {
        if image.width() == 0 || image.height() == 0 {
            return None;
        }
        let found = match mode {
            DecodeMode::Upright => Self::scan(image, false),
            DecodeMode::AttemptBoth => {
                Self::scan(image, false).or_else(|| Self::scan(image, true))
            }
        };
        debug!("QR decode ({mode:?}): {}", if found.is_some() { "found" } else { "none" });
        found
    }

    fn encode(&self, text: &str, size_px: u32) -> Result<GrayImage, TivError> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M)
            .map_err(|e| TivError::embed(format!("cannot encode QR: {e}")))?;

        let modules = code.width() as u32;
        let span = modules + 2 * QUIET_ZONE;
        let module_px = size_px / span;
        if module_px == 0 {
            return Err(TivError::embed(format!(
                "{size_px}px is too small for a {modules}-module QR code"
            )));
        }
        let offset = (size_px - module_px * span) / 2 + QUIET_ZONE * module_px;

        let colors = code.to_colors();
        let mut img = GrayImage::from_pixel(size_px, size_px, Luma([255]));
        for (i, color) in colors.iter().enumerate() {
            if *color != Color::Dark {
                continue;
            }
            let mx = i as u32 % modules;
            let my = i as u32 / modules;
            let x0 = offset + mx * module_px;
            let y0 = offset + my * module_px;
            for y in y0..y0 + module_px {
                for x in x0..x0 + module_px {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        debug!("Encoded QR: {modules} modules, {module_px}px/module, {size_px}px");
        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = "https://www.sunarp.gob.pe/verifica?c=00417&p=B7X042";

    #[test]
    fn encode_is_exact_square() {
        let img = QrCodec.encode(PAYLOAD, 200).unwrap();
        assert_eq!((img.width(), img.height()), (200, 200));
        // Quiet zone: corners stay white.
        assert_eq!(img.get_pixel(0, 0).0[0], 255);
        assert_eq!(img.get_pixel(199, 199).0[0], 255);
    }

    #[test]
    fn encoded_code_decodes_upright() {
        let img = QrCodec.encode(PAYLOAD, 200).unwrap();
        assert_eq!(QrCodec.decode(&img, DecodeMode::Upright).as_deref(), Some(PAYLOAD));
    }

    #[test]
    fn inverted_code_decodes_with_fallback() {
        let mut img = QrCodec.encode("00417", 200).unwrap();
        image::imageops::invert(&mut img);
        assert_eq!(decode_with_fallback(&QrCodec, &img).as_deref(), Some("00417"));
    }

    #[test]
    fn blank_page_has_no_code() {
        let img = GrayImage::from_pixel(300, 300, Luma([255]));
        assert_eq!(decode_with_fallback(&QrCodec, &img), None);
        assert_eq!(QrCodec.decode(&GrayImage::new(0, 0), DecodeMode::AttemptBoth), None);
    }

    #[test]
    fn tiny_size_is_embed_error() {
        let err = QrCodec.encode(PAYLOAD, 20).unwrap_err();
        assert!(matches!(err, TivError::EmbedFailed { .. }));
    }
}
