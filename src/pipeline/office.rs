//! DOCX → bitmap surface, via headless LibreOffice and pdfium.
//!
//! LibreOffice lays the filled document out exactly as Word would print it
//! (fonts, tables, embedded logos) and exports a PDF; pdfium then rasterises
//! every page at the surface width and the pages are stacked into one tall
//! bitmap for [`crate::pipeline::compose`].
//!
//! ## Readiness
//!
//! `soffice` can exit before the exported PDF is fully flushed, notably when
//! another LibreOffice instance owns the profile and the conversion is handed
//! over. Instead of sleeping a fixed delay we poll the output file until it
//! starts with `%PDF` and its size is unchanged between two polls, giving up
//! after [`ReadinessPolicy::max_wait`].

use crate::config::ReadinessPolicy;
use crate::error::TivError;
use crate::pipeline::raster::PageRasterizer;
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Renders a DOCX into one bitmap `width_px` pixels wide.
#[async_trait]
pub trait DocumentRasterizer: Send + Sync {
    async fn rasterize(&self, docx: &[u8], width_px: u32) -> Result<DynamicImage, TivError>;
}

/// [`DocumentRasterizer`] backed by `soffice --headless --convert-to pdf`.
pub struct OfficeRasterizer {
    soffice: PathBuf,
    pages: Arc<dyn PageRasterizer>,
    timeout: Duration,
    readiness: ReadinessPolicy,
}

impl OfficeRasterizer {
    pub fn new(
        soffice: PathBuf,
        pages: Arc<dyn PageRasterizer>,
        timeout: Duration,
        readiness: ReadinessPolicy,
    ) -> Self {
        Self {
            soffice,
            pages,
            timeout,
            readiness,
        }
    }

    pub fn soffice(&self) -> &Path {
        &self.soffice
    }

    async fn convert_to_pdf(&self, docx: &[u8]) -> Result<Vec<u8>, TivError> {
        let work = tempfile::tempdir()
            .map_err(|e| TivError::Internal(format!("Failed to create temp dir: {e}")))?;
        let input = work.path().join("enmicado.docx");
        let output = work.path().join("enmicado.pdf");
        // A private profile lets conversions run while the user has LibreOffice open.
        let profile = work.path().join("profile");

        tokio::fs::write(&input, docx)
            .await
            .map_err(|e| TivError::render(format!("Failed to stage DOCX: {e}")))?;

        let mut cmd = Command::new(&self.soffice);
        cmd.arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .arg("--headless")
            .arg("--norestore")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(work.path())
            .arg(&input)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                TivError::render(format!(
                    "LibreOffice conversion timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| TivError::render(format!("Failed to run soffice: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TivError::render(format!(
                "soffice exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }
        debug!("soffice finished in {:?}", started.elapsed());

        wait_for_pdf(&output, self.readiness).await
    }
}

#[async_trait]
impl DocumentRasterizer for OfficeRasterizer {
    async fn rasterize(&self, docx: &[u8], width_px: u32) -> Result<DynamicImage, TivError> {
        let pdf = self.convert_to_pdf(docx).await?;
        info!("DOCX converted to PDF ({} bytes)", pdf.len());

        let pages = Arc::clone(&self.pages);
        tokio::task::spawn_blocking(move || {
            let bitmaps = pages.all_pages(&pdf, width_px)?;
            stack_pages(&bitmaps, width_px)
        })
        .await
        .map_err(|e| TivError::Internal(format!("Rasterisation task panicked: {e}")))?
    }
}

/// Poll `path` until it holds a complete PDF, bounded by `policy.max_wait`.
pub async fn wait_for_pdf(path: &Path, policy: ReadinessPolicy) -> Result<Vec<u8>, TivError> {
    let deadline = Instant::now() + policy.max_wait;
    let mut last_len: Option<u64> = None;

    loop {
        if let Ok(meta) = tokio::fs::metadata(path).await {
            let len = meta.len();
            if len > 0 && last_len == Some(len) {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| TivError::render(format!("Failed to read converted PDF: {e}")))?;
                if bytes.starts_with(b"%PDF") {
                    return Ok(bytes);
                }
            }
            last_len = Some(len);
        }

        if Instant::now() >= deadline {
            warn!("Converted PDF not ready after {:?}", policy.max_wait);
            return Err(TivError::render(format!(
                "converted PDF was not ready after {:?}",
                policy.max_wait
            )));
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}

/// Stack pages top to bottom on a white surface `width` pixels wide.
pub fn stack_pages(pages: &[DynamicImage], width: u32) -> Result<DynamicImage, TivError> {
    if pages.is_empty() {
        return Err(TivError::render("converted document has no pages"));
    }

    let scaled: Vec<RgbImage> = pages
        .iter()
        .map(|p| {
            let rgb = p.to_rgb8();
            if rgb.width() == width || rgb.width() == 0 {
                rgb
            } else {
                let height = (rgb.height() as u64 * width as u64 / rgb.width() as u64) as u32;
                image::imageops::resize(&rgb, width, height, image::imageops::FilterType::Lanczos3)
            }
        })
        .collect();

    let total: u32 = scaled.iter().map(RgbImage::height).sum();
    let mut surface = RgbImage::from_pixel(width, total, Rgb([255, 255, 255]));
    let mut y = 0i64;
    for page in &scaled {
        image::imageops::overlay(&mut surface, page, 0, y);
        y += page.height() as i64;
    }
    debug!("Stacked {} page(s) → {}x{} px", scaled.len(), width, total);
    Ok(DynamicImage::ImageRgb8(surface))
}

/// Locate the LibreOffice binary: explicit path, `SOFFICE_PATH`, then `PATH`.
pub fn find_soffice(explicit: Option<&Path>) -> Result<PathBuf, TivError> {
    const HINT: &str = "Install LibreOffice, or point SOFFICE_PATH / --soffice at the soffice binary.";

    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(TivError::MissingDependency {
                dependency: "soffice",
                detail: format!("'{}' does not exist", path.display()),
                hint: HINT,
            })
        };
    }

    if let Some(env_path) = std::env::var_os("SOFFICE_PATH") {
        let p = PathBuf::from(env_path);
        if p.is_file() {
            return Ok(p);
        }
        warn!("SOFFICE_PATH '{}' not found; searching PATH", p.display());
    }

    let names: &[&str] = if cfg!(windows) {
        &["soffice.exe"]
    } else {
        &["soffice", "libreoffice"]
    };
    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            for name in names {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
    }

    let mac = Path::new("/Applications/LibreOffice.app/Contents/MacOS/soffice");
    if cfg!(target_os = "macos") && mac.is_file() {
        return Ok(mac.to_path_buf());
    }

    Err(TivError::MissingDependency {
        dependency: "soffice",
        detail: "LibreOffice was not found on PATH".into(),
        hint: HINT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn policy(poll_ms: u64, max_ms: u64) -> ReadinessPolicy {
        ReadinessPolicy {
            poll_interval: Duration::from_millis(poll_ms),
            max_wait: Duration::from_millis(max_ms),
        }
    }

    #[tokio::test]
    async fn ready_pdf_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        std::fs::write(&path, b"%PDF-1.7 body").unwrap();
        let bytes = wait_for_pdf(&path, policy(10, 1000)).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.7 body");
    }

    #[tokio::test]
    async fn missing_pdf_times_out_as_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = wait_for_pdf(&dir.path().join("never.pdf"), policy(10, 50))
            .await
            .unwrap_err();
        assert!(matches!(err, TivError::RenderFailed { .. }));
    }

    #[tokio::test]
    async fn non_pdf_output_is_never_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        std::fs::write(&path, b"Error: source file could not be loaded").unwrap();
        let err = wait_for_pdf(&path, policy(10, 60)).await.unwrap_err();
        assert!(matches!(err, TivError::RenderFailed { .. }));
    }

    #[tokio::test]
    async fn late_pdf_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.pdf");
        let writer_path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            tokio::fs::write(&writer_path, b"%PDF-1.4 late").await.unwrap();
        });
        let bytes = wait_for_pdf(&path, policy(10, 2000)).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4 late");
    }

    #[test]
    fn stack_pages_concatenates_vertically() {
        let a = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(100, 30, Rgba([0, 0, 0, 255])));
        let b = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(100, 50, Rgba([255, 0, 0, 255])));
        let s = stack_pages(&[a, b], 100).unwrap().to_rgb8();
        assert_eq!((s.width(), s.height()), (100, 80));
        assert_eq!(s.get_pixel(5, 5).0, [0, 0, 0]);
        assert_eq!(s.get_pixel(5, 40).0, [255, 0, 0]);
    }

    #[test]
    fn stack_pages_rescales_odd_widths() {
        let a = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 20, Rgb([1, 2, 3])));
        let s = stack_pages(&[a], 100).unwrap();
        assert_eq!((s.width(), s.height()), (100, 40));
    }

    #[test]
    fn stack_without_pages_fails() {
        assert!(matches!(stack_pages(&[], 100), Err(TivError::RenderFailed { .. })));
    }

    #[test]
    fn explicit_missing_soffice_is_missing_dependency() {
        let err = find_soffice(Some(Path::new("/nope/soffice"))).unwrap_err();
        assert!(matches!(err, TivError::MissingDependency { dependency: "soffice", .. }));
    }
}
