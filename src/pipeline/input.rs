//! Input loading: the source scan (PDF) and the DOCX template.
//!
//! Both documents are held in memory for the whole session. pdfium opens
//! PDFs straight from a byte slice and the template is unzipped in memory,
//! so nothing here needs a file-system path after loading.
//!
//! ## Type checks
//!
//! A source is accepted when its declared media type is `application/pdf`
//! or, when no media type is known (local paths, URL downloads served as
//! `application/octet-stream`), when it starts with the `%PDF` magic. A
//! template must carry a `.docx` name and a ZIP local-file signature.
//! Loading never touches the rest of the workflow state.

use crate::error::TivError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// The uploaded TIV scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    name: String,
    bytes: Arc<[u8]>,
}

impl SourceDocument {
    /// Validate and wrap a candidate source file.
    ///
    /// `media_type` is the type declared by whoever supplied the file; pass
    /// `None` to fall back to sniffing the PDF magic bytes.
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<Self, TivError> {
        let name = name.into();
        match media_type {
            Some(mt) => {
                let essence = mt.split(';').next().unwrap_or_default().trim();
                if !essence.eq_ignore_ascii_case(PDF_MEDIA_TYPE) {
                    return Err(TivError::InvalidFileType {
                        name,
                        expected: "PDF",
                        detail: format!("media type is {essence}"),
                    });
                }
            }
            None => {
                if !bytes.starts_with(PDF_MAGIC) {
                    return Err(TivError::InvalidFileType {
                        name,
                        expected: "PDF",
                        detail: format!("starts with {:?}", magic_preview(&bytes)),
                    });
                }
            }
        }
        debug!("Accepted source '{}' ({} bytes)", name, bytes.len());
        Ok(Self {
            name,
            bytes: bytes.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap handle on the bytes for a background job.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

/// The user-supplied Word template with `«Name»` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDocument {
    name: String,
    bytes: Arc<[u8]>,
}

impl TemplateDocument {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, TivError> {
        let name = name.into();
        if !name.to_ascii_lowercase().ends_with(".docx") {
            return Err(TivError::InvalidFileType {
                name,
                expected: "Word (.docx)",
                detail: "file name does not end in .docx".into(),
            });
        }
        if !bytes.starts_with(ZIP_MAGIC) {
            return Err(TivError::InvalidFileType {
                name,
                expected: "Word (.docx)",
                detail: format!("starts with {:?}", magic_preview(&bytes)),
            });
        }
        debug!("Accepted template '{}' ({} bytes)", name, bytes.len());
        Ok(Self {
            name,
            bytes: bytes.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

fn magic_preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(4)]).into_owned()
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a source scan from a local path or an HTTP(S) URL.
pub async fn load_source(input: &str, timeout_secs: u64) -> Result<SourceDocument, TivError> {
    if is_url(input) {
        let (name, bytes) = download_url(input, timeout_secs).await?;
        SourceDocument::from_bytes(name, None, bytes)
    } else {
        let path = PathBuf::from(input);
        let bytes = read_local(&path).await?;
        SourceDocument::from_bytes(display_name(&path), None, bytes)
    }
}

/// Load a template from a local path.
pub async fn load_template(path: &Path) -> Result<TemplateDocument, TivError> {
    let bytes = read_local(path).await?;
    TemplateDocument::from_bytes(display_name(path), bytes)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn read_local(path: &Path) -> Result<Vec<u8>, TivError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            debug!("Read {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(TivError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(TivError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

/// Download a URL into memory, returning a display name and the body.
async fn download_url(url: &str, timeout_secs: u64) -> Result<(String, Vec<u8>), TivError> {
    info!("Downloading source from: {}", url);

    let failed = |reason: String| TivError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TivError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("Downloaded {} bytes", bytes.len());
    Ok((filename_from_url(url), bytes.to_vec()))
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/tiv.pdf"));
        assert!(is_url("http://example.com/tiv.pdf"));
        assert!(!is_url("/tmp/tiv.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn source_accepts_declared_pdf() {
        let doc = SourceDocument::from_bytes("tiv.pdf", Some("application/pdf"), b"%PDF-1.4".to_vec())
            .unwrap();
        assert_eq!(doc.name(), "tiv.pdf");
        assert_eq!(doc.bytes(), b"%PDF-1.4");
    }

    #[test]
    fn source_media_type_ignores_parameters_and_case() {
        assert!(SourceDocument::from_bytes("a", Some("Application/PDF; q=1"), vec![]).is_ok());
    }

    #[test]
    fn source_rejects_other_media_types() {
        let err = SourceDocument::from_bytes("scan.png", Some("image/png"), vec![0x89, b'P'])
            .unwrap_err();
        assert!(matches!(err, TivError::InvalidFileType { ref name, .. } if name == "scan.png"));
    }

    #[test]
    fn source_sniffs_magic_without_media_type() {
        assert!(SourceDocument::from_bytes("x", None, b"%PDF-1.7\n".to_vec()).is_ok());
        let err = SourceDocument::from_bytes("x", None, b"GIF89a".to_vec()).unwrap_err();
        assert!(matches!(err, TivError::InvalidFileType { .. }));
    }

    #[test]
    fn template_requires_docx_name_and_zip() {
        assert!(TemplateDocument::from_bytes("plantilla.DOCX", b"PK\x03\x04rest".to_vec()).is_ok());

        let err = TemplateDocument::from_bytes("plantilla.doc", b"PK\x03\x04".to_vec()).unwrap_err();
        assert!(matches!(err, TivError::InvalidFileType { .. }));

        let err = TemplateDocument::from_bytes("plantilla.docx", b"{\\rtf1".to_vec()).unwrap_err();
        assert!(matches!(err, TivError::InvalidFileType { .. }));
    }

    #[test]
    fn filename_from_url_uses_last_segment() {
        assert_eq!(filename_from_url("https://x.pe/files/tiv.pdf?dl=1"), "tiv.pdf");
        assert_eq!(filename_from_url("https://x.pe/files/"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn load_source_reports_missing_file() {
        let err = load_source("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, TivError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn load_template_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plantilla.docx");
        std::fs::write(&path, b"PK\x03\x04payload").unwrap();
        let t = load_template(&path).await.unwrap();
        assert_eq!(t.name(), "plantilla.docx");
    }
}
