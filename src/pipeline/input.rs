//! Input validation for both stages.
//!
//! pdfium gives poor diagnostics for a missing or non-PDF file, so the PDF
//! path is checked up front: it must exist, be readable, and start with the
//! `%PDF` magic bytes. The Markdown input of stage 2 is simply read, with
//! the same not-found / permission split.

use crate::error::Pdf2RulesError;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` names a readable PDF and return it.
pub fn resolve_pdf(path: impl AsRef<Path>) -> Result<PathBuf, Pdf2RulesError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(Pdf2RulesError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == b"%PDF" => {}
                // Shorter than four bytes counts as "not a PDF" too.
                _ => return Err(Pdf2RulesError::NotAPdf { path, magic }),
            }
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(Pdf2RulesError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Pdf2RulesError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// Read a Markdown document produced by stage 1.
pub async fn read_markdown(path: impl AsRef<Path>) -> Result<String, Pdf2RulesError> {
    let path = path.as_ref();
    tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => Pdf2RulesError::FileNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => Pdf2RulesError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Pdf2RulesError::InputReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

/// File name component used as the document title.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
