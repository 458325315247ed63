//! Page Renderer: every PDF page becomes one `DynamicImage`.
//!
//! ## Threading
//!
//! pdfium is a C++ library with thread-local state, so all pdfium calls
//! happen inside one `tokio::task::spawn_blocking` closure and the async
//! workers never block on rasterisation.
//!
//! ## Size cap
//!
//! The DPI scale alone is not enough: a poster-sized page at 150 DPI is
//! tens of thousands of pixels wide. `max_rendered_pixels` bounds both
//! edges after scaling.
//!
//! Opening the document is all-or-nothing (a corrupt or locked PDF is
//! fatal). After that each page renders on its own, and a page that fails
//! is reported as a [`PageError`] in its slot.

use crate::config::ConversionConfig;
use crate::error::{PageError, Pdf2RulesError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// One rendered page, consumed once by the transcriber.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub dpi: u32,
    pub image: DynamicImage,
}

/// All pages of a document in physical order.
#[derive(Debug)]
pub struct RenderedDocument {
    /// Page count reported by pdfium.
    pub page_count: usize,
    /// One slot per page, index `i` holding page `i + 1`.
    pub pages: Vec<Result<PageImage, PageError>>,
}

/// Rasterise every page of the PDF at `pdf_path`.
///
/// # Errors
/// Fatal errors only: invalid resolution, missing pdfium library, corrupt or
/// password-protected PDF. Per-page failures are returned in
/// [`RenderedDocument::pages`].
pub async fn render_pages(
    pdf_path: &Path,
    config: &ConversionConfig,
) -> Result<RenderedDocument, Pdf2RulesError> {
    if config.dpi == 0 {
        return Err(Pdf2RulesError::InvalidResolution { dpi: config.dpi });
    }

    let path = pdf_path.to_path_buf();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, dpi, max_pixels, password.as_deref())
    })
    .await
    .map_err(|e| Pdf2RulesError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind to a pdfium shared library.
///
/// Looks at `PDFIUM_LIB_PATH` first, then the working directory, then the
/// system library path.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2RulesError> {
    let from_env = std::env::var("PDFIUM_LIB_PATH")
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);

    let bindings = match from_env {
        Some(path) => Pdfium::bind_to_library(&path).map_err(|e| {
            Pdf2RulesError::PdfiumBindingFailed(format!("{}: {:?}", path.display(), e))
        })?,
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| Pdf2RulesError::PdfiumBindingFailed(format!("{:?}", e)))?,
    };

    Ok(Pdfium::new(bindings))
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<RenderedDocument, Pdf2RulesError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                Pdf2RulesError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Pdf2RulesError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Pdf2RulesError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    info!("PDF loaded: {} pages", page_count);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / POINTS_PER_INCH)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut rendered = Vec::with_capacity(page_count);
    for idx in 0..page_count {
        let page_num = idx + 1;
        let result = render_one(&pages, idx, &render_config)
            .map(|image| PageImage {
                page_num,
                dpi,
                image,
            })
            .map_err(|e| PageError::RenderFailed {
                page: page_num,
                detail: format!("{:?}", e),
            });

        match &result {
            Ok(p) => debug!(
                "Rendered page {} → {}x{} px",
                page_num,
                p.image.width(),
                p.image.height()
            ),
            Err(e) => warn!("{}", e),
        }
        rendered.push(result);
    }

    Ok(RenderedDocument {
        page_count,
        pages: rendered,
    })
}

fn render_one(
    pages: &PdfPages,
    idx: usize,
    render_config: &PdfRenderConfig,
) -> Result<DynamicImage, PdfiumError> {
    let page = pages.get(idx as u16)?;
    let bitmap = page.render_with_config(render_config)?;
    Ok(bitmap.as_image())
}
