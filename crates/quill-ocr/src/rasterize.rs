use std::path::{Path, PathBuf};

use image::DynamicImage;
use tokio::process::Command;

use crate::BoxFuture;
use crate::error::ExtractError;

/// Renders every page of a PDF to a raster image, in page order.
pub trait PdfRasterizer: Send + Sync {
    fn rasterize(&self, pdf: Vec<u8>, dpi: u32)
    -> BoxFuture<'_, Result<Vec<DynamicImage>, ExtractError>>;
}

/// Parse the document structure and return its page count.
///
/// # Errors
///
/// Returns `CorruptFile` if the bytes are not a readable PDF.
pub fn page_count(pdf: &[u8]) -> Result<usize, ExtractError> {
    let document = lopdf::Document::load_mem(pdf)
        .map_err(|e| ExtractError::CorruptFile(format!("unreadable PDF: {e}")))?;
    Ok(document.get_pages().len())
}

/// Shells out to poppler's `pdftoppm`, one PNG per page in a scratch directory.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    binary: PathBuf,
}

impl PdftoppmRasterizer {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PdfRasterizer for PdftoppmRasterizer {
    fn rasterize(
        &self,
        pdf: Vec<u8>,
        dpi: u32,
    ) -> BoxFuture<'_, Result<Vec<DynamicImage>, ExtractError>> {
        Box::pin(async move {
            let scratch = tempfile::tempdir()?;
            let input = scratch.path().join("input.pdf");
            tokio::fs::write(&input, &pdf).await?;
            let prefix = scratch.path().join("page");

            let output = Command::new(&self.binary)
                .arg("-r")
                .arg(dpi.to_string())
                .arg("-png")
                .arg(&input)
                .arg(&prefix)
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| {
                    ExtractError::Engine(format!("failed to start {}: {e}", self.binary.display()))
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(ExtractError::CorruptFile(format!(
                    "pdftoppm could not render document: {}",
                    stderr.trim()
                )));
            }

            let pages = collect_pages(scratch.path()).await?;
            let mut images = Vec::with_capacity(pages.len());
            for (_, path) in pages {
                let bytes = tokio::fs::read(&path).await?;
                let image = image::load_from_memory(&bytes).map_err(|e| {
                    ExtractError::Engine(format!("rendered page is not a valid PNG: {e}"))
                })?;
                images.push(image);
            }
            Ok(images)
        })
    }
}

/// `pdftoppm` zero-pads page numbers to the width of the page count, so order by the
/// parsed number rather than the file name.
async fn collect_pages(dir: &Path) -> Result<Vec<(u32, PathBuf)>, ExtractError> {
    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if let Some(number) = page_number(&path) {
            pages.push((number, path));
        }
    }
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages)
}

fn page_number(path: &Path) -> Option<u32> {
    if path.extension()? != "png" {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix("page-")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pdf_with_pages;

    #[test]
    fn counts_pages_of_valid_pdf() {
        assert_eq!(page_count(&pdf_with_pages(3)).unwrap(), 3);
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = page_count(b"%PDF-1.4\nthis is not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::CorruptFile(_)));
    }

    #[test]
    fn page_numbers_parse_padded_names() {
        assert_eq!(page_number(Path::new("/tmp/x/page-01.png")), Some(1));
        assert_eq!(page_number(Path::new("/tmp/x/page-12.png")), Some(12));
        assert_eq!(page_number(Path::new("/tmp/x/input.pdf")), None);
    }

    #[tokio::test]
    async fn collect_pages_orders_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-9.png", "page-1.png", "input.pdf"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let pages = collect_pages(dir.path()).await.unwrap();
        let numbers: Vec<u32> = pages.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 9, 10]);
    }
}
