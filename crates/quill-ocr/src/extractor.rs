use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, ImageFormat};

use crate::DEFAULT_MAX_FILE_SIZE;
use crate::engine::{OcrEngine, Recognition, TesseractEngine};
use crate::error::ExtractError;
use crate::format::DocumentFormat;
use crate::preprocess;
use crate::rasterize::{self, PdfRasterizer, PdftoppmRasterizer};
use crate::source::{DocumentSource, LoadedDocument};
use crate::types::{ExtractedText, PageText};

/// Default minimum token confidence for [`TextExtractor::is_text_present`].
pub const DEFAULT_MIN_CONFIDENCE: f32 = 60.0;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Recognition models run simultaneously, e.g. `["vie", "eng"]`.
    pub languages: Vec<String>,
    pub page_segmentation_mode: u8,
    /// Resolution PDF pages are rendered at.
    pub dpi: u32,
    pub max_file_size: u64,
    pub timeout: Duration,
    pub save_page_images: bool,
    pub page_image_dir: PathBuf,
    pub tesseract_path: PathBuf,
    pub pdftoppm_path: PathBuf,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            languages: vec!["vie".into(), "eng".into()],
            page_segmentation_mode: 6,
            dpi: 300,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            timeout: Duration::from_secs(120),
            save_page_images: true,
            page_image_dir: PathBuf::from("temp"),
            tesseract_path: PathBuf::from("tesseract"),
            pdftoppm_path: PathBuf::from("pdftoppm"),
        }
    }
}

impl ExtractorConfig {
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for an empty language set, zero DPI, a zero size
    /// ceiling or a zero timeout.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.languages.iter().all(|l| l.trim().is_empty()) {
            return Err(ExtractError::InvalidConfiguration(
                "at least one OCR language is required".into(),
            ));
        }
        if self.dpi == 0 {
            return Err(ExtractError::InvalidConfiguration(
                "render DPI must be positive".into(),
            ));
        }
        if self.max_file_size == 0 {
            return Err(ExtractError::InvalidConfiguration(
                "max file size must be positive".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ExtractError::InvalidConfiguration(
                "extraction timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Converts images and PDFs to text through an [`OcrEngine`].
pub struct TextExtractor {
    config: ExtractorConfig,
    engine: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PdfRasterizer>,
}

struct PdfPages {
    pages: Vec<PageText>,
    rendered: usize,
}

impl PdfPages {
    fn text(&self) -> String {
        let marked = self.rendered > 1;
        self.pages
            .iter()
            .map(|p| {
                if marked {
                    format!("--- Page {} ---\n{}", p.page, p.text)
                } else {
                    p.text.clone()
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl TextExtractor {
    /// Build an extractor backed by the `tesseract` and `pdftoppm` executables.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `config` fails validation.
    pub fn new(config: ExtractorConfig) -> Result<Self, ExtractError> {
        let engine = TesseractEngine::new(
            config.tesseract_path.clone(),
            &config.languages,
            config.page_segmentation_mode,
        );
        let rasterizer = PdftoppmRasterizer::new(config.pdftoppm_path.clone());
        Self::with_backends(config, Arc::new(engine), Arc::new(rasterizer))
    }

    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `config` fails validation.
    pub fn with_backends(
        config: ExtractorConfig,
        engine: Arc<dyn OcrEngine>,
        rasterizer: Arc<dyn PdfRasterizer>,
    ) -> Result<Self, ExtractError> {
        config.validate()?;
        Ok(Self {
            config,
            engine,
            rasterizer,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Detect the format of `source` and extract its text through the matching path.
    ///
    /// PDF pages are persisted according to the configured `save_page_images`.
    ///
    /// # Errors
    ///
    /// See the failure table of [`ExtractError`]; blank documents succeed with empty text.
    pub async fn extract(&self, source: &DocumentSource) -> Result<ExtractedText, ExtractError> {
        self.timed(async {
            let doc = source.load(self.config.max_file_size).await?;
            match doc.format {
                DocumentFormat::Pdf => {
                    let save_dir = self
                        .config
                        .save_page_images
                        .then_some(self.config.page_image_dir.as_path());
                    let pdf = self.recognize_pdf(&doc, save_dir).await?;
                    Ok(ExtractedText {
                        format: Some(doc.format),
                        text: pdf.text(),
                        tokens: Vec::new(),
                        pages: strip_tokens(pdf.pages),
                    })
                }
                DocumentFormat::Image(_) => {
                    let rec = self.recognize_bytes(doc.data, true).await?;
                    Ok(ExtractedText {
                        format: Some(doc.format),
                        text: rec.text.trim().to_owned(),
                        tokens: Vec::new(),
                        pages: Vec::new(),
                    })
                }
            }
        })
        .await
    }

    /// # Errors
    ///
    /// Fails with `UnsupportedFormat` for anything other than a raster image and
    /// `CorruptFile` when the image cannot be decoded.
    pub async fn extract_from_image(
        &self,
        source: &DocumentSource,
        preprocess: bool,
    ) -> Result<String, ExtractError> {
        self.timed(async {
            let doc = source.load(self.config.max_file_size).await?;
            if !doc.format.is_image() {
                return Err(ExtractError::UnsupportedFormat(
                    "expected an image, got a PDF".into(),
                ));
            }
            let rec = self.recognize_bytes(doc.data, preprocess).await?;
            Ok(rec.text.trim().to_owned())
        })
        .await
    }

    /// Render every page, recognize it and join page texts in page order.
    ///
    /// When the document has more than one page each page text is prefixed with
    /// `--- Page N ---`. Pages without text are skipped. With `save_images` set, rendered
    /// pages are written to `<output_dir>/<stem>/<stem>_page_<n>.png`; failing to write
    /// them is logged and does not fail extraction.
    ///
    /// # Errors
    ///
    /// Fails with `UnsupportedFormat` for non-PDF input and `CorruptFile` for unreadable PDFs.
    pub async fn extract_from_pdf(
        &self,
        source: &DocumentSource,
        save_images: bool,
        output_dir: &Path,
    ) -> Result<String, ExtractError> {
        self.timed(async {
            let doc = source.load(self.config.max_file_size).await?;
            if !doc.format.is_pdf() {
                return Err(ExtractError::UnsupportedFormat(format!(
                    "expected a PDF, got {}",
                    source.file_name().unwrap_or("unnamed input")
                )));
            }
            let pdf = self
                .recognize_pdf(&doc, save_images.then_some(output_dir))
                .await?;
            Ok(pdf.text())
        })
        .await
    }

    /// Text plus per-token confidence and bounding boxes. PDFs also report per-page results.
    ///
    /// # Errors
    ///
    /// Same conditions as [`TextExtractor::extract`].
    pub async fn extract_detailed(
        &self,
        source: &DocumentSource,
    ) -> Result<ExtractedText, ExtractError> {
        self.timed(async {
            let doc = source.load(self.config.max_file_size).await?;
            match doc.format {
                DocumentFormat::Pdf => {
                    let pdf = self.recognize_pdf(&doc, None).await?;
                    let text = pdf.text();
                    let tokens = pdf.pages.iter().flat_map(|p| p.tokens.clone()).collect();
                    Ok(ExtractedText {
                        format: Some(doc.format),
                        text,
                        tokens,
                        pages: pdf.pages,
                    })
                }
                DocumentFormat::Image(_) => {
                    let rec = self.recognize_bytes(doc.data, true).await?;
                    Ok(ExtractedText {
                        format: Some(doc.format),
                        text: rec.text.trim().to_owned(),
                        tokens: rec.tokens,
                        pages: Vec::new(),
                    })
                }
            }
        })
        .await
    }

    /// Whether any recognized token reaches `min_confidence`. Extraction failures count as
    /// no text.
    pub async fn is_text_present(&self, source: &DocumentSource, min_confidence: f32) -> bool {
        match self.extract_detailed(source).await {
            Ok(detailed) => detailed
                .tokens
                .iter()
                .any(|t| t.confidence >= min_confidence && !t.text.trim().is_empty()),
            Err(e) => {
                tracing::debug!("text presence check failed: {e}");
                false
            }
        }
    }

    async fn timed<T>(
        &self,
        fut: impl Future<Output = Result<T, ExtractError>>,
    ) -> Result<T, ExtractError> {
        tokio::time::timeout(self.config.timeout, fut)
            .await
            .map_err(|_| ExtractError::Timeout(self.config.timeout))?
    }

    async fn recognize_bytes(
        &self,
        data: Vec<u8>,
        preprocess: bool,
    ) -> Result<Recognition, ExtractError> {
        let png = blocking(move || {
            let image = image::load_from_memory(&data)
                .map_err(|e| ExtractError::CorruptFile(format!("undecodable image: {e}")))?;
            prepare(&image, preprocess)
        })
        .await?;
        self.engine.recognize(png).await
    }

    async fn recognize_pdf(
        &self,
        doc: &LoadedDocument,
        save_dir: Option<&Path>,
    ) -> Result<PdfPages, ExtractError> {
        let page_count = rasterize::page_count(&doc.data)?;
        if page_count == 0 {
            return Ok(PdfPages {
                pages: Vec::new(),
                rendered: 0,
            });
        }

        let images = self
            .rasterizer
            .rasterize(doc.data.clone(), self.config.dpi)
            .await?;
        let rendered = images.len();
        tracing::debug!(pages = rendered, stem = %doc.stem, "rendered PDF");

        let mut pages = Vec::with_capacity(rendered);
        for (idx, image) in images.into_iter().enumerate() {
            let number = idx + 1;
            let image = Arc::new(image);
            if let Some(dir) = save_dir {
                save_page_image(Arc::clone(&image), dir, &doc.stem, number).await;
            }
            let png = blocking(move || prepare(&image, true)).await?;
            let rec = self.engine.recognize(png).await?;
            let text = rec.text.trim();
            if text.is_empty() {
                tracing::debug!(page = number, "no text recognized on page");
                continue;
            }
            pages.push(PageText {
                page: number,
                text: text.to_owned(),
                tokens: rec.tokens,
            });
        }
        Ok(PdfPages { pages, rendered })
    }
}

fn strip_tokens(pages: Vec<PageText>) -> Vec<PageText> {
    pages
        .into_iter()
        .map(|p| PageText {
            tokens: Vec::new(),
            ..p
        })
        .collect()
}

fn prepare(image: &DynamicImage, preprocess: bool) -> Result<Vec<u8>, ExtractError> {
    if preprocess {
        encode_png(&DynamicImage::ImageLuma8(preprocess::normalize(image)))
    } else {
        encode_png(image)
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ExtractError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| ExtractError::Engine(format!("PNG encoding failed: {e}")))?;
    Ok(buf.into_inner())
}

async fn blocking<T, F>(f: F) -> Result<T, ExtractError>
where
    F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExtractError::Engine(format!("image worker failed: {e}")))?
}

async fn save_page_image(image: Arc<DynamicImage>, output_dir: &Path, stem: &str, number: usize) {
    let dir = output_dir.join(stem);
    let path = dir.join(format!("{stem}_page_{number}.png"));
    let result = async {
        tokio::fs::create_dir_all(&dir).await?;
        let png = blocking(move || encode_png(&image)).await?;
        tokio::fs::write(&path, png).await?;
        Ok::<_, ExtractError>(())
    }
    .await;
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "saved page image"),
        Err(e) => tracing::warn!(path = %path.display(), "failed to save page image: {e}"),
    }
}
