//! Text extraction from scanned images and multi-page PDFs.

pub mod engine;
pub mod error;
pub mod extractor;
pub mod format;
pub mod preprocess;
pub mod rasterize;
pub mod source;
pub mod types;
pub mod upload;

pub use engine::{OcrEngine, Recognition, TesseractEngine};
pub use error::ExtractError;
pub use extractor::{ExtractorConfig, TextExtractor};
pub use format::DocumentFormat;
pub use rasterize::{PdfRasterizer, PdftoppmRasterizer};
pub use source::DocumentSource;
pub use types::{BoundingBox, ExtractedText, PageText, Token};
pub use upload::UploadResponse;

/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

#[cfg(any(test, feature = "mock"))]
pub mod testing;
