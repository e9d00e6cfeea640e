//! Response bodies for the document upload contract served by an HTTP layer.

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::extractor::TextExtractor;
use crate::source::DocumentSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadResponse {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Error {
        message: String,
    },
}

impl UploadResponse {
    #[must_use]
    pub fn pdf_success(content: String) -> Self {
        Self::Success {
            content: Some(content),
            text: None,
        }
    }

    #[must_use]
    pub fn image_success(text: String) -> Self {
        Self::Success {
            content: None,
            text: Some(text),
        }
    }

    #[must_use]
    pub fn pdf_error(err: &ExtractError) -> Self {
        let message = match err {
            ExtractError::CorruptFile(_) => "Invalid PDF file".to_owned(),
            ExtractError::FileTooLarge { .. } => "File too large".to_owned(),
            ExtractError::UnsupportedFormat(_) => "Unsupported file type".to_owned(),
            other => other.to_string(),
        };
        Self::Error { message }
    }

    #[must_use]
    pub fn image_error(err: &ExtractError) -> Self {
        let message = match err {
            ExtractError::CorruptFile(_) | ExtractError::UnsupportedFormat(_) => {
                "Invalid image file".to_owned()
            }
            ExtractError::FileTooLarge { .. } => "File too large".to_owned(),
            other => other.to_string(),
        };
        Self::Error { message }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Extract a submitted PDF and shape the result as an upload response.
pub async fn submit_pdf(extractor: &TextExtractor, source: &DocumentSource) -> UploadResponse {
    let config = extractor.config();
    match extractor
        .extract_from_pdf(source, config.save_page_images, &config.page_image_dir)
        .await
    {
        Ok(text) => UploadResponse::pdf_success(text),
        Err(e) => {
            tracing::warn!("PDF upload rejected: {e}");
            UploadResponse::pdf_error(&e)
        }
    }
}

/// Extract a submitted image and shape the result as an upload response.
pub async fn submit_image(extractor: &TextExtractor, source: &DocumentSource) -> UploadResponse {
    match extractor.extract_from_image(source, true).await {
        Ok(text) => UploadResponse::image_success(text),
        Err(e) => {
            tracing::warn!("image upload rejected: {e}");
            UploadResponse::image_error(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::extractor::ExtractorConfig;
    use crate::testing::{
        FakeEngine, FakeRasterizer, blank_image, inked_image, pdf_with_pages, png_bytes,
    };

    fn extractor() -> TextExtractor {
        let config = ExtractorConfig {
            save_page_images: false,
            ..ExtractorConfig::default()
        };
        TextExtractor::with_backends(
            config,
            Arc::new(FakeEngine::reading("Hello AI")),
            Arc::new(FakeRasterizer::new(vec![inked_image()])),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sample_pdf_success_body() {
        let source = DocumentSource::named("sample.pdf", pdf_with_pages(1));
        let body = serde_json::to_value(submit_pdf(&extractor(), &source).await).unwrap();
        assert_eq!(body, json!({"status": "success", "content": "Hello AI"}));
    }

    #[tokio::test]
    async fn corrupt_pdf_error_body() {
        let source = DocumentSource::named("corrupt.pdf", b"\x00\x01broken".to_vec());
        let body = serde_json::to_value(submit_pdf(&extractor(), &source).await).unwrap();
        assert_eq!(body, json!({"status": "error", "message": "Invalid PDF file"}));
    }

    #[tokio::test]
    async fn text_file_error_body() {
        let source = DocumentSource::named("sample.txt", b"hello".to_vec());
        let resp = submit_pdf(&extractor(), &source).await;
        assert_eq!(
            resp,
            UploadResponse::Error {
                message: "Unsupported file type".into()
            }
        );
    }

    #[tokio::test]
    async fn image_success_uses_text_field() {
        let source = DocumentSource::named("scan.png", png_bytes(&inked_image()));
        let body = serde_json::to_value(submit_image(&extractor(), &source).await).unwrap();
        assert_eq!(body, json!({"status": "success", "text": "Hello AI"}));
    }

    #[tokio::test]
    async fn blank_image_success_with_empty_text() {
        let source = DocumentSource::named("blank.png", png_bytes(&blank_image()));
        let body = serde_json::to_value(submit_image(&extractor(), &source).await).unwrap();
        assert_eq!(body, json!({"status": "success", "text": ""}));
    }

    #[test]
    fn too_large_messages() {
        let err = ExtractError::FileTooLarge {
            size: 11 * 1024 * 1024,
            limit: 10 * 1024 * 1024,
        };
        assert_eq!(
            UploadResponse::pdf_error(&err),
            UploadResponse::Error {
                message: "File too large".into()
            }
        );
        assert_eq!(
            UploadResponse::image_error(&err),
            UploadResponse::Error {
                message: "File too large".into()
            }
        );
    }

    #[test]
    fn invalid_image_message() {
        let err = ExtractError::CorruptFile("truncated".into());
        let body = serde_json::to_value(UploadResponse::image_error(&err)).unwrap();
        assert_eq!(body, json!({"status": "error", "message": "Invalid image file"}));
    }
}
