use std::path::Path;

use image::ImageFormat;

use crate::error::ExtractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Image(ImageFormat),
}

impl DocumentFormat {
    #[must_use]
    pub fn is_pdf(self) -> bool {
        matches!(self, Self::Pdf)
    }

    #[must_use]
    pub fn is_image(self) -> bool {
        matches!(self, Self::Image(_))
    }
}

const IMAGE_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Tiff,
    ImageFormat::Bmp,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// Detect the document format from leading bytes, falling back to the file extension.
///
/// Content wins over extension. A recognized extension with unrecognized content is still
/// reported as that format so the decode step can fail with `CorruptFile`.
///
/// # Errors
///
/// Returns `UnsupportedFormat` when neither content nor extension identify a PDF or a
/// supported raster image.
pub fn detect(bytes: &[u8], name: Option<&str>) -> Result<DocumentFormat, ExtractError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(DocumentFormat::Pdf);
    }
    if let Ok(format) = image::guess_format(bytes)
        && IMAGE_FORMATS.contains(&format)
    {
        return Ok(DocumentFormat::Image(format));
    }

    let ext = name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => Ok(DocumentFormat::Pdf),
        Some(ext) => ImageFormat::from_extension(ext)
            .filter(|f| IMAGE_FORMATS.contains(f))
            .map(DocumentFormat::Image)
            .ok_or_else(|| ExtractError::UnsupportedFormat(format!(".{ext}"))),
        None => Err(ExtractError::UnsupportedFormat(
            "unrecognized content".into(),
        )),
    }
}
