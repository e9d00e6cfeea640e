//! Deterministic OCR seams and document fixtures for tests, exported with the `mock` feature.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use lopdf::{Document, Object, dictionary};

use crate::BoxFuture;
use crate::engine::{OcrEngine, Recognition};
use crate::error::ExtractError;
use crate::rasterize::PdfRasterizer;
use crate::types::{BoundingBox, Token};

#[must_use]
pub fn pdf_with_pages(n: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..n)
        .map(|_| {
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()],
            }))
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => i64::try_from(n).unwrap_or(i64::MAX),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    match doc.save_to(&mut buf) {
        Ok(()) => buf,
        Err(_) => Vec::new(),
    }
}

/// White page with a dark block where the fake engine "reads" text.
#[must_use]
pub fn inked_image() -> DynamicImage {
    let mut img = GrayImage::from_pixel(100, 60, Luma([250]));
    for y in 20..40 {
        for x in 20..80 {
            img.put_pixel(x, y, Luma([10]));
        }
    }
    DynamicImage::ImageLuma8(img)
}

#[must_use]
pub fn blank_image() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 60, Luma([255])))
}

#[must_use]
pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    match image.write_to(&mut buf, ImageFormat::Png) {
        Ok(()) => buf.into_inner(),
        Err(_) => Vec::new(),
    }
}

/// Returns `text` for any image containing dark pixels and nothing for blank ones.
pub struct FakeEngine {
    pub text: String,
    pub confidence: f32,
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl FakeEngine {
    #[must_use]
    pub fn reading(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            confidence: 93.0,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl OcrEngine for FakeEngine {
    fn recognize(&self, png: Vec<u8>) -> BoxFuture<'_, Result<Recognition, ExtractError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let image = image::load_from_memory(&png)
                .map_err(|e| ExtractError::Engine(e.to_string()))?
                .to_luma8();
            if image.pixels().all(|p| p[0] > 128) {
                return Ok(Recognition::default());
            }
            let tokens = self
                .text
                .split_whitespace()
                .map(|w| Token {
                    text: w.to_owned(),
                    confidence: self.confidence,
                    bounding_box: BoundingBox {
                        left: 20,
                        top: 20,
                        width: 10,
                        height: 20,
                    },
                })
                .collect();
            Ok(Recognition {
                text: self.text.clone(),
                tokens,
            })
        })
    }
}

pub struct FakeRasterizer {
    pub pages: Vec<DynamicImage>,
    pub calls: Arc<AtomicUsize>,
}

impl FakeRasterizer {
    #[must_use]
    pub fn new(pages: Vec<DynamicImage>) -> Self {
        Self {
            pages,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl PdfRasterizer for FakeRasterizer {
    fn rasterize(
        &self,
        _pdf: Vec<u8>,
        _dpi: u32,
    ) -> BoxFuture<'_, Result<Vec<DynamicImage>, ExtractError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pages.clone())
        })
    }
}
