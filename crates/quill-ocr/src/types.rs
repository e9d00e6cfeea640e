use serde::{Deserialize, Serialize};

use crate::format::DocumentFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// A recognized word with its engine confidence (0-100) and position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub page: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedText {
    #[serde(skip)]
    pub format: Option<DocumentFormat>,
    pub text: String,
    /// Populated only by detailed extraction.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Token>,
    /// One entry per PDF page that produced text.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<PageText>,
}

impl ExtractedText {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
