use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::BoxFuture;
use crate::error::ExtractError;
use crate::types::{BoundingBox, Token};

/// Output of one recognition pass over a single image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub tokens: Vec<Token>,
}

/// Recognizes text in a PNG-encoded image.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, png: Vec<u8>) -> BoxFuture<'_, Result<Recognition, ExtractError>>;
}

/// Runs the `tesseract` executable with TSV output, feeding the image on stdin.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    languages: String,
    page_segmentation_mode: u8,
}

impl TesseractEngine {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, languages: &[String], page_segmentation_mode: u8) -> Self {
        Self {
            binary: binary.into(),
            languages: languages.join("+"),
            page_segmentation_mode,
        }
    }

    #[must_use]
    pub fn languages(&self) -> &str {
        &self.languages
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, png: Vec<u8>) -> BoxFuture<'_, Result<Recognition, ExtractError>> {
        Box::pin(async move {
            let mut child = Command::new(&self.binary)
                .args(["stdin", "stdout", "-l", &self.languages, "--psm"])
                .arg(self.page_segmentation_mode.to_string())
                .arg("tsv")
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    ExtractError::Engine(format!(
                        "failed to start {}: {e}",
                        self.binary.display()
                    ))
                })?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&png).await?;
                stdin.shutdown().await?;
            }

            let output = child.wait_with_output().await?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(ExtractError::Engine(format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    stderr.trim()
                )));
            }

            Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
        })
    }
}

struct Word<'a> {
    block: (u32, u32, u32),
    text: &'a str,
    confidence: f32,
    bounding_box: BoundingBox,
}

fn parse_row(line: &str) -> Option<Word<'_>> {
    let cols: Vec<&str> = line.splitn(12, '\t').collect();
    if cols.len() < 12 || cols[0] != "5" {
        return None;
    }
    let num = |i: usize| cols[i].trim().parse::<u32>().ok();
    Some(Word {
        block: (num(2)?, num(3)?, num(4)?),
        text: cols[11].trim(),
        confidence: cols[10].trim().parse().ok()?,
        bounding_box: BoundingBox {
            left: num(6)?,
            top: num(7)?,
            width: num(8)?,
            height: num(9)?,
        },
    })
}

/// Rebuild plain text and token list from tesseract TSV.
///
/// Words on one line are space-joined, lines are newline-joined and a new paragraph
/// starts after a blank line. Tokens keep only words with positive confidence.
#[must_use]
pub fn parse_tsv(tsv: &str) -> Recognition {
    let mut text = String::new();
    let mut tokens = Vec::new();
    let mut current: Option<(u32, u32, u32)> = None;

    for word in tsv.lines().skip(1).filter_map(parse_row) {
        if word.text.is_empty() {
            continue;
        }
        match current {
            Some(prev) if prev == word.block => text.push(' '),
            Some(prev) if (prev.0, prev.1) == (word.block.0, word.block.1) => text.push('\n'),
            Some(_) => text.push_str("\n\n"),
            None => {}
        }
        current = Some(word.block);
        text.push_str(word.text);

        if word.confidence > 0.0 {
            tokens.push(Token {
                text: word.text.to_owned(),
                confidence: word.confidence,
                bounding_box: word.bounding_box,
            });
        }
    }

    Recognition { text, tokens }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn words_on_one_line_join_with_space() {
        let input = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t",
            "5\t1\t1\t1\t1\t1\t10\t20\t50\t12\t96.5\tHello",
            "5\t1\t1\t1\t1\t2\t70\t20\t30\t12\t91\tAI",
        ]);
        let rec = parse_tsv(&input);
        assert_eq!(rec.text, "Hello AI");
        assert_eq!(rec.tokens.len(), 2);
        assert_eq!(
            rec.tokens[0].bounding_box,
            BoundingBox {
                left: 10,
                top: 20,
                width: 50,
                height: 12
            }
        );
        assert!((rec.tokens[0].confidence - 96.5).abs() < f32::EPSILON);
    }

    #[test]
    fn lines_and_paragraphs_are_separated() {
        let input = tsv(&[
            "5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t90\tXin",
            "5\t1\t1\t1\t2\t1\t0\t0\t1\t1\t90\tchào",
            "5\t1\t2\t1\t1\t1\t0\t0\t1\t1\t90\tEnd",
        ]);
        assert_eq!(parse_tsv(&input).text, "Xin\nchào\n\nEnd");
    }

    #[test]
    fn zero_confidence_words_excluded_from_tokens() {
        let input = tsv(&[
            "5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t0\tnoise",
            "5\t1\t1\t1\t1\t2\t0\t0\t1\t1\t88\tword",
        ]);
        let rec = parse_tsv(&input);
        assert_eq!(rec.tokens.len(), 1);
        assert_eq!(rec.tokens[0].text, "word");
    }

    #[test]
    fn empty_output_is_empty_recognition() {
        assert_eq!(parse_tsv(HEADER), Recognition::default());
        assert_eq!(parse_tsv(""), Recognition::default());
    }

    #[test]
    fn languages_are_plus_joined() {
        let engine = TesseractEngine::new("tesseract", &["vie".into(), "eng".into()], 6);
        assert_eq!(engine.languages(), "vie+eng");
    }

    #[tokio::test]
    async fn missing_binary_is_engine_error() {
        let engine = TesseractEngine::new("/nonexistent/tesseract", &["eng".into()], 6);
        let err = engine.recognize(vec![]).await.unwrap_err();
        assert!(matches!(err, ExtractError::Engine(_)));
    }
}
