//! PDF assembly
//!
//! Collects downloaded images, orders them the way a reader expects pages to
//! be ordered, and hands them to a [`PdfEncoder`].

mod writer;

pub use writer::ImagePdfEncoder;

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::application::errors::AssemblyError;
use crate::domain::traits::PdfEncoder;

/// Extensions picked up as pages, compared case-insensitively
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];

/// Builds PDFs from directories of images
#[derive(Clone)]
pub struct PdfAssembler {
    encoder: Arc<dyn PdfEncoder>,
}

impl PdfAssembler {
    pub fn new(encoder: Arc<dyn PdfEncoder>) -> Self {
        Self { encoder }
    }

    /// Encode every image under `source` into `output`, returning the page count
    ///
    /// Runs on the blocking pool. An empty directory yields
    /// [`AssemblyError::NoImages`] and no file is written.
    pub async fn assemble(&self, source: &Path, output: &Path) -> Result<usize, AssemblyError> {
        let encoder = self.encoder.clone();
        let source = source.to_path_buf();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let images = collect_images(&source);
            if images.is_empty() {
                tracing::error!(dir = %source.display(), "no image files found");
                return Err(AssemblyError::NoImages(source));
            }
            tracing::debug!(count = images.len(), output = %output.display(), "encoding pdf");
            encoder.encode(&images, &output)?;
            Ok(images.len())
        })
        .await
        .map_err(|e| AssemblyError::Encode(format!("encoder task failed: {}", e)))?
    }
}

/// Every image file under `dir`, recursively, in natural order
pub fn collect_images(dir: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_image(path))
        .collect();

    images.sort_by(|a, b| {
        let a_rel = a.strip_prefix(dir).unwrap_or(a).to_string_lossy();
        let b_rel = b.strip_prefix(dir).unwrap_or(b).to_string_lossy();
        natural_cmp(&a_rel, &b_rel)
    });
    images
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// A run of a natural sort key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk {
    Text(String),
    /// Digits with leading zeros removed, compared by length then value
    Number(Digits),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Digits(String);

impl Ord for Digits {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Digits {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Split into alternating text and digit runs, always starting with text
fn natural_key(s: &str) -> Vec<Chunk> {
    let mut key = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;

    for c in s.chars() {
        let is_digit = c.is_ascii_digit();
        if is_digit != in_digits {
            key.push(finish_run(&mut current, in_digits));
            in_digits = is_digit;
        }
        current.push(c);
    }
    key.push(finish_run(&mut current, in_digits));
    key
}

fn finish_run(run: &mut String, digits: bool) -> Chunk {
    let text = std::mem::take(run);
    if digits {
        let trimmed = text.trim_start_matches('0');
        Chunk::Number(Digits(trimmed.to_string()))
    } else {
        Chunk::Text(text.to_lowercase())
    }
}

/// Compare two names so that `img2` sorts before `img10`
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a)
        .cmp(&natural_key(b))
        .then_with(|| a.cmp(b))
}

/// Sort names in place in natural order
pub fn natural_sort<S: AsRef<str>>(names: &mut [S]) {
    names.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}
