use std::path::{Path, PathBuf};
use crate::application::errors::AssemblyError;

/// Encodes an ordered list of images into a single PDF file
///
/// Called from a blocking thread; implementations may do synchronous I/O.
pub trait PdfEncoder: Send + Sync {
    /// Write one page per image, in order, to `output`
    fn encode(&self, images: &[PathBuf], output: &Path) -> Result<(), AssemblyError>;
}
