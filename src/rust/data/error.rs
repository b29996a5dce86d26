use std::io;
use std::path::PathBuf;

/// Errors raised while loading an embedding file.
///
/// Malformed nested entries are not errors: the loader skips them with a warning.
/// Only conditions that leave nothing usable to analyze end up here.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The requested path does not exist. Raised before any read is attempted.
    #[error("data file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The file exists but its contents could not be decoded.
    #[error("failed to deserialize {}: {message}", path.display())]
    Deserialize { path: PathBuf, message: String },
    /// The decoded object is not a mapping of syndromes.
    #[error("malformed data: {0}")]
    MalformedTopLevel(String),
    /// Traversal finished without a single valid embedding.
    #[error("no valid data found in file")]
    Empty,
    #[error(
        "inconsistent embedding dimension for image {image} (syndrome {syndrome}, subject {subject}): \
         expected {expected} values, found {found}"
    )]
    InconsistentDimension {
        syndrome: String,
        subject: String,
        image: String,
        expected: usize,
        found: usize,
    },
    #[error("failed to assemble feature matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
