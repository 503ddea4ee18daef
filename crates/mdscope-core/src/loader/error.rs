use super::cache::CacheError;
use crate::io::FormatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Unsupported file extension: '{extension}'")]
    UnsupportedExtension { extension: String },

    #[error(
        "Trajectory is not compatible with the molecule: \
         {trajectory_atoms} trajectory atoms vs {molecule_atoms} molecule atoms"
    )]
    AtomCountMismatch {
        trajectory_atoms: usize,
        molecule_atoms: usize,
    },

    #[error("Handle does not refer to a loaded object")]
    NotLoaded,

    #[error("Too many objects open (limit is {limit})")]
    TooManyOpen { limit: usize },

    #[error("Frame index {index} out of range (trajectory has {count} frames)")]
    FrameOutOfRange { index: usize, count: usize },

    #[error("Output buffer holds {provided} atoms, frame has {expected}")]
    BufferSizeMismatch { provided: usize, expected: usize },

    #[error("Frame cache error: {source}")]
    Cache {
        #[from]
        source: CacheError,
    },

    #[error("Format decoder error: {source}")]
    Format {
        #[from]
        source: FormatError,
    },
}
