use crate::core::models::{Frame, Molecule};
use std::io;
use thiserror::Error;

/// Errors produced by format decoders.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Malformed record at byte offset {offset}: {message}")]
    Binary { offset: u64, message: String },

    #[error("Frame index {index} out of range (trajectory has {count} frames)")]
    FrameOutOfRange { index: usize, count: usize },

    #[error("File contains no atoms")]
    Empty,

    #[error("Inconsistent data: {0}")]
    Inconsistency(String),
}

impl FormatError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Defines the interface for reading a molecular structure from a file.
///
/// Implementors handle format-specific parsing; the loader consumes them
/// through the extension table without knowing the format.
pub trait MoleculeReader {
    /// Parses the full molecular structure.
    fn read_molecule(&mut self) -> Result<Molecule, FormatError>;
}

/// Defines the interface for random-access reading of trajectory frames.
///
/// Implementors index their frames at open time so `read_frame` can seek to
/// any index. Readers are stateful (they own a file handle and scratch
/// buffers), so frame reads take `&mut self`; concurrent use is arbitrated
/// by the caller.
pub trait TrajectoryReader: Send {
    /// Number of atoms per frame.
    fn num_atoms(&self) -> usize;

    /// Number of frames in the trajectory.
    fn num_frames(&self) -> usize;

    /// Reads and decodes the frame at `index`.
    fn read_frame(&mut self, index: usize) -> Result<Frame, FormatError>;
}
