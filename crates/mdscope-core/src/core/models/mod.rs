//! Data models for molecular structures and trajectory frames.

pub mod frame;
pub mod molecule;

pub use frame::{Frame, FrameHeader, FramePositions, TrajectoryBuffer, UnitCell};
pub use molecule::{AtomRange, Molecule, MoleculeDynamic, Residue};
