use nalgebra::{Matrix3, Point3, Vector3};

/// The periodic simulation box, expressed as its basis vectors.
///
/// Only present for periodic trajectories. The basis columns are the box
/// vectors; for orthorhombic cells the matrix is diagonal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitCell {
    basis: Matrix3<f32>,
}

impl UnitCell {
    pub fn from_basis(basis: Matrix3<f32>) -> Self {
        Self { basis }
    }

    pub fn orthorhombic(x: f32, y: f32, z: f32) -> Self {
        Self {
            basis: Matrix3::from_diagonal(&Vector3::new(x, y, z)),
        }
    }

    pub fn basis(&self) -> &Matrix3<f32> {
        &self.basis
    }

    /// The extent of the box along each axis: `basis * (1, 1, 1)`.
    pub fn extent(&self) -> Vector3<f32> {
        self.basis * Vector3::new(1.0, 1.0, 1.0)
    }

    /// The geometric center of the box.
    pub fn center(&self) -> Vector3<f32> {
        self.extent() * 0.5
    }
}

/// Decoded per-frame metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    pub num_atoms: usize,
    /// Simulation time of the frame, in the trajectory's native time unit.
    pub time: f32,
    pub unit_cell: Option<UnitCell>,
}

/// One timestep's atomic coordinates, stored as three parallel arrays.
///
/// The parallel layout mirrors how decoders produce coordinates and keeps
/// per-axis batch transformations (translation, rewrapping) cache-friendly.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
}

impl Frame {
    pub fn zeroed(header: FrameHeader) -> Self {
        let n = header.num_atoms;
        Self {
            header,
            x: vec![0.0; n],
            y: vec![0.0; n],
            z: vec![0.0; n],
        }
    }

    pub fn num_atoms(&self) -> usize {
        self.header.num_atoms
    }

    pub fn position(&self, atom: usize) -> Point3<f32> {
        Point3::new(self.x[atom], self.y[atom], self.z[atom])
    }
}

/// Read access to per-frame atom positions, independent of where the frames
/// live.
///
/// The statistics engine computes over any provider; the common one is a
/// fully materialized [`TrajectoryBuffer`]. Providers must be `Sync` so the
/// per-instance property loop can be parallelized.
pub trait FramePositions: Sync {
    fn num_frames(&self) -> usize;

    fn position(&self, frame: usize, atom: usize) -> Point3<f32>;
}

/// An in-memory buffer of decoded frames.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryBuffer {
    frames: Vec<Frame>,
}

impl TrajectoryBuffer {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }
}

impl FramePositions for TrajectoryBuffer {
    fn num_frames(&self) -> usize {
        self.frames.len()
    }

    fn position(&self, frame: usize, atom: usize) -> Point3<f32> {
        self.frames[frame].position(atom)
    }
}
