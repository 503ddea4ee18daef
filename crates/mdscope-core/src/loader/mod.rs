//! # Trajectory Loader
//!
//! Stateful layer that owns every open molecule and trajectory. Opening a
//! trajectory resolves a format decoder from the extension table, validates
//! it against the paired molecule, and wraps it behind a per-trajectory
//! [`FrameCache`] sized from the configured memory budget. Frame reads route
//! through the decode pipeline: cache lookup, decode on miss, then the
//! optional post-processing transformations (recentering onto a target atom
//! mask, de-periodization of bonded structures) before the frame is
//! published to the cache.
//!
//! Handles are generational slotmap keys, so operations on closed handles
//! fail with [`LoaderError::NotLoaded`] instead of touching recycled slots.
//! Post-processing configuration is tied to the cache through a generation
//! counter: mutating it invalidates frames decoded under the old
//! configuration.

pub mod cache;
pub mod error;

pub use cache::{CacheError, FrameCache, FrameLock, frame_capacity};
pub use error::LoaderError;

use crate::core::geometry;
use crate::core::models::{Frame, FrameHeader, Molecule, TrajectoryBuffer};
use crate::io::{FormatRegistry, TrajectoryOpen, TrajectoryReader, extension_of};
use cache::CacheQuery;
use slotmap::{SlotMap, new_key_type};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, instrument, warn};

/// Default cache memory budget when the embedding application does not
/// configure one.
pub const DEFAULT_CACHE_BUDGET_BYTES: u64 = 256 * 1024 * 1024;

/// Default soft limit on simultaneously open molecules or trajectories.
pub const DEFAULT_MAX_OPEN: usize = 8;

new_key_type! {
    /// Handle to an open trajectory.
    pub struct TrajectoryId;
    /// Handle to an open molecule.
    pub struct MoleculeId;
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Requested frame-cache budget in bytes; clamped per
    /// [`frame_capacity`].
    pub cache_budget_bytes: u64,
    /// Physical RAM of the machine, when known. Bounds the cache budget to
    /// a quarter of it.
    pub physical_ram_bytes: Option<u64>,
    /// Soft limit on simultaneously open objects per kind.
    pub max_open: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            physical_ram_bytes: None,
            max_open: DEFAULT_MAX_OPEN,
        }
    }
}

/// Per-trajectory post-processing settings, applied to every decoded frame.
#[derive(Debug, Default)]
struct PostProcess {
    /// Atom indices whose mass-weighted center is translated to the origin
    /// (or box center) after decode.
    recenter_target: Option<Vec<u32>>,
    /// Rewrap bonded structures so they are not split across the periodic
    /// boundary.
    deperiodize: bool,
}

struct LoadedTrajectory {
    reader: Mutex<Box<dyn TrajectoryReader>>,
    molecule: Arc<Molecule>,
    cache: FrameCache,
    post: RwLock<PostProcess>,
    num_atoms: usize,
    num_frames: usize,
}

/// Registry of open molecules and trajectories.
///
/// All methods take `&self`; concurrent frame loads on the same or different
/// trajectories are safe, with the per-trajectory cache arbitrating decodes.
pub struct Loader {
    config: LoaderConfig,
    formats: FormatRegistry,
    trajectories: RwLock<SlotMap<TrajectoryId, Arc<LoadedTrajectory>>>,
    molecules: RwLock<SlotMap<MoleculeId, Arc<Molecule>>>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            formats: FormatRegistry::new(),
            trajectories: RwLock::new(SlotMap::with_key()),
            molecules: RwLock::new(SlotMap::with_key()),
        }
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    /// Registers additional formats; see [`FormatRegistry::register`].
    pub fn formats_mut(&mut self) -> &mut FormatRegistry {
        &mut self.formats
    }

    /// Opens a molecular structure file, resolving the decoder from the
    /// file extension.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn open_molecule(&self, path: &Path) -> Result<MoleculeId, LoaderError> {
        let extension = extension_of(path).unwrap_or_default();
        let opener = self.formats.molecule_opener(&extension).ok_or_else(|| {
            LoaderError::UnsupportedExtension {
                extension: extension.clone(),
            }
        })?;

        let molecule = opener(path)?.read_molecule()?;

        let mut molecules = self.molecules.write().unwrap_or_else(|e| e.into_inner());
        if molecules.len() >= self.config.max_open {
            return Err(LoaderError::TooManyOpen {
                limit: self.config.max_open,
            });
        }
        Ok(molecules.insert(Arc::new(molecule)))
    }

    pub fn molecule(&self, id: MoleculeId) -> Result<Arc<Molecule>, LoaderError> {
        self.molecules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or(LoaderError::NotLoaded)
    }

    pub fn close_molecule(&self, id: MoleculeId) -> Result<(), LoaderError> {
        self.molecules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .map(|_| ())
            .ok_or(LoaderError::NotLoaded)
    }

    /// Opens a trajectory file with the decoder resolved from the file
    /// extension.
    pub fn open_trajectory(
        &self,
        path: &Path,
        molecule: Arc<Molecule>,
        deperiodize_on_load: bool,
    ) -> Result<TrajectoryId, LoaderError> {
        self.open_trajectory_with(path, None, molecule, deperiodize_on_load)
    }

    /// Opens a trajectory file, optionally forcing a specific decoder
    /// instead of consulting the extension table.
    ///
    /// The trajectory is only accepted when its atom count matches the
    /// paired molecule.
    #[instrument(skip(self, opener, molecule), fields(path = %path.display()))]
    pub fn open_trajectory_with(
        &self,
        path: &Path,
        opener: Option<&TrajectoryOpen>,
        molecule: Arc<Molecule>,
        deperiodize_on_load: bool,
    ) -> Result<TrajectoryId, LoaderError> {
        let resolved;
        let opener = match opener {
            Some(opener) => opener,
            None => {
                let extension = extension_of(path).unwrap_or_default();
                resolved = self.formats.trajectory_opener(&extension).ok_or(
                    LoaderError::UnsupportedExtension { extension },
                )?;
                &resolved
            }
        };

        let reader = opener(path)?;
        if reader.num_atoms() != molecule.atom_count() {
            return Err(LoaderError::AtomCountMismatch {
                trajectory_atoms: reader.num_atoms(),
                molecule_atoms: molecule.atom_count(),
            });
        }

        let num_atoms = reader.num_atoms();
        let num_frames = reader.num_frames();
        let capacity = frame_capacity(
            self.config.cache_budget_bytes,
            self.config.physical_ram_bytes,
            num_atoms,
            num_frames,
        );
        debug!(frames = capacity, "Initializing frame cache");

        let loaded = Arc::new(LoadedTrajectory {
            reader: Mutex::new(reader),
            molecule,
            cache: FrameCache::new(capacity),
            post: RwLock::new(PostProcess {
                recenter_target: None,
                deperiodize: deperiodize_on_load,
            }),
            num_atoms,
            num_frames,
        });

        let mut trajectories = self.trajectories.write().unwrap_or_else(|e| e.into_inner());
        if trajectories.len() >= self.config.max_open {
            return Err(LoaderError::TooManyOpen {
                limit: self.config.max_open,
            });
        }
        Ok(trajectories.insert(loaded))
    }

    /// Closes a trajectory, destroying its cache and decoder.
    pub fn close(&self, id: TrajectoryId) -> Result<(), LoaderError> {
        self.trajectories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .map(|_| ())
            .ok_or(LoaderError::NotLoaded)
    }

    pub fn num_atoms(&self, id: TrajectoryId) -> Result<usize, LoaderError> {
        Ok(self.get(id)?.num_atoms)
    }

    pub fn num_frames(&self, id: TrajectoryId) -> Result<usize, LoaderError> {
        Ok(self.get(id)?.num_frames)
    }

    /// Live frame capacity of a trajectory's cache.
    pub fn num_cache_frames(&self, id: TrajectoryId) -> Result<usize, LoaderError> {
        Ok(self.get(id)?.cache.capacity())
    }

    /// Replaces or clears the recenter target atom mask. The loader keeps
    /// its own copy; frames cached under the previous target are
    /// invalidated.
    pub fn set_recenter_target(
        &self,
        id: TrajectoryId,
        target: Option<&[u32]>,
    ) -> Result<(), LoaderError> {
        let traj = self.get(id)?;
        let target = target.map(|indices| {
            let mut copy: Vec<u32> = indices
                .iter()
                .copied()
                .filter(|&i| (i as usize) < traj.num_atoms)
                .collect();
            if copy.len() != indices.len() {
                warn!(
                    dropped = indices.len() - copy.len(),
                    "Recenter target contained out-of-range atom indices"
                );
            }
            copy.sort_unstable();
            copy
        });

        let mut post = traj.post.write().unwrap_or_else(|e| e.into_inner());
        post.recenter_target = target.filter(|t| !t.is_empty());
        drop(post);

        traj.cache.invalidate();
        Ok(())
    }

    /// Enables or disables de-periodization of decoded frames. Cached
    /// frames decoded under the previous setting are invalidated.
    pub fn set_deperiodize(&self, id: TrajectoryId, deperiodize: bool) -> Result<(), LoaderError> {
        let traj = self.get(id)?;
        let mut post = traj.post.write().unwrap_or_else(|e| e.into_inner());
        if post.deperiodize != deperiodize {
            post.deperiodize = deperiodize;
            drop(post);
            traj.cache.invalidate();
        }
        Ok(())
    }

    /// Forces full cache invalidation for a trajectory. Entries pinned by
    /// concurrent readers are dropped when released.
    pub fn clear_cache(&self, id: TrajectoryId) -> Result<(), LoaderError> {
        self.get(id)?.cache.invalidate();
        Ok(())
    }

    /// Loads a frame through the decode pipeline and copies the (possibly
    /// transformed) coordinates into the caller's buffers.
    pub fn load_frame(
        &self,
        id: TrajectoryId,
        index: usize,
        out_x: &mut [f32],
        out_y: &mut [f32],
        out_z: &mut [f32],
    ) -> Result<FrameHeader, LoaderError> {
        let lock = self.frame(id, index)?;
        let frame = lock.frame();
        let expected = frame.num_atoms();
        for buffer in [&out_x[..], &out_y[..], &out_z[..]] {
            if buffer.len() != expected {
                return Err(LoaderError::BufferSizeMismatch {
                    provided: buffer.len(),
                    expected,
                });
            }
        }
        out_x.copy_from_slice(&frame.x);
        out_y.copy_from_slice(&frame.y);
        out_z.copy_from_slice(&frame.z);
        Ok(frame.header)
    }

    /// Loads a frame through the decode pipeline and returns it pinned in
    /// the cache, without copying.
    pub fn frame(&self, id: TrajectoryId, index: usize) -> Result<FrameLock, LoaderError> {
        let traj = self.get(id)?;
        decode_frame(&traj, index)
    }

    /// Decodes the whole trajectory into an in-memory frame buffer.
    pub fn materialize(&self, id: TrajectoryId) -> Result<TrajectoryBuffer, LoaderError> {
        let traj = self.get(id)?;
        let mut buffer = TrajectoryBuffer::default();
        for index in 0..traj.num_frames {
            buffer.push(decode_frame(&traj, index)?.frame().clone());
        }
        Ok(buffer)
    }

    pub fn open_trajectory_count(&self) -> usize {
        self.trajectories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn open_molecule_count(&self) -> usize {
        self.molecules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn get(&self, id: TrajectoryId) -> Result<Arc<LoadedTrajectory>, LoaderError> {
        self.trajectories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or(LoaderError::NotLoaded)
    }
}

/// The decode pipeline: cache lookup, decode on miss, post-processing,
/// publish.
fn decode_frame(traj: &LoadedTrajectory, index: usize) -> Result<FrameLock, LoaderError> {
    if index >= traj.num_frames {
        return Err(LoaderError::FrameOutOfRange {
            index,
            count: traj.num_frames,
        });
    }

    match traj.cache.find_or_reserve(index)? {
        CacheQuery::Hit(lock) => Ok(lock),
        CacheQuery::Miss(reservation) => {
            // Decode failures drop the reservation, which vacates the slot
            // for waiting readers.
            let mut frame = {
                let mut reader = traj.reader.lock().unwrap_or_else(|e| e.into_inner());
                reader.read_frame(index)?
            };

            let post = traj.post.read().unwrap_or_else(|e| e.into_inner());
            if let Some(target) = &post.recenter_target {
                recenter(&mut frame, &traj.molecule, target);
            }
            if post.deperiodize {
                if let Some(cell) = frame.header.unit_cell {
                    geometry::deperiodize_structures(
                        &mut frame.x,
                        &mut frame.y,
                        &mut frame.z,
                        traj.molecule.masses(),
                        traj.molecule.structures(),
                        &cell,
                    );
                }
            }
            drop(post);

            Ok(reservation.publish(frame))
        }
    }
}

/// Translates the frame so the mass-weighted center of the target atoms
/// lands on the origin, or on the box center for periodic frames.
fn recenter(frame: &mut Frame, molecule: &Molecule, target: &[u32]) {
    if target.is_empty() {
        return;
    }
    let masses = molecule.masses();
    let com = match &frame.header.unit_cell {
        Some(cell) => {
            geometry::center_of_mass_periodic(&frame.x, &frame.y, &frame.z, masses, target, cell)
        }
        None => geometry::center_of_mass(&frame.x, &frame.y, &frame.z, masses, target),
    };
    let translation = match &frame.header.unit_cell {
        Some(cell) => cell.center() - com,
        None => -com,
    };
    geometry::translate(&mut frame.x, &mut frame.y, &mut frame.z, translation);
}
