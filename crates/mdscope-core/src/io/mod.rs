//! File-format seam: decoder traits, built-in text/binary format readers,
//! and the extension table that maps file extensions to decoder
//! constructors.
//!
//! Not every extension supports both roles: `cif` only yields a molecule,
//! `trr` only a trajectory. Formats that are not built in (notably
//! compressed `xtc`) plug in at runtime through [`FormatRegistry::register`],
//! mirroring how the statistics engine accepts user-defined commands.

pub mod cif;
pub mod gro;
pub mod pdb;
pub mod traits;
pub mod trr;
pub mod xyz;

pub use traits::{FormatError, MoleculeReader, TrajectoryReader};

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Constructor for a molecule decoder.
pub type MoleculeOpen =
    Arc<dyn Fn(&Path) -> Result<Box<dyn MoleculeReader>, FormatError> + Send + Sync>;

/// Constructor for a trajectory decoder.
pub type TrajectoryOpen =
    Arc<dyn Fn(&Path) -> Result<Box<dyn TrajectoryReader>, FormatError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Format '{0}' is already registered")]
    Duplicate(String),

    #[error("Format '{0}' registers neither a molecule nor a trajectory decoder")]
    EmptyEntry(String),
}

type BuiltinMoleculeOpen = fn(&Path) -> Result<Box<dyn MoleculeReader>, FormatError>;
type BuiltinTrajectoryOpen = fn(&Path) -> Result<Box<dyn TrajectoryReader>, FormatError>;

/// The built-in extension table. Each row maps an extension to an optional
/// molecule decoder and an optional trajectory decoder.
static BUILTIN_FORMATS: &[(
    &str,
    Option<BuiltinMoleculeOpen>,
    Option<BuiltinTrajectoryOpen>,
)] = &[
    ("pdb", Some(open_pdb_molecule), Some(open_pdb_trajectory)),
    ("gro", Some(open_gro_molecule), Some(open_gro_trajectory)),
    ("xyz", Some(open_xyz_molecule), Some(open_xyz_trajectory)),
    ("xmol", Some(open_xyz_molecule), Some(open_xyz_trajectory)),
    ("arc", Some(open_xyz_molecule), Some(open_xyz_trajectory)),
    ("cif", Some(open_cif_molecule), None),
    ("trr", None, Some(open_trr_trajectory)),
];

fn open_pdb_molecule(path: &Path) -> Result<Box<dyn MoleculeReader>, FormatError> {
    Ok(Box::new(pdb::PdbFile::open(path)?))
}

fn open_pdb_trajectory(path: &Path) -> Result<Box<dyn TrajectoryReader>, FormatError> {
    Ok(Box::new(pdb::PdbFile::open(path)?))
}

fn open_gro_molecule(path: &Path) -> Result<Box<dyn MoleculeReader>, FormatError> {
    Ok(Box::new(gro::GroFile::open(path)?))
}

fn open_gro_trajectory(path: &Path) -> Result<Box<dyn TrajectoryReader>, FormatError> {
    Ok(Box::new(gro::GroFile::open(path)?))
}

fn open_xyz_molecule(path: &Path) -> Result<Box<dyn MoleculeReader>, FormatError> {
    Ok(Box::new(xyz::XyzFile::open(path)?))
}

fn open_xyz_trajectory(path: &Path) -> Result<Box<dyn TrajectoryReader>, FormatError> {
    Ok(Box::new(xyz::XyzFile::open(path)?))
}

fn open_cif_molecule(path: &Path) -> Result<Box<dyn MoleculeReader>, FormatError> {
    Ok(Box::new(cif::CifFile::open(path)?))
}

fn open_trr_trajectory(path: &Path) -> Result<Box<dyn TrajectoryReader>, FormatError> {
    Ok(Box::new(trr::TrrFile::open(path)?))
}

struct FormatEntry {
    extension: String,
    molecule: Option<MoleculeOpen>,
    trajectory: Option<TrajectoryOpen>,
}

/// Extension-keyed registry of format decoders.
///
/// Seeded with the built-in table; additional formats can be registered at
/// runtime. Lookup is a linear scan, which is fine for the handful of rows
/// involved.
pub struct FormatRegistry {
    entries: Vec<FormatEntry>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let entries = BUILTIN_FORMATS
            .iter()
            .map(|&(ext, molecule, trajectory)| FormatEntry {
                extension: ext.to_string(),
                molecule: molecule.map(|f| Arc::new(f) as MoleculeOpen),
                trajectory: trajectory.map(|f| Arc::new(f) as TrajectoryOpen),
            })
            .collect();
        Self { entries }
    }
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an external format. At least one decoder role must be
    /// supplied; a duplicate extension is rejected.
    pub fn register(
        &mut self,
        extension: &str,
        molecule: Option<MoleculeOpen>,
        trajectory: Option<TrajectoryOpen>,
    ) -> Result<(), RegistryError> {
        let extension = extension.to_ascii_lowercase();
        if molecule.is_none() && trajectory.is_none() {
            return Err(RegistryError::EmptyEntry(extension));
        }
        if self.find(&extension).is_some() {
            return Err(RegistryError::Duplicate(extension));
        }
        self.entries.push(FormatEntry {
            extension,
            molecule,
            trajectory,
        });
        Ok(())
    }

    pub fn molecule_opener(&self, extension: &str) -> Option<MoleculeOpen> {
        self.find(&extension.to_ascii_lowercase())
            .and_then(|e| e.molecule.clone())
    }

    pub fn trajectory_opener(&self, extension: &str) -> Option<TrajectoryOpen> {
        self.find(&extension.to_ascii_lowercase())
            .and_then(|e| e.trajectory.clone())
    }

    pub fn supported_extensions(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.extension.as_str())
    }

    fn find(&self, extension: &str) -> Option<&FormatEntry> {
        self.entries.iter().find(|e| e.extension == extension)
    }
}

/// Lower-cased extension of a path, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_roles_match_the_table() {
        let registry = FormatRegistry::new();

        assert!(registry.molecule_opener("pdb").is_some());
        assert!(registry.trajectory_opener("pdb").is_some());
        assert!(registry.molecule_opener("cif").is_some());
        assert!(registry.trajectory_opener("cif").is_none());
        assert!(registry.molecule_opener("trr").is_none());
        assert!(registry.trajectory_opener("trr").is_some());
        assert!(registry.trajectory_opener("foo").is_none());
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        let registry = FormatRegistry::new();
        assert!(registry.molecule_opener("PDB").is_some());
        assert_eq!(
            extension_of(Path::new("/tmp/test.XYZ")),
            Some("xyz".to_string())
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = FormatRegistry::new();
        let err = registry
            .register("pdb", Some(Arc::new(open_pdb_molecule)), None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(_)));
    }

    #[test]
    fn empty_registration_is_rejected() {
        let mut registry = FormatRegistry::new();
        let err = registry.register("dcd", None, None).unwrap_err();
        assert!(matches!(err, RegistryError::EmptyEntry(_)));
    }
}
