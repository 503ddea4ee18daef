use super::frame::FramePositions;
use crate::core::elements;

/// A contiguous atom-index range `[beg, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomRange {
    pub beg: usize,
    pub end: usize,
}

impl AtomRange {
    pub fn new(beg: usize, end: usize) -> Self {
        debug_assert!(beg <= end);
        Self { beg, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.beg
    }

    pub fn is_empty(&self) -> bool {
        self.beg == self.end
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> {
        self.beg..self.end
    }
}

/// A residue: a named, contiguous run of atoms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residue {
    pub name: String,
    pub atoms: AtomRange,
}

impl Residue {
    pub fn new(name: impl Into<String>, atoms: AtomRange) -> Self {
        Self {
            name: name.into(),
            atoms,
        }
    }
}

/// A static molecular structure: per-atom element symbols and masses,
/// residues, and the covalently connected substructures used by
/// de-periodization.
///
/// Structures partition the atom range into bonded units; when rewrapping a
/// periodic frame, every atom of a structure is shifted together so bonds
/// never straddle the box boundary.
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    elements: Vec<String>,
    masses: Vec<f32>,
    residues: Vec<Residue>,
    structures: Vec<AtomRange>,
}

impl Molecule {
    /// Builds a molecule, deriving per-atom masses from the element table.
    ///
    /// When `structures` is empty the whole molecule is treated as a single
    /// connected structure.
    pub fn new(elements: Vec<String>, residues: Vec<Residue>, structures: Vec<AtomRange>) -> Self {
        let masses = elements
            .iter()
            .map(|e| elements::mass_or_fallback(e))
            .collect();
        let structures = if structures.is_empty() && !elements.is_empty() {
            vec![AtomRange::new(0, elements.len())]
        } else {
            structures
        };
        Self {
            elements,
            masses,
            residues,
            structures,
        }
    }

    pub fn with_masses(mut self, masses: Vec<f32>) -> Self {
        debug_assert_eq!(masses.len(), self.elements.len());
        self.masses = masses;
        self
    }

    pub fn atom_count(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn masses(&self) -> &[f32] {
        &self.masses
    }

    pub fn residues(&self) -> &[Residue] {
        &self.residues
    }

    pub fn structures(&self) -> &[AtomRange] {
        &self.structures
    }
}

/// A molecule paired with a source of per-frame positions; the aggregate the
/// statistics engine computes over.
#[derive(Clone, Copy)]
pub struct MoleculeDynamic<'a> {
    pub molecule: &'a Molecule,
    pub trajectory: &'a dyn FramePositions,
}

impl<'a> MoleculeDynamic<'a> {
    pub fn new(molecule: &'a Molecule, trajectory: &'a dyn FramePositions) -> Self {
        Self {
            molecule,
            trajectory,
        }
    }

    pub fn num_frames(&self) -> usize {
        self.trajectory.num_frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masses_derive_from_elements() {
        let mol = Molecule::new(
            vec!["O".to_string(), "H".to_string(), "H".to_string()],
            vec![Residue::new("HOH", AtomRange::new(0, 3))],
            vec![],
        );
        assert_eq!(mol.atom_count(), 3);
        assert!((mol.masses()[0] - 15.999).abs() < 1e-6);
        assert_eq!(mol.structures(), &[AtomRange::new(0, 3)]);
    }

    #[test]
    fn atom_range_basics() {
        let range = AtomRange::new(2, 5);
        assert_eq!(range.len(), 3);
        assert!(!range.is_empty());
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
    }
}
