use super::traits::{FormatError, MoleculeReader, TrajectoryReader};
use crate::core::models::{AtomRange, Frame, FrameHeader, Molecule, Residue, UnitCell};
use nalgebra::Matrix3;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// PDB reader.
///
/// The molecule is built from the first model's `ATOM`/`HETATM` records;
/// `TER` records delimit covalent structures. Multi-model files expose one
/// trajectory frame per `MODEL` block; a file without `MODEL` records is a
/// single-frame trajectory. `CRYST1` provides the unit cell.
pub struct PdbFile {
    file: File,
    num_atoms: usize,
    elements: Vec<String>,
    residues: Vec<Residue>,
    structures: Vec<AtomRange>,
    unit_cell: Option<UnitCell>,
    frame_offsets: Vec<u64>,
}

fn column(line: &str, range: std::ops::Range<usize>) -> &str {
    line.get(range).unwrap_or("").trim()
}

fn is_atom_record(line: &str) -> bool {
    line.starts_with("ATOM") || line.starts_with("HETATM")
}

fn element_of(line: &str) -> String {
    let element = column(line, 76..78);
    if !element.is_empty() {
        return element.to_string();
    }
    // Fall back to the first alphabetic character of the atom name.
    column(line, 12..16)
        .chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_string())
        .unwrap_or_default()
}

/// Builds a unit cell from `CRYST1` cell parameters (lengths in ångström,
/// angles in degrees), using the standard fractional-to-Cartesian
/// convention with `a` along x.
fn cell_from_cryst1(line: &str) -> Option<UnitCell> {
    let a: f32 = column(line, 6..15).parse().ok()?;
    let b: f32 = column(line, 15..24).parse().ok()?;
    let c: f32 = column(line, 24..33).parse().ok()?;
    let alpha: f32 = column(line, 33..40).parse().ok()?;
    let beta: f32 = column(line, 40..47).parse().ok()?;
    let gamma: f32 = column(line, 47..54).parse().ok()?;

    if a <= 0.0 || b <= 0.0 || c <= 0.0 {
        return None;
    }
    // A 1x1x1 placeholder cell is common in non-crystallographic files.
    if (a - 1.0).abs() < 1e-6 && (b - 1.0).abs() < 1e-6 && (c - 1.0).abs() < 1e-6 {
        return None;
    }

    let (alpha, beta, gamma) = (
        alpha.to_radians(),
        beta.to_radians(),
        gamma.to_radians(),
    );
    let cos_alpha = alpha.cos();
    let cos_beta = beta.cos();
    let (sin_gamma, cos_gamma) = gamma.sin_cos();

    let cx = c * cos_beta;
    let cy = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
    let cz = (c * c - cx * cx - cy * cy).max(0.0).sqrt();

    #[rustfmt::skip]
    let basis = Matrix3::new(
        a,   b * cos_gamma, cx,
        0.0, b * sin_gamma, cy,
        0.0, 0.0,           cz,
    );
    Some(UnitCell::from_basis(basis))
}

impl PdbFile {
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(&file);

        let mut elements = Vec::new();
        let mut residues: Vec<Residue> = Vec::new();
        let mut structures: Vec<AtomRange> = Vec::new();
        let mut unit_cell = None;
        let mut frame_offsets: Vec<u64> = Vec::new();

        let mut offset = 0u64;
        let mut line = String::new();

        let mut in_first_model = true;
        let mut atoms_in_current_frame = 0usize;
        let mut num_atoms = 0usize;
        let mut structure_beg = 0usize;
        let mut current_residue: Option<(String, String, String)> = None;
        let mut saw_model_record = false;
        let mut first_atom_offset: Option<u64> = None;

        loop {
            line.clear();
            let line_start = offset;
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            offset += read as u64;

            if line.starts_with("CRYST1") {
                unit_cell = cell_from_cryst1(&line);
            } else if line.starts_with("MODEL") {
                saw_model_record = true;
                if !frame_offsets.is_empty() {
                    in_first_model = false;
                }
                frame_offsets.push(line_start);
                atoms_in_current_frame = 0;
            } else if line.starts_with("ENDMDL") {
                if frame_offsets.len() == 1 {
                    num_atoms = atoms_in_current_frame;
                } else if atoms_in_current_frame != num_atoms {
                    return Err(FormatError::Inconsistency(format!(
                        "model {} has {} atoms, expected {}",
                        frame_offsets.len(),
                        atoms_in_current_frame,
                        num_atoms
                    )));
                }
            } else if line.starts_with("TER") && in_first_model {
                if elements.len() > structure_beg {
                    structures.push(AtomRange::new(structure_beg, elements.len()));
                    structure_beg = elements.len();
                }
            } else if is_atom_record(&line) {
                if first_atom_offset.is_none() {
                    first_atom_offset = Some(line_start);
                }
                atoms_in_current_frame += 1;
                if in_first_model {
                    elements.push(element_of(&line));

                    let chain = column(&line, 21..22).to_string();
                    let res_seq = column(&line, 22..26).to_string();
                    let res_name = column(&line, 17..20).to_string();
                    let key = (chain, res_seq, res_name.clone());
                    let atom_idx = elements.len() - 1;
                    if current_residue.as_ref() != Some(&key) {
                        residues
                            .push(Residue::new(res_name, AtomRange::new(atom_idx, atom_idx + 1)));
                        current_residue = Some(key);
                    } else if let Some(last) = residues.last_mut() {
                        last.atoms.end = atom_idx + 1;
                    }
                }
            }
        }

        if elements.is_empty() {
            return Err(FormatError::Empty);
        }
        if elements.len() > structure_beg {
            structures.push(AtomRange::new(structure_beg, elements.len()));
        }

        if !saw_model_record {
            num_atoms = elements.len();
            frame_offsets.push(first_atom_offset.unwrap_or(0));
        } else if num_atoms == 0 {
            // Single MODEL without ENDMDL.
            num_atoms = atoms_in_current_frame;
        }

        Ok(Self {
            file,
            num_atoms,
            elements,
            residues,
            structures,
            unit_cell,
            frame_offsets,
        })
    }

    fn parse_frame_at(&mut self, offset: u64, index: usize) -> Result<Frame, FormatError> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(&self.file);

        let header = FrameHeader {
            num_atoms: self.num_atoms,
            time: index as f32,
            unit_cell: self.unit_cell,
        };
        let mut frame = Frame::zeroed(header);

        let mut atom = 0usize;
        let mut line = String::new();
        while atom < self.num_atoms {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                return Err(FormatError::Inconsistency(format!(
                    "frame {} ended after {} of {} atoms",
                    index, atom, self.num_atoms
                )));
            }
            if line.starts_with("ENDMDL") || line.starts_with("END") {
                return Err(FormatError::Inconsistency(format!(
                    "frame {} ended after {} of {} atoms",
                    index, atom, self.num_atoms
                )));
            }
            if !is_atom_record(&line) {
                continue;
            }

            let parse = |range: std::ops::Range<usize>| {
                column(&line, range)
                    .parse::<f32>()
                    .map_err(|_| FormatError::parse(atom, "invalid coordinate"))
            };
            frame.x[atom] = parse(30..38)?;
            frame.y[atom] = parse(38..46)?;
            frame.z[atom] = parse(46..54)?;
            atom += 1;
        }

        Ok(frame)
    }
}

impl MoleculeReader for PdbFile {
    fn read_molecule(&mut self) -> Result<Molecule, FormatError> {
        Ok(Molecule::new(
            self.elements.clone(),
            self.residues.clone(),
            self.structures.clone(),
        ))
    }
}

impl TrajectoryReader for PdbFile {
    fn num_atoms(&self) -> usize {
        self.num_atoms
    }

    fn num_frames(&self) -> usize {
        self.frame_offsets.len()
    }

    fn read_frame(&mut self, index: usize) -> Result<Frame, FormatError> {
        let offset = *self
            .frame_offsets
            .get(index)
            .ok_or(FormatError::FrameOutOfRange {
                index,
                count: self.frame_offsets.len(),
            })?;
        self.parse_frame_at(offset, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn atom_line(serial: usize, name: &str, res: &str, seq: usize, x: f32, y: f32, z: f32) -> String {
        let mut line = String::new();
        write!(
            line,
            "ATOM  {:>5} {:<4} {:<3} A{:>4}    {:8.3}{:8.3}{:8.3}  1.00  0.00          {:>2}",
            serial,
            name,
            res,
            seq,
            x,
            y,
            z,
            name.chars().next().unwrap()
        )
        .unwrap();
        line
    }

    fn write_two_model_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "CRYST1   20.000   20.000   20.000  90.00  90.00  90.00 P 1").unwrap();
        for (model, shift) in [(1, 0.0f32), (2, 1.0)] {
            writeln!(file, "MODEL     {:>4}", model).unwrap();
            writeln!(file, "{}", atom_line(1, "N", "ALA", 1, 0.0 + shift, 0.0, 0.0)).unwrap();
            writeln!(file, "{}", atom_line(2, "CA", "ALA", 1, 1.5 + shift, 0.0, 0.0)).unwrap();
            writeln!(file, "{}", atom_line(3, "O", "HOH", 2, 5.0 + shift, 0.0, 0.0)).unwrap();
            writeln!(file, "ENDMDL").unwrap();
        }
        writeln!(file, "END").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn molecule_from_first_model() {
        let file = write_two_model_file();
        let mut pdb = PdbFile::open(file.path()).unwrap();
        let mol = pdb.read_molecule().unwrap();

        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.residues().len(), 2);
        assert_eq!(mol.residues()[0].name, "ALA");
        assert_eq!(mol.residues()[0].atoms, AtomRange::new(0, 2));
        assert_eq!(mol.residues()[1].name, "HOH");
        assert_eq!(mol.elements()[1], "C");
    }

    #[test]
    fn models_become_frames() {
        let file = write_two_model_file();
        let mut pdb = PdbFile::open(file.path()).unwrap();

        assert_eq!(TrajectoryReader::num_frames(&pdb), 2);
        let frame0 = pdb.read_frame(0).unwrap();
        let frame1 = pdb.read_frame(1).unwrap();
        assert!((frame0.x[0] - 0.0).abs() < 1e-4);
        assert!((frame1.x[0] - 1.0).abs() < 1e-4);

        let cell = frame0.header.unit_cell.expect("CRYST1 present");
        assert!((cell.extent().x - 20.0).abs() < 1e-4);
    }

    #[test]
    fn file_without_models_is_a_single_frame() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", atom_line(1, "C", "LIG", 1, 2.0, 3.0, 4.0)).unwrap();
        writeln!(file, "END").unwrap();
        file.flush().unwrap();

        let mut pdb = PdbFile::open(file.path()).unwrap();
        assert_eq!(TrajectoryReader::num_frames(&pdb), 1);
        let frame = pdb.read_frame(0).unwrap();
        assert!((frame.y[0] - 3.0).abs() < 1e-4);
        assert!(frame.header.unit_cell.is_none());
    }

    #[test]
    fn ter_records_delimit_structures() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", atom_line(1, "N", "ALA", 1, 0.0, 0.0, 0.0)).unwrap();
        writeln!(file, "{}", atom_line(2, "CA", "ALA", 1, 1.5, 0.0, 0.0)).unwrap();
        writeln!(file, "TER").unwrap();
        writeln!(file, "{}", atom_line(3, "O", "HOH", 2, 5.0, 0.0, 0.0)).unwrap();
        file.flush().unwrap();

        let mut pdb = PdbFile::open(file.path()).unwrap();
        let mol = pdb.read_molecule().unwrap();
        assert_eq!(
            mol.structures(),
            &[AtomRange::new(0, 2), AtomRange::new(2, 3)]
        );
    }
}
