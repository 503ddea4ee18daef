use super::traits::{FormatError, MoleculeReader, TrajectoryReader};
use crate::core::models::{AtomRange, Frame, FrameHeader, Molecule, Residue, UnitCell};
use nalgebra::Matrix3;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Conversion from the GRO format's nanometers to ångström.
const NM_TO_ANGSTROM: f32 = 10.0;

/// Gromos87 (`.gro`) reader.
///
/// A file holds one or more frame blocks: title line, atom-count line,
/// fixed-column atom records, and a box line. Coordinates are converted from
/// nanometers to ångström on read. Frame byte offsets are indexed at open
/// time.
pub struct GroFile {
    file: File,
    num_atoms: usize,
    elements: Vec<String>,
    residues: Vec<Residue>,
    frame_offsets: Vec<u64>,
}

fn column(line: &str, range: std::ops::Range<usize>) -> &str {
    line.get(range).unwrap_or("").trim()
}

fn element_from_atom_name(name: &str) -> String {
    name.chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_string())
        .unwrap_or_default()
}

fn parse_time(title: &str) -> Option<f32> {
    let pos = title.rfind("t=")?;
    title[pos + 2..]
        .split_whitespace()
        .next()?
        .parse::<f32>()
        .ok()
}

fn parse_box_line(line: &str, line_no: usize) -> Result<Option<UnitCell>, FormatError> {
    let values: Vec<f32> = line
        .split_whitespace()
        .map(|f| f.parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|_| FormatError::parse(line_no, "invalid box vector"))?;

    let mut v = [0.0f32; 9];
    match values.len() {
        3 => v[..3].copy_from_slice(&values),
        9 => v.copy_from_slice(&values),
        _ => {
            return Err(FormatError::parse(
                line_no,
                "box line must contain 3 or 9 values",
            ));
        }
    }
    if v.iter().all(|&c| c == 0.0) {
        return Ok(None);
    }

    // Order: v1x v2y v3z [v1y v1z v2x v2z v3x v3y], columns are box vectors.
    #[rustfmt::skip]
    let basis = Matrix3::new(
        v[0], v[5], v[7],
        v[3], v[1], v[8],
        v[4], v[6], v[2],
    ) * NM_TO_ANGSTROM;
    Ok(Some(UnitCell::from_basis(basis)))
}

impl GroFile {
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(&file);

        let mut num_atoms = 0usize;
        let mut elements = Vec::new();
        let mut residues: Vec<Residue> = Vec::new();
        let mut frame_offsets = Vec::new();

        let mut offset = 0u64;
        let mut line_no = 0usize;
        let mut line = String::new();

        loop {
            line.clear();
            let frame_start = offset;
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            offset += read as u64;
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            // Atom count follows the title line.
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                return Err(FormatError::parse(line_no, "missing atom count"));
            }
            offset += read as u64;
            line_no += 1;
            let count: usize = line
                .trim()
                .parse()
                .map_err(|_| FormatError::parse(line_no, "expected atom count"))?;
            if count == 0 {
                return Err(FormatError::Empty);
            }
            if frame_offsets.is_empty() {
                num_atoms = count;
            } else if count != num_atoms {
                return Err(FormatError::Inconsistency(format!(
                    "frame {} has {} atoms, expected {}",
                    frame_offsets.len(),
                    count,
                    num_atoms
                )));
            }

            let first_frame = frame_offsets.is_empty();
            let mut current_residue: Option<(String, String)> = None;
            for atom in 0..count {
                line.clear();
                let read = reader.read_line(&mut line)?;
                if read == 0 {
                    return Err(FormatError::parse(line_no, "truncated frame"));
                }
                offset += read as u64;
                line_no += 1;

                if first_frame {
                    let res_id = column(&line, 0..5).to_string();
                    let res_name = column(&line, 5..10).to_string();
                    let atom_name = column(&line, 10..15);
                    elements.push(element_from_atom_name(atom_name));

                    let key = (res_id, res_name.clone());
                    if current_residue.as_ref() != Some(&key) {
                        residues.push(Residue::new(res_name, AtomRange::new(atom, atom + 1)));
                        current_residue = Some(key);
                    } else if let Some(last) = residues.last_mut() {
                        last.atoms.end = atom + 1;
                    }
                }
            }

            // Box line terminates the block.
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                return Err(FormatError::parse(line_no, "missing box line"));
            }
            offset += read as u64;
            line_no += 1;
            let _cell = parse_box_line(&line, line_no)?;

            frame_offsets.push(frame_start);
        }

        if frame_offsets.is_empty() {
            return Err(FormatError::Empty);
        }

        Ok(Self {
            file,
            num_atoms,
            elements,
            residues,
            frame_offsets,
        })
    }

    fn parse_frame_at(&mut self, offset: u64, index: usize) -> Result<Frame, FormatError> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(&self.file);

        let mut line = String::new();
        reader.read_line(&mut line)?;
        let time = parse_time(&line).unwrap_or(index as f32);
        line.clear();
        reader.read_line(&mut line)?; // atom count, validated at open

        let mut x = vec![0.0f32; self.num_atoms];
        let mut y = vec![0.0f32; self.num_atoms];
        let mut z = vec![0.0f32; self.num_atoms];

        for atom in 0..self.num_atoms {
            line.clear();
            reader.read_line(&mut line)?;
            let px = column(&line, 20..28);
            let py = column(&line, 28..36);
            let pz = column(&line, 36..44);
            let parse = |s: &str| {
                s.parse::<f32>()
                    .map_err(|_| FormatError::parse(atom + 3, "invalid coordinate"))
            };
            x[atom] = parse(px)? * NM_TO_ANGSTROM;
            y[atom] = parse(py)? * NM_TO_ANGSTROM;
            z[atom] = parse(pz)? * NM_TO_ANGSTROM;
        }

        line.clear();
        reader.read_line(&mut line)?;
        let unit_cell = parse_box_line(&line, 0)?;

        Ok(Frame {
            header: FrameHeader {
                num_atoms: self.num_atoms,
                time,
                unit_cell,
            },
            x,
            y,
            z,
        })
    }
}

impl MoleculeReader for GroFile {
    fn read_molecule(&mut self) -> Result<Molecule, FormatError> {
        Ok(Molecule::new(
            self.elements.clone(),
            self.residues.clone(),
            vec![],
        ))
    }
}

impl TrajectoryReader for GroFile {
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
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_water_dimer() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        // Two frames, two single-atom residues each.
        for (t, shift) in [(0.0f32, 0.0f32), (1.0, 0.1)] {
            writeln!(file, "water dimer t= {:.1}", t).unwrap();
            writeln!(file, "    2").unwrap();
            writeln!(
                file,
                "    1SOL     OW    1{:8.3}{:8.3}{:8.3}",
                0.100 + shift,
                0.200,
                0.300
            )
            .unwrap();
            writeln!(
                file,
                "    2SOL     OW    2{:8.3}{:8.3}{:8.3}",
                0.500 + shift,
                0.200,
                0.300
            )
            .unwrap();
            writeln!(file, "   2.00000   2.00000   2.00000").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_molecule_residues_and_units() {
        let file = write_water_dimer();
        let mut gro = GroFile::open(file.path()).unwrap();

        let mol = gro.read_molecule().unwrap();
        assert_eq!(mol.atom_count(), 2);
        assert_eq!(mol.residues().len(), 2);
        assert_eq!(mol.residues()[0].name, "SOL");
        assert_eq!(mol.elements()[0], "O");

        let frame = gro.read_frame(0).unwrap();
        // 0.1 nm -> 1.0 angstrom
        assert!((frame.x[0] - 1.0).abs() < 1e-4);
        assert!((frame.header.time - 0.0).abs() < 1e-6);

        let cell = frame.header.unit_cell.expect("box line present");
        assert!((cell.extent().x - 20.0).abs() < 1e-4);
    }

    #[test]
    fn second_frame_reads_with_time() {
        let file = write_water_dimer();
        let mut gro = GroFile::open(file.path()).unwrap();
        assert_eq!(TrajectoryReader::num_frames(&gro), 2);

        let frame = gro.read_frame(1).unwrap();
        assert!((frame.x[0] - 2.0).abs() < 1e-4);
        assert!((frame.header.time - 1.0).abs() < 1e-6);
    }

    #[test]
    fn triclinic_box_line_parses() {
        let cell = parse_box_line("2.0 2.0 2.0 0.0 0.0 1.0 0.0 0.0 0.0", 0)
            .unwrap()
            .unwrap();
        // v2 has an x component of 1.0 nm.
        assert!((cell.basis()[(0, 1)] - 10.0).abs() < 1e-4);
    }

    #[test]
    fn zero_box_means_no_cell() {
        assert!(
            parse_box_line("0.0 0.0 0.0", 0).unwrap().is_none(),
            "an all-zero box is treated as non-periodic"
        );
    }
}
