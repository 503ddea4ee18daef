use super::traits::{FormatError, MoleculeReader, TrajectoryReader};
use crate::core::models::{AtomRange, Frame, FrameHeader, Molecule, Residue};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// XYZ/XMOL/ARC reader.
///
/// A file is a sequence of frame blocks: an atom-count line, a comment line,
/// then one `element x y z` line per atom. Frame byte offsets are indexed at
/// open time so frames can be read in any order.
pub struct XyzFile {
    file: File,
    num_atoms: usize,
    elements: Vec<String>,
    frame_offsets: Vec<u64>,
}

impl XyzFile {
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(&file);

        let mut elements = Vec::new();
        let mut frame_offsets = Vec::new();
        let mut num_atoms = 0usize;

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

            // Comment line.
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                return Err(FormatError::parse(line_no, "truncated frame header"));
            }
            offset += read as u64;
            line_no += 1;

            for _ in 0..count {
                line.clear();
                let read = reader.read_line(&mut line)?;
                if read == 0 {
                    return Err(FormatError::parse(line_no, "truncated frame"));
                }
                offset += read as u64;
                line_no += 1;
                if frame_offsets.is_empty() {
                    let element = line
                        .split_whitespace()
                        .next()
                        .ok_or_else(|| FormatError::parse(line_no, "empty atom record"))?;
                    elements.push(element.to_string());
                }
            }

            frame_offsets.push(frame_start);
        }

        if frame_offsets.is_empty() {
            return Err(FormatError::Empty);
        }

        Ok(Self {
            file,
            num_atoms,
            elements,
            frame_offsets,
        })
    }

    fn parse_frame_at(&mut self, offset: u64, index: usize) -> Result<Frame, FormatError> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(&self.file);

        let mut line = String::new();
        reader.read_line(&mut line)?; // atom count, validated at open
        line.clear();
        reader.read_line(&mut line)?; // comment

        let header = FrameHeader {
            num_atoms: self.num_atoms,
            time: index as f32,
            unit_cell: None,
        };
        let mut frame = Frame::zeroed(header);

        for atom in 0..self.num_atoms {
            line.clear();
            reader.read_line(&mut line)?;
            let mut fields = line.split_whitespace();
            let _element = fields.next();
            let coords: Vec<f32> = fields
                .take(3)
                .map(|f| f.parse::<f32>())
                .collect::<Result<_, _>>()
                .map_err(|_| FormatError::parse(atom + 3, "invalid coordinate"))?;
            if coords.len() != 3 {
                return Err(FormatError::parse(atom + 3, "expected three coordinates"));
            }
            frame.x[atom] = coords[0];
            frame.y[atom] = coords[1];
            frame.z[atom] = coords[2];
        }

        Ok(frame)
    }
}

impl MoleculeReader for XyzFile {
    fn read_molecule(&mut self) -> Result<Molecule, FormatError> {
        let residues = vec![Residue::new("MOL", AtomRange::new(0, self.num_atoms))];
        Ok(Molecule::new(self.elements.clone(), residues, vec![]))
    }
}

impl TrajectoryReader for XyzFile {
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

    fn write_xyz(frames: &[&[(&str, f32, f32, f32)]]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for (i, atoms) in frames.iter().enumerate() {
            writeln!(file, "{}", atoms.len()).unwrap();
            writeln!(file, "frame {}", i).unwrap();
            for (el, x, y, z) in atoms.iter() {
                writeln!(file, "{} {:.4} {:.4} {:.4}", el, x, y, z).unwrap();
            }
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_molecule_and_frames() {
        let file = write_xyz(&[
            &[("O", 0.0, 0.0, 0.0), ("H", 1.0, 0.0, 0.0)],
            &[("O", 0.5, 0.0, 0.0), ("H", 1.5, 0.0, 0.0)],
        ]);

        let mut xyz = XyzFile::open(file.path()).unwrap();
        let mol = xyz.read_molecule().unwrap();
        assert_eq!(mol.atom_count(), 2);
        assert_eq!(mol.elements(), &["O".to_string(), "H".to_string()]);

        assert_eq!(TrajectoryReader::num_frames(&xyz), 2);

        // Random access: read the second frame first.
        let frame1 = xyz.read_frame(1).unwrap();
        assert!((frame1.x[0] - 0.5).abs() < 1e-6);
        let frame0 = xyz.read_frame(0).unwrap();
        assert!((frame0.x[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn atom_count_mismatch_across_frames_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "2\nfirst\nO 0 0 0\nH 1 0 0").unwrap();
        writeln!(file, "1\nsecond\nO 0 0 0").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            XyzFile::open(file.path()),
            Err(FormatError::Inconsistency(_))
        ));
    }

    #[test]
    fn out_of_range_frame_is_reported() {
        let file = write_xyz(&[&[("C", 0.0, 0.0, 0.0)]]);
        let mut xyz = XyzFile::open(file.path()).unwrap();
        assert!(matches!(
            xyz.read_frame(3),
            Err(FormatError::FrameOutOfRange { index: 3, count: 1 })
        ));
    }
}
