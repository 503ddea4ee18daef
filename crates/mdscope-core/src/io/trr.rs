use super::traits::{FormatError, TrajectoryReader};
use crate::core::models::{Frame, FrameHeader, UnitCell};
use nalgebra::Matrix3;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const TRR_MAGIC: i32 = 1993;

/// Conversion from the TRR format's nanometers to ångström.
const NM_TO_ANGSTROM: f32 = 10.0;

/// GROMACS TRR reader; trajectory only.
///
/// TRR is a sequence of XDR-encoded frame records, each carrying a header of
/// section byte-sizes followed by the sections themselves (box, virial,
/// pressure, positions, velocities, forces). Only the box and position
/// sections are decoded; frames without a position section are skipped.
/// Frame byte offsets are indexed at open time.
pub struct TrrFile {
    file: File,
    num_atoms: usize,
    frame_offsets: Vec<u64>,
}

#[derive(Debug, Clone, Copy)]
struct TrrFrameHeader {
    box_size: usize,
    vir_size: usize,
    pres_size: usize,
    x_size: usize,
    v_size: usize,
    f_size: usize,
    num_atoms: usize,
    time: f32,
    /// True when reals in this frame are 8 bytes wide.
    double: bool,
}

impl TrrFrameHeader {
    fn payload_size(&self) -> u64 {
        (self.box_size + self.vir_size + self.pres_size + self.x_size + self.v_size + self.f_size)
            as u64
    }
}

struct Xdr<R> {
    inner: R,
}

impl<R: Read + Seek> Xdr<R> {
    fn new(inner: R) -> Self {
        Self { inner }
    }

    fn offset(&mut self) -> u64 {
        self.inner.stream_position().unwrap_or(0)
    }

    fn read_i32(&mut self) -> std::io::Result<i32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn read_f32(&mut self) -> std::io::Result<f32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(f32::from_be_bytes(buf))
    }

    fn read_f64(&mut self) -> std::io::Result<f64> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf)?;
        Ok(f64::from_be_bytes(buf))
    }

    fn read_real(&mut self, double: bool) -> std::io::Result<f32> {
        if double {
            Ok(self.read_f64()? as f32)
        } else {
            self.read_f32()
        }
    }

    fn skip(&mut self, bytes: u64) -> std::io::Result<()> {
        self.inner.seek(SeekFrom::Current(bytes as i64))?;
        Ok(())
    }

    /// Skips an XDR string: a length word followed by the bytes padded to a
    /// four-byte boundary.
    fn skip_string(&mut self) -> std::io::Result<()> {
        let len = self.read_i32()?.max(0) as u64;
        self.skip(len.div_ceil(4) * 4)
    }
}

fn size_error(offset: u64, what: &str) -> FormatError {
    FormatError::Binary {
        offset,
        message: format!("negative section size for {what}"),
    }
}

/// Reads one frame header starting at the reader's current position.
/// Returns `Ok(None)` at a clean end of file.
fn read_frame_header<R: Read + Seek>(
    xdr: &mut Xdr<R>,
) -> Result<Option<TrrFrameHeader>, FormatError> {
    let header_offset = xdr.offset();
    let magic = match xdr.read_i32() {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if magic != TRR_MAGIC {
        return Err(FormatError::Binary {
            offset: header_offset,
            message: format!("bad magic number {magic:#x}"),
        });
    }
    xdr.skip_string()?;

    let mut sizes = [0i64; 10];
    for size in sizes.iter_mut() {
        let v = xdr.read_i32()?;
        if v < 0 {
            return Err(size_error(header_offset, "frame section"));
        }
        *size = v as i64;
    }
    let [ir_size, e_size, box_size, vir_size, pres_size, top_size, sym_size, x_size, v_size, f_size] =
        sizes.map(|s| s as usize);

    if ir_size + e_size + top_size + sym_size != 0 {
        return Err(FormatError::Binary {
            offset: header_offset,
            message: "legacy TRR sections are not supported".to_string(),
        });
    }

    let num_atoms = xdr.read_i32()?.max(0) as usize;
    let _step = xdr.read_i32()?;
    let _nre = xdr.read_i32()?;

    let double = if x_size > 0 && num_atoms > 0 {
        x_size == num_atoms * 3 * 8
    } else {
        box_size == 9 * 8
    };

    let time = xdr.read_real(double)?;
    let _lambda = xdr.read_real(double)?;

    Ok(Some(TrrFrameHeader {
        box_size,
        vir_size,
        pres_size,
        x_size,
        v_size,
        f_size,
        num_atoms,
        time,
        double,
    }))
}

impl TrrFile {
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        let mut xdr = Xdr::new(BufReader::new(&file));

        let mut num_atoms = 0usize;
        let mut frame_offsets = Vec::new();

        loop {
            let frame_start = xdr.offset();
            let Some(header) = read_frame_header(&mut xdr)? else {
                break;
            };

            if header.x_size > 0 {
                if frame_offsets.is_empty() {
                    num_atoms = header.num_atoms;
                } else if header.num_atoms != num_atoms {
                    return Err(FormatError::Inconsistency(format!(
                        "frame {} has {} atoms, expected {}",
                        frame_offsets.len(),
                        header.num_atoms,
                        num_atoms
                    )));
                }
                frame_offsets.push(frame_start);
            }

            xdr.skip(header.payload_size())?;
        }

        if frame_offsets.is_empty() {
            return Err(FormatError::Empty);
        }

        Ok(Self {
            file,
            num_atoms,
            frame_offsets,
        })
    }

    fn parse_frame_at(&mut self, offset: u64) -> Result<Frame, FormatError> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut xdr = Xdr::new(BufReader::new(&self.file));

        let header = read_frame_header(&mut xdr)?.ok_or(FormatError::Binary {
            offset,
            message: "unexpected end of file".to_string(),
        })?;

        let unit_cell = if header.box_size > 0 {
            let mut values = [0.0f32; 9];
            for v in values.iter_mut() {
                *v = xdr.read_real(header.double)? * NM_TO_ANGSTROM;
            }
            // Rows in file order are the box vectors.
            #[rustfmt::skip]
            let basis = Matrix3::new(
                values[0], values[3], values[6],
                values[1], values[4], values[7],
                values[2], values[5], values[8],
            );
            Some(UnitCell::from_basis(basis))
        } else {
            None
        };

        xdr.skip((header.vir_size + header.pres_size) as u64)?;

        let num_atoms = header.num_atoms;
        let mut frame = Frame::zeroed(FrameHeader {
            num_atoms,
            time: header.time,
            unit_cell,
        });
        for atom in 0..num_atoms {
            frame.x[atom] = xdr.read_real(header.double)? * NM_TO_ANGSTROM;
            frame.y[atom] = xdr.read_real(header.double)? * NM_TO_ANGSTROM;
            frame.z[atom] = xdr.read_real(header.double)? * NM_TO_ANGSTROM;
        }

        Ok(frame)
    }
}

impl TrajectoryReader for TrrFile {
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
        self.parse_frame_at(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct TrrWriter {
        bytes: Vec<u8>,
    }

    impl TrrWriter {
        fn new() -> Self {
            Self { bytes: Vec::new() }
        }

        fn put_i32(&mut self, v: i32) {
            self.bytes.extend_from_slice(&v.to_be_bytes());
        }

        fn put_f32(&mut self, v: f32) {
            self.bytes.extend_from_slice(&v.to_be_bytes());
        }

        fn put_frame(&mut self, time: f32, box_nm: Option<f32>, positions_nm: &[[f32; 3]]) {
            let num_atoms = positions_nm.len();
            let box_size = if box_nm.is_some() { 9 * 4 } else { 0 };

            self.put_i32(TRR_MAGIC);
            // Version string "GMX_trn_file\0", XDR-padded.
            let version = b"GMX_trn_file\0";
            self.put_i32(version.len() as i32);
            self.bytes.extend_from_slice(version);
            while self.bytes.len() % 4 != 0 {
                self.bytes.push(0);
            }

            for size in [
                0,                         // ir
                0,                         // e
                box_size,                  // box
                0,                         // vir
                0,                         // pres
                0,                         // top
                0,                         // sym
                (num_atoms * 3 * 4) as i32, // x
                0,                         // v
                0,                         // f
            ] {
                self.put_i32(size);
            }
            self.put_i32(num_atoms as i32);
            self.put_i32(0); // step
            self.put_i32(0); // nre
            self.put_f32(time);
            self.put_f32(0.0); // lambda

            if let Some(extent) = box_nm {
                for (row, col) in (0..3).flat_map(|r| (0..3).map(move |c| (r, c))) {
                    self.put_f32(if row == col { extent } else { 0.0 });
                }
            }
            for pos in positions_nm {
                for &coord in pos {
                    self.put_f32(coord);
                }
            }
        }

        fn into_file(self) -> NamedTempFile {
            let mut file = NamedTempFile::new().unwrap();
            file.write_all(&self.bytes).unwrap();
            file.flush().unwrap();
            file
        }
    }

    #[test]
    fn reads_frames_with_box_and_units() {
        let mut writer = TrrWriter::new();
        writer.put_frame(0.0, Some(2.0), &[[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]);
        writer.put_frame(10.0, Some(2.0), &[[0.2, 0.2, 0.3], [0.5, 0.5, 0.6]]);
        let file = writer.into_file();

        let mut trr = TrrFile::open(file.path()).unwrap();
        assert_eq!(TrajectoryReader::num_atoms(&trr), 2);
        assert_eq!(TrajectoryReader::num_frames(&trr), 2);

        let frame1 = trr.read_frame(1).unwrap();
        assert!((frame1.header.time - 10.0).abs() < 1e-6);
        // 0.2 nm -> 2.0 angstrom
        assert!((frame1.x[0] - 2.0).abs() < 1e-4);
        let cell = frame1.header.unit_cell.expect("box present");
        assert!((cell.extent().x - 20.0).abs() < 1e-4);

        let frame0 = trr.read_frame(0).unwrap();
        assert!((frame0.x[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn frame_without_box_has_no_cell() {
        let mut writer = TrrWriter::new();
        writer.put_frame(0.0, None, &[[0.1, 0.2, 0.3]]);
        let file = writer.into_file();

        let mut trr = TrrFile::open(file.path()).unwrap();
        let frame = trr.read_frame(0).unwrap();
        assert!(frame.header.unit_cell.is_none());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&42i32.to_be_bytes()).unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        file.flush().unwrap();

        assert!(matches!(
            TrrFile::open(file.path()),
            Err(FormatError::Binary { .. })
        ));
    }
}
