use super::traits::{FormatError, MoleculeReader};
use crate::core::models::{AtomRange, Molecule, Residue};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Minimal mmCIF reader; molecule only.
///
/// Parses the `_atom_site` loop: element symbol, residue name and sequence
/// id. Everything else in the file is ignored.
pub struct CifFile {
    elements: Vec<String>,
    residues: Vec<Residue>,
}

#[derive(Default)]
struct AtomSiteBuilder {
    elements: Vec<String>,
    residues: Vec<Residue>,
    current_residue: Option<(String, String)>,
}

impl AtomSiteBuilder {
    fn push_row(&mut self, headers: &[String], row: &str, line_no: usize) -> Result<(), FormatError> {
        let fields: Vec<&str> = row.split_whitespace().collect();
        if fields.len() != headers.len() {
            return Err(FormatError::parse(
                line_no,
                "atom_site row does not match header count",
            ));
        }
        let get = |name: &str| headers.iter().position(|h| h == name).map(|i| fields[i]);

        let element = get("type_symbol").unwrap_or("").to_string();
        let res_name = get("label_comp_id")
            .or_else(|| get("auth_comp_id"))
            .unwrap_or("UNK")
            .to_string();
        let res_seq = get("label_seq_id")
            .or_else(|| get("auth_seq_id"))
            .unwrap_or(".")
            .to_string();

        let atom_idx = self.elements.len();
        self.elements.push(element);

        let key = (res_name.clone(), res_seq);
        if self.current_residue.as_ref() != Some(&key) {
            self.residues
                .push(Residue::new(res_name, AtomRange::new(atom_idx, atom_idx + 1)));
            self.current_residue = Some(key);
        } else if let Some(last) = self.residues.last_mut() {
            last.atoms.end = atom_idx + 1;
        }
        Ok(())
    }
}

impl CifFile {
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut headers: Vec<String> = Vec::new();
        let mut in_atom_site = false;
        let mut builder = AtomSiteBuilder::default();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();

            if let Some(tag) = trimmed.strip_prefix("_atom_site.") {
                in_atom_site = true;
                headers.push(tag.to_string());
                continue;
            }

            if !in_atom_site {
                continue;
            }

            let terminates_loop = trimmed.is_empty()
                || trimmed.starts_with('_')
                || trimmed.starts_with("loop_")
                || trimmed.starts_with('#');
            if terminates_loop {
                if !builder.elements.is_empty() {
                    break;
                }
                // Header block interrupted before any data row.
                in_atom_site = false;
                headers.clear();
                continue;
            }

            builder.push_row(&headers, trimmed, line_no + 1)?;
        }

        if builder.elements.is_empty() {
            return Err(FormatError::Empty);
        }

        Ok(Self {
            elements: builder.elements,
            residues: builder.residues,
        })
    }
}

impl MoleculeReader for CifFile {
    fn read_molecule(&mut self) -> Result<Molecule, FormatError> {
        Ok(Molecule::new(
            self.elements.clone(),
            self.residues.clone(),
            vec![],
        ))
    }
}
