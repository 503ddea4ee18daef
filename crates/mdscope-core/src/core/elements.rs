use phf::{Map, phf_map};

/// Standard atomic masses (u) for the elements that commonly occur in
/// molecular-dynamics systems. Keys are canonical element symbols.
static ELEMENT_MASSES: Map<&'static str, f32> = phf_map! {
    "H" => 1.008,
    "He" => 4.0026,
    "Li" => 6.94,
    "Be" => 9.0122,
    "B" => 10.81,
    "C" => 12.011,
    "N" => 14.007,
    "O" => 15.999,
    "F" => 18.998,
    "Ne" => 20.180,
    "Na" => 22.990,
    "Mg" => 24.305,
    "Al" => 26.982,
    "Si" => 28.085,
    "P" => 30.974,
    "S" => 32.06,
    "Cl" => 35.45,
    "Ar" => 39.948,
    "K" => 39.098,
    "Ca" => 40.078,
    "Mn" => 54.938,
    "Fe" => 55.845,
    "Co" => 58.933,
    "Ni" => 58.693,
    "Cu" => 63.546,
    "Zn" => 65.38,
    "Se" => 78.971,
    "Br" => 79.904,
    "I" => 126.904,
};

/// Mass used for atoms whose element could not be identified. A neutral
/// weight keeps unknown atoms from being silently dropped out of
/// mass-weighted averages.
pub const FALLBACK_MASS: f32 = 1.0;

/// Looks up the atomic mass for an element symbol.
///
/// Matching is tolerant of the casing found in common file formats:
/// `"CL"`, `"cl"` and `"Cl"` all resolve to chlorine.
pub fn mass_of(symbol: &str) -> Option<f32> {
    if let Some(&mass) = ELEMENT_MASSES.get(symbol) {
        return Some(mass);
    }
    let canonical = canonical_symbol(symbol)?;
    ELEMENT_MASSES.get(canonical.as_str()).copied()
}

/// Looks up the atomic mass for an element symbol, falling back to
/// [`FALLBACK_MASS`] for unknown symbols.
pub fn mass_or_fallback(symbol: &str) -> f32 {
    mass_of(symbol).unwrap_or(FALLBACK_MASS)
}

fn canonical_symbol(symbol: &str) -> Option<String> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() || trimmed.len() > 2 {
        return None;
    }
    let mut chars = trimmed.chars();
    let first = chars.next()?.to_ascii_uppercase();
    let rest: String = chars.map(|c| c.to_ascii_lowercase()).collect();
    Some(format!("{}{}", first, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_elements_resolve() {
        assert_eq!(mass_of("C"), Some(12.011));
        assert_eq!(mass_of("Cl"), Some(35.45));
    }

    #[test]
    fn casing_is_normalized() {
        assert_eq!(mass_of("CL"), mass_of("Cl"));
        assert_eq!(mass_of("na"), mass_of("Na"));
    }

    #[test]
    fn unknown_symbols_fall_back() {
        assert_eq!(mass_of("Xx"), None);
        assert_eq!(mass_or_fallback("Xx"), FALLBACK_MASS);
    }
}
