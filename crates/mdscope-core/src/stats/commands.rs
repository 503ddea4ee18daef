use super::error::StatsError;
use crate::core::geometry;
use crate::core::models::{AtomRange, Molecule, MoleculeDynamic};
use std::f32::consts::PI;

/// Metadata attached to a property command: the expected value range for
/// normalization, the unit string, and whether the produced quantity wraps
/// around the range boundary (angles wrap at ±π). Plotting and histogram
/// consumers use the periodic flag to bin across the wrap correctly.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub value_range: (f32, f32),
    pub unit: String,
    pub periodic: bool,
}

/// Signature for user-registered property compute callbacks.
///
/// Writes one scalar per trajectory frame into `data` (pre-allocated to the
/// frame count). `args` are the property's tokens after the group binding.
pub type PropertyComputeFn = dyn Fn(&mut [f32], &[&str], &MoleculeDynamic, AtomRange) -> Result<(), StatsError>
    + Send
    + Sync;

/// Signature for user-registered group extract callbacks. Resolves the
/// argument tokens against a molecule into zero or more atom ranges.
pub type GroupExtractFn =
    dyn Fn(&[&str], &Molecule) -> Result<Vec<AtomRange>, StatsError> + Send + Sync;

/// A property compute function: the built-ins are statically dispatched;
/// `Custom` is the extension point for registered callbacks.
pub enum PropertyKind {
    /// Pairwise atomic distance (`dist` / `bond`), two atom-offset args.
    Distance,
    /// Three-atom angle, three atom-offset args.
    Angle,
    /// Four-atom signed dihedral, four atom-offset args.
    Dihedral,
    Custom(Box<PropertyComputeFn>),
}

pub struct PropertyCommand {
    pub kind: PropertyKind,
    pub descriptor: PropertyDescriptor,
}

impl PropertyCommand {
    pub fn compute(
        &self,
        data: &mut [f32],
        args: &[&str],
        dynamic: &MoleculeDynamic,
        range: AtomRange,
    ) -> Result<(), StatsError> {
        match &self.kind {
            PropertyKind::Distance => compute_atomic_distance(data, args, dynamic, range),
            PropertyKind::Angle => compute_atomic_angle(data, args, dynamic, range),
            PropertyKind::Dihedral => compute_atomic_dihedral(data, args, dynamic, range),
            PropertyKind::Custom(f) => f(data, args, dynamic, range),
        }
    }
}

/// A group extract function; `Custom` mirrors [`PropertyKind::Custom`].
pub enum GroupKind {
    /// Match residues by name against the argument list (`resname`).
    ResName,
    Custom(Box<GroupExtractFn>),
}

impl GroupKind {
    pub fn extract(&self, args: &[&str], molecule: &Molecule) -> Result<Vec<AtomRange>, StatsError> {
        match self {
            GroupKind::ResName => match_by_resname(args, molecule),
            GroupKind::Custom(f) => f(args, molecule),
        }
    }
}

/// Built-in property commands with their descriptors, in registration
/// order.
pub fn builtin_property_commands() -> Vec<(&'static str, PropertyCommand)> {
    fn distance_command() -> PropertyCommand {
        PropertyCommand {
            kind: PropertyKind::Distance,
            descriptor: PropertyDescriptor {
                value_range: (0.0, f32::MAX),
                unit: "Å".to_string(),
                periodic: false,
            },
        }
    }
    vec![
        ("dist", distance_command()),
        ("bond", distance_command()),
        (
            "angle",
            PropertyCommand {
                kind: PropertyKind::Angle,
                descriptor: PropertyDescriptor {
                    value_range: (0.0, PI),
                    unit: "rad".to_string(),
                    periodic: true,
                },
            },
        ),
        (
            "dihedral",
            PropertyCommand {
                kind: PropertyKind::Dihedral,
                descriptor: PropertyDescriptor {
                    value_range: (-PI, PI),
                    unit: "rad".to_string(),
                    periodic: true,
                },
            },
        ),
    ]
}

pub fn builtin_group_commands() -> Vec<(&'static str, GroupKind)> {
    vec![("resname", GroupKind::ResName)]
}

/// Resolves `N` atom-offset arguments relative to a structure range,
/// validating arity, emptiness and bounds.
fn atom_offsets<const N: usize>(
    args: &[&str],
    range: AtomRange,
) -> Result<[usize; N], StatsError> {
    if args.len() != N {
        return Err(StatsError::ArityMismatch {
            expected: N,
            got: args.len(),
        });
    }
    if range.is_empty() {
        return Err(StatsError::EmptyStructure);
    }
    let mut atoms = [0usize; N];
    for (slot, arg) in atoms.iter_mut().zip(args) {
        let offset: usize = arg.parse().map_err(|_| StatsError::InvalidArgument {
            value: arg.to_string(),
        })?;
        if offset >= range.len() {
            return Err(StatsError::OffsetOutOfRange {
                offset,
                len: range.len(),
            });
        }
        *slot = range.beg + offset;
    }
    Ok(atoms)
}

fn compute_atomic_distance(
    data: &mut [f32],
    args: &[&str],
    dynamic: &MoleculeDynamic,
    range: AtomRange,
) -> Result<(), StatsError> {
    let [a, b] = atom_offsets::<2>(args, range)?;
    for (frame, out) in data.iter_mut().enumerate() {
        let pos_a = dynamic.trajectory.position(frame, a);
        let pos_b = dynamic.trajectory.position(frame, b);
        *out = geometry::distance(pos_a, pos_b);
    }
    Ok(())
}

fn compute_atomic_angle(
    data: &mut [f32],
    args: &[&str],
    dynamic: &MoleculeDynamic,
    range: AtomRange,
) -> Result<(), StatsError> {
    let [a, b, c] = atom_offsets::<3>(args, range)?;
    for (frame, out) in data.iter_mut().enumerate() {
        let pos_a = dynamic.trajectory.position(frame, a);
        let pos_b = dynamic.trajectory.position(frame, b);
        let pos_c = dynamic.trajectory.position(frame, c);
        *out = geometry::angle(pos_a, pos_b, pos_c);
    }
    Ok(())
}

fn compute_atomic_dihedral(
    data: &mut [f32],
    args: &[&str],
    dynamic: &MoleculeDynamic,
    range: AtomRange,
) -> Result<(), StatsError> {
    let [a, b, c, d] = atom_offsets::<4>(args, range)?;
    for (frame, out) in data.iter_mut().enumerate() {
        let pos_a = dynamic.trajectory.position(frame, a);
        let pos_b = dynamic.trajectory.position(frame, b);
        let pos_c = dynamic.trajectory.position(frame, c);
        let pos_d = dynamic.trajectory.position(frame, d);
        *out = geometry::dihedral(pos_a, pos_b, pos_c, pos_d);
    }
    Ok(())
}

fn match_by_resname(args: &[&str], molecule: &Molecule) -> Result<Vec<AtomRange>, StatsError> {
    if args.is_empty() {
        return Err(StatsError::MissingArguments);
    }
    Ok(molecule
        .residues()
        .iter()
        .filter(|res| args.iter().any(|arg| *arg == res.name))
        .map(|res| res.atoms)
        .collect())
}
