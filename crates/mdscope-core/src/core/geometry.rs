use super::models::{AtomRange, UnitCell};
use nalgebra::{Point3, Vector3};

/// Euclidean distance between two atom positions.
pub fn distance(a: Point3<f32>, b: Point3<f32>) -> f32 {
    (a - b).norm()
}

/// Unsigned angle (radians, in `[0, pi]`) between the vectors `a - b` and
/// `c - b`.
pub fn angle(a: Point3<f32>, b: Point3<f32>, c: Point3<f32>) -> f32 {
    let u = a - b;
    let v = c - b;
    let denom = u.norm() * v.norm();
    if denom == 0.0 {
        return 0.0;
    }
    (u.dot(&v) / denom).clamp(-1.0, 1.0).acos()
}

/// Signed dihedral angle (radians, in `(-pi, pi]`) between the plane spanned
/// by `a, b, c` and the plane spanned by `b, c, d`.
pub fn dihedral(a: Point3<f32>, b: Point3<f32>, c: Point3<f32>, d: Point3<f32>) -> f32 {
    let b1 = b - a;
    let b2 = c - b;
    let b3 = d - c;

    let n1 = b1.cross(&b2);
    let n2 = b2.cross(&b3);
    let m = n1.cross(&b2.normalize());

    let x = n1.dot(&n2);
    let y = m.dot(&n2);
    y.atan2(x)
}

/// Mass-weighted center of the atoms selected by `indices`.
///
/// Returns the origin for an empty selection or zero total mass.
pub fn center_of_mass(
    x: &[f32],
    y: &[f32],
    z: &[f32],
    masses: &[f32],
    indices: &[u32],
) -> Vector3<f32> {
    let mut acc = Vector3::zeros();
    let mut total_mass = 0.0f32;
    for &i in indices {
        let i = i as usize;
        let m = masses[i];
        acc += Vector3::new(x[i], y[i], z[i]) * m;
        total_mass += m;
    }
    if total_mass == 0.0 {
        return Vector3::zeros();
    }
    acc / total_mass
}

/// Mass-weighted center of the selected atoms in a periodic box.
///
/// Positions are de-periodized relative to the first selected atom via the
/// minimum-image convention before averaging, so a selection that wraps
/// across the boundary yields its physical center rather than a point in the
/// middle of the box. The result is wrapped back into `[0, extent)`.
pub fn center_of_mass_periodic(
    x: &[f32],
    y: &[f32],
    z: &[f32],
    masses: &[f32],
    indices: &[u32],
    cell: &UnitCell,
) -> Vector3<f32> {
    let Some(&first) = indices.first() else {
        return Vector3::zeros();
    };
    let ext = cell.extent();
    let reference = Vector3::new(x[first as usize], y[first as usize], z[first as usize]);

    let mut acc = Vector3::zeros();
    let mut total_mass = 0.0f32;
    for &i in indices {
        let i = i as usize;
        let m = masses[i];
        let delta = minimum_image(Vector3::new(x[i], y[i], z[i]) - reference, ext);
        acc += delta * m;
        total_mass += m;
    }
    if total_mass == 0.0 {
        return reference;
    }
    wrap_into_extent(reference + acc / total_mass, ext)
}

/// Shifts a displacement vector into the minimum-image representation for a
/// box of the given extent.
pub fn minimum_image(mut delta: Vector3<f32>, extent: Vector3<f32>) -> Vector3<f32> {
    for axis in 0..3 {
        let e = extent[axis];
        if e > 0.0 {
            delta[axis] -= e * (delta[axis] / e).round();
        }
    }
    delta
}

/// Wraps a position into `[0, extent)` along each axis.
pub fn wrap_into_extent(mut pos: Vector3<f32>, extent: Vector3<f32>) -> Vector3<f32> {
    for axis in 0..3 {
        let e = extent[axis];
        if e > 0.0 {
            pos[axis] -= e * (pos[axis] / e).floor();
        }
    }
    pos
}

/// Rigidly translates every coordinate by `delta`.
pub fn translate(x: &mut [f32], y: &mut [f32], z: &mut [f32], delta: Vector3<f32>) {
    for v in x.iter_mut() {
        *v += delta.x;
    }
    for v in y.iter_mut() {
        *v += delta.y;
    }
    for v in z.iter_mut() {
        *v += delta.z;
    }
}

/// Rewraps every structure so its atoms sit in the same periodic image.
///
/// Each structure's atoms are folded to the minimum image around the
/// structure's own mass-weighted center, which keeps bonded units whole
/// across the box boundary.
pub fn deperiodize_structures(
    x: &mut [f32],
    y: &mut [f32],
    z: &mut [f32],
    masses: &[f32],
    structures: &[AtomRange],
    cell: &UnitCell,
) {
    let ext = cell.extent();
    for range in structures {
        if range.is_empty() {
            continue;
        }
        let indices: Vec<u32> = range.iter().map(|i| i as u32).collect();
        let com = center_of_mass_periodic(x, y, z, masses, &indices, cell);
        for i in range.iter() {
            let pos = Vector3::new(x[i], y[i], z[i]);
            let folded = com + minimum_image(pos - com, ext);
            x[i] = folded.x;
            y[i] = folded.y;
            z[i] = folded.z;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    const EPS: f32 = 1e-4;

    #[test]
    fn distance_is_euclidean() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(3.0, 4.0, 0.0);
        assert!((distance(a, b) - 5.0).abs() < EPS);
    }

    #[test]
    fn right_angle() {
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(0.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        assert!((angle(a, b, c) - FRAC_PI_2).abs() < EPS);
    }

    #[test]
    fn straight_angle() {
        let a = Point3::new(-1.0, 0.0, 0.0);
        let b = Point3::new(0.0, 0.0, 0.0);
        let c = Point3::new(1.0, 0.0, 0.0);
        assert!((angle(a, b, c) - PI).abs() < EPS);
    }

    #[test]
    fn dihedral_signs() {
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(0.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);

        // d rotated +90 degrees out of the abc plane
        let d_up = Point3::new(0.0, 1.0, 1.0);
        let d_down = Point3::new(0.0, 1.0, -1.0);

        let up = dihedral(a, b, c, d_up);
        let down = dihedral(a, b, c, d_down);
        assert!((up.abs() - FRAC_PI_2).abs() < EPS);
        assert!((up + down).abs() < EPS, "opposite rotations mirror the sign");
    }

    #[test]
    fn cis_dihedral_is_zero() {
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(0.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let d = Point3::new(1.0, 1.0, 0.0);
        assert!(dihedral(a, b, c, d).abs() < EPS);
    }

    #[test]
    fn com_weighs_by_mass() {
        let x = [0.0, 1.0];
        let y = [0.0, 0.0];
        let z = [0.0, 0.0];
        let masses = [1.0, 3.0];
        let com = center_of_mass(&x, &y, &z, &masses, &[0, 1]);
        assert!((com.x - 0.75).abs() < EPS);
    }

    #[test]
    fn periodic_com_handles_wrap_around() {
        // Two equal-mass atoms on either side of the boundary of a 10-unit
        // box: the physical center sits on the boundary, not at box center.
        let x = [0.5, 9.5];
        let y = [0.0, 0.0];
        let z = [0.0, 0.0];
        let masses = [1.0, 1.0];
        let cell = UnitCell::orthorhombic(10.0, 10.0, 10.0);
        let com = center_of_mass_periodic(&x, &y, &z, &masses, &[0, 1], &cell);
        assert!(com.x.min((com.x - 10.0).abs()) < EPS, "com.x = {}", com.x);
    }

    #[test]
    fn deperiodize_reunites_split_structure() {
        let cell = UnitCell::orthorhombic(10.0, 10.0, 10.0);
        let mut x = [9.8, 0.2];
        let mut y = [0.0, 0.0];
        let mut z = [0.0, 0.0];
        let masses = [1.0, 1.0];
        let structures = [AtomRange::new(0, 2)];

        deperiodize_structures(&mut x, &mut y, &mut z, &masses, &structures, &cell);

        let span = (x[0] - x[1]).abs();
        assert!(span < 1.0, "atoms should end up adjacent, span = {}", span);
    }
}
