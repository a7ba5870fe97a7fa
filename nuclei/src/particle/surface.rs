//! Isosurface area of a 3D occupancy mask.
//!
//! The mask is padded by one background voxel and contoured at level 0 with
//! marching tetrahedra: every grid cube is split into the six tetrahedra
//! sharing its main diagonal, and each tetrahedron crossing the level
//! contributes one triangle or a two-triangle quad. Vertex positions are
//! voxel centers scaled by the aspect ratio.
//!
//! Background samples sit exactly on the level, so the surface runs through
//! the centers of the first background shell. Tetrahedra with two or three
//! foreground corners then meet it only along an edge or at a vertex and add
//! no area.

use itertools::Itertools;
use ndarray::{Array3, ArrayViewD, Ix3};

use crate::image_proc::morphology::pad;

const ISO_LEVEL: f64 = 0.0;

type Point = [f64; 3];

/// Total triangle area of the level-0 surface of `mask`, which must be 3D.
/// Returns 0 for any other rank.
pub fn isosurface_area(mask: &ArrayViewD<bool>, aspect: &[f64]) -> f64 {
    if mask.ndim() != 3 || aspect.len() != 3 {
        return 0.0;
    }
    let padded = pad(mask, 1, false);
    let field = match padded.into_dimensionality::<Ix3>() {
        Ok(field) => field.mapv(|v| if v { 1.0 } else { 0.0 }),
        Err(_) => return 0.0,
    };
    let scale = [aspect[0], aspect[1], aspect[2]];
    let tetrahedra = kuhn_tetrahedra();

    let (nz, ny, nx) = field.dim();
    let mut area = 0.0;
    for z in 0..nz - 1 {
        for y in 0..ny - 1 {
            for x in 0..nx - 1 {
                let corners = cube_corners(&field, [z, y, x], scale);
                if corners.iter().all(|c| c.1 > ISO_LEVEL)
                    || corners.iter().all(|c| c.1 <= ISO_LEVEL)
                {
                    continue;
                }
                for tet in &tetrahedra {
                    area += tetrahedron_area(tet.map(|i| corners[i]));
                }
            }
        }
    }
    area
}

/// Corner indices of the six tetrahedra around the cube diagonal 0 -> 7.
/// Corner `i` sits at offset `(i >> 2 & 1, i >> 1 & 1, i & 1)`.
fn kuhn_tetrahedra() -> Vec<[usize; 4]> {
    [4usize, 2, 1]
        .into_iter()
        .permutations(3)
        .map(|steps| [0, steps[0], steps[0] + steps[1], 7])
        .collect()
}

fn cube_corners(field: &Array3<f64>, origin: [usize; 3], scale: [f64; 3]) -> [(Point, f64); 8] {
    std::array::from_fn(|i| {
        let offset = [i >> 2 & 1, i >> 1 & 1, i & 1];
        let index = [
            origin[0] + offset[0],
            origin[1] + offset[1],
            origin[2] + offset[2],
        ];
        let point = [
            index[0] as f64 * scale[0],
            index[1] as f64 * scale[1],
            index[2] as f64 * scale[2],
        ];
        (point, field[index])
    })
}

fn tetrahedron_area(vertices: [(Point, f64); 4]) -> f64 {
    let (inside, outside): (Vec<_>, Vec<_>) = vertices.iter().partition(|v| v.1 > ISO_LEVEL);
    match (inside.len(), outside.len()) {
        (1, 3) => {
            let a = inside[0];
            triangle_area(
                crossing(a, outside[0]),
                crossing(a, outside[1]),
                crossing(a, outside[2]),
            )
        }
        (3, 1) => {
            let d = outside[0];
            triangle_area(
                crossing(inside[0], d),
                crossing(inside[1], d),
                crossing(inside[2], d),
            )
        }
        (2, 2) => {
            let (a, b) = (inside[0], inside[1]);
            let (c, d) = (outside[0], outside[1]);
            let ac = crossing(a, c);
            let ad = crossing(a, d);
            let bd = crossing(b, d);
            let bc = crossing(b, c);
            triangle_area(ac, ad, bd) + triangle_area(ac, bd, bc)
        }
        _ => 0.0,
    }
}

/// Point where the level is crossed on the edge between `a` and `b`.
fn crossing(a: &(Point, f64), b: &(Point, f64)) -> Point {
    let t = (ISO_LEVEL - a.1) / (b.1 - a.1);
    [
        a.0[0] + t * (b.0[0] - a.0[0]),
        a.0[1] + t * (b.0[1] - a.0[1]),
        a.0[2] + t * (b.0[2] - a.0[2]),
    ]
}

fn triangle_area(a: Point, b: Point, c: Point) -> f64 {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let cross = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    0.5 * (cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2]).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::AxesOrder;
    use crate::particle::{BoundingRegion, Particle};
    use approx::assert_relative_eq;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_six_tetrahedra_span_diagonal() {
        let tets = kuhn_tetrahedra();
        assert_eq!(tets.len(), 6);
        assert!(tets.iter().all(|t| t[0] == 0 && t[3] == 7));
    }

    #[test]
    fn test_area_scales_with_aspect() {
        let mask = ArrayD::from_elem(IxDyn(&[3, 3, 3]), true);
        let unit = isosurface_area(&mask.view(), &[1.0, 1.0, 1.0]);
        let doubled = isosurface_area(&mask.view(), &[2.0, 2.0, 2.0]);
        assert_relative_eq!(doubled, 4.0 * unit, max_relative = 1e-12);
    }

    #[test]
    fn test_empty_and_planar_masks() {
        let empty = ArrayD::from_elem(IxDyn(&[2, 2, 2]), false);
        assert_eq!(isosurface_area(&empty.view(), &[1.0; 3]), 0.0);
        let planar = ArrayD::from_elem(IxDyn(&[2, 2]), true);
        assert_eq!(isosurface_area(&planar.view(), &[1.0; 2]), 0.0);
    }

    #[test]
    fn test_ball_surface_follows_first_background_shell() {
        let r = 8.0;
        let mask = test_helpers::ball((19, 19, 19), [9.0, 9.0, 9.0], r).into_dyn();
        let area = isosurface_area(&mask.view(), &[1.0; 3]);
        // Between the sphere through the shell and 25% above it.
        let shell = 4.0 * std::f64::consts::PI * (r + 1.0).powi(2);
        assert!(area > shell && area < 1.25 * shell, "{area} vs {shell}");

        let region = BoundingRegion::new(vec![0..19, 0..19, 0..19], vec![19, 19, 19]).unwrap();
        let particle = Particle::new(mask, region, AxesOrder::parse("ZYX").unwrap(), 1).unwrap();
        let descriptor = particle.shape_descriptor();
        assert!(descriptor > 0.6 && descriptor <= 1.0, "{descriptor}");
    }

    #[test]
    fn test_single_voxel_is_closed_polytope() {
        let mask = ArrayD::from_elem(IxDyn(&[1, 1, 1]), true);
        let area = isosurface_area(&mask.view(), &[1.0; 3]);
        // The surface passes through neighbors at unit distance, so it lies
        // between the inscribed octahedron and the enclosing 2x2x2 cube.
        assert!(area > 4.0 * 3f64.sqrt() - 1e-9, "{area}");
        assert!(area <= 24.0 + 1e-9, "{area}");
    }
}
