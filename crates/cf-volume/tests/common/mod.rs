//! Procedural volumes shared by the integration tests.
//!
//! Unless noted otherwise every volume covers [0, 1]³ and holds
//! f(x, y, z) = z, so a ray along +z entering at z = 0 for t = 1 crosses
//! isovalue v at t = 1 + v.

#![allow(dead_code, clippy::cast_precision_loss, clippy::unwrap_used)]

use std::sync::Arc;

use cf_volume::{
    AmrBlock, AmrVolume, Attribute, Cell, CellCoord, LEAF_SIZE, ParticleVolume, Sampler,
    SparseHierarchicalVolume, StructuredRegularVolume, StructuredSphericalVolume,
    UnstructuredVolume, Volume,
};
use nalgebra::{Point3, Vector3};

/// Commits a volume and wraps it in a sampler.
pub fn sampler(volume: impl Into<Volume>) -> Sampler {
    let mut volume = volume.into();
    volume.commit().unwrap();
    Sampler::new(Arc::new(volume)).unwrap()
}

/// `n`³ vertices over [0, 1]³.
pub fn structured(n: usize) -> StructuredRegularVolume {
    let h = 1.0 / (n - 1) as f64;
    let mut data = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for _ in 0..n * n {
            data.push(z as f64 * h);
        }
    }
    let mut grid = StructuredRegularVolume::new([n, n, n]);
    grid.set_grid_spacing(Vector3::repeat(h));
    grid.add_attribute(Attribute::new("z", data));
    grid
}

/// Spherical shell of radius 1 to 2 around the origin holding f = r.
pub fn spherical(n: usize) -> StructuredSphericalVolume {
    let step = 1.0 / (n - 1) as f64;
    let mut data = Vec::with_capacity(n * n * n);
    for _ in 0..n * n {
        for r in 0..n {
            data.push(1.0 + r as f64 * step);
        }
    }
    let mut shell = StructuredSphericalVolume::new([n, n, n]);
    shell.set_grid_origin(Vector3::new(1.0, 0.0, 0.0));
    shell.set_grid_spacing(Vector3::new(step, 180.0 * step, 360.0 * step));
    shell.add_attribute(Attribute::new("r", data));
    shell
}

/// `k`³ axis-aligned hexahedra with vertex values.
pub fn unstructured(k: usize) -> UnstructuredVolume {
    let n = k + 1;
    let h = 1.0 / k as f64;
    let mut vertices = Vec::with_capacity(n * n * n);
    let mut values = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                vertices.push(Point3::new(x as f64 * h, y as f64 * h, z as f64 * h));
                values.push(z as f64 * h);
            }
        }
    }
    let mut mesh = UnstructuredVolume::new(vertices);
    #[allow(clippy::cast_possible_truncation)]
    let index = |x: usize, y: usize, z: usize| ((z * n + y) * n + x) as u32;
    for z in 0..k {
        for y in 0..k {
            for x in 0..k {
                mesh.add_cell(Cell::Hexahedron([
                    index(x, y, z),
                    index(x + 1, y, z),
                    index(x + 1, y + 1, z),
                    index(x, y + 1, z),
                    index(x, y, z + 1),
                    index(x + 1, y, z + 1),
                    index(x + 1, y + 1, z + 1),
                    index(x, y + 1, z + 1),
                ]));
            }
        }
    }
    mesh.add_attribute(Attribute::new("z", values));
    mesh
}

/// One level-0 block of `n`³ cells plus a level-1 block refining the lower
/// octant; cell-centred values.
pub fn amr(n: usize) -> AmrVolume {
    let h = 1.0 / n as f64;
    let block = |level: usize, cells: usize, size: f64| {
        let mut data = Vec::with_capacity(cells * cells * cells);
        for z in 0..cells {
            for _ in 0..cells * cells {
                data.push((z as f64 + 0.5) * size);
            }
        }
        AmrBlock::new(level, CellCoord::splat(0), [cells, cells, cells], data)
    };
    let mut volume = AmrVolume::new(vec![1.0, 0.5]);
    volume.set_grid_spacing(Vector3::repeat(h));
    volume.add_block(block(0, n, h));
    volume.add_block(block(1, n, 0.5 * h));
    volume
}

/// Two-by-two-by-two leaves of 8³ voxels with spacing 1/16.
pub fn sparse() -> SparseHierarchicalVolume {
    let voxels = 2 * LEAF_SIZE;
    let h = 1.0 / voxels as f64;
    let mut grid = SparseHierarchicalVolume::new(1);
    grid.set_spacing(Vector3::repeat(h));
    for lz in 0..2_i32 {
        for ly in 0..2_i32 {
            for lx in 0..2_i32 {
                let mut data = Vec::with_capacity(LEAF_SIZE * LEAF_SIZE * LEAF_SIZE);
                for z in 0..LEAF_SIZE {
                    for _ in 0..LEAF_SIZE * LEAF_SIZE {
                        data.push((f64::from(lz) * LEAF_SIZE as f64 + z as f64 + 0.5) * h);
                    }
                }
                grid.add_leaf(CellCoord::new(lx, ly, lz).shl(3), vec![data]);
            }
        }
    }
    grid
}

/// A single unit-weight particle at the centre of [0, 1]³.
pub fn particle(radius: f64) -> ParticleVolume {
    ParticleVolume::new(vec![Point3::new(0.5, 0.5, 0.5)], vec![radius])
}

/// Every representation, committed, with a sampler each.
pub fn all_samplers() -> Vec<(&'static str, Sampler)> {
    vec![
        ("structured", sampler(structured(9))),
        ("spherical", sampler(spherical(5))),
        ("unstructured", sampler(unstructured(4))),
        ("amr", sampler(amr(4))),
        ("sparse", sampler(sparse())),
        ("particle", sampler(particle(0.1))),
    ]
}
