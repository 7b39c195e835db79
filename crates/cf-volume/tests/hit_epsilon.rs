//! Isosurface hits land within their reported epsilon of the true crossing.

#![allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_precision_loss)]

mod common;

use cf_volume::{
    Attribute, HitIteratorContext, HitN, LaneMask, NATIVE_WIDTH, Ray, RayN, Sampler,
    StructuredRegularVolume, ValueRange, all_lanes,
};
use nalgebra::{Point3, Vector3};

fn isovalues() -> Vec<f64> {
    (1..=9).map(|i| f64::from(i) * 0.1).collect()
}

fn hit_context(sampler: Sampler, values: Vec<f64>) -> HitIteratorContext {
    let mut context = HitIteratorContext::new(sampler);
    context.set_values(values);
    context.commit().unwrap();
    context
}

/// Hits along `ray` through an f = z volume entering at t = 1.
fn assert_z_hits(context: &HitIteratorContext, ray: &Ray, values: &[f64]) {
    let mut slot = None;
    let iterator = context.init_iterator(&mut slot, ray, 0.0).unwrap();
    let hits: Vec<_> = iterator.collect();

    assert_eq!(hits.len(), values.len(), "hits: {hits:?}");
    for (hit, &value) in hits.iter().zip(values) {
        assert!(hit.epsilon > 0.0);
        assert_eq!(hit.sample, value);
        assert_eq!(hit.attribute_index, 0);
        assert!(
            (hit.t - (1.0 + value)).abs() <= hit.epsilon,
            "isovalue {value}: t = {}, epsilon = {}",
            hit.t,
            hit.epsilon
        );
    }
    assert!(hits.windows(2).all(|w| w[0].t < w[1].t));
}

#[test]
fn structured_hits_within_epsilon() {
    let context = hit_context(common::sampler(common::structured(128)), isovalues());
    let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z());
    assert_z_hits(&context, &ray, &isovalues());
}

#[test]
fn structured_hits_at_native_width() {
    let context = hit_context(common::sampler(common::structured(128)), isovalues());
    let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z());
    let rays = RayN::<NATIVE_WIDTH>::splat(&ray);

    let mut valid: LaneMask<NATIVE_WIDTH> = all_lanes();
    valid[1] = false;

    let mut slot = None;
    let iterator = context
        .init_iterator_n(&mut slot, &valid, &rays, &[0.0; NATIVE_WIDTH])
        .unwrap();

    let mut out = HitN::<NATIVE_WIDTH>::default();
    out.t[1] = -42.0;
    // Masked lanes keep whatever the caller left in `result`.
    let mut result = [true; NATIVE_WIDTH];

    for value in isovalues() {
        iterator.iterate(&valid, &mut out, &mut result).unwrap();
        assert!(result[0]);
        assert!(result[1]);
        let hit = out.get(0);
        assert!((hit.t - (1.0 + value)).abs() <= hit.epsilon);
        assert_eq!(out.t[1], -42.0);
        assert_eq!(out.get(NATIVE_WIDTH - 1), hit);
    }

    iterator.iterate(&valid, &mut out, &mut result).unwrap();
    for (lane, &written) in result.iter().enumerate() {
        assert_eq!(written, lane == 1, "lane {lane}");
    }
    assert_eq!(out.t[1], -42.0);
}

#[test]
fn unstructured_hits_within_epsilon() {
    // Cell faces sit at multiples of 1/6; keep isovalues off them.
    let values = vec![0.1, 0.25, 0.4, 0.6, 0.75, 0.9];
    let context = hit_context(common::sampler(common::unstructured(6)), values.clone());
    let ray = Ray::new(Point3::new(0.41, 0.63, -1.0), Vector3::z());
    assert_z_hits(&context, &ray, &values);
}

#[test]
fn amr_hits_within_epsilon() {
    let values = vec![0.2, 0.4, 0.6, 0.8];
    let context = hit_context(common::sampler(common::amr(4)), values.clone());
    // Outside the refined octant the level-0 block is exact on [0.125, 0.875].
    let ray = Ray::new(Point3::new(0.7, 0.8, -1.0), Vector3::z());
    assert_z_hits(&context, &ray, &values);
}

#[test]
fn sparse_hits_within_epsilon() {
    let values = vec![0.1, 0.3, 0.5, 0.7, 0.9];
    let context = hit_context(common::sampler(common::sparse()), values.clone());
    let ray = Ray::new(Point3::new(0.4, 0.6, -1.0), Vector3::z());
    assert_z_hits(&context, &ray, &values);
}

#[test]
fn spherical_hits_radius_shells() {
    let context = hit_context(common::sampler(common::spherical(9)), vec![1.3]);
    // Straight through the origin: the shell r = 1.3 is crossed twice.
    let ray = Ray::new(Point3::new(0.0, 0.0, -3.0), Vector3::z());
    let hits: Vec<_> = context.iterator(&ray, 0.0).unwrap().collect();

    assert_eq!(hits.len(), 2, "hits: {hits:?}");
    assert!((hits[0].t - 1.7).abs() <= hits[0].epsilon);
    assert!((hits[1].t - 4.3).abs() <= hits[1].epsilon);
}

#[test]
fn particle_hits_gaussian_shell() {
    let radius = 0.1;
    let context = hit_context(common::sampler(common::particle(radius)), vec![0.5]);
    let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z());
    let hits: Vec<_> = context.iterator(&ray, 0.0).unwrap().collect();

    let d = radius * (2.0 * std::f64::consts::LN_2).sqrt();
    assert_eq!(hits.len(), 2, "hits: {hits:?}");
    assert!((hits[0].t - (1.5 - d)).abs() <= hits[0].epsilon);
    assert!((hits[1].t - (1.5 + d)).abs() <= hits[1].epsilon);
}

#[test]
fn no_isovalues_no_hits() {
    let context = hit_context(common::sampler(common::structured(9)), Vec::new());
    let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z());
    assert_eq!(context.iterator(&ray, 0.0).unwrap().count(), 0);
}

#[test]
fn degenerate_ray_is_exhausted() {
    let context = hit_context(common::sampler(common::structured(9)), isovalues());
    let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::zeros());
    assert_eq!(context.iterator(&ray, 0.0).unwrap().count(), 0);
}

#[test]
fn touching_isovalue_is_one_hit() {
    // f = 0, 0.5, 0 on the z layers: the field peaks at the isovalue.
    let mut grid = StructuredRegularVolume::new([2, 2, 3]);
    let data = [0.0, 0.5, 0.0].iter().flat_map(|&f| [f; 4]).collect();
    grid.add_attribute(Attribute::new("peak", data));
    let context = hit_context(common::sampler(grid), vec![0.5]);

    for ray in [
        Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z()),
        Ray::new(Point3::new(0.5, 0.5, 3.0), -Vector3::z()),
    ] {
        let hits: Vec<_> = context.iterator(&ray, 0.0).unwrap().collect();
        assert_eq!(hits.len(), 1, "hits: {hits:?}");
        assert_eq!(hits[0].sample, 0.5);
        assert!((hits[0].t - 2.0).abs() <= hits[0].epsilon);
    }
}

#[test]
fn isovalue_on_entry_face_is_a_hit() {
    let context = hit_context(common::sampler(common::structured(9)), vec![0.0, 1.0]);

    let up = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z());
    let hits: Vec<_> = context.iterator(&up, 0.0).unwrap().collect();
    assert_eq!(hits.len(), 2, "hits: {hits:?}");
    assert_eq!((hits[0].sample, hits[0].t), (0.0, 1.0));
    assert_eq!(hits[1].sample, 1.0);
    assert!((hits[1].t - 2.0).abs() <= hits[1].epsilon);

    let down = Ray::new(Point3::new(0.5, 0.5, 2.0), -Vector3::z());
    let hits: Vec<_> = context.iterator(&down, 0.0).unwrap().collect();
    assert_eq!(hits.len(), 2, "hits: {hits:?}");
    assert_eq!((hits[0].sample, hits[0].t), (1.0, 1.0));
    assert_eq!(hits[1].sample, 0.0);
    assert!((hits[1].t - 2.0).abs() <= hits[1].epsilon);
}

#[test]
fn isovalue_at_range_start_is_a_hit() {
    let context = hit_context(
        common::sampler(common::structured(9)),
        vec![0.25, 0.5, 0.75],
    );
    let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z())
        .with_t_range(ValueRange::new(1.5, 10.0));
    let hits: Vec<_> = context.iterator(&ray, 0.0).unwrap().collect();

    assert_eq!(hits.len(), 2, "hits: {hits:?}");
    assert_eq!(hits[0].sample, 0.5);
    assert!((hits[0].t - 1.5).abs() <= hits[0].epsilon);
    assert_eq!(hits[1].sample, 0.75);
    assert!((hits[1].t - 1.75).abs() <= hits[1].epsilon);
}
