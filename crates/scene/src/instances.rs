use glam::{Mat4, Vec3};
use rand::Rng;

/// World-space spread contributed by each instance. The field is a cube with
/// side `instance_count * SPREAD_PER_INSTANCE`, so density stays roughly
/// constant as the count grows.
pub const SPREAD_PER_INSTANCE: f32 = 0.01;

/// Side length of the cube that holds `count` instances.
pub fn spread_for(count: usize) -> f32 {
    count as f32 * SPREAD_PER_INSTANCE
}

/// Generate `count` translation matrices with offsets sampled uniformly from
/// `[-0.5, 0.5)` on each axis, scaled by the field spread.
pub fn generate_transforms<R: Rng>(count: usize, rng: &mut R) -> Vec<Mat4> {
    generate_transforms_with(count, || {
        Vec3::new(
            rng.gen_range(-0.5..0.5),
            rng.gen_range(-0.5..0.5),
            rng.gen_range(-0.5..0.5),
        )
    })
}

/// Generate `count` translation matrices from an arbitrary offset source.
///
/// Each sampled offset is scaled by the field spread before it becomes a
/// translation.
pub fn generate_transforms_with(count: usize, mut sample: impl FnMut() -> Vec3) -> Vec<Mat4> {
    let spread = spread_for(count);
    (0..count)
        .map(|_| Mat4::from_translation(sample() * spread))
        .collect()
}

/// The per-instance transform array, generated once and read-only afterward.
#[derive(Debug, Clone)]
pub struct InstanceField {
    transforms: Vec<Mat4>,
    spread: f32,
}

impl InstanceField {
    /// Place `count` instances using the given random source.
    pub fn generate<R: Rng>(count: usize, rng: &mut R) -> Self {
        let _span = tracing::info_span!("generate_instances", count).entered();
        let transforms = generate_transforms(count, rng);
        tracing::debug!(count = transforms.len(), "instance transforms generated");
        Self {
            transforms,
            spread: spread_for(count),
        }
    }

    /// Build a field from a deterministic offset source.
    pub fn from_sampler(count: usize, sample: impl FnMut() -> Vec3) -> Self {
        Self {
            transforms: generate_transforms_with(count, sample),
            spread: spread_for(count),
        }
    }

    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Side length of the cube the instances occupy.
    pub fn spread(&self) -> f32 {
        self.spread
    }

    /// Distance from the field centre to any face of its bounding cube.
    pub fn half_extent(&self) -> f32 {
        self.spread * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn count_matches_request() {
        let mut rng = StdRng::seed_from_u64(1);
        for count in [0, 1, 7, 5_000] {
            let field = InstanceField::generate(count, &mut rng);
            assert_eq!(field.len(), count);
        }
    }

    #[test]
    fn positions_stay_inside_scaled_cube() {
        let mut rng = StdRng::seed_from_u64(42);
        let field = InstanceField::generate(20_000, &mut rng);
        let half = field.half_extent();
        assert!((field.spread() - 200.0).abs() < 1e-3);
        for m in field.transforms() {
            let p = m.w_axis.truncate();
            assert!(p.abs().max_element() <= half, "{p} outside ±{half}");
        }
    }

    #[test]
    fn transforms_are_pure_translations() {
        let mut rng = StdRng::seed_from_u64(3);
        let transforms = generate_transforms(16, &mut rng);
        for m in &transforms {
            assert_eq!(m.x_axis, glam::Vec4::X);
            assert_eq!(m.y_axis, glam::Vec4::Y);
            assert_eq!(m.z_axis, glam::Vec4::Z);
            assert_eq!(m.w_axis.w, 1.0);
        }
    }

    #[test]
    fn same_seed_same_field() {
        let a = generate_transforms(100, &mut StdRng::seed_from_u64(9));
        let b = generate_transforms(100, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn fixed_offsets_scale_by_instance_count() {
        let offsets = [
            Vec3::new(0.0, 0.0, -0.5),
            Vec3::new(0.1, 0.0, -0.5),
            Vec3::new(-0.1, 0.0, -0.5),
        ];
        let mut next = offsets.iter().copied();
        let field = InstanceField::from_sampler(3, || next.next().unwrap_or(Vec3::ZERO));

        assert_eq!(field.len(), 3);
        let scale = 3.0 * 0.01;
        for (m, offset) in field.transforms().iter().zip(offsets) {
            let expected = Mat4::from_translation(offset * scale);
            assert!(m.abs_diff_eq(expected, 1e-6), "{m} != {expected}");
        }
    }
}
