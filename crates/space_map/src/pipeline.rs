//! Seed, jump-flood and fill passes over a ping-pong texture pair.
//!
//! ```text
//! raster ──seed──▶ ping ──jump(D/2)──▶ pong ──jump(D/4)──▶ ping ... ──jump(1)──▶ final
//!                                                         final ──fill──▶ partner ──blit──▶ map
//! ```
//!
//! Every dispatch reads one texture and writes the other, so the swap
//! between passes is the only synchronization the kernels need.

use std::time::Instant;

use crate::backend::{workgroups_for, ComputeBackend, Kernel, KernelBindings, KernelParams, TextureDesc, TextureId};
use crate::core::SpaceMapConfig;
use crate::error::Result;
use crate::raster::{rasterize, RasterPlan};
use crate::stats::CaptureStats;

/// Step sizes of the propagation passes for a map of side `size`:
/// `ceil(log2(size))` passes, halving from `size / 2` down to 1.
pub fn jump_steps(size: u32) -> Vec<u32> {
    let passes = size.max(1).next_power_of_two().trailing_zeros();
    (0..passes).map(|i| 1u32 << (passes - i - 1)).collect()
}

/// Uniforms for a map of side `size`; `step` and `draw_color` are filled
/// per dispatch.
pub fn kernel_params(size: u32, config: &SpaceMapConfig) -> KernelParams {
    KernelParams {
        width: size,
        height: size,
        step: 0,
        triangle_count: 0,
        surface_color: config.surface_color.to_array(),
        object_color: config.object_color.to_array(),
        background_color: config.background_color.to_array(),
        draw_color: [0.0; 4],
    }
}

/// Intermediate raster buffer plus the ping-pong pair, reused across
/// captures of the same size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureBuffers {
    pub size: u32,
    pub intermediate: TextureId,
    pub ping: TextureId,
    pub pong: TextureId,
}

impl CaptureBuffers {
    /// Allocates all three textures or none of them.
    pub fn allocate<B: ComputeBackend>(backend: &mut B, size: u32) -> Result<Self> {
        let intermediate = backend.allocate_texture(&TextureDesc::square("space_map.intermediate", size))?;
        let ping = match backend.allocate_texture(&TextureDesc::square("space_map.ping", size)) {
            Ok(id) => id,
            Err(e) => {
                backend.release_texture(intermediate);
                return Err(e);
            }
        };
        let pong = match backend.allocate_texture(&TextureDesc::square("space_map.pong", size)) {
            Ok(id) => id,
            Err(e) => {
                backend.release_texture(intermediate);
                backend.release_texture(ping);
                return Err(e);
            }
        };
        Ok(Self {
            size,
            intermediate,
            ping,
            pong,
        })
    }

    /// Frees all three textures.
    pub fn release<B: ComputeBackend>(self, backend: &mut B) {
        backend.release_texture(self.intermediate);
        backend.release_texture(self.ping);
        backend.release_texture(self.pong);
    }
}

/// Returns buffers of side `size`, reusing `slot` when its size matches.
pub fn ensure_buffers<B: ComputeBackend>(
    backend: &mut B,
    slot: &mut Option<CaptureBuffers>,
    size: u32,
) -> Result<CaptureBuffers> {
    if let Some(buffers) = *slot {
        if buffers.size == size {
            return Ok(buffers);
        }
        log::debug!("capture buffers resized {} -> {}", buffers.size, size);
        buffers.release(backend);
        *slot = None;
    }
    let buffers = CaptureBuffers::allocate(backend, size)?;
    *slot = Some(buffers);
    Ok(buffers)
}

/// Seeds `ping` from the raster buffer, runs every jump-flood pass and
/// returns `(final, partner)`: the last texture written and its swap partner.
pub fn propagate<B: ComputeBackend>(
    backend: &mut B,
    buffers: &CaptureBuffers,
    params: &KernelParams,
    steps: &[u32],
) -> Result<(TextureId, TextureId)> {
    let groups = workgroups_for(params.width, params.height);
    backend.dispatch(
        Kernel::Seed,
        groups,
        KernelBindings {
            input: buffers.intermediate,
            output: buffers.ping,
        },
        params,
    )?;

    let (mut src, mut dst) = (buffers.ping, buffers.pong);
    for &step in steps {
        let pass = KernelParams { step, ..*params };
        backend.dispatch(Kernel::JumpFlood, groups, KernelBindings { input: src, output: dst }, &pass)?;
        log::debug!("jump flood pass step {step}");
        std::mem::swap(&mut src, &mut dst);
    }
    Ok((src, dst))
}

/// Runs one capture end to end into `map_texture`.
///
/// The returned stats leave `seed_texels` at zero: the resolved texels only
/// exist on the host once read back, and [`SpaceMap::new`](crate::map::SpaceMap::new)
/// counts them there.
pub fn run_capture<B: ComputeBackend>(
    backend: &mut B,
    buffers: &CaptureBuffers,
    plan: &RasterPlan,
    config: &SpaceMapConfig,
    map_texture: TextureId,
) -> Result<CaptureStats> {
    let start = Instant::now();
    let params = kernel_params(buffers.size, config);
    let steps = jump_steps(buffers.size);

    rasterize(backend, buffers.intermediate, plan, params.background_color)?;
    let (last, partner) = propagate(backend, buffers, &params, &steps)?;

    let groups = workgroups_for(params.width, params.height);
    backend.dispatch(Kernel::Fill, groups, KernelBindings { input: last, output: partner }, &params)?;
    backend.blit(partner, map_texture)?;

    Ok(CaptureStats {
        passes: steps.len() as u32,
        steps,
        surfaces_drawn: plan.surfaces_drawn,
        anchors_skipped: plan.anchors_skipped,
        seed_texels: 0,
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SurfaceDraw;
    use crate::core::{CLASS_OBJECT, CLASS_SURFACE, UNRESOLVED};
    use crate::kernels::{chebyshev, is_resolved};
    use crate::reference_cpu::CpuBackend;
    use glam::Vec2;
    use rand::{Rng, SeedableRng};

    fn config(size: u32) -> SpaceMapConfig {
        SpaceMapConfig {
            texture_size: size,
            ..Default::default()
        }
    }

    /// Seeds `texels` directly and propagates them, returning the final texture.
    fn flood(size: u32, seeds: &[(u32, u32, f32)]) -> Vec<[f32; 4]> {
        let config = config(size);
        let mut backend = CpuBackend::new();
        let buffers = CaptureBuffers::allocate(&mut backend, size).unwrap();
        let mut raster = vec![config.background_color.to_array(); (size * size) as usize];
        for &(x, y, class) in seeds {
            let color = if class == CLASS_OBJECT { config.object_color } else { config.surface_color };
            raster[(y * size + x) as usize] = color.to_array();
        }
        backend.write_texture(buffers.intermediate, &raster).unwrap();
        let params = kernel_params(size, &config);
        let (last, _) = propagate(&mut backend, &buffers, &params, &jump_steps(size)).unwrap();
        backend.read_texture(last).unwrap()
    }

    #[test]
    fn steps_halve_down_to_one() {
        for exp in 1..=12 {
            let size = 1u32 << exp;
            let steps = jump_steps(size);
            assert_eq!(steps.len() as u32, exp);
            assert_eq!(steps[0], size / 2);
            assert_eq!(*steps.last().unwrap(), 1);
            assert!(steps.windows(2).all(|w| w[0] == 2 * w[1]));
        }
        assert!(jump_steps(1).is_empty());
    }

    #[test]
    fn dispatches_alternate_ping_pong() {
        let size = 16;
        let mut backend = CpuBackend::new();
        let buffers = CaptureBuffers::allocate(&mut backend, size).unwrap();
        let params = kernel_params(size, &config(size));
        let (last, partner) = propagate(&mut backend, &buffers, &params, &jump_steps(size)).unwrap();

        // Seed writes ping, four passes end back on ping.
        assert_eq!((last, partner), (buffers.ping, buffers.pong));
        let kernels: Vec<_> = backend.dispatches().iter().map(|d| (d.kernel, d.step)).collect();
        assert_eq!(
            kernels,
            vec![
                (Kernel::Seed, 0),
                (Kernel::JumpFlood, 8),
                (Kernel::JumpFlood, 4),
                (Kernel::JumpFlood, 2),
                (Kernel::JumpFlood, 1),
            ]
        );
        assert!(backend.dispatches().iter().all(|d| d.workgroups == [2, 2]));
    }

    #[test]
    fn single_seed_floods_whole_map() {
        let texels = flood(4, &[(0, 0, CLASS_OBJECT)]);
        for (i, texel) in texels.iter().enumerate() {
            assert_eq!(*texel, [0.0, 0.0, CLASS_OBJECT, 1.0], "texel {i}");
        }
    }

    #[test]
    fn opposite_corners_split_by_chebyshev_distance() {
        let n = 16u32;
        let texels = flood(n, &[(0, 0, CLASS_SURFACE), (n - 1, n - 1, CLASS_OBJECT)]);
        for y in 0..n {
            for x in 0..n {
                let texel = texels[(y * n + x) as usize];
                let to_first = x.max(y) as f32;
                let to_second = (n - 1 - x).max(n - 1 - y) as f32;
                let dist = chebyshev(x as i32, y as i32, texel);
                assert_eq!(dist, to_first.min(to_second), "distance at ({x}, {y})");
                if to_first < to_second {
                    assert_eq!(texel[2], CLASS_SURFACE, "owner at ({x}, {y})");
                } else if to_second < to_first {
                    assert_eq!(texel[2], CLASS_OBJECT, "owner at ({x}, {y})");
                }
            }
        }
        // (3, 1) is 3 texels away under L-infinity; Euclidean would give sqrt(10).
        let texel = texels[(n + 3) as usize];
        assert_eq!(chebyshev(3, 1, texel), 3.0);
    }

    #[test]
    fn random_seeds_resolve_everything_and_survive() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        for _ in 0..20 {
            let size = 1u32 << rng.gen_range(3..=6);
            let count = rng.gen_range(1..8);
            let seeds: Vec<(u32, u32, f32)> = (0..count)
                .map(|_| {
                    let class = if rng.gen_bool(0.5) { CLASS_OBJECT } else { CLASS_SURFACE };
                    (rng.gen_range(0..size), rng.gen_range(0..size), class)
                })
                .collect();
            let texels = flood(size, &seeds);

            assert!(texels.iter().all(|t| is_resolved(*t)));
            for &(x, y, _) in &seeds {
                let texel = texels[(y * size + x) as usize];
                assert_eq!((texel[0], texel[1]), (x as f32, y as f32));
            }
        }
    }

    #[test]
    fn no_seeds_stay_unresolved() {
        let texels = flood(8, &[]);
        assert!(texels.iter().all(|t| *t == UNRESOLVED));
    }

    #[test]
    fn capture_writes_resolved_map() {
        let size = 8;
        let config = config(size);
        let mut backend = CpuBackend::new();
        let buffers = CaptureBuffers::allocate(&mut backend, size).unwrap();
        let map = backend.allocate_texture(&TextureDesc::square("map", size)).unwrap();
        let plan = RasterPlan {
            draws: vec![SurfaceDraw {
                triangles: vec![[Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)]],
                color: config.object_color.to_array(),
            }],
            surfaces_drawn: 1,
            anchors_skipped: 0,
        };
        let stats = run_capture(&mut backend, &buffers, &plan, &config, map).unwrap();
        assert_eq!(stats.passes, 3);
        assert_eq!(stats.steps, vec![4, 2, 1]);

        let texels = backend.read_texture(map).unwrap();
        assert_eq!(texels[0], [0.0, 1.0, CLASS_OBJECT, 1.0]);
        assert_eq!(texels[63], [7.0 / 8.0, 0.0, CLASS_OBJECT, 0.0]);
    }

    #[test]
    fn buffers_are_reused_until_size_changes() {
        let mut backend = CpuBackend::new();
        let mut slot = None;
        let first = ensure_buffers(&mut backend, &mut slot, 8).unwrap();
        let again = ensure_buffers(&mut backend, &mut slot, 8).unwrap();
        assert_eq!(first, again);
        assert_eq!(backend.live_textures(), 3);

        let resized = ensure_buffers(&mut backend, &mut slot, 16).unwrap();
        assert_eq!(resized.size, 16);
        assert_eq!(backend.live_textures(), 3);
    }

    #[test]
    fn partial_allocation_is_rolled_back() {
        let mut backend = CpuBackend::with_max_texture_dim(4);
        assert!(CaptureBuffers::allocate(&mut backend, 8).is_err());
        assert_eq!(backend.live_textures(), 0);
    }
}
