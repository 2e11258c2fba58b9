/// Flat-color triangle rasterizer. Each invocation owns one texel and only
/// writes it when a triangle covers it, so earlier draws survive.
///
/// Triangles are packed as two `vec4`s: `(a.xy, b.xy)` and `(c.xy, 0, 0)`,
/// in texel space.
pub const RASTER_WGSL: &str = r#"
struct Params {
  width: u32,
  height: u32,
  step: u32,
  triangle_count: u32,
  surface_color: vec4<f32>,
  object_color: vec4<f32>,
  background_color: vec4<f32>,
  draw_color: vec4<f32>,
};

@group(0) @binding(0) var<storage, read> tris: array<vec4<f32>>;
@group(0) @binding(1) var output_tex: texture_storage_2d<rgba32float, write>;
@group(0) @binding(2) var<uniform> params: Params;

const COVERAGE_HALF: f32 = 0.4999;
const AXIS_EPSILON: f32 = 1.1920929e-7;

fn axis_overlaps(axis: vec2<f32>, v0: vec2<f32>, v1: vec2<f32>, v2: vec2<f32>, half: f32) -> bool {
  let p0 = dot(v0, axis);
  let p1 = dot(v1, axis);
  let p2 = dot(v2, axis);
  let min_p = min(p0, min(p1, p2));
  let max_p = max(p0, max(p1, p2));
  let r = half * (abs(axis.x) + abs(axis.y));
  return !(min_p > r || max_p < -r);
}

fn triangle_covers_texel(center: vec2<f32>, half: f32, a: vec2<f32>, b: vec2<f32>, c: vec2<f32>) -> bool {
  let v0 = a - center;
  let v1 = b - center;
  let v2 = c - center;

  let lo = min(v0, min(v1, v2));
  let hi = max(v0, max(v1, v2));
  if (lo.x > half || hi.x < -half || lo.y > half || hi.y < -half) {
    return false;
  }

  let edges = array<vec2<f32>, 3>(v1 - v0, v2 - v1, v0 - v2);
  for (var i = 0u; i < 3u; i = i + 1u) {
    let e = edges[i];
    let axis = vec2<f32>(-e.y, e.x);
    if (dot(axis, axis) <= AXIS_EPSILON) {
      continue;
    }
    if (!axis_overlaps(axis, v0, v1, v2, half)) {
      return false;
    }
  }
  return true;
}

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
  if (gid.x >= params.width || gid.y >= params.height) {
    return;
  }
  let center = vec2<f32>(f32(gid.x) + 0.5, f32(gid.y) + 0.5);
  for (var t = 0u; t < params.triangle_count; t = t + 1u) {
    let ab = tris[t * 2u];
    let c = tris[t * 2u + 1u];
    if (triangle_covers_texel(center, COVERAGE_HALF, ab.xy, ab.zw, c.xy)) {
      textureStore(output_tex, vec2<i32>(gid.xy), params.draw_color);
      return;
    }
  }
}
"#;

/// Seed, jump-flood and fill kernels. All three read `input_tex` and write
/// `output_tex`; the host swaps the pair between jump-flood passes.
pub const PROPAGATE_WGSL: &str = r#"
struct Params {
  width: u32,
  height: u32,
  step: u32,
  triangle_count: u32,
  surface_color: vec4<f32>,
  object_color: vec4<f32>,
  background_color: vec4<f32>,
  draw_color: vec4<f32>,
};

@group(0) @binding(0) var input_tex: texture_2d<f32>;
@group(0) @binding(1) var output_tex: texture_storage_2d<rgba32float, write>;
@group(0) @binding(2) var<uniform> params: Params;

const CLASS_SURFACE: f32 = 0.0;
const CLASS_OBJECT: f32 = 1.0;
const COLOR_EPSILON: f32 = 0.001;
const UNRESOLVED: vec4<f32> = vec4<f32>(-1.0, -1.0, -1.0, 0.0);
const EMPTY_SPACE: vec4<f32> = vec4<f32>(1.0, 0.0, -1.0, 0.0);

fn colors_match(a: vec4<f32>, b: vec4<f32>) -> bool {
  return all(abs(a - b) <= vec4<f32>(COLOR_EPSILON));
}

fn is_resolved(t: vec4<f32>) -> bool {
  return t.w > 0.5;
}

fn chebyshev(p: vec2<i32>, t: vec4<f32>) -> f32 {
  let d = abs(t.xy - vec2<f32>(p));
  return max(d.x, d.y);
}

fn in_bounds(gid: vec3<u32>) -> bool {
  return gid.x < params.width && gid.y < params.height;
}

@compute @workgroup_size(8, 8, 1)
fn seed(@builtin(global_invocation_id) gid: vec3<u32>) {
  if (!in_bounds(gid)) {
    return;
  }
  let p = vec2<i32>(gid.xy);
  let raster = textureLoad(input_tex, p, 0);
  var out = UNRESOLVED;
  if (!colors_match(raster, params.background_color)) {
    var kind = CLASS_SURFACE;
    if (colors_match(raster, params.object_color)) {
      kind = CLASS_OBJECT;
    }
    out = vec4<f32>(f32(gid.x), f32(gid.y), kind, 1.0);
  }
  textureStore(output_tex, p, out);
}

@compute @workgroup_size(8, 8, 1)
fn jump_flood(@builtin(global_invocation_id) gid: vec3<u32>) {
  if (!in_bounds(gid)) {
    return;
  }
  // Scan order; the first strictly closer candidate wins ties.
  var offsets = array<vec2<i32>, 9>(
    vec2<i32>(0, 0),
    vec2<i32>(-1, -1),
    vec2<i32>(0, -1),
    vec2<i32>(1, -1),
    vec2<i32>(-1, 0),
    vec2<i32>(1, 0),
    vec2<i32>(-1, 1),
    vec2<i32>(0, 1),
    vec2<i32>(1, 1)
  );
  let p = vec2<i32>(gid.xy);
  let size = vec2<i32>(i32(params.width), i32(params.height));
  let step = i32(params.step);

  var best = UNRESOLVED;
  var best_dist = 3.0e38;
  for (var i = 0u; i < 9u; i = i + 1u) {
    let q = p + offsets[i] * step;
    if (q.x < 0 || q.y < 0 || q.x >= size.x || q.y >= size.y) {
      continue;
    }
    let candidate = textureLoad(input_tex, q, 0);
    if (!is_resolved(candidate)) {
      continue;
    }
    let dist = chebyshev(p, candidate);
    if (dist < best_dist) {
      best_dist = dist;
      best = candidate;
    }
  }
  textureStore(output_tex, p, best);
}

@compute @workgroup_size(8, 8, 1)
fn fill(@builtin(global_invocation_id) gid: vec3<u32>) {
  if (!in_bounds(gid)) {
    return;
  }
  let p = vec2<i32>(gid.xy);
  let t = textureLoad(input_tex, p, 0);
  if (!is_resolved(t)) {
    textureStore(output_tex, p, EMPTY_SPACE);
    return;
  }
  let dist = chebyshev(p, t);
  let boundary = dist == 0.0;
  let inside = boundary && t.z == CLASS_OBJECT;
  textureStore(output_tex, p, vec4<f32>(
    dist / f32(max(params.width, 1u)),
    select(0.0, 1.0, inside),
    t.z,
    select(0.0, 1.0, boundary)
  ));
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagate_module_declares_every_kernel() {
        for entry in ["fn seed(", "fn jump_flood(", "fn fill("] {
            assert!(PROPAGATE_WGSL.contains(entry), "missing {entry}");
        }
        assert!(RASTER_WGSL.contains("fn main("));
    }

    #[test]
    fn params_struct_matches_between_modules() {
        let head = |src: &'static str| {
            let start = src.find("struct Params").unwrap();
            let end = start + src[start..].find("};").unwrap();
            &src[start..end]
        };
        assert_eq!(head(RASTER_WGSL), head(PROPAGATE_WGSL));
    }
}
