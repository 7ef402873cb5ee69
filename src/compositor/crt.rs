//! CRT surface effect
//!
//! The finished frame is shown as if on a curved tube: inside a threshold
//! radius (measured from the center, in `[-1, 1]` surface coordinates) the
//! image is sampled unchanged; beyond it sample coordinates are pushed
//! radially outward, quadratically in the distance past the threshold, so
//! the edges bulge and the corners fall off the tube into black. A small
//! halo around bright pixels gives the trace its phosphor glow, and a
//! vignette darkens the corners.
//!
//! The same math exists twice: as GLSL for the GPU path and as Rust for the
//! CPU fallback. Keep them in step.

use eframe::egui::{Color32, ColorImage, Vec2};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Distance of the glow taps from the sample point, in texels
pub const GLOW_RADIUS: f32 = 1.5;

/// Tunable look of the CRT surface
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrtParams {
    /// Radius (0..1.5) inside which the image is not warped
    pub threshold: f32,
    /// How hard coordinates are pushed out beyond the threshold
    pub strength: f32,
    /// Corner darkening, 0 = none
    pub vignette: f32,
    /// Halo intensity around bright pixels, 0 = none
    pub glow: f32,
}

impl Default for CrtParams {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            strength: 0.25,
            vignette: 0.35,
            glow: 0.6,
        }
    }
}

impl CrtParams {
    /// Clamp every field into a range the shader handles sensibly
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        let fix = |v: f32, lo: f32, hi: f32, fallback: f32| {
            if v.is_finite() {
                v.clamp(lo, hi)
            } else {
                fallback
            }
        };
        self.threshold = fix(self.threshold, 0.0, 1.5, defaults.threshold);
        self.strength = fix(self.strength, 0.0, 2.0, defaults.strength);
        self.vignette = fix(self.vignette, 0.0, 1.0, defaults.vignette);
        self.glow = fix(self.glow, 0.0, 2.0, defaults.glow);
    }
}

/// Map a surface coordinate (`[0, 1]` per axis, origin top-left) to the
/// image coordinate it shows
///
/// Results outside `[0, 1]` mean "off the tube" and render black.
pub fn warp_uv(uv: Vec2, params: &CrtParams) -> Vec2 {
    let p = uv * 2.0 - Vec2::splat(1.0);
    let r = p.length();
    if r <= params.threshold {
        return uv;
    }
    let d = r - params.threshold;
    let p = p * (1.0 + params.strength * d * d);
    p * 0.5 + Vec2::splat(0.5)
}

/// Brightness factor at a surface coordinate
pub fn vignette(uv: Vec2, params: &CrtParams) -> f32 {
    let p = uv * 2.0 - Vec2::splat(1.0);
    (1.0 - params.vignette * p.length_sq() * 0.5).clamp(0.0, 1.0)
}

fn on_tube(uv: Vec2) -> bool {
    (0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y)
}

pub const VERTEX_SHADER: &str = r#"
const vec2 verts[3] = vec2[3](
    vec2(-1.0, -1.0),
    vec2(3.0, -1.0),
    vec2(-1.0, 3.0)
);
out vec2 v_uv;

void main() {
    vec2 p = verts[gl_VertexID];
    // Row 0 of the uploaded frame is the top of the surface
    v_uv = vec2(p.x * 0.5 + 0.5, 0.5 - p.y * 0.5);
    gl_Position = vec4(p, 0.0, 1.0);
}
"#;

pub const FRAGMENT_SHADER: &str = r#"
precision mediump float;
uniform sampler2D u_frame;
uniform vec2 u_texel;
uniform float u_threshold;
uniform float u_strength;
uniform float u_vignette;
uniform float u_glow;
in vec2 v_uv;
out vec4 out_color;

const float GLOW_RADIUS = 1.5;

vec2 warp(vec2 uv) {
    vec2 p = uv * 2.0 - 1.0;
    float r = length(p);
    if (r <= u_threshold) {
        return uv;
    }
    float d = r - u_threshold;
    p *= 1.0 + u_strength * d * d;
    return p * 0.5 + 0.5;
}

void main() {
    vec2 uv = warp(v_uv);
    if (any(lessThan(uv, vec2(0.0))) || any(greaterThan(uv, vec2(1.0)))) {
        out_color = vec4(0.0, 0.0, 0.0, 1.0);
        return;
    }

    vec3 color = texture(u_frame, uv).rgb;
    vec2 o = u_texel * GLOW_RADIUS;
    vec3 halo = texture(u_frame, uv + vec2(o.x, o.y)).rgb
        + texture(u_frame, uv + vec2(-o.x, o.y)).rgb
        + texture(u_frame, uv + vec2(o.x, -o.y)).rgb
        + texture(u_frame, uv + vec2(-o.x, -o.y)).rgb;
    color = min(color + u_glow * 0.125 * halo, vec3(1.0));

    vec2 p = v_uv * 2.0 - 1.0;
    color *= clamp(1.0 - u_vignette * dot(p, p) * 0.5, 0.0, 1.0);
    out_color = vec4(color, 1.0);
}
"#;

/// Bilinear sample, edge-clamped, in `[0, 1]` per channel
fn sample(src: &RgbaImage, uv: Vec2) -> [f32; 3] {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return [0.0; 3];
    }
    let x = (uv.x * w as f32 - 0.5).clamp(0.0, (w - 1) as f32);
    let y = (uv.y * h as f32 - 0.5).clamp(0.0, (h - 1) as f32);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let texel = |px: u32, py: u32, c: usize| src.get_pixel(px, py).0[c] as f32 / 255.0;
    let mut out = [0.0; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let top = texel(x0, y0, c) * (1.0 - fx) + texel(x1, y0, c) * fx;
        let bottom = texel(x0, y1, c) * (1.0 - fx) + texel(x1, y1, c) * fx;
        *value = top * (1.0 - fy) + bottom * fy;
    }
    out
}

/// Apply the CRT effect on the CPU, producing an `out_w x out_h` image
pub fn warp_image(src: &RgbaImage, out_w: usize, out_h: usize, params: &CrtParams) -> ColorImage {
    let mut pixels = Vec::with_capacity(out_w * out_h);
    let (w, h) = src.dimensions();
    let texel = Vec2::new(1.0 / w.max(1) as f32, 1.0 / h.max(1) as f32);
    let o = texel * GLOW_RADIUS;
    let taps = [
        Vec2::new(o.x, o.y),
        Vec2::new(-o.x, o.y),
        Vec2::new(o.x, -o.y),
        Vec2::new(-o.x, -o.y),
    ];

    for y in 0..out_h {
        for x in 0..out_w {
            let screen = Vec2::new(
                (x as f32 + 0.5) / out_w as f32,
                (y as f32 + 0.5) / out_h as f32,
            );
            let uv = warp_uv(screen, params);
            if !on_tube(uv) {
                pixels.push(Color32::BLACK);
                continue;
            }

            let mut color = sample(src, uv);
            let mut halo = [0.0; 3];
            for tap in taps {
                let s = sample(src, uv + tap);
                for c in 0..3 {
                    halo[c] += s[c];
                }
            }
            let shade = vignette(screen, params);
            for c in 0..3 {
                color[c] = (color[c] + params.glow * 0.125 * halo[c]).min(1.0) * shade;
            }
            pixels.push(Color32::from_rgb(
                (color[0] * 255.0).round() as u8,
                (color[1] * 255.0).round() as u8,
                (color[2] * 255.0).round() as u8,
            ));
        }
    }

    ColorImage {
        size: [out_w, out_h],
        pixels,
    }
}
