//! CPU counterparts of the built-in fragment shaders.
//!
//! A kernel is keyed by the exact fragment source it stands in for. Shaders without a kernel
//! fail to compile on the soft backend.

use gpuimg_filters::{blend, blur, color};
use gpuimg_runtime::filter::{NO_FILTER_FRAGMENT_SHADER, UNIFORM_INPUT_TEXTURE};
use gpuimg_runtime::two_input::UNIFORM_INPUT_TEXTURE_2;
use gpuimg_runtime::two_pass::{TEXEL_HEIGHT_OFFSET, TEXEL_WIDTH_OFFSET};

use crate::Fragment;

/// Computes one output color from the interpolated inputs of a fragment.
pub type Kernel = fn(&Fragment<'_>) -> [f32; 4];

const LUMINANCE: [f32; 3] = [0.2125, 0.7154, 0.0721];

fn input(frag: &Fragment<'_>) -> [f32; 4] {
    frag.sample(UNIFORM_INPUT_TEXTURE, frag.tex_coord())
}

fn map_rgb(c: [f32; 4], f: impl Fn(f32) -> f32) -> [f32; 4] {
    [f(c[0]), f(c[1]), f(c[2]), c[3]]
}

fn luminance(c: [f32; 4]) -> f32 {
    c[0] * LUMINANCE[0] + c[1] * LUMINANCE[1] + c[2] * LUMINANCE[2]
}

fn passthrough(frag: &Fragment<'_>) -> [f32; 4] {
    input(frag)
}

fn brightness(frag: &Fragment<'_>) -> [f32; 4] {
    let b = frag.float(color::BRIGHTNESS);
    map_rgb(input(frag), |c| c + b)
}

fn contrast(frag: &Fragment<'_>) -> [f32; 4] {
    let k = frag.float(color::CONTRAST);
    map_rgb(input(frag), |c| (c - 0.5) * k + 0.5)
}

fn gamma(frag: &Fragment<'_>) -> [f32; 4] {
    let g = frag.float(color::GAMMA);
    map_rgb(input(frag), |c| c.powf(g))
}

fn exposure(frag: &Fragment<'_>) -> [f32; 4] {
    let scale = 2f32.powf(frag.float(color::EXPOSURE));
    map_rgb(input(frag), |c| c * scale)
}

fn saturation(frag: &Fragment<'_>) -> [f32; 4] {
    let s = frag.float(color::SATURATION);
    let c = input(frag);
    let l = luminance(c);
    map_rgb(c, |v| l + (v - l) * s)
}

fn grayscale(frag: &Fragment<'_>) -> [f32; 4] {
    let c = input(frag);
    let l = luminance(c);
    [l, l, l, c[3]]
}

fn color_invert(frag: &Fragment<'_>) -> [f32; 4] {
    map_rgb(input(frag), |c| 1.0 - c)
}

fn opacity(frag: &Fragment<'_>) -> [f32; 4] {
    let mut c = input(frag);
    c[3] *= frag.float(color::OPACITY);
    c
}

fn box_blur(frag: &Fragment<'_>) -> [f32; 4] {
    let step = [frag.float(TEXEL_WIDTH_OFFSET), frag.float(TEXEL_HEIGHT_OFFSET)];
    let [u, v] = frag.tex_coord();
    let mut out = [0.0; 4];
    for k in [0.0, -1.5, 1.5, -3.5, 3.5] {
        let c = frag.sample(UNIFORM_INPUT_TEXTURE, [u + k * step[0], v + k * step[1]]);
        for i in 0..4 {
            out[i] += c[i] * 0.2;
        }
    }
    out
}

fn inputs(frag: &Fragment<'_>) -> ([f32; 4], [f32; 4]) {
    (
        input(frag),
        frag.sample(UNIFORM_INPUT_TEXTURE_2, frag.tex_coord2()),
    )
}

fn alpha_blend(frag: &Fragment<'_>) -> [f32; 4] {
    let (base, top) = inputs(frag);
    let t = top[3] * frag.float(blend::MIXTURE_PERCENT);
    [
        base[0] + (top[0] - base[0]) * t,
        base[1] + (top[1] - base[1]) * t,
        base[2] + (top[2] - base[2]) * t,
        base[3],
    ]
}

fn multiply_blend(frag: &Fragment<'_>) -> [f32; 4] {
    let (base, over) = inputs(frag);
    let mut out = [0.0; 4];
    for i in 0..4 {
        out[i] = over[i] * base[i] + over[i] * (1.0 - base[3]) + base[i] * (1.0 - over[3]);
    }
    out
}

fn overlay_blend(frag: &Fragment<'_>) -> [f32; 4] {
    let (base, over) = inputs(frag);
    let channel = |i: usize| {
        let (b, o) = (base[i], over[i]);
        let rest = o * (1.0 - base[3]) + b * (1.0 - over[3]);
        if 2.0 * b < base[3] {
            2.0 * o * b + rest
        } else {
            over[3] * base[3] - 2.0 * (base[3] - b) * (over[3] - o) + rest
        }
    };
    [channel(0), channel(1), channel(2), 1.0]
}

pub(crate) const BUILTIN: &[(&str, Kernel)] = &[
    (NO_FILTER_FRAGMENT_SHADER, passthrough),
    (color::BRIGHTNESS_FRAGMENT_SHADER, brightness),
    (color::CONTRAST_FRAGMENT_SHADER, contrast),
    (color::GAMMA_FRAGMENT_SHADER, gamma),
    (color::EXPOSURE_FRAGMENT_SHADER, exposure),
    (color::SATURATION_FRAGMENT_SHADER, saturation),
    (color::GRAYSCALE_FRAGMENT_SHADER, grayscale),
    (color::COLOR_INVERT_FRAGMENT_SHADER, color_invert),
    (color::OPACITY_FRAGMENT_SHADER, opacity),
    (blur::BOX_BLUR_FRAGMENT_SHADER, box_blur),
    (blend::ALPHA_BLEND_FRAGMENT_SHADER, alpha_blend),
    (blend::MULTIPLY_BLEND_FRAGMENT_SHADER, multiply_blend),
    (blend::OVERLAY_BLEND_FRAGMENT_SHADER, overlay_blend),
];
