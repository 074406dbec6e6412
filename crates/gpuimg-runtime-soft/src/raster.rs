//! Quad rasterization and texture sampling with GL conventions.

use gpuimg_core::Quad;
use image::RgbaImage;

/// Parametric position `(s, t)` of an NDC point inside an axis-aligned strip quad.
///
/// `None` outside the quad or for degenerate quads.
pub(crate) fn quad_params(positions: &Quad, ndc: [f32; 2]) -> Option<[f32; 2]> {
    let (x0, x1) = (positions[0], positions[2]);
    let (y0, y1) = (positions[1], positions[5]);
    if x1 == x0 || y1 == y0 {
        return None;
    }
    let s = (ndc[0] - x0) / (x1 - x0);
    let t = (ndc[1] - y0) / (y1 - y0);
    ((0.0..=1.0).contains(&s) && (0.0..=1.0).contains(&t)).then_some([s, t])
}

/// Interpolates a vec2 attribute over the strip corners (BL, BR, TL, TR).
pub(crate) fn interpolate(attrib: &Quad, [s, t]: [f32; 2]) -> [f32; 2] {
    let weights = [(1.0 - s) * (1.0 - t), s * (1.0 - t), (1.0 - s) * t, s * t];
    let mut out = [0.0; 2];
    for (corner, w) in weights.iter().enumerate() {
        out[0] += attrib[corner * 2] * w;
        out[1] += attrib[corner * 2 + 1] * w;
    }
    out
}

fn texel(texture: &RgbaImage, x: i64, y: i64) -> [f32; 4] {
    let x = x.clamp(0, i64::from(texture.width()) - 1) as u32;
    let y = y.clamp(0, i64::from(texture.height()) - 1) as u32;
    texture.get_pixel(x, y).0.map(|c| f32::from(c) / 255.0)
}

/// Bilinear lookup with clamp-to-edge. Row 0 of the texture is `t = 0`.
pub(crate) fn sample_linear(texture: &RgbaImage, uv: [f32; 2]) -> [f32; 4] {
    if texture.width() == 0 || texture.height() == 0 {
        return [0.0, 0.0, 0.0, 1.0];
    }
    let x = uv[0] * texture.width() as f32 - 0.5;
    let y = uv[1] * texture.height() as f32 - 0.5;
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let a = texel(texture, x0, y0);
    let b = texel(texture, x0 + 1, y0);
    let c = texel(texture, x0, y0 + 1);
    let d = texel(texture, x0 + 1, y0 + 1);
    let mut out = [0.0; 4];
    for i in 0..4 {
        let top = a[i] + (b[i] - a[i]) * fx;
        let bottom = c[i] + (d[i] - c[i]) * fx;
        out[i] = top + (bottom - top) * fy;
    }
    out
}

/// Clamp and round to unorm8, as a fixed-point color attachment does.
pub(crate) fn to_unorm8(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuimg_core::CUBE;

    #[test]
    fn cube_params_match_pixel_centers() {
        let [s, t] = quad_params(&CUBE, [-0.75, 0.25]).expect("inside");
        assert!((s - 0.125).abs() < 1e-6);
        assert!((t - 0.625).abs() < 1e-6);
        let shrunk = [-0.5, -1.0, 0.5, -1.0, -0.5, 1.0, 0.5, 1.0];
        assert!(quad_params(&shrunk, [-0.75, 0.0]).is_none());
    }

    #[test]
    fn texel_centers_sample_exactly() {
        let mut texture = RgbaImage::new(2, 1);
        texture.put_pixel(1, 0, image::Rgba([255, 255, 255, 255]));
        assert_eq!(sample_linear(&texture, [0.25, 0.5]), [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(sample_linear(&texture, [0.75, 0.5]), [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(sample_linear(&texture, [0.5, 0.5])[0], 0.5);
    }

    #[test]
    fn unorm_rounds_to_nearest() {
        assert_eq!(to_unorm8([0.80294, 1.5, -0.2, 1.0]), [205, 255, 0, 255]);
    }
}
