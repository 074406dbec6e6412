//! Two-input blends. The second image is set with `TwoInputFilter::set_image` or through the
//! filter's sender.

use gpuimg_core::FilterKind;
use gpuimg_runtime::{TwoInputFilter, UniformValue};

pub const MIXTURE_PERCENT: &str = "mixturePercent";

pub const ALPHA_BLEND_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;
varying highp vec2 textureCoordinate2;

uniform sampler2D inputImageTexture;
uniform sampler2D inputImageTexture2;

uniform lowp float mixturePercent;

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);
    lowp vec4 textureColor2 = texture2D(inputImageTexture2, textureCoordinate2);

    gl_FragColor = vec4(mix(textureColor.rgb, textureColor2.rgb, textureColor2.a * mixturePercent), textureColor.a);
}
";

pub const MULTIPLY_BLEND_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;
varying highp vec2 textureCoordinate2;

uniform sampler2D inputImageTexture;
uniform sampler2D inputImageTexture2;

void main()
{
    lowp vec4 base = texture2D(inputImageTexture, textureCoordinate);
    lowp vec4 overlayer = texture2D(inputImageTexture2, textureCoordinate2);

    gl_FragColor = overlayer * base + overlayer * (1.0 - base.a) + base * (1.0 - overlayer.a);
}
";

pub const OVERLAY_BLEND_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;
varying highp vec2 textureCoordinate2;

uniform sampler2D inputImageTexture;
uniform sampler2D inputImageTexture2;

void main()
{
    mediump vec4 base = texture2D(inputImageTexture, textureCoordinate);
    mediump vec4 overlay = texture2D(inputImageTexture2, textureCoordinate2);

    mediump float ra;
    if (2.0 * base.r < base.a) {
        ra = 2.0 * overlay.r * base.r + overlay.r * (1.0 - base.a) + base.r * (1.0 - overlay.a);
    } else {
        ra = overlay.a * base.a - 2.0 * (base.a - base.r) * (overlay.a - overlay.r) + overlay.r * (1.0 - base.a) + base.r * (1.0 - overlay.a);
    }

    mediump float ga;
    if (2.0 * base.g < base.a) {
        ga = 2.0 * overlay.g * base.g + overlay.g * (1.0 - base.a) + base.g * (1.0 - overlay.a);
    } else {
        ga = overlay.a * base.a - 2.0 * (base.a - base.g) * (overlay.a - overlay.g) + overlay.g * (1.0 - base.a) + base.g * (1.0 - overlay.a);
    }

    mediump float ba;
    if (2.0 * base.b < base.a) {
        ba = 2.0 * overlay.b * base.b + overlay.b * (1.0 - base.a) + base.b * (1.0 - overlay.a);
    } else {
        ba = overlay.a * base.a - 2.0 * (base.a - base.b) * (overlay.a - overlay.b) + overlay.b * (1.0 - base.a) + base.b * (1.0 - overlay.a);
    }

    gl_FragColor = vec4(ra, ga, ba, 1.0);
}
";

/// Mixes the second image over the first by its alpha times `mix`.
pub fn alpha_blend(mix: f32) -> TwoInputFilter {
    TwoInputFilter::new(FilterKind::AlphaBlend, ALPHA_BLEND_FRAGMENT_SHADER)
        .with_uniform(MIXTURE_PERCENT, UniformValue::Float(mix))
}

pub fn multiply_blend() -> TwoInputFilter {
    TwoInputFilter::new(FilterKind::MultiplyBlend, MULTIPLY_BLEND_FRAGMENT_SHADER)
}

pub fn overlay_blend() -> TwoInputFilter {
    TwoInputFilter::new(FilterKind::OverlayBlend, OVERLAY_BLEND_FRAGMENT_SHADER)
}
