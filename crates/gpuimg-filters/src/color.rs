//! Per-pixel color adjustments. Each is a single pass over the input.

use gpuimg_core::FilterKind;
use gpuimg_runtime::{ShaderFilter, UniformValue, NO_FILTER_VERTEX_SHADER};

pub const BRIGHTNESS: &str = "brightness";
pub const CONTRAST: &str = "contrast";
pub const GAMMA: &str = "gamma";
pub const EXPOSURE: &str = "exposure";
pub const SATURATION: &str = "saturation";
pub const OPACITY: &str = "opacity";

pub const BRIGHTNESS_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;
uniform lowp float brightness;

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);

    gl_FragColor = vec4((textureColor.rgb + vec3(brightness)), textureColor.w);
}
";

pub const CONTRAST_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;
uniform lowp float contrast;

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);

    gl_FragColor = vec4(((textureColor.rgb - vec3(0.5)) * contrast + vec3(0.5)), textureColor.w);
}
";

pub const GAMMA_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;
uniform lowp float gamma;

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);

    gl_FragColor = vec4(pow(textureColor.rgb, vec3(gamma)), textureColor.w);
}
";

pub const EXPOSURE_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;
uniform highp float exposure;

void main()
{
    highp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);

    gl_FragColor = vec4(textureColor.rgb * pow(2.0, exposure), textureColor.w);
}
";

pub const SATURATION_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;
uniform lowp float saturation;

const mediump vec3 luminanceWeighting = vec3(0.2125, 0.7154, 0.0721);

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);
    lowp float luminance = dot(textureColor.rgb, luminanceWeighting);
    lowp vec3 greyScaleColor = vec3(luminance);

    gl_FragColor = vec4(mix(greyScaleColor, textureColor.rgb, saturation), textureColor.w);
}
";

pub const GRAYSCALE_FRAGMENT_SHADER: &str = "\
precision highp float;

varying vec2 textureCoordinate;

uniform sampler2D inputImageTexture;

const highp vec3 W = vec3(0.2125, 0.7154, 0.0721);

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);
    float luminance = dot(textureColor.rgb, W);

    gl_FragColor = vec4(vec3(luminance), textureColor.a);
}
";

pub const COLOR_INVERT_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);

    gl_FragColor = vec4((1.0 - textureColor.rgb), textureColor.w);
}
";

pub const OPACITY_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;
uniform lowp float opacity;

void main()
{
    lowp vec4 textureColor = texture2D(inputImageTexture, textureCoordinate);

    gl_FragColor = vec4(textureColor.rgb, textureColor.a * opacity);
}
";

fn single(kind: FilterKind, fragment: &'static str) -> ShaderFilter {
    ShaderFilter::new(kind, NO_FILTER_VERTEX_SHADER, fragment)
}

fn with_float(kind: FilterKind, fragment: &'static str, name: &str, value: f32) -> ShaderFilter {
    single(kind, fragment).with_uniform(name, UniformValue::Float(value))
}

/// Adds `value` to each color channel. Neutral at 0.0.
pub fn brightness(value: f32) -> ShaderFilter {
    with_float(FilterKind::Brightness, BRIGHTNESS_FRAGMENT_SHADER, BRIGHTNESS, value)
}

/// Scales distance from mid-gray. Neutral at 1.0.
pub fn contrast(value: f32) -> ShaderFilter {
    with_float(FilterKind::Contrast, CONTRAST_FRAGMENT_SHADER, CONTRAST, value)
}

pub fn gamma(value: f32) -> ShaderFilter {
    with_float(FilterKind::Gamma, GAMMA_FRAGMENT_SHADER, GAMMA, value)
}

/// Exposure in stops.
pub fn exposure(value: f32) -> ShaderFilter {
    with_float(FilterKind::Exposure, EXPOSURE_FRAGMENT_SHADER, EXPOSURE, value)
}

pub fn saturation(value: f32) -> ShaderFilter {
    with_float(FilterKind::Saturation, SATURATION_FRAGMENT_SHADER, SATURATION, value)
}

pub fn grayscale() -> ShaderFilter {
    single(FilterKind::Grayscale, GRAYSCALE_FRAGMENT_SHADER)
}

pub fn color_invert() -> ShaderFilter {
    single(FilterKind::ColorInvert, COLOR_INVERT_FRAGMENT_SHADER)
}

pub fn opacity(value: f32) -> ShaderFilter {
    with_float(FilterKind::Opacity, OPACITY_FRAGMENT_SHADER, OPACITY, value)
}
