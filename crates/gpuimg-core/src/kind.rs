use serde::{Deserialize, Serialize};

/// Type tag carried by every filter.
///
/// Registries key their per-type behaviour (construction, slider adjustment) on this tag
/// instead of matching on concrete filter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Passthrough,
    Group,
    Brightness,
    Contrast,
    Gamma,
    Exposure,
    Saturation,
    Grayscale,
    ColorInvert,
    Opacity,
    BoxBlur,
    AlphaBlend,
    MultiplyBlend,
    OverlayBlend,
    Custom,
}

impl FilterKind {
    pub fn label(self) -> &'static str {
        match self {
            FilterKind::Passthrough => "Passthrough",
            FilterKind::Group => "Group",
            FilterKind::Brightness => "Brightness",
            FilterKind::Contrast => "Contrast",
            FilterKind::Gamma => "Gamma",
            FilterKind::Exposure => "Exposure",
            FilterKind::Saturation => "Saturation",
            FilterKind::Grayscale => "Grayscale",
            FilterKind::ColorInvert => "Invert",
            FilterKind::Opacity => "Opacity",
            FilterKind::BoxBlur => "Box Blur",
            FilterKind::AlphaBlend => "Blend (Alpha)",
            FilterKind::MultiplyBlend => "Blend (Multiply)",
            FilterKind::OverlayBlend => "Blend (Overlay)",
            FilterKind::Custom => "Custom",
        }
    }
}
