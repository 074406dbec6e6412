//! Full-screen quad geometry and the rotation/flip texture-coordinate table.
//!
//! All quads are four `(x, y)` pairs in triangle-strip order:
//! bottom-left, bottom-right, top-left, top-right.

use serde::{Deserialize, Serialize};

/// Eight floats: four 2-D vertices of a triangle strip.
pub type Quad = [f32; 8];

/// Clip-space positions covering the whole viewport.
pub const CUBE: Quad = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

const TEXTURE_NO_ROTATION: Quad = [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
const TEXTURE_ROTATED_90: Quad = [1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
const TEXTURE_ROTATED_180: Quad = [1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0];
const TEXTURE_ROTATED_270: Quad = [0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0];

/// Quarter-turn rotation applied to sampling coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    Normal,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl Rotation {
    /// Maps any multiple of 90 degrees (negative values included) to a rotation.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Normal),
            90 => Some(Rotation::Rotation90),
            180 => Some(Rotation::Rotation180),
            270 => Some(Rotation::Rotation270),
            _ => None,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Normal => 0,
            Rotation::Rotation90 => 90,
            Rotation::Rotation180 => 180,
            Rotation::Rotation270 => 270,
        }
    }

    /// 90 and 270 swap the roles of output width and height.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::Rotation90 | Rotation::Rotation270)
    }

    fn base_coords(self) -> Quad {
        match self {
            Rotation::Normal => TEXTURE_NO_ROTATION,
            Rotation::Rotation90 => TEXTURE_ROTATED_90,
            Rotation::Rotation180 => TEXTURE_ROTATED_180,
            Rotation::Rotation270 => TEXTURE_ROTATED_270,
        }
    }
}

/// How an image is fitted into an output of a different aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleType {
    /// Fill the output, cropping whatever overflows.
    #[default]
    CenterCrop,
    /// Fit inside the output, leaving background bars.
    CenterInside,
}

/// Texture coordinates for `rotation`, then mirrored per axis.
///
/// A flip complements the x (horizontal) or y (vertical) component of each vertex.
pub fn texture_coords(rotation: Rotation, flip_horizontal: bool, flip_vertical: bool) -> Quad {
    let mut coords = rotation.base_coords();
    for (i, c) in coords.iter_mut().enumerate() {
        let is_x = i % 2 == 0;
        if (is_x && flip_horizontal) || (!is_x && flip_vertical) {
            *c = 1.0 - *c;
        }
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROTATIONS: [Rotation; 4] = [
        Rotation::Normal,
        Rotation::Rotation90,
        Rotation::Rotation180,
        Rotation::Rotation270,
    ];

    #[test]
    fn canonical_and_vertically_flipped_tables() {
        assert_eq!(
            texture_coords(Rotation::Normal, false, false),
            [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0]
        );
        assert_eq!(
            texture_coords(Rotation::Normal, false, true),
            [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]
        );
    }

    #[test]
    fn half_turn_equals_both_flips() {
        assert_eq!(
            texture_coords(Rotation::Rotation180, false, false),
            texture_coords(Rotation::Normal, true, true)
        );
    }

    #[test]
    fn flipping_twice_is_identity() {
        for rotation in ROTATIONS {
            let base = texture_coords(rotation, false, false);
            let mut twice = texture_coords(rotation, true, true);
            for c in twice.iter_mut() {
                *c = 1.0 - *c;
            }
            assert_eq!(base, twice, "{rotation:?}");
        }
    }

    #[test]
    fn every_entry_is_a_texture_corner() {
        for rotation in ROTATIONS {
            for (fh, fv) in [(false, false), (true, false), (false, true), (true, true)] {
                let coords = texture_coords(rotation, fh, fv);
                assert!(coords.iter().all(|c| *c == 0.0 || *c == 1.0));
            }
        }
    }

    #[test]
    fn degrees_normalize() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Rotation270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Rotation90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert!(Rotation::Rotation270.is_quarter_turn());
        assert!(!Rotation::Rotation180.is_quarter_turn());
    }
}
