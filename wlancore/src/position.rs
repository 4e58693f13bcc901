use std::ops::Sub;

use serde::{Deserialize, Serialize};

use crate::units::{Length, METRES};

/// Nodes closer than this are treated as this far apart so path loss stays finite.
pub const MIN_DISTANCE: Length = METRES;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: Length,
    pub y: Length,
    #[serde(default = "zero_height")]
    pub z: Length,
}

fn zero_height() -> Length {
    Length::from_metres(0.0)
}

impl Position {
    pub const ORIGIN: Position = Position {
        x: Length::from_metres(0.0),
        y: Length::from_metres(0.0),
        z: Length::from_metres(0.0),
    };

    pub fn new(x: f64, y: f64, z: f64) -> Position {
        Position {
            x: Length::from_metres(x),
            y: Length::from_metres(y),
            z: Length::from_metres(z),
        }
    }

    pub fn mag(self) -> Length {
        Length::from_metres(
            (self.x.metres().powi(2) + self.y.metres().powi(2) + self.z.metres().powi(2)).sqrt(),
        )
    }

    /// Euclidean distance, never below [`MIN_DISTANCE`].
    pub fn distance_to(self, other: Position) -> Length {
        (self - other).mag().max(MIN_DISTANCE)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Self) -> Self::Output {
        Position {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::assert_close;

    use super::*;

    #[test]
    fn distance_is_symmetric() {
        let a = Position::new(3.0, 0.0, 0.0);
        let b = Position::new(0.0, 4.0, 12.0);

        assert_close(a.distance_to(b), Length::from_metres(13.0));
        assert_close(b.distance_to(a), Length::from_metres(13.0));
    }

    #[test]
    fn distance_is_clamped() {
        let a = Position::new(1.0, 1.0, 1.0);
        assert_eq!(a.distance_to(a), MIN_DISTANCE);
    }
}
