use std::fmt;
use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Three-channel value used both as a position and as an RGB-like triple.
///
/// Channels keep their geometric names (`x`, `y`, `z`); when bound to a color
/// uniform they carry red, green and blue respectively.
pub type Vector3 = Vec3;

/// Componentwise sum of two values.
pub fn add(a: Vector3, b: Vector3) -> Vector3 {
    Vector3::new(a.x + b.x, a.y + b.y, a.z + b.z)
}

/// Returns a copy of `value` with exactly one channel replaced.
pub fn with_channel(value: Vector3, channel: Channel, new_value: f32) -> Vector3 {
    let mut next = value;
    match channel {
        Channel::X => next.x = new_value,
        Channel::Y => next.y = new_value,
        Channel::Z => next.z = new_value,
    }
    next
}

/// One of the three components of a [`Vector3`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    X,
    Y,
    Z,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::X, Channel::Y, Channel::Z];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::X => "x",
            Channel::Y => "y",
            Channel::Z => "z",
        }
    }

    /// Color name shown next to the input for this channel.
    pub fn color_label(self) -> &'static str {
        match self {
            Channel::X => "Red",
            Channel::Y => "Green",
            Channel::Z => "Blue",
        }
    }

    pub fn get(self, value: Vector3) -> f32 {
        match self {
            Channel::X => value.x,
            Channel::Y => value.y,
            Channel::Z => value.z,
        }
    }
}

impl FromStr for Channel {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" => Ok(Channel::X),
            "y" => Ok(Channel::Y),
            "z" => Ok(Channel::Z),
            other => Err(ControlError::UnknownChannel(other.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
