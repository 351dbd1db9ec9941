use std::fmt::{Display, Formatter};

/// Semantic role of one plane of an audio track.
///
/// The eight standard speaker positions have fixed ordinals `0..8`. Anything
/// after them is a user defined channel; `User(i)` has ordinal `8 + i`
/// when that fits in a `u32`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Channel {
    Left,
    Right,
    Center,
    LowFrequency,
    SurroundLeft,
    SurroundRight,
    BackSurroundLeft,
    BackSurroundRight,
    /// User defined channel, the value is the offset from the first one.
    User(u32),
}

impl Channel {
    /// Number of standard channels, also the ordinal of the first user channel.
    pub const COUNT: u32 = 8;

    /// Returns `None` for user channels past `u32::MAX - COUNT`.
    pub const fn ordinal(self) -> Option<u32> {
        match self {
            Channel::Left => Some(0),
            Channel::Right => Some(1),
            Channel::Center => Some(2),
            Channel::LowFrequency => Some(3),
            Channel::SurroundLeft => Some(4),
            Channel::SurroundRight => Some(5),
            Channel::BackSurroundLeft => Some(6),
            Channel::BackSurroundRight => Some(7),
            Channel::User(i) => Self::COUNT.checked_add(i),
        }
    }

    pub const fn from_ordinal(ordinal: u32) -> Self {
        match ordinal {
            0 => Channel::Left,
            1 => Channel::Right,
            2 => Channel::Center,
            3 => Channel::LowFrequency,
            4 => Channel::SurroundLeft,
            5 => Channel::SurroundRight,
            6 => Channel::BackSurroundLeft,
            7 => Channel::BackSurroundRight,
            n => Channel::User(n - Self::COUNT),
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Left => f.write_str("L"),
            Channel::Right => f.write_str("R"),
            Channel::Center => f.write_str("C"),
            Channel::LowFrequency => f.write_str("LF"),
            Channel::SurroundLeft => f.write_str("SL"),
            Channel::SurroundRight => f.write_str("SR"),
            Channel::BackSurroundLeft => f.write_str("BSL"),
            Channel::BackSurroundRight => f.write_str("BSR"),
            Channel::User(i) => write!(f, "User{}", i + 1),
        }
    }
}

/// Formats a channel list as `[L, R, C]`.
pub(crate) fn format_channels(channels: &[Channel]) -> String {
    let names = channels.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    format!("[{}]", names.join(", "))
}
