//! Canonical channel layouts.
//!
//! Orders follow the usual platform conventions:
//!
//! ```text
//! 1: L                          (mono)
//! 2: L R                        (stereo)
//! 3: L R LF                     (2.1)
//! 4: L R BSL BSR                (quad)
//! 5: L R C BSL BSR              (quad + center)
//! 6: L R C LF SL SR             (5.1 surround)
//! 7: L R C LF BC SL SR          (6.1 surround)
//! 8: L R C LF BSL BSR SL SR     (7.1 surround)
//! ```

use crate::Channel::*;
use crate::{Channel, Error};

/// The back-center speaker of 6.1 layouts. It is not one of the standard
/// channels so it takes the first user channel.
pub const BACK_CENTER: Channel = Channel::User(0);

pub fn mono() -> Vec<Channel> {
    vec![Left]
}

pub fn stereo() -> Vec<Channel> {
    vec![Left, Right]
}

pub fn surround_2_1() -> Vec<Channel> {
    vec![Left, Right, LowFrequency]
}

pub fn quad() -> Vec<Channel> {
    vec![Left, Right, BackSurroundLeft, BackSurroundRight]
}

pub fn quad_center() -> Vec<Channel> {
    vec![Left, Right, Center, BackSurroundLeft, BackSurroundRight]
}

pub fn surround_5_1() -> Vec<Channel> {
    vec![Left, Right, Center, LowFrequency, SurroundLeft, SurroundRight]
}

pub fn surround_6_1() -> Vec<Channel> {
    vec![
        Left,
        Right,
        Center,
        LowFrequency,
        BACK_CENTER,
        SurroundLeft,
        SurroundRight,
    ]
}

pub fn surround_7_1() -> Vec<Channel> {
    vec![
        Left,
        Right,
        Center,
        LowFrequency,
        BackSurroundLeft,
        BackSurroundRight,
        SurroundLeft,
        SurroundRight,
    ]
}

/// Returns the default layout for a stream with `count` channels.
pub fn from_channel_count(count: usize) -> Result<Vec<Channel>, Error> {
    Ok(match count {
        1 => mono(),
        2 => stereo(),
        3 => surround_2_1(),
        4 => quad(),
        5 => quad_center(),
        6 => surround_5_1(),
        7 => surround_6_1(),
        8 => surround_7_1(),
        n => return Err(Error::UnsupportedChannelCount(n)),
    })
}

/// Bit set of the channels in `list`. `None` if some channel doesn't fit.
fn mask(list: &[Channel]) -> Option<u64> {
    list.iter().try_fold(0u64, |mask, c| {
        let bit = 1u64.checked_shl(c.ordinal()?)?;
        Some(mask | bit)
    })
}

/// Checks that `list` contains exactly the channels of one of the known
/// layouts (in any order, duplicates ignored) and returns that layout in
/// its canonical order.
pub fn verify(list: &[Channel]) -> Result<Vec<Channel>, Error> {
    let unsupported = || Error::UnsupportedChannels(list.to_vec());
    let mask = mask(list).ok_or_else(unsupported)?;

    let layouts: [fn() -> Vec<Channel>; 8] = [
        mono,
        stereo,
        surround_2_1,
        quad,
        quad_center,
        surround_5_1,
        surround_6_1,
        surround_7_1,
    ];

    layouts
        .iter()
        .map(|layout| layout())
        .find(|layout| Some(mask) == self::mask(layout))
        .ok_or_else(unsupported)
}
