use serde::{Deserialize, Serialize};
use std::fmt::Display;
use strum::{Display as StrumDisplay, EnumIter};

/// Packed pixel color, `0xWWRRGGBB`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0);

    pub const fn from_rgbw(r: u8, g: u8, b: u8, w: u8) -> Self {
        Color(((w as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32))
    }

    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_rgbw(r, g, b, 0)
    }

    pub const fn r(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn g(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn b(&self) -> u8 {
        self.0 as u8
    }

    pub const fn w(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Same color with the white channel dropped.
    pub const fn without_white(&self) -> Self {
        Color(self.0 & 0x00FF_FFFF)
    }
}

impl From<u32> for Color {
    fn from(value: u32) -> Self {
        Color(value)
    }
}

impl From<Color> for u32 {
    fn from(value: Color) -> Self {
        value.0
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}

/// Channel permutation applied when a color is written to the wire.
///
/// The numeric codes are the ones stored in bus configurations, so they must
/// stay stable.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, EnumIter, StrumDisplay)]
#[repr(u8)]
pub enum ColorOrder {
    #[default]
    Grb = 0,
    Rgb = 1,
    Brg = 2,
    Rbg = 3,
    Bgr = 4,
    Gbr = 5,
}

impl ColorOrder {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Wire position of each of R, G and B.
    ///
    /// `slots()[0]` is the wire slot R lands in, and so on.
    fn slots(&self) -> [usize; 3] {
        match self {
            ColorOrder::Grb => [1, 0, 2],
            ColorOrder::Rgb => [0, 1, 2],
            ColorOrder::Brg => [1, 2, 0],
            ColorOrder::Rbg => [0, 2, 1],
            ColorOrder::Bgr => [2, 1, 0],
            ColorOrder::Gbr => [2, 0, 1],
        }
    }

    /// Reorders a color into wire bytes; white always trails.
    pub fn to_wire(&self, color: Color) -> [u8; 4] {
        let slots = self.slots();
        let mut wire = [0u8; 4];
        wire[slots[0]] = color.r();
        wire[slots[1]] = color.g();
        wire[slots[2]] = color.b();
        wire[3] = color.w();
        wire
    }

    pub fn from_wire(&self, wire: [u8; 4]) -> Color {
        let slots = self.slots();
        Color::from_rgbw(wire[slots[0]], wire[slots[1]], wire[slots[2]], wire[3])
    }
}

impl TryFrom<u8> for ColorOrder {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ColorOrder::Grb),
            1 => Ok(ColorOrder::Rgb),
            2 => Ok(ColorOrder::Brg),
            3 => Ok(ColorOrder::Rbg),
            4 => Ok(ColorOrder::Bgr),
            5 => Ok(ColorOrder::Gbr),
            other => Err(other),
        }
    }
}

/// `value × brightness / 255`, truncating.
pub fn scale(value: u8, brightness: u8) -> u8 {
    ((value as u16 * brightness as u16) / 255) as u8
}
