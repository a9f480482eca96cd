use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Bus technology, keyed by the raw type code stored in bus configurations.
///
/// Single-wire addressable types live in 16-31, analog types in 40-47,
/// clocked (data + clock) types in 48-63 and network types in 80-95.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
#[repr(u8)]
pub enum BusKind {
    Ws2812Rgb = 22,
    Gs8608 = 23,
    Ws2811Slow = 24,
    Tm1829 = 25,
    Sk6812Rgbw = 30,
    Tm1814 = 31,
    OnOff = 40,
    Analog1Ch = 41,
    Analog2Ch = 42,
    Analog3Ch = 43,
    Analog4Ch = 44,
    Analog5Ch = 45,
    Ws2801 = 50,
    Apa102 = 51,
    Lpd8806 = 52,
    P9813 = 53,
    NetDdpRgb = 80,
    NetE131Rgb = 81,
    NetArtnetRgb = 82,
}

impl BusKind {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use BusKind::*;
        Some(match code {
            22 => Ws2812Rgb,
            23 => Gs8608,
            24 => Ws2811Slow,
            25 => Tm1829,
            30 => Sk6812Rgbw,
            31 => Tm1814,
            40 => OnOff,
            41 => Analog1Ch,
            42 => Analog2Ch,
            43 => Analog3Ch,
            44 => Analog4Ch,
            45 => Analog5Ch,
            50 => Ws2801,
            51 => Apa102,
            52 => Lpd8806,
            53 => P9813,
            80 => NetDdpRgb,
            81 => NetE131Rgb,
            82 => NetArtnetRgb,
            _ => return None,
        })
    }

    pub fn is_network(&self) -> bool {
        (80..96).contains(&self.code())
    }

    /// Addressable types carry bit 4 of the code. Network codes carry it too,
    /// so they are excluded first.
    pub fn is_addressable(&self) -> bool {
        !self.is_network() && self.code() & 0x10 != 0
    }

    pub fn is_pwm(&self) -> bool {
        (41..=45).contains(&self.code())
    }

    pub fn is_two_pin(&self) -> bool {
        self.is_addressable() && self.code() > 47
    }

    /// Channel count of an analog type.
    pub fn pwm_channels(&self) -> Option<u8> {
        match self.is_pwm() {
            true => Some(self.code() - 40),
            false => None,
        }
    }

    /// Pin slots meaningful for this kind. Network buses use the four slots
    /// for the destination address.
    pub fn pin_count(&self) -> usize {
        if self.is_network() {
            4
        } else if self.is_two_pin() {
            2
        } else if let Some(channels) = self.pwm_channels() {
            channels as usize
        } else {
            1
        }
    }

    pub fn is_rgbw(&self) -> bool {
        match self {
            BusKind::Sk6812Rgbw | BusKind::Tm1814 => true,
            _ => self.is_pwm() && *self != BusKind::Analog3Ch,
        }
    }

    pub fn always_refreshes(&self) -> bool {
        *self == BusKind::Tm1814
    }
}
