use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Limits the bus layer has to respect on a given controller family.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, EnumIter, Display)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Esp8266,
    #[default]
    Esp32,
}

pub const MAX_LEDS_PER_BUS: u16 = 2048;

impl Platform {
    pub fn max_leds(&self) -> u16 {
        match self {
            Platform::Esp8266 => 1664,
            Platform::Esp32 => 8192,
        }
    }

    pub fn max_leds_per_bus(&self) -> u16 {
        MAX_LEDS_PER_BUS
    }

    pub fn max_buses(&self) -> usize {
        match self {
            Platform::Esp8266 => 3,
            Platform::Esp32 => 10,
        }
    }

    /// Bytes of RAM the whole LED configuration may consume.
    pub fn max_led_memory(&self) -> u32 {
        match self {
            Platform::Esp8266 => 4000,
            Platform::Esp32 => 64000,
        }
    }

    pub fn pwm_frequency_hz(&self) -> u32 {
        match self {
            Platform::Esp8266 => 880,
            Platform::Esp32 => 19531,
        }
    }

    /// Size of the shared PWM channel pool, `None` when PWM is driven
    /// directly on the pin.
    pub fn channel_slots(&self) -> Option<u8> {
        match self {
            Platform::Esp8266 => None,
            Platform::Esp32 => Some(16),
        }
    }

    /// Pin wired to the on-board status LED.
    pub fn status_led_pin(&self) -> Option<u8> {
        match self {
            Platform::Esp8266 => Some(2),
            Platform::Esp32 => None,
        }
    }

    /// Pin whose addressable output goes through the I2S DMA engine.
    pub fn dma_pin(&self) -> Option<u8> {
        match self {
            Platform::Esp8266 => Some(3),
            Platform::Esp32 => None,
        }
    }

    /// Hardware SPI (data, clock) pins.
    pub fn hw_spi_pins(&self) -> (u8, u8) {
        match self {
            Platform::Esp8266 => (13, 14),
            Platform::Esp32 => (23, 18),
        }
    }
}
