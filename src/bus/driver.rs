//! Seam between addressable buses and the waveform drivers that actually
//! clock pixels out of a pin.
//!
//! Drivers are resolved in two steps, like the hardware they stand for: the
//! bus type, pins and registry slot pick an output method (a UART, the I2S
//! DMA engine, an RMT channel, SPI...), then the factory instantiates a
//! driver of that kind sized to the strip.

use super::{kind::BusKind, BusError};
use crate::{
    color::{scale, Color, ColorOrder},
    platform::Platform,
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use strum::Display;

/// RMT channels available for addressable output on an ESP32.
const RMT_CHANNELS: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum OutputMethod {
    Uart0,
    Uart1,
    Dma,
    BitBang,
    Rmt(u8),
    I2s1,
    HwSpi,
    SoftSpi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverKind {
    pub protocol: BusKind,
    pub method: OutputMethod,
}

/// Picks the output method for an addressable bus, `None` when the platform
/// has no way of driving it.
pub fn resolve_driver(platform: Platform, kind: BusKind, pins: &[u8], index: u8) -> Option<DriverKind> {
    if !kind.is_addressable() {
        return None;
    }

    let method = if kind.is_two_pin() {
        match pins {
            [data, clock, ..] if (*data, *clock) == platform.hw_spi_pins() => OutputMethod::HwSpi,
            [_, _, ..] => OutputMethod::SoftSpi,
            _ => return None,
        }
    } else {
        let pin = *pins.first()?;
        match platform {
            Platform::Esp8266 => match pin {
                1 => OutputMethod::Uart0,
                2 => OutputMethod::Uart1,
                p if Some(p) == platform.dma_pin() => OutputMethod::Dma,
                _ => OutputMethod::BitBang,
            },
            Platform::Esp32 => match index {
                i if i < RMT_CHANNELS => OutputMethod::Rmt(i),
                i if i == RMT_CHANNELS => OutputMethod::I2s1,
                _ => return None,
            },
        }
    };

    Some(DriverKind { protocol: kind, method })
}

/// A driver instance bound to one strip.
pub trait LedDriver: Send {
    fn begin(&mut self);
    fn show(&mut self);
    fn can_show(&self) -> bool;
    fn set_brightness(&mut self, brightness: u8);
    fn set_pixel_color(&mut self, index: u16, color: Color, order: ColorOrder);
    fn get_pixel_color(&self, index: u16, order: ColorOrder) -> Color;
    fn len(&self) -> u16;
}

pub trait DriverFactory: Send + Sync {
    fn platform(&self) -> Platform;

    fn resolve(&self, kind: BusKind, pins: &[u8], index: u8) -> Option<DriverKind> {
        resolve_driver(self.platform(), kind, pins, index)
    }

    /// Instantiates a driver for `len` physical pixels. Dropping the
    /// returned driver destroys it.
    fn create(&self, driver: DriverKind, pins: &[u8], len: u16, index: u8) -> Result<Box<dyn LedDriver>, BusError>;
}

/// Pixel state of one in-memory strip, as the driver last saw it.
pub struct MemoryStrip {
    pub driver: DriverKind,
    pub pins: Vec<u8>,
    /// Unscaled wire bytes, already in the strip's color order.
    pub pixels: Vec<[u8; 4]>,
    /// Wire bytes of the last `show()`, scaled by brightness.
    pub shown: Vec<[u8; 4]>,
    pub brightness: u8,
    pub show_count: u32,
    pub begin_count: u32,
}

pub type SharedStrip = Arc<Mutex<MemoryStrip>>;

pub struct MemoryDriver {
    strip: SharedStrip,
    len: u16,
}

impl LedDriver for MemoryDriver {
    fn begin(&mut self) {
        self.strip.lock().begin_count += 1;
    }

    fn show(&mut self) {
        let mut strip = self.strip.lock();
        let brightness = strip.brightness;
        let frame: Vec<[u8; 4]> = strip
            .pixels
            .iter()
            .map(|px| px.map(|channel| scale(channel, brightness)))
            .collect();
        strip.shown = frame;
        strip.show_count += 1;
    }

    fn can_show(&self) -> bool {
        true
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.strip.lock().brightness = brightness;
    }

    fn set_pixel_color(&mut self, index: u16, color: Color, order: ColorOrder) {
        let mut strip = self.strip.lock();
        let rgbw = strip.driver.protocol.is_rgbw();
        if let Some(px) = strip.pixels.get_mut(index as usize) {
            *px = order.to_wire(if rgbw { color } else { color.without_white() });
        }
    }

    fn get_pixel_color(&self, index: u16, order: ColorOrder) -> Color {
        match self.strip.lock().pixels.get(index as usize) {
            Some(px) => order.from_wire(*px),
            None => Color::BLACK,
        }
    }

    fn len(&self) -> u16 {
        self.len
    }
}

/// Factory for drivers that keep pixels in RAM instead of clocking them out.
/// Used as the preview backend and in tests; every strip it creates is kept
/// by registry slot.
pub struct MemoryDriverFactory {
    platform: Platform,
    pixel_budget: Option<u32>,
    strips: Mutex<HashMap<u8, SharedStrip>>,
}

impl MemoryDriverFactory {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            pixel_budget: None,
            strips: Mutex::new(HashMap::new()),
        }
    }

    /// Refuses to create strips longer than `pixels`.
    #[cfg(test)]
    pub fn with_pixel_budget(mut self, pixels: u32) -> Self {
        self.pixel_budget = Some(pixels);
        self
    }

    /// Strip created for the registry slot `index`, if any.
    #[cfg(test)]
    pub fn strip(&self, index: u8) -> Option<SharedStrip> {
        self.strips.lock().get(&index).cloned()
    }
}

impl DriverFactory for MemoryDriverFactory {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn create(&self, driver: DriverKind, pins: &[u8], len: u16, index: u8) -> Result<Box<dyn LedDriver>, BusError> {
        let bytes = len as usize * 4;
        if self.pixel_budget.map_or(false, |budget| len as u32 > budget) {
            return Err(BusError::AllocationFailed(bytes));
        }

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len as usize)
            .map_err(|_| BusError::AllocationFailed(bytes))?;
        pixels.resize(len as usize, [0; 4]);

        let strip = Arc::new(Mutex::new(MemoryStrip {
            driver,
            pins: pins.to_vec(),
            pixels,
            shown: Vec::new(),
            brightness: 255,
            show_count: 0,
            begin_count: 0,
        }));
        self.strips.lock().insert(index, strip.clone());

        Ok(Box::new(MemoryDriver { strip, len }))
    }
}
