use super::{kind::BusKind, BusError};
use crate::{color::ColorOrder, platform::Platform};
use log::debug;
use serde::{Deserialize, Serialize};

pub const MAX_BUS_PINS: usize = 5;
/// Marks a pin slot as not connected.
pub const UNUSED_PIN: u8 = 255;
/// Bit 7 of a raw type code requests a refresh while the output is off.
const IDLE_REFRESH_BIT: u8 = 0x80;

/// Normalized description of one bus, validated before the bus is built.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BusDescriptor {
    pub kind: BusKind,
    pub requires_idle_refresh: bool,
    pub pixel_count: u16,
    pub start: u16,
    pub color_order: ColorOrder,
    pub reversed: bool,
    pub skip_count: u8,
    pins: [u8; MAX_BUS_PINS],
}

impl BusDescriptor {
    pub fn new(kind: BusKind, pins: &[u8], start: u16, pixel_count: u16) -> Self {
        let mut slots = [UNUSED_PIN; MAX_BUS_PINS];
        for (slot, pin) in slots.iter_mut().zip(pins.iter().take(kind.pin_count())) {
            *slot = *pin;
        }

        BusDescriptor {
            kind,
            requires_idle_refresh: false,
            pixel_count,
            start,
            color_order: ColorOrder::default(),
            reversed: false,
            skip_count: 0,
            pins: slots,
        }
    }

    /// Decodes a bus exactly as it is stored in a configuration: the raw
    /// type byte still carries the idle refresh flag in its top bit.
    pub fn from_raw(
        raw_type: u8,
        pins: &[u8],
        start: u16,
        pixel_count: u16,
        color_order: ColorOrder,
        reversed: bool,
        skip_count: u8,
    ) -> Result<Self, BusError> {
        let requires_idle_refresh = raw_type & IDLE_REFRESH_BIT != 0;
        let code = raw_type & !IDLE_REFRESH_BIT;
        let kind = match BusKind::from_code(code) {
            Some(k) => k,
            None => return Err(BusError::UnsupportedType(code)),
        };

        Ok(Self::new(kind, pins, start, pixel_count)
            .with_color_order(color_order)
            .with_reversed(reversed)
            .with_skip(skip_count)
            .with_idle_refresh(requires_idle_refresh))
    }

    pub fn with_color_order(mut self, color_order: ColorOrder) -> Self {
        self.color_order = color_order;
        self
    }

    pub fn with_reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    pub fn with_skip(mut self, skip_count: u8) -> Self {
        self.skip_count = skip_count;
        self
    }

    pub fn with_idle_refresh(mut self, requires_idle_refresh: bool) -> Self {
        self.requires_idle_refresh = requires_idle_refresh;
        self
    }

    /// The meaningful pin slots for this kind.
    pub fn pins(&self) -> &[u8] {
        &self.pins[..self.kind.pin_count()]
    }

    pub fn end(&self) -> u32 {
        self.start as u32 + self.pixel_count as u32
    }

    /// Clamps the length into the platform limits and returns `total` grown
    /// to cover this bus. Fails only when the bus starts past the last
    /// addressable pixel.
    pub fn adjust_bounds(&mut self, total: u16, platform: Platform) -> Result<u16, BusError> {
        let max_leds = platform.max_leds();
        self.pixel_count = self.pixel_count.clamp(1, platform.max_leds_per_bus());

        if self.start >= max_leds {
            return Err(BusError::StartOutOfRange(self.start));
        }

        if self.end() > max_leds as u32 {
            debug!(
                "bus at {} truncated from {} to {} pixels",
                self.start,
                self.pixel_count,
                max_leds - self.start
            );
            self.pixel_count = max_leds - self.start;
        }

        Ok(total.max(self.end() as u16))
    }
}
