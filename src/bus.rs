use crate::{
    color::{Color, ColorOrder},
    gpio::{GpioError, SharedLedger},
    platform::Platform,
};
use parking_lot::Mutex;
use std::{fmt::Display, sync::Arc};
use uuid::Uuid;

// Bus implementations
pub mod addressable; // AddressableBus
pub mod descriptor; // BusDescriptor
pub mod driver; // DriverFactory, LedDriver
pub mod kind; // BusKind
pub mod network; // NetworkVirtualBus
pub mod pwm; // AnalogPwmBus
pub mod pwm_sysfs; // SysfsPwmWriter

use addressable::AddressableBus;
use descriptor::{BusDescriptor, MAX_BUS_PINS};
use driver::DriverFactory;
use kind::BusKind;
use network::{BroadcastTransmitter, NetworkVirtualBus};
use pwm::{AnalogPwmBus, PwmError, PwmWriter};

#[derive(Debug, Clone, PartialEq)]
pub enum BusError {
    CapacityExhausted(usize),
    ResourceConflict(GpioError),
    NoDriver(BusKind),
    UnsupportedType(u8),
    AllocationFailed(usize),
    StartOutOfRange(u16),
    Hardware(String),
}

impl Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&match self {
            BusError::CapacityExhausted(n) => format!("bus registry is full ({} buses)", n),
            BusError::ResourceConflict(e) => format!("resource conflict: {}", e),
            BusError::NoDriver(kind) => format!("no output driver matches bus type {}", kind),
            BusError::UnsupportedType(code) => format!("bus type {} is not supported", code),
            BusError::AllocationFailed(bytes) => format!("failed to allocate {} bytes", bytes),
            BusError::StartOutOfRange(start) => format!("bus start {} is beyond the last pixel", start),
            BusError::Hardware(desc) => format!("a hardware error has occurred: {}", desc),
        })
    }
}

impl std::error::Error for BusError {}

impl From<GpioError> for BusError {
    fn from(err: GpioError) -> Self {
        BusError::ResourceConflict(err)
    }
}

impl From<PwmError> for BusError {
    fn from(err: PwmError) -> Self {
        BusError::Hardware(err.to_string())
    }
}

/// Uniform pixel contract every bus variant fulfils.
///
/// An invalid bus (one that failed to acquire its resources) answers every
/// call with a no-op or a zero value.
pub trait LedBus {
    fn id(&self) -> Uuid;
    fn kind(&self) -> BusKind;
    fn start(&self) -> u16;
    fn is_valid(&self) -> bool;

    fn set_pixel(&mut self, index: u16, color: Color);
    fn get_pixel(&self, index: u16) -> Color;
    fn render(&mut self);

    fn can_render(&self) -> bool {
        true
    }

    fn set_brightness(&mut self, brightness: u8);

    /// Externally visible pixel count.
    fn length(&self) -> u16;

    fn color_order(&self) -> ColorOrder {
        ColorOrder::Rgb
    }

    fn set_color_order(&mut self, _code: u8) {}

    fn is_rgbw(&self) -> bool {
        self.is_valid() && self.kind().is_rgbw()
    }

    fn skipped_leds(&self) -> u8 {
        0
    }

    fn requires_idle_refresh(&self) -> bool {
        false
    }

    /// Writes the bus pins into `pins` and returns how many are meaningful.
    fn report_pins(&self, pins: &mut [u8; MAX_BUS_PINS]) -> usize;

    /// Releases every resource. Safe to call more than once.
    fn cleanup(&mut self);
}

/// Collaborators a bus needs to acquire and drive its outputs.
#[derive(Clone)]
pub struct BusBackends {
    pub platform: Platform,
    pub ledger: SharedLedger,
    pub drivers: Arc<dyn DriverFactory>,
    pub pwm: Arc<Mutex<dyn PwmWriter>>,
    pub transmitter: Arc<Mutex<dyn BroadcastTransmitter>>,
}

pub enum Bus {
    Addressable(AddressableBus),
    AnalogPwm(AnalogPwmBus),
    Network(NetworkVirtualBus),
}

macro_rules! dispatch {
    ($bus:expr, $inner:ident => $call:expr) => {
        match $bus {
            Bus::Addressable($inner) => $call,
            Bus::AnalogPwm($inner) => $call,
            Bus::Network($inner) => $call,
        }
    };
}

impl Bus {
    /// Builds the variant matching the descriptor's kind. `index` is the
    /// registry slot, used to pick a hardware output instance.
    pub fn build(descriptor: &BusDescriptor, index: u8, backends: &BusBackends) -> Self {
        if descriptor.kind.is_network() {
            Bus::Network(NetworkVirtualBus::new(descriptor, backends.transmitter.clone()))
        } else if descriptor.kind.is_addressable() {
            Bus::Addressable(AddressableBus::new(descriptor, index, backends))
        } else {
            Bus::AnalogPwm(AnalogPwmBus::new(descriptor, backends))
        }
    }

    pub fn as_addressable(&self) -> Option<&AddressableBus> {
        match self {
            Bus::Addressable(bus) => Some(bus),
            _ => None,
        }
    }

    pub fn as_analog_pwm(&self) -> Option<&AnalogPwmBus> {
        match self {
            Bus::AnalogPwm(bus) => Some(bus),
            _ => None,
        }
    }

    pub fn as_network(&self) -> Option<&NetworkVirtualBus> {
        match self {
            Bus::Network(bus) => Some(bus),
            _ => None,
        }
    }

    /// Whether `index` falls inside `[start, start + length)`.
    pub fn contains(&self, index: u16) -> bool {
        let start = self.start() as u32;
        let index = index as u32;
        index >= start && index < start + self.length() as u32
    }
}

impl LedBus for Bus {
    fn id(&self) -> Uuid {
        dispatch!(self, bus => bus.id())
    }

    fn kind(&self) -> BusKind {
        dispatch!(self, bus => bus.kind())
    }

    fn start(&self) -> u16 {
        dispatch!(self, bus => bus.start())
    }

    fn is_valid(&self) -> bool {
        dispatch!(self, bus => bus.is_valid())
    }

    fn set_pixel(&mut self, index: u16, color: Color) {
        dispatch!(self, bus => bus.set_pixel(index, color))
    }

    fn get_pixel(&self, index: u16) -> Color {
        dispatch!(self, bus => bus.get_pixel(index))
    }

    fn render(&mut self) {
        dispatch!(self, bus => bus.render())
    }

    fn can_render(&self) -> bool {
        dispatch!(self, bus => bus.can_render())
    }

    fn set_brightness(&mut self, brightness: u8) {
        dispatch!(self, bus => bus.set_brightness(brightness))
    }

    fn length(&self) -> u16 {
        dispatch!(self, bus => bus.length())
    }

    fn color_order(&self) -> ColorOrder {
        dispatch!(self, bus => bus.color_order())
    }

    fn set_color_order(&mut self, code: u8) {
        dispatch!(self, bus => bus.set_color_order(code))
    }

    fn is_rgbw(&self) -> bool {
        dispatch!(self, bus => bus.is_rgbw())
    }

    fn skipped_leds(&self) -> u8 {
        dispatch!(self, bus => bus.skipped_leds())
    }

    fn requires_idle_refresh(&self) -> bool {
        dispatch!(self, bus => bus.requires_idle_refresh())
    }

    fn report_pins(&self, pins: &mut [u8; MAX_BUS_PINS]) -> usize {
        dispatch!(self, bus => bus.report_pins(pins))
    }

    fn cleanup(&mut self) {
        dispatch!(self, bus => bus.cleanup())
    }
}
