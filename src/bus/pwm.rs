use super::{
    descriptor::{BusDescriptor, MAX_BUS_PINS},
    kind::BusKind,
    BusBackends, BusError, LedBus,
};
use crate::{
    color::{scale, Color, ColorOrder},
    gpio::{ChannelSlotClaim, PinClaim, PinOwner},
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::{collections::HashMap, fmt::Display, sync::Arc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum PwmError {
    InvalidConfig(String),
    ChannelNotFound(u8),
    NotAttached(u8),
    OsError(String),
}

impl Display for PwmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&match self {
            PwmError::InvalidConfig(msg) => format!("invalid PWM config: {}", msg),
            PwmError::ChannelNotFound(pin) => format!("pin {} has no PWM channel", pin),
            PwmError::NotAttached(pin) => format!("pin {} is not attached to a PWM channel", pin),
            PwmError::OsError(msg) => format!("OS error: {}", msg),
        })
    }
}

impl std::error::Error for PwmError {}

/// One PWM output: the pin and, on platforms with a shared channel pool, the
/// channel slot it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmOutput {
    pub pin: u8,
    pub slot: Option<u8>,
}

/// Platform PWM peripheral. Duty cycles are 8 bit.
pub trait PwmWriter: Send {
    fn attach(&mut self, output: PwmOutput, frequency_hz: u32) -> Result<(), PwmError>;
    fn write(&mut self, output: PwmOutput, duty: u8) -> Result<(), PwmError>;
    /// Drives the output low and detaches it.
    fn detach(&mut self, output: PwmOutput) -> Result<(), PwmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmPinState {
    pub slot: Option<u8>,
    pub frequency_hz: u32,
    pub duty: u8,
}

/// PWM writer that only records duty cycles, keyed by pin.
#[derive(Clone, Default)]
pub struct MemoryPwmWriter {
    outputs: Arc<Mutex<HashMap<u8, PwmPinState>>>,
}

impl MemoryPwmWriter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn output(&self, pin: u8) -> Option<PwmPinState> {
        self.outputs.lock().get(&pin).copied()
    }

    #[cfg(test)]
    pub fn duty(&self, pin: u8) -> Option<u8> {
        self.output(pin).map(|o| o.duty)
    }

    #[cfg(test)]
    pub fn attached_pins(&self) -> Vec<u8> {
        let mut pins: Vec<u8> = self.outputs.lock().keys().copied().collect();
        pins.sort_unstable();
        pins
    }
}

impl PwmWriter for MemoryPwmWriter {
    fn attach(&mut self, output: PwmOutput, frequency_hz: u32) -> Result<(), PwmError> {
        self.outputs.lock().insert(
            output.pin,
            PwmPinState {
                slot: output.slot,
                frequency_hz,
                duty: 0,
            },
        );
        Ok(())
    }

    fn write(&mut self, output: PwmOutput, duty: u8) -> Result<(), PwmError> {
        match self.outputs.lock().get_mut(&output.pin) {
            Some(state) => {
                state.duty = duty;
                Ok(())
            }
            None => Err(PwmError::NotAttached(output.pin)),
        }
    }

    fn detach(&mut self, output: PwmOutput) -> Result<(), PwmError> {
        match self.outputs.lock().remove(&output.pin) {
            Some(_) => Ok(()),
            None => Err(PwmError::NotAttached(output.pin)),
        }
    }
}

/// Non-addressable fixture with one PWM output per color channel.
/// Only pixel 0 exists.
pub struct AnalogPwmBus {
    id: Uuid,
    kind: BusKind,
    start: u16,
    reversed: bool,
    brightness: u8,
    data: [u8; MAX_BUS_PINS],
    frequency_hz: u32,
    writer: Arc<Mutex<dyn PwmWriter>>,
    outputs: Vec<PwmOutput>,
    pins: Vec<PinClaim>,
    slots: Option<ChannelSlotClaim>,
    valid: bool,
}

impl AnalogPwmBus {
    pub fn new(descriptor: &BusDescriptor, backends: &BusBackends) -> Self {
        let mut bus = AnalogPwmBus {
            id: Uuid::new_v4(),
            kind: descriptor.kind,
            start: descriptor.start,
            reversed: descriptor.reversed,
            brightness: 255,
            data: [0; MAX_BUS_PINS],
            frequency_hz: backends.platform.pwm_frequency_hz(),
            writer: backends.pwm.clone(),
            outputs: Vec::new(),
            pins: Vec::new(),
            slots: None,
            valid: false,
        };

        match bus.init(descriptor, backends) {
            Ok(()) => {
                bus.valid = true;
                info!(
                    "Initialized analog bus with type {} on pins {:?}",
                    bus.kind,
                    descriptor.pins()
                );
            }
            Err(e) => {
                warn!("Failed to initialize analog bus with type {}: {}", bus.kind, e);
                bus.cleanup();
            }
        }

        bus
    }

    fn init(&mut self, descriptor: &BusDescriptor, backends: &BusBackends) -> Result<(), BusError> {
        let channels = match self.kind.pwm_channels() {
            Some(c) => c,
            None => return Err(BusError::NoDriver(self.kind)),
        };

        if backends.platform.channel_slots().is_some() {
            self.slots = Some(ChannelSlotClaim::reserve(&backends.ledger, channels)?);
        }

        for pin in descriptor.pins() {
            let claim = PinClaim::acquire(&backends.ledger, *pin, true, PinOwner::BusPwm, self.id)?;
            // only claims that succeeded are recorded, so teardown never
            // hands back a pin this bus does not own
            self.pins.push(claim);
        }

        let first_slot = self.slots.as_ref().map(|s| s.first());
        let mut writer = self.writer.lock();
        for (i, claim) in self.pins.iter().enumerate() {
            let output = PwmOutput {
                pin: claim.pin(),
                slot: first_slot.map(|first| first + i as u8),
            };
            writer.attach(output, self.frequency_hz)?;
            self.outputs.push(output);
        }

        Ok(())
    }

    /// Last duty cycles written per channel, before brightness.
    pub fn channel_values(&self) -> &[u8] {
        &self.data[..self.outputs.len()]
    }

    pub fn channel_slot_start(&self) -> Option<u8> {
        self.slots.as_ref().map(|s| s.first())
    }
}

impl LedBus for AnalogPwmBus {
    fn id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> BusKind {
        self.kind
    }

    fn start(&self) -> u16 {
        self.start
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn set_pixel(&mut self, index: u16, color: Color) {
        if index != 0 || !self.valid {
            return;
        }

        let (r, g, b, w) = (color.r(), color.g(), color.b(), color.w());
        match self.kind {
            // single channel takes the brightest component
            BusKind::Analog1Ch => self.data[0] = r.max(g).max(b).max(w),
            BusKind::Analog2Ch | BusKind::Analog3Ch | BusKind::Analog4Ch | BusKind::Analog5Ch => {
                self.data = [r, g, b, w, 0];
            }
            _ => {}
        }
    }

    fn get_pixel(&self, index: u16) -> Color {
        if index != 0 || !self.valid {
            return Color::BLACK;
        }

        Color::from_rgbw(self.data[0], self.data[1], self.data[2], self.data[3])
    }

    fn render(&mut self) {
        if !self.valid {
            return;
        }

        let mut writer = self.writer.lock();
        for (output, value) in self.outputs.iter().zip(self.data.iter()) {
            let mut duty = scale(*value, self.brightness);
            if self.reversed {
                duty = 255 - duty;
            }

            if let Err(e) = writer.write(*output, duty) {
                warn!("Failed to write PWM output on pin {}: {}", output.pin, e);
            }
        }
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }

    fn length(&self) -> u16 {
        match self.valid {
            true => 1,
            false => 0,
        }
    }

    fn color_order(&self) -> ColorOrder {
        ColorOrder::Rgb
    }

    fn report_pins(&self, pins: &mut [u8; MAX_BUS_PINS]) -> usize {
        if !self.valid {
            return 0;
        }

        for (slot, claim) in pins.iter_mut().zip(self.pins.iter()) {
            *slot = claim.pin();
        }
        self.pins.len()
    }

    fn cleanup(&mut self) {
        if self.pins.is_empty() && self.slots.is_none() {
            return;
        }

        debug!("Analog bus cleanup ({})", self.id);
        self.valid = false;
        {
            let mut writer = self.writer.lock();
            for output in self.outputs.drain(..) {
                if let Err(e) = writer.detach(output) {
                    warn!("Failed to quiesce PWM output on pin {}: {}", output.pin, e);
                }
            }
        }

        while let Some(claim) = self.pins.pop() {
            drop(claim);
        }
        self.slots = None;
    }
}

impl Drop for AnalogPwmBus {
    fn drop(&mut self) {
        self.cleanup();
    }
}
