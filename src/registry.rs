use crate::{
    bus::{descriptor::BusDescriptor, Bus, BusBackends, BusError, LedBus},
    color::Color,
    platform::Platform,
};
use log::{debug, info, warn};
use std::{thread, time::Duration};

const BACKOFF_START: Duration = Duration::from_micros(50);
const BACKOFF_MAX: Duration = Duration::from_millis(5);
/// Waits in `remove_all` before a stuck output gets reported.
const WAIT_WARN_AFTER: u32 = 1000;
pub const MAX_CAPACITY: usize = u8::MAX as usize + 1;

/// Approximate RAM a bus will need once built, in bytes.
///
/// DMA output buffers the encoded bit stream (five times a plain pixel
/// buffer) and the ESP32 RMT driver double-buffers; analog buses only need
/// their channel bytes.
pub fn memory_estimate(descriptor: &BusDescriptor, platform: Platform) -> u32 {
    let kind = descriptor.kind;
    if !kind.is_addressable() && !kind.is_network() {
        return 5;
    }

    let channels: u32 = if kind.is_rgbw() { 4 } else { 3 };
    if kind.is_network() {
        return descriptor.pixel_count as u32 * channels;
    }

    let len = descriptor.pixel_count as u32 + descriptor.skip_count as u32;
    if kind.is_two_pin() {
        return len * channels;
    }

    let factor = match platform {
        Platform::Esp8266 => match descriptor.pins().first() {
            Some(pin) if Some(*pin) == platform.dma_pin() => 5,
            _ => 1,
        },
        Platform::Esp32 => 2,
    };
    len * channels * factor
}

/// Owns every configured bus and exposes them as one flat pixel space.
///
/// Bus ranges may overlap; lookups resolve to the first bus in registration
/// order that covers the index.
pub struct BusRegistry {
    backends: BusBackends,
    capacity: usize,
    buses: Vec<Bus>,
}

impl BusRegistry {
    pub fn new(backends: BusBackends) -> Self {
        let capacity = backends.platform.max_buses();
        Self::with_capacity(backends, capacity)
    }

    /// Bus indices double as driver slot numbers, so at most
    /// [`MAX_CAPACITY`] buses can be held.
    pub fn with_capacity(backends: BusBackends, capacity: usize) -> Self {
        let capacity = match capacity > MAX_CAPACITY {
            true => {
                warn!("registry capacity {} clamped to {}", capacity, MAX_CAPACITY);
                MAX_CAPACITY
            }
            false => capacity,
        };

        BusRegistry {
            backends,
            capacity,
            buses: Vec::with_capacity(capacity),
        }
    }

    pub fn platform(&self) -> Platform {
        self.backends.platform
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Builds and appends a bus. Fails only when the registry is full: a bus
    /// that cannot acquire its resources is still added, as an invalid bus.
    pub fn add(&mut self, descriptor: &BusDescriptor) -> Result<usize, BusError> {
        if self.buses.len() >= self.capacity {
            return Err(BusError::CapacityExhausted(self.capacity));
        }

        let index = self.buses.len();
        let bus = Bus::build(descriptor, index as u8, &self.backends);
        if !bus.is_valid() {
            warn!("bus {} ({}) was added but is not operational", index, descriptor.kind);
        }

        self.buses.push(bus);
        Ok(index)
    }

    /// Drops every bus once no output is in flight.
    ///
    /// Blocks (yielding, then sleeping with a capped backoff) for as long as
    /// any bus reports it cannot render. There is no timeout: a transmitter
    /// that never finishes keeps this waiting.
    pub fn remove_all(&mut self) {
        debug!("Removing all buses");
        let mut backoff = BACKOFF_START;
        let mut attempts: u32 = 0;
        while !self.can_render_all() {
            thread::yield_now();
            if self.can_render_all() {
                break;
            }

            thread::sleep(backoff);
            backoff = (backoff * 2).min(BACKOFF_MAX);
            attempts += 1;
            if attempts == WAIT_WARN_AFTER {
                warn!("still waiting for in-flight bus output before removing buses");
            }
        }

        self.buses.clear();
        info!("All buses removed");
    }

    pub fn set_pixel_color(&mut self, index: u16, color: Color) {
        if let Some(bus) = self.buses.iter_mut().find(|b| b.contains(index)) {
            let start = bus.start();
            bus.set_pixel(index - start, color);
        }
    }

    pub fn get_pixel_color(&self, index: u16) -> Color {
        match self.buses.iter().find(|b| b.contains(index)) {
            Some(bus) => bus.get_pixel(index - bus.start()),
            None => Color::BLACK,
        }
    }

    /// Renders every bus in registration order, ready or not.
    pub fn render(&mut self) {
        for bus in self.buses.iter_mut() {
            bus.render();
        }
    }

    pub fn can_render_all(&self) -> bool {
        self.buses.iter().all(|b| b.can_render())
    }

    pub fn set_brightness(&mut self, brightness: u8) {
        for bus in self.buses.iter_mut() {
            bus.set_brightness(brightness);
        }
    }

    pub fn bus(&self, index: usize) -> Option<&Bus> {
        self.buses.get(index)
    }

    pub fn buses(&self) -> impl Iterator<Item = &Bus> {
        self.buses.iter()
    }

    pub fn num_buses(&self) -> usize {
        self.buses.len()
    }

    /// End of the highest pixel range over every bus; an invalid bus counts
    /// as `start + 0`.
    pub fn total_length(&self) -> u16 {
        self.buses
            .iter()
            .map(|b| (b.start() as u32 + b.length() as u32).min(u16::MAX as u32) as u16)
            .max()
            .unwrap_or(0)
    }

    pub fn memory_estimate(&self, descriptor: &BusDescriptor) -> u32 {
        memory_estimate(descriptor, self.backends.platform)
    }
}

impl Drop for BusRegistry {
    fn drop(&mut self) {
        if !self.buses.is_empty() {
            self.remove_all();
        }
    }
}
