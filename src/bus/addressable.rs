use super::{
    descriptor::{BusDescriptor, MAX_BUS_PINS},
    driver::{DriverKind, LedDriver},
    kind::BusKind,
    BusBackends, BusError, LedBus,
};
use crate::{
    color::{Color, ColorOrder},
    gpio::{PinClaim, PinOwner},
};
use log::{debug, info, warn};
use uuid::Uuid;

/// Clocked or single-wire LED string driven through an external driver.
pub struct AddressableBus {
    id: Uuid,
    kind: BusKind,
    start: u16,
    reversed: bool,
    requires_idle_refresh: bool,
    color_order: ColorOrder,
    skip: u8,
    /// Physical length, skip pixels included.
    len: u16,
    brightness: u8,
    status_led_pin: Option<u8>,
    driver_kind: Option<DriverKind>,
    // Declared before the claims: the driver goes first on drop.
    driver: Option<Box<dyn LedDriver>>,
    pins: Vec<PinClaim>,
}

impl AddressableBus {
    pub fn new(descriptor: &BusDescriptor, index: u8, backends: &BusBackends) -> Self {
        let mut bus = AddressableBus {
            id: Uuid::new_v4(),
            kind: descriptor.kind,
            start: descriptor.start,
            reversed: descriptor.reversed,
            requires_idle_refresh: descriptor.requires_idle_refresh || descriptor.kind.always_refreshes(),
            color_order: descriptor.color_order,
            skip: descriptor.skip_count,
            len: descriptor.pixel_count.saturating_add(descriptor.skip_count as u16),
            brightness: 255,
            status_led_pin: backends.platform.status_led_pin(),
            driver_kind: None,
            driver: None,
            pins: Vec::new(),
        };

        match bus.init(descriptor, index, backends) {
            Ok(()) => info!(
                "Initialized strip {} (len {}) with type {} and pins {:?} ({:?})",
                index,
                bus.len,
                bus.kind,
                descriptor.pins(),
                bus.driver_kind.map(|d| d.method)
            ),
            Err(e) => {
                warn!("Failed to initialize strip {} with type {}: {}", index, bus.kind, e);
                bus.cleanup();
            }
        }

        bus
    }

    fn init(&mut self, descriptor: &BusDescriptor, index: u8, backends: &BusBackends) -> Result<(), BusError> {
        if !descriptor.kind.is_addressable() {
            return Err(BusError::NoDriver(descriptor.kind));
        }

        let wanted = descriptor.pins();
        let mut claims = Vec::with_capacity(wanted.len());
        for pin in wanted {
            // a failing second claim drops (and so releases) the first one
            claims.push(PinClaim::acquire(&backends.ledger, *pin, true, PinOwner::BusAddressable, self.id)?);
        }
        self.pins = claims;

        let driver_kind = match backends.drivers.resolve(self.kind, wanted, index) {
            Some(d) => d,
            None => return Err(BusError::NoDriver(self.kind)),
        };

        let mut driver = backends.drivers.create(driver_kind, wanted, self.len, index)?;
        debug!("{} driver created for {} pixels", driver_kind.method, driver.len());
        driver.begin();
        self.driver_kind = Some(driver_kind);
        self.driver = Some(driver);
        Ok(())
    }

    /// Maps a visible index onto the strip, `None` past the visible end.
    fn physical_index(&self, index: u16) -> Option<u16> {
        let visible = self.len - self.skip as u16;
        if index >= visible {
            return None;
        }

        match self.reversed {
            true => Some(self.skip as u16 + (visible - index - 1)),
            false => Some(index + self.skip as u16),
        }
    }

    pub fn driver_kind(&self) -> Option<DriverKind> {
        self.driver_kind
    }

    #[cfg(test)]
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Restarts the driver without touching pixel data.
    pub fn reinit(&mut self) {
        if let Some(driver) = self.driver.as_mut() {
            driver.begin();
        }
    }

    fn drives_status_led(&self) -> bool {
        match self.status_led_pin {
            Some(led) => self.pins.iter().any(|claim| claim.pin() == led),
            None => false,
        }
    }
}

impl LedBus for AddressableBus {
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
        self.driver.is_some()
    }

    fn set_pixel(&mut self, index: u16, color: Color) {
        let physical = match self.physical_index(index) {
            Some(p) => p,
            None => return,
        };

        let order = self.color_order;
        if let Some(driver) = self.driver.as_mut() {
            driver.set_pixel_color(physical, color, order);
        }
    }

    fn get_pixel(&self, index: u16) -> Color {
        match (self.physical_index(index), self.driver.as_ref()) {
            (Some(physical), Some(driver)) => driver.get_pixel_color(physical, self.color_order),
            _ => Color::BLACK,
        }
    }

    fn render(&mut self) {
        if let Some(driver) = self.driver.as_mut() {
            driver.show();
        }
    }

    fn can_render(&self) -> bool {
        match self.driver.as_ref() {
            Some(driver) => driver.can_show(),
            None => true,
        }
    }

    fn set_brightness(&mut self, brightness: u8) {
        // turning the on-board LED off latches some drivers in the off state
        if self.brightness == 0 && brightness > 0 && self.drives_status_led() {
            debug!("re-initializing strip on the status LED pin");
            self.reinit();
        }

        self.brightness = brightness;
        if let Some(driver) = self.driver.as_mut() {
            driver.set_brightness(brightness);
        }
    }

    fn length(&self) -> u16 {
        match self.is_valid() {
            true => self.len - self.skip as u16,
            false => 0,
        }
    }

    fn color_order(&self) -> ColorOrder {
        self.color_order
    }

    fn set_color_order(&mut self, code: u8) {
        match ColorOrder::try_from(code) {
            Ok(order) => self.color_order = order,
            Err(code) => debug!("ignoring invalid color order {}", code),
        }
    }

    fn skipped_leds(&self) -> u8 {
        self.skip
    }

    fn requires_idle_refresh(&self) -> bool {
        self.requires_idle_refresh
    }

    fn report_pins(&self, pins: &mut [u8; MAX_BUS_PINS]) -> usize {
        if !self.is_valid() {
            return 0;
        }

        for (slot, claim) in pins.iter_mut().zip(self.pins.iter()) {
            *slot = claim.pin();
        }
        self.pins.len()
    }

    fn cleanup(&mut self) {
        if self.driver.is_none() && self.pins.is_empty() {
            return;
        }

        debug!("Addressable bus cleanup ({})", self.id);
        self.driver = None;
        self.driver_kind = None;
        while let Some(claim) = self.pins.pop() {
            drop(claim);
        }
    }
}

impl Drop for AddressableBus {
    fn drop(&mut self) {
        self.cleanup();
    }
}
