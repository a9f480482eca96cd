use log::{debug, warn};
use parking_lot::RwLock;
use std::{collections::HashMap, fmt::Display, sync::Arc};
use strum::Display as StrumDisplay;
use uuid::Uuid;

/// Subsystem a pin claim is taken on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
pub enum PinOwner {
    BusAddressable,
    BusPwm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PinClaimRecord {
    owner: PinOwner,
    bus: Uuid,
}

pub struct PinState {
    pin_number: u8,
    exclusive: bool,
    claims: Vec<PinClaimRecord>,
}

impl PinState {
    pub fn new(pin_number: u8) -> Self {
        PinState {
            pin_number,
            exclusive: false,
            claims: Vec::new(),
        }
    }

    pub fn pin_id(&self) -> u8 {
        self.pin_number
    }

    pub fn is_claimed(&self) -> bool {
        !self.claims.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GpioError {
    Busy(u8),
    PinNotFound(u8),
    LeaseNotFound(u8),
    WrongOwner(u8),
    NoChannelSlots(u8),
}

impl Display for GpioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&match self {
            GpioError::Busy(p) => format!("pin {} is busy", p),
            GpioError::PinNotFound(p) => format!("pin {} is not available", p),
            GpioError::LeaseNotFound(p) => format!("pin {} is not claimed", p),
            GpioError::WrongOwner(p) => format!("pin {} is claimed by a different owner", p),
            GpioError::NoChannelSlots(n) => format!("no run of {} free PWM channel slots", n),
        })
    }
}

impl std::error::Error for GpioError {}

/// Tracks which bus owns which pin and which PWM channel slots are reserved.
pub struct PinLedger {
    pins: HashMap<u8, PinState>,
    channel_slots: Vec<bool>,
}

pub type SharedLedger = Arc<RwLock<PinLedger>>;

impl PinLedger {
    /// `channel_slots` is the size of the shared PWM channel pool, zero when
    /// the platform has none.
    pub fn new(pins: impl IntoIterator<Item = u8>, channel_slots: u8) -> Self {
        PinLedger {
            pins: pins.into_iter().map(|p| (p, PinState::new(p))).collect(),
            channel_slots: vec![false; channel_slots as usize],
        }
    }

    pub fn new_shared(pins: impl IntoIterator<Item = u8>, channel_slots: u8) -> SharedLedger {
        Arc::new(RwLock::new(PinLedger::new(pins, channel_slots)))
    }

    pub fn is_valid(&self, pin: u8) -> bool {
        self.pins.contains_key(&pin)
    }

    pub fn is_claimed(&self, pin: u8) -> bool {
        self.pins.get(&pin).map_or(false, |s| s.is_claimed())
    }

    pub fn claimed_pins(&self) -> Vec<u8> {
        let mut pins: Vec<u8> = self
            .pins
            .values()
            .filter(|s| s.is_claimed())
            .map(|s| s.pin_id())
            .collect();
        pins.sort_unstable();
        pins
    }

    #[cfg(test)]
    pub fn owner_of(&self, pin: u8) -> Option<(PinOwner, Uuid)> {
        self.pins
            .get(&pin)
            .and_then(|s| s.claims.first())
            .map(|c| (c.owner, c.bus))
    }

    #[cfg(test)]
    pub fn can_acquire(&self, pin: u8, exclusive: bool) -> bool {
        match self.pins.get(&pin) {
            Some(state) => !state.is_claimed() || (!exclusive && !state.exclusive),
            None => false,
        }
    }

    /// Non-exclusive claims may share a pin with other non-exclusive claims.
    pub fn acquire(&mut self, pin: u8, exclusive: bool, owner: PinOwner, bus: Uuid) -> Result<(), GpioError> {
        let state = match self.pins.get_mut(&pin) {
            Some(s) => s,
            None => return Err(GpioError::PinNotFound(pin)),
        };

        if state.is_claimed() && (exclusive || state.exclusive) {
            return Err(GpioError::Busy(pin));
        }

        state.exclusive = exclusive;
        state.claims.push(PinClaimRecord { owner, bus });
        debug!("pin {} claimed by {} ({})", pin, owner, bus);
        Ok(())
    }

    pub fn release(&mut self, pin: u8, owner: PinOwner, bus: Uuid) -> Result<(), GpioError> {
        let state = match self.pins.get_mut(&pin) {
            Some(s) => s,
            None => return Err(GpioError::PinNotFound(pin)),
        };

        if !state.is_claimed() {
            return Err(GpioError::LeaseNotFound(pin));
        }

        let position = match state.claims.iter().position(|c| c.owner == owner && c.bus == bus) {
            Some(p) => p,
            None => return Err(GpioError::WrongOwner(pin)),
        };

        state.claims.remove(position);
        if state.claims.is_empty() {
            state.exclusive = false;
        }

        debug!("pin {} released by {} ({})", pin, owner, bus);
        Ok(())
    }

    /// First-fit search for `count` contiguous free channel slots.
    pub fn reserve_channel_slots(&mut self, count: u8) -> Option<u8> {
        let count = count as usize;
        if count == 0 || count > self.channel_slots.len() {
            return None;
        }

        let first = (0..=self.channel_slots.len() - count)
            .find(|&start| self.channel_slots[start..start + count].iter().all(|used| !used))?;
        self.channel_slots[first..first + count].iter_mut().for_each(|used| *used = true);
        Some(first as u8)
    }

    pub fn release_channel_slots(&mut self, first: u8, count: u8) {
        let first = first as usize;
        let end = (first + count as usize).min(self.channel_slots.len());
        if first >= end {
            warn!("released an empty or out of range channel slot run ({} + {})", first, count);
            return;
        }

        self.channel_slots[first..end].iter_mut().for_each(|used| *used = false);
    }

    pub fn free_channel_slots(&self) -> usize {
        self.channel_slots.iter().filter(|used| !**used).count()
    }
}

/// A pin claim that is handed back to the ledger when dropped.
pub struct PinClaim {
    ledger: SharedLedger,
    pin: u8,
    owner: PinOwner,
    bus: Uuid,
}

impl PinClaim {
    pub fn acquire(ledger: &SharedLedger, pin: u8, exclusive: bool, owner: PinOwner, bus: Uuid) -> Result<Self, GpioError> {
        ledger.write().acquire(pin, exclusive, owner, bus)?;
        Ok(PinClaim {
            ledger: ledger.clone(),
            pin,
            owner,
            bus,
        })
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }
}

impl Drop for PinClaim {
    fn drop(&mut self) {
        if let Err(e) = self.ledger.write().release(self.pin, self.owner, self.bus) {
            warn!("Failed to release pin claim: {}", e);
        }
    }
}

/// A contiguous PWM channel slot reservation, released when dropped.
pub struct ChannelSlotClaim {
    ledger: SharedLedger,
    first: u8,
    count: u8,
}

impl ChannelSlotClaim {
    pub fn reserve(ledger: &SharedLedger, count: u8) -> Result<Self, GpioError> {
        let first = match ledger.write().reserve_channel_slots(count) {
            Some(f) => f,
            None => return Err(GpioError::NoChannelSlots(count)),
        };

        Ok(ChannelSlotClaim {
            ledger: ledger.clone(),
            first,
            count,
        })
    }

    pub fn first(&self) -> u8 {
        self.first
    }
}

impl Drop for ChannelSlotClaim {
    fn drop(&mut self) {
        self.ledger.write().release_channel_slots(self.first, self.count);
    }
}
