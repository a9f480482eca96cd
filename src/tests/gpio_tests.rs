use crate::gpio::{ChannelSlotClaim, GpioError, PinClaim, PinLedger, PinOwner};
use uuid::Uuid;

fn ledger() -> PinLedger {
    PinLedger::new([2, 3, 4, 5, 6], 8)
}

#[test]
fn is_valid_test() {
    let gpio = ledger();

    // non-existent pins
    assert!(!gpio.is_valid(1));
    assert!(!gpio.is_valid(16));

    // test multiple times
    assert!(gpio.is_valid(2));
    assert!(gpio.is_valid(2));

    assert!(gpio.is_valid(3));
    assert!(gpio.is_valid(6));
}

#[test]
fn acquire_and_release() {
    let mut gpio = ledger();
    let bus = Uuid::new_v4();

    assert_eq!(gpio.acquire(2, true, PinOwner::BusAddressable, bus), Ok(()));
    assert!(gpio.is_claimed(2));
    assert_eq!(gpio.owner_of(2), Some((PinOwner::BusAddressable, bus)));

    assert_eq!(gpio.release(2, PinOwner::BusAddressable, bus), Ok(()));
    assert!(!gpio.is_claimed(2));
    assert_eq!(gpio.owner_of(2), None);
}

#[test]
fn notfound_acquire() {
    let mut gpio = ledger();
    assert_eq!(
        gpio.acquire(1, true, PinOwner::BusPwm, Uuid::new_v4()),
        Err(GpioError::PinNotFound(1))
    );
    assert_eq!(
        gpio.acquire(255, true, PinOwner::BusPwm, Uuid::new_v4()),
        Err(GpioError::PinNotFound(255))
    );
}

#[test]
fn busy_acquire() {
    let mut gpio = ledger();
    assert!(gpio.acquire(3, true, PinOwner::BusPwm, Uuid::new_v4()).is_ok());
    assert_eq!(
        gpio.acquire(3, true, PinOwner::BusAddressable, Uuid::new_v4()),
        Err(GpioError::Busy(3))
    );
    assert_eq!(
        gpio.acquire(3, false, PinOwner::BusAddressable, Uuid::new_v4()),
        Err(GpioError::Busy(3))
    );
}

#[test]
fn shared_acquire() {
    let mut gpio = ledger();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    assert!(gpio.acquire(4, false, PinOwner::BusPwm, first).is_ok());
    assert!(gpio.acquire(4, false, PinOwner::BusPwm, second).is_ok());
    assert!(!gpio.can_acquire(4, true));
    assert_eq!(gpio.acquire(4, true, PinOwner::BusPwm, Uuid::new_v4()), Err(GpioError::Busy(4)));

    assert!(gpio.release(4, PinOwner::BusPwm, first).is_ok());
    assert!(gpio.is_claimed(4));
    assert!(gpio.release(4, PinOwner::BusPwm, second).is_ok());
    assert!(gpio.can_acquire(4, true));
}

#[test]
fn release_wrong_owner() {
    let mut gpio = ledger();
    let bus = Uuid::new_v4();
    gpio.acquire(5, true, PinOwner::BusAddressable, bus).unwrap();

    assert_eq!(gpio.release(5, PinOwner::BusPwm, bus), Err(GpioError::WrongOwner(5)));
    assert_eq!(
        gpio.release(5, PinOwner::BusAddressable, Uuid::new_v4()),
        Err(GpioError::WrongOwner(5))
    );
    assert!(gpio.is_claimed(5));
}

#[test]
fn release_unclaimed() {
    let mut gpio = ledger();
    assert_eq!(
        gpio.release(6, PinOwner::BusPwm, Uuid::new_v4()),
        Err(GpioError::LeaseNotFound(6))
    );
}

#[test]
fn channel_slots_first_fit() {
    let mut gpio = ledger();

    assert_eq!(gpio.reserve_channel_slots(3), Some(0));
    assert_eq!(gpio.reserve_channel_slots(3), Some(3));
    assert_eq!(gpio.reserve_channel_slots(3), None);
    assert_eq!(gpio.free_channel_slots(), 2);

    gpio.release_channel_slots(0, 3);
    assert_eq!(gpio.reserve_channel_slots(2), Some(0));
    assert_eq!(gpio.reserve_channel_slots(3), None);
    assert_eq!(gpio.reserve_channel_slots(2), Some(6));
}

#[test]
fn channel_slots_without_pool() {
    let mut gpio = PinLedger::new([2, 3], 0);
    assert_eq!(gpio.reserve_channel_slots(1), None);
    assert_eq!(gpio.reserve_channel_slots(0), None);
}

#[test]
fn claims_release_on_drop() {
    let ledger = PinLedger::new_shared([2, 3], 4);
    {
        let claim = PinClaim::acquire(&ledger, 2, true, PinOwner::BusAddressable, Uuid::new_v4()).unwrap();
        let slots = ChannelSlotClaim::reserve(&ledger, 4).unwrap();
        assert_eq!(claim.pin(), 2);
        assert_eq!(slots.first(), 0);
        assert!(ledger.read().is_claimed(2));
        assert_eq!(ledger.read().free_channel_slots(), 0);
        assert_eq!(
            ChannelSlotClaim::reserve(&ledger, 1).err(),
            Some(GpioError::NoChannelSlots(1))
        );
    }

    assert!(!ledger.read().is_claimed(2));
    assert_eq!(ledger.read().free_channel_slots(), 4);
    assert!(ledger.read().claimed_pins().is_empty());
}
