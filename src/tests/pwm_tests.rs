use super::fixtures::harness;
use crate::bus::{
    descriptor::{BusDescriptor, MAX_BUS_PINS},
    kind::BusKind,
    pwm::{AnalogPwmBus, MemoryPwmWriter, PwmError, PwmOutput, PwmWriter},
    BusBackends, LedBus,
};
use crate::color::Color;
use crate::gpio::PinOwner;
use crate::platform::Platform;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Records into a `MemoryPwmWriter` but refuses the attach numbered `fail_at`.
struct FlakyPwmWriter {
    inner: MemoryPwmWriter,
    attaches: u32,
    fail_at: u32,
}

impl PwmWriter for FlakyPwmWriter {
    fn attach(&mut self, output: PwmOutput, frequency_hz: u32) -> Result<(), PwmError> {
        self.attaches += 1;
        if self.attaches == self.fail_at {
            return Err(PwmError::OsError(format!("pin {} refused", output.pin)));
        }
        self.inner.attach(output, frequency_hz)
    }

    fn write(&mut self, output: PwmOutput, duty: u8) -> Result<(), PwmError> {
        self.inner.write(output, duty)
    }

    fn detach(&mut self, output: PwmOutput) -> Result<(), PwmError> {
        self.inner.detach(output)
    }
}

#[test]
fn single_channel_takes_brightest_component() {
    let h = harness(Platform::Esp8266);
    let descriptor = BusDescriptor::new(BusKind::Analog1Ch, &[4], 0, 1);
    let mut bus = AnalogPwmBus::new(&descriptor, &h.backends);
    assert!(bus.is_valid());
    assert_eq!(bus.length(), 1);

    bus.set_pixel(0, Color(0x10203040));
    assert_eq!(bus.channel_values(), &[0x40]);
    assert_eq!(bus.get_pixel(0), Color::from_rgbw(0x40, 0, 0, 0));

    bus.render();
    assert_eq!(h.pwm.duty(4), Some(0x40));

    bus.set_brightness(128);
    bus.render();
    assert_eq!(h.pwm.duty(4), Some(32));
}

#[test]
fn channels_map_to_pins() {
    let h = harness(Platform::Esp8266);
    let descriptor = BusDescriptor::new(BusKind::Analog5Ch, &[4, 5, 6, 7, 8], 0, 1);
    let mut bus = AnalogPwmBus::new(&descriptor, &h.backends);

    bus.set_pixel(0, Color::from_rgbw(1, 2, 3, 4));
    assert_eq!(bus.channel_values(), &[1, 2, 3, 4, 0]);
    assert_eq!(bus.get_pixel(0), Color::from_rgbw(1, 2, 3, 4));
    assert!(bus.is_rgbw());

    bus.render();
    let duties: Vec<Option<u8>> = (4..=8).map(|pin| h.pwm.duty(pin)).collect();
    assert_eq!(duties, vec![Some(1), Some(2), Some(3), Some(4), Some(0)]);
}

#[test]
fn three_channels_are_not_rgbw() {
    let h = harness(Platform::Esp8266);
    let descriptor = BusDescriptor::new(BusKind::Analog3Ch, &[4, 5, 6], 0, 1);
    let mut bus = AnalogPwmBus::new(&descriptor, &h.backends);
    assert!(!bus.is_rgbw());

    bus.set_pixel(0, Color::from_rgbw(10, 20, 30, 40));
    assert_eq!(bus.channel_values(), &[10, 20, 30]);
}

#[test]
fn reversed_inverts_duty() {
    let h = harness(Platform::Esp8266);
    let descriptor = BusDescriptor::new(BusKind::Analog3Ch, &[4, 5, 6], 0, 1).with_reversed(true);
    let mut bus = AnalogPwmBus::new(&descriptor, &h.backends);

    bus.set_pixel(0, Color::from_rgb(255, 0, 100));
    bus.render();
    assert_eq!(h.pwm.duty(4), Some(0));
    assert_eq!(h.pwm.duty(5), Some(255));
    assert_eq!(h.pwm.duty(6), Some(155));
}

#[test]
fn only_pixel_zero_exists() {
    let h = harness(Platform::Esp8266);
    let descriptor = BusDescriptor::new(BusKind::Analog2Ch, &[4, 5], 0, 1);
    let mut bus = AnalogPwmBus::new(&descriptor, &h.backends);

    bus.set_pixel(1, Color::from_rgb(9, 9, 9));
    assert_eq!(bus.channel_values(), &[0, 0]);
    assert_eq!(bus.get_pixel(1), Color::BLACK);
}

#[test]
fn frequency_follows_platform() {
    let h = harness(Platform::Esp8266);
    let descriptor = BusDescriptor::new(BusKind::Analog1Ch, &[4], 0, 1);
    let _bus = AnalogPwmBus::new(&descriptor, &h.backends);
    let output = h.pwm.output(4).unwrap();
    assert_eq!(output.frequency_hz, 880);
    assert_eq!(output.slot, None);

    let h = harness(Platform::Esp32);
    let _bus = AnalogPwmBus::new(&descriptor, &h.backends);
    assert_eq!(h.pwm.output(4).unwrap().frequency_hz, 19531);
}

#[test]
fn channel_slots_are_reserved_on_esp32() {
    let h = harness(Platform::Esp32);

    let descriptor = BusDescriptor::new(BusKind::Analog3Ch, &[4, 5, 6], 0, 1);
    let first = AnalogPwmBus::new(&descriptor, &h.backends);
    let descriptor = BusDescriptor::new(BusKind::Analog2Ch, &[7, 8], 1, 1);
    let second = AnalogPwmBus::new(&descriptor, &h.backends);

    assert_eq!(first.channel_slot_start(), Some(0));
    assert_eq!(second.channel_slot_start(), Some(3));
    assert_eq!(h.pwm.output(6).unwrap().slot, Some(2));
    assert_eq!(h.pwm.output(8).unwrap().slot, Some(4));
    assert_eq!(h.ledger.read().free_channel_slots(), 11);

    drop(first);
    assert_eq!(h.ledger.read().free_channel_slots(), 14);
    drop(second);
    assert_eq!(h.ledger.read().free_channel_slots(), 16);
}

#[test]
fn channel_slot_exhaustion() {
    let h = harness(Platform::Esp32);
    let mut buses = Vec::new();
    for i in 0..3u8 {
        let pins: Vec<u8> = (0..5).map(|p| 10 + i * 5 + p).collect();
        let descriptor = BusDescriptor::new(BusKind::Analog5Ch, &pins, i as u16, 1);
        buses.push(AnalogPwmBus::new(&descriptor, &h.backends));
    }
    assert!(buses.iter().all(|b| b.is_valid()));

    let descriptor = BusDescriptor::new(BusKind::Analog2Ch, &[2, 3], 3, 1);
    let bus = AnalogPwmBus::new(&descriptor, &h.backends);
    assert!(!bus.is_valid());
    assert_eq!(bus.length(), 0);
    assert!(!h.ledger.read().is_claimed(2));
    assert_eq!(h.ledger.read().free_channel_slots(), 1);
}

#[test]
fn pin_conflict_unwinds() {
    let h = harness(Platform::Esp32);
    h.ledger
        .write()
        .acquire(6, true, PinOwner::BusAddressable, Uuid::new_v4())
        .unwrap();

    let descriptor = BusDescriptor::new(BusKind::Analog3Ch, &[4, 5, 6], 0, 1);
    let mut bus = AnalogPwmBus::new(&descriptor, &h.backends);
    assert!(!bus.is_valid());
    assert_eq!(h.ledger.read().claimed_pins(), vec![6]);
    assert_eq!(h.ledger.read().free_channel_slots(), 16);
    assert!(h.pwm.attached_pins().is_empty());

    bus.set_pixel(0, Color::from_rgb(1, 2, 3));
    bus.render();
    assert_eq!(bus.get_pixel(0), Color::BLACK);
}

#[test]
fn on_off_has_no_driver() {
    let h = harness(Platform::Esp8266);
    let descriptor = BusDescriptor::new(BusKind::OnOff, &[4], 0, 1);
    let bus = AnalogPwmBus::new(&descriptor, &h.backends);
    assert!(!bus.is_valid());
    assert!(!h.ledger.read().is_claimed(4));
}

#[test]
fn cleanup_detaches_outputs() {
    let h = harness(Platform::Esp32);
    let descriptor = BusDescriptor::new(BusKind::Analog4Ch, &[4, 5, 6, 7], 0, 1);
    let mut bus = AnalogPwmBus::new(&descriptor, &h.backends);
    assert_eq!(h.pwm.attached_pins(), vec![4, 5, 6, 7]);

    let mut pins = [0u8; MAX_BUS_PINS];
    assert_eq!(bus.report_pins(&mut pins), 4);
    assert_eq!(&pins[..4], &[4, 5, 6, 7]);

    bus.cleanup();
    assert!(!bus.is_valid());
    assert!(h.pwm.attached_pins().is_empty());
    assert!(h.ledger.read().claimed_pins().is_empty());
    assert_eq!(h.ledger.read().free_channel_slots(), 16);
    assert_eq!(bus.report_pins(&mut pins), 0);

    bus.cleanup();
    assert!(h.pwm.attached_pins().is_empty());
}

#[test]
fn failed_attach_unwinds() {
    let h = harness(Platform::Esp32);
    let recorded = MemoryPwmWriter::new();
    let writer: Arc<Mutex<dyn PwmWriter>> = Arc::new(Mutex::new(FlakyPwmWriter {
        inner: recorded.clone(),
        attaches: 0,
        fail_at: 3,
    }));
    let backends = BusBackends {
        pwm: writer,
        ..h.backends.clone()
    };

    let descriptor = BusDescriptor::new(BusKind::Analog4Ch, &[4, 5, 6, 7], 0, 1);
    let bus = AnalogPwmBus::new(&descriptor, &backends);
    assert!(!bus.is_valid());
    assert_eq!(bus.length(), 0);
    assert!(recorded.attached_pins().is_empty());
    assert!(h.ledger.read().claimed_pins().is_empty());
    assert_eq!(h.ledger.read().free_channel_slots(), 16);

    // everything it held is free for the next bus
    let bus = AnalogPwmBus::new(&descriptor, &h.backends);
    assert!(bus.is_valid());
}
