use crate::bus::{kind::BusKind, pwm_sysfs::PwmChannel};
use crate::color::{Color, ColorOrder};
use crate::config::{ConfigError, Configuration};
use crate::platform::Platform;
use log::LevelFilter;

const FULL_CONFIG: &str = r#"{
    "platform": "esp8266",
    "log_level": "debug",
    "brightness": 200,
    "frame_interval_ms": 20,
    "test_color": 16711680,
    "gpio_section": { "pins": [2, 3, 4, 5, 13, 14] },
    "pwm_section": { "channels": { "5": { "chip_num": 0, "chip_channel": 1 } } },
    "bus_section": {
        "buses": [
            { "type": 150, "pins": [2], "length": 30, "color_order": "Rgb", "reversed": true, "skip": 1 },
            { "type": 51, "pins": [13, 14], "start": 30, "length": 60 },
            { "type": 41, "pins": [5], "start": 90, "length": 1 }
        ]
    }
}"#;

#[test]
fn parse_full_config() {
    let config = Configuration::from_str(FULL_CONFIG).unwrap();
    assert_eq!(config.platform, Platform::Esp8266);
    assert_eq!(config.log_level_filter(), Ok(LevelFilter::Debug));
    assert_eq!(config.brightness, 200);
    assert_eq!(config.frame_interval_ms, 20);
    assert_eq!(config.test_color, Color::from_rgb(255, 0, 0));
    assert_eq!(config.gpio_section.pins, vec![2, 3, 4, 5, 13, 14]);
    assert_eq!(config.pwm_section.channels[&5], PwmChannel::new(0, 1));

    let (descriptors, total) = config.bus_section.descriptors(config.platform).unwrap();
    assert_eq!(descriptors.len(), 3);
    assert_eq!(total, 91);

    let first = &descriptors[0];
    assert_eq!(first.kind, BusKind::Ws2812Rgb);
    assert!(first.requires_idle_refresh);
    assert_eq!(first.color_order, ColorOrder::Rgb);
    assert!(first.reversed);
    assert_eq!(first.skip_count, 1);
    assert_eq!(first.pins(), &[2]);

    let second = &descriptors[1];
    assert_eq!(second.kind, BusKind::Apa102);
    assert_eq!(second.color_order, ColorOrder::Grb);
    assert_eq!(second.start, 30);
    assert_eq!(second.pins(), &[13, 14]);

    assert_eq!(descriptors[2].kind, BusKind::Analog1Ch);
}

#[test]
fn empty_config_uses_defaults() {
    let config = Configuration::from_str("{}").unwrap();
    assert_eq!(config.platform, Platform::Esp32);
    assert_eq!(config.log_level_filter(), Ok(LevelFilter::Info));
    assert_eq!(config.brightness, 128);
    assert_eq!(config.frame_interval_ms, 33);
    assert!(config.bus_section.buses.is_empty());
}

#[test]
fn malformed_json() {
    let err = Configuration::from_str("{ \"platform\": ").unwrap_err();
    assert!(matches!(err, ConfigError::SerializeError(_)));

    let err = Configuration::from_str(r#"{ "platform": "esp8285" }"#).unwrap_err();
    assert!(matches!(err, ConfigError::SerializeError(_)));
}

#[test]
fn duplicate_pins() {
    let err = Configuration::from_str(r#"{ "gpio_section": { "pins": [2, 4, 2] } }"#).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateEntry(_)));
}

#[test]
fn bad_log_level() {
    let err = Configuration::from_str(r#"{ "log_level": "loud" }"#).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEntry(_)));
}

#[test]
fn zero_frame_interval() {
    let err = Configuration::from_str(r#"{ "frame_interval_ms": 0 }"#).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEntry(_)));
}

#[test]
fn pwm_channel_needs_gpio() {
    let json = r#"{
        "gpio_section": { "pins": [2] },
        "pwm_section": { "channels": { "7": { "chip_num": 0, "chip_channel": 0 } } }
    }"#;
    let err = Configuration::from_str(json).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEntry(_)));
}

#[test]
fn too_many_buses() {
    let json = r#"{
        "platform": "esp8266",
        "bus_section": { "buses": [
            { "type": 22, "pins": [1], "length": 1 },
            { "type": 22, "pins": [2], "length": 1 },
            { "type": 22, "pins": [3], "length": 1 },
            { "type": 22, "pins": [4], "length": 1 }
        ] }
    }"#;
    let err = Configuration::from_str(json).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEntry(_)));
}

#[test]
fn unknown_bus_type() {
    let json = r#"{ "bus_section": { "buses": [ { "type": 99, "pins": [2], "length": 10 } ] } }"#;
    let err = Configuration::from_str(json).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEntry(_)));
}

#[test]
fn missing_pins() {
    let json = r#"{ "bus_section": { "buses": [ { "type": 51, "pins": [13], "length": 10 } ] } }"#;
    let err = Configuration::from_str(json).unwrap_err();
    assert!(matches!(err, ConfigError::MissingEntry(_)));
}

#[test]
fn memory_budget_skips_buses() {
    let json = r#"{
        "platform": "esp8266",
        "bus_section": { "buses": [
            { "type": 22, "pins": [3], "length": 600 },
            { "type": 22, "pins": [4], "start": 600, "length": 100 }
        ] }
    }"#;
    let config = Configuration::from_str(json).unwrap();
    let (descriptors, total) = config.bus_section.descriptors(config.platform).unwrap();

    // the DMA strip needs 9000 bytes of a 4000 byte budget
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].pins(), &[4]);
    assert_eq!(total, 700);
}

#[test]
fn out_of_range_bus_is_skipped() {
    let json = r#"{
        "platform": "esp8266",
        "bus_section": { "buses": [
            { "type": 22, "pins": [4], "start": 2000, "length": 10 },
            { "type": 22, "pins": [5], "start": 1600, "length": 100 }
        ] }
    }"#;
    let config = Configuration::from_str(json).unwrap();
    let (descriptors, total) = config.bus_section.descriptors(config.platform).unwrap();

    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].pixel_count, 64);
    assert_eq!(total, 1664);
}
