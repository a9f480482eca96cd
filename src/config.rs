use crate::{
    bus::{descriptor::BusDescriptor, pwm_sysfs::PwmChannel},
    color::{Color, ColorOrder},
    platform::Platform,
    registry::memory_estimate,
};
use log::{warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Display, io::Read, str::FromStr};

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    SerializeError(String),
    InvalidEntry(String),
    MissingEntry(String),
    DuplicateEntry(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&match self {
            ConfigError::SerializeError(msg) => format!("serialize/parse error: {}", msg),
            ConfigError::InvalidEntry(msg) => format!("invalid config entry: {}", msg),
            ConfigError::MissingEntry(msg) => format!("missing config entry: {}", msg),
            ConfigError::DuplicateEntry(msg) => format!("duplicate config entry: {}", msg),
        })
    }
}

impl std::error::Error for ConfigError {}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ConfigSectionGPIO {
    pub pins: Vec<u8>,
}

impl ConfigSectionGPIO {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut known_pins = Vec::new();
        for pin in &self.pins {
            if known_pins.contains(&pin) {
                return Err(ConfigError::DuplicateEntry(format!(
                    "invalid pin configuration: pin {} is defined more than once",
                    pin
                )));
            }

            known_pins.push(pin);
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ConfigSectionPWM {
    pub channels: HashMap<u8, PwmChannel>,
}

impl ConfigSectionPWM {
    pub fn validate(&self, gpio: &ConfigSectionGPIO) -> Result<(), ConfigError> {
        for pin in self.channels.keys() {
            if !gpio.pins.contains(pin) {
                return Err(ConfigError::InvalidEntry(format!(
                    "PWM channel is mapped to pin {} which is not a usable GPIO",
                    pin
                )));
            }
        }

        Ok(())
    }
}

/// One bus as it is written in the configuration file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BusEntryConfig {
    /// Raw type code; bit 7 requests refreshes while the output is off.
    #[serde(rename = "type")]
    pub bus_type: u8,
    pub pins: Vec<u8>,
    #[serde(default)]
    pub start: u16,
    pub length: u16,
    #[serde(default)]
    pub color_order: ColorOrder,
    #[serde(default)]
    pub reversed: bool,
    #[serde(default)]
    pub skip: u8,
}

impl BusEntryConfig {
    pub fn to_descriptor(&self) -> Result<BusDescriptor, ConfigError> {
        let descriptor = BusDescriptor::from_raw(
            self.bus_type,
            &self.pins,
            self.start,
            self.length,
            self.color_order,
            self.reversed,
            self.skip,
        )
        .map_err(|e| ConfigError::InvalidEntry(format!("invalid bus: {}", e)))?;

        if self.pins.len() < descriptor.kind.pin_count() {
            return Err(ConfigError::MissingEntry(format!(
                "bus type {} needs {} pins, {} given",
                descriptor.kind,
                descriptor.kind.pin_count(),
                self.pins.len()
            )));
        }

        Ok(descriptor)
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ConfigSectionBuses {
    pub buses: Vec<BusEntryConfig>,
}

impl ConfigSectionBuses {
    pub fn validate(&self, platform: Platform) -> Result<(), ConfigError> {
        if self.buses.len() > platform.max_buses() {
            return Err(ConfigError::InvalidEntry(format!(
                "{} buses configured but {} supports at most {}",
                self.buses.len(),
                platform,
                platform.max_buses()
            )));
        }

        for bus in &self.buses {
            bus.to_descriptor()?;
        }

        Ok(())
    }

    /// Descriptors ready to be added, with bounds enforced, plus the total
    /// pixel count they span. Buses that would push LED memory over the
    /// platform budget, or that start past the last pixel, are left out.
    pub fn descriptors(&self, platform: Platform) -> Result<(Vec<BusDescriptor>, u16), ConfigError> {
        let mut descriptors = Vec::new();
        let mut total = 0;
        let mut memory = 0;

        for entry in &self.buses {
            let mut descriptor = entry.to_descriptor()?;
            total = match descriptor.adjust_bounds(total, platform) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping bus: {}", e);
                    continue;
                }
            };

            let cost = memory_estimate(&descriptor, platform);
            if memory + cost >= platform.max_led_memory() {
                warn!(
                    "Skipping {} bus at {}: needs {} bytes, {} of {} already used",
                    descriptor.kind,
                    descriptor.start,
                    cost,
                    memory,
                    platform.max_led_memory()
                );
                continue;
            }

            memory += cost;
            descriptors.push(descriptor);
        }

        Ok((descriptors, total))
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Configuration {
    pub platform: Platform,
    pub log_level: String,
    pub brightness: u8,
    pub frame_interval_ms: u64,
    pub test_color: Color,
    pub gpio_section: ConfigSectionGPIO,
    pub pwm_section: ConfigSectionPWM,
    pub bus_section: ConfigSectionBuses,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            log_level: "info".to_string(),
            brightness: 128,
            frame_interval_ms: 33,
            test_color: Color::from_rgb(255, 160, 80),
            gpio_section: ConfigSectionGPIO::default(),
            pwm_section: ConfigSectionPWM::default(),
            bus_section: ConfigSectionBuses::default(),
        }
    }
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log_level_filter()?;
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::InvalidEntry("frame interval must be greater than zero".to_string()));
        }

        self.gpio_section.validate()?;
        self.pwm_section.validate(&self.gpio_section)?;
        self.bus_section.validate(self.platform)?;
        Ok(())
    }

    pub fn log_level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::InvalidEntry(format!("unknown log level \"{}\"", self.log_level)))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Configuration, ConfigError> {
        let config: Configuration = match serde_json::from_reader(reader) {
            Ok(c) => c,
            Err(e) => {
                return Err(ConfigError::SerializeError(format!(
                    "failed to deserialize config file: {}",
                    e
                )));
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_str(json_str: &str) -> Result<Configuration, ConfigError> {
        Self::from_reader(json_str.as_bytes())
    }
}
