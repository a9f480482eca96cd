use super::pwm::{PwmError, PwmOutput, PwmWriter};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs::OpenOptions, io::Write, path::Path};
use sysfs_pwm::{Error, Pwm};

const SYSFS_PWM_PATH: &str = "/sys/class/pwm";

fn sysfs_map_err(err: Error, context: &str) -> PwmError {
    match err {
        Error::Io(msg) => PwmError::OsError(format!("{}: {}", context, msg)),
        Error::Unexpected(msg) => PwmError::OsError(format!("{}: {}", context, msg)),
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct PwmChannel {
    pub chip_num: u8,
    pub chip_channel: u8,
}

#[cfg(test)]
impl PwmChannel {
    pub fn new(chip_num: u8, chip_channel: u8) -> Self {
        Self { chip_num, chip_channel }
    }
}

struct AttachedChannel {
    pwm: Pwm,
    period_ns: u32,
}

/// Drives analog buses through the Linux sysfs PWM interface. Each bus pin
/// is mapped to a chip/channel pair by configuration.
pub struct SysfsPwmWriter {
    pin_config: HashMap<u8, PwmChannel>,
    attached: HashMap<u8, AttachedChannel>,
}

impl SysfsPwmWriter {
    pub fn new(pin_config: HashMap<u8, PwmChannel>) -> Result<Self, PwmError> {
        let path = Path::new(SYSFS_PWM_PATH);
        if !path.exists() || !path.is_dir() {
            return Err(PwmError::OsError("PWM is not supported on this system".to_string()));
        }

        for (pin, channel) in &pin_config {
            for (other_pin, other_channel) in &pin_config {
                if pin != other_pin && channel == other_channel {
                    return Err(PwmError::InvalidConfig(format!(
                        "PWM channel definitions overlap: pin {} and pin {} both use channel {} on chip {}",
                        pin, other_pin, channel.chip_channel, channel.chip_num
                    )));
                }
            }
        }

        Ok(SysfsPwmWriter {
            pin_config,
            attached: HashMap::new(),
        })
    }

    fn reset_polarity(channel: &PwmChannel) -> Result<(), PwmError> {
        let polarity_path = Path::new(SYSFS_PWM_PATH)
            .join(format!("pwmchip{}/pwm{}/polarity", channel.chip_num, channel.chip_channel));
        if polarity_path.exists() {
            OpenOptions::new()
                .write(true)
                .open(polarity_path)
                .and_then(|mut fd| fd.write_all(b"normal"))
                .map_err(|err| PwmError::OsError(format!("failed to reset PWM polarity: {}", err)))?;
        }

        Ok(())
    }
}

impl PwmWriter for SysfsPwmWriter {
    fn attach(&mut self, output: PwmOutput, frequency_hz: u32) -> Result<(), PwmError> {
        let channel = match self.pin_config.get(&output.pin) {
            Some(c) => *c,
            None => return Err(PwmError::ChannelNotFound(output.pin)),
        };

        let period_ns = 1_000_000_000 / frequency_hz.max(1);
        let pwm = Pwm::new(channel.chip_num as u32, channel.chip_channel as u32)
            .and_then(|pwm| pwm.export().map(|_| pwm))
            .map_err(|err| {
                sysfs_map_err(
                    err,
                    &format!(
                        "Internal sysfs error while opening PWM for pin {} (channel {} on chip {})",
                        output.pin, channel.chip_channel, channel.chip_num
                    ),
                )
            })?;

        Self::reset_polarity(&channel)?;

        pwm.set_period_ns(period_ns)
            .and_then(|_| pwm.set_duty_cycle_ns(0))
            .and_then(|_| pwm.enable(true))
            .map_err(|err| sysfs_map_err(err, "failed to start PWM output"))?;

        debug!("pin {} attached to pwmchip{}/pwm{}", output.pin, channel.chip_num, channel.chip_channel);
        self.attached.insert(output.pin, AttachedChannel { pwm, period_ns });
        Ok(())
    }

    fn write(&mut self, output: PwmOutput, duty: u8) -> Result<(), PwmError> {
        let channel = match self.attached.get(&output.pin) {
            Some(c) => c,
            None => return Err(PwmError::NotAttached(output.pin)),
        };

        let duty_ns = (channel.period_ns as u64 * duty as u64 / 255) as u32;
        channel
            .pwm
            .set_duty_cycle_ns(duty_ns)
            .map_err(|err| sysfs_map_err(err, "failed to set PWM duty cycle"))
    }

    fn detach(&mut self, output: PwmOutput) -> Result<(), PwmError> {
        let channel = match self.attached.remove(&output.pin) {
            Some(c) => c,
            None => return Err(PwmError::NotAttached(output.pin)),
        };

        if let Err(e) = channel.pwm.set_duty_cycle_ns(0) {
            warn!("Failed to drive pin {} low before detaching: {}", output.pin, e);
        }

        channel
            .pwm
            .enable(false)
            .and_then(|_| channel.pwm.unexport())
            .map_err(|err| sysfs_map_err(err, "failed to release PWM output"))
    }
}
