mod bus;
mod color;
mod config;
mod gpio;
mod platform;
mod registry;

use bus::{
    driver::MemoryDriverFactory,
    network::LoggingTransmitter,
    pwm::{MemoryPwmWriter, PwmWriter},
    pwm_sysfs::SysfsPwmWriter,
    descriptor::MAX_BUS_PINS,
    BusBackends, LedBus,
};
use config::Configuration;
use gpio::PinLedger;
use log::{info, warn};
use parking_lot::Mutex;
use registry::BusRegistry;
use simple_logger::SimpleLogger;
use std::{
    error::Error,
    fs::File,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

const DEFAULT_CONFIG_PATH: &str = "ledbus.json";

fn load_config(path: &str) -> Result<Configuration, Box<dyn Error>> {
    let file = File::open(path).map_err(|e| format!("could not open {}: {}", path, e))?;
    Ok(Configuration::from_reader(file)?)
}

fn build_pwm_writer(config: &Configuration) -> Arc<Mutex<dyn PwmWriter>> {
    if config.pwm_section.channels.is_empty() {
        return Arc::new(Mutex::new(MemoryPwmWriter::new()));
    }

    match SysfsPwmWriter::new(config.pwm_section.channels.clone()) {
        Ok(writer) => Arc::new(Mutex::new(writer)),
        Err(e) => {
            warn!("Falling back to in-memory PWM output: {}", e);
            Arc::new(Mutex::new(MemoryPwmWriter::new()))
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&path)?;

    SimpleLogger::new().with_level(config.log_level_filter()?).env().init()?;
    info!("Loaded configuration from {} (platform {})", path, config.platform);

    let platform = config.platform;
    let transmitter = Arc::new(Mutex::new(LoggingTransmitter::new()));
    let ledger = PinLedger::new_shared(config.gpio_section.pins.iter().copied(), platform.channel_slots().unwrap_or(0));
    let backends = BusBackends {
        platform,
        ledger: ledger.clone(),
        drivers: Arc::new(MemoryDriverFactory::new(platform)),
        pwm: build_pwm_writer(&config),
        transmitter: transmitter.clone(),
    };

    let mut registry = BusRegistry::new(backends);
    let (descriptors, total) = config.bus_section.descriptors(platform)?;
    for descriptor in &descriptors {
        if let Err(e) = registry.add(descriptor) {
            warn!("Could not add {} bus: {}", descriptor.kind, e);
        }
    }
    for (index, bus) in registry.buses().enumerate() {
        let mut pins = [0u8; MAX_BUS_PINS];
        let used = bus.report_pins(&mut pins);
        info!(
            "bus {}: {} at {}, {} pixels, pins {:?}",
            index,
            bus.kind(),
            bus.start(),
            bus.length(),
            &pins[..used]
        );
    }
    info!(
        "{} buses registered, {} of {} configured pixels addressable, pins in use: {:?}",
        registry.num_buses(),
        registry.total_length(),
        total,
        ledger.read().claimed_pins()
    );

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))?;

    registry.set_brightness(config.brightness);
    info!("Painting {} pixels with {}", registry.total_length(), config.test_color);
    for index in 0..registry.total_length() {
        registry.set_pixel_color(index, config.test_color);
    }

    let frame_interval = Duration::from_millis(config.frame_interval_ms);
    let mut frames: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let frame_start = Instant::now();
        if registry.can_render_all() {
            registry.render();
            frames += 1;
        }

        if let Some(rest) = frame_interval.checked_sub(frame_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    info!("Shutting down after {} frames", frames);
    registry.remove_all();
    info!("{} network frames sent", transmitter.lock().frames_sent());
    Ok(())
}
