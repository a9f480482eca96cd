use super::{
    descriptor::{BusDescriptor, MAX_BUS_PINS},
    kind::BusKind,
    BusError, LedBus,
};
use crate::color::{Color, ColorOrder};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::{
    net::Ipv4Addr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use strum::Display;
use uuid::Uuid;

/// Realtime protocol a network bus broadcasts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum NetworkProtocol {
    Ddp,
    E131,
    ArtNet,
}

impl NetworkProtocol {
    pub fn from_kind(kind: BusKind) -> Option<Self> {
        match kind {
            BusKind::NetDdpRgb => Some(NetworkProtocol::Ddp),
            BusKind::NetE131Rgb => Some(NetworkProtocol::E131),
            BusKind::NetArtnetRgb => Some(NetworkProtocol::ArtNet),
            _ => None,
        }
    }
}

/// Everything a transmitter needs to send out one frame.
pub struct BroadcastFrame<'a> {
    pub protocol: NetworkProtocol,
    pub destination: Ipv4Addr,
    pub pixel_count: u16,
    pub data: &'a [u8],
    pub brightness: u8,
    pub rgbw: bool,
}

/// Marks a frame as in flight for as long as it is alive.
///
/// The bus that issued it reports `can_render() == false` until the guard
/// is dropped. A transmitter that finishes inside `send` simply lets it go
/// out of scope; one that keeps sending in the background holds on to it.
pub struct SendGuard {
    in_flight: Arc<AtomicBool>,
}

impl SendGuard {
    fn new(in_flight: &Arc<AtomicBool>) -> Self {
        in_flight.store(true, Ordering::Release);
        SendGuard {
            in_flight: in_flight.clone(),
        }
    }
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// External realtime broadcast sender. Fire-and-forget: errors stay with the
/// transmitter.
pub trait BroadcastTransmitter: Send {
    fn send(&mut self, frame: &BroadcastFrame<'_>, guard: SendGuard);
}

/// Transmitter that only logs the frames handed to it.
#[derive(Default)]
pub struct LoggingTransmitter {
    frames_sent: u64,
}

impl LoggingTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

impl BroadcastTransmitter for LoggingTransmitter {
    fn send(&mut self, frame: &BroadcastFrame<'_>, _guard: SendGuard) {
        self.frames_sent += 1;
        debug!(
            "{} frame #{} to {}: {} pixels, {} bytes, brightness {}",
            frame.protocol,
            self.frames_sent,
            frame.destination,
            frame.pixel_count,
            frame.data.len(),
            frame.brightness
        );
    }
}

/// Remote fixture fed by broadcasting the whole pixel buffer.
pub struct NetworkVirtualBus {
    id: Uuid,
    kind: BusKind,
    start: u16,
    len: u16,
    brightness: u8,
    rgbw: bool,
    channels: usize,
    protocol: Option<NetworkProtocol>,
    destination: Ipv4Addr,
    data: Option<Vec<u8>>,
    in_flight: Arc<AtomicBool>,
    transmitter: Arc<Mutex<dyn BroadcastTransmitter>>,
}

impl NetworkVirtualBus {
    pub fn new(descriptor: &BusDescriptor, transmitter: Arc<Mutex<dyn BroadcastTransmitter>>) -> Self {
        let rgbw = descriptor.kind.is_rgbw();
        let address = match descriptor.pins() {
            [a, b, c, d] => Ipv4Addr::new(*a, *b, *c, *d),
            _ => Ipv4Addr::UNSPECIFIED,
        };

        let mut bus = NetworkVirtualBus {
            id: Uuid::new_v4(),
            kind: descriptor.kind,
            start: descriptor.start,
            len: 0,
            brightness: 255,
            rgbw,
            channels: if rgbw { 4 } else { 3 },
            protocol: NetworkProtocol::from_kind(descriptor.kind),
            destination: address,
            data: None,
            in_flight: Arc::new(AtomicBool::new(false)),
            transmitter,
        };

        match bus.init(descriptor.pixel_count) {
            Ok(()) => info!(
                "Initialized {:?} network bus to {} ({} pixels)",
                bus.protocol, bus.destination, bus.len
            ),
            Err(e) => warn!("Failed to initialize network bus to {}: {}", bus.destination, e),
        }

        bus
    }

    fn init(&mut self, pixel_count: u16) -> Result<(), BusError> {
        if self.protocol.is_none() {
            return Err(BusError::UnsupportedType(self.kind.code()));
        }

        let bytes = pixel_count as usize * self.channels;
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| BusError::AllocationFailed(bytes))?;
        data.resize(bytes, 0);

        self.data = Some(data);
        self.len = pixel_count;
        Ok(())
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn protocol(&self) -> Option<NetworkProtocol> {
        self.protocol
    }

    /// Raw frame buffer, packed R,G,B[,W] per pixel.
    pub fn buffer(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl LedBus for NetworkVirtualBus {
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
        self.data.is_some()
    }

    fn set_pixel(&mut self, index: u16, color: Color) {
        if index >= self.len {
            return;
        }

        let channels = self.channels;
        let rgbw = self.rgbw;
        if let Some(data) = self.data.as_mut() {
            let offset = index as usize * channels;
            data[offset] = color.r();
            data[offset + 1] = color.g();
            data[offset + 2] = color.b();
            if rgbw {
                data[offset + 3] = color.w();
            }
        }
    }

    fn get_pixel(&self, index: u16) -> Color {
        if index >= self.len {
            return Color::BLACK;
        }

        match self.data.as_ref() {
            Some(data) => {
                let offset = index as usize * self.channels;
                let w = if self.rgbw { data[offset + 3] } else { 0 };
                Color::from_rgbw(data[offset], data[offset + 1], data[offset + 2], w)
            }
            None => Color::BLACK,
        }
    }

    fn render(&mut self) {
        if !self.can_render() {
            return;
        }

        let (data, protocol) = match (self.data.as_ref(), self.protocol) {
            (Some(d), Some(p)) => (d, p),
            _ => return,
        };

        let frame = BroadcastFrame {
            protocol,
            destination: self.destination,
            pixel_count: self.len,
            data,
            brightness: self.brightness,
            rgbw: self.rgbw,
        };
        let guard = SendGuard::new(&self.in_flight);
        self.transmitter.lock().send(&frame, guard);
    }

    fn can_render(&self) -> bool {
        !self.in_flight.load(Ordering::Acquire)
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }

    fn length(&self) -> u16 {
        self.len
    }

    fn color_order(&self) -> ColorOrder {
        ColorOrder::Rgb
    }

    fn is_rgbw(&self) -> bool {
        self.rgbw && self.is_valid()
    }

    /// The four "pins" of a network bus are the destination address bytes.
    fn report_pins(&self, pins: &mut [u8; MAX_BUS_PINS]) -> usize {
        if !self.is_valid() {
            return 0;
        }

        pins[..4].copy_from_slice(&self.destination.octets());
        4
    }

    fn cleanup(&mut self) {
        if self.data.take().is_some() {
            debug!("Network bus cleanup ({})", self.id);
        }
        self.len = 0;
    }
}

impl Drop for NetworkVirtualBus {
    fn drop(&mut self) {
        self.cleanup();
    }
}
