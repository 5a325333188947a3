#![no_std]

pub mod bus;
pub mod checksum;
pub mod frame;
pub mod host;
pub mod packet;
pub mod relay;
pub mod serial;

pub trait Encode {
    type Error;

    fn encode(&self, buffer: &mut [u8]) -> Result<(), Self::Error>;
}

pub trait Decode<'a> where Self: Sized {
    type Error;

    fn decode(data: &'a [u8]) -> Result<Self, Self::Error>;
}

pub use bus::{SkipAmount, Transceiver, transact};
pub use checksum::{HEADER_SIZE, checksum};
pub use frame::{ADDRESS_HOST, Frame, FrameHeader, MAX_REQUEST_SIZE};
pub use host::HostLink;
pub use packet::{FramingError, MAX_PACKET_SIZE, Packet, Request};
pub use relay::{DebugSignal, NoSignal, PROBE_ACK, Relay, Served};
pub use serial::{ErrorShim, FrameIOError, NbSerial, TextWriter, read_byte, write_byte};
