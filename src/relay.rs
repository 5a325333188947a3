use embedded_io::{Read, Write};
use log::{debug, error, trace, warn};

use crate::bus::{SkipAmount, Transceiver, transact};
use crate::packet::{MAX_PACKET_SIZE, Packet, Request};
use crate::serial::{FrameIOError, write_byte};

/// Sole reply to a zero-length request. Hosts use it to check the relay is
/// alive.
pub const PROBE_ACK: u8 = 1;

/// Observation point for a scope or logic analyser. Has no effect on the
/// protocol.
pub trait DebugSignal {
    fn signal(&mut self, high: bool);
}

/// Debug hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignal;

impl DebugSignal for NoSignal {
    fn signal(&mut self, _high: bool) {}
}

impl<F: FnMut(bool)> DebugSignal for F {
    fn signal(&mut self, high: bool) {
        self(high)
    }
}

/// What one pass of the relay did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    Probe,
    Transaction { sent: u8, received: u16 },
}

/// Moves requests from the host onto the bus and responses back, one at a
/// time, forever.
///
/// The debug signal goes high when the loop starts, low once a request has
/// been read, and high again once its reply is out.
pub struct Relay<T, B, D = NoSignal, const N: usize = MAX_PACKET_SIZE> {
    serial: T,
    bus: B,
    signal: D,
    packet: Packet<N>,
    skip: SkipAmount,
}

impl<T, B, const N: usize> Relay<T, B, NoSignal, N>
where
    T: Read + Write,
    B: Transceiver,
{
    pub fn new(serial: T, bus: B) -> Self {
        Self::with_signal(serial, bus, NoSignal)
    }
}

impl<T, B, D, const N: usize> Relay<T, B, D, N>
where
    T: Read + Write,
    B: Transceiver,
    D: DebugSignal,
{
    pub fn with_signal(serial: T, bus: B, signal: D) -> Self {
        Relay {
            serial,
            bus,
            signal,
            packet: Packet::new(),
            skip: 0,
        }
    }

    /// Sets the skip amount handed to the transceiver on every transaction.
    pub fn with_skip(mut self, skip: SkipAmount) -> Self {
        self.skip = skip;
        self
    }

    /// Serves requests until the serial link fails. Oversized requests are
    /// logged and skipped.
    pub fn run(&mut self) -> FrameIOError<T::Error> {
        debug!("relay up, capacity {} bytes, skip {}", N, self.skip);
        self.signal.signal(true);
        loop {
            match self.serve_one() {
                Ok(_) => {}
                Err(FrameIOError::Framing(_)) => {}
                Err(e) => {
                    error!("serial link failed: {:?}", e);
                    return e;
                }
            }
        }
    }

    /// Reads one request, dispatches it and writes the reply.
    pub fn serve_one(&mut self) -> Result<Served, FrameIOError<T::Error>> {
        let request = match self.packet.read_request(&mut self.serial) {
            Ok(request) => request,
            Err(FrameIOError::Framing(e)) => {
                warn!("rejecting request: {:?}", e);
                self.signal.signal(false);
                // Zero-length reply keeps the host in step.
                self.packet.write_response(&mut self.serial)?;
                self.signal.signal(true);
                return Err(FrameIOError::Framing(e));
            }
            Err(e) => return Err(e),
        };
        self.signal.signal(false);

        let served = match request {
            Request::Probe => {
                trace!("probe");
                write_byte(&mut self.serial, PROBE_ACK).map_err(FrameIOError::Write)?;
                self.serial.flush().map_err(FrameIOError::Write)?;
                Served::Probe
            }
            Request::Bus { length } => {
                let received = transact(&mut self.bus, &mut self.packet, self.skip);
                self.packet.write_response(&mut self.serial)?;
                Served::Transaction {
                    sent: length,
                    received,
                }
            }
        };
        self.signal.signal(true);
        Ok(served)
    }

    pub fn packet(&self) -> &Packet<N> {
        &self.packet
    }

    pub fn serial(&self) -> &T {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut T {
        &mut self.serial
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_parts(self) -> (T, B, D) {
        (self.serial, self.bus, self.signal)
    }
}
