use log::debug;

use crate::packet::Packet;

/// Leading response bytes the receiver drops before it starts counting.
pub type SkipAmount = u16;

/// The bit-level bus driver. All signal timing lives behind this trait.
///
/// Both operations are infallible by contract: a bus that never answers
/// shows up as `receive` returning 0.
pub trait Transceiver {
    /// Clocks `frame` out onto the bus.
    fn transmit(&mut self, frame: &[u8]);

    /// Captures the bus response into `buffer`, dropping the first `skip`
    /// bytes, and returns the offset just past the last captured byte.
    fn receive(&mut self, buffer: &mut [u8], skip: SkipAmount) -> usize;
}

impl<T: Transceiver + ?Sized> Transceiver for &mut T {
    fn transmit(&mut self, frame: &[u8]) {
        (**self).transmit(frame)
    }

    fn receive(&mut self, buffer: &mut [u8], skip: SkipAmount) -> usize {
        (**self).receive(buffer, skip)
    }
}

/// One transmit-then-receive exchange using `packet` for both directions.
///
/// The response overwrites the request in place. Returns how many bytes of
/// the buffer now hold response data. Nothing is retried or validated; a
/// bad or missing response is the host's problem.
pub fn transact<B: Transceiver, const N: usize>(
    bus: &mut B,
    packet: &mut Packet<N>,
    skip: SkipAmount,
) -> u16 {
    bus.transmit(packet.request());
    let end = bus.receive(packet.buffer_mut(), skip);
    let received = packet.record_response(end);
    debug!("transaction sent {} bytes, received {}", packet.length(), received);
    received
}
