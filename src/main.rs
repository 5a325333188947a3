use std::io;

use embedded_io::{ErrorType, Read, Write};
use log::{error, info};
use maple_relay::{MAX_PACKET_SIZE, Relay, SkipAmount, Transceiver};

/// Runs the relay against stdin/stdout with no bus attached: every frame put
/// on the "bus" comes straight back as its response. Handy for exercising
/// host tooling without the hardware.
fn main() {
    env_logger::init();

    let skip = std::env::var("MAPLE_SKIP")
        .ok()
        .and_then(|s| s.parse::<SkipAmount>().ok())
        .unwrap_or(0);
    info!("loopback relay on stdio, skip {}", skip);

    let link = StdLink::new(io::stdin(), io::stdout());
    let mut relay: Relay<_, _> = Relay::new(link, LoopbackBus::default()).with_skip(skip);
    let e = relay.run();
    error!("relay stopped: {:?}", e);
}

/// A pair of std streams standing in for the UART.
struct StdLink<R, W> {
    rx: R,
    tx: W,
}

impl<R: io::Read, W: io::Write> StdLink<R, W> {
    fn new(rx: R, tx: W) -> StdLink<R, W> {
        StdLink { rx, tx }
    }
}

impl<R, W> ErrorType for StdLink<R, W> {
    type Error = io::Error;
}

impl<R: io::Read, W> Read for StdLink<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        // read_exact gives up on Interrupted; a signal is not a dead link.
        loop {
            match self.rx.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

impl<R, W: io::Write> Write for StdLink<R, W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.tx.flush()
    }
}

/// Echoes the last transmitted frame, minus the skipped bytes.
#[derive(Debug)]
struct LoopbackBus {
    last: [u8; MAX_PACKET_SIZE],
    len: usize,
}

impl Default for LoopbackBus {
    fn default() -> Self {
        LoopbackBus {
            last: [0; MAX_PACKET_SIZE],
            len: 0,
        }
    }
}

impl Transceiver for LoopbackBus {
    fn transmit(&mut self, frame: &[u8]) {
        let n = frame.len().min(self.last.len());
        self.last[..n].copy_from_slice(&frame[..n]);
        self.len = n;
    }

    fn receive(&mut self, buffer: &mut [u8], skip: SkipAmount) -> usize {
        let echoed = self.last.get(skip as usize..self.len).unwrap_or(&[]);
        let n = echoed.len().min(buffer.len());
        buffer[..n].copy_from_slice(&echoed[..n]);
        n
    }
}
