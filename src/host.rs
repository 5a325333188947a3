use embedded_io::{Read, Write};
use log::{debug, warn};

use crate::frame::Frame;
use crate::packet::FramingError;
use crate::relay::PROBE_ACK;
use crate::serial::{FrameIOError, read_byte, write_byte};

/// The host's end of the serial link to a relay.
#[derive(Debug)]
pub struct HostLink<T> {
    serial: T,
}

impl<T: Read + Write> HostLink<T> {
    pub fn new(serial: T) -> HostLink<T> {
        HostLink { serial }
    }

    pub fn into_inner(self) -> T {
        self.serial
    }

    /// Sends a zero-length request and checks the relay answers it.
    pub fn ping(&mut self) -> Result<bool, FrameIOError<T::Error>> {
        write_byte(&mut self.serial, 0).map_err(FrameIOError::Write)?;
        self.serial.flush().map_err(FrameIOError::Write)?;
        let reply = read_byte(&mut self.serial)?;
        if reply != PROBE_ACK {
            warn!("probe answered with {:#04x}", reply);
        }
        Ok(reply == PROBE_ACK)
    }

    /// Puts `frame` on the bus through the relay and reads the response into
    /// `response`, returning its length.
    ///
    /// A response that does not fit `response` is read off the link anyway so
    /// the next exchange starts clean, then reported as an error.
    pub fn transact(
        &mut self,
        frame: &Frame<'_>,
        response: &mut [u8],
    ) -> Result<usize, FrameIOError<T::Error>> {
        let bytes = frame.bytes();
        write_byte(&mut self.serial, bytes.len() as u8).map_err(FrameIOError::Write)?;
        self.serial.write_all(&bytes).map_err(FrameIOError::Write)?;
        self.serial.flush().map_err(FrameIOError::Write)?;

        let mut len = [0; 2];
        self.serial.read_exact(&mut len)?;
        let len = u16::from_be_bytes(len) as usize;
        debug!("sent {} byte frame, {} bytes back", bytes.len(), len);

        if len > response.len() {
            let mut scratch = [0; 16];
            let mut remaining = len;
            while remaining > 0 {
                let n = remaining.min(scratch.len());
                self.serial.read_exact(&mut scratch[..n])?;
                remaining -= n;
            }
            return Err(FramingError::DecodeBufferTooSmall {
                expected_at_least: len,
                found: response.len(),
            }
            .into());
        }
        self.serial.read_exact(&mut response[..len])?;
        Ok(len)
    }
}
