use embedded_io::{Read, Write};
use log::{trace, warn};

use crate::checksum::{HEADER_SIZE, checksum};
use crate::serial::{FrameIOError, read_byte};

/// The response length is a u16 on the wire, but the bus never sends back
/// more than about 512 bytes. Raw sample captures are larger, hence 1536.
pub const MAX_PACKET_SIZE: usize = 1536;

/// Request length is a single byte on the wire.
const MAX_REQUEST_LENGTH: usize = u8::MAX as usize;

/// Error type for framing packets on either side of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    LengthExceedsCapacity {
        length: usize,
        capacity: usize,
    },
    UnalignedPayload {
        length: usize,
    },
    EncodeBufferTooSmall {
        expected: usize,
        found: usize,
    },
    DecodeBufferTooSmall {
        expected_at_least: usize,
        found: usize,
    },
    ChecksumMismatch {
        calculated: u8,
        found: u8,
    },
}

/// What the host asked for with its length byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Zero length: not meant for the bus.
    Probe,
    Bus { length: u8 },
}

/// The one in-flight packet. Request bytes are read into `data`, then the
/// bus response overwrites them in place.
#[derive(Debug)]
pub struct Packet<const N: usize = MAX_PACKET_SIZE> {
    /// Bytes in the request: header, data and checksum.
    length: u8,
    /// Bytes captured from the bus for the last transaction.
    received_len: u16,
    data: [u8; N],
}

impl<const N: usize> Packet<N> {
    pub const CAPACITY: usize = N;

    pub const fn new() -> Packet<N> {
        const { assert!(N <= u16::MAX as usize, "packet capacity must fit the response length field") };
        Packet {
            length: 0,
            received_len: 0,
            data: [0; N],
        }
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn received_len(&self) -> u16 {
        self.received_len
    }

    /// The bytes the host asked to put on the bus.
    pub fn request(&self) -> &[u8] {
        &self.data[..self.length as usize]
    }

    /// The bytes captured from the bus by the last transaction.
    pub fn response(&self) -> &[u8] {
        &self.data[..self.received_len as usize]
    }

    /// The whole buffer, for the transceiver to capture into.
    pub(crate) fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Places a request directly, bypassing the serial link.
    pub fn load_request(&mut self, request: &[u8]) -> Result<(), FramingError> {
        let capacity = N.min(MAX_REQUEST_LENGTH);
        if request.len() > capacity {
            return Err(FramingError::LengthExceedsCapacity {
                length: request.len(),
                capacity,
            });
        }
        self.data[..request.len()].copy_from_slice(request);
        self.length = request.len() as u8;
        self.received_len = 0;
        Ok(())
    }

    /// XOR over the header plus `data_bytes` bytes of frame data.
    ///
    /// # Panics
    ///
    /// If `data_bytes + 4` runs past the end of the buffer.
    pub fn checksum(&self, data_bytes: usize) -> u8 {
        checksum(&self.data[..data_bytes + HEADER_SIZE])
    }

    /// Appends the checksum for a frame of `data_bytes` data bytes already
    /// sitting behind the header, and makes the whole frame the request.
    pub fn seal(&mut self, data_bytes: usize) -> Result<u8, FramingError> {
        // Saturate so an absurd count lands in the capacity check below.
        let length = data_bytes
            .checked_add(HEADER_SIZE + 1)
            .unwrap_or(usize::MAX);
        let capacity = N.min(MAX_REQUEST_LENGTH);
        if length > capacity {
            return Err(FramingError::LengthExceedsCapacity { length, capacity });
        }
        let crc = self.checksum(data_bytes);
        self.data[length - 1] = crc;
        self.length = length as u8;
        Ok(crc)
    }

    /// Stores where the transceiver stopped capturing. An end past the buffer
    /// is clamped.
    pub(crate) fn record_response(&mut self, end: usize) -> u16 {
        let end = if end > N {
            warn!("transceiver reported end {} past capacity {}, clamping", end, N);
            N
        } else {
            end
        };
        self.received_len = end as u16;
        self.received_len
    }

    /// Blocks for the next request from the host: a length byte, then that
    /// many bytes.
    ///
    /// A request too large for the buffer is still consumed from `rx` so the
    /// next length byte lines up, then rejected.
    pub fn read_request<R: Read>(&mut self, rx: &mut R) -> Result<Request, FrameIOError<R::Error>> {
        let length = read_byte(rx)?;
        self.length = 0;
        self.received_len = 0;
        if length == 0 {
            return Ok(Request::Probe);
        }
        let length = length as usize;
        if length > N {
            let mut scratch = [0; 16];
            let mut remaining = length;
            while remaining > 0 {
                let n = remaining.min(scratch.len());
                rx.read_exact(&mut scratch[..n])?;
                remaining -= n;
            }
            return Err(FramingError::LengthExceedsCapacity { length, capacity: N }.into());
        }
        rx.read_exact(&mut self.data[..length])?;
        self.length = length as u8;
        trace!("request of {} bytes", length);
        Ok(Request::Bus { length: self.length })
    }

    /// Sends the response length (big-endian u16) and then the captured bytes.
    pub fn write_response<W: Write>(&self, tx: &mut W) -> Result<(), FrameIOError<W::Error>> {
        tx.write_all(&self.received_len.to_be_bytes())
            .map_err(FrameIOError::Write)?;
        if self.received_len > 0 {
            tx.write_all(self.response()).map_err(FrameIOError::Write)?;
        }
        tx.flush().map_err(FrameIOError::Write)
    }
}

impl<const N: usize> Default for Packet<N> {
    fn default() -> Self {
        Packet::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use embedded_io::ReadExactError;

    use super::*;

    #[test]
    fn reads_length_then_payload() {
        let mut p = Packet::<MAX_PACKET_SIZE>::new();
        let mut rx: &[u8] = &[0x05, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x42];
        assert_eq!(p.read_request(&mut rx), Ok(Request::Bus { length: 5 }));
        assert_eq!(p.request(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee]);
        // Next request's length byte is left alone.
        assert_eq!(rx, [0x42]);
    }

    #[test]
    fn zero_length_is_a_probe() {
        let mut p = Packet::<MAX_PACKET_SIZE>::new();
        let mut rx: &[u8] = &[0x00, 0x07];
        assert_eq!(p.read_request(&mut rx), Ok(Request::Probe));
        assert_eq!(p.length(), 0);
        assert_eq!(rx, [0x07]);
    }

    #[test]
    fn short_request_is_eof() {
        let mut p = Packet::<MAX_PACKET_SIZE>::new();
        let mut rx: &[u8] = &[0x04, 0x01, 0x02];
        assert_eq!(
            p.read_request(&mut rx),
            Err(FrameIOError::Read(ReadExactError::UnexpectedEof))
        );
    }

    #[test]
    fn oversized_request_is_drained_and_rejected() {
        let mut p = Packet::<8>::new();
        let mut bytes = Vec::from([40u8]);
        bytes.extend(0..40u8);
        bytes.push(0x99);
        let mut rx: &[u8] = &bytes;
        assert_eq!(
            p.read_request(&mut rx),
            Err(FrameIOError::Framing(FramingError::LengthExceedsCapacity {
                length: 40,
                capacity: 8
            }))
        );
        assert_eq!(p.length(), 0);
        assert_eq!(rx, [0x99]);
    }

    #[test]
    fn full_width_request_fits_extended_buffer() {
        let mut p = Packet::<MAX_PACKET_SIZE>::new();
        let mut bytes = Vec::from([0xffu8]);
        bytes.extend((0..255).map(|i| i as u8));
        let mut rx: &[u8] = &bytes;
        assert_eq!(p.read_request(&mut rx), Ok(Request::Bus { length: 255 }));
        assert_eq!(p.request(), &bytes[1..]);
    }

    #[test]
    fn response_is_length_prefixed_big_endian() {
        let mut p = Packet::<MAX_PACKET_SIZE>::new();
        p.buffer_mut()[..3].copy_from_slice(&[0x11, 0x22, 0x33]);
        p.record_response(3);
        let mut out = Vec::new();
        p.write_response(&mut out).unwrap();
        assert_eq!(out, [0x00, 0x03, 0x11, 0x22, 0x33]);

        p.record_response(0x1ff);
        out.clear();
        p.write_response(&mut out).unwrap();
        assert_eq!(&out[..2], [0x01, 0xff]);
        assert_eq!(out.len(), 2 + 0x1ff);
    }

    #[test]
    fn empty_response_is_just_the_length() {
        let p = Packet::<MAX_PACKET_SIZE>::new();
        let mut out = Vec::new();
        p.write_response(&mut out).unwrap();
        assert_eq!(out, [0x00, 0x00]);
    }

    #[test]
    fn response_end_is_clamped_to_capacity() {
        let mut p = Packet::<32>::new();
        assert_eq!(p.record_response(4000), 32);
        assert_eq!(p.response().len(), 32);
    }

    #[test]
    fn checksum_covers_header_and_data() {
        let mut p = Packet::<MAX_PACKET_SIZE>::new();
        p.load_request(&[0x01, 0x00, 0x20, 0x09, 0x01, 0x00, 0x00, 0x00])
            .unwrap();
        assert_eq!(p.checksum(0), 0x01 ^ 0x20 ^ 0x09);
        assert_eq!(p.checksum(4), 0x01 ^ 0x20 ^ 0x09 ^ 0x01);
    }

    #[test]
    fn seal_appends_checksum() {
        let mut p = Packet::<MAX_PACKET_SIZE>::new();
        p.load_request(&[0x00, 0x00, 0x20, 0x01]).unwrap();
        let crc = p.seal(0).unwrap();
        assert_eq!(crc, 0x21);
        assert_eq!(p.request(), [0x00, 0x00, 0x20, 0x01, 0x21]);
        assert_eq!(checksum(p.request()), 0);
    }

    #[test]
    fn seal_rejects_frames_over_one_length_byte() {
        let mut p = Packet::<MAX_PACKET_SIZE>::new();
        assert_eq!(
            p.seal(251),
            Err(FramingError::LengthExceedsCapacity {
                length: 256,
                capacity: 255
            })
        );
    }

    #[test]
    fn seal_with_huge_count_is_rejected() {
        let mut p = Packet::<64>::new();
        assert_eq!(
            p.seal(usize::MAX - 2),
            Err(FramingError::LengthExceedsCapacity {
                length: usize::MAX,
                capacity: 64
            })
        );
        assert_eq!(p.length(), 0);
    }

    #[test]
    fn load_request_respects_small_capacity() {
        let mut p = Packet::<4>::new();
        assert!(p.load_request(&[1, 2, 3, 4, 5]).is_err());
        p.load_request(&[1, 2, 3, 4]).unwrap();
        assert_eq!(p.request(), [1, 2, 3, 4]);
    }
}
