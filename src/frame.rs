use bilge::prelude::*;

use crate::checksum::{HEADER_SIZE, checksum};
use crate::packet::FramingError;
use crate::{Decode, Encode};

/// Sender address the host uses for itself.
pub const ADDRESS_HOST: u8 = 0;

/// Largest frame a request can carry: its length is a single byte.
pub const MAX_REQUEST_SIZE: usize = u8::MAX as usize;

/// Data bytes per header word count.
const WORD_SIZE: usize = 4;

/// Largest data section that still fits a request with header and checksum.
const MAX_FRAME_DATA: usize = (MAX_REQUEST_SIZE - HEADER_SIZE - 1) / WORD_SIZE * WORD_SIZE;

/// Bus frame header, stored as the little-endian word
/// `command << 24 | recipient << 16 | sender << 8 | words`, where `words`
/// counts the 4-byte data words after the header.
#[bitsize(32)]
#[derive(DebugBits, Clone, Copy, PartialEq, FromBits)]
pub struct FrameHeader {
    pub words: u8,
    pub sender: u8,
    pub recipient: u8,
    pub command: u8,
}

impl FrameHeader {
    pub const fn size() -> usize {
        HEADER_SIZE
    }

    pub fn bytes(&self) -> [u8; HEADER_SIZE] {
        self.value.to_le_bytes()
    }

    pub fn data_len(&self) -> usize {
        self.words() as usize * WORD_SIZE
    }
}

/// A bus frame as the host builds it: header, data words, trailing XOR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    data: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn new(command: u8, recipient: u8, data: &'a [u8]) -> Result<Frame<'a>, FramingError> {
        if data.len() % WORD_SIZE != 0 {
            return Err(FramingError::UnalignedPayload { length: data.len() });
        }
        if data.len() > MAX_FRAME_DATA {
            return Err(FramingError::LengthExceedsCapacity {
                length: data.len() + HEADER_SIZE + 1,
                capacity: MAX_REQUEST_SIZE,
            });
        }
        let header = FrameHeader::new(
            (data.len() / WORD_SIZE) as u8,
            ADDRESS_HOST,
            recipient,
            command,
        );
        Ok(Frame { header, data })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Encoded length: header, data and checksum.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.data.len() + 1
    }

    pub fn checksum(&self) -> u8 {
        checksum(&self.header.bytes()) ^ checksum(self.data)
    }

    pub fn bytes(&self) -> heapless::Vec<u8, MAX_REQUEST_SIZE> {
        // Frame::new keeps size() within MAX_REQUEST_SIZE.
        debug_assert!(self.size() <= MAX_REQUEST_SIZE, "frame of {} bytes", self.size());
        let mut v = heapless::Vec::<u8, MAX_REQUEST_SIZE>::new();
        v.extend_from_slice(&self.header.bytes()).ok();
        v.extend_from_slice(self.data).ok();
        v.push(self.checksum()).ok();
        v
    }
}

impl<'a> Encode for Frame<'a> {
    type Error = FramingError;

    fn encode(&self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        if buffer.len() < self.size() {
            return Err(FramingError::EncodeBufferTooSmall {
                expected: self.size(),
                found: buffer.len(),
            });
        }
        // HEADER: 4, DATA: words * 4, CHECKSUM: 1
        // |---------CHECKSUM--------|
        buffer[..HEADER_SIZE].copy_from_slice(&self.header.bytes());
        buffer[HEADER_SIZE..HEADER_SIZE + self.data.len()].copy_from_slice(self.data);
        buffer[self.size() - 1] = self.checksum();
        Ok(())
    }
}

impl<'a> Decode<'a> for Frame<'a> {
    type Error = FramingError;

    fn decode(data: &'a [u8]) -> Result<Self, Self::Error> {
        if data.len() < HEADER_SIZE + 1 {
            return Err(FramingError::DecodeBufferTooSmall {
                expected_at_least: HEADER_SIZE + 1,
                found: data.len(),
            });
        }
        let mut h = [0; HEADER_SIZE];
        h.copy_from_slice(&data[..HEADER_SIZE]);
        let header = FrameHeader::from(u32::from_le_bytes(h));
        let end = HEADER_SIZE + header.data_len();
        if data.len() < end + 1 {
            return Err(FramingError::DecodeBufferTooSmall {
                expected_at_least: end + 1,
                found: data.len(),
            });
        }
        let calculated = checksum(&data[..end]);
        let found = data[end];
        if calculated != found {
            return Err(FramingError::ChecksumMismatch { calculated, found });
        }
        Ok(Frame {
            header,
            data: &data[HEADER_SIZE..end],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_byte_order() {
        let f = Frame::new(0x0c, 0x01, &[0x04, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(f.header.bytes(), [0x02, 0x00, 0x01, 0x0c]);
        assert_eq!(f.header.value, 0x0c01_0002);
        assert_eq!(f.header.words(), 2);
    }

    #[test]
    fn device_info_request_frame() {
        let f = Frame::new(0x01, 0x20, &[]).unwrap();
        assert_eq!(f.bytes().as_slice(), [0x00, 0x00, 0x20, 0x01, 0x21]);
        assert_eq!(f.size(), 5);
    }

    #[test]
    fn encode_matches_bytes() {
        let data = [0xde, 0xad, 0xbe, 0xef];
        let f = Frame::new(0x0b, 0x01, &data).unwrap();
        let mut buf = [0; 16];
        f.encode(&mut buf).unwrap();
        assert_eq!(&buf[..f.size()], f.bytes().as_slice());
        assert_eq!(checksum(&buf[..f.size()]), 0);
    }

    #[test]
    fn encode_into_short_buffer() {
        let f = Frame::new(0x01, 0x20, &[]).unwrap();
        let mut buf = [0; 4];
        assert_eq!(
            f.encode(&mut buf),
            Err(FramingError::EncodeBufferTooSmall {
                expected: 5,
                found: 4
            })
        );
    }

    #[test]
    fn data_must_be_whole_words() {
        assert_eq!(
            Frame::new(0x0c, 0x01, &[1, 2, 3]),
            Err(FramingError::UnalignedPayload { length: 3 })
        );
    }

    #[test]
    fn data_must_fit_one_request() {
        let lcd = [0u8; 248];
        assert!(Frame::new(0x0c, 0x01, &lcd).is_ok());
        let too_big = [0u8; 252];
        assert_eq!(
            Frame::new(0x0c, 0x01, &too_big),
            Err(FramingError::LengthExceedsCapacity {
                length: 257,
                capacity: 255
            })
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "frame of 257 bytes")]
    fn bytes_refuses_to_truncate_oversized_frame() {
        let data = [0u8; 252];
        let f = Frame {
            header: FrameHeader::new(63, ADDRESS_HOST, 0x01, 0x0c),
            data: &data,
        };
        let _ = f.bytes();
    }

    #[test]
    fn decode_checks_trailing_checksum() {
        let reply = [0x01, 0x01, 0x00, 0x05, 0x11, 0x22, 0x33, 0x44, 0x00];
        let mut good = reply;
        good[8] = checksum(&reply[..8]);
        let f = Frame::decode(&good).unwrap();
        assert_eq!(f.header.command(), 0x05);
        assert_eq!(f.header.sender(), 0x01);
        assert_eq!(f.data(), [0x11, 0x22, 0x33, 0x44]);

        let mut bad = good;
        bad[8] ^= 0xff;
        assert_eq!(
            Frame::decode(&bad),
            Err(FramingError::ChecksumMismatch {
                calculated: good[8],
                found: bad[8]
            })
        );
    }

    #[test]
    fn decode_short_frame() {
        assert_eq!(
            Frame::decode(&[0x02, 0x00, 0x00, 0x05, 0x00]),
            Err(FramingError::DecodeBufferTooSmall {
                expected_at_least: 13,
                found: 5
            })
        );
    }
}
