/// Size of the bus frame header that sits in front of the data words.
/// The checksum always covers it.
pub const HEADER_SIZE: usize = 4;

/// XOR of every byte in `bytes`. An empty slice checksums to 0.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}
