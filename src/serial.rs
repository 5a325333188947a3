use core::fmt;

use embedded_hal_nb::serial::{self, Error};
use embedded_io::{Read, ReadExactError, Write};

use crate::packet::FramingError;

/// Blocks until one byte arrives on `rx`.
pub fn read_byte<R: Read>(rx: &mut R) -> Result<u8, ReadExactError<R::Error>> {
    let mut b = [0; 1];
    rx.read_exact(&mut b)?;
    Ok(b[0])
}

/// Writes one byte to `tx` exactly as given. Binary traffic goes through here
/// and is never translated; see [`TextWriter`] for the text path.
pub fn write_byte<W: Write>(tx: &mut W, b: u8) -> Result<(), W::Error> {
    tx.write_all(&[b])
}

/// Everything that can go wrong moving a packet over the serial link.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameIOError<E> {
    Framing(FramingError),
    Read(ReadExactError<E>),
    Write(E),
}

impl<E> From<FramingError> for FrameIOError<E> {
    fn from(value: FramingError) -> Self {
        FrameIOError::Framing(value)
    }
}

impl<E> From<ReadExactError<E>> for FrameIOError<E> {
    fn from(value: ReadExactError<E>) -> Self {
        FrameIOError::Read(value)
    }
}

/// Wraps a non-blocking UART error so it can travel as an `embedded_io` error.
#[derive(Debug, PartialEq, Eq)]
pub struct ErrorShim<T: Error>(pub T);

impl<T: Error> embedded_io::Error for ErrorShim<T> {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_hal_nb::serial::ErrorKind::*;
        match self.0.kind() {
            Overrun => embedded_io::ErrorKind::OutOfMemory,
            FrameFormat => embedded_io::ErrorKind::InvalidData,
            Noise => embedded_io::ErrorKind::Other,
            Parity => embedded_io::ErrorKind::InvalidData,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl<T: Error> From<T> for ErrorShim<T> {
    fn from(value: T) -> Self {
        ErrorShim(value)
    }
}

/// Turns a word-at-a-time `embedded_hal_nb` UART into a blocking
/// `embedded_io` byte stream by spinning on `WouldBlock`.
#[derive(Debug)]
pub struct NbSerial<S> {
    serial: S,
}

impl<S> NbSerial<S> {
    pub fn new(serial: S) -> NbSerial<S> {
        NbSerial { serial }
    }

    pub fn into_inner(self) -> S {
        self.serial
    }
}

impl<S: serial::ErrorType> embedded_io::ErrorType for NbSerial<S> {
    type Error = ErrorShim<S::Error>;
}

impl<S: serial::Read> Read for NbSerial<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        // One byte per call; read_exact loops for the rest.
        let Some(first) = buf.first_mut() else {
            return Ok(0);
        };
        *first = nb::block!(self.serial.read())?;
        Ok(1)
    }
}

impl<S: serial::Write> Write for NbSerial<S> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for b in buf {
            nb::block!(self.serial.write(*b))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        nb::block!(self.serial.flush())?;
        Ok(())
    }
}

/// Human-readable output over the serial link. Every `\n` goes out as `\r\n`
/// so a plain terminal renders it; never use this for relay traffic.
pub struct TextWriter<'a, W: Write> {
    tx: &'a mut W,
}

impl<'a, W: Write> TextWriter<'a, W> {
    pub fn new(tx: &'a mut W) -> TextWriter<'a, W> {
        TextWriter { tx }
    }
}

impl<W: Write> fmt::Write for TextWriter<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if b == b'\n' {
                write_byte(self.tx, b'\r').map_err(|_| fmt::Error)?;
            }
            write_byte(self.tx, b).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}
