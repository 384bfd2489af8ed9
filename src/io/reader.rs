use super::{BitOrder, Source};
use crate::Error;
use std::io::Read;

#[derive(Debug, Clone, Copy)]
struct BitState {
    byte: u8,
    avail: u8,
    order: BitOrder,
}

/// A position-tracked byte source over any [`Read`] implementation
///
/// ```
/// use binform::{Source, StreamInput};
///
/// let mut input = StreamInput::from_slice(&[0x01, 0x02, 0x03]);
/// assert_eq!(input.read_bytes(2).unwrap(), vec![0x01, 0x02]);
/// assert_eq!(input.pos(), 2);
/// ```
#[derive(Debug)]
pub struct StreamInput<R> {
    reader: R,
    pos: u64,
    peeked: Option<u8>,
    bit: Option<BitState>,
}

impl StreamInput<std::io::Cursor<Vec<u8>>> {
    /// Convenience constructor over an in-memory byte slice
    pub fn from_slice(data: &[u8]) -> Self {
        StreamInput::new(std::io::Cursor::new(data.to_vec()))
    }
}

impl<R> StreamInput<R>
where
    R: Read,
{
    /// Wrap a reader, starting the byte position at zero
    pub fn new(reader: R) -> Self {
        StreamInput {
            reader,
            pos: 0,
            peeked: None,
            bit: None,
        }
    }

    /// Consumes this input, returning the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn fetch_byte(&mut self) -> Result<Option<u8>, Error> {
        if let Some(b) = self.peeked.take() {
            self.pos += 1;
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.pos += 1;
                    return Ok(Some(buf[0]));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn peek_byte(&mut self) -> Result<Option<u8>, Error> {
        if self.peeked.is_some() {
            return Ok(self.peeked);
        }
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.peeked = Some(buf[0]);
                    return Ok(self.peeked);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<R> Source for StreamInput<R>
where
    R: Read,
{
    fn read_into(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.bit = None;
        if buf.is_empty() {
            return Ok(());
        }
        let mut start = 0;
        if let Some(b) = self.peeked.take() {
            buf[0] = b;
            self.pos += 1;
            start = 1;
        }
        self.reader.read_exact(&mut buf[start..])?;
        self.pos += (buf.len() - start) as u64;
        Ok(())
    }

    fn read_bits(&mut self, count: u32, order: BitOrder) -> Result<u64, Error> {
        debug_assert!(count <= 64);
        // a pending byte of the opposite order cannot be shared
        if let Some(state) = self.bit {
            if state.order != order {
                self.bit = None;
            }
        }
        let mut value = 0u64;
        let mut done = 0u32;
        while done < count {
            let mut state = match self.bit {
                Some(s) if s.avail > 0 => s,
                _ => {
                    let byte = self.fetch_byte()?.ok_or_else(Error::eof)?;
                    BitState {
                        byte,
                        avail: 8,
                        order,
                    }
                }
            };
            let take = u32::from(state.avail).min(count - done);
            let mask = ((1u16 << take) - 1) as u8;
            match order {
                BitOrder::Msb => {
                    let shift = u32::from(state.avail) - take;
                    let bits = (state.byte >> shift) & mask;
                    value = (value << take) | u64::from(bits);
                }
                BitOrder::Lsb => {
                    let consumed = 8 - u32::from(state.avail);
                    let bits = (state.byte >> consumed) & mask;
                    value |= u64::from(bits) << done;
                }
            }
            state.avail -= take as u8;
            done += take;
            self.bit = if state.avail > 0 { Some(state) } else { None };
        }
        Ok(value)
    }

    fn skip(&mut self, n: u64) -> Result<(), Error> {
        self.bit = None;
        let mut remaining = n;
        if remaining > 0 && self.peeked.take().is_some() {
            self.pos += 1;
            remaining -= 1;
        }
        let mut scratch = [0u8; 512];
        while remaining > 0 {
            let chunk = remaining.min(scratch.len() as u64) as usize;
            self.reader.read_exact(&mut scratch[..chunk])?;
            self.pos += chunk as u64;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    fn pos(&self) -> u64 {
        self.pos
    }

    fn has_data(&mut self) -> Result<bool, Error> {
        if let Some(state) = self.bit {
            if state.avail > 0 {
                return Ok(true);
            }
        }
        Ok(self.peek_byte()?.is_some())
    }

    fn align(&mut self) {
        self.bit = None;
    }
}
