use super::{BitOrder, Sink};
use crate::Error;
use std::io::Write;

#[derive(Debug, Clone, Copy)]
struct BitOut {
    byte: u8,
    used: u8,
    order: BitOrder,
}

/// A position-tracked byte sink over any [`Write`] implementation
///
/// ```
/// use binform::{BitOrder, Sink, StreamOutput};
///
/// let mut out: Vec<u8> = Vec::new();
/// let mut sink = StreamOutput::new(&mut out);
/// sink.write_bits(0b1010, 4, BitOrder::Msb).unwrap();
/// sink.align().unwrap();
/// drop(sink);
/// assert_eq!(out, vec![0b1010_0000]);
/// ```
#[derive(Debug)]
pub struct StreamOutput<W> {
    writer: W,
    pos: u64,
    bit: Option<BitOut>,
}

impl<W> StreamOutput<W>
where
    W: Write,
{
    /// Wrap a writer, starting the byte position at zero
    pub fn new(writer: W) -> Self {
        StreamOutput {
            writer,
            pos: 0,
            bit: None,
        }
    }

    /// Consumes this output, returning the underlying writer
    ///
    /// Pending bits are not flushed; call [`Sink::align`] first.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn emit(&mut self, byte: u8) -> Result<(), Error> {
        self.writer.write_all(&[byte])?;
        self.pos += 1;
        Ok(())
    }
}

impl<W> Sink for StreamOutput<W>
where
    W: Write,
{
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        self.align()?;
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    fn write_bits(&mut self, value: u64, count: u32, order: BitOrder) -> Result<(), Error> {
        debug_assert!(count <= 64);
        if let Some(state) = self.bit {
            if state.order != order {
                self.align()?;
            }
        }
        let mut remaining = count;
        while remaining > 0 {
            let mut state = self.bit.take().unwrap_or(BitOut {
                byte: 0,
                used: 0,
                order,
            });
            let room = 8 - u32::from(state.used);
            let take = room.min(remaining);
            let mask = ((1u16 << take) - 1) as u8;
            match order {
                BitOrder::Msb => {
                    let bits = ((value >> (remaining - take)) as u8) & mask;
                    state.byte |= bits << (room - take);
                    remaining -= take;
                }
                BitOrder::Lsb => {
                    let written = count - remaining;
                    let bits = ((value >> written) as u8) & mask;
                    state.byte |= bits << state.used;
                    remaining -= take;
                }
            }
            state.used += take as u8;
            if state.used == 8 {
                self.emit(state.byte)?;
            } else {
                self.bit = Some(state);
            }
        }
        Ok(())
    }

    fn pos(&self) -> u64 {
        self.pos
    }

    fn align(&mut self) -> Result<(), Error> {
        if let Some(state) = self.bit.take() {
            if state.used > 0 {
                self.emit(state.byte)?;
            }
        }
        Ok(())
    }
}

/// A sink that measures instead of storing
///
/// Mirrors the alignment behavior of a real sink so encoded sizes come
/// out in exact bits.
#[derive(Debug, Default)]
pub struct BitCounter {
    bits: u64,
}

impl BitCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bits that would have been emitted
    pub fn bits(&self) -> u64 {
        self.bits
    }
}

impl Sink for BitCounter {
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        self.align()?;
        self.bits += data.len() as u64 * 8;
        Ok(())
    }

    fn write_bits(&mut self, _value: u64, count: u32, _order: BitOrder) -> Result<(), Error> {
        self.bits += u64::from(count);
        Ok(())
    }

    fn pos(&self) -> u64 {
        self.bits / 8
    }

    fn align(&mut self) -> Result<(), Error> {
        self.bits = (self.bits + 7) / 8 * 8;
        Ok(())
    }
}
