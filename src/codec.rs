use crate::{
    eval::Ctx,
    io::{BitCounter, BitOrder, Endian, Sink, Source},
    registry::EndianHint,
    sanitize::SanitizedParams,
    Error, Value,
};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;
use std::rc::Rc;

/// The three-method contract implemented by every primitive wire format
///
/// Concrete codecs decode one scalar from the stream, encode one scalar
/// to it, and provide the value a clear field reports. Parameters that
/// influence the transfer (lengths, padding) are fetched lazily through
/// the [`Ctx`] so they may reference sibling fields.
pub trait Codec: fmt::Debug {
    /// Decode one value from the stream
    fn decode(&self, io: &mut dyn Source, cx: &Ctx<'_>) -> Result<Value, Error>;

    /// Encode `value` onto the stream
    fn encode(&self, value: &Value, io: &mut dyn Sink, cx: &Ctx<'_>) -> Result<(), Error>;

    /// The value a clear field reports when no `initial_value` is set
    fn default_value(&self) -> Value;

    /// Exact encoded width in bits
    fn bit_len(&self, value: &Value, cx: &Ctx<'_>) -> Result<u64, Error> {
        let mut counter = BitCounter::new();
        self.encode(value, &mut counter, cx)?;
        counter.align()?;
        Ok(counter.bits())
    }

    /// Whether this codec packs with adjacent bit fields instead of
    /// aligning to a byte boundary
    fn is_bit_field(&self) -> bool {
        false
    }
}

impl<T: Codec + ?Sized> Codec for Box<T> {
    fn decode(&self, io: &mut dyn Source, cx: &Ctx<'_>) -> Result<Value, Error> {
        (**self).decode(io, cx)
    }

    fn encode(&self, value: &Value, io: &mut dyn Sink, cx: &Ctx<'_>) -> Result<(), Error> {
        (**self).encode(value, io, cx)
    }

    fn default_value(&self) -> Value {
        (**self).default_value()
    }

    fn bit_len(&self, value: &Value, cx: &Ctx<'_>) -> Result<u64, Error> {
        (**self).bit_len(value, cx)
    }

    fn is_bit_field(&self) -> bool {
        (**self).is_bit_field()
    }
}

/// Builds a codec once a type reference has been resolved
///
/// Registered factories receive the sanitized parameters and the endian
/// derived from the name suffix and the surrounding context.
pub trait CodecFactory: fmt::Debug {
    /// Construct the codec for one field declaration
    fn build(&self, params: &SanitizedParams, endian: EndianHint) -> Result<Rc<dyn Codec>, Error>;
}

#[derive(Debug)]
pub(crate) struct IntFactory {
    pub(crate) width: u8,
    pub(crate) signed: bool,
}

impl CodecFactory for IntFactory {
    fn build(&self, _params: &SanitizedParams, endian: EndianHint) -> Result<Rc<dyn Codec>, Error> {
        let endian = if self.width == 1 {
            endian.effective().unwrap_or(Endian::Little)
        } else {
            endian
                .effective()
                .ok_or_else(|| Error::unknown_endian("unspecified"))?
        };
        Ok(Rc::new(IntCodec {
            width: self.width,
            signed: self.signed,
            endian,
        }))
    }
}

#[derive(Debug)]
pub(crate) struct BitFactory {
    pub(crate) bits: u8,
}

impl CodecFactory for BitFactory {
    fn build(&self, _params: &SanitizedParams, endian: EndianHint) -> Result<Rc<dyn Codec>, Error> {
        // bit fields default to MSB-first; only an explicit _le suffix
        // flips them, the surrounding endian does not
        let order = match endian.suffix {
            Some(Endian::Little) => BitOrder::Lsb,
            _ => BitOrder::Msb,
        };
        Ok(Rc::new(BitCodec {
            bits: self.bits,
            order,
        }))
    }
}

#[derive(Debug)]
pub(crate) struct FloatFactory {
    pub(crate) double: bool,
}

impl CodecFactory for FloatFactory {
    fn build(&self, _params: &SanitizedParams, endian: EndianHint) -> Result<Rc<dyn Codec>, Error> {
        let endian = endian
            .effective()
            .ok_or_else(|| Error::unknown_endian("unspecified"))?;
        Ok(Rc::new(FloatCodec {
            double: self.double,
            endian,
        }))
    }
}

#[derive(Debug)]
pub(crate) struct StringFactory;

impl CodecFactory for StringFactory {
    fn build(&self, _params: &SanitizedParams, _endian: EndianHint) -> Result<Rc<dyn Codec>, Error> {
        Ok(Rc::new(FixedStringCodec))
    }
}

#[derive(Debug)]
pub(crate) struct StringZFactory;

impl CodecFactory for StringZFactory {
    fn build(&self, _params: &SanitizedParams, _endian: EndianHint) -> Result<Rc<dyn Codec>, Error> {
        Ok(Rc::new(StringZCodec))
    }
}

/// Whole-byte integers of 1 to 8 bytes in either endian
#[derive(Debug)]
pub struct IntCodec {
    width: u8,
    signed: bool,
    endian: Endian,
}

impl Codec for IntCodec {
    fn decode(&self, io: &mut dyn Source, _cx: &Ctx<'_>) -> Result<Value, Error> {
        let width = usize::from(self.width);
        let mut buf = [0u8; 8];
        io.read_into(&mut buf[..width])?;
        let value = match (self.signed, self.endian) {
            (false, Endian::Little) => Value::UInt(LittleEndian::read_uint(&buf[..width], width)),
            (false, Endian::Big) => Value::UInt(BigEndian::read_uint(&buf[..width], width)),
            (true, Endian::Little) => Value::Int(LittleEndian::read_int(&buf[..width], width)),
            (true, Endian::Big) => Value::Int(BigEndian::read_int(&buf[..width], width)),
        };
        Ok(value)
    }

    fn encode(&self, value: &Value, io: &mut dyn Sink, _cx: &Ctx<'_>) -> Result<(), Error> {
        let width = usize::from(self.width);
        let mut buf = [0u8; 8];
        if self.signed {
            let v = value.as_i64()?;
            let bits = 8 * width as u32;
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if v < min || v > max {
                    return Err(Error::validity(format!(
                        "{} does not fit in a signed {} byte integer",
                        v, width
                    )));
                }
            }
            match self.endian {
                Endian::Little => LittleEndian::write_int(&mut buf[..width], v, width),
                Endian::Big => BigEndian::write_int(&mut buf[..width], v, width),
            }
        } else {
            let v = value.as_u64()?;
            let bits = 8 * width as u32;
            if bits < 64 && v >> bits != 0 {
                return Err(Error::validity(format!(
                    "{} does not fit in an unsigned {} byte integer",
                    v, width
                )));
            }
            match self.endian {
                Endian::Little => LittleEndian::write_uint(&mut buf[..width], v, width),
                Endian::Big => BigEndian::write_uint(&mut buf[..width], v, width),
            }
        }
        io.write_bytes(&buf[..width])
    }

    fn default_value(&self) -> Value {
        if self.signed {
            Value::Int(0)
        } else {
            Value::UInt(0)
        }
    }

    fn bit_len(&self, _value: &Value, _cx: &Ctx<'_>) -> Result<u64, Error> {
        Ok(u64::from(self.width) * 8)
    }
}

/// Unsigned integers of 1 to 64 bits, packed with adjacent bit fields
#[derive(Debug)]
pub struct BitCodec {
    bits: u8,
    order: BitOrder,
}

impl Codec for BitCodec {
    fn decode(&self, io: &mut dyn Source, _cx: &Ctx<'_>) -> Result<Value, Error> {
        Ok(Value::UInt(io.read_bits(u32::from(self.bits), self.order)?))
    }

    fn encode(&self, value: &Value, io: &mut dyn Sink, _cx: &Ctx<'_>) -> Result<(), Error> {
        let v = value.as_u64()?;
        if self.bits < 64 && v >> self.bits != 0 {
            return Err(Error::validity(format!(
                "{} does not fit in {} bits",
                v, self.bits
            )));
        }
        io.write_bits(v, u32::from(self.bits), self.order)
    }

    fn default_value(&self) -> Value {
        Value::UInt(0)
    }

    fn bit_len(&self, _value: &Value, _cx: &Ctx<'_>) -> Result<u64, Error> {
        Ok(u64::from(self.bits))
    }

    fn is_bit_field(&self) -> bool {
        true
    }
}

/// IEEE 754 single or double precision floats
#[derive(Debug)]
pub struct FloatCodec {
    double: bool,
    endian: Endian,
}

impl Codec for FloatCodec {
    fn decode(&self, io: &mut dyn Source, _cx: &Ctx<'_>) -> Result<Value, Error> {
        if self.double {
            let mut buf = [0u8; 8];
            io.read_into(&mut buf)?;
            let v = match self.endian {
                Endian::Little => LittleEndian::read_f64(&buf),
                Endian::Big => BigEndian::read_f64(&buf),
            };
            Ok(Value::Float(v))
        } else {
            let mut buf = [0u8; 4];
            io.read_into(&mut buf)?;
            let v = match self.endian {
                Endian::Little => LittleEndian::read_f32(&buf),
                Endian::Big => BigEndian::read_f32(&buf),
            };
            Ok(Value::Float(f64::from(v)))
        }
    }

    fn encode(&self, value: &Value, io: &mut dyn Sink, _cx: &Ctx<'_>) -> Result<(), Error> {
        let v = value.as_f64()?;
        if self.double {
            let mut buf = [0u8; 8];
            match self.endian {
                Endian::Little => LittleEndian::write_f64(&mut buf, v),
                Endian::Big => BigEndian::write_f64(&mut buf, v),
            }
            io.write_bytes(&buf)
        } else {
            let mut buf = [0u8; 4];
            match self.endian {
                Endian::Little => LittleEndian::write_f32(&mut buf, v as f32),
                Endian::Big => BigEndian::write_f32(&mut buf, v as f32),
            }
            io.write_bytes(&buf)
        }
    }

    fn default_value(&self) -> Value {
        Value::Float(0.0)
    }

    fn bit_len(&self, _value: &Value, _cx: &Ctx<'_>) -> Result<u64, Error> {
        Ok(if self.double { 64 } else { 32 })
    }
}

fn pad_byte(cx: &Ctx<'_>) -> Result<u8, Error> {
    match cx.param("pad_char")? {
        None => Ok(0),
        Some(Value::UInt(b)) if b < 256 => Ok(b as u8),
        Some(Value::Bytes(b)) if !b.is_empty() => Ok(b[0]),
        Some(other) => Err(Error::message(format!(
            "pad_char must be a single byte, found {}",
            other
        ))),
    }
}

/// Byte strings of a declared or referenced length
///
/// `read_length` governs reads, `length` governs the stored width on
/// writes (padded with `pad_char`, truncated when too long);
/// `trim_padding` strips trailing pad bytes from decoded values.
#[derive(Debug)]
pub struct FixedStringCodec;

impl Codec for FixedStringCodec {
    fn decode(&self, io: &mut dyn Source, cx: &Ctx<'_>) -> Result<Value, Error> {
        let len = match cx.param("read_length")? {
            Some(v) => v.as_u64()? as usize,
            None => match cx.param("length")? {
                Some(v) => v.as_u64()? as usize,
                None => 0,
            },
        };
        let mut data = io.read_bytes(len)?;
        if matches!(cx.param("trim_padding")?, Some(Value::Bool(true))) {
            let pad = pad_byte(cx)?;
            while data.last() == Some(&pad) {
                data.pop();
            }
        }
        Ok(Value::Bytes(data))
    }

    fn encode(&self, value: &Value, io: &mut dyn Sink, cx: &Ctx<'_>) -> Result<(), Error> {
        let bytes = value.as_bytes()?;
        match cx.param("length")? {
            Some(v) => {
                let len = v.as_u64()? as usize;
                let pad = pad_byte(cx)?;
                let mut data = bytes.to_vec();
                data.resize(len, pad);
                io.write_bytes(&data)
            }
            None => io.write_bytes(bytes),
        }
    }

    fn default_value(&self) -> Value {
        Value::Bytes(Vec::new())
    }
}

/// Zero-terminated byte strings
///
/// The decoded value excludes the terminator; the encoded form always
/// ends with exactly one zero byte. `max_length` bounds the total
/// including the terminator.
#[derive(Debug)]
pub struct StringZCodec;

fn max_length(cx: &Ctx<'_>) -> Result<Option<usize>, Error> {
    match cx.param("max_length")? {
        None => Ok(None),
        Some(v) => {
            let m = v.as_u64()? as usize;
            if m < 1 {
                return Err(Error::validity("max_length must be at least 1"));
            }
            Ok(Some(m))
        }
    }
}

impl Codec for StringZCodec {
    fn decode(&self, io: &mut dyn Source, cx: &Ctx<'_>) -> Result<Value, Error> {
        let max = max_length(cx)?;
        let mut data = Vec::new();
        let mut consumed = 0usize;
        loop {
            if let Some(m) = max {
                if consumed == m {
                    break;
                }
            }
            let mut byte = [0u8; 1];
            io.read_into(&mut byte)?;
            consumed += 1;
            if byte[0] == 0 {
                break;
            }
            data.push(byte[0]);
        }
        if let Some(m) = max {
            data.truncate(m - 1);
        }
        Ok(Value::Bytes(data))
    }

    fn encode(&self, value: &Value, io: &mut dyn Sink, cx: &Ctx<'_>) -> Result<(), Error> {
        let bytes = value.as_bytes()?;
        let content_end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let mut content = &bytes[..content_end];
        if let Some(m) = max_length(cx)? {
            if content.len() > m - 1 {
                content = &content[..m - 1];
            }
        }
        io.write_bytes(content)?;
        io.write_bytes(&[0])
    }

    fn default_value(&self) -> Value {
        Value::Bytes(Vec::new())
    }
}
