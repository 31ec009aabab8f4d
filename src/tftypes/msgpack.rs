//! MessagePack encoding of values.
//!
//! Unknown values travel as a zero-length extension (`d4 00 00`); the decoder
//! treats any extension token as unknown. Positions typed as the dynamic
//! pseudo-type carry a two-element array of the concrete type's JSON
//! description and the value encoded under that type.

use std::collections::BTreeMap;

use super::{AttributePath, AttributePathStep, Number, Type, Value, ValuePayload};
use crate::error::Error;

mod marker {
    pub const NIL: u8 = 0xc0;
    pub const FALSE: u8 = 0xc2;
    pub const TRUE: u8 = 0xc3;
    pub const BIN8: u8 = 0xc4;
    pub const BIN16: u8 = 0xc5;
    pub const BIN32: u8 = 0xc6;
    pub const EXT8: u8 = 0xc7;
    pub const EXT16: u8 = 0xc8;
    pub const EXT32: u8 = 0xc9;
    pub const FLOAT32: u8 = 0xca;
    pub const FLOAT64: u8 = 0xcb;
    pub const UINT8: u8 = 0xcc;
    pub const UINT16: u8 = 0xcd;
    pub const UINT32: u8 = 0xce;
    pub const UINT64: u8 = 0xcf;
    pub const INT8: u8 = 0xd0;
    pub const INT16: u8 = 0xd1;
    pub const INT32: u8 = 0xd2;
    pub const INT64: u8 = 0xd3;
    pub const FIXEXT1: u8 = 0xd4;
    pub const FIXEXT16: u8 = 0xd8;
    pub const STR8: u8 = 0xd9;
    pub const STR16: u8 = 0xda;
    pub const STR32: u8 = 0xdb;
    pub const ARRAY16: u8 = 0xdc;
    pub const ARRAY32: u8 = 0xdd;
    pub const MAP16: u8 = 0xde;
    pub const MAP32: u8 = 0xdf;
}

fn describe(byte: u8) -> &'static str {
    match byte {
        0x00..=0x7f | 0xe0..=0xff => "int",
        0x80..=0x8f | marker::MAP16 | marker::MAP32 => "map",
        0x90..=0x9f | marker::ARRAY16 | marker::ARRAY32 => "array",
        0xa0..=0xbf | marker::STR8 | marker::STR16 | marker::STR32 => "string",
        marker::NIL => "nil",
        marker::FALSE | marker::TRUE => "bool",
        marker::BIN8..=marker::BIN32 => "binary",
        marker::EXT8..=marker::EXT32 | marker::FIXEXT1..=marker::FIXEXT16 => "extension",
        marker::FLOAT32 | marker::FLOAT64 => "float",
        marker::UINT8..=marker::INT64 => "int",
        _ => "reserved marker",
    }
}

fn is_extension(byte: u8) -> bool {
    matches!(byte, marker::EXT8..=marker::EXT32 | marker::FIXEXT1..=marker::FIXEXT16)
}

fn is_string(byte: u8) -> bool {
    matches!(byte, 0xa0..=0xbf | marker::STR8..=marker::STR32)
}

/// Appends MessagePack tokens to a growable buffer.
#[derive(Debug, Default)]
pub(crate) struct MsgPackWriter {
    buf: Vec<u8>,
}

impl MsgPackWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn write_nil(&mut self) {
        self.buf.push(marker::NIL);
    }

    pub(crate) fn write_unknown(&mut self) {
        self.buf.extend_from_slice(&[marker::FIXEXT1, 0, 0]);
    }

    pub(crate) fn write_bool(&mut self, value: bool) {
        self.buf
            .push(if value { marker::TRUE } else { marker::FALSE });
    }

    pub(crate) fn write_uint(&mut self, value: u64) {
        if value <= 0x7f {
            self.buf.push(value as u8);
        } else if value <= u64::from(u8::MAX) {
            self.buf.extend_from_slice(&[marker::UINT8, value as u8]);
        } else if value <= u64::from(u16::MAX) {
            self.buf.push(marker::UINT16);
            self.buf.extend_from_slice(&(value as u16).to_be_bytes());
        } else if value <= u64::from(u32::MAX) {
            self.buf.push(marker::UINT32);
            self.buf.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buf.push(marker::UINT64);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub(crate) fn write_int(&mut self, value: i64) {
        if value >= 0 {
            self.write_uint(value as u64);
        } else if value >= -32 {
            self.buf.push(value as i8 as u8);
        } else if value >= i64::from(i8::MIN) {
            self.buf.extend_from_slice(&[marker::INT8, value as i8 as u8]);
        } else if value >= i64::from(i16::MIN) {
            self.buf.push(marker::INT16);
            self.buf.extend_from_slice(&(value as i16).to_be_bytes());
        } else if value >= i64::from(i32::MIN) {
            self.buf.push(marker::INT32);
            self.buf.extend_from_slice(&(value as i32).to_be_bytes());
        } else {
            self.buf.push(marker::INT64);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub(crate) fn write_f64(&mut self, value: f64) {
        self.buf.push(marker::FLOAT64);
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn write_str(&mut self, value: &str) {
        let len = value.len();
        if len < 32 {
            self.buf.push(0xa0 | len as u8);
        } else if len <= usize::from(u8::MAX) {
            self.buf.extend_from_slice(&[marker::STR8, len as u8]);
        } else if len <= usize::from(u16::MAX) {
            self.buf.push(marker::STR16);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(marker::STR32);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub(crate) fn write_bin(&mut self, value: &[u8]) {
        let len = value.len();
        if len <= usize::from(u8::MAX) {
            self.buf.extend_from_slice(&[marker::BIN8, len as u8]);
        } else if len <= usize::from(u16::MAX) {
            self.buf.push(marker::BIN16);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(marker::BIN32);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(value);
    }

    pub(crate) fn write_array_len(&mut self, len: usize) {
        if len <= 15 {
            self.buf.push(0x90 | len as u8);
        } else if len <= usize::from(u16::MAX) {
            self.buf.push(marker::ARRAY16);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(marker::ARRAY32);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }

    pub(crate) fn write_map_len(&mut self, len: usize) {
        if len <= 15 {
            self.buf.push(0x80 | len as u8);
        } else if len <= usize::from(u16::MAX) {
            self.buf.push(marker::MAP16);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(marker::MAP32);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
}

/// Reads MessagePack tokens from a byte slice.
pub(crate) struct MsgPackReader<'a> {
    data: &'a [u8],
    x: usize,
}

impl<'a> MsgPackReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, x: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.x
    }

    pub(crate) fn peek(&self, path: &AttributePath) -> Result<u8, Error> {
        self.data
            .get(self.x)
            .copied()
            .ok_or_else(|| eof(path))
    }

    fn take(&mut self, n: usize, path: &AttributePath) -> Result<&'a [u8], Error> {
        if n > self.remaining() {
            return Err(eof(path));
        }
        let bytes = &self.data[self.x..self.x + n];
        self.x += n;
        Ok(bytes)
    }

    fn u8(&mut self, path: &AttributePath) -> Result<u8, Error> {
        Ok(self.take(1, path)?[0])
    }

    fn array<const N: usize>(&mut self, path: &AttributePath) -> Result<[u8; N], Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, path)?);
        Ok(out)
    }

    fn u16(&mut self, path: &AttributePath) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.array(path)?))
    }

    fn u32(&mut self, path: &AttributePath) -> Result<u32, Error> {
        Ok(u32::from_be_bytes(self.array(path)?))
    }

    fn u64(&mut self, path: &AttributePath) -> Result<u64, Error> {
        Ok(u64::from_be_bytes(self.array(path)?))
    }

    /// Length prefix for strings, binaries, and extensions following `byte`.
    fn payload_len(&mut self, byte: u8, path: &AttributePath) -> Result<usize, Error> {
        let len = match byte {
            0xa0..=0xbf => usize::from(byte & 0x1f),
            marker::STR8 | marker::BIN8 | marker::EXT8 => usize::from(self.u8(path)?),
            marker::STR16 | marker::BIN16 | marker::EXT16 => usize::from(self.u16(path)?),
            marker::STR32 | marker::BIN32 | marker::EXT32 => self.u32(path)? as usize,
            _ => return Err(unexpected(byte, "string or binary", path)),
        };
        Ok(len)
    }

    /// Skip one complete token, including any nested elements.
    pub(crate) fn skip(&mut self, path: &AttributePath) -> Result<(), Error> {
        let byte = self.u8(path)?;
        let (extra, children) = match byte {
            0x00..=0x7f | 0xe0..=0xff | marker::NIL | marker::FALSE | marker::TRUE => (0, 0),
            0x80..=0x8f => (0, usize::from(byte & 0x0f) * 2),
            0x90..=0x9f => (0, usize::from(byte & 0x0f)),
            0xa0..=0xbf
            | marker::STR8..=marker::STR32
            | marker::BIN8..=marker::BIN32 => (self.payload_len(byte, path)?, 0),
            marker::EXT8..=marker::EXT32 => (self.payload_len(byte, path)? + 1, 0),
            marker::FIXEXT1..=marker::FIXEXT16 => (1 + (1 << (byte - marker::FIXEXT1)), 0),
            marker::UINT8 | marker::INT8 => (1, 0),
            marker::UINT16 | marker::INT16 => (2, 0),
            marker::FLOAT32 | marker::UINT32 | marker::INT32 => (4, 0),
            marker::FLOAT64 | marker::UINT64 | marker::INT64 => (8, 0),
            marker::ARRAY16 => (0, usize::from(self.u16(path)?)),
            marker::ARRAY32 => (0, self.u32(path)? as usize),
            marker::MAP16 => (0, usize::from(self.u16(path)?) * 2),
            marker::MAP32 => (0, self.u32(path)? as usize * 2),
            _ => return Err(unexpected(byte, "a value", path)),
        };
        self.take(extra, path)?;
        for _ in 0..children {
            self.skip(path)?;
        }
        Ok(())
    }

    fn read_bool(&mut self, path: &AttributePath) -> Result<bool, Error> {
        match self.u8(path)? {
            marker::TRUE => Ok(true),
            marker::FALSE => Ok(false),
            other => Err(unexpected(other, "bool", path)),
        }
    }

    /// Raw bytes of a string or binary token.
    fn read_bytes(&mut self, path: &AttributePath) -> Result<&'a [u8], Error> {
        let byte = self.u8(path)?;
        if !is_string(byte) && !matches!(byte, marker::BIN8..=marker::BIN32) {
            return Err(unexpected(byte, "string", path));
        }
        let len = self.payload_len(byte, path)?;
        self.take(len, path)
    }

    fn read_str(&mut self, path: &AttributePath) -> Result<&'a str, Error> {
        let bytes = self.read_bytes(path)?;
        std::str::from_utf8(bytes)
            .map_err(|e| Error::decode_value(path, format!("invalid UTF-8 in string: {}", e)))
    }

    fn read_number(&mut self, path: &AttributePath) -> Result<Number, Error> {
        let byte = self.peek(path)?;
        if is_string(byte) {
            return self.read_str(path)?.parse().map_err(|err: Error| err.prefixed(path));
        }
        self.x += 1;
        let number = match byte {
            0x00..=0x7f => Number::from(byte),
            0xe0..=0xff => Number::from(byte as i8),
            marker::UINT8 => Number::from(self.u8(path)?),
            marker::UINT16 => Number::from(self.u16(path)?),
            marker::UINT32 => Number::from(self.u32(path)?),
            marker::UINT64 => Number::from(self.u64(path)?),
            marker::INT8 => Number::from(self.u8(path)? as i8),
            marker::INT16 => Number::from(self.u16(path)? as i16),
            marker::INT32 => Number::from(self.u32(path)? as i32),
            marker::INT64 => Number::from(self.u64(path)? as i64),
            marker::FLOAT32 => float(f64::from(f32::from_bits(self.u32(path)?)), path)?,
            marker::FLOAT64 => float(f64::from_bits(self.u64(path)?), path)?,
            other => return Err(unexpected(other, "number", path)),
        };
        Ok(number)
    }

    /// Array length, or `None` when the token is nil.
    fn read_array_len(&mut self, path: &AttributePath) -> Result<Option<usize>, Error> {
        let byte = self.u8(path)?;
        let len = match byte {
            marker::NIL => return Ok(None),
            0x90..=0x9f => usize::from(byte & 0x0f),
            marker::ARRAY16 => usize::from(self.u16(path)?),
            marker::ARRAY32 => self.u32(path)? as usize,
            other => return Err(unexpected(other, "array", path)),
        };
        Ok(Some(len))
    }

    /// Map length, or `None` when the token is nil.
    fn read_map_len(&mut self, path: &AttributePath) -> Result<Option<usize>, Error> {
        let byte = self.u8(path)?;
        let len = match byte {
            marker::NIL => return Ok(None),
            0x80..=0x8f => usize::from(byte & 0x0f),
            marker::MAP16 => usize::from(self.u16(path)?),
            marker::MAP32 => self.u32(path)? as usize,
            other => return Err(unexpected(other, "map", path)),
        };
        Ok(Some(len))
    }
}

fn float(value: f64, path: &AttributePath) -> Result<Number, Error> {
    Number::from_f64(value).ok_or_else(|| Error::decode_value(path, "NaN is not a valid number"))
}

fn eof(path: &AttributePath) -> Error {
    Error::decode_value(path, "unexpected end of msgpack data")
}

fn unexpected(byte: u8, expected: &str, path: &AttributePath) -> Error {
    Error::decode_shape(
        path,
        format!("expected {}, got msgpack {} (0x{:02x})", expected, describe(byte), byte),
    )
}

/// Encode `value` as MessagePack, using `ty` as the declared type.
pub fn marshal_msgpack(value: &Value, ty: &Type) -> Result<Vec<u8>, Error> {
    let mut writer = MsgPackWriter::new();
    let mut path = AttributePath::new();
    encode(&mut writer, value, ty, &mut path)?;
    Ok(writer.into_bytes())
}

fn encode(
    w: &mut MsgPackWriter,
    value: &Value,
    ty: &Type,
    path: &mut AttributePath,
) -> Result<(), Error> {
    if ty.is_dynamic() && !value.ty().is_dynamic() {
        w.write_array_len(2);
        w.write_bin(&value.ty().to_json_bytes());
        return encode(w, value, value.ty(), path);
    }
    if !value.is_known() {
        w.write_unknown();
        return Ok(());
    }
    if value.is_null() {
        w.write_nil();
        return Ok(());
    }
    if !value.ty().usable_as(ty) {
        return Err(Error::encode(
            path,
            format!("can't encode {} as {}", value.ty(), ty),
        ));
    }

    match (ty, value.payload()) {
        (Type::String, ValuePayload::String(s)) => w.write_str(s),
        (Type::Number, ValuePayload::Number(n)) => write_number(w, n),
        (Type::Bool, ValuePayload::Bool(b)) => w.write_bool(*b),
        (Type::List(element), ValuePayload::Elements(elements)) => {
            check_len(elements.len(), path)?;
            w.write_array_len(elements.len());
            for (i, child) in elements.iter().enumerate() {
                path.push(AttributePathStep::ElementKeyInt(i as i64));
                encode(w, child, element, path)?;
                path.pop();
            }
        }
        (Type::Set(element), ValuePayload::Elements(elements)) => {
            check_len(elements.len(), path)?;
            w.write_array_len(elements.len());
            for child in elements {
                path.push(AttributePathStep::ElementKeyValue(child.clone()));
                encode(w, child, element, path)?;
                path.pop();
            }
        }
        (Type::Tuple(types), ValuePayload::Elements(elements)) => {
            if types.len() != elements.len() {
                return Err(Error::encode(
                    path,
                    format!(
                        "wrong number of tuple elements: expected {}, got {}",
                        types.len(),
                        elements.len()
                    ),
                ));
            }
            w.write_array_len(elements.len());
            for (i, (child, child_ty)) in elements.iter().zip(types).enumerate() {
                path.push(AttributePathStep::ElementKeyInt(i as i64));
                encode(w, child, child_ty, path)?;
                path.pop();
            }
        }
        (Type::Map(element), ValuePayload::Attributes(entries)) => {
            check_len(entries.len(), path)?;
            w.write_map_len(entries.len());
            for (key, child) in entries {
                path.push(AttributePathStep::ElementKeyString(key.clone()));
                w.write_str(key);
                encode(w, child, element, path)?;
                path.pop();
            }
        }
        (
            Type::Object {
                attribute_types, ..
            },
            ValuePayload::Attributes(attributes),
        ) => {
            w.write_map_len(attribute_types.len());
            for (name, attribute_ty) in attribute_types {
                path.push(AttributePathStep::AttributeName(name.clone()));
                let child = attributes
                    .get(name)
                    .ok_or_else(|| Error::encode(path, "attribute is missing from the value"))?;
                w.write_str(name);
                encode(w, child, attribute_ty, path)?;
                path.pop();
            }
        }
        (ty, _) => {
            return Err(Error::encode(
                path,
                format!("unsupported type {} for msgpack encoding", ty),
            ))
        }
    }
    Ok(())
}

fn write_number(w: &mut MsgPackWriter, number: &Number) {
    if let Some(i) = number.as_i64() {
        w.write_int(i);
    } else if let Some(u) = number.as_u64() {
        w.write_uint(u);
    } else if let Some(f) = number.as_f64() {
        w.write_f64(f);
    } else {
        w.write_str(&number.to_string());
    }
}

fn check_len(len: usize, path: &AttributePath) -> Result<(), Error> {
    if u32::try_from(len).is_err() {
        return Err(Error::encode(
            path,
            format!("{} elements exceed the msgpack length limit", len),
        ));
    }
    Ok(())
}

/// Decode MessagePack `data` as a value of type `ty`.
pub fn unmarshal_msgpack(data: &[u8], ty: &Type) -> Result<Value, Error> {
    let mut reader = MsgPackReader::new(data);
    let mut path = AttributePath::new();
    let value = decode(&mut reader, ty, &mut path)?;
    if reader.remaining() > 0 {
        return Err(Error::decode_value(
            &path,
            format!("{} trailing bytes after msgpack value", reader.remaining()),
        ));
    }
    Ok(value)
}

fn decode(r: &mut MsgPackReader<'_>, ty: &Type, path: &mut AttributePath) -> Result<Value, Error> {
    let byte = r.peek(path)?;
    if is_extension(byte) {
        r.skip(path)?;
        return Ok(Value::unknown(ty.clone()));
    }

    match ty {
        Type::DynamicPseudoType => decode_dynamic(r, path),
        _ if byte == marker::NIL => {
            r.skip(path)?;
            Ok(Value::null(ty.clone()))
        }
        Type::String => Ok(Value::new(Type::String, r.read_str(path)?)),
        Type::Number => Ok(Value::new(Type::Number, r.read_number(path)?)),
        Type::Bool => Ok(Value::new(Type::Bool, r.read_bool(path)?)),
        Type::List(element) | Type::Set(element) => {
            let Some(len) = r.read_array_len(path)? else {
                return Ok(Value::null(ty.clone()));
            };
            let mut elements = Vec::with_capacity(len.min(r.remaining()));
            for i in 0..len {
                path.push(AttributePathStep::ElementKeyInt(i as i64));
                let child = decode(r, element, path)?;
                path.pop();
                elements.push(child);
            }
            Value::try_new(ty.clone(), elements).map_err(|err| err.into_decode_shape(path))
        }
        Type::Tuple(types) => {
            let Some(len) = r.read_array_len(path)? else {
                return Ok(Value::null(ty.clone()));
            };
            if len != types.len() {
                return Err(Error::decode_shape(
                    path,
                    format!("expected {} tuple elements, got {}", types.len(), len),
                ));
            }
            let mut elements = Vec::with_capacity(len);
            for (i, element_ty) in types.iter().enumerate() {
                path.push(AttributePathStep::ElementKeyInt(i as i64));
                let child = decode(r, element_ty, path)?;
                path.pop();
                elements.push(child);
            }
            Value::try_new(ty.clone(), elements).map_err(|err| err.into_decode_shape(path))
        }
        Type::Map(element) => {
            let Some(len) = r.read_map_len(path)? else {
                return Ok(Value::null(ty.clone()));
            };
            let mut entries = BTreeMap::new();
            for _ in 0..len {
                let key = r.read_str(path)?.to_string();
                path.push(AttributePathStep::ElementKeyString(key.clone()));
                let child = decode(r, element, path)?;
                path.pop();
                entries.insert(key, child);
            }
            Value::try_new(ty.clone(), entries).map_err(|err| err.into_decode_shape(path))
        }
        Type::Object {
            attribute_types, ..
        } => {
            let Some(len) = r.read_map_len(path)? else {
                return Ok(Value::null(ty.clone()));
            };
            let mut attributes = BTreeMap::new();
            for _ in 0..len {
                let name = r.read_str(path)?.to_string();
                path.push(AttributePathStep::AttributeName(name.clone()));
                let attribute_ty = attribute_types
                    .get(&name)
                    .ok_or_else(|| Error::decode_shape(path, "unsupported attribute"))?;
                let child = decode(r, attribute_ty, path)?;
                path.pop();
                attributes.insert(name, child);
            }
            for (name, attribute_ty) in attribute_types {
                attributes
                    .entry(name.clone())
                    .or_insert_with(|| Value::null(attribute_ty.clone()));
            }
            Value::try_new(ty.clone(), attributes).map_err(|err| err.into_decode_shape(path))
        }
    }
}

fn decode_dynamic(r: &mut MsgPackReader<'_>, path: &mut AttributePath) -> Result<Value, Error> {
    match r.read_array_len(path)? {
        None => Ok(Value::null(Type::DynamicPseudoType)),
        Some(2) => {
            let type_json = r.read_bytes(path)?;
            let ty = Type::from_json_bytes(type_json).map_err(|err| err.prefixed(path))?;
            decode(r, &ty, path)
        }
        Some(len) => Err(Error::decode_shape(
            path,
            format!(
                "expected a 2-element [type, value] array for a dynamic value, got {} elements",
                len
            ),
        )),
    }
}

impl Value {
    /// Encode this value as MessagePack under the declared type `ty`.
    pub fn to_msgpack(&self, ty: &Type) -> Result<Vec<u8>, Error> {
        marshal_msgpack(self, ty)
    }

    /// Decode a MessagePack buffer as a value of type `ty`.
    pub fn from_msgpack(data: &[u8], ty: &Type) -> Result<Value, Error> {
        unmarshal_msgpack(data, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &Value, ty: &Type) -> Value {
        let bytes = value.to_msgpack(ty).unwrap();
        Value::from_msgpack(&bytes, ty).unwrap()
    }

    #[test]
    fn test_msgpack_string() {
        let value = Value::from("hello");
        let bytes = value.to_msgpack(&Type::String).unwrap();
        assert_eq!(bytes, vec![0xa5, 0x68, 0x65, 0x6c, 0x6c, 0x6f]);
        assert_eq!(Value::from_msgpack(&bytes, &Type::String).unwrap(), value);
    }

    #[test]
    fn test_msgpack_number_encodings() {
        let cases: Vec<(&str, Vec<u8>)> = vec![
            ("0", vec![0x00]),
            ("127", vec![0x7f]),
            ("200", vec![0xcc, 0xc8]),
            ("-1", vec![0xff]),
            ("-33", vec![0xd0, 0xdf]),
            ("70000", vec![0xce, 0x00, 0x01, 0x11, 0x70]),
            (
                "18446744073709551615",
                vec![0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
            ),
            ("1.5", vec![0xcb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0]),
        ];
        for (text, expected) in cases {
            let value = Value::from(text.parse::<Number>().unwrap());
            let bytes = value.to_msgpack(&Type::Number).unwrap();
            assert_eq!(bytes, expected, "encoding {}", text);
            assert_eq!(Value::from_msgpack(&bytes, &Type::Number).unwrap(), value);
        }
    }

    #[test]
    fn test_msgpack_big_number_as_string() {
        let digits = "9".repeat(100);
        let value = Value::from(digits.parse::<Number>().unwrap());
        let bytes = value.to_msgpack(&Type::Number).unwrap();
        assert_eq!(&bytes[..2], &[0xd9, 100]);
        assert_eq!(&bytes[2..], digits.as_bytes());
        assert_eq!(Value::from_msgpack(&bytes, &Type::Number).unwrap(), value);
    }

    #[test]
    fn test_msgpack_exact_doubles() {
        let two_pow_64 = [0xcb, 0x43, 0xf0, 0, 0, 0, 0, 0, 0];
        let decoded = Value::from_msgpack(&two_pow_64, &Type::Number).unwrap();
        let parsed = Value::from("18446744073709551616".parse::<Number>().unwrap());
        assert_eq!(decoded, parsed);
        assert_eq!(parsed.to_msgpack(&Type::Number).unwrap(), two_pow_64.to_vec());

        let tenth = [0xcb, 0x3f, 0xb9, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9a];
        let expansion = "0.1000000000000000055511151231257827021181583404541015625";
        let parsed = Value::from(expansion.parse::<Number>().unwrap());
        assert_eq!(parsed.to_msgpack(&Type::Number).unwrap(), tenth.to_vec());
        assert_eq!(Value::from_msgpack(&tenth, &Type::Number).unwrap(), parsed);

        // Short text for 0.1 is not the double and travels as a string.
        let short = Value::from("0.1".parse::<Number>().unwrap());
        assert_eq!(short.to_msgpack(&Type::Number).unwrap(), vec![0xa3, b'0', b'.', b'1']);
        assert_ne!(short, parsed);
    }

    #[test]
    fn test_msgpack_extreme_exponents() {
        let mut overflowing = vec![0xb6];
        overflowing.extend_from_slice(b"12e9223372036854775807");
        let err = Value::from_msgpack(&overflowing, &Type::Number).unwrap_err();
        assert!(matches!(err, Error::DecodeValue { .. }));

        let ty = Type::list(Type::Number);
        let mut nested = vec![0x91, 0xb6];
        nested.extend_from_slice(b"12e9223372036854775807");
        let err = Value::from_msgpack(&nested, &ty).unwrap_err();
        assert_eq!(err.path(), Some(&AttributePath::new().with_element_key_int(0)));

        let text = "1e-9223372036854775808";
        let mut tiny = vec![0xb6];
        tiny.extend_from_slice(text.as_bytes());
        let decoded = Value::from_msgpack(&tiny, &Type::Number).unwrap();
        assert_eq!(decoded, Value::from(text.parse::<Number>().unwrap()));
        assert_eq!(decoded.to_msgpack(&Type::Number).unwrap(), tiny);
    }

    #[test]
    fn test_msgpack_infinity_is_a_double() {
        let value = Value::from("-Inf".parse::<Number>().unwrap());
        let bytes = value.to_msgpack(&Type::Number).unwrap();
        assert_eq!(bytes[0], 0xcb);
        assert_eq!(round_trip(&value, &Type::Number), value);
    }

    #[test]
    fn test_msgpack_unknown_and_null() {
        let ty = Type::list(Type::String);
        let unknown = Value::unknown(ty.clone());
        assert_eq!(unknown.to_msgpack(&ty).unwrap(), vec![0xd4, 0x00, 0x00]);
        assert_eq!(round_trip(&unknown, &ty), unknown);

        let null = Value::null(ty.clone());
        assert_eq!(null.to_msgpack(&ty).unwrap(), vec![0xc0]);
        assert_eq!(round_trip(&null, &ty), null);

        let empty = Value::list(Type::String, vec![]);
        assert_eq!(empty.to_msgpack(&ty).unwrap(), vec![0x90]);
        let decoded = round_trip(&empty, &ty);
        assert!(!decoded.is_null());
        assert_eq!(decoded, empty);
    }

    #[test]
    fn test_msgpack_null_and_empty_composites() {
        let cases: Vec<(Type, Value, Vec<u8>)> = vec![
            (Type::set(Type::String), Value::set(Type::String, vec![]), vec![0x90]),
            (Type::map(Type::String), Value::map(Type::String, Vec::new()), vec![0x80]),
            (Type::tuple(vec![]), Value::tuple(vec![]), vec![0x90]),
            (Type::object(Vec::new()), Value::object(Vec::new()), vec![0x80]),
        ];
        for (ty, empty, bytes) in cases {
            let null = Value::null(ty.clone());
            assert_eq!(null.to_msgpack(&ty).unwrap(), vec![0xc0], "null {}", ty);
            let decoded_null = Value::from_msgpack(&[0xc0], &ty).unwrap();
            assert!(decoded_null.is_null(), "null {}", ty);
            assert_eq!(decoded_null.ty(), &ty);

            assert_eq!(empty.to_msgpack(&ty).unwrap(), bytes, "empty {}", ty);
            let decoded = Value::from_msgpack(&bytes, &ty).unwrap();
            assert!(!decoded.is_null(), "empty {}", ty);
            assert_eq!(decoded, empty);
            assert_ne!(decoded, decoded_null);
        }

        // An object with every attribute null is still a present object.
        let ty = Type::object([("a".to_string(), Type::String)]);
        let decoded = Value::from_msgpack(&[0x80], &ty).unwrap();
        assert!(!decoded.is_null());
        assert_eq!(decoded.get("a"), Some(&Value::null(Type::String)));
        assert_ne!(decoded, Value::null(ty));
    }

    #[test]
    fn test_msgpack_error_paths_resolve_against_type() {
        let ty = Type::object([
            ("ports".to_string(), Type::set(Type::Number)),
            ("tags".to_string(), Type::map(Type::Bool)),
            ("pair".to_string(), Type::tuple(vec![Type::String, Type::Number])),
        ]);
        let cases: Vec<(Vec<u8>, AttributePath, Type)> = vec![
            (
                // {"ports": [1, "x"]}
                vec![0x81, 0xa5, b'p', b'o', b'r', b't', b's', 0x92, 0x01, 0xa1, b'x'],
                AttributePath::new()
                    .with_attribute_name("ports")
                    .with_element_key_int(1),
                Type::Number,
            ),
            (
                // {"tags": {"k": 5}}
                vec![0x81, 0xa4, b't', b'a', b'g', b's', 0x81, 0xa1, b'k', 0x05],
                AttributePath::new()
                    .with_attribute_name("tags")
                    .with_element_key_string("k"),
                Type::Bool,
            ),
            (
                // {"pair": ["a", true]}
                vec![0x81, 0xa4, b'p', b'a', b'i', b'r', 0x92, 0xa1, b'a', 0xc3],
                AttributePath::new()
                    .with_attribute_name("pair")
                    .with_element_key_int(1),
                Type::Number,
            ),
        ];
        for (bytes, expected, leaf) in cases {
            let err = Value::from_msgpack(&bytes, &ty).unwrap_err();
            let path = err.path().unwrap();
            assert_eq!(path, &expected);
            assert_eq!(ty.walk_attribute_path(path).unwrap(), &leaf);
        }
    }

    #[test]
    fn test_msgpack_any_extension_is_unknown() {
        // fixext4 with a type byte and payload
        let bytes = [0xd6, 0x05, 1, 2, 3, 4];
        let value = Value::from_msgpack(&bytes, &Type::Number).unwrap();
        assert_eq!(value, Value::unknown(Type::Number));
    }

    #[test]
    fn test_msgpack_object_keys_sorted_and_missing_filled() {
        let ty = Type::object([
            ("b".to_string(), Type::Bool),
            ("a".to_string(), Type::String),
        ]);
        let value = Value::new(
            ty.clone(),
            BTreeMap::from([
                ("b".to_string(), Value::from(true)),
                ("a".to_string(), Value::from("x")),
            ]),
        );
        let bytes = value.to_msgpack(&ty).unwrap();
        assert_eq!(bytes, vec![0x82, 0xa1, b'a', 0xa1, b'x', 0xa1, b'b', 0xc3]);

        // only "a" on the wire
        let partial = [0x81, 0xa1, b'a', 0xa1, b'x'];
        let decoded = Value::from_msgpack(&partial, &ty).unwrap();
        assert_eq!(decoded.get("b"), Some(&Value::null(Type::Bool)));
    }

    #[test]
    fn test_msgpack_object_unknown_attribute() {
        let ty = Type::object([("a".to_string(), Type::String)]);
        let bytes = [0x81, 0xa1, b'z', 0xc0];
        let err = Value::from_msgpack(&bytes, &ty).unwrap_err();
        assert!(matches!(err, Error::DecodeShape { .. }));
        assert_eq!(
            err.path(),
            Some(&AttributePath::new().with_attribute_name("z"))
        );
    }

    #[test]
    fn test_msgpack_nil_array_length_is_null() {
        let ty = Type::set(Type::Number);
        let value = Value::from_msgpack(&[0xc0], &ty).unwrap();
        assert!(value.is_null());
        assert_eq!(value.ty(), &ty);
    }

    #[test]
    fn test_msgpack_tuple_arity_mismatch() {
        let ty = Type::tuple(vec![Type::String, Type::Bool]);
        let bytes = [0x91, 0xa1, b'a'];
        let err = Value::from_msgpack(&bytes, &ty).unwrap_err();
        assert!(matches!(err, Error::DecodeShape { .. }));

        let short = Value::tuple(vec![Value::from("a")]);
        assert!(matches!(
            short.to_msgpack(&ty),
            Err(Error::Encode { .. })
        ));
    }

    #[test]
    fn test_msgpack_dynamic_wrapping() {
        let value = Value::from(true);
        let bytes = value.to_msgpack(&Type::DynamicPseudoType).unwrap();
        let mut expected = vec![0x92, 0xc4, 6];
        expected.extend_from_slice(b"\"bool\"");
        expected.push(0xc3);
        assert_eq!(bytes, expected);

        let decoded = Value::from_msgpack(&bytes, &Type::DynamicPseudoType).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(decoded.ty(), &Type::Bool);
    }

    #[test]
    fn test_msgpack_dynamic_type_json_as_string() {
        let mut bytes = vec![0x92, 0xa8];
        bytes.extend_from_slice(b"\"string\"");
        bytes.extend_from_slice(&[0xa2, b'h', b'i']);
        let decoded = Value::from_msgpack(&bytes, &Type::DynamicPseudoType).unwrap();
        assert_eq!(decoded, Value::from("hi"));
    }

    #[test]
    fn test_msgpack_dynamic_unknown_keeps_concrete_type() {
        let value = Value::unknown(Type::String);
        let bytes = value.to_msgpack(&Type::DynamicPseudoType).unwrap();
        let decoded = Value::from_msgpack(&bytes, &Type::DynamicPseudoType).unwrap();
        assert_eq!(decoded, Value::unknown(Type::String));

        let untyped = Value::unknown(Type::DynamicPseudoType);
        let bytes = untyped.to_msgpack(&Type::DynamicPseudoType).unwrap();
        assert_eq!(bytes, vec![0xd4, 0, 0]);
        assert_eq!(
            Value::from_msgpack(&bytes, &Type::DynamicPseudoType).unwrap(),
            untyped
        );
    }

    #[test]
    fn test_msgpack_list_of_dynamic() {
        let ty = Type::list(Type::DynamicPseudoType);
        let value = Value::new(ty.clone(), vec![Value::from(true), Value::from(false)]);
        let decoded = round_trip(&value, &ty);
        assert_eq!(decoded, value);
        assert_eq!(decoded.elements().unwrap()[0].ty(), &Type::Bool);
    }

    #[test]
    fn test_msgpack_nested_round_trip() {
        let ty = Type::object([
            ("tags".to_string(), Type::map(Type::String)),
            ("ports".to_string(), Type::set(Type::Number)),
            ("pair".to_string(), Type::tuple(vec![Type::String, Type::Number])),
            ("pending".to_string(), Type::String),
        ]);
        let value = Value::new(
            ty.clone(),
            BTreeMap::from([
                (
                    "tags".to_string(),
                    Value::map(Type::String, [("env".to_string(), Value::from("prod"))]),
                ),
                (
                    "ports".to_string(),
                    Value::set(Type::Number, vec![Value::from(80_i64), Value::from(443_i64)]),
                ),
                (
                    "pair".to_string(),
                    Value::tuple(vec![Value::from("x"), Value::from(1_i64)]),
                ),
                ("pending".to_string(), Value::unknown(Type::String)),
            ]),
        );
        assert_eq!(round_trip(&value, &ty), value);
    }

    #[test]
    fn test_msgpack_decode_errors_carry_paths() {
        let ty = Type::object([("n".to_string(), Type::list(Type::Number))]);
        // {"n": [1, true]}
        let bytes = [0x81, 0xa1, b'n', 0x92, 0x01, 0xc3];
        let err = Value::from_msgpack(&bytes, &ty).unwrap_err();
        assert_eq!(
            err.path(),
            Some(
                &AttributePath::new()
                    .with_attribute_name("n")
                    .with_element_key_int(1)
            )
        );

        let truncated = [0x92, 0x01];
        assert!(matches!(
            Value::from_msgpack(&truncated, &Type::list(Type::Number)),
            Err(Error::DecodeValue { .. })
        ));

        assert!(Value::from_msgpack(&[0xc3, 0xc3], &Type::Bool).is_err());
    }
}
