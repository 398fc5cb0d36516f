mod reader;
mod writer;

pub use reader::{Reader, ReaderError};
pub use writer::Writer;

use indexmap::IndexSet;
use primitive_types::U256;
use std::{
    borrow::Cow,
    collections::{BTreeMap, HashSet},
    hash::Hash as StdHash,
};

/// Binary codec used for every consensus-critical wire form and persisted
/// record. Implementations must be stable: the encoding is part of the
/// chain's external contract.
pub trait Serializer {
    fn write(&self, writer: &mut Writer);

    fn read(reader: &mut Reader) -> Result<Self, ReaderError>
    where
        Self: Sized;

    /// Exact encoded size in bytes
    fn size(&self) -> usize;

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(self.size());
        self.write(&mut writer);
        writer.finish()
    }

    fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ReaderError>
    where
        Self: Sized,
    {
        let mut reader = Reader::new(bytes);
        let value = Self::read(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(ReaderError::TrailingBytes);
        }
        Ok(value)
    }

    fn from_hex(hex: &str) -> Result<Self, ReaderError>
    where
        Self: Sized,
    {
        let bytes = hex::decode(hex.trim_start_matches("0x"))
            .map_err(|_| ReaderError::InvalidHex)?;
        Self::from_bytes(&bytes)
    }
}

impl Serializer for u8 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u8()
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for u16 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u16(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u16()
    }

    fn size(&self) -> usize {
        2
    }
}

impl Serializer for u32 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u32()
    }

    fn size(&self) -> usize {
        4
    }
}

impl Serializer for u64 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u64()
    }

    fn size(&self) -> usize {
        8
    }
}

impl Serializer for i64 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&(*self as u64));
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(reader.read_u64()? as i64)
    }

    fn size(&self) -> usize {
        8
    }
}

impl Serializer for bool {
    fn write(&self, writer: &mut Writer) {
        writer.write_bool(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_bool()
    }

    fn size(&self) -> usize {
        1
    }
}

// 256-bit amounts are written big-endian, fixed 32 bytes
impl Serializer for U256 {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.to_big_endian());
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let bytes = reader.read_bytes_32()?;
        Ok(U256::from_big_endian(&bytes))
    }

    fn size(&self) -> usize {
        32
    }
}

impl Serializer for String {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&(self.len() as u32));
        writer.write_bytes(self.as_bytes());
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let len = reader.read_u32()? as usize;
        let bytes = reader.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| ReaderError::InvalidValue)
    }

    fn size(&self) -> usize {
        4 + self.len()
    }
}

impl<T: Serializer> Serializer for Option<T> {
    fn write(&self, writer: &mut Writer) {
        match self {
            Some(value) => {
                writer.write_bool(true);
                value.write(writer);
            }
            None => writer.write_bool(false),
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        if reader.read_bool()? {
            Ok(Some(T::read(reader)?))
        } else {
            Ok(None)
        }
    }

    fn size(&self) -> usize {
        1 + self.as_ref().map(Serializer::size).unwrap_or(0)
    }
}

impl<T: Serializer> Serializer for Vec<T> {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&(self.len() as u32));
        for item in self {
            item.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let len = reader.read_u32()? as usize;
        // each element costs at least one byte
        if len > reader.remaining() {
            return Err(ReaderError::InvalidSize);
        }
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::read(reader)?);
        }
        Ok(items)
    }

    fn size(&self) -> usize {
        4 + self.iter().map(Serializer::size).sum::<usize>()
    }
}

impl<K: Serializer + Ord, V: Serializer> Serializer for BTreeMap<K, V> {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&(self.len() as u32));
        for (key, value) in self {
            key.write(writer);
            value.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let len = reader.read_u32()? as usize;
        if len > reader.remaining() {
            return Err(ReaderError::InvalidSize);
        }
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let key = K::read(reader)?;
            let value = V::read(reader)?;
            if map.insert(key, value).is_some() {
                return Err(ReaderError::InvalidValue);
            }
        }
        Ok(map)
    }

    fn size(&self) -> usize {
        4 + self
            .iter()
            .map(|(k, v)| k.size() + v.size())
            .sum::<usize>()
    }
}

impl<T: Serializer + StdHash + Eq> Serializer for HashSet<T> {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&(self.len() as u32));
        for item in self {
            item.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let len = reader.read_u32()? as usize;
        if len > reader.remaining() {
            return Err(ReaderError::InvalidSize);
        }
        let mut set = HashSet::with_capacity(len);
        for _ in 0..len {
            if !set.insert(T::read(reader)?) {
                return Err(ReaderError::InvalidValue);
            }
        }
        Ok(set)
    }

    fn size(&self) -> usize {
        4 + self.iter().map(Serializer::size).sum::<usize>()
    }
}

impl<T: Serializer + StdHash + Eq> Serializer for IndexSet<T> {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&(self.len() as u32));
        for item in self {
            item.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let len = reader.read_u32()? as usize;
        if len > reader.remaining() {
            return Err(ReaderError::InvalidSize);
        }
        let mut set = IndexSet::with_capacity(len);
        for _ in 0..len {
            if !set.insert(T::read(reader)?) {
                return Err(ReaderError::InvalidValue);
            }
        }
        Ok(set)
    }

    fn size(&self) -> usize {
        4 + self.iter().map(Serializer::size).sum::<usize>()
    }
}

impl<'a, T: Serializer + Clone> Serializer for Cow<'a, T> {
    fn write(&self, writer: &mut Writer) {
        self.as_ref().write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Cow::Owned(T::read(reader)?))
    }

    fn size(&self) -> usize {
        self.as_ref().size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_roundtrip() -> Result<(), ReaderError> {
        let value = 0xdead_beef_u32;
        assert_eq!(u32::from_bytes(&value.to_bytes())?, value);

        let value = u64::MAX;
        assert_eq!(u64::from_bytes(&value.to_bytes())?, value);

        let value = U256::from(1_000_000_000_000u64);
        assert_eq!(U256::from_bytes(&value.to_bytes())?, value);
        Ok(())
    }

    #[test]
    fn option_and_vec_roundtrip() -> Result<(), ReaderError> {
        let value: Option<u64> = Some(42);
        assert_eq!(Option::<u64>::from_bytes(&value.to_bytes())?, value);

        let value: Option<u64> = None;
        assert_eq!(Option::<u64>::from_bytes(&value.to_bytes())?, value);

        let value = vec![1u64, 2, 3];
        assert_eq!(Vec::<u64>::from_bytes(&value.to_bytes())?, value);
        Ok(())
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = 7u64.to_bytes();
        bytes.push(0);
        assert!(matches!(
            u64::from_bytes(&bytes),
            Err(ReaderError::TrailingBytes)
        ));
    }

    #[test]
    fn string_roundtrip() -> Result<(), ReaderError> {
        let value = "hello-chain".to_string();
        assert_eq!(String::from_bytes(&value.to_bytes())?, value);
        assert_eq!(value.size(), value.to_bytes().len());
        Ok(())
    }
}
