//! Block 1: the deduplicated string table. The generator interns every
//! string literal here and writes only the table offset into the code
//! stream.

use std::collections::HashMap;

use crate::io::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s`, returning its (stable) offset in the table. Repeated
    /// interning of an equal string returns the same offset.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.index.get(s) {
            return offset;
        }
        let offset = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), offset);
        offset
    }

    pub fn get(&self, offset: u32) -> Option<&str> {
        self.strings.get(offset as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Serializable for StringTable {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        target.write_varint(self.strings.len() as u64);
        for s in &self.strings {
            target.write_len_prefixed(s.as_bytes());
        }
    }
}

impl Deserializable for StringTable {
    fn read_from(source: &mut ByteReader<'_>) -> Result<Self, DeserializationError> {
        let count = source.read_varint()?;
        let mut table = StringTable::new();
        for _ in 0..count {
            let bytes = source.read_len_prefixed()?;
            let s = String::from_utf8(bytes.to_vec())
                .map_err(|e| DeserializationError::InvalidValue("string_table entry", e.to_string()))?;
            table.intern(&s);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_string_twice_returns_the_same_offset() {
        let mut t = StringTable::new();
        let a = t.intern("Subject");
        let b = t.intern("Subject");
        let c = t.intern("Junk");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn round_trips_through_serialization() {
        let mut t = StringTable::new();
        t.intern("Subject");
        t.intern("Junk");
        let mut buf = Vec::new();
        t.write_into(&mut buf);
        let mut r = ByteReader::new(&buf);
        let t2 = StringTable::read_from(&mut r).unwrap();
        assert_eq!(t, t2);
    }
}
