//! The Binary Container (C7): a versioned, block-structured, persistable
//! artifact holding bytecode, the string table, and the extension
//! dependency list.

pub mod container;
pub mod io;
pub mod string_table;

pub use container::{
    BinaryContainer, BinaryError, BlockKind, ExtensionDependency, HeaderFlags, SourceInfo,
    FORMAT_VERSION, MAGIC,
};
pub use io::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable};
pub use string_table::StringTable;
