//! The Binary Container (C7): a versioned, block-structured artifact
//! holding bytecode, the string table, the extension dependency list, and
//! per-extension scratch blocks.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::io::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable};
use crate::string_table::StringTable;

pub const MAGIC: &[u8; 8] = b"PHSIEVE\0";
pub const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BlockKind {
    Code = 1,
    Strings = 2,
    ExtDeps = 3,
    ExtData = 4,
}

impl BlockKind {
    fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(Self::Code),
            2 => Some(Self::Strings),
            3 => Some(Self::ExtDeps),
            4 => Some(Self::ExtData),
            _ => None,
        }
    }
}

/// Header flag bits. Only one bit is defined today; a plain
/// newtype is simpler than pulling in `bitflags` for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderFlags(pub u32);

impl HeaderFlags {
    pub const DEBUG_INFO: HeaderFlags = HeaderFlags(0b0000_0001);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for HeaderFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDependency {
    pub name: String,
    pub version: u16,
}

impl Serializable for ExtensionDependency {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        self.name.write_into(target);
        target.write_u16(self.version);
    }
}

impl Deserializable for ExtensionDependency {
    fn read_from(source: &mut ByteReader<'_>) -> Result<Self, DeserializationError> {
        let name = String::read_from(source)?;
        let version = source.read_u16()?;
        Ok(Self { name, version })
    }
}

/// Recorded only for binaries persisted to disk; used by
/// [`BinaryContainer::is_stale`]'s up-to-date check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub source_path: PathBuf,
    pub source_mtime: SystemTime,
    pub source_size: u64,
}

#[derive(Debug, Clone)]
pub struct BinaryContainer {
    pub format_version: u16,
    pub compiler_version: u16,
    pub flags: HeaderFlags,
    pub code: Vec<u8>,
    pub strings: StringTable,
    pub ext_deps: Vec<ExtensionDependency>,
    pub ext_data: Vec<Vec<u8>>,
    pub source_info: Option<SourceInfo>,
}

#[derive(Debug, thiserror::Error)]
pub enum BinaryError {
    #[error("bad magic number")]
    BadMagic,
    #[error("corrupt binary: {0}")]
    Corrupt(#[from] DeserializationError),
    #[error("not found: {0}")]
    NotFound(std::io::Error),
    #[error("permission denied: {0}")]
    NoPermission(std::io::Error),
    #[error("I/O error: {0}")]
    Io(std::io::Error),
    #[error("binary is not executable: {0}")]
    NotValid(String),
}

impl From<std::io::Error> for BinaryError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => BinaryError::NotFound(e),
            std::io::ErrorKind::PermissionDenied => BinaryError::NoPermission(e),
            _ => BinaryError::Io(e),
        }
    }
}

impl BinaryContainer {
    pub fn new(compiler_version: u16, code: Vec<u8>, strings: StringTable) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            compiler_version,
            flags: HeaderFlags::default(),
            code,
            strings,
            ext_deps: Vec::new(),
            ext_data: Vec::new(),
            source_info: None,
        }
    }

    /// Returns the dependency-table index for `name`, inserting it if this
    /// is the first reference. `ext_index` is the index into this binary's
    /// own dependency table, remapped to a runtime extension id on load.
    pub fn ext_index_for(&mut self, name: &str, version: u16) -> u8 {
        if let Some(i) = self.ext_deps.iter().position(|d| d.name == name) {
            return i as u8;
        }
        self.ext_deps.push(ExtensionDependency { name: name.to_string(), version });
        (self.ext_deps.len() - 1) as u8
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut blocks: Vec<(BlockKind, Vec<u8>)> = Vec::new();
        blocks.push((BlockKind::Code, self.code.clone()));
        let mut strings_buf = Vec::new();
        self.strings.write_into(&mut strings_buf);
        blocks.push((BlockKind::Strings, strings_buf));
        let mut deps_buf = Vec::new();
        deps_buf.write_varint(self.ext_deps.len() as u64);
        for d in &self.ext_deps {
            d.write_into(&mut deps_buf);
        }
        blocks.push((BlockKind::ExtDeps, deps_buf));
        for data in &self.ext_data {
            blocks.push((BlockKind::ExtData, data.clone()));
        }

        let mut out = Vec::new();
        out.write_bytes(MAGIC);
        out.write_u16(self.format_version);
        out.write_u16(self.compiler_version);
        out.write_u32(self.flags.0);
        out.write_u32(blocks.len() as u32);

        let header_len = MAGIC.len() + 2 + 2 + 4 + 4;
        let table_len = blocks.len() * (8 + 8 + 2);
        let mut offset = (header_len + table_len) as u64;
        let mut table = Vec::new();
        for (kind, data) in &blocks {
            table.write_u64(offset);
            table.write_u64(data.len() as u64);
            table.write_u16(*kind as u16);
            offset += data.len() as u64;
        }
        out.write_bytes(&table);
        for (_, data) in &blocks {
            out.write_bytes(data);
        }

        // Trailer: optional {source_path, source_mtime, source_size}, used
        // only by the up-to-date check; not a block, since
        // it isn't part of the extension-visible block table.
        match &self.source_info {
            Some(info) => {
                out.write_u8(1);
                info.source_path.to_string_lossy().into_owned().write_into(&mut out);
                let secs = info
                    .source_mtime
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                out.write_u64(secs);
                out.write_u64(info.source_size);
            }
            None => out.write_u8(0),
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, BinaryError> {
        let mut r = ByteReader::new(bytes);
        let magic = r.read_bytes(8)?;
        if magic != MAGIC {
            return Err(BinaryError::BadMagic);
        }
        let format_version = r.read_u16()?;
        let compiler_version = r.read_u16()?;
        let flags = HeaderFlags(r.read_u32()?);
        let block_count = r.read_u32()? as usize;

        struct Entry {
            offset: u64,
            length: u64,
            kind: u16,
        }
        let mut entries = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            let offset = r.read_u64()?;
            let length = r.read_u64()?;
            let kind = r.read_u16()?;
            entries.push(Entry { offset, length, kind });
        }

        let mut code = Vec::new();
        let mut strings = StringTable::new();
        let mut ext_deps = Vec::new();
        let mut ext_data = Vec::new();

        for entry in &entries {
            let start = entry.offset as usize;
            let end = start
                .checked_add(entry.length as usize)
                .ok_or(DeserializationError::UnexpectedEof("block"))?;
            let slice = bytes
                .get(start..end)
                .ok_or(DeserializationError::UnexpectedEof("block"))?;
            match BlockKind::from_u16(entry.kind) {
                Some(BlockKind::Code) => code = slice.to_vec(),
                Some(BlockKind::Strings) => {
                    let mut br = ByteReader::new(slice);
                    strings = StringTable::read_from(&mut br)?;
                }
                Some(BlockKind::ExtDeps) => {
                    let mut br = ByteReader::new(slice);
                    let count = br.read_varint()?;
                    for _ in 0..count {
                        ext_deps.push(ExtensionDependency::read_from(&mut br)?);
                    }
                }
                Some(BlockKind::ExtData) => ext_data.push(slice.to_vec()),
                None => {
                    return Err(BinaryError::Corrupt(DeserializationError::InvalidValue(
                        "block kind",
                        entry.kind.to_string(),
                    )));
                }
            }
        }

        let tail_start = entries
            .iter()
            .map(|e| e.offset + e.length)
            .max()
            .unwrap_or(bytes.len() as u64) as usize;
        let tail = bytes.get(tail_start..).unwrap_or_default();
        let mut tr = ByteReader::new(tail);
        let source_info = match tr.read_u8() {
            Ok(1) => {
                let path = String::read_from(&mut tr)?;
                let secs = tr.read_u64()?;
                let source_size = tr.read_u64()?;
                Some(SourceInfo {
                    source_path: PathBuf::from(path),
                    source_mtime: SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs),
                    source_size,
                })
            }
            _ => None,
        };

        Ok(Self {
            format_version,
            compiler_version,
            flags,
            code,
            strings,
            ext_deps,
            ext_data,
            source_info,
        })
    }

    /// Atomic save: write to a sibling temp path, then rename over `path`.
    /// Mode defaults to `0600`.
    pub fn save(&self, path: &Path) -> Result<(), BinaryError> {
        let bytes = self.serialize();
        let tmp_path = sibling_tmp_path(path);
        {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(0o600))?;
            }
        }
        fs::rename(&tmp_path, path)?;
        log::debug!("saved binary to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, BinaryError> {
        let bytes = fs::read(path)?;
        Self::deserialize(&bytes)
    }

    /// Up-to-date check: stale if the source changed since
    /// compile, or the format is too old for this engine.
    pub fn is_stale(&self, source_mtime: SystemTime, source_size: u64, required_format: u16) -> bool {
        if self.format_version < required_format {
            return true;
        }
        match &self.source_info {
            Some(info) => info.source_mtime < source_mtime || info.source_size != source_size,
            None => true,
        }
    }

    /// Executability check: every extension this binary
    /// depends on must currently be registered and enabled.
    pub fn check_executable(
        &self,
        registry: &sieve_core::ExtensionRegistry,
    ) -> Result<(), BinaryError> {
        for dep in &self.ext_deps {
            if registry.get_by_name(&dep.name).is_none() {
                return Err(BinaryError::NotValid(format!(
                    "dependency '{}' is not registered or enabled",
                    dep.name
                )));
            }
        }
        Ok(())
    }
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "binary".into());
    name.push(".tmp");
    path.with_file_name(name)
}
