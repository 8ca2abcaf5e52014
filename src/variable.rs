// SPDX-License-Identifier: GPL-3.0-only

//! Authenticated variable records: the append-only log filling the store.
//!
//! The on-disk state byte is stored inverted. Flash erases to all-ones, so a
//! freshly written record must only ever clear bits as its lifecycle
//! advances; the logical flags below live in the de-inverted domain and the
//! codec XORs with 0xFF at the boundary.

use core::mem;

use bitflags::bitflags;
use plain::Plain;

use crate::guid::Guid;
use crate::time::UefiTime;
use crate::{struct_bytes, Error, ERASE_BYTE};

/// Magic of a written variable record.
pub const VARIABLE_MAGIC: u16 = 0x55AA;
/// All-ones magic of erased flash; terminates the record scan.
pub const VARIABLE_SENTINEL: u16 = 0xFFFF;

bitflags! {
    /// Variable attribute word.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VariableAttributes: u32 {
        const NON_VOLATILE = 0x01;
        const BOOTSERVICE_ACCESS = 0x02;
        const RUNTIME_ACCESS = 0x04;
        const HARDWARE_ERROR_RECORD = 0x08;
        const AUTHENTICATED_WRITE_ACCESS = 0x10;
        const TIME_BASED_AUTHENTICATED_WRITE_ACCESS = 0x20;
        const APPEND_WRITE = 0x40;
    }

    /// Record lifecycle flags, in the de-inverted domain: a flag reads as
    /// set here when its bit is *cleared* in the stored byte.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VariableState: u8 {
        const IN_DELETED_TRANSITION = 0x01;
        const DELETED = 0x02;
        const ADDED = 0x40;
        const HEADER_VALID_ONLY = 0x80;
    }
}

impl VariableAttributes {
    /// Bits of the attribute word with no named flag.
    pub fn leftover(self) -> u32 {
        self.bits() & !Self::all().bits()
    }

    /// Space-separated flag names, with any leftover bits appended in hex.
    pub fn describe(self) -> String {
        let mut parts: Vec<String> = self.iter_names().map(|(name, _)| name.to_string()).collect();
        let leftover = self.leftover();
        if leftover != 0 {
            parts.push(format!("{leftover:#010x}"));
        }
        if parts.is_empty() {
            "None".to_string()
        } else {
            parts.join(" ")
        }
    }
}

impl VariableState {
    /// Lifecycle flags for a record as `compile` writes it.
    pub fn fresh() -> Self {
        Self::ADDED | Self::HEADER_VALID_ONLY
    }

    pub fn from_raw(byte: u8) -> Self {
        Self::from_bits_retain(byte ^ 0xFF)
    }

    pub fn to_raw(self) -> u8 {
        self.bits() ^ 0xFF
    }

    pub fn leftover(self) -> u8 {
        self.bits() & !Self::all().bits()
    }

    /// Pipe-separated flag names, with any leftover bits appended in hex.
    pub fn describe(self) -> String {
        let mut parts: Vec<String> = self.iter_names().map(|(name, _)| name.to_string()).collect();
        let leftover = self.leftover();
        if leftover != 0 {
            parts.push(format!("{leftover:#x}"));
        }
        if parts.is_empty() {
            "None".to_string()
        } else {
            parts.join(" | ")
        }
    }
}

// AUTHENTICATED_VARIABLE_HEADER, fixed 60-byte prefix of every record.
#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
struct RawHeader {
    magic: u16,
    state: u8,
    reserved: u8,
    attributes: u32,
    monotonic_count: u64,
    timestamp: UefiTime,
    pubkey_index: u32,
    name_len: u32,
    data_len: u32,
    vendor_guid: Guid,
}

unsafe impl Plain for RawHeader {}

const RAW_HEADER_SIZE: usize = mem::size_of::<RawHeader>();

/// One logical record of the variable log. Records are only ever appended;
/// a deleted variable stays in the log with its DELETED state bit set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedVariable {
    pub state: VariableState,
    pub attributes: VariableAttributes,
    pub monotonic_count: u64,
    pub timestamp: UefiTime,
    pub pubkey_index: u32,
    pub vendor_guid: Guid,
    pub name: String,
    pub data: Vec<u8>,
}

impl AuthenticatedVariable {
    /// Declared name length: UTF-16LE code units plus the NUL terminator.
    pub fn name_len(&self) -> u32 {
        self.name.encode_utf16().count() as u32 * 2 + 2
    }

    pub fn is_deleted(&self) -> bool {
        self.state.contains(VariableState::DELETED)
    }

    /// Append the encoded record: fixed header, NUL-terminated UTF-16LE
    /// name, raw data, then 0xFF padding to a 4-byte record length.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        let raw = RawHeader {
            magic: VARIABLE_MAGIC,
            state: self.state.to_raw(),
            reserved: 0,
            attributes: self.attributes.bits(),
            monotonic_count: self.monotonic_count,
            timestamp: self.timestamp,
            pubkey_index: self.pubkey_index,
            name_len: self.name_len(),
            data_len: self.data.len() as u32,
            vendor_guid: self.vendor_guid,
        };
        out.extend_from_slice(struct_bytes(&raw));
        for unit in self.name.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.data);
        while (out.len() - start) % 4 != 0 {
            out.push(ERASE_BYTE);
        }
    }
}

/// Sequential scan over the record log.
///
/// Each step has exactly three outcomes: the sentinel magic ends the scan
/// (`None`), a valid record is decoded (`Some(Ok(..))`), or the log is
/// malformed (`Some(Err(..))`) and the scan must not continue.
pub struct VariableScan<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> VariableScan<'a> {
    /// Scan `data` starting at `offset`. Offsets are positions within the
    /// volume, so the 4-byte record alignment is preserved.
    pub fn new(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            offset,
            failed: false,
        }
    }

    /// Current position in the volume.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], Error> {
        let bytes = self
            .data
            .get(self.offset..self.offset + len)
            .ok_or(Error::Truncated(what))?;
        self.offset += len;
        Ok(bytes)
    }

    fn next_record(&mut self) -> Result<Option<AuthenticatedVariable>, Error> {
        let magic_bytes = self
            .data
            .get(self.offset..self.offset + 2)
            .ok_or(Error::Truncated("variable magic"))?;
        let magic = u16::from_le_bytes([magic_bytes[0], magic_bytes[1]]);
        if magic == VARIABLE_SENTINEL {
            return Ok(None);
        }
        if magic != VARIABLE_MAGIC {
            return Err(Error::Format(format!(
                "invalid variable magic: expected {VARIABLE_MAGIC:#06x}, got {magic:#06x}"
            )));
        }

        let header = self.take(RAW_HEADER_SIZE, "variable header")?;
        let raw: &RawHeader =
            plain::from_bytes(header).map_err(|_| Error::Truncated("variable header"))?;
        let RawHeader {
            magic: _,
            state,
            reserved: _,
            attributes,
            monotonic_count,
            timestamp,
            pubkey_index,
            name_len,
            data_len,
            vendor_guid,
        } = *raw;

        if name_len % 2 != 0 {
            return Err(Error::Format(format!(
                "odd variable name length {name_len}"
            )));
        }
        let name_bytes = self.take(name_len as usize, "variable name")?;
        let mut units: Vec<u16> = name_bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        while units.last() == Some(&0) {
            units.pop();
        }
        let name = String::from_utf16(&units)
            .map_err(|_| Error::Format("variable name is not valid UTF-16".to_string()))?;

        let data = self.take(data_len as usize, "variable data")?.to_vec();

        // Skip padding up to the next 4-byte boundary.
        self.offset = (self.offset + 3) & !3;

        Ok(Some(AuthenticatedVariable {
            state: VariableState::from_raw(state),
            attributes: VariableAttributes::from_bits_retain(attributes),
            monotonic_count,
            timestamp,
            pubkey_index,
            vendor_guid,
            name,
            data,
        }))
    }
}

impl Iterator for VariableScan<'_> {
    type Item = Result<AuthenticatedVariable, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(Some(variable)) => Some(Ok(variable)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
