// SPDX-License-Identifier: GPL-3.0-only

use core::mem;

use plain::Plain;

use crate::guid::{self, Guid};
use crate::{struct_bytes, Error};

/// Format byte of a formatted variable store.
pub const STORE_FORMATTED: u8 = 0x5A;
/// State byte of a healthy variable store.
pub const STORE_HEALTHY: u8 = 0xFE;
/// Store length within the default 528 KiB volume.
pub const DEFAULT_STORE_LENGTH: u32 = 262_072;

// VARIABLE_STORE_HEADER, immediately after the firmware volume header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, packed)]
pub struct VariableStoreHeader {
    pub guid: Guid,
    pub length: u32,
    pub format: u8,
    pub state: u8,
    pub reserved: u16,
    pub reserved1: u32,
}

unsafe impl Plain for VariableStoreHeader {}

impl VariableStoreHeader {
    pub const SIZE: usize = mem::size_of::<Self>();

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let raw: &Self =
            plain::from_bytes(data).map_err(|_| Error::Truncated("variable store header"))?;
        let header = *raw;

        let guid = header.guid;
        let format = header.format;
        let state = header.state;
        if guid != guid::AUTHENTICATED_VARIABLE_GUID {
            return Err(Error::Format(format!(
                "unexpected store GUID: got {}, expected {}",
                guid,
                guid::AUTHENTICATED_VARIABLE_GUID
            )));
        }
        if format != STORE_FORMATTED {
            return Err(Error::Format(format!(
                "invalid store format: expected {STORE_FORMATTED:#04x}, got {format:#04x}"
            )));
        }
        if state != STORE_HEALTHY {
            return Err(Error::Format(format!(
                "invalid store state: expected {STORE_HEALTHY:#04x}, got {state:#04x}"
            )));
        }

        Ok(header)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(struct_bytes(self));
    }

    /// Canonical store header for the default volume.
    pub fn create_default() -> Self {
        Self {
            guid: guid::AUTHENTICATED_VARIABLE_GUID,
            length: DEFAULT_STORE_LENGTH,
            format: STORE_FORMATTED,
            state: STORE_HEALTHY,
            reserved: 0,
            reserved1: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trip() {
        let header = VariableStoreHeader::create_default();

        let mut bytes = Vec::new();
        header.encode(&mut bytes);
        assert_eq!(bytes.len(), 28);
        assert_eq!(VariableStoreHeader::SIZE, 28);

        assert_eq!(VariableStoreHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_wrong_guid() {
        let mut bytes = Vec::new();
        VariableStoreHeader::create_default().encode(&mut bytes);
        bytes[0] ^= 0x01;

        assert!(matches!(
            VariableStoreHeader::decode(&bytes),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_wrong_format_byte() {
        let mut header = VariableStoreHeader::create_default();
        header.format = 0x5B;

        let mut bytes = Vec::new();
        header.encode(&mut bytes);

        assert!(matches!(
            VariableStoreHeader::decode(&bytes),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_wrong_state_byte() {
        let mut header = VariableStoreHeader::create_default();
        header.state = 0xFF;

        let mut bytes = Vec::new();
        header.encode(&mut bytes);

        assert!(matches!(
            VariableStoreHeader::decode(&bytes),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            VariableStoreHeader::decode(&[0; 12]),
            Err(Error::Truncated(_))
        ));
    }
}
