// SPDX-License-Identifier: GPL-3.0-only

use core::mem;

use plain::Plain;

use crate::guid::{self, Guid};
use crate::{struct_bytes, Error};

pub const FVH_SIGNATURE: &[u8; 4] = b"_FVH";
pub const FVH_REVISION: u8 = 0x02;

/// Size of every OVMF_VARS.fd volume this tool produces.
pub const DEFAULT_VOLUME_SIZE: usize = 528 * 1024;

// EFI_FIRMWARE_VOLUME_HEADER, fixed 56-byte prefix. The block map that
// follows is variable-length and lives in the logical header below.
#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
struct RawHeader {
    zero_vector: [u8; 16],
    guid: Guid,
    volume_length: u64,
    signature: [u8; 4],
    attributes: u32,
    header_length: u16,
    checksum: u16,
    ext_header_offset: u16,
    reserved: u8,
    revision: u8,
}

unsafe impl Plain for RawHeader {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirmwareVolumeHeader {
    pub zero_vector: [u8; 16],
    pub guid: Guid,
    pub volume_length: u64,
    pub signature: [u8; 4],
    pub attributes: u32,
    pub header_length: u16,
    pub checksum: u16,
    pub ext_header_offset: u16,
    pub reserved: u8,
    pub revision: u8,
    /// (block count, block size) pairs, without the (0, 0) terminator.
    pub block_map: Vec<(u32, u32)>,
}

impl FirmwareVolumeHeader {
    /// Decode the header at the start of `data`. Returns the header and the
    /// number of bytes consumed, terminator included.
    ///
    /// The signature and filesystem GUID are gates: a mismatch means this is
    /// not an OVMF variable store and nothing further can be parsed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), Error> {
        let raw: &RawHeader =
            plain::from_bytes(data).map_err(|_| Error::Truncated("firmware volume header"))?;
        // Copy out of the packed view before touching any field.
        let RawHeader {
            zero_vector,
            guid,
            volume_length,
            signature,
            attributes,
            header_length,
            checksum,
            ext_header_offset,
            reserved,
            revision,
        } = *raw;

        if signature != *FVH_SIGNATURE {
            return Err(Error::Format(format!(
                "invalid volume signature: expected {:02x?}, got {:02x?}",
                FVH_SIGNATURE, signature
            )));
        }
        if guid != guid::SYSTEM_NV_DATA_FV_GUID {
            return Err(Error::Format(format!(
                "unexpected volume GUID: got {}, expected {}",
                guid,
                guid::SYSTEM_NV_DATA_FV_GUID
            )));
        }

        let mut block_map = Vec::new();
        let mut offset = mem::size_of::<RawHeader>();
        loop {
            let pair = data
                .get(offset..offset + 8)
                .ok_or(Error::Truncated("volume block map"))?;
            offset += 8;

            let count = u32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
            let size = u32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
            if count == 0 && size == 0 {
                break;
            }
            block_map.push((count, size));
        }

        Ok((
            Self {
                zero_vector,
                guid,
                volume_length,
                signature,
                attributes,
                header_length,
                checksum,
                ext_header_offset,
                reserved,
                revision,
                block_map,
            },
            offset,
        ))
    }

    /// Append the encoded header, block map, and mandatory (0, 0) terminator.
    /// Encode is a pure projection; the caller owns consistency.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let raw = RawHeader {
            zero_vector: self.zero_vector,
            guid: self.guid,
            volume_length: self.volume_length,
            signature: self.signature,
            attributes: self.attributes,
            header_length: self.header_length,
            checksum: self.checksum,
            ext_header_offset: self.ext_header_offset,
            reserved: self.reserved,
            revision: self.revision,
        };
        out.extend_from_slice(struct_bytes(&raw));
        for &(count, size) in &self.block_map {
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
        }
        out.extend_from_slice(&[0; 8]);
    }

    /// Canonical header for a fresh 528 KiB volume: revision 2, one run of
    /// 132 blocks of 4096 bytes, with the matching fixed length and checksum.
    pub fn create_default() -> Self {
        Self {
            zero_vector: [0; 16],
            guid: guid::SYSTEM_NV_DATA_FV_GUID,
            volume_length: DEFAULT_VOLUME_SIZE as u64,
            signature: *FVH_SIGNATURE,
            attributes: 0x0004_FEFF,
            header_length: 72,
            checksum: 0xB8AF,
            ext_header_offset: 0,
            reserved: 0,
            revision: FVH_REVISION,
            block_map: vec![(132, 4096)],
        }
    }
}
