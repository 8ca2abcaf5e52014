// SPDX-License-Identifier: GPL-3.0-only

//! Codec for the OVMF_VARS.fd non-volatile variable store image used by
//! virtual-machine firmware: a firmware volume header, an authenticated
//! variable store header, and an append-only log of authenticated variable
//! records, all little-endian and padded with the flash erase value.

use std::path::PathBuf;

use thiserror::Error;

pub mod document;
pub mod guid;
pub mod image;
pub mod store;
pub mod time;
pub mod variable;
pub mod volume;

/// Byte value of erased flash. Used for padding and for the free tail of a
/// compiled image; the all-ones record magic doubles as the end-of-log
/// sentinel.
pub const ERASE_BYTE: u8 = 0xFF;

#[derive(Debug, Error)]
pub enum Error {
    /// Magic, GUID, format, or state byte did not match the fixed layout.
    #[error("format error: {0}")]
    Format(String),

    /// The input ended in the middle of a fixed-size structure.
    #[error("unexpected end of data while reading {0}")]
    Truncated(&'static str),

    /// The compiled variables would run past the writable region.
    #[error("variables end at {used:#x}, past the writable limit {limit:#x}")]
    Overflow { used: usize, limit: usize },

    /// The structured document is missing its required shape.
    #[error("invalid document: {0}")]
    DocumentShape(String),

    /// Refusing to clobber an existing output file.
    #[error("output file '{}' already exists (use --force to overwrite)", .0.display())]
    OutputExists(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// View a fixed-layout header as its raw wire bytes.
pub(crate) fn struct_bytes<T: plain::Plain>(value: &T) -> &[u8] {
    unsafe {
        core::slice::from_raw_parts(value as *const T as *const u8, core::mem::size_of::<T>())
    }
}
