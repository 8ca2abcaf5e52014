// SPDX-License-Identifier: GPL-3.0-only

//! Whole-image operations: dump, export, compile, and blank generation.
//!
//! Decode walks the image front to back: firmware volume header, variable
//! store header, then the record log until the erased-flash sentinel.
//! Compile assembles the complete 528 KiB image in memory so the output
//! file is only ever written whole.

use std::io::{self, Write};

use indexmap::IndexMap;
use time::format_description::well_known::Rfc3339;

use crate::document::{Document, VariableEntry};
use crate::guid;
use crate::store::VariableStoreHeader;
use crate::variable::{AuthenticatedVariable, VariableScan};
use crate::volume::{FirmwareVolumeHeader, DEFAULT_VOLUME_SIZE};
use crate::{Error, ERASE_BYTE};

/// Variable records must end at or before this offset in a compiled image.
pub const MAX_VARIABLE_OFFSET: usize = 0x41000;

/// Fault-tolerant-write working block header written at
/// [`MAX_VARIABLE_OFFSET`]: its GUID, CRC, flags, and write queue size.
/// Firmware expects these exact bytes in a fresh store.
pub const FTW_FOOTER: [u8; 32] = [
    0x2B, 0x29, 0x58, 0x9E, 0x68, 0x7C, 0x7D, 0x49,
    0xA0, 0xCE, 0x65, 0x00, 0xFD, 0x9F, 0x1B, 0x95,
    0x2C, 0xAF, 0x2C, 0x64, 0xFE, 0xFF, 0xFF, 0xFF,
    0xE0, 0x0F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Fully decoded contents of a variable store image.
pub struct StoreContents {
    pub volume: FirmwareVolumeHeader,
    pub store: VariableStoreHeader,
    pub variables: Vec<AuthenticatedVariable>,
}

pub fn decode(data: &[u8]) -> Result<StoreContents, Error> {
    let (volume, consumed) = FirmwareVolumeHeader::decode(data)?;
    let store = VariableStoreHeader::decode(
        data.get(consumed..)
            .ok_or(Error::Truncated("variable store header"))?,
    )?;

    let mut variables = Vec::new();
    for item in VariableScan::new(data, consumed + VariableStoreHeader::SIZE) {
        variables.push(item?);
    }

    Ok(StoreContents {
        volume,
        store,
        variables,
    })
}

/// Write a human-readable report of the image. Tombstoned records are shown
/// only when `show_deleted` is set.
pub fn dump(data: &[u8], show_deleted: bool, out: &mut impl Write) -> Result<(), Error> {
    let (volume, consumed) = FirmwareVolumeHeader::decode(data)?;
    print_volume_header(out, &volume)?;

    let store = VariableStoreHeader::decode(
        data.get(consumed..)
            .ok_or(Error::Truncated("variable store header"))?,
    )?;
    print_store_header(out, &store)?;

    for item in VariableScan::new(data, consumed + VariableStoreHeader::SIZE) {
        let variable = item?;
        if !variable.is_deleted() || show_deleted {
            print_variable(out, &variable)?;
        }
    }
    Ok(())
}

/// Convert an image to its document form. Tombstoned records are dropped;
/// surviving records are grouped by vendor in order of appearance.
pub fn export(data: &[u8]) -> Result<Document, Error> {
    let contents = decode(data)?;

    let mut variables: IndexMap<String, IndexMap<String, VariableEntry>> = IndexMap::new();
    for variable in &contents.variables {
        if variable.is_deleted() {
            continue;
        }
        let vendor = guid::resolve(&variable.vendor_guid);
        variables
            .entry(vendor)
            .or_default()
            .insert(variable.name.clone(), VariableEntry::from_variable(variable));
    }

    Ok(Document { variables })
}

/// Build a complete image from a document, records in document order.
pub fn compile(document: &Document) -> Result<Vec<u8>, Error> {
    let mut variables = Vec::new();
    for (vendor, entries) in &document.variables {
        for (name, entry) in entries {
            variables.push(entry.build_variable(vendor, name)?);
        }
    }
    build_image(&variables)
}

/// Build an image holding no variables at all.
pub fn generate_blank() -> Result<Vec<u8>, Error> {
    build_image(&[])
}

/// Assemble the full 528 KiB image: erase fill, default headers, records,
/// and the FTW footer. Nothing touches the filesystem here.
pub fn build_image(variables: &[AuthenticatedVariable]) -> Result<Vec<u8>, Error> {
    let mut used = Vec::new();
    FirmwareVolumeHeader::create_default().encode(&mut used);
    VariableStoreHeader::create_default().encode(&mut used);
    for variable in variables {
        variable.encode(&mut used);
    }

    if used.len() > MAX_VARIABLE_OFFSET {
        return Err(Error::Overflow {
            used: used.len(),
            limit: MAX_VARIABLE_OFFSET,
        });
    }

    let mut image = vec![ERASE_BYTE; DEFAULT_VOLUME_SIZE];
    image[..used.len()].copy_from_slice(&used);
    image[MAX_VARIABLE_OFFSET..MAX_VARIABLE_OFFSET + FTW_FOOTER.len()]
        .copy_from_slice(&FTW_FOOTER);
    Ok(image)
}

fn print_volume_header(out: &mut impl Write, header: &FirmwareVolumeHeader) -> io::Result<()> {
    writeln!(out, "{:=^80}", "Firmware Volume Header")?;
    writeln!(out, "{:<25}: {}", "UUID", guid::resolve(&header.guid))?;
    writeln!(
        out,
        "{:<25}: {} bytes ({:.1} KiB)",
        "FV Length",
        header.volume_length,
        header.volume_length as f64 / 1024.0
    )?;
    writeln!(out, "{:<25}: {:#010x}", "Flags", header.attributes)?;
    writeln!(out, "{:<25}: {} bytes", "Header Length", header.header_length)?;
    writeln!(out, "{:<25}: {:#06x}", "Checksum", header.checksum)?;
    writeln!(out, "{:<25}: {:#x}", "Ext. Header Offset", header.ext_header_offset)?;
    writeln!(out, "{:<25}: {}", "Revision", header.revision)?;
    writeln!(out)?;
    writeln!(out, "Blocks:")?;
    for &(count, size) in &header.block_map {
        writeln!(
            out,
            "  {} * {} byte blocks ({:.1} KiB total)",
            count,
            size,
            (count as u64 * size as u64) as f64 / 1024.0
        )?;
    }
    writeln!(out)
}

fn print_store_header(out: &mut impl Write, header: &VariableStoreHeader) -> io::Result<()> {
    let length = header.length;
    let format = header.format;
    let state = header.state;

    writeln!(out, "{:=^80}", "Variable Store Header")?;
    writeln!(
        out,
        "{:<25}: {} bytes ({:.1} KiB)",
        "Length",
        length,
        length as f64 / 1024.0
    )?;
    writeln!(out, "{:<25}: {format:#04x}", "Format")?;
    writeln!(out, "{:<25}: {state:#04x}", "State")?;
    writeln!(out)
}

fn print_variable(out: &mut impl Write, variable: &AuthenticatedVariable) -> io::Result<()> {
    writeln!(out, "{:=^80}", "Authenticated Variable")?;
    writeln!(out, "{:<25}: {:?}", "Name", variable.name)?;
    writeln!(out, "{:<25}: {}", "Vendor UUID", guid::resolve(&variable.vendor_guid))?;
    writeln!(out, "{:<25}: {}", "Monotonic Count", variable.monotonic_count)?;
    writeln!(out, "{:<25}: {}", "Public Key Index", variable.pubkey_index)?;
    writeln!(out, "{:<25}: {}", "State", variable.state.describe())?;
    writeln!(out, "{:<25}: {}", "Flags", variable.attributes.describe())?;
    if let Some(t) = variable.timestamp.to_datetime() {
        if let Ok(text) = t.format(&Rfc3339) {
            writeln!(out, "{:<25}: {}", "Timestamp", text)?;
        }
    }
    writeln!(out, "{:<25}: {} bytes", "Data Length", variable.data.len())?;
    hexdump(out, &variable.data, true)?;
    writeln!(out)
}

/// Write a hex + ASCII dump. With `elide`, runs of identical 16-byte lines
/// collapse into a single `*` marker.
pub fn hexdump(out: &mut impl Write, data: &[u8], elide: bool) -> io::Result<()> {
    let mut prev: Option<&[u8]> = None;
    let mut eliding = false;
    for (index, line) in data.chunks(16).enumerate() {
        if elide && prev == Some(line) {
            if !eliding {
                eliding = true;
                writeln!(out, "{:^80}", "*")?;
            }
        } else {
            eliding = false;
            let hex = line
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            let ascii: String = line
                .iter()
                .map(|&byte| {
                    if (0x20..=0x7E).contains(&byte) {
                        byte as char
                    } else {
                        '.'
                    }
                })
                .collect();
            writeln!(out, "{:08x}  {:<47}  |{}|", index * 16, hex, ascii)?;
        }
        prev = Some(line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{VariableAttributes, VariableState};

    fn boot_entry() -> VariableEntry {
        VariableEntry {
            data: "deadbeef".to_string(),
            boot_access: true,
            runtime_access: true,
            ..VariableEntry::default()
        }
    }

    fn boot_document() -> Document {
        let mut document = Document::default();
        document
            .variables
            .entry("gEfiGlobalVariableGuid".to_string())
            .or_default()
            .insert("Boot0001".to_string(), boot_entry());
        document
    }

    #[test]
    fn test_blank_image_layout() {
        let image = generate_blank().unwrap();
        assert_eq!(image.len(), DEFAULT_VOLUME_SIZE);

        let mut headers = Vec::new();
        FirmwareVolumeHeader::create_default().encode(&mut headers);
        assert_eq!(headers.len(), 72);
        VariableStoreHeader::create_default().encode(&mut headers);
        assert_eq!(headers.len(), 100);
        assert_eq!(&image[..100], &headers[..]);

        // Record area starts erased and the footer sits at its fixed offset.
        assert!(image[100..104].iter().all(|&b| b == ERASE_BYTE));
        assert_eq!(image[MAX_VARIABLE_OFFSET..MAX_VARIABLE_OFFSET + 32], FTW_FOOTER);

        let contents = decode(&image).unwrap();
        assert!(contents.variables.is_empty());

        // Byte-identical inputs produce byte-identical images.
        assert_eq!(generate_blank().unwrap(), image);
        assert_eq!(compile(&Document::default()).unwrap(), image);
    }

    #[test]
    fn test_compile_boot0001_scenario() {
        let image = compile(&boot_document()).unwrap();
        assert_eq!(image.len(), DEFAULT_VOLUME_SIZE);

        // First record follows the two headers at offset 100.
        assert_eq!(image[100..102], [0xAA, 0x55]);
        // NON_VOLATILE default plus the two requested access flags.
        assert_eq!(image[104..108], 0x07u32.to_le_bytes());
        // name_len and data_len at their fixed offsets within the record.
        assert_eq!(image[136..140], 18u32.to_le_bytes());
        assert_eq!(image[140..144], 4u32.to_le_bytes());
        assert_eq!(image[MAX_VARIABLE_OFFSET..MAX_VARIABLE_OFFSET + 32], FTW_FOOTER);

        let contents = decode(&image).unwrap();
        assert_eq!(contents.variables.len(), 1);
        let variable = &contents.variables[0];
        assert_eq!(variable.name, "Boot0001");
        assert_eq!(variable.data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(variable
            .attributes
            .contains(VariableAttributes::RUNTIME_ACCESS));
    }

    #[test]
    fn test_export_skips_deleted() {
        let live = boot_entry()
            .build_variable("gEfiGlobalVariableGuid", "Boot0001")
            .unwrap();
        let mut dead = boot_entry()
            .build_variable("gEfiGlobalVariableGuid", "Boot0000")
            .unwrap();
        dead.state |= VariableState::DELETED;

        let image = build_image(&[dead, live.clone()]).unwrap();

        // Both records are physically present.
        assert_eq!(decode(&image).unwrap().variables.len(), 2);

        let document = export(&image).unwrap();
        let names: Vec<_> = document.variables["gEfiGlobalVariableGuid"]
            .keys()
            .cloned()
            .collect();
        assert_eq!(names, vec!["Boot0001"]);
    }

    #[test]
    fn test_dump_deleted_visibility() {
        let live = boot_entry()
            .build_variable("gEfiGlobalVariableGuid", "Boot0001")
            .unwrap();
        let mut dead = boot_entry()
            .build_variable("gEfiGlobalVariableGuid", "Boot0000")
            .unwrap();
        dead.state |= VariableState::DELETED;

        let image = build_image(&[dead, live]).unwrap();

        let mut report = Vec::new();
        dump(&image, false, &mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("Boot0001"));
        assert!(!report.contains("Boot0000"));

        let mut report = Vec::new();
        dump(&image, true, &mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("Boot0001"));
        assert!(report.contains("Boot0000"));
        assert!(report.contains("DELETED"));
    }

    #[test]
    fn test_export_compile_round_trip() {
        let first = compile(&boot_document()).unwrap();
        let document = export(&first).unwrap();
        let second = compile(&document).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_export_groups_by_vendor() {
        let a = boot_entry().build_variable("gEfiGlobalVariableGuid", "A").unwrap();
        let b = boot_entry()
            .build_variable("00112233-4455-6677-8899-aabbccddeeff", "B")
            .unwrap();
        let c = boot_entry().build_variable("gEfiGlobalVariableGuid", "C").unwrap();

        let image = build_image(&[a, b, c]).unwrap();
        let document = export(&image).unwrap();

        let vendors: Vec<_> = document.variables.keys().cloned().collect();
        assert_eq!(
            vendors,
            vec!["gEfiGlobalVariableGuid", "00112233-4455-6677-8899-aabbccddeeff"]
        );
        let names: Vec<_> = document.variables["gEfiGlobalVariableGuid"]
            .keys()
            .cloned()
            .collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[test]
    fn test_overflow() {
        let mut entry = boot_entry();
        entry.data = "ff".repeat(MAX_VARIABLE_OFFSET);
        let mut document = Document::default();
        document
            .variables
            .entry("gEfiGlobalVariableGuid".to_string())
            .or_default()
            .insert("Huge".to_string(), entry);

        assert!(matches!(
            compile(&document),
            Err(Error::Overflow { .. })
        ));
    }

    #[test]
    fn test_corrupted_magic_is_format_error() {
        let mut image = generate_blank().unwrap();
        image[40] ^= 0x01; // volume signature bit

        assert!(matches!(decode(&image), Err(Error::Format(_))));
    }

    #[test]
    fn test_corrupted_record_magic() {
        let mut image = compile(&boot_document()).unwrap();
        image[100] ^= 0x01;

        assert!(matches!(decode(&image), Err(Error::Format(_))));
    }
}
