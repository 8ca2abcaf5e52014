// SPDX-License-Identifier: GPL-3.0-only

//! The human-editable YAML form of a variable store.
//!
//! Two-level mapping under a `Variables` key: vendor identifier (symbolic
//! name or raw GUID string) to variable name to attribute entry. Order is
//! significant; compile writes records in document order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::guid;
use crate::time::UefiTime;
use crate::variable::{AuthenticatedVariable, VariableAttributes, VariableState};
use crate::Error;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableEntry {
    /// Raw payload as a lowercase hex string.
    #[serde(rename = "Data", default)]
    pub data: String,

    #[serde(rename = "Monotonic Count", default)]
    pub monotonic_count: u64,

    #[serde(rename = "Public Key Index", default)]
    pub public_key_index: u32,

    /// Present (and true) only when the NON_VOLATILE attribute is absent.
    #[serde(rename = "Volatile", default, skip_serializing_if = "is_false")]
    pub volatile: bool,

    #[serde(rename = "Boot Access", default, skip_serializing_if = "is_false")]
    pub boot_access: bool,

    #[serde(rename = "Runtime Access", default, skip_serializing_if = "is_false")]
    pub runtime_access: bool,

    #[serde(
        rename = "Hardware Error Record",
        default,
        skip_serializing_if = "is_false"
    )]
    pub hardware_error_record: bool,

    #[serde(
        rename = "Authenticated Write Access",
        default,
        skip_serializing_if = "is_false"
    )]
    pub authenticated_write_access: bool,

    #[serde(
        rename = "Time Based Authenticated Write Access",
        default,
        skip_serializing_if = "is_false"
    )]
    pub time_based_authenticated_write_access: bool,

    #[serde(rename = "Append Write", default, skip_serializing_if = "is_false")]
    pub append_write: bool,

    /// Attribute bits with no named flag above.
    #[serde(rename = "Flags", default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,

    /// RFC 3339 timestamp, omitted when the record carries none.
    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "Variables")]
    pub variables: IndexMap<String, IndexMap<String, VariableEntry>>,
}

impl Document {
    /// Parse a document, validating its two-level shape. Shape problems are
    /// reported with the offending vendor and variable name.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        if !value.is_mapping() {
            return Err(Error::DocumentShape(
                "expected a mapping at the top level".into(),
            ));
        }
        let vendors = value
            .get("Variables")
            .ok_or_else(|| Error::DocumentShape("missing 'Variables' key".into()))?
            .as_mapping()
            .ok_or_else(|| Error::DocumentShape("'Variables' must be a mapping".into()))?;

        let mut variables = IndexMap::new();
        for (vendor_key, names) in vendors {
            let vendor = vendor_key.as_str().ok_or_else(|| {
                Error::DocumentShape(format!("vendor key {vendor_key:?} is not a string"))
            })?;
            let names = names.as_mapping().ok_or_else(|| {
                Error::DocumentShape(format!("entries under '{vendor}' must be a mapping"))
            })?;

            let mut entries = IndexMap::new();
            for (name_key, entry) in names {
                let name = name_key.as_str().ok_or_else(|| {
                    Error::DocumentShape(format!(
                        "variable key {name_key:?} under '{vendor}' is not a string"
                    ))
                })?;
                if !entry.is_mapping() {
                    return Err(Error::DocumentShape(format!(
                        "invalid variable data for '{name}' in '{vendor}'"
                    )));
                }
                let entry: VariableEntry = serde_yaml::from_value(entry.clone()).map_err(|e| {
                    Error::DocumentShape(format!(
                        "invalid variable data for '{name}' in '{vendor}': {e}"
                    ))
                })?;
                entries.insert(name.to_string(), entry);
            }
            variables.insert(vendor.to_string(), entries);
        }

        Ok(Self { variables })
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl VariableEntry {
    pub fn from_variable(variable: &AuthenticatedVariable) -> Self {
        let attributes = variable.attributes;
        let leftover = attributes.leftover();
        Self {
            data: encode_hex(&variable.data),
            monotonic_count: variable.monotonic_count,
            public_key_index: variable.pubkey_index,
            volatile: !attributes.contains(VariableAttributes::NON_VOLATILE),
            boot_access: attributes.contains(VariableAttributes::BOOTSERVICE_ACCESS),
            runtime_access: attributes.contains(VariableAttributes::RUNTIME_ACCESS),
            hardware_error_record: attributes.contains(VariableAttributes::HARDWARE_ERROR_RECORD),
            authenticated_write_access: attributes
                .contains(VariableAttributes::AUTHENTICATED_WRITE_ACCESS),
            time_based_authenticated_write_access: attributes
                .contains(VariableAttributes::TIME_BASED_AUTHENTICATED_WRITE_ACCESS),
            append_write: attributes.contains(VariableAttributes::APPEND_WRITE),
            flags: (leftover != 0).then_some(leftover),
            timestamp: variable
                .timestamp
                .to_datetime()
                .and_then(|t| t.format(&Rfc3339).ok()),
        }
    }

    /// Build the record this entry describes. Non-volatile is the default;
    /// the fresh state byte marks the record added and header-valid.
    pub fn build_variable(
        &self,
        vendor: &str,
        name: &str,
    ) -> Result<AuthenticatedVariable, Error> {
        let mut attributes = VariableAttributes::from_bits_retain(self.flags.unwrap_or(0));
        if !self.volatile {
            attributes |= VariableAttributes::NON_VOLATILE;
        }
        if self.boot_access {
            attributes |= VariableAttributes::BOOTSERVICE_ACCESS;
        }
        if self.runtime_access {
            attributes |= VariableAttributes::RUNTIME_ACCESS;
        }
        if self.hardware_error_record {
            attributes |= VariableAttributes::HARDWARE_ERROR_RECORD;
        }
        if self.authenticated_write_access {
            attributes |= VariableAttributes::AUTHENTICATED_WRITE_ACCESS;
        }
        if self.time_based_authenticated_write_access {
            attributes |= VariableAttributes::TIME_BASED_AUTHENTICATED_WRITE_ACCESS;
        }
        if self.append_write {
            attributes |= VariableAttributes::APPEND_WRITE;
        }

        let timestamp = match &self.timestamp {
            Some(text) => {
                let t = OffsetDateTime::parse(text, &Rfc3339).map_err(|e| {
                    Error::DocumentShape(format!(
                        "invalid timestamp for '{name}' in '{vendor}': {e}"
                    ))
                })?;
                UefiTime::from_datetime(t)
            }
            None => UefiTime::default(),
        };

        let data = decode_hex(&self.data).map_err(|_| {
            Error::DocumentShape(format!("invalid hex data for '{name}' in '{vendor}'"))
        })?;

        Ok(AuthenticatedVariable {
            state: VariableState::fresh(),
            attributes,
            monotonic_count: self.monotonic_count,
            timestamp,
            pubkey_index: self.public_key_index,
            vendor_guid: guid::lookup(vendor)?,
            name: name.to_string(),
            data,
        })
    }
}

pub fn encode_hex(data: &[u8]) -> String {
    data.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn decode_hex(text: &str) -> Result<Vec<u8>, Error> {
    if text.len() % 2 != 0 {
        return Err(Error::Format(format!("odd-length hex string '{text}'")));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .map_err(|_| Error::Format(format!("invalid hex string '{text}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        assert_eq!(encode_hex(&[0xDE, 0xAD, 0xBE, 0xEF]), "deadbeef");
        assert_eq!(decode_hex("deadbeef").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_parse_minimal() {
        let doc = Document::parse(
            "Variables:\n  gEfiGlobalVariableGuid:\n    Boot0001:\n      Data: deadbeef\n      Runtime Access: true\n      Boot Access: true\n",
        )
        .unwrap();

        let entry = &doc.variables["gEfiGlobalVariableGuid"]["Boot0001"];
        assert_eq!(entry.data, "deadbeef");
        assert!(entry.runtime_access);
        assert!(entry.boot_access);
        assert!(!entry.volatile);
        assert_eq!(entry.monotonic_count, 0);
    }

    #[test]
    fn test_parse_missing_variables_key() {
        assert!(matches!(
            Document::parse("Other: {}\n"),
            Err(Error::DocumentShape(_))
        ));
    }

    #[test]
    fn test_parse_entry_not_a_mapping() {
        let err = Document::parse(
            "Variables:\n  gEfiGlobalVariableGuid:\n    Boot0001: 17\n",
        )
        .unwrap_err();
        match err {
            Error::DocumentShape(message) => {
                assert!(message.contains("Boot0001"));
                assert!(message.contains("gEfiGlobalVariableGuid"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_entry_round_trip() {
        let entry = VariableEntry {
            data: "0102".to_string(),
            monotonic_count: 3,
            public_key_index: 1,
            runtime_access: true,
            flags: Some(0x180),
            ..VariableEntry::default()
        };

        let variable = entry.build_variable("gEfiGlobalVariableGuid", "Lang").unwrap();
        assert!(variable
            .attributes
            .contains(VariableAttributes::NON_VOLATILE));
        assert!(variable
            .attributes
            .contains(VariableAttributes::RUNTIME_ACCESS));
        assert_eq!(variable.attributes.leftover(), 0x180);
        assert_eq!(variable.data, vec![1, 2]);
        assert_eq!(variable.name, "Lang");

        let back = VariableEntry::from_variable(&variable);
        assert_eq!(back, entry);
    }

    #[test]
    fn test_volatile_marker() {
        let entry = VariableEntry {
            volatile: true,
            ..VariableEntry::default()
        };
        let variable = entry.build_variable("gEfiGlobalVariableGuid", "V").unwrap();
        assert!(!variable
            .attributes
            .contains(VariableAttributes::NON_VOLATILE));
        assert!(VariableEntry::from_variable(&variable).volatile);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let entry = VariableEntry {
            timestamp: Some("2024-05-01T12:00:00Z".to_string()),
            ..VariableEntry::default()
        };
        let variable = entry.build_variable("gEfiGlobalVariableGuid", "T").unwrap();
        let year = variable.timestamp.year;
        assert_eq!(year, 2024);

        let back = VariableEntry::from_variable(&variable);
        assert_eq!(back.timestamp.as_deref(), Some("2024-05-01T12:00:00Z"));
    }

    #[test]
    fn test_raw_guid_vendor() {
        let entry = VariableEntry::default();
        let raw = "00112233-4455-6677-8899-aabbccddeeff";
        let variable = entry.build_variable(raw, "X").unwrap();
        assert_eq!(variable.vendor_guid.to_string(), raw);

        assert!(matches!(
            entry.build_variable("bogus vendor", "X"),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_yaml_order_preserved() {
        let text = "Variables:\n  zVendor:\n    B: {}\n    A: {}\n  aVendor:\n    C: {}\n";
        let doc = Document::parse(text).unwrap();
        let vendors: Vec<_> = doc.variables.keys().cloned().collect();
        assert_eq!(vendors, vec!["zVendor", "aVendor"]);
        let names: Vec<_> = doc.variables["zVendor"].keys().cloned().collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
