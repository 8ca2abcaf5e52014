// SPDX-License-Identifier: GPL-3.0-only

//! GUID wire type and the process-wide registry of well-known UEFI GUIDs.
//!
//! The textual form is the straight hex of the stored bytes in 8-4-4-4-12
//! grouping. This matches how the variable store tooling has always spelled
//! these identifiers in its documents, so registry entries and raw GUID
//! strings round-trip byte-for-byte.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use plain::Plain;

use crate::Error;

/// A GUID exactly as it appears on disk.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Guid(pub [u8; 16]);

unsafe impl Plain for Guid {}

/// Filesystem GUID of the system NVRAM firmware volume.
pub const SYSTEM_NV_DATA_FV_GUID: Guid = Guid([
    0x8d, 0x2b, 0xf1, 0xff, 0x96, 0x76, 0x8b, 0x4c,
    0xa9, 0x85, 0x27, 0x47, 0x07, 0x5b, 0x4f, 0x50,
]);

/// Header GUID of the authenticated variable store.
pub const AUTHENTICATED_VARIABLE_GUID: Guid = Guid([
    0x78, 0x2c, 0xf3, 0xaa, 0x7b, 0x94, 0x9a, 0x43,
    0xa1, 0x80, 0x2e, 0x14, 0x4e, 0xc3, 0x77, 0x92,
]);

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15],
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

impl FromStr for Guid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let hex: String = s.chars().filter(|&c| c != '-').collect();
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Format(format!("invalid GUID literal '{s}'")));
        }
        let mut bytes = [0; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::Format(format!("invalid GUID literal '{s}'")))?;
        }
        Ok(Guid(bytes))
    }
}

/// Well-known GUIDs found in OVMF variable stores.
const WELL_KNOWN: &[(&str, &str)] = &[
    ("8d2bf1ff-9676-8b4c-a985-2747075b4f50", "gEfiSystemNvDataFvGuid"),
    ("782cf3aa-7b94-9a43-a180-2e144ec37792", "gEfiAuthenticatedVariableGuid"),
    ("e87fb304-aef6-0b48-bdd5-37d98c5e89aa", "gEdkiiVarErrorFlagGuid"),
    ("9f04194c-3741-d34d-9c10-8b97a83ffdfa", "gEfiMemoryTypeInformationGuid"),
    ("114070eb-0214-d311-8e77-00a0c969723b", "gMtcVendorGuid"),
    ("61dfe48b-ca93-d211-aa0d-00e098032b8c", "gEfiGlobalVariableGuid"),
    ("45493259-44ec-0d4c-b1cd-9db139df070c", "gEfiIscsiInitiatorNameProtocolGuid"),
    ("d16e445b-0be3-aa4f-871a-3654eca36080", "gEfiIp4Config2ProtocolGuid"),
    ("cbb219d7-3a3d-9645-a3bc-dad00e67656f", "gEfiImageSecurityDatabaseGuid"),
    ("f0a30bc7-af08-4556-99c4-001009c93a44", "gEfiSecureBootEnableDisableGuid"),
    ("0cec76c0-2870-9943-a072-71ee5c448b9f", "gEfiCustomModeEnableGuid"),
    ("16d6474b-d6a8-5245-9d44-ccad2e0f4cf9", "gIScsiConfigGuid"),
    ("6ee5bed9-dc75-d949-b4d7-b534210f637a", "gEfiCertDbGuid"),
    ("bd9afa77-5903-324d-bd60-28f4e78f784b", "gMicrosoftVendorGuid"),
    ("e0e47390-ec60-6e4b-9903-4c223c260f3c", "gEfiVendorKeysNvGuid"),
    ("e1e9b7fa-dd39-2b4f-8408-e20e906cb6de", "mBmHardDriveBootVariableGuid"),
];

struct Registry {
    by_guid: BTreeMap<Guid, &'static str>,
    by_name: BTreeMap<&'static str, Guid>,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut by_guid = BTreeMap::new();
        let mut by_name = BTreeMap::new();
        for &(raw, name) in WELL_KNOWN {
            let guid = Guid::from_str(raw).expect("well-known GUID table entry");
            by_guid.insert(guid, name);
            by_name.insert(name, guid);
        }
        Registry { by_guid, by_name }
    })
}

/// Symbolic name of a GUID, or its canonical string form if unknown.
pub fn resolve(guid: &Guid) -> String {
    match registry().by_guid.get(guid) {
        Some(name) => (*name).to_string(),
        None => guid.to_string(),
    }
}

/// GUID for a vendor identifier: a registered symbolic name, or a raw GUID
/// literal. Fails only for strings that are neither.
pub fn lookup(name: &str) -> Result<Guid, Error> {
    match registry().by_name.get(name) {
        Some(guid) => Ok(*guid),
        None => name.parse(),
    }
}
