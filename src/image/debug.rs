//! The debug directory entry of an image.
//!
//! Managed compilers emit at least one `IMAGE_DEBUG_DIRECTORY` entry (usually CodeView with an
//! `RSDS` record naming the PDB). Only the first entry is modelled; its payload is kept as raw
//! bytes and never interpreted here.

/// Size of one `IMAGE_DEBUG_DIRECTORY` entry
pub const DEBUG_DIRECTORY_SIZE: usize = 28;

/// `IMAGE_DEBUG_TYPE_CODEVIEW`
pub const DEBUG_TYPE_CODEVIEW: u32 = 2;

/// The first debug directory entry together with the data it points to.
#[derive(Debug, Clone)]
pub struct DebugInformation {
    /// Reserved, must be zero
    pub characteristics: u32,
    /// Time and date that the debug data was created
    pub time_date_stamp: u32,
    /// Major version of the debug data format
    pub major_version: u16,
    /// Minor version of the debug data format
    pub minor_version: u16,
    /// Format of the debug information
    pub debug_type: u32,
    /// The debug payload, `SizeOfData` bytes
    pub data: Vec<u8>,
}

impl DebugInformation {
    /// Returns true for a CodeView entry
    #[must_use]
    pub fn is_codeview(&self) -> bool {
        self.debug_type == DEBUG_TYPE_CODEVIEW
    }

    /// The PDB path of a CodeView `RSDS` payload, if this is one
    #[must_use]
    pub fn pdb_path(&self) -> Option<String> {
        // RSDS signature, GUID, age, then a NUL-terminated UTF-8 path
        if !self.is_codeview() || self.data.len() < 24 || &self.data[..4] != b"RSDS" {
            return None;
        }

        let path = &self.data[24..];
        let end = path.iter().position(|byte| *byte == 0).unwrap_or(path.len());
        Some(String::from_utf8_lossy(&path[..end]).into_owned())
    }
}
