//! CLI headers: the CLI (COR20) header, the metadata root and the table-stream header.
//!
//! # Reference
//! - [ECMA-335 II.24.3.3: Runtime flags](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)
//! - [ECMA-335 II.24.2.1: Metadata root](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)
//! - [ECMA-335 II.24.2.6: #~ stream](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::image::token::Token;

/// The MAGIC value indicating the metadata root (`BSJB`)
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Size of the CLI header, which is also the value of its `cb` field
pub const CLI_HEADER_SIZE: usize = 72;

/// `HeapSizes` bit announcing the 4-byte extra data after the row counts
pub const HEAP_SIZES_EXTRA_DATA: u8 = 0x40;

bitflags! {
    /// Runtime flags of the CLI header
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModuleFlags: u32 {
        /// The image contains only IL code
        const IL_ONLY = 0x0000_0001;
        /// The image can only be loaded into a 32-bit process
        const REQUIRED_32BIT = 0x0000_0002;
        /// The image is an IL library
        const IL_LIBRARY = 0x0000_0004;
        /// The image has a strong name signature
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// The entry point is a native RVA instead of a token
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        /// The loader and JIT track debug data
        const TRACK_DEBUG_DATA = 0x0001_0000;
        /// The image prefers to run in a 32-bit process
        const PREFERRED_32BIT = 0x0002_0000;
    }
}

/// The CLI header, located through the CLR runtime header data directory.
#[derive(Debug, Clone)]
pub struct CliHeader {
    /// The minimum version of runtime required to run this program
    pub major_runtime_version: u16,
    /// The minor portion of the version
    pub minor_runtime_version: u16,
    /// Flags describing this runtime
    pub flags: ModuleFlags,
    /// Token for the `MethodDef` or File of the entry point for the image
    pub entry_point: Token,
}

/// The metadata root, the header of the metadata stream directory.
///
/// The version string is kept as the raw bytes of its slot on disk, padding included, so that two
/// roots compare equal only if they are byte-identical.
#[derive(Debug, Clone)]
pub struct MetadataRoot {
    /// Magic signature for physical metadata: 0x424A5342
    pub signature: u32,
    /// `MajorVersion`
    pub major_version: u16,
    /// `MinorVersion`
    pub minor_version: u16,
    /// Reserved, always 0
    pub reserved: u32,
    /// The version string slot, `Length` bytes including the terminator and padding
    pub version_string_bytes: Vec<u8>,
    /// Low byte of `Flags`
    pub storage_flags: u8,
    /// High byte of `Flags`, reserved
    pub reserved2: u8,
}

impl MetadataRoot {
    /// The version string, decoded up to its first NUL
    #[must_use]
    pub fn version_string(&self) -> String {
        decode_version(&self.version_string_bytes)
    }
}

/// Decode a version string slot up to its first NUL, replacing invalid UTF-8
pub(crate) fn decode_version(slot: &[u8]) -> String {
    let end = slot
        .iter()
        .position(|byte| *byte == 0)
        .unwrap_or(slot.len());

    String::from_utf8_lossy(&slot[..end]).into_owned()
}

/// The header of the `#~` (or `#-`) stream.
#[derive(Debug, Clone)]
pub struct TableStreamHeader {
    /// Reserved, always 0
    pub reserved: u32,
    /// Major version of the table schema
    pub major_version: u8,
    /// Minor version of the table schema
    pub minor_version: u8,
    /// Heap index size flags
    pub heap_sizes: u8,
    /// Reserved, always 1
    pub reserved2: u8,
    /// Extra data following the row counts, present if [`HEAP_SIZES_EXTRA_DATA`] is set
    pub extra_data: Option<u32>,
    /// Bit vector of present tables
    pub present_tables: u64,
    /// Bit vector of sorted tables
    pub sorted_tables: u64,
}

impl TableStreamHeader {
    /// Returns true if the table with the given id is present
    #[must_use]
    pub fn has_table(&self, table_id: u8) -> bool {
        table_id < 64 && self.present_tables & (1 << table_id) != 0
    }

    /// Number of present tables
    #[must_use]
    pub fn table_count(&self) -> u32 {
        self.present_tables.count_ones()
    }
}
