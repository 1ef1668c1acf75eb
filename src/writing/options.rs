//! Writing configuration.
//!
//! Every field is an independent override: `None` lets the writer derive a value from context,
//! `Some` is emitted verbatim. Nothing is validated at construction; whether a combination of values
//! is legal is decided by whoever consumes the options.

use crate::image::{
    DllCharacteristics, FileCharacteristics, Machine, ModuleFlags, Subsystem, Token,
};

/// Configuration for writing a managed image
///
/// The PE and CLI parts always exist (defaulting to all-unset); the debug part is optional and its
/// absence means no debug directory is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritingOptions {
    /// Write an executable (`true`) or a DLL (`false`)
    ///
    /// Only decides the DLL bit while [`PeOptions::characteristics`] is unset. A set
    /// `characteristics` is written verbatim, DLL bit included, even when it disagrees.
    pub is_executable: bool,
    /// PE/COFF header overrides
    pub pe: PeOptions,
    /// CLI header overrides
    pub cli: CliOptions,
    /// Debug directory configuration, `None` to omit the debug directory
    pub debug: Option<DebugOptions>,
}

impl Default for WritingOptions {
    fn default() -> Self {
        WritingOptions::new(true)
    }
}

impl WritingOptions {
    /// Create options with every override unset
    #[must_use]
    pub fn new(is_executable: bool) -> Self {
        WritingOptions::with_parts(is_executable, None, None, None)
    }

    /// Create options from optional parts; missing PE and CLI parts are defaulted
    #[must_use]
    pub fn with_parts(
        is_executable: bool,
        pe: Option<PeOptions>,
        cli: Option<CliOptions>,
        debug: Option<DebugOptions>,
    ) -> Self {
        WritingOptions {
            is_executable,
            pe: pe.unwrap_or_default(),
            cli: cli.unwrap_or_default(),
            debug,
        }
    }

    /// How the debug directory should be written
    #[must_use]
    pub fn debug_directive(&self) -> DebugDirective<'_> {
        match &self.debug {
            None => DebugDirective::Omit,
            Some(debug) if debug.data.is_some() => DebugDirective::Emit(debug),
            Some(debug) => DebugDirective::PayloadUnset(debug),
        }
    }
}

/// The three debug configurations a writer has to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugDirective<'a> {
    /// No debug options, no debug directory
    Omit,
    /// Debug options with a payload
    Emit(&'a DebugOptions),
    /// Debug options without a payload. Whether this means "keep the existing payload", "empty
    /// payload" or "no debug directory" is up to the writer.
    PayloadUnset(&'a DebugOptions),
}

/// PE/COFF overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeOptions {
    /// COFF machine
    pub machine: Option<Machine>,
    /// COFF time stamp
    pub time_date_stamp: Option<u32>,
    /// COFF characteristics; when unset the DLL bit follows [`WritingOptions::is_executable`]
    pub characteristics: Option<FileCharacteristics>,
    /// Linker major version
    pub major_linker_version: Option<u8>,
    /// Linker minor version
    pub minor_linker_version: Option<u8>,
    /// Preferred load address
    pub image_base: Option<u64>,
    /// Section alignment in memory
    pub section_alignment: Option<u32>,
    /// Section alignment in the file
    pub file_alignment: Option<u32>,
    /// Required OS major version
    pub major_os_version: Option<u16>,
    /// Required OS minor version
    pub minor_os_version: Option<u16>,
    /// Image major version
    pub major_user_version: Option<u16>,
    /// Image minor version
    pub minor_user_version: Option<u16>,
    /// Subsystem major version
    pub major_subsystem_version: Option<u16>,
    /// Subsystem minor version
    pub minor_subsystem_version: Option<u16>,
    /// Reserved, must be zero
    pub win32_version_value: Option<u32>,
    /// Subsystem
    pub subsystem: Option<Subsystem>,
    /// DLL characteristics
    pub dll_characteristics: Option<DllCharacteristics>,
    /// Stack reserve size
    pub stack_reserve_size: Option<u64>,
    /// Stack commit size
    pub stack_commit_size: Option<u64>,
    /// Heap reserve size
    pub heap_reserve_size: Option<u64>,
    /// Heap commit size
    pub heap_commit_size: Option<u64>,
    /// Reserved, must be zero
    pub loader_flags: Option<u32>,
    /// Number of data directory entries
    pub number_of_data_directories: Option<u32>,
    /// DLL named by the native bootstrap import (usually `mscoree.dll`). Images do not record it,
    /// so extraction never sets it.
    pub import_directory_name: Option<String>,
    /// Function named by the native bootstrap import (`_CorExeMain` or `_CorDllMain`). Images do
    /// not record it, so extraction never sets it.
    pub import_hint_name: Option<String>,
}

impl PeOptions {
    /// Returns true if either import name of the native bootstrap thunk is set
    #[must_use]
    pub fn has_native_thunk_names(&self) -> bool {
        self.import_directory_name.is_some() || self.import_hint_name.is_some()
    }
}

/// CLI overrides, one group per header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    /// CLI header
    pub header: CliHeaderOptions,
    /// Metadata root
    pub metadata_root: MetadataRootOptions,
    /// Table-stream header
    pub table_stream: TableStreamOptions,
}

impl CliOptions {
    /// Create CLI options from optional groups; missing groups are defaulted
    #[must_use]
    pub fn new(
        header: Option<CliHeaderOptions>,
        metadata_root: Option<MetadataRootOptions>,
        table_stream: Option<TableStreamOptions>,
    ) -> Self {
        CliOptions {
            header: header.unwrap_or_default(),
            metadata_root: metadata_root.unwrap_or_default(),
            table_stream: table_stream.unwrap_or_default(),
        }
    }
}

/// CLI header overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliHeaderOptions {
    /// Runtime major version
    pub major_runtime_version: Option<u16>,
    /// Runtime minor version
    pub minor_runtime_version: Option<u16>,
    /// Runtime flags
    pub flags: Option<ModuleFlags>,
    /// Entry point token
    pub entry_point: Option<Token>,
}

/// Metadata root overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRootOptions {
    /// Signature, `BSJB`
    pub signature: Option<u32>,
    /// Major version
    pub major_version: Option<u16>,
    /// Minor version
    pub minor_version: Option<u16>,
    /// Reserved
    pub reserved: Option<u32>,
    /// Reserved
    pub reserved2: Option<u8>,
    /// Version text, written as UTF-8 with a NUL terminator and zero padding
    pub version_string: Option<String>,
    /// Storage flags
    pub storage_flags: Option<u8>,
}

/// Table-stream header overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStreamOptions {
    /// Reserved
    pub reserved: Option<u32>,
    /// Reserved
    pub reserved2: Option<u8>,
    /// Table schema major version
    pub major_version: Option<u8>,
    /// Table schema minor version
    pub minor_version: Option<u8>,
    /// Extra data after the row counts
    pub extra_data: Option<u32>,
    /// Present tables; must match the existing tables
    pub present_tables: Option<u64>,
    /// Sorted tables
    pub sorted_tables: Option<u64>,
}

/// Debug directory configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugOptions {
    /// Reserved, must be zero
    pub characteristics: Option<u32>,
    /// Time stamp
    pub time_date_stamp: Option<u32>,
    /// Format major version
    pub major_version: Option<u16>,
    /// Format minor version
    pub minor_version: Option<u16>,
    /// Debug format
    pub debug_type: Option<u32>,
    /// Raw payload; see [`DebugDirective::PayloadUnset`] for the meaning of `None`
    pub data: Option<Vec<u8>>,
}
