//! The image data model: a read-only snapshot of the headers of a managed PE image.
//!
//! An [`ImageInformation`] is produced once per parsed image (see [`ImageInformation::from_file`]
//! and [`ImageInformation::from_mem`]) and never mutated afterwards. Edits go through
//! [`crate::WritingOptions`] instead.
//!
//! Nested parts are optional so that a partially materialized image can be represented. Images
//! produced by the reader in this crate always have every part except [`DebugInformation`].
//!
//! # Key Types
//! - [`ImageInformation`] - root of the snapshot
//! - [`PeInformation`], [`DosHeader`], [`NtHeader`], [`FileHeader`], [`OptionalHeader`] - PE/COFF headers
//! - [`CliInformation`], [`CliHeader`], [`MetadataRoot`], [`TableStreamHeader`] - CLI headers
//! - [`DebugInformation`] - first debug directory entry and its payload
//!
//! # Equality
//!
//! `ImageInformation` implements `PartialEq`, `Eq` and `Hash` through
//! [`crate::comparer::image_comparer`]: two snapshots are equal if they describe the same header
//! content, no matter how they were produced.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilimage::ImageInformation;
//! use std::path::Path;
//!
//! let first = ImageInformation::from_file(Path::new("tests/samples/app.exe"))?;
//! let second = ImageInformation::from_file(Path::new("tests/samples/app.exe"))?;
//! assert_eq!(first, second);
//! # Ok::<(), cilimage::Error>(())
//! ```

mod cli;
mod debug;
mod pe;
mod reader;
mod tables;
mod token;

pub use cli::{
    CliHeader, MetadataRoot, ModuleFlags, TableStreamHeader, CIL_HEADER_MAGIC, CLI_HEADER_SIZE,
    HEAP_SIZES_EXTRA_DATA,
};
pub use debug::{DebugInformation, DEBUG_DIRECTORY_SIZE, DEBUG_TYPE_CODEVIEW};
pub use pe::{
    DllCharacteristics, DosHeader, FileCharacteristics, FileHeader, Machine, NtHeader,
    OptionalHeader, OptionalHeaderKind, Subsystem, DOS_SIGNATURE, NT_SIGNATURE, PE32_MAGIC,
    PE32_PLUS_MAGIC,
};
pub(crate) use cli::decode_version;
pub(crate) use reader::{HeaderLocations, OptionalHeaderLayout};
pub use tables::{CodedIndexType, TableId};
pub use token::Token;

/// The PE/COFF part of an image.
#[derive(Debug, Clone)]
pub struct PeInformation {
    /// The DOS header
    pub dos_header: Option<DosHeader>,
    /// The NT header with file and optional header
    pub nt_header: Option<NtHeader>,
}

/// The CLI part of an image.
///
/// `field_rvas` and `method_rvas` hold the RVA columns of the `FieldRVA` and `MethodDef` tables in
/// row order. Logical equality only looks at their lengths.
#[derive(Debug, Clone)]
pub struct CliInformation {
    /// The CLI header
    pub cli_header: Option<CliHeader>,
    /// The metadata root
    pub metadata_root: Option<MetadataRoot>,
    /// The header of the table stream
    pub table_stream_header: Option<TableStreamHeader>,
    /// RVA of every `FieldRVA` row
    pub field_rvas: Vec<u32>,
    /// RVA of every `MethodDef` row (0 for methods without a body)
    pub method_rvas: Vec<u32>,
}

/// The root of the image data model.
#[derive(Debug, Clone)]
pub struct ImageInformation {
    /// PE/COFF headers
    pub pe: Option<PeInformation>,
    /// CLI headers and RVA tables
    pub cli: Option<CliInformation>,
    /// The first debug directory entry, if the image has one
    pub debug: Option<DebugInformation>,
}

impl ImageInformation {
    /// Assemble a complete snapshot
    #[must_use]
    pub fn new(pe: PeInformation, cli: CliInformation, debug: Option<DebugInformation>) -> Self {
        ImageInformation {
            pe: Some(pe),
            cli: Some(cli),
            debug,
        }
    }

    /// The COFF file header, if materialized
    #[must_use]
    pub fn file_header(&self) -> Option<&FileHeader> {
        self.pe
            .as_ref()?
            .nt_header
            .as_ref()?
            .file_header
            .as_ref()
    }

    /// The optional header, if materialized
    #[must_use]
    pub fn optional_header(&self) -> Option<&OptionalHeader> {
        self.pe
            .as_ref()?
            .nt_header
            .as_ref()?
            .optional_header
            .as_ref()
    }

    /// The CLI header, if materialized
    #[must_use]
    pub fn cli_header(&self) -> Option<&CliHeader> {
        self.cli.as_ref()?.cli_header.as_ref()
    }

    /// The metadata root, if materialized
    #[must_use]
    pub fn metadata_root(&self) -> Option<&MetadataRoot> {
        self.cli.as_ref()?.metadata_root.as_ref()
    }

    /// The table-stream header, if materialized
    #[must_use]
    pub fn table_stream_header(&self) -> Option<&TableStreamHeader> {
        self.cli.as_ref()?.table_stream_header.as_ref()
    }

    /// Target architecture from the file header
    #[must_use]
    pub fn machine(&self) -> Option<Machine> {
        self.file_header().map(|header| header.machine)
    }

    /// Returns true if the file header marks the image as a DLL
    #[must_use]
    pub fn is_dll(&self) -> bool {
        self.file_header().is_some_and(FileHeader::is_dll)
    }
}
