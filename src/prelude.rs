//! # cilimage Prelude
//!
//! The types needed to read, compare and re-configure managed images, for glob imports.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilimage operations
pub use crate::Error;

/// The result type used throughout cilimage
pub use crate::Result;

/// Low-level file parsing utilities
pub use crate::{File, Parser};

// ================================================================================================
// Image Data Model
// ================================================================================================

/// Root of the header snapshot
pub use crate::image::ImageInformation;

/// Headers of the snapshot
pub use crate::image::{
    CliHeader, CliInformation, DebugInformation, DosHeader, FileHeader, MetadataRoot, NtHeader,
    OptionalHeader, PeInformation, TableStreamHeader,
};

/// Header field types
pub use crate::image::{
    DllCharacteristics, FileCharacteristics, Machine, ModuleFlags, OptionalHeaderKind, Subsystem,
    Token,
};

// ================================================================================================
// Comparison
// ================================================================================================

/// Logical equality of snapshots
pub use crate::comparer::{image_comparer, EqualityComparer};

// ================================================================================================
// Writing Configuration
// ================================================================================================

/// Writing options and their extraction from an image
pub use crate::writing::{
    extract_writing_options, CliHeaderOptions, CliOptions, DebugDirective, DebugOptions,
    MetadataRootOptions, PeOptions, TableStreamOptions, WritingOptions,
};
