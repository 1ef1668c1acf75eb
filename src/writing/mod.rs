//! Writing configuration and its extraction from existing images.
//!
//! [`WritingOptions`] is the single input a writer consumes. Each header field is an independent
//! override: unset means "derive from context", set means "emit verbatim". Starting from an
//! existing image, [`extract_writing_options`] produces options that reproduce it; callers then
//! change the fields they care about and hand the options to a writer, or to
//! [`WritingOptions::apply`] which patches the headers of an existing image in place.
//!
//! # Named conditions
//!
//! Two situations are part of the contract rather than errors:
//! - The import names of the native bootstrap thunk are never recorded in an image, so extraction
//!   leaves them unset ([`PeOptions::has_native_thunk_names`]).
//! - Debug options without a payload are passed through unchanged as
//!   [`DebugDirective::PayloadUnset`]; [`WritingOptions::apply`] keeps the existing payload.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilimage::{ImageInformation, WritingOptions};
//!
//! let bytes = std::fs::read("tests/samples/app.exe")?;
//! let image = ImageInformation::from_mem(bytes.clone())?;
//!
//! let mut options = WritingOptions::try_from(&image)?;
//! options.is_executable = false;
//! options.pe.characteristics = None;
//!
//! let library = ImageInformation::from_mem(options.apply(&bytes)?)?;
//! assert!(library.is_dll());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod extract;
mod options;
mod patch;

pub use extract::extract_writing_options;
pub use options::{
    CliHeaderOptions, CliOptions, DebugDirective, DebugOptions, MetadataRootOptions, PeOptions,
    TableStreamOptions, WritingOptions,
};
