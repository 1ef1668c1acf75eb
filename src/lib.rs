// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
//#![deny(unsafe_code)]
// - 'file/backend.rs' uses mmap to map a file into memory

//! # cilimage
//!
//! Header snapshots of managed (.NET) PE images, logical comparison of those snapshots, and the
//! configuration model a writer uses to emit them again.
//!
//! ## Features
//!
//! - **Image data model** - DOS, NT, COFF and optional headers, CLI header, metadata root,
//!   table-stream header and the first debug directory entry, as plain owned values
//! - **Logical equality** - a process-wide comparer that decides whether two snapshots describe
//!   the same image, with a coarse but consistent hash
//! - **Writing options** - every writable header field as an independent override, unset by
//!   default
//! - **Extraction** - derive options that reproduce an existing image
//! - **Header patching** - apply options to an existing image without moving anything
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilimage::prelude::*;
//!
//! let bytes = std::fs::read("tests/samples/app.exe")?;
//! let image = ImageInformation::from_mem(bytes.clone())?;
//!
//! // Baseline options reproduce the image byte for byte
//! let mut options = extract_writing_options(Some(&image))?;
//! assert_eq!(options.apply(&bytes)?, bytes);
//!
//! // Change a single field and verify nothing else moved
//! options.pe.major_linker_version = Some(48);
//! let patched = ImageInformation::from_mem(options.apply(&bytes)?)?;
//! assert_ne!(patched, image);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - [`image`] - the data model and the header reader that builds it
//! - [`comparer`] - logical equality and hashing
//! - [`writing`] - writing options, extraction and the header patcher
//! - [`File`] and [`Parser`] - byte access to loaded images
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events at `debug` and `trace` level while locating and patching
//! headers. No subscriber is installed.

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use cilimage::prelude::*;
///
/// let image = ImageInformation::from_file("tests/samples/app.exe".as_ref())?;
/// let options = extract_writing_options(Some(&image))?;
/// # Ok::<(), cilimage::Error>(())
/// ```
pub mod prelude;

pub mod comparer;
pub mod image;
pub mod writing;

/// `cilimage` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilimage` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use cilimage::{Error, ImageInformation, WritingOptions};
///
/// let bytes = std::fs::read("tests/samples/app.exe")?;
/// let mut options = WritingOptions::new(true);
/// options.cli.metadata_root.version_string = Some("v4.0.30319-with-a-long-suffix".into());
///
/// match options.apply(&bytes) {
///     Ok(_) => println!("patched"),
///     Err(Error::RequiresRelayout(reason)) => println!("needs a full writer: {}", reason),
///     Err(e) => println!("Error: {}", e),
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub use error::Error;

pub use comparer::{image_comparer, EqualityComparer, FnComparer};
pub use file::{parser::Parser, File};
pub use image::{
    CliHeader, CliInformation, DebugInformation, DosHeader, FileHeader, ImageInformation, Machine,
    MetadataRoot, NtHeader, OptionalHeader, PeInformation, TableStreamHeader, Token,
};
pub use writing::{
    extract_writing_options, CliHeaderOptions, CliOptions, DebugDirective, DebugOptions,
    MetadataRootOptions, PeOptions, TableStreamOptions, WritingOptions,
};
