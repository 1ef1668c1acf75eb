//! Access to the raw bytes of a PE image and its goblin-parsed container headers.
//!
//! [`File`] owns the image bytes (either in memory or memory-mapped from disk) together with the
//! [`goblin::pe::PE`] view borrowed from them. It only accepts images that carry an optional
//! header and a CLR runtime header directory, i.e. managed images.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilimage::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("tests/samples/app.exe"))?;
//! let (clr_rva, clr_size) = file.clr();
//! println!("CLI header at RVA {:#x} ({} bytes)", clr_rva, clr_size);
//! # Ok::<(), cilimage::Error>(())
//! ```

pub mod io;
pub mod parser;

mod backend;

use std::path::Path;

use goblin::pe::{
    header::{DosHeader, Header},
    optional_header::OptionalHeader,
    section_table::SectionTable,
    PE,
};
use ouroboros::self_referencing;

use crate::{
    Error::{Empty, GoblinErr},
    Result,
};
use backend::{Backend, Memory, Physical};

/// A loaded PE image: the raw bytes plus the goblin view over them.
#[self_referencing]
pub struct File {
    data: Box<dyn Backend>,
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Memory-map and load the image at `file`
    ///
    /// # Errors
    /// Returns an error if the file can not be read, is empty, is not a PE image, or is not a
    /// managed image.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    /// Load an image from an owned buffer
    ///
    /// # Errors
    /// Returns an error if `data` is empty, is not a PE image, or is not a managed image.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        let input = Memory::new(data);

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let data = Box::new(data);

        File::try_new(data, |data| match PE::parse(data.data()) {
            Ok(pe) => match pe.header.optional_header.as_ref().map(clr_directory) {
                Some(Some(_)) => Ok(pe),
                Some(None) => Err(malformed_error!(
                    "File does not have a CLR runtime header directory"
                )),
                None => Err(malformed_error!("File does not have an OptionalHeader")),
            },
            Err(error) => Err(GoblinErr(error)),
        })
    }

    /// Length of the image in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Returns true if the image has no bytes (never the case for a loaded [`File`])
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw image bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// Borrow `len` bytes at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range leaves the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.with_data(|data| data.data_slice(offset, len))
    }

    /// The PE header (DOS header, signature, COFF header, optional header)
    #[must_use]
    pub fn header(&self) -> &Header {
        self.with_pe(|pe| &pe.header)
    }

    /// The DOS header
    #[must_use]
    pub fn header_dos(&self) -> &DosHeader {
        self.with_pe(|pe| &pe.header.dos_header)
    }

    /// The optional header; its presence is verified while loading
    #[must_use]
    pub fn header_optional(&self) -> Option<&OptionalHeader> {
        self.with_pe(|pe| pe.header.optional_header.as_ref())
    }

    /// Returns true for PE32+ images
    #[must_use]
    pub fn is_pe32_plus(&self) -> bool {
        self.with_pe(|pe| pe.is_64)
    }

    /// RVA and size of the CLI header
    #[must_use]
    pub fn clr(&self) -> (usize, usize) {
        self.header_optional()
            .and_then(clr_directory)
            .map_or((0, 0), |(rva, size)| (rva as usize, size as usize))
    }

    /// RVA and size of the debug directory, if the image has one
    #[must_use]
    pub fn debug_directory(&self) -> Option<(u32, u32)> {
        let optional_header = self.header_optional()?;
        let directory = if let Some(directory) =
            optional_header.data_directories.get_debug_table()
        {
            (directory.virtual_address, directory.size)
        } else {
            return None;
        };

        if directory.0 == 0 || directory.1 == 0 {
            None
        } else {
            Some(directory)
        }
    }

    /// The section table
    pub fn sections(&self) -> impl Iterator<Item = &SectionTable> {
        self.with_pe(|pe| pe.sections.iter())
    }

    /// Translate an RVA into a file offset through the section table
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no section contains `rva`.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        let rva_u32 =
            u32::try_from(rva).map_err(|_| malformed_error!("RVA too large to fit in u32: {}", rva))?;

        for section in self.sections() {
            let extent = section.virtual_size.max(section.size_of_raw_data);
            let Some(section_max) = section.virtual_address.checked_add(extent) else {
                return Err(malformed_error!(
                    "Section malformed, causing integer overflow - {} + {}",
                    section.virtual_address,
                    extent
                ));
            };

            if section.virtual_address <= rva_u32 && section_max > rva_u32 {
                return Ok((rva - section.virtual_address as usize)
                    + section.pointer_to_raw_data as usize);
            }
        }

        Err(malformed_error!(
            "RVA could not be converted to offset - {}",
            rva
        ))
    }
}

fn clr_directory(optional_header: &OptionalHeader) -> Option<(u32, u32)> {
    let directory = if let Some(directory) =
        optional_header.data_directories.get_clr_runtime_header()
    {
        (directory.virtual_address, directory.size)
    } else {
        return None;
    };

    if directory.0 == 0 || directory.1 == 0 {
        None
    } else {
        Some(directory)
    }
}
