//! In-place header patching.
//!
//! [`WritingOptions::apply`] writes every set override into a copy of an existing image, at the
//! offsets found by the header reader. Nothing is moved: an override that would need a different
//! layout (a longer version string, a new table, a differently sized debug payload) is refused
//! with [`crate::Error::RequiresRelayout`].

use tracing::{debug, trace};

use crate::{
    file::{
        io::{read_le_at, write_le_at, CilIO},
        File,
    },
    image::{decode_version, FileCharacteristics, HeaderLocations, OptionalHeaderLayout as L},
    writing::options::{DebugDirective, WritingOptions},
    Error::RequiresRelayout,
    Result,
};

struct Patcher<'a> {
    data: &'a mut [u8],
}

impl Patcher<'_> {
    fn put<T: CilIO>(&mut self, offset: usize, value: Option<T>) -> Result<()> {
        if let Some(value) = value {
            let mut cursor = offset;
            write_le_at(self.data, &mut cursor, value)?;
        }

        Ok(())
    }

    fn put_address(&mut self, wide: bool, offset: usize, value: Option<u64>) -> Result<()> {
        match value {
            Some(value) if wide => self.put(offset, Some(value)),
            Some(value) => {
                let narrow = u32::try_from(value).map_err(|_| {
                    malformed_error!("Value 0x{:X} does not fit a PE32 optional header", value)
                })?;
                self.put(offset, Some(narrow))
            }
            None => Ok(()),
        }
    }

    fn get<T: CilIO>(&self, offset: usize) -> Result<T> {
        let mut cursor = offset;
        read_le_at(self.data, &mut cursor)
    }
}

impl WritingOptions {
    /// Write the set overrides into a copy of `image`
    ///
    /// Unset overrides keep the bytes of `image`. When `characteristics` is unset, the DLL bit is
    /// set or cleared to match [`WritingOptions::is_executable`]. The import names of the native
    /// bootstrap thunk are not used.
    ///
    /// # Errors
    /// - [`crate::Error::RequiresRelayout`] if an override does not fit the existing layout
    /// - [`crate::Error::Malformed`] if a 64-bit value does not fit a PE32 image, or `image` is not
    ///   a readable managed image
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use cilimage::ImageInformation;
    ///
    /// let bytes = std::fs::read("tests/samples/app.exe")?;
    /// let image = ImageInformation::from_mem(bytes.clone())?;
    ///
    /// let mut options = image.writing_options()?;
    /// options.pe.major_linker_version = Some(48);
    /// let patched = options.apply(&bytes)?;
    ///
    /// let reread = ImageInformation::from_mem(patched)?;
    /// assert_eq!(reread.optional_header().map(|h| h.major_linker_version), Some(48));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn apply(&self, image: &[u8]) -> Result<Vec<u8>> {
        let locations = {
            let file = File::from_mem(image.to_vec())?;
            HeaderLocations::locate(&file)?
        };

        let mut output = image.to_vec();
        let mut patcher = Patcher { data: &mut output };

        self.patch_pe(&mut patcher, &locations)?;
        self.patch_cli(&mut patcher, &locations)?;
        self.patch_debug(&mut patcher, &locations)?;

        if self.pe.has_native_thunk_names() {
            debug!("native bootstrap import names are ignored by the header patcher");
        }

        Ok(output)
    }

    fn patch_pe(&self, patcher: &mut Patcher, locations: &HeaderLocations) -> Result<()> {
        let pe = &self.pe;
        let coff = locations.file_header;

        patcher.put(coff, pe.machine.map(|machine| machine.code()))?;
        patcher.put(coff + 4, pe.time_date_stamp)?;

        let characteristics = match pe.characteristics {
            Some(characteristics) => {
                if characteristics.contains(FileCharacteristics::DLL) == self.is_executable {
                    debug!(
                        is_executable = self.is_executable,
                        "characteristics override the DLL bit requested by is_executable"
                    );
                }
                characteristics
            }
            None => {
                let mut existing =
                    FileCharacteristics::from_bits_retain(patcher.get::<u16>(coff + 18)?);
                existing.set(FileCharacteristics::DLL, !self.is_executable);
                existing
            }
        };
        patcher.put(coff + 18, Some(characteristics.bits()))?;
        trace!(offset = coff, "patched file header");

        let base = locations.optional_header;
        let layout = locations.layout;
        let wide = layout.is_wide();

        patcher.put(base + L::MAJOR_LINKER_VERSION, pe.major_linker_version)?;
        patcher.put(base + L::MINOR_LINKER_VERSION, pe.minor_linker_version)?;
        patcher.put_address(wide, base + layout.image_base, pe.image_base)?;
        patcher.put(base + L::SECTION_ALIGNMENT, pe.section_alignment)?;
        patcher.put(base + L::FILE_ALIGNMENT, pe.file_alignment)?;
        patcher.put(base + L::MAJOR_OS_VERSION, pe.major_os_version)?;
        patcher.put(base + L::MINOR_OS_VERSION, pe.minor_os_version)?;
        patcher.put(base + L::MAJOR_USER_VERSION, pe.major_user_version)?;
        patcher.put(base + L::MINOR_USER_VERSION, pe.minor_user_version)?;
        patcher.put(base + L::MAJOR_SUBSYSTEM_VERSION, pe.major_subsystem_version)?;
        patcher.put(base + L::MINOR_SUBSYSTEM_VERSION, pe.minor_subsystem_version)?;
        patcher.put(base + L::WIN32_VERSION_VALUE, pe.win32_version_value)?;
        patcher.put(base + L::SUBSYSTEM, pe.subsystem.map(|subsystem| subsystem.code()))?;
        patcher.put(
            base + L::DLL_CHARACTERISTICS,
            pe.dll_characteristics.map(|flags| flags.bits()),
        )?;
        patcher.put_address(wide, base + layout.stack_reserve_size, pe.stack_reserve_size)?;
        patcher.put_address(wide, base + layout.stack_commit_size, pe.stack_commit_size)?;
        patcher.put_address(wide, base + layout.heap_reserve_size, pe.heap_reserve_size)?;
        patcher.put_address(wide, base + layout.heap_commit_size, pe.heap_commit_size)?;
        patcher.put(base + layout.loader_flags, pe.loader_flags)?;
        patcher.put(
            base + layout.number_of_data_directories,
            pe.number_of_data_directories,
        )?;
        trace!(offset = base, kind = %layout.kind, "patched optional header");

        Ok(())
    }

    fn patch_cli(&self, patcher: &mut Patcher, locations: &HeaderLocations) -> Result<()> {
        let header = &self.cli.header;
        let cli = locations.cli_header;

        patcher.put(cli + 4, header.major_runtime_version)?;
        patcher.put(cli + 6, header.minor_runtime_version)?;
        patcher.put(cli + 16, header.flags.map(|flags| flags.bits()))?;
        patcher.put(cli + 20, header.entry_point.map(u32::from))?;
        trace!(offset = cli, "patched CLI header");

        let root = &self.cli.metadata_root;
        let offset = locations.metadata_root;

        patcher.put(offset, root.signature)?;
        patcher.put(offset + 4, root.major_version)?;
        patcher.put(offset + 6, root.minor_version)?;
        patcher.put(offset + 8, root.reserved)?;
        if let Some(version) = &root.version_string {
            let slot_start = locations.version_slot();
            let Some(slot) = patcher
                .data
                .get_mut(slot_start..slot_start + locations.version_length)
            else {
                return Err(crate::Error::OutOfBounds);
            };

            // An unchanged version keeps the slot, padding included
            if decode_version(slot) != *version {
                let bytes = version.as_bytes();
                if bytes.len() >= slot.len() {
                    return Err(RequiresRelayout(
                        "version string does not fit the existing metadata root",
                    ));
                }

                slot.fill(0);
                slot[..bytes.len()].copy_from_slice(bytes);
            }
        }
        patcher.put(locations.storage_flags(), root.storage_flags)?;
        patcher.put(locations.storage_flags() + 1, root.reserved2)?;
        trace!(offset, "patched metadata root");

        let tables = &self.cli.table_stream;
        let (offset, _) = locations.tables_stream;

        if let Some(present_tables) = tables.present_tables {
            if present_tables != patcher.get::<u64>(offset + 8)? {
                return Err(RequiresRelayout(
                    "present tables differ from the existing table stream",
                ));
            }
        }
        if tables.extra_data.is_some() && locations.extra_data.is_none() {
            return Err(RequiresRelayout(
                "extra data requires a slot the table stream does not have",
            ));
        }

        patcher.put(offset, tables.reserved)?;
        patcher.put(offset + 4, tables.major_version)?;
        patcher.put(offset + 5, tables.minor_version)?;
        patcher.put(offset + 7, tables.reserved2)?;
        patcher.put(offset + 16, tables.sorted_tables)?;
        if let Some(extra_data) = locations.extra_data {
            patcher.put(extra_data, tables.extra_data)?;
        }
        trace!(offset, "patched table stream header");

        Ok(())
    }

    fn patch_debug(&self, patcher: &mut Patcher, locations: &HeaderLocations) -> Result<()> {
        let debug = match self.debug_directive() {
            DebugDirective::Omit => {
                if locations.debug_entry.is_some() {
                    patcher.put(locations.debug_data_directory, Some(0_u64))?;
                    trace!(
                        offset = locations.debug_data_directory,
                        "removed debug directory"
                    );
                }
                return Ok(());
            }
            DebugDirective::Emit(debug) => debug,
            DebugDirective::PayloadUnset(debug) => {
                debug!("debug options without payload, keeping the existing payload");
                debug
            }
        };

        let (Some(entry), Some((payload_offset, payload_size))) =
            (locations.debug_entry, locations.debug_data)
        else {
            return Err(RequiresRelayout("image has no debug directory to patch"));
        };

        if let Some(data) = &debug.data {
            if data.len() != payload_size {
                return Err(RequiresRelayout(
                    "debug payload size differs from the existing payload",
                ));
            }

            let Some(payload) = patcher
                .data
                .get_mut(payload_offset..payload_offset + payload_size)
            else {
                return Err(crate::Error::OutOfBounds);
            };
            payload.copy_from_slice(data);
        }

        patcher.put(entry, debug.characteristics)?;
        patcher.put(entry + 4, debug.time_date_stamp)?;
        patcher.put(entry + 8, debug.major_version)?;
        patcher.put(entry + 10, debug.minor_version)?;
        patcher.put(entry + 12, debug.debug_type)?;
        trace!(offset = entry, "patched debug directory");

        Ok(())
    }
}
