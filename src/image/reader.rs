//! Builds an [`ImageInformation`] snapshot from the bytes of a managed image.
//!
//! [`HeaderLocations`] finds the file offset of every header the crate models; the same offsets
//! are used by the header patcher in [`crate::writing`], so that reading and patching always agree
//! on the layout.

use std::path::Path;

use tracing::debug;

use crate::{
    file::{io::read_le_at, parser::Parser, File},
    image::{
        tables::{TableId, TableInfo},
        CliHeader, CliInformation, DebugInformation, DllCharacteristics, DosHeader,
        FileCharacteristics, FileHeader, ImageInformation, Machine, MetadataRoot, ModuleFlags,
        NtHeader, OptionalHeader, OptionalHeaderKind, PeInformation, Subsystem, TableStreamHeader,
        Token, CIL_HEADER_MAGIC, CLI_HEADER_SIZE, DEBUG_DIRECTORY_SIZE, HEAP_SIZES_EXTRA_DATA,
    },
    Result,
};

/// Size of the COFF file header
const FILE_HEADER_SIZE: usize = 20;
/// Size of one data directory entry
const DATA_DIRECTORY_SIZE: usize = 8;
/// Index of the debug entry in the data directories
const DEBUG_DATA_DIRECTORY: usize = 6;

/// Field offsets of an optional header layout, relative to the start of the optional header.
#[derive(Debug)]
pub(crate) struct OptionalHeaderLayout {
    /// Which layout this is
    pub kind: OptionalHeaderKind,
    /// `ImageBase`, 4 or 8 bytes
    pub image_base: usize,
    /// `SizeOfStackReserve`, 4 or 8 bytes
    pub stack_reserve_size: usize,
    /// `SizeOfStackCommit`, 4 or 8 bytes
    pub stack_commit_size: usize,
    /// `SizeOfHeapReserve`, 4 or 8 bytes
    pub heap_reserve_size: usize,
    /// `SizeOfHeapCommit`, 4 or 8 bytes
    pub heap_commit_size: usize,
    /// `LoaderFlags`
    pub loader_flags: usize,
    /// `NumberOfRvaAndSizes`
    pub number_of_data_directories: usize,
    /// First data directory entry
    pub data_directories: usize,
}

impl OptionalHeaderLayout {
    pub const MAJOR_LINKER_VERSION: usize = 2;
    pub const MINOR_LINKER_VERSION: usize = 3;
    pub const SECTION_ALIGNMENT: usize = 32;
    pub const FILE_ALIGNMENT: usize = 36;
    pub const MAJOR_OS_VERSION: usize = 40;
    pub const MINOR_OS_VERSION: usize = 42;
    pub const MAJOR_USER_VERSION: usize = 44;
    pub const MINOR_USER_VERSION: usize = 46;
    pub const MAJOR_SUBSYSTEM_VERSION: usize = 48;
    pub const MINOR_SUBSYSTEM_VERSION: usize = 50;
    pub const WIN32_VERSION_VALUE: usize = 52;
    pub const SUBSYSTEM: usize = 68;
    pub const DLL_CHARACTERISTICS: usize = 70;

    pub const PE32: OptionalHeaderLayout = OptionalHeaderLayout {
        kind: OptionalHeaderKind::PE32,
        image_base: 28,
        stack_reserve_size: 72,
        stack_commit_size: 76,
        heap_reserve_size: 80,
        heap_commit_size: 84,
        loader_flags: 88,
        number_of_data_directories: 92,
        data_directories: 96,
    };

    pub const PE32_PLUS: OptionalHeaderLayout = OptionalHeaderLayout {
        kind: OptionalHeaderKind::PE32Plus,
        image_base: 24,
        stack_reserve_size: 72,
        stack_commit_size: 80,
        heap_reserve_size: 88,
        heap_commit_size: 96,
        loader_flags: 104,
        number_of_data_directories: 108,
        data_directories: 112,
    };

    /// Returns true if the address-sized fields are 8 bytes wide
    pub fn is_wide(&self) -> bool {
        self.kind == OptionalHeaderKind::PE32Plus
    }
}

/// File offsets of the modelled headers of one image.
#[derive(Debug)]
pub(crate) struct HeaderLocations {
    /// `PE\0\0` signature
    pub nt_header: usize,
    /// COFF file header
    pub file_header: usize,
    /// Optional header
    pub optional_header: usize,
    /// Layout of the optional header
    pub layout: &'static OptionalHeaderLayout,
    /// CLI header
    pub cli_header: usize,
    /// Metadata root
    pub metadata_root: usize,
    /// Length of the version string slot, which starts 16 bytes into the root
    pub version_length: usize,
    /// Offset and size of the `#~` or `#-` stream
    pub tables_stream: (usize, usize),
    /// The 4 bytes of extra data after the row counts, if present
    pub extra_data: Option<usize>,
    /// Debug data directory entry inside the optional header
    pub debug_data_directory: usize,
    /// First debug directory entry
    pub debug_entry: Option<usize>,
    /// Offset and size of the payload of the first debug entry; the size is 0 when the entry
    /// does not locate a payload
    pub debug_data: Option<(usize, usize)>,
}

impl HeaderLocations {
    /// Walk the headers of `file` and record their offsets
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] if a header is missing
    /// or points outside of the image.
    pub fn locate(file: &File) -> Result<HeaderLocations> {
        let data = file.data();

        let nt_header = file.header_dos().pe_pointer as usize;
        let file_header = nt_header + 4;
        let optional_header = file_header + FILE_HEADER_SIZE;
        let layout = if file.is_pe32_plus() {
            &OptionalHeaderLayout::PE32_PLUS
        } else {
            &OptionalHeaderLayout::PE32
        };
        let debug_data_directory =
            optional_header + layout.data_directories + DEBUG_DATA_DIRECTORY * DATA_DIRECTORY_SIZE;

        let (clr_rva, clr_size) = file.clr();
        if clr_size < CLI_HEADER_SIZE {
            return Err(malformed_error!(
                "CLI header directory too small - {} bytes",
                clr_size
            ));
        }

        let cli_header = file.rva_to_offset(clr_rva)?;
        let mut cursor = cli_header + 8;
        let metadata_rva = read_le_at::<u32>(data, &mut cursor)?;
        let metadata_size = read_le_at::<u32>(data, &mut cursor)?;
        let metadata_root = file.rva_to_offset(metadata_rva as usize)?;

        let mut parser = Parser::new(file.data_slice(metadata_root, metadata_size as usize)?);
        let signature = parser.read_le::<u32>()?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "Invalid metadata root signature - 0x{:08X}",
                signature
            ));
        }

        parser.seek(12)?;
        let version_length = parser.read_le::<u32>()? as usize;
        parser.advance_by(version_length)?;
        parser.advance_by(2)?;
        let stream_count = parser.read_le::<u16>()?;

        let mut tables_stream = None;
        for _ in 0..stream_count {
            let offset = parser.read_le::<u32>()? as usize;
            let size = parser.read_le::<u32>()? as usize;
            let name = parser.read_string_utf8()?;
            parser.align(4)?;

            if name == "#~" || name == "#-" {
                tables_stream = Some((metadata_root + offset, size));
            }
        }

        let Some(tables_stream) = tables_stream else {
            return Err(malformed_error!("Metadata has no table stream"));
        };

        let mut cursor = tables_stream.0 + 6;
        let heap_sizes = read_le_at::<u8>(data, &mut cursor)?;
        let extra_data = if heap_sizes & HEAP_SIZES_EXTRA_DATA != 0 {
            let mut cursor = tables_stream.0 + 8;
            let present_tables = read_le_at::<u64>(data, &mut cursor)?;
            Some(tables_stream.0 + 24 + present_tables.count_ones() as usize * 4)
        } else {
            None
        };

        let (debug_entry, debug_data) = match file.debug_directory() {
            Some((debug_rva, debug_size)) => {
                if (debug_size as usize) < DEBUG_DIRECTORY_SIZE {
                    return Err(malformed_error!(
                        "Debug directory too small - {} bytes",
                        debug_size
                    ));
                }

                let entry = file.rva_to_offset(debug_rva as usize)?;
                let mut cursor = entry + 16;
                let size_of_data = read_le_at::<u32>(data, &mut cursor)? as usize;
                let address_of_raw_data = read_le_at::<u32>(data, &mut cursor)?;
                let pointer_to_raw_data = read_le_at::<u32>(data, &mut cursor)? as usize;

                let payload = if pointer_to_raw_data != 0 {
                    (pointer_to_raw_data, size_of_data)
                } else if address_of_raw_data != 0 {
                    (file.rva_to_offset(address_of_raw_data as usize)?, size_of_data)
                } else {
                    if size_of_data != 0 {
                        debug!(
                            size_of_data,
                            "debug entry has a size but no payload location, treating it as empty"
                        );
                    }
                    (0, 0)
                };

                (Some(entry), Some(payload))
            }
            None => (None, None),
        };

        debug!(
            cli_header,
            metadata_root,
            tables_stream = tables_stream.0,
            debug = debug_entry.is_some(),
            "located managed headers"
        );

        Ok(HeaderLocations {
            nt_header,
            file_header,
            optional_header,
            layout,
            cli_header,
            metadata_root,
            version_length,
            tables_stream,
            extra_data,
            debug_data_directory,
            debug_entry,
            debug_data,
        })
    }

    /// Offset of the version string slot
    pub fn version_slot(&self) -> usize {
        self.metadata_root + 16
    }

    /// Offset of the `Flags` field of the metadata root
    pub fn storage_flags(&self) -> usize {
        self.version_slot() + self.version_length
    }
}

impl ImageInformation {
    /// Memory-map the image at `path` and read its headers
    ///
    /// # Errors
    /// Returns an error if the file can not be loaded or its headers are malformed.
    pub fn from_file(path: &Path) -> Result<ImageInformation> {
        let file = File::from_file(path)?;
        Self::read(&file)
    }

    /// Read the headers of an image held in memory
    ///
    /// # Errors
    /// Returns an error if `data` is not a managed image or its headers are malformed.
    pub fn from_mem(data: Vec<u8>) -> Result<ImageInformation> {
        let file = File::from_mem(data)?;
        Self::read(&file)
    }

    /// Read the headers of a loaded image
    ///
    /// # Errors
    /// Returns an error if the headers are malformed or point outside of the image.
    pub fn read(file: &File) -> Result<ImageInformation> {
        let locations = HeaderLocations::locate(file)?;
        let data = file.data();

        let pe = read_pe(file, &locations)?;
        let cli = read_cli(data, &locations)?;
        let debug = match (locations.debug_entry, locations.debug_data) {
            (Some(entry), Some(payload)) => Some(read_debug(file, entry, payload)?),
            _ => None,
        };

        Ok(ImageInformation::new(pe, cli, debug))
    }
}

fn read_pe(file: &File, locations: &HeaderLocations) -> Result<PeInformation> {
    let header = file.header();
    let coff = &header.coff_header;

    let file_header = FileHeader {
        machine: Machine::from(coff.machine),
        time_date_stamp: coff.time_date_stamp,
        characteristics: FileCharacteristics::from_bits_retain(coff.characteristics),
    };

    Ok(PeInformation {
        dos_header: Some(DosHeader {
            signature: header.dos_header.signature,
        }),
        nt_header: Some(NtHeader {
            signature: header.signature,
            file_header: Some(file_header),
            optional_header: Some(read_optional_header(file.data(), locations)?),
        }),
    })
}

fn read_optional_header(data: &[u8], locations: &HeaderLocations) -> Result<OptionalHeader> {
    type L = OptionalHeaderLayout;

    let base = locations.optional_header;
    let layout = locations.layout;

    let u8_at = |offset: usize| -> Result<u8> { read_le_at::<u8>(data, &mut (base + offset)) };
    let u16_at = |offset: usize| -> Result<u16> { read_le_at::<u16>(data, &mut (base + offset)) };
    let u32_at = |offset: usize| -> Result<u32> { read_le_at::<u32>(data, &mut (base + offset)) };
    let address_at = |offset: usize| -> Result<u64> {
        if layout.is_wide() {
            read_le_at::<u64>(data, &mut (base + offset))
        } else {
            Ok(u64::from(read_le_at::<u32>(data, &mut (base + offset))?))
        }
    };

    Ok(OptionalHeader {
        kind: layout.kind,
        major_linker_version: u8_at(L::MAJOR_LINKER_VERSION)?,
        minor_linker_version: u8_at(L::MINOR_LINKER_VERSION)?,
        image_base: address_at(layout.image_base)?,
        section_alignment: u32_at(L::SECTION_ALIGNMENT)?,
        file_alignment: u32_at(L::FILE_ALIGNMENT)?,
        major_os_version: u16_at(L::MAJOR_OS_VERSION)?,
        minor_os_version: u16_at(L::MINOR_OS_VERSION)?,
        major_user_version: u16_at(L::MAJOR_USER_VERSION)?,
        minor_user_version: u16_at(L::MINOR_USER_VERSION)?,
        major_subsystem_version: u16_at(L::MAJOR_SUBSYSTEM_VERSION)?,
        minor_subsystem_version: u16_at(L::MINOR_SUBSYSTEM_VERSION)?,
        win32_version_value: u32_at(L::WIN32_VERSION_VALUE)?,
        subsystem: Subsystem::from(u16_at(L::SUBSYSTEM)?),
        dll_characteristics: DllCharacteristics::from_bits_retain(u16_at(
            L::DLL_CHARACTERISTICS,
        )?),
        stack_reserve_size: address_at(layout.stack_reserve_size)?,
        stack_commit_size: address_at(layout.stack_commit_size)?,
        heap_reserve_size: address_at(layout.heap_reserve_size)?,
        heap_commit_size: address_at(layout.heap_commit_size)?,
        loader_flags: u32_at(layout.loader_flags)?,
        number_of_data_directories: u32_at(layout.number_of_data_directories)?,
    })
}

fn read_cli(data: &[u8], locations: &HeaderLocations) -> Result<CliInformation> {
    let mut cursor = locations.cli_header + 4;
    let major_runtime_version = read_le_at::<u16>(data, &mut cursor)?;
    let minor_runtime_version = read_le_at::<u16>(data, &mut cursor)?;
    cursor += 8;
    let flags = ModuleFlags::from_bits_retain(read_le_at::<u32>(data, &mut cursor)?);
    let entry_point = Token::new(read_le_at::<u32>(data, &mut cursor)?);

    let cli_header = CliHeader {
        major_runtime_version,
        minor_runtime_version,
        flags,
        entry_point,
    };

    let mut cursor = locations.metadata_root;
    let signature = read_le_at::<u32>(data, &mut cursor)?;
    let major_version = read_le_at::<u16>(data, &mut cursor)?;
    let minor_version = read_le_at::<u16>(data, &mut cursor)?;
    let reserved = read_le_at::<u32>(data, &mut cursor)?;
    let version_slot = locations.version_slot();
    let Some(version_string_bytes) =
        data.get(version_slot..version_slot + locations.version_length)
    else {
        return Err(crate::Error::OutOfBounds);
    };

    let mut cursor = locations.storage_flags();
    let metadata_root = MetadataRoot {
        signature,
        major_version,
        minor_version,
        reserved,
        version_string_bytes: version_string_bytes.to_vec(),
        storage_flags: read_le_at::<u8>(data, &mut cursor)?,
        reserved2: read_le_at::<u8>(data, &mut cursor)?,
    };

    let (stream_offset, stream_size) = locations.tables_stream;
    let Some(stream) = data.get(stream_offset..stream_offset + stream_size) else {
        return Err(crate::Error::OutOfBounds);
    };

    let mut parser = Parser::new(stream);
    let reserved = parser.read_le::<u32>()?;
    let major_version = parser.read_le::<u8>()?;
    let minor_version = parser.read_le::<u8>()?;
    let heap_sizes = parser.read_le::<u8>()?;
    let reserved2 = parser.read_le::<u8>()?;
    let present_tables = parser.read_le::<u64>()?;
    let sorted_tables = parser.read_le::<u64>()?;

    let info = TableInfo::read(&mut parser, present_tables, heap_sizes)?;
    let extra_data = if heap_sizes & HEAP_SIZES_EXTRA_DATA != 0 {
        Some(parser.read_le::<u32>()?)
    } else {
        None
    };
    let tables_start = parser.pos();

    let table_stream_header = TableStreamHeader {
        reserved,
        major_version,
        minor_version,
        heap_sizes,
        reserved2,
        extra_data,
        present_tables,
        sorted_tables,
    };

    Ok(CliInformation {
        cli_header: Some(cli_header),
        metadata_root: Some(metadata_root),
        table_stream_header: Some(table_stream_header),
        field_rvas: info.rva_column(stream, tables_start, TableId::FieldRVA)?,
        method_rvas: info.rva_column(stream, tables_start, TableId::MethodDef)?,
    })
}

fn read_debug(file: &File, entry: usize, payload: (usize, usize)) -> Result<DebugInformation> {
    let data = file.data();
    let mut cursor = entry;

    let characteristics = read_le_at::<u32>(data, &mut cursor)?;
    let time_date_stamp = read_le_at::<u32>(data, &mut cursor)?;
    let major_version = read_le_at::<u16>(data, &mut cursor)?;
    let minor_version = read_le_at::<u16>(data, &mut cursor)?;
    let debug_type = read_le_at::<u32>(data, &mut cursor)?;

    let (offset, size) = payload;
    let data = if size == 0 {
        Vec::new()
    } else {
        file.data_slice(offset, size)?.to_vec()
    };

    Ok(DebugInformation {
        characteristics,
        time_date_stamp,
        major_version,
        minor_version,
        debug_type,
        data,
    })
}
