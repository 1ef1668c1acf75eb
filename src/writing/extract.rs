use tracing::debug;

use crate::{
    image::{
        CliHeader, DebugInformation, FileHeader, ImageInformation, MetadataRoot, OptionalHeader,
        TableStreamHeader,
    },
    writing::options::{
        CliHeaderOptions, CliOptions, DebugOptions, MetadataRootOptions, PeOptions,
        TableStreamOptions, WritingOptions,
    },
    Result,
};

/// Derive the options that reproduce `image` when written
///
/// Every header field of the image is copied into the matching override. The two import names
/// of the native bootstrap thunk are not part of the image model and stay unset. Debug options
/// are present exactly when the image has debug information.
///
/// # Errors
/// Returns [`crate::Error::InvalidInput`] if `image` is `None` or one of its mandatory parts (PE
/// and CLI information with all their headers) is missing. No partial result is produced.
///
/// # Examples
///
/// ```rust,no_run
/// use cilimage::{extract_writing_options, ImageInformation};
/// use std::path::Path;
///
/// let image = ImageInformation::from_file(Path::new("tests/samples/app.exe"))?;
/// let options = extract_writing_options(Some(&image))?;
/// assert_eq!(options.is_executable, !image.is_dll());
/// # Ok::<(), cilimage::Error>(())
/// ```
pub fn extract_writing_options(image: Option<&ImageInformation>) -> Result<WritingOptions> {
    let Some(image) = image else {
        return Err(invalid_input!("No image to extract writing options from"));
    };

    let pe = image
        .pe
        .as_ref()
        .ok_or_else(|| invalid_input!("Image has no PE information"))?;
    if pe.dos_header.is_none() {
        return Err(invalid_input!("Image has no DOS header"));
    }
    let nt_header = pe
        .nt_header
        .as_ref()
        .ok_or_else(|| invalid_input!("Image has no NT header"))?;
    let file_header = nt_header
        .file_header
        .as_ref()
        .ok_or_else(|| invalid_input!("Image has no file header"))?;
    let optional_header = nt_header
        .optional_header
        .as_ref()
        .ok_or_else(|| invalid_input!("Image has no optional header"))?;

    let cli = image
        .cli
        .as_ref()
        .ok_or_else(|| invalid_input!("Image has no CLI information"))?;
    let cli_header = cli
        .cli_header
        .as_ref()
        .ok_or_else(|| invalid_input!("Image has no CLI header"))?;
    let metadata_root = cli
        .metadata_root
        .as_ref()
        .ok_or_else(|| invalid_input!("Image has no metadata root"))?;
    let table_stream_header = cli
        .table_stream_header
        .as_ref()
        .ok_or_else(|| invalid_input!("Image has no table stream header"))?;

    debug!("native bootstrap import names are not derivable and stay unset");

    Ok(WritingOptions::with_parts(
        !file_header.is_dll(),
        Some(pe_options(file_header, optional_header)),
        Some(CliOptions::new(
            Some(cli_header_options(cli_header)),
            Some(metadata_root_options(metadata_root)),
            Some(table_stream_options(table_stream_header)),
        )),
        image.debug.as_ref().map(debug_options),
    ))
}

fn pe_options(file_header: &FileHeader, optional_header: &OptionalHeader) -> PeOptions {
    PeOptions {
        machine: Some(file_header.machine),
        time_date_stamp: Some(file_header.time_date_stamp),
        characteristics: Some(file_header.characteristics),
        major_linker_version: Some(optional_header.major_linker_version),
        minor_linker_version: Some(optional_header.minor_linker_version),
        image_base: Some(optional_header.image_base),
        section_alignment: Some(optional_header.section_alignment),
        file_alignment: Some(optional_header.file_alignment),
        major_os_version: Some(optional_header.major_os_version),
        minor_os_version: Some(optional_header.minor_os_version),
        major_user_version: Some(optional_header.major_user_version),
        minor_user_version: Some(optional_header.minor_user_version),
        major_subsystem_version: Some(optional_header.major_subsystem_version),
        minor_subsystem_version: Some(optional_header.minor_subsystem_version),
        win32_version_value: Some(optional_header.win32_version_value),
        subsystem: Some(optional_header.subsystem),
        dll_characteristics: Some(optional_header.dll_characteristics),
        stack_reserve_size: Some(optional_header.stack_reserve_size),
        stack_commit_size: Some(optional_header.stack_commit_size),
        heap_reserve_size: Some(optional_header.heap_reserve_size),
        heap_commit_size: Some(optional_header.heap_commit_size),
        loader_flags: Some(optional_header.loader_flags),
        number_of_data_directories: Some(optional_header.number_of_data_directories),
        import_directory_name: None,
        import_hint_name: None,
    }
}

fn cli_header_options(cli_header: &CliHeader) -> CliHeaderOptions {
    CliHeaderOptions {
        major_runtime_version: Some(cli_header.major_runtime_version),
        minor_runtime_version: Some(cli_header.minor_runtime_version),
        flags: Some(cli_header.flags),
        entry_point: Some(cli_header.entry_point),
    }
}

fn metadata_root_options(root: &MetadataRoot) -> MetadataRootOptions {
    MetadataRootOptions {
        signature: Some(root.signature),
        major_version: Some(root.major_version),
        minor_version: Some(root.minor_version),
        reserved: Some(root.reserved),
        reserved2: Some(root.reserved2),
        version_string: Some(root.version_string()),
        storage_flags: Some(root.storage_flags),
    }
}

fn table_stream_options(header: &TableStreamHeader) -> TableStreamOptions {
    TableStreamOptions {
        reserved: Some(header.reserved),
        reserved2: Some(header.reserved2),
        major_version: Some(header.major_version),
        minor_version: Some(header.minor_version),
        extra_data: header.extra_data,
        present_tables: Some(header.present_tables),
        sorted_tables: Some(header.sorted_tables),
    }
}

fn debug_options(debug: &DebugInformation) -> DebugOptions {
    DebugOptions {
        characteristics: Some(debug.characteristics),
        time_date_stamp: Some(debug.time_date_stamp),
        major_version: Some(debug.major_version),
        minor_version: Some(debug.minor_version),
        debug_type: Some(debug.debug_type),
        data: Some(debug.data.clone()),
    }
}

impl TryFrom<&ImageInformation> for WritingOptions {
    type Error = crate::Error;

    fn try_from(image: &ImageInformation) -> Result<Self> {
        extract_writing_options(Some(image))
    }
}

impl ImageInformation {
    /// The options that reproduce this image, see [`extract_writing_options`]
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidInput`] if a mandatory part of the image is missing.
    pub fn writing_options(&self) -> Result<WritingOptions> {
        extract_writing_options(Some(self))
    }
}
