//! Logical equality and hashing of image snapshots.
//!
//! Two [`ImageInformation`] values are logically equal when they describe the same header content,
//! regardless of whether they are the same object or came from the same parse. The comparison walks
//! the whole snapshot field by field with uniform null rules at every level: two absent parts are
//! equal, an absent part never equals a present one.
//!
//! A few things are deliberately left out of the comparison:
//! - the RVA lists of the CLI part are compared by length only, their values are ignored
//! - the present/sorted table bit vectors and the heap size flags of the table-stream header
//!
//! The hash only mixes the machine code and the metadata version string, so it is much coarser than
//! equality. It is still consistent with it: logically equal snapshots always hash the same.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilimage::{comparer::{image_comparer, EqualityComparer}, ImageInformation};
//! use std::path::Path;
//!
//! let image = ImageInformation::from_file(Path::new("tests/samples/app.exe"))?;
//! let comparer = image_comparer();
//!
//! assert!(comparer.equals(Some(&image), Some(&image)));
//! assert!(!comparer.equals(Some(&image), None));
//! assert_eq!(comparer.hash_code(None), 0);
//! # Ok::<(), cilimage::Error>(())
//! ```

use std::{
    hash::{Hash, Hasher},
    ptr,
    sync::OnceLock,
};

use crate::image::{
    CliHeader, CliInformation, DebugInformation, DosHeader, FileHeader, ImageInformation,
    MetadataRoot, NtHeader, OptionalHeader, PeInformation, TableStreamHeader,
};

/// An equality and hash capability over possibly absent values.
pub trait EqualityComparer<T> {
    /// Returns true if `x` and `y` are logically equal
    fn equals(&self, x: Option<&T>, y: Option<&T>) -> bool;

    /// Hash consistent with [`EqualityComparer::equals`]; absent values hash to 0
    fn hash_code(&self, value: Option<&T>) -> i32;
}

/// An [`EqualityComparer`] built from a pair of functions over present values.
///
/// The null rules and the identity shortcut are applied before the functions are called.
pub struct FnComparer<T> {
    equals: fn(&T, &T) -> bool,
    hash: fn(&T) -> i32,
}

impl<T> FnComparer<T> {
    /// Create a comparer from an equality and a hash function
    #[must_use]
    pub const fn new(equals: fn(&T, &T) -> bool, hash: fn(&T) -> i32) -> Self {
        FnComparer { equals, hash }
    }
}

impl<T> EqualityComparer<T> for FnComparer<T> {
    fn equals(&self, x: Option<&T>, y: Option<&T>) -> bool {
        nullable(x, y, |x, y| ptr::eq(x, y) || (self.equals)(x, y))
    }

    fn hash_code(&self, value: Option<&T>) -> i32 {
        value.map_or(0, self.hash)
    }
}

static IMAGE_COMPARER: OnceLock<FnComparer<ImageInformation>> = OnceLock::new();

/// The process-wide comparer for [`ImageInformation`]
///
/// Built on first use. Concurrent first callers may each build one; all but the first are dropped
/// and every caller gets the same instance.
pub fn image_comparer() -> &'static FnComparer<ImageInformation> {
    if let Some(comparer) = IMAGE_COMPARER.get() {
        return comparer;
    }

    let comparer = FnComparer::new(image_equals, image_hash);
    // Dropped if a concurrent caller stored its comparer first
    IMAGE_COMPARER.get_or_init(|| comparer)
}

fn nullable<T>(x: Option<&T>, y: Option<&T>, equals: impl FnOnce(&T, &T) -> bool) -> bool {
    match (x, y) {
        (Some(x), Some(y)) => equals(x, y),
        (None, None) => true,
        _ => false,
    }
}

/// Logical equality of two present snapshots
///
/// Method and field RVA lists only contribute their lengths: two images whose method bodies sit
/// at different addresses still compare equal. The table bit-vectors and `heap_sizes` of the
/// table-stream header are not compared.
#[must_use]
pub fn image_equals(x: &ImageInformation, y: &ImageInformation) -> bool {
    nullable(x.pe.as_ref(), y.pe.as_ref(), pe_equals)
        && nullable(x.cli.as_ref(), y.cli.as_ref(), cli_equals)
        && nullable(x.debug.as_ref(), y.debug.as_ref(), debug_equals)
}

/// Hash of a present snapshot, mixing the machine code and the metadata version string
#[must_use]
pub fn image_hash(image: &ImageInformation) -> i32 {
    let machine = image.machine().map_or(0, |machine| i32::from(machine.code()));
    let version = image
        .metadata_root()
        .map_or(0, |root| sequence_hash(&root.version_string_bytes));

    17_i32
        .wrapping_mul(23)
        .wrapping_add(machine)
        .wrapping_mul(23)
        .wrapping_add(version)
}

fn sequence_hash(bytes: &[u8]) -> i32 {
    bytes.iter().fold(17_i32, |hash, byte| {
        hash.wrapping_mul(31).wrapping_add(i32::from(*byte))
    })
}

fn pe_equals(x: &PeInformation, y: &PeInformation) -> bool {
    nullable(x.dos_header.as_ref(), y.dos_header.as_ref(), dos_equals)
        && nullable(x.nt_header.as_ref(), y.nt_header.as_ref(), nt_equals)
}

fn dos_equals(x: &DosHeader, y: &DosHeader) -> bool {
    x.signature == y.signature
}

fn nt_equals(x: &NtHeader, y: &NtHeader) -> bool {
    x.signature == y.signature
        && nullable(
            x.file_header.as_ref(),
            y.file_header.as_ref(),
            file_header_equals,
        )
        && nullable(
            x.optional_header.as_ref(),
            y.optional_header.as_ref(),
            optional_header_equals,
        )
}

fn file_header_equals(x: &FileHeader, y: &FileHeader) -> bool {
    x.machine == y.machine
        && x.time_date_stamp == y.time_date_stamp
        && x.characteristics == y.characteristics
}

fn optional_header_equals(x: &OptionalHeader, y: &OptionalHeader) -> bool {
    x.kind == y.kind
        && x.major_linker_version == y.major_linker_version
        && x.minor_linker_version == y.minor_linker_version
        && x.image_base == y.image_base
        && x.section_alignment == y.section_alignment
        && x.file_alignment == y.file_alignment
        && x.major_os_version == y.major_os_version
        && x.minor_os_version == y.minor_os_version
        && x.major_user_version == y.major_user_version
        && x.minor_user_version == y.minor_user_version
        && x.major_subsystem_version == y.major_subsystem_version
        && x.minor_subsystem_version == y.minor_subsystem_version
        && x.win32_version_value == y.win32_version_value
        && x.subsystem == y.subsystem
        && x.dll_characteristics == y.dll_characteristics
        && x.stack_reserve_size == y.stack_reserve_size
        && x.stack_commit_size == y.stack_commit_size
        && x.heap_reserve_size == y.heap_reserve_size
        && x.heap_commit_size == y.heap_commit_size
        && x.loader_flags == y.loader_flags
        && x.number_of_data_directories == y.number_of_data_directories
}

fn cli_equals(x: &CliInformation, y: &CliInformation) -> bool {
    // Counts only, RVA values are not compared
    x.field_rvas.len() == y.field_rvas.len()
        && x.method_rvas.len() == y.method_rvas.len()
        && nullable(
            x.cli_header.as_ref(),
            y.cli_header.as_ref(),
            cli_header_equals,
        )
        && nullable(
            x.metadata_root.as_ref(),
            y.metadata_root.as_ref(),
            metadata_root_equals,
        )
        && nullable(
            x.table_stream_header.as_ref(),
            y.table_stream_header.as_ref(),
            table_stream_equals,
        )
}

fn cli_header_equals(x: &CliHeader, y: &CliHeader) -> bool {
    x.major_runtime_version == y.major_runtime_version
        && x.minor_runtime_version == y.minor_runtime_version
        && x.flags == y.flags
        && x.entry_point == y.entry_point
}

fn metadata_root_equals(x: &MetadataRoot, y: &MetadataRoot) -> bool {
    x.signature == y.signature
        && x.major_version == y.major_version
        && x.minor_version == y.minor_version
        && x.reserved == y.reserved
        && x.reserved2 == y.reserved2
        && x.version_string_bytes == y.version_string_bytes
        && x.storage_flags == y.storage_flags
}

fn table_stream_equals(x: &TableStreamHeader, y: &TableStreamHeader) -> bool {
    x.reserved == y.reserved
        && x.reserved2 == y.reserved2
        && x.major_version == y.major_version
        && x.minor_version == y.minor_version
        && x.extra_data == y.extra_data
}

fn debug_equals(x: &DebugInformation, y: &DebugInformation) -> bool {
    x.characteristics == y.characteristics
        && x.time_date_stamp == y.time_date_stamp
        && x.major_version == y.major_version
        && x.minor_version == y.minor_version
        && x.debug_type == y.debug_type
        && x.data == y.data
}

impl PartialEq for ImageInformation {
    fn eq(&self, other: &Self) -> bool {
        image_comparer().equals(Some(self), Some(other))
    }
}

impl Eq for ImageInformation {}

impl Hash for ImageInformation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(image_comparer().hash_code(Some(self)));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{image::Machine, test::ImageFixture};

    fn fixture_image() -> ImageInformation {
        ImageInformation::from_mem(ImageFixture::default().build()).unwrap()
    }

    #[test]
    fn reflexive() {
        let comparer = image_comparer();
        let image = fixture_image();

        assert!(comparer.equals(Some(&image), Some(&image)));
        assert!(comparer.equals(None, None));
        assert!(!comparer.equals(Some(&image), None));
        assert!(!comparer.equals(None, Some(&image)));
    }

    #[test]
    fn clones_are_equal() {
        let image = fixture_image();
        let copy = image.clone();

        assert_eq!(image, copy);
        assert_eq!(
            image_comparer().hash_code(Some(&image)),
            image_comparer().hash_code(Some(&copy))
        );
    }

    #[test]
    fn hash_of_absent_is_zero() {
        assert_eq!(image_comparer().hash_code(None), 0);
    }

    #[test]
    fn hash_formula() {
        let mut image = fixture_image();
        image.cli = None;
        let machine = i32::from(Machine::I386.code());
        assert_eq!(image_hash(&image), (17 * 23 + machine) * 23);

        image.pe = None;
        assert_eq!(image_hash(&image), 17 * 23 * 23);

        let image = fixture_image();
        let version = sequence_hash(b"v4.0.30319\0\0");
        assert_eq!(
            image_hash(&image),
            (17 * 23 + machine).wrapping_mul(23).wrapping_add(version)
        );
    }

    #[test]
    fn rva_values_are_ignored() {
        let image = fixture_image();
        let mut moved = image.clone();
        let cli = moved.cli.as_mut().unwrap();
        for rva in cli.method_rvas.iter_mut().chain(cli.field_rvas.iter_mut()) {
            *rva = rva.wrapping_add(0x1000);
        }

        assert_eq!(image, moved);
    }

    #[test]
    fn rva_counts_are_compared() {
        let image = fixture_image();

        let mut fewer = image.clone();
        fewer.cli.as_mut().unwrap().method_rvas.pop();
        assert_ne!(image, fewer);

        let mut more = image.clone();
        more.cli.as_mut().unwrap().field_rvas.push(0x4000);
        assert_ne!(image, more);
    }

    #[test]
    fn nested_null_mismatch() {
        let image = fixture_image();

        let mut no_debug = image.clone();
        no_debug.debug = None;
        assert_ne!(image, no_debug);

        let mut no_optional = image.clone();
        no_optional
            .pe
            .as_mut()
            .unwrap()
            .nt_header
            .as_mut()
            .unwrap()
            .optional_header = None;
        assert_ne!(image, no_optional);
        assert_ne!(no_optional, image);

        let mut also_no_optional = no_optional.clone();
        also_no_optional.pe.as_mut().unwrap().dos_header = None;
        assert_ne!(no_optional, also_no_optional);

        let mut no_root = image.clone();
        no_root.cli.as_mut().unwrap().metadata_root = None;
        let mut also_no_root = image.clone();
        also_no_root.cli.as_mut().unwrap().metadata_root = None;
        assert_eq!(no_root, also_no_root);
    }

    #[test]
    fn scalar_differences() {
        let image = fixture_image();

        let mut linker = image.clone();
        linker
            .pe
            .as_mut()
            .unwrap()
            .nt_header
            .as_mut()
            .unwrap()
            .optional_header
            .as_mut()
            .unwrap()
            .major_linker_version += 1;
        assert_ne!(image, linker);

        let mut runtime = image.clone();
        runtime
            .cli
            .as_mut()
            .unwrap()
            .cli_header
            .as_mut()
            .unwrap()
            .minor_runtime_version = 4;
        assert_ne!(image, runtime);

        let mut payload = image.clone();
        payload.debug.as_mut().unwrap().data[4] ^= 0xFF;
        assert_ne!(image, payload);
    }

    #[test]
    fn version_bytes_are_exact() {
        let image = fixture_image();
        let mut padded = image.clone();
        padded
            .cli
            .as_mut()
            .unwrap()
            .metadata_root
            .as_mut()
            .unwrap()
            .version_string_bytes
            .extend_from_slice(&[0, 0, 0, 0]);

        assert_eq!(
            padded.metadata_root().unwrap().version_string(),
            image.metadata_root().unwrap().version_string()
        );
        assert_ne!(image, padded);
    }

    #[test]
    fn extra_data_is_null_aware() {
        let image = fixture_image();
        let set_extra = |value: Option<u32>| {
            let mut copy = image.clone();
            copy.cli
                .as_mut()
                .unwrap()
                .table_stream_header
                .as_mut()
                .unwrap()
                .extra_data = value;
            copy
        };

        assert_eq!(set_extra(None), set_extra(None));
        assert_eq!(set_extra(Some(7)), set_extra(Some(7)));
        assert_ne!(set_extra(Some(7)), set_extra(None));
        assert_ne!(set_extra(Some(7)), set_extra(Some(8)));
    }

    #[test]
    fn table_bit_vectors_are_ignored() {
        let image = fixture_image();
        let mut copy = image.clone();
        let header = copy
            .cli
            .as_mut()
            .unwrap()
            .table_stream_header
            .as_mut()
            .unwrap();
        header.sorted_tables ^= 0x1;
        header.present_tables |= 1 << 0x20;
        header.heap_sizes = 0x07;

        assert_eq!(image, copy);
    }

    #[test]
    fn singleton() {
        let first = image_comparer();
        let second = image_comparer();
        assert!(ptr::eq(first, second));

        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| image_comparer() as *const _ as usize))
            .collect();
        let addresses: HashSet<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(addresses.len(), 1);
    }

    #[test]
    fn hash_set_deduplicates() {
        let image = fixture_image();
        let reparsed = fixture_image();

        let other = ImageInformation::from_mem(
            ImageFixture {
                major_linker_version: 80,
                ..ImageFixture::default()
            }
            .build(),
        )
        .unwrap();

        let set: HashSet<ImageInformation> = [image, reparsed, other].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn custom_comparer() {
        let comparer: FnComparer<u32> = FnComparer::new(|x, y| x % 10 == y % 10, |x| (x % 10) as i32);
        assert!(comparer.equals(Some(&3), Some(&13)));
        assert!(!comparer.equals(Some(&3), Some(&4)));
        assert!(!comparer.equals(None, Some(&4)));
        assert_eq!(comparer.hash_code(Some(&13)), 3);
    }
}
