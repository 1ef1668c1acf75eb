//! Read, extract, patch and re-read synthetic images.

use crate::{
    image::{ImageInformation, OptionalHeaderKind},
    test::ImageFixture,
    writing::{DebugOptions, WritingOptions},
    Error,
};

fn roundtrip(fixture: &ImageFixture) {
    let bytes = fixture.build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();

    let options = image.writing_options().unwrap();
    let written = options.apply(&bytes).unwrap();
    assert_eq!(written, bytes);

    let reread = ImageInformation::from_mem(written).unwrap();
    assert_eq!(reread, image);
}

#[test]
fn roundtrip_default() {
    roundtrip(&ImageFixture::default());
}

#[test]
fn roundtrip_variants() {
    roundtrip(&ImageFixture {
        pe32_plus: true,
        image_base: 0x1_8000_0000,
        ..ImageFixture::default()
    });
    roundtrip(&ImageFixture {
        dll: true,
        ..ImageFixture::default()
    });
    roundtrip(&ImageFixture {
        debug: None,
        ..ImageFixture::default()
    });
    roundtrip(&ImageFixture {
        extra_data: Some(0xDEAD_BEEF),
        uncompressed_tables: true,
        ..ImageFixture::default()
    });
    roundtrip(&ImageFixture {
        version: b"v4.0.30319\0\x01".to_vec(),
        ..ImageFixture::default()
    });
    roundtrip(&ImageFixture {
        version: b"v4.0.30319.1".to_vec(),
        ..ImageFixture::default()
    });
    roundtrip(&ImageFixture {
        method_rvas: Vec::new(),
        field_rvas: Vec::new(),
        ..ImageFixture::default()
    });
}

#[test]
fn selective_override() {
    let bytes = ImageFixture::default().build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();

    let mut options = image.writing_options().unwrap();
    options.pe.major_linker_version = Some(49);
    let written = options.apply(&bytes).unwrap();

    let changed: Vec<usize> = (0..bytes.len())
        .filter(|offset| bytes[*offset] != written[*offset])
        .collect();
    assert_eq!(changed, vec![ImageFixture::NT_OFFSET + 24 + 2]);

    let reread = ImageInformation::from_mem(written).unwrap();
    assert_ne!(reread, image);

    let mut expected = image.clone();
    expected
        .pe
        .as_mut()
        .unwrap()
        .nt_header
        .as_mut()
        .unwrap()
        .optional_header
        .as_mut()
        .unwrap()
        .major_linker_version = 49;
    assert_eq!(reread, expected);
}

#[test]
fn unset_options_omit_debug() {
    let bytes = ImageFixture::default().build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();

    let written = WritingOptions::new(true).apply(&bytes).unwrap();
    let reread = ImageInformation::from_mem(written).unwrap();

    assert!(reread.debug.is_none());
    let mut expected = image;
    expected.debug = None;
    assert_eq!(reread, expected);
}

#[test]
fn is_executable_sets_dll_bit() {
    let bytes = ImageFixture::default().build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();
    let characteristics = image.file_header().unwrap().characteristics;

    let mut options = image.writing_options().unwrap();
    options.is_executable = false;
    options.pe.characteristics = None;

    let library_bytes = options.apply(&bytes).unwrap();
    let library = ImageInformation::from_mem(library_bytes.clone()).unwrap();
    assert!(library.is_dll());
    assert_eq!(
        library.file_header().unwrap().characteristics.bits(),
        characteristics.bits() | 0x2000
    );

    let mut options = library.writing_options().unwrap();
    assert!(!options.is_executable);
    options.is_executable = true;
    options.pe.characteristics = None;

    let executable = options.apply(&library_bytes).unwrap();
    assert_eq!(executable, bytes);
}

#[test]
fn shorter_version_string() {
    let bytes = ImageFixture::default().build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();

    let mut options = image.writing_options().unwrap();
    options.cli.metadata_root.version_string = Some("v2.0.50727".to_string());
    let reread = ImageInformation::from_mem(options.apply(&bytes).unwrap()).unwrap();

    let root = reread.metadata_root().unwrap();
    assert_eq!(root.version_string(), "v2.0.50727");
    assert_eq!(root.version_string_bytes, b"v2.0.50727\0\0".to_vec());
}

#[test]
fn changed_version_string_clears_padding() {
    let bytes = ImageFixture {
        version: b"v4.0.30319\0\x01".to_vec(),
        ..ImageFixture::default()
    }
    .build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();

    let mut options = image.writing_options().unwrap();
    options.cli.metadata_root.version_string = Some("v4.0.30320".to_string());
    let reread = ImageInformation::from_mem(options.apply(&bytes).unwrap()).unwrap();

    assert_eq!(
        reread.metadata_root().unwrap().version_string_bytes,
        b"v4.0.30320\0\0".to_vec()
    );
}

#[test]
fn version_string_requires_relayout() {
    let bytes = ImageFixture::default().build();
    let mut options = WritingOptions::new(true);

    // The terminator has to fit as well
    options.cli.metadata_root.version_string = Some("v4.0.30319.1".to_string());
    assert!(matches!(
        options.apply(&bytes),
        Err(Error::RequiresRelayout(_))
    ));
}

#[test]
fn table_stream_requires_relayout() {
    let bytes = ImageFixture::default().build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();

    let mut options = image.writing_options().unwrap();
    options.cli.table_stream.extra_data = Some(1);
    assert!(matches!(
        options.apply(&bytes),
        Err(Error::RequiresRelayout(_))
    ));

    let mut options = image.writing_options().unwrap();
    options.cli.table_stream.present_tables = Some(0x01);
    assert!(matches!(
        options.apply(&bytes),
        Err(Error::RequiresRelayout(_))
    ));

    let mut options = image.writing_options().unwrap();
    options.cli.table_stream.sorted_tables = Some(0);
    options.cli.table_stream.minor_version = Some(1);
    let reread = ImageInformation::from_mem(options.apply(&bytes).unwrap()).unwrap();
    let header = reread.table_stream_header().unwrap();
    assert_eq!(header.sorted_tables, 0);
    assert_eq!(header.minor_version, 1);
}

#[test]
fn extra_data_override() {
    let bytes = ImageFixture {
        extra_data: Some(5),
        ..ImageFixture::default()
    }
    .build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();

    let mut options = image.writing_options().unwrap();
    options.cli.table_stream.extra_data = Some(6);
    let reread = ImageInformation::from_mem(options.apply(&bytes).unwrap()).unwrap();

    assert_eq!(reread.table_stream_header().unwrap().extra_data, Some(6));
    assert_eq!(
        reread.cli.as_ref().unwrap().method_rvas,
        image.cli.as_ref().unwrap().method_rvas
    );
}

#[test]
fn pe32_value_range() {
    let bytes = ImageFixture::default().build();
    let mut options = WritingOptions::new(true);
    options.pe.image_base = Some(0x1_0000_0000);
    assert!(matches!(
        options.apply(&bytes),
        Err(Error::Malformed { .. })
    ));

    let wide = ImageFixture {
        pe32_plus: true,
        ..ImageFixture::default()
    }
    .build();
    let mut options = ImageInformation::from_mem(wide.clone())
        .unwrap()
        .writing_options()
        .unwrap();
    options.pe.image_base = Some(0x1_0000_0000);
    options.pe.heap_reserve_size = Some(0x2_0000_0000);

    let reread = ImageInformation::from_mem(options.apply(&wide).unwrap()).unwrap();
    let optional = reread.optional_header().unwrap();
    assert_eq!(optional.kind, OptionalHeaderKind::PE32Plus);
    assert_eq!(optional.image_base, 0x1_0000_0000);
    assert_eq!(optional.heap_reserve_size, 0x2_0000_0000);
}

#[test]
fn debug_payload_unset_keeps_payload() {
    let bytes = ImageFixture::default().build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();

    let mut options = image.writing_options().unwrap();
    options.debug = Some(DebugOptions {
        time_date_stamp: Some(0x1111_2222),
        ..DebugOptions::default()
    });
    let reread = ImageInformation::from_mem(options.apply(&bytes).unwrap()).unwrap();

    let debug = reread.debug.as_ref().unwrap();
    assert_eq!(debug.time_date_stamp, 0x1111_2222);
    assert_eq!(debug.data, image.debug.as_ref().unwrap().data);
}

#[test]
fn debug_payload_replacement() {
    let bytes = ImageFixture::default().build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();
    let original = image.debug.as_ref().unwrap().data.clone();

    let mut replacement = crate::test::rsds("renamed.pdb");
    assert_eq!(replacement.len(), original.len());

    let mut options = image.writing_options().unwrap();
    options.debug.as_mut().unwrap().data = Some(replacement.clone());
    let reread = ImageInformation::from_mem(options.apply(&bytes).unwrap()).unwrap();
    assert_eq!(
        reread.debug.as_ref().unwrap().pdb_path().as_deref(),
        Some("renamed.pdb")
    );

    replacement.push(0);
    options.debug.as_mut().unwrap().data = Some(replacement);
    assert!(matches!(
        options.apply(&bytes),
        Err(Error::RequiresRelayout(_))
    ));
}

#[test]
fn debug_without_directory() {
    let bytes = ImageFixture {
        debug: None,
        ..ImageFixture::default()
    }
    .build();

    let mut options = WritingOptions::new(true);
    options.debug = Some(DebugOptions::default());
    assert!(matches!(
        options.apply(&bytes),
        Err(Error::RequiresRelayout(_))
    ));
}

#[test]
fn debug_entry_without_payload_location() {
    let mut bytes = ImageFixture::default().build();
    let entry = ImageFixture::TEXT_OFFSET as usize + ImageFixture::DEBUG_OFFSET;
    bytes[entry + 20..entry + 28].fill(0);
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();

    let options = image.writing_options().unwrap();
    assert_eq!(options.apply(&bytes).unwrap(), bytes);

    let mut options = image.writing_options().unwrap();
    options.debug.as_mut().unwrap().data = Some(crate::test::rsds("fixture.pdb"));
    assert!(matches!(
        options.apply(&bytes),
        Err(Error::RequiresRelayout(_))
    ));
}

#[test]
fn characteristics_take_precedence_over_is_executable() {
    let bytes = ImageFixture {
        dll: true,
        ..ImageFixture::default()
    }
    .build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();

    let mut options = image.writing_options().unwrap();
    assert!(!options.is_executable);
    options.is_executable = true;

    assert_eq!(options.apply(&bytes).unwrap(), bytes);
}

#[test]
fn native_thunk_names_are_ignored() {
    let bytes = ImageFixture::default().build();
    let image = ImageInformation::from_mem(bytes.clone()).unwrap();

    let mut options = image.writing_options().unwrap();
    options.pe.import_directory_name = Some("mscoree.dll".to_string());
    options.pe.import_hint_name = Some("_CorExeMain".to_string());

    assert_eq!(options.apply(&bytes).unwrap(), bytes);
}

#[test]
fn apply_to_garbage() {
    let options = WritingOptions::default();
    assert!(matches!(options.apply(&[]), Err(Error::Empty)));
    assert!(options.apply(&[0xCC; 64]).is_err());
}
