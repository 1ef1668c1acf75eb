//! Integration tests for the image model, the comparer and option extraction.
//!
//! Snapshots are assembled by hand through the public API, the way a reader living outside of this
//! crate would produce them.

use cilimage::prelude::*;
use std::collections::HashMap;

fn snapshot(characteristics: u16, debug: bool) -> ImageInformation {
    let pe = PeInformation {
        dos_header: Some(DosHeader { signature: 0x5A4D }),
        nt_header: Some(NtHeader {
            signature: 0x4550,
            file_header: Some(FileHeader {
                machine: Machine::Amd64,
                time_date_stamp: 0x5F00_0000,
                characteristics: FileCharacteristics::from_bits_retain(characteristics),
            }),
            optional_header: Some(OptionalHeader {
                kind: OptionalHeaderKind::PE32Plus,
                major_linker_version: 48,
                minor_linker_version: 0,
                image_base: 0x1_8000_0000,
                section_alignment: 0x2000,
                file_alignment: 0x200,
                major_os_version: 4,
                minor_os_version: 0,
                major_user_version: 1,
                minor_user_version: 2,
                major_subsystem_version: 4,
                minor_subsystem_version: 0,
                win32_version_value: 0,
                subsystem: Subsystem::WindowsGui,
                dll_characteristics: DllCharacteristics::DYNAMIC_BASE
                    | DllCharacteristics::NX_COMPAT,
                stack_reserve_size: 0x40_0000,
                stack_commit_size: 0x4000,
                heap_reserve_size: 0x10_0000,
                heap_commit_size: 0x2000,
                loader_flags: 0,
                number_of_data_directories: 16,
            }),
        }),
    };

    let cli = CliInformation {
        cli_header: Some(CliHeader {
            major_runtime_version: 2,
            minor_runtime_version: 5,
            flags: ModuleFlags::IL_ONLY,
            entry_point: Token::new(0x0600_0010),
        }),
        metadata_root: Some(MetadataRoot {
            signature: 0x424A_5342,
            major_version: 1,
            minor_version: 1,
            reserved: 0,
            version_string_bytes: b"v4.0.30319\0\0".to_vec(),
            storage_flags: 0,
            reserved2: 0,
        }),
        table_stream_header: Some(TableStreamHeader {
            reserved: 0,
            major_version: 2,
            minor_version: 0,
            heap_sizes: 0x40,
            reserved2: 1,
            extra_data: Some(0x10),
            present_tables: 0x0000_0009_0002_0057,
            sorted_tables: 0,
        }),
        field_rvas: vec![0x6000],
        method_rvas: vec![0x2050, 0x2060, 0],
    };

    let debug = debug.then(|| DebugInformation {
        characteristics: 0,
        time_date_stamp: 0x5F00_0000,
        major_version: 0x0100,
        minor_version: 0x504D,
        debug_type: 2,
        data: b"RSDS-payload".to_vec(),
    });

    ImageInformation::new(pe, cli, debug)
}

#[test]
fn extraction_copies_every_header() -> Result<()> {
    let image = snapshot(0x0022, true);
    let options = extract_writing_options(Some(&image))?;

    assert!(options.is_executable);
    assert_eq!(options.pe.machine, Some(Machine::Amd64));
    assert_eq!(options.pe.image_base, Some(0x1_8000_0000));
    assert_eq!(options.pe.subsystem, Some(Subsystem::WindowsGui));
    assert_eq!(options.pe.major_user_version, Some(1));
    assert_eq!(options.pe.minor_user_version, Some(2));
    assert_eq!(options.pe.stack_reserve_size, Some(0x40_0000));
    assert_eq!(options.pe.import_directory_name, None);
    assert_eq!(options.pe.import_hint_name, None);

    assert_eq!(options.cli.header.entry_point, Some(Token::new(0x0600_0010)));
    assert_eq!(
        options.cli.metadata_root.version_string.as_deref(),
        Some("v4.0.30319")
    );
    assert_eq!(options.cli.table_stream.extra_data, Some(0x10));
    assert_eq!(
        options.cli.table_stream.present_tables,
        Some(0x0000_0009_0002_0057)
    );

    match options.debug_directive() {
        DebugDirective::Emit(debug) => {
            assert_eq!(debug.minor_version, Some(0x504D));
            assert_eq!(debug.data.as_deref(), Some(&b"RSDS-payload"[..]));
        }
        other => panic!("unexpected directive {other:?}"),
    }

    Ok(())
}

#[test]
fn dll_snapshots_extract_as_libraries() -> Result<()> {
    let image = snapshot(0x2022, false);
    let options = WritingOptions::try_from(&image)?;

    assert!(!options.is_executable);
    assert_eq!(options.debug_directive(), DebugDirective::Omit);
    Ok(())
}

#[test]
fn incomplete_snapshots_are_rejected() {
    let mut image = snapshot(0x0022, true);
    image.cli.as_mut().unwrap().metadata_root = None;

    assert!(matches!(
        extract_writing_options(Some(&image)),
        Err(Error::InvalidInput { .. })
    ));
    assert!(matches!(
        extract_writing_options(None),
        Err(Error::InvalidInput { .. })
    ));
}

#[test]
fn snapshots_as_map_keys() {
    let mut seen: HashMap<ImageInformation, usize> = HashMap::new();

    for debug in [true, false, true] {
        *seen.entry(snapshot(0x0022, debug)).or_default() += 1;
    }

    assert_eq!(seen.len(), 2);
    assert_eq!(seen[&snapshot(0x0022, true)], 2);
    assert_eq!(seen[&snapshot(0x0022, false)], 1);
}

#[test]
fn comparer_matches_partial_eq() {
    let comparer = image_comparer();
    let exe = snapshot(0x0022, true);
    let dll = snapshot(0x2022, true);

    assert_eq!(comparer.equals(Some(&exe), Some(&dll)), exe == dll);
    assert!(!comparer.equals(Some(&exe), Some(&dll)));

    // Only machine and version string feed the hash
    assert_eq!(comparer.hash_code(Some(&exe)), comparer.hash_code(Some(&dll)));
    assert_eq!(comparer.hash_code(None), 0);
}
