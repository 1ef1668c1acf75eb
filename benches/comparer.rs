#![allow(unused)]
extern crate cilimage;

use cilimage::{
    comparer::{image_comparer, EqualityComparer},
    image::{
        CliHeader, CliInformation, DebugInformation, DllCharacteristics, DosHeader,
        FileCharacteristics, FileHeader, ImageInformation, Machine, MetadataRoot, ModuleFlags,
        NtHeader, OptionalHeader, OptionalHeaderKind, PeInformation, Subsystem, TableStreamHeader,
        Token,
    },
    writing::extract_writing_options,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::{collections::HashSet, hint::black_box};

/// A snapshot shaped like a mid-sized library: a few thousand methods, a CodeView payload
fn sample_image(methods: usize, linker: u8) -> ImageInformation {
    let pe = PeInformation {
        dos_header: Some(DosHeader { signature: 0x5A4D }),
        nt_header: Some(NtHeader {
            signature: 0x4550,
            file_header: Some(FileHeader {
                machine: Machine::I386,
                time_date_stamp: 0x6512_3456,
                characteristics: FileCharacteristics::from_bits_retain(0x2102),
            }),
            optional_header: Some(OptionalHeader {
                kind: OptionalHeaderKind::PE32,
                major_linker_version: linker,
                minor_linker_version: 0,
                image_base: 0x1000_0000,
                section_alignment: 0x2000,
                file_alignment: 0x200,
                major_os_version: 4,
                minor_os_version: 0,
                major_user_version: 0,
                minor_user_version: 0,
                major_subsystem_version: 4,
                minor_subsystem_version: 0,
                win32_version_value: 0,
                subsystem: Subsystem::WindowsCui,
                dll_characteristics: DllCharacteristics::from_bits_retain(0x8560),
                stack_reserve_size: 0x0010_0000,
                stack_commit_size: 0x1000,
                heap_reserve_size: 0x0010_0000,
                heap_commit_size: 0x1000,
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
            entry_point: Token::new(0),
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
            heap_sizes: 0,
            reserved2: 1,
            extra_data: None,
            present_tables: 0x0000_0009_0016_57A7,
            sorted_tables: 0x0000_1600_3301_FA00,
        }),
        field_rvas: (0..methods as u32 / 10).map(|row| 0x8000 + row * 8).collect(),
        method_rvas: (0..methods as u32).map(|row| 0x2050 + row * 0x20).collect(),
    };

    let debug = DebugInformation {
        characteristics: 0,
        time_date_stamp: 0x6512_3456,
        major_version: 0,
        minor_version: 0,
        debug_type: 2,
        data: vec![0x52; 0x60],
    };

    ImageInformation::new(pe, cli, Some(debug))
}

fn bench_equality(c: &mut Criterion) {
    let image = sample_image(5000, 48);
    let copy = image.clone();
    let other = sample_image(5000, 11);
    let comparer = image_comparer();

    c.bench_function("equals_identical", |b| {
        b.iter(|| comparer.equals(black_box(Some(&image)), black_box(Some(&copy))));
    });

    c.bench_function("equals_same_instance", |b| {
        b.iter(|| comparer.equals(black_box(Some(&image)), black_box(Some(&image))));
    });

    c.bench_function("equals_different", |b| {
        b.iter(|| comparer.equals(black_box(Some(&image)), black_box(Some(&other))));
    });
}

fn bench_hash(c: &mut Criterion) {
    let image = sample_image(5000, 48);
    let comparer = image_comparer();

    c.bench_function("hash_code", |b| {
        b.iter(|| comparer.hash_code(black_box(Some(&image))));
    });

    let images: Vec<ImageInformation> = (0..64)
        .map(|index| sample_image(100, index as u8))
        .collect();
    c.bench_function("hash_set_insert_64", |b| {
        b.iter(|| {
            let set: HashSet<&ImageInformation> = images.iter().collect();
            black_box(set.len())
        });
    });
}

fn bench_extract(c: &mut Criterion) {
    let image = sample_image(5000, 48);

    c.bench_function("extract_writing_options", |b| {
        b.iter(|| extract_writing_options(black_box(Some(&image))).unwrap());
    });
}

criterion_group!(benches, bench_equality, bench_hash, bench_extract);
criterion_main!(benches);
