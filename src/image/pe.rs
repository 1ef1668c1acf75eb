//! PE/COFF container headers: DOS header, NT header, COFF file header and optional header.
//!
//! Only the fields that are meaningful for rewriting a managed image are kept. Values that the
//! writer always recomputes (sizes, entry point RVA, checksum, section counts) are not part of the
//! model.
//!
//! # Reference
//! - [PE Format](https://learn.microsoft.com/en-us/windows/win32/debug/pe-format)

use bitflags::bitflags;
use std::fmt;

use strum::Display;

/// `MZ`
pub const DOS_SIGNATURE: u16 = 0x5A4D;
/// `PE\0\0`
pub const NT_SIGNATURE: u32 = 0x0000_4550;
/// Magic of a PE32 optional header
pub const PE32_MAGIC: u16 = 0x010B;
/// Magic of a PE32+ optional header
pub const PE32_PLUS_MAGIC: u16 = 0x020B;

/// Target architecture of the image, as stored in the COFF file header.
///
/// Codes without a named variant are kept verbatim in [`Machine::Other`], so that every value
/// round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Machine {
    /// Any machine; the usual value for AnyCPU managed images is [`Machine::I386`]
    Unknown,
    /// Intel 386 or later
    I386,
    /// x64
    Amd64,
    /// ARM little endian
    Arm,
    /// ARM Thumb-2 little endian
    ArmNt,
    /// ARM64 little endian
    Arm64,
    /// Intel Itanium
    Ia64,
    /// Any other machine code
    Other(u16),
}

impl Machine {
    /// The raw COFF machine code
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Machine::Unknown => 0x0000,
            Machine::I386 => 0x014C,
            Machine::Amd64 => 0x8664,
            Machine::Arm => 0x01C0,
            Machine::ArmNt => 0x01C4,
            Machine::Arm64 => 0xAA64,
            Machine::Ia64 => 0x0200,
            Machine::Other(code) => code,
        }
    }

    /// Returns true if images for this machine use a PE32+ optional header
    #[must_use]
    pub fn is_64bit(self) -> bool {
        matches!(self, Machine::Amd64 | Machine::Arm64 | Machine::Ia64)
    }
}

impl From<u16> for Machine {
    fn from(code: u16) -> Self {
        match code {
            0x0000 => Machine::Unknown,
            0x014C => Machine::I386,
            0x8664 => Machine::Amd64,
            0x01C0 => Machine::Arm,
            0x01C4 => Machine::ArmNt,
            0xAA64 => Machine::Arm64,
            0x0200 => Machine::Ia64,
            other => Machine::Other(other),
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Machine::Other(code) => write!(f, "Other({code:#06x})"),
            known => write!(f, "{known:?}"),
        }
    }
}

impl From<Machine> for u16 {
    fn from(machine: Machine) -> Self {
        machine.code()
    }
}

/// Windows subsystem required to run the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Unknown subsystem
    Unknown,
    /// Device drivers and native processes
    Native,
    /// Windows graphical user interface
    WindowsGui,
    /// Windows character subsystem
    WindowsCui,
    /// EFI application
    EfiApplication,
    /// Xbox
    Xbox,
    /// Any other subsystem value
    Other(u16),
}

impl Subsystem {
    /// The raw subsystem value
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Subsystem::Unknown => 0,
            Subsystem::Native => 1,
            Subsystem::WindowsGui => 2,
            Subsystem::WindowsCui => 3,
            Subsystem::EfiApplication => 10,
            Subsystem::Xbox => 14,
            Subsystem::Other(code) => code,
        }
    }
}

impl From<u16> for Subsystem {
    fn from(code: u16) -> Self {
        match code {
            0 => Subsystem::Unknown,
            1 => Subsystem::Native,
            2 => Subsystem::WindowsGui,
            3 => Subsystem::WindowsCui,
            10 => Subsystem::EfiApplication,
            14 => Subsystem::Xbox,
            other => Subsystem::Other(other),
        }
    }
}

/// Layout of the optional header, selected by its magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum OptionalHeaderKind {
    /// 32-bit layout, magic `0x10B`
    PE32,
    /// 64-bit layout, magic `0x20B`
    PE32Plus,
}

impl OptionalHeaderKind {
    /// The magic value stored at the start of the optional header
    #[must_use]
    pub fn magic(self) -> u16 {
        match self {
            OptionalHeaderKind::PE32 => PE32_MAGIC,
            OptionalHeaderKind::PE32Plus => PE32_PLUS_MAGIC,
        }
    }
}

bitflags! {
    /// COFF file header characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileCharacteristics: u16 {
        /// Relocation information was stripped from the file
        const RELOCS_STRIPPED = 0x0001;
        /// The image is valid and can be run
        const EXECUTABLE_IMAGE = 0x0002;
        /// COFF line numbers were stripped
        const LINE_NUMS_STRIPPED = 0x0004;
        /// COFF symbol table entries were stripped
        const LOCAL_SYMS_STRIPPED = 0x0008;
        /// The application can handle addresses above 2 GB
        const LARGE_ADDRESS_AWARE = 0x0020;
        /// The machine is based on a 32-bit word architecture
        const MACHINE_32BIT = 0x0100;
        /// Debugging information was removed
        const DEBUG_STRIPPED = 0x0200;
        /// Copy to swap file when run from removable media
        const REMOVABLE_RUN_FROM_SWAP = 0x0400;
        /// Copy to swap file when run from network media
        const NET_RUN_FROM_SWAP = 0x0800;
        /// The image is a system file
        const SYSTEM = 0x1000;
        /// The image is a dynamic-link library
        const DLL = 0x2000;
        /// Run only on a uniprocessor machine
        const UP_SYSTEM_ONLY = 0x4000;
    }
}

bitflags! {
    /// Optional header DLL characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DllCharacteristics: u16 {
        /// Can handle a high entropy 64-bit virtual address space
        const HIGH_ENTROPY_VA = 0x0020;
        /// Can be relocated at load time
        const DYNAMIC_BASE = 0x0040;
        /// Code integrity checks are enforced
        const FORCE_INTEGRITY = 0x0080;
        /// Compatible with data execution prevention
        const NX_COMPAT = 0x0100;
        /// Isolation aware, but do not isolate
        const NO_ISOLATION = 0x0200;
        /// Does not use structured exception handling
        const NO_SEH = 0x0400;
        /// Do not bind the image
        const NO_BIND = 0x0800;
        /// Must execute in an AppContainer
        const APPCONTAINER = 0x1000;
        /// A WDM driver
        const WDM_DRIVER = 0x2000;
        /// Supports control flow guard
        const GUARD_CF = 0x4000;
        /// Terminal server aware
        const TERMINAL_SERVER_AWARE = 0x8000;
    }
}

/// The DOS header at the very start of the image.
#[derive(Debug, Clone)]
pub struct DosHeader {
    /// Magic, `MZ` for valid images
    pub signature: u16,
}

/// The NT header: PE signature, COFF file header and optional header.
#[derive(Debug, Clone)]
pub struct NtHeader {
    /// Magic, `PE\0\0` for valid images
    pub signature: u32,
    /// The COFF file header
    pub file_header: Option<FileHeader>,
    /// The optional header
    pub optional_header: Option<OptionalHeader>,
}

/// The COFF file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Target architecture
    pub machine: Machine,
    /// Seconds since 1970-01-01 00:00 UTC at which the image was created
    pub time_date_stamp: u32,
    /// Image characteristics, including whether the image is a DLL
    pub characteristics: FileCharacteristics,
}

impl FileHeader {
    /// Returns true if the DLL bit is set
    #[must_use]
    pub fn is_dll(&self) -> bool {
        self.characteristics.contains(FileCharacteristics::DLL)
    }
}

/// The fields of the optional header that a writer may take over verbatim.
///
/// Both layouts are represented with the widest field types; PE32 values are widened by the
/// reader.
#[derive(Debug, Clone)]
pub struct OptionalHeader {
    /// PE32 or PE32+
    pub kind: OptionalHeaderKind,
    /// Linker major version
    pub major_linker_version: u8,
    /// Linker minor version
    pub minor_linker_version: u8,
    /// Preferred load address
    pub image_base: u64,
    /// Alignment of sections in memory
    pub section_alignment: u32,
    /// Alignment of section data in the file
    pub file_alignment: u32,
    /// Required operating system major version
    pub major_os_version: u16,
    /// Required operating system minor version
    pub minor_os_version: u16,
    /// Image (user) major version
    pub major_user_version: u16,
    /// Image (user) minor version
    pub minor_user_version: u16,
    /// Subsystem major version
    pub major_subsystem_version: u16,
    /// Subsystem minor version
    pub minor_subsystem_version: u16,
    /// Reserved, must be zero
    pub win32_version_value: u32,
    /// Subsystem required to run the image
    pub subsystem: Subsystem,
    /// DLL characteristics
    pub dll_characteristics: DllCharacteristics,
    /// Stack reserve size
    pub stack_reserve_size: u64,
    /// Stack commit size
    pub stack_commit_size: u64,
    /// Heap reserve size
    pub heap_reserve_size: u64,
    /// Heap commit size
    pub heap_commit_size: u64,
    /// Reserved, must be zero
    pub loader_flags: u32,
    /// Number of data directory entries
    pub number_of_data_directories: u32,
}
