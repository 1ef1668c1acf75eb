use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invalid_input {
    ($msg:expr) => {
        crate::Error::InvalidInput {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidInput {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Reading
/// - [`Error::Malformed`] - Corrupted or invalid header structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the input
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - PE container errors from the goblin crate
///
/// ## Writing options
/// - [`Error::InvalidInput`] - Extraction from an incomplete [`crate::ImageInformation`]
/// - [`Error::RequiresRelayout`] - An override that cannot be applied without moving data
///
/// # Examples
///
/// ```rust,no_run
/// use cilimage::{Error, ImageInformation};
/// use std::path::Path;
///
/// match ImageInformation::from_file(Path::new("assembly.dll")) {
///     Ok(image) => println!("machine: {:?}", image.machine()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed file: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// Carries the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A required part of an [`crate::ImageInformation`] is missing.
    ///
    /// Raised by writing-option extraction, which never returns a partially populated result.
    #[error("Invalid input - {file}:{line}: {message}")]
    InvalidInput {
        /// Which part was missing
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// An override can not be applied in place, because the image would need a new layout.
    ///
    /// The associated value describes the conflict.
    #[error("Override requires relayouting the image: {0}")]
    RequiresRelayout(&'static str),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),
}
