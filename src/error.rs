use thiserror::Error;

use crate::pe::DirEntry;

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

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all failure modes of loading, validating and structurally editing PE
/// documents. Each variant provides specific context about the failure to enable appropriate
/// handling at the caller.
///
/// # Error Categories
///
/// ## Parsing and access errors
/// - [`Error::Malformed`] - Corrupted or invalid PE structure
/// - [`Error::OutOfBounds`] - Attempted to read or write beyond buffer boundaries
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - PE parsing errors from the goblin crate
///
/// ## Structural edit preconditions
/// - [`Error::SectionNameTooLong`] - Section name exceeds the fixed 8-byte field
/// - [`Error::NoSpaceForSection`] - Header area has no room for another section header
/// - [`Error::ImportCapacity`] - Import directory cannot hold the requested entries
/// - [`Error::DirectoryAbsent`] - Operation on a data directory the file does not have
/// - [`Error::ContentOverflow`] - Supplied content does not fit the destination range
///
/// ## Background computations
/// - [`Error::Cancelled`] - A hash or scan observed the stop flag and aborted
///
/// Address translation misses are *not* errors: translators return `None` sentinels on hot
/// lookup paths (see [`crate::pe::AddressSpace`]), and undo on an empty journal is a `false`
/// return, not an `Err`.
///
/// # Examples
///
/// ```rust,no_run
/// use peforge::{Error, PeDocument};
///
/// match PeDocument::from_file(std::path::Path::new("app.exe")) {
///     Ok(doc) => println!("Loaded {} bytes", doc.len()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed file: {} ({}:{})", message, file, line);
///     }
///     Err(Error::FileError(io_err)) => eprintln!("I/O error: {}", io_err),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted on the document buffer.
    ///
    /// This is a safety check to prevent buffer overruns during parsing and editing.
    #[error("Out of Bound access would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while reading the input file or
    /// flushing the edited buffer back to disk. Never retried automatically.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    ///
    /// The goblin crate is used for low-level PE container parsing. This error wraps
    /// any failures from that parsing layer.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// A section name does not fit the fixed-width header field.
    ///
    /// PE section names are stored in exactly 8 bytes; longer names cannot be
    /// represented and the edit is rejected before any byte is written.
    #[error("Section name exceeds the 8 byte limit - {0}")]
    SectionNameTooLong(String),

    /// The header area has no room left for another section header.
    ///
    /// Section headers live between the optional header and the first section's raw
    /// data; once that slack is exhausted no further section can be appended.
    #[error("No space left in the headers area for a new section header")]
    NoSpaceForSection,

    /// The import directory cannot hold the requested number of new entries.
    ///
    /// Reported by capacity planning before any write happens; the buffer is left
    /// unmodified.
    #[error("Import directory capacity exhausted - needed {needed} bytes, {available} available")]
    ImportCapacity {
        /// Bytes required to store the requested entries
        needed: u64,
        /// Contiguous free bytes actually available after the directory
        available: u64,
    },

    /// The requested data directory is not present in this file.
    #[error("Data directory not present - {0}")]
    DirectoryAbsent(DirEntry),

    /// Supplied content does not fit the destination byte range.
    #[error("Content of {content} bytes does not fit destination of {capacity} bytes")]
    ContentOverflow {
        /// Size of the content that was supplied
        content: u64,
        /// Capacity of the destination range
        capacity: u64,
    },

    /// A background computation observed the stop flag and aborted.
    ///
    /// Cancelled computations never produce partial output; the caller receives this
    /// variant instead of a result string.
    #[error("Computation was cancelled")]
    Cancelled,
}
