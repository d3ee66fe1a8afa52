//! PE structure model: address translation and typed structure wrappers.
//!
//! This module owns the *descriptive* side of the document: where every header, section and
//! data directory lives inside the byte buffer, and how to move between the three address
//! spaces of a PE image (RAW file offsets, RVAs, VAs).
//!
//! # Architecture
//!
//! Everything here follows an arena-and-index model: wrappers and the translator store
//! offsets and lengths into the document buffer, never borrowed slices. After any structural
//! edit the whole set is re-derived from the current buffer state; stale wrappers are
//! discarded, not patched.
//!
//! # Key Components
//!
//! - [`crate::pe::AddressSpace`] - RAW/RVA/VA translation over the current section table
//! - [`crate::pe::StructView`] - Common field-table contract for all structure wrappers
//! - [`crate::pe::headers`] - DOS, COFF and optional header wrappers plus the directory table
//! - [`crate::pe::section`] - Section header wrappers
//! - [`crate::pe::imports`] - Import directory wrapper with thunk resolution
//! - [`crate::pe::dirs`] - Generic directory views and the CLR directory wrapper
//!
//! # Examples
//!
//! ```rust,no_run
//! use peforge::{PeDocument, pe::{AddrType, DirEntry}};
//!
//! let doc = PeDocument::from_file(std::path::Path::new("app.exe"))?;
//! if let Some(raw) = doc.layout().to_raw(0x1000, AddrType::Rva) {
//!     println!("RVA 0x1000 is stored at file offset 0x{:x}", raw);
//! }
//! if doc.has_directory(DirEntry::Import) {
//!     println!("File has an import table");
//! }
//! # Ok::<(), peforge::Error>(())
//! ```

pub mod dirs;
pub mod headers;
pub mod imports;
pub mod layout;
pub mod section;

pub use dirs::{ClrDirField, ClrDirWrapper, DirectoryView};
pub use headers::{
    DataDirTable, DosHdrField, DosHdrWrapper, FieldDef, FileHdrField, FileHdrWrapper, OptHdrField,
    OptHdrWrapper, StructView,
};
pub use imports::{ImportDirWrapper, ImportEntry, ImportedFunc};
pub use layout::{AddrType, AddressSpace, SectionMapping};
pub use section::{SectionCharacteristics, SectionHdrField, SectionHdrWrapper};

use strum::{Display, EnumIter, FromRepr, IntoStaticStr};

/// Number of data directory slots carried by this model.
///
/// The optional header reserves 16 slots; the 16th is unused by the format, so the
/// enumerable set below covers the 15 defined kinds.
pub const DIR_ENTRIES: usize = 15;

/// Size in bytes of one section header entry.
pub const SECTION_HDR_SIZE: usize = 40;

/// Width of the fixed section name field.
pub const SECTION_NAME_LEN: usize = 8;

/// Size in bytes of one import descriptor (`IMAGE_IMPORT_DESCRIPTOR`).
pub const IMPORT_DESC_SIZE: usize = 20;

/// IL-only flag inside the CLR directory's flags field (`COMIMAGE_FLAGS_ILONLY`).
pub const CLR_FLAG_ILONLY: u32 = 0x1;

/// One of the fixed, fully enumerable data directory kinds.
///
/// Each kind maps to exactly one optional [`crate::pe::DirectoryView`], present iff the
/// optional header's directory table carries a non-zero RVA and size in that slot. The
/// set is closed, so dispatch is by tag rather than open-ended virtual dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, FromRepr, IntoStaticStr)]
#[repr(usize)]
pub enum DirEntry {
    /// Export table
    Export = 0,
    /// Import table
    Import = 1,
    /// Resource tree
    Resource = 2,
    /// Exception handling data
    Exception = 3,
    /// Authenticode security directory (raw file offset, not an RVA)
    Security = 4,
    /// Base relocation table
    BaseReloc = 5,
    /// Debug directory
    Debug = 6,
    /// Architecture-specific data (reserved)
    Architecture = 7,
    /// Global pointer register value
    GlobalPtr = 8,
    /// Thread local storage directory
    Tls = 9,
    /// Load configuration directory
    LoadConfig = 10,
    /// Bound import directory
    BoundImport = 11,
    /// Import address table
    Iat = 12,
    /// Delay-load import descriptors
    DelayImport = 13,
    /// CLR runtime header (COM descriptor)
    ComDescriptor = 14,
}

impl DirEntry {
    /// Returns the directory-table slot index of this kind.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn dir_entry_indices_are_dense() {
        let kinds: Vec<DirEntry> = DirEntry::iter().collect();
        assert_eq!(kinds.len(), DIR_ENTRIES);
        for (expected, kind) in kinds.iter().enumerate() {
            assert_eq!(kind.index(), expected);
            assert_eq!(DirEntry::from_repr(expected), Some(*kind));
        }
    }
}
