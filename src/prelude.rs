//! # peforge Prelude
//!
//! Curated re-exports of the types most code working with PE documents needs. Import
//! this module for quick access without spelling out the full module paths.

/// The main error type for all peforge operations
pub use crate::Error;

/// The result type used throughout peforge
pub use crate::Result;

/// The editable PE document
pub use crate::PeDocument;

/// Change notifications emitted after successful edits
pub use crate::DocEvent;

/// Import editing building blocks
pub use crate::{ImportLib, ImportTarget, ImportsAutoadderSettings};

/// Address spaces and the translator
pub use crate::pe::{AddrType, AddressSpace, SectionMapping};

/// Directory kinds and views
pub use crate::pe::{DirEntry, DirectoryView};

/// Structure wrappers and their field ids
pub use crate::pe::{
    DosHdrField, FileHdrField, OptHdrField, SectionCharacteristics, SectionHdrField, StructView,
};

/// Import table inspection
pub use crate::pe::{ImportDirWrapper, ImportEntry, ImportedFunc};

/// Fingerprint computation
pub use crate::hashes::{CancelToken, HashKind, HashStore, Snapshot};

/// Packer signatures and scanning
pub use crate::sig::{FoundPacker, Signature, SignatureSet};
