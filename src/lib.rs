// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # peforge
//!
//! A library for parsing, inspecting and structurally editing PE (Portable Executable)
//! binaries while keeping every derived offset and header field consistent, with
//! byte-for-byte single-step undo.
//!
//! ## Features
//!
//! - **Owned document model** - One contiguous buffer; wrappers and the address
//!   translator store offsets into it and are rebuilt after every structural edit
//! - **Three address spaces** - Transparent translation between RAW file offsets, RVAs
//!   and absolute VAs
//! - **Structural editing** - Add sections, move data directories, edit the import
//!   table (single entries or atomic bulk batches), rewrite header fields
//! - **Journaled undo** - Every edit backs up the bytes it overwrites; multi-write edits
//!   collapse into a single undo step
//! - **Fingerprints** - Whole-file digests, PE checksum, imphash and rich-header hash,
//!   computed concurrently over consistent snapshots
//! - **Packer scanning** - Wildcard byte signatures matched from the entry point or any
//!   translated offset
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peforge::prelude::*;
//! use std::path::Path;
//!
//! let mut doc = PeDocument::from_file(Path::new("app.exe"))?;
//! if !doc.is_valid() {
//!     for warning in doc.atypical() {
//!         eprintln!("warning: {warning}");
//!     }
//! }
//!
//! // add a section, then take it back
//! let index = doc.add_section(".patch", 0x400, 0x400)?;
//! println!("added section #{index}");
//! doc.undo();
//!
//! // fingerprints over a consistent snapshot
//! let store = HashStore::new();
//! store.compute_all(&doc.snapshot(), &CancelToken::new())?;
//! # Ok::<(), peforge::Error>(())
//! ```
//!
//! ## Architecture
//!
//! [`PeDocument`] owns the content buffer and is the only writer. Everything derived -
//! the [`pe::AddressSpace`] translator, header and section wrappers, directory views -
//! holds offsets, never borrowed bytes, and is re-derived from a fresh parse after each
//! structural edit. Edits follow a fixed pipeline: validate, journal the target bytes,
//! mutate, re-derive, notify. A failed re-derivation replays the journal backup, so the
//! document never exposes a half-applied state.

#[macro_use]
pub(crate) mod error;

pub mod document;
pub mod file;
pub mod hashes;
pub mod pe;
pub mod sig;

/// Shared fixture builders used in unit- and integration-tests.
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use peforge::prelude::*;
///
/// let doc = PeDocument::from_file("app.exe".as_ref())?;
/// println!("{} sections", doc.sections().len());
/// # Ok::<(), peforge::Error>(())
/// ```
pub mod prelude;

/// The result type used throughout peforge.
pub type Result<T> = std::result::Result<T, Error>;

pub use document::{
    events::DocEvent,
    imports::{ImportLib, ImportTarget, ImportsAutoadderSettings},
    PeDocument,
};
pub use error::Error;
