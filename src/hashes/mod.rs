//! Fingerprints of the document: file digests, PE checksum, imphash, rich-header hash.
//!
//! All computations here are pure functions over a [`Snapshot`] - an owned copy of the
//! buffer plus the derived locations a hash needs. The document hands snapshots out under
//! its own consistency guarantees, so an in-flight edit can never tear a running
//! computation.
//!
//! # Key Components
//!
//! - [`HashKind`] - The closed set of computed fingerprints
//! - [`HashStore`] - Per-kind result slots, filled concurrently by [`HashStore::compute_all`]
//! - [`CancelToken`] - Cooperative stop flag checked before each unit of work
//! - [`checksum`] - The PE header checksum algorithm
//!
//! # Examples
//!
//! ```rust,no_run
//! use peforge::{PeDocument, hashes::{CancelToken, HashKind, HashStore}};
//!
//! let doc = PeDocument::from_file(std::path::Path::new("app.exe"))?;
//! let store = HashStore::new();
//! store.compute_all(&doc.snapshot(), &CancelToken::new())?;
//! if let Some(digest) = store.get(HashKind::Sha256) {
//!     println!("sha256: {digest}");
//! }
//! # Ok::<(), peforge::Error>(())
//! ```

pub mod imphash;
pub mod rich;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use dashmap::DashMap;
use md5::{Digest, Md5};
use rayon::prelude::*;
use sha1::Sha1;
use sha2::Sha256;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::{pe::AddressSpace, Result};

/// One computed fingerprint kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum HashKind {
    /// PE header checksum (32-bit, not a cryptographic digest).
    Checksum,
    /// MD5 of the whole file.
    Md5,
    /// SHA-1 of the whole file.
    Sha1,
    /// SHA-256 of the whole file.
    Sha256,
    /// MD5 over the normalized import listing.
    ImpMd5,
    /// MD5 over the decoded rich header region.
    RichHdrMd5,
}

/// Immutable input of all hash and scan computations.
///
/// Owns a copy of the buffer; cheap to clone and safe to move across threads.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// The complete file content at snapshot time.
    pub data: Arc<Vec<u8>>,
    /// Translator derived from the same buffer state.
    pub layout: AddressSpace,
    /// Whether the image uses the PE32+ layout.
    pub is_64: bool,
    /// File offset of the PE signature.
    pub pe_offset: u64,
    /// Absolute offset of the optional header's checksum field.
    pub checksum_field_offset: u64,
    /// `(RVA, size)` of the import directory, when present.
    pub import_dir: Option<(u32, u32)>,
}

/// Cooperative cancellation flag shared between a controller and running computations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    stop: Arc<AtomicBool>,
}

impl CancelToken {
    /// A fresh, unset token.
    #[must_use]
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Requests cancellation; running units observe it at their next check.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Lowercase hex rendering of a digest.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Computes the PE header checksum over `data`.
///
/// 16-bit little-endian word sum with carry folding, skipping the four bytes of the
/// checksum field itself, plus the total file size. Because the field is skipped, writing
/// the result back into the header leaves the recomputed value unchanged.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn checksum(data: &[u8], checksum_field_offset: u64) -> u32 {
    let mut sum: u64 = 0;
    let field = usize::try_from(checksum_field_offset).unwrap_or(usize::MAX);

    let mut offset = 0;
    while offset < data.len() {
        if offset >= field && offset < field.saturating_add(4) {
            offset += 2;
            continue;
        }
        let low = u64::from(data[offset]);
        let high = if offset + 1 < data.len() {
            u64::from(data[offset + 1])
        } else {
            0
        };
        sum += low | (high << 8);
        sum = (sum & 0xFFFF) + (sum >> 16);
        offset += 2;
    }

    sum = (sum & 0xFFFF) + (sum >> 16);
    sum += data.len() as u64;
    sum as u32
}

/// Computes one fingerprint over a snapshot.
///
/// Returns `Ok(None)` for kinds whose input the file simply does not have (no import
/// table, no rich header).
///
/// # Errors
///
/// [`crate::Error::Cancelled`] when the token is set before the unit starts.
pub fn compute(snapshot: &Snapshot, kind: HashKind, cancel: &CancelToken) -> Result<Option<String>> {
    if cancel.is_cancelled() {
        return Err(crate::Error::Cancelled);
    }

    let result = match kind {
        HashKind::Checksum => Some(format!(
            "{:08x}",
            checksum(&snapshot.data, snapshot.checksum_field_offset)
        )),
        HashKind::Md5 => Some(hex(&Md5::digest(snapshot.data.as_slice()))),
        HashKind::Sha1 => Some(hex(&Sha1::digest(snapshot.data.as_slice()))),
        HashKind::Sha256 => Some(hex(&Sha256::digest(snapshot.data.as_slice()))),
        HashKind::ImpMd5 => imphash::imphash(snapshot),
        HashKind::RichHdrMd5 => rich::rich_hash(&snapshot.data, snapshot.pe_offset),
    };
    Ok(result)
}

/// Per-kind fingerprint result slots.
///
/// Each kind occupies its own shard slot, so concurrent writers never contend on a single
/// lock and readers see complete strings only.
#[derive(Debug, Default)]
pub struct HashStore {
    results: DashMap<HashKind, String>,
}

impl HashStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> HashStore {
        HashStore::default()
    }

    /// The last computed value for a kind, if any.
    #[must_use]
    pub fn get(&self, kind: HashKind) -> Option<String> {
        self.results.get(&kind).map(|value| value.clone())
    }

    /// Computes every kind over the snapshot, fanning out across the thread pool.
    ///
    /// Kinds whose input is absent clear their slot instead of storing a value.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Cancelled`] when the token is set; slots computed before the
    /// cancellation keep their values, but no partial string is ever stored.
    pub fn compute_all(&self, snapshot: &Snapshot, cancel: &CancelToken) -> Result<()> {
        let kinds: Vec<HashKind> = HashKind::iter().collect();
        kinds.par_iter().try_for_each(|kind| {
            match compute(snapshot, *kind, cancel)? {
                Some(value) => {
                    self.results.insert(*kind, value);
                }
                None => {
                    self.results.remove(kind);
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test::pe32plus_fixture, PeDocument};

    #[test]
    fn checksum_is_a_fixed_point() {
        let doc = PeDocument::from_mem(pe32plus_fixture()).unwrap();
        let snapshot = doc.snapshot();
        let field = snapshot.checksum_field_offset;

        let first = checksum(&snapshot.data, field);
        let mut patched = snapshot.data.as_slice().to_vec();
        let at = usize::try_from(field).unwrap();
        patched[at..at + 4].copy_from_slice(&first.to_le_bytes());
        assert_eq!(checksum(&patched, field), first);
    }

    #[test]
    fn whole_file_digests() {
        let doc = PeDocument::from_mem(pe32plus_fixture()).unwrap();
        let snapshot = doc.snapshot();
        let cancel = CancelToken::new();

        let md5 = compute(&snapshot, HashKind::Md5, &cancel).unwrap().unwrap();
        assert_eq!(md5.len(), 32);
        let sha256 = compute(&snapshot, HashKind::Sha256, &cancel)
            .unwrap()
            .unwrap();
        assert_eq!(sha256.len(), 64);
        assert_eq!(
            md5,
            hex(&Md5::digest(snapshot.data.as_slice())),
            "digest must cover the exact snapshot bytes"
        );
    }

    #[test]
    fn store_computes_all_kinds() {
        let doc = PeDocument::from_mem(pe32plus_fixture()).unwrap();
        let store = HashStore::new();
        store
            .compute_all(&doc.snapshot(), &CancelToken::new())
            .unwrap();

        assert!(store.get(HashKind::Md5).is_some());
        assert!(store.get(HashKind::Sha1).is_some());
        assert!(store.get(HashKind::Checksum).is_some());
        // the plain fixture has neither imports nor a rich header
        assert_eq!(store.get(HashKind::ImpMd5), None);
        assert_eq!(store.get(HashKind::RichHdrMd5), None);
    }

    #[test]
    fn cancellation_aborts_without_partial_output() {
        let doc = PeDocument::from_mem(pe32plus_fixture()).unwrap();
        let store = HashStore::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(matches!(
            store.compute_all(&doc.snapshot(), &cancel),
            Err(crate::Error::Cancelled)
        ));
        assert_eq!(store.get(HashKind::Md5), None);
    }
}
