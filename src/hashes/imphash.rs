//! Import hash: MD5 over the normalized import listing.
//!
//! The listing walks descriptors and thunks in declaration order. Library names are
//! lowercased with a known module extension stripped; functions appear as their lowercased
//! name, or `ord<N>` for ordinal imports. Entries join as `lib.func` separated by commas,
//! duplicates included, and the digest covers that single string. Files importing the same
//! API surface in the same order share the hash regardless of compiler padding or layout.

use md5::{Digest, Md5};

use crate::{
    hashes::{hex, Snapshot},
    pe::ImportDirWrapper,
};

/// Module extensions stripped from library names before hashing.
const STRIPPED_EXTENSIONS: [&str; 3] = [".dll", ".sys", ".ocx"];

fn normalize_lib(name: &str) -> String {
    let lowered = name.to_lowercase();
    for extension in STRIPPED_EXTENSIONS {
        if let Some(stripped) = lowered.strip_suffix(extension) {
            return stripped.to_string();
        }
    }
    lowered
}

/// Computes the import hash; `None` when the file has no resolvable imports.
#[must_use]
pub fn imphash(snapshot: &Snapshot) -> Option<String> {
    let (rva, size) = snapshot.import_dir?;
    let wrapper = ImportDirWrapper::new(rva, size, snapshot.is_64);

    let mut parts = Vec::new();
    for entry in wrapper.entries(&snapshot.data, &snapshot.layout) {
        let Some(lib_name) = &entry.lib_name else {
            continue;
        };
        let lib = normalize_lib(lib_name);
        for func in wrapper.thunks(&snapshot.data, &snapshot.layout, &entry) {
            let name = match (&func.name, func.ordinal) {
                (Some(name), _) => name.to_lowercase(),
                (None, Some(ordinal)) => format!("ord{ordinal}"),
                (None, None) => continue,
            };
            parts.push(format!("{lib}.{name}"));
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(hex(&Md5::digest(parts.join(","))))
}
