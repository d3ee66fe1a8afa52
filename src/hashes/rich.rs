//! Rich header location and hashing.
//!
//! The undocumented rich header sits in the DOS stub: an XOR-encoded run of comp-id/count
//! pairs opened by a `DanS` marker and closed by a literal `Rich` marker followed by the
//! XOR key. The hash covers the *decoded* region from `DanS` up to (excluding) `Rich`, so
//! two builds of the same toolchain lineup share it even though the stored bytes differ
//! per file.

use md5::{Digest, Md5};

use crate::hashes::hex;

const RICH_MARKER: u32 = 0x6863_6952; // "Rich"
const DANS_MARKER: u32 = 0x536E_6144; // "DanS"

/// Earliest offset a rich header can start at (right after the standard DOS stub slot).
const SEARCH_START: usize = 0x40;

fn dword_at(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Locates the encoded region: `(dans_offset, rich_offset, key)`.
///
/// Scans dword-aligned offsets of the DOS stub for the `Rich` marker, reads the key right
/// after it, then walks back to the dword that decodes to `DanS`. `None` when any part of
/// that chain is missing.
#[must_use]
pub fn locate(data: &[u8], pe_offset: u64) -> Option<(usize, usize, u32)> {
    let stub_end = usize::try_from(pe_offset).ok()?.min(data.len());

    let mut rich_at = None;
    let mut offset = SEARCH_START;
    while offset + 8 <= stub_end {
        if dword_at(data, offset) == Some(RICH_MARKER) {
            rich_at = Some(offset);
        }
        offset += 4;
    }
    let rich_at = rich_at?;
    let key = dword_at(data, rich_at + 4)?;

    let mut cursor = rich_at.checked_sub(4)?;
    loop {
        if dword_at(data, cursor)? ^ key == DANS_MARKER {
            return Some((cursor, rich_at, key));
        }
        if cursor < SEARCH_START + 4 {
            return None;
        }
        cursor -= 4;
    }
}

/// The decoded `DanS..Rich` region, every dword XORed with the key.
#[must_use]
pub fn decoded_region(data: &[u8], pe_offset: u64) -> Option<Vec<u8>> {
    let (dans, rich, key) = locate(data, pe_offset)?;

    let mut decoded = Vec::with_capacity(rich - dans);
    let mut offset = dans;
    while offset < rich {
        decoded.extend_from_slice(&(dword_at(data, offset)? ^ key).to_le_bytes());
        offset += 4;
    }
    Some(decoded)
}

/// MD5 of the decoded rich header region; `None` when the file has none.
#[must_use]
pub fn rich_hash(data: &[u8], pe_offset: u64) -> Option<String> {
    Some(hex(&Md5::digest(decoded_region(data, pe_offset)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{pe32plus_fixture, rich_fixture, FIXTURE_PE_OFFSET, FIXTURE_RICH_KEY};

    #[test]
    fn locates_marker_and_key() {
        let (image, _) = rich_fixture();
        let (dans, rich, key) = locate(&image, 0x100).unwrap();
        assert_eq!(dans, 0x80);
        assert_eq!(rich, 0x80 + 8 * 4);
        assert_eq!(key, FIXTURE_RICH_KEY);
    }

    #[test]
    fn decodes_and_hashes_the_region() {
        let (image, decoded) = rich_fixture();
        assert_eq!(decoded_region(&image, 0x100).unwrap(), decoded);
        assert_eq!(
            rich_hash(&image, 0x100).unwrap(),
            hex(&Md5::digest(&decoded))
        );
    }

    #[test]
    fn absent_header_is_none() {
        let image = pe32plus_fixture();
        assert_eq!(locate(&image, FIXTURE_PE_OFFSET as u64), None);
        assert_eq!(rich_hash(&image, FIXTURE_PE_OFFSET as u64), None);
    }
}
