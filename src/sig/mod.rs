//! Packer signature patterns and scanning.
//!
//! A signature is a byte pattern with `??` wildcards, typically anchored at the entry
//! point of packed executables. Sets are parsed from a simple text database (one
//! `name = AA BB ?? CC` line per signature) and matched with a linear window scan over
//! the raw buffer. Matches are reported as [`FoundPacker`] values whose identity is the
//! matched location and bytes, so re-scanning never duplicates a finding under a renamed
//! signature.

use crate::Result;

/// One named byte pattern; `None` entries match any byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Display name of the packer or tool this pattern detects.
    pub name: String,
    pattern: Vec<Option<u8>>,
}

impl Signature {
    /// Parses a pattern of whitespace-separated hex bytes and `??` wildcards.
    ///
    /// # Errors
    ///
    /// A malformed error for empty patterns and tokens that are neither two hex digits
    /// nor `??`.
    pub fn parse(name: &str, pattern: &str) -> Result<Signature> {
        let mut parsed = Vec::new();
        for token in pattern.split_whitespace() {
            if token == "??" {
                parsed.push(None);
                continue;
            }
            if token.len() != 2 {
                return Err(malformed_error!("Bad signature token - {}", token));
            }
            let byte = u8::from_str_radix(token, 16)
                .map_err(|_| malformed_error!("Bad signature token - {}", token))?;
            parsed.push(Some(byte));
        }
        if parsed.is_empty() {
            return Err(malformed_error!("Empty signature pattern - {}", name));
        }

        Ok(Signature {
            name: name.to_string(),
            pattern: parsed,
        })
    }

    /// Pattern length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    /// Whether the pattern holds no bytes (never true for parsed signatures).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Whether the pattern matches at the start of `window`.
    #[must_use]
    pub fn matches(&self, window: &[u8]) -> bool {
        if window.len() < self.pattern.len() {
            return false;
        }
        self.pattern
            .iter()
            .zip(window)
            .all(|(expected, actual)| expected.is_none_or(|byte| byte == *actual))
    }
}

/// One signature match in the document.
#[derive(Debug, Clone, Eq)]
pub struct FoundPacker {
    /// Raw offset the pattern matched at.
    pub offset: u64,
    /// Name of the matching signature.
    pub name: String,
    /// The actual bytes the pattern covered.
    pub bytes: Vec<u8>,
}

impl FoundPacker {
    /// Length of the matched range.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Identity is the matched location and bytes; the signature name is display-only.
impl PartialEq for FoundPacker {
    fn eq(&self, other: &FoundPacker) -> bool {
        self.offset == other.offset && self.bytes == other.bytes
    }
}

/// A parsed signature database.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SignatureSet {
    signatures: Vec<Signature>,
}

impl SignatureSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> SignatureSet {
        SignatureSet::default()
    }

    /// Adds one signature.
    pub fn push(&mut self, signature: Signature) {
        self.signatures.push(signature);
    }

    /// Number of signatures in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether the set holds no signatures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Parses a text database: one `name = pattern` per line.
    ///
    /// Blank lines and lines starting with `#` are skipped; the first `=` separates the
    /// name (trimmed, may contain spaces) from the pattern.
    ///
    /// # Errors
    ///
    /// A malformed error for lines without `=` or with unparsable patterns.
    pub fn from_text(text: &str) -> Result<SignatureSet> {
        let mut set = SignatureSet::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, pattern)) = line.split_once('=') else {
                return Err(malformed_error!("Bad signature line - {}", line));
            };
            set.push(Signature::parse(name.trim(), pattern)?);
        }
        Ok(set)
    }

    /// Matches every signature at exactly `offset`; the longest match wins.
    #[must_use]
    pub fn scan_at(&self, data: &[u8], offset: u64) -> Option<FoundPacker> {
        let start = usize::try_from(offset).ok()?;
        let window = data.get(start..)?;

        let mut best: Option<&Signature> = None;
        for signature in &self.signatures {
            if signature.matches(window)
                && best.is_none_or(|current| signature.len() > current.len())
            {
                best = Some(signature);
            }
        }

        best.map(|signature| FoundPacker {
            offset,
            name: signature.name.clone(),
            bytes: window[..signature.len()].to_vec(),
        })
    }

    /// Linear window scan from `from` to the end of the buffer; first hit wins.
    #[must_use]
    pub fn scan_from(&self, data: &[u8], from: u64) -> Option<FoundPacker> {
        let start = usize::try_from(from).ok()?;
        for offset in start..data.len() {
            if let Some(found) = self.scan_at(data, offset as u64) {
                return Some(found);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_wildcards_and_rejects_junk() {
        let signature = Signature::parse("upx", "60 BE ?? ?? ?? 00").unwrap();
        assert_eq!(signature.len(), 6);
        assert!(Signature::parse("bad", "GG").is_err());
        assert!(Signature::parse("bad", "ABC").is_err());
        assert!(Signature::parse("empty", "   ").is_err());
    }

    #[test]
    fn wildcard_match() {
        let signature = Signature::parse("test", "60 ?? 90").unwrap();
        assert!(signature.matches(&[0x60, 0xFF, 0x90, 0x01]));
        assert!(signature.matches(&[0x60, 0x00, 0x90]));
        assert!(!signature.matches(&[0x60, 0xFF, 0x91]));
        assert!(!signature.matches(&[0x60, 0xFF]));
    }

    #[test]
    fn database_parse_skips_comments() {
        let set = SignatureSet::from_text(
            "# packer db\n\
             upx 3.x = 60 BE ?? ?? ?? ??\n\
             \n\
             mew = E9 ?? ?? ?? ?? 00",
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert!(SignatureSet::from_text("no separator line").is_err());
    }

    #[test]
    fn linear_scan_finds_later_match() {
        let set = SignatureSet::from_text("marker = DE AD BE EF").unwrap();
        let mut data = vec![0u8; 64];
        data[40..44].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let found = set.scan_from(&data, 8).unwrap();
        assert_eq!(found.offset, 40);
        assert_eq!(found.size(), 4);
        assert_eq!(found.bytes, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(set.scan_from(&data, 44), None);
    }

    #[test]
    fn longest_match_wins_at_same_offset() {
        let mut set = SignatureSet::new();
        set.push(Signature::parse("short", "60 BE").unwrap());
        set.push(Signature::parse("long", "60 BE 00 01").unwrap());

        let found = set.scan_at(&[0x60, 0xBE, 0x00, 0x01, 0xFF], 0).unwrap();
        assert_eq!(found.name, "long");
    }

    #[test]
    fn equality_ignores_the_signature_name() {
        let a = FoundPacker {
            offset: 8,
            name: String::from("upx"),
            bytes: vec![1, 2, 3],
        };
        let b = FoundPacker {
            offset: 8,
            name: String::from("renamed"),
            bytes: vec![1, 2, 3],
        };
        assert_eq!(a, b);
        assert_ne!(
            a,
            FoundPacker {
                offset: 9,
                ..b
            }
        );
    }
}
