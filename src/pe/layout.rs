//! Address translation between the RAW, RVA and VA spaces of a PE image.
//!
//! A PE file describes the same bytes in three coordinate systems: the RAW offset in the
//! file on disk, the RVA relative to the load base, and the absolute VA. Every structural
//! edit in this crate needs to move between them, so the translator is the leaf dependency
//! of the whole document model.
//!
//! # Design
//!
//! [`crate::pe::AddressSpace`] is a pure snapshot of the section table: it owns copies of
//! the section ranges and never touches the byte buffer after construction. Translation
//! misses return `None` (the INVALID sentinel) instead of errors, since lookups happen on
//! hot per-field paths. Malformed structural state is *not* diagnosed here - the document's
//! validity checks own that concern.
//!
//! A translator is only correct for the buffer state it was derived from. The document
//! rebuilds it after every structural edit; holding one across a resize is a correctness
//! bug, which is why [`crate::PeDocument::layout`] hands out a borrow rather than a clone.
//!
//! # Examples
//!
//! ```rust,no_run
//! use peforge::{PeDocument, pe::AddrType};
//!
//! let doc = PeDocument::from_file(std::path::Path::new("app.exe"))?;
//! let layout = doc.layout();
//!
//! // Round-trip between RAW and RVA
//! if let Some(raw) = layout.rva_to_raw(0x1000) {
//!     assert_eq!(layout.raw_to_rva(raw), Some(0x1000));
//! }
//!
//! // VA translation is image-base relative
//! if let Some(va) = layout.rva_to_va(0x1000) {
//!     assert_eq!(layout.va_to_rva(va, false), Some(0x1000));
//! }
//! # Ok::<(), peforge::Error>(())
//! ```

use goblin::pe::PE;

/// The three address spaces a PE byte range can be described in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AddrType {
    /// Byte position within the file as stored on disk.
    Raw,
    /// Offset relative to the image's base when loaded into memory.
    Rva,
    /// Absolute in-memory address (image base + RVA).
    Va,
}

/// One section's placement in both the raw file and the virtual image.
///
/// Owned copy of the interesting columns of a section header; offsets and lengths only,
/// so the mapping stays valid while the buffer reallocates underneath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMapping {
    /// Fixed-width section name, NUL padded.
    pub name: [u8; 8],
    /// File offset of the section's raw data.
    pub raw_ptr: u64,
    /// Size of the raw data on disk.
    pub raw_size: u64,
    /// RVA the section is mapped at.
    pub virt_addr: u64,
    /// Size of the section once mapped.
    pub virt_size: u64,
    /// Section characteristics flags.
    pub characteristics: u32,
}

impl SectionMapping {
    /// The section name with NUL padding stripped.
    #[must_use]
    pub fn name_str(&self) -> &str {
        std::str::from_utf8(&self.name)
            .unwrap_or("<invalid>")
            .trim_end_matches('\0')
    }

    /// The virtual span used for RVA containment: the virtual size, or the raw size for
    /// sections that declare none.
    #[must_use]
    pub fn virt_span(&self) -> u64 {
        if self.virt_size == 0 {
            self.raw_size
        } else {
            self.virt_size
        }
    }
}

/// Translator between the RAW, RVA and VA spaces of a parsed image.
///
/// Derived from the current headers and section table; see the module docs for the
/// staleness contract. All methods are pure and return `None` for addresses that do not
/// map, never a garbage offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSpace {
    image_base: u64,
    loaded_base: u64,
    file_alignment: u64,
    section_alignment: u64,
    headers_size: u64,
    image_size: u64,
    file_size: u64,
    sections: Vec<SectionMapping>,
}

/// Rounds `value` up to the next multiple of `alignment` (no-op for zero alignment).
#[must_use]
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

impl AddressSpace {
    /// Derives a translator from a parsed PE and the current buffer size.
    ///
    /// Files without an optional header get a degenerate translator (zero alignments and
    /// image size) so that diagnostics can still run on them.
    #[must_use]
    pub fn from_pe(pe: &PE, file_size: u64) -> AddressSpace {
        let (file_alignment, section_alignment, headers_size, image_size) =
            match pe.header.optional_header {
                Some(opt) => (
                    u64::from(opt.windows_fields.file_alignment),
                    u64::from(opt.windows_fields.section_alignment),
                    u64::from(opt.windows_fields.size_of_headers),
                    u64::from(opt.windows_fields.size_of_image),
                ),
                None => (0, 0, 0, 0),
            };

        let sections = pe
            .sections
            .iter()
            .map(|section| SectionMapping {
                name: section.name,
                raw_ptr: u64::from(section.pointer_to_raw_data),
                raw_size: u64::from(section.size_of_raw_data),
                virt_addr: u64::from(section.virtual_address),
                virt_size: u64::from(section.virtual_size),
                characteristics: section.characteristics,
            })
            .collect();

        AddressSpace {
            image_base: pe.image_base as u64,
            loaded_base: pe.image_base as u64,
            file_alignment,
            section_alignment,
            headers_size,
            image_size,
            file_size,
            sections,
        }
    }

    /// The image base declared in the optional header.
    #[must_use]
    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    /// The base the image is actually mapped at.
    ///
    /// Equal to [`AddressSpace::image_base`] for files on disk; memory dumps may override
    /// it via [`AddressSpace::set_loaded_base`].
    #[must_use]
    pub fn loaded_base(&self) -> u64 {
        self.loaded_base
    }

    /// Overrides the loaded base, e.g. for an image dumped from a relocated process.
    pub fn set_loaded_base(&mut self, base: u64) {
        self.loaded_base = base;
    }

    /// The declared file alignment.
    #[must_use]
    pub fn file_alignment(&self) -> u64 {
        self.file_alignment
    }

    /// The declared section alignment.
    #[must_use]
    pub fn section_alignment(&self) -> u64 {
        self.section_alignment
    }

    /// The declared size of the header area.
    #[must_use]
    pub fn headers_size(&self) -> u64 {
        self.headers_size
    }

    /// The declared virtual image size.
    #[must_use]
    pub fn image_size(&self) -> u64 {
        self.image_size
    }

    /// The size of the backing file buffer.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The owned section table snapshot.
    #[must_use]
    pub fn sections(&self) -> &[SectionMapping] {
        &self.sections
    }

    /// Count of sections whose raw range actually lies inside the file.
    #[must_use]
    pub fn mapped_sections_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|section| section.raw_size > 0 && section.raw_ptr < self.file_size)
            .count()
    }

    /// Index of the section containing `value` in the given address space.
    #[must_use]
    pub fn section_at(&self, value: u64, addr_type: AddrType) -> Option<usize> {
        let rva = match addr_type {
            AddrType::Raw => {
                return self.sections.iter().position(|section| {
                    value >= section.raw_ptr && value < section.raw_ptr + section.raw_size
                });
            }
            AddrType::Rva => value,
            AddrType::Va => self.va_to_rva(value, false)?,
        };

        self.sections.iter().position(|section| {
            rva >= section.virt_addr && rva < section.virt_addr + section.virt_span()
        })
    }

    /// Converts a RAW file offset to an RVA.
    ///
    /// Offsets below the header area translate identity; offsets inside a section's raw
    /// data translate through the section mapping; everything else is unmapped.
    #[must_use]
    pub fn raw_to_rva(&self, raw: u64) -> Option<u64> {
        if raw >= self.file_size {
            return None;
        }
        if raw < self.headers_size {
            return Some(raw);
        }

        for section in &self.sections {
            if raw >= section.raw_ptr && raw < section.raw_ptr + section.raw_size {
                let delta = raw - section.raw_ptr;
                // raw padding beyond the virtual span has no address once mapped
                if delta >= section.virt_span() {
                    return None;
                }
                return Some(section.virt_addr + delta);
            }
        }

        None
    }

    /// Converts an RVA to a RAW file offset.
    ///
    /// A RAW offset exists iff the RVA falls into a section's mapped, file-backed range;
    /// virtual padding (the tail between raw size and virtual size) yields `None`.
    #[must_use]
    pub fn rva_to_raw(&self, rva: u64) -> Option<u64> {
        if rva < self.headers_size {
            if rva >= self.file_size {
                return None;
            }
            return Some(rva);
        }

        for section in &self.sections {
            if rva >= section.virt_addr && rva < section.virt_addr + section.virt_span() {
                let delta = rva - section.virt_addr;
                if delta >= section.raw_size {
                    return None;
                }
                let raw = section.raw_ptr + delta;
                if raw >= self.file_size {
                    return None;
                }
                return Some(raw);
            }
        }

        None
    }

    /// Converts an RVA to an absolute VA.
    #[must_use]
    pub fn rva_to_va(&self, rva: u64) -> Option<u64> {
        if self.image_size != 0 && rva > self.image_size {
            return None;
        }
        self.loaded_base.checked_add(rva)
    }

    /// Converts an absolute VA back to an RVA.
    ///
    /// With `allow_outside` set, addresses beyond the declared image size still translate;
    /// otherwise they are treated as unmapped. Addresses below the base never translate.
    #[must_use]
    pub fn va_to_rva(&self, va: u64, allow_outside: bool) -> Option<u64> {
        if va < self.loaded_base {
            return None;
        }
        let rva = va - self.loaded_base;
        if !allow_outside && self.image_size != 0 && rva > self.image_size {
            return None;
        }
        Some(rva)
    }

    /// Converts a value in any address space to a RAW file offset.
    ///
    /// RAW inputs are bounds-checked only; RVA and VA inputs go through the section table.
    #[must_use]
    pub fn to_raw(&self, value: u64, addr_type: AddrType) -> Option<u64> {
        match addr_type {
            AddrType::Raw => {
                if value >= self.file_size {
                    None
                } else {
                    Some(value)
                }
            }
            AddrType::Rva => self.rva_to_raw(value),
            AddrType::Va => self.rva_to_raw(self.va_to_rva(value, false)?),
        }
    }

    /// The section-alignment-aligned end of the highest mapped virtual range.
    ///
    /// For a well-formed file this equals the declared image size; the document's
    /// validity check relies on exactly that equality.
    #[must_use]
    pub fn last_mapped_rva(&self) -> u64 {
        let mut last = align_up(self.headers_size, self.section_alignment);
        for section in &self.sections {
            let end = align_up(
                section.virt_addr + section.virt_span(),
                self.section_alignment,
            );
            if end > last {
                last = end;
            }
        }
        last
    }

    /// Heuristic for memory-dump layout: every section stored at its virtual address.
    ///
    /// Only meaningful when the two alignments differ; a file whose alignments are equal
    /// legitimately stores sections at their RVAs.
    #[must_use]
    pub fn is_virtual_format(&self) -> bool {
        !self.sections.is_empty()
            && self.file_alignment != self.section_alignment
            && self
                .sections
                .iter()
                .all(|section| section.raw_ptr == section.virt_addr)
    }

    /// True when every section's raw layout coincides with its virtual layout.
    #[must_use]
    pub fn is_virtual_equal_raw(&self) -> bool {
        self.sections.iter().all(|section| {
            section.raw_ptr == section.virt_addr && section.raw_size == section.virt_span()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::pe32plus_fixture;

    fn fixture_layout() -> AddressSpace {
        let image = pe32plus_fixture();
        let pe = PE::parse(&image).unwrap();
        AddressSpace::from_pe(&pe, image.len() as u64)
    }

    #[test]
    fn header_area_translates_identity() {
        let layout = fixture_layout();
        assert_eq!(layout.rva_to_raw(0x80), Some(0x80));
        assert_eq!(layout.raw_to_rva(0x80), Some(0x80));
    }

    #[test]
    fn section_roundtrip() {
        let layout = fixture_layout();
        // .text: raw 0x400, rva 0x1000 in the fixture
        let raw = layout.rva_to_raw(0x1010).unwrap();
        assert_eq!(raw, 0x410);
        assert_eq!(layout.raw_to_rva(raw), Some(0x1010));

        // every mapped rva round-trips
        for rva in [0x1000u64, 0x1100, 0x11FF, 0x2000, 0x2080] {
            let raw = layout.rva_to_raw(rva).expect("mapped rva");
            assert_eq!(layout.raw_to_rva(raw), Some(rva), "rva {rva:#x}");
        }
    }

    #[test]
    fn unmapped_is_invalid_not_garbage() {
        let layout = fixture_layout();
        // between headers end and first section
        assert_eq!(layout.rva_to_raw(0x0F00), None);
        // far beyond the image
        assert_eq!(layout.rva_to_raw(0x0100_0000), None);
        // raw offset beyond the file
        assert_eq!(layout.raw_to_rva(layout.file_size() + 0x10), None);
    }

    #[test]
    fn va_translation_respects_base() {
        let layout = fixture_layout();
        let base = layout.image_base();
        assert_eq!(layout.rva_to_va(0x1000), Some(base + 0x1000));
        assert_eq!(layout.va_to_rva(base + 0x1000, false), Some(0x1000));
        assert_eq!(layout.va_to_rva(base - 1, false), None);
        // outside the image, only with the explicit override
        assert_eq!(layout.va_to_rva(base + 0x0100_0000, false), None);
        assert_eq!(
            layout.va_to_rva(base + 0x0100_0000, true),
            Some(0x0100_0000)
        );
    }

    #[test]
    fn last_mapped_matches_image_size() {
        let layout = fixture_layout();
        assert_eq!(layout.last_mapped_rva(), layout.image_size());
    }

    #[test]
    fn section_lookup() {
        let layout = fixture_layout();
        assert_eq!(layout.section_at(0x1000, AddrType::Rva), Some(0));
        assert_eq!(layout.section_at(0x410, AddrType::Raw), Some(0));
        assert_eq!(layout.section_at(0x0F00, AddrType::Rva), None);
        assert_eq!(layout.sections()[0].name_str(), ".text");
    }

    #[test]
    fn not_a_virtual_format() {
        let layout = fixture_layout();
        assert!(!layout.is_virtual_format());
        assert!(!layout.is_virtual_equal_raw());
    }
}
