//! Section header wrappers and characteristics decoding.
//!
//! One [`crate::pe::SectionHdrWrapper`] exists per row of the section table. Besides the
//! generic field-table access every header wrapper shares, the section wrapper answers the
//! question the edit engine cares about most: where the section's content actually starts,
//! both as *declared* in the header and as *mapped* by the loader. The two disagree on
//! files with raw pointers misaligned to the file alignment, which is one of the
//! atypicality diagnostics.

use bitflags::bitflags;
use strum::{EnumIter, IntoStaticStr};

use crate::pe::{
    headers::{FieldDef, StructView},
    layout::{AddrType, AddressSpace},
    SECTION_HDR_SIZE,
};

bitflags! {
    /// Section characteristics flags (`IMAGE_SCN_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionCharacteristics: u32 {
        /// Contains executable code
        const CODE = 0x0000_0020;
        /// Contains initialized data
        const INITIALIZED_DATA = 0x0000_0040;
        /// Contains uninitialized data
        const UNINITIALIZED_DATA = 0x0000_0080;
        /// Can be discarded after load
        const MEM_DISCARDABLE = 0x0200_0000;
        /// Must not be cached
        const MEM_NOT_CACHED = 0x0400_0000;
        /// Must not be paged out
        const MEM_NOT_PAGED = 0x0800_0000;
        /// Shareable between processes
        const MEM_SHARED = 0x1000_0000;
        /// Executable
        const MEM_EXECUTE = 0x2000_0000;
        /// Readable
        const MEM_READ = 0x4000_0000;
        /// Writable
        const MEM_WRITE = 0x8000_0000;
    }
}

/// Fields of one section header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum SectionHdrField {
    /// Fixed 8-byte section name
    Name,
    /// Size of the section once mapped
    VirtualSize,
    /// RVA the section maps at
    VirtualAddress,
    /// Size of the raw data on disk
    RawSize,
    /// File offset of the raw data
    RawPtr,
    /// Deprecated relocation pointer
    RelocsPtr,
    /// Deprecated line number pointer
    LinenumsPtr,
    /// Deprecated relocation count
    RelocsCount,
    /// Deprecated line number count
    LinenumsCount,
    /// Section characteristics flags
    Characteristics,
}

/// View over one 40-byte section header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHdrWrapper {
    offset: u64,
    index: usize,
}

impl SectionHdrWrapper {
    /// Creates the view for the `index`-th row starting at the absolute `offset`.
    #[must_use]
    pub fn new(offset: u64, index: usize) -> SectionHdrWrapper {
        SectionHdrWrapper { offset, index }
    }

    /// Zero-based position of this section in the table.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Reads the section name with NUL padding stripped.
    #[must_use]
    pub fn name_str(&self, data: &[u8]) -> String {
        let start = usize::try_from(self.offset).unwrap_or(usize::MAX);
        match data.get(start..start + 8) {
            Some(raw) => String::from_utf8_lossy(raw)
                .trim_end_matches('\0')
                .to_string(),
            None => String::from("<invalid>"),
        }
    }

    /// Start offset of the section content in the requested address space.
    ///
    /// With `mapped` unset this is the header-declared value, read straight from the
    /// buffer. With `mapped` set it is the offset the loader would actually use: raw
    /// pointers get truncated down to the file alignment, and ranges outside the file
    /// are unmapped (`None`). The two results differing is exactly the "misaligned to
    /// FileAlignment" condition the document reports as atypical.
    #[must_use]
    pub fn content_offset(
        &self,
        data: &[u8],
        layout: &AddressSpace,
        addr_type: AddrType,
        mapped: bool,
    ) -> Option<u64> {
        let declared = match addr_type {
            AddrType::Raw => self.num_value(data, SectionHdrField::RawPtr)?,
            AddrType::Rva => self.num_value(data, SectionHdrField::VirtualAddress)?,
            AddrType::Va => {
                let rva = self.num_value(data, SectionHdrField::VirtualAddress)?;
                return if mapped { layout.rva_to_va(rva) } else { None };
            }
        };
        if !mapped {
            return Some(declared);
        }

        match addr_type {
            AddrType::Raw => {
                let alignment = layout.file_alignment();
                let aligned = if alignment == 0 {
                    declared
                } else {
                    (declared / alignment) * alignment
                };
                if aligned >= layout.file_size() {
                    return None;
                }
                Some(aligned)
            }
            _ => Some(declared),
        }
    }
}

impl StructView for SectionHdrWrapper {
    type Field = SectionHdrField;

    fn name(&self) -> &'static str {
        "Section Header"
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> u64 {
        SECTION_HDR_SIZE as u64
    }

    fn field_def(&self, field: SectionHdrField) -> FieldDef {
        let (offset, width) = match field {
            SectionHdrField::Name => (0, 8),
            SectionHdrField::VirtualSize => (8, 4),
            SectionHdrField::VirtualAddress => (12, 4),
            SectionHdrField::RawSize => (16, 4),
            SectionHdrField::RawPtr => (20, 4),
            SectionHdrField::RelocsPtr => (24, 4),
            SectionHdrField::LinenumsPtr => (28, 4),
            SectionHdrField::RelocsCount => (32, 2),
            SectionHdrField::LinenumsCount => (34, 2),
            SectionHdrField::Characteristics => (36, 4),
        };
        FieldDef {
            name: field.into(),
            offset,
            width,
        }
    }

    fn translate_field_content(&self, data: &[u8], field: SectionHdrField) -> String {
        match field {
            SectionHdrField::Name => self.name_str(data),
            SectionHdrField::Characteristics => {
                let Some(value) = self.num_value(data, field) else {
                    return String::from("<invalid>");
                };
                #[allow(clippy::cast_possible_truncation)]
                let flags = SectionCharacteristics::from_bits_truncate(value as u32);
                if flags.is_empty() {
                    String::from("none")
                } else {
                    format!("{flags:?}")
                        .trim_start_matches("SectionCharacteristics(")
                        .trim_end_matches(')')
                        .to_string()
                }
            }
            _ => match self.num_value(data, field) {
                Some(value) => format!("{value:#x}"),
                None => String::from("<invalid>"),
            },
        }
    }
}
