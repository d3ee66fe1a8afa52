//! Typed wrappers over the DOS, COFF and optional headers and the data directory table.
//!
//! A wrapper is a named, typed view over a byte range of the document buffer: it knows its
//! absolute start offset, its size and a static table of named fields, each described by a
//! relative offset and width. Wrappers read through a borrowed buffer and never hold bytes
//! themselves, so they survive buffer reallocation and are cheap to rebuild after an edit.
//!
//! Writes deliberately do not exist on this level: every field mutation goes through
//! [`crate::PeDocument::set_num_value`], which journals the byte range first.
//!
//! # Examples
//!
//! ```rust,no_run
//! use peforge::{PeDocument, pe::{OptHdrField, StructView}};
//!
//! let doc = PeDocument::from_file(std::path::Path::new("app.exe"))?;
//! let subsystem = doc.opt_hdr().num_value(doc.data(), OptHdrField::Subsystem);
//! println!(
//!     "Subsystem: {}",
//!     doc.opt_hdr().translate_field_content(doc.data(), OptHdrField::Subsystem)
//! );
//! # let _ = subsystem;
//! # Ok::<(), peforge::Error>(())
//! ```

use strum::{EnumIter, IntoStaticStr};

use crate::{
    file::io::read_le_dyn,
    pe::{DirEntry, DIR_ENTRIES},
};

/// Location and width of one named field inside a structure wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Human-readable field name.
    pub name: &'static str,
    /// Offset relative to the wrapper's own start.
    pub offset: u64,
    /// Field width in bytes (1, 2, 4 or 8).
    pub width: u8,
}

/// Common contract of all structure wrappers.
///
/// Field ids are per-wrapper enums; the trait resolves them to offsets, raw numeric
/// values and display strings. Reads return `None` instead of failing when the wrapper's
/// range has been truncated out of the buffer - diagnostics still run on damaged files.
pub trait StructView {
    /// The field-id enum of this wrapper type.
    type Field: Copy;

    /// Display name of the wrapped structure.
    fn name(&self) -> &'static str;

    /// Absolute start offset within the document buffer.
    fn offset(&self) -> u64;

    /// Size of the wrapped region in bytes.
    fn size(&self) -> u64;

    /// Resolves a field id to its definition.
    fn field_def(&self, field: Self::Field) -> FieldDef;

    /// Absolute buffer offset of a field.
    fn field_offset(&self, field: Self::Field) -> u64 {
        self.offset() + self.field_def(field).offset
    }

    /// Name of a field.
    fn field_name(&self, field: Self::Field) -> &'static str {
        self.field_def(field).name
    }

    /// Reads a field's numeric value from the buffer, zero-extended to `u64`.
    fn num_value(&self, data: &[u8], field: Self::Field) -> Option<u64> {
        let def = self.field_def(field);
        read_le_dyn(data, usize::try_from(self.field_offset(field)).ok()?, def.width).ok()
    }

    /// Renders a field's content for humans; wrappers override this for flag fields.
    fn translate_field_content(&self, data: &[u8], field: Self::Field) -> String {
        match self.num_value(data, field) {
            Some(value) => format!("{value:#x}"),
            None => String::from("<invalid>"),
        }
    }
}

/// Fields of the DOS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum DosHdrField {
    /// `e_magic` - the `MZ` signature
    Magic,
    /// `e_lfanew` - file offset of the PE signature
    Lfanew,
}

/// View over the 64-byte DOS header at the start of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosHdrWrapper;

impl StructView for DosHdrWrapper {
    type Field = DosHdrField;

    fn name(&self) -> &'static str {
        "DOS Header"
    }

    fn offset(&self) -> u64 {
        0
    }

    fn size(&self) -> u64 {
        64
    }

    fn field_def(&self, field: DosHdrField) -> FieldDef {
        let (offset, width) = match field {
            DosHdrField::Magic => (0, 2),
            DosHdrField::Lfanew => (0x3C, 4),
        };
        FieldDef {
            name: field.into(),
            offset,
            width,
        }
    }
}

/// Fields of the COFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum FileHdrField {
    /// Target machine id
    Machine,
    /// Number of section headers
    SectionsCount,
    /// Link timestamp
    TimeDateStamp,
    /// Deprecated COFF symbol table pointer
    SymbolsPtr,
    /// Deprecated COFF symbol count
    SymbolsCount,
    /// Size of the optional header that follows
    OptHdrSize,
    /// Image characteristics flags
    Characteristics,
}

/// View over the 20-byte COFF header following the PE signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHdrWrapper {
    offset: u64,
}

impl FileHdrWrapper {
    /// Creates the view at the given absolute offset (just past `PE\0\0`).
    #[must_use]
    pub fn new(offset: u64) -> FileHdrWrapper {
        FileHdrWrapper { offset }
    }
}

impl StructView for FileHdrWrapper {
    type Field = FileHdrField;

    fn name(&self) -> &'static str {
        "File Header"
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> u64 {
        20
    }

    fn field_def(&self, field: FileHdrField) -> FieldDef {
        let (offset, width) = match field {
            FileHdrField::Machine => (0, 2),
            FileHdrField::SectionsCount => (2, 2),
            FileHdrField::TimeDateStamp => (4, 4),
            FileHdrField::SymbolsPtr => (8, 4),
            FileHdrField::SymbolsCount => (12, 4),
            FileHdrField::OptHdrSize => (16, 2),
            FileHdrField::Characteristics => (18, 2),
        };
        FieldDef {
            name: field.into(),
            offset,
            width,
        }
    }

    fn translate_field_content(&self, data: &[u8], field: FileHdrField) -> String {
        let Some(value) = self.num_value(data, field) else {
            return String::from("<invalid>");
        };
        match field {
            FileHdrField::Machine => String::from(match value {
                0x0 => "Unknown",
                0x14C => "Intel 386",
                0x1C0 => "ARM",
                0x1C4 => "ARM Thumb-2",
                0x200 => "Intel Itanium",
                0x8664 => "AMD64",
                0xAA64 => "ARM64",
                _ => "Other",
            }),
            _ => format!("{value:#x}"),
        }
    }
}

/// Fields of the optional header (PE32 and PE32+ aware).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum OptHdrField {
    /// PE32 (0x10B) / PE32+ (0x20B) magic
    Magic,
    /// Entry point RVA
    EntryPoint,
    /// RVA of the code section start
    CodeBase,
    /// Preferred load base
    ImageBase,
    /// Virtual section alignment
    SectionAlignment,
    /// Raw file alignment
    FileAlignment,
    /// Declared virtual image size
    ImageSize,
    /// Declared size of the header area
    HeadersSize,
    /// PE checksum field
    Checksum,
    /// Required subsystem
    Subsystem,
    /// DLL characteristics flags
    DllCharacteristics,
    /// Number of data directory slots
    DataDirCount,
}

/// View over the optional header.
///
/// PE32 and PE32+ lay several fields out differently (the image base widens to 8 bytes
/// and everything after the loader flags shifts); the wrapper resolves field offsets
/// against the magic it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptHdrWrapper {
    offset: u64,
    size: u64,
    is_64: bool,
}

impl OptHdrWrapper {
    /// Creates the view at the given absolute offset.
    #[must_use]
    pub fn new(offset: u64, size: u64, is_64: bool) -> OptHdrWrapper {
        OptHdrWrapper {
            offset,
            size,
            is_64,
        }
    }

    /// Whether this header uses the PE32+ layout.
    #[must_use]
    pub fn is_64(&self) -> bool {
        self.is_64
    }

    /// Absolute offset of the data directory table inside this header.
    #[must_use]
    pub fn data_dir_table_offset(&self) -> u64 {
        self.offset + if self.is_64 { 112 } else { 96 }
    }
}

impl StructView for OptHdrWrapper {
    type Field = OptHdrField;

    fn name(&self) -> &'static str {
        "Optional Header"
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn field_def(&self, field: OptHdrField) -> FieldDef {
        let (offset, width) = match field {
            OptHdrField::Magic => (0, 2),
            OptHdrField::EntryPoint => (16, 4),
            OptHdrField::CodeBase => (20, 4),
            OptHdrField::ImageBase => {
                if self.is_64 {
                    (24, 8)
                } else {
                    (28, 4)
                }
            }
            OptHdrField::SectionAlignment => (32, 4),
            OptHdrField::FileAlignment => (36, 4),
            OptHdrField::ImageSize => (56, 4),
            OptHdrField::HeadersSize => (60, 4),
            OptHdrField::Checksum => (64, 4),
            OptHdrField::Subsystem => (68, 2),
            OptHdrField::DllCharacteristics => (70, 2),
            OptHdrField::DataDirCount => {
                if self.is_64 {
                    (108, 4)
                } else {
                    (92, 4)
                }
            }
        };
        FieldDef {
            name: field.into(),
            offset,
            width,
        }
    }

    fn translate_field_content(&self, data: &[u8], field: OptHdrField) -> String {
        let Some(value) = self.num_value(data, field) else {
            return String::from("<invalid>");
        };
        match field {
            OptHdrField::Magic => String::from(match value {
                0x10B => "PE32",
                0x20B => "PE32+",
                0x107 => "ROM",
                _ => "Unknown",
            }),
            OptHdrField::Subsystem => String::from(match value {
                1 => "Native",
                2 => "Windows GUI",
                3 => "Windows Console",
                5 => "OS/2 Console",
                7 => "POSIX Console",
                9 => "Windows CE GUI",
                10 => "EFI Application",
                11 => "EFI Boot Service Driver",
                12 => "EFI Runtime Driver",
                13 => "EFI ROM",
                14 => "XBOX",
                16 => "Windows Boot Application",
                _ => "Unknown",
            }),
            _ => format!("{value:#x}"),
        }
    }
}

/// View over the data directory table at the tail of the optional header.
///
/// Each of the [`crate::pe::DIR_ENTRIES`] slots is an `(RVA, size)` pair of `u32`s. A
/// directory is considered present iff both halves are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDirTable {
    offset: u64,
}

impl DataDirTable {
    /// Creates the view at the given absolute offset.
    #[must_use]
    pub fn new(offset: u64) -> DataDirTable {
        DataDirTable { offset }
    }

    /// Absolute start offset of the table.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of the modelled table region in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        (DIR_ENTRIES * 8) as u64
    }

    /// Absolute offset of a directory's `(RVA, size)` slot.
    #[must_use]
    pub fn slot_offset(&self, dir: DirEntry) -> u64 {
        self.offset + (dir.index() * 8) as u64
    }

    /// Reads a directory's RVA and size; `None` when the slot is zero or truncated.
    #[must_use]
    pub fn entry(&self, data: &[u8], dir: DirEntry) -> Option<(u32, u32)> {
        let slot = usize::try_from(self.slot_offset(dir)).ok()?;
        let rva = read_le_dyn(data, slot, 4).ok()?;
        let size = read_le_dyn(data, slot + 4, 4).ok()?;
        if rva == 0 || size == 0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        Some((rva as u32, size as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{imports_fixture, pe32plus_fixture, FIXTURE_PE_OFFSET};

    const OPT_OFFSET: u64 = (FIXTURE_PE_OFFSET + 4 + 20) as u64;

    #[test]
    fn dos_header_fields() {
        let data = pe32plus_fixture();
        let dos = DosHdrWrapper;
        assert_eq!(dos.num_value(&data, DosHdrField::Magic), Some(0x5A4D));
        assert_eq!(
            dos.num_value(&data, DosHdrField::Lfanew),
            Some(FIXTURE_PE_OFFSET as u64)
        );
        assert_eq!(dos.field_offset(DosHdrField::Lfanew), 0x3C);
    }

    #[test]
    fn file_header_fields() {
        let data = pe32plus_fixture();
        let coff = FileHdrWrapper::new((FIXTURE_PE_OFFSET + 4) as u64);
        assert_eq!(coff.num_value(&data, FileHdrField::Machine), Some(0x8664));
        assert_eq!(coff.num_value(&data, FileHdrField::SectionsCount), Some(2));
        assert_eq!(coff.num_value(&data, FileHdrField::OptHdrSize), Some(240));
        assert_eq!(
            coff.translate_field_content(&data, FileHdrField::Machine),
            "AMD64"
        );
    }

    #[test]
    fn optional_header_fields_pe32plus() {
        let data = pe32plus_fixture();
        let opt = OptHdrWrapper::new(OPT_OFFSET, 240, true);
        assert_eq!(opt.num_value(&data, OptHdrField::Magic), Some(0x20B));
        assert_eq!(opt.num_value(&data, OptHdrField::EntryPoint), Some(0x1000));
        assert_eq!(
            opt.num_value(&data, OptHdrField::ImageBase),
            Some(0x1_4000_0000)
        );
        assert_eq!(opt.num_value(&data, OptHdrField::ImageSize), Some(0x3000));
        assert_eq!(opt.num_value(&data, OptHdrField::Subsystem), Some(3));
        assert_eq!(
            opt.translate_field_content(&data, OptHdrField::Subsystem),
            "Windows Console"
        );
        assert_eq!(opt.data_dir_table_offset(), OPT_OFFSET + 112);
    }

    #[test]
    fn truncated_read_is_none_not_garbage() {
        let data = &pe32plus_fixture()[..0x90];
        let opt = OptHdrWrapper::new(OPT_OFFSET, 240, true);
        assert_eq!(opt.num_value(data, OptHdrField::Checksum), None);
        assert_eq!(
            opt.translate_field_content(data, OptHdrField::Checksum),
            "<invalid>"
        );
    }

    #[test]
    fn data_dir_table_lookup() {
        let data = imports_fixture();
        let table = DataDirTable::new(OPT_OFFSET + 112);
        assert_eq!(
            table.entry(&data, DirEntry::Import),
            Some((0x3000, 60)),
            "import slot"
        );
        assert_eq!(table.entry(&data, DirEntry::Export), None);
        assert_eq!(
            table.slot_offset(DirEntry::Import),
            OPT_OFFSET + 112 + 8
        );
    }
}
