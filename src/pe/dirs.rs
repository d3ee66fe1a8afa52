//! Per-kind data directory views.
//!
//! A [`crate::pe::DirectoryView`] is the uniform handle the document keeps per present
//! directory: the kind, the `(RVA, size)` pair from the directory table, and the resolved
//! raw span. The security directory is the one oddball whose table entry stores a raw
//! file offset rather than an RVA, and the view hides that asymmetry.
//!
//! The CLR runtime header additionally gets a typed field wrapper so its flags can be
//! read and decoded like any other header.

use strum::{EnumIter, IntoStaticStr};

use crate::pe::{
    headers::{FieldDef, StructView},
    layout::AddressSpace,
    DirEntry, CLR_FLAG_ILONLY,
};

/// Resolved view over one present data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryView {
    kind: DirEntry,
    rva: u32,
    size: u32,
    raw_offset: Option<u64>,
}

impl DirectoryView {
    /// Resolves the view for a non-zero directory table entry.
    ///
    /// For [`DirEntry::Security`] the table value already is a raw offset; for every
    /// other kind the RVA is translated through the layout, leaving `raw_offset` unset
    /// when the directory lives only in the virtual image.
    #[must_use]
    pub fn new(kind: DirEntry, rva: u32, size: u32, layout: &AddressSpace) -> DirectoryView {
        let raw_offset = if kind == DirEntry::Security {
            Some(u64::from(rva))
        } else {
            layout.rva_to_raw(u64::from(rva))
        };
        DirectoryView {
            kind,
            rva,
            size,
            raw_offset,
        }
    }

    /// The directory kind.
    #[must_use]
    pub fn kind(&self) -> DirEntry {
        self.kind
    }

    /// Table value of the entry (an RVA, or a raw offset for the security directory).
    #[must_use]
    pub fn rva(&self) -> u32 {
        self.rva
    }

    /// Declared size of the directory in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Raw file offset of the directory content, when it maps into the file.
    #[must_use]
    pub fn raw_offset(&self) -> Option<u64> {
        self.raw_offset
    }

    /// Raw byte span of the directory content, when it maps into the file.
    #[must_use]
    pub fn raw_span(&self) -> Option<(u64, u64)> {
        self.raw_offset.map(|start| (start, u64::from(self.size)))
    }

    /// Whether the given RVA falls inside this directory's declared span.
    ///
    /// Always false for the security directory, whose table value is not an RVA.
    #[must_use]
    pub fn contains_rva(&self, rva: u64) -> bool {
        if self.kind == DirEntry::Security {
            return false;
        }
        rva >= u64::from(self.rva) && rva < u64::from(self.rva) + u64::from(self.size)
    }
}

/// Fields of the CLR runtime header (`IMAGE_COR20_HEADER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum ClrDirField {
    /// Header size in bytes
    Cb,
    /// Minimum runtime major version
    MajorRuntimeVersion,
    /// Minimum runtime minor version
    MinorRuntimeVersion,
    /// RVA of the metadata root
    MetaDataRva,
    /// Size of the metadata
    MetaDataSize,
    /// Runtime flags
    Flags,
    /// Managed entry point token (or native entry RVA)
    EntryPointToken,
}

/// View over the CLR runtime header pointed at by the COM descriptor directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClrDirWrapper {
    offset: u64,
    size: u64,
}

impl ClrDirWrapper {
    /// Creates the view at the directory's resolved raw offset.
    #[must_use]
    pub fn new(offset: u64, size: u64) -> ClrDirWrapper {
        ClrDirWrapper { offset, size }
    }

    /// Whether the flags mark the image as pure IL.
    #[must_use]
    pub fn is_il_only(&self, data: &[u8]) -> bool {
        match self.num_value(data, ClrDirField::Flags) {
            Some(flags) => flags & u64::from(CLR_FLAG_ILONLY) != 0,
            None => false,
        }
    }
}

impl StructView for ClrDirWrapper {
    type Field = ClrDirField;

    fn name(&self) -> &'static str {
        "CLR Runtime Header"
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn field_def(&self, field: ClrDirField) -> FieldDef {
        let (offset, width) = match field {
            ClrDirField::Cb => (0, 4),
            ClrDirField::MajorRuntimeVersion => (4, 2),
            ClrDirField::MinorRuntimeVersion => (6, 2),
            ClrDirField::MetaDataRva => (8, 4),
            ClrDirField::MetaDataSize => (12, 4),
            ClrDirField::Flags => (16, 4),
            ClrDirField::EntryPointToken => (20, 4),
        };
        FieldDef {
            name: field.into(),
            offset,
            width,
        }
    }

    fn translate_field_content(&self, data: &[u8], field: ClrDirField) -> String {
        let Some(value) = self.num_value(data, field) else {
            return String::from("<invalid>");
        };
        match field {
            ClrDirField::Flags => {
                if value & u64::from(CLR_FLAG_ILONLY) != 0 {
                    format!("{value:#x} (IL only)")
                } else {
                    format!("{value:#x}")
                }
            }
            _ => format!("{value:#x}"),
        }
    }
}
