//! Import directory wrapper: descriptor walking and thunk resolution.
//!
//! The import table is a run of 20-byte descriptors terminated by an all-zero row. Each
//! descriptor names one library and points at two parallel thunk arrays (original first
//! thunk and first thunk). A thunk either carries the RVA of a hint/name entry or, with
//! the high bit set, imports by ordinal.
//!
//! # Key Components
//!
//! - [`crate::pe::ImportDirWrapper`] - Walks the descriptor run for the current buffer
//! - [`crate::pe::ImportEntry`] - One parsed descriptor with its resolved library name
//! - [`crate::pe::ImportedFunc`] - One resolved thunk, by name or by ordinal
//!
//! Like every wrapper, nothing here holds bytes: all lookups read through the borrowed
//! buffer and the current [`crate::pe::AddressSpace`], so the view stays correct across
//! journaled edits as long as the document rebuilds it afterwards.

use crate::{
    file::io::read_le_dyn,
    pe::{layout::AddressSpace, IMPORT_DESC_SIZE},
};

/// Upper bound on walked descriptors, against self-referencing corrupt tables.
const MAX_DESCRIPTORS: usize = 0x1000;

/// Upper bound on thunks walked per descriptor.
const MAX_THUNKS: usize = 0x4000;

/// Ordinal flag of a 64-bit thunk.
const ORDINAL_FLAG_64: u64 = 0x8000_0000_0000_0000;

/// Ordinal flag of a 32-bit thunk.
const ORDINAL_FLAG_32: u64 = 0x8000_0000;

/// Reads a NUL-terminated ASCII string at a raw offset.
///
/// Returns `None` when the offset is outside the buffer or no terminator exists before
/// the end of the buffer.
fn read_cstr(data: &[u8], offset: u64) -> Option<String> {
    let start = usize::try_from(offset).ok()?;
    let tail = data.get(start..)?;
    let len = tail.iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&tail[..len]).to_string())
}

/// One resolved import thunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedFunc {
    /// RVA of the thunk slot itself.
    pub thunk_rva: u64,
    /// Raw thunk value as stored.
    pub value: u64,
    /// Ordinal, when imported by ordinal.
    pub ordinal: Option<u64>,
    /// Hint from the hint/name entry, when imported by name.
    pub hint: Option<u16>,
    /// Function name, when imported by name.
    pub name: Option<String>,
}

impl ImportedFunc {
    /// The name shown for this import: the function name, or `ord<N>` for ordinals.
    #[must_use]
    pub fn display_name(&self) -> String {
        match (&self.name, self.ordinal) {
            (Some(name), _) => name.clone(),
            (None, Some(ordinal)) => format!("ord{ordinal}"),
            (None, None) => String::from("<invalid>"),
        }
    }
}

/// One parsed import descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Position of this descriptor in the table.
    pub index: usize,
    /// Raw file offset of the 20-byte descriptor.
    pub desc_offset: u64,
    /// RVA of the original first thunk array (import lookup table).
    pub original_first_thunk: u32,
    /// Binding timestamp.
    pub time_date_stamp: u32,
    /// Forwarder chain index.
    pub forwarder_chain: u32,
    /// RVA of the NUL-terminated library name.
    pub name_rva: u32,
    /// RVA of the first thunk array (import address table).
    pub first_thunk: u32,
    /// Resolved library name, when the name RVA maps into the file.
    pub lib_name: Option<String>,
}

impl ImportEntry {
    /// RVA of the thunk array used for lookups: the OFT, or the FT when no OFT exists.
    #[must_use]
    pub fn lookup_thunks_rva(&self) -> u32 {
        if self.original_first_thunk != 0 {
            self.original_first_thunk
        } else {
            self.first_thunk
        }
    }
}

/// View over the import directory of the current buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportDirWrapper {
    dir_rva: u32,
    dir_size: u32,
    is_64: bool,
}

impl ImportDirWrapper {
    /// Creates the view for the directory at `dir_rva` spanning `dir_size` bytes.
    #[must_use]
    pub fn new(dir_rva: u32, dir_size: u32, is_64: bool) -> ImportDirWrapper {
        ImportDirWrapper {
            dir_rva,
            dir_size,
            is_64,
        }
    }

    /// RVA the directory table entry points at.
    #[must_use]
    pub fn dir_rva(&self) -> u32 {
        self.dir_rva
    }

    /// Declared size of the directory.
    #[must_use]
    pub fn dir_size(&self) -> u32 {
        self.dir_size
    }

    /// Thunk slot width in bytes for this image's format.
    #[must_use]
    pub fn thunk_width(&self) -> u8 {
        if self.is_64 {
            8
        } else {
            4
        }
    }

    /// Walks the descriptor run and resolves each library name.
    ///
    /// The walk stops at the all-zero terminator, at the first descriptor whose RVA no
    /// longer maps into the file, or at a hard cap against corrupt self-referencing
    /// tables. Truncated tables yield the descriptors that could be read, never an error.
    #[must_use]
    pub fn entries(&self, data: &[u8], layout: &AddressSpace) -> Vec<ImportEntry> {
        let mut out = Vec::new();
        for index in 0..MAX_DESCRIPTORS {
            let desc_rva = u64::from(self.dir_rva) + (index * IMPORT_DESC_SIZE) as u64;
            let Some(desc_offset) = layout.rva_to_raw(desc_rva) else {
                break;
            };
            let Some(fields) = read_descriptor(data, desc_offset) else {
                break;
            };
            let [oft, timestamp, forwarder, name_rva, ft] = fields;
            if oft == 0 && name_rva == 0 && ft == 0 {
                break;
            }

            let lib_name = layout
                .rva_to_raw(u64::from(name_rva))
                .and_then(|raw| read_cstr(data, raw));

            out.push(ImportEntry {
                index,
                desc_offset,
                original_first_thunk: oft,
                time_date_stamp: timestamp,
                forwarder_chain: forwarder,
                name_rva,
                first_thunk: ft,
                lib_name,
            });
        }
        out
    }

    /// Number of descriptors before the terminator.
    #[must_use]
    pub fn entries_count(&self, data: &[u8], layout: &AddressSpace) -> usize {
        self.entries(data, layout).len()
    }

    /// RVA one past the terminator of the descriptor run.
    ///
    /// Capacity planning for appended descriptors starts here.
    #[must_use]
    pub fn descriptors_end_rva(&self, data: &[u8], layout: &AddressSpace) -> u64 {
        let count = self.entries_count(data, layout);
        u64::from(self.dir_rva) + ((count + 1) * IMPORT_DESC_SIZE) as u64
    }

    /// Resolves the thunks of one descriptor.
    ///
    /// Walks the lookup thunk array (OFT, falling back to FT) slot by slot until the
    /// zero terminator. For by-name thunks the hint/name entry is decoded; thunks whose
    /// targets fall outside the file keep their raw value with no name attached.
    #[must_use]
    pub fn thunks(
        &self,
        data: &[u8],
        layout: &AddressSpace,
        entry: &ImportEntry,
    ) -> Vec<ImportedFunc> {
        let width = self.thunk_width();
        let ordinal_flag = if self.is_64 {
            ORDINAL_FLAG_64
        } else {
            ORDINAL_FLAG_32
        };
        let table_rva = u64::from(entry.lookup_thunks_rva());
        if table_rva == 0 {
            return Vec::new();
        }

        let mut out = Vec::new();
        for slot in 0..MAX_THUNKS {
            let thunk_rva = table_rva + (slot as u64) * u64::from(width);
            let Some(raw) = layout.rva_to_raw(thunk_rva) else {
                break;
            };
            let Some(raw) = usize::try_from(raw).ok() else {
                break;
            };
            let Ok(value) = read_le_dyn(data, raw, width) else {
                break;
            };
            if value == 0 {
                break;
            }

            if value & ordinal_flag != 0 {
                out.push(ImportedFunc {
                    thunk_rva,
                    value,
                    ordinal: Some(value & !ordinal_flag),
                    hint: None,
                    name: None,
                });
                continue;
            }

            let hint_name_raw = layout.rva_to_raw(value);
            let hint = hint_name_raw.and_then(|raw| {
                read_le_dyn(data, usize::try_from(raw).ok()?, 2)
                    .ok()
                    .and_then(|v| u16::try_from(v).ok())
            });
            let name = hint_name_raw.and_then(|raw| read_cstr(data, raw + 2));
            out.push(ImportedFunc {
                thunk_rva,
                value,
                ordinal: None,
                hint,
                name,
            });
        }
        out
    }

    /// Library name owning the given thunk slot RVA, when any descriptor's thunk arrays
    /// cover it.
    #[must_use]
    pub fn thunk_to_lib_name(
        &self,
        data: &[u8],
        layout: &AddressSpace,
        thunk_rva: u64,
    ) -> Option<String> {
        for entry in self.entries(data, layout) {
            for func in self.thunks(data, layout, &entry) {
                if func.thunk_rva == thunk_rva {
                    return entry.lib_name;
                }
            }
        }
        None
    }

    /// Function imported through the given thunk slot RVA.
    #[must_use]
    pub fn thunk_to_function(
        &self,
        data: &[u8],
        layout: &AddressSpace,
        thunk_rva: u64,
    ) -> Option<ImportedFunc> {
        for entry in self.entries(data, layout) {
            for func in self.thunks(data, layout, &entry) {
                if func.thunk_rva == thunk_rva {
                    return Some(func);
                }
            }
        }
        None
    }
}

/// Reads the five `u32` fields of one descriptor; `None` when truncated.
fn read_descriptor(data: &[u8], desc_offset: u64) -> Option<[u32; 5]> {
    let base = usize::try_from(desc_offset).ok()?;
    let mut fields = [0u32; 5];
    for (i, field) in fields.iter_mut().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        {
            *field = read_le_dyn(data, base.checked_add(i * 4)?, 4).ok()? as u32;
        }
    }
    Some(fields)
}

#[cfg(test)]
mod tests {
    use goblin::pe::PE;

    use super::*;
    use crate::test::imports_fixture;

    fn fixture() -> (Vec<u8>, AddressSpace) {
        let image = imports_fixture();
        let len = image.len() as u64;
        let layout = AddressSpace::from_pe(&PE::parse(&image).unwrap(), len);
        (image, layout)
    }

    #[test]
    fn walks_descriptors_until_terminator() {
        let (data, layout) = fixture();
        let imports = ImportDirWrapper::new(0x3000, 60, true);

        let entries = imports.entries(&data, &layout);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].lib_name.as_deref(), Some("KERNEL32.dll"));
        assert_eq!(entries[1].lib_name.as_deref(), Some("user32.dll"));
        assert_eq!(entries[0].desc_offset, 0x800);
        assert_eq!(imports.descriptors_end_rva(&data, &layout), 0x3000 + 60);
    }

    #[test]
    fn resolves_by_name_and_by_ordinal_thunks() {
        let (data, layout) = fixture();
        let imports = ImportDirWrapper::new(0x3000, 60, true);
        let entries = imports.entries(&data, &layout);

        let kernel32 = imports.thunks(&data, &layout, &entries[0]);
        assert_eq!(kernel32.len(), 2);
        assert_eq!(kernel32[0].name.as_deref(), Some("ExitProcess"));
        assert_eq!(kernel32[0].ordinal, None);
        assert_eq!(kernel32[1].ordinal, Some(0x42));
        assert_eq!(kernel32[1].display_name(), "ord66");

        let user32 = imports.thunks(&data, &layout, &entries[1]);
        assert_eq!(user32.len(), 1);
        assert_eq!(user32[0].display_name(), "MessageBoxA");
    }

    #[test]
    fn thunk_slot_lookups() {
        let (data, layout) = fixture();
        let imports = ImportDirWrapper::new(0x3000, 60, true);

        assert_eq!(
            imports.thunk_to_lib_name(&data, &layout, 0x3100).as_deref(),
            Some("KERNEL32.dll")
        );
        let func = imports.thunk_to_function(&data, &layout, 0x3108);
        assert_eq!(func.map(|f| f.display_name()).as_deref(), Some("ord66"));
        assert_eq!(imports.thunk_to_lib_name(&data, &layout, 0x9999), None);
    }

    #[test]
    fn truncated_table_yields_partial_walk() {
        let (mut data, layout) = fixture();
        // corrupt descriptor 1's name RVA to point outside the image
        crate::file::io::write_le_dyn(&mut data, 0x800 + 20 + 12, 4, 0xFFFF_0000).unwrap();

        let imports = ImportDirWrapper::new(0x3000, 60, true);
        let entries = imports.entries(&data, &layout);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].lib_name, None);
    }
}
