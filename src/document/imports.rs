//! Import table editing: appending libraries and functions, bulk auto-add.
//!
//! The import table offers very little slack: descriptors must stay contiguous and every
//! string and thunk array has to live somewhere the loader can reach. All editing here is
//! planned against *zeroed* space - either the slack after the existing descriptor run,
//! or a freshly added section when the batch does not fit in place.
//!
//! The bulk path ([`crate::PeDocument::auto_add_imports`]) is all-or-nothing: the full
//! byte block (descriptors, thunk tables, hint/name entries, library names) is laid out
//! offline and capacity-checked before the first byte of the document changes. Planning
//! failures leave the buffer untouched; execution failures roll back through the journal.

use crate::{
    document::{events::DocEvent, PeDocument},
    file::io::write_le_dyn,
    pe::{AddrType, DirEntry, ImportDirWrapper, IMPORT_DESC_SIZE},
    Result,
};

/// One function to import, by name or by ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// Import by hint/name entry.
    Name(String),
    /// Import by ordinal.
    Ordinal(u16),
}

/// One library and its functions for the bulk auto-adder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLib {
    /// DLL name as it should appear in the descriptor.
    pub name: String,
    /// Functions to import from this library.
    pub functions: Vec<ImportTarget>,
}

impl ImportLib {
    /// Starts a library entry with no functions.
    #[must_use]
    pub fn new(name: &str) -> ImportLib {
        ImportLib {
            name: name.to_string(),
            functions: Vec::new(),
        }
    }

    /// Adds a by-name import.
    #[must_use]
    pub fn by_name(mut self, function: &str) -> ImportLib {
        self.functions.push(ImportTarget::Name(function.to_string()));
        self
    }

    /// Adds a by-ordinal import.
    #[must_use]
    pub fn by_ordinal(mut self, ordinal: u16) -> ImportLib {
        self.functions.push(ImportTarget::Ordinal(ordinal));
        self
    }
}

/// Settings for the bulk import auto-adder.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportsAutoadderSettings {
    /// Libraries to append, in order.
    pub libs: Vec<ImportLib>,
}

impl ImportsAutoadderSettings {
    /// Empty settings.
    #[must_use]
    pub fn new() -> ImportsAutoadderSettings {
        ImportsAutoadderSettings::default()
    }

    /// Appends a library.
    #[must_use]
    pub fn with_lib(mut self, lib: ImportLib) -> ImportsAutoadderSettings {
        self.libs.push(lib);
        self
    }
}

/// Length of the leading zero run of `data[start..limit]`.
fn zero_run(data: &[u8], start: usize, limit: usize) -> usize {
    let limit = limit.min(data.len());
    if start >= limit {
        return 0;
    }
    data[start..limit]
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(limit - start)
}

/// First 2-aligned offset in `[from, limit)` holding `size` zero bytes.
fn find_zero_run(data: &[u8], from: usize, limit: usize, size: usize) -> Option<usize> {
    let mut cursor = from + (from % 2);
    while cursor + size <= limit.min(data.len()) {
        if data[cursor..cursor + size].iter().all(|&b| b == 0) {
            return Some(cursor);
        }
        cursor += 2;
    }
    None
}

/// Lays out the byte block appended after the existing descriptor run.
///
/// The block starts with the new descriptors plus the terminator row (so it overwrites
/// the old terminator at `base_rva`), followed by the thunk tables, hint/name entries
/// and library names of each new library. All embedded RVAs assume the block lands at
/// `base_rva`.
fn plan_additions(base_rva: u64, libs: &[ImportLib], is_64: bool) -> Vec<u8> {
    let width: usize = if is_64 { 8 } else { 4 };
    let ordinal_flag: u64 = if is_64 { 1 << 63 } else { 1 << 31 };

    let mut block = vec![0u8; (libs.len() + 1) * IMPORT_DESC_SIZE];
    for (index, lib) in libs.iter().enumerate() {
        let slots = lib.functions.len() + 1;
        let oft_rel = block.len();
        block.resize(block.len() + slots * width, 0);
        let ft_rel = block.len();
        block.resize(block.len() + slots * width, 0);

        let mut values = Vec::with_capacity(lib.functions.len());
        for function in &lib.functions {
            match function {
                ImportTarget::Ordinal(ordinal) => values.push(ordinal_flag | u64::from(*ordinal)),
                ImportTarget::Name(name) => {
                    if block.len() % 2 == 1 {
                        block.push(0);
                    }
                    let rel = block.len();
                    block.extend_from_slice(&[0, 0]); // hint
                    block.extend_from_slice(name.as_bytes());
                    block.push(0);
                    values.push(base_rva + rel as u64);
                }
            }
        }

        if block.len() % 2 == 1 {
            block.push(0);
        }
        let name_rel = block.len();
        block.extend_from_slice(lib.name.as_bytes());
        block.push(0);

        for (slot, value) in values.iter().enumerate() {
            // in-bounds by construction
            write_le_dyn(&mut block, oft_rel + slot * width, width as u8, *value).ok();
            write_le_dyn(&mut block, ft_rel + slot * width, width as u8, *value).ok();
        }

        let desc = index * IMPORT_DESC_SIZE;
        #[allow(clippy::cast_possible_truncation)]
        {
            block[desc..desc + 4].copy_from_slice(&((base_rva + oft_rel as u64) as u32).to_le_bytes());
            block[desc + 12..desc + 16]
                .copy_from_slice(&((base_rva + name_rel as u64) as u32).to_le_bytes());
            block[desc + 16..desc + 20]
                .copy_from_slice(&((base_rva + ft_rel as u64) as u32).to_le_bytes());
        }
    }
    block
}

impl PeDocument {
    /// The import wrapper, or the absent-directory error.
    fn import_dir_required(&self) -> Result<ImportDirWrapper> {
        self.import_dir()
            .ok_or(crate::Error::DirectoryAbsent(DirEntry::Import))
    }

    /// Raw bounds `(append_offset, section_end)` of the slack after the descriptor run.
    ///
    /// The returned start points at the terminator row, which is part of the usable
    /// space for descriptor appends but must be skipped for string allocations.
    fn import_slack(&self) -> Result<(u64, u64)> {
        let wrapper = self.import_dir_required()?;
        let count = wrapper.entries_count(self.data(), self.layout());
        let append_rva = u64::from(wrapper.dir_rva()) + (count * IMPORT_DESC_SIZE) as u64;
        let append_raw = self
            .layout()
            .rva_to_raw(append_rva)
            .ok_or_else(|| malformed_error!("Import table end {:#x} is not mapped", append_rva))?;
        let section = self
            .layout()
            .section_at(append_rva, AddrType::Rva)
            .ok_or_else(|| malformed_error!("Import table lies outside all sections"))?;
        let mapping = &self.layout().sections()[section];
        Ok((append_raw, mapping.raw_ptr + mapping.raw_size))
    }

    /// Whether the slack after the import table can hold `count` more descriptors.
    ///
    /// The first appended descriptor takes the current terminator's row, so `count`
    /// descriptors plus the moved terminator need `(count + 1)` zeroed rows.
    #[must_use]
    pub fn can_add_imports_lib(&self, count: usize) -> bool {
        let Ok((append_raw, section_end)) = self.import_slack() else {
            return false;
        };
        let start = usize::try_from(append_raw).unwrap_or(usize::MAX);
        let limit = usize::try_from(section_end).unwrap_or(usize::MAX);
        zero_run(self.data(), start, limit) >= (count + 1) * IMPORT_DESC_SIZE
    }

    /// Appends one library descriptor (no functions yet) to the import table.
    ///
    /// The descriptor takes the old terminator's row; its name string and empty thunk
    /// tables go into the zeroed slack behind the table. Returns the new library index.
    ///
    /// # Errors
    ///
    /// [`crate::Error::DirectoryAbsent`] without an import table,
    /// [`crate::Error::ImportCapacity`] when the slack cannot hold the addition.
    pub fn add_import_lib(&mut self, name: &str, continue_last: bool) -> Result<usize> {
        let wrapper = self.import_dir_required()?;
        let count = wrapper.entries_count(self.data(), self.layout());
        let append_rva = u64::from(wrapper.dir_rva()) + (count * IMPORT_DESC_SIZE) as u64;

        let block = plan_additions(append_rva, &[ImportLib::new(name)], self.is_64());
        let (append_raw, section_end) = self.import_slack()?;
        let start = usize::try_from(append_raw).map_err(|_| out_of_bounds_error!())?;
        let limit = usize::try_from(section_end).map_err(|_| out_of_bounds_error!())?;
        let available = zero_run(self.data(), start, limit);
        if available < block.len() {
            return Err(crate::Error::ImportCapacity {
                needed: block.len() as u64,
                available: available as u64,
            });
        }

        self.patch_raw(append_raw, &block, continue_last)?;
        let size_slot = self.dir_table().slot_offset(DirEntry::Import) + 4;
        self.patch_field(size_slot, 4, ((count + 2) * IMPORT_DESC_SIZE) as u64, true)?;
        self.finish_import_edit(append_raw, block.len() as u64)?;
        Ok(count)
    }

    /// Appends one function to a library's thunk tables.
    ///
    /// The new thunk takes the terminator slot of both tables; by-name imports get a
    /// hint/name entry allocated from zeroed space inside the import section.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfBounds`] for an invalid library index,
    /// [`crate::Error::ImportCapacity`] when a thunk slot or the hint/name entry cannot
    /// be placed.
    pub fn add_import_func(
        &mut self,
        lib_index: usize,
        target: &ImportTarget,
        continue_last: bool,
    ) -> Result<()> {
        let wrapper = self.import_dir_required()?;
        let entries = wrapper.entries(self.data(), self.layout());
        let entry = entries.get(lib_index).ok_or(out_of_bounds_error!())?;
        let existing = wrapper.thunks(self.data(), self.layout(), entry);
        let width = u64::from(wrapper.thunk_width());

        // the new thunk takes the terminator slot; the slot after it becomes the new
        // terminator and must already be zero in both tables
        let mut slots = Vec::new();
        for table in [entry.original_first_thunk, entry.first_thunk] {
            if table == 0 {
                continue;
            }
            let slot_rva = u64::from(table) + existing.len() as u64 * width;
            for probe in [slot_rva, slot_rva + width] {
                let raw = self.layout().rva_to_raw(probe).ok_or_else(|| {
                    crate::Error::ImportCapacity {
                        needed: 2 * width,
                        available: probe - slot_rva,
                    }
                })?;
                let start = usize::try_from(raw).map_err(|_| out_of_bounds_error!())?;
                let run = zero_run(self.data(), start, start + width as usize);
                if run < width as usize {
                    return Err(crate::Error::ImportCapacity {
                        needed: 2 * width,
                        available: probe - slot_rva,
                    });
                }
            }
            // slot raw offset is mapped per the probe above
            slots.push(self.layout().rva_to_raw(slot_rva).unwrap_or(0));
        }
        if slots.is_empty() {
            return Err(malformed_error!(
                "Import descriptor {} has no thunk tables",
                lib_index
            ));
        }

        let value = match target {
            ImportTarget::Ordinal(ordinal) => {
                let flag: u64 = if self.is_64() { 1 << 63 } else { 1 << 31 };
                flag | u64::from(*ordinal)
            }
            ImportTarget::Name(name) => {
                let needed = 2 + name.len() + 1;
                let (append_raw, section_end) = self.import_slack()?;
                // skip the terminator row, it must stay zero
                let from = usize::try_from(append_raw + IMPORT_DESC_SIZE as u64)
                    .map_err(|_| out_of_bounds_error!())?;
                let limit = usize::try_from(section_end).map_err(|_| out_of_bounds_error!())?;
                let spot = find_zero_run(self.data(), from, limit, needed).ok_or(
                    crate::Error::ImportCapacity {
                        needed: needed as u64,
                        available: zero_run(self.data(), from, limit) as u64,
                    },
                )?;

                let mut entry_bytes = vec![0u8; 2];
                entry_bytes.extend_from_slice(name.as_bytes());
                entry_bytes.push(0);
                self.patch_raw(spot as u64, &entry_bytes, continue_last)?;
                self.layout()
                    .raw_to_rva(spot as u64)
                    .ok_or_else(|| malformed_error!("Hint/name spot {:#x} is not mapped", spot))?
            }
        };

        let mut continue_thunks = continue_last || matches!(target, ImportTarget::Name(_));
        #[allow(clippy::cast_possible_truncation)]
        for slot_raw in slots {
            self.patch_field(slot_raw, width as u8, value, continue_thunks)?;
            continue_thunks = true;
        }
        self.finish_import_edit(0, 0)?;
        Ok(())
    }

    /// Bulk-appends libraries and functions as one undo step, all-or-nothing.
    ///
    /// The whole addition (descriptors, thunk tables, hint/name entries, names) is laid
    /// out offline first. If it fits in the zeroed slack behind the existing table, it is
    /// written in place. Otherwise a new section is added and the directory is relocated
    /// into it before the block is written. On any planning failure the buffer is
    /// untouched; execution failures roll the journaled operation back.
    ///
    /// # Errors
    ///
    /// [`crate::Error::DirectoryAbsent`] without an import table,
    /// [`crate::Error::NoSpaceForSection`] when relocation is needed but the header area
    /// is full, plus rolled-back parse errors.
    pub fn auto_add_imports(&mut self, settings: &ImportsAutoadderSettings) -> Result<()> {
        if settings.libs.is_empty() {
            return Ok(());
        }
        let wrapper = self.import_dir_required()?;
        let count = wrapper.entries_count(self.data(), self.layout());
        let dir_rva = u64::from(wrapper.dir_rva());
        let new_dir_size = ((count + settings.libs.len() + 1) * IMPORT_DESC_SIZE) as u64;
        let size_slot = self.dir_table().slot_offset(DirEntry::Import) + 4;

        // in-place attempt: block lands right after the existing descriptors
        let append_rva = dir_rva + (count * IMPORT_DESC_SIZE) as u64;
        let block = plan_additions(append_rva, &settings.libs, self.is_64());
        if let Ok((append_raw, section_end)) = self.import_slack() {
            let start = usize::try_from(append_raw).map_err(|_| out_of_bounds_error!())?;
            let limit = usize::try_from(section_end).map_err(|_| out_of_bounds_error!())?;
            if zero_run(self.data(), start, limit) >= block.len() {
                self.patch_raw(append_raw, &block, false)?;
                self.patch_field(size_slot, 4, new_dir_size, true)?;
                self.finish_import_edit(append_raw, block.len() as u64)?;
                return Ok(());
            }
        }

        // relocation: lay the block out against the section the edit will create
        let new_section_rva = self.layout().last_mapped_rva();
        let base_rva = new_section_rva + (count * IMPORT_DESC_SIZE) as u64;
        let block = plan_additions(base_rva, &settings.libs, self.is_64());
        let total = (count * IMPORT_DESC_SIZE + block.len()) as u64;

        // add_section validates name and header room before writing anything
        let section = self.add_section(".imps", total, total)?;
        let new_raw = self.layout().sections()[section].raw_ptr;
        if let Err(error) =
            self.write_relocated_block(new_raw, count, &block, size_slot, new_dir_size)
        {
            // the section edits above are part of the same journaled operation
            self.journal.undo_last(self.buffer.data_mut());
            self.reparse().ok();
            return Err(error);
        }
        self.finish_import_edit(new_raw, total)?;
        self.events.emit(&DocEvent::DirectoryMoved(DirEntry::Import));
        Ok(())
    }

    /// Relocation tail of the bulk adder; journaled into the caller's open operation.
    fn write_relocated_block(
        &mut self,
        new_raw: u64,
        count: usize,
        block: &[u8],
        size_slot: u64,
        new_dir_size: u64,
    ) -> Result<()> {
        self.move_data_dir_entry_inner(DirEntry::Import, new_raw, true)?;
        self.patch_raw(new_raw + (count * IMPORT_DESC_SIZE) as u64, block, true)?;
        self.patch_field(size_slot, 4, new_dir_size, true)
    }

    /// Re-derives views with rollback and emits the modification event.
    fn finish_import_edit(&mut self, offset: u64, size: u64) -> Result<()> {
        self.reassociate_or_rollback()?;
        self.events.emit(&DocEvent::Modified { offset, size });
        Ok(())
    }
}
