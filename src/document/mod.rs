//! The editable PE document: buffer ownership, structural edits and diagnostics.
//!
//! [`crate::PeDocument`] is the hub of the crate. It owns the content buffer, the address
//! translator and every structure wrapper, and it is the only place where writes happen.
//! All mutating operations follow the same shape: validate preconditions, back the target
//! bytes up in the journal, mutate the buffer, re-derive every view from the new buffer
//! state, then notify subscribers. If re-derivation fails the journaled backup is replayed
//! and the operation reports an error with the buffer untouched.
//!
//! # Architecture
//!
//! The document never hands out references into its own derived state for longer than a
//! call: wrappers are `Copy` values holding offsets, and the translator is borrowed per
//! lookup. After any structural edit the full wrapper set and translator are rebuilt from
//! a fresh parse - stale views are discarded, not patched.
//!
//! # Key Components
//!
//! - [`crate::PeDocument`] - Owner of buffer, wrappers, journal and event hub
//! - [`crate::document::journal`] - Byte-backup journal with single-step undo
//! - [`crate::document::events`] - Typed notifications with panic-isolated dispatch
//! - [`crate::document::imports`] - Import table editing and capacity planning
//!
//! # Examples
//!
//! ```rust,no_run
//! use peforge::PeDocument;
//!
//! let mut doc = PeDocument::from_file(std::path::Path::new("app.exe"))?;
//! let index = doc.add_section(".patch", 0x400, 0x400)?;
//! println!("added section #{index}");
//! assert!(doc.is_modified());
//! doc.undo();
//! assert!(!doc.is_modified());
//! # Ok::<(), peforge::Error>(())
//! ```

pub mod events;
pub mod imports;
pub mod journal;

use std::{path::Path, sync::Arc};

use goblin::pe::PE;

use crate::{
    document::{
        events::{DocEvent, EventHub},
        journal::Journal,
    },
    file::{io::write_le_dyn, FileBuffer},
    hashes::Snapshot,
    pe::{
        layout::align_up, AddrType, AddressSpace, ClrDirWrapper, DataDirTable, DirEntry,
        DirectoryView, DosHdrWrapper, FileHdrField, FileHdrWrapper, ImportDirWrapper, OptHdrField,
        OptHdrWrapper, SectionCharacteristics, SectionHdrWrapper, StructView, DIR_ENTRIES,
        SECTION_HDR_SIZE, SECTION_NAME_LEN,
    },
    sig::{FoundPacker, SignatureSet},
    Result,
};

/// An editable PE document.
///
/// See the module docs for the edit pipeline every mutating operation follows.
#[derive(Debug)]
pub struct PeDocument {
    buffer: FileBuffer,
    layout: AddressSpace,
    is_64: bool,
    pe_offset: u64,
    loaded_base_override: Option<u64>,
    file_hdr: FileHdrWrapper,
    opt_hdr: OptHdrWrapper,
    dir_table: DataDirTable,
    sections: Vec<SectionHdrWrapper>,
    data_dirs: [Option<DirectoryView>; DIR_ENTRIES],
    journal: Journal,
    events: EventHub,
    found_packers: Vec<FoundPacker>,
}

impl PeDocument {
    /// Loads and parses the PE file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] for an empty file, [`crate::Error::FileError`] for
    /// I/O failures and [`crate::Error::GoblinErr`] when the container cannot be parsed.
    pub fn from_file(path: &Path) -> Result<PeDocument> {
        PeDocument::from_buffer(FileBuffer::from_file(path)?)
    }

    /// Parses an in-memory PE image.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`PeDocument::from_file`], minus the file I/O.
    pub fn from_mem(data: Vec<u8>) -> Result<PeDocument> {
        PeDocument::from_buffer(FileBuffer::from_mem(data)?)
    }

    fn from_buffer(buffer: FileBuffer) -> Result<PeDocument> {
        let mut doc = PeDocument {
            buffer,
            layout: AddressSpace::default(),
            is_64: false,
            pe_offset: 0,
            loaded_base_override: None,
            file_hdr: FileHdrWrapper::new(0),
            opt_hdr: OptHdrWrapper::new(0, 0, false),
            dir_table: DataDirTable::new(0),
            sections: Vec::new(),
            data_dirs: [None; DIR_ENTRIES],
            journal: Journal::new(),
            events: EventHub::default(),
            found_packers: Vec::new(),
        };
        doc.reparse()?;
        Ok(doc)
    }

    /// Rebuilds the translator and every wrapper from the current buffer state.
    fn reparse(&mut self) -> Result<()> {
        let data = self.buffer.data();
        let file_size = data.len() as u64;

        let pe = PE::parse(data)?;
        let pe_offset = u64::from(pe.header.dos_header.pe_pointer);
        let is_64 = pe.is_64;
        let opt_size = u64::from(pe.header.coff_header.size_of_optional_header);
        let sections_count = usize::from(pe.header.coff_header.number_of_sections);
        let layout = AddressSpace::from_pe(&pe, file_size);
        drop(pe);

        let opt_offset = pe_offset + 4 + 20;
        self.layout = layout;
        if let Some(base) = self.loaded_base_override {
            self.layout.set_loaded_base(base);
        }
        self.is_64 = is_64;
        self.pe_offset = pe_offset;
        self.file_hdr = FileHdrWrapper::new(pe_offset + 4);
        self.opt_hdr = OptHdrWrapper::new(opt_offset, opt_size, is_64);
        self.dir_table = DataDirTable::new(self.opt_hdr.data_dir_table_offset());

        let sec_table = opt_offset + opt_size;
        self.sections = (0..sections_count)
            .map(|index| SectionHdrWrapper::new(sec_table + (index * SECTION_HDR_SIZE) as u64, index))
            .collect();

        self.rewrap_data_dirs();
        Ok(())
    }

    /// Rebuilds the per-kind directory views from the current directory table.
    fn rewrap_data_dirs(&mut self) {
        let data = self.buffer.data();
        let mut dirs: [Option<DirectoryView>; DIR_ENTRIES] = [None; DIR_ENTRIES];
        for (index, slot) in dirs.iter_mut().enumerate() {
            // every index below DIR_ENTRIES maps to a kind
            let Some(kind) = DirEntry::from_repr(index) else {
                continue;
            };
            if let Some((rva, size)) = self.dir_table.entry(data, kind) {
                *slot = Some(DirectoryView::new(kind, rva, size, &self.layout));
            }
        }
        self.data_dirs = dirs;
    }

    /// Re-derives all views, rolling the journaled operation back on failure.
    fn reassociate_or_rollback(&mut self) -> Result<()> {
        if let Err(error) = self.reparse() {
            self.journal.undo_last(self.buffer.data_mut());
            // the pre-edit state parsed before, so this restores a consistent document
            self.reparse().ok();
            return Err(error);
        }
        Ok(())
    }

    // --- accessors ---

    /// The complete current content.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.buffer.data()
    }

    /// Current content size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The current address translator.
    #[must_use]
    pub fn layout(&self) -> &AddressSpace {
        &self.layout
    }

    /// Whether the image uses the PE32+ layout.
    #[must_use]
    pub fn is_64(&self) -> bool {
        self.is_64
    }

    /// File offset of the PE signature.
    #[must_use]
    pub fn pe_offset(&self) -> u64 {
        self.pe_offset
    }

    /// The DOS header wrapper.
    #[must_use]
    pub fn dos_hdr(&self) -> DosHdrWrapper {
        DosHdrWrapper
    }

    /// The COFF file header wrapper.
    #[must_use]
    pub fn file_hdr(&self) -> FileHdrWrapper {
        self.file_hdr
    }

    /// The optional header wrapper.
    #[must_use]
    pub fn opt_hdr(&self) -> OptHdrWrapper {
        self.opt_hdr
    }

    /// The data directory table wrapper.
    #[must_use]
    pub fn dir_table(&self) -> DataDirTable {
        self.dir_table
    }

    /// The section header wrappers in table order.
    #[must_use]
    pub fn sections(&self) -> &[SectionHdrWrapper] {
        &self.sections
    }

    /// The directory view for `dir`, when the file has one.
    #[must_use]
    pub fn directory(&self, dir: DirEntry) -> Option<DirectoryView> {
        self.data_dirs[dir.index()]
    }

    /// Whether the file has a non-empty directory of the given kind.
    #[must_use]
    pub fn has_directory(&self, dir: DirEntry) -> bool {
        self.data_dirs[dir.index()].is_some()
    }

    /// Declared size of a directory; zero when absent.
    #[must_use]
    pub fn dir_size(&self, dir: DirEntry) -> u64 {
        self.data_dirs[dir.index()]
            .map(|view| u64::from(view.size()))
            .unwrap_or(0)
    }

    /// The import directory wrapper, when the file has an import table.
    #[must_use]
    pub fn import_dir(&self) -> Option<ImportDirWrapper> {
        self.data_dirs[DirEntry::Import.index()]
            .map(|view| ImportDirWrapper::new(view.rva(), view.size(), self.is_64))
    }

    /// Overrides the base the image is treated as loaded at.
    ///
    /// Meant for images dumped from a relocated process. The override survives view
    /// re-derivation and feeds VA translation and the loaded-base diagnostic.
    pub fn set_loaded_base(&mut self, base: u64) {
        self.loaded_base_override = Some(base);
        self.layout.set_loaded_base(base);
    }

    /// Registers a callback for change notifications.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: Fn(&DocEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback);
    }

    // --- diagnostics ---

    /// Whether the declared image size matches the actually mapped sections.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.layout.last_mapped_rva() == self.layout.image_size()
    }

    /// Collects warnings about unusual but loadable layouts.
    ///
    /// Pure and infallible: runs the full check list in a fixed order and reports each
    /// finding as a human-readable string. An empty result means the file looks ordinary.
    #[must_use]
    pub fn atypical(&self) -> Vec<String> {
        let data = self.buffer.data();
        let mut warnings = Vec::new();

        if !self.is_valid() {
            warnings.push(String::from(
                "Declared image size does not match the last mapped RVA",
            ));
        }

        let base = self.layout.image_base();
        if base == 0 || base % 0x10000 != 0 {
            warnings.push(String::from("Image base is zero or not aligned to 64K"));
        }
        if self.layout.loaded_base() != base {
            warnings.push(String::from(
                "Loaded base differs from the declared image base",
            ));
        }

        if self.sections.is_empty() {
            warnings.push(String::from("File has no sections"));
        }

        if self.layout.is_virtual_format() {
            warnings.push(String::from("Sections are laid out like a memory dump"));
        }

        if self
            .file_hdr
            .num_value(data, FileHdrField::Machine)
            .unwrap_or(0)
            == 0
        {
            warnings.push(String::from("Machine id is zero"));
        }

        if self
            .opt_hdr
            .num_value(data, OptHdrField::Subsystem)
            .unwrap_or(0)
            == 0
        {
            warnings.push(String::from("Subsystem is zero"));
        }

        if self
            .opt_hdr
            .num_value(data, OptHdrField::Magic)
            .unwrap_or(0)
            == 0
        {
            warnings.push(String::from("Optional header magic is zero"));
        }

        let file_size = self.layout.file_size();
        let file_alignment = self.layout.file_alignment();
        for section in self.layout.sections() {
            let name = section.name_str();
            if section.raw_size == 0 || section.raw_ptr >= file_size {
                warnings.push(format!("Section {name} has no raw content mapped"));
                continue;
            }
            if file_alignment != 0 && section.raw_ptr % file_alignment != 0 {
                warnings.push(format!(
                    "Section {name} is misaligned to the file alignment"
                ));
            }
            if section.raw_ptr + section.raw_size > file_size {
                warnings.push(format!("Section {name} is truncated"));
            }
        }

        if let Some(view) = self.data_dirs[DirEntry::ComDescriptor.index()] {
            if let Some(raw) = view.raw_offset() {
                let clr = ClrDirWrapper::new(raw, u64::from(view.size()));
                if !clr.is_il_only(data) {
                    warnings.push(String::from(".NET image contains native code"));
                }
            }
        }

        warnings
    }

    // --- modification bookkeeping ---

    /// Whether any unsaved edit exists.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.journal.is_modified()
    }

    /// Number of undo steps currently available.
    #[must_use]
    pub fn count_operations(&self) -> usize {
        self.journal.count_operations()
    }

    /// Whether any recorded edit covers the given offset.
    #[must_use]
    pub fn is_in_modified_area(&self, offset: u64) -> bool {
        self.journal.is_modified_at(offset)
    }

    /// All edited `(offset, size)` ranges, for display consumers.
    #[must_use]
    pub fn modified_ranges(&self) -> Vec<(u64, u64)> {
        self.journal.modified_ranges()
    }

    /// End of the header area covered by base-header wrappers (section table included).
    fn headers_area_end(&self) -> u64 {
        self.opt_hdr.offset()
            + self.opt_hdr.size()
            + (self.sections.len() * SECTION_HDR_SIZE) as u64
    }

    /// Whether a byte range intersects the DOS/COFF/optional header area.
    #[must_use]
    pub fn is_base_hdr_modified(&self, offset: u64, size: u64) -> bool {
        offset < self.headers_area_end() && size > 0
    }

    /// Whether a byte range intersects the section header table.
    #[must_use]
    pub fn is_sections_headers_modified(&self, offset: u64, size: u64) -> bool {
        let table_start = self.opt_hdr.offset() + self.opt_hdr.size();
        let table_end = self.headers_area_end();
        offset < table_end && offset + size > table_start
    }

    /// Whether a byte range intersects the directory table or any directory's content.
    #[must_use]
    pub fn is_data_dir_modified(&self, offset: u64, size: u64) -> bool {
        let table_start = self.dir_table.offset();
        let table_end = table_start + self.dir_table.size();
        if offset < table_end && offset + size > table_start {
            return true;
        }

        self.data_dirs.iter().flatten().any(|view| {
            view.raw_span()
                .is_some_and(|(start, len)| offset < start + len && offset + size > start)
        })
    }

    // --- edit primitives ---

    /// Journals and applies a raw byte patch without re-deriving views.
    pub(crate) fn patch_raw(&mut self, offset: u64, bytes: &[u8], continue_last: bool) -> Result<()> {
        self.journal.backup_modification(
            self.buffer.data(),
            offset,
            bytes.len() as u64,
            continue_last,
        )?;
        let start = usize::try_from(offset).map_err(|_| out_of_bounds_error!())?;
        match self.buffer.data_slice_mut(start, bytes.len()) {
            Ok(target) => {
                target.copy_from_slice(bytes);
                Ok(())
            }
            Err(error) => {
                self.journal.unbackup_last();
                Err(error)
            }
        }
    }

    /// Journals and applies a header field write without re-deriving views.
    pub(crate) fn patch_field(
        &mut self,
        offset: u64,
        width: u8,
        value: u64,
        continue_last: bool,
    ) -> Result<()> {
        self.journal.backup_modification(
            self.buffer.data(),
            offset,
            u64::from(width),
            continue_last,
        )?;
        let start = usize::try_from(offset).map_err(|_| out_of_bounds_error!())?;
        if let Err(error) = write_le_dyn(self.buffer.data_mut(), start, width, value) {
            self.journal.unbackup_last();
            return Err(error);
        }
        Ok(())
    }

    /// Finishes an edit touching `offset..offset+size`: re-derives views when the range
    /// covers structural state, then notifies subscribers.
    fn finish_patch(&mut self, offset: u64, size: u64) -> Result<()> {
        if self.is_base_hdr_modified(offset, size) || self.is_data_dir_modified(offset, size) {
            self.reassociate_or_rollback()?;
        }
        self.events.emit(&DocEvent::Modified { offset, size });
        Ok(())
    }

    // --- structural edits ---

    /// Overwrites a byte range with the given content.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfBounds`] when the range exceeds the buffer; parse errors when
    /// the write corrupts structural headers (the buffer is rolled back in that case).
    pub fn subst_block(&mut self, offset: u64, bytes: &[u8], continue_last: bool) -> Result<()> {
        self.patch_raw(offset, bytes, continue_last)?;
        self.finish_patch(offset, bytes.len() as u64)
    }

    /// Fills a byte range with a single value.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`PeDocument::subst_block`].
    pub fn fill_block(
        &mut self,
        offset: u64,
        size: u64,
        value: u8,
        continue_last: bool,
    ) -> Result<()> {
        let len = usize::try_from(size).map_err(|_| out_of_bounds_error!())?;
        self.subst_block(offset, &vec![value; len], continue_last)
    }

    /// Zeroes a byte range.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`PeDocument::subst_block`].
    pub fn clear_block(&mut self, offset: u64, size: u64, continue_last: bool) -> Result<()> {
        self.fill_block(offset, size, 0, continue_last)
    }

    /// Overwrites a single byte.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`PeDocument::subst_block`].
    pub fn set_byte(&mut self, offset: u64, value: u8, continue_last: bool) -> Result<()> {
        self.subst_block(offset, &[value], continue_last)
    }

    /// Journals and writes one wrapper field, re-deriving views afterwards.
    ///
    /// This is the only sanctioned path for header field writes; wrappers themselves are
    /// read-only.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfBounds`] when the field lies outside the buffer; parse errors
    /// when the new value breaks the container (rolled back).
    pub fn set_num_value<W: StructView>(
        &mut self,
        wrapper: &W,
        field: W::Field,
        value: u64,
        continue_last: bool,
    ) -> Result<()> {
        let def = wrapper.field_def(field);
        let offset = wrapper.field_offset(field);
        self.patch_field(offset, def.width, value, continue_last)?;
        self.finish_patch(offset, u64::from(def.width))
    }

    /// Grows or shrinks the raw buffer; a shrink backs the cut tail up for undo.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Empty`] for a zero target size; parse errors when the resize cuts
    /// into structural headers (rolled back).
    pub fn resize(&mut self, new_size: u64, continue_last: bool) -> Result<()> {
        if new_size == 0 {
            return Err(crate::Error::Empty);
        }
        let old_size = self.buffer.len() as u64;
        if new_size == old_size {
            return Ok(());
        }

        self.journal
            .backup_resize(self.buffer.data(), new_size, continue_last);
        self.buffer
            .resize(usize::try_from(new_size).map_err(|_| out_of_bounds_error!())?);
        self.reassociate_or_rollback()?;
        self.events.emit(&DocEvent::Resized { old_size, new_size });
        Ok(())
    }

    /// Writes the declared image size field.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`PeDocument::set_num_value`].
    pub fn resize_image(&mut self, new_size: u32) -> Result<()> {
        let opt = self.opt_hdr;
        self.set_num_value(&opt, OptHdrField::ImageSize, u64::from(new_size), false)
    }

    /// Writes the entry point field after validating the RVA against the image.
    ///
    /// # Errors
    ///
    /// A malformed error for RVAs beyond the declared image size, plus the failure modes
    /// of [`PeDocument::set_num_value`].
    pub fn set_ep(&mut self, new_ep_rva: u32) -> Result<()> {
        if u64::from(new_ep_rva) >= self.layout.image_size() {
            return Err(malformed_error!(
                "Entry point {:#x} lies beyond the image size {:#x}",
                new_ep_rva,
                self.layout.image_size()
            ));
        }
        let opt = self.opt_hdr;
        self.set_num_value(&opt, OptHdrField::EntryPoint, u64::from(new_ep_rva), false)
    }

    /// Appends a section with the given raw and virtual sizes.
    ///
    /// Raw content is placed at the next file-alignment-aligned offset past the current
    /// end of the file, the virtual range at the next section-alignment-aligned RVA past
    /// the highest mapped section. Section count and image size are updated; the whole
    /// edit is one undo step. Returns the new section's index.
    ///
    /// # Errors
    ///
    /// [`crate::Error::SectionNameTooLong`] for names over 8 bytes and
    /// [`crate::Error::NoSpaceForSection`] when the header area has no room for another
    /// row; parse errors are rolled back.
    pub fn add_section(&mut self, name: &str, raw_size: u64, virt_size: u64) -> Result<usize> {
        if name.len() > SECTION_NAME_LEN {
            return Err(crate::Error::SectionNameTooLong(name.to_string()));
        }

        let index = self.sections.len();
        let table_start = self.opt_hdr.offset() + self.opt_hdr.size();
        let row_offset = table_start + (index * SECTION_HDR_SIZE) as u64;
        if row_offset + SECTION_HDR_SIZE as u64 > self.layout.headers_size() {
            return Err(crate::Error::NoSpaceForSection);
        }

        let file_alignment = self.layout.file_alignment();
        let section_alignment = self.layout.section_alignment();
        let raw_ptr = align_up(self.buffer.len() as u64, file_alignment);
        let raw_stored = align_up(raw_size, file_alignment);
        let virt_addr = self.layout.last_mapped_rva();
        let virt_stored = if virt_size == 0 { raw_size } else { virt_size };
        let image_end = align_up(virt_addr + virt_stored.max(raw_stored), section_alignment);

        // one coalesced undo step: resize, header row, section count, image size
        self.journal
            .backup_resize(self.buffer.data(), raw_ptr + raw_stored, false);
        self.buffer
            .resize(usize::try_from(raw_ptr + raw_stored).map_err(|_| out_of_bounds_error!())?);

        let mut row = [0u8; SECTION_HDR_SIZE];
        row[..name.len()].copy_from_slice(name.as_bytes());
        let characteristics = SectionCharacteristics::CODE
            | SectionCharacteristics::MEM_EXECUTE
            | SectionCharacteristics::MEM_READ
            | SectionCharacteristics::MEM_WRITE;
        #[allow(clippy::cast_possible_truncation)]
        {
            row[8..12].copy_from_slice(&(virt_stored as u32).to_le_bytes());
            row[12..16].copy_from_slice(&(virt_addr as u32).to_le_bytes());
            row[16..20].copy_from_slice(&(raw_stored as u32).to_le_bytes());
            row[20..24].copy_from_slice(&(raw_ptr as u32).to_le_bytes());
        }
        row[36..40].copy_from_slice(&characteristics.bits().to_le_bytes());
        self.patch_raw(row_offset, &row, true)?;

        let coff = self.file_hdr;
        self.patch_field(
            coff.field_offset(FileHdrField::SectionsCount),
            2,
            (index + 1) as u64,
            true,
        )?;
        let opt = self.opt_hdr;
        self.patch_field(
            opt.field_offset(OptHdrField::ImageSize),
            4,
            image_end,
            true,
        )?;

        self.reassociate_or_rollback()?;
        self.events.emit(&DocEvent::SectionsChanged);
        Ok(index)
    }

    /// Copies the content of an external file into a section's raw range.
    ///
    /// Shorter content fills from the start of the section and leaves the tail as-is.
    ///
    /// # Errors
    ///
    /// [`crate::Error::OutOfBounds`] for an invalid section index,
    /// [`crate::Error::ContentOverflow`] when the content exceeds the section's raw size,
    /// [`crate::Error::FileError`] for read failures.
    pub fn load_section_content(
        &mut self,
        section: usize,
        path: &Path,
        continue_last: bool,
    ) -> Result<()> {
        let mapping = self
            .layout
            .sections()
            .get(section)
            .ok_or(out_of_bounds_error!())?;
        let raw_ptr = mapping.raw_ptr;
        let capacity = mapping.raw_size;

        let content = std::fs::read(path)?;
        if content.len() as u64 > capacity {
            return Err(crate::Error::ContentOverflow {
                content: content.len() as u64,
                capacity,
            });
        }

        self.patch_raw(raw_ptr, &content, continue_last)?;
        self.finish_patch(raw_ptr, content.len() as u64)
    }

    /// Moves a data directory's content to `target_raw` and updates its table entry.
    ///
    /// The content is copied bit-for-bit, the vacated bytes outside the new range are
    /// zeroed and the table RVA is rewritten, all as one undo step. Overlapping source
    /// and target ranges are fine; the copied content always wins.
    ///
    /// # Errors
    ///
    /// [`crate::Error::DirectoryAbsent`] when the file has no such directory, a malformed
    /// error when either location does not map, [`crate::Error::OutOfBounds`] when the
    /// target range exceeds the file.
    pub fn move_data_dir_entry(&mut self, dir: DirEntry, target_raw: u64) -> Result<()> {
        self.move_data_dir_entry_inner(dir, target_raw, false)?;
        self.reassociate_or_rollback()?;
        self.events.emit(&DocEvent::DirectoryMoved(dir));
        Ok(())
    }

    /// Journals the directory move without re-deriving; shared with import relocation.
    pub(crate) fn move_data_dir_entry_inner(
        &mut self,
        dir: DirEntry,
        target_raw: u64,
        continue_last: bool,
    ) -> Result<()> {
        let view = self.data_dirs[dir.index()].ok_or(crate::Error::DirectoryAbsent(dir))?;
        let size = u64::from(view.size());
        let source = view
            .raw_offset()
            .ok_or_else(|| malformed_error!("Directory {} has no raw content", dir))?;
        if target_raw + size > self.buffer.len() as u64 {
            return Err(out_of_bounds_error!());
        }

        let new_value = if dir == DirEntry::Security {
            target_raw
        } else {
            self.layout
                .raw_to_rva(target_raw)
                .ok_or_else(|| malformed_error!("Target offset {:#x} is not mapped", target_raw))?
        };

        let content = self
            .buffer
            .data_slice(
                usize::try_from(source).map_err(|_| out_of_bounds_error!())?,
                usize::try_from(size).map_err(|_| out_of_bounds_error!())?,
            )?
            .to_vec();

        self.patch_raw(target_raw, &content, continue_last)?;

        // zero the vacated range, sparing whatever the new location now covers
        let target_end = target_raw + size;
        let source_end = source + size;
        let head_end = source_end.min(target_raw.max(source));
        if head_end > source {
            let len = usize::try_from(head_end - source).map_err(|_| out_of_bounds_error!())?;
            self.patch_raw(source, &vec![0u8; len], true)?;
        }
        let tail_start = source.max(target_end.min(source_end));
        if source_end > tail_start {
            let len =
                usize::try_from(source_end - tail_start).map_err(|_| out_of_bounds_error!())?;
            self.patch_raw(tail_start, &vec![0u8; len], true)?;
        }

        self.patch_field(self.dir_table.slot_offset(dir), 4, new_value, true)?;
        Ok(())
    }

    /// Copies every section's virtual address and size over its raw counterparts.
    ///
    /// Unmap helper for memory dumps stored in virtual layout; one undo step.
    ///
    /// # Errors
    ///
    /// Parse errors when the rewritten table breaks the container (rolled back).
    pub fn copy_virtual_sizes_to_raw(&mut self) -> Result<()> {
        let rows: Vec<(u64, u64, u64)> = self
            .sections
            .iter()
            .zip(self.layout.sections())
            .map(|(wrapper, mapping)| (wrapper.offset(), mapping.virt_addr, mapping.virt_size))
            .collect();

        let mut continue_last = false;
        for (row_offset, virt_addr, virt_size) in rows {
            self.patch_field(row_offset + 16, 4, virt_size, continue_last)?;
            self.patch_field(row_offset + 20, 4, virt_addr, true)?;
            continue_last = true;
        }

        self.reassociate_or_rollback()?;
        self.events.emit(&DocEvent::SectionsChanged);
        Ok(())
    }

    /// True when every section's raw layout coincides with its virtual layout.
    #[must_use]
    pub fn is_virtual_equal_raw(&self) -> bool {
        self.layout.is_virtual_equal_raw()
    }

    // --- undo / persistence ---

    /// Reverts the most recent undo step.
    ///
    /// Returns `false` on an unmodified document. The buffer returns to a state that
    /// parsed before, so view re-derivation is expected to succeed.
    pub fn undo(&mut self) -> bool {
        if !self.journal.undo_last(self.buffer.data_mut()) {
            return false;
        }
        self.reparse().ok();
        self.events.emit(&DocEvent::Undone);
        true
    }

    /// Clears the journal, making the current state the new unmodified baseline.
    pub fn un_modify(&mut self) {
        self.journal.un_modify();
    }

    /// Writes the complete buffer to disk.
    ///
    /// The journal is kept: saving does not reset the baseline, [`PeDocument::un_modify`]
    /// does.
    ///
    /// # Errors
    ///
    /// Surfaces I/O failures to the caller.
    pub fn save_to(&mut self, path: &Path) -> Result<()> {
        self.buffer.save_to(path)?;
        self.events.emit(&DocEvent::Saved);
        Ok(())
    }

    // --- hashing / scanning integration ---

    /// Takes an immutable snapshot for hash and scan computations.
    ///
    /// The snapshot owns a copy of the buffer, so in-flight edits can never tear a
    /// running computation.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            data: Arc::new(self.buffer.data().to_vec()),
            layout: self.layout.clone(),
            is_64: self.is_64,
            pe_offset: self.pe_offset,
            checksum_field_offset: self.opt_hdr.field_offset(OptHdrField::Checksum),
            import_dir: self.data_dirs[DirEntry::Import.index()]
                .map(|view| (view.rva(), view.size())),
        }
    }

    /// Scans for a packer signature starting at the translated offset.
    ///
    /// A hit is recorded in the document's packer list (deduplicated by offset and
    /// matched bytes) and returned. `None` when the start does not map or nothing
    /// matches.
    pub fn find_packer_sign(
        &mut self,
        start: u64,
        addr_type: AddrType,
        signatures: &SignatureSet,
    ) -> Option<FoundPacker> {
        let raw = self.layout.to_raw(start, addr_type)?;
        let found = signatures.scan_from(self.buffer.data(), raw)?;
        if !self.found_packers.contains(&found) {
            self.found_packers.push(found.clone());
        }
        Some(found)
    }

    /// Scans at the declared entry point.
    pub fn find_packer_at_ep(&mut self, signatures: &SignatureSet) -> Option<FoundPacker> {
        let ep = self
            .opt_hdr
            .num_value(self.buffer.data(), OptHdrField::EntryPoint)?;
        self.find_packer_sign(ep, AddrType::Rva, signatures)
    }

    /// Whether any packer signature has matched so far.
    #[must_use]
    pub fn is_packed(&self) -> bool {
        !self.found_packers.is_empty()
    }

    /// All packer matches recorded so far.
    #[must_use]
    pub fn found_packers(&self) -> &[FoundPacker] {
        &self.found_packers
    }
}
