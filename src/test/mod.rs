//! Shared fixture builders used in unit- and integration-tests.
//!
//! All fixtures are synthesized in memory rather than shipped as binary samples: each
//! builder lays out a minimal but structurally honest PE image (valid DOS/COFF/optional
//! headers, aligned sections, consistent image size) byte by byte. Deliberately free of
//! crate dependencies so the integration suites can include this file by path.

#![allow(dead_code)]

/// File offset of the PE signature in all fixtures without a rich header.
pub const FIXTURE_PE_OFFSET: usize = 0x80;

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

/// One section header row for the fixture builders.
pub struct FixtureSection {
    pub name: &'static [u8],
    pub virt_size: u32,
    pub virt_addr: u32,
    pub raw_size: u32,
    pub raw_ptr: u32,
    pub characteristics: u32,
}

/// Assembles a PE image from headers plus section rows.
///
/// `pe_offset` leaves room for DOS stub content (e.g. a rich header) before the PE
/// signature. The caller is responsible for keeping image size and section ranges
/// consistent; the standard fixtures below do.
pub fn build_image(
    pe_offset: usize,
    is_64: bool,
    image_size: u32,
    file_size: usize,
    sections: &[FixtureSection],
    dos_stub: &[u8],
) -> Vec<u8> {
    let mut image = vec![0u8; file_size];

    // DOS header
    put_bytes(&mut image, 0, b"MZ");
    put_u32(&mut image, 0x3C, pe_offset as u32);
    put_bytes(&mut image, 0x40, dos_stub);

    // PE signature + COFF header
    put_bytes(&mut image, pe_offset, b"PE\0\0");
    let coff = pe_offset + 4;
    put_u16(&mut image, coff, if is_64 { 0x8664 } else { 0x014C });
    put_u16(&mut image, coff + 2, sections.len() as u16);
    let opt_size: u16 = if is_64 { 240 } else { 224 };
    put_u16(&mut image, coff + 16, opt_size);
    put_u16(&mut image, coff + 18, 0x0102); // EXECUTABLE_IMAGE | 32BIT_MACHINE

    // Optional header
    let opt = coff + 20;
    put_u16(&mut image, opt, if is_64 { 0x20B } else { 0x10B });
    put_u32(&mut image, opt + 16, 0x1000); // entry point
    put_u32(&mut image, opt + 20, 0x1000); // base of code
    if is_64 {
        put_u64(&mut image, opt + 24, 0x1_4000_0000);
    } else {
        put_u32(&mut image, opt + 28, 0x0040_0000);
    }
    put_u32(&mut image, opt + 32, 0x1000); // section alignment
    put_u32(&mut image, opt + 36, 0x200); // file alignment
    put_u16(&mut image, opt + 40, 6); // major OS version
    put_u16(&mut image, opt + 48, 6); // major subsystem version
    put_u32(&mut image, opt + 56, image_size);
    put_u32(&mut image, opt + 60, 0x400); // size of headers
    put_u16(&mut image, opt + 68, 3); // subsystem: console
    put_u32(&mut image, opt + if is_64 { 108 } else { 92 }, 16); // rva&sizes count

    // Section table
    let sec_table = opt + opt_size as usize;
    for (i, section) in sections.iter().enumerate() {
        let row = sec_table + i * 40;
        put_bytes(&mut image, row, section.name);
        put_u32(&mut image, row + 8, section.virt_size);
        put_u32(&mut image, row + 12, section.virt_addr);
        put_u32(&mut image, row + 16, section.raw_size);
        put_u32(&mut image, row + 20, section.raw_ptr);
        put_u32(&mut image, row + 36, section.characteristics);
    }

    image
}

/// Minimal well-formed PE32+ image: `.text` + `.data`, consistent image size.
pub fn pe32plus_fixture() -> Vec<u8> {
    build_image(
        FIXTURE_PE_OFFSET,
        true,
        0x3000,
        0x800,
        &[
            FixtureSection {
                name: b".text\0\0\0",
                virt_size: 0x200,
                virt_addr: 0x1000,
                raw_size: 0x200,
                raw_ptr: 0x400,
                characteristics: 0x6000_0020,
            },
            FixtureSection {
                name: b".data\0\0\0",
                virt_size: 0x100,
                virt_addr: 0x2000,
                raw_size: 0x200,
                raw_ptr: 0x600,
                characteristics: 0xC000_0040,
            },
        ],
        &[],
    )
}

/// Minimal well-formed PE32 image with the same section layout as the 64-bit fixture.
pub fn pe32_fixture() -> Vec<u8> {
    build_image(
        FIXTURE_PE_OFFSET,
        false,
        0x3000,
        0x800,
        &[
            FixtureSection {
                name: b".text\0\0\0",
                virt_size: 0x200,
                virt_addr: 0x1000,
                raw_size: 0x200,
                raw_ptr: 0x400,
                characteristics: 0x6000_0020,
            },
            FixtureSection {
                name: b".data\0\0\0",
                virt_size: 0x100,
                virt_addr: 0x2000,
                raw_size: 0x200,
                raw_ptr: 0x600,
                characteristics: 0xC000_0040,
            },
        ],
        &[],
    )
}

/// Offset of the import directory RVA/size slot in the PE32+ fixtures.
///
/// Directory table begins 112 bytes into the optional header; import is slot 1.
pub const FIXTURE64_IMPORT_DIR_SLOT: usize = FIXTURE_PE_OFFSET + 4 + 20 + 112 + 8;

/// PE32+ image carrying an import directory with two libraries.
///
/// `KERNEL32.dll` imports `ExitProcess` by name and ordinal `0x42`; `user32.dll`
/// imports `MessageBoxA` by name. Import data lives in a dedicated `.idata` section at
/// RVA `0x3000` (raw `0x800`), with zeroed descriptor slack after the table so that
/// import-append edits have room to work with.
pub fn imports_fixture() -> Vec<u8> {
    let mut image = build_image(
        FIXTURE_PE_OFFSET,
        true,
        0x4000,
        0xA00,
        &[
            FixtureSection {
                name: b".text\0\0\0",
                virt_size: 0x200,
                virt_addr: 0x1000,
                raw_size: 0x200,
                raw_ptr: 0x400,
                characteristics: 0x6000_0020,
            },
            FixtureSection {
                name: b".data\0\0\0",
                virt_size: 0x100,
                virt_addr: 0x2000,
                raw_size: 0x200,
                raw_ptr: 0x600,
                characteristics: 0xC000_0040,
            },
            FixtureSection {
                name: b".idata\0\0",
                virt_size: 0x200,
                virt_addr: 0x3000,
                raw_size: 0x200,
                raw_ptr: 0x800,
                characteristics: 0xC000_0040,
            },
        ],
        &[],
    );

    // Import data directory entry: RVA 0x3000, two descriptors + terminator
    put_u32(&mut image, FIXTURE64_IMPORT_DIR_SLOT, 0x3000);
    put_u32(&mut image, FIXTURE64_IMPORT_DIR_SLOT + 4, 60);

    let idata = 0x800; // raw offset of rva 0x3000

    // descriptor 0: KERNEL32.dll
    put_u32(&mut image, idata, 0x3100); // original first thunk
    put_u32(&mut image, idata + 12, 0x3180); // name rva
    put_u32(&mut image, idata + 16, 0x3140); // first thunk
    // descriptor 1: user32.dll
    put_u32(&mut image, idata + 20, 0x3120);
    put_u32(&mut image, idata + 32, 0x3190);
    put_u32(&mut image, idata + 36, 0x3160);
    // descriptor 2 stays zeroed: terminator

    // thunk tables (64-bit entries); OFT and FT carry the same values
    for table in [idata + 0x100, idata + 0x140] {
        put_u64(&mut image, table, 0x31A0);
        put_u64(&mut image, table + 8, 0x8000_0000_0000_0042);
    }
    for table in [idata + 0x120, idata + 0x160] {
        put_u64(&mut image, table, 0x31C0);
    }

    // library names
    put_bytes(&mut image, idata + 0x180, b"KERNEL32.dll\0");
    put_bytes(&mut image, idata + 0x190, b"user32.dll\0");

    // hint/name entries (hint u16 followed by the NUL terminated name)
    put_bytes(&mut image, idata + 0x1A0 + 2, b"ExitProcess\0");
    put_bytes(&mut image, idata + 0x1C0 + 2, b"MessageBoxA\0");

    image
}

/// XOR key used by the rich-header fixture.
pub const FIXTURE_RICH_KEY: u32 = 0x8A0F_31C4;

/// PE32+ image with a rich header in the DOS stub.
///
/// Returns the image together with the *decoded* `DanS..Rich` region, so hash tests can
/// derive the expected digest without re-implementing the XOR walk.
pub fn rich_fixture() -> (Vec<u8>, Vec<u8>) {
    let pe_offset = 0x100;
    let mut image = build_image(
        pe_offset,
        true,
        0x3000,
        0x800,
        &[
            FixtureSection {
                name: b".text\0\0\0",
                virt_size: 0x200,
                virt_addr: 0x1000,
                raw_size: 0x200,
                raw_ptr: 0x400,
                characteristics: 0x6000_0020,
            },
            FixtureSection {
                name: b".data\0\0\0",
                virt_size: 0x100,
                virt_addr: 0x2000,
                raw_size: 0x200,
                raw_ptr: 0x600,
                characteristics: 0xC000_0040,
            },
        ],
        &[],
    );

    // Decoded region: DanS marker, three pad dwords, two comp-id/count pairs
    let decoded: Vec<u32> = vec![
        0x536E_6144, // "DanS"
        0,
        0,
        0,
        0x0104_2636, // C++ compiler comp-id
        7,           // use count
        0x0106_2636, // resource compiler comp-id
        1,
    ];

    let mut decoded_bytes = Vec::new();
    let rich_at = 0x80;
    for (i, dword) in decoded.iter().enumerate() {
        decoded_bytes.extend_from_slice(&dword.to_le_bytes());
        put_u32(&mut image, rich_at + i * 4, dword ^ FIXTURE_RICH_KEY);
    }
    let end = rich_at + decoded.len() * 4;
    put_u32(&mut image, end, 0x6863_6952); // "Rich"
    put_u32(&mut image, end + 4, FIXTURE_RICH_KEY);

    (image, decoded_bytes)
}
