//! Fingerprints and packer scanning through the public API: concurrent store fills,
//! imphash and rich-header determinism, checksum stability and signature matching.

#[path = "../src/test/mod.rs"]
mod fixtures;

use fixtures::{imports_fixture, pe32plus_fixture, rich_fixture};
use md5::{Digest, Md5};
use peforge::prelude::*;

fn md5_hex(bytes: &[u8]) -> String {
    Md5::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

#[test]
fn store_fills_every_applicable_slot() {
    let doc = PeDocument::from_mem(imports_fixture()).unwrap();
    let store = HashStore::new();
    store.compute_all(&doc.snapshot(), &CancelToken::new()).unwrap();

    assert_eq!(
        store.get(HashKind::Md5),
        Some(md5_hex(doc.data()))
    );
    assert_eq!(store.get(HashKind::Sha1).map(|h| h.len()), Some(40));
    assert_eq!(store.get(HashKind::Sha256).map(|h| h.len()), Some(64));
    assert!(store.get(HashKind::Checksum).is_some());
    assert!(store.get(HashKind::ImpMd5).is_some());
    // this fixture carries no rich header
    assert_eq!(store.get(HashKind::RichHdrMd5), None);
}

#[test]
fn imphash_normalizes_the_import_listing() {
    let doc = PeDocument::from_mem(imports_fixture()).unwrap();
    let store = HashStore::new();
    store.compute_all(&doc.snapshot(), &CancelToken::new()).unwrap();

    // lowercased libraries without extension, ord fallback, comma joined
    let expected = md5_hex(b"kernel32.exitprocess,kernel32.ord66,user32.messageboxa");
    assert_eq!(store.get(HashKind::ImpMd5), Some(expected));
}

#[test]
fn imphash_follows_import_edits() {
    let mut doc = PeDocument::from_mem(imports_fixture()).unwrap();
    let store = HashStore::new();
    store.compute_all(&doc.snapshot(), &CancelToken::new()).unwrap();
    let before = store.get(HashKind::ImpMd5).unwrap();

    let settings = ImportsAutoadderSettings::new()
        .with_lib(ImportLib::new("SHELL32.dll").by_name("ShellExecuteA"));
    doc.auto_add_imports(&settings).unwrap();
    store.compute_all(&doc.snapshot(), &CancelToken::new()).unwrap();

    let expected = md5_hex(
        b"kernel32.exitprocess,kernel32.ord66,user32.messageboxa,shell32.shellexecutea",
    );
    assert_eq!(store.get(HashKind::ImpMd5), Some(expected));
    assert_ne!(store.get(HashKind::ImpMd5), Some(before));
}

#[test]
fn rich_header_hash_covers_the_decoded_region() {
    let (image, decoded) = rich_fixture();
    let doc = PeDocument::from_mem(image).unwrap();
    let store = HashStore::new();
    store.compute_all(&doc.snapshot(), &CancelToken::new()).unwrap();

    assert_eq!(store.get(HashKind::RichHdrMd5), Some(md5_hex(&decoded)));
}

#[test]
fn written_back_checksum_is_stable() {
    let mut doc = PeDocument::from_mem(pe32plus_fixture()).unwrap();
    let store = HashStore::new();
    store.compute_all(&doc.snapshot(), &CancelToken::new()).unwrap();
    let first = store.get(HashKind::Checksum).unwrap();

    let value = u64::from_str_radix(&first, 16).unwrap();
    let opt = doc.opt_hdr();
    doc.set_num_value(&opt, OptHdrField::Checksum, value, false).unwrap();

    store.compute_all(&doc.snapshot(), &CancelToken::new()).unwrap();
    assert_eq!(store.get(HashKind::Checksum), Some(first));
}

#[test]
fn digests_track_edits_and_undo() {
    let mut doc = PeDocument::from_mem(pe32plus_fixture()).unwrap();
    let original = md5_hex(doc.data());

    doc.set_byte(0x500, 0xCC, false).unwrap();
    assert_ne!(md5_hex(doc.data()), original);

    assert!(doc.undo());
    assert_eq!(md5_hex(doc.data()), original);
}

#[test]
fn cancellation_is_observed_before_work_starts() {
    let doc = PeDocument::from_mem(pe32plus_fixture()).unwrap();
    let store = HashStore::new();
    let cancel = CancelToken::new();
    cancel.cancel();

    assert!(matches!(
        store.compute_all(&doc.snapshot(), &cancel),
        Err(Error::Cancelled)
    ));
    assert_eq!(store.get(HashKind::Sha256), None);
}

#[test]
fn packer_scan_at_the_entry_point() {
    let mut doc = PeDocument::from_mem(pe32plus_fixture()).unwrap();
    // plant a UPX-style prologue at the entry point (rva 0x1000, raw 0x400)
    doc.subst_block(0x400, &[0x60, 0xBE, 0x00, 0x20, 0x40, 0x00], false)
        .unwrap();

    let set = SignatureSet::from_text("upx 3.x = 60 BE ?? ?? ?? 00").unwrap();
    let found = doc.find_packer_at_ep(&set).unwrap();
    assert_eq!(found.offset, 0x400);
    assert_eq!(found.name, "upx 3.x");
    assert_eq!(found.size(), 6);
    assert!(doc.is_packed());

    // rescans never duplicate the finding
    doc.find_packer_at_ep(&set);
    doc.find_packer_sign(0x1000, AddrType::Rva, &set);
    assert_eq!(doc.found_packers().len(), 1);
}

#[test]
fn scan_misses_leave_the_document_clean() {
    let mut doc = PeDocument::from_mem(pe32plus_fixture()).unwrap();
    let set = SignatureSet::from_text("marker = DE AD BE EF").unwrap();

    assert_eq!(doc.find_packer_at_ep(&set), None);
    // unmapped start never scans
    assert_eq!(doc.find_packer_sign(0x0100_0000, AddrType::Rva, &set), None);
    assert!(!doc.is_packed());
}
