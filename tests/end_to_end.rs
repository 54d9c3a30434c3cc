//! End-to-end coverage over a synthetic ET_DYN shared object built entirely
//! in memory: enough of an ELF file to exercise parsing, segment mapping,
//! GNU hash symbol resolution, both relocation kinds the loader supports,
//! and the unresolved-host-symbol path, without depending on a real Bionic
//! `.so` fixture on disk.

#![cfg(target_arch = "x86_64")]

use std::io::Write;

use android_so_loader::open_library;

const EM_X86_64: u16 = 62;
const ET_DYN: u16 = 3;
const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;
const PF_R: u32 = 4;
const PF_W: u32 = 2;
const DT_NULL: i64 = 0;
const DT_STRTAB: i64 = 5;
const DT_SYMTAB: i64 = 6;
const DT_RELA: i64 = 7;
const DT_RELASZ: i64 = 8;
const DT_RELAENT: i64 = 9;
const DT_STRSZ: i64 = 10;
const DT_SYMENT: i64 = 11;
const DT_GNU_HASH: i64 = 0x6fff_fef5;
const R_X86_64_RELATIVE: u32 = 8;
const R_X86_64_GLOB_DAT: u32 = 6;
const HEADER_LEN: usize = 64 + 2 * 56;

fn gnu_hash(name: &str) -> u32 {
    let mut h: u32 = 5381;
    for &c in name.as_bytes() {
        h = h.wrapping_mul(33).wrapping_add(c as u32);
    }
    h
}

#[derive(Default)]
struct Builder {
    buf: Vec<u8>,
}

impl Builder {
    fn offset(&self) -> usize {
        HEADER_LEN + self.buf.len()
    }
    fn align(&mut self, to: usize) {
        while self.buf.len() % to != 0 {
            self.buf.push(0);
        }
    }
    fn bytes(&mut self, b: &[u8]) -> usize {
        let start = self.offset();
        self.buf.extend_from_slice(b);
        start
    }
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn patch_u32(&mut self, at: usize, v: u32) {
        let rel = at - HEADER_LEN;
        self.buf[rel..rel + 4].copy_from_slice(&v.to_le_bytes());
    }
    fn patch_u64(&mut self, at: usize, v: u64) {
        let rel = at - HEADER_LEN;
        self.buf[rel..rel + 8].copy_from_slice(&v.to_le_bytes());
    }
}

/// A built fixture plus the file offsets a test needs to poke at it further.
struct Fixture {
    bytes: Vec<u8>,
    /// `*scratch` gets `image_base + 0x2000` written by a RELATIVE reloc.
    scratch_relative: u64,
    /// `*(scratch + 8)` gets the resolved `malloc` pointer via GLOB_DAT.
    scratch_glob_dat: u64,
    /// `*(scratch + 16)` gets the resolved pointer for a host symbol name
    /// that is not in the table, i.e. `hostsyms::undefined_symbol_ptr()`.
    scratch_unresolved: u64,
    /// File offset of the first RELA entry's `r_offset` field, for tests
    /// that want to corrupt it.
    first_reloc_offset_field: usize,
}

/// Symbol table: [0] STN_UNDEF, [1] "malloc" (undefined, imported), [2]
/// "unresolved_symbol_for_test" (undefined, imported, absent from the host
/// table), [3..6] "my_export"/"my_export2"/"my_export3" (defined, hashed).
/// Three hashed symbols exercise the GNU hash chain-continuation bit in
/// addition to the chain-end bit.
fn build_synthetic_so() -> Fixture {
    let mut b = Builder::default();

    let sym0_off = b.offset();
    b.bytes(&[0u8; 24]); // STN_UNDEF

    let sym1_off = b.offset();
    b.u32(0); // st_name, patched below
    b.u8(0x10);
    b.u8(0);
    b.u16(0); // st_shndx = SHN_UNDEF
    b.u64(0);
    b.u64(0);

    let sym2_off = b.offset();
    b.u32(0); // st_name, patched below
    b.u8(0x10);
    b.u8(0);
    b.u16(0); // st_shndx = SHN_UNDEF
    b.u64(0);
    b.u64(0);

    let sym3_off = b.offset();
    b.u32(0); // st_name, patched below
    b.u8(0x12);
    b.u8(0);
    b.u16(1);
    b.u64(0); // st_value, patched below
    b.u64(8);

    let sym4_off = b.offset();
    b.u32(0);
    b.u8(0x12);
    b.u8(0);
    b.u16(1);
    b.u64(0);
    b.u64(8);

    let sym5_off = b.offset();
    b.u32(0);
    b.u8(0x12);
    b.u8(0);
    b.u16(1);
    b.u64(0);
    b.u64(8);

    let dynstr_off = b.offset();
    b.u8(0);
    let malloc_name_off = b.bytes(b"malloc\0");
    let unresolved_name_off = b.bytes(b"unresolved_symbol_for_test\0");
    let my_export_name_off = b.bytes(b"my_export\0");
    let my_export2_name_off = b.bytes(b"my_export2\0");
    let my_export3_name_off = b.bytes(b"my_export3\0");
    let dynstr_len = b.offset() - dynstr_off;

    b.patch_u32(sym1_off, (malloc_name_off - dynstr_off) as u32);
    b.patch_u32(sym2_off, (unresolved_name_off - dynstr_off) as u32);
    b.patch_u32(sym3_off, (my_export_name_off - dynstr_off) as u32);
    b.patch_u32(sym4_off, (my_export2_name_off - dynstr_off) as u32);
    b.patch_u32(sym5_off, (my_export3_name_off - dynstr_off) as u32);

    b.align(8);
    let gnu_hash_off = b.offset();
    let hash3 = gnu_hash("my_export");
    let hash4 = gnu_hash("my_export2");
    let hash5 = gnu_hash("my_export3");
    b.u32(1); // nbuckets
    b.u32(3); // symoffset: hashed symbols start at dynsym index 3
    b.u32(1); // bloom_size
    b.u32(0); // bloom_shift
    let bloom = (1u64 << (hash3 % 64)) | (1u64 << (hash4 % 64)) | (1u64 << (hash5 % 64));
    b.u64(bloom);
    b.u32(3); // buckets[0] = symoffset
    b.u32(hash3 & !1); // chain[0]: not the last entry
    b.u32(hash4 & !1); // chain[1]: not the last entry
    b.u32((hash5 & !1) | 1); // chain[2]: last entry in the bucket

    let rela_off = b.offset();
    let scratch_off = (rela_off + 3 * 24) as u64;

    // RELATIVE: *scratch = image_base + 0x2000.
    let first_reloc_offset_field = b.offset();
    b.u64(scratch_off);
    b.u64(R_X86_64_RELATIVE as u64);
    b.i64(0x2000);

    // GLOB_DAT against "malloc" (dynsym index 1): *(scratch+8) = resolved ptr.
    b.u64(scratch_off + 8);
    b.u64((1u64 << 32) | R_X86_64_GLOB_DAT as u64);
    b.i64(0);

    // GLOB_DAT against "unresolved_symbol_for_test" (dynsym index 2), which
    // is absent from the host symbol table: *(scratch+16) = the undefined-
    // symbol sentinel pointer.
    b.u64(scratch_off + 16);
    b.u64((2u64 << 32) | R_X86_64_GLOB_DAT as u64);
    b.i64(0);

    b.bytes(&[0u8; 24]); // scratch space the relocations above write into

    let dyn_off = b.offset();
    for (tag, val) in [
        (DT_SYMTAB, sym0_off as u64),
        (DT_STRTAB, dynstr_off as u64),
        (DT_STRSZ, dynstr_len as u64),
        (DT_SYMENT, 24),
        (DT_GNU_HASH, gnu_hash_off as u64),
        (DT_RELA, rela_off as u64),
        (DT_RELASZ, 72),
        (DT_RELAENT, 24),
        (DT_NULL, 0),
    ] {
        b.i64(tag);
        b.u64(val);
    }
    let dyn_size = (b.offset() - dyn_off) as u64;

    // Patch the three hashed symbols' st_value now that scratch_off is known.
    // st_value sits 8 bytes into each 24-byte Sym entry.
    b.patch_u64(sym3_off + 8, scratch_off);
    b.patch_u64(sym4_off + 8, scratch_off + 8);
    b.patch_u64(sym5_off + 8, scratch_off + 16);

    let total_len = b.offset() as u64;

    let mut file = Vec::with_capacity(total_len as usize);
    file.extend_from_slice(b"\x7fELF");
    file.push(2); // ELFCLASS64
    file.push(1); // ELFDATA2LSB
    file.push(1); // EV_CURRENT
    file.push(0); // ELFOSABI_NONE
    file.extend_from_slice(&[0u8; 8]);
    file.extend_from_slice(&ET_DYN.to_le_bytes());
    file.extend_from_slice(&EM_X86_64.to_le_bytes());
    file.extend_from_slice(&1u32.to_le_bytes());
    file.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    file.extend_from_slice(&64u64.to_le_bytes()); // e_phoff
    file.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    file.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    file.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
    file.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
    file.extend_from_slice(&2u16.to_le_bytes()); // e_phnum
    file.extend_from_slice(&0u16.to_le_bytes());
    file.extend_from_slice(&0u16.to_le_bytes());
    file.extend_from_slice(&0u16.to_le_bytes());
    assert_eq!(file.len(), 64);

    // PT_LOAD: the whole file, one-to-one, as a single RW segment.
    file.extend_from_slice(&PT_LOAD.to_le_bytes());
    file.extend_from_slice(&(PF_R | PF_W).to_le_bytes());
    file.extend_from_slice(&0u64.to_le_bytes());
    file.extend_from_slice(&0u64.to_le_bytes());
    file.extend_from_slice(&0u64.to_le_bytes());
    file.extend_from_slice(&total_len.to_le_bytes());
    file.extend_from_slice(&total_len.to_le_bytes());
    file.extend_from_slice(&0x1000u64.to_le_bytes());

    // PT_DYNAMIC.
    file.extend_from_slice(&PT_DYNAMIC.to_le_bytes());
    file.extend_from_slice(&(PF_R | PF_W).to_le_bytes());
    file.extend_from_slice(&dyn_off.to_le_bytes());
    file.extend_from_slice(&dyn_off.to_le_bytes());
    file.extend_from_slice(&dyn_off.to_le_bytes());
    file.extend_from_slice(&dyn_size.to_le_bytes());
    file.extend_from_slice(&dyn_size.to_le_bytes());
    file.extend_from_slice(&8u64.to_le_bytes());
    assert_eq!(file.len(), HEADER_LEN);

    file.extend_from_slice(&b.buf);

    Fixture {
        bytes: file,
        scratch_relative: scratch_off,
        scratch_glob_dat: scratch_off + 8,
        scratch_unresolved: scratch_off + 16,
        first_reloc_offset_field,
    }
}

#[test]
fn loads_synthetic_library_and_applies_relocations() {
    let fixture = build_synthetic_so();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&fixture.bytes).unwrap();

    let library = open_library(tmp.path()).expect("synthetic library should load");
    assert!(library.image_base() != 0);

    let relative_addr = library.load_symbol("my_export").unwrap();
    assert_eq!(
        relative_addr,
        library.image_base() + fixture.scratch_relative as usize
    );
    let relocated: u64 = unsafe { (relative_addr as *const u64).read_unaligned() };
    assert_eq!(relocated, library.image_base() as u64 + 0x2000);

    let glob_dat_addr = library.load_symbol("my_export2").unwrap();
    assert_eq!(
        glob_dat_addr,
        library.image_base() + fixture.scratch_glob_dat as usize
    );
    let resolved_malloc: u64 = unsafe { (glob_dat_addr as *const u64).read_unaligned() };
    assert_eq!(resolved_malloc, libc::malloc as usize as u64);
}

#[test]
fn unresolved_host_symbol_loads_but_aborts_on_call() {
    let fixture = build_synthetic_so();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&fixture.bytes).unwrap();

    // The library loads successfully even though it references a host
    // symbol name absent from the table (spec: undefined-on-demand).
    let library = open_library(tmp.path()).expect("library with an unresolved import still loads");

    let addr = library.load_symbol("my_export3").unwrap();
    assert_eq!(
        addr,
        library.image_base() + fixture.scratch_unresolved as usize
    );
    let resolved_ptr: u64 = unsafe { (addr as *const u64).read_unaligned() };
    assert_ne!(resolved_ptr, 0);

    // Only invoking it aborts; loading and resolving do not.
    let call: extern "C" fn() -> ! = unsafe { std::mem::transmute(resolved_ptr as usize) };
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| call()));
    assert!(result.is_err(), "calling the unresolved-symbol stub should abort");
}

#[test]
fn unknown_symbol_is_reported_as_not_found() {
    let fixture = build_synthetic_so();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&fixture.bytes).unwrap();

    let library = open_library(tmp.path()).unwrap();
    let err = library.load_symbol("does_not_exist").unwrap_err();
    assert_eq!(err.0, "does_not_exist");
}

#[test]
fn out_of_range_relocation_offset_is_rejected_not_panicking() {
    let mut fixture = build_synthetic_so();
    let rel = fixture.first_reloc_offset_field;
    // Point the first relocation's r_offset far past the end of the image.
    fixture.bytes[rel..rel + 8].copy_from_slice(&0xffff_ffff_u64.to_le_bytes());

    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&fixture.bytes).unwrap();

    // Must surface as a load error, not panic the host process.
    assert!(open_library(tmp.path()).is_err());
}

#[test]
fn truncated_file_is_rejected_as_malformed() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&[0u8; 8]).unwrap();
    assert!(open_library(tmp.path()).is_err());
}

#[test]
fn missing_file_is_reported_as_io_error() {
    let err = open_library("/nonexistent/path/to/library.so").unwrap_err();
    assert!(matches!(err, android_so_loader::LoadError::Io(_)));
}
