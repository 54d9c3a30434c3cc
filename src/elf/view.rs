//! Component A: a read-only memory-mapped view of an ELF file with typed
//! reinterpretation at byte offsets.

use std::mem::size_of;
use std::path::Path;

use anyhow::{bail, Context, Result};
use memmap2::Mmap;

/// A memory-mapped ELF file, reinterpreted on demand as typed structures.
///
/// The mapping is read-only and kept alive for as long as any slice derived
/// from it (the dynamic string table, symbol table, GNU hash arrays) is in
/// use — those slices borrow from `self.data()`, tying their lifetime to
/// `&self`.
pub struct ElfView {
    mmap: Mmap,
}

impl ElfView {
    /// Memory-maps `path` for reading. Fails if the file is missing,
    /// unreadable, or mapping is denied by the host OS.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        // SAFETY: the file is opened read-only and not expected to be
        // truncated concurrently by another process during the load.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to map {}", path.display()))?;
        Ok(Self { mmap })
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Reinterprets the bytes at `[offset, offset + size_of::<T>())` as `T`.
    ///
    /// # Safety
    /// `T` must be a `#[repr(C)]` plain-old-data type for which any bit
    /// pattern is valid (the ELF structures in [`crate::elf::raw`] all
    /// qualify: they contain only integers and byte arrays).
    pub unsafe fn identify<T: Copy>(&self, offset: usize) -> Result<T> {
        let end = offset
            .checked_add(size_of::<T>())
            .context("offset overflow while reading ELF structure")?;
        if end > self.mmap.len() {
            bail!(
                "ELF structure at offset {offset:#x} (size {}) runs past end of file ({} bytes)",
                size_of::<T>(),
                self.mmap.len()
            );
        }
        let ptr = self.mmap.as_ptr().add(offset) as *const T;
        Ok(ptr.read_unaligned())
    }

    /// Reinterprets `count` consecutive `T` values starting at `offset` as a
    /// borrowed slice.
    ///
    /// # Safety
    /// Same requirement on `T` as [`Self::identify`]. The returned slice
    /// additionally requires `offset` to be aligned to `T`'s alignment,
    /// which holds for every ELF table this loader reads because the ELF
    /// format itself guarantees that alignment for `.dynsym`/`.gnu.hash`.
    pub unsafe fn identify_array<T: Copy>(&self, offset: usize, count: usize) -> Result<&[T]> {
        let byte_len = count
            .checked_mul(size_of::<T>())
            .context("array length overflow while reading ELF structure")?;
        let end = offset
            .checked_add(byte_len)
            .context("offset overflow while reading ELF array")?;
        if end > self.mmap.len() {
            bail!(
                "ELF array at offset {offset:#x} ({count} x {} bytes) runs past end of file ({} bytes)",
                size_of::<T>(),
                self.mmap.len()
            );
        }
        let ptr = self.mmap.as_ptr().add(offset) as *const T;
        Ok(std::slice::from_raw_parts(ptr, count))
    }

    /// Reads a NUL-terminated string starting at `offset` into the file,
    /// e.g. an entry in `.dynstr`.
    pub fn read_cstr(&self, offset: usize) -> Result<&str> {
        let bytes = self
            .mmap
            .get(offset..)
            .with_context(|| format!("string offset {offset:#x} out of bounds"))?;
        let nul = bytes
            .iter()
            .position(|&b| b == 0)
            .context("unterminated string in ELF file")?;
        std::str::from_utf8(&bytes[..nul]).context("non-UTF8 string in ELF file")
    }
}
