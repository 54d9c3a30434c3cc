//! Component B: lays out `PT_LOAD` segments into a single contiguous image
//! allocation at the correct relative offsets and protections.

use std::ffi::c_void;

use anyhow::{bail, Context, Result};
use nix::sys::mman::{mmap_anonymous, mprotect, munmap, MapFlags, ProtFlags};

use crate::elf::raw::{Phdr, PF_R, PF_W, PF_X};
use crate::elf::view::ElfView;

fn page_size() -> usize {
    // SAFETY: sysconf(_SC_PAGESIZE) has no preconditions and never fails
    // in practice; libc defines it to return -1 only for unknown names.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

fn page_floor(addr: u64, page_size: u64) -> u64 {
    addr & !(page_size - 1)
}

fn page_ceil(addr: u64, page_size: u64) -> u64 {
    page_floor(addr + page_size - 1, page_size)
}

/// A single, page-aligned anonymous mapping holding every `PT_LOAD`
/// segment of a library at its correct relative offset. Owns the mapping
/// for the lifetime of the [`crate::LoadedLibrary`] it belongs to.
pub struct Image {
    base: std::ptr::NonNull<u8>,
    len: usize,
}

// SAFETY: `Image` exposes no aliasing beyond what callers request via
// `as_slice`/`as_mut_slice`, and the loader itself never shares a
// `LoadedLibrary` across threads during construction (spec §5).
unsafe impl Send for Image {}

// SAFETY: once construction finishes, every access to `Image` is a
// read-only `load_symbol` call through `&self` (spec §5); no interior
// mutability is exposed across that boundary, so sharing `&Image` across
// threads is sound.
unsafe impl Sync for Image {}

impl Image {
    fn allocate(len: usize) -> Result<Self> {
        // SAFETY: anonymous, fd-less mapping; no aliasing with existing
        // allocations is possible since the kernel picks the address.
        let ptr = unsafe {
            mmap_anonymous(
                None,
                std::num::NonZeroUsize::new(len).context("image size must be non-zero")?,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE,
            )
            .context("failed to allocate anonymous image mapping")?
        };
        Ok(Self {
            base: ptr.cast(),
            len,
        })
    }

    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `base` is valid for `len` bytes for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: exclusive access via `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    /// Sets protection for `[offset, offset+len)` relative to the image
    /// base. `offset` and `len` must already be page-aligned.
    ///
    /// # Safety
    /// The caller must ensure no other thread reads/writes the affected
    /// pages in a way that would be invalidated by a race with the
    /// protection change (upheld here because construction is single
    /// threaded, spec §5).
    unsafe fn protect(&self, offset: usize, len: usize, prot: ProtFlags) -> Result<()> {
        let ptr = self.base.as_ptr().add(offset) as *mut c_void;
        mprotect(std::ptr::NonNull::new(ptr).unwrap(), len, prot)
            .context("mprotect failed while finalizing segment permissions")
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        // SAFETY: `base`/`len` describe exactly the mapping `allocate`
        // created; nothing else may reference it once `Image` is dropped.
        unsafe {
            let _ = munmap(self.base.cast(), self.len);
        }
    }
}

/// The result of laying out a library's `PT_LOAD` segments: the image
/// allocation plus `aligned_min`, the value every `p_vaddr` is relative to
/// when indexing into the image.
pub struct SegmentLayout {
    pub image: Image,
    pub aligned_min: u64,
}

/// Builds the image allocation for `elf`, copies segment contents in, and
/// sets final page protections to match each segment's `p_flags`.
///
/// Segments are left writable for the relocator and tightened to their
/// final protection by [`finalize_protections`] once relocation completes —
/// option (a) from spec §4.B.
pub fn build_image(view: &ElfView, phdrs: &[Phdr], path: &str) -> Result<SegmentLayout> {
    let loads: Vec<&Phdr> = phdrs.iter().filter(|p| p.p_type == crate::elf::raw::PT_LOAD).collect();
    if loads.is_empty() {
        bail!(crate::error::LoadError::MissingLoadSegment(path.to_string()));
    }

    check_no_overlap(&loads, path)?;

    let page = page_size() as u64;
    let min_v = loads.iter().map(|p| p.p_vaddr).min().unwrap();
    let max_m = loads
        .iter()
        .map(|p| p.p_vaddr + p.p_memsz)
        .max()
        .unwrap();

    let aligned_min = page_floor(min_v, page);
    let aligned_max = page_ceil(max_m, page);
    let total_len = (aligned_max - aligned_min) as usize;

    let mut image = Image::allocate(total_len)?;

    for p in &loads {
        let dest_off = (p.p_vaddr - aligned_min) as usize;
        let file_off = p.p_offset as usize;
        let file_sz = p.p_filesz as usize;
        let src = view
            .data()
            .get(file_off..file_off + file_sz)
            .with_context(|| format!("segment at vaddr {:#x} file range out of bounds", p.p_vaddr))?;
        image.as_mut_slice()[dest_off..dest_off + file_sz].copy_from_slice(src);
        // Bytes between p_filesz and p_memsz are already zero: the
        // allocation came back zero-filled from the kernel.
    }

    Ok(SegmentLayout { image, aligned_min })
}

/// Sets every segment's final protection to `(PF_R?R:0)|(PF_W?W:0)|(PF_X?X:0)`.
/// Must be called only after every relocation has been applied.
pub fn finalize_protections(layout: &SegmentLayout, phdrs: &[Phdr]) -> Result<()> {
    let page = page_size() as u64;
    for p in phdrs.iter().filter(|p| p.p_type == crate::elf::raw::PT_LOAD) {
        let start = page_floor(p.p_vaddr, page);
        let end = page_ceil(p.p_vaddr + p.p_memsz, page);
        let offset = (start - layout.aligned_min) as usize;
        let len = (end - start) as usize;

        let mut prot = ProtFlags::empty();
        if p.p_flags & PF_R != 0 {
            prot |= ProtFlags::PROT_READ;
        }
        if p.p_flags & PF_W != 0 {
            prot |= ProtFlags::PROT_WRITE;
        }
        if p.p_flags & PF_X != 0 {
            prot |= ProtFlags::PROT_EXEC;
        }

        log::debug!(
            "finalizing segment {:#x}-{:#x} protection to {:?}",
            p.p_vaddr,
            p.p_vaddr + p.p_memsz,
            prot
        );

        // SAFETY: construction is single-threaded and this is the last
        // mutation of these pages before the library is handed to callers.
        unsafe { layout.image.protect(offset, len, prot)? };
    }
    Ok(())
}

fn check_no_overlap(loads: &[&Phdr], path: &str) -> Result<()> {
    for i in 0..loads.len() {
        for j in (i + 1)..loads.len() {
            let a = loads[i];
            let b = loads[j];
            let a_end = a.p_vaddr + a.p_memsz;
            let b_end = b.p_vaddr + b.p_memsz;
            if a.p_vaddr < b_end && b.p_vaddr < a_end {
                bail!(crate::error::LoadError::OverlappingSegments {
                    path: path.to_string(),
                    first: a.p_vaddr,
                    first_end: a_end,
                    second: b.p_vaddr,
                    second_end: b_end,
                });
            }
        }
    }
    Ok(())
}
