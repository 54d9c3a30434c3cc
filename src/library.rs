//! Component F: the loader façade. Coordinates parse → map → relocate at
//! construction and exposes symbol resolution as the single public
//! operation afterwards.

use anyhow::Context;

use crate::elf::raw::Phdr;
use crate::elf::view::ElfView;
use crate::elf::{vaddr_to_file_offset, ElfFile};
use crate::error::{LoadError, SymbolNotFound};
use crate::gnuhash::GnuHashTable;
use crate::segment::{build_image, finalize_protections, SegmentLayout};

/// The aggregate produced by a successful load (spec §3). Holds the file
/// mapping and the image mapping for its whole lifetime: dropping one
/// without the other is impossible since [`Drop`] releases both together,
/// image first.
pub struct LoadedLibrary {
    path: String,
    view: ElfView,
    phdrs: Vec<Phdr>,
    layout: SegmentLayout,
    symtab_file_offset: usize,
    strtab_file_offset: usize,
    gnu_hash_file_offset: usize,
    needed: Vec<String>,
}

impl LoadedLibrary {
    /// Resolves `name` to an address inside the loaded image via the GNU
    /// hash table (spec §4.E). Read-only and safe to call concurrently with
    /// any other `load_symbol` call on the same instance (spec §5).
    pub fn load_symbol(&self, name: &str) -> Result<usize, SymbolNotFound> {
        let hash_table = GnuHashTable::parse(&self.view, self.gnu_hash_file_offset)
            .expect("GNU hash table was already validated during construction");

        let found = crate::resolve::resolve(
            &self.view,
            &hash_table,
            self.symtab_file_offset,
            self.strtab_file_offset,
            self.image_base() as u64,
            name,
        )
        .ok()
        .flatten();

        found
            .map(|addr| addr as usize)
            .ok_or_else(|| SymbolNotFound(name.to_string()))
    }

    /// The module's runtime base address, `B` in spec §3.
    pub fn image_base(&self) -> usize {
        self.layout.image.base_addr()
    }

    pub fn image_len(&self) -> usize {
        self.layout.image.len()
    }

    /// The library's declared `DT_NEEDED` dependencies. The loader does not
    /// load them automatically (spec Non-goals: no `dlopen`-style scope
    /// chaining); this is informational only.
    pub fn needed(&self) -> &[String] {
        &self.needed
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The library's program header table, for callers that want to
    /// inspect its segment layout directly.
    pub fn program_headers(&self) -> &[Phdr] {
        &self.phdrs
    }
}

/// Parses, maps, and relocates the shared library at `path` (spec §4.F).
/// On any failure, every partially acquired resource (file mapping, image
/// mapping) is released before the error is returned.
pub fn open_library(path: impl AsRef<std::path::Path>) -> Result<LoadedLibrary, LoadError> {
    let path_str = path.as_ref().display().to_string();

    let view = ElfView::open(&path).map_err(LoadError::Io)?;

    try_load(view, &path_str).map_err(classify)
}

fn try_load(view: ElfView, path: &str) -> anyhow::Result<LoadedLibrary> {
    let elf = ElfFile::parse(&view).context("failed to parse ELF headers")?;
    let info = elf.dynamic_info().context("failed to read dynamic section")?;

    let gnu_hash_vaddr = info
        .gnu_hash_vaddr
        .context("library has no DT_GNU_HASH (SysV-hash-only libraries are not supported)")?;

    let symtab_file_offset = vaddr_to_file_offset(&elf.phdrs, info.symtab_vaddr.unwrap())
        .context("failed to locate dynamic symbol table")?;
    let strtab_file_offset = vaddr_to_file_offset(&elf.phdrs, info.strtab_vaddr.unwrap())
        .context("failed to locate dynamic string table")?;
    let gnu_hash_file_offset = vaddr_to_file_offset(&elf.phdrs, gnu_hash_vaddr)
        .context("failed to locate GNU hash table")?;

    // Validate the hash table parses before committing to the load; later
    // `load_symbol` calls re-parse it (cheap: bounds checks over borrowed
    // slices, no copies) rather than storing a self-referential view.
    GnuHashTable::parse(&view, gnu_hash_file_offset).context("failed to parse GNU hash table")?;

    let needed = info
        .needed_str_offsets
        .iter()
        .map(|&off| view.read_cstr(strtab_file_offset + off).map(str::to_string))
        .collect::<anyhow::Result<Vec<_>>>()
        .context("failed to read DT_NEEDED entries")?;

    let mut layout = build_image(&view, &elf.phdrs, path)?;

    crate::reloc::apply_relocations(&mut layout.image, &view, &elf.phdrs, &info, path)
        .context("failed to apply relocations")?;

    finalize_protections(&layout, &elf.phdrs).context("failed to finalize segment protections")?;

    Ok(LoadedLibrary {
        path: path.to_string(),
        view,
        phdrs: elf.phdrs,
        layout,
        symtab_file_offset,
        strtab_file_offset,
        gnu_hash_file_offset,
        needed,
    })
}

fn classify(err: anyhow::Error) -> LoadError {
    match err.downcast::<LoadError>() {
        Ok(load_err) => load_err,
        Err(err) => LoadError::MalformedElf(err),
    }
}

/// Releases a loaded library's resources. Equivalent to dropping it; kept
/// as a named operation to mirror spec §6's `close_library`.
pub fn close_library(library: LoadedLibrary) {
    drop(library);
}
