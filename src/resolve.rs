//! Component E: resolves an exported symbol name to an address inside the
//! loaded image via the GNU hash table.

use anyhow::{Context, Result};

use crate::elf::raw::Sym;
use crate::elf::view::ElfView;
use crate::gnuhash::GnuHashTable;

/// Looks up `name` in `hash_table`, returning `image_base + st_value` on a
/// hit. `symtab_file_offset`/`strtab_file_offset` locate the dynamic symbol
/// and string tables within `view`.
pub fn resolve(
    view: &ElfView,
    hash_table: &GnuHashTable,
    symtab_file_offset: usize,
    strtab_file_offset: usize,
    image_base: u64,
    name: &str,
) -> Result<Option<u64>> {
    let sym_index = hash_table.lookup(name, |idx| {
        let sym: Sym = unsafe {
            view.identify(symtab_file_offset + idx as usize * std::mem::size_of::<Sym>())
                .with_context(|| format!("failed to read dynamic symbol {idx}"))?
        };
        view.read_cstr(strtab_file_offset + sym.st_name as usize)
            .map(str::to_string)
    })?;

    let Some(sym_index) = sym_index else {
        return Ok(None);
    };

    let sym: Sym = unsafe {
        view.identify(symtab_file_offset + sym_index as usize * std::mem::size_of::<Sym>())
            .context("failed to re-read resolved dynamic symbol")?
    };

    Ok(Some(image_base + sym.st_value))
}
