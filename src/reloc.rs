//! Component D: patches the image so every dynamic relocation resolves to
//! a concrete address.

use anyhow::{Context, Result};

use crate::arch::{RelocClass, RelocKind};
use crate::elf::raw::{Rel, Rela, Sym};
use crate::elf::{view::ElfView, vaddr_to_file_offset, DynamicInfo};
use crate::error::LoadError;
use crate::hostsyms;
use crate::segment::Image;

#[cfg(target_pointer_width = "64")]
type NativeWord = u64;
#[cfg(target_pointer_width = "32")]
type NativeWord = u32;

/// A relocation entry normalized across REL and RELA: the only difference
/// between the two section kinds is where the addend comes from
/// (spec §4.D, §9 — "parameterize the relocator over ... `addend(entry,
/// image_word)`").
struct NormalizedReloc {
    offset: u64,
    sym_index: u32,
    reloc_type: u32,
    /// `Some` for RELA (explicit addend); `None` for REL, meaning the
    /// addend must be derived from the in-place image word (or forced to
    /// zero, per the native-ABS special case in spec §4.D/§9).
    explicit_addend: Option<i64>,
}

fn read_rel_table(view: &ElfView, file_offset: usize, byte_size: usize) -> Result<Vec<NormalizedReloc>> {
    let count = byte_size / std::mem::size_of::<Rel>();
    let entries: &[Rel] = unsafe {
        view.identify_array(file_offset, count)
            .context("failed to read REL relocation table")?
    };
    Ok(entries
        .iter()
        .map(|e| NormalizedReloc {
            offset: e.r_offset as u64,
            sym_index: e.r_sym(),
            reloc_type: e.r_type(),
            explicit_addend: None,
        })
        .collect())
}

fn read_rela_table(view: &ElfView, file_offset: usize, byte_size: usize) -> Result<Vec<NormalizedReloc>> {
    let count = byte_size / std::mem::size_of::<Rela>();
    let entries: &[Rela] = unsafe {
        view.identify_array(file_offset, count)
            .context("failed to read RELA relocation table")?
    };
    Ok(entries
        .iter()
        .map(|e| NormalizedReloc {
            offset: e.r_offset as u64,
            sym_index: e.r_sym(),
            reloc_type: e.r_type(),
            explicit_addend: Some(e.r_addend as i64),
        })
        .collect())
}

/// Reads the symbol's name via `r_info`'s symbol index into the dynamic
/// symbol table, then into the dynamic string table (spec §4.D).
fn symbol_name(
    view: &ElfView,
    symtab_file_offset: usize,
    strtab_file_offset: usize,
    sym_index: u32,
) -> Result<String> {
    let sym: Sym = unsafe {
        view.identify(symtab_file_offset + sym_index as usize * std::mem::size_of::<Sym>())
            .with_context(|| format!("failed to read dynamic symbol {sym_index}"))?
    };
    let name = view
        .read_cstr(strtab_file_offset + sym.st_name as usize)
        .with_context(|| format!("failed to read name of dynamic symbol {sym_index}"))?;
    Ok(name.to_string())
}

fn checked_word_range(image_len: usize, offset: usize, path: &str, raw_offset: u64) -> Result<std::ops::Range<usize>> {
    let end = offset
        .checked_add(std::mem::size_of::<NativeWord>())
        .filter(|&end| end <= image_len)
        .ok_or_else(|| LoadError::RelocationOutOfBounds {
            path: path.to_string(),
            offset: raw_offset,
            image_len,
        })?;
    Ok(offset..end)
}

fn read_native_word(image: &[u8], offset: usize, path: &str, raw_offset: u64) -> Result<NativeWord> {
    let range = checked_word_range(image.len(), offset, path, raw_offset)?;
    Ok(NativeWord::from_ne_bytes(image[range].try_into().unwrap()))
}

fn write_native_word(
    image: &mut [u8],
    offset: usize,
    value: NativeWord,
    path: &str,
    raw_offset: u64,
) -> Result<()> {
    let range = checked_word_range(image.len(), offset, path, raw_offset)?;
    image[range].copy_from_slice(&value.to_ne_bytes());
    Ok(())
}

/// Applies every relocation described by `info` to `image`, using `view` to
/// resolve symbol names and `host.lookup` (via [`hostsyms::lookup`]) to
/// resolve them to host pointers.
pub fn apply_relocations(
    image: &mut Image,
    view: &ElfView,
    phdrs: &[crate::elf::raw::Phdr],
    info: &DynamicInfo,
    path: &str,
) -> Result<()> {
    let symtab_file_offset = vaddr_to_file_offset(phdrs, info.symtab_vaddr.unwrap())
        .context("failed to locate dynamic symbol table")?;
    let strtab_file_offset = vaddr_to_file_offset(phdrs, info.strtab_vaddr.unwrap())
        .context("failed to locate dynamic string table")?;

    let mut relocations = Vec::new();
    if let (Some(vaddr), size) = (info.rel_vaddr, info.rel_size) {
        let off = vaddr_to_file_offset(phdrs, vaddr).context("failed to locate DT_REL table")?;
        relocations.extend(read_rel_table(view, off, size)?);
    }
    if let (Some(vaddr), size) = (info.rela_vaddr, info.rela_size) {
        let off = vaddr_to_file_offset(phdrs, vaddr).context("failed to locate DT_RELA table")?;
        relocations.extend(read_rela_table(view, off, size)?);
    }
    if let (Some(vaddr), size) = (info.jmprel_vaddr, info.pltrel_size) {
        let off = vaddr_to_file_offset(phdrs, vaddr).context("failed to locate DT_JMPREL table")?;
        if info.pltrel_is_rela {
            relocations.extend(read_rela_table(view, off, size)?);
        } else {
            relocations.extend(read_rel_table(view, off, size)?);
        }
    }

    let base = image.base_addr() as u64;

    for entry in &relocations {
        let class = RelocKind::classify(entry.reloc_type);
        let kind = match class {
            RelocClass::NoOp => continue,
            RelocClass::Unsupported => {
                return Err(LoadError::UnknownRelocationType {
                    path: path.to_string(),
                    reloc_type: entry.reloc_type,
                }
                .into())
            }
            RelocClass::Known(kind) => kind,
        };

        let offset = usize::try_from(entry.offset).map_err(|_| LoadError::RelocationOutOfBounds {
            path: path.to_string(),
            offset: entry.offset,
            image_len: image.as_slice().len(),
        })?;

        let addend: i64 = match entry.explicit_addend {
            Some(a) => a,
            None => match kind {
                RelocKind::Relative => {
                    read_native_word(image.as_slice(), offset, path, entry.offset)? as i64
                }
                _ => 0,
            },
        };

        let value: u64 = match kind {
            RelocKind::Relative => base.wrapping_add(addend as u64),
            RelocKind::GlobDat | RelocKind::JumpSlot | RelocKind::NativeAbs => {
                if entry.sym_index == crate::elf::raw::STN_UNDEF {
                    hostsyms::undefined_symbol_ptr() as u64
                } else {
                    let name =
                        symbol_name(view, symtab_file_offset, strtab_file_offset, entry.sym_index)?;
                    let resolved = hostsyms::lookup(&name).unwrap_or_else(|| {
                        log::warn!("unresolved host symbol `{name}` in {path}, binding to undefined_symbol");
                        hostsyms::undefined_symbol_ptr()
                    });
                    (resolved as u64).wrapping_add(addend as u64)
                }
            }
        };

        write_native_word(image.as_mut_slice(), offset, value as NativeWord, path, entry.offset)?;
    }

    Ok(())
}
