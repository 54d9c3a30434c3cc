//! ELF parsing: the file view (Component A) plus the structures read out of
//! it that the rest of the loader depends on (program headers, the dynamic
//! section, and the GNU hash table).

pub mod raw;
pub mod view;

use std::mem::size_of;

use anyhow::{bail, ensure, Context, Result};

use raw::{Dyn, Ehdr, Phdr, Shdr};
use view::ElfView;

/// A parsed ELF header plus the program header table, validated against the
/// host's word size and machine type.
pub struct ElfFile<'a> {
    pub view: &'a ElfView,
    pub ehdr: Ehdr,
    pub phdrs: Vec<Phdr>,
}

impl<'a> ElfFile<'a> {
    pub fn parse(view: &'a ElfView) -> Result<Self> {
        let ehdr: Ehdr = unsafe {
            view.identify(0)
                .context("failed to read ELF header (file truncated?)")?
        };

        ensure!(
            &ehdr.e_ident[0..4] == raw::ELFMAG,
            "not an ELF file (bad magic)"
        );
        ensure!(
            ehdr.e_ident[4] == raw::ELFCLASS_NATIVE,
            "ELF class mismatch: file is not built for this host's word size"
        );
        ensure!(
            ehdr.e_machine == raw::EM_NATIVE,
            "ELF machine type mismatch: expected {}, found {}",
            raw::EM_NATIVE,
            ehdr.e_machine
        );
        ensure!(
            ehdr.e_type == raw::ET_DYN,
            "only ET_DYN shared objects are supported, found e_type={}",
            ehdr.e_type
        );

        let phoff = ehdr.e_phoff as usize;
        let phentsize = ehdr.e_phentsize as usize;
        ensure!(
            phentsize >= size_of::<Phdr>(),
            "program header entry size {phentsize} smaller than expected {}",
            size_of::<Phdr>()
        );

        let mut phdrs = Vec::with_capacity(ehdr.e_phnum as usize);
        for i in 0..ehdr.e_phnum as usize {
            let offset = phoff + i * phentsize;
            let phdr: Phdr = unsafe {
                view.identify(offset)
                    .with_context(|| format!("failed to read program header {i}"))?
            };
            phdrs.push(phdr);
        }

        Ok(Self { view, ehdr, phdrs })
    }

    pub fn load_segments(&self) -> impl Iterator<Item = &Phdr> {
        self.phdrs.iter().filter(|p| p.p_type == raw::PT_LOAD)
    }

    pub fn dynamic_segment(&self) -> Option<&Phdr> {
        self.phdrs.iter().find(|p| p.p_type == raw::PT_DYNAMIC)
    }

    /// Walks `PT_DYNAMIC` entries, locating the dynamic symbol table,
    /// dynamic string table, GNU hash table, and relocation sections. This
    /// is the authoritative source (vs. section headers, which Android
    /// shared objects routinely strip at runtime).
    pub fn dynamic_info(&self) -> Result<DynamicInfo> {
        let dynamic = self
            .dynamic_segment()
            .context("no PT_DYNAMIC segment: file is not a dynamically linked shared object")?;

        let count = dynamic.p_filesz as usize / size_of::<Dyn>();
        let entries: &[Dyn] = unsafe {
            self.view
                .identify_array(dynamic.p_offset as usize, count)
                .context("failed to read dynamic section entries")?
        };

        let mut info = DynamicInfo::default();
        let mut rel_size = 0usize;
        let mut rela_size = 0usize;
        for entry in entries {
            // `d_tag` is `i32` on Elf32Dyn and `i64` on Elf64Dyn; widen to
            // match the `i64`-typed DT_* constants on either word size.
            match entry.d_tag as i64 {
                raw::DT_NULL => break,
                raw::DT_SYMTAB => info.symtab_vaddr = Some(entry.d_val as u64),
                raw::DT_STRTAB => info.strtab_vaddr = Some(entry.d_val as u64),
                raw::DT_STRSZ => info.strtab_size = entry.d_val as usize,
                raw::DT_GNU_HASH => info.gnu_hash_vaddr = Some(entry.d_val as u64),
                raw::DT_REL => info.rel_vaddr = Some(entry.d_val as u64),
                raw::DT_RELSZ => rel_size = entry.d_val as usize,
                raw::DT_RELA => info.rela_vaddr = Some(entry.d_val as u64),
                raw::DT_RELASZ => rela_size = entry.d_val as usize,
                raw::DT_JMPREL => info.jmprel_vaddr = Some(entry.d_val as u64),
                raw::DT_PLTRELSZ => info.pltrel_size = entry.d_val as usize,
                raw::DT_PLTREL => info.pltrel_is_rela = entry.d_val as i64 == raw::DT_RELA,
                raw::DT_NEEDED => info.needed_str_offsets.push(entry.d_val as usize),
                _ => {}
            }
        }
        info.rel_size = rel_size;
        info.rela_size = rela_size;

        ensure!(
            info.symtab_vaddr.is_some(),
            "dynamic section has no DT_SYMTAB"
        );
        ensure!(
            info.strtab_vaddr.is_some(),
            "dynamic section has no DT_STRTAB"
        );

        Ok(info)
    }

    /// Reads the section-header string table, used only as a fallback
    /// diagnostic aid when a file still carries section headers.
    pub fn section_name_table(&self) -> Result<Option<Vec<u8>>> {
        if self.ehdr.e_shoff == 0 || self.ehdr.e_shstrndx == 0 {
            return Ok(None);
        }
        let shoff = self.ehdr.e_shoff as usize;
        let shentsize = self.ehdr.e_shentsize as usize;
        if shentsize < size_of::<Shdr>() {
            bail!("section header entry size smaller than expected");
        }
        let shstr_off = shoff + self.ehdr.e_shstrndx as usize * shentsize;
        let shdr: Shdr = unsafe { self.view.identify(shstr_off)? };
        let bytes = self
            .view
            .data()
            .get(shdr.sh_offset as usize..(shdr.sh_offset as usize + shdr.sh_size as usize))
            .context("section string table out of bounds")?;
        Ok(Some(bytes.to_vec()))
    }
}

/// The subset of `PT_DYNAMIC` entries the loader needs, with addresses
/// still expressed as file-relative virtual addresses (not yet rebased to
/// the image base).
#[derive(Default, Debug)]
pub struct DynamicInfo {
    pub symtab_vaddr: Option<u64>,
    pub strtab_vaddr: Option<u64>,
    pub strtab_size: usize,
    pub gnu_hash_vaddr: Option<u64>,
    pub rel_vaddr: Option<u64>,
    pub rel_size: usize,
    pub rela_vaddr: Option<u64>,
    pub rela_size: usize,
    pub jmprel_vaddr: Option<u64>,
    pub pltrel_size: usize,
    pub pltrel_is_rela: bool,
    pub needed_str_offsets: Vec<usize>,
}

/// Converts a virtual address as recorded in the dynamic section into a
/// file offset, valid only while the address falls inside some `PT_LOAD`
/// segment's file-backed range (true for all the tables this loader reads,
/// since they must be present in the file to be usable before relocation).
pub fn vaddr_to_file_offset(phdrs: &[Phdr], vaddr: u64) -> Result<usize> {
    for p in phdrs.iter().filter(|p| p.p_type == raw::PT_LOAD) {
        let start = p.p_vaddr as u64;
        let end = start + p.p_filesz as u64;
        if vaddr >= start && vaddr < end {
            return Ok((p.p_offset as u64 + (vaddr - start)) as usize);
        }
    }
    bail!("virtual address {vaddr:#x} not covered by any PT_LOAD segment's file range")
}

