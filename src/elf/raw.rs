//! Byte-layout definitions for the ELF structures this loader reads.
//!
//! Only the fields this loader actually consumes are present; the layout
//! still matches the real ELF structures at the listed offsets so that
//! reinterpreting file bytes as these types is sound.

pub const EI_NIDENT: usize = 16;
pub const ELFMAG: &[u8; 4] = b"\x7fELF";

#[cfg(target_pointer_width = "64")]
pub const ELFCLASS_NATIVE: u8 = 2; // ELFCLASS64
#[cfg(target_pointer_width = "32")]
pub const ELFCLASS_NATIVE: u8 = 1; // ELFCLASS32

pub const ET_DYN: u16 = 3;

#[cfg(target_arch = "x86_64")]
pub const EM_NATIVE: u16 = 62; // EM_X86_64
#[cfg(target_arch = "x86")]
pub const EM_NATIVE: u16 = 3; // EM_386
#[cfg(target_arch = "aarch64")]
pub const EM_NATIVE: u16 = 183; // EM_AARCH64
#[cfg(target_arch = "arm")]
pub const EM_NATIVE: u16 = 40; // EM_ARM

pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

pub const SHT_REL: u32 = 9;
pub const SHT_RELA: u32 = 4;

pub const DT_NULL: i64 = 0;
pub const DT_NEEDED: i64 = 1;
pub const DT_PLTRELSZ: i64 = 2;
pub const DT_HASH: i64 = 4;
pub const DT_STRTAB: i64 = 5;
pub const DT_SYMTAB: i64 = 6;
pub const DT_RELA: i64 = 7;
pub const DT_RELASZ: i64 = 8;
pub const DT_RELAENT: i64 = 9;
pub const DT_STRSZ: i64 = 10;
pub const DT_SYMENT: i64 = 11;
pub const DT_REL: i64 = 17;
pub const DT_RELSZ: i64 = 18;
pub const DT_RELENT: i64 = 19;
pub const DT_JMPREL: i64 = 23;
pub const DT_PLTREL: i64 = 20;
pub const DT_GNU_HASH: i64 = 0x6fff_fef5;

pub const STN_UNDEF: u32 = 0;

/// `Elf64_Ehdr`, trimmed to the fields the loader reads.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64Ehdr {
    pub e_ident: [u8; EI_NIDENT],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// `Elf64_Phdr`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64Phdr {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

/// `Elf64_Shdr`, used only to recover the section-name string table as a
/// fallback when `.dynsym`/`.gnu.hash` cannot be found via `PT_DYNAMIC`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64Shdr {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

/// `Elf64_Dyn`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64Dyn {
    pub d_tag: i64,
    pub d_val: u64,
}

/// `Elf64_Sym`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64Sym {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

/// `Elf64_Rel`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64Rel {
    pub r_offset: u64,
    pub r_info: u64,
}

/// `Elf64_Rela`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64Rela {
    pub r_offset: u64,
    pub r_info: u64,
    pub r_addend: i64,
}

impl Elf64Rel {
    pub fn r_sym(&self) -> u32 {
        (self.r_info >> 32) as u32
    }
    pub fn r_type(&self) -> u32 {
        (self.r_info & 0xffff_ffff) as u32
    }
}

impl Elf64Rela {
    pub fn r_sym(&self) -> u32 {
        (self.r_info >> 32) as u32
    }
    pub fn r_type(&self) -> u32 {
        (self.r_info & 0xffff_ffff) as u32
    }
}

/// GNU hash table header, as laid out at the start of `.gnu.hash`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GnuHashHeader {
    pub nbuckets: u32,
    pub symoffset: u32,
    pub bloom_size: u32,
    pub bloom_shift: u32,
}

/// `Elf32_Ehdr`, trimmed like its 64-bit counterpart.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf32Ehdr {
    pub e_ident: [u8; EI_NIDENT],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u32,
    pub e_phoff: u32,
    pub e_shoff: u32,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// `Elf32_Phdr`. Field order differs from the 64-bit layout: `p_flags`
/// comes right after `p_offset` rather than after `p_paddr`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf32Phdr {
    pub p_type: u32,
    pub p_offset: u32,
    pub p_vaddr: u32,
    pub p_paddr: u32,
    pub p_filesz: u32,
    pub p_memsz: u32,
    pub p_flags: u32,
    pub p_align: u32,
}

/// `Elf32_Shdr`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf32Shdr {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u32,
    pub sh_addr: u32,
    pub sh_offset: u32,
    pub sh_size: u32,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u32,
    pub sh_entsize: u32,
}

/// `Elf32_Dyn`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf32Dyn {
    pub d_tag: i32,
    pub d_val: u32,
}

/// `Elf32_Sym`. Field order differs from the 64-bit layout.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf32Sym {
    pub st_name: u32,
    pub st_value: u32,
    pub st_size: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
}

/// `Elf32_Rel`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf32Rel {
    pub r_offset: u32,
    pub r_info: u32,
}

/// `Elf32_Rela`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf32Rela {
    pub r_offset: u32,
    pub r_info: u32,
    pub r_addend: i32,
}

impl Elf32Rel {
    pub fn r_sym(&self) -> u32 {
        self.r_info >> 8
    }
    pub fn r_type(&self) -> u32 {
        self.r_info & 0xff
    }
}

impl Elf32Rela {
    pub fn r_sym(&self) -> u32 {
        self.r_info >> 8
    }
    pub fn r_type(&self) -> u32 {
        self.r_info & 0xff
    }
}

#[cfg(target_pointer_width = "64")]
mod native {
    pub use super::{
        Elf64Dyn as Dyn, Elf64Ehdr as Ehdr, Elf64Phdr as Phdr, Elf64Rel as Rel,
        Elf64Rela as Rela, Elf64Shdr as Shdr, Elf64Sym as Sym,
    };
}

#[cfg(target_pointer_width = "32")]
mod native {
    pub use super::{
        Elf32Dyn as Dyn, Elf32Ehdr as Ehdr, Elf32Phdr as Phdr, Elf32Rel as Rel,
        Elf32Rela as Rela, Elf32Shdr as Shdr, Elf32Sym as Sym,
    };
}

pub use native::{Dyn, Ehdr, Phdr, Rel, Rela, Shdr, Sym};
