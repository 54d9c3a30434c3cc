//! GNU hash table view and the exported-symbol lookup algorithm
//! (Component E).

use anyhow::{ensure, Context, Result};

use crate::elf::raw::GnuHashHeader;
use crate::elf::view::ElfView;

#[cfg(target_pointer_width = "64")]
pub type BloomWord = u64;
#[cfg(target_pointer_width = "32")]
pub type BloomWord = u32;

const BLOOM_WORD_BITS: u32 = (std::mem::size_of::<BloomWord>() * 8) as u32;

/// Borrowed view over a `.gnu.hash` section: header plus the bloom filter,
/// bucket array, and chain array, all read directly from the file mapping.
pub struct GnuHashTable<'a> {
    pub header: GnuHashHeader,
    pub bloom: &'a [BloomWord],
    pub buckets: &'a [u32],
    pub chain: &'a [u32],
}

impl<'a> GnuHashTable<'a> {
    /// `file_offset` is the file offset of the start of `.gnu.hash`.
    pub fn parse(view: &'a ElfView, file_offset: usize) -> Result<Self> {
        let header: GnuHashHeader = unsafe {
            view.identify(file_offset)
                .context("failed to read GNU hash table header")?
        };

        let mut offset = file_offset + std::mem::size_of::<GnuHashHeader>();
        let bloom: &[BloomWord] = unsafe {
            view.identify_array(offset, header.bloom_size as usize)
                .context("failed to read GNU hash bloom filter")?
        };
        offset += header.bloom_size as usize * std::mem::size_of::<BloomWord>();

        let buckets: &[u32] = unsafe {
            view.identify_array(offset, header.nbuckets as usize)
                .context("failed to read GNU hash bucket array")?
        };
        offset += header.nbuckets as usize * std::mem::size_of::<u32>();

        // The chain array's length isn't recorded in the header; it runs
        // from `symoffset` up to the highest symbol index reachable from
        // any bucket. We conservatively read up to the end of the mapped
        // file and let callers index only as far as the chain-end marker.
        let remaining_words = (view.len().saturating_sub(offset)) / std::mem::size_of::<u32>();
        let chain: &[u32] = unsafe {
            view.identify_array(offset, remaining_words)
                .context("failed to read GNU hash chain array")?
        };

        Ok(Self {
            header,
            bloom,
            buckets,
            chain,
        })
    }

    /// The GNU hash function: `h = 5381; h = h*33 + c` over each byte,
    /// wrapping on 32 bits.
    pub fn hash(name: &str) -> u32 {
        let mut h: u32 = 5381;
        for &c in name.as_bytes() {
            h = h.wrapping_mul(33).wrapping_add(c as u32);
        }
        h
    }

    /// Returns true if `name` might be present, per the bloom filter. A
    /// `false` result is a guaranteed negative; `true` requires falling
    /// back to the chain walk.
    fn bloom_might_contain(&self, hash: u32) -> bool {
        if self.bloom.is_empty() {
            return true;
        }
        let word = self.bloom[((hash / BLOOM_WORD_BITS) as usize) % self.bloom.len()];
        let bit1 = 1 as BloomWord << (hash % BLOOM_WORD_BITS);
        let bit2 = 1 as BloomWord << ((hash >> self.header.bloom_shift) % BLOOM_WORD_BITS);
        (word & bit1 != 0) && (word & bit2 != 0)
    }

    /// Looks up `name` among the chain entries starting from `symtab_index`
    /// at `bucket`, calling `name_at(sym_index)` to fetch each candidate's
    /// name for comparison. Returns the dynamic symbol table index on
    /// success.
    pub fn lookup<F>(&self, name: &str, mut name_at: F) -> Result<Option<u32>>
    where
        F: FnMut(u32) -> Result<String>,
    {
        ensure!(self.header.nbuckets > 0, "GNU hash table has no buckets");
        let hash = Self::hash(name);

        if !self.bloom_might_contain(hash) {
            return Ok(None);
        }

        let bucket = self.buckets[(hash % self.header.nbuckets) as usize];
        if bucket < self.header.symoffset {
            return Ok(None);
        }

        let mut sym_index = bucket;
        loop {
            let chain_idx = (sym_index - self.header.symoffset) as usize;
            let chain_word = *self
                .chain
                .get(chain_idx)
                .context("GNU hash chain index out of bounds")?;

            if (chain_word & !1) == (hash & !1) && name_at(sym_index)? == name {
                return Ok(Some(sym_index));
            }

            if chain_word & 1 != 0 {
                return Ok(None);
            }
            sym_index += 1;
        }
    }
}
