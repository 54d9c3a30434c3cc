//! Perfect-hash dispatch over the fixed host symbol wordlist (spec §3, §4.C).
//!
//! Parameters: `min_word_length = 4`, `max_word_length = 22`,
//! `max_hash_value = 45`. The keyed positions are `str[0]`, `str[1]` (when
//! `len >= 2`), and `str[15]` (when `len >= 16`). This mirrors the layout a
//! `gperf`-generated dispatcher produces for a small fixed keyword set, the
//! same shape Bionic's own linker uses internally for its symbol tables.

pub const MIN_WORD_LENGTH: usize = 4;
pub const MAX_WORD_LENGTH: usize = 22;
pub const MAX_HASH_VALUE: usize = 45;

/// Associated values keyed by input byte. Most entries are 0 because only
/// the bytes that actually appear at a keyed position in one of the 29
/// wordlist entries matter; 0 is a safe default for every other byte.
#[rustfmt::skip]
const ASSOC_VALUES: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2,
    0, 6, 0, 8, 12, 7, 0, 4, 1, 2, 0, 28, 23, 4, 5, 1,
    10, 0, 2, 0, 0, 8, 0, 14, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Computes the hash value for `name`, or `None` if its length falls
/// outside `[MIN_WORD_LENGTH, MAX_WORD_LENGTH]` or the resulting value
/// exceeds `MAX_HASH_VALUE` — either case means `name` cannot be a member
/// of the fixed wordlist and the caller should skip straight to "unknown".
pub fn hash_value(name: &str) -> Option<usize> {
    let bytes = name.as_bytes();
    let len = bytes.len();
    if len < MIN_WORD_LENGTH || len > MAX_WORD_LENGTH {
        return None;
    }

    let mut h = len as usize;
    h += ASSOC_VALUES[bytes[0] as usize] as usize;
    if len >= 2 {
        h += ASSOC_VALUES[bytes[1] as usize] as usize;
    }
    if len >= 16 {
        h += ASSOC_VALUES[bytes[15] as usize] as usize;
    }

    if h > MAX_HASH_VALUE {
        None
    } else {
        Some(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORDS: &[&str] = &[
        "open", "close", "read", "write", "lstat", "fstat", "mkdir", "chmod", "umask",
        "ftruncate", "malloc", "free", "strncpy", "gettimeofday", "__errno", "arc4random",
        "__system_property_get", "pthread_create", "pthread_once", "pthread_mutex_lock",
        "pthread_mutex_unlock", "pthread_rwlock_init", "pthread_rwlock_destroy",
        "pthread_rwlock_rdlock", "pthread_rwlock_wrlock", "pthread_rwlock_unlock", "dlopen",
        "dlsym", "dlclose",
    ];

    #[test]
    fn wordlist_hashes_are_pairwise_distinct() {
        let mut seen = std::collections::HashSet::new();
        for word in WORDS {
            let h = hash_value(word).unwrap_or_else(|| panic!("{word} hashed out of range"));
            assert!(h <= MAX_HASH_VALUE);
            assert!(seen.insert(h), "collision on hash {h} for {word}");
        }
    }

    #[test]
    fn swapping_two_entries_breaks_at_least_one_lookup() {
        // Build a {slot -> stored name} table exactly like
        // `super::super::build_table` would, then simulate a build bug that
        // stores "dlopen" and "dlsym" at each other's slots. The hash alone
        // cannot catch this (both slots are still occupied); the full
        // string comparison callers do after the hash lookup must.
        let mut table: std::collections::HashMap<usize, &str> = WORDS
            .iter()
            .map(|&word| (hash_value(word).unwrap(), word))
            .collect();

        let lookup = |table: &std::collections::HashMap<usize, &str>, name: &str| {
            hash_value(name).and_then(|slot| table.get(&slot)).copied() == Some(name)
        };
        assert!(lookup(&table, "dlopen"));
        assert!(lookup(&table, "dlsym"));

        let dlopen_slot = hash_value("dlopen").unwrap();
        let dlsym_slot = hash_value("dlsym").unwrap();
        table.insert(dlopen_slot, "dlsym");
        table.insert(dlsym_slot, "dlopen");

        assert!(
            !lookup(&table, "dlopen") || !lookup(&table, "dlsym"),
            "swapping dlopen/dlsym's stored names should break at least one lookup"
        );
    }

    #[test]
    fn random_non_member_strings_usually_miss() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut hit = 0;
        for _ in 0..10_000 {
            let len = rng.gen_range(1..=30);
            let s: String = (0..len)
                .map(|_| (rng.gen_range(b'a'..=b'z')) as char)
                .collect();
            if !WORDS.contains(&s.as_str()) {
                if let Some(h) = hash_value(&s) {
                    if h <= MAX_HASH_VALUE {
                        hit += 1;
                    }
                }
            }
        }
        // The hash alone is not required to reject every non-member (that's
        // what the full-string comparison in the lookup table is for); it
        // only needs to keep the false-positive rate low enough that the
        // table lookup stays cheap.
        assert!(hit < 2_000, "hash collided with the live range too often: {hit}/10000");
    }
}
