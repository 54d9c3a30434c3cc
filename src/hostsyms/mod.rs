//! Component C: the fixed host symbol table Bionic-referencing relocations
//! resolve against.

mod perfect_hash;
mod stubs;

use lazy_static::lazy_static;

struct HostEntry {
    name: &'static str,
    ptr: usize,
}

lazy_static! {
    static ref TABLE: [Option<HostEntry>; perfect_hash::MAX_HASH_VALUE + 1] = build_table();
}

/// The pointer substituted for every relocation whose referenced symbol
/// name is absent from the table. Invoking it aborts the host process
/// (spec error kind 5).
pub fn undefined_symbol_ptr() -> usize {
    stubs::undefined_symbol as usize
}

/// Looks up `name` in the fixed host symbol wordlist. Returns `None` for
/// anything not in the set — the caller substitutes [`undefined_symbol_ptr`].
pub fn lookup(name: &str) -> Option<usize> {
    let slot = perfect_hash::hash_value(name)?;
    match &TABLE[slot] {
        Some(entry) if entry.name == name => Some(entry.ptr),
        _ => None,
    }
}

fn build_table() -> [Option<HostEntry>; perfect_hash::MAX_HASH_VALUE + 1] {
    const NONE: Option<HostEntry> = None;
    let mut table: [Option<HostEntry>; perfect_hash::MAX_HASH_VALUE + 1] =
        [NONE; perfect_hash::MAX_HASH_VALUE + 1];

    let entries: &[(&str, usize)] = &[
        ("open", libc::open as usize),
        ("close", libc::close as usize),
        ("read", libc::read as usize),
        ("write", libc::write as usize),
        ("lstat", libc::lstat as usize),
        ("fstat", libc::fstat as usize),
        ("mkdir", libc::mkdir as usize),
        ("chmod", libc::chmod as usize),
        ("umask", libc::umask as usize),
        ("ftruncate", libc::ftruncate as usize),
        ("malloc", libc::malloc as usize),
        ("free", libc::free as usize),
        ("strncpy", libc::strncpy as usize),
        ("gettimeofday", libc::gettimeofday as usize),
        ("__errno", stubs::host_errno as usize),
        ("arc4random", stubs::arc4random as usize),
        ("__system_property_get", stubs::system_property_get as usize),
        ("pthread_create", stubs::pthread_stub as usize),
        ("pthread_once", stubs::pthread_stub as usize),
        ("pthread_mutex_lock", stubs::pthread_stub as usize),
        ("pthread_mutex_unlock", stubs::pthread_stub as usize),
        ("pthread_rwlock_init", stubs::pthread_stub as usize),
        ("pthread_rwlock_destroy", stubs::pthread_stub as usize),
        ("pthread_rwlock_rdlock", stubs::pthread_stub as usize),
        ("pthread_rwlock_wrlock", stubs::pthread_stub as usize),
        ("pthread_rwlock_unlock", stubs::pthread_stub as usize),
        ("dlopen", stubs::dlopen as usize),
        ("dlsym", stubs::dlsym as usize),
        ("dlclose", stubs::dlclose as usize),
    ];

    for &(name, ptr) in entries {
        let slot = perfect_hash::hash_value(name)
            .unwrap_or_else(|| panic!("host symbol {name} hashes out of the table's range"));
        assert!(
            table[slot].is_none(),
            "host symbol table slot collision: {name} collides with {}",
            table[slot].as_ref().unwrap().name
        );
        table[slot] = Some(HostEntry { name, ptr });
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_wordlist_entry_resolves_to_intended_pointer() {
        assert_eq!(lookup("open").unwrap(), libc::open as usize);
        assert_eq!(lookup("malloc").unwrap(), libc::malloc as usize);
        assert_eq!(lookup("dlopen").unwrap(), stubs::dlopen as usize);
    }

    #[test]
    fn unknown_symbol_returns_none() {
        assert!(lookup("this_is_not_a_bionic_symbol").is_none());
        assert!(lookup("a").is_none()); // shorter than MIN_WORD_LENGTH
    }

    #[test]
    fn system_property_get_reports_fixed_string() {
        let mut buf = [0u8; 64];
        let len = unsafe {
            stubs::system_property_get(
                std::ptr::null(),
                buf.as_mut_ptr() as *mut std::os::raw::c_char,
            )
        };
        assert_eq!(len, 13);
        assert_eq!(&buf[..13], b"no s/n number");
    }

    #[test]
    fn pthread_stub_always_returns_zero() {
        assert_eq!(unsafe { stubs::pthread_stub() }, 0);
    }
}
