//! In-process loader for Android/Bionic ELF shared libraries.
//!
//! Given a path to an `.so` built for the Android ELF ABI, [`open_library`]
//! maps its loadable segments into this process, resolves every dynamic
//! relocation against a curated table of host-implemented Bionic symbols,
//! and returns a [`LoadedLibrary`] whose [`LoadedLibrary::load_symbol`]
//! resolves exported symbols to callable addresses.
//!
//! Out of scope: lazy (PLT-resident) resolution, `dlopen`-style global
//! scope chaining across libraries, real threading semantics for the
//! emulated Bionic primitives, initializers/finalizers, TLS, and
//! non-shared (`ET_EXEC`) files. See the module docs under [`segment`],
//! [`reloc`], and [`hostsyms`] for where each of those boundaries lives.

mod arch;
mod elf;
mod error;
mod gnuhash;
mod hostsyms;
mod library;
mod reloc;
mod resolve;
mod segment;

pub use error::{LoadError, SymbolNotFound};
pub use library::{close_library, open_library, LoadedLibrary};

#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
