//! Typed errors at the loader's public boundary. Internal plumbing uses
//! `anyhow::Result` and `.context(..)`, the way the teacher crate's own
//! ELF-handling modules do; [`LoadError`] is where that collapses into a
//! stable, matchable shape for callers.

use thiserror::Error;

/// Errors `open_library` can return. Corresponds to spec error kinds 1-3.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to map library file: {0}")]
    Io(#[source] anyhow::Error),

    #[error("malformed ELF file: {0}")]
    MalformedElf(#[source] anyhow::Error),

    #[error("overlapping LOAD segments in {path}: {first:#x}..{first_end:#x} overlaps {second:#x}..{second_end:#x}")]
    OverlappingSegments {
        path: String,
        first: u64,
        first_end: u64,
        second: u64,
        second_end: u64,
    },

    #[error("no PT_LOAD segments found in {0}")]
    MissingLoadSegment(String),

    #[error("unknown relocation type {reloc_type} in {path}")]
    UnknownRelocationType { path: String, reloc_type: u32 },

    #[error("relocation offset {offset:#x} out of bounds for the {image_len}-byte image in {path}")]
    RelocationOutOfBounds {
        path: String,
        offset: u64,
        image_len: usize,
    },
}

/// Error returned by [`crate::LoadedLibrary::load_symbol`] (spec error kind 4).
#[derive(Debug, Error)]
#[error("symbol not found: {0}")]
pub struct SymbolNotFound(pub String);
