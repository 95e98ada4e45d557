use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown structure in profile: {0}")]
    UnknownStructure(String),

    #[error("Unknown field {structure}.{field} in profile")]
    UnknownField { structure: String, field: String },

    #[error("Unknown symbol in profile: {0}")]
    UnknownSymbol(String),

    #[error("Field {structure}.{field} has a type that cannot be read")]
    UnsupportedFieldType { structure: String, field: String },

    #[error("Cannot translate virtual address {0:#x}")]
    InvalidAddress(u64),

    #[error("Corrupt kernel structure: {0}")]
    CorruptStructure(String),

    #[error("Page reference {page:#x} is outside the page descriptor array at {mem_map:#x}")]
    PageOutsideMemMap { page: u64, mem_map: u64 },

    #[error("Page {index} of inode {inode:#x} is not resident")]
    MissingPage { inode: u64, index: u64 },

    #[error("Superblock {index} is out of range ({available} tmpfs superblocks available)")]
    SelectionOutOfRange { index: usize, available: usize },

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
