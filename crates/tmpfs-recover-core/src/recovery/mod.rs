//! tmpfs recovery: page cache lookup, file reassembly and tree materialization

pub mod engine;
pub mod metadata;
pub mod page;
pub mod radix;
pub mod reassembly;
pub mod report;
pub mod superblock;
pub mod walker;

pub use engine::{RecoveryConfig, RecoveryEngine, RecoveryProgress};

pub use metadata::{MetadataFixer, Timestamps, DEFAULT_TIMESTAMP_SKEW_SECS};

pub use page::{page_array_base, PageResolver};

pub use radix::{PageLocator, PageSlot, RootSlot};

pub use reassembly::{trailing_slack, FileReassembler, MissingPagePolicy, ReassembledFile};

pub use report::{EntryOutcome, EntryStatus, RecoveryReport, SkipReason};

pub use superblock::{
    listing, locate_superblocks, select_candidate, ListingEntry, SuperblockCandidate, TMPFS,
};

pub use walker::{path_component, DirectoryWalker};
