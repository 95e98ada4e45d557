//! Forensic integrity features for recovered evidence

pub mod verification;

pub use verification::{
    calculate_file_hash, calculate_hash, verify_file_integrity, FileHash, HashAlgorithm,
    HashVerification, VerificationStatus,
};
