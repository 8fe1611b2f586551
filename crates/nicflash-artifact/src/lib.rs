//! nicflash-artifact: Firmware package download and verification
//!
//! Fetches packages over HTTP, verifies them against an optional MD5 digest
//! and keeps verified copies on local disk for the next attempt.

pub mod checksum;
pub mod error;
pub mod store;

pub use checksum::Checksum;
pub use error::ArtifactError;
pub use store::{ArtifactRequest, ArtifactStore, HttpArtifactStore};
