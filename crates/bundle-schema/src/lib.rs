//! Archive schema definitions for courier.
//!
//! This crate defines the per-group manifest written into a collection
//! archive and the rules that tie a manifest to the archive content.

pub mod manifest;
pub mod validation;

pub use manifest::{
    member_name, FileDigest, Metadata, MANIFEST_FILE_NAME, PLATFORM_MANAGER_GROUP, USAGE_GROUP,
};
pub use validation::{
    is_valid_member_name, read_metadata, validate_archive, validate_group, ArchiveReader,
    GroupReader, ValidationError,
};
