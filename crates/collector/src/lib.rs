//! Courier collector - gathers foundation data into a verifiable archive
//! and ships it to the data loader.

pub mod archive;
pub mod collector;
pub mod network;
pub mod sender;
pub mod sources;

#[cfg(test)]
pub(crate) mod test_utils;

pub use archive::{ArchiveWriter, TarReader, TarWriter};
pub use collector::{CollectError, CollectExecutor};
pub use sender::{SendError, SendExecutor};
pub use sources::{CollectedItem, DataSource, SourceError};
