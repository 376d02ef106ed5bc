//! Fakes shared by the unit tests of this crate.

use crate::archive::ArchiveWriter;
use crate::sources::{CollectedItem, DataSource, SourceError};
use async_trait::async_trait;
use courier_bundle_schema::ArchiveReader;
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source returning a fixed list of `(name, content)` JSON items, or a failure.
pub struct FakeSource {
    product_type: String,
    items: Vec<(String, String)>,
    failure_status: Option<u16>,
    unreadable: Option<String>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(product_type: &str, items: &[(&str, &str)]) -> Self {
        Self {
            product_type: product_type.to_string(),
            items: items
                .iter()
                .map(|(name, content)| (name.to_string(), content.to_string()))
                .collect(),
            failure_status: None,
            unreadable: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        let mut source = Self::new("", &[]);
        source.failure_status = Some(status);
        source
    }

    /// Add an item whose content cannot be read.
    pub fn with_unreadable_item(mut self, name: &str) -> Self {
        self.unreadable = Some(name.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct BrokenReader;

impl Read for BrokenReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "content is gone"))
    }
}

#[async_trait]
impl DataSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.failure_status {
            return Err(SourceError::UnexpectedStatus {
                url: "http://fake".to_string(),
                status,
            });
        }

        let mut items: Vec<CollectedItem> = self
            .items
            .iter()
            .map(|(name, content)| {
                CollectedItem::json(
                    name.as_str(),
                    self.product_type.as_str(),
                    name.as_str(),
                    content.clone().into_bytes(),
                )
            })
            .collect();
        if let Some(name) = &self.unreadable {
            items.push(CollectedItem::new(
                name.as_str(),
                "application/json",
                "",
                "",
                BrokenReader,
            ));
        }
        Ok(items)
    }
}

/// In-memory writer recording every member and whether it was closed.
#[derive(Default)]
pub struct FakeWriter {
    pub files: Vec<(String, Vec<u8>)>,
    pub closed: bool,
    pub fail_on: Option<String>,
    pub fail_close: bool,
}

impl FakeWriter {
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|(file_name, _)| file_name == name)
            .map(|(_, content)| content.as_slice())
    }
}

impl ArchiveWriter for FakeWriter {
    fn add_file(&mut self, content: &[u8], name: &str) -> io::Result<()> {
        if self.fail_on.as_deref() == Some(name) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk is full"));
        }
        self.files.push((name.to_string(), content.to_vec()));
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        if self.fail_close {
            return Err(io::Error::new(io::ErrorKind::Other, "close failed"));
        }
        Ok(())
    }
}

/// Reader backed by in-memory members and a separate digest listing.
pub struct FakeReader {
    pub path: PathBuf,
    pub files: BTreeMap<String, Vec<u8>>,
    pub md5s: BTreeMap<String, String>,
}

impl FakeReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            files: BTreeMap::new(),
            md5s: BTreeMap::new(),
        }
    }
}

impl ArchiveReader for FakeReader {
    fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unexpected file requested"))
    }

    fn file_md5s(&self) -> io::Result<BTreeMap<String, String>> {
        Ok(self.md5s.clone())
    }

    fn archive_path(&self) -> &Path {
        &self.path
    }
}
