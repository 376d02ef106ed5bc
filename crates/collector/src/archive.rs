//! Tar archive reading and writing.

use courier_bundle_schema::ArchiveReader;
use courier_common::hash;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, Header};
use tracing::debug;

/// Append-only sink for named archive members.
pub trait ArchiveWriter {
    /// Append `content` as the member `name`.
    fn add_file(&mut self, content: &[u8], name: &str) -> io::Result<()>;

    /// Finish the archive. Further writes fail.
    fn close(&mut self) -> io::Result<()>;
}

/// Writes members sequentially into an uncompressed tar file.
pub struct TarWriter {
    path: PathBuf,
    builder: Option<Builder<File>>,
}

impl TarWriter {
    /// Create (or truncate) the tar file at `path`.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            builder: Some(Builder::new(file)),
        })
    }
}

impl ArchiveWriter for TarWriter {
    fn add_file(&mut self, content: &[u8], name: &str) -> io::Result<()> {
        let builder = self
            .builder
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "archive is already closed"))?;

        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();

        builder.append_data(&mut header, name, content)
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(builder) = self.builder.take() {
            let file = builder.into_inner()?;
            file.sync_all()?;
            debug!("Closed archive {}", self.path.display());
        }
        Ok(())
    }
}

/// Reads members back out of a tar file on disk.
///
/// Every call re-reads the archive from the start, so the file is never held
/// open between operations.
pub struct TarReader {
    path: PathBuf,
}

impl TarReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(&self) -> io::Result<Archive<File>> {
        Ok(Archive::new(File::open(&self.path)?))
    }

    /// Member names must be unique, otherwise a name no longer identifies one content.
    fn duplicate(&self, name: &str) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} appears more than once in {}", name, self.path.display()),
        )
    }
}

impl ArchiveReader for TarReader {
    fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        let mut archive = self.open()?;
        let mut found = None;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.path()?.to_string_lossy() != name {
                continue;
            }
            if found.is_some() {
                return Err(self.duplicate(name));
            }
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            found = Some(content);
        }

        found.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found in {}", name, self.path.display()),
            )
        })
    }

    fn file_md5s(&self) -> io::Result<BTreeMap<String, String>> {
        let mut archive = self.open()?;
        let mut md5s = BTreeMap::new();
        for entry in archive.entries()? {
            let entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path()?.to_string_lossy().into_owned();
            if md5s.contains_key(&name) {
                return Err(self.duplicate(&name));
            }
            let checksum = hash::md5_base64_reader(entry)?;
            md5s.insert(name, checksum);
        }
        Ok(md5s)
    }

    fn archive_path(&self) -> &Path {
        &self.path
    }
}
