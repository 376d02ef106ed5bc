//! Archive validation.
//!
//! A group is valid when its manifest and its members agree exactly: every
//! declared digest has a member with the same checksum, and no member is left
//! undeclared. Both directions are checked so the manifest can be trusted as
//! a complete description of what is about to be transmitted.

use crate::manifest::{member_name, Metadata, MANIFEST_FILE_NAME, PLATFORM_MANAGER_GROUP, USAGE_GROUP};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Validation error type.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Unable to read metadata file")]
    ReadMetadata(#[source] io::Error),

    #[error("Metadata file is invalid")]
    InvalidMetadata(#[source] serde_json::Error),

    #[error("Unable to list files in {}", archive.display())]
    ListFiles {
        archive: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Tar file {} has files with invalid names: {name}", archive.display())]
    InvalidFileName { archive: PathBuf, name: String },

    #[error("Tar file {} is missing contents", archive.display())]
    MissingFiles { archive: PathBuf },

    #[error("Tar file {} content does not match recorded value", archive.display())]
    InvalidFiles { archive: PathBuf },

    #[error("Tar file {} contains unexpected extra files", archive.display())]
    ExtraFiles { archive: PathBuf },
}

/// Read access to an existing archive.
pub trait ArchiveReader {
    /// Read the content of a named member.
    fn read_file(&self, name: &str) -> io::Result<Vec<u8>>;

    /// List every member with its base64 MD5 digest. Fails when a member name repeats.
    fn file_md5s(&self) -> io::Result<BTreeMap<String, String>>;

    /// Location of the archive on disk.
    fn archive_path(&self) -> &Path;
}

/// View of a single group of an archive, with member names relative to the group.
pub struct GroupReader<'a, R: ArchiveReader + ?Sized> {
    inner: &'a R,
    group: &'a str,
}

impl<'a, R: ArchiveReader + ?Sized> GroupReader<'a, R> {
    pub fn new(inner: &'a R, group: &'a str) -> Self {
        Self { inner, group }
    }

    pub fn group(&self) -> &str {
        self.group
    }
}

impl<R: ArchiveReader + ?Sized> ArchiveReader for GroupReader<'_, R> {
    fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        self.inner.read_file(&member_name(self.group, name))
    }

    fn file_md5s(&self) -> io::Result<BTreeMap<String, String>> {
        let prefix = format!("{}/", self.group);
        Ok(self
            .inner
            .file_md5s()?
            .into_iter()
            .filter_map(|(name, checksum)| {
                name.strip_prefix(&prefix)
                    .map(|relative| (relative.to_string(), checksum))
            })
            .collect())
    }

    fn archive_path(&self) -> &Path {
        self.inner.archive_path()
    }
}

/// Read and strictly parse the manifest member of a reader.
pub fn read_metadata<R: ArchiveReader + ?Sized>(reader: &R) -> Result<Metadata, ValidationError> {
    let bytes = reader
        .read_file(MANIFEST_FILE_NAME)
        .map_err(ValidationError::ReadMetadata)?;
    Metadata::from_slice(&bytes).map_err(ValidationError::InvalidMetadata)
}

/// Validate that the manifest of a reader matches its members exactly.
///
/// Returns the parsed manifest on success.
pub fn validate_group<R: ArchiveReader + ?Sized>(reader: &R) -> Result<Metadata, ValidationError> {
    let metadata = read_metadata(reader)?;
    let archive = reader.archive_path();

    let mut remaining = list_members(reader)?;
    remaining.remove(MANIFEST_FILE_NAME);

    for digest in &metadata.file_digests {
        if !is_valid_member_name(&digest.name) {
            return Err(ValidationError::InvalidFileName {
                archive: archive.to_path_buf(),
                name: digest.name.clone(),
            });
        }

        match remaining.get(&digest.name) {
            Some(checksum) if *checksum == digest.md5_checksum => {
                remaining.remove(&digest.name);
            }
            Some(_) => {
                return Err(ValidationError::InvalidFiles {
                    archive: archive.to_path_buf(),
                })
            }
            None => {
                return Err(ValidationError::MissingFiles {
                    archive: archive.to_path_buf(),
                })
            }
        }
    }

    if !remaining.is_empty() {
        debug!("Undeclared members: {:?}", remaining.keys().collect::<Vec<_>>());
        return Err(ValidationError::ExtraFiles {
            archive: archive.to_path_buf(),
        });
    }

    Ok(metadata)
}

/// Validate a whole archive.
///
/// The platform manager group is mandatory. The usage group is validated when
/// its manifest is present. Members outside the validated groups are extra
/// files. Returns the platform manager manifest, which describes the archive
/// as a whole.
pub fn validate_archive<R: ArchiveReader + ?Sized>(reader: &R) -> Result<Metadata, ValidationError> {
    let members = list_members(reader)?;

    let mut groups = vec![PLATFORM_MANAGER_GROUP];
    if members.contains_key(&member_name(USAGE_GROUP, MANIFEST_FILE_NAME)) {
        groups.push(USAGE_GROUP);
    }

    let platform_metadata = validate_group(&GroupReader::new(reader, PLATFORM_MANAGER_GROUP))?;
    if groups.contains(&USAGE_GROUP) {
        validate_group(&GroupReader::new(reader, USAGE_GROUP))?;
    }

    let stray = members.keys().any(|name| {
        !groups
            .iter()
            .any(|group| name.starts_with(&format!("{}/", group)))
    });
    if stray {
        return Err(ValidationError::ExtraFiles {
            archive: reader.archive_path().to_path_buf(),
        });
    }

    info!(
        "Validated {} ({} group(s), {} members)",
        reader.archive_path().display(),
        groups.len(),
        members.len()
    );
    Ok(platform_metadata)
}

fn list_members<R: ArchiveReader + ?Sized>(
    reader: &R,
) -> Result<BTreeMap<String, String>, ValidationError> {
    reader
        .file_md5s()
        .map_err(|source| ValidationError::ListFiles {
            archive: reader.archive_path().to_path_buf(),
            source,
        })
}

/// Whether `name` can be used as a digest name within a group.
pub fn is_valid_member_name(name: &str) -> bool {
    !name.contains('.') && !name.contains('/') && !name.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileDigest;

    struct FakeReader {
        path: PathBuf,
        files: BTreeMap<String, Vec<u8>>,
        md5s: BTreeMap<String, String>,
        list_error: Option<String>,
    }

    impl FakeReader {
        fn new() -> Self {
            Self {
                path: PathBuf::from("/tmp/some.tar"),
                files: BTreeMap::new(),
                md5s: BTreeMap::new(),
                list_error: None,
            }
        }

        fn with_metadata(mut self, group: &str, metadata: &Metadata) -> Self {
            let name = member_name(group, MANIFEST_FILE_NAME);
            self.files
                .insert(name.clone(), serde_json::to_vec(metadata).unwrap());
            self.md5s.insert(name, "file-to-skip-checking".to_string());
            self
        }

        fn with_member(mut self, name: &str, checksum: &str) -> Self {
            self.md5s.insert(name.to_string(), checksum.to_string());
            self
        }
    }

    impl ArchiveReader for FakeReader {
        fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
            self.files
                .get(name)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "can't find the file"))
        }

        fn file_md5s(&self) -> io::Result<BTreeMap<String, String>> {
            match &self.list_error {
                Some(message) => Err(io::Error::new(io::ErrorKind::Other, message.clone())),
                None => Ok(self.md5s.clone()),
            }
        }

        fn archive_path(&self) -> &Path {
            &self.path
        }
    }

    fn digest(name: &str, checksum: &str) -> FileDigest {
        FileDigest {
            name: name.to_string(),
            md5_checksum: checksum.to_string(),
            ..Default::default()
        }
    }

    fn two_file_metadata() -> Metadata {
        let mut metadata = Metadata::new("v1", "qa", "collected-at", "collection-id");
        metadata.file_digests = vec![digest("file1", "file1-md5"), digest("file2", "file2-md5")];
        metadata
    }

    fn pm(name: &str) -> String {
        member_name(PLATFORM_MANAGER_GROUP, name)
    }

    #[test]
    fn test_valid_group() {
        let reader = FakeReader::new()
            .with_metadata(PLATFORM_MANAGER_GROUP, &two_file_metadata())
            .with_member(&pm("file1"), "file1-md5")
            .with_member(&pm("file2"), "file2-md5");

        let metadata = validate_archive(&reader).unwrap();
        assert_eq!(metadata.collection_id, "collection-id");
    }

    #[test]
    fn test_extra_files() {
        let reader = FakeReader::new()
            .with_metadata(PLATFORM_MANAGER_GROUP, &two_file_metadata())
            .with_member(&pm("file1"), "file1-md5")
            .with_member(&pm("file2"), "file2-md5")
            .with_member(&pm("too-many-files"), "dun dun dunnnnn");

        let err = validate_archive(&reader).unwrap_err();
        assert!(matches!(err, ValidationError::ExtraFiles { .. }));
        assert_eq!(
            err.to_string(),
            "Tar file /tmp/some.tar contains unexpected extra files"
        );
    }

    #[test]
    fn test_missing_files() {
        let reader = FakeReader::new()
            .with_metadata(PLATFORM_MANAGER_GROUP, &two_file_metadata())
            .with_member(&pm("file1"), "file1-md5");

        let err = validate_archive(&reader).unwrap_err();
        assert!(matches!(err, ValidationError::MissingFiles { .. }));
        assert_eq!(err.to_string(), "Tar file /tmp/some.tar is missing contents");
    }

    #[test]
    fn test_checksum_mismatch() {
        let reader = FakeReader::new()
            .with_metadata(PLATFORM_MANAGER_GROUP, &two_file_metadata())
            .with_member(&pm("file1"), "file1-md5")
            .with_member(&pm("file2"), "not-matching-today");

        let err = validate_archive(&reader).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFiles { .. }));
        assert_eq!(
            err.to_string(),
            "Tar file /tmp/some.tar content does not match recorded value"
        );
    }

    #[test]
    fn test_rejects_names_with_dots_or_separators() {
        for bad in ["../escape", "file.json", "nested/file"] {
            let mut metadata = two_file_metadata();
            metadata.file_digests.push(digest(bad, "whatever"));
            let reader = FakeReader::new()
                .with_metadata(PLATFORM_MANAGER_GROUP, &metadata)
                .with_member(&pm("file1"), "file1-md5")
                .with_member(&pm("file2"), "file2-md5");

            let err = validate_archive(&reader).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidFileName { ref name, .. } if name == bad),
                "unexpected error for {}: {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_missing_metadata() {
        let reader = FakeReader::new().with_member(&pm("file1"), "file1-md5");
        let err = validate_archive(&reader).unwrap_err();
        assert!(matches!(err, ValidationError::ReadMetadata(_)));
    }

    #[test]
    fn test_invalid_metadata() {
        let mut reader = FakeReader::new();
        reader
            .files
            .insert(pm(MANIFEST_FILE_NAME), b"some-bad-metadata".to_vec());
        let err = validate_group(&GroupReader::new(&reader, PLATFORM_MANAGER_GROUP)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidMetadata(_)));
    }

    #[test]
    fn test_metadata_with_unknown_fields_is_invalid() {
        let mut reader = FakeReader::new();
        reader.files.insert(
            pm(MANIFEST_FILE_NAME),
            br#"{"envType":"qa","fileDigests":[],"extra":"field"}"#.to_vec(),
        );
        let err = validate_archive(&reader).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidMetadata(_)));
    }

    #[test]
    fn test_listing_failure() {
        let mut reader =
            FakeReader::new().with_metadata(PLATFORM_MANAGER_GROUP, &two_file_metadata());
        reader.list_error = Some("listing files and md5s is hard".to_string());

        let err = validate_archive(&reader).unwrap_err();
        assert!(err.to_string().contains("Unable to list files in /tmp/some.tar"));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("listing files and md5s is hard"));
    }

    #[test]
    fn test_usage_group_is_validated_when_present() {
        let mut usage = Metadata::new("v1", "qa", "collected-at", "collection-id");
        usage.file_digests = vec![digest("app_usages", "app-md5")];

        let reader = FakeReader::new()
            .with_metadata(PLATFORM_MANAGER_GROUP, &two_file_metadata())
            .with_member(&pm("file1"), "file1-md5")
            .with_member(&pm("file2"), "file2-md5")
            .with_metadata(USAGE_GROUP, &usage)
            .with_member(&member_name(USAGE_GROUP, "app_usages"), "wrong-md5");

        let err = validate_archive(&reader).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFiles { .. }));
    }

    #[test]
    fn test_members_outside_known_groups_are_extra() {
        let reader = FakeReader::new()
            .with_metadata(PLATFORM_MANAGER_GROUP, &two_file_metadata())
            .with_member(&pm("file1"), "file1-md5")
            .with_member(&pm("file2"), "file2-md5")
            .with_member("stray-file", "stray-md5");

        let err = validate_archive(&reader).unwrap_err();
        assert!(matches!(err, ValidationError::ExtraFiles { .. }));
    }

    #[test]
    fn test_usage_members_without_usage_manifest_are_extra() {
        let reader = FakeReader::new()
            .with_metadata(PLATFORM_MANAGER_GROUP, &two_file_metadata())
            .with_member(&pm("file1"), "file1-md5")
            .with_member(&pm("file2"), "file2-md5")
            .with_member(&member_name(USAGE_GROUP, "app_usages"), "app-md5");

        let err = validate_archive(&reader).unwrap_err();
        assert!(matches!(err, ValidationError::ExtraFiles { .. }));
    }

    #[test]
    fn test_group_reader_strips_prefix() {
        let reader = FakeReader::new()
            .with_member(&pm("file1"), "file1-md5")
            .with_member(&member_name(USAGE_GROUP, "app_usages"), "app-md5");

        let view = GroupReader::new(&reader, USAGE_GROUP);
        let md5s = view.file_md5s().unwrap();
        assert_eq!(md5s.len(), 1);
        assert_eq!(md5s.get("app_usages").map(String::as_str), Some("app-md5"));
        assert_eq!(view.group(), USAGE_GROUP);
    }
}
