//! Keyed blob archives stored as zip files in the cache directory.

use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::runtime::Runtime;

/// The archives the cache knows how to open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// File lists of one sync repository, keyed by `name-version`.
    Files(String),
    /// Log excerpts keyed by package name.
    Log,
    /// Cached package file paths keyed by `name/arch`.
    PackageCache,
}

impl ArchiveKind {
    pub fn file_name(&self) -> String {
        match self {
            ArchiveKind::Files(repository) => format!("{}.files.zip", repository),
            ArchiveKind::Log => "log.zip".to_string(),
            ArchiveKind::PackageCache => "pkgcache.zip".to_string(),
        }
    }
}

/// Read-only keyed blob storage.
#[cfg_attr(test, mockall::automock)]
pub trait BlobStore: Send {
    /// Returns `Ok(None)` when the key is absent.
    fn read(&mut self, key: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Opens archives; a failure is treated as a cache miss.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveLoader: Send + Sync {
    fn open(&self, kind: &ArchiveKind) -> io::Result<Box<dyn BlobStore>>;
}

pub struct ZipStore {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl ZipStore {
    pub fn new(bytes: Vec<u8>) -> io::Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self { archive })
    }
}

impl BlobStore for ZipStore {
    fn read(&mut self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match self.archive.by_name(key) {
            Ok(mut entry) => {
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                Ok(Some(data))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(ZipError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }
}

/// Loads `<dir>/<kind file name>` through the runtime.
pub struct ZipArchiveLoader {
    runtime: Arc<dyn Runtime>,
    dir: PathBuf,
}

impl ZipArchiveLoader {
    pub fn new(runtime: Arc<dyn Runtime>, dir: PathBuf) -> Self {
        Self { runtime, dir }
    }
}

impl ArchiveLoader for ZipArchiveLoader {
    fn open(&self, kind: &ArchiveKind) -> io::Result<Box<dyn BlobStore>> {
        let path = self.dir.join(kind.file_name());
        debug!("Opening archive {:?}", path);
        let bytes = self
            .runtime
            .read(&path)
            .map_err(|e| io::Error::new(io::ErrorKind::NotFound, format!("{:#}", e)))?;
        Ok(Box::new(ZipStore::new(bytes)?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use std::io::Write;
    use zip::CompressionMethod;
    use zip::ZipWriter;
    use zip::write::FileOptions;

    pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_file_names() {
        assert_eq!(ArchiveKind::Files("core".into()).file_name(), "core.files.zip");
        assert_eq!(ArchiveKind::Log.file_name(), "log.zip");
        assert_eq!(ArchiveKind::PackageCache.file_name(), "pkgcache.zip");
    }

    #[test]
    fn test_zip_store_reads_entries() {
        let mut store = ZipStore::new(zip_bytes(&[("bash-5.2-1", "usr/bin/bash\n")])).unwrap();
        assert_eq!(store.read("bash-5.2-1").unwrap().unwrap(), b"usr/bin/bash\n");
        assert!(store.read("zsh-5.9-1").unwrap().is_none());
    }

    #[test]
    fn test_zip_store_rejects_garbage() {
        let err = ZipStore::new(b"not a zip".to_vec()).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_loader_reads_from_cache_dir() {
        let bytes = zip_bytes(&[("bash", "[2024-01-01T10:00] installed bash")]);
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read()
            .withf(|path| path == std::path::Path::new("/cache/log.zip"))
            .returning(move |_| Ok(bytes.clone()));

        let loader = ZipArchiveLoader::new(Arc::new(runtime), PathBuf::from("/cache"));
        let mut store = loader.open(&ArchiveKind::Log).unwrap();
        assert!(store.read("bash").unwrap().is_some());
    }

    #[test]
    fn test_loader_missing_archive() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read()
            .returning(|_| Err(anyhow::anyhow!("No such file")));

        let loader = ZipArchiveLoader::new(Arc::new(runtime), PathBuf::from("/cache"));
        let err = loader.open(&ArchiveKind::Files("core".into())).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
