//! Read-only storage backend consumed by the file service.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::AsyncRead;

use crate::TransferError;
use crate::types::FileHandle;
use crate::validation::validate_file_name;

/// A readable byte stream for one file.
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// A boxed future returned by storage methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// Storage backend: lists entries and opens files for reading.
pub trait Storage: Send + Sync + 'static {
    /// Names of the non-directory entries in the storage root.
    fn list_entries(&self) -> StorageFuture<'_, Vec<String>>;

    /// Opens `name` for reading.
    ///
    /// Fails with [`TransferError::NotFound`] if the name does not resolve
    /// to an existing file.
    fn open_for_read<'a>(&'a self, name: &'a str) -> StorageFuture<'a, (FileHandle, ByteSource)>;
}

/// Filesystem storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_entries(&self) -> Result<Vec<String>, TransferError> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(TransferError::StorageUnavailable)?;

        let mut names = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(TransferError::StorageUnavailable)?
        {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => {
                    tracing::warn!(name = ?raw, "skipping non UTF-8 entry");
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn open(&self, name: &str) -> Result<(FileHandle, ByteSource), TransferError> {
        validate_file_name(name)?;
        let path = self.root.join(name);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TransferError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            return Err(TransferError::NotFound(name.to_string()));
        }

        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            // Removed between the metadata call and the open.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TransferError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let handle = FileHandle::new(name, metadata.len())?;
        Ok((handle, Box::new(file) as ByteSource))
    }
}

impl Storage for FsStorage {
    fn list_entries(&self) -> StorageFuture<'_, Vec<String>> {
        Box::pin(self.read_entries())
    }

    fn open_for_read<'a>(&'a self, name: &'a str) -> StorageFuture<'a, (FileHandle, ByteSource)> {
        Box::pin(self.open(name))
    }
}
