//! The storage host contract.
//!
//! Backend authors implement the seven `*_unchecked` primitives, each of
//! which may assume its documented precondition holds; callers are
//! responsible for having checked. The composite operations are derived
//! from the primitives once, here, and handle existence checks, recursion,
//! error translation, and listing order for every backend.

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::prelude::*;

/// A remote storage backend addressed entirely by path.
#[async_trait]
pub trait StorageHost: Send + Sync {
    /// Human-readable name of the backend.
    fn host_name(&self) -> &'static str;

    /// Acquires whatever credentials the backend needs. Defaults to a
    /// no-op for backends without authentication.
    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    /// Whether a file or directory exists at the path.
    async fn exists(&self, path: &FilePath) -> Result<bool>;

    /// True for a directory, false for a file. Assumes the path exists.
    async fn is_directory_unchecked(&self, path: &FilePath) -> Result<bool>;

    /// Child names, in no particular order. Assumes the path is a
    /// directory.
    async fn list_unchecked(&self, path: &FilePath) -> Result<Vec<String>>;

    /// Full content of a file. Assumes the path is a file.
    async fn read_file_unchecked(&self, path: &FilePath) -> Result<String>;

    /// Writes a new file. Assumes the parent directory exists and nothing
    /// occupies the path.
    async fn write_file_unchecked(&self, path: &FilePath, content: &str) -> Result<()>;

    /// Creates an empty directory. Assumes the parent directory exists and
    /// nothing occupies the path.
    async fn make_directory_unchecked(&self, path: &FilePath) -> Result<()>;

    /// Deletes a file. Assumes the path is a file.
    async fn delete_file_unchecked(&self, path: &FilePath) -> Result<()>;

    /// Deletes a directory. Assumes it exists and is empty. Backends whose
    /// delete primitive does not distinguish files from directories keep
    /// this default.
    async fn delete_directory_unchecked(&self, path: &FilePath) -> Result<()> {
        self.delete_file_unchecked(path).await
    }

    /// True for a directory, false for a file. Fails with
    /// [`Error::NotFound`] when nothing exists at the path.
    async fn is_directory(&self, path: &FilePath) -> Result<bool> {
        if self.exists(path).await? {
            self.is_directory_unchecked(path).await
        } else {
            Err(Error::NotFound(path.clone()))
        }
    }

    /// Child names sorted lexicographically. Fails with
    /// [`Error::NotADirectory`] when the path names a file.
    async fn list(&self, path: &FilePath) -> Result<Vec<String>> {
        if self.is_directory(path).await? {
            let mut names = self.list_unchecked(path).await?;
            names.sort_unstable();
            Ok(names)
        } else {
            Err(Error::NotADirectory(path.clone()))
        }
    }

    /// Full content of a file. Fails with [`Error::NotAFile`] when the
    /// path names a directory.
    async fn read_file(&self, path: &FilePath) -> Result<String> {
        if self.is_directory(path).await? {
            Err(Error::NotAFile(path.clone()))
        } else {
            self.read_file_unchecked(path).await
        }
    }

    /// Ensures a directory exists at the path, creating missing parents
    /// first. A file occupying the path is deleted; an existing directory
    /// makes this a no-op.
    async fn make_directory(&self, path: &FilePath) -> Result<()> {
        let mut file_exists = false;
        let mut directory_exists = false;
        match self.is_directory(path).await {
            Ok(is_directory) => {
                directory_exists = is_directory;
                file_exists = !is_directory;
            }
            Err(Error::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        if file_exists {
            self.delete_file_unchecked(path).await?;
        }
        if !directory_exists {
            let parent = path.parent();
            if parent != *path && !self.exists(&parent).await? {
                self.make_directory(&parent).await?;
            }
            self.make_directory_unchecked(path).await?;
        }
        Ok(())
    }

    /// Ensures a file exists at the path. An existing file makes this a
    /// no-op; a directory occupying the path is replaced by an empty file.
    async fn make_file(&self, path: &FilePath) -> Result<()> {
        match self.is_directory(path).await {
            Ok(false) => return Ok(()),
            Ok(true) => {}
            Err(Error::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        self.write_file(path, "").await
    }

    /// Writes content to a file, unconditionally replacing whatever
    /// occupies the path and creating missing parent directories.
    async fn write_file(&self, path: &FilePath, content: &str) -> Result<()> {
        self.delete(path).await?;
        self.make_directory(&path.parent()).await?;
        self.write_file_unchecked(path, content).await
    }

    /// Deletes a file or directory, recursing into directories with all
    /// children deleted concurrently. Deleting a missing path is a
    /// success, and the root path is only ever emptied, never removed.
    async fn delete(&self, path: &FilePath) -> Result<()> {
        let is_directory = match self.is_directory(path).await {
            Ok(is_directory) => is_directory,
            Err(Error::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };

        if is_directory {
            let children = self.list(path).await?;
            try_join_all(children.into_iter().map(|name| {
                let child = path.join([name.as_str()]);
                async move { self.delete(&child).await }
            }))
            .await?;
            if !path.is_root() {
                self.delete_directory_unchecked(path).await?;
            }
        } else {
            self.delete_file_unchecked(path).await?;
        }
        Ok(())
    }

    /// Copies a file, or recursively copies a directory with all children
    /// copied concurrently. Fails with [`Error::NotFound`] when the source
    /// does not exist.
    async fn copy(&self, source: &FilePath, dest: &FilePath) -> Result<()> {
        if self.is_directory(source).await? {
            self.make_directory(dest).await?;
            let children = self.list(source).await?;
            try_join_all(children.into_iter().map(|name| {
                let source_child = source.join([name.as_str()]);
                let dest_child = dest.join([name.as_str()]);
                async move { self.copy(&source_child, &dest_child).await }
            }))
            .await?;
        } else {
            let content = self.read_file(source).await?;
            self.write_file(dest, &content).await?;
        }
        Ok(())
    }

    /// Moves a file or directory by copying and then deleting the source.
    /// Not atomic: a failure between the copy and the delete can leave
    /// both paths populated, so a failed move requires manual inspection
    /// rather than automatic rollback.
    async fn rename(&self, source: &FilePath, dest: &FilePath) -> Result<()> {
        self.copy(source, dest).await?;
        self.delete(source).await
    }
}
