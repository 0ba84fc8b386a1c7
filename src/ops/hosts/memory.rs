//! In-memory key-value storage host.
//!
//! Every path is a key in a flat map. A directory's value is an object
//! mapping child names to `1`, a file's value is its content as a JSON
//! string, and the root key always holds an object. Creating or deleting
//! an entry also updates its parent's object. Doubles as the reference
//! backend for exercising the composite host operations.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::ops::sdk::StorageHost;
use crate::prelude::*;

pub struct MemoryHost {
    entries: tokio::sync::Mutex<IndexMap<String, Value>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        let mut entries = IndexMap::new();
        entries.insert("/".to_string(), json!({}));
        Self {
            entries: tokio::sync::Mutex::new(entries),
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Records or clears the entry's name in its parent directory's object.
fn set_exists(entries: &mut IndexMap<String, Value>, path: &FilePath, exists: bool) {
    let Some(Value::Object(parent)) = entries.get_mut(path.dirname()) else {
        return;
    };
    if exists {
        parent.insert(path.basename().to_string(), json!(1));
    } else {
        parent.remove(path.basename());
    }
}

#[async_trait]
impl StorageHost for MemoryHost {
    fn host_name(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, path: &FilePath) -> Result<bool> {
        Ok(self.entries.lock().await.contains_key(path.as_str()))
    }

    async fn is_directory_unchecked(&self, path: &FilePath) -> Result<bool> {
        let entries = self.entries.lock().await;
        Ok(matches!(entries.get(path.as_str()), Some(Value::Object(_))))
    }

    async fn list_unchecked(&self, path: &FilePath) -> Result<Vec<String>> {
        let entries = self.entries.lock().await;
        match entries.get(path.as_str()) {
            Some(Value::Object(children)) => Ok(children.keys().cloned().collect()),
            _ => Err(Error::NotADirectory(path.clone())),
        }
    }

    async fn read_file_unchecked(&self, path: &FilePath) -> Result<String> {
        let entries = self.entries.lock().await;
        match entries.get(path.as_str()) {
            Some(Value::String(content)) => Ok(content.clone()),
            _ => Err(Error::NotAFile(path.clone())),
        }
    }

    async fn write_file_unchecked(&self, path: &FilePath, content: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(path.as_str().to_string(), Value::String(content.to_string()));
        set_exists(&mut entries, path, true);
        Ok(())
    }

    async fn make_directory_unchecked(&self, path: &FilePath) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(path.as_str().to_string(), json!({}));
        set_exists(&mut entries, path, true);
        Ok(())
    }

    async fn delete_file_unchecked(&self, path: &FilePath) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.shift_remove(path.as_str());
        set_exists(&mut entries, path, false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_with_an_empty_root_directory() {
        let host = MemoryHost::new();
        let root = FilePath::parse("/");

        assert!(host.exists(&root).await.unwrap());
        assert!(host.is_directory(&root).await.unwrap());
        assert!(host.list(&root).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writing_registers_the_file_in_its_parent() {
        let host = MemoryHost::new();
        let path = FilePath::parse("/a");

        host.write_file(&path, "content").await.unwrap();

        assert!(host.exists(&path).await.unwrap());
        assert!(!host.is_directory(&path).await.unwrap());
        assert_eq!(host.read_file(&path).await.unwrap(), "content");
        assert_eq!(host.list(&FilePath::parse("/")).await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn deleting_unregisters_the_file_from_its_parent() {
        let host = MemoryHost::new();
        let path = FilePath::parse("/a");

        host.write_file(&path, "content").await.unwrap();
        host.delete(&path).await.unwrap();

        assert!(!host.exists(&path).await.unwrap());
        assert!(host.list(&FilePath::parse("/")).await.unwrap().is_empty());
    }
}
