//! End-to-end walkthrough against the in-memory host: build a tree,
//! mutate it, push the compacted change log, list the result.
//!
//! Run with `cargo run --example sync`.

use std::sync::Arc;

use anyhow::Result;
use hostbound::{FilePath, MemoryHost, StorageHost, SyncedTree};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let host = Arc::new(MemoryHost::new());
    let mut synced = SyncedTree::new(host.clone());
    let root = synced.root();

    let docs = synced.tree_mut().create_directory(root, "docs", false)?;
    let readme = synced
        .tree_mut()
        .create_file(docs, "readme.md", "# notes\n", false)?;
    synced.tree_mut().create_file(docs, "scratch", "tmp", false)?;

    synced.tree_mut().rename(readme, "README.md", false)?;

    println!("queued changes: {}", synced.queue().len());
    synced.push().await?;

    for name in host.list(&FilePath::parse("/docs")).await? {
        let path = FilePath::parse("/docs").join([name.as_str()]);
        println!("{path}: {:?}", host.read_file(&path).await?);
    }
    Ok(())
}
