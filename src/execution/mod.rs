pub mod synced_tree;
