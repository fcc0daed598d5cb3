//! Bookmarks: named positions a client can jump back to within a tree.

use tracing::instrument;

use crate::error::{EngineError, EngineResult, ResultExt};
use crate::io::store::NodeStore;
use crate::reader::{require_node, require_tree};
use crate::tree::{Bookmark, BookmarkId, NodeId, TreeId};

/// Bookmark a node. One bookmark per (tree, node).
#[instrument(skip(store))]
pub fn add_bookmark<S: NodeStore + ?Sized>(
    store: &S,
    tree_id: TreeId,
    node_id: NodeId,
) -> EngineResult<Bookmark> {
    require_tree(store, tree_id)?;
    let node = require_node(store, node_id)?;
    if node.tree_id != tree_id {
        return Err(EngineError::validation(format!(
            "message {node_id} does not belong to tree {tree_id}"
        )));
    }
    let existing = store.bookmarks_for_tree(tree_id).or_storage()?;
    if let Some(dup) = existing.iter().find(|b| b.node_id == node_id) {
        return Err(EngineError::validation(format!(
            "message {node_id} is already bookmarked as {}",
            dup.id
        )));
    }
    store.insert_bookmark(tree_id, node_id).or_storage()
}

/// Bookmarks of a tree, oldest first.
pub fn list_bookmarks<S: NodeStore + ?Sized>(store: &S, tree_id: TreeId) -> EngineResult<Vec<Bookmark>> {
    require_tree(store, tree_id)?;
    let mut bookmarks = store.bookmarks_for_tree(tree_id).or_storage()?;
    bookmarks.sort_by_key(|b| b.id);
    Ok(bookmarks)
}

#[instrument(skip(store))]
pub fn remove_bookmark<S: NodeStore + ?Sized>(store: &S, bookmark_id: BookmarkId) -> EngineResult<()> {
    if store.delete_bookmark(bookmark_id).or_storage()? {
        Ok(())
    } else {
        Err(EngineError::not_found(format!("bookmark {bookmark_id}")))
    }
}
