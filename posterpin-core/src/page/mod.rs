//! The host page as seen by the engine.
//!
//! [`HostPage`] is the DOM capability the loops and the write path drive. A
//! browser binding implements it over the real document; [`MemoryPage`] is an
//! in-memory document for tests and headless hosts.

pub mod memory;
pub mod selector;

use std::fmt;

use tokio::sync::broadcast;

pub use memory::{ElementSpec, MemoryPage};
pub use selector::{ElementLike, Selector};

/// Handle to an element of a [`HostPage`]. Only meaningful for the page that
/// issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Structural change notification, the equivalent of a `childList` mutation
/// record with a single added node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomMutation {
    Inserted { parent: NodeId, node: NodeId },
}

/// DOM operations the engine needs from the page it runs in.
pub trait HostPage: Send + Sync {
    /// Path component of the current location, e.g. `/film/dune-2021/`.
    fn location_path(&self) -> String;

    /// Root element of the document.
    fn document(&self) -> NodeId;

    fn body(&self) -> NodeId;

    /// Descendants of `scope` matching `selector` in document order. The scope
    /// itself is never returned, but its ancestors take part in matching.
    fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId>;

    fn matches(&self, node: NodeId, selector: &Selector) -> bool;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    fn remove_attribute(&self, node: NodeId, name: &str);

    /// Concatenated text of the node and its descendants.
    fn text_content(&self, node: NodeId) -> String;

    fn set_text(&self, node: NodeId, text: &str);

    /// Create a detached element.
    fn create_element(&self, tag: &str) -> NodeId;

    /// Attach `child` as the last child of `parent`, notifying subscribers if
    /// `parent` is part of the document.
    fn append_child(&self, parent: NodeId, child: NodeId);

    /// Insertions anywhere under the body from now on.
    fn subscribe(&self) -> broadcast::Receiver<DomMutation>;

    /// Blocking user-facing message.
    fn alert(&self, message: &str);

    /// Full page reload.
    fn reload(&self);

    fn query_first(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.query_all(scope, selector).into_iter().next()
    }
}
