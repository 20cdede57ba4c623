use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use super::selector::{ElementLike, Selector};
use super::{DomMutation, HostPage, NodeId};

/// Insertions a subscriber may fall behind by before it sees `Lagged`.
pub const MUTATION_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ElementLike for NodeData {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<NodeData>,
}

impl Arena {
    fn alloc(&mut self, tag: &str) -> NodeId {
        self.nodes.push(NodeData {
            tag: tag.to_ascii_lowercase(),
            ..NodeData::default()
        });
        NodeId(self.nodes.len() - 1)
    }

    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0)
    }

    fn ancestors(&self, id: NodeId) -> impl Iterator<Item = &NodeData> + Clone {
        std::iter::successors(self.node(id).and_then(|n| n.parent), |current| {
            self.node(*current).and_then(|n| n.parent)
        })
        .filter_map(|ancestor| self.node(ancestor))
    }

    fn is_connected(&self, id: NodeId, root: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == root {
                return true;
            }
            current = self.node(node).and_then(|n| n.parent);
        }
        false
    }

    fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        self.node(id)
            .is_some_and(|node| selector.matches(node, self.ancestors(id)))
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if let Some(node) = self.node(id) {
            for child in &node.children {
                out.push(*child);
                self.collect_descendants(*child, out);
            }
        }
    }

    fn text_content(&self, id: NodeId, out: &mut String) {
        if let Some(node) = self.node(id) {
            out.push_str(&node.text);
            for child in &node.children {
                self.text_content(*child, out);
            }
        }
    }
}

/// Declarative description of a subtree to insert into a [`MemoryPage`].
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    tag: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn class(mut self, class: impl AsRef<str>) -> Self {
        if let Some((_, value)) = self.attrs.iter_mut().find(|(k, _)| k == "class") {
            value.push(' ');
            value.push_str(class.as_ref());
        } else {
            self.attrs.push(("class".into(), class.as_ref().to_string()));
        }
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// Arena-backed document with `html > head + body`, recording alerts, reloads
/// and attribute writes so callers can observe what the engine did.
pub struct MemoryPage {
    arena: RwLock<Arena>,
    location: RwLock<String>,
    document: NodeId,
    head: NodeId,
    body: NodeId,
    mutations: broadcast::Sender<DomMutation>,
    alerts: Mutex<Vec<String>>,
    reloads: AtomicUsize,
    attribute_writes: AtomicUsize,
}

impl fmt::Debug for MemoryPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPage")
            .field("location", &*self.location.read())
            .field("nodes", &self.arena.read().nodes.len())
            .field("reloads", &self.reload_count())
            .finish()
    }
}

impl MemoryPage {
    pub fn new(location_path: impl Into<String>) -> Self {
        let mut arena = Arena::default();
        let document = arena.alloc("html");
        let head = arena.alloc("head");
        let body = arena.alloc("body");
        for child in [head, body] {
            if let Some(node) = arena.node_mut(child) {
                node.parent = Some(document);
            }
            if let Some(root) = arena.node_mut(document) {
                root.children.push(child);
            }
        }

        let (mutations, _) = broadcast::channel(MUTATION_CHANNEL_CAPACITY);
        Self {
            arena: RwLock::new(arena),
            location: RwLock::new(location_path.into()),
            document,
            head,
            body,
            mutations,
            alerts: Mutex::new(Vec::new()),
            reloads: AtomicUsize::new(0),
            attribute_writes: AtomicUsize::new(0),
        }
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn set_location(&self, path: impl Into<String>) {
        *self.location.write() = path.into();
    }

    /// Build `spec` detached, then attach it under `parent` in one insertion.
    pub fn insert(&self, parent: NodeId, spec: ElementSpec) -> NodeId {
        let root = self.build(&spec);
        self.append_child(parent, root);
        root
    }

    fn build(&self, spec: &ElementSpec) -> NodeId {
        let id = {
            let mut arena = self.arena.write();
            let id = arena.alloc(&spec.tag);
            if let Some(node) = arena.node_mut(id) {
                node.attrs = spec.attrs.iter().cloned().collect();
                node.text = spec.text.clone().unwrap_or_default();
            }
            id
        };
        for child in &spec.children {
            let child_id = self.build(child);
            let mut arena = self.arena.write();
            if let Some(node) = arena.node_mut(child_id) {
                node.parent = Some(id);
            }
            if let Some(node) = arena.node_mut(id) {
                node.children.push(child_id);
            }
        }
        id
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().clone()
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Live insertion subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.mutations.receiver_count()
    }

    /// Number of attribute writes and removals that actually changed a node.
    pub fn attribute_writes(&self) -> usize {
        self.attribute_writes.load(Ordering::SeqCst)
    }
}

impl HostPage for MemoryPage {
    fn location_path(&self) -> String {
        self.location.read().clone()
    }

    fn document(&self) -> NodeId {
        self.document
    }

    fn body(&self) -> NodeId {
        self.body
    }

    fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        let arena = self.arena.read();
        let mut candidates = Vec::new();
        arena.collect_descendants(scope, &mut candidates);
        candidates
            .into_iter()
            .filter(|id| arena.matches(*id, selector))
            .collect()
    }

    fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        self.arena.read().matches(node, selector)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.arena
            .read()
            .node(node)
            .and_then(|n| n.attrs.get(name).cloned())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut arena = self.arena.write();
        if let Some(n) = arena.node_mut(node)
            && n.attrs.get(name).map(String::as_str) != Some(value)
        {
            n.attrs.insert(name.to_string(), value.to_string());
            self.attribute_writes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        let mut arena = self.arena.write();
        if let Some(n) = arena.node_mut(node)
            && n.attrs.remove(name).is_some()
        {
            self.attribute_writes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.arena.read().text_content(node, &mut out);
        out
    }

    fn set_text(&self, node: NodeId, text: &str) {
        if let Some(n) = self.arena.write().node_mut(node) {
            n.text = text.to_string();
        }
    }

    fn create_element(&self, tag: &str) -> NodeId {
        self.arena.write().alloc(tag)
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        let connected = {
            let mut arena = self.arena.write();
            if arena.node(parent).is_none() || arena.node(child).is_none() {
                return;
            }
            // Refuse to create a cycle.
            if arena.is_connected(parent, child) {
                return;
            }
            if let Some(old_parent) = arena.node(child).and_then(|n| n.parent)
                && let Some(old) = arena.node_mut(old_parent)
            {
                old.children.retain(|c| *c != child);
            }
            if let Some(n) = arena.node_mut(child) {
                n.parent = Some(parent);
            }
            if let Some(n) = arena.node_mut(parent) {
                n.children.push(child);
            }
            arena.is_connected(parent, self.body)
        };

        if connected {
            // No subscribers is fine.
            let _ = self.mutations.send(DomMutation::Inserted {
                parent,
                node: child,
            });
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<DomMutation> {
        self.mutations.subscribe()
    }

    fn alert(&self, message: &str) {
        self.alerts.lock().push(message.to_string());
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poster(slug: &str, src: &str) -> ElementSpec {
        ElementSpec::new("div")
            .class("film-poster")
            .attr("data-film-slug", slug)
            .child(ElementSpec::new("img").attr("src", src))
    }

    #[test]
    fn query_all_returns_document_order() {
        let page = MemoryPage::new("/films/");
        let grid = page.insert(page.body(), ElementSpec::new("ul").class("poster-list"));
        page.insert(grid, poster("alien", "a.jpg"));
        page.insert(grid, poster("dune-2021", "d.jpg"));

        let imgs = page.query_all(page.document(), &Selector::parse(".film-poster img").unwrap());
        let srcs: Vec<_> = imgs
            .iter()
            .filter_map(|id| page.attribute(*id, "src"))
            .collect();
        assert_eq!(srcs, vec!["a.jpg", "d.jpg"]);
    }

    #[tokio::test]
    async fn only_connected_insertions_are_broadcast() {
        let page = MemoryPage::new("/");
        let mut rx = page.subscribe();

        let detached = page.create_element("div");
        let img = page.create_element("img");
        page.append_child(detached, img);
        assert!(rx.try_recv().is_err());

        page.append_child(page.body(), detached);
        assert_eq!(
            rx.try_recv().unwrap(),
            DomMutation::Inserted {
                parent: page.body(),
                node: detached
            }
        );
    }

    #[test]
    fn unchanged_attribute_writes_are_not_counted() {
        let page = MemoryPage::new("/");
        let img = page.insert(page.body(), ElementSpec::new("img").attr("src", "a.jpg"));

        page.set_attribute(img, "src", "a.jpg");
        page.remove_attribute(img, "srcset");
        assert_eq!(page.attribute_writes(), 0);

        page.set_attribute(img, "src", "b.jpg");
        assert_eq!(page.attribute_writes(), 1);
    }

    #[test]
    fn text_content_is_concatenated() {
        let page = MemoryPage::new("/");
        let node = page.insert(
            page.body(),
            ElementSpec::new("span")
                .text("du")
                .child(ElementSpec::new("span").text("ne")),
        );
        assert_eq!(page.text_content(node), "dune");
    }
}
