//! In-memory document for hosts without a browser DOM.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use super::selector::{ElementView, SelectorList};
use super::{DomEvent, DomHost, NativeHandler, NativeListenerId, NodeId};

const DOCUMENT_TAG: &str = "#document";

#[derive(Debug)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ElementView for Node {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

struct Attached {
    id: NativeListenerId,
    target: NodeId,
    event_type: String,
    handler: NativeHandler,
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<NodeId, Node>,
    listeners: Vec<Attached>,
    next_node: u64,
    next_listener: u64,
}

/// A tree of elements with bubbling event dispatch. Clones share the tree.
#[derive(Clone)]
pub struct MemoryDom {
    tree: Rc<RefCell<Tree>>,
    /// Parsed selectors by source text. `None` marks an invalid selector.
    selectors: Rc<RefCell<HashMap<String, Option<Rc<SelectorList>>>>>,
}

impl MemoryDom {
    pub fn new() -> Self {
        let mut tree = Tree::default();
        tree.nodes.insert(
            NodeId(0),
            Node {
                tag: DOCUMENT_TAG.to_string(),
                attributes: BTreeMap::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        tree.next_node = 1;
        Self {
            tree: Rc::new(RefCell::new(tree)),
            selectors: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        let mut tree = self.tree.borrow_mut();
        let id = NodeId(tree.next_node);
        tree.next_node += 1;
        tree.nodes.insert(
            id,
            Node {
                tag: tag.to_ascii_lowercase(),
                attributes: BTreeMap::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(n) = self.tree.borrow_mut().nodes.get_mut(&node) {
            n.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn add_class(&self, node: NodeId, class: &str) {
        let mut tree = self.tree.borrow_mut();
        let Some(n) = tree.nodes.get_mut(&node) else {
            return;
        };
        let classes = n.attributes.entry("class".to_string()).or_default();
        if !classes.split_whitespace().any(|c| c == class) {
            if !classes.is_empty() {
                classes.push(' ');
            }
            classes.push_str(class);
        }
    }

    /// Move `child` under `parent`, detaching it from any previous parent.
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.detach(child);
        let mut tree = self.tree.borrow_mut();
        if !tree.nodes.contains_key(&parent) || !tree.nodes.contains_key(&child) {
            return;
        }
        if let Some(p) = tree.nodes.get_mut(&parent) {
            p.children.push(child);
        }
        if let Some(c) = tree.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
    }

    /// Create an element with `classes` and append it under `parent`.
    pub fn append_element(&self, parent: NodeId, tag: &str, classes: &[&str]) -> NodeId {
        let node = self.create_element(tag);
        for class in classes {
            self.add_class(node, class);
        }
        self.append_child(parent, node);
        node
    }

    /// Remove `node` from its parent. The subtree stays intact.
    pub fn detach(&self, node: NodeId) {
        let mut tree = self.tree.borrow_mut();
        let Some(parent) = tree.nodes.get_mut(&node).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = tree.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != node);
        }
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Dispatch a bubbling event at `target`. Returns how many native
    /// handlers ran.
    pub fn dispatch(&self, target: NodeId, event_type: &str, detail: serde_json::Value) -> usize {
        let event = DomEvent {
            event_type: event_type.to_string(),
            target,
            detail,
        };

        let mut path = vec![target];
        let mut current = self.parent(target);
        while let Some(node) = current {
            path.push(node);
            current = self.parent(node);
        }

        let mut invoked = 0;
        for node in path {
            let handlers: Vec<(NativeListenerId, NativeHandler)> = self
                .tree
                .borrow()
                .listeners
                .iter()
                .filter(|l| l.target == node && l.event_type == event_type)
                .map(|l| (l.id, Rc::clone(&l.handler)))
                .collect();

            for (id, handler) in handlers {
                // A handler removed earlier in this dispatch does not run.
                if !self.tree.borrow().listeners.iter().any(|l| l.id == id) {
                    continue;
                }
                handler(&event);
                invoked += 1;
            }
        }
        invoked
    }

    /// Native listeners currently attached to `node` for `event_type`.
    pub fn listener_count(&self, node: NodeId, event_type: &str) -> usize {
        self.tree
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.target == node && l.event_type == event_type)
            .count()
    }

    /// All native listeners attached anywhere.
    pub fn total_listeners(&self) -> usize {
        self.tree.borrow().listeners.len()
    }
}

impl MemoryDom {
    /// Parse `source` once and reuse it for later dispatches.
    fn selector(&self, source: &str) -> Option<Rc<SelectorList>> {
        if let Some(cached) = self.selectors.borrow().get(source) {
            return cached.clone();
        }
        let parsed = match SelectorList::parse(source) {
            Ok(selector) => Some(Rc::new(selector)),
            Err(e) => {
                tracing::warn!(selector = source, error = %e, "invalid selector");
                None
            }
        };
        self.selectors
            .borrow_mut()
            .insert(source.to_string(), parsed.clone());
        parsed
    }
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl DomHost for MemoryDom {
    fn document(&self) -> NodeId {
        NodeId(0)
    }

    fn add_listener(
        &self,
        target: NodeId,
        event_type: &str,
        handler: NativeHandler,
    ) -> NativeListenerId {
        let mut tree = self.tree.borrow_mut();
        let id = NativeListenerId(tree.next_listener);
        tree.next_listener += 1;
        tree.listeners.push(Attached {
            id,
            target,
            event_type: event_type.to_string(),
            handler,
        });
        id
    }

    fn remove_listener(&self, id: NativeListenerId) {
        self.tree.borrow_mut().listeners.retain(|l| l.id != id);
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.borrow().nodes.get(&node).and_then(|n| n.parent)
    }

    fn matches(&self, node: NodeId, selector: &str) -> bool {
        let Some(selector) = self.selector(selector) else {
            return false;
        };
        let tree = self.tree.borrow();
        match tree.nodes.get(&node) {
            Some(n) if n.tag != DOCUMENT_TAG => selector.matches(n),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_dispatch_bubbles_to_ancestors() {
        let dom = MemoryDom::new();
        let list = dom.append_element(dom.document(), "ul", &["list"]);
        let item = dom.append_element(list, "li", &["item"]);

        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        dom.add_listener(
            dom.document(),
            "click",
            Rc::new(move |_: &DomEvent| counter.set(counter.get() + 1)),
        );

        assert_eq!(dom.dispatch(item, "click", serde_json::Value::Null), 1);
        assert_eq!(dom.dispatch(item, "keydown", serde_json::Value::Null), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_detached_node_does_not_reach_document() {
        let dom = MemoryDom::new();
        let item = dom.create_element("li");
        dom.add_listener(dom.document(), "click", Rc::new(|_: &DomEvent| {}));

        assert_eq!(dom.dispatch(item, "click", serde_json::Value::Null), 0);

        dom.append_child(dom.document(), item);
        assert_eq!(dom.dispatch(item, "click", serde_json::Value::Null), 1);

        dom.detach(item);
        assert!(dom.children(dom.document()).is_empty());
        assert_eq!(dom.parent(item), None);
    }

    #[test]
    fn test_matches_uses_current_attributes() {
        let dom = MemoryDom::new();
        let button = dom.append_element(dom.document(), "button", &[]);
        assert!(!dom.matches(button, ".primary"));

        dom.add_class(button, "primary");
        dom.add_class(button, "primary");
        dom.set_attribute(button, "data-id", "7");
        assert!(dom.matches(button, "button.primary[data-id=\"7\"]"));
        assert!(!dom.matches(dom.document(), "*"));
        assert!(!dom.matches(button, "ul li"));
    }

    #[test]
    fn test_selectors_are_parsed_once() {
        let dom = MemoryDom::new();
        let button = dom.append_element(dom.document(), "button", &["primary"]);

        for _ in 0..3 {
            assert!(dom.matches(button, ".primary"));
            assert!(!dom.matches(button, "ul li"));
        }
        let cache = dom.selectors.borrow();
        assert_eq!(cache.len(), 2);
        assert!(cache["ul li"].is_none());
    }

    #[test]
    fn test_remove_listener() {
        let dom = MemoryDom::new();
        let id = dom.add_listener(dom.document(), "click", Rc::new(|_: &DomEvent| {}));
        assert_eq!(dom.listener_count(dom.document(), "click"), 1);
        dom.remove_listener(id);
        assert_eq!(dom.total_listeners(), 0);
    }
}
