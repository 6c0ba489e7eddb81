//! Ref handler chains.
//!
//! A [`RefChain`] is an ordered list of [`RefHandler`]s attached to one
//! mounted markup node. Handlers run in registration order: with
//! `Some(node)` when the target mounts or replaces, with `None` when it
//! detaches. A target is a path plus a tag, so the runtime re-attaches on
//! every render without double-firing handlers: re-attaching to the same
//! target re-applies the attribute writes recorded at the last handler run
//! instead of invoking the handlers again, which keeps decorations on
//! fragments rebuilt from scratch each render. A different tag at the same
//! path counts as a replacement and re-fires the chain. Handler state
//! lives in the handler itself and survives detach/re-attach cycles of the
//! same chain.

use std::collections::{BTreeMap, BTreeSet};

use crate::markup::NodePath;

/// Mutable view of a mounted element handed to ref handlers.
pub struct NodeRef<'a> {
    pub path: &'a NodePath,
    pub tag: &'a str,
    pub attributes: &'a mut BTreeMap<String, String>,
}

/// One link of a ref chain.
pub trait RefHandler {
    /// `Some` when the target mounts, `None` when it detaches.
    fn attach(&mut self, node: Option<NodeRef<'_>>);
}

/// Composed ref: every handler sees every attach and detach, in order.
#[derive(Default)]
pub struct RefChain {
    handlers: Vec<Box<dyn RefHandler>>,
    attached: Option<(NodePath, String)>,
    /// Attribute writes and removals the handlers performed at the last
    /// attach, re-applied to each fresh render of the same target.
    written: BTreeMap<String, String>,
    removed: BTreeSet<String>,
}

impl RefChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. Order of registration is order of invocation.
    pub fn push(&mut self, handler: impl RefHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Path of the node the chain is currently attached to.
    pub fn target(&self) -> Option<&NodePath> {
        self.attached.as_ref().map(|(path, _)| path)
    }

    /// Attach to a node. Re-attaching to the current target re-applies the
    /// recorded writes without invoking handlers; a new path, or a new tag
    /// at the same path, detaches first and re-fires the chain.
    pub fn attach(
        &mut self,
        path: &NodePath,
        tag: &str,
        attributes: &mut BTreeMap<String, String>,
    ) {
        let same_target = self
            .attached
            .as_ref()
            .is_some_and(|(at, held)| at == path && held.as_str() == tag);
        if same_target {
            self.reapply(attributes);
            return;
        }
        if self.attached.is_some() {
            self.run_detach();
        }
        self.attached = Some((path.clone(), tag.to_owned()));
        let before = attributes.clone();
        for handler in &mut self.handlers {
            handler.attach(Some(NodeRef {
                path,
                tag,
                attributes: &mut *attributes,
            }));
        }
        self.written = attributes
            .iter()
            .filter(|(name, value)| before.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        self.removed = before
            .keys()
            .filter(|name| !attributes.contains_key(*name))
            .cloned()
            .collect();
    }

    /// Detach from the current target. Idempotent.
    pub fn detach(&mut self) {
        if self.attached.take().is_some() {
            self.written.clear();
            self.removed.clear();
            self.run_detach();
        }
    }

    fn reapply(&self, attributes: &mut BTreeMap<String, String>) {
        for (name, value) in &self.written {
            attributes.insert(name.clone(), value.clone());
        }
        for name in &self.removed {
            attributes.remove(name);
        }
    }

    fn run_detach(&mut self) {
        for handler in &mut self.handlers {
            handler.attach(None);
        }
    }
}

impl std::fmt::Debug for RefChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefChain")
            .field("handlers", &self.handlers.len())
            .field("attached", &self.attached)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Stock handlers
// ---------------------------------------------------------------------------

/// Writes a fixed attribute onto whatever node the chain binds to.
#[derive(Debug, Clone)]
pub struct AttributeRef {
    name: String,
    value: String,
}

impl AttributeRef {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl RefHandler for AttributeRef {
    fn attach(&mut self, node: Option<NodeRef<'_>>) {
        if let Some(node) = node {
            node.attributes
                .insert(self.name.clone(), self.value.clone());
        }
    }
}

/// Marks its target as the focused node and remembers where focus went.
#[derive(Debug, Clone, Default)]
pub struct FocusRef {
    last_target: Option<NodePath>,
}

impl FocusRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the node that most recently held focus, surviving detach.
    pub fn last_target(&self) -> Option<&NodePath> {
        self.last_target.as_ref()
    }
}

impl RefHandler for FocusRef {
    fn attach(&mut self, node: Option<NodeRef<'_>>) {
        if let Some(node) = node {
            node.attributes
                .insert("data-focused".to_owned(), "true".to_owned());
            self.last_target = Some(node.path.clone());
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every invocation for assertions on order and idempotence.
    struct CountingRef {
        label: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl RefHandler for CountingRef {
        fn attach(&mut self, node: Option<NodeRef<'_>>) {
            let entry = match node {
                Some(node) => format!("{}:attach:{}", self.label, node.path),
                None => format!("{}:detach", self.label),
            };
            self.log.borrow_mut().push(entry);
        }
    }

    fn chain_with_log(labels: &[&'static str]) -> (RefChain, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut chain = RefChain::new();
        for label in labels {
            chain.push(CountingRef {
                label,
                log: Rc::clone(&log),
            });
        }
        (chain, log)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let (mut chain, log) = chain_with_log(&["a", "b"]);
        let mut attrs = BTreeMap::new();
        chain.attach(&NodePath(vec![0]), "div", &mut attrs);
        assert_eq!(log.borrow().as_slice(), ["a:attach:0", "b:attach:0"]);
    }

    #[test]
    fn test_reattach_to_same_target_is_idempotent() {
        let (mut chain, log) = chain_with_log(&["a"]);
        let mut attrs = BTreeMap::new();
        let path = NodePath(vec![1, 2]);
        chain.attach(&path, "div", &mut attrs);
        chain.attach(&path, "div", &mut attrs);
        chain.attach(&path, "div", &mut attrs);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let (mut chain, log) = chain_with_log(&["a"]);
        let mut attrs = BTreeMap::new();
        chain.attach(&NodePath(vec![0]), "div", &mut attrs);
        chain.detach();
        chain.detach();
        assert_eq!(log.borrow().as_slice(), ["a:attach:0", "a:detach"]);
    }

    #[test]
    fn test_moving_targets_detaches_first() {
        let (mut chain, log) = chain_with_log(&["a"]);
        let mut attrs = BTreeMap::new();
        chain.attach(&NodePath(vec![0]), "div", &mut attrs);
        chain.attach(&NodePath(vec![1]), "span", &mut attrs);
        assert_eq!(
            log.borrow().as_slice(),
            ["a:attach:0", "a:detach", "a:attach:1"]
        );
        assert_eq!(chain.target(), Some(&NodePath(vec![1])));
    }

    #[test]
    fn test_tag_change_at_same_path_refires() {
        let (mut chain, log) = chain_with_log(&["a"]);
        let mut attrs = BTreeMap::new();
        let path = NodePath(vec![0]);
        chain.attach(&path, "div", &mut attrs);
        chain.attach(&path, "span", &mut attrs);
        assert_eq!(
            log.borrow().as_slice(),
            ["a:attach:0", "a:detach", "a:attach:0"]
        );
    }

    #[test]
    fn test_handler_state_survives_cycles() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut chain = RefChain::new();
        chain.push(CountingRef {
            label: "h",
            log: Rc::clone(&log),
        });
        let mut attrs = BTreeMap::new();
        for _ in 0..2 {
            chain.attach(&NodePath(vec![0]), "div", &mut attrs);
            chain.detach();
        }
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn test_attribute_ref_writes_attribute() {
        let mut chain = RefChain::new();
        chain.push(AttributeRef::new("role", "button"));
        let mut attrs = BTreeMap::new();
        chain.attach(&NodePath(vec![0]), "div", &mut attrs);
        assert_eq!(attrs.get("role").map(String::as_str), Some("button"));
    }

    #[test]
    fn test_reattach_applies_writes_to_a_fresh_node() {
        let (mut chain, log) = chain_with_log(&["a"]);
        chain.push(AttributeRef::new("role", "button"));
        let path = NodePath(vec![0]);
        let mut first = BTreeMap::new();
        chain.attach(&path, "div", &mut first);

        // A re-render hands the chain a fresh attribute map; the recorded
        // write lands again without the handlers firing a second time.
        let mut second = BTreeMap::new();
        chain.attach(&path, "div", &mut second);
        assert_eq!(second.get("role").map(String::as_str), Some("button"));
        assert_eq!(log.borrow().as_slice(), ["a:attach:0"]);
    }

    #[test]
    fn test_reattach_carries_removals_to_a_fresh_node() {
        struct StripRef;
        impl RefHandler for StripRef {
            fn attach(&mut self, node: Option<NodeRef<'_>>) {
                if let Some(node) = node {
                    node.attributes.remove("draggable");
                }
            }
        }

        let mut chain = RefChain::new();
        chain.push(StripRef);
        let path = NodePath(vec![0]);
        let mut first = BTreeMap::from([("draggable".to_owned(), "true".to_owned())]);
        chain.attach(&path, "div", &mut first);
        assert!(!first.contains_key("draggable"));

        let mut second = BTreeMap::from([("draggable".to_owned(), "true".to_owned())]);
        chain.attach(&path, "div", &mut second);
        assert!(!second.contains_key("draggable"));
    }

    #[test]
    fn test_focus_ref_remembers_target() {
        let mut focus = FocusRef::new();
        let mut attrs = BTreeMap::new();
        let path = NodePath(vec![3]);
        focus.attach(Some(NodeRef {
            path: &path,
            tag: "input",
            attributes: &mut attrs,
        }));
        focus.attach(None);
        assert_eq!(attrs.get("data-focused").map(String::as_str), Some("true"));
        assert_eq!(focus.last_target(), Some(&path));
    }
}
