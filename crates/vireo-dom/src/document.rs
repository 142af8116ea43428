#![forbid(unsafe_code)]

//! Arena-backed document tree.
//!
//! Nodes live in a generational arena: a [`NodeId`] is an index plus a
//! generation counter, so a handle to a released node is detectable rather
//! than silently aliasing a recycled slot. The tree structure is a doubly
//! linked sibling list per parent, making `insert_before`, `append`,
//! `detach`, and `replace` O(1).
//!
//! # Invariants
//!
//! 1. A node has at most one parent; inserting an attached node detaches it
//!    first (move semantics, like host `insertBefore`).
//! 2. Structural edits never create cycles; attempts fail with
//!    [`DomError::WouldCycle`].
//! 3. `release` frees the whole subtree and bumps generations, invalidating
//!    every handle into it.
//! 4. `children` returns a snapshot; mutating the tree while iterating the
//!    snapshot is safe (stale entries are simply stale handles).

use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::error::DomError;

/// Generational handle to a node in a [`Document`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

/// A typed live property value on an element.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// Boolean property (`checked`, `disabled`, ...).
    Bool(bool),
    /// Integer property.
    Int(i64),
    /// Floating-point property.
    Float(f64),
    /// String property (`value`, `className`, ...).
    Text(Rc<str>),
}

impl PropValue {
    /// String form, matching how a host would reflect the property.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            PropValue::Bool(b) => b.to_string(),
            PropValue::Int(i) => i.to_string(),
            PropValue::Float(f) => f.to_string(),
            PropValue::Text(s) => s.to_string(),
        }
    }
}

/// An event delivered to element listeners.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event name (`"input"`, `"change"`, `"click"`, ...).
    pub name: Rc<str>,
    /// The node the event targets.
    pub target: NodeId,
}

/// Listener callback type.
pub type ListenerFn = dyn Fn(&Event);

/// Property names that are reserved (structural reflection) and therefore
/// rejected by [`Document::set_prop`] — the arena analogue of host-enforced
/// read-only properties.
const RESERVED_PROPS: &[&str] = &["tagName", "nodeName", "parentNode", "childNodes", "children"];

struct ElementData {
    tag: Rc<str>,
    svg: bool,
    attrs: AHashMap<Rc<str>, Rc<str>>,
    props: AHashMap<Rc<str>, PropValue>,
    style_text: Option<String>,
    style_decls: Vec<(Rc<str>, Rc<str>)>,
    listeners: AHashMap<Rc<str>, Vec<Rc<ListenerFn>>>,
}

enum NodeKind {
    Element(Box<ElementData>),
    Text(String),
    Marker(&'static str),
}

struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// The arena-backed node tree.
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("live_nodes", &self.live)
            .field("capacity", &self.slots.len())
            .finish()
    }
}

impl Document {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    // -- node creation ------------------------------------------------------

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.live += 1;
        let node = Node {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Create a detached element node.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create_element_ns(tag, false)
    }

    /// Create a detached element node, optionally SVG-namespaced.
    ///
    /// SVG elements never take the live-property path in the attribute
    /// patcher.
    pub fn create_element_ns(&mut self, tag: &str, svg: bool) -> NodeId {
        self.alloc(NodeKind::Element(Box::new(ElementData {
            tag: Rc::from(tag),
            svg,
            attrs: AHashMap::new(),
            props: AHashMap::new(),
            style_text: None,
            style_decls: Vec::new(),
            listeners: AHashMap::new(),
        })))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, data: &str) -> NodeId {
        self.alloc(NodeKind::Text(data.to_owned()))
    }

    /// Create a detached marker node (a comment-like anchor).
    pub fn create_marker(&mut self, label: &'static str) -> NodeId {
        self.alloc(NodeKind::Marker(label))
    }

    // -- handle validation and access ---------------------------------------

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(DomError::StaleNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DomError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(DomError::StaleNode(id))
    }

    fn element(&self, id: NodeId) -> Result<&ElementData, DomError> {
        match &self.node(id)?.kind {
            NodeKind::Element(data) => Ok(data),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, DomError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element(data) => Ok(data),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    /// Whether `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the document holds no live nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    // -- kind queries -------------------------------------------------------

    /// Whether the node is an element.
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id), Ok(n) if matches!(n.kind, NodeKind::Element(_)))
    }

    /// Whether the node is a text node.
    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.node(id), Ok(n) if matches!(n.kind, NodeKind::Text(_)))
    }

    /// Whether the node is a marker.
    pub fn is_marker(&self, id: NodeId) -> bool {
        matches!(self.node(id), Ok(n) if matches!(n.kind, NodeKind::Marker(_)))
    }

    /// Whether the node is an SVG-namespaced element.
    pub fn is_svg(&self, id: NodeId) -> bool {
        matches!(self.element(id), Ok(el) if el.svg)
    }

    /// Element tag name.
    pub fn tag(&self, id: NodeId) -> Result<Rc<str>, DomError> {
        Ok(Rc::clone(&self.element(id)?.tag))
    }

    /// Text node character data.
    pub fn text(&self, id: NodeId) -> Result<&str, DomError> {
        match &self.node(id)?.kind {
            NodeKind::Text(data) => Ok(data),
            _ => Err(DomError::NotAText(id)),
        }
    }

    /// Mutate a text node's character data in place. Node identity is
    /// preserved; this is the patcher's fast path.
    pub fn set_text(&mut self, id: NodeId, data: &str) -> Result<(), DomError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Text(existing) => {
                existing.clear();
                existing.push_str(data);
                Ok(())
            }
            _ => Err(DomError::NotAText(id)),
        }
    }

    /// Marker label.
    pub fn marker_label(&self, id: NodeId) -> Result<&'static str, DomError> {
        match self.node(id)?.kind {
            NodeKind::Marker(label) => Ok(label),
            _ => Err(DomError::StaleNode(id)),
        }
    }

    // -- structure ----------------------------------------------------------

    /// Parent of `id`, if attached.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, DomError> {
        Ok(self.node(id)?.parent)
    }

    /// Next sibling of `id`.
    pub fn next_sibling(&self, id: NodeId) -> Result<Option<NodeId>, DomError> {
        Ok(self.node(id)?.next_sibling)
    }

    /// Previous sibling of `id`.
    pub fn prev_sibling(&self, id: NodeId) -> Result<Option<NodeId>, DomError> {
        Ok(self.node(id)?.prev_sibling)
    }

    /// First child of `id`.
    pub fn first_child(&self, id: NodeId) -> Result<Option<NodeId>, DomError> {
        Ok(self.node(id)?.first_child)
    }

    /// Snapshot of the current children, in order.
    pub fn children(&self, id: NodeId) -> Result<SmallVec<[NodeId; 8]>, DomError> {
        let mut out = SmallVec::new();
        let mut cursor = self.node(id)?.first_child;
        while let Some(child) = cursor {
            out.push(child);
            cursor = self.node(child)?.next_sibling;
        }
        Ok(out)
    }

    /// Number of children of `id`.
    pub fn child_count(&self, id: NodeId) -> Result<usize, DomError> {
        Ok(self.children(id)?.len())
    }

    fn is_ancestor_of(&self, maybe_ancestor: NodeId, node: NodeId) -> Result<bool, DomError> {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == maybe_ancestor {
                return Ok(true);
            }
            cursor = self.node(current)?.parent;
        }
        Ok(false)
    }

    /// Insert `child` under `parent`, before `anchor` (append when `None`).
    ///
    /// If `child` is currently attached anywhere (including under another
    /// parent), it is detached first.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<(), DomError> {
        self.node(parent)?;
        self.node(child)?;
        if self.is_ancestor_of(child, parent)? {
            return Err(DomError::WouldCycle {
                node: child,
                parent,
            });
        }
        if let Some(anchor) = anchor {
            if self.node(anchor)?.parent != Some(parent) {
                return Err(DomError::AnchorNotChild { parent, anchor });
            }
            if anchor == child {
                return Ok(());
            }
        }
        self.detach(child)?;

        match anchor {
            None => {
                let old_last = self.node(parent)?.last_child;
                {
                    let node = self.node_mut(child)?;
                    node.parent = Some(parent);
                    node.prev_sibling = old_last;
                    node.next_sibling = None;
                }
                if let Some(last) = old_last {
                    self.node_mut(last)?.next_sibling = Some(child);
                } else {
                    self.node_mut(parent)?.first_child = Some(child);
                }
                self.node_mut(parent)?.last_child = Some(child);
            }
            Some(anchor) => {
                let before_prev = self.node(anchor)?.prev_sibling;
                {
                    let node = self.node_mut(child)?;
                    node.parent = Some(parent);
                    node.prev_sibling = before_prev;
                    node.next_sibling = Some(anchor);
                }
                self.node_mut(anchor)?.prev_sibling = Some(child);
                match before_prev {
                    Some(prev) => self.node_mut(prev)?.next_sibling = Some(child),
                    None => self.node_mut(parent)?.first_child = Some(child),
                }
            }
        }
        Ok(())
    }

    /// Append `child` as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Unlink `id` from its parent. No-op when already detached.
    pub fn detach(&mut self, id: NodeId) -> Result<(), DomError> {
        let (parent, prev, next) = {
            let node = self.node(id)?;
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        let Some(parent) = parent else {
            return Ok(());
        };
        match prev {
            Some(prev) => self.node_mut(prev)?.next_sibling = next,
            None => self.node_mut(parent)?.first_child = next,
        }
        match next {
            Some(next) => self.node_mut(next)?.prev_sibling = prev,
            None => self.node_mut(parent)?.last_child = prev,
        }
        let node = self.node_mut(id)?;
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
        Ok(())
    }

    /// Replace attached node `old` with `new` in place.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<(), DomError> {
        let parent = self
            .node(old)?
            .parent
            .ok_or(DomError::AnchorNotChild { parent: old, anchor: old })?;
        self.insert_before(parent, new, Some(old))?;
        self.detach(old)
    }

    /// Detach `id` and free its whole subtree, invalidating every handle
    /// into it.
    pub fn release(&mut self, id: NodeId) -> Result<(), DomError> {
        self.detach(id)?;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            stack.extend(self.children(current)?.iter().copied());
            let slot = &mut self.slots[current.index as usize];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.index);
            self.live -= 1;
        }
        Ok(())
    }

    // -- attributes ---------------------------------------------------------

    /// Attribute value, if present.
    pub fn attr(&self, el: NodeId, name: &str) -> Result<Option<Rc<str>>, DomError> {
        Ok(self.element(el)?.attrs.get(name).cloned())
    }

    /// Set an attribute (string form).
    pub fn set_attr(&mut self, el: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.element_mut(el)?
            .attrs
            .insert(Rc::from(name), Rc::from(value));
        Ok(())
    }

    /// Remove an attribute. No-op when absent.
    pub fn remove_attr(&mut self, el: NodeId, name: &str) -> Result<(), DomError> {
        self.element_mut(el)?.attrs.remove(name);
        Ok(())
    }

    // -- properties ---------------------------------------------------------

    /// Live property value, if assigned.
    pub fn prop(&self, el: NodeId, name: &str) -> Result<Option<PropValue>, DomError> {
        Ok(self.element(el)?.props.get(name).cloned())
    }

    /// Assign a live property.
    ///
    /// Fails with [`DomError::ReadOnlyProperty`] for reserved reflection
    /// names; the attribute patcher suppresses that failure.
    pub fn set_prop(&mut self, el: NodeId, name: &str, value: PropValue) -> Result<(), DomError> {
        if RESERVED_PROPS.contains(&name) {
            return Err(DomError::ReadOnlyProperty {
                name: name.to_owned(),
            });
        }
        self.element_mut(el)?.props.insert(Rc::from(name), value);
        Ok(())
    }

    /// Remove a live property. No-op when absent.
    pub fn remove_prop(&mut self, el: NodeId, name: &str) -> Result<(), DomError> {
        self.element_mut(el)?.props.remove(name);
        Ok(())
    }

    // -- style --------------------------------------------------------------

    /// Wholesale style text, if set.
    pub fn style_text(&self, el: NodeId) -> Result<Option<String>, DomError> {
        Ok(self.element(el)?.style_text.clone())
    }

    /// Set (or clear) the wholesale style text. Clears individual
    /// declarations: the string form replaces the whole style.
    pub fn set_style_text(&mut self, el: NodeId, text: Option<&str>) -> Result<(), DomError> {
        let element = self.element_mut(el)?;
        element.style_text = text.map(str::to_owned);
        element.style_decls.clear();
        Ok(())
    }

    /// One style declaration's value, if set.
    pub fn style_value(&self, el: NodeId, name: &str) -> Result<Option<Rc<str>>, DomError> {
        Ok(self
            .element(el)?
            .style_decls
            .iter()
            .find(|(decl, _)| &**decl == name)
            .map(|(_, value)| Rc::clone(value)))
    }

    /// Set one style declaration, preserving declaration order for existing
    /// names.
    pub fn set_style_value(&mut self, el: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let element = self.element_mut(el)?;
        if let Some(entry) = element
            .style_decls
            .iter_mut()
            .find(|(decl, _)| &**decl == name)
        {
            entry.1 = Rc::from(value);
        } else {
            element.style_decls.push((Rc::from(name), Rc::from(value)));
        }
        Ok(())
    }

    /// Remove one style declaration. No-op when absent.
    pub fn remove_style_value(&mut self, el: NodeId, name: &str) -> Result<(), DomError> {
        self.element_mut(el)?
            .style_decls
            .retain(|(decl, _)| &**decl != name);
        Ok(())
    }

    /// Number of individual style declarations.
    pub fn style_decl_count(&self, el: NodeId) -> Result<usize, DomError> {
        Ok(self.element(el)?.style_decls.len())
    }

    // -- listeners ----------------------------------------------------------

    /// Add an event listener.
    pub fn add_listener(
        &mut self,
        el: NodeId,
        event: &str,
        listener: Rc<ListenerFn>,
    ) -> Result<(), DomError> {
        self.element_mut(el)?
            .listeners
            .entry(Rc::from(event))
            .or_default()
            .push(listener);
        Ok(())
    }

    /// Remove one registration of `listener` (pointer identity). No-op when
    /// absent.
    pub fn remove_listener(
        &mut self,
        el: NodeId,
        event: &str,
        listener: &Rc<ListenerFn>,
    ) -> Result<(), DomError> {
        if let Some(list) = self.element_mut(el)?.listeners.get_mut(event) {
            if let Some(pos) = list.iter().position(|l| Rc::ptr_eq(l, listener)) {
                list.remove(pos);
            }
        }
        Ok(())
    }

    /// Snapshot of the listeners for `event` on `el`.
    ///
    /// Dispatch works off this snapshot so listeners may freely add or
    /// remove listeners (or mutate the tree) while being invoked.
    pub fn listeners(
        &self,
        el: NodeId,
        event: &str,
    ) -> Result<SmallVec<[Rc<ListenerFn>; 2]>, DomError> {
        Ok(self
            .element(el)?
            .listeners
            .get(event)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Number of listeners registered for `event` on `el`.
    pub fn listener_count(&self, el: NodeId, event: &str) -> Result<usize, DomError> {
        Ok(self
            .element(el)?
            .listeners
            .get(event)
            .map_or(0, Vec::len))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
