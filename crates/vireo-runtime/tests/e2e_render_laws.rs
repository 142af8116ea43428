//! End-to-end rendering laws: store through scheduler through patcher,
//! exercised the way a host would drive it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use vireo_dom::{Document, DomError, NodeId, Value};
use vireo_reactive::{Deferred, Readable, Store};
use vireo_runtime::RenderRoot;

fn readable(store: &Store<Value>) -> Rc<dyn Readable<Value>> {
    Rc::new(store.clone())
}

/// Text content of `parent`'s children up to the first marker.
fn slot_text(root: &RenderRoot, parent: NodeId) -> String {
    let doc = root.document().borrow();
    let mut out = String::new();
    for child in doc.children(parent).unwrap() {
        if doc.is_marker(child) {
            break;
        }
        if let Ok(text) = doc.text(child) {
            out.push_str(text);
        }
    }
    out
}

fn slot_nodes(root: &RenderRoot, parent: NodeId) -> Vec<NodeId> {
    let doc = root.document().borrow();
    doc.children(parent)
        .unwrap()
        .into_iter()
        .take_while(|&c| !doc.is_marker(c))
        .collect()
}

fn new_slot(root: &RenderRoot, store: &Store<Value>) -> NodeId {
    let parent = root.document().borrow_mut().create_element("div");
    root.bind_slot(parent, readable(store)).unwrap();
    parent
}

#[test]
fn initial_render_appears_after_first_flush() {
    let root = RenderRoot::new();
    let store = Store::new(Value::text("hello"));
    let parent = new_slot(&root, &store);

    assert_eq!(slot_text(&root, parent), "", "nothing before the flush");
    assert!(root.scheduler().needs_frame());
    root.pump();
    assert_eq!(slot_text(&root, parent), "hello");
}

#[test]
fn coalescing_many_sets_one_mutation() {
    let root = RenderRoot::new();
    let store = Store::new(Value::Int(0));
    let parent = new_slot(&root, &store);
    root.pump();
    let nodes = slot_nodes(&root, parent);
    assert_eq!(nodes.len(), 1);

    for i in 1..=5 {
        store.set(Value::Int(i));
    }
    root.pump_one();
    assert_eq!(slot_text(&root, parent), "5", "only the final value renders");
    assert_eq!(
        slot_nodes(&root, parent),
        nodes,
        "text node identity preserved across the whole burst"
    );
    assert!(!root.scheduler().needs_frame());
}

#[test]
fn end_to_end_sync_read_deferred_render() {
    let root = RenderRoot::new();
    let store = Store::new(Value::Int(5));
    let parent = new_slot(&root, &store);
    root.pump();
    assert_eq!(slot_text(&root, parent), "5");

    let settled = root.commit(&store, Value::Int(6));
    assert_eq!(store.get(), Value::Int(6), "reads are synchronous");
    assert_eq!(slot_text(&root, parent), "5", "render is frame-deferred");
    assert!(!settled.is_settled());

    let observed = Rc::new(Cell::new(false));
    let o = Rc::clone(&observed);
    settled.on_settled(move || o.set(true));

    root.pump();
    assert!(settled.is_settled());
    assert!(observed.get());
    assert_eq!(slot_text(&root, parent), "6");
}

#[test]
fn thunks_resolve_before_rendering() {
    let root = RenderRoot::new();
    let store = Store::new(Value::Thunk(Rc::new(|| Value::text("lazy"))));
    let parent = new_slot(&root, &store);
    root.pump();
    assert_eq!(slot_text(&root, parent), "lazy");
}

#[test]
fn deferred_renders_on_completion() {
    let root = RenderRoot::new();
    let deferred: Deferred<Value> = Deferred::new();
    let store = Store::new(Value::Pending(deferred.clone()));
    let parent = new_slot(&root, &store);
    root.pump();
    assert_eq!(slot_text(&root, parent), "", "pending renders nothing yet");

    deferred.complete(Value::text("arrived"));
    root.pump();
    assert_eq!(slot_text(&root, parent), "arrived");
}

#[test]
fn failed_deferred_produces_no_update() {
    let root = RenderRoot::new();
    let deferred: Deferred<Value> = Deferred::new();
    let store = Store::new(Value::Pending(deferred.clone()));
    let parent = new_slot(&root, &store);
    root.pump();

    deferred.fail();
    root.pump();
    assert_eq!(slot_text(&root, parent), "");
    assert!(!root.scheduler().needs_frame());
}

#[test]
fn stale_deferred_cannot_overwrite_newer_value() {
    let root = RenderRoot::new();
    let slow: Deferred<Value> = Deferred::new();
    let store = Store::new(Value::Pending(slow.clone()));
    let parent = new_slot(&root, &store);
    root.pump();

    // A newer synchronous value lands first.
    store.set(Value::text("new"));
    root.pump();
    assert_eq!(slot_text(&root, parent), "new");

    // The old emission's deferred completes late; its epoch is stale.
    slow.complete(Value::text("stale"));
    root.pump();
    assert_eq!(slot_text(&root, parent), "new");
}

#[test]
fn nested_reactive_follows_inner_until_replaced() {
    let root = RenderRoot::new();
    let inner = Store::new(Value::text("a"));
    let outer = Store::new(Value::Reactive(readable(&inner)));
    let parent = new_slot(&root, &outer);
    root.pump();
    assert_eq!(slot_text(&root, parent), "a");

    inner.set(Value::text("b"));
    root.pump();
    assert_eq!(slot_text(&root, parent), "b", "inner emissions flow through");

    outer.set(Value::text("c"));
    root.pump();
    assert_eq!(slot_text(&root, parent), "c");

    inner.set(Value::text("d"));
    root.pump();
    assert_eq!(
        slot_text(&root, parent),
        "c",
        "replaced nested source is unsubscribed"
    );
}

#[test]
fn disposal_fires_once_and_severs_the_binding() {
    let root = RenderRoot::new();
    let store = Store::new(Value::text("x"));
    let parent = root.document().borrow_mut().create_element("div");
    let grandparent = root.document().borrow_mut().create_element("section");
    root.document()
        .borrow_mut()
        .append(grandparent, parent)
        .unwrap();
    root.bind_slot(parent, readable(&store)).unwrap();
    root.pump();

    let fired = Rc::new(Cell::new(0u32));
    let f = Rc::clone(&fired);
    {
        let node = slot_nodes(&root, parent)[0];
        root.registry()
            .borrow_mut()
            .register(node, Rc::new(move |_| f.set(f.get() + 1)));
    }

    root.dispose_subtree(grandparent).unwrap();
    assert_eq!(fired.get(), 1, "ancestor dispose reaches the slot content");

    // The binding is severed: further emissions schedule nothing.
    store.set(Value::text("y"));
    assert!(!root.scheduler().needs_frame());
    root.pump();
    assert!(!root.document().borrow().contains(parent));
}

#[test]
fn double_dispose_is_noop() {
    let root = RenderRoot::new();
    let store = Store::new(Value::text("x"));
    let parent = new_slot(&root, &store);
    root.pump();

    let fired = Rc::new(Cell::new(0u32));
    let f = Rc::clone(&fired);
    let node = slot_nodes(&root, parent)[0];
    root.registry()
        .borrow_mut()
        .register(node, Rc::new(move |_| f.set(f.get() + 1)));

    root.dispose_subtree(parent).unwrap();
    assert_eq!(fired.get(), 1);
    // The subtree is released; disposing again through the registry alone
    // must not re-fire.
    root.registry()
        .borrow_mut()
        .dispose(&root.document().borrow(), node);
    assert_eq!(fired.get(), 1);
}

#[test]
fn dispose_callbacks_may_mutate_the_tree() {
    let root = RenderRoot::new();
    let (host, parent, sibling) = {
        let mut doc = root.document().borrow_mut();
        let host = doc.create_element("section");
        let parent = doc.create_element("div");
        let sibling = doc.create_element("aside");
        doc.append(host, parent).unwrap();
        doc.append(host, sibling).unwrap();
        (host, parent, sibling)
    };

    // A cleanup that detaches a sibling through the shared document. The
    // dispose path must not be holding the document borrow at this point.
    let inner = root.clone();
    root.registry().borrow_mut().register(
        parent,
        Rc::new(move |_| {
            inner.document().borrow_mut().detach(sibling).unwrap();
        }),
    );

    root.dispose_subtree(parent).unwrap();
    let doc = root.document().borrow();
    assert!(!doc.contains(parent));
    assert!(doc.contains(sibling), "sibling survives, merely detached");
    assert_eq!(doc.parent(sibling).unwrap(), None);
    assert_eq!(doc.children(host).unwrap().as_slice(), &[] as &[NodeId]);
}

#[test]
fn bind_attr_applies_and_coalesces() {
    let root = RenderRoot::new();
    let store = Store::new(Value::text("btn"));
    let el = root.document().borrow_mut().create_element("button");
    root.bind_attr(el, "class", readable(&store)).unwrap();
    root.pump();
    assert_eq!(
        &*root.document().borrow().attr(el, "class").unwrap().unwrap(),
        "btn"
    );

    store.set(Value::text("btn primary"));
    store.set(Value::Null);
    root.pump();
    assert_eq!(
        root.document().borrow().attr(el, "class").unwrap(),
        None,
        "only the final value is applied"
    );
}

// ---------------------------------------------------------------------------
// List bindings
// ---------------------------------------------------------------------------

struct ListFixture {
    root: RenderRoot,
    store: Store<Vec<i64>>,
    parent: NodeId,
    disposed: Rc<RefCell<Vec<NodeId>>>,
}

impl ListFixture {
    fn new(initial: Vec<i64>) -> Self {
        let root = RenderRoot::new();
        let parent = root.document().borrow_mut().create_element("ul");
        let store = Store::new(initial);
        let disposed = Rc::new(RefCell::new(Vec::new()));
        root.bind_list(
            parent,
            Rc::new(store.clone()) as Rc<dyn Readable<Vec<i64>>>,
            |item: &i64| *item,
            |doc: &mut Document, item: &i64, _| -> Result<NodeId, DomError> {
                Ok(doc.create_text(&item.to_string()))
            },
        )
        .unwrap();
        root.pump();
        let mut fx = Self {
            root,
            store,
            parent,
            disposed,
        };
        fx.track_rows();
        fx
    }

    fn track_rows(&mut self) {
        let already: Vec<NodeId> = self.disposed.borrow().clone();
        for node in self.rows() {
            if already.contains(&node) {
                continue;
            }
            let disposed = Rc::clone(&self.disposed);
            self.root
                .registry()
                .borrow_mut()
                .register(node, Rc::new(move |id| disposed.borrow_mut().push(id)));
        }
    }

    fn rows(&self) -> Vec<NodeId> {
        let doc = self.root.document().borrow();
        doc.children(self.parent)
            .unwrap()
            .into_iter()
            .filter(|&c| !doc.is_marker(c))
            .collect()
    }

    fn row_text(&self) -> Vec<String> {
        let doc = self.root.document().borrow();
        self.rows()
            .iter()
            .map(|&n| doc.text(n).unwrap().to_owned())
            .collect()
    }

    fn set(&mut self, items: Vec<i64>) {
        self.store.set(items);
        self.root.pump();
        self.track_rows();
    }
}

#[test]
fn list_minimal_disposal_on_shrink() {
    let mut fx = ListFixture::new(vec![1, 2, 3, 4]);
    let before = fx.rows();
    fx.set(vec![2, 3]);
    assert_eq!(fx.row_text(), ["2", "3"]);
    assert_eq!(fx.rows(), vec![before[1], before[2]], "2 and 3 keep nodes");
    let disposed = fx.disposed.borrow().clone();
    assert_eq!(disposed.len(), 2);
    assert!(disposed.contains(&before[0]));
    assert!(disposed.contains(&before[3]));
}

#[test]
fn list_reversal_reuses_every_node() {
    let mut fx = ListFixture::new(vec![1, 2, 3]);
    let before = fx.rows();
    fx.set(vec![3, 2, 1]);
    assert_eq!(fx.row_text(), ["3", "2", "1"]);
    let mut after = fx.rows();
    after.reverse();
    assert_eq!(after, before);
    assert!(fx.disposed.borrow().is_empty());
}

#[test]
fn list_updates_coalesce() {
    let mut fx = ListFixture::new(vec![1]);
    fx.store.set(vec![1, 2]);
    fx.store.set(vec![1, 2, 3]);
    fx.root.pump_one();
    fx.track_rows();
    assert_eq!(fx.row_text(), ["1", "2", "3"], "single pass, final value");
}

#[test]
fn list_empty_state_swaps_once_per_transition() {
    let root = RenderRoot::new();
    let parent = root.document().borrow_mut().create_element("ul");
    let store: Store<Vec<i64>> = Store::new(Vec::new());
    root.bind_list_with_empty(
        parent,
        Rc::new(store.clone()) as Rc<dyn Readable<Vec<i64>>>,
        |item: &i64| *item,
        |doc: &mut Document, item: &i64, _| Ok(doc.create_text(&item.to_string())),
        |doc: &mut Document| Ok(doc.create_text("empty")),
    )
    .unwrap();
    root.pump();

    let region_text = |root: &RenderRoot| -> Vec<String> {
        let doc = root.document().borrow();
        doc.children(parent)
            .unwrap()
            .into_iter()
            .filter(|&c| !doc.is_marker(c))
            .map(|n| doc.text(n).unwrap().to_owned())
            .collect()
    };

    assert_eq!(region_text(&root), ["empty"]);
    let placeholder = {
        let doc = root.document().borrow();
        doc.children(parent)
            .unwrap()
            .into_iter()
            .find(|&c| !doc.is_marker(c))
            .unwrap()
    };

    store.set(vec![1, 2]);
    root.pump();
    assert_eq!(region_text(&root), ["1", "2"]);
    assert!(
        !root.document().borrow().contains(placeholder),
        "placeholder released on leaving the empty state"
    );

    store.set(Vec::new());
    root.pump();
    assert_eq!(region_text(&root), ["empty"]);
}

#[test]
fn list_binding_severed_by_disposal() {
    let mut fx = ListFixture::new(vec![1, 2]);
    let parent = fx.parent;
    fx.root.dispose_subtree(parent).unwrap();
    assert_eq!(fx.disposed.borrow().len(), 2, "rows disposed with the region");

    fx.store.set(vec![3]);
    assert!(!fx.root.scheduler().needs_frame(), "subscription dropped");
}
