#![forbid(unsafe_code)]

//! Keyed list bindings over a reactive `Vec` source.
//!
//! The binding owns a marker pair delimiting its managed region; each
//! emission schedules one reconcile pass under the binding's slot key, so
//! several synchronous updates coalesce into a single structural diff.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use vireo_dom::{DisposalRegistry, Document, DomError, ListState, NodeId, reconcile_list};
use vireo_reactive::Readable;

use crate::scheduler::Scheduler;

/// Row factory: builds a detached node for one item.
pub type RowFactory<T> = dyn Fn(&mut Document, &T, usize) -> Result<NodeId, DomError>;

/// Empty-state factory: builds the node rendered while the list is empty.
pub type EmptyFactory = dyn Fn(&mut Document) -> Result<NodeId, DomError>;

#[allow(clippy::too_many_arguments)]
pub(crate) fn bind_list<T, K>(
    doc: &Rc<RefCell<Document>>,
    registry: &Rc<RefCell<DisposalRegistry>>,
    scheduler: &Scheduler,
    parent: NodeId,
    source: Rc<dyn Readable<Vec<T>>>,
    key_fn: Rc<dyn Fn(&T) -> K>,
    factory: Rc<RowFactory<T>>,
    empty_factory: Option<Rc<EmptyFactory>>,
) -> Result<NodeId, DomError>
where
    T: Clone + PartialEq + 'static,
    K: Eq + Hash + Clone + 'static,
{
    let (start, end) = {
        let mut doc = doc.borrow_mut();
        let start = doc.create_marker("list-start");
        let end = doc.create_marker("list-end");
        doc.append(parent, start)?;
        doc.append(parent, end)?;
        (start, end)
    };
    let key = scheduler.alloc_key();
    let state = Rc::new(RefCell::new(ListState::<K>::new()));
    let empty_node = Rc::new(RefCell::new(None::<NodeId>));
    let last = Rc::new(RefCell::new(None::<Vec<T>>));

    let subscription = {
        let doc = Rc::clone(doc);
        let registry = Rc::clone(registry);
        let scheduler = scheduler.clone();
        source.subscribe_shared(Rc::new(move |items: &Vec<T>, _old: Option<&Vec<T>>| {
            let items = items.clone();
            let doc = Rc::clone(&doc);
            let registry = Rc::clone(&registry);
            let state = Rc::clone(&state);
            let empty_node = Rc::clone(&empty_node);
            let last = Rc::clone(&last);
            let key_fn = Rc::clone(&key_fn);
            let factory = Rc::clone(&factory);
            let empty_factory = empty_factory.clone();
            scheduler.schedule(key, move || {
                if last.borrow().as_ref() == Some(&items) {
                    return;
                }
                let mut doc = doc.borrow_mut();
                let mut registry = registry.borrow_mut();
                let outcome = (|| -> Result<(), DomError> {
                    // Leaving the empty state: the placeholder goes before
                    // the rows come in.
                    if !items.is_empty()
                        && let Some(node) = empty_node.borrow_mut().take()
                    {
                        registry.dispose(&doc, node);
                        doc.release(node)?;
                    }
                    reconcile_list(
                        &mut doc,
                        &mut registry,
                        &mut state.borrow_mut(),
                        &items,
                        |item| key_fn(item),
                        |doc, item, index| factory(doc, item, index),
                        start,
                        end,
                    )?;
                    if items.is_empty()
                        && let Some(make_empty) = &empty_factory
                        && empty_node.borrow().is_none()
                    {
                        let node = make_empty(&mut doc)?;
                        doc.insert_before(parent, node, Some(end))?;
                        *empty_node.borrow_mut() = Some(node);
                    }
                    Ok(())
                })();
                match outcome {
                    Ok(()) => *last.borrow_mut() = Some(items),
                    Err(error) => {
                        tracing::error!(target: "vireo::runtime", %error, "list reconcile failed");
                    }
                }
            });
        }))
    };

    let subscription = Rc::new(RefCell::new(Some(subscription)));
    registry.borrow_mut().register(
        start,
        Rc::new(move |_| {
            subscription.borrow_mut().take();
        }),
    );
    Ok(start)
}
