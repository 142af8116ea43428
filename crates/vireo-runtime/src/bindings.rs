#![forbid(unsafe_code)]

//! Two-way form bindings.
//!
//! Each binding applies the same contract as the one-way bindings:
//! store-to-element writes go through the scheduler (coalesced per
//! element), element-to-store writes happen synchronously in the event
//! listener, and all wiring is registered for disposal on the element.
//!
//! # Invariants
//!
//! 1. A store write triggered by the element's own listener does not
//!    schedule a writeback to that element (re-entrancy guard, no echo
//!    loop).
//! 2. Unparseable user input is ignored; the store keeps its value.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use vireo_dom::{DomError, Event, ListenerFn, NodeId, PropValue};
use vireo_reactive::{Store, Subscription};

use crate::root::RenderRoot;

impl RenderRoot {
    fn register_form_teardown(&self, el: NodeId, subscriptions: Vec<Subscription>) {
        let subscriptions = Rc::new(RefCell::new(Some(subscriptions)));
        self.registry.borrow_mut().register(
            el,
            Rc::new(move |_| {
                subscriptions.borrow_mut().take();
            }),
        );
    }

    fn schedule_prop(&self, key: crate::scheduler::SlotKey, el: NodeId, name: &'static str, value: PropValue) {
        let doc = Rc::clone(&self.doc);
        self.scheduler.schedule(key, move || {
            if let Err(error) = doc.borrow_mut().set_prop(el, name, value) {
                tracing::error!(target: "vireo::runtime", %error, "form writeback failed");
            }
        });
    }

    /// Two-way binding between a text input's `value` property and a string
    /// store. Element-to-store updates fire on `input` events.
    pub fn bind_input_text(&self, el: NodeId, store: &Store<String>) -> Result<(), DomError> {
        self.doc.borrow().tag(el)?;
        let guard = Rc::new(Cell::new(false));
        let key = self.scheduler.alloc_key();

        let root = self.clone();
        let sub_guard = Rc::clone(&guard);
        let subscription = store.subscribe(move |value: &String, _| {
            if sub_guard.get() {
                return;
            }
            root.schedule_prop(key, el, "value", PropValue::Text(Rc::from(value.as_str())));
        });

        let doc = Rc::clone(&self.doc);
        let store = store.clone();
        let listener: Rc<ListenerFn> = Rc::new(move |event: &Event| {
            let current = doc.borrow().prop(event.target, "value").ok().flatten();
            if let Some(PropValue::Text(text)) = current {
                guard.set(true);
                store.set(text.to_string());
                guard.set(false);
            }
        });
        self.doc.borrow_mut().add_listener(el, "input", listener)?;
        self.register_form_teardown(el, vec![subscription]);
        Ok(())
    }

    /// Two-way binding between a numeric input and an `f64` store. Input
    /// that does not parse as a number leaves the store untouched.
    pub fn bind_input_number(&self, el: NodeId, store: &Store<f64>) -> Result<(), DomError> {
        self.doc.borrow().tag(el)?;
        let guard = Rc::new(Cell::new(false));
        let key = self.scheduler.alloc_key();

        let root = self.clone();
        let sub_guard = Rc::clone(&guard);
        let subscription = store.subscribe(move |value: &f64, _| {
            if sub_guard.get() {
                return;
            }
            root.schedule_prop(key, el, "value", PropValue::Text(Rc::from(value.to_string().as_str())));
        });

        let doc = Rc::clone(&self.doc);
        let store = store.clone();
        let listener: Rc<ListenerFn> = Rc::new(move |event: &Event| {
            let current = doc.borrow().prop(event.target, "value").ok().flatten();
            if let Some(PropValue::Text(text)) = current
                && let Ok(parsed) = text.trim().parse::<f64>()
            {
                guard.set(true);
                store.set(parsed);
                guard.set(false);
            }
        });
        self.doc.borrow_mut().add_listener(el, "input", listener)?;
        self.register_form_teardown(el, vec![subscription]);
        Ok(())
    }

    /// Two-way binding between a checkbox's `checked` property and a `bool`
    /// store. Element-to-store updates fire on `change` events.
    pub fn bind_checkbox(&self, el: NodeId, store: &Store<bool>) -> Result<(), DomError> {
        self.doc.borrow().tag(el)?;
        let guard = Rc::new(Cell::new(false));
        let key = self.scheduler.alloc_key();

        let root = self.clone();
        let sub_guard = Rc::clone(&guard);
        let subscription = store.subscribe(move |value: &bool, _| {
            if sub_guard.get() {
                return;
            }
            root.schedule_prop(key, el, "checked", PropValue::Bool(*value));
        });

        let doc = Rc::clone(&self.doc);
        let store = store.clone();
        let listener: Rc<ListenerFn> = Rc::new(move |event: &Event| {
            let current = doc.borrow().prop(event.target, "checked").ok().flatten();
            if let Some(PropValue::Bool(checked)) = current {
                guard.set(true);
                store.set(checked);
                guard.set(false);
            }
        });
        self.doc.borrow_mut().add_listener(el, "change", listener)?;
        self.register_form_teardown(el, vec![subscription]);
        Ok(())
    }

    /// Two-way binding between a radio group and a string store. Each entry
    /// pairs a radio element with the value it represents; the radio whose
    /// value equals the store's is checked.
    pub fn bind_radio_group(
        &self,
        radios: &[(NodeId, &str)],
        store: &Store<String>,
    ) -> Result<(), DomError> {
        for &(el, value) in radios {
            self.doc.borrow().tag(el)?;
            // Guard is per radio: the radio that fired skips its own
            // writeback while its siblings still update.
            let guard = Rc::new(Cell::new(false));
            let radio_value: Rc<str> = Rc::from(value);
            let key = self.scheduler.alloc_key();

            let root = self.clone();
            let sub_guard = Rc::clone(&guard);
            let sub_value = Rc::clone(&radio_value);
            let subscription = store.subscribe(move |current: &String, _| {
                if sub_guard.get() {
                    return;
                }
                root.schedule_prop(key, el, "checked", PropValue::Bool(current.as_str() == &*sub_value));
            });

            let doc = Rc::clone(&self.doc);
            let store = store.clone();
            let guard = Rc::clone(&guard);
            let listener: Rc<ListenerFn> = Rc::new(move |event: &Event| {
                let checked = doc.borrow().prop(event.target, "checked").ok().flatten();
                if let Some(PropValue::Bool(true)) = checked {
                    guard.set(true);
                    store.set(radio_value.to_string());
                    guard.set(false);
                }
            });
            self.doc.borrow_mut().add_listener(el, "change", listener)?;
            self.register_form_teardown(el, vec![subscription]);
        }
        Ok(())
    }

    /// Two-way binding between a single-choice select's `value` property and
    /// a string store.
    pub fn bind_select(&self, el: NodeId, store: &Store<String>) -> Result<(), DomError> {
        self.doc.borrow().tag(el)?;
        let guard = Rc::new(Cell::new(false));
        let key = self.scheduler.alloc_key();

        let root = self.clone();
        let sub_guard = Rc::clone(&guard);
        let subscription = store.subscribe(move |value: &String, _| {
            if sub_guard.get() {
                return;
            }
            root.schedule_prop(key, el, "value", PropValue::Text(Rc::from(value.as_str())));
        });

        let doc = Rc::clone(&self.doc);
        let store = store.clone();
        let listener: Rc<ListenerFn> = Rc::new(move |event: &Event| {
            let current = doc.borrow().prop(event.target, "value").ok().flatten();
            if let Some(PropValue::Text(text)) = current {
                guard.set(true);
                store.set(text.to_string());
                guard.set(false);
            }
        });
        self.doc.borrow_mut().add_listener(el, "change", listener)?;
        self.register_form_teardown(el, vec![subscription]);
        Ok(())
    }

    /// Two-way binding between a multiple-choice select and a store of the
    /// selected option values. Options are the select's child elements; an
    /// option's value is its `value` attribute and its selection state its
    /// `selected` property.
    pub fn bind_select_multiple(
        &self,
        el: NodeId,
        store: &Store<Vec<String>>,
    ) -> Result<(), DomError> {
        self.doc.borrow().tag(el)?;
        let guard = Rc::new(Cell::new(false));
        let key = self.scheduler.alloc_key();

        let doc_for_sub = Rc::clone(&self.doc);
        let scheduler = self.scheduler.clone();
        let sub_guard = Rc::clone(&guard);
        let subscription = store.subscribe(move |selected: &Vec<String>, _| {
            if sub_guard.get() {
                return;
            }
            let selected = selected.clone();
            let doc = Rc::clone(&doc_for_sub);
            scheduler.schedule(key, move || {
                let mut doc = doc.borrow_mut();
                let Ok(options) = doc.children(el) else {
                    return;
                };
                for option in options {
                    let Ok(Some(value)) = doc.attr(option, "value") else {
                        continue;
                    };
                    let is_selected = selected.iter().any(|s| s.as_str() == &*value);
                    if let Err(error) = doc.set_prop(option, "selected", PropValue::Bool(is_selected))
                    {
                        tracing::error!(target: "vireo::runtime", %error, "form writeback failed");
                    }
                }
            });
        });

        let doc = Rc::clone(&self.doc);
        let store = store.clone();
        let listener: Rc<ListenerFn> = Rc::new(move |event: &Event| {
            let doc = doc.borrow();
            let Ok(options) = doc.children(event.target) else {
                return;
            };
            let mut selected = Vec::new();
            for option in options {
                if doc.prop(option, "selected").ok().flatten() == Some(PropValue::Bool(true))
                    && let Ok(Some(value)) = doc.attr(option, "value")
                {
                    selected.push(value.to_string());
                }
            }
            drop(doc);
            guard.set(true);
            store.set(selected);
            guard.set(false);
        });
        self.doc.borrow_mut().add_listener(el, "change", listener)?;
        self.register_form_teardown(el, vec![subscription]);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn input(root: &RenderRoot, tag: &str) -> NodeId {
        let mut doc = root.document().borrow_mut();
        let parent = doc.create_element("form");
        let el = doc.create_element(tag);
        doc.append(parent, el).unwrap();
        el
    }

    fn text_prop(root: &RenderRoot, el: NodeId, name: &str) -> Option<String> {
        root.document()
            .borrow()
            .prop(el, name)
            .unwrap()
            .map(|p| p.as_text())
    }

    #[test]
    fn input_text_store_to_element() {
        let root = RenderRoot::new();
        let el = input(&root, "input");
        let store = Store::new(String::from("init"));
        root.bind_input_text(el, &store).unwrap();

        root.pump();
        assert_eq!(text_prop(&root, el, "value").as_deref(), Some("init"));

        store.set(String::from("updated"));
        root.pump();
        assert_eq!(text_prop(&root, el, "value").as_deref(), Some("updated"));
    }

    #[test]
    fn input_text_element_to_store_is_synchronous() {
        let root = RenderRoot::new();
        let el = input(&root, "input");
        let store = Store::new(String::new());
        root.bind_input_text(el, &store).unwrap();
        root.pump();

        root.document()
            .borrow_mut()
            .set_prop(el, "value", PropValue::Text(Rc::from("typed")))
            .unwrap();
        root.dispatch(el, "input").unwrap();
        assert_eq!(store.get(), "typed");
    }

    #[test]
    fn input_text_no_echo_writeback() {
        let root = RenderRoot::new();
        let el = input(&root, "input");
        let store = Store::new(String::new());
        root.bind_input_text(el, &store).unwrap();
        root.pump();

        root.document()
            .borrow_mut()
            .set_prop(el, "value", PropValue::Text(Rc::from("abc")))
            .unwrap();
        root.dispatch(el, "input").unwrap();
        assert!(
            !root.scheduler().needs_frame(),
            "listener-driven store write must not schedule a writeback"
        );
    }

    #[test]
    fn input_number_ignores_garbage() {
        let root = RenderRoot::new();
        let el = input(&root, "input");
        let store = Store::new(1.5f64);
        root.bind_input_number(el, &store).unwrap();
        root.pump();
        assert_eq!(text_prop(&root, el, "value").as_deref(), Some("1.5"));

        root.document()
            .borrow_mut()
            .set_prop(el, "value", PropValue::Text(Rc::from("not a number")))
            .unwrap();
        root.dispatch(el, "input").unwrap();
        assert_eq!(store.get(), 1.5, "unparseable input leaves the store");

        root.document()
            .borrow_mut()
            .set_prop(el, "value", PropValue::Text(Rc::from(" 42 ")))
            .unwrap();
        root.dispatch(el, "input").unwrap();
        assert_eq!(store.get(), 42.0);
    }

    #[test]
    fn checkbox_round_trip() {
        let root = RenderRoot::new();
        let el = input(&root, "input");
        let store = Store::new(false);
        root.bind_checkbox(el, &store).unwrap();
        root.pump();
        assert_eq!(
            root.document().borrow().prop(el, "checked").unwrap(),
            Some(PropValue::Bool(false))
        );

        store.set(true);
        root.pump();
        assert_eq!(
            root.document().borrow().prop(el, "checked").unwrap(),
            Some(PropValue::Bool(true))
        );

        root.document()
            .borrow_mut()
            .set_prop(el, "checked", PropValue::Bool(false))
            .unwrap();
        root.dispatch(el, "change").unwrap();
        assert!(!store.get());
    }

    #[test]
    fn radio_group_tracks_store() {
        let root = RenderRoot::new();
        let a = input(&root, "input");
        let b = input(&root, "input");
        let store = Store::new(String::from("a"));
        root.bind_radio_group(&[(a, "a"), (b, "b")], &store).unwrap();
        root.pump();
        assert_eq!(
            root.document().borrow().prop(a, "checked").unwrap(),
            Some(PropValue::Bool(true))
        );
        assert_eq!(
            root.document().borrow().prop(b, "checked").unwrap(),
            Some(PropValue::Bool(false))
        );

        // User checks the other radio.
        root.document()
            .borrow_mut()
            .set_prop(b, "checked", PropValue::Bool(true))
            .unwrap();
        root.dispatch(b, "change").unwrap();
        assert_eq!(store.get(), "b");
        root.pump();
        assert_eq!(
            root.document().borrow().prop(a, "checked").unwrap(),
            Some(PropValue::Bool(false)),
            "other radios follow on the next flush"
        );
    }

    #[test]
    fn select_multiple_round_trip() {
        let root = RenderRoot::new();
        let el = input(&root, "select");
        {
            let mut doc = root.document().borrow_mut();
            for value in ["x", "y", "z"] {
                let option = doc.create_element("option");
                doc.set_attr(option, "value", value).unwrap();
                doc.append(el, option).unwrap();
            }
        }
        let store = Store::new(vec![String::from("y")]);
        root.bind_select_multiple(el, &store).unwrap();
        root.pump();

        let doc = root.document().borrow();
        let options = doc.children(el).unwrap();
        assert_eq!(
            doc.prop(options[1], "selected").unwrap(),
            Some(PropValue::Bool(true))
        );
        assert_eq!(
            doc.prop(options[0], "selected").unwrap(),
            Some(PropValue::Bool(false))
        );
        drop(doc);

        // User selects x and z.
        {
            let mut doc = root.document().borrow_mut();
            let options = doc.children(el).unwrap();
            doc.set_prop(options[0], "selected", PropValue::Bool(true))
                .unwrap();
            doc.set_prop(options[1], "selected", PropValue::Bool(false))
                .unwrap();
            doc.set_prop(options[2], "selected", PropValue::Bool(true))
                .unwrap();
        }
        root.dispatch(el, "change").unwrap();
        assert_eq!(store.get(), vec![String::from("x"), String::from("z")]);
    }

    #[test]
    fn disposal_severs_the_binding() {
        let root = RenderRoot::new();
        let el = input(&root, "input");
        let store = Store::new(String::from("a"));
        root.bind_input_text(el, &store).unwrap();
        root.pump();

        root.dispose_subtree(el).unwrap();
        store.set(String::from("b"));
        root.pump();
        // No panic, no stale writes: the element is gone and the
        // subscription was dropped with it.
        assert!(!root.document().borrow().contains(el));
    }
}
