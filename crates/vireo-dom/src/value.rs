#![forbid(unsafe_code)]

//! The tagged interpolation value.
//!
//! [`Value`] models every shape a template interpolation can take: literals,
//! nodes, nested lists, lazy thunks, deferred results, reactive sources, and
//! event handlers. The patchers consume the literal arms; the runtime
//! resolver unwraps `Thunk`/`Pending`/`Reactive` before anything reaches a
//! patcher.
//!
//! # Invariants
//!
//! 1. Equality is the change gate for patching: structural for literals,
//!    pointer identity for the boxed arms (`Thunk`, `Pending`, `Reactive`,
//!    `Handler`), handle equality for `Node`.
//! 2. Truthiness follows the conventions templates expect: `Null`, `false`,
//!    `0`, `NaN`, and the empty string are falsy; everything else is truthy.

use std::rc::Rc;

use vireo_reactive::{Deferred, Readable};

use crate::document::{Event, NodeId};

/// One interpolated value.
#[derive(Clone)]
pub enum Value {
    /// Absence; renders nothing.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Float(f64),
    /// Text literal.
    Text(Rc<str>),
    /// An already-built node, adopted as-is.
    Node(NodeId),
    /// A sequence of values, flattened recursively when rendered.
    List(Vec<Value>),
    /// An ordered string-keyed map (class/style shapes).
    Map(Vec<(Rc<str>, Value)>),
    /// A lazy value; the resolver invokes it and recurses.
    Thunk(Rc<dyn Fn() -> Value>),
    /// A value that arrives later.
    Pending(Deferred<Value>),
    /// A nested reactive source; the resolver subscribes and recurses.
    Reactive(Rc<dyn Readable<Value>>),
    /// An event handler (consumed by `on*` attribute slots).
    Handler(Rc<dyn Fn(&Event)>),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Text(s) => write!(f, "Text({s:?})"),
            Value::Node(id) => write!(f, "Node({id:?})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Value::Thunk(_) => write!(f, "Thunk(..)"),
            Value::Pending(d) => write!(f, "Pending({d:?})"),
            Value::Reactive(_) => write!(f, "Reactive(..)"),
            Value::Handler(_) => write!(f, "Handler(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            // Boxed arms compare by identity, never structurally.
            (Value::Thunk(a), Value::Thunk(b)) => Rc::ptr_eq(a, b),
            (Value::Pending(a), Value::Pending(b)) => a.same_cell(b),
            (Value::Reactive(a), Value::Reactive(b)) => Rc::ptr_eq(a, b),
            (Value::Handler(a), Value::Handler(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// Text literal from anything string-like.
    #[must_use]
    pub fn text(s: impl AsRef<str>) -> Self {
        Value::Text(Rc::from(s.as_ref()))
    }

    /// Template truthiness: `Null`, `false`, `0`, `0.0`/NaN, and `""` are
    /// falsy; every other value is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Text(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Whether this is the `Null` arm.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The text this value coerces to in a slot or attribute position, or
    /// `None` for arms that are not text-like (`Null`, `Node`, `List`, `Map`,
    /// and the boxed arms).
    ///
    /// Numbers use their `Display` form, so `Float(1.0)` coerces to `"1"`.
    #[must_use]
    pub fn coerce_text(&self) -> Option<String> {
        match self {
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.to_string()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(Rc::from(s.as_str()))
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Value::Node(id)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_equality_is_structural() {
        assert_eq!(Value::from(3), Value::Int(3));
        assert_eq!(Value::text("a"), Value::from("a"));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Null]),
            Value::List(vec![Value::Int(1), Value::Null])
        );
    }

    #[test]
    fn thunk_equality_is_identity() {
        let f: Rc<dyn Fn() -> Value> = Rc::new(|| Value::Int(1));
        let a = Value::Thunk(Rc::clone(&f));
        let b = Value::Thunk(f);
        assert_eq!(a, b);

        let other = Value::Thunk(Rc::new(|| Value::Int(1)));
        assert_ne!(a, other, "structurally identical thunks are not equal");
    }

    #[test]
    fn pending_equality_is_cell_identity() {
        let d: Deferred<Value> = Deferred::new();
        assert_eq!(Value::Pending(d.clone()), Value::Pending(d));
        assert_ne!(
            Value::Pending(Deferred::new()),
            Value::Pending(Deferred::new())
        );
    }

    #[test]
    fn handler_equality_is_identity() {
        let h: Rc<dyn Fn(&Event)> = Rc::new(|_| {});
        assert_eq!(Value::Handler(Rc::clone(&h)), Value::Handler(h));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(!Value::text("").is_truthy());

        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::Float(0.5).is_truthy());
        assert!(Value::text("0").is_truthy(), "non-empty text is truthy");
        assert!(Value::List(Vec::new()).is_truthy(), "empty list is truthy");
    }

    #[test]
    fn text_coercion() {
        assert_eq!(Value::Int(7).coerce_text().as_deref(), Some("7"));
        assert_eq!(Value::Float(1.0).coerce_text().as_deref(), Some("1"));
        assert_eq!(Value::Float(1.5).coerce_text().as_deref(), Some("1.5"));
        assert_eq!(Value::Bool(true).coerce_text().as_deref(), Some("true"));
        assert_eq!(Value::text("x").coerce_text().as_deref(), Some("x"));
        assert_eq!(Value::Null.coerce_text(), None);
        assert_eq!(Value::List(Vec::new()).coerce_text(), None);
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(2i64)), Value::Int(2));
    }
}
