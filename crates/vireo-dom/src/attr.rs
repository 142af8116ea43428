#![forbid(unsafe_code)]

//! Attribute-position patching: class shapes, style maps, event handlers,
//! live properties, and plain attributes.
//!
//! The dispatch order mirrors what templates expect:
//!
//! 1. `class` / `className` accept text, lists, and maps.
//! 2. `style` accepts wholesale text or a declaration map (diffed).
//! 3. `on*` names bind event handlers.
//! 4. Everything else tries the live-property path first, falling back to a
//!    string attribute.
//!
//! # Invariants
//!
//! 1. Property-path failures are suppressed; attribute patching is
//!    best-effort and never propagates a `ReadOnlyProperty` error.
//! 2. Handler swap removes the previous handler and adds the next one
//!    independently; there is no window where both are registered as a pair
//!    or neither handles a dispatch it should.
//! 3. Style map diffing touches only the union of previous and next keys.

use std::rc::Rc;

use crate::document::{Document, NodeId, PropValue};
use crate::error::DomError;
use crate::value::Value;

/// Names that always take the attribute path even on non-SVG elements.
/// These reflect poorly (or read-only) as live properties.
const ATTRIBUTE_ONLY: &[&str] = &["list", "form", "width", "height", "href", "tabIndex", "download"];

/// Style property name fragments whose numeric values take no `px` suffix.
/// Matched against the lowercased, hyphen-stripped property name.
const UNITLESS_FRAGMENTS: &[&str] = &[
    "animationiterationcount",
    "columns",
    "flex",
    "fontweight",
    "gridcolumn",
    "gridrow",
    "lineheight",
    "opacity",
    "order",
    "orphans",
    "scale",
    "tabsize",
    "widows",
    "zindex",
    "zoom",
];

fn is_unitless(name: &str) -> bool {
    let normalized: String = name
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    UNITLESS_FRAGMENTS
        .iter()
        .any(|fragment| normalized.contains(fragment))
}

/// The text a class-position value renders to, or `None` for "remove the
/// attribute". Lists keep truthy text-like entries in order; maps keep keys
/// whose value is truthy.
fn class_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::List(items) => {
            let mut out = String::new();
            for item in items {
                if !item.is_truthy() {
                    continue;
                }
                if let Some(text) = item.coerce_text()
                    && !text.is_empty()
                {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&text);
                }
            }
            Some(out)
        }
        Value::Map(entries) => {
            let mut out = String::new();
            for (key, condition) in entries {
                if condition.is_truthy() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(key);
                }
            }
            Some(out)
        }
        other => other.coerce_text(),
    }
}

fn style_map(value: &Value) -> Option<&[(Rc<str>, Value)]> {
    match value {
        Value::Map(entries) => Some(entries),
        _ => None,
    }
}

fn style_decl_text(name: &str, value: &Value) -> Option<String> {
    let numeric = matches!(value, Value::Int(_) | Value::Float(_));
    let text = value.coerce_text()?;
    // Dashed names (including custom properties) take the value verbatim.
    if numeric && !name.contains('-') && !is_unitless(name) {
        Some(format!("{text}px"))
    } else {
        Some(text)
    }
}

fn patch_style(
    doc: &mut Document,
    el: NodeId,
    prev: &Value,
    next: &Value,
) -> Result<(), DomError> {
    match next {
        Value::Text(text) => doc.set_style_text(el, Some(text)),
        Value::Map(entries) => {
            // Coming from anything but a map, wipe first so stale wholesale
            // text or unknown declarations cannot linger.
            let prev_entries = match style_map(prev) {
                Some(prev_entries) => prev_entries,
                None => {
                    doc.set_style_text(el, None)?;
                    &[]
                }
            };
            // Clear previous keys absent from (or nulled in) the next map.
            for (key, _) in prev_entries {
                let next_value = entries
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v)
                    .unwrap_or(&Value::Null);
                if style_decl_text(key, next_value).is_none() {
                    doc.remove_style_value(el, key)?;
                }
            }
            for (key, value) in entries {
                if let Some(text) = style_decl_text(key, value) {
                    doc.set_style_value(el, key, &text)?;
                }
            }
            Ok(())
        }
        _ => doc.set_style_text(el, None),
    }
}

fn patch_handler(
    doc: &mut Document,
    el: NodeId,
    event: &str,
    prev: &Value,
    next: &Value,
) -> Result<(), DomError> {
    if let Value::Handler(handler) = prev {
        doc.remove_listener(el, event, handler)?;
    }
    if let Value::Handler(handler) = next {
        doc.add_listener(el, event, Rc::clone(handler))?;
    }
    Ok(())
}

fn prop_value(value: &Value) -> Option<PropValue> {
    match value {
        // Null clears through the property path as the empty string.
        Value::Null => Some(PropValue::Text(Rc::from(""))),
        Value::Bool(b) => Some(PropValue::Bool(*b)),
        Value::Int(i) => Some(PropValue::Int(*i)),
        Value::Float(f) => Some(PropValue::Float(*f)),
        Value::Text(s) => Some(PropValue::Text(Rc::clone(s))),
        _ => None,
    }
}

/// Patch one attribute position on `el` from `prev` to `next`.
///
/// Callers gate on value equality; this function assumes the values differ
/// and applies `next` unconditionally.
pub fn patch_attribute(
    doc: &mut Document,
    el: NodeId,
    name: &str,
    prev: &Value,
    next: &Value,
) -> Result<(), DomError> {
    #[cfg(feature = "tracing")]
    let _span = tracing::trace_span!("patch_attribute", el = ?el, name).entered();

    if name == "class" || name == "className" {
        return match class_text(next) {
            Some(text) => doc.set_attr(el, "class", &text),
            None => doc.remove_attr(el, "class"),
        };
    }

    if name == "style" {
        return patch_style(doc, el, prev, next);
    }

    if let Some(event) = name.strip_prefix("on")
        && !event.is_empty()
    {
        let event = event.to_ascii_lowercase();
        return patch_handler(doc, el, &event, prev, next);
    }

    let dashed = name.contains('-');

    // Live-property path, unless the name is attribute-only, dashed, or the
    // element is SVG-namespaced. Failures (read-only reflection) are
    // suppressed; nothing is set in that case.
    if !dashed && !ATTRIBUTE_ONLY.contains(&name) && !doc.is_svg(el) {
        if let Some(prop) = prop_value(next) {
            let _ = doc.set_prop(el, name, prop);
            return Ok(());
        }
    }

    // Attribute fallback. Null always removes; `false` removes except for
    // dashed names, which keep the literal string "false".
    let remove = match next {
        Value::Null => true,
        Value::Bool(false) => !dashed,
        _ => false,
    };
    if remove {
        doc.remove_attr(el, name)
    } else {
        let text = next.coerce_text().unwrap_or_default();
        doc.set_attr(el, name, &text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
