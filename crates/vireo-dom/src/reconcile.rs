#![forbid(unsafe_code)]

//! Keyed list reconciliation.
//!
//! [`reconcile_list`] updates the node sequence between two marker nodes to
//! match a new keyed item sequence, reusing nodes whose key survives and
//! minimizing moves via a longest-increasing-subsequence over the surviving
//! positions.
//!
//! The phases, in order:
//!
//! 1. Prefix and suffix trim on key equality (untouched head and tail).
//! 2. Head/tail swap detection (a reversed pair moves with two direct
//!    `insert_before` calls).
//! 3. Pure-insertion and pure-removal fast paths for drained ranges.
//! 4. General case: key-to-position map, full-rebuild shortcut when nothing
//!    is reusable, LIS over matched positions, right-to-left application
//!    with LIS members as fixed anchors.
//!
//! # Invariants
//!
//! 1. A key present in both sequences keeps its node (no churn on reorder).
//! 2. Every node dropped from the sequence is disposed through the registry
//!    before release.
//! 3. Structural operation count is proportional to the edit size for
//!    localized edits, not to the sequence length.
//! 4. After return, `ListState` mirrors the region between the markers
//!    exactly, in order.
//!
//! Duplicate keys in the input are a caller error: the first occurrence
//! claims the surviving node, later occurrences render fresh nodes.

use std::collections::VecDeque;
use std::hash::Hash;

use ahash::AHashMap;

use crate::disposal::DisposalRegistry;
use crate::document::{Document, NodeId};
use crate::error::DomError;

/// Keys and nodes of a managed list region, in render order.
#[derive(Debug, Clone, Default)]
pub struct ListState<K> {
    /// Item keys, parallel to `nodes`.
    pub keys: Vec<K>,
    /// Rendered row nodes, parallel to `keys`.
    pub nodes: Vec<NodeId>,
}

impl<K> ListState<K> {
    /// Empty state for a freshly bound region.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Number of rendered rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the region renders no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Longest increasing subsequence over `source`, ignoring `usize::MAX`
/// entries (freshly created positions). Returns the chosen slot indices in
/// ascending order.
fn longest_increasing(source: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<usize> = vec![usize::MAX; source.len()];
    for (slot, &value) in source.iter().enumerate() {
        if value == usize::MAX {
            continue;
        }
        let pos = match tails.binary_search_by(|&t| source[t].cmp(&value)) {
            Ok(pos) | Err(pos) => pos,
        };
        if pos > 0 {
            prev[slot] = tails[pos - 1];
        }
        if pos == tails.len() {
            tails.push(slot);
        } else {
            tails[pos] = slot;
        }
    }
    let mut out = Vec::with_capacity(tails.len());
    if let Some(&last) = tails.last() {
        let mut cursor = last;
        loop {
            out.push(cursor);
            if prev[cursor] == usize::MAX {
                break;
            }
            cursor = prev[cursor];
        }
        out.reverse();
    }
    out
}

/// Reconcile the region between `start_marker` and `end_marker` from
/// `state` to `next`.
///
/// `key_fn` extracts the identity key per item; `factory` builds the row
/// node for an item that has no surviving node (it receives the item and its
/// index in `next`, and returns a detached node that this function attaches).
#[allow(clippy::too_many_arguments)]
pub fn reconcile_list<K, T>(
    doc: &mut Document,
    registry: &mut DisposalRegistry,
    state: &mut ListState<K>,
    next: &[T],
    key_fn: impl Fn(&T) -> K,
    mut factory: impl FnMut(&mut Document, &T, usize) -> Result<NodeId, DomError>,
    start_marker: NodeId,
    end_marker: NodeId,
) -> Result<(), DomError>
where
    K: Eq + Hash + Clone,
{
    let parent = doc
        .parent(start_marker)?
        .ok_or(DomError::DetachedMarker(start_marker))?;
    if doc.parent(end_marker)? != Some(parent) {
        return Err(DomError::AnchorNotChild {
            parent,
            anchor: end_marker,
        });
    }

    let new_keys: Vec<K> = next.iter().map(&key_fn).collect();
    let new_len = new_keys.len();

    #[cfg(feature = "tracing")]
    let _span = tracing::trace_span!(
        "reconcile_list",
        old = state.len(),
        new = new_len
    )
    .entered();

    let mut mid_keys: VecDeque<K> = std::mem::take(&mut state.keys).into();
    let mut mid_nodes: VecDeque<NodeId> = std::mem::take(&mut state.nodes).into();

    let mut result: Vec<Option<NodeId>> = vec![None; new_len];
    let mut new_start = 0usize;
    let mut new_end = new_len;
    let mut tail_anchor = end_marker;

    // Phases 1 and 2, repeated until neither makes progress: each swap can
    // expose a fresh trimmable prefix or suffix.
    loop {
        let mut progress = false;

        while !mid_keys.is_empty() && new_start < new_end && mid_keys[0] == new_keys[new_start] {
            result[new_start] = Some(mid_nodes[0]);
            mid_keys.pop_front();
            mid_nodes.pop_front();
            new_start += 1;
            progress = true;
        }

        while !mid_keys.is_empty()
            && new_start < new_end
            && mid_keys[mid_keys.len() - 1] == new_keys[new_end - 1]
        {
            new_end -= 1;
            let node = mid_nodes[mid_nodes.len() - 1];
            result[new_end] = Some(node);
            tail_anchor = node;
            mid_keys.pop_back();
            mid_nodes.pop_back();
            progress = true;
        }

        while mid_keys.len() >= 2
            && new_end - new_start >= 2
            && mid_keys[0] == new_keys[new_end - 1]
            && mid_keys[mid_keys.len() - 1] == new_keys[new_start]
        {
            let head = mid_nodes[0];
            let tail = mid_nodes[mid_nodes.len() - 1];
            mid_keys.pop_front();
            mid_nodes.pop_front();
            mid_keys.pop_back();
            mid_nodes.pop_back();

            // Tail moves in front of the (still-placed) head, then the head
            // moves to the back of the window.
            doc.insert_before(parent, tail, Some(head))?;
            doc.insert_before(parent, head, Some(tail_anchor))?;

            result[new_start] = Some(tail);
            new_start += 1;
            new_end -= 1;
            result[new_end] = Some(head);
            tail_anchor = head;
            progress = true;
        }

        if !progress {
            break;
        }
    }

    // Phase 3: drained-range fast paths.
    if mid_keys.is_empty() {
        for i in new_start..new_end {
            let node = factory(doc, &next[i], i)?;
            doc.insert_before(parent, node, Some(tail_anchor))?;
            result[i] = Some(node);
        }
    } else if new_start == new_end {
        for node in mid_nodes {
            registry.dispose(doc, node);
            doc.release(node)?;
        }
    } else {
        // Phase 4: general case.
        let mid_keys: Vec<K> = mid_keys.into();
        let mid_nodes: Vec<NodeId> = mid_nodes.into();
        let width = new_end - new_start;

        let mut key_to_new: AHashMap<&K, usize> = AHashMap::with_capacity(width);
        for i in new_start..new_end {
            key_to_new.entry(&new_keys[i]).or_insert(i);
        }

        let mut source: Vec<usize> = vec![usize::MAX; width];
        let mut moved = false;
        let mut max_matched = 0usize;
        let mut reusable = 0usize;

        for (j, key) in mid_keys.iter().enumerate() {
            match key_to_new.get(key).copied() {
                Some(i) if source[i - new_start] == usize::MAX => {
                    source[i - new_start] = j;
                    if i >= max_matched {
                        max_matched = i;
                    } else {
                        moved = true;
                    }
                    reusable += 1;
                    result[i] = Some(mid_nodes[j]);
                }
                _ => {
                    let node = mid_nodes[j];
                    registry.dispose(doc, node);
                    doc.release(node)?;
                }
            }
        }

        if reusable == 0 {
            // Full rebuild: nothing survived the key match.
            for i in new_start..new_end {
                let node = factory(doc, &next[i], i)?;
                doc.insert_before(parent, node, Some(tail_anchor))?;
                result[i] = Some(node);
            }
        } else {
            let lis = if moved {
                longest_increasing(&source)
            } else {
                Vec::new()
            };
            let mut lis_cursor = lis.len();
            let mut anchor = tail_anchor;
            for slot in (0..width).rev() {
                let i = new_start + slot;
                let node = if source[slot] == usize::MAX {
                    let node = factory(doc, &next[i], i)?;
                    doc.insert_before(parent, node, Some(anchor))?;
                    node
                } else {
                    let node = mid_nodes[source[slot]];
                    if moved {
                        if lis_cursor > 0 && lis[lis_cursor - 1] == slot {
                            // LIS member: already in relative order, stays.
                            lis_cursor -= 1;
                        } else {
                            doc.insert_before(parent, node, Some(anchor))?;
                        }
                    }
                    node
                };
                result[i] = Some(node);
                anchor = node;
            }
        }
    }

    state.keys = new_keys;
    // Every index was filled by exactly one phase above.
    state.nodes = result
        .into_iter()
        .map(|node| node.expect("reconcile phase left a position unfilled"))
        .collect();
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
