//! Interval index over track temporal extents.
//!
//! The editing UI asks "which tracks are active at frame F" on every frame
//! change, so the store keeps a centered interval tree keyed on
//! `[begin, end]`. Mutations only set a dirty bit; the tree is rebuilt
//! lazily on the next query.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::model::{Frame, TrackId};

#[derive(Debug, Clone, Copy)]
struct Entry {
    begin: Frame,
    end: Frame,
    id: TrackId,
}

#[derive(Debug)]
struct Node {
    center: Frame,
    /// Intervals crossing `center`, sorted ascending by begin.
    by_begin: Vec<Entry>,
    /// Same intervals, sorted descending by end.
    by_end: Vec<Entry>,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

/// A rebuild-on-demand interval tree.
#[derive(Debug, Default)]
pub struct IntervalIndex {
    entries: BTreeMap<TrackId, (Frame, Frame)>,
    tree: RefCell<Option<Box<Node>>>,
    dirty: RefCell<bool>,
}

impl IntervalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update the interval for `id`.
    pub fn set(&mut self, id: TrackId, begin: Frame, end: Frame) {
        self.entries.insert(id, (begin, end));
        *self.dirty.borrow_mut() = true;
    }

    /// Remove the interval for `id`.
    pub fn remove(&mut self, id: TrackId) {
        if self.entries.remove(&id).is_some() {
            *self.dirty.borrow_mut() = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All ids whose interval contains `frame`. Sorted by id for
    /// deterministic iteration order.
    pub fn stab(&self, frame: Frame) -> Vec<TrackId> {
        if *self.dirty.borrow() {
            self.rebuild();
        }
        let mut out = Vec::new();
        if let Some(root) = self.tree.borrow().as_deref() {
            query(root, frame, &mut out);
        }
        out.sort_unstable();
        out
    }

    fn rebuild(&self) {
        let entries: Vec<Entry> = self
            .entries
            .iter()
            .map(|(id, (begin, end))| Entry {
                begin: *begin,
                end: *end,
                id: *id,
            })
            .collect();
        *self.tree.borrow_mut() = build(entries);
        *self.dirty.borrow_mut() = false;
        log::trace!("Interval index rebuilt ({} entries)", self.entries.len());
    }
}

fn build(entries: Vec<Entry>) -> Option<Box<Node>> {
    if entries.is_empty() {
        return None;
    }
    let mut midpoints: Vec<Frame> = entries
        .iter()
        .map(|e| e.begin + (e.end - e.begin) / 2)
        .collect();
    midpoints.sort_unstable();
    let center = midpoints[midpoints.len() / 2];

    let mut crossing = Vec::new();
    let mut left = Vec::new();
    let mut right = Vec::new();
    for e in entries {
        if e.end < center {
            left.push(e);
        } else if e.begin > center {
            right.push(e);
        } else {
            crossing.push(e);
        }
    }

    let mut by_begin = crossing.clone();
    by_begin.sort_unstable_by_key(|e| e.begin);
    let mut by_end = crossing;
    by_end.sort_unstable_by_key(|e| std::cmp::Reverse(e.end));

    Some(Box::new(Node {
        center,
        by_begin,
        by_end,
        left: build(left),
        right: build(right),
    }))
}

fn query(node: &Node, frame: Frame, out: &mut Vec<TrackId>) {
    if frame < node.center {
        // Crossing intervals starting at or before `frame` contain it.
        for e in &node.by_begin {
            if e.begin > frame {
                break;
            }
            out.push(e.id);
        }
        if let Some(left) = &node.left {
            query(left, frame, out);
        }
    } else if frame > node.center {
        for e in &node.by_end {
            if e.end < frame {
                break;
            }
            out.push(e.id);
        }
        if let Some(right) = &node.right {
            query(right, frame, out);
        }
    } else {
        for e in &node.by_begin {
            out.push(e.id);
        }
    }
}
