//! Ordered diff between two document sequences.
//!
//! Given an old and a new sequence of keyed documents, the diff reports
//! which documents were added, removed, changed in place, or moved.
//! Moves are minimal: the longest run of common documents whose relative
//! order is unchanged stays put and everything else is reported as moved.
//!
//! Edits are reported in this order:
//! 1. `RemovedAt` for every old document missing from the new sequence,
//!    by ascending old index.
//! 2. For each new index in ascending order: `AddedAt`, or `MovedTo`
//!    followed by `ChangedAt` when both apply.
//!
//! Documents without an id, and any repeat occurrence of an id in the new
//! sequence, are always reported as added. Drafts in the old sequence have
//! no identity to remove by and are ignored.

use crate::document::{DocId, Document, Fields};
use std::collections::{HashMap, HashSet};

/// A single edit between two document sequences.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// A document present only in the new sequence.
    AddedAt {
        /// Its id, `None` for drafts.
        id: Option<DocId>,
        /// The new document.
        item: Document,
        /// Position in the new sequence.
        index: usize,
    },
    /// A document present only in the old sequence.
    RemovedAt {
        /// Its id.
        id: DocId,
        /// The old document.
        item: Document,
        /// Position in the old sequence.
        index: usize,
    },
    /// A document present in both with different fields.
    ChangedAt {
        /// Its id.
        id: DocId,
        /// Fields that are new or have a new value.
        set: Fields,
        /// Fields that no longer exist.
        unset: Vec<String>,
        /// Position in the new sequence.
        index: usize,
    },
    /// A document whose relative order changed.
    MovedTo {
        /// Its id.
        id: DocId,
        /// The document as it appears in the new sequence.
        item: Document,
        /// Position in the old sequence.
        from: usize,
        /// Position in the new sequence.
        to: usize,
    },
}

impl Edit {
    /// Returns the id of the document the edit concerns, if any.
    pub fn id(&self) -> Option<&DocId> {
        match self {
            Edit::AddedAt { id, .. } => id.as_ref(),
            Edit::RemovedAt { id, .. } | Edit::ChangedAt { id, .. } | Edit::MovedTo { id, .. } => {
                Some(id)
            }
        }
    }
}

/// Computes edits between two ordered document sequences.
pub trait DiffPrimitive: Send + Sync {
    /// Returns the edits that turn `old` into `new`.
    fn diff(&self, old: &[Document], new: &[Document]) -> Vec<Edit>;
}

/// The default diff primitive, backed by [`diff_ordered`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedDiff;

impl DiffPrimitive for OrderedDiff {
    fn diff(&self, old: &[Document], new: &[Document]) -> Vec<Edit> {
        diff_ordered(old, new)
    }
}

/// Computes the edits that turn `old` into `new`.
pub fn diff_ordered(old: &[Document], new: &[Document]) -> Vec<Edit> {
    let old_index = first_positions(old);
    let new_index = first_positions(new);
    let mut edits = Vec::new();

    for (index, doc) in old.iter().enumerate() {
        if let Some(id) = doc.id() {
            if old_index.get(id) == Some(&index) && !new_index.contains_key(id) {
                edits.push(Edit::RemovedAt {
                    id: id.clone(),
                    item: doc.clone(),
                    index,
                });
            }
        }
    }

    // (new position, old position) for documents present in both.
    let common: Vec<(usize, usize)> = new
        .iter()
        .enumerate()
        .filter_map(|(to, doc)| {
            let id = doc.id()?;
            if new_index.get(id) != Some(&to) {
                return None;
            }
            old_index.get(id).map(|&from| (to, from))
        })
        .collect();
    let old_positions: Vec<usize> = common.iter().map(|&(_, from)| from).collect();
    let unmoved: HashSet<usize> = longest_increasing_run(&old_positions)
        .into_iter()
        .map(|k| common[k].0)
        .collect();

    for (to, doc) in new.iter().enumerate() {
        let matched = doc
            .id()
            .filter(|id| new_index.get(*id) == Some(&to))
            .and_then(|id| old_index.get(id).map(|&from| (id, from)));

        let Some((id, from)) = matched else {
            edits.push(Edit::AddedAt {
                id: doc.id().cloned(),
                item: doc.clone(),
                index: to,
            });
            continue;
        };

        if !unmoved.contains(&to) {
            edits.push(Edit::MovedTo {
                id: id.clone(),
                item: doc.clone(),
                from,
                to,
            });
        }

        let (set, unset) = diff_fields(&old[from].fields, &doc.fields);
        if !set.is_empty() || !unset.is_empty() {
            edits.push(Edit::ChangedAt {
                id: id.clone(),
                set,
                unset,
                index: to,
            });
        }
    }

    edits
}

/// Splits the difference between two field maps into fields to set and
/// fields to unset.
pub fn diff_fields(old: &Fields, new: &Fields) -> (Fields, Vec<String>) {
    let set = new
        .iter()
        .filter(|(name, value)| old.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let unset = old
        .keys()
        .filter(|name| !new.contains_key(*name))
        .cloned()
        .collect();
    (set, unset)
}

fn first_positions(docs: &[Document]) -> HashMap<&DocId, usize> {
    let mut positions = HashMap::with_capacity(docs.len());
    for (index, doc) in docs.iter().enumerate() {
        if let Some(id) = doc.id() {
            positions.entry(id).or_insert(index);
        }
    }
    positions
}

/// Returns indices into `values` forming a longest strictly increasing
/// subsequence. `values` must not contain duplicates.
fn longest_increasing_run(values: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; values.len()];

    for (k, &value) in values.iter().enumerate() {
        let pos = tails.partition_point(|&t| values[t] < value);
        if pos > 0 {
            prev[k] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(k);
        } else {
            tails[pos] = k;
        }
    }

    let mut run = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(k) = cursor {
        run.push(k);
        cursor = prev[k];
    }
    run.reverse();
    run
}
