//! Diff command implementation.

use super::{id_list, read_json, CommandError};
use livelist_core::{diff_ordered, Document, Edit, Fields};
use serde::Serialize;
use std::path::Path;

/// Edit representation for output.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum EditInfo {
    /// Document only in the new array.
    Added {
        /// Its id, if any.
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Position in the new array.
        index: usize,
        /// The document.
        item: Document,
    },
    /// Document only in the old array.
    Removed {
        /// Its id.
        #[serde(rename = "_id")]
        id: String,
        /// Position in the old array.
        index: usize,
    },
    /// Document present in both with different fields.
    Changed {
        /// Its id.
        #[serde(rename = "_id")]
        id: String,
        /// Position in the new array.
        index: usize,
        /// Fields set.
        #[serde(skip_serializing_if = "Fields::is_empty")]
        set: Fields,
        /// Fields removed.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        unset: Vec<String>,
    },
    /// Document whose relative position changed.
    Moved {
        /// Its id.
        #[serde(rename = "_id")]
        id: String,
        /// Position in the old array.
        from: usize,
        /// Position in the new array.
        to: usize,
    },
}

impl From<Edit> for EditInfo {
    fn from(edit: Edit) -> Self {
        match edit {
            Edit::AddedAt { id, item, index } => EditInfo::Added {
                id: id.map(|id| id.to_string()),
                index,
                item,
            },
            Edit::RemovedAt { id, index, .. } => EditInfo::Removed {
                id: id.to_string(),
                index,
            },
            Edit::ChangedAt {
                id,
                set,
                unset,
                index,
            } => EditInfo::Changed {
                id: id.to_string(),
                index,
                set,
                unset,
            },
            Edit::MovedTo { id, from, to, .. } => EditInfo::Moved {
                id: id.to_string(),
                from,
                to,
            },
        }
    }
}

/// Runs the diff command.
pub fn run(old: &Path, new: &Path, format: &str) -> Result<(), CommandError> {
    let old_docs: Vec<Document> = read_json(old)?;
    let new_docs: Vec<Document> = read_json(new)?;
    let edits = compute(&old_docs, &new_docs);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&edits)?);
        }
        _ => {
            println!("old: {}", id_list(&old_docs));
            println!("new: {}", id_list(&new_docs));
            print_text_output(&edits)?;
        }
    }

    Ok(())
}

/// Computes the edits between two document arrays.
pub fn compute(old: &[Document], new: &[Document]) -> Vec<EditInfo> {
    diff_ordered(old, new).into_iter().map(EditInfo::from).collect()
}

fn print_text_output(edits: &[EditInfo]) -> Result<(), CommandError> {
    if edits.is_empty() {
        println!("no differences");
        return Ok(());
    }
    for edit in edits {
        match edit {
            EditInfo::Added { id, index, item } => {
                let id = id.as_deref().unwrap_or("<draft>");
                println!(
                    "+ {id} at {index} {}",
                    serde_json::to_string(&item.fields)?
                );
            }
            EditInfo::Removed { id, index } => println!("- {id} from {index}"),
            EditInfo::Changed {
                id,
                index,
                set,
                unset,
            } => {
                print!("~ {id} at {index}");
                if !set.is_empty() {
                    print!(" $set {}", serde_json::to_string(set)?);
                }
                if !unset.is_empty() {
                    print!(" $unset [{}]", unset.join(", "));
                }
                println!();
            }
            EditInfo::Moved { id, from, to } => println!("> {id} {from} -> {to}"),
        }
    }
    Ok(())
}
