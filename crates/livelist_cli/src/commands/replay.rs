//! Replay command implementation.
//!
//! A scenario seeds an in-memory collection, binds a synced list to it and
//! then runs a sequence of steps: remote batches published by the
//! collection, consumer edits to the list, explicit store calls and event
//! loop control. After every step the list contents, guard state and new
//! store calls are recorded.

use super::{id_list, read_json, CommandError};
use livelist_core::{ChangeEvent, CoreError, DocId, Document, Fields, KeyedOrderedList};
use livelist_engine::{
    EchoMode, GuardState, MemoryCollection, ModifierKind, StoreCall, SyncResult, SyncStats,
    SyncedList, Target,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A replay scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Collection name.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Whether local edits are written back.
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,
    /// When the collection reports writes back.
    #[serde(default)]
    pub echo: EchoMode,
    /// Documents in the collection before the list is created.
    #[serde(default)]
    pub documents: Vec<Document>,
    /// Steps to run.
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_collection() -> String {
    "items".to_string()
}

fn default_auto_sync() -> bool {
    true
}

/// Store operation names accepted by `fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOp {
    /// `insert`.
    Insert,
    /// `update`.
    Update,
    /// `remove`.
    Remove,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            StoreOp::Insert => "insert",
            StoreOp::Update => "update",
            StoreOp::Remove => "remove",
        }
    }
}

/// A single scenario step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Publish a batch of remote events from the collection.
    Remote {
        /// The events, in order.
        events: Vec<ChangeEvent>,
    },
    /// Insert a document into the list, at the end by default.
    Insert {
        /// The document, usually a draft.
        doc: Document,
        /// Insert position.
        #[serde(default)]
        index: Option<usize>,
    },
    /// Set fields of a listed document.
    Set {
        /// Target document.
        id: DocId,
        /// Fields to set.
        fields: Fields,
    },
    /// Remove fields of a listed document.
    Unset {
        /// Target document.
        id: DocId,
        /// Field names.
        fields: Vec<String>,
    },
    /// Remove a document from the list.
    Remove {
        /// Target document.
        id: DocId,
    },
    /// Move a document before another one, or to the end.
    Move {
        /// Moved document.
        id: DocId,
        /// Anchor.
        #[serde(default)]
        before: Option<DocId>,
    },
    /// Save documents through the list, or every listed document.
    Save {
        /// Documents to save; all listed documents if absent.
        #[serde(default)]
        docs: Option<Vec<Document>>,
        /// Remove the named fields instead of setting them.
        #[serde(default)]
        unset: bool,
    },
    /// Remove documents from the store by key, or every listed document.
    Delete {
        /// Keys to remove; all listed documents if absent.
        #[serde(default)]
        ids: Option<Vec<Option<DocId>>>,
    },
    /// Make the next store call of the given kind fail.
    Fail {
        /// The store operation.
        store_op: StoreOp,
        /// Error message.
        #[serde(default = "default_failure")]
        message: String,
    },
    /// Run one event loop turn.
    Tick,
    /// Run the event loop until idle.
    Settle,
    /// Deliver write confirmations held by the collection.
    Confirm,
    /// Stop the list.
    Stop,
}

fn default_failure() -> String {
    "injected failure".to_string()
}

impl Step {
    /// Returns the step's operation name.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Remote { .. } => "remote",
            Step::Insert { .. } => "insert",
            Step::Set { .. } => "set",
            Step::Unset { .. } => "unset",
            Step::Remove { .. } => "remove",
            Step::Move { .. } => "move",
            Step::Save { .. } => "save",
            Step::Delete { .. } => "delete",
            Step::Fail { .. } => "fail",
            Step::Tick => "tick",
            Step::Settle => "settle",
            Step::Confirm => "confirm",
            Step::Stop => "stop",
        }
    }
}

/// What a step left behind.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Step number, from 1.
    pub step: usize,
    /// Operation name.
    pub op: &'static str,
    /// Ids in the list after the step.
    pub ids: Vec<Option<DocId>>,
    /// Guard state after the step.
    pub guard: &'static str,
    /// Store calls issued during the step.
    pub new_calls: Vec<StoreCall>,
    /// Error raised by the step, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a whole replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    /// One entry per step.
    pub steps: Vec<StepReport>,
    /// Final list contents.
    pub documents: Vec<Document>,
    /// Final collection contents.
    pub store: Vec<Document>,
    /// Every store call, in order.
    pub calls: Vec<StoreCall>,
    /// Engine statistics.
    pub stats: SyncStats,
}

/// Runs the replay command.
pub fn run(script: &Path, format: &str, manual: bool) -> Result<(), CommandError> {
    let scenario: Scenario = read_json(script)?;
    info!(
        script = %script.display(),
        steps = scenario.steps.len(),
        "Replaying scenario"
    );
    let report = execute(&scenario, manual)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => print_text_output(&report),
    }

    Ok(())
}

/// Runs a scenario and collects its report.
///
/// Errors raised by individual steps are recorded in the report; only a
/// failure to set the list up is returned.
pub fn execute(scenario: &Scenario, manual: bool) -> Result<ReplayReport, CommandError> {
    let collection = Arc::new(MemoryCollection::with_documents(
        scenario.collection.clone(),
        scenario.documents.clone(),
    ));
    collection.set_echo(scenario.echo);

    let list = SyncedList::builder()
        .collection(Arc::clone(&collection))
        .auto_sync(scenario.auto_sync)
        .build()?;
    if !manual {
        list.settle()?;
    }

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (n, step) in scenario.steps.iter().enumerate() {
        let calls_before = collection.calls().len();
        let mut result = run_step(&list, &collection, step);
        if !manual && result.is_ok() && !matches!(step, Step::Tick | Step::Stop) {
            result = list.settle().map(|_| ());
        }
        if let Err(err) = &result {
            debug!(step = n + 1, op = step.name(), error = %err, "Step failed");
        }

        steps.push(StepReport {
            step: n + 1,
            op: step.name(),
            ids: list.read(|l| l.iter().map(|doc| doc.id().cloned()).collect()),
            guard: guard_label(list.guard_state()),
            new_calls: collection.calls().split_off(calls_before),
            error: result.err().map(|err| err.to_string()),
        });
    }

    Ok(ReplayReport {
        steps,
        documents: list.documents(),
        store: collection.documents(),
        calls: collection.calls(),
        stats: list.stats(),
    })
}

fn run_step(list: &SyncedList, collection: &MemoryCollection, step: &Step) -> SyncResult<()> {
    match step {
        Step::Remote { events } => collection.publish(events.clone()),
        Step::Insert { doc, index } => edit(list, |l| {
            let at = index.unwrap_or(l.len());
            l.insert(at, doc.clone())
        }),
        Step::Set { id, fields } => edit(list, |l| {
            let doc = l.find_mut(id).ok_or_else(|| not_in_list(id))?;
            for (name, value) in fields {
                doc.set(name.clone(), value.clone());
            }
            Ok(())
        }),
        Step::Unset { id, fields } => edit(list, |l| {
            let doc = l.find_mut(id).ok_or_else(|| not_in_list(id))?;
            for name in fields {
                doc.unset(name);
            }
            Ok(())
        }),
        Step::Remove { id } => edit(list, |l| {
            l.remove_by_id(id).map(|_| ()).ok_or_else(|| not_in_list(id))
        }),
        Step::Move { id, before } => edit(list, |l| l.move_before(id, before.as_ref()).map(|_| ())),
        Step::Save { docs, unset } => {
            let kind = if *unset {
                ModifierKind::Unset
            } else {
                ModifierKind::Set
            };
            let target = match docs {
                Some(docs) if docs.len() == 1 => Target::One(docs[0].clone()),
                Some(docs) => Target::Many(docs.clone()),
                None => Target::All,
            };
            list.save(target, kind).map(|_| ())
        }
        Step::Delete { ids } => {
            let target = match ids {
                Some(ids) if ids.len() == 1 => Target::One(ids[0].clone()),
                Some(ids) => Target::Many(ids.clone()),
                None => Target::All,
            };
            list.remove(target).map(|_| ())
        }
        Step::Fail { store_op, message } => {
            collection.fail_next(store_op.name(), message.clone());
            Ok(())
        }
        Step::Tick => list.event_loop().run_turn().map(|_| ()),
        Step::Settle => list.settle().map(|_| ()),
        Step::Confirm => {
            let released = collection.release_held();
            debug!(released, "Released held confirmations");
            Ok(())
        }
        Step::Stop => {
            list.stop();
            Ok(())
        }
    }
}

fn edit(
    list: &SyncedList,
    f: impl FnOnce(&mut KeyedOrderedList) -> Result<(), CoreError>,
) -> SyncResult<()> {
    list.mutate(f)?;
    Ok(())
}

fn not_in_list(id: &DocId) -> CoreError {
    CoreError::DocumentNotFound { id: id.clone() }
}

fn guard_label(state: GuardState) -> &'static str {
    match state {
        GuardState::Idle => "idle",
        GuardState::Suppressed => "suppressed",
    }
}

fn print_text_output(report: &ReplayReport) {
    for step in &report.steps {
        let ids: Vec<String> = step
            .ids
            .iter()
            .map(|id| id.as_ref().map_or_else(|| "<draft>".to_string(), ToString::to_string))
            .collect();
        print!(
            "#{:<3} {:<8} [{}] {}",
            step.step,
            step.op,
            ids.join(", "),
            step.guard
        );
        if !step.new_calls.is_empty() {
            let calls: Vec<&str> = step.new_calls.iter().map(StoreCall::op).collect();
            print!(" calls: {}", calls.join(" "));
        }
        if let Some(error) = &step.error {
            print!(" error: {error}");
        }
        println!();
    }

    println!();
    println!("list:  {}", id_list(&report.documents));
    println!("store: {}", id_list(&report.store));
    println!("store calls: {}", report.calls.len());
    println!(
        "batches applied: {}, events applied: {}, detection cycles: {}",
        report.stats.batches_applied, report.stats.events_applied, report.stats.detection_cycles
    );
    if let Some(error) = &report.stats.last_error {
        println!("last error: {error}");
    }
}
