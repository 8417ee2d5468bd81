//! Module: batch
//! Responsibility: coalesce the notifications of a mutation cascade and
//! deliver them to the observer once the outermost batch closes.
//! Does not own: the mutations themselves.
//! Boundary: every structural change queues a `ModelEvent` through `notify`.
//!
//! Invariants:
//! - Events are delivered in the order they were queued.
//! - The observer is never invoked while a batch is open.
//! - Re-entrant calls made by the observer queue their events behind the
//!   current one; the delivering loop drains them before returning.
//! - Rolling back changes the observer has already seen queues events that
//!   describe the rollback; unseen ones are simply dropped.

mod event;
mod observer;
mod revert;

#[cfg(test)]
mod tests;

use crate::{
    error::ModelError,
    model::{ForeignKeyId, Model},
};
use std::collections::VecDeque;
use tracing::{debug, trace};

pub use event::ModelEvent;
pub use observer::{EventLog, ModelObserver};

pub(crate) use revert::reverting_events;

///
/// BatchState
///

#[derive(Debug, Default)]
pub(crate) struct BatchState {
    pub(crate) depth: usize,
    pub(crate) pending: VecDeque<ModelEvent>,
    /// Events handed to the observer so far.
    pub(crate) delivered: u64,
    dispatching: bool,
}

///
/// BatchHandle
///
/// An open batch started with `Model::start_batch`. It must be closed with
/// `run`; the model keeps queueing notifications until it is.
///

#[derive(Debug)]
#[must_use = "an open batch holds back every notification until `run` is called"]
pub struct BatchHandle {
    _private: (),
}

impl BatchHandle {
    /// Close the batch and return what `fk` refers to afterwards.
    ///
    /// Notifications are delivered when this closes the outermost batch.
    /// The returned id follows any merge or observer replacement and is
    /// `None` when the relationship no longer exists.
    pub fn run(
        self,
        model: &mut Model,
        fk: Option<ForeignKeyId>,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        model.end_batch()?;

        Ok(fk
            .map(|fk| model.resolve_replacement(fk))
            .filter(|fk| model.contains_foreign_key(*fk)))
    }
}

impl Model {
    /// Open a nestable batch.
    pub fn start_batch(&mut self) -> BatchHandle {
        self.batch.depth += 1;
        BatchHandle { _private: () }
    }

    #[must_use]
    pub const fn batch_depth(&self) -> usize {
        self.batch.depth
    }

    pub(crate) fn run_batch<T>(
        &mut self,
        apply: impl FnOnce(&mut Self) -> Result<T, ModelError>,
    ) -> Result<T, ModelError> {
        self.batch.depth += 1;
        let result = apply(self);
        let closed = self.end_batch();

        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(err), _) | (Ok(_), Err(err)) => Err(err),
        }
    }

    /// Deliver whatever is queued unless a batch is still open.
    pub(crate) fn flush(&mut self) -> Result<(), ModelError> {
        self.run_batch(|_| Ok(()))
    }

    fn end_batch(&mut self) -> Result<(), ModelError> {
        self.batch.depth = self.batch.depth.saturating_sub(1);
        if self.batch.depth > 0 {
            return Ok(());
        }

        self.dispatch()
    }

    pub(crate) fn notify(&mut self, event: ModelEvent) {
        trace!(event = event.kind(), depth = self.batch.depth, "event queued");
        self.batch.pending.push_back(event);
    }

    // Deliver queued events. A nested call while already delivering returns
    // at once; the outer loop picks up whatever it queued.
    fn dispatch(&mut self) -> Result<(), ModelError> {
        if self.batch.dispatching {
            return Ok(());
        }
        if !self.config.dispatch_notifications {
            self.batch.pending.clear();
            return Ok(());
        }
        let Some(mut observer) = self.observer.take() else {
            self.batch.pending.clear();
            return Ok(());
        };

        self.batch.dispatching = true;
        let mut outcome = Ok(());
        while let Some(event) = self.batch.pending.pop_front() {
            self.batch.delivered += 1;
            match observer.on_event(self, &event) {
                Ok(Some(replacement)) => {
                    if let Some(fk) = event.foreign_key()
                        && fk != replacement
                    {
                        debug!(fk = %fk, replacement = %replacement, "observer replaced relationship");
                        self.record_replacement(fk, replacement);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    self.batch.pending.clear();
                    outcome = Err(err);
                    break;
                }
            }
        }
        self.batch.dispatching = false;

        if self.observer.is_none() {
            self.observer = Some(observer);
        }

        outcome
    }

    pub(crate) fn record_replacement(&mut self, from: ForeignKeyId, to: ForeignKeyId) {
        if from != to {
            self.graph.replacements.insert(from, to);
        }
    }

    /// Follow merges and observer replacements starting at `fk`.
    #[must_use]
    pub fn resolve_replacement(&self, fk: ForeignKeyId) -> ForeignKeyId {
        let mut current = fk;
        for _ in 0..=self.graph.replacements.len() {
            match self.graph.replacements.get(&current) {
                Some(next) if *next != current => current = *next,
                _ => break,
            }
        }

        current
    }
}
