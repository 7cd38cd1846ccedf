//! Two-step completion of a work-to-do task.
//!
//! The first `complete` call only records intent (`nb = true`); the second
//! archives the task into the work-done log. Persisted as a single boolean,
//! modelled here as an explicit state so the transition is exhaustive.

use serde::Serialize;

use crate::db::model::{WorkDone, WorkToDo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// `nb = false`.
    Pending,
    /// `nb = true`: the next completion archives the task.
    ConfirmedPending,
    /// The task now lives in the work-done log.
    Archived,
}

/// What the store has to do for a `complete` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStep {
    /// Set `nb = true` and keep the row.
    Confirm,
    /// Insert a work-done row and delete the task, atomically.
    Archive,
}

impl CompletionState {
    pub fn from_nb(nb: bool) -> Self {
        if nb {
            CompletionState::ConfirmedPending
        } else {
            CompletionState::Pending
        }
    }

    pub fn of(task: &WorkToDo) -> Self {
        Self::from_nb(task.nb)
    }

    /// Step required to complete from this state. Archived tasks have no row
    /// left to act on.
    pub fn step(self) -> Option<CompletionStep> {
        match self {
            CompletionState::Pending => Some(CompletionStep::Confirm),
            CompletionState::ConfirmedPending => Some(CompletionStep::Archive),
            CompletionState::Archived => None,
        }
    }

    /// State after a successful `complete`.
    pub fn next(self) -> CompletionState {
        match self {
            CompletionState::Pending => CompletionState::ConfirmedPending,
            CompletionState::ConfirmedPending | CompletionState::Archived => {
                CompletionState::Archived
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CompletionState::Archived)
    }
}

/// Result of a `complete` call.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Completion {
    Confirmed(WorkToDo),
    Archived(WorkDone),
}

impl Completion {
    pub fn state(&self) -> CompletionState {
        match self {
            Completion::Confirmed(_) => CompletionState::ConfirmedPending,
            Completion::Archived(_) => CompletionState::Archived,
        }
    }
}
