// src/session.rs
use log::{debug, info};

use crate::models::{CandidateFilters, RankedCandidate};

/// Work queue states: a load is in flight, a ranked list is being worked
/// through, or the list ran out and a reload is due.
#[derive(Debug)]
pub enum QueueState {
    Loading,
    Ready {
        candidates: Vec<RankedCandidate>,
        cursor: usize,
    },
    Exhausted,
}

/// What `advance` asks of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Cursor moved to the next candidate.
    Advanced,
    /// Queue exhausted; a fresh load is required.
    NeedsReload,
}

/// Explicit session value replacing the source UI's component state:
/// active filters, the queue, and a monotonically increasing load
/// generation. A newer load supersedes the result of an older in-flight
/// one (last writer wins, keyed by the generation token).
#[derive(Debug)]
pub struct EnrichmentSession {
    pub filters: CandidateFilters,
    state: QueueState,
    generation: u64,
    /// Total untreated candidates matching the filters, from the last
    /// successful load's count query.
    pub total_remaining: i64,
}

impl EnrichmentSession {
    pub fn new(filters: CandidateFilters) -> Self {
        Self {
            filters,
            state: QueueState::Loading,
            generation: 0,
            total_remaining: 0,
        }
    }

    pub fn state(&self) -> &QueueState {
        &self.state
    }

    /// Registers a new load and returns its generation token. The current
    /// queue stays visible until the load lands, so a failed load leaves
    /// the previous queue untouched.
    pub fn begin_load(&mut self) -> u64 {
        self.generation += 1;
        debug!("Session: load generation {} started", self.generation);
        self.generation
    }

    /// Replaces the filters and invalidates any in-flight load.
    pub fn set_filters(&mut self, filters: CandidateFilters) {
        self.filters = filters;
        self.generation += 1;
    }

    /// Installs a load result. Returns false (and changes nothing) when
    /// the token is stale, i.e. a newer load or filter change happened
    /// while this one was in flight.
    pub fn apply_loaded(
        &mut self,
        token: u64,
        candidates: Vec<RankedCandidate>,
        total_remaining: i64,
    ) -> bool {
        if token != self.generation {
            info!(
                "Session: discarding stale load (token {}, current generation {})",
                token, self.generation
            );
            return false;
        }
        self.total_remaining = total_remaining;
        self.state = if candidates.is_empty() {
            QueueState::Exhausted
        } else {
            QueueState::Ready {
                candidates,
                cursor: 0,
            }
        };
        true
    }

    pub fn current(&self) -> Option<&RankedCandidate> {
        match &self.state {
            QueueState::Ready { candidates, cursor } => candidates.get(*cursor),
            _ => None,
        }
    }

    /// Moves to the next candidate, or reports exhaustion so the caller
    /// can trigger a fresh load.
    pub fn advance(&mut self) -> AdvanceOutcome {
        match &mut self.state {
            QueueState::Ready { candidates, cursor } if *cursor + 1 < candidates.len() => {
                *cursor += 1;
                AdvanceOutcome::Advanced
            }
            _ => {
                self.state = QueueState::Exhausted;
                AdvanceOutcome::NeedsReload
            }
        }
    }

    /// Search escape hatch: replaces the whole queue with a single
    /// candidate. Distinct from a normal advance.
    pub fn select_single(&mut self, candidate: RankedCandidate) {
        self.generation += 1;
        self.state = QueueState::Ready {
            candidates: vec![candidate],
            cursor: 0,
        };
    }

    /// Candidates left in the queue, current one included.
    pub fn queued(&self) -> usize {
        match &self.state {
            QueueState::Ready { candidates, cursor } => candidates.len() - cursor,
            _ => 0,
        }
    }
}
