//! The asynchronous communication stage: many outstanding message groups,
//! one stream of ready handlers.
//!
//! Handlers are registered by id; the stage does not own their requests.
//! `advance` polls each registered handler through a caller-supplied
//! predicate (typically `CommGroup::check`) and removes and returns the ids
//! whose transactions completed. Completion order is message-arrival order,
//! so callers must not rely on it.

/// How far one `advance` call drives the stage.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StageAdvance {
    /// Return as soon as one handler is ready.
    Any,
    /// Return every handler that is ready right now (at least one).
    Some,
    /// Drain the stage: return only when no requests remain outstanding.
    All,
}

/// Tracks which handlers are suspended on in-flight communication.
#[derive(Default, Debug)]
pub struct CommStage {
    waiting: Vec<usize>,
}

impl CommStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler with outstanding requests.
    ///
    /// A handler must not be attached twice; it becomes ready exactly once
    /// per transaction.
    pub fn attach(&mut self, id: usize) {
        debug_assert!(!self.waiting.contains(&id), "handler attached twice");
        self.waiting.push(id);
    }

    pub fn has_outstanding(&self) -> bool {
        !self.waiting.is_empty()
    }

    pub fn outstanding(&self) -> usize {
        self.waiting.len()
    }

    /// Poll outstanding handlers with `poll` (true = transaction complete)
    /// and return the ready ones per `mode`.
    ///
    /// Blocks (by spinning with a thread yield) until the mode's demand can
    /// be met; returns empty only when nothing is outstanding.
    pub fn advance<F>(&mut self, mode: StageAdvance, mut poll: F) -> Vec<usize>
    where
        F: FnMut(usize) -> bool,
    {
        let mut ready = Vec::new();
        if self.waiting.is_empty() {
            return ready;
        }
        loop {
            let mut i = 0;
            while i < self.waiting.len() {
                let id = self.waiting[i];
                if poll(id) {
                    self.waiting.swap_remove(i);
                    ready.push(id);
                    if mode == StageAdvance::Any {
                        return ready;
                    }
                } else {
                    i += 1;
                }
            }
            let satisfied = match mode {
                StageAdvance::Any | StageAdvance::Some => !ready.is_empty(),
                StageAdvance::All => self.waiting.is_empty(),
            };
            if satisfied || self.waiting.is_empty() {
                return ready;
            }
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn advance_some_returns_all_ready() {
        let mut stage = CommStage::new();
        stage.attach(1);
        stage.attach(2);
        stage.attach(3);
        let mut done: HashMap<usize, bool> = [(1, true), (2, false), (3, true)].into();
        let mut ready = stage.advance(StageAdvance::Some, |id| done[&id]);
        ready.sort_unstable();
        assert_eq!(ready, vec![1, 3]);
        assert_eq!(stage.outstanding(), 1);
        done.insert(2, true);
        assert_eq!(stage.advance(StageAdvance::Some, |id| done[&id]), vec![2]);
        assert!(!stage.has_outstanding());
    }

    #[test]
    fn advance_any_returns_one() {
        let mut stage = CommStage::new();
        stage.attach(7);
        stage.attach(8);
        let ready = stage.advance(StageAdvance::Any, |_| true);
        assert_eq!(ready.len(), 1);
        assert_eq!(stage.outstanding(), 1);
    }

    #[test]
    fn advance_all_drains() {
        let mut stage = CommStage::new();
        for id in 0..4 {
            stage.attach(id);
        }
        // Handlers complete on their second poll.
        let mut polls = HashMap::new();
        let mut ready = stage.advance(StageAdvance::All, |id| {
            let n = polls.entry(id).or_insert(0);
            *n += 1;
            *n >= 2
        });
        ready.sort_unstable();
        assert_eq!(ready, vec![0, 1, 2, 3]);
        assert!(!stage.has_outstanding());
    }

    #[test]
    fn empty_stage_returns_immediately() {
        let mut stage = CommStage::new();
        assert!(stage.advance(StageAdvance::Some, |_| true).is_empty());
    }
}
