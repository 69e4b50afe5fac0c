use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::types::Job;

/// How many retired job ids to remember for stale-echo suppression.
const RETIRED_CAPACITY: usize = 256;

/// The local collection of jobs believed to still be in flight.
///
/// Keyed by job id; the order of first insertion is preserved. The set
/// never holds a terminal job: a terminal observation removes its entry
/// instead of leaving a stale record. Retired ids are remembered (with the
/// timestamp of the terminal observation) so that a later non-terminal
/// echo from the slower update channel cannot resurrect the entry, while a
/// genuinely new job instance created after the terminal one can.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveJobSet {
    jobs: Vec<Job>,
    retired: HashMap<String, DateTime<Utc>>,
    retired_order: VecDeque<String>,
}

impl ActiveJobSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.iter().any(|j| j.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Merge a single status observation.
    ///
    /// Terminal → remove any entry with that id (whether or not one
    /// existed) and retire the id. Non-terminal → upsert: insert if
    /// absent, overwrite in place if present, keeping the position of
    /// first insertion. Returns `true` iff the observation changed state —
    /// replaying an observation returns `false`, which makes batch
    /// replays no-ops.
    pub fn apply(&mut self, job: Job) -> bool {
        if job.status.is_terminal() {
            if self.retired.contains_key(&job.id) {
                return false;
            }
            self.retire(job.id.clone(), job.updated_at);
            self.jobs.retain(|j| j.id != job.id);
            return true;
        }

        // A non-terminal echo for a retired id is stale unless the job was
        // created after the terminal observation (a new instance reusing
        // the id).
        if let Some(retired_at) = self.retired.get(&job.id) {
            if job.created_at <= *retired_at {
                return false;
            }
            self.unretire(&job.id);
        }

        match self.jobs.iter_mut().find(|j| j.id == job.id) {
            Some(slot) => {
                if *slot == job {
                    false
                } else {
                    *slot = job;
                    true
                }
            }
            None => {
                self.jobs.push(job);
                true
            }
        }
    }

    /// Merge a sequence of observations in order, returning how many
    /// changed state.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = Job>) -> usize {
        incoming.into_iter().filter(|j| self.apply(j.clone())).count()
    }

    fn retire(&mut self, id: String, at: DateTime<Utc>) {
        if self.retired_order.len() == RETIRED_CAPACITY {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
            }
        }
        self.retired_order.push_back(id.clone());
        self.retired.insert(id, at);
    }

    fn unretire(&mut self, id: &str) {
        self.retired.remove(id);
        self.retired_order.retain(|r| r != id);
    }
}
