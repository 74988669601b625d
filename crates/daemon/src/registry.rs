// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job registry: label -> job record, insertion order preserved (§4.3).

use indexmap::IndexMap;
use svpr_core::Job;

/// The mapping from job label to job record.
///
/// Iteration order is insertion order, which `GetJobs` and shutdown both
/// depend on. Lookup by label is the only content query the engine needs.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: IndexMap<String, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.jobs.contains_key(label)
    }

    pub fn get(&self, label: &str) -> Option<&Job> {
        self.jobs.get(label)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut Job> {
        self.jobs.get_mut(label)
    }

    /// Insert a new job. Fails (returns `false`, leaves the registry
    /// untouched) if the label is already present.
    #[must_use]
    pub fn insert(&mut self, job: Job) -> bool {
        if self.jobs.contains_key(job.label()) {
            return false;
        }
        self.jobs.insert(job.label().to_string(), job);
        true
    }

    /// Remove a job record. The caller is responsible for unregistering its
    /// event sources and closing its descriptors before calling this.
    pub fn remove(&mut self, label: &str) -> Option<Job> {
        self.jobs.shift_remove(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Job)> {
        self.jobs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Job)> {
        self.jobs.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs with a live child process (the "child count" of §3/§5).
    pub fn running_count(&self) -> usize {
        self.jobs.values().filter(|j| j.runtime.is_running()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svpr_core::JobConfig;

    fn job(label: &str) -> Job {
        Job::new(JobConfig {
            label: label.to_string(),
            program_arguments: vec!["/bin/true".into()],
            ..Default::default()
        })
    }

    #[test]
    fn duplicate_label_rejected() {
        let mut reg = JobRegistry::new();
        assert!(reg.insert(job("a")));
        assert!(!reg.insert(job("a")));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut reg = JobRegistry::new();
        for label in ["c", "a", "b"] {
            assert!(reg.insert(job(label)));
        }
        let order: Vec<&str> = reg.labels().collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn remove_then_contains_is_false() {
        let mut reg = JobRegistry::new();
        reg.insert(job("a"));
        assert!(reg.remove("a").is_some());
        assert!(!reg.contains("a"));
        assert!(reg.remove("a").is_none());
    }
}
