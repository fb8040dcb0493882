//! Change detection for otherwise idempotent steps.
//!
//! A step carries a [`TriggerSet`]; it must run again whenever any value in
//! its current set differs from the set recorded at its last successful run.
//! Only "last applied" values are kept, there is no history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// TriggerSet
// ---------------------------------------------------------------------------

/// Trigger name → value. Ordered so that persisted ledgers diff cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerSet(BTreeMap<String, String>);

impl TriggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys of `self` whose value is absent from, or different in, `last`.
    pub fn changed_keys<'a>(&'a self, last: &TriggerSet) -> Vec<&'a str> {
        self.0
            .iter()
            .filter(|(k, v)| last.0.get(*k) != Some(*v))
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TriggerSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Decide whether a guarded operation has to run.
///
/// True when the operation has never run (`last` is `None`) or when any key
/// present in `current` has a different (or missing) value in `last`. Keys
/// that only exist in `last` are ignored: dropping a trigger does not by
/// itself force a re-run.
pub fn must_rerun(current: &TriggerSet, last: Option<&TriggerSet>) -> bool {
    match last {
        None => true,
        Some(last) => !current.changed_keys(last).is_empty(),
    }
}

// ---------------------------------------------------------------------------
// TriggerLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedTriggers {
    pub triggers: TriggerSet,
    pub applied_at: DateTime<Utc>,
}

/// Last successfully applied triggers, keyed by step id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerLedger(BTreeMap<String, AppliedTriggers>);

impl TriggerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_applied(&self, step_id: &str) -> Option<&TriggerSet> {
        self.0.get(step_id).map(|a| &a.triggers)
    }

    pub fn must_rerun(&self, step_id: &str, current: &TriggerSet) -> bool {
        must_rerun(current, self.last_applied(step_id))
    }

    /// Record a successful run. Callers invoke this only after the guarded
    /// operation succeeded, so a failure leaves the old values in place and
    /// the next evaluation retries.
    pub fn record_success(&mut self, step_id: &str, triggers: TriggerSet) {
        self.0.insert(
            step_id.to_string(),
            AppliedTriggers {
                triggers,
                applied_at: Utc::now(),
            },
        );
    }

    pub fn forget(&mut self, step_id: &str) -> bool {
        self.0.remove(step_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AppliedTriggers)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn triggers(pairs: &[(&str, &str)]) -> TriggerSet {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn never_run_must_rerun() {
        let current = triggers(&[("cluster", "c1"), ("namespace", "staging")]);
        assert!(must_rerun(&current, None));
    }

    #[test]
    fn all_keys_match_skips() {
        let current = triggers(&[("cluster", "c1"), ("namespace", "staging")]);
        let last = current.clone();
        assert!(!must_rerun(&current, Some(&last)));
    }

    #[test]
    fn single_changed_key_reruns() {
        let current = triggers(&[("cluster", "c2"), ("namespace", "staging")]);
        let last = triggers(&[("cluster", "c1"), ("namespace", "staging")]);
        assert!(must_rerun(&current, Some(&last)));
        assert_eq!(current.changed_keys(&last), vec!["cluster"]);
    }

    #[test]
    fn superset_of_keys_reruns() {
        let current = triggers(&[
            ("cluster", "c1"),
            ("namespace", "staging"),
            ("manifests", "abc"),
        ]);
        let last = triggers(&[("cluster", "c1"), ("namespace", "staging")]);
        assert!(must_rerun(&current, Some(&last)));
        assert_eq!(current.changed_keys(&last), vec!["manifests"]);
    }

    #[test]
    fn dropped_key_alone_does_not_rerun() {
        let current = triggers(&[("cluster", "c1")]);
        let last = triggers(&[("cluster", "c1"), ("namespace", "staging")]);
        assert!(!must_rerun(&current, Some(&last)));
    }

    #[test]
    fn ledger_only_updates_on_recorded_success() {
        let mut ledger = TriggerLedger::new();
        let current = triggers(&[("cluster", "c1")]);
        assert!(ledger.must_rerun("staging/readiness", &current));

        // A failed run records nothing, so the next evaluation still reruns.
        assert!(ledger.must_rerun("staging/readiness", &current));

        ledger.record_success("staging/readiness", current.clone());
        assert!(!ledger.must_rerun("staging/readiness", &current));

        let recreated = triggers(&[("cluster", "c2")]);
        assert!(ledger.must_rerun("staging/readiness", &recreated));
    }

    #[test]
    fn ledger_yaml_roundtrip() {
        let mut ledger = TriggerLedger::new();
        ledger.record_success("production/namespace", triggers(&[("cluster", "c1")]));
        let yaml = serde_yaml::to_string(&ledger).unwrap();
        assert!(yaml.contains("production/namespace"));
        let parsed: TriggerLedger = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, ledger);
    }
}
