//! Condition sets and the aggregate readiness state machine
//!
//! A [`ConditionSet`] names one aggregate ("happy") condition and an ordered
//! list of dependent conditions. Binding it to a status record with
//! [`ConditionSet::manage`] yields a [`ConditionManager`] that marks
//! individual conditions and keeps the aggregate in sync:
//!
//! 1. any dependent False → aggregate False, reason/message from the first
//!    False dependent in declared order
//! 2. else any dependent Unknown (or missing) → aggregate Unknown, reason and
//!    message from the first Unknown dependent
//! 3. else → aggregate True with empty reason/message
//!
//! Everything here is pure in-memory state transition. Callers serialize
//! mutation per status record.

use crate::crd::{Condition, ConditionStatus};
use crate::Error;

/// Type of the aggregate condition on every kf resource
pub const READY: &str = "Ready";

/// Reason used while a collaborator has not observed the latest generation
pub const REASON_RECONCILIATION_PENDING: &str = "ReconciliationPending";

/// Message paired with [`REASON_RECONCILIATION_PENDING`]
pub const MESSAGE_RECONCILIATION_PENDING: &str = "observed generation lags desired generation";

/// Reason used when a sub-resource with our name is controlled by someone else
pub const REASON_NOT_OWNED: &str = "NotOwned";

/// Reason used when a cluster write fails
pub const REASON_RECONCILIATION_ERROR: &str = "ReconciliationError";

/// A named aggregate condition plus the dependents that feed it
///
/// Sets are plain values, built once when a resource type is registered with
/// the controller and shared read-only from then on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionSet {
    happy: String,
    dependents: Vec<String>,
}

impl ConditionSet {
    /// Create a set with the given aggregate type and dependents
    ///
    /// Duplicate dependents and a dependent equal to the aggregate are
    /// dropped; declared order is kept otherwise.
    pub fn new<I, S>(happy: impl Into<String>, dependents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let happy = happy.into();
        let mut deps: Vec<String> = Vec::new();
        for dep in dependents {
            let dep = dep.into();
            if dep != happy && !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        Self {
            happy,
            dependents: deps,
        }
    }

    /// Create a set whose aggregate is [`READY`]
    pub fn living<I, S>(dependents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(READY, dependents)
    }

    /// The aggregate condition type
    pub fn happy(&self) -> &str {
        &self.happy
    }

    /// The dependent condition types, in declared order
    pub fn dependents(&self) -> &[String] {
        &self.dependents
    }

    /// Bind this set to a list of conditions
    pub fn manage<'a>(&'a self, conditions: &'a mut Vec<Condition>) -> ConditionManager<'a> {
        ConditionManager {
            set: self,
            conditions,
        }
    }
}

/// A [`ConditionSet`] bound to one status record's conditions
pub struct ConditionManager<'a> {
    set: &'a ConditionSet,
    conditions: &'a mut Vec<Condition>,
}

impl<'a> ConditionManager<'a> {
    /// Insert every declared condition that is missing as Unknown
    ///
    /// Existing conditions are left alone, so calling this twice in a row is
    /// the same as calling it once.
    pub fn initialize_conditions(&mut self) {
        let set = self.set;
        let types =
            std::iter::once(set.happy.as_str()).chain(set.dependents.iter().map(String::as_str));
        for t in types {
            if !self.conditions.iter().any(|c| c.type_ == t) {
                self.conditions
                    .push(Condition::new(t, ConditionStatus::Unknown, "", ""));
            }
        }
    }

    /// Mark a condition True and clear its reason/message
    pub fn mark_true(&mut self, condition_type: &str) {
        self.mark(condition_type, ConditionStatus::True, "", "");
    }

    /// Mark a condition False with the given reason/message
    pub fn mark_false(&mut self, condition_type: &str, reason: &str, message: &str) {
        self.mark(condition_type, ConditionStatus::False, reason, message);
    }

    /// Mark a condition Unknown with the given reason/message
    pub fn mark_unknown(&mut self, condition_type: &str, reason: &str, message: &str) {
        self.mark(condition_type, ConditionStatus::Unknown, reason, message);
    }

    /// Get a copy of a condition, or None if it was never set
    pub fn get_condition(&self, condition_type: &str) -> Option<Condition> {
        self.conditions
            .iter()
            .find(|c| c.type_ == condition_type)
            .cloned()
    }

    /// Get a copy of the aggregate condition
    pub fn get_happy_condition(&self) -> Option<Condition> {
        self.get_condition(&self.set.happy)
    }

    /// Returns true iff the aggregate condition is True
    pub fn is_happy(&self) -> bool {
        self.get_happy_condition()
            .map(|c| c.is_true())
            .unwrap_or(false)
    }

    /// Returns true if a condition has not settled yet (missing or Unknown)
    pub fn is_pending(&self, condition_type: &str) -> bool {
        self.get_condition(condition_type)
            .map(|c| c.is_unknown())
            .unwrap_or(true)
    }

    fn mark(&mut self, condition_type: &str, status: ConditionStatus, reason: &str, message: &str) {
        self.write(condition_type, status, reason, message);
        if condition_type != self.set.happy {
            self.recompute_happy();
        }
    }

    fn write(
        &mut self,
        condition_type: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) {
        let next = Condition::new(condition_type, status, reason, message);
        match self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition_type)
        {
            Some(existing) if existing.same_state(&next) => {}
            Some(existing) => *existing = next,
            None => self.conditions.push(next),
        }
    }

    fn recompute_happy(&mut self) {
        let mut first_false: Option<(String, String)> = None;
        let mut first_unknown: Option<(String, String)> = None;

        for dep in &self.set.dependents {
            let (status, reason, message) = match self.conditions.iter().find(|c| &c.type_ == dep)
            {
                Some(c) => (c.status, c.reason.clone(), c.message.clone()),
                None => (ConditionStatus::Unknown, String::new(), String::new()),
            };
            match status {
                ConditionStatus::False if first_false.is_none() => {
                    first_false = Some((reason, message));
                }
                ConditionStatus::Unknown if first_unknown.is_none() => {
                    first_unknown = Some((reason, message));
                }
                _ => {}
            }
        }

        let set = self.set;
        let happy = set.happy.as_str();
        if let Some((reason, message)) = first_false {
            self.write(happy, ConditionStatus::False, &reason, &message);
        } else if let Some((reason, message)) = first_unknown {
            self.write(happy, ConditionStatus::Unknown, &reason, &message);
        } else {
            self.write(happy, ConditionStatus::True, "", "");
        }
    }
}

/// A view of a [`ConditionManager`] pinned to one condition type
///
/// `noun` names the sub-resource in human-readable messages (e.g. "Service").
pub struct SingleConditionManager<'a> {
    manager: ConditionManager<'a>,
    condition_type: &'a str,
    noun: &'a str,
}

impl<'a> SingleConditionManager<'a> {
    /// Pin `manager` to `condition_type`
    pub fn new(manager: ConditionManager<'a>, condition_type: &'a str, noun: &'a str) -> Self {
        Self {
            manager,
            condition_type,
            noun,
        }
    }

    /// The condition type this view writes
    pub fn condition_type(&self) -> &str {
        self.condition_type
    }

    /// Mark the condition True
    pub fn mark_success(&mut self) {
        self.manager.mark_true(self.condition_type);
    }

    /// Mark the condition False
    pub fn mark_false(&mut self, reason: &str, message: &str) {
        self.manager.mark_false(self.condition_type, reason, message);
    }

    /// Mark the condition Unknown
    pub fn mark_unknown(&mut self, reason: &str, message: &str) {
        self.manager
            .mark_unknown(self.condition_type, reason, message);
    }

    /// Mark the condition Unknown because the observed object is stale
    pub fn mark_reconciliation_pending(&mut self) {
        self.mark_unknown(REASON_RECONCILIATION_PENDING, MESSAGE_RECONCILIATION_PENDING);
    }

    /// Mark the condition False because `name` exists but is not ours
    pub fn mark_child_not_owned(&mut self, name: &str) {
        let message = format!(
            "There is an existing {} {:?} that we do not own.",
            self.noun, name
        );
        self.mark_false(REASON_NOT_OWNED, &message);
    }

    /// Mark the condition False because the desired object could not be built
    pub fn mark_template_error(&mut self, err: &Error) {
        let message = format!("Couldn't populate the {} template: {}", self.noun, err);
        self.mark_false(err.reason(), &message);
    }

    /// Mark the condition False because a cluster write failed
    ///
    /// `action` is a verb phrase such as "updating" or "creating".
    pub fn mark_reconciliation_error(&mut self, action: &str, err: &Error) {
        let message = format!("Error occurred while {} {}: {}", action, self.noun, err);
        self.mark_false(REASON_RECONCILIATION_ERROR, &message);
    }

    /// Returns true if the condition has not settled yet
    pub fn is_pending(&self) -> bool {
        self.manager.is_pending(self.condition_type)
    }

    /// Get a copy of the condition
    pub fn get_condition(&self) -> Option<Condition> {
        self.manager.get_condition(self.condition_type)
    }
}
