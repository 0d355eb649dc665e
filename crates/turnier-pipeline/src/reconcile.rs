//! Reconciliation of extracted candidates against the persisted set.

use std::collections::HashMap;

use uuid::Uuid;

use turnier_core::{Candidate, IdentityKey, Tournament};

/// One upsert the pipeline should apply. Every planned operation needs
/// enrichment: inserts always do, and updates only exist when a descriptive
/// field actually changed.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedOp {
    Insert(Candidate),
    Update {
        id: Uuid,
        candidate: Candidate,
        prior_analysis: Option<String>,
    },
}

impl PlannedOp {
    pub fn candidate(&self) -> &Candidate {
        match self {
            PlannedOp::Insert(candidate) => candidate,
            PlannedOp::Update { candidate, .. } => candidate,
        }
    }
}

#[derive(Debug, Default)]
pub struct Plan {
    pub ops: Vec<PlannedOp>,
    /// Candidates whose stored record already matches field for field.
    pub unchanged: usize,
    /// Same-key candidates discarded in favor of a later extraction.
    pub duplicates: usize,
}

/// Classify candidates into inserts, updates, and no-ops against the stored
/// set. When two candidates share an identity key, the later one in
/// extraction order wins; the earlier is dropped and counted, not an error.
/// The resulting plan holds at most one operation per identity key.
pub fn reconcile(
    candidates: impl IntoIterator<Item = Candidate>,
    persisted: &[Tournament],
) -> Plan {
    let mut deduped: Vec<Candidate> = Vec::new();
    let mut positions: HashMap<IdentityKey, usize> = HashMap::new();
    let mut duplicates = 0usize;
    for candidate in candidates {
        match positions.get(&candidate.identity_key()) {
            Some(&index) => {
                deduped[index] = candidate;
                duplicates += 1;
            }
            None => {
                positions.insert(candidate.identity_key(), deduped.len());
                deduped.push(candidate);
            }
        }
    }

    let stored_by_key: HashMap<IdentityKey, &Tournament> = persisted
        .iter()
        .map(|record| (record.identity_key(), record))
        .collect();

    let mut plan = Plan {
        duplicates,
        ..Plan::default()
    };
    for candidate in deduped {
        match stored_by_key.get(&candidate.identity_key()) {
            None => plan.ops.push(PlannedOp::Insert(candidate)),
            Some(stored) if candidate.descriptive_matches(stored) => plan.unchanged += 1,
            Some(stored) => plan.ops.push(PlannedOp::Update {
                id: stored.id,
                candidate,
                prior_analysis: stored.analysis.clone(),
            }),
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use turnier_core::Month;

    fn candidate(name: &str, city: Option<&str>) -> Candidate {
        Candidate {
            name: name.to_string(),
            month: Month::June,
            year: 2025,
            start_date: None,
            end_date: None,
            city: city.map(str::to_string),
            country: None,
            is_international: false,
            tournament_type: None,
            category: None,
        }
    }

    fn stored(name: &str, city: Option<&str>, analysis: Option<&str>) -> Tournament {
        let now = Utc::now();
        Tournament {
            id: Uuid::new_v4(),
            name: name.to_string(),
            month: Month::June,
            year: 2025,
            start_date: None,
            end_date: None,
            city: city.map(str::to_string),
            country: None,
            is_international: false,
            tournament_type: None,
            category: None,
            analysis: analysis.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unseen_key_plans_an_insert() {
        let plan = reconcile([candidate("Open A", None)], &[]);
        assert_eq!(plan.ops.len(), 1);
        assert!(matches!(&plan.ops[0], PlannedOp::Insert(c) if c.name == "Open A"));
        assert_eq!(plan.unchanged, 0);
    }

    #[test]
    fn changed_descriptive_field_plans_an_update() {
        let existing = stored("Open A", Some("Berlin"), Some("old analysis"));
        let plan = reconcile(
            [candidate("Open A", Some("Munich"))],
            std::slice::from_ref(&existing),
        );
        assert_eq!(plan.ops.len(), 1);
        match &plan.ops[0] {
            PlannedOp::Update {
                id,
                candidate,
                prior_analysis,
            } => {
                assert_eq!(*id, existing.id);
                assert_eq!(candidate.city.as_deref(), Some("Munich"));
                assert_eq!(prior_analysis.as_deref(), Some("old analysis"));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn equal_fields_are_a_noop() {
        let existing = stored("Open A", Some("Berlin"), None);
        let plan = reconcile(
            [candidate("open a", Some("BERLIN"))],
            std::slice::from_ref(&existing),
        );
        assert!(plan.ops.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn later_duplicate_candidate_wins() {
        let plan = reconcile(
            [
                candidate("Open A", Some("Berlin")),
                candidate("Open A", Some("Munich")),
            ],
            &[],
        );
        assert_eq!(plan.duplicates, 1);
        assert_eq!(plan.ops.len(), 1);
        assert!(
            matches!(&plan.ops[0], PlannedOp::Insert(c) if c.city.as_deref() == Some("Munich"))
        );
    }

    #[test]
    fn duplicate_keys_never_produce_two_operations() {
        let plan = reconcile(
            [
                candidate("Open A", Some("Berlin")),
                candidate("Open B", None),
                candidate("  OPEN  A ", Some("Munich")),
            ],
            &[],
        );
        assert_eq!(plan.ops.len(), 2);
        assert_eq!(plan.duplicates, 1);
    }
}
