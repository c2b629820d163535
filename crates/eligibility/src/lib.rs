//! Eligibility filtering
//!
//! Matches scored user records against a reputation threshold and produces
//! the recipient set for a disbursement. Filtering is pure: no I/O, input
//! order preserved, and an unknown criterion selects nobody rather than
//! erroring.

use meritdrop_core::{Address, ScoreField, UserRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A threshold test applied to one named score of a user record.
///
/// The comparison is always `>=`; the criterion space is the fixed preset
/// set offered to operators plus anything constructed programmatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityCriterion {
    pub field: ScoreField,
    pub threshold: u32,
}

impl EligibilityCriterion {
    /// Operator presets, as offered in the disbursement flow.
    pub const SKILLS_80: Self = Self {
        field: ScoreField::Skills,
        threshold: 80,
    };
    pub const ACTIVITY_60: Self = Self {
        field: ScoreField::Activity,
        threshold: 60,
    };
    pub const IDENTITY_80: Self = Self {
        field: ScoreField::Identity,
        threshold: 80,
    };

    pub const PRESETS: [Self; 3] = [Self::SKILLS_80, Self::ACTIVITY_60, Self::IDENTITY_80];

    pub fn new(field: ScoreField, threshold: u32) -> Self {
        Self { field, threshold }
    }

    /// Parse an operator-facing label like `"Skills Score >= 80"`.
    ///
    /// Unknown labels yield `None`; callers treat that as an empty recipient
    /// set rather than an error.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Skills Score >= 80" => Some(Self::SKILLS_80),
            "Activity Score >= 60" => Some(Self::ACTIVITY_60),
            "Identity Score >= 80" => Some(Self::IDENTITY_80),
            _ => None,
        }
    }

    pub fn matches(&self, record: &UserRecord) -> bool {
        record.scores.get(self.field) >= self.threshold
    }
}

impl fmt::Display for EligibilityCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Score >= {}", self.field, self.threshold)
    }
}

/// Filter records against a criterion.
///
/// Pure and order-preserving: the output keeps the relative order of the
/// input, so a deterministic input slice yields a deterministic recipient
/// list. `None` (an unknown criterion upstream) selects nobody.
pub fn filter(records: &[UserRecord], criterion: Option<&EligibilityCriterion>) -> Vec<UserRecord> {
    let Some(criterion) = criterion else {
        return Vec::new();
    };
    records
        .iter()
        .filter(|r| criterion.matches(r))
        .cloned()
        .collect()
}

/// Filter by an operator-facing label; unknown labels select nobody.
pub fn filter_by_label(records: &[UserRecord], label: &str) -> Vec<UserRecord> {
    filter(records, EligibilityCriterion::from_label(label).as_ref())
}

/// Wallets of the given records, in record order.
pub fn wallets(records: &[UserRecord]) -> Vec<Address> {
    records.iter().map(|r| r.wallet).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meritdrop_core::{Profile, ScoreSet};

    fn record(id: u64, skills: u32) -> UserRecord {
        let mut wallet = [0u8; 20];
        wallet[19] = id as u8;
        UserRecord {
            id,
            wallet: Address::new(wallet),
            scores: ScoreSet {
                skills,
                activity: 50,
                identity: 50,
                composite: 50,
            },
            profile: Profile {
                display_name: format!("user-{id}"),
                ..Profile::default()
            },
        }
    }

    #[test]
    fn selects_only_records_meeting_threshold_in_order() {
        let records = vec![record(1, 90), record(2, 40), record(3, 85)];
        let criterion = EligibilityCriterion::new(ScoreField::Skills, 80);

        let selected = filter(&records, Some(&criterion));

        let ids: Vec<u64> = selected.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(selected.iter().all(|r| criterion.matches(r)));
    }

    #[test]
    fn threshold_is_inclusive() {
        let records = vec![record(1, 80), record(2, 79)];
        let selected = filter(&records, Some(&EligibilityCriterion::SKILLS_80));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, 1);
    }

    #[test]
    fn no_criterion_selects_nobody() {
        let records = vec![record(1, 100)];
        assert!(filter(&records, None).is_empty());
    }

    #[test]
    fn unknown_label_selects_nobody() {
        let records = vec![record(1, 100)];
        assert!(filter_by_label(&records, "Vibes >= 9000").is_empty());
    }

    #[test]
    fn preset_labels_parse() {
        for preset in EligibilityCriterion::PRESETS {
            assert_eq!(
                EligibilityCriterion::from_label(&preset.to_string()),
                Some(preset)
            );
        }
    }

    #[test]
    fn wallets_follow_record_order() {
        let records = vec![record(7, 90), record(3, 90)];
        let wallets = wallets(&records);
        assert_eq!(wallets, vec![records[0].wallet, records[1].wallet]);
    }
}
