//! Fixed controlled vocabularies for department, location and issue type.
//!
//! Values typed by a reporter that are not members of these lists become
//! moderation candidates instead of silently joining the vocabulary.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::config::VocabularyConfig;
use crate::normalize::fold;

const DEFAULT_DEPARTMENTS: &[&str] = &[
    "Emergency",
    "Outpatient",
    "Inpatient",
    "Maternity",
    "Paediatrics",
    "Surgery",
    "Pharmacy",
    "Laboratory",
    "Radiology",
    "Dental",
    "Eye Clinic",
    "Mental Health",
    "Administration",
    "Billing",
];

const DEFAULT_LOCATIONS: &[&str] = &[
    "Reception",
    "Waiting Area",
    "Consultation Room",
    "Ward",
    "Theatre",
    "Pharmacy",
    "Laboratory",
    "Toilets",
    "Car Park",
    "Cashier",
];

const DEFAULT_ISSUE_TYPES: &[&str] = &[
    "waiting time",
    "staff attitude",
    "cleanliness",
    "billing",
    "medication",
    "treatment quality",
    "equipment",
    "communication",
    "other",
];

// Folded once, cloned for every default vocabulary
static DEFAULT_VOCABULARY: Lazy<ControlledVocabulary> = Lazy::new(|| {
    ControlledVocabulary::from_lists(DEFAULT_DEPARTMENTS, DEFAULT_LOCATIONS, DEFAULT_ISSUE_TYPES)
});

#[derive(Debug, Clone)]
pub struct ControlledVocabulary {
    departments: HashSet<String>,
    locations: HashSet<String>,
    issue_types: HashSet<String>,
}

impl Default for ControlledVocabulary {
    fn default() -> Self {
        DEFAULT_VOCABULARY.clone()
    }
}

impl ControlledVocabulary {
    pub fn from_lists<S: AsRef<str>>(
        departments: &[S],
        locations: &[S],
        issue_types: &[S],
    ) -> Self {
        let folded = |items: &[S]| items.iter().map(|s| fold(s.as_ref())).collect::<HashSet<_>>();
        Self {
            departments: folded(departments),
            locations: folded(locations),
            issue_types: folded(issue_types),
        }
    }

    /// Built-in lists, replaced list-by-list by whatever the config supplies
    pub fn from_config(config: &VocabularyConfig) -> Self {
        let mut vocab = Self::default();
        if let Some(departments) = &config.departments {
            vocab.departments = departments.iter().map(|s| fold(s)).collect();
        }
        if let Some(locations) = &config.locations {
            vocab.locations = locations.iter().map(|s| fold(s)).collect();
        }
        if let Some(issue_types) = &config.issue_types {
            vocab.issue_types = issue_types.iter().map(|s| fold(s)).collect();
        }
        vocab
    }

    pub fn is_known_department(&self, value: &str) -> bool {
        self.departments.contains(&fold(value))
    }

    pub fn is_known_location(&self, value: &str) -> bool {
        self.locations.contains(&fold(value))
    }

    pub fn is_known_issue_type(&self, value: &str) -> bool {
        self.issue_types.contains(&fold(value))
    }
}
