//! Demo user profiles.
//!
//! Each profile assigns policy documents to a user. The user id only selects
//! which documents were loaded into that user's chunk index at startup; it is
//! not pipeline state.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::PolicyType;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoUser {
    pub id: String,
    pub display_name: String,
    /// Document file names (relative to the configured policies directory),
    /// keyed by the policy type they provide.
    pub documents: BTreeMap<PolicyType, String>,
}

impl DemoUser {
    pub fn held_policy_types(&self) -> BTreeSet<PolicyType> {
        self.documents.keys().copied().collect()
    }
}

/// The built-in demo roster: one auto-only user, one property-only user, and
/// one user holding both policy types.
pub fn builtin_users() -> Vec<DemoUser> {
    vec![
        DemoUser {
            id: "alice".to_string(),
            display_name: "Alice".to_string(),
            documents: BTreeMap::from([(PolicyType::Auto, "auto_policy_1.md".to_string())]),
        },
        DemoUser {
            id: "bob".to_string(),
            display_name: "Bob".to_string(),
            documents: BTreeMap::from([(PolicyType::Property, "property_policy_1.md".to_string())]),
        },
        DemoUser {
            id: "carol".to_string(),
            display_name: "Carol".to_string(),
            documents: BTreeMap::from([
                (PolicyType::Auto, "auto_policy_2.md".to_string()),
                (PolicyType::Property, "property_policy_2.md".to_string()),
            ]),
        },
    ]
}

/// Look a user up by id, case-insensitively.
pub fn find_user<'a>(users: &'a [DemoUser], id: &str) -> Option<&'a DemoUser> {
    users.iter().find(|user| user.id.eq_ignore_ascii_case(id.trim()))
}
