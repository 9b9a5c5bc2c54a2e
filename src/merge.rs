//! Canonicalization and merge algebra over access bindings.
//!
//! Bindings are grouped into a `role -> set of canonical members` map, and
//! every set operation (union, role exclusion, dedup) is a single pass over
//! that map followed by re-expansion into a flat list. Output order is
//! deterministic: roles ascending, members ascending within a role.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{IamError, Result};
use crate::types::{AccessBinding, Subject};

/// Members of each role, keyed by role.
pub type RoleMembers = BTreeMap<String, BTreeSet<String>>;

/// The `"type:id"` identity of a binding's subject.
pub fn canonical_member(binding: &AccessBinding) -> String {
    subject_member(&binding.subject)
}

/// The `"type:id"` identity of a subject.
pub fn subject_member(subject: &Subject) -> String {
    format!("{}:{}", subject.subject_type, subject.id)
}

/// Parse a `"type:id"` member back into a subject.
///
/// The type is everything before the first `:`, so subject types must not
/// contain `:`. Both halves must be non-empty.
pub fn parse_canonical_member(member: &str) -> Result<Subject> {
    match member.split_once(':') {
        Some((subject_type, id)) if !subject_type.is_empty() && !id.is_empty() => {
            Ok(Subject::new(subject_type, id))
        },
        _ => Err(IamError::Validation(format!(
            "member {:?} must be in the format TYPE:ID",
            member
        ))),
    }
}

/// Group bindings by role, deduplicating members within each role.
pub fn roles_to_members_map(bindings: &[AccessBinding]) -> RoleMembers {
    let mut map = RoleMembers::new();
    for binding in bindings {
        map.entry(binding.role_id.clone())
            .or_default()
            .insert(canonical_member(binding));
    }
    map
}

/// Union of the input bindings with duplicate `(role, member)` pairs removed.
///
/// Idempotent: merging an already merged list returns it unchanged.
pub fn merge_bindings(bindings: &[AccessBinding]) -> Vec<AccessBinding> {
    expand(roles_to_members_map(bindings))
}

/// Merged bindings with every binding for `role` dropped.
pub fn remove_role_from_bindings(role: &str, bindings: &[AccessBinding]) -> Vec<AccessBinding> {
    let mut map = roles_to_members_map(bindings);
    map.remove(role);
    expand(map)
}

/// Canonical members holding `role`, in input order.
pub fn role_to_members_list(role: &str, bindings: &[AccessBinding]) -> Vec<String> {
    bindings
        .iter()
        .filter(|binding| binding.role_id == role)
        .map(canonical_member)
        .collect()
}

/// Bindings for `role`, one per subject.
pub fn role_bindings<'a, I>(role: &str, subjects: I) -> Vec<AccessBinding>
where
    I: IntoIterator<Item = &'a Subject>,
{
    subjects
        .into_iter()
        .map(|subject| AccessBinding::new(role, subject.clone()))
        .collect()
}

fn expand(map: RoleMembers) -> Vec<AccessBinding> {
    map.into_iter()
        .flat_map(|(role, members)| {
            members.into_iter().map(move |member| {
                // Members in the map were produced by `canonical_member`,
                // so the separator is always present.
                let (subject_type, id) = member.split_once(':').unwrap_or(("", member.as_str()));
                AccessBinding::new(role.clone(), Subject::new(subject_type, id))
            })
        })
        .collect()
}
