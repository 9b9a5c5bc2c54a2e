//! Semantic comparison of `policy_data` documents.

use crate::merge::merge_bindings;
use crate::types::Policy;

/// Whether two serialized policies grant the same role/member pairs.
///
/// Binding order and duplicate bindings are ignored. A document that does
/// not parse is never equivalent to anything, so a broken document always
/// shows up in a plan.
pub fn policy_data_equivalent(old: &str, new: &str) -> bool {
    let (Ok(old), Ok(new)) = (Policy::from_json(old), Policy::from_json(new)) else {
        return false;
    };

    let mut old = merge_bindings(&old.bindings);
    let mut new = merge_bindings(&new.bindings);
    if old.len() != new.len() {
        return false;
    }

    old.sort_by_key(|b| b.sort_key());
    new.sort_by_key(|b| b.sort_key());
    old.iter().zip(&new).all(|(a, b)| {
        a.role_id == b.role_id
            && a.subject.subject_type == b.subject.subject_type
            && a.subject.id == b.subject.id
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccessBinding, Subject};

    fn doc(bindings: &[(&str, &str)]) -> String {
        Policy::new(
            bindings
                .iter()
                .map(|(role, id)| AccessBinding::new(*role, Subject::new("userAccount", *id)))
                .collect(),
        )
        .to_json()
        .unwrap()
    }

    #[test]
    fn test_reflexive() {
        let a = doc(&[("viewer", "alice"), ("editor", "bob")]);
        assert!(policy_data_equivalent(&a, &a));
        assert!(policy_data_equivalent("{}", r#"{"bindings": []}"#));
    }

    #[test]
    fn test_order_independent() {
        let a = doc(&[("viewer", "alice"), ("editor", "bob"), ("viewer", "carol")]);
        let b = doc(&[("viewer", "carol"), ("viewer", "alice"), ("editor", "bob")]);
        assert!(policy_data_equivalent(&a, &b));
    }

    #[test]
    fn test_duplicates_ignored() {
        let a = doc(&[("viewer", "alice"), ("viewer", "alice")]);
        let b = doc(&[("viewer", "alice")]);
        assert!(policy_data_equivalent(&a, &b));
    }

    #[test]
    fn test_equivalent_to_merged_form() {
        let raw = vec![
            AccessBinding::new("viewer", Subject::new("userAccount", "b")),
            AccessBinding::new("admin", Subject::new("system", "allUsers")),
            AccessBinding::new("viewer", Subject::new("userAccount", "b")),
        ];
        let merged = Policy::new(merge_bindings(&raw)).to_json().unwrap();
        let raw = Policy::new(raw).to_json().unwrap();
        assert!(policy_data_equivalent(&raw, &merged));
    }

    #[test]
    fn test_differences_detected() {
        let a = doc(&[("viewer", "alice")]);
        assert!(!policy_data_equivalent(&a, &doc(&[("editor", "alice")])));
        assert!(!policy_data_equivalent(&a, &doc(&[("viewer", "bob")])));
        assert!(!policy_data_equivalent(&a, &doc(&[("viewer", "alice"), ("viewer", "bob")])));

        let service = Policy::new(vec![AccessBinding::new(
            "viewer",
            Subject::new("serviceAccount", "alice"),
        )])
        .to_json()
        .unwrap();
        assert!(!policy_data_equivalent(&a, &service));
    }

    #[test]
    fn test_unparseable_is_different() {
        let a = doc(&[("viewer", "alice")]);
        assert!(!policy_data_equivalent(&a, "not json"));
        assert!(!policy_data_equivalent("not json", "not json"));
    }
}
