//! Namespace grouping.
//!
//! Every column of the source table lands in exactly one namespace unless it
//! is the label, the tag, or excluded. Precedence, first match wins:
//!
//! 1. label, tag or excluded column: omitted
//! 2. explicit override: the override's namespace
//! 3. `prefix__namespace__suffix` naming: the second component, if it is a
//!    valid namespace name
//! 4. everything else: [`DEFAULT_NAMESPACE`]

use crate::job::JobSpec;
use crate::types::{Column, NamespaceMap};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_NAMESPACE: &str = "other";
pub const NAMESPACE_DELIMITER: &str = "__";

/// Group `columns` using the label, tag, exclusions and overrides of `job`.
pub fn group_for_job(columns: &[Column], job: &JobSpec) -> NamespaceMap {
    group(
        columns,
        &job.label_column,
        &job.tag_column,
        &job.excludes,
        &job.namespaces,
    )
}

pub fn group(
    columns: &[Column],
    label: &str,
    tag: &str,
    excludes: &BTreeSet<String>,
    overrides: &BTreeMap<String, String>,
) -> NamespaceMap {
    let mut map = NamespaceMap::new();
    for column in columns {
        let name = column.name.as_str();
        if name == label || name == tag || excludes.contains(name) {
            continue;
        }
        let namespace = match overrides.get(name) {
            Some(ns) => ns.as_str(),
            None => conventional_namespace(name).unwrap_or(DEFAULT_NAMESPACE),
        };
        map.push(namespace, column.clone());
    }
    map
}

/// Namespace encoded in a `prefix__namespace__suffix` column name.
///
/// Needs at least three delimiter-separated parts. The middle part only
/// counts if it is a valid namespace name.
pub fn conventional_namespace(name: &str) -> Option<&str> {
    let mut parts = name.split(NAMESPACE_DELIMITER);
    let _prefix = parts.next()?;
    let namespace = parts.next()?;
    parts.next()?;
    is_valid_namespace(namespace).then_some(namespace)
}

/// Namespace names end up inside a quoted SQL literal and after a `|` in
/// the trainer input, so only plain identifier characters are allowed.
pub fn is_valid_namespace(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    fn orders_columns() -> Vec<Column> {
        vec![
            Column::new("converted", ColumnType::Integer),
            Column::new("order_id", ColumnType::Text),
            Column::new("amount", ColumnType::Double),
            Column::new("is_rush", ColumnType::Boolean),
            Column::new("region__geo__code", ColumnType::Text),
        ]
    }

    fn names(map: &NamespaceMap, ns: &str) -> Vec<String> {
        map.get(ns)
            .unwrap_or_default()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    #[test]
    fn test_group_orders_example() {
        let map = group(
            &orders_columns(),
            "converted",
            "order_id",
            &BTreeSet::new(),
            &BTreeMap::new(),
        );
        assert_eq!(map.names(), vec!["other", "geo"]);
        assert_eq!(names(&map, "other"), vec!["amount", "is_rush"]);
        assert_eq!(names(&map, "geo"), vec!["region__geo__code"]);
    }

    #[test]
    fn test_override_beats_naming_convention() {
        let overrides = BTreeMap::from([("region__geo__code".to_string(), "place".to_string())]);
        let map = group(
            &orders_columns(),
            "converted",
            "order_id",
            &BTreeSet::new(),
            &overrides,
        );
        assert_eq!(names(&map, "place"), vec!["region__geo__code"]);
        assert!(map.get("geo").is_none());
    }

    #[test]
    fn test_exclusion_beats_override() {
        let excludes = BTreeSet::from(["amount".to_string()]);
        let overrides = BTreeMap::from([("amount".to_string(), "money".to_string())]);
        let map = group(&orders_columns(), "converted", "order_id", &excludes, &overrides);
        assert!(map.get("money").is_none());
        assert_eq!(map.namespace_of("amount"), None);
        assert_eq!(map.column_count(), 2);
    }

    #[test]
    fn test_label_and_tag_never_grouped_even_with_override() {
        let overrides = BTreeMap::from([("converted".to_string(), "target".to_string())]);
        let map = group(
            &orders_columns(),
            "converted",
            "order_id",
            &BTreeSet::new(),
            &overrides,
        );
        assert_eq!(map.namespace_of("converted"), None);
        assert_eq!(map.namespace_of("order_id"), None);
    }

    #[test]
    fn test_conventional_namespace() {
        assert_eq!(conventional_namespace("region__geo__code"), Some("geo"));
        assert_eq!(conventional_namespace("a__b__c__d"), Some("b"));
        assert_eq!(conventional_namespace("region__geo"), None);
        assert_eq!(conventional_namespace("plain"), None);
        assert_eq!(conventional_namespace("a____b"), None);
        assert_eq!(conventional_namespace("__geo__"), Some("geo"));
        assert_eq!(conventional_namespace("a__n s__b"), None);
        assert_eq!(conventional_namespace("a__geo|x__b"), None);
    }

    #[test]
    fn test_malformed_conventional_namespace_falls_back_to_default() {
        let columns = vec![
            Column::new("y", ColumnType::Integer),
            Column::new("id", ColumnType::Text),
            Column::new("a__n s__b", ColumnType::Text),
        ];
        let map = group(&columns, "y", "id", &BTreeSet::new(), &BTreeMap::new());
        assert_eq!(map.names(), vec![DEFAULT_NAMESPACE]);
        assert_eq!(map.namespace_of("a__n s__b"), Some(DEFAULT_NAMESPACE));
    }

    #[test]
    fn test_empty_input() {
        let map = group(&[], "y", "id", &BTreeSet::new(), &BTreeMap::new());
        assert!(map.is_empty());
    }

    #[test]
    fn test_group_for_job_uses_job_rules() {
        let job = JobSpec::builder("sales.orders", "orders_vw", "converted", "order_id")
            .exclude("is_rush")
            .namespace("amount", "money")
            .build()
            .unwrap();
        let map = group_for_job(&orders_columns(), &job);
        assert_eq!(map.names(), vec!["money", "geo"]);
        assert_eq!(map.column_count(), 2);
    }
}
