// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `selector.rs`

use crate::crd::{LabelSelector, LabelSelectorRequirement};
use crate::errors::SelectorError;
use std::collections::BTreeMap;

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn expression(key: &str, operator: &str, values: Option<&[&str]>) -> LabelSelectorRequirement {
    LabelSelectorRequirement {
        key: key.to_string(),
        operator: operator.to_string(),
        values: values.map(|v| v.iter().map(|s| (*s).to_string()).collect()),
    }
}

fn selector_with(exprs: Vec<LabelSelectorRequirement>) -> LabelSelector {
    LabelSelector {
        match_labels: None,
        match_expressions: Some(exprs),
    }
}

#[test]
fn test_empty_selector_matches_everything() {
    let selector = LabelSelector::default();
    assert!(selector.matches(&BTreeMap::new()));
    assert!(selector.matches(&labels(&[("app", "web")])));
}

#[test]
fn test_match_labels_requires_all_pairs() {
    let selector = LabelSelector {
        match_labels: Some(labels(&[("export", "yes"), ("tier", "web")])),
        match_expressions: None,
    };

    assert!(selector.matches(&labels(&[("export", "yes"), ("tier", "web"), ("x", "y")])));
    assert!(!selector.matches(&labels(&[("export", "yes")])));
    assert!(!selector.matches(&labels(&[("export", "no"), ("tier", "web")])));
}

#[test]
fn test_in_and_not_in() {
    let in_selector = selector_with(vec![expression("env", "In", Some(&["prod", "stage"]))]);
    assert!(in_selector.matches(&labels(&[("env", "prod")])));
    assert!(!in_selector.matches(&labels(&[("env", "dev")])));
    assert!(!in_selector.matches(&BTreeMap::new()));

    let not_in = selector_with(vec![expression("env", "NotIn", Some(&["dev"]))]);
    assert!(not_in.matches(&labels(&[("env", "prod")])));
    assert!(not_in.matches(&BTreeMap::new()));
    assert!(!not_in.matches(&labels(&[("env", "dev")])));
}

#[test]
fn test_exists_and_does_not_exist() {
    let exists = selector_with(vec![expression("export", "Exists", None)]);
    assert!(exists.matches(&labels(&[("export", "")])));
    assert!(!exists.matches(&BTreeMap::new()));

    let absent = selector_with(vec![expression("private", "DoesNotExist", None)]);
    assert!(absent.matches(&BTreeMap::new()));
    assert!(!absent.matches(&labels(&[("private", "true")])));
}

#[test]
fn test_labels_and_expressions_are_anded() {
    let selector = LabelSelector {
        match_labels: Some(labels(&[("export", "yes")])),
        match_expressions: Some(vec![expression("env", "In", Some(&["prod"]))]),
    };

    assert!(selector.matches(&labels(&[("export", "yes"), ("env", "prod")])));
    assert!(!selector.matches(&labels(&[("export", "yes"), ("env", "dev")])));
    assert!(!selector.matches(&labels(&[("env", "prod")])));
}

#[test]
fn test_unknown_operator_never_matches() {
    let selector = selector_with(vec![expression("env", "Near", Some(&["prod"]))]);
    assert!(!selector.matches(&labels(&[("env", "prod")])));
}

#[test]
fn test_validate_accepts_well_formed_expressions() {
    let selector = selector_with(vec![
        expression("env", "In", Some(&["prod"])),
        expression("tier", "NotIn", Some(&["db"])),
        expression("export", "Exists", None),
        expression("private", "DoesNotExist", Some(&[])),
    ]);
    assert_eq!(selector.validate(), Ok(()));
}

#[test]
fn test_validate_rejects_unknown_operator() {
    let selector = selector_with(vec![expression("env", "Near", None)]);
    assert_eq!(
        selector.validate(),
        Err(SelectorError::UnknownOperator {
            key: "env".to_string(),
            operator: "Near".to_string(),
        })
    );
}

#[test]
fn test_validate_rejects_inconsistent_values() {
    let missing = selector_with(vec![expression("env", "In", None)]);
    assert!(matches!(
        missing.validate(),
        Err(SelectorError::InvalidValues { .. })
    ));

    let extra = selector_with(vec![expression("env", "Exists", Some(&["prod"]))]);
    assert!(matches!(
        extra.validate(),
        Err(SelectorError::InvalidValues { .. })
    ));
}
