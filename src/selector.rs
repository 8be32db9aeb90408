// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label selector matching utilities.
//!
//! Remote services take part in aggregation only while their labels match the
//! owning Link's cluster-agnostic selector. This module evaluates
//! [`LabelSelector`]s against label maps with Kubernetes semantics:
//!
//! - `matchLabels` and `matchExpressions` are `ANDed`
//! - operators are `In`, `NotIn`, `Exists` and `DoesNotExist`
//! - an empty selector matches everything
//!
//! # Example
//!
//! ```rust
//! use meshimport::crd::LabelSelector;
//! use std::collections::BTreeMap;
//!
//! let selector = LabelSelector {
//!     match_labels: Some(BTreeMap::from([("export".to_string(), "yes".to_string())])),
//!     match_expressions: None,
//! };
//! let labels = BTreeMap::from([("export".to_string(), "yes".to_string())]);
//! assert!(selector.matches(&labels));
//! ```

use crate::crd::{LabelSelector, LabelSelectorRequirement};
use crate::errors::SelectorError;
use std::collections::BTreeMap;

const OP_IN: &str = "In";
const OP_NOT_IN: &str = "NotIn";
const OP_EXISTS: &str = "Exists";
const OP_DOES_NOT_EXIST: &str = "DoesNotExist";

impl LabelSelector {
    /// Returns true if `labels` satisfy every requirement of this selector.
    ///
    /// Requirements with an unknown operator never match.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let labels_match = self.match_labels.as_ref().is_none_or(|wanted| {
            wanted
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value))
        });

        labels_match
            && self
                .match_expressions
                .as_ref()
                .is_none_or(|exprs| exprs.iter().all(|expr| expr.matches(labels)))
    }

    /// Checks that every expression uses a known operator with a consistent value list.
    ///
    /// # Errors
    ///
    /// Returns the first [`SelectorError`] found.
    pub fn validate(&self) -> Result<(), SelectorError> {
        self.match_expressions
            .iter()
            .flatten()
            .try_for_each(LabelSelectorRequirement::validate)
    }
}

impl LabelSelectorRequirement {
    fn values(&self) -> &[String] {
        self.values.as_deref().unwrap_or_default()
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator.as_str() {
            OP_IN => value.is_some_and(|v| self.values().contains(v)),
            OP_NOT_IN => value.is_none_or(|v| !self.values().contains(v)),
            OP_EXISTS => value.is_some(),
            OP_DOES_NOT_EXIST => value.is_none(),
            _ => false,
        }
    }

    fn validate(&self) -> Result<(), SelectorError> {
        let invalid = |reason| SelectorError::InvalidValues {
            key: self.key.clone(),
            operator: self.operator.clone(),
            reason,
        };

        match self.operator.as_str() {
            OP_IN | OP_NOT_IN if self.values().is_empty() => Err(invalid("requires values")),
            OP_EXISTS | OP_DOES_NOT_EXIST if !self.values().is_empty() => {
                Err(invalid("must not have values"))
            }
            OP_IN | OP_NOT_IN | OP_EXISTS | OP_DOES_NOT_EXIST => Ok(()),
            other => Err(SelectorError::UnknownOperator {
                key: self.key.clone(),
                operator: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
