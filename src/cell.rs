use crate::table::Metric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Value held by an input cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputValue {
    Metric(Metric),
    Countries(BTreeSet<String>),
}

impl InputValue {
    pub fn kind(&self) -> &'static str {
        match self {
            InputValue::Metric(_) => "metric",
            InputValue::Countries(_) => "country set",
        }
    }

    pub fn as_metric(&self) -> Option<Metric> {
        match self {
            InputValue::Metric(metric) => Some(*metric),
            _ => None,
        }
    }

    pub fn as_countries(&self) -> Option<&BTreeSet<String>> {
        match self {
            InputValue::Countries(countries) => Some(countries),
            _ => None,
        }
    }

    pub fn same_kind(&self, other: &InputValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// A named, externally settable value. `dependents` holds the ids of the
/// rules that read it, kept ordered so re-evaluation follows rule order.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct InputCell {
    pub name: String,
    pub value: InputValue,
    pub dependents: BTreeSet<usize>,
}

impl InputCell {
    pub fn create(name: impl Into<String>, value: InputValue) -> Self {
        InputCell {
            name: name.into(),
            value,
            dependents: BTreeSet::new(),
        }
    }

    pub fn dep_insert(&mut self, rule: usize) {
        self.dependents.insert(rule);
    }

    pub fn contains(&self, rule: usize) -> bool {
        self.dependents.contains(&rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_dependents() {
        let mut cell = InputCell::create("metric_choice", InputValue::Metric(Metric::CasesPerMillion));
        assert!(!cell.contains(0));

        cell.dep_insert(2);
        cell.dep_insert(0);
        cell.dep_insert(2);
        assert_eq!(cell.dependents.iter().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert!(cell.contains(2));
        assert!(!cell.contains(1));
    }

    #[test]
    fn compares_value_kinds() {
        let metric = InputValue::Metric(Metric::CasesPerMillion);
        let other = InputValue::Metric(Metric::DeathsPerMillion);
        let countries = InputValue::Countries(BTreeSet::new());
        assert!(metric.same_kind(&other));
        assert!(!metric.same_kind(&countries));
        assert_eq!(countries.as_countries().map(|c| c.len()), Some(0));
        assert_eq!(metric.as_metric(), Some(Metric::CasesPerMillion));
    }
}
