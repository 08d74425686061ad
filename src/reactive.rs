//! A small dependency-declared dataflow graph.
//!
//! Input cells feed derivation rules; every rule names the cells it reads
//! and the outputs it writes. Changing a cell re-evaluates exactly the rules
//! registered as its dependents, then publishes the new outputs in one swap.

use crate::cell::{InputCell, InputValue};
use crate::error::{Error, Result};
use crate::pivot::ChartData;
use crate::table::Metric;
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

pub type RuleFn<C> = Box<dyn Fn(&Inputs<'_>, &C) -> Result<Vec<ChartData>> + Send + Sync>;

/// Named outputs as published after an evaluation.
pub type OutputSet = BTreeMap<String, ChartData>;

/// A pure function from declared input cells (and the shared context) to one
/// table per declared output, in declaration order.
pub struct Rule<C> {
    pub name: String,
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    body: RuleFn<C>,
}

impl<C> Rule<C> {
    pub fn new<F>(name: &str, reads: &[&str], writes: &[&str], body: F) -> Self
    where
        F: Fn(&Inputs<'_>, &C) -> Result<Vec<ChartData>> + Send + Sync + 'static,
    {
        Rule {
            name: name.to_string(),
            reads: reads.iter().map(|s| s.to_string()).collect(),
            writes: writes.iter().map(|s| s.to_string()).collect(),
            body: Box::new(body),
        }
    }
}

/// Read-only view of the input cells handed to a rule body. A rule only
/// sees the cells it declared in `reads`; it is never re-evaluated for
/// changes to any other cell.
pub struct Inputs<'a> {
    cells: &'a [InputCell],
    reads: Option<(&'a str, &'a [String])>,
}

impl<'a> Inputs<'a> {
    pub fn get(&self, name: &str) -> Result<&'a InputValue> {
        if let Some((rule, reads)) = self.reads {
            if !reads.iter().any(|read| read == name) {
                return Err(Error::Config(format!(
                    "rule `{}` reads undeclared input `{}`",
                    rule, name
                )));
            }
        }
        self.cells
            .iter()
            .find(|cell| cell.name == name)
            .map(|cell| &cell.value)
            .ok_or_else(|| Error::UnknownInput(name.to_string()))
    }

    pub fn metric(&self, name: &str) -> Result<Metric> {
        self.get(name)?.as_metric().ok_or_else(|| Error::InputType {
            cell: name.to_string(),
            expected: "metric",
        })
    }

    pub fn countries(&self, name: &str) -> Result<&'a BTreeSet<String>> {
        self.get(name)?.as_countries().ok_or_else(|| Error::InputType {
            cell: name.to_string(),
            expected: "country set",
        })
    }
}

pub struct ReactiveGraph<C> {
    context: Arc<C>,
    cells: Vec<InputCell>,
    rules: Vec<Rule<C>>,
    runs: Vec<u64>,
    outputs: Arc<OutputSet>,
}

impl<C> ReactiveGraph<C> {
    /// Validates the rule declarations, registers every rule as a dependent
    /// of the cells it reads and evaluates all rules once.
    pub fn new(context: Arc<C>, mut cells: Vec<InputCell>, rules: Vec<Rule<C>>) -> Result<Self> {
        let mut cell_names = HashSet::new();
        for cell in &cells {
            if !cell_names.insert(cell.name.clone()) {
                return Err(Error::Config(format!("duplicate input cell `{}`", cell.name)));
            }
        }

        let mut rule_names = HashSet::new();
        let mut writers: BTreeMap<&str, &str> = BTreeMap::new();
        for (id, rule) in rules.iter().enumerate() {
            if !rule_names.insert(rule.name.as_str()) {
                return Err(Error::Config(format!("duplicate rule `{}`", rule.name)));
            }
            if rule.writes.is_empty() {
                return Err(Error::Config(format!("rule `{}` writes no output", rule.name)));
            }
            for output in &rule.writes {
                if let Some(other) = writers.insert(output.as_str(), rule.name.as_str()) {
                    return Err(Error::Config(format!(
                        "output `{}` is written by both `{}` and `{}`",
                        output, other, rule.name
                    )));
                }
            }
            for read in &rule.reads {
                let cell = cells
                    .iter_mut()
                    .find(|cell| &cell.name == read)
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "rule `{}` reads unknown input `{}`",
                            rule.name, read
                        ))
                    })?;
                cell.dep_insert(id);
            }
        }

        let mut graph = ReactiveGraph {
            context,
            cells,
            runs: vec![0; rules.len()],
            rules,
            outputs: Arc::new(OutputSet::new()),
        };

        let mut outputs = OutputSet::new();
        for id in 0..graph.rules.len() {
            outputs.extend(graph.evaluate(id)?);
            graph.runs[id] += 1;
        }
        graph.outputs = Arc::new(outputs);
        Ok(graph)
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    pub fn input(&self, name: &str) -> Result<&InputValue> {
        Inputs {
            cells: &self.cells,
            reads: None,
        }
        .get(name)
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&str, &InputValue)> {
        self.cells.iter().map(|cell| (cell.name.as_str(), &cell.value))
    }

    /// Sets an input cell and re-evaluates the rules that read it.
    ///
    /// Returns the names of the replaced outputs. A value equal to the
    /// current one changes nothing. If a rule fails, the cell keeps its old
    /// value and no output is replaced.
    pub fn set_input(&mut self, name: &str, value: InputValue) -> Result<Vec<String>> {
        let index = self
            .cells
            .iter()
            .position(|cell| cell.name == name)
            .ok_or_else(|| Error::UnknownInput(name.to_string()))?;

        let cell = &mut self.cells[index];
        if !cell.value.same_kind(&value) {
            return Err(Error::InputType {
                cell: name.to_string(),
                expected: cell.value.kind(),
            });
        }
        if cell.value == value {
            return Ok(Vec::new());
        }
        let previous = std::mem::replace(&mut cell.value, value);
        let affected: Vec<usize> = cell.dependents.iter().copied().collect();

        let mut next = (*self.outputs).clone();
        let mut replaced = Vec::new();
        for &id in &affected {
            match self.evaluate(id) {
                Ok(tables) => {
                    for (output, table) in tables {
                        replaced.push(output.clone());
                        next.insert(output, table);
                    }
                }
                Err(e) => {
                    self.cells[index].value = previous;
                    return Err(e);
                }
            }
        }

        for &id in &affected {
            self.runs[id] += 1;
            debug!("input `{}` changed, re-evaluated rule `{}`", name, self.rules[id].name);
        }
        self.outputs = Arc::new(next);
        Ok(replaced)
    }

    fn evaluate(&self, id: usize) -> Result<Vec<(String, ChartData)>> {
        let rule = &self.rules[id];
        let inputs = Inputs {
            cells: &self.cells,
            reads: Some((rule.name.as_str(), rule.reads.as_slice())),
        };
        let tables = (rule.body)(&inputs, &self.context)?;
        if tables.len() != rule.writes.len() {
            return Err(Error::Config(format!(
                "rule `{}` produced {} tables for {} declared outputs",
                rule.name,
                tables.len(),
                rule.writes.len()
            )));
        }
        Ok(rule.writes.iter().cloned().zip(tables).collect())
    }

    /// The current outputs. The returned snapshot never changes; later
    /// updates publish a new one.
    pub fn outputs(&self) -> Arc<OutputSet> {
        Arc::clone(&self.outputs)
    }

    pub fn output(&self, name: &str) -> Result<&ChartData> {
        self.outputs
            .get(name)
            .ok_or_else(|| Error::UnknownOutput(name.to_string()))
    }

    /// How many times the named rule has been evaluated.
    pub fn runs(&self, rule: &str) -> Option<u64> {
        self.rules
            .iter()
            .position(|r| r.name == rule)
            .map(|id| self.runs[id])
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule<C>> {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::{Slice, SliceTable};

    fn slices(label: &str, value: f64) -> ChartData {
        ChartData::Slices(SliceTable {
            slices: vec![Slice {
                label: label.to_string(),
                value,
            }],
        })
    }

    fn metric_cell() -> InputCell {
        InputCell::create("metric", InputValue::Metric(Metric::CasesPerMillion))
    }

    fn countries_cell() -> InputCell {
        InputCell::create("countries", InputValue::Countries(BTreeSet::new()))
    }

    fn graph() -> ReactiveGraph<f64> {
        let rules = vec![
            Rule::new("by_metric", &["metric"], &["m"], |inputs: &Inputs<'_>, scale: &f64| {
                let value = match inputs.metric("metric")? {
                    Metric::CasesPerMillion => 1.0,
                    Metric::DeathsPerMillion => 2.0,
                };
                Ok(vec![slices("m", value * scale)])
            }),
            Rule::new("by_countries", &["countries"], &["c"], |inputs: &Inputs<'_>, _: &f64| {
                Ok(vec![slices("c", inputs.countries("countries")?.len() as f64)])
            }),
        ];
        ReactiveGraph::new(Arc::new(10.0), vec![metric_cell(), countries_cell()], rules).unwrap()
    }

    #[test]
    fn evaluates_every_rule_at_construction() {
        let graph = graph();
        assert_eq!(graph.outputs().len(), 2);
        assert_eq!(graph.runs("by_metric"), Some(1));
        assert_eq!(graph.runs("by_countries"), Some(1));
    }

    #[test]
    fn prunes_rules_that_do_not_read_the_changed_cell() {
        let mut graph = graph();
        let replaced = graph
            .set_input("metric", InputValue::Metric(Metric::DeathsPerMillion))
            .unwrap();

        assert_eq!(replaced, vec!["m"]);
        assert_eq!(graph.runs("by_metric"), Some(2));
        assert_eq!(graph.runs("by_countries"), Some(1));
        assert_eq!(graph.output("m").unwrap(), &slices("m", 20.0));
    }

    #[test]
    fn unchanged_value_is_not_a_change() {
        let mut graph = graph();
        let replaced = graph
            .set_input("metric", InputValue::Metric(Metric::CasesPerMillion))
            .unwrap();
        assert!(replaced.is_empty());
        assert_eq!(graph.runs("by_metric"), Some(1));
    }

    #[test]
    fn earlier_snapshots_are_not_mutated() {
        let mut graph = graph();
        let before = graph.outputs();
        graph
            .set_input("countries", InputValue::Countries(["A".to_string()].into()))
            .unwrap();
        assert_eq!(before["c"], slices("c", 0.0));
        assert_eq!(graph.outputs()["c"], slices("c", 1.0));
    }

    #[test]
    fn rejects_wrong_value_kind_and_unknown_cell() {
        let mut graph = graph();
        let err = graph
            .set_input("metric", InputValue::Countries(BTreeSet::new()))
            .unwrap_err();
        assert!(matches!(err, Error::InputType { .. }));
        assert!(matches!(
            graph.set_input("nope", InputValue::Countries(BTreeSet::new())),
            Err(Error::UnknownInput(_))
        ));
    }

    #[test]
    fn failing_rule_keeps_previous_state() {
        let rules = vec![Rule::new("picky", &["metric"], &["m"], |inputs: &Inputs<'_>, _: &()| {
            match inputs.metric("metric")? {
                Metric::CasesPerMillion => Ok(vec![slices("m", 1.0)]),
                Metric::DeathsPerMillion => Err(Error::Schema("no deaths column".into())),
            }
        })];
        let mut graph = ReactiveGraph::new(Arc::new(()), vec![metric_cell()], rules).unwrap();

        assert!(graph
            .set_input("metric", InputValue::Metric(Metric::DeathsPerMillion))
            .is_err());
        assert_eq!(
            graph.input("metric").unwrap(),
            &InputValue::Metric(Metric::CasesPerMillion)
        );
        assert_eq!(graph.output("m").unwrap(), &slices("m", 1.0));
        assert_eq!(graph.runs("picky"), Some(1));
    }

    #[test]
    fn rule_cannot_read_an_undeclared_cell() {
        let sneaky = vec![Rule::new("sneaky", &["metric"], &["o"], |inputs: &Inputs<'_>, _: &()| {
            Ok(vec![slices("o", inputs.countries("countries")?.len() as f64)])
        })];
        let err = ReactiveGraph::new(Arc::new(()), vec![metric_cell(), countries_cell()], sneaky)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(msg) if msg.contains("undeclared input `countries`")));

        // Declared reads still resolve, and undeclared ones fail on update too.
        let flip = vec![Rule::new("flip", &["metric"], &["o"], |inputs: &Inputs<'_>, _: &()| {
            match inputs.metric("metric")? {
                Metric::CasesPerMillion => Ok(vec![slices("o", 0.0)]),
                Metric::DeathsPerMillion => Ok(vec![slices("o", inputs.countries("countries")?.len() as f64)]),
            }
        })];
        let mut graph = ReactiveGraph::new(Arc::new(()), vec![metric_cell(), countries_cell()], flip).unwrap();
        assert!(matches!(
            graph.set_input("metric", InputValue::Metric(Metric::DeathsPerMillion)),
            Err(Error::Config(_))
        ));
        assert_eq!(graph.input("metric").unwrap(), &InputValue::Metric(Metric::CasesPerMillion));
        assert_eq!(graph.input("countries").unwrap(), &InputValue::Countries(BTreeSet::new()));
    }

    #[test]
    fn rejects_inconsistent_declarations() {
        let unknown_read = vec![Rule::new("r", &["missing"], &["o"], |_: &Inputs<'_>, _: &()| {
            Ok(vec![slices("o", 0.0)])
        })];
        assert!(matches!(
            ReactiveGraph::new(Arc::new(()), vec![metric_cell()], unknown_read),
            Err(Error::Config(_))
        ));

        let shared_output = vec![
            Rule::new("a", &["metric"], &["o"], |_: &Inputs<'_>, _: &()| Ok(vec![slices("o", 0.0)])),
            Rule::new("b", &["metric"], &["o"], |_: &Inputs<'_>, _: &()| Ok(vec![slices("o", 0.0)])),
        ];
        assert!(matches!(
            ReactiveGraph::new(Arc::new(()), vec![metric_cell()], shared_output),
            Err(Error::Config(_))
        ));

        let wrong_arity = vec![Rule::new("a", &["metric"], &["x", "y"], |_: &Inputs<'_>, _: &()| {
            Ok(vec![slices("x", 0.0)])
        })];
        assert!(matches!(
            ReactiveGraph::new(Arc::new(()), vec![metric_cell()], wrong_arity),
            Err(Error::Config(_))
        ));
    }
}
