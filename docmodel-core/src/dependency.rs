//! Field dependency graph
//!
//! Built once per entity descriptor from the parameter sets of every field's
//! logic expressions, lookup and virtual value provider. The map is stored
//! inverted: given a changed field, [`FieldDependencyMap::triggers_of`] lists
//! exactly the `(kind, field)` recomputations that change requires.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// What has to be recomputed on the affected field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DependencyType {
    ReadonlyLogic,
    DisplayLogic,
    MandatoryLogic,
    LookupValues,
    /// Virtual field value
    FieldValue,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One edge of the graph, seen from one of its ends
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldDependency {
    pub kind: DependencyType,
    pub field_name: String,
}

/// Immutable `changed field -> recomputations` map
#[derive(Debug, Clone, Default)]
pub struct FieldDependencyMap {
    /// changed field -> (kind, affected field)
    triggers: BTreeMap<String, Vec<FieldDependency>>,
    /// affected field -> (kind, parameter field)
    dependents: BTreeMap<String, Vec<FieldDependency>>,
    edges: usize,
}

impl FieldDependencyMap {
    pub fn builder() -> FieldDependencyMapBuilder {
        FieldDependencyMapBuilder::default()
    }

    /// Recomputations needed after `changed_field` changed.
    pub fn triggers_of(&self, changed_field: &str) -> &[FieldDependency] {
        self.triggers
            .get(changed_field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Fields `field_name` depends on, with the kind of each dependency.
    pub fn dependents_of<'a>(
        &'a self,
        field_name: &str,
    ) -> impl Iterator<Item = &'a FieldDependency> + 'a {
        self.dependents.get(field_name).into_iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.edges == 0
    }

    /// Number of distinct edges.
    pub fn len(&self) -> usize {
        self.edges
    }

    /// A cycle among virtual field value edges, as the list of fields on it.
    pub fn find_value_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            map: &'a FieldDependencyMap,
            node: &'a str,
            marks: &mut BTreeMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            match marks.get(node) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(node.to_string());
                    return Some(cycle);
                }
                None => {}
            }

            marks.insert(node, Mark::Visiting);
            stack.push(node);
            for dep in map.triggers_of(node) {
                if dep.kind != DependencyType::FieldValue {
                    continue;
                }
                if let Some(cycle) = visit(map, &dep.field_name, marks, stack) {
                    return Some(cycle);
                }
            }
            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        let mut marks = BTreeMap::new();
        let mut stack = Vec::new();
        for node in self.triggers.keys() {
            if let Some(cycle) = visit(self, node, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }
}

#[derive(Debug, Default)]
pub struct FieldDependencyMapBuilder {
    edges: BTreeSet<(String, DependencyType, String)>,
}

impl FieldDependencyMapBuilder {
    /// `dependent`'s `kind` must be recomputed whenever any of `parameters`
    /// changes. Self references are ignored.
    pub fn add<I, S>(mut self, dependent: &str, parameters: I, kind: DependencyType) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for parameter in parameters {
            let parameter = parameter.as_ref();
            if parameter == dependent {
                continue;
            }
            self.edges
                .insert((parameter.to_string(), kind, dependent.to_string()));
        }
        self
    }

    pub fn build(self) -> FieldDependencyMap {
        let mut map = FieldDependencyMap {
            edges: self.edges.len(),
            ..Default::default()
        };
        for (parameter, kind, dependent) in self.edges {
            map.triggers
                .entry(parameter.clone())
                .or_default()
                .push(FieldDependency {
                    kind,
                    field_name: dependent.clone(),
                });
            map.dependents.entry(dependent).or_default().push(FieldDependency {
                kind,
                field_name: parameter,
            });
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(kind: DependencyType, field_name: &str) -> FieldDependency {
        FieldDependency {
            kind,
            field_name: field_name.to_string(),
        }
    }

    #[test]
    fn test_triggers_are_inverted() {
        let map = FieldDependencyMap::builder()
            .add("DiscountRate", ["IsDiscounted"], DependencyType::ReadonlyLogic)
            .add("DiscountRate", ["IsDiscounted", "Total"], DependencyType::MandatoryLogic)
            .add("Warehouse", ["Org"], DependencyType::LookupValues)
            .build();

        assert_eq!(
            map.triggers_of("IsDiscounted"),
            &[
                dep(DependencyType::ReadonlyLogic, "DiscountRate"),
                dep(DependencyType::MandatoryLogic, "DiscountRate"),
            ]
        );
        assert_eq!(
            map.triggers_of("Total"),
            &[dep(DependencyType::MandatoryLogic, "DiscountRate")]
        );
        assert!(map.triggers_of("DiscountRate").is_empty());
        assert_eq!(map.len(), 4);

        let deps: Vec<_> = map.dependents_of("Warehouse").collect();
        assert_eq!(deps, vec![&dep(DependencyType::LookupValues, "Org")]);
    }

    #[test]
    fn test_self_edges_and_duplicates_are_dropped() {
        let map = FieldDependencyMap::builder()
            .add("A", ["A", "B", "B"], DependencyType::DisplayLogic)
            .build();
        assert_eq!(map.len(), 1);
        assert!(map.triggers_of("A").is_empty());
    }

    #[test]
    fn test_empty_map() {
        let map = FieldDependencyMap::builder().build();
        assert!(map.is_empty());
        assert!(map.triggers_of("anything").is_empty());
        assert!(map.find_value_cycle().is_none());
    }

    #[test]
    fn test_value_cycle_detection() {
        let acyclic = FieldDependencyMap::builder()
            .add("Net", ["Total", "DiscountRate"], DependencyType::FieldValue)
            .add("Tax", ["Net"], DependencyType::FieldValue)
            .build();
        assert!(acyclic.find_value_cycle().is_none());

        let cyclic = FieldDependencyMap::builder()
            .add("A", ["B"], DependencyType::FieldValue)
            .add("B", ["A"], DependencyType::FieldValue)
            .build();
        let cycle = cyclic.find_value_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 3);

        // logic edges never form value cycles
        let logic_only = FieldDependencyMap::builder()
            .add("A", ["B"], DependencyType::ReadonlyLogic)
            .add("B", ["A"], DependencyType::ReadonlyLogic)
            .build();
        assert!(logic_only.find_value_cycle().is_none());
    }
}
