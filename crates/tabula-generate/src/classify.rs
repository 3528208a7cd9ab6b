//! Two-phase column ordering within a row.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use crate::expr::Program;

/// What the classifier needs to know about one column.
#[derive(Debug, Clone)]
pub struct ColumnInfo<'a> {
    pub name: &'a str,
    pub is_primary_key: bool,
    pub program: &'a Program,
}

/// Column indices in evaluation order, split by phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Phases {
    /// Primary keys, foreign-key calls and columns reading no sibling.
    pub phase_a: Vec<usize>,
    /// Columns reading materialized siblings.
    pub phase_b: Vec<usize>,
    /// Primary keys (by index) reading phase-B siblings, which have no value
    /// yet when the key is evaluated.
    pub early_keys: Vec<(usize, Vec<String>)>,
}

impl Phases {
    /// Indices in the order they are evaluated.
    pub fn order(&self) -> impl Iterator<Item = usize> + '_ {
        self.phase_a.iter().chain(self.phase_b.iter()).copied()
    }
}

/// Siblings of `column` that `program` reads.
pub fn sibling_references(
    column: &str,
    program: &Program,
    names: &HashSet<&str>,
) -> BTreeSet<String> {
    program
        .identifiers()
        .into_iter()
        .filter(|name| name != column && names.contains(name.as_str()))
        .collect()
}

/// Partition `columns` into phase A and phase B, keeping declared order in each.
pub fn classify(table: &str, columns: &[ColumnInfo<'_>]) -> Phases {
    let names: HashSet<&str> = columns.iter().map(|column| column.name).collect();
    let mut phases = Phases::default();
    let mut references = Vec::with_capacity(columns.len());

    for (index, column) in columns.iter().enumerate() {
        let siblings = sibling_references(column.name, column.program, &names);
        let has_fk = column.program.calls("foreign_key");
        if column.is_primary_key || has_fk || siblings.is_empty() {
            phases.phase_a.push(index);
        } else {
            phases.phase_b.push(index);
        }
        references.push(siblings);
    }

    let phase_b: HashSet<&str> = phases
        .phase_b
        .iter()
        .map(|&index| columns[index].name)
        .collect();
    for &index in &phases.phase_a {
        let column = &columns[index];
        let late: Vec<String> = references[index]
            .iter()
            .filter(|name| phase_b.contains(name.as_str()))
            .cloned()
            .collect();
        if column.is_primary_key && !late.is_empty() {
            warn!(
                table = %table,
                column = %column.name,
                references = ?late,
                "primary key reads columns that are evaluated after it"
            );
            phases.early_keys.push((index, late));
        }
    }

    debug!(
        table = %table,
        phase_a = ?phases.phase_a.iter().map(|&index| columns[index].name).collect::<Vec<_>>(),
        phase_b = ?phases.phase_b.iter().map(|&index| columns[index].name).collect::<Vec<_>>(),
        "classified columns"
    );
    phases
}

#[cfg(test)]
mod tests {
    use super::*;

    fn programs(sources: &[&str]) -> Vec<Program> {
        sources
            .iter()
            .map(|source| Program::compile(source, "func_t_c").unwrap())
            .collect()
    }

    fn infos<'a>(names: &[&'a str], pks: &[bool], programs: &'a [Program]) -> Vec<ColumnInfo<'a>> {
        names
            .iter()
            .zip(pks)
            .zip(programs)
            .map(|((name, pk), program)| ColumnInfo {
                name: *name,
                is_primary_key: *pk,
                program,
            })
            .collect()
    }

    #[test]
    fn dependent_columns_move_to_phase_b_in_declared_order() {
        let programs = programs(&[
            "full_name.upper()",
            "row_id",
            "first + ' ' + last",
            "fake.first_name()",
            "fake.last_name()",
        ]);
        let columns = infos(
            &["shout", "id", "full_name", "first", "last"],
            &[false, true, false, false, false],
            &programs,
        );
        let phases = classify("people", &columns);
        assert_eq!(phases.phase_a, vec![1, 3, 4]);
        assert_eq!(phases.phase_b, vec![0, 2]);
        assert_eq!(phases.order().collect::<Vec<_>>(), vec![1, 3, 4, 0, 2]);
    }

    #[test]
    fn name_fragments_are_not_references() {
        let programs = programs(&["row_id", "'order_' + str(row_id)"]);
        let columns = infos(&["order", "label"], &[false, false], &programs);
        let phases = classify("orders", &columns);
        assert_eq!(phases.phase_a, vec![0, 1]);
        assert!(phases.phase_b.is_empty());
    }

    #[test]
    fn foreign_keys_and_primary_keys_stay_in_phase_a() {
        let programs = programs(&[
            "code * 10",
            "foreign_key('customers', 'customer_id') if code else None",
            "row_id",
        ]);
        let columns = infos(&["id", "customer_id", "code"], &[true, false, false], &programs);
        let phases = classify("orders", &columns);
        assert_eq!(phases.phase_a, vec![0, 1, 2]);
        assert!(phases.early_keys.is_empty());
    }

    #[test]
    fn primary_keys_reading_phase_b_columns_are_reported() {
        let programs = programs(&["label + '-key'", "'x'", "tag.upper()"]);
        let columns = infos(&["id", "tag", "label"], &[true, false, false], &programs);
        let phases = classify("things", &columns);
        assert_eq!(phases.phase_a, vec![0, 1]);
        assert_eq!(phases.phase_b, vec![2]);
        assert_eq!(phases.early_keys, vec![(0, vec!["label".to_string()])]);
    }

    #[test]
    fn copy_reads_its_key_column() {
        let programs = programs(&[
            "foreign_key('customers', 'customer_id')",
            "copy_from_fk('customer_id', 'customers', 'email')",
        ]);
        let columns = infos(&["customer_id", "customer_email"], &[false, false], &programs);
        let phases = classify("orders", &columns);
        assert_eq!(phases.phase_a, vec![0]);
        assert_eq!(phases.phase_b, vec![1]);
    }
}
