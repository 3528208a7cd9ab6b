//! Name-based resolution of `data: auto` columns.
//!
//! A column `<prefix>_<attr>` next to a foreign-key column `<prefix>_id`
//! copies `<attr>` from the parent row that key points to.

use std::collections::HashMap;

use crate::expr::Program;

/// Foreign-key columns of a table mapped to the parent table they reference.
pub fn foreign_key_parents<'a>(
    programs: impl IntoIterator<Item = (&'a str, &'a Program)>,
) -> HashMap<String, String> {
    programs
        .into_iter()
        .filter_map(|(column, program)| {
            program
                .foreign_key_target()
                .map(|(table, _)| (column.to_string(), table))
        })
        .collect()
}

/// `copy_from_fk` source for an `auto` column, when its name allows it.
pub fn infer_copy_source(column: &str, parents: &HashMap<String, String>) -> Option<String> {
    let (prefix, attr) = column.split_once('_')?;
    let fk_column = format!("{prefix}_id");
    let parent = parents.get(&fk_column)?;
    Some(format!("copy_from_fk({fk_column:?}, {parent:?}, {attr:?})"))
}
