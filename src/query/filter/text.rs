//! Free-text search against the resource's precomputed search vector.

use crate::query::clause::{CompiledWhereClause, FieldRef, Operand, RawPredicate};

/// Blank input is a no-op. The search text always travels as an operand.
pub fn compile(value: &str, search_column: &str) -> Vec<CompiledWhereClause> {
    let query = value.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    vec![CompiledWhereClause::raw(
        RawPredicate::FullTextMatch,
        &FieldRef::resource(search_column),
        vec![Operand::Text(query)],
    )]
}
