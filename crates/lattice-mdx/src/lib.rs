mod axis;
mod catalog;
mod executor;
mod parser;
mod resolve;
pub mod store;
mod table;
mod value;

pub use crate::axis::{build_result_set, Axis, MemberCell, ResultSet, Tuple};
pub use crate::catalog::{
    Aggregator, Catalog, Cube, Dimension, Hierarchy, Level, Measure, SchemaError, SchemaResult,
};
pub use crate::executor::{
    execute, AxisKey, AxisTable, CancelToken, ExecResult, ExecutionError, QueryResult, ResultTable,
};
pub use crate::parser::{
    parse, AxisSpec, ParseError, ParseResult, QueryPlan, SegRef, SetExpr, Suffix,
};
pub use crate::resolve::{
    resolve, GroupEntry, GroupSpec, HierarchyRef, MemberFilter, ResolvedAxis, ResolvedPlan,
};
pub use crate::table::Table;
pub use crate::value::Value;

pub type MdxResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Parses, resolves, and executes a statement against `catalog`, producing
/// the renderable result set.
pub fn run_query(catalog: &Catalog, statement: &str, cancel: &CancelToken) -> MdxResult<ResultSet> {
    let plan = parse(statement)?;
    let resolved = resolve(&plan, catalog)?;
    let result = execute(&resolved, cancel)?;
    Ok(build_result_set(&resolved, result))
}

/// Like [`run_query`], but rendered as a flat table with one column per
/// rows-axis level and one data column per columns-axis tuple.
pub fn run_table(
    catalog: &Catalog,
    statement: &str,
    cancel: &CancelToken,
) -> MdxResult<ResultTable> {
    let plan = parse(statement)?;
    let resolved = resolve(&plan, catalog)?;
    let result = execute(&resolved, cancel)?;
    Ok(result.to_table(resolved.cube))
}
