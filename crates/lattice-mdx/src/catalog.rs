//! Cube metadata: catalogs, cubes, dimensions, hierarchies, levels, measures.
//!
//! A [`Catalog`] is immutable after load and shared read-only across
//! concurrent queries. Every lookup a query needs at execution time (join
//! keys, level columns) is validated and indexed when the cube is assembled,
//! so execution never discovers a broken schema halfway through.

use crate::table::Table;
use crate::value::Value;
use std::collections::{HashMap, HashSet};

pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("unknown catalog: {0}")]
    UnknownCatalog(String),

    #[error("unknown cube: {0}")]
    UnknownCube(String),

    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("unknown hierarchy [{dimension}].[{hierarchy}]")]
    UnknownHierarchy {
        dimension: String,
        hierarchy: String,
    },

    #[error("unknown level {level} in {hierarchy}")]
    UnknownLevel { hierarchy: String, level: String },

    #[error("unknown member {member} in {hierarchy}")]
    UnknownMember { hierarchy: String, member: String },

    #[error("unknown measure: {0}")]
    UnknownMeasure(String),

    #[error("cube {0} defines no measures")]
    NoMeasures(String),

    #[error("measures referenced on more than one axis")]
    MeasuresOnBothAxes,

    #[error("hierarchy {0} bound more than once in one tuple")]
    HierarchyReused(String),

    #[error("drill target {0} is not a member reference")]
    DrillTargetNotMember(String),

    #[error("slicer entries must be member references, got {0}")]
    SlicerNotMember(String),

    #[error("duplicate cube: {0}")]
    DuplicateCube(String),

    #[error("duplicate dimension: {0}")]
    DuplicateDimension(String),

    #[error("duplicate measure: {0}")]
    DuplicateMeasure(String),

    #[error("row width mismatch in {table}: expected {expected} values, got {actual}")]
    RowWidthMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("missing column {column} in table {table}")]
    MissingColumn { table: String, column: String },

    #[error("non-unique key in {table}[{column}]: {value}")]
    NonUniqueKey {
        table: String,
        column: String,
        value: Value,
    },
}

/// Wrap `name` in brackets, escaping any literal `]` as `]]`.
pub(crate) fn bracketed(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

#[derive(Clone, Debug)]
pub struct Level {
    pub name: String,
    /// Source column in the dimension table.
    pub column: String,
}

impl Level {
    pub fn new(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
        }
    }
}

/// An ordered chain of levels, root-most first. Rank 0 is the implicit "All"
/// root; concrete levels carry ranks `1..=depth`.
#[derive(Clone, Debug)]
pub struct Hierarchy {
    pub name: String,
    pub levels: Vec<Level>,
}

impl Hierarchy {
    pub fn new(name: impl Into<String>, levels: Vec<Level>) -> Self {
        Self {
            name: name.into(),
            levels,
        }
    }

    /// Number of concrete levels.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// 1-based rank of the named level.
    pub fn level_rank(&self, name: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|l| l.name.eq_ignore_ascii_case(name))
            .map(|i| i + 1)
    }
}

#[derive(Clone, Debug)]
pub struct Dimension {
    name: String,
    key_column: String,
    table: Table,
    hierarchies: Vec<Hierarchy>,
    // Per-hierarchy column indexes into the dimension table, outer index by
    // hierarchy, inner by level rank - 1.
    level_columns: Vec<Vec<usize>>,
    key_index: HashMap<Value, usize>,
}

impl Dimension {
    /// Assemble a dimension, eagerly indexing the key column and resolving
    /// every level column. Keys must be unique: a dimension row is the single
    /// source of a fact row's member path.
    pub fn new(
        name: impl Into<String>,
        table: Table,
        key_column: impl Into<String>,
        hierarchies: Vec<Hierarchy>,
    ) -> SchemaResult<Self> {
        let name = name.into();
        let key_column = key_column.into();

        let key_idx = table
            .column_idx(&key_column)
            .ok_or_else(|| SchemaError::MissingColumn {
                table: table.name().to_string(),
                column: key_column.clone(),
            })?;

        let mut level_columns = Vec::with_capacity(hierarchies.len());
        for hierarchy in &hierarchies {
            let mut columns = Vec::with_capacity(hierarchy.levels.len());
            for level in &hierarchy.levels {
                let idx = table.column_idx(&level.column).ok_or_else(|| {
                    SchemaError::MissingColumn {
                        table: table.name().to_string(),
                        column: level.column.clone(),
                    }
                })?;
                columns.push(idx);
            }
            level_columns.push(columns);
        }

        let mut key_index = HashMap::new();
        for row in 0..table.row_count() {
            let Some(key) = table.value_by_idx(row, key_idx) else {
                continue;
            };
            if key_index.insert(key.clone(), row).is_some() {
                return Err(SchemaError::NonUniqueKey {
                    table: table.name().to_string(),
                    column: key_column.clone(),
                    value: key.clone(),
                });
            }
        }

        Ok(Self {
            name,
            key_column,
            table,
            hierarchies,
            level_columns,
            key_index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn hierarchies(&self) -> &[Hierarchy] {
        &self.hierarchies
    }

    pub fn hierarchy(&self, name: &str) -> Option<(usize, &Hierarchy)> {
        self.hierarchies
            .iter()
            .enumerate()
            .find(|(_, h)| h.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn key_row(&self, key: &Value) -> Option<usize> {
        self.key_index.get(key).copied()
    }

    /// Member path of the dimension row under `hierarchy`, covering level
    /// ranks `1..=depth`.
    pub(crate) fn path_at(&self, hierarchy: usize, row: usize, depth: usize) -> Vec<Value> {
        self.level_columns[hierarchy][..depth]
            .iter()
            .map(|&col| {
                self.table
                    .value_by_idx(row, col)
                    .cloned()
                    .unwrap_or(Value::Blank)
            })
            .collect()
    }

    /// True if some dimension row carries exactly `path` at the hierarchy's
    /// leading levels.
    pub fn member_exists(&self, hierarchy: usize, path: &[Value]) -> bool {
        if path.len() > self.level_columns[hierarchy].len() {
            return false;
        }
        (0..self.table.row_count()).any(|row| self.row_matches(hierarchy, row, path))
    }

    /// Distinct members one level below `path`, in dimension-table order.
    /// Empty when `path` already sits at the leaf level.
    pub fn children_of(&self, hierarchy: usize, path: &[Value]) -> Vec<Value> {
        let columns = &self.level_columns[hierarchy];
        if path.len() >= columns.len() {
            return Vec::new();
        }
        let child_col = columns[path.len()];
        let mut seen = HashSet::new();
        let mut children = Vec::new();
        for row in 0..self.table.row_count() {
            if !self.row_matches(hierarchy, row, path) {
                continue;
            }
            let Some(child) = self.table.value_by_idx(row, child_col) else {
                continue;
            };
            if seen.insert(child.clone()) {
                children.push(child.clone());
            }
        }
        children
    }

    /// First member at the hierarchy's root-most concrete level, used as the
    /// default member when the hierarchy sits on no axis.
    pub fn default_member(&self, hierarchy: usize) -> Option<Value> {
        let col = *self.level_columns[hierarchy].first()?;
        self.table.value_by_idx(0, col).cloned()
    }

    fn row_matches(&self, hierarchy: usize, row: usize, path: &[Value]) -> bool {
        self.level_columns[hierarchy]
            .iter()
            .zip(path)
            .all(|(&col, want)| self.table.value_by_idx(row, col) == Some(want))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregator {
    /// Sum of the source column, skipping blanks.
    Sum,
    /// Count of non-blank values in the source column.
    Count,
}

#[derive(Clone, Debug)]
pub struct Measure {
    pub name: String,
    /// Source column in the fact table.
    pub column: String,
    pub aggregator: Aggregator,
}

impl Measure {
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        aggregator: Aggregator,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            aggregator,
        }
    }

    pub fn unique_name(&self) -> String {
        format!("[Measures].{}", bracketed(&self.name))
    }
}

#[derive(Clone, Debug)]
pub struct Cube {
    name: String,
    fact: Table,
    dimensions: Vec<Dimension>,
    dimension_index: HashMap<String, usize>,
    measures: Vec<Measure>,
    measure_index: HashMap<String, usize>,
}

impl Cube {
    pub fn new(name: impl Into<String>, fact: Table) -> Self {
        Self {
            name: name.into(),
            fact,
            dimensions: Vec::new(),
            dimension_index: HashMap::new(),
            measures: Vec::new(),
            measure_index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fact(&self) -> &Table {
        &self.fact
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    /// Attach a dimension. Its key column must also exist in the fact table;
    /// that shared column is the join key.
    pub fn add_dimension(&mut self, dimension: Dimension) -> SchemaResult<()> {
        if self.dimension_index.contains_key(&dimension.name) {
            return Err(SchemaError::DuplicateDimension(dimension.name.clone()));
        }
        if self.fact.column_idx(&dimension.key_column).is_none() {
            return Err(SchemaError::MissingColumn {
                table: self.fact.name().to_string(),
                column: dimension.key_column.clone(),
            });
        }
        self.dimension_index
            .insert(dimension.name.clone(), self.dimensions.len());
        self.dimensions.push(dimension);
        Ok(())
    }

    pub fn add_measure(&mut self, measure: Measure) -> SchemaResult<()> {
        if self.measure_index.contains_key(&measure.name) {
            return Err(SchemaError::DuplicateMeasure(measure.name.clone()));
        }
        if self.fact.column_idx(&measure.column).is_none() {
            return Err(SchemaError::MissingColumn {
                table: self.fact.name().to_string(),
                column: measure.column.clone(),
            });
        }
        self.measure_index
            .insert(measure.name.clone(), self.measures.len());
        self.measures.push(measure);
        Ok(())
    }

    pub fn dimension(&self, name: &str) -> Option<(usize, &Dimension)> {
        self.dimensions
            .iter()
            .enumerate()
            .find(|(_, d)| d.name.eq_ignore_ascii_case(name))
    }

    pub fn measure(&self, name: &str) -> Option<(usize, &Measure)> {
        self.measures
            .iter()
            .enumerate()
            .find(|(_, m)| m.name.eq_ignore_ascii_case(name))
    }

    pub fn dimension_unique_name(&self, dimension: usize) -> String {
        bracketed(self.dimensions[dimension].name())
    }

    pub fn hierarchy_unique_name(&self, dimension: usize, hierarchy: usize) -> String {
        let dim = &self.dimensions[dimension];
        format!(
            "{}.{}",
            bracketed(dim.name()),
            bracketed(&dim.hierarchies()[hierarchy].name)
        )
    }

    pub fn level_unique_name(&self, dimension: usize, hierarchy: usize, rank: usize) -> String {
        let dim = &self.dimensions[dimension];
        let level = &dim.hierarchies()[hierarchy].levels[rank - 1];
        format!(
            "{}.{}",
            self.hierarchy_unique_name(dimension, hierarchy),
            bracketed(&level.name)
        )
    }

    /// Unique name of the member at `path`: its own level's unique name
    /// followed by every path value in brackets. The empty path names the
    /// hierarchy's implicit All member.
    pub fn member_unique_name(&self, dimension: usize, hierarchy: usize, path: &[Value]) -> String {
        if path.is_empty() {
            return format!("{}.[All]", self.hierarchy_unique_name(dimension, hierarchy));
        }
        let mut unique = self.level_unique_name(dimension, hierarchy, path.len());
        for value in path {
            unique.push('.');
            unique.push_str(&bracketed(&value.to_string()));
        }
        unique
    }
}

/// The process-wide store of cubes. Wire-protocol catalogs map one-to-one to
/// cubes, so the active-catalog selection of a session names a cube here.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    cubes: Vec<Cube>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cube(&mut self, cube: Cube) -> SchemaResult<()> {
        if self.index.contains_key(cube.name()) {
            return Err(SchemaError::DuplicateCube(cube.name().to_string()));
        }
        self.index.insert(cube.name().to_string(), self.cubes.len());
        self.cubes.push(cube);
        Ok(())
    }

    pub fn cube(&self, name: &str) -> Option<&Cube> {
        self.index.get(name).map(|&i| &self.cubes[i])
    }

    pub fn cubes(&self) -> &[Cube] {
        &self.cubes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn geography() -> Dimension {
        let mut table = Table::new("Geography", vec!["Continent", "Country"]);
        table
            .push_row(vec!["Europe".into(), "France".into()])
            .unwrap();
        table
            .push_row(vec!["Europe".into(), "Spain".into()])
            .unwrap();
        table
            .push_row(vec!["America".into(), "United States".into()])
            .unwrap();
        Dimension::new(
            "Geography",
            table,
            "Country",
            vec![Hierarchy::new(
                "Geography",
                vec![
                    Level::new("Continent", "Continent"),
                    Level::new("Country", "Country"),
                ],
            )],
        )
        .unwrap()
    }

    #[test]
    fn member_lookup_walks_level_prefixes() {
        let dim = geography();
        assert!(dim.member_exists(0, &["Europe".into()]));
        assert!(dim.member_exists(0, &["Europe".into(), "Spain".into()]));
        assert!(!dim.member_exists(0, &["Europe".into(), "United States".into()]));
        assert_eq!(
            dim.children_of(0, &["Europe".into()]),
            vec![Value::from("France"), Value::from("Spain")]
        );
        assert_eq!(dim.children_of(0, &["Europe".into(), "Spain".into()]), vec![]);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut table = Table::new("Geography", vec!["Continent", "Country"]);
        table
            .push_row(vec!["Europe".into(), "Spain".into()])
            .unwrap();
        table
            .push_row(vec!["America".into(), "Spain".into()])
            .unwrap();
        let err = Dimension::new(
            "Geography",
            table,
            "Country",
            vec![Hierarchy::new(
                "Geography",
                vec![Level::new("Country", "Country")],
            )],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::NonUniqueKey { .. }));
    }

    #[test]
    fn bracket_escaping_doubles_closing_brackets() {
        assert_eq!(bracketed("Amount"), "[Amount]");
        assert_eq!(bracketed("Total]Net"), "[Total]]Net]");
    }
}
