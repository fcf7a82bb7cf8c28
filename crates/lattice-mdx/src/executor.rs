//! Query execution against the star schema.
//!
//! Execution first materializes a [`FactView`]: for every hierarchy the plan
//! touches, the member path of each fact row, plus the subset of fact rows
//! passing the slicer. Axis groups then expand against the view into concrete
//! tuples, and each grid cell aggregates the fact rows matching both of its
//! tuples. Tuples keep fact-table appearance order unless the axis asked for
//! `Hierarchize`.

use crate::catalog::{Aggregator, Cube, Measure};
use crate::resolve::{GroupEntry, GroupSpec, HierarchyRef, ResolvedAxis, ResolvedPlan};
use crate::table::Table;
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

pub type ExecResult<T> = Result<T, ExecutionError>;

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("dimension {dimension} joins on missing fact column {column}")]
    MissingJoinColumn { dimension: String, column: String },

    #[error("measure {measure} reads missing fact column {column}")]
    MissingMeasureColumn { measure: String, column: String },

    #[error("measure {measure} found non-numeric value {value} in fact column {column}")]
    NonNumericMeasure {
        measure: String,
        column: String,
        value: Value,
    },

    #[error("fact key {value} has no row in dimension {dimension}")]
    UnmatchedFactKey { dimension: String, value: Value },

    #[error("query cancelled")]
    Cancelled,
}

/// Shared cancellation flag. Cloning hands out another handle to the same
/// flag; execution polls it between phases and once per grid row.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(AtomicOrdering::Relaxed)
    }

    fn check(&self) -> ExecResult<()> {
        if self.is_cancelled() {
            Err(ExecutionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One concrete tuple on an axis.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisKey {
    /// One member path per axis hierarchy slot, padded with [`Value::Blank`]
    /// to the slot's depth.
    pub segments: Vec<Vec<Value>>,
    /// How many leading values of each path the tuple actually declares. The
    /// remainder is padding.
    pub specified: Vec<usize>,
    pub measure: Option<usize>,
}

#[derive(Debug)]
pub struct AxisTable {
    pub hierarchies: Vec<HierarchyRef>,
    pub has_measures: bool,
    pub measures_first: bool,
    pub keys: Vec<AxisKey>,
}

#[derive(Debug)]
pub struct QueryResult {
    /// Axis 0 (columns) first, then axis 1 (rows) if the query had one.
    pub axes: Vec<AxisTable>,
    /// Row-major, columns innermost: cell `i` sits at column `i % columns`.
    pub cells: Vec<Value>,
    pub columns: usize,
    /// Measure index used for tuples that bind none themselves.
    pub default_measure: usize,
}

pub fn execute(plan: &ResolvedPlan<'_>, cancel: &CancelToken) -> ExecResult<QueryResult> {
    cancel.check()?;
    let view = FactView::build(plan)?;
    cancel.check()?;

    let mut axes = Vec::with_capacity(plan.axes.len());
    for axis in &plan.axes {
        cancel.check()?;
        axes.push(AxisTable {
            hierarchies: axis.hierarchies.clone(),
            has_measures: axis.has_measures,
            measures_first: axis.measures_first,
            keys: expand_axis(axis, &view),
        });
    }

    let (mut cells, mut columns) = compute_cells(plan, &view, &axes, cancel)?;
    apply_non_empty(plan, &mut axes, &mut cells, &mut columns);

    Ok(QueryResult {
        axes,
        cells,
        columns,
        default_measure: plan.measures[0],
    })
}

/// Per-hierarchy member paths for every fact row, and the fact rows that
/// survive the slicer.
struct FactView {
    paths: HashMap<(usize, usize), Vec<Vec<Value>>>,
    rows: Vec<usize>,
}

impl FactView {
    fn build(plan: &ResolvedPlan<'_>) -> ExecResult<Self> {
        let cube = plan.cube;
        let fact = cube.fact();

        let mut needed: HashMap<(usize, usize), usize> = HashMap::new();
        for axis in &plan.axes {
            for href in &axis.hierarchies {
                let depth = needed.entry((href.dimension, href.hierarchy)).or_default();
                *depth = (*depth).max(href.depth);
            }
        }
        for filter in &plan.slicer {
            let depth = needed.entry((filter.dimension, filter.hierarchy)).or_default();
            *depth = (*depth).max(filter.path.len());
        }

        let mut paths = HashMap::with_capacity(needed.len());
        for (&(dim_idx, hier_idx), &depth) in &needed {
            let dim = &cube.dimensions()[dim_idx];
            let key_col = fact.column_idx(dim.key_column()).ok_or_else(|| {
                ExecutionError::MissingJoinColumn {
                    dimension: dim.name().to_string(),
                    column: dim.key_column().to_string(),
                }
            })?;
            let mut per_row = Vec::with_capacity(fact.row_count());
            for row in 0..fact.row_count() {
                let key = fact
                    .value_by_idx(row, key_col)
                    .cloned()
                    .unwrap_or(Value::Blank);
                let dim_row =
                    dim.key_row(&key)
                        .ok_or_else(|| ExecutionError::UnmatchedFactKey {
                            dimension: dim.name().to_string(),
                            value: key.clone(),
                        })?;
                per_row.push(dim.path_at(hier_idx, dim_row, depth));
            }
            paths.insert((dim_idx, hier_idx), per_row);
        }

        let rows = (0..fact.row_count())
            .filter(|&row| {
                plan.slicer.iter().all(|filter| {
                    path_lookup(&paths, filter.dimension, filter.hierarchy, row)
                        .starts_with(&filter.path)
                })
            })
            .collect();

        Ok(Self { paths, rows })
    }

    fn path_of(&self, dimension: usize, hierarchy: usize, row: usize) -> &[Value] {
        path_lookup(&self.paths, dimension, hierarchy, row)
    }
}

fn path_lookup(
    paths: &HashMap<(usize, usize), Vec<Vec<Value>>>,
    dimension: usize,
    hierarchy: usize,
    row: usize,
) -> &[Value] {
    paths
        .get(&(dimension, hierarchy))
        .and_then(|rows| rows.get(row))
        .map_or(&[], |path| path.as_slice())
}

fn expand_axis(axis: &ResolvedAxis, view: &FactView) -> Vec<AxisKey> {
    let mut seen: HashSet<(Vec<Vec<Value>>, Option<usize>)> = HashSet::new();
    let mut keys = Vec::new();

    for group in &axis.groups {
        let scans = group
            .entries
            .iter()
            .any(|entry| matches!(entry, GroupEntry::Scan { .. }));
        if scans {
            expand_scan_group(axis, group, view, &mut seen, &mut keys);
        } else {
            // Explicit tuples appear at their position in the statement even
            // when no fact row matches them.
            let mut segments = Vec::with_capacity(group.entries.len());
            let mut specified = Vec::with_capacity(group.entries.len());
            for (slot, entry) in group.entries.iter().enumerate() {
                let path = match entry {
                    GroupEntry::Fixed { path } => path.clone(),
                    _ => Vec::new(),
                };
                specified.push(path.len());
                segments.push(pad(path, axis.hierarchies[slot].depth));
            }
            push_key(&mut seen, &mut keys, segments, specified, group.measure);
        }
    }

    if axis.sorted {
        keys.sort_by(|a, b| {
            cmp_segments(&a.segments, &b.segments).then_with(|| a.measure.cmp(&b.measure))
        });
    }
    keys
}

/// A group containing scans: walk the slicer-filtered fact rows once and emit
/// each distinct combination in appearance order. Scanning all bound slots
/// off the same row keeps the combinations to those that co-occur in the
/// facts.
fn expand_scan_group(
    axis: &ResolvedAxis,
    group: &GroupSpec,
    view: &FactView,
    seen: &mut HashSet<(Vec<Vec<Value>>, Option<usize>)>,
    keys: &mut Vec<AxisKey>,
) {
    'rows: for &row in &view.rows {
        let mut segments = Vec::with_capacity(group.entries.len());
        let mut specified = Vec::with_capacity(group.entries.len());
        for (slot, entry) in group.entries.iter().enumerate() {
            let href = axis.hierarchies[slot];
            match entry {
                GroupEntry::Scan { depth, prefix } => {
                    let path = view.path_of(href.dimension, href.hierarchy, row);
                    if path.len() < *depth || !path.starts_with(prefix) {
                        continue 'rows;
                    }
                    specified.push(*depth);
                    segments.push(pad(path[..*depth].to_vec(), href.depth));
                }
                GroupEntry::Fixed { path } => {
                    let full = view.path_of(href.dimension, href.hierarchy, row);
                    if !full.starts_with(path) {
                        continue 'rows;
                    }
                    specified.push(path.len());
                    segments.push(pad(path.clone(), href.depth));
                }
                GroupEntry::Unbound => {
                    specified.push(0);
                    segments.push(pad(Vec::new(), href.depth));
                }
            }
        }
        push_key(seen, keys, segments, specified, group.measure);
    }
}

fn push_key(
    seen: &mut HashSet<(Vec<Vec<Value>>, Option<usize>)>,
    keys: &mut Vec<AxisKey>,
    segments: Vec<Vec<Value>>,
    specified: Vec<usize>,
    measure: Option<usize>,
) {
    if seen.insert((segments.clone(), measure)) {
        keys.push(AxisKey {
            segments,
            specified,
            measure,
        });
    }
}

fn pad(mut path: Vec<Value>, depth: usize) -> Vec<Value> {
    path.resize(depth, Value::Blank);
    path
}

fn compute_cells(
    plan: &ResolvedPlan<'_>,
    view: &FactView,
    axes: &[AxisTable],
    cancel: &CancelToken,
) -> ExecResult<(Vec<Value>, usize)> {
    let cube = plan.cube;
    let fact = cube.fact();

    let mut measure_columns = Vec::with_capacity(cube.measures().len());
    for measure in cube.measures() {
        let idx = fact.column_idx(&measure.column).ok_or_else(|| {
            ExecutionError::MissingMeasureColumn {
                measure: measure.name.clone(),
                column: measure.column.clone(),
            }
        })?;
        measure_columns.push(idx);
    }

    let columns = axes.first().map_or(1, |axis| axis.keys.len());
    let row_count = axes.get(1).map_or(1, |axis| axis.keys.len());
    let default_measure = plan.measures[0];

    let mut cells = Vec::with_capacity(columns.saturating_mul(row_count));
    for r in 0..row_count {
        cancel.check()?;
        for c in 0..columns {
            let mut tuples: Vec<(&AxisTable, &AxisKey)> = Vec::with_capacity(2);
            if let Some(axis) = axes.first() {
                tuples.push((axis, &axis.keys[c]));
            }
            if let Some(axis) = axes.get(1) {
                tuples.push((axis, &axis.keys[r]));
            }
            let measure_idx = tuples
                .iter()
                .find_map(|(_, key)| key.measure)
                .unwrap_or(default_measure);
            let measure = &cube.measures()[measure_idx];
            cells.push(cell_value(
                view,
                fact,
                &tuples,
                measure,
                measure_columns[measure_idx],
            )?);
        }
    }
    Ok((cells, columns))
}

/// Aggregates the fact rows matching every declared coordinate of both
/// tuples. A sum over no values is blank; a count over no values is zero.
fn cell_value(
    view: &FactView,
    fact: &Table,
    tuples: &[(&AxisTable, &AxisKey)],
    measure: &Measure,
    measure_col: usize,
) -> ExecResult<Value> {
    let mut sum = 0.0;
    let mut count: u64 = 0;
    let mut saw_value = false;

    'rows: for &row in &view.rows {
        for (axis, key) in tuples {
            for (slot, href) in axis.hierarchies.iter().enumerate() {
                let declared = key.specified[slot];
                if declared == 0 {
                    continue;
                }
                let path = view.path_of(href.dimension, href.hierarchy, row);
                if path.len() < declared || path[..declared] != key.segments[slot][..declared] {
                    continue 'rows;
                }
            }
        }
        let value = fact
            .value_by_idx(row, measure_col)
            .cloned()
            .unwrap_or(Value::Blank);
        match measure.aggregator {
            Aggregator::Sum => match value {
                Value::Blank => {}
                Value::Number(n) => {
                    sum += n.into_inner();
                    saw_value = true;
                }
                other => {
                    return Err(ExecutionError::NonNumericMeasure {
                        measure: measure.name.clone(),
                        column: measure.column.clone(),
                        value: other,
                    })
                }
            },
            Aggregator::Count => {
                if !value.is_blank() {
                    count += 1;
                }
            }
        }
    }

    Ok(match measure.aggregator {
        Aggregator::Sum => {
            if saw_value {
                Value::number(sum)
            } else {
                Value::Blank
            }
        }
        Aggregator::Count => Value::number(count as f64),
    })
}

/// `NON EMPTY` pruning. Keep decisions come from the full grid, then rows,
/// columns, and cells shrink together.
fn apply_non_empty(
    plan: &ResolvedPlan<'_>,
    axes: &mut [AxisTable],
    cells: &mut Vec<Value>,
    columns: &mut usize,
) {
    let prune_cols = plan.axes.first().is_some_and(|axis| axis.non_empty);
    let prune_rows = plan.axes.get(1).is_some_and(|axis| axis.non_empty);
    if !prune_cols && !prune_rows {
        return;
    }

    let cols = *columns;
    let rows = axes.get(1).map_or(1, |axis| axis.keys.len());
    let keep_col: Vec<bool> = (0..cols)
        .map(|c| !prune_cols || (0..rows).any(|r| !cells[r * cols + c].is_blank()))
        .collect();
    let keep_row: Vec<bool> = (0..rows)
        .map(|r| !prune_rows || (0..cols).any(|c| !cells[r * cols + c].is_blank()))
        .collect();

    let mut pruned = Vec::new();
    for r in 0..rows {
        if !keep_row[r] {
            continue;
        }
        for c in 0..cols {
            if keep_col[c] {
                pruned.push(cells[r * cols + c].clone());
            }
        }
    }
    *cells = pruned;
    *columns = keep_col.iter().filter(|keep| **keep).count();

    if let Some(axis) = axes.first_mut() {
        retain_keys(axis, &keep_col);
    }
    if let Some(axis) = axes.get_mut(1) {
        retain_keys(axis, &keep_row);
    }
}

fn retain_keys(axis: &mut AxisTable, keep: &[bool]) {
    let mut flags = keep.iter();
    axis.keys.retain(|_| *flags.next().unwrap_or(&true));
}

/// Value ordering for `Hierarchize`: blanks first, then booleans, numbers,
/// and text. Blanks-first is what puts a parent tuple ahead of the children
/// that share its prefix.
pub(crate) fn cmp_value(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Blank => 0,
            Value::Boolean(_) => 1,
            Value::Number(_) => 2,
            Value::Text(_) => 3,
        }
    }
    match (a, b) {
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn cmp_key(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = cmp_value(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn cmp_segments(a: &[Vec<Value>], b: &[Vec<Value>]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = cmp_key(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Flat tabular rendering of a result, one column per rows-axis level plus
/// one data column per columns-axis tuple.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn to_table(&self, cube: &Cube) -> ResultTable {
        let mut columns = Vec::new();
        if let Some(rows_axis) = self.axes.get(1) {
            for href in &rows_axis.hierarchies {
                let hierarchy = &cube.dimensions()[href.dimension].hierarchies()[href.hierarchy];
                for level in &hierarchy.levels[..href.depth] {
                    columns.push(level.name.clone());
                }
            }
        }
        if let Some(cols_axis) = self.axes.first() {
            for key in &cols_axis.keys {
                columns.push(column_label(cube, key));
            }
        } else {
            columns.push(cube.measures()[self.default_measure].name.clone());
        }

        let row_count = self.axes.get(1).map_or(1, |axis| axis.keys.len());
        let mut rows = Vec::with_capacity(row_count);
        for r in 0..row_count {
            let mut row = Vec::with_capacity(columns.len());
            if let Some(rows_axis) = self.axes.get(1) {
                for segment in &rows_axis.keys[r].segments {
                    row.extend(segment.iter().cloned());
                }
            }
            for c in 0..self.columns {
                row.push(self.cells[r * self.columns + c].clone());
            }
            rows.push(row);
        }
        ResultTable { columns, rows }
    }
}

fn column_label(cube: &Cube, key: &AxisKey) -> String {
    let mut parts = Vec::new();
    if let Some(measure) = key.measure {
        parts.push(cube.measures()[measure].name.clone());
    }
    for (slot, segment) in key.segments.iter().enumerate() {
        let declared = key.specified[slot];
        if declared == 0 {
            continue;
        }
        let path: Vec<String> = segment[..declared].iter().map(Value::to_string).collect();
        parts.push(path.join("."));
    }
    if parts.is_empty() {
        "All".to_string()
    } else {
        parts.join(" / ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_ordering_puts_blanks_first() {
        let mut values = vec![
            Value::from("x"),
            Value::from(2),
            Value::Blank,
            Value::from(true),
            Value::from(1),
        ];
        values.sort_by(cmp_value);
        assert_eq!(
            values,
            vec![
                Value::Blank,
                Value::from(true),
                Value::from(1),
                Value::from(2),
                Value::from("x"),
            ]
        );
    }

    #[test]
    fn cancel_token_trips_all_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(ExecutionError::Cancelled)));
    }
}
