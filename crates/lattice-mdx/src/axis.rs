//! Turns an executed grid into the wire-level result layout.
//!
//! The executor's axis keys are index-based and padded; here every tuple
//! becomes a list of member cells carrying the caption, unique name, level,
//! and child count a client renders from. Padding below a tuple's declared
//! depth is dropped, so a member always presents at its own level. The
//! slicer axis gets one tuple holding the WHERE members plus a default
//! member for every hierarchy the query never mentioned.

use crate::catalog::Cube;
use crate::executor::{AxisTable, QueryResult};
use crate::resolve::ResolvedPlan;
use crate::value::Value;
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq)]
pub struct ResultSet {
    pub cube: String,
    /// Axis0 (columns) first, then Axis1 (rows) when present.
    pub axes: Vec<Axis>,
    pub slicer: Axis,
    /// Row-major, columns innermost.
    pub cells: Vec<Value>,
    pub columns: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Axis {
    pub name: String,
    /// Hierarchy unique names in tuple member order.
    pub hierarchies: Vec<String>,
    pub tuples: Vec<Tuple>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    pub ordinal: usize,
    pub members: Vec<MemberCell>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberCell {
    pub hierarchy: String,
    pub unique_name: String,
    pub caption: String,
    /// Level unique name.
    pub level: String,
    /// 0-based rank of the member's level.
    pub level_number: usize,
    /// Number of children under the member.
    pub display_info: u32,
}

pub fn build_result_set(plan: &ResolvedPlan<'_>, result: QueryResult) -> ResultSet {
    let cube = plan.cube;
    let default_measure = plan.measures[0];

    let axes = result
        .axes
        .iter()
        .enumerate()
        .map(|(index, table)| build_axis(cube, default_measure, index, table))
        .collect();
    let slicer = build_slicer(plan, &result);

    ResultSet {
        cube: cube.name().to_string(),
        axes,
        slicer,
        cells: result.cells,
        columns: result.columns,
    }
}

fn build_axis(cube: &Cube, default_measure: usize, index: usize, table: &AxisTable) -> Axis {
    let mut hierarchies = Vec::with_capacity(table.hierarchies.len() + 1);
    if table.has_measures && table.measures_first {
        hierarchies.push("[Measures]".to_string());
    }
    hierarchies.extend(
        table
            .hierarchies
            .iter()
            .map(|href| cube.hierarchy_unique_name(href.dimension, href.hierarchy)),
    );
    if table.has_measures && !table.measures_first {
        hierarchies.push("[Measures]".to_string());
    }

    let mut tuples = Vec::with_capacity(table.keys.len());
    for (ordinal, key) in table.keys.iter().enumerate() {
        let mut members = Vec::with_capacity(hierarchies.len());
        // Tuples on a measures axis that carry no measure of their own
        // present the query's default measure.
        let measure_member = || measure_cell(cube, key.measure.unwrap_or(default_measure));
        if table.has_measures && table.measures_first {
            members.push(measure_member());
        }
        for (slot, href) in table.hierarchies.iter().enumerate() {
            let declared = key.specified[slot];
            members.push(member_cell(
                cube,
                href.dimension,
                href.hierarchy,
                &key.segments[slot][..declared],
            ));
        }
        if table.has_measures && !table.measures_first {
            members.push(measure_member());
        }
        tuples.push(Tuple { ordinal, members });
    }

    Axis {
        name: format!("Axis{index}"),
        hierarchies,
        tuples,
    }
}

fn build_slicer(plan: &ResolvedPlan<'_>, result: &QueryResult) -> Axis {
    let cube = plan.cube;
    let mut on_axes: HashSet<(usize, usize)> = HashSet::new();
    for table in &result.axes {
        for href in &table.hierarchies {
            on_axes.insert((href.dimension, href.hierarchy));
        }
    }

    let mut hierarchies = Vec::new();
    let mut members = Vec::new();
    for (dim_idx, dim) in cube.dimensions().iter().enumerate() {
        for hier_idx in 0..dim.hierarchies().len() {
            if on_axes.contains(&(dim_idx, hier_idx)) {
                continue;
            }
            hierarchies.push(cube.hierarchy_unique_name(dim_idx, hier_idx));
            let filter = plan
                .slicer
                .iter()
                .find(|f| f.dimension == dim_idx && f.hierarchy == hier_idx);
            let cell = match filter {
                Some(filter) => member_cell(cube, dim_idx, hier_idx, &filter.path),
                None => match dim.default_member(hier_idx) {
                    Some(value) => member_cell(cube, dim_idx, hier_idx, &[value]),
                    None => member_cell(cube, dim_idx, hier_idx, &[]),
                },
            };
            members.push(cell);
        }
    }

    let measures_on_axes = result.axes.iter().any(|table| table.has_measures);
    if !measures_on_axes && !cube.measures().is_empty() {
        hierarchies.push("[Measures]".to_string());
        members.push(measure_cell(cube, plan.measures[0]));
    }

    Axis {
        name: "SlicerAxis".to_string(),
        hierarchies,
        tuples: vec![Tuple {
            ordinal: 0,
            members,
        }],
    }
}

/// Renders one member. An empty path is the hierarchy's All member.
fn member_cell(cube: &Cube, dimension: usize, hierarchy: usize, path: &[Value]) -> MemberCell {
    let hier_unique = cube.hierarchy_unique_name(dimension, hierarchy);
    let dim = &cube.dimensions()[dimension];
    if path.is_empty() {
        let display_info = dim.children_of(hierarchy, &[]).len() as u32;
        return MemberCell {
            unique_name: format!("{hier_unique}.[All]"),
            caption: "All".to_string(),
            level: format!("{hier_unique}.[All]"),
            level_number: 0,
            display_info,
            hierarchy: hier_unique,
        };
    }

    let depth = path.len();
    let caption = path[depth - 1].to_string();
    let level = cube.level_unique_name(dimension, hierarchy, depth);
    let unique_name = cube.member_unique_name(dimension, hierarchy, path);
    let display_info = dim.children_of(hierarchy, path).len() as u32;
    MemberCell {
        hierarchy: hier_unique,
        unique_name,
        caption,
        level,
        level_number: depth - 1,
        display_info,
    }
}

fn measure_cell(cube: &Cube, measure: usize) -> MemberCell {
    let measure = &cube.measures()[measure];
    MemberCell {
        hierarchy: "[Measures]".to_string(),
        unique_name: measure.unique_name(),
        caption: measure.name.clone(),
        level: "[Measures]".to_string(),
        level_number: 0,
        display_info: 0,
    }
}
