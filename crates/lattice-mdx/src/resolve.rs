//! Binds a parsed statement to a cube.
//!
//! Resolution turns name paths into indexes and produces, per axis, the list
//! of hierarchies the axis touches plus an ordered list of [`GroupSpec`]s.
//! Each group describes one slice of the axis: every hierarchy slot is either
//! pinned to a member, scanned at some level, or left unbound, and the group
//! may carry a measure. Expansion of groups against fact data happens in the
//! executor; everything name-shaped fails here, before any scan starts.

use crate::catalog::{bracketed, Catalog, Cube, SchemaError, SchemaResult};
use crate::parser::{QueryPlan, SegRef, SetExpr, Suffix};
use crate::value::Value;

#[derive(Debug)]
pub struct ResolvedPlan<'c> {
    pub cube: &'c Cube,
    pub axes: Vec<ResolvedAxis>,
    pub slicer: Vec<MemberFilter>,
    /// Measure indexes referenced by the statement, first-appearance order.
    /// Never empty; falls back to the cube's first measure.
    pub measures: Vec<usize>,
}

#[derive(Debug)]
pub struct ResolvedAxis {
    pub non_empty: bool,
    /// Set when the axis set is wrapped in `Hierarchize`.
    pub sorted: bool,
    pub has_measures: bool,
    /// True when the measure coordinate precedes the hierarchy coordinates
    /// in this axis's tuples.
    pub measures_first: bool,
    /// Hierarchy slots in first-appearance order. Group entries are parallel
    /// to this list.
    pub hierarchies: Vec<HierarchyRef>,
    pub groups: Vec<GroupSpec>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HierarchyRef {
    pub dimension: usize,
    pub hierarchy: usize,
    /// Deepest level rank the axis renders for this hierarchy, at least 1.
    pub depth: usize,
}

#[derive(Clone, Debug)]
pub struct GroupSpec {
    pub entries: Vec<GroupEntry>,
    pub measure: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GroupEntry {
    /// Hierarchy not constrained by this group; renders as its All member.
    Unbound,
    /// A single member, `path` empty for the All member.
    Fixed { path: Vec<Value> },
    /// Every member at level rank `depth` whose ancestry starts with `prefix`,
    /// in fact-table appearance order.
    Scan { depth: usize, prefix: Vec<Value> },
}

/// One slicer member: fact rows must match `path` on the leading levels.
#[derive(Clone, Debug)]
pub struct MemberFilter {
    pub dimension: usize,
    pub hierarchy: usize,
    pub path: Vec<Value>,
}

pub fn resolve<'c>(plan: &QueryPlan, catalog: &'c Catalog) -> SchemaResult<ResolvedPlan<'c>> {
    let cube = catalog
        .cube(&plan.cube)
        .ok_or_else(|| SchemaError::UnknownCube(plan.cube.clone()))?;

    let mut axes = Vec::with_capacity(plan.axes.len());
    for spec in &plan.axes {
        let mut builder = AxisBuilder::new(cube);
        let groups = builder.build_set(&spec.set)?;
        axes.push(builder.finish(groups, spec.non_empty));
    }
    if axes.iter().filter(|axis| axis.has_measures).count() > 1 {
        return Err(SchemaError::MeasuresOnBothAxes);
    }

    let mut slicer = Vec::new();
    for seg in plan.slicer.as_deref().unwrap_or_default() {
        if seg.is_measure() {
            // Already folded into the measure list by the parser.
            continue;
        }
        if seg.suffix != Suffix::None {
            return Err(SchemaError::SlicerNotMember(seg_display(seg)));
        }
        let (dimension, hierarchy, rest) = dim_and_hier(cube, seg)?;
        let path = member_path(cube, dimension, hierarchy, rest)?;
        slicer.push(MemberFilter {
            dimension,
            hierarchy,
            path,
        });
    }

    let mut measures = Vec::new();
    for name in &plan.measures {
        let (idx, _) = cube
            .measure(name)
            .ok_or_else(|| SchemaError::UnknownMeasure(name.clone()))?;
        if !measures.contains(&idx) {
            measures.push(idx);
        }
    }
    if measures.is_empty() {
        if cube.measures().is_empty() {
            return Err(SchemaError::NoMeasures(cube.name().to_string()));
        }
        measures.push(0);
    }

    Ok(ResolvedPlan {
        cube,
        axes,
        slicer,
        measures,
    })
}

/// Group under construction. Bindings are sparse (slot, entry) pairs; they
/// densify into a [`GroupSpec`] once the axis's slot list is final.
struct ProtoGroup {
    bindings: Vec<(usize, GroupEntry)>,
    measure: Option<usize>,
}

struct AxisBuilder<'c> {
    cube: &'c Cube,
    slots: Vec<HierarchyRef>,
    sorted: bool,
    has_measures: bool,
    first_seg_measure: Option<bool>,
}

impl<'c> AxisBuilder<'c> {
    fn new(cube: &'c Cube) -> Self {
        Self {
            cube,
            slots: Vec::new(),
            sorted: false,
            has_measures: false,
            first_seg_measure: None,
        }
    }

    fn finish(self, groups: Vec<ProtoGroup>, non_empty: bool) -> ResolvedAxis {
        let slot_count = self.slots.len();
        let groups = groups
            .into_iter()
            .map(|proto| {
                let mut entries = vec![GroupEntry::Unbound; slot_count];
                for (slot, entry) in proto.bindings {
                    entries[slot] = entry;
                }
                GroupSpec {
                    entries,
                    measure: proto.measure,
                }
            })
            .collect();
        ResolvedAxis {
            non_empty,
            sorted: self.sorted,
            has_measures: self.has_measures,
            measures_first: self.first_seg_measure.unwrap_or(false),
            hierarchies: self.slots,
            groups,
        }
    }

    fn build_set(&mut self, set: &SetExpr) -> SchemaResult<Vec<ProtoGroup>> {
        match set {
            SetExpr::Seg(seg) => self.build_seg(seg),
            SetExpr::Set(items) => {
                let mut groups = Vec::new();
                for item in items {
                    groups.extend(self.build_set(item)?);
                }
                Ok(groups)
            }
            SetExpr::CrossJoin(a, b) => {
                let left = self.build_set(a)?;
                let right = self.build_set(b)?;
                self.cross(left, right)
            }
            SetExpr::Hierarchize(inner) => {
                self.sorted = true;
                self.build_set(inner)
            }
            SetExpr::DrilldownMember(base, targets) => {
                let base = self.build_set(base)?;
                self.drilldown(base, targets)
            }
        }
    }

    fn build_seg(&mut self, seg: &SegRef) -> SchemaResult<Vec<ProtoGroup>> {
        if seg.is_measure() {
            self.note_seg(true);
            self.has_measures = true;
            return match seg.path.get(1) {
                Some(name) => {
                    let (idx, _) = self
                        .cube
                        .measure(name)
                        .ok_or_else(|| SchemaError::UnknownMeasure(name.clone()))?;
                    Ok(vec![measure_group(idx)])
                }
                None => match seg.suffix {
                    // `[Measures].Members`: every measure, cube order.
                    Suffix::Members | Suffix::Children => {
                        Ok((0..self.cube.measures().len()).map(measure_group).collect())
                    }
                    Suffix::None => {
                        if self.cube.measures().is_empty() {
                            return Err(SchemaError::NoMeasures(self.cube.name().to_string()));
                        }
                        Ok(vec![measure_group(0)])
                    }
                },
            };
        }

        self.note_seg(false);
        let (dim_idx, hier_idx, rest) = dim_and_hier(self.cube, seg)?;
        let hierarchy_depth = self.cube.dimensions()[dim_idx].hierarchies()[hier_idx].depth();
        let entry = match seg.suffix {
            Suffix::Members => {
                let rank = match rest {
                    [] => 1,
                    [level] => self.cube.dimensions()[dim_idx].hierarchies()[hier_idx]
                        .level_rank(level)
                        .ok_or_else(|| SchemaError::UnknownLevel {
                            hierarchy: self.cube.hierarchy_unique_name(dim_idx, hier_idx),
                            level: level.clone(),
                        })?,
                    more => {
                        return Err(SchemaError::UnknownLevel {
                            hierarchy: self.cube.hierarchy_unique_name(dim_idx, hier_idx),
                            level: more.join("."),
                        })
                    }
                };
                GroupEntry::Scan {
                    depth: rank,
                    prefix: Vec::new(),
                }
            }
            Suffix::Children => {
                let path = member_path(self.cube, dim_idx, hier_idx, rest)?;
                if path.len() >= hierarchy_depth {
                    // Children of a leaf member is the empty set. The slot
                    // still counts as referenced on this axis.
                    self.slot(dim_idx, hier_idx, path.len());
                    return Ok(Vec::new());
                }
                GroupEntry::Scan {
                    depth: path.len() + 1,
                    prefix: path,
                }
            }
            Suffix::None => {
                let path = member_path(self.cube, dim_idx, hier_idx, rest)?;
                GroupEntry::Fixed { path }
            }
        };
        let depth = match &entry {
            GroupEntry::Scan { depth, .. } => *depth,
            GroupEntry::Fixed { path } => path.len(),
            GroupEntry::Unbound => 1,
        };
        let slot = self.slot(dim_idx, hier_idx, depth);
        Ok(vec![ProtoGroup {
            bindings: vec![(slot, entry)],
            measure: None,
        }])
    }

    fn cross(&self, left: Vec<ProtoGroup>, right: Vec<ProtoGroup>) -> SchemaResult<Vec<ProtoGroup>> {
        let mut out = Vec::with_capacity(left.len() * right.len());
        for a in &left {
            for b in &right {
                out.push(self.merge(a, b)?);
            }
        }
        Ok(out)
    }

    fn merge(&self, a: &ProtoGroup, b: &ProtoGroup) -> SchemaResult<ProtoGroup> {
        let mut bindings = a.bindings.clone();
        for (slot, entry) in &b.bindings {
            if bindings.iter().any(|(seen, _)| seen == slot) {
                let at = self.slots[*slot];
                return Err(SchemaError::HierarchyReused(
                    self.cube.hierarchy_unique_name(at.dimension, at.hierarchy),
                ));
            }
            bindings.push((*slot, entry.clone()));
        }
        let measure = match (a.measure, b.measure) {
            (Some(_), Some(_)) => return Err(SchemaError::HierarchyReused("[Measures]".into())),
            (m, None) | (None, m) => m,
        };
        Ok(ProtoGroup { bindings, measure })
    }

    /// `DrilldownMember(base, targets)`: after every group presenting a
    /// target member, insert a copy scanning the member's children. Targets
    /// apply in order, so a target can drill into a group inserted by an
    /// earlier one. Targets that cover nothing, or sit at a leaf level, are
    /// skipped.
    fn drilldown(&mut self, base: Vec<ProtoGroup>, targets: &SetExpr) -> SchemaResult<Vec<ProtoGroup>> {
        let mut target_segs = Vec::new();
        flatten_targets(targets, &mut target_segs)?;

        let mut groups = base;
        for seg in target_segs {
            if seg.is_measure() || seg.suffix != Suffix::None {
                return Err(SchemaError::DrillTargetNotMember(seg_display(seg)));
            }
            let (dim_idx, hier_idx, rest) = dim_and_hier(self.cube, seg)?;
            let path = member_path(self.cube, dim_idx, hier_idx, rest)?;
            if path.len() >= self.cube.dimensions()[dim_idx].hierarchies()[hier_idx].depth() {
                continue;
            }
            let Some(slot) = self.find_slot(dim_idx, hier_idx) else {
                continue;
            };

            let mut next = Vec::with_capacity(groups.len() + 1);
            let mut inserted = false;
            for group in groups {
                let covers = group.bindings.iter().any(|(s, entry)| {
                    *s == slot
                        && match entry {
                            GroupEntry::Fixed { path: fixed } => fixed == &path,
                            GroupEntry::Scan { depth, prefix } => {
                                *depth == path.len() && path.starts_with(prefix)
                            }
                            GroupEntry::Unbound => false,
                        }
                });
                let drilled = covers.then(|| {
                    let mut bindings = group.bindings.clone();
                    for (s, entry) in &mut bindings {
                        if *s == slot {
                            *entry = GroupEntry::Scan {
                                depth: path.len() + 1,
                                prefix: path.clone(),
                            };
                        }
                    }
                    ProtoGroup {
                        bindings,
                        measure: group.measure,
                    }
                });
                next.push(group);
                if let Some(drilled) = drilled {
                    next.push(drilled);
                    inserted = true;
                }
            }
            if inserted {
                self.slot(dim_idx, hier_idx, path.len() + 1);
            }
            groups = next;
        }
        Ok(groups)
    }

    fn note_seg(&mut self, measure: bool) {
        if self.first_seg_measure.is_none() {
            self.first_seg_measure = Some(measure);
        }
    }

    fn find_slot(&self, dimension: usize, hierarchy: usize) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.dimension == dimension && s.hierarchy == hierarchy)
    }

    fn slot(&mut self, dimension: usize, hierarchy: usize, depth: usize) -> usize {
        if let Some(idx) = self.find_slot(dimension, hierarchy) {
            if depth > self.slots[idx].depth {
                self.slots[idx].depth = depth;
            }
            idx
        } else {
            self.slots.push(HierarchyRef {
                dimension,
                hierarchy,
                depth: depth.max(1),
            });
            self.slots.len() - 1
        }
    }
}

fn measure_group(idx: usize) -> ProtoGroup {
    ProtoGroup {
        bindings: Vec::new(),
        measure: Some(idx),
    }
}

fn flatten_targets<'p>(set: &'p SetExpr, out: &mut Vec<&'p SegRef>) -> SchemaResult<()> {
    match set {
        SetExpr::Seg(seg) => {
            out.push(seg);
            Ok(())
        }
        SetExpr::Set(items) => {
            for item in items {
                flatten_targets(item, out)?;
            }
            Ok(())
        }
        SetExpr::CrossJoin(..) | SetExpr::Hierarchize(..) | SetExpr::DrilldownMember(..) => Err(
            SchemaError::DrillTargetNotMember("nested set function".into()),
        ),
    }
}

/// Splits a reference into dimension, hierarchy, and the trailing member or
/// level segments. The hierarchy segment may be omitted, in which case the
/// dimension's first hierarchy applies.
fn dim_and_hier<'p>(cube: &Cube, seg: &'p SegRef) -> SchemaResult<(usize, usize, &'p [String])> {
    let Some(head) = seg.path.first() else {
        return Err(SchemaError::UnknownDimension(String::new()));
    };
    let (dim_idx, dim) = cube
        .dimension(head)
        .ok_or_else(|| SchemaError::UnknownDimension(head.clone()))?;
    if seg.path.len() >= 2 {
        let hier_name = &seg.path[1];
        let (hier_idx, _) =
            dim.hierarchy(hier_name)
                .ok_or_else(|| SchemaError::UnknownHierarchy {
                    dimension: dim.name().to_string(),
                    hierarchy: hier_name.clone(),
                })?;
        Ok((dim_idx, hier_idx, &seg.path[2..]))
    } else if dim.hierarchies().is_empty() {
        Err(SchemaError::UnknownHierarchy {
            dimension: dim.name().to_string(),
            hierarchy: head.clone(),
        })
    } else {
        Ok((dim_idx, 0, &seg.path[1..]))
    }
}

/// Resolves trailing segments to a member path and checks the member exists.
/// Accepts both the plain form `[2010].[Q2 2010]` and the level-qualified
/// unique-name form `[Quarter].[2010].[Q2 2010]`, where the named level must
/// match the path length exactly.
fn member_path(
    cube: &Cube,
    dim_idx: usize,
    hier_idx: usize,
    rest: &[String],
) -> SchemaResult<Vec<Value>> {
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    let dim = &cube.dimensions()[dim_idx];
    let hierarchy = &dim.hierarchies()[hier_idx];

    let unknown = || SchemaError::UnknownMember {
        hierarchy: cube.hierarchy_unique_name(dim_idx, hier_idx),
        member: rest
            .iter()
            .map(|s| bracketed(s))
            .collect::<Vec<_>>()
            .join("."),
    };

    let values: Vec<Value> = if let Some(rank) = rest.first().and_then(|n| hierarchy.level_rank(n))
    {
        if rest.len() - 1 != rank {
            return Err(unknown());
        }
        rest[1..].iter().map(|s| Value::parse(s)).collect()
    } else {
        if rest.len() > hierarchy.depth() {
            return Err(unknown());
        }
        rest.iter().map(|s| Value::parse(s)).collect()
    };

    if !dim.member_exists(hier_idx, &values) {
        return Err(unknown());
    }
    Ok(values)
}

fn seg_display(seg: &SegRef) -> String {
    let mut out = seg
        .path
        .iter()
        .map(|s| bracketed(s))
        .collect::<Vec<_>>()
        .join(".");
    match seg.suffix {
        Suffix::Members => out.push_str(".Members"),
        Suffix::Children => out.push_str(".Children"),
        Suffix::None => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Aggregator, Dimension, Hierarchy, Level, Measure};
    use crate::parser::parse;
    use crate::table::Table;
    use pretty_assertions::assert_eq;

    fn sales_catalog() -> Catalog {
        let mut fact = Table::new("Facts", vec!["Day", "Country", "Amount"]);
        for (day, country, amount) in [
            ("May 12,2010", "Spain", 1.0),
            ("May 13,2010", "Spain", 2.0),
            ("May 14,2010", "France", 4.0),
        ] {
            fact.push_row(vec![day.into(), country.into(), amount.into()])
                .unwrap();
        }

        let mut time = Table::new("Time", vec!["Year", "Quarter", "Month", "Day"]);
        for day in ["May 12,2010", "May 13,2010", "May 14,2010"] {
            time.push_row(vec![
                2010.into(),
                "Q2 2010".into(),
                "May 2010".into(),
                day.into(),
            ])
            .unwrap();
        }
        let time = Dimension::new(
            "Time",
            time,
            "Day",
            vec![Hierarchy::new(
                "Time",
                vec![
                    Level::new("Year", "Year"),
                    Level::new("Quarter", "Quarter"),
                    Level::new("Month", "Month"),
                    Level::new("Day", "Day"),
                ],
            )],
        )
        .unwrap();

        let mut geography = Table::new("Geography", vec!["Continent", "Country"]);
        for (continent, country) in [("Europe", "Spain"), ("Europe", "France")] {
            geography
                .push_row(vec![continent.into(), country.into()])
                .unwrap();
        }
        let geography = Dimension::new(
            "Geography",
            geography,
            "Country",
            vec![Hierarchy::new(
                "Geography",
                vec![
                    Level::new("Continent", "Continent"),
                    Level::new("Country", "Country"),
                ],
            )],
        )
        .unwrap();

        let mut cube = Cube::new("sales", fact);
        cube.add_dimension(time).unwrap();
        cube.add_dimension(geography).unwrap();
        cube.add_measure(Measure::new("Amount", "Amount", Aggregator::Sum))
            .unwrap();

        let mut catalog = Catalog::new();
        catalog.add_cube(cube).unwrap();
        catalog
    }

    fn resolve_str(statement: &str) -> SchemaResult<ResolvedPlan<'static>> {
        let catalog = Box::leak(Box::new(sales_catalog()));
        resolve(&parse(statement).unwrap(), catalog)
    }

    #[test]
    fn level_members_become_a_scan_at_the_level_rank() {
        let plan = resolve_str("SELECT [Time].[Time].[Month].Members ON 0 FROM [sales]").unwrap();
        let axis = &plan.axes[0];
        assert_eq!(axis.hierarchies.len(), 1);
        assert_eq!(axis.hierarchies[0].depth, 3);
        assert_eq!(
            axis.groups[0].entries[0],
            GroupEntry::Scan {
                depth: 3,
                prefix: vec![]
            }
        );
    }

    #[test]
    fn level_qualified_unique_names_resolve_to_members() {
        let plan = resolve_str(
            "SELECT [Time].[Time].[Quarter].[2010].[Q2 2010] ON 0 FROM [sales]",
        )
        .unwrap();
        assert_eq!(
            plan.axes[0].groups[0].entries[0],
            GroupEntry::Fixed {
                path: vec![2010.into(), "Q2 2010".into()]
            }
        );

        let err =
            resolve_str("SELECT [Time].[Time].[Quarter].[Q2 2010] ON 0 FROM [sales]").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownMember { .. }));
    }

    #[test]
    fn crossjoin_rejects_reusing_one_hierarchy() {
        let err = resolve_str(
            "SELECT CrossJoin([Time].[Time].[Year].Members, [Time].[Time].[Day].Members) ON 0 \
             FROM [sales]",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::HierarchyReused(_)));
    }

    #[test]
    fn measures_may_sit_on_only_one_axis() {
        let err = resolve_str(
            "SELECT [Measures].[Amount] ON 0, [Measures].[Amount] ON 1 FROM [sales]",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::MeasuresOnBothAxes));
    }

    #[test]
    fn drilldown_inserts_child_scan_after_covering_group() {
        let plan = resolve_str(
            "SELECT DrilldownMember({[Time].[Time].[Year].Members}, {[Time].[Time].[2010]}) ON 0 \
             FROM [sales]",
        )
        .unwrap();
        let groups = &plan.axes[0].groups;
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0].entries[0],
            GroupEntry::Scan {
                depth: 1,
                prefix: vec![]
            }
        );
        assert_eq!(
            groups[1].entries[0],
            GroupEntry::Scan {
                depth: 2,
                prefix: vec![2010.into()]
            }
        );
        assert_eq!(plan.axes[0].hierarchies[0].depth, 2);
    }

    #[test]
    fn leaf_children_resolve_to_an_empty_set() {
        let plan = resolve_str(
            "SELECT [Time].[Time].[Day].[May 12,2010].Children ON 0 FROM [sales]",
        )
        .unwrap();
        assert_eq!(plan.axes[0].groups.len(), 0);
        assert_eq!(plan.axes[0].hierarchies.len(), 1);
    }

    #[test]
    fn slicer_must_hold_plain_members() {
        let err = resolve_str(
            "SELECT [Measures].[Amount] ON 0 FROM [sales] WHERE [Time].[Time].[Day].Members",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::SlicerNotMember(_)));

        let plan = resolve_str(
            "SELECT [Measures].[Amount] ON 0 FROM [sales] WHERE [Geography].[Geography].[Europe]",
        )
        .unwrap();
        assert_eq!(plan.slicer.len(), 1);
        assert_eq!(plan.slicer[0].path, vec![Value::from("Europe")]);
    }

    #[test]
    fn unknown_names_fail_with_the_right_entity() {
        assert!(matches!(
            resolve_str("SELECT [Shops].[Shops].Members ON 0 FROM [sales]").unwrap_err(),
            SchemaError::UnknownDimension(_)
        ));
        assert!(matches!(
            resolve_str("SELECT [Time].[Fiscal].Members ON 0 FROM [sales]").unwrap_err(),
            SchemaError::UnknownHierarchy { .. }
        ));
        assert!(matches!(
            resolve_str("SELECT [Time].[Time].[Week].Members ON 0 FROM [sales]").unwrap_err(),
            SchemaError::UnknownLevel { .. }
        ));
        assert!(matches!(
            resolve_str("SELECT [Measures].[Profit] ON 0 FROM [sales]").unwrap_err(),
            SchemaError::UnknownMeasure(_)
        ));
        assert!(matches!(
            resolve_str("SELECT [M].[M] ON 0 FROM [shop]").unwrap_err(),
            SchemaError::UnknownCube(_)
        ));
    }
}
