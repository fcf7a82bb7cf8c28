//! Schema discovery rowsets.
//!
//! Every supported request type is a [`DiscoverKind`] variant and is
//! dispatched exhaustively; unknown request names fail at the boundary in
//! [`DiscoverKind::from_name`]. Rows derive from the session catalog's
//! read-only metadata, so discovery never touches fact data.

use crate::document::SerializeResult;
use crate::session::Session;
use lattice_mdx::{Aggregator, Cube};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoverKind {
    Datasources,
    Properties,
    SchemaRowsets,
    Literals,
    DbschemaCatalogs,
    DbschemaTables,
    MdschemaCubes,
    MdschemaDimensions,
    MdschemaHierarchies,
    MdschemaLevels,
    MdschemaMeasures,
    MdschemaMeasuregroups,
    MdschemaMeasuregroupDimensions,
    MdschemaMembers,
    MdschemaProperties,
    MdschemaSets,
    MdschemaKpis,
}

impl DiscoverKind {
    pub const ALL: [DiscoverKind; 17] = [
        DiscoverKind::Datasources,
        DiscoverKind::Properties,
        DiscoverKind::SchemaRowsets,
        DiscoverKind::Literals,
        DiscoverKind::DbschemaCatalogs,
        DiscoverKind::DbschemaTables,
        DiscoverKind::MdschemaCubes,
        DiscoverKind::MdschemaDimensions,
        DiscoverKind::MdschemaHierarchies,
        DiscoverKind::MdschemaLevels,
        DiscoverKind::MdschemaMeasures,
        DiscoverKind::MdschemaMeasuregroups,
        DiscoverKind::MdschemaMeasuregroupDimensions,
        DiscoverKind::MdschemaMembers,
        DiscoverKind::MdschemaProperties,
        DiscoverKind::MdschemaSets,
        DiscoverKind::MdschemaKpis,
    ];

    /// Parses a wire request type. Unknown names are rejected here so the
    /// dispatch below can stay exhaustive.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "DISCOVER_DATASOURCES" => DiscoverKind::Datasources,
            "DISCOVER_PROPERTIES" => DiscoverKind::Properties,
            "DISCOVER_SCHEMA_ROWSETS" => DiscoverKind::SchemaRowsets,
            "DISCOVER_LITERALS" => DiscoverKind::Literals,
            "DBSCHEMA_CATALOGS" => DiscoverKind::DbschemaCatalogs,
            "DBSCHEMA_TABLES" => DiscoverKind::DbschemaTables,
            "MDSCHEMA_CUBES" => DiscoverKind::MdschemaCubes,
            "MDSCHEMA_DIMENSIONS" => DiscoverKind::MdschemaDimensions,
            "MDSCHEMA_HIERARCHIES" => DiscoverKind::MdschemaHierarchies,
            "MDSCHEMA_LEVELS" => DiscoverKind::MdschemaLevels,
            "MDSCHEMA_MEASURES" => DiscoverKind::MdschemaMeasures,
            "MDSCHEMA_MEASUREGROUPS" => DiscoverKind::MdschemaMeasuregroups,
            "MDSCHEMA_MEASUREGROUP_DIMENSIONS" => DiscoverKind::MdschemaMeasuregroupDimensions,
            "MDSCHEMA_MEMBERS" => DiscoverKind::MdschemaMembers,
            "MDSCHEMA_PROPERTIES" => DiscoverKind::MdschemaProperties,
            "MDSCHEMA_SETS" => DiscoverKind::MdschemaSets,
            "MDSCHEMA_KPIS" => DiscoverKind::MdschemaKpis,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            DiscoverKind::Datasources => "DISCOVER_DATASOURCES",
            DiscoverKind::Properties => "DISCOVER_PROPERTIES",
            DiscoverKind::SchemaRowsets => "DISCOVER_SCHEMA_ROWSETS",
            DiscoverKind::Literals => "DISCOVER_LITERALS",
            DiscoverKind::DbschemaCatalogs => "DBSCHEMA_CATALOGS",
            DiscoverKind::DbschemaTables => "DBSCHEMA_TABLES",
            DiscoverKind::MdschemaCubes => "MDSCHEMA_CUBES",
            DiscoverKind::MdschemaDimensions => "MDSCHEMA_DIMENSIONS",
            DiscoverKind::MdschemaHierarchies => "MDSCHEMA_HIERARCHIES",
            DiscoverKind::MdschemaLevels => "MDSCHEMA_LEVELS",
            DiscoverKind::MdschemaMeasures => "MDSCHEMA_MEASURES",
            DiscoverKind::MdschemaMeasuregroups => "MDSCHEMA_MEASUREGROUPS",
            DiscoverKind::MdschemaMeasuregroupDimensions => "MDSCHEMA_MEASUREGROUP_DIMENSIONS",
            DiscoverKind::MdschemaMembers => "MDSCHEMA_MEMBERS",
            DiscoverKind::MdschemaProperties => "MDSCHEMA_PROPERTIES",
            DiscoverKind::MdschemaSets => "MDSCHEMA_SETS",
            DiscoverKind::MdschemaKpis => "MDSCHEMA_KPIS",
        }
    }
}

/// Restriction values a client may send alongside a discover request. Only
/// the restrictions the handlers below consult are modeled.
#[derive(Clone, Debug, Default)]
pub struct Restrictions {
    pub catalog_name: Option<String>,
    pub cube_name: Option<String>,
    pub hierarchy_unique_name: Option<String>,
}

type Row = Vec<(&'static str, String)>;

/// An ordered set of field/value rows, serialized as a `<root><row>`
/// document in the rowset namespace.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rowset {
    rows: Vec<Row>,
}

impl Rowset {
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First value carried under `field`, across all rows.
    pub fn value_of(&self, field: &str) -> Option<&str> {
        self.rows.iter().find_map(|row| {
            row.iter()
                .find(|(name, _)| *name == field)
                .map(|(_, value)| value.as_str())
        })
    }

    pub fn to_xml(&self) -> SerializeResult<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Start(BytesStart::new("return")))?;
        let mut root = BytesStart::new("root");
        root.push_attribute(("xmlns", "urn:schemas-microsoft-com:xml-analysis:rowset"));
        if self.rows.is_empty() {
            writer.write_event(Event::Empty(root))?;
        } else {
            writer.write_event(Event::Start(root))?;
            for row in &self.rows {
                writer.write_event(Event::Start(BytesStart::new("row")))?;
                for (field, value) in row {
                    writer.write_event(Event::Start(BytesStart::new(*field)))?;
                    writer.write_event(Event::Text(BytesText::new(value)))?;
                    writer.write_event(Event::End(BytesEnd::new(*field)))?;
                }
                writer.write_event(Event::End(BytesEnd::new("row")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("root")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("return")))?;
        Ok(String::from_utf8(writer.into_inner().into_inner())?)
    }
}

/// Builds the rowset for one discover request against the session's catalog.
pub fn discover(kind: DiscoverKind, session: &Session, restrictions: &Restrictions) -> Rowset {
    log::debug!("discover {}", kind.name());
    match kind {
        DiscoverKind::Datasources => datasources(),
        DiscoverKind::Properties => properties(session),
        DiscoverKind::SchemaRowsets => schema_rowsets(),
        DiscoverKind::Literals => literals(),
        DiscoverKind::DbschemaCatalogs => dbschema_catalogs(session),
        DiscoverKind::DbschemaTables => dbschema_tables(session, restrictions),
        DiscoverKind::MdschemaCubes => mdschema_cubes(session, restrictions),
        DiscoverKind::MdschemaDimensions => mdschema_dimensions(session, restrictions),
        DiscoverKind::MdschemaHierarchies => mdschema_hierarchies(session, restrictions),
        DiscoverKind::MdschemaLevels => mdschema_levels(session, restrictions),
        DiscoverKind::MdschemaMeasures => mdschema_measures(session, restrictions),
        DiscoverKind::MdschemaMeasuregroups => mdschema_measuregroups(session, restrictions),
        DiscoverKind::MdschemaMeasuregroupDimensions => {
            mdschema_measuregroup_dimensions(session, restrictions)
        }
        DiscoverKind::MdschemaMembers => mdschema_members(session, restrictions),
        DiscoverKind::MdschemaProperties => mdschema_properties(),
        // Named sets and KPIs are not modeled; clients get an empty rowset.
        DiscoverKind::MdschemaSets | DiscoverKind::MdschemaKpis => Rowset::default(),
    }
}

/// Cubes visible to the request. Wire catalogs map one-to-one to cubes, so
/// both restriction fields narrow on the cube name.
fn visible_cubes<'a>(
    session: &'a Session,
    restrictions: &'a Restrictions,
) -> impl Iterator<Item = &'a Cube> {
    session.current_catalog().cubes().iter().filter(|cube| {
        restrictions
            .catalog_name
            .as_deref()
            .is_none_or(|name| name == cube.name())
            && restrictions
                .cube_name
                .as_deref()
                .is_none_or(|name| name == cube.name())
    })
}

fn datasources() -> Rowset {
    Rowset {
        rows: vec![vec![
            ("DataSourceName", "Lattice".to_string()),
            ("DataSourceDescription", "Lattice OLAP server".to_string()),
            ("DataSourceInfo", "-".to_string()),
            ("ProviderName", "Lattice".to_string()),
            ("ProviderType", "MDP".to_string()),
            ("AuthenticationMode", "Unauthenticated".to_string()),
        ]],
    }
}

fn properties(session: &Session) -> Rowset {
    let catalog = session
        .active_catalog()
        .map(str::to_string)
        .or_else(|| {
            session
                .current_catalog()
                .cubes()
                .first()
                .map(|cube| cube.name().to_string())
        })
        .unwrap_or_default();
    let rows = vec![
        property_row("ServerName", "Lattice"),
        property_row("ProviderVersion", env!("CARGO_PKG_VERSION")),
        property_row("Catalog", &catalog),
    ];
    Rowset { rows }
}

fn property_row(name: &str, value: &str) -> Row {
    vec![
        ("PropertyName", name.to_string()),
        ("PropertyAccessType", "Read".to_string()),
        ("Value", value.to_string()),
    ]
}

fn schema_rowsets() -> Rowset {
    let rows = DiscoverKind::ALL
        .iter()
        .map(|kind| vec![("SchemaName", kind.name().to_string())])
        .collect();
    Rowset { rows }
}

fn literals() -> Rowset {
    let rows = [
        ("DBLITERAL_CATALOG_SEPARATOR", "."),
        ("DBLITERAL_QUOTE_PREFIX", "["),
        ("DBLITERAL_QUOTE_SUFFIX", "]"),
    ]
    .into_iter()
    .map(|(name, value)| {
        vec![
            ("LiteralName", name.to_string()),
            ("LiteralValue", value.to_string()),
        ]
    })
    .collect();
    Rowset { rows }
}

fn dbschema_catalogs(session: &Session) -> Rowset {
    let rows = session
        .current_catalog()
        .cubes()
        .iter()
        .map(|cube| vec![("CATALOG_NAME", cube.name().to_string())])
        .collect();
    Rowset { rows }
}

fn dbschema_tables(session: &Session, restrictions: &Restrictions) -> Rowset {
    let mut rows = Vec::new();
    for cube in visible_cubes(session, restrictions) {
        let tables = std::iter::once(cube.fact().name())
            .chain(cube.dimensions().iter().map(|dim| dim.table().name()));
        for table in tables {
            rows.push(vec![
                ("TABLE_CATALOG", cube.name().to_string()),
                ("TABLE_NAME", table.to_string()),
                ("TABLE_TYPE", "TABLE".to_string()),
            ]);
        }
    }
    Rowset { rows }
}

fn mdschema_cubes(session: &Session, restrictions: &Restrictions) -> Rowset {
    let rows = visible_cubes(session, restrictions)
        .map(|cube| {
            vec![
                ("CATALOG_NAME", cube.name().to_string()),
                ("CUBE_NAME", cube.name().to_string()),
                ("CUBE_TYPE", "CUBE".to_string()),
                ("CUBE_CAPTION", cube.name().to_string()),
            ]
        })
        .collect();
    Rowset { rows }
}

fn mdschema_dimensions(session: &Session, restrictions: &Restrictions) -> Rowset {
    let mut rows = Vec::new();
    for cube in visible_cubes(session, restrictions) {
        for (idx, dim) in cube.dimensions().iter().enumerate() {
            rows.push(vec![
                ("CATALOG_NAME", cube.name().to_string()),
                ("CUBE_NAME", cube.name().to_string()),
                ("DIMENSION_NAME", dim.name().to_string()),
                ("DIMENSION_UNIQUE_NAME", cube.dimension_unique_name(idx)),
                ("DIMENSION_CAPTION", dim.name().to_string()),
                ("DIMENSION_ORDINAL", idx.to_string()),
                ("DIMENSION_TYPE", "3".to_string()),
                ("DIMENSION_CARDINALITY", dim.table().row_count().to_string()),
            ]);
        }
        rows.push(vec![
            ("CATALOG_NAME", cube.name().to_string()),
            ("CUBE_NAME", cube.name().to_string()),
            ("DIMENSION_NAME", "Measures".to_string()),
            ("DIMENSION_UNIQUE_NAME", "[Measures]".to_string()),
            ("DIMENSION_CAPTION", "Measures".to_string()),
            ("DIMENSION_ORDINAL", cube.dimensions().len().to_string()),
            ("DIMENSION_TYPE", "2".to_string()),
            ("DIMENSION_CARDINALITY", cube.measures().len().to_string()),
        ]);
    }
    Rowset { rows }
}

fn mdschema_hierarchies(session: &Session, restrictions: &Restrictions) -> Rowset {
    let mut rows = Vec::new();
    for cube in visible_cubes(session, restrictions) {
        for (dim_idx, dim) in cube.dimensions().iter().enumerate() {
            for (hier_idx, hierarchy) in dim.hierarchies().iter().enumerate() {
                let default_member = dim
                    .default_member(hier_idx)
                    .map(|value| cube.member_unique_name(dim_idx, hier_idx, &[value]))
                    .unwrap_or_default();
                rows.push(vec![
                    ("CATALOG_NAME", cube.name().to_string()),
                    ("CUBE_NAME", cube.name().to_string()),
                    ("DIMENSION_UNIQUE_NAME", cube.dimension_unique_name(dim_idx)),
                    ("HIERARCHY_NAME", hierarchy.name.clone()),
                    (
                        "HIERARCHY_UNIQUE_NAME",
                        cube.hierarchy_unique_name(dim_idx, hier_idx),
                    ),
                    ("HIERARCHY_CAPTION", hierarchy.name.clone()),
                    ("DEFAULT_MEMBER", default_member),
                ]);
            }
        }
        let default_measure = cube
            .measures()
            .first()
            .map(|measure| measure.unique_name())
            .unwrap_or_default();
        rows.push(vec![
            ("CATALOG_NAME", cube.name().to_string()),
            ("CUBE_NAME", cube.name().to_string()),
            ("DIMENSION_UNIQUE_NAME", "[Measures]".to_string()),
            ("HIERARCHY_NAME", "Measures".to_string()),
            ("HIERARCHY_UNIQUE_NAME", "[Measures]".to_string()),
            ("HIERARCHY_CAPTION", "Measures".to_string()),
            ("DEFAULT_MEMBER", default_measure),
        ]);
    }
    Rowset { rows }
}

fn mdschema_levels(session: &Session, restrictions: &Restrictions) -> Rowset {
    let mut rows = Vec::new();
    for cube in visible_cubes(session, restrictions) {
        for (dim_idx, dim) in cube.dimensions().iter().enumerate() {
            for (hier_idx, hierarchy) in dim.hierarchies().iter().enumerate() {
                let hier_unique = cube.hierarchy_unique_name(dim_idx, hier_idx);
                if restrictions
                    .hierarchy_unique_name
                    .as_deref()
                    .is_some_and(|want| want != hier_unique)
                {
                    continue;
                }
                for rank in 1..=hierarchy.depth() {
                    let level = &hierarchy.levels[rank - 1];
                    rows.push(vec![
                        ("CATALOG_NAME", cube.name().to_string()),
                        ("CUBE_NAME", cube.name().to_string()),
                        ("DIMENSION_UNIQUE_NAME", cube.dimension_unique_name(dim_idx)),
                        ("HIERARCHY_UNIQUE_NAME", hier_unique.clone()),
                        ("LEVEL_NAME", level.name.clone()),
                        (
                            "LEVEL_UNIQUE_NAME",
                            cube.level_unique_name(dim_idx, hier_idx, rank),
                        ),
                        ("LEVEL_CAPTION", level.name.clone()),
                        ("LEVEL_NUMBER", (rank - 1).to_string()),
                    ]);
                }
            }
        }
    }
    Rowset { rows }
}

fn mdschema_measures(session: &Session, restrictions: &Restrictions) -> Rowset {
    let mut rows = Vec::new();
    for cube in visible_cubes(session, restrictions) {
        for measure in cube.measures() {
            let aggregator = match measure.aggregator {
                Aggregator::Sum => "1",
                Aggregator::Count => "2",
            };
            rows.push(vec![
                ("CATALOG_NAME", cube.name().to_string()),
                ("CUBE_NAME", cube.name().to_string()),
                ("MEASURE_NAME", measure.name.clone()),
                ("MEASURE_UNIQUE_NAME", measure.unique_name()),
                ("MEASURE_CAPTION", measure.name.clone()),
                ("MEASURE_AGGREGATOR", aggregator.to_string()),
            ]);
        }
    }
    Rowset { rows }
}

fn mdschema_measuregroups(session: &Session, restrictions: &Restrictions) -> Rowset {
    let rows = visible_cubes(session, restrictions)
        .map(|cube| {
            vec![
                ("CATALOG_NAME", cube.name().to_string()),
                ("CUBE_NAME", cube.name().to_string()),
                ("MEASUREGROUP_NAME", "default".to_string()),
            ]
        })
        .collect();
    Rowset { rows }
}

fn mdschema_measuregroup_dimensions(session: &Session, restrictions: &Restrictions) -> Rowset {
    let mut rows = Vec::new();
    for cube in visible_cubes(session, restrictions) {
        for (idx, _) in cube.dimensions().iter().enumerate() {
            rows.push(vec![
                ("CATALOG_NAME", cube.name().to_string()),
                ("CUBE_NAME", cube.name().to_string()),
                ("MEASUREGROUP_NAME", "default".to_string()),
                ("MEASUREGROUP_CARDINALITY", "ONE".to_string()),
                ("DIMENSION_UNIQUE_NAME", cube.dimension_unique_name(idx)),
                ("DIMENSION_CARDINALITY", "MANY".to_string()),
                ("DIMENSION_IS_VISIBLE", "true".to_string()),
            ]);
        }
    }
    Rowset { rows }
}

/// Root-level members of the hierarchy named by the restriction. Without a
/// hierarchy restriction there is nothing to enumerate.
fn mdschema_members(session: &Session, restrictions: &Restrictions) -> Rowset {
    let Some(want) = restrictions.hierarchy_unique_name.as_deref() else {
        return Rowset::default();
    };
    let mut rows = Vec::new();
    for cube in visible_cubes(session, restrictions) {
        for (dim_idx, dim) in cube.dimensions().iter().enumerate() {
            for hier_idx in 0..dim.hierarchies().len() {
                if cube.hierarchy_unique_name(dim_idx, hier_idx) != want {
                    continue;
                }
                for member in dim.children_of(hier_idx, &[]) {
                    let path = [member.clone()];
                    let children = dim.children_of(hier_idx, &path).len();
                    rows.push(vec![
                        ("CATALOG_NAME", cube.name().to_string()),
                        ("CUBE_NAME", cube.name().to_string()),
                        ("DIMENSION_UNIQUE_NAME", cube.dimension_unique_name(dim_idx)),
                        (
                            "HIERARCHY_UNIQUE_NAME",
                            cube.hierarchy_unique_name(dim_idx, hier_idx),
                        ),
                        (
                            "LEVEL_UNIQUE_NAME",
                            cube.level_unique_name(dim_idx, hier_idx, 1),
                        ),
                        ("LEVEL_NUMBER", "0".to_string()),
                        ("MEMBER_NAME", member.to_string()),
                        (
                            "MEMBER_UNIQUE_NAME",
                            cube.member_unique_name(dim_idx, hier_idx, &path),
                        ),
                        ("MEMBER_CAPTION", member.to_string()),
                        ("MEMBER_TYPE", "1".to_string()),
                        ("CHILDREN_CARDINALITY", children.to_string()),
                    ]);
                }
            }
        }
    }
    Rowset { rows }
}

fn mdschema_properties() -> Rowset {
    let rows = [
        "MEMBER_UNIQUE_NAME",
        "MEMBER_CAPTION",
        "LEVEL_UNIQUE_NAME",
        "LEVEL_NUMBER",
        "DISPLAY_INFO",
    ]
    .into_iter()
    .map(|name| {
        vec![
            ("PROPERTY_NAME", name.to_string()),
            ("PROPERTY_TYPE", "2".to_string()),
        ]
    })
    .collect();
    Rowset { rows }
}
