//! Loading cubes from CSV directories.
//!
//! A cube directory holds `Facts.csv` plus one CSV per dimension. An optional
//! `schema.json` names the cube and pins join keys, hierarchies, and
//! measures; without it, everything is inferred. The join key of a dimension
//! is the column it shares with the fact table whose values are unique, its
//! levels are the dimension's columns in file order, and every numeric
//! non-key fact column becomes a summed measure.

use crate::catalog::{
    Aggregator, Catalog, Cube, Dimension, Hierarchy, Level, Measure, SchemaError, SchemaResult,
};
use crate::table::Table;
use crate::value::Value;
use log::warn;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("invalid schema.json: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("cube directory {0} has no Facts.csv")]
    MissingFacts(String),

    #[error("dimension {dimension} shares no unique column with the fact table")]
    NoJoinKey { dimension: String },

    #[error("dimension {dimension} shares several unique columns with the fact table: {columns:?}")]
    AmbiguousJoinKey {
        dimension: String,
        columns: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
pub struct SchemaConfig {
    pub name: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<DimensionConfig>,
    #[serde(default)]
    pub measures: Vec<MeasureConfig>,
}

#[derive(Debug, Deserialize)]
pub struct DimensionConfig {
    pub name: String,
    pub key: Option<String>,
    #[serde(default)]
    pub hierarchies: Vec<HierarchyConfig>,
}

#[derive(Debug, Deserialize)]
pub struct HierarchyConfig {
    pub name: Option<String>,
    pub levels: Vec<LevelConfig>,
}

#[derive(Debug, Deserialize)]
pub struct LevelConfig {
    pub name: String,
    /// Source column, defaulting to the level name.
    pub column: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MeasureConfig {
    pub name: String,
    pub column: Option<String>,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregatorConfig {
    #[default]
    Sum,
    Count,
}

impl From<AggregatorConfig> for Aggregator {
    fn from(config: AggregatorConfig) -> Self {
        match config {
            AggregatorConfig::Sum => Aggregator::Sum,
            AggregatorConfig::Count => Aggregator::Count,
        }
    }
}

/// Loads every cube directory under `root` in name order. Directories
/// without a `Facts.csv` are skipped with a warning.
pub fn load_catalog(root: &Path) -> StoreResult<Catalog> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut catalog = Catalog::new();
    for dir in dirs {
        match load_cube(&dir) {
            Ok(cube) => catalog.add_cube(cube)?,
            Err(StoreError::MissingFacts(path)) => {
                warn!("skipping {path}: no Facts.csv");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(catalog)
}

pub fn load_cube(dir: &Path) -> StoreResult<Cube> {
    let facts_path = dir.join("Facts.csv");
    if !facts_path.is_file() {
        return Err(StoreError::MissingFacts(dir.display().to_string()));
    }
    let fact = read_table("Facts", &facts_path)?;
    let config = read_config(dir)?;

    let cube_name = config
        .as_ref()
        .and_then(|c| c.name.clone())
        .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "cube".to_string());

    let mut dim_files: Vec<PathBuf> = fs::read_dir(dir)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "csv")
                && path.file_name().is_some_and(|name| name != "Facts.csv")
        })
        .collect();
    dim_files.sort();

    let mut dimensions = Vec::with_capacity(dim_files.len());
    for path in &dim_files {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let table = read_table(&name, path)?;
        let dim_config = config.as_ref().and_then(|c| {
            c.dimensions
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(&name))
        });
        dimensions.push(build_dimension(name, table, &fact, dim_config)?);
    }

    let measures = build_measures(&fact, &dimensions, config.as_ref());

    let mut cube = Cube::new(cube_name, fact);
    for dimension in dimensions {
        cube.add_dimension(dimension)?;
    }
    for measure in measures {
        cube.add_measure(measure)?;
    }
    Ok(cube)
}

fn read_config(dir: &Path) -> StoreResult<Option<SchemaConfig>> {
    match fs::read_to_string(dir.join("schema.json")) {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn read_table(name: &str, path: &Path) -> StoreResult<Table> {
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();
    let mut table = Table::new(name, headers);
    for record in reader.records() {
        let record = record?;
        table.push_row(record.iter().map(Value::parse).collect())?;
    }
    Ok(table)
}

fn build_dimension(
    name: String,
    table: Table,
    fact: &Table,
    config: Option<&DimensionConfig>,
) -> StoreResult<Dimension> {
    let key = match config.and_then(|c| c.key.clone()) {
        Some(key) => key,
        None => infer_join_key(&name, &table, fact)?,
    };
    let hierarchies = match config.filter(|c| !c.hierarchies.is_empty()) {
        Some(config) => config
            .hierarchies
            .iter()
            .map(|h| {
                let levels = h
                    .levels
                    .iter()
                    .map(|l| {
                        Level::new(l.name.clone(), l.column.clone().unwrap_or_else(|| l.name.clone()))
                    })
                    .collect();
                Hierarchy::new(h.name.clone().unwrap_or_else(|| name.clone()), levels)
            })
            .collect(),
        None => vec![Hierarchy::new(
            name.clone(),
            table
                .columns()
                .iter()
                .map(|column| Level::new(column.clone(), column.clone()))
                .collect(),
        )],
    };
    Ok(Dimension::new(name, table, key, hierarchies)?)
}

fn infer_join_key(name: &str, table: &Table, fact: &Table) -> StoreResult<String> {
    let mut candidates = Vec::new();
    for (idx, column) in table.columns().iter().enumerate() {
        if fact.column_idx(column).is_none() {
            continue;
        }
        let mut seen = HashSet::new();
        let unique = (0..table.row_count())
            .all(|row| table.value_by_idx(row, idx).is_none_or(|v| seen.insert(v.clone())));
        if unique {
            candidates.push(column.clone());
        }
    }
    match candidates.len() {
        0 => Err(StoreError::NoJoinKey {
            dimension: name.to_string(),
        }),
        1 => Ok(candidates.swap_remove(0)),
        _ => Err(StoreError::AmbiguousJoinKey {
            dimension: name.to_string(),
            columns: candidates,
        }),
    }
}

fn build_measures(
    fact: &Table,
    dimensions: &[Dimension],
    config: Option<&SchemaConfig>,
) -> Vec<Measure> {
    if let Some(config) = config.filter(|c| !c.measures.is_empty()) {
        return config
            .measures
            .iter()
            .map(|m| {
                Measure::new(
                    m.name.clone(),
                    m.column.clone().unwrap_or_else(|| m.name.clone()),
                    m.aggregator.into(),
                )
            })
            .collect();
    }

    let keys: HashSet<&str> = dimensions.iter().map(|d| d.key_column()).collect();
    let mut measures = Vec::new();
    for (idx, column) in fact.columns().iter().enumerate() {
        if keys.contains(column.as_str()) {
            continue;
        }
        let mut saw_number = false;
        let numeric = (0..fact.row_count()).all(|row| match fact.value_by_idx(row, idx) {
            Some(Value::Number(_)) => {
                saw_number = true;
                true
            }
            Some(Value::Blank) | None => true,
            _ => false,
        });
        if numeric && saw_number {
            measures.push(Measure::new(column.clone(), column.clone(), Aggregator::Sum));
        }
    }
    measures
}

/// The built-in demo catalog: one `sales` cube, ten fact rows over a
/// time/geography/company star.
pub fn demo_catalog() -> SchemaResult<Catalog> {
    let mut fact = Table::new("Facts", vec!["Day", "Country", "Company", "Amount", "Count"]);
    for (day, country, amount, count) in [
        ("May 18,2010", "Switzerland", 64.0, 64.0),
        ("May 16,2010", "Switzerland", 16.0, 4.0),
        ("May 14,2010", "France", 4.0, 2.0),
        ("May 12,2010", "Spain", 1.0, 84.0),
        ("May 13,2010", "Spain", 2.0, 841.0),
        ("May 15,2010", "Switzerland", 8.0, 231.0),
        ("May 17,2010", "Switzerland", 32.0, 65.0),
        ("May 19,2010", "Switzerland", 128.0, 13.0),
        ("May 20,2010", "United States", 256.0, 9.0),
        ("May 21,2010", "United States", 512.0, 7.0),
    ] {
        fact.push_row(vec![
            day.into(),
            country.into(),
            "Crazy Development".into(),
            amount.into(),
            count.into(),
        ])?;
    }

    let mut time = Table::new("Time", vec!["Year", "Quarter", "Month", "Day"]);
    for day in 12..=21 {
        time.push_row(vec![
            2010.into(),
            "Q2 2010".into(),
            "May 2010".into(),
            format!("May {day},2010").into(),
        ])?;
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
    )?;

    let mut geography = Table::new("Geography", vec!["Continent", "Country"]);
    for (continent, country) in [
        ("Europe", "France"),
        ("Europe", "Spain"),
        ("Europe", "Switzerland"),
        ("America", "United States"),
    ] {
        geography.push_row(vec![continent.into(), country.into()])?;
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
    )?;

    let mut company = Table::new("Company", vec!["Company"]);
    company.push_row(vec!["Crazy Development".into()])?;
    let company = Dimension::new(
        "Company",
        company,
        "Company",
        vec![Hierarchy::new(
            "Company",
            vec![Level::new("Company", "Company")],
        )],
    )?;

    let mut cube = Cube::new("sales", fact);
    cube.add_dimension(time)?;
    cube.add_dimension(geography)?;
    cube.add_dimension(company)?;
    cube.add_measure(Measure::new("Amount", "Amount", Aggregator::Sum))?;
    cube.add_measure(Measure::new("Count", "Count", Aggregator::Sum))?;

    let mut catalog = Catalog::new();
    catalog.add_cube(cube)?;
    Ok(catalog)
}
