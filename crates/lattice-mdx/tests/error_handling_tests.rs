use lattice_mdx::store::demo_catalog;
use lattice_mdx::{
    run_table, Aggregator, CancelToken, Catalog, Cube, Dimension, EngineError, ExecutionError,
    Hierarchy, Level, Measure, SchemaError, Table, Value,
};
use pretty_assertions::assert_eq;

fn fail(statement: &str) -> EngineError {
    let catalog = demo_catalog().unwrap();
    run_table(&catalog, statement, &CancelToken::new()).unwrap_err()
}

/// A one-dimension cube whose Amount column holds a stray text value.
fn dirty_catalog() -> Catalog {
    let mut fact = Table::new("Facts", vec!["Code", "Amount", "Label"]);
    fact.push_row(vec!["a".into(), 1.into(), "x".into()])
        .unwrap();
    fact.push_row(vec!["b".into(), "oops".into(), "y".into()])
        .unwrap();

    let mut codes = Table::new("Product", vec!["Code"]);
    codes.push_row(vec!["a".into()]).unwrap();
    codes.push_row(vec!["b".into()]).unwrap();
    let dimension = Dimension::new(
        "Product",
        codes,
        "Code",
        vec![Hierarchy::new("Product", vec![Level::new("Code", "Code")])],
    )
    .unwrap();

    let mut cube = Cube::new("tiny", fact);
    cube.add_dimension(dimension).unwrap();
    cube.add_measure(Measure::new("Amount", "Amount", Aggregator::Sum))
        .unwrap();
    cube.add_measure(Measure::new("Labels", "Label", Aggregator::Count))
        .unwrap();
    let mut catalog = Catalog::new();
    catalog.add_cube(cube).unwrap();
    catalog
}

#[test]
fn summing_text_is_an_execution_error() {
    let err = run_table(
        &dirty_catalog(),
        "SELECT FROM [tiny] WHERE ([Measures].[Amount])",
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Execution(ExecutionError::NonNumericMeasure { .. })
    ));
}

#[test]
fn counting_text_is_fine() {
    let table = run_table(
        &dirty_catalog(),
        "SELECT FROM [tiny] WHERE ([Measures].[Labels])",
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(table.columns, vec!["Labels".to_string()]);
    assert_eq!(table.rows, vec![vec![Value::from(2)]]);
}

#[test]
fn a_cancelled_token_aborts_before_any_work() {
    let catalog = demo_catalog().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = run_table(
        &catalog,
        "SELECT [Measures].[Amount] ON COLUMNS FROM [sales]",
        &cancel,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Execution(ExecutionError::Cancelled)
    ));
}

#[test]
fn unknown_names_fail_resolution() {
    assert!(matches!(
        fail("SELECT [Planets].[Orbit].Members ON COLUMNS FROM [sales]"),
        EngineError::Schema(SchemaError::UnknownDimension(name)) if name == "Planets"
    ));
    assert!(matches!(
        fail(
            "SELECT {[Geography].[Geography].[Country].[Europe].[Atlantis]} ON COLUMNS \
             FROM [sales]"
        ),
        EngineError::Schema(SchemaError::UnknownMember { .. })
    ));
    assert!(matches!(
        fail("SELECT {[Measures].[Profit]} ON COLUMNS FROM [sales]"),
        EngineError::Schema(SchemaError::UnknownMeasure(name)) if name == "Profit"
    ));
    assert!(matches!(
        fail("SELECT [Measures].[Amount] ON COLUMNS FROM [nowhere]"),
        EngineError::Schema(SchemaError::UnknownCube(name)) if name == "nowhere"
    ));
}

#[test]
fn measures_cannot_sit_on_two_axes() {
    let err = fail(
        "SELECT [Measures].[Amount] ON COLUMNS, [Measures].[Count] ON ROWS \
         FROM [sales]",
    );
    assert!(matches!(
        err,
        EngineError::Schema(SchemaError::MeasuresOnBothAxes)
    ));
}

#[test]
fn one_tuple_cannot_bind_a_hierarchy_twice() {
    let err = fail(
        "SELECT CrossJoin([Time].[Time].[Day].Members, [Time].[Time].[Year].Members) \
         ON COLUMNS FROM [sales]",
    );
    assert!(matches!(
        err,
        EngineError::Schema(SchemaError::HierarchyReused(_))
    ));
}

#[test]
fn slicer_entries_must_be_members() {
    let err = fail(
        "SELECT [Measures].[Amount] ON COLUMNS FROM [sales] \
         WHERE ([Geography].[Geography].[Country].Members)",
    );
    assert!(matches!(
        err,
        EngineError::Schema(SchemaError::SlicerNotMember(_))
    ));
}

#[test]
fn malformed_statements_are_parse_errors() {
    let err = fail("SELECT [Measures].[Amount] COLUMNS FROM [sales]");
    let EngineError::Parse(parse) = err else {
        panic!("expected a parse error");
    };
    assert!(parse.to_string().contains("expected ON"));
}

#[test]
fn axis_lists_must_be_contiguous() {
    let err = fail("SELECT [Measures].[Amount] ON ROWS FROM [sales]");
    let EngineError::Parse(parse) = err else {
        panic!("expected a parse error");
    };
    assert!(parse.to_string().contains("axis 0 is missing"));
}

#[test]
fn axis_ordinals_beyond_one_are_rejected() {
    let err = fail(
        "SELECT [Measures].[Amount] ON COLUMNS, \
         [Geography].[Geography].[Country].Members ON ROWS, \
         [Time].[Time].[Day].Members ON AXIS(2) \
         FROM [sales]",
    );
    let EngineError::Parse(parse) = err else {
        panic!("expected a parse error");
    };
    assert!(parse.to_string().contains("out of range"));
}
