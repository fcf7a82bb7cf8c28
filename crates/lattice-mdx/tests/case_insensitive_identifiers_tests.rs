use lattice_mdx::store::demo_catalog;
use lattice_mdx::{run_table, CancelToken, EngineError, ResultTable, SchemaError};
use pretty_assertions::assert_eq;

fn run(statement: &str) -> ResultTable {
    let catalog = demo_catalog().unwrap();
    run_table(&catalog, statement, &CancelToken::new()).unwrap()
}

#[test]
fn keywords_and_identifiers_ignore_case() {
    let table = run(
        "select {[measures].[amount]} on columns, \
         [geography].[geography].[country].members on rows \
         from [sales]",
    );
    assert_eq!(
        table.rows,
        vec![
            vec!["Europe".into(), "Switzerland".into(), 248.into()],
            vec!["Europe".into(), "France".into(), 4.into()],
            vec!["Europe".into(), "Spain".into(), 3.into()],
            vec!["America".into(), "United States".into(), 768.into()],
        ]
    );
}

#[test]
fn function_names_ignore_case() {
    let upper = run(
        "SELECT [Measures].[Amount] ON COLUMNS, \
         HIERARCHIZE({[Time].[Time].[Day].Members}) ON ROWS FROM [sales]",
    );
    let lower = run(
        "SELECT [Measures].[Amount] ON COLUMNS, \
         hierarchize({[Time].[Time].[Day].Members}) ON ROWS FROM [sales]",
    );
    assert_eq!(upper, lower);
}

#[test]
fn member_values_stay_case_sensitive() {
    let catalog = demo_catalog().unwrap();
    let err = run_table(
        &catalog,
        "SELECT {[geography].[geography].[country].[Europe].[france]} ON COLUMNS \
         FROM [sales]",
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Schema(SchemaError::UnknownMember { .. })
    ));

    let table = run(
        "SELECT {[geography].[geography].[country].[Europe].[France]} ON COLUMNS \
         FROM [sales] WHERE ([measures].[amount])",
    );
    assert_eq!(table.rows, vec![vec![4.into()]]);
}
