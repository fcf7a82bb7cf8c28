use lattice_mdx::store::demo_catalog;
use lattice_mdx::{run_query, run_table, CancelToken, ResultTable, Value};
use pretty_assertions::assert_eq;

fn run(statement: &str) -> ResultTable {
    let catalog = demo_catalog().unwrap();
    run_table(&catalog, statement, &CancelToken::new()).unwrap()
}

#[test]
fn without_non_empty_the_grid_keeps_blank_cells() {
    let table = run(
        "SELECT [Time].[Time].[Day].Members ON COLUMNS, \
         {[Geography].[Geography].[Country].[Europe].[France]} ON ROWS \
         FROM [sales] \
         WHERE ([Measures].[Amount])",
    );
    assert_eq!(table.rows.len(), 1);
    // Levels for the rows axis, then one cell per day.
    let cells = &table.rows[0][2..];
    assert_eq!(cells.len(), 10);
    assert_eq!(cells.iter().filter(|v| !v.is_blank()).count(), 1);
    assert_eq!(cells[2], Value::from(4));
}

#[test]
fn non_empty_drops_columns_with_no_data() {
    let table = run(
        "SELECT NON EMPTY [Time].[Time].[Day].Members ON COLUMNS, \
         {[Geography].[Geography].[Country].[Europe].[France]} ON ROWS \
         FROM [sales] \
         WHERE ([Measures].[Amount])",
    );
    assert_eq!(
        table.columns,
        vec![
            "Continent".to_string(),
            "Country".to_string(),
            "2010.Q2 2010.May 2010.May 14,2010".to_string(),
        ]
    );
    assert_eq!(
        table.rows,
        vec![vec!["Europe".into(), "France".into(), 4.into()]]
    );
}

#[test]
fn non_empty_drops_rows_with_no_data() {
    let table = run(
        "SELECT {[Time].[Time].[Day].[2010].[Q2 2010].[May 2010].[May 20,2010]} ON COLUMNS, \
         NON EMPTY [Geography].[Geography].[Country].Members ON ROWS \
         FROM [sales] \
         WHERE ([Measures].[Amount])",
    );
    assert_eq!(
        table.rows,
        vec![vec![
            "America".into(),
            "United States".into(),
            256.into()
        ]]
    );
}

#[test]
fn non_empty_on_both_axes_shrinks_the_cell_block() {
    let catalog = demo_catalog().unwrap();
    let kept = run_query(
        &catalog,
        "SELECT NON EMPTY [Time].[Time].[Day].Members ON COLUMNS, \
         NON EMPTY [Geography].[Geography].[Country].Members ON ROWS \
         FROM [sales] \
         WHERE ([Measures].[Amount])",
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(kept.columns, 10);
    assert_eq!(kept.axes[1].tuples.len(), 4);
    assert_eq!(kept.cells.len(), 40);
}
