use lattice_mdx::store::demo_catalog;
use lattice_mdx::{run_table, CancelToken, ResultTable, Value};
use pretty_assertions::assert_eq;

fn run(statement: &str) -> ResultTable {
    let catalog = demo_catalog().unwrap();
    run_table(&catalog, statement, &CancelToken::new()).unwrap()
}

#[test]
fn a_country_slicer_narrows_the_rollup() {
    let table = run(
        "SELECT [Measures].[Amount] ON COLUMNS \
         FROM [sales] \
         WHERE ([Geography].[Geography].[Country].[Europe].[France])",
    );
    assert_eq!(table.columns, vec!["Amount".to_string()]);
    assert_eq!(table.rows, vec![vec![Value::from(4)]]);
}

#[test]
fn slicer_filters_feed_axis_scans() {
    let table = run(
        "SELECT [Measures].[Amount] ON COLUMNS, \
         [Time].[Time].[Day].Members ON ROWS \
         FROM [sales] \
         WHERE ([Geography].[Geography].[Continent].[Europe])",
    );
    let days: Vec<Value> = table.rows.iter().map(|row| row[3].clone()).collect();
    assert_eq!(
        days,
        vec![
            Value::from("May 18,2010"),
            Value::from("May 16,2010"),
            Value::from("May 14,2010"),
            Value::from("May 12,2010"),
            Value::from("May 13,2010"),
            Value::from("May 15,2010"),
            Value::from("May 17,2010"),
            Value::from("May 19,2010"),
        ]
    );
    let amounts: Vec<Value> = table.rows.iter().map(|row| row[4].clone()).collect();
    let want: Vec<Value> = [64, 16, 4, 1, 2, 8, 32, 128]
        .into_iter()
        .map(Value::from)
        .collect();
    assert_eq!(amounts, want);
}

#[test]
fn slicer_tuples_combine_a_member_and_a_measure() {
    let table = run(
        "SELECT [Time].[Time].[Day].Members ON COLUMNS \
         FROM [sales] \
         WHERE ([Geography].[Geography].[Continent].[Europe], [Measures].[Count])",
    );
    let counts: Vec<Value> = table.rows[0].clone();
    let want: Vec<Value> = [64, 4, 2, 84, 841, 231, 65, 13]
        .into_iter()
        .map(Value::from)
        .collect();
    assert_eq!(counts, want);
}

#[test]
fn a_leaf_slicer_leaves_a_single_day() {
    let table = run(
        "SELECT [Measures].[Amount] ON COLUMNS, \
         [Time].[Time].[Day].Members ON ROWS \
         FROM [sales] \
         WHERE ([Geography].[Geography].[Country].[Europe].[France])",
    );
    assert_eq!(
        table.rows,
        vec![vec![
            2010.into(),
            "Q2 2010".into(),
            "May 2010".into(),
            "May 14,2010".into(),
            4.into(),
        ]]
    );
}

#[test]
fn the_company_slicer_covers_every_fact() {
    let narrowed = run(
        "SELECT [Measures].[Amount] ON COLUMNS \
         FROM [sales] \
         WHERE ([Company].[Company].[Company].[Crazy Development])",
    );
    assert_eq!(narrowed.rows, vec![vec![Value::from(1023)]]);
}
