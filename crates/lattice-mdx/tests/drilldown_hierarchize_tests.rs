use lattice_mdx::store::demo_catalog;
use lattice_mdx::{run_table, CancelToken, EngineError, ResultTable, SchemaError, Value};
use pretty_assertions::assert_eq;

fn run(statement: &str) -> ResultTable {
    let catalog = demo_catalog().unwrap();
    run_table(&catalog, statement, &CancelToken::new()).unwrap()
}

#[test]
fn hierarchized_time_drill_runs_year_to_days() {
    let table = run(
        "SELECT NON EMPTY Hierarchize(AddCalculatedMembers(DrilldownMember({{DrilldownMember(\
         {{DrilldownMember({{[Time].[Time].[Year].Members}}, {[Time].[Time].[Year].[2010]})}}, \
         {[Time].[Time].[Quarter].[2010].[Q2 2010]})}}, \
         {[Time].[Time].[Month].[2010].[Q2 2010].[May 2010]}))) \
         DIMENSION PROPERTIES PARENT_UNIQUE_NAME,HIERARCHY_UNIQUE_NAME ON COLUMNS \
         FROM [sales] \
         WHERE ([Measures].[Amount]) \
         CELL PROPERTIES VALUE, FORMAT_STRING, LANGUAGE, BACK_COLOR, FORE_COLOR, FONT_FLAGS",
    );
    assert_eq!(table.columns.len(), 13);
    assert_eq!(table.columns[0], "2010");
    assert_eq!(table.columns[1], "2010.Q2 2010");
    assert_eq!(table.columns[2], "2010.Q2 2010.May 2010");
    assert_eq!(table.columns[3], "2010.Q2 2010.May 2010.May 12,2010");
    assert_eq!(table.columns[12], "2010.Q2 2010.May 2010.May 21,2010");

    let want: Vec<Value> = [1023, 1023, 1023, 1, 2, 4, 8, 16, 32, 64, 128, 256, 512]
        .into_iter()
        .map(Value::from)
        .collect();
    assert_eq!(table.rows, vec![want]);
}

#[test]
fn drilled_children_follow_their_group() {
    let table = run(
        "SELECT [Measures].[Amount] ON COLUMNS, \
         DrilldownMember({[Geography].[Geography].[Continent].Members}, \
         {[Geography].[Geography].[Continent].[Europe]}) ON ROWS \
         FROM [sales]",
    );
    assert_eq!(
        table.rows,
        vec![
            vec!["Europe".into(), Value::Blank, 255.into()],
            vec!["America".into(), Value::Blank, 768.into()],
            vec!["Europe".into(), "Switzerland".into(), 248.into()],
            vec!["Europe".into(), "France".into(), 4.into()],
            vec!["Europe".into(), "Spain".into(), 3.into()],
        ]
    );
}

#[test]
fn hierarchize_orders_parents_before_children() {
    let table = run(
        "SELECT [Measures].[Amount] ON COLUMNS, \
         Hierarchize(DrilldownMember({[Geography].[Geography].[Continent].Members}, \
         {[Geography].[Geography].[Continent].[Europe]})) ON ROWS \
         FROM [sales]",
    );
    assert_eq!(
        table.rows,
        vec![
            vec!["America".into(), Value::Blank, 768.into()],
            vec!["Europe".into(), Value::Blank, 255.into()],
            vec!["Europe".into(), "France".into(), 4.into()],
            vec!["Europe".into(), "Spain".into(), 3.into()],
            vec!["Europe".into(), "Switzerland".into(), 248.into()],
        ]
    );
}

#[test]
fn drilling_a_leaf_changes_nothing() {
    let base = "SELECT [Measures].[Amount] ON COLUMNS, \
         {[Time].[Time].[Day].Members} ON ROWS FROM [sales]";
    let drilled = "SELECT [Measures].[Amount] ON COLUMNS, \
         DrilldownMember({[Time].[Time].[Day].Members}, \
         {[Time].[Time].[Day].[2010].[Q2 2010].[May 2010].[May 12,2010]}) ON ROWS \
         FROM [sales]";
    assert_eq!(run(base), run(drilled));
}

#[test]
fn drill_targets_must_be_plain_members() {
    let catalog = demo_catalog().unwrap();
    let err = run_table(
        &catalog,
        "SELECT [Measures].[Amount] ON COLUMNS, \
         DrilldownMember({[Geography].[Geography].[Continent].Members}, \
         {[Geography].[Geography].[Continent].Members}) ON ROWS \
         FROM [sales]",
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Schema(SchemaError::DrillTargetNotMember(_))
    ));
}

#[test]
fn hierarchize_sorts_day_scans_ascending() {
    let table = run(
        "SELECT [Measures].[Amount] ON COLUMNS, \
         Hierarchize({[Time].[Time].[Day].Members}) ON ROWS \
         FROM [sales]",
    );
    let days: Vec<Value> = table.rows.iter().map(|row| row[3].clone()).collect();
    let want: Vec<Value> = (12..=21)
        .map(|day| Value::from(format!("May {day},2010")))
        .collect();
    assert_eq!(days, want);
}
