use std::sync::Arc;

use gridsql_config::Settings;
use gridsql_core::{CellValue, GridRange, GridRef, MemoryGrid, SheetId};
use gridsql_engine::{
    DataSource, ErrorKind, ExecuteOutcome, ParamSpec, Session, SnapshotCommand, SqlValue, TableDeclaration,
};

fn sample_grid() -> (Arc<MemoryGrid>, SheetId) {
    let grid = Arc::new(MemoryGrid::new());
    let sheet = grid.add_sheet("Sheet1");
    grid.load_rows(
        sheet,
        0,
        0,
        vec![
            vec![CellValue::from("A"), CellValue::from("B")],
            vec![CellValue::Number(1.0), CellValue::Number(2.0)],
            vec![CellValue::Number(3.0), CellValue::Number(4.0)],
        ],
    )
    .unwrap();
    (grid, sheet)
}

/// Scenario A setup: the 3x2 block with headers bound as table `t`.
fn bound_session() -> (Arc<MemoryGrid>, SheetId, Session) {
    let (grid, sheet) = sample_grid();
    let mut session = Session::open(&DataSource::Memory, grid.clone(), &Settings::default()).unwrap();
    let declaration = TableDeclaration::new(GridRef::new(sheet, GridRange::new(0, 2, 0, 1).unwrap()), true, false);
    session.create_table("t", &declaration, false).unwrap();
    (grid, sheet, session)
}

fn rows(session: &Session, sql: &str) -> Vec<Vec<SqlValue>> {
    session.query(sql, &[], None, false).unwrap()
}

fn reals(values: &[[f64; 2]]) -> Vec<Vec<SqlValue>> {
    values.iter().map(|r| r.iter().map(|v| SqlValue::Real(*v)).collect()).collect()
}

// -------------------------------------------------------------------------
// Scenarios
// -------------------------------------------------------------------------

#[test]
fn scenario_a_live_query() {
    let (_grid, _sheet, session) = bound_session();
    let with_headings = session.query("SELECT * FROM t", &[], None, true).unwrap();
    assert_eq!(with_headings[0], vec![SqlValue::Text("A".into()), SqlValue::Text("B".into())]);
    assert_eq!(rows(&session, "SELECT * FROM t"), reals(&[[1.0, 2.0], [3.0, 4.0]]));
}

#[test]
fn scenario_b_live_sees_mutation() {
    let (grid, sheet, session) = bound_session();
    rows(&session, "SELECT * FROM t");
    grid.set(sheet, 1, 0, CellValue::Number(99.0)).unwrap();
    assert_eq!(rows(&session, "SELECT * FROM t"), reals(&[[99.0, 2.0], [3.0, 4.0]]));
}

#[test]
fn scenario_c_frozen_hides_mutation() {
    let (grid, sheet, mut session) = bound_session();
    session.update_table("t", SnapshotCommand::Freeze).unwrap();
    grid.set(sheet, 1, 0, CellValue::Number(100.0)).unwrap();
    assert_eq!(rows(&session, "SELECT * FROM t"), reals(&[[1.0, 2.0], [3.0, 4.0]]));

    // refresh re-captures, unfreeze goes back to live reads
    session.update_table("t", SnapshotCommand::Refresh).unwrap();
    grid.set(sheet, 2, 1, CellValue::Number(40.0)).unwrap();
    assert_eq!(rows(&session, "SELECT * FROM t"), reals(&[[100.0, 2.0], [3.0, 4.0]]));

    session.update_table("t", SnapshotCommand::Unfreeze).unwrap();
    assert_eq!(rows(&session, "SELECT * FROM t"), reals(&[[100.0, 2.0], [3.0, 40.0]]));
}

#[test]
fn scenario_d_positional_parameter_count() {
    let (_grid, _sheet, mut session) = bound_session();
    session.create_query("$q1", "SELECT ?1", ParamSpec::Positional(2), false).unwrap();

    let three = [SqlValue::Integer(1), SqlValue::Integer(2), SqlValue::Integer(3)];
    let err = session.execute("$q1", &three, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let two = [SqlValue::Integer(1), SqlValue::Integer(2)];
    assert_eq!(session.execute("$q1", &two, None).unwrap(), ExecuteOutcome::Completed);
    assert_eq!(session.query("$q1", &two, None, false).unwrap(), vec![vec![SqlValue::Integer(1)]]);
}

// -------------------------------------------------------------------------
// Snapshot protocol through SQL
// -------------------------------------------------------------------------

#[test]
fn refresh_while_live_is_a_no_op() {
    let (grid, sheet, mut session) = bound_session();
    session.update_table("t", SnapshotCommand::Refresh).unwrap();
    grid.set(sheet, 1, 0, CellValue::Number(7.0)).unwrap();
    assert_eq!(rows(&session, "SELECT A FROM t WHERE B = 2"), vec![vec![SqlValue::Real(7.0)]]);
}

#[test]
fn control_write_through_plain_sql() {
    let (grid, sheet, session) = bound_session();
    session.execute("INSERT INTO t (rowid) VALUES (-1)", &[], None).unwrap();
    grid.set(sheet, 1, 0, CellValue::Number(100.0)).unwrap();
    assert_eq!(rows(&session, "SELECT A FROM t WHERE rowid = 0"), vec![vec![SqlValue::Real(1.0)]]);
}

#[test]
fn real_writes_are_rejected() {
    let (_grid, _sheet, session) = bound_session();
    for sql in [
        "INSERT INTO t VALUES (5, 6)",
        "UPDATE t SET A = 0",
        "DELETE FROM t",
        "INSERT INTO t (rowid, A) VALUES (-1, 5)",
    ] {
        let err = session.execute(sql, &[], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied, "{sql}");
    }
}

#[test]
fn unknown_control_code_is_type_mismatch() {
    let (_grid, _sheet, session) = bound_session();
    let err = session.execute("INSERT INTO t (rowid) VALUES (42)", &[], None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

#[test]
fn frozen_at_declaration() {
    let (grid, sheet) = sample_grid();
    let mut session = Session::open(&DataSource::Memory, grid.clone(), &Settings::default()).unwrap();
    let declaration = TableDeclaration::new(GridRef::new(sheet, GridRange::new(1, 2, 0, 1).unwrap()), false, true);
    session.create_table("snap", &declaration, false).unwrap();
    grid.set(sheet, 1, 0, CellValue::Number(-5.0)).unwrap();
    let rows = session.query("SELECT A, B FROM snap", &[], None, true).unwrap();
    assert_eq!(rows[0], vec![SqlValue::Text("A".into()), SqlValue::Text("B".into())]);
    assert_eq!(rows[1], vec![SqlValue::Real(1.0), SqlValue::Real(2.0)]);
}

// -------------------------------------------------------------------------
// Cell projection and schema
// -------------------------------------------------------------------------

#[test]
fn cell_shapes_project_to_sql_types() {
    let grid = Arc::new(MemoryGrid::new());
    let sheet = grid.add_sheet("Mixed");
    grid.load_rows(
        sheet,
        0,
        0,
        vec![vec![
            CellValue::from("text"),
            CellValue::Number(2.5),
            CellValue::Boolean(true),
            CellValue::Blank,
            CellValue::from_input("#N/A"),
            CellValue::Missing,
        ]],
    )
    .unwrap();

    let mut session = Session::open(&DataSource::Memory, grid, &Settings::default()).unwrap();
    let declaration = TableDeclaration::new(GridRef::new(sheet, GridRange::new(0, 0, 0, 5).unwrap()), false, false);
    session.create_table("m", &declaration, false).unwrap();

    let rows = session.query("SELECT * FROM m", &[], None, true).unwrap();
    let headings: Vec<SqlValue> = ["A", "B", "C", "D", "E", "F"].iter().map(|s| SqlValue::Text(s.to_string())).collect();
    assert_eq!(rows[0], headings);
    assert_eq!(
        rows[1],
        vec![
            SqlValue::Text("text".into()),
            SqlValue::Real(2.5),
            SqlValue::Integer(1),
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Null,
        ]
    );
}

#[test]
fn blank_headers_use_column_letters() {
    let grid = Arc::new(MemoryGrid::new());
    let sheet = grid.add_sheet("S");
    grid.load_rows(
        sheet,
        4,
        2,
        vec![
            vec![CellValue::from("id"), CellValue::Blank, CellValue::from("total")],
            vec![CellValue::Number(1.0), CellValue::from("x"), CellValue::Number(9.0)],
        ],
    )
    .unwrap();
    let mut session = Session::open(&DataSource::Memory, grid, &Settings::default()).unwrap();
    let declaration = TableDeclaration::new(GridRef::new(sheet, GridRange::new(4, 5, 2, 4).unwrap()), true, false);
    session.create_table("h", &declaration, false).unwrap();

    let rows = session.query("SELECT id, D, total FROM h", &[], None, false).unwrap();
    assert_eq!(rows, vec![vec![SqlValue::Real(1.0), SqlValue::Text("x".into()), SqlValue::Real(9.0)]]);
}

#[test]
fn filter_restarts_scan() {
    let (_grid, _sheet, session) = bound_session();
    // the inner table is rescanned once per outer row
    let rows = session
        .query("SELECT a.A, b.B FROM t AS a, t AS b ORDER BY a.A, b.B", &[], None, false)
        .unwrap();
    assert_eq!(rows, reals(&[[1.0, 2.0], [1.0, 4.0], [3.0, 2.0], [3.0, 4.0]]));
}

#[test]
fn drop_table_removes_binding() {
    let (_grid, _sheet, session) = bound_session();
    session.execute("DROP TABLE temp.t", &[], None).unwrap();
    assert!(!session.exists_table("t").unwrap());
    assert!(session.list_tables(None).unwrap().is_empty());
}

// -------------------------------------------------------------------------
// Parameter binding
// -------------------------------------------------------------------------

#[test]
fn named_cached_query() {
    let (_grid, _sheet, mut session) = bound_session();
    session
        .create_query(
            "$by_b",
            "SELECT A FROM t WHERE B = :b OR B = :other",
            ParamSpec::Named(vec!["b".into(), "Other".into()]),
            false,
        )
        .unwrap();
    let rows = session
        .query("$by_b", &[SqlValue::Integer(4), SqlValue::Integer(-1)], None, false)
        .unwrap();
    assert_eq!(rows, vec![vec![SqlValue::Real(3.0)]]);
}

#[test]
fn cached_query_binds_by_caller_names() {
    let (_grid, _sheet, mut session) = bound_session();
    session
        .create_query("$diff", "SELECT :a - :b", ParamSpec::Named(vec!["a".into(), "b".into()]), false)
        .unwrap();
    let values = [SqlValue::Integer(1), SqlValue::Integer(2)];

    let declared_order = session.query("$diff", &values, None, false).unwrap();
    assert_eq!(declared_order, vec![vec![SqlValue::Integer(-1)]]);

    let swapped = vec!["b".to_string(), "a".to_string()];
    let rows = session.query("$diff", &values, Some(&swapped), false).unwrap();
    assert_eq!(rows, vec![vec![SqlValue::Integer(1)]]);

    let unknown = vec!["zzz".to_string(), "yyy".to_string()];
    let err = session.query("$diff", &values, Some(&unknown), false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = session.execute("$diff", &values, Some(&unknown)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn named_ad_hoc_query() {
    let (_grid, _sheet, session) = bound_session();
    let names = vec!["@min".to_string()];
    let rows = session
        .query("SELECT B FROM t WHERE A >= @min", &[SqlValue::Integer(2)], Some(&names), false)
        .unwrap();
    assert_eq!(rows, vec![vec![SqlValue::Real(4.0)]]);
}

#[test]
fn execute_reports_changes_for_mutations() {
    let (_grid, _sheet, session) = bound_session();
    session.execute("CREATE TEMP TABLE copy (a, b)", &[], None).unwrap();
    assert_eq!(
        session.execute("INSERT INTO copy SELECT * FROM t", &[], None).unwrap(),
        ExecuteOutcome::Changed(2)
    );
    assert_eq!(
        session.execute("DELETE FROM copy WHERE a = ?", &[SqlValue::Real(1.0)], None).unwrap(),
        ExecuteOutcome::Changed(1)
    );
}
