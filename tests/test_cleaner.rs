//! Tests for the cleaning stage

use tabreg::pipeline::{clean_table, load_table, CleanSpec, DateColumn, LoadOptions, Locator, MissingRule};
use tabreg::utils::dates::DateOrder;
use tabreg::{ColumnKind, PipelineError, Stage, Table, Value};

#[path = "common/mod.rs"]
mod common;

use common::*;

fn incidents() -> Table {
    let (_temp_dir, csv_path) = create_temp_csv(INCIDENTS_CSV);
    load_table(&Locator::Path(csv_path), &LoadOptions::default()).unwrap()
}

#[test]
fn test_drop_policy_removes_rows_with_missing_values() {
    let table = incidents();
    let spec = CleanSpec {
        categorical: vec!["BORO".into(), "PERP_SEX".into()],
        missing: vec![MissingRule::drop_row("PERP_SEX")],
        ..CleanSpec::default()
    };

    let (cleaned, report) = clean_table(&table, &spec).unwrap();

    // 8 rows, 2 with missing PERP_SEX
    assert_eq!(cleaned.height(), 6);
    assert_eq!(report.rows_in, 8);
    assert_eq!(report.rows_out, 6);
    assert_eq!(report.rows_dropped, 2);
    assert_eq!(
        cleaned.descriptor("PERP_SEX", Stage::Cleaner).unwrap().kind,
        ColumnKind::Categorical {
            labels: vec!["F".into(), "M".into()]
        }
    );
    // input untouched
    assert_eq!(table.height(), 8);
}

#[test]
fn test_drop_policy_counts_rows_once_across_columns() {
    let table = Table::from_columns(vec![
        (
            tabreg::ColumnDescriptor::new("a", ColumnKind::Integer),
            vec![Value::Null, Value::Int(1), Value::Null, Value::Int(3)],
        ),
        (
            tabreg::ColumnDescriptor::new("b", ColumnKind::Text),
            vec![Value::Null, Value::Null, text("x"), text("y")],
        ),
    ])
    .unwrap();
    let spec = CleanSpec {
        missing: vec![MissingRule::drop_row("a"), MissingRule::drop_row("b")],
        ..CleanSpec::default()
    };

    let (cleaned, report) = clean_table(&table, &spec).unwrap();
    assert_eq!(cleaned.height(), 1);
    assert_eq!(report.rows_dropped, 3);
    assert_eq!(column(&cleaned, "a"), vec![Value::Int(3)]);
}

#[test]
fn test_impute_keeps_row_count_and_adds_label() {
    let table = incidents();
    let spec = CleanSpec {
        categorical: vec!["PERP_SEX".into()],
        missing: vec![MissingRule::impute("PERP_SEX", "UNKNOWN")],
        ..CleanSpec::default()
    };

    let (cleaned, report) = clean_table(&table, &spec).unwrap();

    assert_eq!(cleaned.height(), table.height());
    assert_eq!(report.imputed.get("PERP_SEX"), Some(&2));
    assert_eq!(column(&cleaned, "PERP_SEX")[1], text("UNKNOWN"));
    let ColumnKind::Categorical { labels } =
        &cleaned.descriptor("PERP_SEX", Stage::Cleaner).unwrap().kind
    else {
        panic!("PERP_SEX should be categorical");
    };
    assert!(labels.contains(&"UNKNOWN".to_string()));
}

#[test]
fn test_drop_and_impute_on_same_column_is_rejected() {
    let spec = CleanSpec {
        missing: vec![
            MissingRule::drop_row("PERP_SEX"),
            MissingRule::impute("PERP_SEX", "UNKNOWN"),
        ],
        ..CleanSpec::default()
    };
    let err = clean_table(&incidents(), &spec).unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));
    assert_eq!(err.stage(), Stage::Cleaner);
}

#[test]
fn test_unparsed_dates_fail_without_policy() {
    let (_temp_dir, csv_path) =
        create_temp_csv("OCCUR_DATE,n\n01/05/2020,1\n13/45/2020,2\n02/01/2020,3\n");
    let table = load_table(&Locator::Path(csv_path), &LoadOptions::default()).unwrap();
    assert_eq!(
        table.descriptor("OCCUR_DATE", Stage::Loader).unwrap().kind,
        ColumnKind::Text
    );

    let spec = CleanSpec {
        dates: vec![DateColumn {
            column: "OCCUR_DATE".into(),
            order: DateOrder::Mdy,
        }],
        ..CleanSpec::default()
    };
    let err = clean_table(&table, &spec).unwrap_err();
    assert!(matches!(err, PipelineError::Format { .. }));
    let msg = err.to_string();
    assert!(msg.contains("OCCUR_DATE"));
    assert!(msg.contains("13/45/2020"));

    // the same failure is dropped when the column has a drop policy
    let spec = CleanSpec {
        missing: vec![MissingRule::drop_row("OCCUR_DATE")],
        ..spec
    };
    let (cleaned, report) = clean_table(&table, &spec).unwrap();
    assert_eq!(cleaned.height(), 2);
    assert_eq!(report.date_parse_failures.get("OCCUR_DATE"), Some(&1));
    assert_eq!(column(&cleaned, "OCCUR_DATE")[1], date(2020, 2, 1));
}

#[test]
fn test_day_month_order_applies_to_loaded_dates() {
    let (_temp_dir, csv_path) = create_temp_csv("D,n\n05/01/2020,1\n06/02/2020,2\n2020-03-04,3\n");
    let table = load_table(&Locator::Path(csv_path), &LoadOptions::default()).unwrap();
    assert_eq!(table.descriptor("D", Stage::Loader).unwrap().kind, ColumnKind::Date);
    assert_eq!(column(&table, "D")[0], date(2020, 5, 1));

    let spec = CleanSpec {
        dates: vec![DateColumn {
            column: "D".into(),
            order: DateOrder::Dmy,
        }],
        ..CleanSpec::default()
    };
    let (cleaned, report) = clean_table(&table, &spec).unwrap();

    assert_eq!(
        column(&cleaned, "D"),
        vec![date(2020, 1, 5), date(2020, 2, 6), date(2020, 3, 4)]
    );
    assert!(report.date_parse_failures.is_empty());
}

#[test]
fn test_day_month_order_reports_impossible_loaded_dates() {
    // 12/25/2020 is a valid M/D/Y date but has no 25th month
    let (_temp_dir, csv_path) = create_temp_csv("D,n\n05/01/2020,1\n12/25/2020,2\n");
    let table = load_table(&Locator::Path(csv_path), &LoadOptions::default()).unwrap();

    let spec = CleanSpec {
        dates: vec![DateColumn {
            column: "D".into(),
            order: DateOrder::Dmy,
        }],
        ..CleanSpec::default()
    };
    let err = clean_table(&table, &spec).unwrap_err();
    assert!(matches!(err, PipelineError::Format { .. }));
    assert!(err.to_string().contains("12/25/2020"));

    let spec = CleanSpec {
        missing: vec![MissingRule::drop_row("D")],
        ..spec
    };
    let (cleaned, report) = clean_table(&table, &spec).unwrap();
    assert_eq!(column(&cleaned, "D"), vec![date(2020, 1, 5)]);
    assert_eq!(report.date_parse_failures.get("D"), Some(&1));
}

#[test]
fn test_impute_loaded_date_column_with_slash_fill() {
    let (_temp_dir, csv_path) = create_temp_csv("OCCUR_DATE,n\n01/05/2020,1\n,2\n");
    let table = load_table(&Locator::Path(csv_path), &LoadOptions::default()).unwrap();

    let spec = CleanSpec {
        missing: vec![MissingRule::impute("OCCUR_DATE", "01/01/2020")],
        ..CleanSpec::default()
    };
    let (cleaned, report) = clean_table(&table, &spec).unwrap();
    assert_eq!(column(&cleaned, "OCCUR_DATE")[1], date(2020, 1, 1));
    assert_eq!(report.imputed.get("OCCUR_DATE"), Some(&1));
}

#[test]
fn test_columns_dropped_last() {
    let (_temp_dir, csv_path) = create_temp_csv(CASES_WIDE_CSV);
    let table = load_table(&Locator::Path(csv_path), &LoadOptions::default()).unwrap();

    let spec = CleanSpec {
        missing: vec![MissingRule::impute("Province/State", "ALL")],
        drop_columns: vec!["Lat".into(), "Long".into()],
        ..CleanSpec::default()
    };
    let (cleaned, report) = clean_table(&table, &spec).unwrap();

    assert_shape(&cleaned, 4, 6);
    assert_missing_columns(&cleaned, &["Lat", "Long"]);
    assert_eq!(report.dropped_columns, vec!["Lat", "Long"]);
    assert_eq!(column(&cleaned, "Province/State")[0], text("ALL"));
}

#[test]
fn test_unknown_column_is_format_error() {
    let spec = CleanSpec {
        categorical: vec!["NOPE".into()],
        ..CleanSpec::default()
    };
    let err = clean_table(&incidents(), &spec).unwrap_err();
    assert!(matches!(err, PipelineError::Format { .. }));
    assert!(err.to_string().contains("NOPE"));
}
