//! Shared test utilities and fixture generators
#![allow(dead_code)]

use std::path::PathBuf;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tabreg::{ColumnDescriptor, ColumnKind, Stage, Table, Value};
use tempfile::TempDir;

/// Wide time series: two rows for region A, two date columns
pub const SCENARIO_WIDE_CSV: &str = "Region,1/1/20,1/2/20\nA,5,6\nA,7,9\n";

/// Confirmed-cases shaped wide table with coordinates to drop
pub const CASES_WIDE_CSV: &str = "\
Province/State,Country/Region,Lat,Long,1/22/20,1/23/20,1/24/20,1/25/20
,Afghanistan,33.0,65.0,0,0,1,2
Ontario,Canada,51.2,-85.3,1,3,6,10
Quebec,Canada,52.9,-73.5,0,2,4,8
,Chile,-35.7,-71.5,2,5,9,13
";

/// Deaths counterpart of [`CASES_WIDE_CSV`]
pub const DEATHS_WIDE_CSV: &str = "\
Province/State,Country/Region,Lat,Long,1/22/20,1/23/20,1/24/20,1/25/20
,Afghanistan,33.0,65.0,0,0,0,0
Ontario,Canada,51.2,-85.3,0,0,1,1
Quebec,Canada,52.9,-73.5,0,0,0,1
,Chile,-35.7,-71.5,0,1,1,2
";

/// Incident records with missing categorical fields and a time column
pub const INCIDENTS_CSV: &str = "\
INCIDENT_KEY,OCCUR_DATE,OCCUR_TIME,BORO,PERP_SEX,STATISTICAL_MURDER_FLAG
1,01/05/2020,23:15:00,BRONX,M,false
2,01/06/2020,01:30:00,QUEENS,,true
3,02/11/2020,14:00:00,BRONX,F,false
4,03/02/2020,08:45:00,BROOKLYN,M,false
5,03/09/2020,22:10:00,QUEENS,,true
6,04/19/2020,19:05:00,BROOKLYN,F,false
7,05/23/2020,02:55:00,BRONX,M,true
8,06/30/2020,17:20:00,QUEENS,M,false
";

/// Create a temporary directory with a CSV file holding `contents`
pub fn create_temp_csv(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = write_file(&temp_dir, "test_data.csv", contents);
    (temp_dir, csv_path)
}

/// Write `contents` to `name` inside `dir`
pub fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn date(y: i32, m: u32, d: u32) -> Value {
    Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// Seeded wide table: `rows` entities, `dates` integer date columns named M/D/YY
pub fn create_wide_table(rows: usize, dates: usize, seed: u64) -> Table {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2020, 1, 22).unwrap();

    let mut columns = vec![(
        ColumnDescriptor::new("Region", ColumnKind::Text),
        (0..rows).map(|i| text(&format!("R{}", i))).collect::<Vec<_>>(),
    )];
    for d in 0..dates {
        let day = start + chrono::Duration::days(d as i64);
        let name = day.format("%-m/%-d/%y").to_string();
        let values = (0..rows)
            .map(|_| Value::Int(rng.gen_range(0..1000)))
            .collect();
        columns.push((ColumnDescriptor::new(name, ColumnKind::Integer), values));
    }
    Table::from_columns(columns).unwrap()
}

/// Assert that a table has the expected shape
pub fn assert_shape(table: &Table, expected_rows: usize, expected_cols: usize) {
    let (rows, cols) = table.shape();
    assert_eq!(rows, expected_rows, "Row count mismatch: expected {}, got {}", expected_rows, rows);
    assert_eq!(cols, expected_cols, "Column count mismatch: expected {}, got {}", expected_cols, cols);
}

/// Assert that a table contains specific columns
pub fn assert_has_columns(table: &Table, expected_cols: &[&str]) {
    let actual = table.column_names();
    for col in expected_cols {
        assert!(
            actual.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual
        );
    }
}

/// Assert that a table does NOT contain specific columns
pub fn assert_missing_columns(table: &Table, unexpected_cols: &[&str]) {
    let actual = table.column_names();
    for col in unexpected_cols {
        assert!(
            !actual.contains(&col.to_string()),
            "Unexpected column still present: '{}'",
            col
        );
    }
}

/// Cells of a column, panicking if absent
pub fn column(table: &Table, name: &str) -> Vec<Value> {
    table.values(name, Stage::Reporter).unwrap()
}
