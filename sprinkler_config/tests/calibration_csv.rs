use std::fs::File;
use std::io::Write;

use rstest::rstest;
use sprinkler_config::{
    CalibrationRow, CalibrationTables, Curve, load_calibration_csv, read_calibration_csv,
    save_calibration_csv,
};
use tempfile::tempdir;

#[rstest]
fn rows_are_split_per_curve_and_sorted() {
    let csv = "curve,x,y\nnozzle_right,40,9000\nnozzle_right,12,5000\nvalve,180,60\nnozzle_left,7,4000\n";
    let t = read_calibration_csv(csv.as_bytes()).unwrap();
    assert_eq!(t.nozzle_right, vec![(12, 5000), (40, 9000)]);
    assert_eq!(t.nozzle_left, vec![(7, 4000)]);
    assert_eq!(t.valve, vec![(180, 60)]);
}

#[rstest]
fn rejects_wrong_headers() {
    let err = read_calibration_csv("curve,distance,us\nvalve,1,2\n".as_bytes()).unwrap_err();
    assert!(format!("{err}").contains("curve,x,y"), "{err}");
}

#[rstest]
#[case("curve,x,y\nsideways,1,2\n")]
#[case("curve,x,y\nvalve,abc,2\n")]
fn rejects_bad_rows(#[case] csv: &str) {
    let err = read_calibration_csv(csv.as_bytes()).unwrap_err();
    assert!(format!("{err}").contains("invalid CSV row 2"), "{err}");
}

#[rstest]
fn rejects_duplicate_x_within_a_curve() {
    let rows = vec![
        CalibrationRow {
            curve: Curve::Valve,
            x: 100,
            y: 10,
        },
        CalibrationRow {
            curve: Curve::NozzleLeft,
            x: 100,
            y: 10,
        },
        CalibrationRow {
            curve: Curve::Valve,
            x: 100,
            y: 20,
        },
    ];
    let err = CalibrationTables::from_rows(rows).unwrap_err();
    assert!(format!("{err}").contains("repeats x=100"), "{err}");
}

#[rstest]
fn saved_tables_load_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    let tables = CalibrationTables {
        nozzle_right: vec![(10, 3000), (80, 20000)],
        nozzle_left: vec![(9, 3100)],
        valve: vec![(150, 40)],
    };
    save_calibration_csv(&path, &tables).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("curve,x,y\n"));
    assert_eq!(load_calibration_csv(&path).unwrap(), tables);
}

#[rstest]
fn empty_tables_still_write_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    save_calibration_csv(&path, &CalibrationTables::default()).unwrap();
    let loaded = load_calibration_csv(&path).unwrap();
    assert!(loaded.is_empty());
}

#[rstest]
fn missing_file_reports_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.csv");
    let err = load_calibration_csv(&path).unwrap_err();
    assert!(format!("{err}").contains("nope.csv"));
}

#[rstest]
fn load_from_file_with_trailing_newlines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "curve,x,y").unwrap();
    writeln!(f, "valve,200,80").unwrap();
    writeln!(f).unwrap();
    drop(f);
    let t = load_calibration_csv(&path).unwrap();
    assert_eq!(t.valve, vec![(200, 80)]);
}
