use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ndarray::{array, Array1, Array2, Ix1, Ix2};
use smap_l4_daily::config::{CalendarRuleConfig, MergeConfig, PipelineConfig, TransferMode};
use smap_l4_daily::container::FlatContainer;
use smap_l4_daily::error::SmapError;
use smap_l4_daily::integrity::check_granule;
use smap_l4_daily::locator::TIME_CODES;
use smap_l4_daily::pipeline::{run_aggregate, run_check, run_merge};
use smap_l4_daily::utils::{load_nc_var, write_nc_var, ShowProgress};

const LATS: [f32; 3] = [40.0, 30.0, 20.0];
const LONS: [f32; 4] = [70.0, 80.0, 90.0, 100.0];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Layout {
    Flat,
    Hierarchical,
    /// Hierarchical, but without the row/column index fields
    HierarchicalIncomplete,
}

fn cell_arrays(lons: &[f32]) -> (Array2<f32>, Array2<f32>) {
    let lat2d = Array2::from_shape_fn((LATS.len(), lons.len()), |(i, _)| LATS[i]);
    let lon2d = Array2::from_shape_fn((LATS.len(), lons.len()), |(_, j)| lons[j]);
    (lat2d, lon2d)
}

fn granule_name(day: NaiveDate, tc: &str) -> String {
    format!("SMAP_L4_SM_gph_{}T{tc}_Vv7032_001.h5", day.format("%Y%m%d"))
}

fn write_granule(path: &Path, layout: Layout, lons: &[f32], field: &Array2<f32>) {
    let (lat2d, lon2d) = cell_arrays(lons);
    let (ny, nx) = lat2d.dim();
    let mut ds = netcdf::create(path).unwrap();
    let mut root = ds.root_mut().unwrap();

    if layout == Layout::Flat {
        root.add_dimension("y", ny).unwrap();
        root.add_dimension("x", nx).unwrap();
        write_nc_var(&mut root, path, lat2d.view(), "cell_lat", &["y", "x"], None, None, false).unwrap();
        write_nc_var(&mut root, path, lon2d.view(), "cell_lon", &["y", "x"], None, None, false).unwrap();
        let mut geo = root.add_group("Geophysical_Data").unwrap();
        write_nc_var(&mut geo, path, field.view(), "sm_rootzone", &["y", "x"], None, None, false).unwrap();
        return;
    }

    let mut hdfeos = root.add_group("HDFEOS").unwrap();
    let mut grids = hdfeos.add_group("GRIDS").unwrap();
    grids.add_dimension("YDim", ny).unwrap();
    grids.add_dimension("XDim", nx).unwrap();
    {
        let mut main = grids.add_group("FileMainGroup").unwrap();
        let ydim = Array1::from_shape_fn(ny, |i| i as f32);
        let xdim = Array1::from_shape_fn(nx, |j| j as f32);
        write_nc_var(&mut main, path, ydim.view(), "YDim", &["YDim"], None, None, false).unwrap();
        write_nc_var(&mut main, path, xdim.view(), "XDim", &["XDim"], None, None, false).unwrap();

        let mut fields = main.add_group("Data Fields").unwrap();
        write_nc_var(&mut fields, path, lat2d.view(), "cell_lat", &["YDim", "XDim"], None, None, false).unwrap();
        write_nc_var(&mut fields, path, lon2d.view(), "cell_lon", &["YDim", "XDim"], None, None, false).unwrap();
        if layout == Layout::Hierarchical {
            let rows = Array2::from_shape_fn((ny, nx), |(i, _)| i as i32);
            let cols = Array2::from_shape_fn((ny, nx), |(_, j)| j as i32);
            write_nc_var(&mut fields, path, rows.view(), "cell_row", &["YDim", "XDim"], None, None, false).unwrap();
            write_nc_var(&mut fields, path, cols.view(), "cell_column", &["YDim", "XDim"], None, None, false).unwrap();
        }
    }
    let mut geo = grids.add_group("Geophysical_Data").unwrap();
    let mut fields = geo.add_group("Data Fields").unwrap();
    write_nc_var(&mut fields, path, field.view(), "sm_rootzone", &["YDim", "XDim"], None, None, false).unwrap();
}

/// Write one day of granules, granule `k` (in time code order) filled with `base + k`.
/// Only the first `n_codes` time codes are written.
fn write_day(dir: &Path, day: NaiveDate, base: f32, n_codes: usize, layout: Layout, lons: &[f32], sentinel_in_first: bool) {
    std::fs::create_dir_all(dir).unwrap();
    for (k, tc) in TIME_CODES.iter().take(n_codes).enumerate() {
        let mut field = Array2::from_elem((LATS.len(), lons.len()), base + k as f32);
        if sentinel_in_first && k == 0 {
            field[[0, 1]] = -9999.0;
        }
        write_granule(&dir.join(granule_name(day, tc)), layout, lons, &field);
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn config(root: &Path, years: &[i32], extra: &str) -> PipelineConfig {
    let years = years.iter().map(|y| y.to_string()).collect::<Vec<_>>().join(", ");
    let s = format!(r#"
source_root = "{}"
output_dir = "{}"
years = [{years}]
{extra}

[bbox]
lat_min = 25.0
lat_max = 45.0
lon_min = 75.0
lon_max = 95.0
"#, root.join("raw").display(), root.join("out").display());
    PipelineConfig::from_toml_str(&s).unwrap()
}

fn with_merge(mut cfg: PipelineConfig, start: NaiveDate, end: NaiveDate, output_file: PathBuf) -> PipelineConfig {
    cfg.merge = Some(MergeConfig { start, end, output_file });
    cfg
}

#[test]
fn test_aggregate_year_from_both_layouts() {
    let tmp = tempfile::tempdir().unwrap();
    let year_dir = tmp.path().join("raw").join("2019");
    write_day(&year_dir, ymd(2019, 1, 1), 1.0, 8, Layout::Flat, &LONS, true);
    write_day(&year_dir, ymd(2019, 1, 2), 2.0, 8, Layout::Hierarchical, &LONS, false);

    let cfg = config(tmp.path(), &[2019], "");
    let written = run_aggregate(&cfg, &[2019], ShowProgress::No).unwrap();
    assert_eq!(written, vec![tmp.path().join("out").join("2019_daily.h5")]);

    let out = &written[0];
    let ds = netcdf::open(out).unwrap();
    assert_eq!(load_nc_var::<f32, Ix1>(&ds, out, "latitude").unwrap(), array![40.0, 30.0]);
    assert_eq!(load_nc_var::<f32, Ix1>(&ds, out, "longitude").unwrap(), array![80.0, 90.0]);
    assert_eq!(load_nc_var::<i32, Ix1>(&ds, out, "time").unwrap(), array![20190101, 20190102]);

    // The sentinel in the first granule drops out of that cell's mean: (2+...+8)/7 vs (1+...+8)/8
    let data = load_nc_var::<f32, Ix2>(&ds, out, "data").unwrap();
    assert_eq!(data, array![[5.0, 4.5, 4.5, 4.5], [5.5, 5.5, 5.5, 5.5]]);
    assert_eq!(load_nc_var::<f32, Ix1>(&ds, out, "lat_flat").unwrap(), array![40.0, 40.0, 30.0, 30.0]);
    assert_eq!(load_nc_var::<f32, Ix1>(&ds, out, "lon_flat").unwrap(), array![80.0, 90.0, 80.0, 90.0]);

    let cube = load_nc_var::<f32, ndarray::Ix3>(&ds, out, "sm_rootzone").unwrap();
    assert_eq!(cube.dim(), (2, 2, 2));
    assert_eq!(cube[[0, 0, 0]], 5.0);

    let flat = FlatContainer::load(out).unwrap();
    assert_eq!(flat.num_days(), 2);
    assert_eq!(flat.num_points(), 4);
    assert!(!tmp.path().join("out").join("2019_daily.h5.partial").exists());
}

#[test]
fn test_incomplete_day_strict_and_lenient() {
    let tmp = tempfile::tempdir().unwrap();
    let year_dir = tmp.path().join("raw").join("2019");
    write_day(&year_dir, ymd(2019, 6, 1), 1.0, 8, Layout::Flat, &LONS, false);
    write_day(&year_dir, ymd(2019, 6, 2), 1.0, 7, Layout::Flat, &LONS, false);

    let cfg = config(tmp.path(), &[2019], "");
    let err = run_aggregate(&cfg, &[2019], ShowProgress::No).unwrap_err();
    match err {
        SmapError::MissingTimeCodes { year, day, missing } => {
            assert_eq!(year, 2019);
            assert_eq!(day, "20190602");
            assert_eq!(missing, vec!["223000".to_owned()]);
        },
        other => panic!("Expected MissingTimeCodes, got {other:?}"),
    }
    assert!(!cfg.year_container_path(2019).unwrap().exists());

    let cfg = config(tmp.path(), &[2019], "strict = false");
    let written = run_aggregate(&cfg, &[2019], ShowProgress::No).unwrap();
    let flat = FlatContainer::load(&written[0]).unwrap();
    assert_eq!(flat.time, array![20190601]);
}

#[test]
fn test_calendar_rule_drops_early_days() {
    let tmp = tempfile::tempdir().unwrap();
    let year_dir = tmp.path().join("raw").join("2015");
    write_day(&year_dir, ymd(2015, 3, 30), 1.0, 8, Layout::Hierarchical, &LONS, false);
    write_day(&year_dir, ymd(2015, 3, 31), 1.0, 8, Layout::Hierarchical, &LONS, false);

    let cfg = config(tmp.path(), &[2015], "");
    let mut cfg_with_rule = cfg.clone();
    cfg_with_rule.calendar_rules = vec![CalendarRuleConfig { year: 2015, start: ymd(2015, 3, 31), offset_days: 0 }];

    let written = run_aggregate(&cfg, &[2015], ShowProgress::No).unwrap();
    assert_eq!(FlatContainer::load(&written[0]).unwrap().time, array![20150330, 20150331]);

    let written = run_aggregate(&cfg_with_rule, &[2015], ShowProgress::No).unwrap();
    assert_eq!(FlatContainer::load(&written[0]).unwrap().time, array![20150331]);
}

#[test]
fn test_missing_year_directory_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    write_day(&tmp.path().join("raw").join("2019"), ymd(2019, 1, 1), 1.0, 8, Layout::Flat, &LONS, false);

    let cfg = config(tmp.path(), &[2018, 2019], "");
    let written = run_aggregate(&cfg, &[2018, 2019], ShowProgress::No).unwrap();
    assert_eq!(written, vec![cfg.year_container_path(2019).unwrap()]);
}

#[test]
fn test_merge_two_years() {
    let tmp = tempfile::tempdir().unwrap();
    let raw = tmp.path().join("raw");
    write_day(&raw.join("2019"), ymd(2019, 12, 31), 1.0, 8, Layout::Flat, &LONS, false);
    write_day(&raw.join("2020"), ymd(2020, 1, 1), 2.0, 8, Layout::Hierarchical, &LONS, false);
    write_day(&raw.join("2020"), ymd(2020, 1, 2), 3.0, 8, Layout::Hierarchical, &LONS, false);

    let merged_path = tmp.path().join("out").join("merged.h5");
    let cfg = with_merge(config(tmp.path(), &[2019, 2020], ""), ymd(2019, 1, 1), ymd(2020, 1, 1), merged_path.clone());
    run_aggregate(&cfg, &cfg.years.clone(), ShowProgress::No).unwrap();

    assert_eq!(run_merge(&cfg).unwrap(), merged_path);
    let merged = FlatContainer::load(&merged_path).unwrap();
    assert_eq!(merged.time, array![20191231, 20200101]);
    assert_eq!(merged.data, array![[4.5, 4.5, 4.5, 4.5], [5.5, 5.5, 5.5, 5.5]]);
    assert_eq!(merged.lat_flat, array![40.0, 40.0, 30.0, 30.0]);

    let ds = netcdf::open(&merged_path).unwrap();
    assert!(ds.variable("source_file").is_some());
    assert!(ds.variable("source_file_sha256").is_some());
    assert!(ds.variable("sm_rootzone").is_none());
}

#[test]
fn test_merge_rejects_mismatched_coordinates() {
    let tmp = tempfile::tempdir().unwrap();
    let raw = tmp.path().join("raw");
    write_day(&raw.join("2019"), ymd(2019, 1, 1), 1.0, 8, Layout::Flat, &LONS, false);
    // Same shape after cropping, but the longitudes are shifted
    write_day(&raw.join("2020"), ymd(2020, 1, 1), 1.0, 8, Layout::Flat, &[70.0, 81.0, 91.0, 100.0], false);

    let merged_path = tmp.path().join("out").join("merged.h5");
    let cfg = with_merge(config(tmp.path(), &[2019, 2020], ""), ymd(2019, 1, 1), ymd(2020, 12, 31), merged_path.clone());
    run_aggregate(&cfg, &cfg.years.clone(), ShowProgress::No).unwrap();

    let err = run_merge(&cfg).unwrap_err();
    assert!(matches!(err, SmapError::CoordinateMismatch { .. }), "unexpected error {err:?}");
    assert!(!merged_path.exists());
}

#[test]
fn test_merge_requires_every_year() {
    let tmp = tempfile::tempdir().unwrap();
    write_day(&tmp.path().join("raw").join("2019"), ymd(2019, 1, 1), 1.0, 8, Layout::Flat, &LONS, false);

    let cfg = with_merge(config(tmp.path(), &[2019, 2020], ""), ymd(2019, 1, 1), ymd(2020, 12, 31), tmp.path().join("m.h5"));
    run_aggregate(&cfg, &[2019], ShowProgress::No).unwrap();
    let err = run_merge(&cfg).unwrap_err();
    assert!(matches!(err, SmapError::MissingYearContainer { year: 2020, .. }));
}

#[test]
fn test_check_granule_contents() {
    let tmp = tempfile::tempdir().unwrap();
    let field = Array2::from_elem((LATS.len(), LONS.len()), 0.25f32);

    let good = tmp.path().join("good.h5");
    write_granule(&good, Layout::Hierarchical, &LONS, &field);
    assert!(check_granule(&good).is_empty());

    let flat = tmp.path().join("flat.h5");
    write_granule(&flat, Layout::Flat, &LONS, &field);
    assert!(check_granule(&flat).is_empty());

    let incomplete = tmp.path().join("incomplete.h5");
    write_granule(&incomplete, Layout::HierarchicalIncomplete, &LONS, &field);
    let mut problems = check_granule(&incomplete);
    problems.sort();
    assert_eq!(problems, vec![
        "HDFEOS/GRIDS/FileMainGroup/Data Fields/cell_column".to_owned(),
        "HDFEOS/GRIDS/FileMainGroup/Data Fields/cell_row".to_owned(),
    ]);

    let garbage = tmp.path().join("garbage.h5");
    std::fs::write(&garbage, b"not an hdf5 file").unwrap();
    let problems = check_granule(&garbage);
    assert_eq!(problems.len(), 1);
    assert!(problems[0].starts_with("[cannot open]"));
}

#[test]
fn test_check_transfers_only_passing_years() {
    let tmp = tempfile::tempdir().unwrap();
    let incoming = tmp.path().join("raw").join("incoming");
    write_day(&incoming, ymd(2019, 5, 1), 1.0, 8, Layout::Flat, &LONS, false);
    write_day(&incoming, ymd(2020, 5, 1), 1.0, 8, Layout::Hierarchical, &LONS, false);
    write_day(&incoming, ymd(2020, 5, 2), 1.0, 6, Layout::Hierarchical, &LONS, false);

    let mut cfg = config(tmp.path(), &[2019, 2020], "");
    cfg.check.transfer = TransferMode::Copy;
    let dir_2019 = cfg.year_source_dir(2019).unwrap();
    let dir_2020 = cfg.year_source_dir(2020).unwrap();
    assert_eq!(dir_2019, tmp.path().join("raw").join("2019"));

    // Dry run: report only
    let reports = run_check(&cfg, &[2019, 2020], false).unwrap();
    assert!(reports[0].passed());
    assert!(!reports[1].passed());
    assert!(!dir_2019.exists());
    assert!(!dir_2020.exists());

    let reports = run_check(&cfg, &[2019, 2020], true).unwrap();
    assert_eq!(reports[0].year, 2019);
    assert_eq!(reports[0].num_granules, 8);
    assert!(reports[0].bad_granules.is_empty());
    assert_eq!(reports[1].incomplete_days.len(), 1);
    assert_eq!(reports[1].incomplete_days[0].day, ymd(2020, 5, 2));
    assert!(!dir_2020.exists());

    let mut copied: Vec<String> = std::fs::read_dir(&dir_2019).unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    copied.sort();
    let expected: Vec<String> = TIME_CODES.iter().map(|tc| granule_name(ymd(2019, 5, 1), tc)).collect();
    assert_eq!(copied, expected);
    // Copies leave the originals in place
    assert!(incoming.join(granule_name(ymd(2019, 5, 1), "013000")).exists());

    // The transferred year is where aggregation reads from
    let written = run_aggregate(&cfg, &[2019], ShowProgress::No).unwrap();
    assert_eq!(FlatContainer::load(&written[0]).unwrap().time, array![20190501]);
}
