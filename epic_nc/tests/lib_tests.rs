use std::{collections::BTreeMap, path::Path};

use chrono::NaiveDate;
use epic_nc::{
    ctd_merge::{carried_globals, merge_cast},
    discrete::read_discrete_table,
    edit::{add_variable, surface_fill},
    gps::{list_gpgga_files, read_track, write_track, TRACK_FILE_NAME},
    is_missing, load_schema,
    odv::{build_block, OdvOptions, DEFAULT_BOTTLE_VARS},
    paths::{paired_path, profile_path},
    profile::{build_profiles, MergedTable, Profile, WriteOptions},
    report::read_bottle_report,
    schema::EpicSchema,
    EpicDataset, EpicError, EpicTime, EpicWriter, GlobalAttributes, TimeConvention, MISSING_VALUE,
};

/// Equal to f32 precision, with the sentinel matching itself.
fn close_to(got: &[f64], want: &[f64]) -> bool {
    got.len() == want.len()
        && got
            .iter()
            .zip(want)
            .all(|(g, w)| (is_missing(*g) && is_missing(*w)) || (g - w).abs() < 1e-4)
}

fn btl_profiles() -> (EpicSchema, Vec<Profile>) {
    let schema = load_schema("tests/data/btl_config.yaml".as_ref()).unwrap();
    let report = read_bottle_report("tests/data/dy1707l1.report_btl".as_ref()).unwrap();
    let profiles = build_profiles("DY1707", &MergedTable::from_report(&report), &schema).unwrap();
    (schema, profiles)
}

fn nut_profiles() -> (EpicSchema, Vec<Profile>) {
    let schema = load_schema("tests/data/nut_config.pyini".as_ref()).unwrap();
    let report = read_bottle_report("tests/data/dy1707l1.report_btl".as_ref()).unwrap();
    let nuts = read_discrete_table("tests/data/dy1707_nutrients.csv".as_ref()).unwrap();
    let profiles = build_profiles("DY1707", &MergedTable::merge(&report, &nuts), &schema).unwrap();
    (schema, profiles)
}

fn write_opts(history: &str) -> WriteOptions {
    WriteOptions {
        history: history.to_string(),
        ..WriteOptions::default()
    }
}

/// CTD-style file: T_28 and S_41 only, on a 10 dbar grid.
fn write_ctd(dir: &Path, cast: &str, latitude: f64) -> std::path::PathBuf {
    let full = load_schema("tests/data/ctdpnut_epickeys.yaml".as_ref()).unwrap();
    let schema = EpicSchema::new(
        full.variables()
            .iter()
            .filter(|d| d.key == "T_28" || d.key == "S_41")
            .cloned()
            .collect(),
    )
    .unwrap();

    let mut data = BTreeMap::new();
    data.insert("T_28".to_string(), vec![8.0, 7.5, 7.1, 6.5]);
    data.insert("S_41".to_string(), vec![31.6, 31.7, 31.8, 31.9]);
    let profile = Profile {
        cruise: "DY1707".to_string(),
        cast_name: cast.to_string(),
        time: NaiveDate::from_ymd_opt(2017, 9, 15).unwrap().and_hms_opt(17, 40, 0).unwrap(),
        latitude,
        longitude: 164.26,
        depth: vec![10.0, 20.0, 30.0, 50.0],
        data,
    };
    let path = dir.join(format!("dy1707{}_ctd.nc", cast.replace("ctd", "c")));
    profile
        .write(&path, &schema, &GlobalAttributes::default(), &write_opts("CTD archived"))
        .unwrap();
    path
}

// ─────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────
#[test]
fn test_load_schema_by_extension() {
    let yaml = load_schema("tests/data/btl_config.yaml".as_ref()).unwrap();
    assert_eq!(yaml.keys().collect::<Vec<_>>(), ["BTL_103", "T_28", "S_41", "O_65", "ST_70"]);

    let json = load_schema("tests/data/nut_config.pyini".as_ref()).unwrap();
    assert_eq!(json.len(), 6);
    assert_eq!(json.get("PO4_186").unwrap().epic_code, 186);

    assert!(matches!(
        load_schema("tests/data/schema.ini".as_ref()),
        Err(EpicError::UnsupportedConfig(_))
    ));
}

// ─────────────────────────────────────────────────────────────────────
// Bottle archive
// ─────────────────────────────────────────────────────────────────────
#[test]
fn test_bottle_profiles_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (schema, profiles) = btl_profiles();
    assert_eq!(profiles.len(), 2);

    let p = &profiles[0];
    let path = profile_path(dir.path(), &p.cruise, &p.cast_name, "btl");
    assert!(path.ends_with("dy1707c001_btl.nc"));

    let summary = p
        .write(&path, &schema, &GlobalAttributes::default(), &write_opts("File created by archiving bottle report files"))
        .unwrap();
    assert_eq!(summary.filled, ["ST_70"]);
    assert_eq!(summary.written.len(), 4);

    let ds = EpicDataset::load(&path).unwrap();
    assert_eq!(ds.global_text("CRUISE").as_deref(), Some("DY1707"));
    assert_eq!(ds.global_text("CAST").as_deref(), Some("ctd001"));
    assert!(ds.history().ends_with("UTC File created by archiving bottle report files"));
    assert_eq!(ds.history().lines().count(), 1);

    assert!(close_to(ds.depth().unwrap(), &[50.211, 30.020, 10.118]));
    assert!(close_to(ds.get("T_28").unwrap(), &[6.5530, 7.1020, 8.0040]));
    assert!(close_to(ds.get("BTL_103").unwrap(), &[1.0, 2.0, 3.0]));
    assert!(ds.get("ST_70").unwrap().iter().all(|&v| is_missing(v)));
    assert!(ds.latitude().map(is_missing).unwrap());

    // every declared key carries a value
    for key in schema.keys() {
        assert_eq!(ds.get(key).unwrap().len(), 3, "{key}");
    }

    let t = NaiveDate::from_ymd_opt(2017, 9, 15).unwrap().and_hms_opt(17, 42, 8).unwrap();
    assert_eq!(ds.time(), Some(t));
}

#[test]
fn test_variable_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let (schema, profiles) = btl_profiles();
    let path = dir.path().join("attrs.nc");
    profiles[1]
        .write(&path, &schema, &GlobalAttributes::default(), &WriteOptions::default())
        .unwrap();

    let reader = epic_nc::EpicReader::open(&path).unwrap();
    let atts = reader.variable_attributes("S_41").unwrap();
    assert_eq!(atts["epic_code"].as_f64(), Some(41.0));
    assert_eq!(atts["units"].as_text(), Some("PSU"));
    assert_eq!(atts["long_name"].as_text(), Some("SALINITY (PSU)"));

    let dep = reader.variable_attributes("dep").unwrap();
    assert_eq!(dep["units"].as_text(), Some("dbar"));
    assert_eq!(reader.epic_time().unwrap(), EpicTime::new(2_458_013, 7_800_000).unwrap());
}

#[test]
fn test_cf_time_axis() {
    let dir = tempfile::tempdir().unwrap();
    let (schema, profiles) = btl_profiles();
    let path = dir.path().join("cf.nc");
    let opts = WriteOptions {
        convention: TimeConvention::Cf,
        ..WriteOptions::default()
    };
    profiles[0]
        .write(&path, &schema, &GlobalAttributes::default(), &opts)
        .unwrap();

    let ds = EpicDataset::load(&path).unwrap();
    assert!(ds.get("time2").is_none());
    assert_eq!(ds.time_units.as_deref(), Some("hours since 1900-01-01T00:00:00Z"));
    assert_eq!(ds.time(), Some(profiles[0].time));
}

#[test]
fn test_existing_file_needs_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let (schema, profiles) = btl_profiles();
    let path = dir.path().join("dup.nc");
    let globals = GlobalAttributes::default();

    profiles[0].write(&path, &schema, &globals, &WriteOptions::default()).unwrap();
    let err = profiles[1]
        .write(&path, &schema, &globals, &WriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, EpicError::AlreadyExists(_)));
    // the refused create leaves the first file alone
    let ds = EpicDataset::load(&path).unwrap();
    assert_eq!(ds.global_text("CAST").as_deref(), Some("ctd001"));

    let opts = WriteOptions {
        overwrite: true,
        ..WriteOptions::default()
    };
    profiles[1].write(&path, &schema, &globals, &opts).unwrap();
    let ds = EpicDataset::load(&path).unwrap();
    assert_eq!(ds.global_text("CAST").as_deref(), Some("ctd002"));
}

// ─────────────────────────────────────────────────────────────────────
// Writer call order and shapes
// ─────────────────────────────────────────────────────────────────────
#[test]
fn test_writer_rejects_out_of_order_calls() {
    let dir = tempfile::tempdir().unwrap();
    let (schema, _) = btl_profiles();

    let mut nc = EpicWriter::create(&dir.path().join("order.nc"), false).unwrap();
    assert!(matches!(nc.declare_fields(&schema), Err(EpicError::OutOfOrder(..))));
    nc.declare_dimensions(1, 2).unwrap();
    assert!(matches!(
        nc.write_data(&schema, &BTreeMap::new(), MISSING_VALUE),
        Err(EpicError::OutOfOrder(..))
    ));
    nc.declare_fields(&schema).unwrap();

    let mut data = BTreeMap::new();
    data.insert("T_28".to_string(), vec![1.0, 2.0, 3.0]);
    assert!(matches!(
        nc.write_data(&schema, &data, MISSING_VALUE),
        Err(EpicError::Shape { expected: 2, got: 3, .. })
    ));
    nc.close().unwrap();
}

#[test]
fn test_coordinate_name_is_reserved() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "dep:\n  name: D\n  longname: depth\n  generic_name: dep\n  units: m\n  fortran_format: f10.1\n  EPIC_KEY: 1\n";
    let schema = EpicSchema::from_yaml_str(yaml).unwrap();

    let mut nc = EpicWriter::create(&dir.path().join("reserved.nc"), false).unwrap();
    nc.declare_dimensions(1, 1).unwrap();
    assert!(matches!(nc.declare_fields(&schema), Err(EpicError::ReservedKey(k)) if k == "dep"));
}

// ─────────────────────────────────────────────────────────────────────
// Discrete merge
// ─────────────────────────────────────────────────────────────────────
#[test]
fn test_nutrient_profiles() {
    let (_, profiles) = nut_profiles();
    // cast 44 is a bucket sample with no bottle row
    assert_eq!(profiles.len(), 2);

    let cast2 = &profiles[1];
    assert_eq!(cast2.cast_name, "ctd002");
    assert!(close_to(&cast2.data["PO4_186"], &[MISSING_VALUE, 1.02]));
    assert!(close_to(&cast2.data["BTL_103"], &[1.0, 2.0]));
}

#[test]
fn test_merged_csv_keeps_bucket_samples() {
    let dir = tempfile::tempdir().unwrap();
    let report = read_bottle_report("tests/data/dy1707l1.report_btl".as_ref()).unwrap();
    let nuts = read_discrete_table("tests/data/dy1707_nutrients.csv".as_ref()).unwrap();
    let table = MergedTable::merge(&report, &nuts);
    assert_eq!(table.orphans().count(), 1);

    let path = dir.path().join("merged.csv");
    table.write_csv(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 1 + 6);
    assert!(text.lines().last().unwrap().starts_with("044_01,,,"));
}

// ─────────────────────────────────────────────────────────────────────
// CTD + nutrient merge
// ─────────────────────────────────────────────────────────────────────
#[test]
fn test_ctd_nut_merge_on_disk() {
    let ctd_dir = tempfile::tempdir().unwrap();
    let nut_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();

    let (nut_schema, nut) = nut_profiles();
    for p in &nut {
        let path = profile_path(nut_dir.path(), &p.cruise, &p.cast_name, "nut");
        p.write(&path, &nut_schema, &GlobalAttributes::default(), &WriteOptions::default())
            .unwrap();
    }
    let ctd_path = write_ctd(ctd_dir.path(), "ctd001", 57.5);

    let schema = load_schema("tests/data/ctdpnut_epickeys.yaml".as_ref()).unwrap();
    let ctd = EpicDataset::load(&ctd_path).unwrap();
    let nut_path = paired_path(&ctd_path, "ctd", "nut", nut_dir.path()).unwrap();
    let nut = EpicDataset::load(&nut_path).unwrap();

    let (profile, _) = merge_cast(&ctd, Some(&nut), &schema).unwrap();
    let out = paired_path(&ctd_path, "ctd", "merged", out_dir.path()).unwrap();
    profile
        .write(&out, &schema, &carried_globals(&ctd), &write_opts("Merged downcast CTD and nutrient data"))
        .unwrap();

    let merged = EpicDataset::load(&out).unwrap();
    assert!(close_to(merged.depth().unwrap(), &[10.0, 20.0, 30.0, 50.0]));
    assert!(close_to(merged.get("T_28").unwrap(), &[8.0, 7.5, 7.1, 6.5]));
    assert!(close_to(merged.get("PO4_186").unwrap(), &[0.88, MISSING_VALUE, 1.31, 1.52]));

    let history: Vec<_> = merged.history().lines().map(str::to_string).collect();
    assert_eq!(history.len(), 2);
    assert!(history[0].ends_with("CTD archived"));
    assert!(history[1].ends_with("Merged downcast CTD and nutrient data"));
}

#[test]
fn test_ctd_without_nutrients_is_copied_through() {
    let ctd_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let ctd_path = write_ctd(ctd_dir.path(), "ctd009", 58.0);

    let schema = load_schema("tests/data/ctdpnut_epickeys.yaml".as_ref()).unwrap();
    let ctd = EpicDataset::load(&ctd_path).unwrap();
    let (profile, _) = merge_cast(&ctd, None, &schema).unwrap();

    let out = paired_path(&ctd_path, "ctd", "merged", out_dir.path()).unwrap();
    profile
        .write(&out, &schema, &carried_globals(&ctd), &WriteOptions::default())
        .unwrap();
    assert!(out.exists());

    let merged = EpicDataset::load(&out).unwrap();
    assert!(close_to(merged.get("S_41").unwrap(), &[31.6, 31.7, 31.8, 31.9]));
    assert!(merged.get("NO3_182").unwrap().iter().all(|&v| is_missing(v)));
    assert_eq!(merged.latitude().map(|v| v as f32), Some(58.0));
}

// ─────────────────────────────────────────────────────────────────────
// In-place edits
// ─────────────────────────────────────────────────────────────────────
#[test]
fn test_blank_variable_and_log_history() {
    let dir = tempfile::tempdir().unwrap();
    let (schema, profiles) = btl_profiles();
    let path = dir.path().join("edit.nc");
    profiles[0]
        .write(&path, &schema, &GlobalAttributes::default(), &write_opts("created"))
        .unwrap();

    let mut nc = EpicWriter::append(&path).unwrap();
    nc.replace_variable("O_65", MISSING_VALUE).unwrap();
    nc.append_history("Removed O_65 from datastream").unwrap();
    assert!(matches!(
        nc.replace_variable("NOPE_1", MISSING_VALUE),
        Err(EpicError::MissingVariable(_))
    ));
    nc.close().unwrap();

    let ds = EpicDataset::load(&path).unwrap();
    assert!(ds.get("O_65").unwrap().iter().all(|&v| is_missing(v)));
    assert!(close_to(ds.get("T_28").unwrap(), &[6.5530, 7.1020, 8.0040]));
    let history = ds.history();
    assert_eq!(history.lines().count(), 2);
    assert!(history.ends_with("Removed O_65 from datastream"));
}

#[test]
fn test_surface_fill_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ctd(dir.path(), "ctd003", 57.5);

    let filled = surface_fill(&path, 30.0).unwrap();
    assert_eq!(filled, ["S_41", "T_28"]);

    let ds = EpicDataset::load(&path).unwrap();
    assert!(close_to(ds.get("T_28").unwrap(), &[7.1, 7.1, 7.1, 6.5]));
    assert!(close_to(ds.get("S_41").unwrap(), &[31.8, 31.8, 31.8, 31.9]));
    assert!(close_to(ds.depth().unwrap(), &[10.0, 20.0, 30.0, 50.0]));
    assert!(ds.history().ends_with("UTC Interpolated from 30 to SFC"));

    assert!(matches!(surface_fill(&path, 60.0), Err(EpicError::NoDepthLevel(_))));
}

#[test]
fn test_add_variable_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ctd(dir.path(), "ctd004", 57.5);
    let schema = load_schema("tests/data/ctdpnut_epickeys.yaml".as_ref()).unwrap();
    let po4 = schema.get("PO4_186").unwrap();

    add_variable(&path, po4).unwrap();
    let ds = EpicDataset::load(&path).unwrap();
    let values = ds.get("PO4_186").unwrap();
    assert_eq!(values.len(), 4);
    assert!(values.iter().all(|&v| is_missing(v)));
    assert!(close_to(ds.get("T_28").unwrap(), &[8.0, 7.5, 7.1, 6.5]));
    assert_eq!(ds.history().lines().count(), 2);
    assert!(ds.history().ends_with("UTC PO4_186 added"));

    let reader = epic_nc::EpicReader::open(&path).unwrap();
    assert_eq!(reader.variable_attributes("PO4_186").unwrap()["epic_code"].as_f64(), Some(186.0));
    reader.close();

    assert!(matches!(add_variable(&path, po4), Err(EpicError::VariableExists(_))));
}

#[test]
fn test_add_variable_needs_profile_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let schema = load_schema("tests/data/shiptrack_config.yaml".as_ref()).unwrap();
    let track = read_track(&list_gpgga_files("tests/data/scs".as_ref()).unwrap());
    let out = dir.path().join(TRACK_FILE_NAME);
    write_track(&out, &schema, &track, false).unwrap();

    let po4 = load_schema("tests/data/ctdpnut_epickeys.yaml".as_ref()).unwrap();
    assert!(matches!(
        add_variable(&out, po4.get("PO4_186").unwrap()),
        Err(EpicError::MissingDimension(_))
    ));
}

// ─────────────────────────────────────────────────────────────────────
// ODV
// ─────────────────────────────────────────────────────────────────────
#[test]
fn test_odv_block_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let (nut_schema, nut) = nut_profiles();
    let nut_path = profile_path(dir.path(), &nut[0].cruise, &nut[0].cast_name, "nut");
    nut[0]
        .write(&nut_path, &nut_schema, &GlobalAttributes::default(), &WriteOptions::default())
        .unwrap();
    let ctd_path = write_ctd(dir.path(), "ctd001", 57.5);

    let ctd = EpicDataset::load(&ctd_path).unwrap();
    let btl = EpicDataset::load(&nut_path).unwrap();
    let opts = OdvOptions {
        variables: None,
        bottle_vars: DEFAULT_BOTTLE_VARS.iter().map(|v| v.to_string()).collect(),
    };
    let block = build_block(&ctd, Some(&btl), &opts);

    assert_eq!(block.rows.len(), 4);
    assert_eq!(
        &block.header[10..],
        ["dep", "S_41", "T_28", "BTL_103", "NH4_189", "NO2_184", "NO3_182", "PO4_186", "SI_188"]
    );
    let first = &block.rows[0];
    assert_eq!(&first[..3], ["DY1707", "ctd001", "1"]);
    assert_eq!(first[6], "2017-09-15 17:40");
    assert_eq!(first[7], "-164.26");
    assert_eq!(first[10], "10");
    // 10 dbar matches niskin 3 (10.118)
    assert_eq!(first[13], "3");
    // 20 dbar has no bottle
    assert_eq!(block.rows[1][13], "");
}

// ─────────────────────────────────────────────────────────────────────
// Ship track
// ─────────────────────────────────────────────────────────────────────
#[test]
fn test_shiptrack_round_trip() {
    let files = list_gpgga_files("tests/data/scs".as_ref()).unwrap();
    assert_eq!(files.len(), 4);

    // the corrupt log and the one with a non-ASCII latitude are skipped
    let track = read_track(&files);
    assert_eq!(track.len(), 3);
    assert!((track[2].latitude - 58.0).abs() < 1e-12);
    assert!((track[2].longitude + 165.0).abs() < 1e-12);

    let dir = tempfile::tempdir().unwrap();
    let schema = load_schema("tests/data/shiptrack_config.yaml".as_ref()).unwrap();
    let out = dir.path().join(TRACK_FILE_NAME);
    let summary = write_track(&out, &schema, &track, false).unwrap();
    assert_eq!(summary.filled, ["SOG"]);

    let ds = EpicDataset::load(&out).unwrap();
    assert_eq!(ds.get("recnum").unwrap(), &[1.0, 2.0, 3.0]);
    assert!(ds.get("SOG").unwrap().iter().all(|v| v.is_nan()));
    assert!(close_to(ds.get("latitude").unwrap(), &[57.5, 57.5001, 58.0]));
    let hours = ds.get("time").unwrap();
    assert!(hours[0] > 1_000_000.0 && hours[1] > hours[0]);
}
