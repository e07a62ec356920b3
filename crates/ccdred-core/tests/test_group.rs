mod common;

use std::path::Path;

use ccdred_core::error::CcdError;
use ccdred_core::frame::Frame;
use ccdred_core::group::{extract_key, group_frames, GroupKey};
use ccdred_core::header::HeaderValue;

use common::{header, str_header};

fn keys(ks: &[&str]) -> Vec<String> {
    ks.iter().map(|k| k.to_string()).collect()
}

fn frame(name: &str, binning: &str, filter: &str) -> Frame {
    Frame::new(name, str_header(&[("CCDSUM", binning), ("FILTER", filter)]))
}

#[test]
fn test_extract_key_in_requested_order() {
    let h = str_header(&[("FILTER", "R"), ("CCDSUM", "1 1")]);
    let key = extract_key(&h, &keys(&["ccdsum", "filter"]), Path::new("a.fits")).unwrap();
    assert_eq!(
        key,
        GroupKey(vec![HeaderValue::from("1 1"), HeaderValue::from("R")])
    );
}

#[test]
fn test_extract_key_missing_keyword() {
    let h = str_header(&[("CCDSUM", "1 1")]);
    let err = extract_key(&h, &keys(&["CCDSUM", "EXPTIME"]), Path::new("a.fits")).unwrap_err();
    match err {
        CcdError::MissingKey { keyword, path } => {
            assert_eq!(keyword, "EXPTIME");
            assert_eq!(path, Path::new("a.fits"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_groups_partition_inputs() {
    let frames = vec![
        frame("a.fits", "1 1", "R"),
        frame("b.fits", "2 2", "R"),
        frame("c.fits", "1 1", "R"),
        frame("d.fits", "1 1", "V"),
        frame("e.fits", "2 2", "R"),
    ];
    let groups = group_frames(frames, &keys(&["CCDSUM", "FILTER"]));

    assert_eq!(groups.len(), 3);
    let total: usize = groups.iter().map(|(_, m)| m.len()).sum();
    assert_eq!(total, 5);
    assert!(groups.unassigned().is_empty());

    let first = &groups.unique_values()[0];
    let names: Vec<_> = groups
        .frames_for(first)
        .iter()
        .map(|f| f.path.display().to_string())
        .collect();
    assert_eq!(names, ["a.fits", "c.fits"]);
}

#[test]
fn test_groups_in_first_seen_order() {
    let frames = vec![
        frame("a.fits", "2 2", "R"),
        frame("b.fits", "1 1", "R"),
        frame("c.fits", "2 2", "R"),
    ];
    let groups = group_frames(frames, &keys(&["CCDSUM"]));
    let labels: Vec<_> = groups.iter().map(|(k, _)| groups.describe(k)).collect();
    assert_eq!(labels, ["CCDSUM=2 2", "CCDSUM=1 1"]);
}

#[test]
fn test_missing_key_goes_to_unassigned() {
    let frames = vec![
        frame("a.fits", "1 1", "R"),
        Frame::new("b.fits", str_header(&[("FILTER", "R")])),
    ];
    let groups = group_frames(frames, &keys(&["CCDSUM"]));
    assert_eq!(groups.len(), 1);
    assert_eq!(groups.unassigned().len(), 1);
    assert_eq!(groups.unassigned()[0].0, Path::new("b.fits"));
}

#[test]
fn test_no_keys_gives_single_group() {
    let frames = vec![frame("a.fits", "1 1", "R"), frame("b.fits", "2 2", "V")];
    let groups = group_frames(frames, &[]);
    assert_eq!(groups.len(), 1);
    let (key, members) = groups.iter().next().unwrap();
    assert!(key.is_empty());
    assert_eq!(members.len(), 2);
    assert_eq!(groups.describe(key), "all");
}

#[test]
fn test_int_and_float_values_group_by_value() {
    let frames = vec![
        Frame::new("a.fits", header(&[("EXPTIME", HeaderValue::Int(60))])),
        Frame::new("b.fits", header(&[("EXPTIME", HeaderValue::Float(60.0))])),
        Frame::new("c.fits", header(&[("EXPTIME", HeaderValue::Float(60.5))])),
        Frame::new("d.fits", header(&[("EXPTIME", HeaderValue::Float(60.0))])),
    ];
    let groups = group_frames(frames, &keys(&["EXPTIME"]));
    assert_eq!(groups.len(), 2);
    let sizes: Vec<_> = groups.iter().map(|(_, m)| m.len()).collect();
    assert_eq!(sizes, [3, 1]);
}
