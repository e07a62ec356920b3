mod common;

use std::path::PathBuf;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use ccdred_core::cancel::CancelToken;
use ccdred_core::combine::correct::{apply_corrections, mean_f64, normalize};
use ccdred_core::combine::{
    build_master, combine, combine_with_token, CombineMethod, CombineParams,
};
use ccdred_core::error::CcdError;
use ccdred_core::frame::{ArraySource, CorrectionSet, PixelData, ProductKind};
use ccdred_core::header::Header;
use ccdred_core::io::MemoryStore;
use ccdred_core::validate::ValidationBounds;

use common::{add_frames, constant};

fn sources(arrays: Vec<Array2<f32>>) -> Vec<ArraySource> {
    arrays.into_iter().map(ArraySource::from_array).collect()
}

fn params(method: CombineMethod) -> CombineParams {
    CombineParams {
        method,
        ..CombineParams::for_product(ProductKind::Clean)
    }
}

#[test]
fn test_master_bias_of_constant_frames() {
    let store = MemoryStore::new();
    let paths = add_frames(&store, "bias", 5, &Header::new(), &constant(8, 8, 500.0));
    let inputs: Vec<ArraySource> = paths.into_iter().map(ArraySource::File).collect();

    let result = combine(
        &inputs,
        &CorrectionSet::none(),
        &CombineParams::for_product(ProductKind::Bias),
        &store,
    )
    .unwrap();

    assert_eq!(result.used, 5);
    assert!(result.rejected.is_empty());
    let data = result.data.into_frame().unwrap();
    assert!(data.iter().all(|&v| v == 500.0));
}

#[test]
fn test_flats_normalize_to_one() {
    let store = MemoryStore::new();
    let inputs = sources(vec![
        constant(8, 8, 20_000.0),
        constant(8, 8, 25_000.0),
        constant(8, 8, 30_000.0),
        constant(8, 8, 35_000.0),
        constant(8, 8, 40_000.0),
    ]);
    let result = combine(
        &inputs,
        &CorrectionSet::none(),
        &CombineParams::for_product(ProductKind::Flat),
        &store,
    )
    .unwrap();
    let data = result.data.into_frame().unwrap();
    for &v in data.iter() {
        assert_abs_diff_eq!(v, 1.0, epsilon = 1e-6);
    }
}

#[test]
fn test_full_size_bias_inside_low_window() {
    let store = MemoryStore::new();
    let paths = add_frames(&store, "bias", 5, &Header::new(), &constant(100, 100, 500.0));
    let inputs: Vec<ArraySource> = paths.into_iter().map(ArraySource::File).collect();
    let params = CombineParams {
        method: CombineMethod::Median,
        normalize: false,
        bounds: ValidationBounds::new(0.0, 2000.0),
        strip_count: 100,
    };

    let result = combine(&inputs, &CorrectionSet::none(), &params, &store).unwrap();

    assert_eq!(result.used, 5);
    let data = result.data.into_frame().unwrap();
    assert_eq!(data.dim(), (100, 100));
    assert!(data.iter().all(|&v| v == 500.0));
}

#[test]
fn test_flats_of_rising_level_normalize_to_one() {
    let store = MemoryStore::new();
    let inputs = sources(
        [1000.0, 2000.0, 3000.0, 4000.0, 5000.0]
            .into_iter()
            .map(|level| constant(10, 10, level))
            .collect(),
    );
    let params = CombineParams {
        method: CombineMethod::Median,
        normalize: true,
        bounds: ValidationBounds::new(0.0, 65_535.0),
        strip_count: 10,
    };

    let result = combine(&inputs, &CorrectionSet::none(), &params, &store).unwrap();

    assert_eq!(result.used, 5);
    let data = result.data.into_frame().unwrap();
    for &v in data.iter() {
        assert_abs_diff_eq!(v, 1.0, epsilon = 1e-6);
    }
}

#[test]
fn test_median_of_identical_copies_is_identity() {
    let store = MemoryStore::new();
    let params = CombineParams {
        method: CombineMethod::Median,
        normalize: false,
        bounds: ValidationBounds::new(0.0, 65_535.0),
        strip_count: 4,
    };
    // Small and row-parallel sizes.
    for (rows, cols) in [(5, 7), (300, 300)] {
        let frame = Array2::from_shape_fn((rows, cols), |(r, c)| (100 + r * 3 + c) as f32);
        for n in [2, 3, 6] {
            let inputs = sources(vec![frame.clone(); n]);
            let data = combine(&inputs, &CorrectionSet::none(), &params, &store)
                .unwrap()
                .data
                .into_frame()
                .unwrap();
            assert_eq!(data, frame, "{n} copies of {rows}x{cols}");
        }
    }
}

#[test]
fn test_corrections_applied_bias_dark_flat() {
    let store = MemoryStore::new();
    let corrections = CorrectionSet::none()
        .with_bias(constant(4, 4, 100.0))
        .with_dark(constant(4, 4, 50.0))
        .with_flat(constant(4, 4, 2.0));
    let result = combine(
        &sources(vec![constant(4, 4, 1000.0)]),
        &corrections,
        &params(CombineMethod::Median),
        &store,
    )
    .unwrap();
    let data = result.data.into_frame().unwrap();
    // (1000 - 100 - 50) / 2
    assert!(data.iter().all(|&v| v == 425.0));
}

#[test]
fn test_correction_does_not_touch_input() {
    let raw = Arc::new(constant(4, 4, 1000.0));
    let store = MemoryStore::new();
    let corrections = CorrectionSet::none().with_bias(constant(4, 4, 100.0));
    let inputs = vec![ArraySource::InMemory(Arc::clone(&raw))];

    combine(&inputs, &corrections, &params(CombineMethod::Median), &store).unwrap();
    assert!(raw.iter().all(|&v| v == 1000.0));
}

#[test]
fn test_no_corrections_is_identity() {
    let mut data = constant(3, 5, 7.0);
    data[[1, 2]] = 9.5;
    let store = MemoryStore::new();
    let result = combine(
        &sources(vec![data.clone()]),
        &CorrectionSet::none(),
        &params(CombineMethod::Median),
        &store,
    )
    .unwrap();
    assert_eq!(result.data, PixelData::Frame(data));
}

#[test]
fn test_apply_corrections_skips_absent_masters() {
    let data = constant(2, 2, 10.0);
    let resolved = CorrectionSet::none()
        .with_dark(constant(2, 2, 4.0))
        .load(&MemoryStore::new())
        .unwrap();
    assert_eq!(resolved.steps(), ["dark-subtracted"]);
    let out = apply_corrections(&data, &resolved, "x").unwrap();
    assert!(out.iter().all(|&v| v == 6.0));
}

#[test]
fn test_average_of_identical_frames_is_identity() {
    let mut data = constant(3, 3, 12.0);
    data[[0, 2]] = 40.0;
    let store = MemoryStore::new();
    let result = combine(
        &sources(vec![data.clone(); 4]),
        &CorrectionSet::none(),
        &params(CombineMethod::Average),
        &store,
    )
    .unwrap();
    assert_eq!(result.used, 4);
    assert_eq!(result.data, PixelData::Frame(data));
}

#[test]
fn test_average_and_median_differ() {
    let store = MemoryStore::new();
    let inputs = sources(vec![
        constant(2, 2, 1.0),
        constant(2, 2, 2.0),
        constant(2, 2, 9.0),
    ]);
    let median = combine(&inputs, &CorrectionSet::none(), &params(CombineMethod::Median), &store)
        .unwrap()
        .data
        .into_frame()
        .unwrap();
    let average = combine(&inputs, &CorrectionSet::none(), &params(CombineMethod::Average), &store)
        .unwrap()
        .data
        .into_frame()
        .unwrap();
    assert_abs_diff_eq!(median[[0, 0]], 2.0);
    assert_abs_diff_eq!(average[[0, 0]], 4.0, epsilon = 1e-6);
}

#[test]
fn test_median_even_count_averages_middle_pair() {
    let store = MemoryStore::new();
    let inputs = sources(vec![
        constant(2, 2, 1.0),
        constant(2, 2, 2.0),
        constant(2, 2, 3.0),
        constant(2, 2, 100.0),
    ]);
    let data = combine(&inputs, &CorrectionSet::none(), &params(CombineMethod::Median), &store)
        .unwrap()
        .data
        .into_frame()
        .unwrap();
    assert_abs_diff_eq!(data[[1, 1]], 2.5);
}

#[test]
fn test_cube_keeps_every_frame() {
    let store = MemoryStore::new();
    let inputs = sources(vec![
        constant(3, 4, 1.0),
        constant(3, 4, 2.0),
        constant(3, 4, 3.0),
    ]);
    let result = combine(&inputs, &CorrectionSet::none(), &params(CombineMethod::Cube), &store).unwrap();
    match result.data {
        PixelData::Cube(cube) => {
            assert_eq!(cube.dim(), (3, 3, 4));
            assert_eq!(cube[[0, 0, 0]], 1.0);
            assert_eq!(cube[[2, 2, 3]], 3.0);
        }
        PixelData::Frame(_) => panic!("expected a cube"),
    }
}

#[test]
fn test_cube_of_one_is_a_frame() {
    let store = MemoryStore::new();
    let result = combine(
        &sources(vec![constant(3, 4, 1.0)]),
        &CorrectionSet::none(),
        &params(CombineMethod::Cube),
        &store,
    )
    .unwrap();
    assert_eq!(result.data.shape(), &[3, 4]);
}

#[test]
fn test_empty_input_fails() {
    let store = MemoryStore::new();
    let err = combine(&[], &CorrectionSet::none(), &params(CombineMethod::Median), &store).unwrap_err();
    assert!(matches!(err, CcdError::EmptyCombination { .. }));
}

#[test]
fn test_all_rejected_fails_without_reading_masters() {
    let store = MemoryStore::new();
    // Masters are only read once a frame passes validation, so the missing
    // file is never touched.
    let corrections = CorrectionSet::none().with_bias(PathBuf::from("missing.fits"));
    let err = combine(
        &sources(vec![constant(4, 4, 60_000.0), constant(4, 4, 60_000.0)]),
        &corrections,
        &CombineParams::for_product(ProductKind::Bias),
        &store,
    )
    .unwrap_err();
    assert!(matches!(err, CcdError::EmptyCombination { .. }));
}

#[test]
fn test_rejected_frames_are_reported() {
    let store = MemoryStore::new();
    let result = combine(
        &sources(vec![
            constant(4, 4, 500.0),
            constant(4, 4, 60_000.0),
            constant(4, 4, 700.0),
        ]),
        &CorrectionSet::none(),
        &CombineParams::for_product(ProductKind::Bias),
        &store,
    )
    .unwrap();
    assert_eq!(result.used, 2);
    assert_eq!(result.rejected, ["memory[1]"]);
    let data = result.data.into_frame().unwrap();
    assert_abs_diff_eq!(data[[0, 0]], 600.0);
}

#[test]
fn test_shape_mismatch_between_inputs() {
    let store = MemoryStore::new();
    let err = combine(
        &sources(vec![constant(4, 4, 1.0), constant(4, 5, 1.0)]),
        &CorrectionSet::none(),
        &params(CombineMethod::Median),
        &store,
    )
    .unwrap_err();
    match err {
        CcdError::ShapeMismatch {
            expected, found, ..
        } => {
            assert_eq!(expected, (4, 4));
            assert_eq!(found, (4, 5));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_shape_mismatch_with_master() {
    let store = MemoryStore::new();
    let err = combine(
        &sources(vec![constant(4, 4, 1000.0)]),
        &CorrectionSet::none()
            .with_bias(constant(4, 4, 100.0))
            .with_dark(constant(2, 2, 10.0)),
        &params(CombineMethod::Median),
        &store,
    )
    .unwrap_err();
    match &err {
        CcdError::MasterShapeMismatch {
            master,
            master_shape,
            frame_shape,
            source_name,
        } => {
            assert_eq!(*master, "dark");
            assert_eq!(*master_shape, (2, 2));
            assert_eq!(*frame_shape, (4, 4));
            assert_eq!(source_name, "memory[0]");
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(err.to_string().starts_with("Master dark has shape (2, 2)"));
}

#[test]
fn test_normalize_zero_mean_fails() {
    let err = normalize(constant(2, 2, 0.0), "dark").unwrap_err();
    assert!(matches!(err, CcdError::ZeroMean { .. }));

    let out = normalize(constant(2, 2, 4.0), "flat").unwrap();
    assert_abs_diff_eq!(mean_f64(&out), 1.0);
}

#[test]
fn test_method_parsing() {
    assert_eq!("median".parse::<CombineMethod>().unwrap(), CombineMethod::Median);
    assert_eq!("Average".parse::<CombineMethod>().unwrap(), CombineMethod::Average);
    assert_eq!("mean".parse::<CombineMethod>().unwrap(), CombineMethod::Average);
    assert_eq!("cube".parse::<CombineMethod>().unwrap(), CombineMethod::Cube);
    let err = "sigma".parse::<CombineMethod>().unwrap_err();
    assert!(matches!(err, CcdError::UnknownMethod(m) if m == "sigma"));
}

#[test]
fn test_cancelled_token_stops_combination() {
    let store = MemoryStore::new();
    let token = CancelToken::new();
    token.cancel();
    let err = combine_with_token(
        &sources(vec![constant(2, 2, 1.0)]),
        &CorrectionSet::none(),
        &params(CombineMethod::Median),
        &store,
        &token,
    )
    .unwrap_err();
    assert!(matches!(err, CcdError::Cancelled));
}

#[test]
fn test_build_master_records_provenance() {
    let store = MemoryStore::new();
    let inputs = sources(vec![constant(4, 4, 300.0); 5]);
    let master = build_master(
        &inputs,
        &CorrectionSet::none(),
        &CombineParams::for_product(ProductKind::Bias),
        ProductKind::Bias,
        &store,
    )
    .unwrap();

    assert_eq!(master.provenance.frame_count, 5);
    assert_eq!(master.provenance.method, CombineMethod::Median);
    assert_eq!(master.provenance.history.len(), 1);
    assert!(master.provenance.history[0].ends_with("MBIAS median of 5 frames"));

    // A master feeds the next stage as an in-memory correction.
    let dark = combine(
        &sources(vec![constant(4, 4, 350.0)]),
        &CorrectionSet::none().with_bias(master.source()),
        &CombineParams::for_product(ProductKind::Dark),
        &store,
    )
    .unwrap()
    .data
    .into_frame()
    .unwrap();
    assert!(dark.iter().all(|&v| v == 50.0));
}

#[test]
fn test_build_master_rejects_cube() {
    let store = MemoryStore::new();
    let err = build_master(
        &sources(vec![constant(2, 2, 1.0)]),
        &CorrectionSet::none(),
        &params(CombineMethod::Cube),
        ProductKind::Clean,
        &store,
    )
    .unwrap_err();
    assert!(matches!(err, CcdError::Config(_)));
}

#[test]
fn test_large_median_matches_small_path() {
    // Above the parallel threshold the median runs row-parallel.
    let store = MemoryStore::new();
    let inputs = sources(vec![
        constant(300, 300, 10.0),
        constant(300, 300, 30.0),
        constant(300, 300, 20.0),
    ]);
    let data = combine(&inputs, &CorrectionSet::none(), &params(CombineMethod::Median), &store)
        .unwrap()
        .data
        .into_frame()
        .unwrap();
    assert!(data.iter().all(|&v| v == 20.0));
}
