//! End-to-end tests: parse an IBIS file, extract, solve, compress, generate.

use lib_convert::{
    compress, extract, run_batch, write_subcircuit_file, BatchOptions, ConversionJob, ConvertError,
    Dialect, GenerateOptions, Generator, IoType, JobKey, JobStatus, KParamsByEdge, Solver, Stimulus,
};
use lib_ibis::{load_ibs_file, IbisFile};
use lib_types::{Corner, Edge, Seconds};
use std::path::PathBuf;
use std::sync::Arc;

fn data_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name)
}

fn buffer_ibs() -> IbisFile {
    load_ibs_file(data_path("buffer.ibs")).expect("buffer.ibs should parse")
}

/// Coefficients the OUT_50 waveforms were computed from.
fn expected_k(edge: Edge, idx: usize, n: usize) -> (f64, f64) {
    let s = idx as f64 / (n - 1) as f64;
    match edge {
        Edge::Rising => (s, (1.0 - s).powi(2)),
        Edge::Falling => (1.0 - s, s * s),
    }
}

#[test]
fn test_parse_buffer_file() {
    let ibis = buffer_ibs();
    assert_eq!(ibis.header.file_name, "buffer.ibs");
    assert_eq!(ibis.component_names(), vec!["DRV1G"]);
    assert_eq!(ibis.model_names(), vec!["OUT_50", "OUT_WEAK", "IN_MODEL", "TERM"]);

    let comp = ibis.component("DRV1G").unwrap();
    assert_eq!(comp.pins.len(), 6);
    assert!((comp.pins[0].l_pin.unwrap() - 1.8e-9).abs() < 1e-20);

    let out = ibis.model("OUT_50").unwrap();
    assert_eq!(out.rising_waveform.len(), 2);
    assert_eq!(out.falling_waveform.len(), 2);
    assert_eq!(out.rising_waveform[1].v_fixture_min, Some(4.5));
    assert_eq!(out.rising_waveform[0].points.len(), 21);
}

#[test]
fn test_two_fixture_solve_at_every_corner() {
    let ibis = buffer_ibs();
    let model = extract(&ibis, "DRV1G", "OUT_50").unwrap();
    let solver = Solver::default();

    for corner in Corner::ALL {
        for edge in Edge::ALL {
            let solution = solver.solve_detailed(&model, corner, edge).unwrap();
            assert_eq!(solution.policy, "two_fixture");
            assert!(solution.anomalies.is_empty(), "{} {}", corner, edge);

            let samples = solution.series.samples();
            let n = samples.len();
            assert_eq!(n, 21);
            for (idx, s) in samples.iter().enumerate() {
                let (ku, kd) = expected_k(edge, idx, n);
                assert!(
                    (s.ku - ku).abs() < 1e-6 && (s.kd - kd).abs() < 1e-6,
                    "{} {} idx {}: got ({}, {}), expected ({}, {})",
                    corner,
                    edge,
                    idx,
                    s.ku,
                    s.kd,
                    ku,
                    kd
                );
            }
        }
    }
}

#[test]
fn test_edge_endpoints_for_all_driver_models() {
    let ibis = buffer_ibs();
    for name in ["OUT_50", "OUT_WEAK"] {
        let model = extract(&ibis, "DRV1G", name).unwrap();
        for corner in Corner::ALL {
            let rising = lib_convert::solve(&model, corner, Edge::Rising).unwrap();
            let (first, last) = (rising.first().unwrap(), rising.last().unwrap());
            assert!(first.kd > first.ku && last.ku > last.kd);

            let falling = lib_convert::solve(&model, corner, Edge::Falling).unwrap();
            let (first, last) = (falling.first().unwrap(), falling.last().unwrap());
            assert!(first.ku > first.kd && last.kd > last.ku);
        }
    }
}

#[test]
fn test_complementary_solve_of_single_fixture_model() {
    let ibis = buffer_ibs();
    let model = extract(&ibis, "DRV1G", "OUT_WEAK").unwrap();
    let solution = Solver::default()
        .solve_detailed(&model, Corner::Typical, Edge::Rising)
        .unwrap();
    assert_eq!(solution.policy, "complementary");

    let n = solution.series.len();
    for (idx, s) in solution.series.iter().enumerate() {
        let expected = idx as f64 / (n - 1) as f64;
        assert!((s.ku - expected).abs() < 1e-6, "idx {}: {}", idx, s.ku);
        assert!((s.ku + s.kd - 1.0).abs() < 1e-9);
    }

    // A linear edge compresses to its end points.
    let compressed = compress(&solution.series, 1e-6).unwrap();
    assert_eq!(compressed.len(), 2);
}

#[test]
fn test_generate_output_file() {
    let ibis = buffer_ibs();
    let model = extract(&ibis, "DRV1G", "OUT_50").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out_50.sub");

    let options = GenerateOptions {
        stimulus: Stimulus {
            delay: Seconds::from_ns(1.0),
            high_time: Some(Seconds::from_ns(10.0)),
            period: Some(Seconds::from_ns(25.0)),
        },
        ..Default::default()
    };
    let generator = Generator::new(IoType::Output, Dialect::LtSpice, Corner::Maximum).with_options(options);
    write_subcircuit_file(&path, &generator, &model, &KParamsByEdge::default()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("* Component: DRV1G"));
    assert!(text.contains("* Corner: Maximum"));
    assert!(text.contains(".SUBCKT OUT_50 PIN REF"));
    assert!(text.contains("R_PKG PIN PKG 3e-1"));
    assert!(text.contains("L_PKG PKG DIE 2.5e-9"));
    assert!(text.contains("C_PKG PIN REF 6e-13"));
    assert!(text.contains("C_COMP DIE REF 2.5e-12"));
    assert!(text.contains("B_PULLUP DIE REF I=V(KU,REF)*table((5.5e0)-V(DIE,REF),"));
    assert!(text.contains("B_PULLDOWN DIE REF I=V(KD,REF)*table(V(DIE,REF),"));
    assert!(text.contains("B_PWR_CLAMP DIE REF I=table((5.5e0)-V(DIE,REF),"));
    assert!(text.contains("V_KU KU REF PWL REPEAT FOREVER ("));
    assert!(text.trim_end().ends_with(".ENDS OUT_50"));
}

#[test]
fn test_input_and_terminator_models() {
    let ibis = buffer_ibs();

    let input = extract(&ibis, "DRV1G", "IN_MODEL").unwrap();
    let mut text = Vec::new();
    lib_convert::generate(
        IoType::Input,
        Dialect::Ngspice,
        &input,
        Corner::Typical,
        &KParamsByEdge::default(),
        &mut text,
    )
    .unwrap();
    let text = String::from_utf8(text).unwrap();
    assert!(text.contains("C_COMP DIE REF 1e-12"));
    assert!(text.contains("* Vinl = 8e-1 V"));
    assert!(!text.contains("V_KD"));

    let mut sink = Vec::new();
    let err = lib_convert::generate(
        IoType::Output,
        Dialect::Ngspice,
        &input,
        Corner::Typical,
        &KParamsByEdge::default(),
        &mut sink,
    )
    .unwrap_err();
    assert!(matches!(err, ConvertError::UnsupportedIoType { .. }));
    assert!(sink.is_empty());

    let term = extract(&ibis, "DRV1G", "TERM").unwrap();
    let err = lib_convert::generate(
        IoType::Input,
        Dialect::LtSpice,
        &term,
        Corner::Typical,
        &KParamsByEdge::default(),
        &mut sink,
    )
    .unwrap_err();
    assert!(matches!(err, ConvertError::UnsupportedIoType { .. }));
    assert!(sink.is_empty());
}

#[test]
fn test_batch_with_fail_fast_reports_every_job() {
    let ibis = Arc::new(buffer_ibs());
    let dir = tempfile::tempdir().unwrap();
    let job = |model: &str, io_type: IoType| ConversionJob {
        key: JobKey {
            component: "DRV1G".to_string(),
            model: model.to_string(),
            corner: Corner::Typical,
        },
        ibis: Arc::clone(&ibis),
        io_type,
        dialect: Dialect::Ngspice,
        options: GenerateOptions::default(),
        output: dir.path().join(format!("{}.sub", model.to_lowercase())),
    };
    let jobs = vec![
        job("OUT_50", IoType::Output),
        job("IN_MODEL", IoType::Input),
        job("TERM", IoType::Input),
    ];

    let options = BatchOptions {
        fail_fast: true,
        ..Default::default()
    };
    let outcomes = run_batch(&jobs, &options);
    assert_eq!(outcomes.len(), jobs.len());
    for (outcome, job) in outcomes.iter().zip(&jobs) {
        assert_eq!(outcome.key, job.key);
    }
    assert!(matches!(outcomes[2].status, JobStatus::Failed(_)));
    assert!(options.cancel.is_cancelled());
    assert!(!dir.path().join("term.sub").exists());
}
