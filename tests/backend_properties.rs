//! Backend Property Tests
//!
//! Cross-backend guarantees checked through the public backend API:
//! non-empty results or an explicit unsupported error, ascending frequency
//! axes, bounded peak lists, and length-preserving rebin at the native
//! sampling interval.

use serde_json::json;
use std::f64::consts::PI;
use std::path::PathBuf;

use vast_engine::backends::all_backends;
use vast_engine::schema;
use vast_engine::{AnalysisType, EngineError, Parameters};

/// Write `n` samples at `dt` of a sine at `freq` Hz plus an offset.
fn write_sine(dir: &tempfile::TempDir, n: usize, dt: f64, freq: f64) -> PathBuf {
    let path = dir.path().join("sine.txt");
    let body: String = (0..n)
        .map(|i| {
            let t = i as f64 * dt;
            format!("{t} {}\n", 10.0 + (2.0 * PI * freq * t).sin())
        })
        .collect();
    std::fs::write(&path, body).unwrap();
    path
}

/// Schema defaults plus overrides that keep the runs small.
fn params_for(analysis_type: AnalysisType) -> Parameters {
    let mut params = Parameters::new();
    match analysis_type {
        AnalysisType::PowerSpectrum => {
            params.insert("segment_length".to_string(), json!(128));
        }
        AnalysisType::PdsSimulation => {
            params.insert("dt".to_string(), json!(0.01));
            params.insert("tlen".to_string(), json!(100.0));
            params.insert("seed".to_string(), json!(7));
        }
        _ => {}
    }
    schema::fill_defaults(analysis_type, &mut params).unwrap();
    params
}

#[test]
fn test_results_are_non_empty_or_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sine(&dir, 1024, 0.5, 0.05);

    for backend in all_backends() {
        let data = backend.read_file(&path).unwrap();
        for analysis_type in schema::registered_types() {
            match backend.run_analysis(analysis_type, &data, &params_for(analysis_type)) {
                Ok(raw) => {
                    assert!(backend.supports(analysis_type));
                    assert!(
                        !raw.is_empty(),
                        "{} {} returned an empty result",
                        backend.name(),
                        analysis_type
                    );
                    let data_section = raw.data();
                    assert!(data_section.as_object().map_or(false, |m| !m.is_empty()));
                }
                Err(EngineError::UnsupportedAnalysis { .. }) => {}
                Err(other) => panic!(
                    "{} {} failed unexpectedly: {other}",
                    backend.name(),
                    analysis_type
                ),
            }
        }
    }
}

#[test]
fn test_frequency_axes_ascending_and_peaks_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sine(&dir, 1024, 0.5, 0.05);
    let frequency_domain = [
        AnalysisType::PowerSpectrum,
        AnalysisType::FourierTransform,
        AnalysisType::LombScargle,
    ];

    for backend in all_backends() {
        let data = backend.read_file(&path).unwrap();
        for analysis_type in frequency_domain {
            if !backend.supports(analysis_type) {
                continue;
            }
            let raw = backend
                .run_analysis(analysis_type, &data, &params_for(analysis_type))
                .unwrap();
            let frequency = raw.frequency().unwrap();
            assert!(
                frequency.windows(2).all(|w| w[0] <= w[1]),
                "{} {} frequencies not ascending",
                backend.name(),
                analysis_type
            );

            if let Some(peaks) = raw.peaks() {
                assert!(peaks.len() <= 5);
                assert!(peaks.windows(2).all(|w| w[0].power >= w[1].power));
            }
        }
    }
}

#[test]
fn test_rebin_at_native_interval_keeps_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sine(&dir, 100, 1.0, 0.1);

    for backend in all_backends() {
        let data = backend.read_file(&path).unwrap();
        let mut params = Parameters::new();
        params.insert("bin_time".to_string(), json!(1.0));
        params.insert("method".to_string(), json!("mean"));

        let raw = backend.run_analysis(AnalysisType::Rebin, &data, &params).unwrap();
        let n_bins = raw.n_bins() as i64;
        assert!(
            (n_bins - data.len() as i64).abs() <= 1,
            "{} rebinned {} samples into {} bins",
            backend.name(),
            data.len(),
            n_bins
        );
    }
}

#[test]
fn test_every_backend_plots_its_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sine(&dir, 256, 0.5, 0.05);

    for backend in all_backends() {
        let data = backend.read_file(&path).unwrap();
        let raw = backend
            .run_analysis(AnalysisType::LombScargle, &data, &params_for(AnalysisType::LombScargle))
            .unwrap();
        let artifact = backend.generate_plot(AnalysisType::LombScargle, &raw).unwrap();
        assert!(artifact.html.contains("<html"));
        assert!(artifact.json_data.is_object());
    }
}
