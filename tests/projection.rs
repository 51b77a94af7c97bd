use approx::assert_relative_eq;
use reforest::projection::{
    project, summarize, InitialConditions, SimulationParameters, BASE_YEAR,
};

fn params(timeline: u32, intensity: f64) -> SimulationParameters {
    SimulationParameters {
        timeline,
        intensity,
        ..SimulationParameters::default()
    }
}

fn initial() -> InitialConditions {
    InitialConditions {
        forest_coverage: 20.0,
        temperature: 25.0,
        rainfall: 1200.0,
    }
}

#[test]
fn final_year_matches_worked_example() {
    let snapshots = project(&params(30, 5.0), &initial());
    let last = snapshots.last().expect("projection has snapshots");

    assert_eq!(last.year, 2055);
    assert_relative_eq!(last.forest_coverage, 70.0);
    assert_relative_eq!(last.temperature_average, 22.5);
    assert_relative_eq!(last.rainfall_annual, 1800.0);
    assert_relative_eq!(last.biodiversity_index, 0.8, epsilon = 1e-12);
    assert_relative_eq!(last.carbon_sequestration, 150_000.0);
    assert_relative_eq!(last.water_quality, 95.0);
}

#[test]
fn first_snapshot_is_the_starting_point() {
    let first = project(&params(30, 5.0), &initial())[0];
    assert_eq!(first.year, BASE_YEAR);
    assert_relative_eq!(first.forest_coverage, 20.0);
    assert_relative_eq!(first.temperature_average, 25.0);
    assert_relative_eq!(first.rainfall_annual, 1200.0);
    assert_relative_eq!(first.biodiversity_index, 0.3);
    assert_eq!(first.carbon_sequestration, 0.0);
    assert_relative_eq!(first.water_quality, 60.0);
}

#[test]
fn sequence_shape_and_caps_hold_across_the_valid_range() {
    for intensity in 1..=10 {
        for timeline in (5..=100).step_by(5) {
            let snapshots = project(&params(timeline, intensity as f64), &initial());
            assert_eq!(snapshots.len(), (timeline / 5 + 1) as usize);
            assert_eq!(snapshots[0].year, 2025);

            for pair in snapshots.windows(2) {
                assert_eq!(pair[1].year - pair[0].year, 5);
                assert!(pair[1].carbon_sequestration >= pair[0].carbon_sequestration);
                assert!(pair[1].forest_coverage >= pair[0].forest_coverage);
                assert!(pair[1].biodiversity_index >= pair[0].biodiversity_index);
                assert!(pair[1].water_quality >= pair[0].water_quality);
            }
            for step in &snapshots {
                assert!(step.forest_coverage <= 70.0);
                assert!(step.biodiversity_index <= 0.9);
                assert!(step.water_quality <= 95.0);
            }
        }
    }
}

#[test]
fn higher_intensity_never_lowers_capped_outputs() {
    let low = project(&params(40, 2.0), &initial());
    let high = project(&params(40, 9.0), &initial());
    for (l, h) in low.iter().zip(&high) {
        assert!(h.forest_coverage >= l.forest_coverage);
        assert!(h.biodiversity_index >= l.biodiversity_index);
        assert!(h.water_quality >= l.water_quality);
        assert!(h.temperature_average <= l.temperature_average);
    }
}

#[test]
fn zero_timeline_yields_one_finite_snapshot() {
    let snapshots = project(&params(0, 7.0), &initial());
    assert_eq!(snapshots.len(), 1);
    let only = snapshots[0];
    assert_eq!(only.year, 2025);
    for value in [
        only.forest_coverage,
        only.temperature_average,
        only.rainfall_annual,
        only.biodiversity_index,
        only.carbon_sequestration,
        only.water_quality,
    ] {
        assert!(value.is_finite(), "zero timeline produced {value}");
    }
    assert_relative_eq!(only.forest_coverage, 20.0);
}

#[test]
fn projection_is_repeatable() {
    let a = project(&params(45, 6.0), &initial());
    let b = project(&params(45, 6.0), &initial());
    assert_eq!(a, b);
}

#[test]
fn coverage_already_above_cap_is_clamped() {
    let start = InitialConditions {
        forest_coverage: 85.0,
        ..initial()
    };
    let snapshots = project(&params(10, 1.0), &start);
    assert!(snapshots.iter().all(|s| s.forest_coverage == 70.0));
}

#[test]
fn summary_compares_against_the_first_snapshot() {
    let snapshots = project(&params(30, 5.0), &initial());

    let end = summarize(&snapshots, None).expect("summary for final year");
    assert_eq!(end.year, 2055);
    assert_relative_eq!(end.forest_coverage_change_pct.unwrap_or_default(), 250.0);
    assert_relative_eq!(end.temperature_change, -2.5);
    assert_relative_eq!(end.rainfall_change_pct.unwrap_or_default(), 50.0);

    let mid = summarize(&snapshots, Some(2040)).expect("2040 is a step year");
    assert_eq!(mid.year, 2040);
    assert_relative_eq!(mid.carbon_sequestration, 75_000.0);

    assert!(summarize(&snapshots, Some(2041)).is_none());
    assert!(summarize(&[], None).is_none());
}

#[test]
fn unvalidated_timeline_is_clamped_to_a_century() {
    let snapshots = project(&params(u32::MAX, 5.0), &initial());
    assert_eq!(snapshots.len(), 21);
    let last = snapshots.last().expect("projection has snapshots");
    assert_eq!(last.year, 2125);
    assert_relative_eq!(last.carbon_sequestration, 500_000.0);
}
