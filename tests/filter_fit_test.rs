mod test_spectra;

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use approx::assert_relative_eq;
use filterfit::config::{FilterKind, FitConfig};
use filterfit::fit::{FitDesign, FitSolution, FitStatus, SvdSolver, WeightedSolver};
use filterfit::simulation::{ErrorStats, NoiseConfig, measure_kratio_errors};
use filterfit::spectrum::Spectrum;
use test_spectra::*;

/// Delegates to the SVD solver and keeps a copy of every solution
struct RecordingSolver {
    inner: SvdSolver,
    solutions: Rc<RefCell<Vec<FitSolution>>>,
}

impl WeightedSolver for RecordingSolver {
    fn solve(&self, design: &FitDesign) -> filterfit::Result<FitSolution> {
        let solution = self.inner.solve(design)?;
        self.solutions.borrow_mut().push(solution.clone());
        Ok(solution)
    }
}

/// Delegates to the SVD solver and counts the solves
struct CountingSolver {
    inner: SvdSolver,
    solves: Rc<Cell<usize>>,
}

impl WeightedSolver for CountingSolver {
    fn solve(&self, design: &FitDesign) -> filterfit::Result<FitSolution> {
        self.solves.set(self.solves.get() + 1);
        self.inner.solve(design)
    }
}

#[test]
fn test_noise_free_recovery_on_flat_background() {
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Ni", "Si"], false);
    let unknown = flat_model(&[("Fe", 0.6), ("Ni", 0.3), ("Si", 0.1)], 120.0).spectrum();

    let kratios = fit.kratios(&unknown).unwrap();
    assert_eq!(kratios.len(), fit.entries().len());
    for (transitions, k) in kratios.iter() {
        let expected = match transitions.element().symbol() {
            "Fe" => 0.6,
            "Ni" => 0.3,
            _ => 0.1,
        };
        assert_relative_eq!(k.value(), expected, epsilon = 1e-9);
        assert!(k.uncertainty() > 0.0, "{} has no uncertainty", transitions);
    }
    assert_eq!(fit.status(), FitStatus::Converged);
    assert_eq!(fit.fit_event_count(), 1);
}

#[test]
fn test_noise_free_recovery_on_continuum() {
    // ROI-restricted columns only approximately cancel a curved continuum
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Ni", "Si"], true);
    let unknown = continuum_model(&[("Fe", 0.6), ("Ni", 0.3), ("Si", 0.1)], 120.0).spectrum();

    let kratios = fit.kratios(&unknown).unwrap();
    for (symbol, expected) in [("Fe", 0.6), ("Ni", 0.3), ("Si", 0.1)] {
        let k = element_kratio(&kratios, symbol);
        assert!(
            (k.value() - expected).abs() < 2e-3,
            "{}: expected {}, got {}",
            symbol,
            expected,
            k
        );
    }
    assert_eq!(fit.fit_event_count(), 1);
}

#[test]
fn test_repeated_request_does_not_refit() {
    let solves = Rc::new(Cell::new(0));
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Si"], false);
    fit.set_solver(Box::new(CountingSolver {
        inner: SvdSolver::default(),
        solves: Rc::clone(&solves),
    }));
    let unknown = flat_model(&[("Fe", 0.5), ("Si", 0.2)], 120.0).spectrum();

    let first = fit.kratios(&unknown).unwrap();
    let after_first = solves.get();
    let second = fit.kratios(&unknown).unwrap();
    assert_eq!(first, second);
    assert_eq!(solves.get(), after_first, "identical request triggered a refit");

    fit.set_strip_unlikely(false);
    fit.kratios(&unknown).unwrap();
    assert_eq!(solves.get(), after_first, "no-op setting change triggered a refit");
}

#[test]
fn test_unknown_with_nan_count_is_fitted_once() {
    let solves = Rc::new(Cell::new(0));
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Si"], false);
    fit.set_solver(Box::new(CountingSolver {
        inner: SvdSolver::default(),
        solves: Rc::clone(&solves),
    }));
    let mut unknown = flat_model(&[("Fe", 0.5), ("Si", 0.2)], 120.0).spectrum();
    unknown.counts[1000] = f64::NAN;

    let first = fit.kratios(&unknown).unwrap();
    let after_first = solves.get();
    assert_eq!(after_first, 1);
    let second = fit.kratios(&unknown).unwrap();
    assert_eq!(first, second);
    assert_eq!(solves.get(), after_first, "NaN-bearing unknown triggered a refit");

    fit.fit_metric(&unknown).unwrap();
    fit.residual_spectrum(&unknown, None).unwrap();
    assert_eq!(solves.get(), after_first);
    assert_relative_eq!(element_kratio(&first, "Fe").value(), 0.5, epsilon = 1e-9);
}

#[test]
fn test_negative_coefficient_is_excluded_and_keeps_uncertainty() {
    let solutions = Rc::new(RefCell::new(Vec::new()));
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Ni"], false);
    fit.set_solver(Box::new(RecordingSolver {
        inner: SvdSolver::default(),
        solutions: Rc::clone(&solutions),
    }));
    let unknown = flat_model(&[("Fe", 0.5), ("Ni", -0.02)], 120.0).spectrum();

    let kratios = fit.kratios(&unknown).unwrap();
    let outcome = fit.outcome().unwrap();
    assert_eq!(outcome.status, FitStatus::Converged);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.fit_events, 2);

    let solutions = solutions.borrow();
    assert_eq!(solutions.len(), 2);
    let first = &solutions[0];
    let vcf = fit.filter().variance_correction_factor();
    let ni = element("Ni");

    // Every entry is active in the first pass, so column j is entry j
    for (i, entry) in fit.entries().iter().enumerate() {
        let k = kratios.get(entry.transitions()).unwrap();
        if entry.element() == ni {
            assert_relative_eq!(first.coefficients[i], -0.02, epsilon = 1e-9);
            assert!(outcome.state.excluded().contains(&i));
            assert_eq!(k.value(), 0.0);
            assert_relative_eq!(
                k.uncertainty(),
                (vcf * first.variances[i]).sqrt(),
                max_relative = 1e-12
            );
        } else {
            assert_relative_eq!(k.value(), 0.5, epsilon = 1e-9);
        }
    }
    // The second pass solved for Fe alone
    let fe_entries = fit.entries().iter().filter(|e| e.element() != ni).count();
    assert_eq!(solutions[1].coefficients.len(), fe_entries);
    assert!(outcome.state.removed().is_empty());
}

#[test]
fn test_all_forced_zero_is_exhausted() {
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Si"], false);
    fit.force_zero([element("Fe"), element("Si")]);
    let unknown = flat_model(&[("Fe", 0.5), ("Si", 0.2)], 120.0).spectrum();

    let kratios = fit.kratios(&unknown).unwrap();
    assert_eq!(kratios.len(), fit.entries().len());
    assert!(kratios.non_zero().is_empty());
    assert_eq!(fit.fit_event_count(), 0);
    assert_eq!(fit.status(), FitStatus::Exhausted);
    assert_eq!(fit.outcome().unwrap().iterations, 0);

    fit.clear_forced_zero();
    assert_eq!(fit.status(), FitStatus::Dirty);
    let kratios = fit.kratios(&unknown).unwrap();
    assert_relative_eq!(element_kratio(&kratios, "Fe").value(), 0.5, epsilon = 1e-9);
}

#[test]
fn test_forced_zero_element_keeps_others() {
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Ni", "Si"], false);
    fit.force_zero([element("Ni")]);
    let unknown = flat_model(&[("Fe", 0.5), ("Si", 0.2)], 120.0).spectrum();

    let kratios = fit.kratios(&unknown).unwrap();
    assert_eq!(element_kratio(&kratios, "Ni").value(), 0.0);
    assert_relative_eq!(element_kratio(&kratios, "Fe").value(), 0.5, epsilon = 1e-9);
    assert_relative_eq!(element_kratio(&kratios, "Si").value(), 0.2, epsilon = 1e-9);
    assert!(fit.outcome().unwrap().state.forced().contains(&element("Ni")));
}

#[test]
fn test_strip_unlikely_excludes_absent_elements() {
    let mut config = FitConfig::default();
    config.strip_unlikely = true;
    let mut fit = fit_with_references(config, &["Fe", "Ni", "Cu", "Si"], false);
    let unknown = flat_model(&[("Fe", 0.5), ("Si", 0.2)], 120.0).spectrum();

    let kratios = fit.kratios(&unknown).unwrap();
    let outcome = fit.outcome().unwrap();
    for (i, entry) in fit.entries().iter().enumerate() {
        let symbol = entry.element().symbol();
        let excluded = outcome.state.excluded().contains(&i);
        match symbol {
            "Ni" | "Cu" => assert!(excluded, "{} was not stripped", entry.transitions()),
            _ => assert!(!excluded, "{} was stripped", entry.transitions()),
        }
    }
    assert_eq!(element_kratio(&kratios, "Ni"), Default::default());
    assert_eq!(element_kratio(&kratios, "Cu"), Default::default());
    assert_relative_eq!(element_kratio(&kratios, "Fe").value(), 0.5, epsilon = 1e-9);
    assert_eq!(fit.fit_event_count(), 1);
}

#[test]
fn test_fit_metric_and_residual_spectrum() {
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Si"], false);
    let unknown = flat_model(&[("Fe", 0.5), ("Si", 0.2)], 120.0).spectrum();

    let metric = fit.fit_metric(&unknown).unwrap();
    assert!(metric < 1e-6, "perfect fit left {} unexplained", metric);

    let background = BACKGROUND * 120.0;
    let fe_ka = calibration().channel(6403.8).unwrap();
    let far = calibration().channel(12000.0).unwrap();

    let residual = fit.residual_spectrum(&unknown, None).unwrap();
    assert!(unknown.counts[fe_ka] > 5.0 * background);
    assert!(
        (residual.counts[fe_ka] - background).abs() < 0.05 * background,
        "residual at Fe Ka: {}",
        residual.counts[fe_ka]
    );
    assert_eq!(residual.counts[far], unknown.counts[far]);
    assert_eq!(residual.properties, unknown.properties);

    let si_only: BTreeSet<_> = [element("Si")].into_iter().collect();
    let partial = fit.residual_spectrum(&unknown, Some(&si_only)).unwrap();
    assert_eq!(partial.counts[fe_ka], unknown.counts[fe_ka]);
    let si_ka = calibration().channel(1740.0).unwrap();
    assert!((partial.counts[si_ka] - background).abs() < 0.05 * background);

    let filtered = fit.filtered_residual(&unknown).unwrap();
    for entry in fit.entries() {
        let nonzero = entry.nonzero();
        for ch in nonzero.low()..nonzero.high() {
            assert!(filtered[ch].abs() < 1e-6, "filtered residual {} at {}", filtered[ch], ch);
        }
    }
}

#[test]
fn test_fit_metric_without_signal_is_zero() {
    let mut fit = fit_with_references(FitConfig::default(), &["Fe"], false);
    let unknown = Spectrum::new(vec![0.0; CHANNELS], calibration(), properties(120.0));
    assert_eq!(fit.fit_metric(&unknown).unwrap(), 0.0);
}

#[test]
fn test_residual_threshold_change_keeps_fit() {
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Si"], false);
    let unknown = flat_model(&[("Fe", 0.5), ("Si", 0.2)], 120.0).spectrum();
    fit.kratios(&unknown).unwrap();
    let events = fit.fit_event_count();

    fit.set_residual_threshold_ev(1e9);
    assert_eq!(fit.status(), FitStatus::Converged);
    assert!(fit.outcome().is_some());
    assert_eq!(fit.config().residual_threshold_ev, 1e9);

    // Flat backgrounds everywhere still leave the peaks removed
    let residual = fit.residual_spectrum(&unknown, None).unwrap();
    let fe_ka = calibration().channel(6403.8).unwrap();
    assert!((residual.counts[fe_ka] - BACKGROUND * 120.0).abs() < 0.05 * BACKGROUND * 120.0);
    assert_eq!(fit.fit_event_count(), events);
}

#[test]
fn test_new_unknown_triggers_refit() {
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Si"], false);
    let first = flat_model(&[("Fe", 0.5), ("Si", 0.2)], 120.0).spectrum();
    let second = flat_model(&[("Fe", 0.25), ("Si", 0.4)], 90.0).spectrum();

    let k1 = fit.kratios(&first).unwrap();
    let k2 = fit.kratios(&second).unwrap();
    assert_relative_eq!(element_kratio(&k1, "Fe").value(), 0.5, epsilon = 1e-9);
    assert_relative_eq!(element_kratio(&k2, "Fe").value(), 0.25, epsilon = 1e-9);
    assert_relative_eq!(element_kratio(&k2, "Si").value(), 0.4, epsilon = 1e-9);
}

#[test]
fn test_every_filter_kind_recovers_kratios() {
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Ni"], false);
    let unknown = flat_model(&[("Fe", 0.5), ("Ni", 0.3)], 120.0).spectrum();

    for kind in [
        FilterKind::GaussianDerivative,
        FilterKind::SavitzkyGolay,
        FilterKind::TopHat,
    ] {
        fit.set_filter_kind(kind).unwrap();
        assert_eq!(fit.filter().kind(), kind);
        let kratios = fit.kratios(&unknown).unwrap();
        assert_relative_eq!(element_kratio(&kratios, "Fe").value(), 0.5, epsilon = 1e-8);
        assert_relative_eq!(element_kratio(&kratios, "Ni").value(), 0.3, epsilon = 1e-8);
    }
}

#[test]
fn test_noisy_recovery_is_unbiased() {
    let mut fit = fit_with_references(FitConfig::default(), &["Fe", "Ni"], false);
    let model = flat_model(&[("Fe", 0.5), ("Ni", 0.3)], 120.0);
    let expected = [(element("Fe"), 0.5), (element("Ni"), 0.3)];

    let errors = measure_kratio_errors(
        &mut fit,
        &model,
        &expected,
        &NoiseConfig::default().with_seed(42),
        10,
    )
    .unwrap();
    let stats = ErrorStats::from_errors(&errors);

    assert_eq!(stats.count, 20);
    assert!(stats.mean_error.abs() < 0.01, "bias {}", stats.mean_error);
    assert!(stats.max_abs_error < 0.05, "worst error {}", stats.max_abs_error);
    assert!(
        stats.rms_z > 0.2 && stats.rms_z < 3.0,
        "uncertainties off: rms z = {}",
        stats.rms_z
    );
}
