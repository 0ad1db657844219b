//! Weighted linear least squares
//!
//! The orchestrator hands a [`FitDesign`] to any [`WeightedSolver`]. The
//! default [`SvdSolver`] uses a truncated singular value decomposition so a
//! rank-deficient design (two references with identical filtered shapes)
//! still yields finite coefficients.

use nalgebra::{DMatrix, DVector, SVD};

use crate::constants::SVD_RELATIVE_TOLERANCE;
use crate::error::{FitError, Result};

/// `observed ≈ Σ coefficient_j · column_j`, each row weighted by `1 / error`
#[derive(Debug, Clone, PartialEq)]
pub struct FitDesign {
    observed: Vec<f64>,
    errors: Vec<f64>,
    columns: Vec<Vec<f64>>,
}

impl FitDesign {
    pub fn new(observed: Vec<f64>, errors: Vec<f64>) -> Self {
        Self {
            observed,
            errors,
            columns: Vec::new(),
        }
    }

    pub fn push_column(&mut self, column: Vec<f64>) {
        self.columns.push(column);
    }

    pub fn observed(&self) -> &[f64] {
        &self.observed
    }

    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.observed.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Copy of this design keeping only the columns for which `keep` is true
    pub fn retain_columns(&self, mut keep: impl FnMut(usize) -> bool) -> FitDesign {
        FitDesign {
            observed: self.observed.clone(),
            errors: self.errors.clone(),
            columns: self
                .columns
                .iter()
                .enumerate()
                .filter(|(j, _)| keep(*j))
                .map(|(_, c)| c.clone())
                .collect(),
        }
    }

    /// Weighted sum of squared residuals for the given coefficients
    pub fn chi_squared(&self, coefficients: &[f64]) -> f64 {
        (0..self.row_count())
            .map(|i| {
                let predicted: f64 = self
                    .columns
                    .iter()
                    .zip(coefficients)
                    .map(|(col, c)| c * col[i])
                    .sum();
                ((self.observed[i] - predicted) / self.errors[i]).powi(2)
            })
            .sum()
    }

    fn validate(&self) -> Result<()> {
        let rows = self.row_count();
        if self.errors.len() != rows {
            return Err(FitError::Solver(format!(
                "{} observations but {} errors",
                rows,
                self.errors.len()
            )));
        }
        if let Some(j) = self.columns.iter().position(|c| c.len() != rows) {
            return Err(FitError::Solver(format!(
                "column {} has {} rows, expected {}",
                j,
                self.columns[j].len(),
                rows
            )));
        }
        if self.errors.iter().any(|e| !(e.is_finite() && *e > 0.0)) {
            return Err(FitError::Solver(
                "errors must be finite and positive".to_string(),
            ));
        }
        if self.observed.iter().any(|v| !v.is_finite()) {
            return Err(FitError::Solver("observations must be finite".to_string()));
        }
        if !self.columns.is_empty() && rows == 0 {
            return Err(FitError::Solver("design has no rows".to_string()));
        }
        Ok(())
    }
}

/// Coefficients, their variances and the chi-squared of a solve
#[derive(Debug, Clone, PartialEq)]
pub struct FitSolution {
    pub coefficients: Vec<f64>,
    pub variances: Vec<f64>,
    pub chi_squared: f64,
}

/// Weighted linear least-squares solver
pub trait WeightedSolver {
    fn solve(&self, design: &FitDesign) -> Result<FitSolution>;
}

/// Truncated-SVD solver backed by nalgebra
#[derive(Debug, Clone)]
pub struct SvdSolver {
    relative_tolerance: f64,
}

impl SvdSolver {
    pub fn new(relative_tolerance: f64) -> Self {
        Self { relative_tolerance }
    }
}

impl Default for SvdSolver {
    fn default() -> Self {
        Self::new(SVD_RELATIVE_TOLERANCE)
    }
}

impl WeightedSolver for SvdSolver {
    fn solve(&self, design: &FitDesign) -> Result<FitSolution> {
        design.validate()?;
        let rows = design.row_count();
        let cols = design.column_count();
        if cols == 0 {
            return Ok(FitSolution {
                coefficients: Vec::new(),
                variances: Vec::new(),
                chi_squared: design.chi_squared(&[]),
            });
        }

        let errors = design.errors();
        let a = DMatrix::from_fn(rows, cols, |i, j| design.columns()[j][i] / errors[i]);
        let b = DVector::from_iterator(
            rows,
            design.observed().iter().zip(errors).map(|(y, e)| y / e),
        );

        // Zero iterations means run until converged
        let svd = SVD::try_new(a, true, true, f64::EPSILON, 0)
            .ok_or_else(|| FitError::Solver("SVD did not converge".to_string()))?;
        let u = svd
            .u
            .as_ref()
            .ok_or_else(|| FitError::Solver("SVD missing U".to_string()))?;
        let v_t = svd
            .v_t
            .as_ref()
            .ok_or_else(|| FitError::Solver("SVD missing V^T".to_string()))?;
        let singular = &svd.singular_values;
        let cutoff = singular.max() * self.relative_tolerance;
        let ut_b = u.transpose() * &b;

        let mut coefficients = vec![0.0; cols];
        let mut variances = vec![0.0; cols];
        for (k, &s) in singular.iter().enumerate() {
            if s <= cutoff {
                continue;
            }
            for j in 0..cols {
                let v = v_t[(k, j)] / s;
                coefficients[j] += ut_b[k] * v;
                variances[j] += v * v;
            }
        }

        let chi_squared = design.chi_squared(&coefficients);
        Ok(FitSolution {
            coefficients,
            variances,
            chi_squared,
        })
    }
}
