use std::collections::BTreeSet;

use nalgebra::{DMatrix, DVector};

use crate::error::{LaneDetectionResult, LaneError};

/// SVD 풀이 시 0으로 취급할 특이값 임계치
const SINGULAR_EPS: f64 = 1e-12;

/// `col = c0 + c1*row + c2*row^2 + ...` 형태의 다항식 계수 (오름차순)
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialCoefficients(Vec<f64>);

impl PolynomialCoefficients {
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self(coeffs)
    }

    pub fn order(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// 주어진 row에서의 col 값 (Horner)
    pub fn eval(&self, row: f64) -> f64 {
        self.0.iter().rev().fold(0.0, |acc, &c| acc * row + c)
    }

    /// d(col)/d(row)
    pub fn derivative(&self, row: f64) -> f64 {
        self.0
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (k, &c)| acc * row + k as f64 * c)
    }

    /// d²(col)/d(row)²
    pub fn second_derivative(&self, row: f64) -> f64 {
        self.0
            .iter()
            .enumerate()
            .skip(2)
            .rev()
            .fold(0.0, |acc, (k, &c)| acc * row + (k * (k - 1)) as f64 * c)
    }

    /// 상수항에 `offset`을 더한 다항식 (곡선 전체를 좌우로 평행이동)
    pub fn shifted(&self, offset: f64) -> Self {
        let mut coeffs = self.0.clone();
        if let Some(c0) = coeffs.first_mut() {
            *c0 += offset;
        }
        Self(coeffs)
    }

    /// 두 다항식의 계수별 평균. 차수가 다르면 짧은 쪽을 0으로 채웁니다.
    pub fn midpoint(&self, other: &Self) -> Self {
        let n = self.0.len().max(other.0.len());
        let coeffs = (0..n)
            .map(|k| {
                let a = self.0.get(k).copied().unwrap_or(0.0);
                let b = other.0.get(k).copied().unwrap_or(0.0);
                0.5 * (a + b)
            })
            .collect();
        Self(coeffs)
    }
}

/// `(row, col)` 점들에 대해 `col = f(row)` 다항식을 최소제곱으로 피팅합니다.
///
/// 설계 행렬 A (N x (order+1))의 k번째 열은 `row^k` 입니다. row 값은 최대 절댓값으로
/// 정규화한 뒤 SVD로 풀고, 계수를 원래 스케일로 되돌립니다.
///
/// # 에러
/// * 서로 다른 row 값의 개수가 `order + 1`보다 적으면 `UnderdeterminedFit`
pub fn fit_polynomial(points: &[(i32, i32)], order: usize) -> LaneDetectionResult<PolynomialCoefficients> {
    let required = order + 1;
    let distinct = points.iter().map(|&(row, _)| row).collect::<BTreeSet<_>>().len();
    if distinct < required {
        return Err(LaneError::UnderdeterminedFit { distinct, required });
    }

    let scale = points
        .iter()
        .map(|&(row, _)| (row as f64).abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);

    let n = points.len();
    let mut a = DMatrix::<f64>::zeros(n, required);
    let mut b = DVector::<f64>::zeros(n);
    for (i, &(row, col)) in points.iter().enumerate() {
        let r = row as f64 / scale;
        let mut p = 1.0;
        for k in 0..required {
            a[(i, k)] = p;
            p *= r;
        }
        b[i] = col as f64;
    }

    let svd = a.svd(true, true);
    let beta = svd
        .solve(&b, SINGULAR_EPS)
        .map_err(|e| LaneError::InvalidInput(format!("polynomial solve failed: {}", e)))?;

    let mut s = 1.0;
    let coeffs = beta
        .iter()
        .map(|&c| {
            let v = c / s;
            s *= scale;
            v
        })
        .collect();

    Ok(PolynomialCoefficients(coeffs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn reproduces_exact_quadratic() {
        // r = 20k 에서 col = 400 - 10k + k^2 (정수)
        let coeffs = [400.0, -0.5, 0.0025];
        let points: Vec<(i32, i32)> = (0..36).map(|k| (20 * k, 400 - 10 * k + k * k)).collect();

        let fit = fit_polynomial(&points, 2).unwrap();
        assert_eq!(fit.order(), 2);
        for (got, want) in fit.as_slice().iter().zip(coeffs.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-6);
        }
    }

    #[test]
    fn reproduces_line() {
        let points: Vec<(i32, i32)> = (0..50).map(|r| (r, 2 * r + 7)).collect();
        let fit = fit_polynomial(&points, 1).unwrap();
        assert_abs_diff_eq!(fit.as_slice()[0], 7.0, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.as_slice()[1], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn too_few_points_is_underdetermined() {
        let err = fit_polynomial(&[(0, 1), (5, 3)], 2).unwrap_err();
        assert!(matches!(
            err,
            LaneError::UnderdeterminedFit { distinct: 2, required: 3 }
        ));
    }

    #[test]
    fn repeated_rows_count_once() {
        let points = vec![(10, 1), (10, 2), (10, 3), (20, 4)];
        assert!(matches!(
            fit_polynomial(&points, 2),
            Err(LaneError::UnderdeterminedFit { distinct: 2, .. })
        ));
    }

    #[test]
    fn derivatives_of_quadratic() {
        let p = PolynomialCoefficients::new(vec![1.0, 2.0, 3.0]);
        assert_abs_diff_eq!(p.eval(2.0), 1.0 + 4.0 + 12.0);
        assert_abs_diff_eq!(p.derivative(2.0), 2.0 + 12.0);
        assert_abs_diff_eq!(p.second_derivative(2.0), 6.0);
    }

    #[test]
    fn shifted_and_midpoint() {
        let a = PolynomialCoefficients::new(vec![100.0, 0.0, 0.001]);
        let b = a.shifted(600.0);
        assert_abs_diff_eq!(b.eval(10.0) - a.eval(10.0), 600.0);
        let mid = a.midpoint(&b);
        assert_abs_diff_eq!(mid.eval(10.0), a.eval(10.0) + 300.0, epsilon = 1e-9);
    }
}
