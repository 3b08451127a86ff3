//! Helpers for vectors on the probability simplex.

/// Default tolerance used by [`is_simplex`] callers.
pub const SIMPLEX_TOL: f64 = 1e-9;

/// One-hot vector of length `n` with mass at `index`.
///
/// An out-of-range index yields the all-zero vector.
pub fn one_hot(n: usize, index: usize) -> Vec<f64> {
    let mut v = vec![0.0; n];
    if let Some(slot) = v.get_mut(index) {
        *slot = 1.0;
    }
    v
}

/// Uniform distribution over `n` categories.
pub fn uniform(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

/// Scale `values` in place so they sum to one.
///
/// Returns the original total. When the total is zero or not finite the
/// vector is left untouched; callers decide how to recover.
pub fn normalize_in_place(values: &mut [f64]) -> f64 {
    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        for v in values.iter_mut() {
            *v /= total;
        }
    }
    total
}

/// Normalize `values`, falling back to the uniform distribution over the
/// entries allowed by `support` when there is no usable mass.
///
/// `support` is only consulted on fallback. If it admits nothing the vector
/// becomes uniform over all entries.
pub fn normalize_or_uniform(values: &mut [f64], support: &[bool]) {
    debug_assert_eq!(values.len(), support.len());
    let total = normalize_in_place(values);
    if total > 0.0 && total.is_finite() {
        return;
    }
    let allowed = support.iter().filter(|s| **s).count();
    if allowed == 0 {
        values.copy_from_slice(&uniform(values.len()));
        return;
    }
    let u = 1.0 / allowed as f64;
    for (v, s) in values.iter_mut().zip(support) {
        *v = if *s { u } else { 0.0 };
    }
}

/// True when every entry is finite and non-negative and the entries sum to
/// one within `tol`.
pub fn is_simplex(values: &[f64], tol: f64) -> bool {
    if values.is_empty() {
        return false;
    }
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return false;
    }
    let total: f64 = values.iter().sum();
    (total - 1.0).abs() <= tol
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hot_places_mass() {
        assert_eq!(one_hot(3, 1), vec![0.0, 1.0, 0.0]);
        assert_eq!(one_hot(2, 5), vec![0.0, 0.0]);
    }

    #[test]
    fn normalize_scales_to_one() {
        let mut v = [1.0, 3.0];
        let total = normalize_in_place(&mut v);
        assert_eq!(total, 4.0);
        assert_eq!(v, [0.25, 0.75]);
    }

    #[test]
    fn normalize_or_uniform_respects_support() {
        let mut v = [0.0, 0.0, 0.0];
        normalize_or_uniform(&mut v, &[true, false, true]);
        assert_eq!(v, [0.5, 0.0, 0.5]);
    }

    #[test]
    fn normalize_or_uniform_empty_support() {
        let mut v = [0.0, 0.0];
        normalize_or_uniform(&mut v, &[false, false]);
        assert_eq!(v, [0.5, 0.5]);
    }

    #[test]
    fn simplex_checks() {
        assert!(is_simplex(&[0.2, 0.8], SIMPLEX_TOL));
        assert!(!is_simplex(&[0.2, 0.7], SIMPLEX_TOL));
        assert!(!is_simplex(&[-0.2, 1.2], SIMPLEX_TOL));
        assert!(!is_simplex(&[], SIMPLEX_TOL));
        assert!(!is_simplex(&[f64::NAN, 1.0], SIMPLEX_TOL));
    }

    #[test]
    fn uniform_sums_to_one() {
        assert_eq!(uniform(4), vec![0.25; 4]);
        assert!(uniform(0).is_empty());
    }
}
