//! Numerically stable primitives for log-domain categorical math.

/// Stable log(sum(exp(values))).
///
/// Returns NEG_INFINITY for empty input or all -inf inputs.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let mut sum = 0.0;
    for v in values {
        sum += (*v - max).exp();
    }
    max + sum.ln()
}

/// Log-softmax of a logit vector, written into `out`.
///
/// `out[j] = logits[j] - log_sum_exp(logits)`. Never overflows for large
/// logits; entries far below the maximum become very negative but finite.
pub fn log_softmax_into(logits: &[f64], out: &mut [f64]) {
    debug_assert_eq!(logits.len(), out.len());
    let lse = log_sum_exp(logits);
    for (o, z) in out.iter_mut().zip(logits) {
        *o = z - lse;
    }
}

/// Log-softmax of a logit vector.
pub fn log_softmax(logits: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; logits.len()];
    log_softmax_into(logits, &mut out);
    out
}

/// Softmax of a logit vector, computed through the log domain.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let mut out = log_softmax(logits);
    for v in &mut out {
        *v = v.exp();
    }
    out
}

/// `x * ln(y)` with the convention `0 * ln(y) = 0` for any y (including 0).
pub fn xlogy(x: f64, y: f64) -> f64 {
    if x == 0.0 && !y.is_nan() {
        return 0.0;
    }
    x * y.ln()
}

/// KL(target || softmax(logits)) given the log-probabilities of the
/// prediction.
///
/// Uses `0 * ln 0 = 0` for the target entropy term, so one-hot targets are
/// handled exactly. The target is not required to be normalized; the result
/// is `sum_j y_j (ln y_j - log_q_j)`.
pub fn kl_divergence_log(target: &[f64], log_q: &[f64]) -> f64 {
    debug_assert_eq!(target.len(), log_q.len());
    let mut kl = 0.0;
    for (&y, &lq) in target.iter().zip(log_q) {
        if y == 0.0 {
            continue;
        }
        kl += xlogy(y, y) - y * lq;
    }
    kl
}

/// KL(p || q) for two probability vectors.
///
/// Returns +inf when q assigns zero mass where p does not.
pub fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    debug_assert_eq!(p.len(), q.len());
    let mut kl = 0.0;
    for (&pi, &qi) in p.iter().zip(q) {
        if pi == 0.0 {
            continue;
        }
        if qi == 0.0 {
            return f64::INFINITY;
        }
        kl += pi * (pi.ln() - qi.ln());
    }
    kl
}
