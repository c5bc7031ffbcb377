use rand::Rng;

/// Log of the sum of exponentiated values, stable for very negative inputs.
///
/// An empty slice or a slice of `-inf` yields `-inf`.
pub fn log_sum_exp(log_values: &[f64]) -> f64 {
    let max = log_values
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = log_values.iter().map(|x| (x - max).exp()).sum();
    sum.ln() + max
}

/// Converts log weights into probabilities summing to one, in place.
pub fn normalize_log_probs(log_values: &mut [f64]) {
    let max = log_values
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let mut norm = 0.0;
    for x in log_values.iter_mut() {
        *x = (*x - max).exp();
        norm += *x;
    }
    for x in log_values.iter_mut() {
        *x /= norm;
    }
}

/// Draws an index from normalized probabilities.
///
/// Rounding slack always lands on the last index rather than running off the end.
pub fn sample_index<R: Rng + ?Sized>(probs: &[f64], rng: &mut R) -> usize {
    let mut left: f64 = rng.random();
    let last = probs.len() - 1;
    for (index, p) in probs.iter().enumerate().take(last) {
        left -= p;
        if left <= 0.0 {
            return index;
        }
    }
    last
}

/// Bernoulli draw; probabilities outside [0,1] behave as if clamped.
pub fn bernoulli<R: Rng + ?Sized>(p: f64, rng: &mut R) -> bool {
    rng.random::<f64>() < p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::assert_goodness_of_fit;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    #[test]
    fn test_log_sum_exp() {
        let x = [0.5_f64.ln(), 0.25_f64.ln(), 0.25_f64.ln()];
        assert!(log_sum_exp(&x).abs() < 1e-12);
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert_eq!(
            log_sum_exp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]),
            f64::NEG_INFINITY
        );
        let big = [-1000.0, -1000.0];
        assert!((log_sum_exp(&big) - (-1000.0 + 2.0_f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_log_probs() {
        let mut x = vec![-1000.0, -1000.0 + 3.0_f64.ln(), f64::NEG_INFINITY];
        normalize_log_probs(&mut x);
        assert!((x[0] - 0.25).abs() < 1e-12);
        assert!((x[1] - 0.75).abs() < 1e-12);
        assert_eq!(x[2], 0.0);
    }

    #[test]
    fn test_sample_index_frequencies() {
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        let probs = [0.2, 0.0, 0.8];
        let mut counts = [0_usize; 3];
        let n = 20000;
        for _ in 0..n {
            counts[sample_index(&probs, &mut rng)] += 1;
        }
        assert_eq!(counts[1], 0);
        if let Some(msg) = assert_goodness_of_fit(&counts, &probs, 0.001) {
            panic!("{}", msg);
        }
    }

    #[test]
    fn test_bernoulli_extremes() {
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        for _ in 0..100 {
            assert!(bernoulli(1.0, &mut rng));
            assert!(!bernoulli(0.0, &mut rng));
            assert!(bernoulli(2.0, &mut rng));
        }
    }
}
