use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

/// Chi-squared goodness of fit of observed category counts against expected
/// probabilities. Adjacent categories are pooled until each bin expects at
/// least five draws. Returns a message when the fit is rejected at `alpha`.
pub fn assert_goodness_of_fit(observed: &[usize], probs: &[f64], alpha: f64) -> Option<String> {
    assert_eq!(observed.len(), probs.len());
    let n: usize = observed.iter().sum();
    let ns = n as f64;
    let threshold = 5.0;
    let mut chisq = 0.0;
    let mut df = 0;
    let mut pooled_observed = 0;
    let mut pooled_expected = 0.0;
    for (o, p) in observed.iter().zip(probs) {
        pooled_observed += *o;
        pooled_expected += ns * p;
        if pooled_expected >= threshold {
            let o = pooled_observed as f64;
            chisq += (o - pooled_expected) * (o - pooled_expected) / pooled_expected;
            df += 1;
            pooled_observed = 0;
            pooled_expected = 0.0;
        }
    }
    if pooled_expected > 0.0 {
        let o = pooled_observed as f64;
        chisq += (o - pooled_expected) * (o - pooled_expected) / pooled_expected;
        df += 1;
    }
    if df < 2 {
        return None;
    }
    let distr = ChiSquared::new((df - 1) as f64).unwrap();
    let p_value = 1.0 - distr.cdf(chisq);
    if p_value <= alpha {
        Some(format!(
            "Rejected goodness of fit test... p-value: {:.8}, chisq: {:.2}, df: {}",
            p_value, chisq, df
        ))
    } else {
        None
    }
}

/// Two-sided two-proportion z-test. Returns a message when the success rates
/// differ at level `alpha`.
pub fn assert_proportions_agree(
    successes_a: usize,
    trials_a: usize,
    successes_b: usize,
    trials_b: usize,
    alpha: f64,
) -> Option<String> {
    let (na, nb) = (trials_a as f64, trials_b as f64);
    let pa = successes_a as f64 / na;
    let pb = successes_b as f64 / nb;
    let pooled = (successes_a + successes_b) as f64 / (na + nb);
    let se = (pooled * (1.0 - pooled) * (1.0 / na + 1.0 / nb)).sqrt();
    if se == 0.0 {
        return if pa == pb {
            None
        } else {
            Some(format!("Proportions {} and {} differ with no variance.", pa, pb))
        };
    }
    let z = (pa - pb) / se;
    let p_value = 2.0 * (1.0 - Normal::new(0.0, 1.0).unwrap().cdf(z.abs()));
    if p_value <= alpha {
        Some(format!(
            "Rejected equal proportions... p-value: {:.8}, rates: {:.4} vs {:.4}, z: {:.2}",
            p_value, pa, pb, z
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goodness_of_fit() {
        assert!(assert_goodness_of_fit(&[250, 250, 500], &[0.25, 0.25, 0.5], 0.01).is_none());
        assert!(assert_goodness_of_fit(&[500, 250, 250], &[0.25, 0.25, 0.5], 0.01).is_some());
    }

    #[test]
    fn test_proportions() {
        assert!(assert_proportions_agree(50, 100, 52, 100, 0.01).is_none());
        assert!(assert_proportions_agree(10, 100, 90, 100, 0.01).is_some());
        assert!(assert_proportions_agree(100, 100, 100, 100, 0.01).is_none());
    }
}
