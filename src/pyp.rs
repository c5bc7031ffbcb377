// Pitman-Yor process restaurant

use crate::numeric::bernoulli;
use crate::prelude::*;
use crate::tables::{TableIndex, TableSet};

use rand::Rng;
use rand_distr::{Beta, Distribution, Gamma};
use statrs::function::gamma::ln_gamma;
use std::ops::AddAssign;

/// Gamma prior on the strength and Beta prior on the discount.
#[derive(Debug, Copy, Clone)]
pub struct HyperPrior {
    strength_shape: Shape,
    strength_rate: Rate,
    discount_alpha: Shape,
    discount_beta: Shape,
}

impl HyperPrior {
    pub fn new(
        strength_shape: Shape,
        strength_rate: Rate,
        discount_alpha: Shape,
        discount_beta: Shape,
    ) -> Self {
        Self {
            strength_shape,
            strength_rate,
            discount_alpha,
            discount_beta,
        }
    }

    pub fn from_values(
        strength_shape: f64,
        strength_rate: f64,
        discount_alpha: f64,
        discount_beta: f64,
    ) -> Option<Self> {
        Some(Self::new(
            Shape::try_new(strength_shape)?,
            Rate::try_new(strength_rate)?,
            Shape::try_new(discount_alpha)?,
            Shape::try_new(discount_beta)?,
        ))
    }
}

impl Default for HyperPrior {
    fn default() -> Self {
        Self::new(Shape::new(2.0), Rate::new(1.0), Shape::new(2.0), Shape::new(2.0))
    }
}

/// Sufficient statistics of the auxiliary variables used to resample
/// `(strength, discount)`; they add up across restaurants sharing a prior.
#[derive(Debug, Copy, Clone, Default)]
pub struct AuxiliaryStatistics {
    sum_log_x: f64,
    sum_y: f64,
    sum_one_minus_y: f64,
    sum_one_minus_z: f64,
}

impl AddAssign for AuxiliaryStatistics {
    fn add_assign(&mut self, other: Self) {
        self.sum_log_x += other.sum_log_x;
        self.sum_y += other.sum_y;
        self.sum_one_minus_y += other.sum_one_minus_y;
        self.sum_one_minus_z += other.sum_one_minus_z;
    }
}

impl AuxiliaryStatistics {
    /// Draws `(strength, discount)` from their conditional posteriors.
    pub fn sample_posterior<R: Rng + ?Sized>(
        &self,
        prior: &HyperPrior,
        rng: &mut R,
    ) -> (Strength, Discount) {
        let beta = Beta::new(
            prior.discount_alpha.get() + self.sum_one_minus_y,
            prior.discount_beta.get() + self.sum_one_minus_z,
        )
        .expect("Beta parameters are positive for a validated prior.");
        let discount = beta.sample(rng).min(1.0 - f64::EPSILON);
        let rate = prior.strength_rate.get() - self.sum_log_x;
        let gamma = Gamma::new(prior.strength_shape.get() + self.sum_y, 1.0 / rate)
            .expect("Gamma parameters are positive for a validated prior.");
        let strength = gamma.sample(rng).max(f64::MIN_POSITIVE);
        (
            Strength::new_with_variable_constraint(strength, discount),
            Discount::new(discount),
        )
    }
}

/// A Pitman-Yor restaurant over integer outcomes.
///
/// `customers` is the sum of all table set totals and `tables` the number of
/// occupied tables across outcomes.
#[derive(Debug, Clone)]
pub struct PitmanYor<I: TableIndex> {
    customers: usize,
    tables: usize,
    strength: Strength,
    discount: Discount,
    index: I,
    table_added: bool,
    table_removed: bool,
}

impl<I: TableIndex> PitmanYor<I> {
    pub fn new(strength: Strength, discount: Discount) -> Self {
        assert!(
            strength.get() > -discount.get(),
            "Strength must be greater than the negative of the discount."
        );
        Self {
            customers: 0,
            tables: 0,
            strength,
            discount,
            index: I::default(),
            table_added: false,
            table_removed: false,
        }
    }

    pub fn customers(&self) -> usize {
        self.customers
    }

    pub fn tables(&self) -> usize {
        self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.customers == 0
    }

    pub fn strength(&self) -> Strength {
        self.strength
    }

    pub fn discount(&self) -> Discount {
        self.discount
    }

    pub fn set_hyperparameters(&mut self, strength: Strength, discount: Discount) {
        assert!(
            strength.get() > -discount.get(),
            "Strength must be greater than the negative of the discount."
        );
        self.strength = strength;
        self.discount = discount;
    }

    pub fn total(&self, outcome: usize) -> usize {
        self.index.total(outcome)
    }

    pub fn table_set(&self, outcome: usize) -> Option<&TableSet> {
        self.index.table_set(outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &TableSet)> + '_ {
        self.index.iter()
    }

    /// Whether the last `add_customer` opened a table.
    pub fn table_added(&self) -> bool {
        self.table_added
    }

    /// Whether the last `remove_customer` closed a table.
    pub fn table_removed(&self) -> bool {
        self.table_removed
    }

    /// Predictive probability of `outcome` given its base probability.
    pub fn prob(&self, outcome: usize, base: f64) -> f64 {
        if self.customers == 0 {
            return base;
        }
        let strength = self.strength.get();
        let discount = self.discount.get();
        let count = match self.index.table_set(outcome) {
            Some(set) => (set.total() as f64 - discount * set.n_tables() as f64).max(0.0),
            None => 0.0,
        };
        (count + base * (strength + self.tables as f64 * discount))
            / (self.customers as f64 + strength)
    }

    pub fn probs(&self, bases: &[f64]) -> Vec<f64> {
        bases
            .iter()
            .enumerate()
            .map(|(outcome, base)| self.prob(outcome, *base))
            .collect()
    }

    /// Predictive probability of an outcome that has never been seated here.
    pub fn unseen_prob(&self, base: f64) -> f64 {
        base * self.fallback_prob()
    }

    /// Mass reserved for escalating to the base distribution.
    pub fn fallback_prob(&self) -> f64 {
        if self.customers == 0 {
            return 1.0;
        }
        let strength = self.strength.get();
        (strength + self.tables as f64 * self.discount.get()) / (self.customers as f64 + strength)
    }

    /// Seats one customer and returns the probability it was seated with.
    pub fn add_customer<R: Rng + ?Sized>(&mut self, outcome: usize, base: f64, rng: &mut R) -> f64 {
        let existing_prob = self.prob(outcome, 0.0);
        let base_prob = base * self.fallback_prob();
        let total_prob = existing_prob + base_prob;
        let discount = self.discount.get();
        let set = self.index.table_set_mut(outcome);
        if rng.random::<f64>() * total_prob < existing_prob {
            let table = choose_table(set, discount, rng);
            set.seat_at(table);
            self.table_added = false;
        } else {
            set.open_table();
            self.tables += 1;
            self.table_added = true;
        }
        self.customers += 1;
        total_prob
    }

    /// Unseats one customer of `outcome` and returns its predictive
    /// probability given the remaining customers.
    pub fn remove_customer<R: Rng + ?Sized>(
        &mut self,
        outcome: usize,
        base: f64,
        rng: &mut R,
    ) -> f64 {
        if self.index.total(outcome) == 0 {
            panic!(
                "Removing a customer of outcome {} which has no seated customers.",
                outcome
            );
        }
        let set = self.index.table_set_mut(outcome);
        let mut left = (rng.random::<f64>() * set.total() as f64) as usize;
        let mut table = set.n_tables() - 1;
        for (k, count) in set.counts().iter().enumerate() {
            if left < *count {
                table = k;
                break;
            }
            left -= count;
        }
        let closed = set.unseat_at(table);
        let emptied = set.is_empty();
        self.customers -= 1;
        self.table_removed = closed;
        if closed {
            self.tables -= 1;
        }
        if emptied {
            self.index.release(outcome);
        }
        self.prob(outcome, base)
    }

    /// Log probability of the current seating arrangement, excluding the
    /// base distribution's contribution for each table.
    pub fn log_seating_prob(&self) -> f64 {
        if self.customers == 0 {
            return 0.0;
        }
        let strength = self.strength.get();
        let discount = self.discount.get();
        let mut result = -(ln_gamma(strength + self.customers as f64) - ln_gamma(strength + 1.0));
        for t in 1..self.tables {
            result += (strength + discount * t as f64).ln();
        }
        let ln_gamma_one_minus_discount = ln_gamma(1.0 - discount);
        for (_, set) in self.index.iter() {
            for count in set.counts() {
                result += ln_gamma(*count as f64 - discount) - ln_gamma_one_minus_discount;
            }
        }
        result
    }

    /// Draws the auxiliary variables of this restaurant and returns their
    /// sufficient statistics.
    pub fn auxiliary_statistics<R: Rng + ?Sized>(&self, rng: &mut R) -> AuxiliaryStatistics {
        let strength = self.strength.get();
        let discount = self.discount.get();
        let mut stats = AuxiliaryStatistics::default();
        if self.customers >= 2 {
            let beta = Beta::new(strength + 1.0, (self.customers - 1) as f64)
                .expect("Beta parameters are positive when strength exceeds -1.");
            stats.sum_log_x += beta.sample(rng).ln();
        }
        for i in 1..self.tables {
            if bernoulli(strength / (strength + discount * i as f64), rng) {
                stats.sum_y += 1.0;
            } else {
                stats.sum_one_minus_y += 1.0;
            }
        }
        for (_, set) in self.index.iter() {
            for count in set.counts() {
                for j in 1..*count {
                    let j = j as f64;
                    if !bernoulli((j - 1.0) / (j - discount), rng) {
                        stats.sum_one_minus_z += 1.0;
                    }
                }
            }
        }
        stats
    }

    /// Resamples this restaurant's own hyperparameters.
    pub fn sample_hyperparameters<R: Rng + ?Sized>(
        &mut self,
        prior: &HyperPrior,
        rng: &mut R,
    ) -> (Strength, Discount) {
        let (strength, discount) = self.auxiliary_statistics(rng).sample_posterior(prior, rng);
        self.set_hyperparameters(strength, discount);
        (strength, discount)
    }
}

/// Resamples one `(strength, discount)` pair shared by all `dists`,
/// pooling their auxiliary statistics, and assigns it to every member.
pub fn sample_tied_hyperparameters<I: TableIndex, R: Rng + ?Sized>(
    dists: &mut [&mut PitmanYor<I>],
    prior: &HyperPrior,
    rng: &mut R,
) -> (Strength, Discount) {
    let mut stats = AuxiliaryStatistics::default();
    for dist in dists.iter() {
        stats += dist.auxiliary_statistics(rng);
    }
    let (strength, discount) = stats.sample_posterior(prior, rng);
    for dist in dists.iter_mut() {
        dist.set_hyperparameters(strength, discount);
    }
    (strength, discount)
}

// Picks an occupied table with probability proportional to (count - discount).
fn choose_table<R: Rng + ?Sized>(set: &TableSet, discount: f64, rng: &mut R) -> usize {
    let counts = set.counts();
    if counts.len() <= 1 {
        return 0;
    }
    let mut left =
        rng.random::<f64>() * (set.total() as f64 - counts.len() as f64 * discount);
    for (k, count) in counts.iter().enumerate() {
        left -= *count as f64 - discount;
        if left <= 0.0 {
            return k;
        }
    }
    counts.len() - 1
}
