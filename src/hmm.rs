// Hidden Markov model with Pitman-Yor transitions and emissions

use crate::config::Config;
use crate::corpus::Corpus;
use crate::distr::{Membership, Model};
use crate::error::{PgibbsError, Result};
use crate::labels::Classes;
use crate::numeric::{log_sum_exp, normalize_log_probs, sample_index};
use crate::prelude::*;
use crate::pyp::{sample_tied_hyperparameters, HyperPrior, PitmanYor};
use crate::tables::{DenseIndex, SparseIndex};

use rand::Rng;
use std::io::{self, Write};

/// Class-based bigram HMM over padded sentences.
///
/// Classes `0..n_classes` are ordinary states and class `n_classes` marks
/// both sentence ends. Each class owns a transition restaurant over classes
/// and an emission restaurant over word ids.
#[derive(Debug, Clone)]
pub struct HmmModel {
    n_classes: usize,
    transitions: Vec<PitmanYor<DenseIndex>>,
    emissions: Vec<PitmanYor<SparseIndex>>,
    transition_base: Vec<f64>,
    emission_base: Vec<f64>,
    transition_prior: HyperPrior,
    emission_prior: HyperPrior,
    log_transitions: Vec<f64>,
    included: Membership,
}

impl HmmModel {
    pub fn new(n_classes: usize, emission_base: Vec<f64>) -> Self {
        assert!(n_classes > 0, "An HMM needs at least one class.");
        let strength = Strength::new(0.1);
        let discount = Discount::new(0.0);
        Self {
            n_classes,
            transitions: vec![PitmanYor::new(strength, discount); n_classes + 1],
            emissions: vec![PitmanYor::new(strength, discount); n_classes + 1],
            transition_base: vec![1.0 / (n_classes + 1) as f64; n_classes + 1],
            emission_base,
            transition_prior: HyperPrior::default(),
            emission_prior: HyperPrior::default(),
            log_transitions: Vec::new(),
            included: Membership::default(),
        }
    }

    pub fn with_transition_parameters(
        mut self,
        strength: Strength,
        discount: Discount,
        prior: HyperPrior,
    ) -> Self {
        for dist in self.transitions.iter_mut() {
            dist.set_hyperparameters(strength, discount);
        }
        self.transition_prior = prior;
        self
    }

    pub fn with_emission_parameters(
        mut self,
        strength: Strength,
        discount: Discount,
        prior: HyperPrior,
    ) -> Self {
        for dist in self.emissions.iter_mut() {
            dist.set_hyperparameters(strength, discount);
        }
        self.emission_prior = prior;
        self
    }

    pub fn from_config(config: &Config, corpus: &Corpus) -> Result<Self> {
        let n_classes = config.get_positive("classes")?;
        let emission_base = match config.get_string("base")? {
            "uniform" => uniform_base(corpus.vocab_size()),
            "unigram" => unigram_base(corpus),
            other => {
                return Err(PgibbsError::InvalidParameter {
                    key: "base",
                    reason: format!("'{}' is neither uniform nor unigram", other),
                })
            }
        };
        let tdisc = config.get_discount("tdisc")?;
        let edisc = config.get_discount("edisc")?;
        Ok(Self::new(n_classes, emission_base)
            .with_transition_parameters(
                config.get_strength("tstr", tdisc)?,
                tdisc,
                config.get_hyper_prior(["tstra", "tstrb", "tdisca", "tdiscb"])?,
            )
            .with_emission_parameters(
                config.get_strength("estr", edisc)?,
                edisc,
                config.get_hyper_prior(["estra", "estrb", "edisca", "ediscb"])?,
            ))
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn transition(&self, class: usize) -> &PitmanYor<DenseIndex> {
        &self.transitions[class]
    }

    pub fn emission(&self, class: usize) -> &PitmanYor<SparseIndex> {
        &self.emissions[class]
    }

    fn check_lengths(&self, sid: usize, sentence: &[usize], label: &Classes) {
        assert_eq!(
            sentence.len(),
            label.len(),
            "Sentence {} has {} tokens but {} labels.",
            sid,
            sentence.len(),
            label.len()
        );
        assert!(sentence.len() >= 2, "Sentence {} is not padded.", sid);
    }

    // Backward pass over the inner positions; resamples `tags` when `rng` is given.
    fn backward_step<R: Rng + ?Sized>(
        &self,
        forward: &[f64],
        tags: &mut [usize],
        mut rng: Option<&mut R>,
    ) -> f64 {
        let cl = self.n_classes + 1;
        let last = tags.len() - 1;
        let mut weights = vec![0.0; self.n_classes];
        let mut log_prob = 0.0;
        for i in (1..last).rev() {
            let next = tags[i + 1];
            for (j, w) in weights.iter_mut().enumerate() {
                *w = self.log_transitions[j * cl + next] + forward[i * cl + j];
            }
            normalize_log_probs(&mut weights);
            if let Some(rng) = rng.as_deref_mut() {
                tags[i] = sample_index(&weights, rng);
            }
            log_prob += weights[tags[i]].ln();
        }
        log_prob
    }
}

/// Every word id equally likely.
pub fn uniform_base(n_words: usize) -> Vec<f64> {
    vec![1.0 / n_words as f64; n_words]
}

/// Relative frequencies of the words inside the padding.
pub fn unigram_base(corpus: &Corpus) -> Vec<f64> {
    let mut base = vec![0.0; corpus.vocab_size()];
    let mut sum = 0.0;
    for sentence in corpus.sentences() {
        if sentence.len() < 2 {
            continue;
        }
        for word in &sentence[1..sentence.len() - 1] {
            base[*word] += 1.0;
            sum += 1.0;
        }
    }
    if sum > 0.0 {
        for b in base.iter_mut() {
            *b /= sum;
        }
    }
    base
}

impl Model for HmmModel {
    type Label = Classes;

    fn random_label<R: Rng + ?Sized>(&self, sentence: &[usize], rng: &mut R) -> Classes {
        Classes::random(sentence.len(), self.n_classes, rng)
    }

    fn add_sentence<R: Rng + ?Sized>(
        &mut self,
        sid: usize,
        sentence: &[usize],
        label: &Classes,
        rng: &mut R,
    ) -> f64 {
        self.check_lengths(sid, sentence, label);
        self.included.insert(sid);
        let tags = label.as_slice();
        let last = sentence.len() - 1;
        let mut log_prob = 0.0;
        for i in 1..last {
            let base = self.transition_base[tags[i]];
            let t = self.transitions[tags[i - 1]].add_customer(tags[i], base, rng);
            let base = self.emission_base[sentence[i]];
            let e = self.emissions[tags[i]].add_customer(sentence[i], base, rng);
            log_prob += (t * e).ln();
        }
        let base = self.transition_base[tags[last]];
        log_prob += self.transitions[tags[last - 1]]
            .add_customer(tags[last], base, rng)
            .ln();
        log_prob
    }

    fn remove_sentence<R: Rng + ?Sized>(
        &mut self,
        sid: usize,
        sentence: &[usize],
        label: &Classes,
        rng: &mut R,
    ) -> f64 {
        self.check_lengths(sid, sentence, label);
        self.included.remove(sid);
        let tags = label.as_slice();
        let last = sentence.len() - 1;
        let mut log_prob = 0.0;
        for i in 1..last {
            let base = self.transition_base[tags[i]];
            let t = self.transitions[tags[i - 1]].remove_customer(tags[i], base, rng);
            let base = self.emission_base[sentence[i]];
            let e = self.emissions[tags[i]].remove_customer(sentence[i], base, rng);
            log_prob += (t * e).ln();
        }
        let base = self.transition_base[tags[last]];
        log_prob += self.transitions[tags[last - 1]]
            .remove_customer(tags[last], base, rng)
            .ln();
        log_prob
    }

    fn cache_probabilities(&mut self) {
        let cl = self.n_classes + 1;
        let mut matrix = Vec::with_capacity(cl * cl);
        for from in &self.transitions {
            for (to, base) in self.transition_base.iter().enumerate() {
                matrix.push(from.prob(to, *base).ln());
            }
        }
        self.log_transitions = matrix;
    }

    fn sample_sentence<R: Rng + ?Sized>(
        &self,
        sid: usize,
        sentence: &[usize],
        label: &mut Classes,
        rng: &mut R,
    ) -> (f64, f64) {
        self.check_lengths(sid, sentence, label);
        assert!(
            !self.included.contains(sid),
            "Sampling sentence {} which is still in the model.",
            sid
        );
        let cl = self.n_classes + 1;
        assert_eq!(
            self.log_transitions.len(),
            cl * cl,
            "Transition probabilities have not been cached."
        );
        let last = sentence.len() - 1;
        let mut forward = vec![f64::NEG_INFINITY; cl * last];
        forward[self.n_classes] = 0.0;
        let mut weights = vec![0.0; cl];
        for i in 1..last {
            let word = sentence[i];
            for j in 0..self.n_classes {
                for (k, w) in weights.iter_mut().enumerate() {
                    *w = forward[(i - 1) * cl + k] + self.log_transitions[k * cl + j];
                }
                let emission = self.emissions[j].prob(word, self.emission_base[word]);
                forward[i * cl + j] = log_sum_exp(&weights) + emission.ln();
            }
        }
        let mut old_tags = label.as_slice().to_vec();
        let old = self.backward_step::<R>(&forward, &mut old_tags, None);
        let new = self.backward_step(&forward, label.as_mut_slice(), Some(rng));
        (old, new)
    }

    fn sample_parameters<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut transitions: Vec<_> = self.transitions.iter_mut().collect();
        let (tstr, tdisc) = sample_tied_hyperparameters(&mut transitions, &self.transition_prior, rng);
        let mut emissions: Vec<_> = self.emissions.iter_mut().collect();
        let (estr, edisc) = sample_tied_hyperparameters(&mut emissions, &self.emission_prior, rng);
        log::info!(
            "tstr={:.6}, tdisc={:.6}, estr={:.6}, edisc={:.6}",
            tstr.get(),
            tdisc.get(),
            estr.get(),
            edisc.get()
        );
    }

    fn check_empty(&self) {
        assert!(self.included.is_empty(), "Sentences remain in the model.");
        for (class, dist) in self.transitions.iter().enumerate() {
            assert!(
                dist.tables() == 0 && dist.customers() == 0,
                "Transition distribution {} still holds {} tables.",
                class,
                dist.tables()
            );
        }
        for (class, dist) in self.emissions.iter().enumerate() {
            assert!(
                dist.tables() == 0 && dist.customers() == 0,
                "Emission distribution {} still holds {} tables.",
                class,
                dist.tables()
            );
        }
    }

    fn write_model(&self, out: &mut dyn Write) -> io::Result<()> {
        let t = &self.transitions[0];
        let e = &self.emissions[0];
        writeln!(out, "T str={} disc={}", t.strength().get(), t.discount().get())?;
        writeln!(out, "E str={} disc={}", e.strength().get(), e.discount().get())?;
        writeln!(out)?;
        writeln!(out, "class\tt_customers\tt_tables\te_customers\te_tables\te_types")?;
        for (class, (t, e)) in self.transitions.iter().zip(&self.emissions).enumerate() {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}",
                class,
                t.customers(),
                t.tables(),
                e.customers(),
                e.tables(),
                e.iter().count()
            )?;
        }
        let seating: f64 = self
            .transitions
            .iter()
            .map(|d| d.log_seating_prob())
            .chain(self.emissions.iter().map(|d| d.log_seating_prob()))
            .sum();
        writeln!(out)?;
        writeln!(out, "log seating probability: {}", seating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    #[test]
    fn test_remove_leaves_no_customers() {
        let mut rng = Pcg64Mcg::seed_from_u64(123);
        let mut model = HmmModel::new(2, uniform_base(2));
        let sentence = [0, 1, 0];
        let label = Classes::new(vec![2, 0, 2]);
        let added = model.add_sentence(0, &sentence, &label, &mut rng);
        assert!((added - (1.0_f64 / 18.0).ln()).abs() < 1e-12);
        assert_eq!(model.transition(2).total(0), 1);
        assert_eq!(model.emission(0).total(1), 1);
        let removed = model.remove_sentence(0, &sentence, &label, &mut rng);
        assert!((removed - added).abs() < 1e-12);
        assert_eq!(model.transition(2).total(0), 0);
        assert_eq!(model.transition(0).total(2), 0);
        assert_eq!(model.emission(0).total(1), 0);
        model.check_empty();
    }

    #[test]
    #[should_panic]
    fn test_double_remove_panics() {
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        let mut model = HmmModel::new(2, uniform_base(2));
        let label = Classes::new(vec![2, 1, 2]);
        model.add_sentence(0, &[0, 1, 0], &label, &mut rng);
        model.remove_sentence(0, &[0, 1, 0], &label, &mut rng);
        model.remove_sentence(0, &[0, 1, 0], &label, &mut rng);
    }

    #[test]
    fn test_proposal_is_exact_posterior_under_cache() {
        let mut rng = Pcg64Mcg::seed_from_u64(9);
        let n_words = 4;
        let mut model = HmmModel::new(2, uniform_base(n_words));
        let others = [
            (vec![0, 1, 2, 0], vec![2, 0, 1, 2]),
            (vec![0, 2, 2, 3, 0], vec![2, 1, 1, 0, 2]),
            (vec![0, 3, 1, 0], vec![2, 0, 0, 2]),
        ];
        for (sid, (s, l)) in others.iter().enumerate() {
            model.add_sentence(sid + 1, s, &Classes::new(l.clone()), &mut rng);
        }
        model.cache_probabilities();
        let sentence = [0, 1, 3, 0];
        let cl = 3;
        let mut log_q = Vec::new();
        let mut log_joint = Vec::new();
        for c1 in 0..2 {
            for c2 in 0..2 {
                let mut label = Classes::new(vec![2, c1, c2, 2]);
                let (q_old, _) = model.sample_sentence(0, &sentence, &mut label, &mut rng);
                log_q.push(q_old);
                let e = |c: usize, w: usize| model.emission(c).prob(w, 0.25).ln();
                log_joint.push(
                    model.log_transitions[2 * cl + c1]
                        + e(c1, 1)
                        + model.log_transitions[c1 * cl + c2]
                        + e(c2, 3)
                        + model.log_transitions[c2 * cl + 2],
                );
            }
        }
        let norm = log_sum_exp(&log_joint);
        for (q, j) in log_q.iter().zip(&log_joint) {
            assert!((q - (j - norm)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sampled_label_keeps_padding() {
        let mut rng = Pcg64Mcg::seed_from_u64(4);
        let mut model = HmmModel::new(3, uniform_base(5));
        model.cache_probabilities();
        let sentence = [0, 4, 2, 3, 0];
        let mut label = Classes::new(vec![3, 0, 0, 0, 3]);
        let (old, new) = model.sample_sentence(0, &sentence, &mut label, &mut rng);
        assert!(old.is_finite() && new.is_finite());
        assert_eq!(label.as_slice()[0], 3);
        assert_eq!(label.as_slice()[4], 3);
        assert!(label.as_slice()[1..4].iter().all(|c| *c < 3));
        // an empty model proposes uniformly
        assert!((old - 3.0 * (1.0_f64 / 3.0).ln()).abs() < 1e-9);
    }

    #[test]
    fn test_unigram_base() {
        let corpus = Corpus::load("a b a\nb\n".as_bytes(), true).unwrap();
        let base = unigram_base(&corpus);
        assert_eq!(base, vec![0.0, 0.5, 0.5]);
        let mut config = Config::hmm();
        config.set("base", "unigram").unwrap();
        config.set("classes", "4").unwrap();
        let model = HmmModel::from_config(&config, &corpus).unwrap();
        assert_eq!(model.n_classes(), 4);
        config.set("base", "zipf").unwrap();
        assert!(HmmModel::from_config(&config, &corpus).is_err());
    }

    #[test]
    fn test_sample_parameters_ties_classes() {
        let mut rng = Pcg64Mcg::seed_from_u64(5);
        let mut model = HmmModel::new(2, uniform_base(3));
        model.add_sentence(0, &[0, 1, 2, 1, 0], &Classes::new(vec![2, 0, 1, 0, 2]), &mut rng);
        model.sample_parameters(&mut rng);
        let s = model.transition(0).strength();
        assert!(model.transitions.iter().all(|d| d.strength() == s));
        let d = model.emission(0).discount();
        assert!(model.emissions.iter().all(|e| e.discount() == d));
    }
}
