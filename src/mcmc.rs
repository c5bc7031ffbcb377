use crate::config::{Config, SamplingMethod};
use crate::corpus::Corpus;
use crate::distr::Model;
use crate::error::Result;
use crate::labels::Labels;
use crate::numeric::bernoulli;
use crate::perm::Permutation;

use rand::prelude::*;
use rand_pcg::Pcg64Mcg;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

/// Settings of a training run.
#[derive(Debug, Clone)]
pub struct TrainerOptions {
    pub iters: usize,
    pub threads: usize,
    pub block_size: usize,
    pub shuffle: bool,
    pub skip_mh: bool,
    pub skip_iters: usize,
    pub print_model: bool,
    pub sampling_method: SamplingMethod,
    pub sample_hyperparameters: bool,
    /// Zero seeds from the operating system.
    pub seed: u64,
    /// Snapshot file prefix; no snapshots are written without one.
    pub prefix: Option<String>,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            iters: 10,
            threads: 1,
            block_size: 1,
            shuffle: false,
            skip_mh: false,
            skip_iters: 0,
            print_model: false,
            sampling_method: SamplingMethod::Sequence,
            sample_hyperparameters: false,
            seed: 0,
            prefix: None,
        }
    }
}

impl TrainerOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            iters: config.get_usize("iters")?,
            threads: config.get_positive("threads")?,
            block_size: config.get_positive("blocksize")?,
            shuffle: config.get_bool("shuffle")?,
            skip_mh: config.get_bool("skipmh")?,
            skip_iters: config.get_usize("skipiters")?,
            print_model: config.get_bool("printmod")?,
            sampling_method: config.sampling_method()?,
            sample_hyperparameters: config.get_bool("samphyp")?,
            seed: config.get_u64("randseed")?,
            prefix: None,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

/// Summary of one training iteration.
#[derive(Debug, Clone, Copy)]
pub struct IterationStats {
    pub iteration: usize,
    /// Log likelihood of the labels kept after each accept/reject decision.
    pub likelihood: f64,
    pub accepted: usize,
    pub sentences: usize,
    pub seconds: f64,
}

impl IterationStats {
    pub fn acceptance_rate(&self) -> f64 {
        if self.sentences == 0 {
            1.0
        } else {
            self.accepted as f64 / self.sentences as f64
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PassResult {
    likelihood: f64,
    accepted: Vec<usize>,
}

/// Whether snapshots are written after `iter`.
pub fn is_snapshot_iteration(iter: usize) -> bool {
    iter <= 50 || (iter <= 1000 && iter % 10 == 0) || iter % 50 == 0
}

fn accept<R: Rng + ?Sized>(log_ratio: f64, accept_all: bool, rng: &mut R) -> bool {
    accept_all || log_ratio >= 0.0 || bernoulli(log_ratio.exp(), rng)
}

// Resamples the sentences of `order` one at a time against `model`.
fn sampling_pass<M: Model, R: Rng + ?Sized>(
    model: &mut M,
    corpus: &Corpus,
    labels: &mut Labels<M::Label>,
    order: &[usize],
    accept_all: bool,
    rng: &mut R,
) -> PassResult {
    let mut result = PassResult::default();
    for &sid in order {
        let sentence = corpus.sentence(sid);
        let old_label = labels[sid].clone();
        let old_prob = model.remove_sentence(sid, sentence, &old_label, rng);
        model.cache_probabilities();
        let (old_q, new_q) = model.sample_sentence(sid, sentence, &mut labels[sid], rng);
        let new_prob = model.add_sentence(sid, sentence, &labels[sid], rng);
        let log_ratio = new_prob - old_prob + old_q - new_q;
        if accept(log_ratio, accept_all, rng) {
            log::trace!("sentence {}: log ratio {:.4}, accepted", sid, log_ratio);
            result.accepted.push(sid);
            result.likelihood += new_prob;
        } else {
            log::trace!("sentence {}: log ratio {:.4}, rejected", sid, log_ratio);
            model.remove_sentence(sid, sentence, &labels[sid], rng);
            labels[sid] = old_label;
            model.add_sentence(sid, sentence, &labels[sid], rng);
            result.likelihood += old_prob;
        }
    }
    result
}

/// Gibbs sampler with a Metropolis-Hastings correction over the sentences of
/// a corpus, owning the canonical model and labels.
pub struct Trainer<'a, M: Model> {
    corpus: &'a Corpus,
    model: M,
    labels: Labels<M::Label>,
    options: TrainerOptions,
    order: Permutation,
    sentence_accepted: Vec<usize>,
    initialized: bool,
    rng: Pcg64Mcg,
    pool: rayon::ThreadPool,
}

impl<'a, M: Model> Trainer<'a, M> {
    /// Starts from random labels drawn by the model.
    pub fn new(corpus: &'a Corpus, model: M, options: TrainerOptions) -> Result<Self> {
        let mut rng = if options.seed == 0 {
            Pcg64Mcg::from_rng(&mut rand::rng())
        } else {
            Pcg64Mcg::seed_from_u64(options.seed)
        };
        let labels = Labels::new(
            corpus
                .sentences()
                .iter()
                .map(|s| model.random_label(s, &mut rng))
                .collect(),
        );
        Self::with_labels(corpus, model, labels, options, rng)
    }

    pub fn with_labels(
        corpus: &'a Corpus,
        model: M,
        labels: Labels<M::Label>,
        options: TrainerOptions,
        rng: Pcg64Mcg,
    ) -> Result<Self> {
        assert_eq!(
            corpus.size(),
            labels.len(),
            "Corpus has {} sentences but {} labels.",
            corpus.size(),
            labels.len()
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build()?;
        Ok(Self {
            corpus,
            model,
            labels,
            order: Permutation::natural(corpus.size()),
            sentence_accepted: vec![0; corpus.size()],
            initialized: false,
            options,
            rng,
            pool,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn labels(&self) -> &Labels<M::Label> {
        &self.labels
    }

    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }

    /// Accepted proposals per sentence since the trainer was created.
    pub fn sentence_accepted(&self) -> &[usize] {
        &self.sentence_accepted[..]
    }

    /// Adds every sentence under its current label; returns the log likelihood.
    pub fn initialize(&mut self) -> f64 {
        assert!(!self.initialized, "Trainer is already initialized.");
        let mut likelihood = 0.0;
        for sid in 0..self.corpus.size() {
            let sentence = self.corpus.sentence(sid);
            likelihood += self
                .model
                .add_sentence(sid, sentence, &self.labels[sid], &mut self.rng);
        }
        self.initialized = true;
        log::info!("Likelihood after initialization: {}", likelihood);
        likelihood
    }

    /// Initializes, then runs every configured iteration.
    pub fn train(&mut self) -> Result<Vec<IterationStats>> {
        if !self.initialized {
            self.initialize();
        }
        log::info!(
            "Training for {} iterations ({} sampling, {} threads)",
            self.options.iters,
            self.options.sampling_method,
            self.options.threads
        );
        (1..=self.options.iters)
            .map(|iter| self.iterate(iter))
            .collect()
    }

    /// One sampling pass, snapshot and optional hyperparameter update.
    pub fn iterate(&mut self, iter: usize) -> Result<IterationStats> {
        assert!(self.initialized, "Trainer must be initialized before sampling.");
        if self.options.shuffle {
            self.order.shuffle(&mut self.rng);
        }
        let accept_all = self.options.skip_mh || iter <= self.options.skip_iters;
        let start = Instant::now();
        let result = match self.options.sampling_method {
            SamplingMethod::Sequence => self.train_in_sequence(accept_all),
            SamplingMethod::Parallel => self.train_in_parallel(accept_all),
            SamplingMethod::Block => self.train_in_blocks(accept_all),
        };
        let stats = IterationStats {
            iteration: iter,
            likelihood: result.likelihood,
            accepted: result.accepted.len(),
            sentences: self.corpus.size(),
            seconds: start.elapsed().as_secs_f64(),
        };
        assert!(
            !stats.likelihood.is_nan(),
            "NaN likelihood in iteration {}.",
            iter
        );
        for sid in result.accepted {
            self.sentence_accepted[sid] += 1;
        }
        self.write_snapshot(iter)?;
        log::info!(
            "Iteration {} (time: {:.3}s) likelihood: {:.4}, acceptance rate: {:.2}%",
            iter,
            stats.seconds,
            stats.likelihood,
            100.0 * stats.acceptance_rate()
        );
        if self.options.sample_hyperparameters {
            self.model.sample_parameters(&mut self.rng);
        }
        Ok(stats)
    }

    fn train_in_sequence(&mut self, accept_all: bool) -> PassResult {
        sampling_pass(
            &mut self.model,
            self.corpus,
            &mut self.labels,
            self.order.as_slice(),
            accept_all,
            &mut self.rng,
        )
    }

    // Each worker resamples its block against a private copy of the model;
    // the resulting labels then replace the canonical ones.
    fn train_in_parallel(&mut self, accept_all: bool) -> PassResult {
        let threads = self.options.threads;
        let seeds: Vec<u64> = (0..threads).map(|_| self.rng.random()).collect();
        let blocks = self.order.blocks(threads);
        let corpus = self.corpus;
        let model = &self.model;
        let labels = &self.labels;
        let outcomes: Vec<(Labels<M::Label>, PassResult)> = self.pool.install(|| {
            blocks
                .par_iter()
                .zip(seeds.par_iter())
                .map(|(block, seed)| {
                    let mut worker_model = model.clone();
                    let mut worker_labels = labels.clone_subset(block);
                    let mut rng = Pcg64Mcg::seed_from_u64(*seed);
                    let result = sampling_pass(
                        &mut worker_model,
                        corpus,
                        &mut worker_labels,
                        block,
                        accept_all,
                        &mut rng,
                    );
                    log::debug!(
                        "worker finished {} sentences, {} accepted",
                        block.len(),
                        result.accepted.len()
                    );
                    (worker_labels, result)
                })
                .collect()
        });

        let mut merged = PassResult::default();
        for (block, (mut worker_labels, result)) in blocks.iter().zip(outcomes) {
            for &sid in block.iter() {
                let sentence = corpus.sentence(sid);
                self.model
                    .remove_sentence(sid, sentence, &self.labels[sid], &mut self.rng);
                self.labels[sid] = std::mem::take(&mut worker_labels[sid]);
                merged.likelihood +=
                    self.model
                        .add_sentence(sid, sentence, &self.labels[sid], &mut self.rng);
            }
            merged.accepted.extend(result.accepted);
        }
        merged
    }

    // Each block is removed as a whole, its proposals are drawn in parallel
    // against the shared model, and one decision covers the whole block.
    fn train_in_blocks(&mut self, accept_all: bool) -> PassResult {
        let corpus = self.corpus;
        let threads = self.options.threads;
        let mut result = PassResult::default();
        for block in self.order.chunks(self.options.block_size) {
            let old_labels: Vec<M::Label> = block.iter().map(|&sid| self.labels[sid].clone()).collect();
            let mut old_prob = 0.0;
            for (&sid, label) in block.iter().zip(&old_labels) {
                old_prob +=
                    self.model
                        .remove_sentence(sid, corpus.sentence(sid), label, &mut self.rng);
            }
            self.model.cache_probabilities();

            let mut staged: Vec<(usize, M::Label)> =
                block.iter().copied().zip(old_labels.iter().cloned()).collect();
            let per_worker = staged.len().div_ceil(threads);
            let seeds: Vec<u64> = (0..staged.len().div_ceil(per_worker))
                .map(|_| self.rng.random())
                .collect();
            let model = &self.model;
            let (old_q, new_q) = self.pool.install(|| {
                staged
                    .par_chunks_mut(per_worker)
                    .zip(seeds.par_iter())
                    .map(|(chunk, seed)| {
                        let mut rng = Pcg64Mcg::seed_from_u64(*seed);
                        chunk.iter_mut().fold((0.0, 0.0), |(a, b), (sid, label)| {
                            let (x, y) =
                                model.sample_sentence(*sid, corpus.sentence(*sid), label, &mut rng);
                            (a + x, b + y)
                        })
                    })
                    .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1))
            });

            let mut new_prob = 0.0;
            for (sid, label) in &staged {
                new_prob +=
                    self.model
                        .add_sentence(*sid, corpus.sentence(*sid), label, &mut self.rng);
            }
            let log_ratio = new_prob - old_prob + old_q - new_q;
            if accept(log_ratio, accept_all, &mut self.rng) {
                log::trace!("block of {}: log ratio {:.4}, accepted", block.len(), log_ratio);
                for (sid, label) in staged {
                    self.labels[sid] = label;
                    result.accepted.push(sid);
                }
                result.likelihood += new_prob;
            } else {
                log::trace!("block of {}: log ratio {:.4}, rejected", block.len(), log_ratio);
                for (sid, label) in &staged {
                    self.model
                        .remove_sentence(*sid, corpus.sentence(*sid), label, &mut self.rng);
                }
                for &sid in block {
                    self.model
                        .add_sentence(sid, corpus.sentence(sid), &self.labels[sid], &mut self.rng);
                }
                result.likelihood += old_prob;
            }
        }
        result
    }

    fn write_snapshot(&self, iter: usize) -> Result<()> {
        let prefix = match &self.options.prefix {
            Some(prefix) if is_snapshot_iteration(iter) => prefix,
            _ => return Ok(()),
        };
        if self.options.print_model {
            let mut out = BufWriter::new(File::create(format!("{}.{}.mod", prefix, iter))?);
            self.model.write_model(&mut out)?;
            out.flush()?;
        }
        let mut out = BufWriter::new(File::create(format!("{}.{}.lab", prefix, iter))?);
        self.labels.write(self.corpus, &mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Removes every sentence and verifies that nothing is left behind.
    pub fn clear(&mut self) {
        if self.initialized {
            for sid in 0..self.corpus.size() {
                let sentence = self.corpus.sentence(sid);
                self.model
                    .remove_sentence(sid, sentence, &self.labels[sid], &mut self.rng);
            }
            self.initialized = false;
        }
        self.model.check_empty();
    }
}
