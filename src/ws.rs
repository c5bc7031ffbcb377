// Unsupervised word segmentation with a hierarchical Pitman-Yor word model

use crate::config::Config;
use crate::corpus::{Corpus, SymbolTable};
use crate::distr::{Membership, Model};
use crate::error::Result;
use crate::hpylm::{HierarchicalLm, NodeId, ROOT};
use crate::labels::Bounds;
use crate::numeric::{log_sum_exp, normalize_log_probs, sample_index};
use crate::prelude::*;
use crate::pyp::HyperPrior;

use rand::Rng;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Id of the empty word, emitted once at the end of every sentence and used
/// as the context of its first word.
pub const EDGE_WORD: usize = 0;

/// A lattice state: the language model context reached at a position.
#[derive(Debug, Clone)]
pub struct SegHyp {
    pub node: NodeId,
    pub log_prob: f64,
    /// Back links as `(position, context)` of the preceding state.
    pub links: Vec<(usize, NodeId)>,
    pub link_log_probs: Vec<f64>,
}

impl SegHyp {
    fn new(node: NodeId) -> Self {
        Self {
            node,
            log_prob: f64::NEG_INFINITY,
            links: Vec::new(),
            link_log_probs: Vec::new(),
        }
    }
}

/// All lattice states ending at one position.
pub type Stack = BTreeMap<NodeId, SegHyp>;

/// Word n-gram model over character sequences whose words are drawn from a
/// length-geometric base measure.
#[derive(Debug, Clone)]
pub struct WsModel {
    max_len: usize,
    bases: Vec<f64>,
    lm: HierarchicalLm,
    words: SymbolTable<Vec<usize>>,
    prior: HyperPrior,
    included: Membership,
}

impl WsModel {
    pub fn new(order: usize, max_len: usize, n_chars: usize, avg_len: f64) -> Self {
        assert!(max_len > 0, "Maximum word length must be positive.");
        assert!(n_chars > 0, "No characters in the corpus.");
        assert!(avg_len > 0.0, "Average word length must be positive.");
        let mut bases = Vec::with_capacity(max_len + 1);
        bases.push(1.0 / (1.0 + avg_len));
        let per_char = avg_len / (1.0 + avg_len) / n_chars as f64;
        for len in 1..=max_len {
            bases.push(bases[len - 1] * per_char);
        }
        let mut words = SymbolTable::new();
        words.get_or_insert(Vec::new());
        Self {
            max_len,
            bases,
            lm: HierarchicalLm::new(order, Strength::new(0.1), Discount::new(0.0)),
            words,
            prior: HyperPrior::default(),
            included: Membership::default(),
        }
    }

    pub fn with_parameters(mut self, strength: Strength, discount: Discount, prior: HyperPrior) -> Self {
        self.lm = HierarchicalLm::new(self.lm.order(), strength, discount);
        self.prior = prior;
        self
    }

    pub fn from_config(config: &Config, corpus: &Corpus) -> Result<Self> {
        let discount = config.get_discount("disc")?;
        Ok(Self::new(
            config.get_positive("n")?,
            config.get_positive("maxlen")?,
            corpus.vocab_size(),
            config.get_double("avglen")?,
        )
        .with_parameters(
            config.get_strength("str", discount)?,
            discount,
            config.get_hyper_prior(["stra", "strb", "disca", "discb"])?,
        ))
    }

    pub fn lm(&self) -> &HierarchicalLm {
        &self.lm
    }

    pub fn n_words(&self) -> usize {
        self.words.len()
    }

    /// Base probability of a word of `len` characters.
    pub fn base(&self, len: usize) -> f64 {
        self.bases[len]
    }

    fn word_spans(&self, sid: usize, sentence: &[usize], bounds: &Bounds) -> Vec<(usize, usize)> {
        assert_eq!(
            sentence.len(),
            bounds.len(),
            "Sentence {} has {} characters but {} bounds.",
            sid,
            sentence.len(),
            bounds.len()
        );
        let spans = bounds.words();
        for (start, end) in &spans {
            assert!(
                end - start <= self.max_len,
                "Word of length {} in sentence {} exceeds maximum length {}.",
                end - start,
                sid,
                self.max_len
            );
        }
        spans
    }

    // Context reached after `word`; unknown words back off to the root.
    fn transition(&self, node: NodeId, word: Option<usize>) -> NodeId {
        match word {
            Some(word) => self.lm.next(node, word),
            None => ROOT,
        }
    }

    fn initial_node(&self) -> NodeId {
        self.lm.next(ROOT, EDGE_WORD)
    }

    fn forward(&self, sentence: &[usize]) -> Vec<Stack> {
        let len = sentence.len();
        let mut stacks: Vec<Stack> = vec![Stack::new(); len + 2];
        let init = self.initial_node();
        let mut hyp = SegHyp::new(init);
        hyp.log_prob = 0.0;
        stacks[0].insert(init, hyp);

        for end in 1..=len {
            let (done, rest) = stacks.split_at_mut(end);
            let next = &mut rest[0];
            for start in end.saturating_sub(self.max_len)..end {
                let word = self.words.id(&sentence[start..end]);
                let base = self.bases[end - start];
                for (node, hyp) in done[start].iter() {
                    let prob = match word {
                        Some(word) => self.lm.prob(*node, word, base),
                        None => self.lm.unseen_prob(*node, base),
                    };
                    let to = self.transition(*node, word);
                    let target = next.entry(to).or_insert_with(|| SegHyp::new(to));
                    target.links.push((start, *node));
                    target.link_log_probs.push(prob.ln() + hyp.log_prob);
                }
            }
            for hyp in next.values_mut() {
                hyp.log_prob = log_sum_exp(&hyp.link_log_probs);
            }
        }

        let (done, rest) = stacks.split_at_mut(len + 1);
        let mut last = SegHyp::new(ROOT);
        for (node, hyp) in done[len].iter() {
            let prob = self.lm.prob(*node, EDGE_WORD, self.bases[0]);
            last.links.push((len, *node));
            last.link_log_probs.push(prob.ln() + hyp.log_prob);
        }
        last.log_prob = log_sum_exp(&last.link_log_probs);
        rest[0].insert(ROOT, last);
        stacks
    }

    // Walks back from the final state. With an rng the path is sampled and
    // written to `bounds`; otherwise the path of `bounds` is scored.
    fn backward_step<R: Rng + ?Sized>(
        &self,
        sentence: &[usize],
        stacks: &[Stack],
        bounds: &mut Bounds,
        mut rng: Option<&mut R>,
    ) -> f64 {
        let len = sentence.len();
        let mut path = Vec::new();
        if rng.is_none() {
            let mut node = self.initial_node();
            path.push((0, node));
            for (start, end) in bounds.words() {
                node = self.transition(node, self.words.id(&sentence[start..end]));
                path.push((end, node));
            }
        }
        let mut new_bounds = vec![false; len];
        let mut log_prob = 0.0;
        let mut current = match stacks[len + 1].get(&ROOT) {
            Some(hyp) => hyp,
            None => panic!("Lattice has no final state."),
        };
        while !current.links.is_empty() {
            let mut weights = current.link_log_probs.clone();
            normalize_log_probs(&mut weights);
            let chosen = match rng.as_deref_mut() {
                Some(rng) => sample_index(&weights, rng),
                None => {
                    let step = path.pop();
                    match current.links.iter().position(|l| Some(*l) == step) {
                        Some(k) => k,
                        None => panic!("Could not find the path of the current segmentation in the lattice."),
                    }
                }
            };
            let (position, node) = current.links[chosen];
            if position != 0 {
                new_bounds[position - 1] = true;
            }
            log_prob += weights[chosen].ln();
            current = match stacks[position].get(&node) {
                Some(hyp) => hyp,
                None => panic!("Lattice state {} at position {} does not exist.", node, position),
            };
        }
        if rng.is_some() {
            *bounds = Bounds::new(new_bounds);
        }
        log_prob
    }
}

impl Model for WsModel {
    type Label = Bounds;

    fn random_label<R: Rng + ?Sized>(&self, sentence: &[usize], rng: &mut R) -> Bounds {
        Bounds::random(sentence.len(), self.max_len, rng)
    }

    fn add_sentence<R: Rng + ?Sized>(
        &mut self,
        sid: usize,
        sentence: &[usize],
        bounds: &Bounds,
        rng: &mut R,
    ) -> f64 {
        let spans = self.word_spans(sid, sentence, bounds);
        self.included.insert(sid);
        let mut seq: Vec<usize> = spans
            .iter()
            .map(|(start, end)| self.words.get_or_insert(sentence[*start..*end].to_vec()))
            .collect();
        seq.push(EDGE_WORD);
        let mut lengths: Vec<usize> = spans.iter().map(|(s, e)| e - s).collect();
        lengths.push(0);

        let mut node = self.lm.next_or_insert(ROOT, EDGE_WORD);
        let mut log_prob = 0.0;
        for (i, (word, len)) in seq.iter().zip(&lengths).enumerate() {
            log_prob += self.lm.add_customer(node, *word, self.bases[*len], rng).ln();
            if i + 1 < seq.len() {
                node = self.lm.next_or_insert(node, *word);
            }
        }
        log_prob
    }

    fn remove_sentence<R: Rng + ?Sized>(
        &mut self,
        sid: usize,
        sentence: &[usize],
        bounds: &Bounds,
        rng: &mut R,
    ) -> f64 {
        let spans = self.word_spans(sid, sentence, bounds);
        self.included.remove(sid);
        let mut seq = Vec::with_capacity(spans.len() + 1);
        for (start, end) in &spans {
            match self.words.id(&sentence[*start..*end]) {
                Some(word) => seq.push((word, end - start)),
                None => panic!("Sentence {} contains a word that was never added.", sid),
            }
        }
        seq.push((EDGE_WORD, 0));

        // contexts are resolved up front since removal may reclaim them
        let mut nodes = Vec::with_capacity(seq.len());
        let mut node = self.initial_node();
        for (word, _) in &seq {
            nodes.push(node);
            node = self.lm.next(node, *word);
        }
        let mut log_prob = 0.0;
        for ((word, len), node) in seq.iter().zip(nodes) {
            log_prob += self.lm.remove_customer(node, *word, self.bases[*len], rng).ln();
        }
        log_prob
    }

    fn cache_probabilities(&mut self) {}

    fn sample_sentence<R: Rng + ?Sized>(
        &self,
        sid: usize,
        sentence: &[usize],
        bounds: &mut Bounds,
        rng: &mut R,
    ) -> (f64, f64) {
        self.word_spans(sid, sentence, bounds);
        assert!(
            !self.included.contains(sid),
            "Sampling sentence {} which is still in the model.",
            sid
        );
        let stacks = self.forward(sentence);
        let old = self.backward_step::<R>(sentence, &stacks, bounds, None);
        let new = self.backward_step(sentence, &stacks, bounds, Some(rng));
        (old, new)
    }

    fn sample_parameters<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let unused: Vec<usize> = self
            .words
            .iter()
            .map(|(id, _)| id)
            .filter(|id| *id != EDGE_WORD && self.lm.customers(ROOT, *id) == 0)
            .collect();
        for id in unused {
            self.words.remove(id);
        }
        let sampled = self.lm.sample_hyperparameters(&self.prior, rng);
        for (depth, (strength, discount)) in sampled.iter().enumerate() {
            log::info!(
                "v({})={}, s({})={:.6}, d({})={:.6}",
                depth + 1,
                self.lm.level_size(depth),
                depth + 1,
                strength.get(),
                depth + 1,
                discount.get()
            );
        }
        log::debug!(
            "lmarr={}, vocabarr={}",
            self.lm.capacity(),
            self.words.capacity()
        );
    }

    fn check_empty(&self) {
        assert!(self.included.is_empty(), "Sentences remain in the model.");
        assert!(
            self.lm.is_empty(),
            "Language model is not empty: {} contexts, {} customers at the root.",
            self.lm.n_nodes(),
            self.lm.dist(ROOT).customers()
        );
    }

    fn write_model(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "words={}", self.words.len())?;
        writeln!(out, "depth\tcontexts\tstrength\tdiscount")?;
        for depth in 0..self.lm.order() {
            writeln!(
                out,
                "{}\t{}\t{}\t{}",
                depth,
                self.lm.level_size(depth),
                self.lm.strength(depth).get(),
                self.lm.discount(depth).get()
            )?;
        }
        Ok(())
    }
}
