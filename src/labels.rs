use crate::corpus::Corpus;
use crate::distr::Labeling;

use rand::Rng;
use std::io::{self, Write};
use std::ops::{Index, IndexMut};

/// Per-sentence labels, aligned with the sentences of a corpus.
#[derive(Debug, Clone, Default)]
pub struct Labels<L> {
    labels: Vec<L>,
}

impl<L: Labeling> Labels<L> {
    pub fn new(labels: Vec<L>) -> Self {
        Self { labels }
    }

    /// `n` unassigned labels.
    pub fn with_size(n: usize) -> Self {
        Self {
            labels: vec![L::default(); n],
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, L> {
        self.labels.iter()
    }

    /// A container of the same size holding copies of the labels of `ids` only.
    pub fn clone_subset(&self, ids: &[usize]) -> Self {
        let mut result = Self::with_size(self.len());
        for &id in ids {
            result.labels[id] = self.labels[id].clone();
        }
        result
    }

    /// Writes one line per sentence.
    pub fn write(&self, corpus: &Corpus, out: &mut dyn Write) -> io::Result<()> {
        for (index, label) in self.labels.iter().enumerate() {
            label.write_line(corpus.sentence(index), corpus, out)?;
        }
        Ok(())
    }
}

impl<L> Index<usize> for Labels<L> {
    type Output = L;

    fn index(&self, index: usize) -> &L {
        &self.labels[index]
    }
}

impl<L> IndexMut<usize> for Labels<L> {
    fn index_mut(&mut self, index: usize) -> &mut L {
        &mut self.labels[index]
    }
}

/// HMM state sequence of a padded sentence. Both ends carry the boundary
/// class, which is numbered after the ordinary classes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classes(Vec<usize>);

impl Classes {
    pub fn new(x: Vec<usize>) -> Self {
        Self(x)
    }

    /// Uniformly random inner classes for a padded sentence of length `len`.
    pub fn random<R: Rng + ?Sized>(len: usize, n_classes: usize, rng: &mut R) -> Self {
        assert!(len >= 2, "A padded sentence has at least two positions.");
        let mut x = vec![n_classes; len];
        for c in x.iter_mut().take(len - 1).skip(1) {
            *c = rng.random_range(0..n_classes);
        }
        Self(x)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0[..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [usize] {
        &mut self.0[..]
    }
}

impl Labeling for Classes {
    fn write_line(&self, _sentence: &[usize], _corpus: &Corpus, out: &mut dyn Write) -> io::Result<()> {
        let inner = match self.0.len() {
            0..=2 => &[][..],
            n => &self.0[1..n - 1],
        };
        let strings: Vec<String> = inner.iter().map(|c| c.to_string()).collect();
        writeln!(out, "{}", strings.join(" "))
    }
}

/// Word boundaries of a sentence: `bounds[i]` is true iff a word ends after
/// character `i`. The last entry is always true.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bounds(Vec<bool>);

impl Bounds {
    pub fn new(x: Vec<bool>) -> Self {
        assert!(
            x.last().map_or(true, |b| *b),
            "The last character must end a word."
        );
        Self(x)
    }

    /// Fair coin boundaries, forcing one wherever a word would grow beyond
    /// `max_len` characters.
    pub fn random<R: Rng + ?Sized>(len: usize, max_len: usize, rng: &mut R) -> Self {
        assert!(max_len >= 1, "Maximum word length must be at least one.");
        let mut x = Vec::with_capacity(len);
        let mut start = 0;
        for i in 0..len {
            let b = i + 1 == len || i + 1 - start == max_len || rng.random_bool(0.5);
            if b {
                start = i + 1;
            }
            x.push(b);
        }
        Self(x)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0[..]
    }

    /// Half-open character spans of the words, in order.
    pub fn words(&self) -> Vec<(usize, usize)> {
        let mut result = Vec::new();
        let mut start = 0;
        for (i, b) in self.0.iter().enumerate() {
            if *b {
                result.push((start, i + 1));
                start = i + 1;
            }
        }
        result
    }
}

impl Labeling for Bounds {
    fn write_line(&self, sentence: &[usize], corpus: &Corpus, out: &mut dyn Write) -> io::Result<()> {
        let mut line = String::new();
        for (i, id) in sentence.iter().enumerate() {
            if i > 0 && self.0[i - 1] {
                line.push(' ');
            }
            line.push_str(corpus.symbol(*id));
        }
        writeln!(out, "{}", line)
    }
}
