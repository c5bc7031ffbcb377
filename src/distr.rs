use crate::corpus::Corpus;

use rand::Rng;
use std::io::{self, Write};

//

pub trait Labeling: Clone + Default + Send + Sync {
    fn write_line(&self, sentence: &[usize], corpus: &Corpus, out: &mut dyn Write) -> io::Result<()>;
}

//

/// A sequence model the trainer can resample.
///
/// Sentence probabilities returned by `add_sentence` and `remove_sentence`
/// are log probabilities under the collapsed model, so the pair of calls
/// around a sentence realizes one draw of its sequential predictive
/// likelihood. Adding a sentence twice or removing one that is not present
/// panics.
pub trait Model: Clone + Send + Sync {
    type Label: Labeling;

    /// A random starting label for `sentence`.
    fn random_label<R: Rng + ?Sized>(&self, sentence: &[usize], rng: &mut R) -> Self::Label;

    fn add_sentence<R: Rng + ?Sized>(
        &mut self,
        sid: usize,
        sentence: &[usize],
        label: &Self::Label,
        rng: &mut R,
    ) -> f64;

    fn remove_sentence<R: Rng + ?Sized>(
        &mut self,
        sid: usize,
        sentence: &[usize],
        label: &Self::Label,
        rng: &mut R,
    ) -> f64;

    /// Precomputes whatever `sample_sentence` reads. Called after sentences
    /// are removed and before any proposal is drawn.
    fn cache_probabilities(&mut self);

    /// Replaces `label` by a draw from the proposal distribution and returns
    /// the proposal log probabilities of the old and the new label.
    fn sample_sentence<R: Rng + ?Sized>(
        &self,
        sid: usize,
        sentence: &[usize],
        label: &mut Self::Label,
        rng: &mut R,
    ) -> (f64, f64);

    fn sample_parameters<R: Rng + ?Sized>(&mut self, rng: &mut R);

    /// Panics unless every restaurant of the model is empty.
    fn check_empty(&self);

    fn write_model(&self, out: &mut dyn Write) -> io::Result<()>;
}

//

/// Ids of the sentences currently seated in a model.
#[derive(Debug, Clone, Default)]
pub struct Membership(Vec<bool>);

impl Membership {
    pub fn insert(&mut self, sid: usize) {
        if sid >= self.0.len() {
            self.0.resize(sid + 1, false);
        }
        assert!(!self.0[sid], "Adding sentence {} which is already present.", sid);
        self.0[sid] = true;
    }

    pub fn remove(&mut self, sid: usize) {
        assert!(
            self.contains(sid),
            "Removing sentence {} which is not present.",
            sid
        );
        self.0[sid] = false;
    }

    pub fn contains(&self, sid: usize) -> bool {
        self.0.get(sid).copied().unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|x| *x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let mut m = Membership::default();
        assert!(m.is_empty());
        m.insert(3);
        assert!(m.contains(3));
        assert!(!m.contains(10));
        m.remove(3);
        assert!(m.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_double_remove_panics() {
        let mut m = Membership::default();
        m.insert(0);
        m.remove(0);
        m.remove(0);
    }

    #[test]
    #[should_panic]
    fn test_double_add_panics() {
        let mut m = Membership::default();
        m.insert(1);
        m.insert(1);
    }
}
