use crate::error::{PgibbsError, Result};
use crate::prelude::*;
use crate::pyp::HyperPrior;

use std::fmt;
use std::str::FromStr;

/// How the trainer schedules a sampling pass over the corpus.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SamplingMethod {
    /// One sentence at a time on the calling thread.
    Sequence,
    /// Independent passes over disjoint blocks on cloned models, merged afterwards.
    Parallel,
    /// Batches removed together, proposed in parallel, accepted or rejected jointly.
    Block,
}

impl FromStr for SamplingMethod {
    type Err = PgibbsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sequence" => Ok(Self::Sequence),
            "parallel" => Ok(Self::Parallel),
            "block" => Ok(Self::Block),
            _ => Err(PgibbsError::UnknownSamplingMethod(s.to_string())),
        }
    }
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sequence => "sequence",
            Self::Parallel => "parallel",
            Self::Block => "block",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: &'static str,
    value: String,
    description: &'static str,
}

/// Flat string-keyed options, kept in registration order.
#[derive(Debug, Clone)]
pub struct Config {
    entries: Vec<Entry>,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            entries: Vec::new(),
        };
        config.add("iters", "10", "The number of iterations to perform");
        config.add("threads", "1", "The number of threads to use");
        config.add("blocksize", "1", "The size of one block (for blocked sampling)");
        config.add("shuffle", "false", "Whether to shuffle the sentences every iteration");
        config.add("skipmh", "false", "Whether to skip the Metropolis-Hastings step");
        config.add("skipiters", "0", "Accept every proposal for this many initial iterations");
        config.add("printmod", "false", "Whether to print the model with every snapshot");
        config.add("sampmeth", "sequence", "Sampling method (sequence,parallel,block)");
        config.add("samphyp", "false", "Whether to sample the hyperparameters");
        config.add("randseed", "0", "Random seed (0 seeds from the operating system)");
        config
    }
}

impl Config {
    /// Options of the hidden Markov model.
    pub fn hmm() -> Self {
        let mut config = Self::default();
        config.add("classes", "10", "The number of classes to use");
        config.add("base", "uniform", "Emission base measure (uniform,unigram)");
        config.add("tstr", "0.1", "The strength of the transition distribution");
        config.add("estr", "0.1", "The strength of the emission distribution");
        config.add("tdisc", "0.0", "The discount of the transition distribution");
        config.add("edisc", "0.0", "The discount of the emission distribution");
        config.add("tstra", "1.0", "The Gamma shape for the transition strength");
        config.add("tstrb", "1.0", "The Gamma rate for the transition strength");
        config.add("tdisca", "1.0", "The Beta alpha for the transition discount");
        config.add("tdiscb", "1.0", "The Beta beta for the transition discount");
        config.add("estra", "1.0", "The Gamma shape for the emission strength");
        config.add("estrb", "1.0", "The Gamma rate for the emission strength");
        config.add("edisca", "1.0", "The Beta alpha for the emission discount");
        config.add("ediscb", "1.0", "The Beta beta for the emission discount");
        config
    }

    /// Options of the word segmentation model.
    pub fn ws() -> Self {
        let mut config = Self::default();
        config.add("n", "2", "The n-gram size of the language model");
        config.add("maxlen", "8", "The maximum length of a word");
        config.add("avglen", "2.0", "The average length of a word");
        config.add("str", "0.1", "The strength of the distribution");
        config.add("disc", "0.0", "The discount of the distribution");
        config.add("stra", "1.0", "The Gamma shape for the strength");
        config.add("strb", "1.0", "The Gamma rate for the strength");
        config.add("disca", "1.0", "The Beta alpha for the discount");
        config.add("discb", "1.0", "The Beta beta for the discount");
        config
    }

    fn add(&mut self, key: &'static str, value: &str, description: &'static str) {
        self.entries.push(Entry {
            key,
            value: value.to_string(),
            description,
        });
    }

    fn entry(&self, key: &str) -> Result<&Entry> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .ok_or_else(|| PgibbsError::UnknownOption(key.to_string()))
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.key == key)
            .ok_or_else(|| PgibbsError::UnknownOption(key.to_string()))?;
        entry.value = value.into();
        Ok(())
    }

    /// Applies `key=value`; a bare `key` sets the option to `true`.
    pub fn set_from_str(&mut self, s: &str) -> Result<()> {
        match s.split_once('=') {
            Some((key, value)) => self.set(key.trim(), value.trim()),
            None => self.set(s.trim(), "true"),
        }
    }

    pub fn get_string(&self, key: &str) -> Result<&str> {
        Ok(self.entry(key)?.value.as_str())
    }

    fn parse<T: FromStr>(&self, key: &str, expected: &'static str) -> Result<T> {
        let value = self.get_string(key)?;
        value.parse().map_err(|_| PgibbsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected,
        })
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.parse(key, "an integer")
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        self.parse(key, "a nonnegative integer")
    }

    pub fn get_u64(&self, key: &str) -> Result<u64> {
        self.parse(key, "a nonnegative integer")
    }

    pub fn get_double(&self, key: &str) -> Result<f64> {
        self.parse(key, "a float")
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.parse(key, "boolean")
    }

    pub fn sampling_method(&self) -> Result<SamplingMethod> {
        self.get_string("sampmeth")?.parse()
    }

    /// A value that must be at least one.
    pub fn get_positive(&self, key: &'static str) -> Result<usize> {
        let x = self.get_usize(key)?;
        if x == 0 {
            return Err(PgibbsError::InvalidParameter {
                key,
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(x)
    }

    pub fn get_discount(&self, key: &'static str) -> Result<Discount> {
        let x = self.get_double(key)?;
        Discount::try_new(x).ok_or_else(|| PgibbsError::InvalidParameter {
            key,
            reason: format!("{} is not in [0,1)", x),
        })
    }

    /// A strength, which must exceed the negative of `discount`.
    pub fn get_strength(&self, key: &'static str, discount: Discount) -> Result<Strength> {
        let x = self.get_double(key)?;
        Strength::try_new_with_variable_constraint(x, discount.get()).ok_or_else(|| {
            PgibbsError::InvalidParameter {
                key,
                reason: format!("{} is not greater than {}", x, -discount.get()),
            }
        })
    }

    /// The prior on `(strength, discount)` from four keys: the Gamma shape
    /// and rate of the strength, then the Beta parameters of the discount.
    pub fn get_hyper_prior(&self, keys: [&'static str; 4]) -> Result<HyperPrior> {
        let mut values = [0.0; 4];
        for (value, key) in values.iter_mut().zip(keys) {
            *value = self.get_double(key)?;
            if *value <= 0.0 {
                return Err(PgibbsError::InvalidParameter {
                    key,
                    reason: format!("{} is not positive", value),
                });
            }
        }
        HyperPrior::from_values(values[0], values[1], values[2], values[3]).ok_or(
            PgibbsError::InvalidParameter {
                key: keys[0],
                reason: "hyperprior parameters must be positive".to_string(),
            },
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.entries.iter().map(|e| (e.key, e.value.as_str()))
    }

    /// Option listing shown alongside configuration errors.
    pub fn usage(&self) -> String {
        let mut s = String::from("Options (set with -s key=value):\n");
        for e in &self.entries {
            s.push_str(&format!("  {:<10} {} [default: {}]\n", e.key, e.description, e.value));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::hmm();
        assert_eq!(config.get_usize("iters").unwrap(), 10);
        assert_eq!(config.get_int("randseed").unwrap(), 0);
        assert_eq!(config.get_usize("classes").unwrap(), 10);
        assert!(!config.get_bool("skipmh").unwrap());
        assert_eq!(config.sampling_method().unwrap(), SamplingMethod::Sequence);
        assert_eq!(config.get_double("tstr").unwrap(), 0.1);
        assert!(config
            .get_hyper_prior(["tstra", "tstrb", "tdisca", "tdiscb"])
            .is_ok());
        assert!(config
            .get_hyper_prior(["estra", "estrb", "edisca", "ediscb"])
            .is_ok());
        assert!(Config::ws().get_string("classes").is_err());
        assert_eq!(Config::ws().get_usize("maxlen").unwrap(), 8);
    }

    #[test]
    fn test_set_from_str() {
        let mut config = Config::ws();
        config.set_from_str("sampmeth=block").unwrap();
        config.set_from_str("shuffle").unwrap();
        config.set_from_str("n = 3").unwrap();
        assert_eq!(config.sampling_method().unwrap(), SamplingMethod::Block);
        assert!(config.get_bool("shuffle").unwrap());
        assert_eq!(config.get_usize("n").unwrap(), 3);
        assert!(matches!(
            config.set_from_str("bogus=1"),
            Err(PgibbsError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_bad_values() {
        let mut config = Config::hmm();
        config.set("sampmeth", "random").unwrap();
        assert!(matches!(
            config.sampling_method(),
            Err(PgibbsError::UnknownSamplingMethod(_))
        ));
        config.set("skipiters", "-2").unwrap();
        assert_eq!(config.get_int("skipiters").unwrap(), -2);
        assert!(config.get_usize("skipiters").is_err());
        config.set("iters", "ten").unwrap();
        assert!(matches!(
            config.get_usize("iters"),
            Err(PgibbsError::InvalidValue { .. })
        ));
        config.set("tdisc", "1.0").unwrap();
        assert!(config.get_discount("tdisc").is_err());
        config.set("tdisc", "0.5").unwrap();
        config.set("tstr", "-0.4").unwrap();
        let d = config.get_discount("tdisc").unwrap();
        assert_eq!(config.get_strength("tstr", d).unwrap().get(), -0.4);
        config.set("tstrb", "0").unwrap();
        assert!(config
            .get_hyper_prior(["tstra", "tstrb", "tdisca", "tdiscb"])
            .is_err());
        config.set("threads", "0").unwrap();
        assert!(config.get_positive("threads").is_err());
    }

    #[test]
    fn test_usage_lists_every_option() {
        let config = Config::ws();
        let usage = config.usage();
        for (key, _) in config.iter() {
            assert!(usage.contains(key));
        }
    }
}
