pub mod config;
pub mod corpus;
pub mod distr;
pub mod error;
pub mod hmm;
pub mod hpylm;
pub mod labels;
pub mod mcmc;
pub mod numeric;
pub mod perm;
pub mod prelude;
pub mod pyp;
pub mod tables;
pub mod ws;

#[cfg(test)]
pub mod testing;
