use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use pgibbs::config::Config;
use pgibbs::corpus::Corpus;
use pgibbs::distr::Model;
use pgibbs::error::{PgibbsError, Result};
use pgibbs::hmm::HmmModel;
use pgibbs::mcmc::{Trainer, TrainerOptions};
use pgibbs::ws::WsModel;

use crate::logging::LogArgs;

/// Arguments shared by every model.
#[derive(clap::Args, Debug)]
pub struct TrainArgs {
    /// Corpus with one whitespace tokenized sentence per line.
    input: PathBuf,

    /// Prefix of the snapshot files PREFIX.ITER.lab and PREFIX.ITER.mod.
    prefix: String,

    /// Override an option, e.g. `-s iters=100`. A bare key sets it to true.
    #[arg(short, long = "set", value_name = "KEY=VALUE")]
    sets: Vec<String>,

    #[command(flatten)]
    pub logging: LogArgs,
}

/// Subcommands for pgibbs.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Unsupervised part-of-speech induction with a Pitman-Yor HMM.
    Hmm(TrainArgs),

    /// Unsupervised word segmentation with a hierarchical Pitman-Yor language model.
    Ws(TrainArgs),
}

/// Failure of a run; configuration errors are reported with the option listing.
pub enum RunError {
    Config(PgibbsError, String),
    Other(Box<dyn std::error::Error>),
}

impl Commands {
    pub fn logging(&self) -> &LogArgs {
        match self {
            Commands::Hmm(args) | Commands::Ws(args) => &args.logging,
        }
    }

    /// Run the subcommand.
    pub fn run(&self) -> std::result::Result<(), RunError> {
        match self {
            Commands::Hmm(args) => {
                let config = args.config(Config::hmm())?;
                let corpus = args.load(true)?;
                let model = HmmModel::from_config(&config, &corpus)
                    .map_err(|e| RunError::Config(e, config.usage()))?;
                args.train(&config, &corpus, model)
            }
            Commands::Ws(args) => {
                let config = args.config(Config::ws())?;
                let corpus = args.load(false)?;
                let model = WsModel::from_config(&config, &corpus)
                    .map_err(|e| RunError::Config(e, config.usage()))?;
                args.train(&config, &corpus, model)
            }
        }
    }
}

impl TrainArgs {
    fn config(&self, mut config: Config) -> std::result::Result<Config, RunError> {
        for s in &self.sets {
            if let Err(e) = config.set_from_str(s) {
                let usage = config.usage();
                return Err(RunError::Config(e, usage));
            }
        }
        for (key, value) in config.iter() {
            log::debug!("{} = {}", key, value);
        }
        Ok(config)
    }

    fn load(&self, pad: bool) -> std::result::Result<Corpus, RunError> {
        log::info!("Reading corpus from {}", self.input.display());
        let corpus = File::open(&self.input)
            .map_err(PgibbsError::from)
            .and_then(|f| Corpus::load(BufReader::new(f), pad))
            .map_err(|e| RunError::Other(Box::new(e)))?;
        log::info!(
            "Read {} sentences with {} distinct symbols",
            corpus.size(),
            corpus.vocab_size()
        );
        Ok(corpus)
    }

    fn train<M: Model>(
        &self,
        config: &Config,
        corpus: &Corpus,
        model: M,
    ) -> std::result::Result<(), RunError> {
        let options = TrainerOptions::from_config(config)
            .map_err(|e| RunError::Config(e, config.usage()))?
            .with_prefix(self.prefix.clone());
        let run = || -> Result<()> {
            let mut trainer = Trainer::new(corpus, model, options)?;
            trainer.train()?;
            trainer.clear();
            Ok(())
        };
        run().map_err(|e| RunError::Other(Box::new(e)))
    }
}
