/// Logging setup arg group.
#[derive(clap::Args, Debug)]
pub struct LogArgs {
    /// Silence log messages.
    #[arg(short, long)]
    quiet: bool,

    /// Log per-worker (-v) and per-sentence (-vv) details.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl LogArgs {
    /// Installs the stderr logger at info level, raised by each `-v`.
    pub fn setup_logging(&self) -> Result<(), log::SetLoggerError> {
        stderrlog::new()
            .quiet(self.quiet)
            .verbosity(2 + self.verbose as usize)
            .init()
    }
}
