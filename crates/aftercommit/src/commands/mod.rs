mod config;
mod demo;

use aftercommit_config::Settings;
use clap::Subcommand;

use crate::error::Result;

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Register a customer inside a unit of work and run its deferred actions
    Demo(demo::DemoArgs),
    /// Print the effective settings and where they came from
    Config,
}

impl Commands {
    pub(crate) fn execute(self, settings: &Settings) -> Result<()> {
        match self {
            Self::Demo(args) => demo::run(&args, settings),
            Self::Config => {
                config::run(settings);
                Ok(())
            }
        }
    }
}
