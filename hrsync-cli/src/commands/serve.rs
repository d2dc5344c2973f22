//! `hrsync serve`: run the HTTP trigger in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use hrsync_core::Config;

/// Arguments for `hrsync serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address; overrides `server.bind` / `HRSYNC_BIND`.
    #[arg(long, value_name = "HOST:PORT")]
    pub addr: Option<String>,
}

impl ServeArgs {
    pub fn run(self, mut config: Config) -> Result<()> {
        if let Some(addr) = self.addr {
            config.server.bind = addr;
        }
        config
            .hrims
            .validate()
            .context("HRIMS connection is not configured")?;
        hrsync_server::start_blocking(&config).context("server exited with error")
    }
}
