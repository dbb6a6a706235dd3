mod run;

use crate::tls::ProbeConfig;
use std::{net::IpAddr, path::PathBuf};

/// Action enum representing each possible command
#[derive(Debug)]
pub enum Action {
    Serve {
        listen: Option<IpAddr>,
        port: u16,
        data_file: PathBuf,
        static_dir: PathBuf,
        interval: u32,
        probe: ProbeConfig,
        cors: bool,
    },
    Probe {
        domain: String,
        probe: ProbeConfig,
    },
}

impl Action {
    /// Execute the action
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails to execute
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
