use super::Action;
use crate::{server, tls::Prober};
use anyhow::Context;

/// Execute the action's business logic by delegating to the appropriate module
pub async fn execute(action: Action) -> anyhow::Result<()> {
    match action {
        Action::Serve {
            listen,
            port,
            data_file,
            static_dir,
            interval,
            probe,
            cors,
        } => server::start(listen, port, data_file, static_dir, interval, probe, cors).await,
        Action::Probe { domain, probe } => {
            let prober = Prober::new(probe).await?;
            let result = prober.probe(&domain).await;
            let output =
                serde_json::to_string_pretty(&result).context("failed to encode probe result")?;
            println!("{output}");
            Ok(())
        }
    }
}
