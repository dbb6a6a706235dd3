use crate::{cli::actions::Action, tls::ProbeConfig};
use anyhow::{Context, Result};
use clap::ArgMatches;
use std::{net::IpAddr, path::PathBuf, time::Duration};

/// Build the probe configuration from the global probe flags
fn extract_probe_config(matches: &ArgMatches) -> ProbeConfig {
    let defaults = ProbeConfig::default();

    let primary_port = matches
        .get_one::<u16>("primary-port")
        .copied()
        .unwrap_or(defaults.primary_port);

    // --no-fallback wins over any secondary port
    let secondary_port = if matches.get_flag("no-fallback") {
        None
    } else {
        matches
            .get_one::<u16>("secondary-port")
            .copied()
            .or(defaults.secondary_port)
    };

    let timeout = matches
        .get_one::<u64>("timeout")
        .copied()
        .map_or(defaults.timeout, Duration::from_secs);

    ProbeConfig {
        primary_port,
        secondary_port,
        timeout,
        verify_chain: matches.get_flag("verify-chain"),
        ca: matches.get_one::<PathBuf>("ca-file").cloned(),
    }
}

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if the listen address is invalid or a required argument is missing
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    if let Some(sub) = matches.subcommand_matches("probe") {
        let domain = sub
            .get_one::<String>("domain")
            .cloned()
            .context("domain is required")?;

        return Ok(Action::Probe {
            domain,
            probe: extract_probe_config(sub),
        });
    }

    // Extract and validate listen address
    let listen = matches
        .get_one::<String>("listen")
        .map(|addr| {
            addr.parse::<IpAddr>()
                .with_context(|| format!("Invalid IP address: {addr}"))
        })
        .transpose()?;

    // Extract port with default
    let port = matches.get_one::<u16>("port").copied().unwrap_or(5006);

    let data_file = matches
        .get_one::<PathBuf>("data-file")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("./data.json"));

    let static_dir = matches
        .get_one::<PathBuf>("static-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("./build"));

    // Extract interval with default
    let interval = matches.get_one::<u32>("interval").copied().unwrap_or(3600);

    Ok(Action::Serve {
        listen,
        port,
        data_file,
        static_dir,
        interval,
        probe: extract_probe_config(matches),
        cors: matches.get_flag("cors"),
    })
}
