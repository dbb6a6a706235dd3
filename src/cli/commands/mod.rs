use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

/// Flags shared by `serve` and `probe` that shape a certificate probe
fn probe_args() -> Vec<Arg> {
    vec![
        Arg::new("timeout")
            .default_value("10")
            .env("CERTPULSE_TIMEOUT")
            .global(true)
            .help("seconds allowed for each connect and handshake attempt")
            .long("timeout")
            .short('t')
            .value_parser(clap::value_parser!(u64).range(1..)),
        Arg::new("primary-port")
            .default_value("443")
            .env("CERTPULSE_PRIMARY_PORT")
            .global(true)
            .help("port tried first when probing a domain")
            .long("primary-port")
            .value_parser(clap::value_parser!(u16).range(1..)),
        Arg::new("secondary-port")
            .default_value("5010")
            .env("CERTPULSE_SECONDARY_PORT")
            .global(true)
            .help("port tried once when the primary port yields no certificate")
            .long("secondary-port")
            .value_parser(clap::value_parser!(u16).range(1..)),
        Arg::new("no-fallback")
            .action(ArgAction::SetTrue)
            .env("CERTPULSE_NO_FALLBACK")
            .global(true)
            .help("never try the secondary port")
            .long("no-fallback"),
        Arg::new("verify-chain")
            .action(ArgAction::SetTrue)
            .env("CERTPULSE_VERIFY_CHAIN")
            .global(true)
            .help("reject certificates that do not chain to a trusted root")
            .long("verify-chain")
            .long_help(
                "Validate the presented chain and host name before reading the certificate.\n\n\
                By default certificates are only inspected: self-signed, untrusted and \
                mismatched certificates are still classified by their expiry date.\n\
                With this flag such hosts are reported as Invalid.\n\n\
                Trust anchors are the Mozilla roots bundled with webpki-roots, plus --ca-file.",
            ),
        Arg::new("ca-file")
            .env("CERTPULSE_CA_FILE")
            .global(true)
            .help("extra PEM trust anchors used with --verify-chain")
            .long("ca-file")
            .value_name("PATH")
            .value_parser(clap::value_parser!(std::path::PathBuf)),
    ]
}

/// Pure clap command definitions with zero business logic
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("listen")
                .env("CERTPULSE_LISTEN")
                .help("IP address to bind to (default: [::]:port, accepts both IPv6 and IPv4)")
                .long("listen")
                .long_help(
                    "IP address to bind to:\n\
                    Not specified (default) binds to [::]:port which accepts both IPv6 and IPv4 connections.\n\
                    Falls back to 0.0.0.0:port if IPv6 is unavailable.\n\n\
                    Specific IPv4 examples: '0.0.0.0', '127.0.0.1'\n\
                    Specific IPv6: '::', '::1'"
                )
                .short('l')
                .value_name("IP"),
        )
        .arg(
            Arg::new("port")
                .default_value("5006")
                .env("CERTPULSE_PORT")
                .help("listening port for the dashboard API")
                .long("port")
                .short('p')
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("data-file")
                .default_value("./data.json")
                .env("CERTPULSE_DATA_FILE")
                .help("JSON file holding the domain records")
                .long("data-file")
                .short('d')
                .value_name("PATH")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            Arg::new("static-dir")
                .default_value("./build")
                .env("CERTPULSE_STATIC_DIR")
                .help("directory with the built dashboard UI")
                .long("static-dir")
                .short('s')
                .value_name("PATH")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            Arg::new("interval")
                .default_value("3600")
                .env("CERTPULSE_INTERVAL")
                .help("seconds between background certificate sweeps (0 disables them)")
                .long("interval")
                .short('i')
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("cors")
                .action(ArgAction::SetTrue)
                .env("CERTPULSE_CORS")
                .help("answer cross-origin requests from any origin, with credentials")
                .long("cors"),
        )
        .args(probe_args())
        .arg(
            Arg::new("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("increase log verbosity (-v debug, -vv trace)")
                .long("verbose")
                .short('v'),
        )
        .subcommand(
            Command::new("probe")
                .about("probe one domain and print the result as JSON")
                .arg(
                    Arg::new("domain")
                        .help("host name or IP address to probe")
                        .required(true)
                        .value_name("DOMAIN"),
                ),
        )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_new() {
        let cmd = new();
        assert_eq!(cmd.get_name(), "certpulse");
        assert_eq!(
            cmd.get_about().unwrap().to_string(),
            env!("CARGO_PKG_DESCRIPTION")
        );
        assert_eq!(
            cmd.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_command_is_valid() {
        new().debug_assert();
    }

    #[test]
    fn test_new_defaults() {
        let m = new().try_get_matches_from(vec!["certpulse"]).unwrap();
        assert_eq!(m.get_one::<u16>("port").copied(), Some(5006));
        assert_eq!(m.get_one::<u32>("interval").copied(), Some(3600));
        assert_eq!(m.get_one::<u64>("timeout").copied(), Some(10));
        assert_eq!(m.get_one::<u16>("primary-port").copied(), Some(443));
        assert_eq!(m.get_one::<u16>("secondary-port").copied(), Some(5010));
        assert_eq!(
            m.get_one::<PathBuf>("data-file"),
            Some(&PathBuf::from("./data.json"))
        );
        assert_eq!(
            m.get_one::<PathBuf>("static-dir"),
            Some(&PathBuf::from("./build"))
        );
        assert!(!m.get_flag("no-fallback"));
        assert!(!m.get_flag("verify-chain"));
        assert!(!m.get_flag("cors"));
        assert_eq!(m.get_count("verbose"), 0);
        assert!(m.subcommand().is_none());
    }

    #[test]
    fn test_new_args_serve() {
        let m = new()
            .try_get_matches_from(vec![
                "certpulse",
                "--port",
                "8080",
                "--interval",
                "0",
                "--no-fallback",
                "--cors",
                "-vv",
            ])
            .unwrap();
        assert_eq!(m.get_one::<u16>("port").copied(), Some(8080));
        assert_eq!(m.get_one::<u32>("interval").copied(), Some(0));
        assert!(m.get_flag("no-fallback"));
        assert!(m.get_flag("cors"));
        assert_eq!(m.get_count("verbose"), 2);
    }

    #[test]
    fn test_new_probe_subcommand() {
        let m = new()
            .try_get_matches_from(vec![
                "certpulse",
                "probe",
                "example.com",
                "--primary-port",
                "8443",
                "--verify-chain",
            ])
            .unwrap();
        let (name, sub) = m.subcommand().unwrap();
        assert_eq!(name, "probe");
        assert_eq!(
            sub.get_one::<String>("domain"),
            Some(&String::from("example.com"))
        );
        assert_eq!(sub.get_one::<u16>("primary-port").copied(), Some(8443));
        assert!(sub.get_flag("verify-chain"));
    }

    #[test]
    fn test_new_probe_requires_domain() {
        assert!(
            new()
                .try_get_matches_from(vec!["certpulse", "probe"])
                .is_err()
        );
    }

    #[test]
    fn test_new_rejects_zero_timeout() {
        assert!(
            new()
                .try_get_matches_from(vec!["certpulse", "--timeout", "0"])
                .is_err()
        );
    }
}
