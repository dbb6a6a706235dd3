use std::{path::PathBuf, time::Duration};

/// Port tried first for every probe
pub const DEFAULT_PRIMARY_PORT: u16 = 443;

/// Port tried once when the primary attempt yields no certificate
pub const DEFAULT_SECONDARY_PORT: u16 = 5010;

/// Upper bound for a single attempt (TCP connect + TLS handshake)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Certificate probe configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub primary_port: u16,
    /// `None` disables the fallback attempt
    pub secondary_port: Option<u16>,
    pub timeout: Duration,
    /// Validate the presented chain and hostname before reading the leaf.
    ///
    /// Off by default: the probe inspects whatever certificate the host
    /// presents, including self-signed and internal-CA certificates. A host
    /// whose chain is rejected counts as a failed attempt when enabled.
    pub verify_chain: bool,
    /// Extra trust anchors (PEM) added to the webpki roots when `verify_chain` is set
    pub ca: Option<PathBuf>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            primary_port: DEFAULT_PRIMARY_PORT,
            secondary_port: Some(DEFAULT_SECONDARY_PORT),
            timeout: DEFAULT_TIMEOUT,
            verify_chain: false,
            ca: None,
        }
    }
}

impl ProbeConfig {
    /// Ports in the order they are attempted
    pub fn ports(&self) -> impl Iterator<Item = u16> + use<> {
        std::iter::once(self.primary_port).chain(self.secondary_port)
    }
}
