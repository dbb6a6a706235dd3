use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Certificates expiring within this many days are flagged as expiring soon
pub const EXPIRING_SOON_DAYS: i64 = 7;

/// Freshness classification of a presented certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateStatus {
    Valid,
    #[serde(rename = "Expiring Soon")]
    ExpiringSoon,
    Invalid,
}

impl CertificateStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::ExpiringSoon => "Expiring Soon",
            Self::Invalid => "Invalid",
        }
    }

    /// Prometheus label value
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::ExpiringSoon => "expiring_soon",
            Self::Invalid => "invalid",
        }
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a certificate by the time left before `not_after`
#[must_use]
pub fn classify(not_after: DateTime<Utc>, now: DateTime<Utc>) -> CertificateStatus {
    let remaining = not_after.signed_duration_since(now);
    if remaining <= Duration::zero() {
        CertificateStatus::Invalid
    } else if remaining <= Duration::days(EXPIRING_SOON_DAYS) {
        CertificateStatus::ExpiringSoon
    } else {
        CertificateStatus::Valid
    }
}

/// Leaf certificate fields read from the peer after the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    pub subject: String,
    pub issuer: String,
    pub not_after: DateTime<Utc>,
}

/// Outcome of probing one domain, as returned by `/check-ssl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateProbeResult {
    pub domain: String,
    pub has_valid_certificate: bool,
    pub valid_until: Option<DateTime<Utc>>,
    pub certificate_status: CertificateStatus,
}

impl CertificateProbeResult {
    /// Result for a host that presented a certificate expiring at `not_after`
    #[must_use]
    pub fn from_expiry(domain: &str, not_after: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let certificate_status = classify(not_after, now);
        Self {
            domain: domain.to_string(),
            has_valid_certificate: certificate_status.is_valid(),
            valid_until: Some(not_after),
            certificate_status,
        }
    }

    /// Result for a host that presented no certificate on any port
    #[must_use]
    pub fn unreachable(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            has_valid_certificate: false,
            valid_until: None,
            certificate_status: CertificateStatus::Invalid,
        }
    }

    /// Whole days left before expiry (negative once expired)
    #[must_use]
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.valid_until
            .map(|not_after| not_after.signed_duration_since(now).num_days())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_classify_valid() {
        assert_eq!(
            classify(now() + Duration::days(90), now()),
            CertificateStatus::Valid
        );
        assert_eq!(
            classify(now() + Duration::days(7) + Duration::seconds(1), now()),
            CertificateStatus::Valid
        );
    }

    #[test]
    fn test_classify_expiring_soon() {
        assert_eq!(
            classify(now() + Duration::days(3), now()),
            CertificateStatus::ExpiringSoon
        );
        assert_eq!(
            classify(now() + Duration::days(7), now()),
            CertificateStatus::ExpiringSoon
        );
        assert_eq!(
            classify(now() + Duration::seconds(1), now()),
            CertificateStatus::ExpiringSoon
        );
    }

    #[test]
    fn test_classify_invalid() {
        assert_eq!(classify(now(), now()), CertificateStatus::Invalid);
        assert_eq!(
            classify(now() - Duration::days(1), now()),
            CertificateStatus::Invalid
        );
    }

    #[test]
    fn test_from_expiry_keeps_invariant() {
        for days in [-30, -1, 0, 1, 3, 7, 8, 365] {
            let not_after = now() + Duration::days(days);
            let result = CertificateProbeResult::from_expiry("a.com", not_after, now());
            assert_eq!(result.valid_until, Some(not_after));
            if result.certificate_status.is_valid() {
                assert!(result.has_valid_certificate);
                assert!(result.valid_until.unwrap() > now());
            } else {
                assert!(!result.has_valid_certificate);
            }
        }
    }

    #[test]
    fn test_expired_certificate_reports_expiry() {
        let not_after = now() - Duration::days(2);
        let result = CertificateProbeResult::from_expiry("old.example.com", not_after, now());
        assert_eq!(result.certificate_status, CertificateStatus::Invalid);
        assert!(!result.has_valid_certificate);
        assert_eq!(result.valid_until, Some(not_after));
        assert_eq!(result.days_remaining(now()), Some(-2));
    }

    #[test]
    fn test_unreachable() {
        let result = CertificateProbeResult::unreachable("nowhere.invalid");
        assert_eq!(result.domain, "nowhere.invalid");
        assert!(!result.has_valid_certificate);
        assert!(result.valid_until.is_none());
        assert_eq!(result.certificate_status, CertificateStatus::Invalid);
        assert!(result.days_remaining(now()).is_none());
    }

    #[test]
    fn test_serialization_expiring_soon() {
        let result =
            CertificateProbeResult::from_expiry("a.com", now() + Duration::days(3), now());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "domain": "a.com",
                "hasValidCertificate": true,
                "validUntil": "2026-03-04T12:00:00Z",
                "certificateStatus": "Expiring Soon",
            })
        );
    }

    #[test]
    fn test_serialization_unreachable() {
        let value = serde_json::to_value(CertificateProbeResult::unreachable("a.com")).unwrap();
        assert_eq!(value["validUntil"], serde_json::Value::Null);
        assert_eq!(value["certificateStatus"], "Invalid");
        assert_eq!(value["hasValidCertificate"], false);
    }

    #[test]
    fn test_status_display_and_label() {
        assert_eq!(CertificateStatus::ExpiringSoon.to_string(), "Expiring Soon");
        assert_eq!(CertificateStatus::Valid.label(), "valid");
        assert_eq!(CertificateStatus::ExpiringSoon.label(), "expiring_soon");
        assert_eq!(CertificateStatus::Invalid.label(), "invalid");
    }

    #[test]
    fn test_status_deserialize() {
        let status: CertificateStatus = serde_json::from_str("\"Expiring Soon\"").unwrap();
        assert_eq!(status, CertificateStatus::ExpiringSoon);
    }
}
