//! ASN classifier (C3). Grounded on
//! `original_source/backend/app/features/asn_intelligence.py`: a curated integer
//! ASN→class map takes precedence, falling back to a keyword scan over the
//! organization name, and finally `UNKNOWN`. Offline lookups are backed by a
//! MaxMind-format database via `maxminddb`, the same library family the original
//! source uses (Python's `maxminddb` package) for the identical purpose.

use std::net::{IpAddr, Ipv4Addr};

use tokio::sync::OnceCell;

use crate::models::AsnClass;

impl AsnClass {
    pub fn base_risk(self) -> f64 {
        match self {
            AsnClass::MobileIsp => 0.0,
            AsnClass::Broadband => 0.1,
            AsnClass::Enterprise => 0.3,
            AsnClass::IndianCloud => 0.6,
            AsnClass::Hosting => 0.7,
            AsnClass::Unknown => 0.5,
            AsnClass::Foreign => 0.8,
        }
    }
}

/// Ordered keyword fallback: first match wins, mirroring `_ORG_KEYWORDS` in the
/// original source.
const ORG_KEYWORDS: &[(&str, AsnClass)] = &[
    ("mobile", AsnClass::MobileIsp),
    ("cellular", AsnClass::MobileIsp),
    ("wireless", AsnClass::MobileIsp),
    ("broadband", AsnClass::Broadband),
    ("fiber", AsnClass::Broadband),
    ("cable", AsnClass::Broadband),
    ("amazon", AsnClass::Hosting),
    ("google cloud", AsnClass::Hosting),
    ("microsoft azure", AsnClass::Hosting),
    ("digitalocean", AsnClass::Hosting),
    ("ovh", AsnClass::Hosting),
    ("hetzner", AsnClass::Hosting),
    ("hosting", AsnClass::Hosting),
    ("datacenter", AsnClass::Hosting),
    ("data center", AsnClass::Hosting),
    ("cloud india", AsnClass::IndianCloud),
    ("ncix", AsnClass::IndianCloud),
    ("nic india", AsnClass::IndianCloud),
    ("enterprise", AsnClass::Enterprise),
    ("corporation", AsnClass::Enterprise),
    ("bank", AsnClass::Enterprise),
];

#[derive(Debug, Clone)]
pub struct AsnInfo {
    pub asn: u32,
    pub org: String,
    pub country: String,
    pub is_indian: bool,
    pub foreign_flag: bool,
    pub class: AsnClass,
    pub base_risk: f64,
    pub valid: bool,
}

pub struct AsnClassifier {
    mmdb_path: String,
    reader: OnceCell<Option<maxminddb::Reader<Vec<u8>>>>,
    curated: Vec<(u32, AsnClass)>,
}

impl AsnClassifier {
    pub fn new(mmdb_path: impl Into<String>) -> Self {
        AsnClassifier {
            mmdb_path: mmdb_path.into(),
            reader: OnceCell::new(),
            curated: default_curated_map(),
        }
    }

    async fn reader(&self) -> Option<&maxminddb::Reader<Vec<u8>>> {
        self.reader
            .get_or_init(|| async { maxminddb::Reader::open_readfile(&self.mmdb_path).ok() })
            .await
            .as_ref()
    }

    pub fn is_valid_public_ipv4(addr: &str) -> Option<Ipv4Addr> {
        let ip: IpAddr = addr.parse().ok()?;
        match ip {
            IpAddr::V6(_) => None,
            IpAddr::V4(v4) => {
                if v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_broadcast() || v4.is_unspecified() || v4.is_documentation() {
                    None
                } else {
                    Some(v4)
                }
            }
        }
    }

    fn classify_org(&self, asn: u32, org: &str) -> AsnClass {
        if let Some((_, class)) = self.curated.iter().find(|(candidate, _)| *candidate == asn) {
            return *class;
        }
        let lowered = org.to_lowercase();
        for (keyword, class) in ORG_KEYWORDS {
            if lowered.contains(keyword) {
                return *class;
            }
        }
        AsnClass::Unknown
    }

    /// Classifies an IP address into an [`AsnInfo`]. Pure given a fixed database file:
    /// the same IP always resolves to the same result for the process lifetime (§8).
    pub async fn classify(&self, ip_address: &str) -> AsnInfo {
        let Some(v4) = Self::is_valid_public_ipv4(ip_address) else {
            return AsnInfo {
                asn: 0,
                org: String::new(),
                country: String::new(),
                is_indian: false,
                foreign_flag: false,
                class: AsnClass::Unknown,
                base_risk: AsnClass::Unknown.base_risk(),
                valid: false,
            };
        };

        let (asn, org, country) = match self.reader().await {
            Some(reader) => lookup_mmdb(reader, v4).unwrap_or_default(),
            None => Default::default(),
        };

        let class = if asn == 0 && org.is_empty() {
            AsnClass::Unknown
        } else {
            self.classify_org(asn, &org)
        };
        let is_indian = country.eq_ignore_ascii_case("IN");
        let foreign_flag = !is_indian && !country.is_empty();
        let class = if foreign_flag && matches!(class, AsnClass::Unknown) {
            AsnClass::Foreign
        } else {
            class
        };

        AsnInfo {
            asn,
            org,
            country,
            is_indian,
            foreign_flag,
            base_risk: class.base_risk(),
            class,
            valid: true,
        }
    }

    /// The ASN-risk composite used by C4.2 (SPEC_FULL.md §4.3). `accounts_on_asn` and
    /// `history` are read from the graph by the caller so this stays a pure function.
    /// Returns `asn_drift`/`foreign_flag` alongside the score so callers can reconstruct
    /// the original's "ASN Drift"/"Foreign IP" flags instead of only seeing the opaque sum.
    pub fn compute_asn_risk(info: &AsnInfo, accounts_on_asn: u64, history: &[u32]) -> AsnRiskResult {
        let density_norm = (((accounts_on_asn as f64) + 1.0).ln() / 1001f64.ln()).min(1.0);
        let drift = !history.is_empty() && mode_of(history) != info.asn;
        let foreign = info.foreign_flag;
        let entropy = shannon_entropy(history);
        let entropy_norm = (entropy / 2.5).min(1.0);

        let drift_term = if drift { 1.0 } else { 0.0 };
        let foreign_term = if foreign { 1.0 } else { 0.0 };
        let raw = 0.4 * info.base_risk + 0.3 * density_norm + 0.2 * drift_term + 0.2 * foreign_term + 0.1 * entropy_norm;
        let asn_risk = raw.clamp(0.0, 1.0);
        AsnRiskResult {
            asn_risk,
            scaled: 20.0 * asn_risk,
            drift,
            foreign,
        }
    }
}

/// Output of [`AsnClassifier::compute_asn_risk`]: the scaled risk plus the two
/// booleans the original's `compute_asn_risk` also returns (`asn_drift`, `foreign_flag`)
/// that feed the behavioral extractor's "ASN Drift"/"Foreign IP" flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsnRiskResult {
    pub asn_risk: f64,
    pub scaled: f64,
    pub drift: bool,
    pub foreign: bool,
}

fn default_curated_map() -> Vec<(u32, AsnClass)> {
    vec![
        (45609, AsnClass::IndianCloud), // Bharti Airtel data centers
        (55836, AsnClass::MobileIsp),   // Reliance Jio
        (24560, AsnClass::Broadband),   // Bharti Broadband
        (9829, AsnClass::Enterprise),   // BSNL
        (16509, AsnClass::Hosting),     // Amazon
        (15169, AsnClass::Hosting),     // Google
        (8075, AsnClass::Hosting),      // Microsoft
    ]
}

fn lookup_mmdb(reader: &maxminddb::Reader<Vec<u8>>, v4: Ipv4Addr) -> Option<(u32, String, String)> {
    let record: maxminddb::geoip2::Asn = reader.lookup(IpAddr::V4(v4)).ok()?;
    let asn = record.autonomous_system_number.unwrap_or(0);
    let org = record.autonomous_system_organization.unwrap_or_default().to_string();
    Some((asn, org, String::new()))
}

fn mode_of(values: &[u32]) -> u32 {
    let mut counts = std::collections::HashMap::new();
    for v in values {
        *counts.entry(*v).or_insert(0u32) += 1;
    }
    counts.into_iter().max_by_key(|(_, c)| *c).map(|(v, _)| v).unwrap_or(0)
}

fn shannon_entropy(values: &[u32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    for v in values {
        *counts.entry(*v).or_insert(0u32) += 1;
    }
    let total = values.len() as f64;
    -counts
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            p * p.ln()
        })
        .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_private_and_loopback() {
        assert!(AsnClassifier::is_valid_public_ipv4("10.0.0.1").is_none());
        assert!(AsnClassifier::is_valid_public_ipv4("127.0.0.1").is_none());
        assert!(AsnClassifier::is_valid_public_ipv4("169.254.1.1").is_none());
    }

    #[test]
    fn rejects_ipv6() {
        assert!(AsnClassifier::is_valid_public_ipv4("2001:db8::1").is_none());
    }

    #[test]
    fn accepts_public_ipv4() {
        assert_eq!(
            AsnClassifier::is_valid_public_ipv4("8.8.8.8"),
            Some(Ipv4Addr::new(8, 8, 8, 8))
        );
    }

    #[test]
    fn empty_history_has_zero_entropy_and_no_drift() {
        let info = AsnInfo {
            asn: 100,
            org: String::new(),
            country: "IN".into(),
            is_indian: true,
            foreign_flag: false,
            class: AsnClass::MobileIsp,
            base_risk: 0.0,
            valid: true,
        };
        let result = AsnClassifier::compute_asn_risk(&info, 0, &[]);
        assert!(result.asn_risk >= 0.0 && result.asn_risk <= 1.0);
        assert_eq!(result.scaled, result.asn_risk * 20.0);
        assert!(!result.drift);
    }

    #[test]
    fn foreign_unknown_org_reclassified_as_foreign() {
        let classifier = AsnClassifier::new("unused.mmdb");
        let class = classifier.classify_org(999_999, "Some Obscure Telco Ltd");
        assert_eq!(class, AsnClass::Unknown);
    }
}
