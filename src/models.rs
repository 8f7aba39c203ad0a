//! Canonical domain types shared by every component: the wire schema for inbound
//! transactions, the graph-entity enums, and the few response shapes the write-back
//! path produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxnType {
    Pay,
    Collect,
    Mandate,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    Android,
    Ios,
    Web,
    Unknown,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CredentialType {
    Pin,
    Otp,
    Biometric,
    Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CredentialSubType {
    Mpin,
    Upin,
    Aadhaar,
    Card,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReceiverType {
    Person,
    Merchant,
    Biller,
    #[serde(rename = "SELF")]
    SelfTransfer,
}

/// Risk level a scored transaction is bucketed into. The original source's `CRITICAL`
/// variant is dropped: the documented threshold ladder (SPEC_FULL.md §4.6) can never
/// produce it. See DESIGN.md, open question 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Flagged,
    Blocked,
}

/// Network classes produced by the ASN classifier (C3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AsnClass {
    MobileIsp,
    Broadband,
    Enterprise,
    IndianCloud,
    Hosting,
    Unknown,
    Foreign,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderDevice {
    pub device_id: Option<String>,
    pub device_os: Option<String>,
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    pub app_version: Option<String>,
    pub capability_mask: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderNetwork {
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderGeo {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sender {
    pub sender_id: String,
    pub upi_id: Option<String>,
    #[serde(default)]
    pub device: Option<SenderDevice>,
    #[serde(default)]
    pub network: Option<SenderNetwork>,
    #[serde(default)]
    pub geo: Option<SenderGeo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "type")]
    pub credential_type: Option<CredentialType>,
    pub sub_type: Option<CredentialSubType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Receiver {
    pub receiver_id: String,
    pub upi_id: Option<String>,
    pub receiver_type: Option<ReceiverType>,
    pub mcc_code: Option<String>,
}

/// The canonical transaction payload, as republished by C7 onto the processing log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInput {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub amount: f64,
    pub currency: String,
    pub txn_type: TxnType,
    pub sender: Sender,
    #[serde(default)]
    pub credential: Option<Credential>,
    pub receiver: Receiver,
    #[serde(default)]
    pub _meta: serde_json::Map<String, serde_json::Value>,
}

impl TransactionInput {
    pub fn sender_id(&self) -> &str {
        &self.sender.sender_id
    }

    pub fn receiver_id(&self) -> &str {
        &self.receiver.receiver_id
    }

    /// Defaults to the original source's own placeholder when the sender omits a device.
    pub fn device_id(&self) -> &str {
        self.sender
            .device
            .as_ref()
            .and_then(|d| d.device_id.as_deref())
            .unwrap_or("UNKNOWN_DEVICE")
    }

    pub fn device_os(&self) -> Option<&str> {
        self.sender.device.as_ref().and_then(|d| d.device_os.as_deref())
    }

    pub fn device_type(&self) -> DeviceType {
        self.sender
            .device
            .as_ref()
            .and_then(|d| d.device_type)
            .unwrap_or_default()
    }

    pub fn capability_mask(&self) -> Option<&str> {
        self.sender
            .device
            .as_ref()
            .and_then(|d| d.capability_mask.as_deref())
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.sender
            .network
            .as_ref()
            .and_then(|n| n.ip_address.as_deref())
    }

    pub fn sender_lat(&self) -> Option<f64> {
        self.sender.geo.as_ref().and_then(|g| g.lat)
    }

    pub fn sender_lon(&self) -> Option<f64> {
        self.sender.geo.as_ref().and_then(|g| g.lon)
    }

    pub fn credential_sub_type(&self) -> Option<CredentialSubType> {
        self.credential.as_ref().and_then(|c| c.sub_type)
    }

    /// Basic shape validation used by C7 before the event is republished. Does not
    /// touch the graph; pure syntactic/domain checks only.
    pub fn validate(&self) -> Result<(), String> {
        if self.tx_id.trim().is_empty() {
            return Err("tx_id is empty".into());
        }
        if self.amount <= 0.0 {
            return Err(format!("amount must be > 0, got {}", self.amount));
        }
        if self.sender.sender_id.trim().is_empty() {
            return Err("sender.sender_id is empty".into());
        }
        if self.receiver.receiver_id.trim().is_empty() {
            return Err("receiver.receiver_id is empty".into());
        }
        Ok(())
    }
}

/// Result of scoring a transaction, written back onto the Transaction node and used
/// to build the alert payload.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResult {
    pub tx_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub status: TransactionStatus,
    pub reason: String,
    pub flags: Vec<String>,
    pub sub_scores: SubScores,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SubScores {
    pub graph: f64,
    pub behavioral: f64,
    pub device: f64,
    pub dormancy: f64,
    pub velocity: f64,
}

impl RiskLevel {
    pub fn from_score(score: f64, high: f64, medium: f64) -> Self {
        if score >= high {
            RiskLevel::High
        } else if score >= medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn status(self) -> TransactionStatus {
        match self {
            RiskLevel::High => TransactionStatus::Blocked,
            RiskLevel::Medium => TransactionStatus::Flagged,
            RiskLevel::Low => TransactionStatus::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_thresholds_match_status_invariant() {
        assert_eq!(RiskLevel::from_score(70.0, 70.0, 40.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(69.9, 70.0, 40.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(40.0, 70.0, 40.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(39.9, 70.0, 40.0), RiskLevel::Low);
        assert_eq!(RiskLevel::High.status(), TransactionStatus::Blocked);
        assert_eq!(RiskLevel::Medium.status(), TransactionStatus::Flagged);
        assert_eq!(RiskLevel::Low.status(), TransactionStatus::Completed);
    }

    #[test]
    fn device_id_defaults_when_missing() {
        let tx = TransactionInput {
            tx_id: "t1".into(),
            timestamp: Utc::now(),
            amount: 10.0,
            currency: "INR".into(),
            txn_type: TxnType::Pay,
            sender: Sender {
                sender_id: "U1".into(),
                ..Default::default()
            },
            credential: None,
            receiver: Receiver {
                receiver_id: "U2".into(),
                ..Default::default()
            },
            _meta: Default::default(),
        };
        assert_eq!(tx.device_id(), "UNKNOWN_DEVICE");
        assert!(tx.validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_amount() {
        let mut tx = TransactionInput {
            tx_id: "t1".into(),
            timestamp: Utc::now(),
            amount: 0.0,
            currency: "INR".into(),
            txn_type: TxnType::Pay,
            sender: Sender {
                sender_id: "U1".into(),
                ..Default::default()
            },
            credential: None,
            receiver: Receiver {
                receiver_id: "U2".into(),
                ..Default::default()
            },
            _meta: Default::default(),
        };
        assert!(tx.validate().is_err());
        tx.amount = -5.0;
        assert!(tx.validate().is_err());
    }
}
