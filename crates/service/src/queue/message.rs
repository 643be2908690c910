//! Decoding of proof-ready messages.

use proofgen_core::BatchType;
use serde::Deserialize;

use crate::error::ProcessError;

/// Body of `cal_batch` and `btc_batch` messages.
#[derive(Debug, Deserialize)]
struct ReadyBody {
    hash_ids: Vec<String>,
}

/// A decoded proof-ready event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    /// Calendar anchoring completed for these hash_ids.
    CalBatch(Vec<String>),
    /// Bitcoin anchoring completed for these hash_ids.
    BtcBatch(Vec<String>),
    /// Ethereum anchoring completed. No Ethereum branch is assembled yet.
    EthPlaceholder,
    /// Any other type tag.
    Unknown(String),
}

impl BatchEvent {
    /// Decode a delivery.
    ///
    /// The body is only read for batch types that need it.
    pub fn decode(msg_type: &str, body: &[u8]) -> Result<Self, ProcessError> {
        let batch_type = match msg_type.parse::<BatchType>() {
            Ok(batch_type) => batch_type,
            Err(_) => return Ok(BatchEvent::Unknown(msg_type.to_string())),
        };

        match batch_type {
            BatchType::Eth => Ok(BatchEvent::EthPlaceholder),
            BatchType::CalBatch => Ok(BatchEvent::CalBatch(hash_ids(body)?)),
            BatchType::BtcBatch => Ok(BatchEvent::BtcBatch(hash_ids(body)?)),
        }
    }

    /// Batch type, if recognised.
    pub fn batch_type(&self) -> Option<BatchType> {
        match self {
            BatchEvent::CalBatch(_) => Some(BatchType::CalBatch),
            BatchEvent::BtcBatch(_) => Some(BatchType::BtcBatch),
            BatchEvent::EthPlaceholder => Some(BatchType::Eth),
            BatchEvent::Unknown(_) => None,
        }
    }
}

fn hash_ids(body: &[u8]) -> Result<Vec<String>, ProcessError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| ProcessError::Malformed(format!("body is not UTF-8: {}", e)))?;
    let parsed: ReadyBody = serde_json::from_str(text)
        .map_err(|e| ProcessError::Malformed(format!("body is not {{\"hash_ids\": [..]}}: {}", e)))?;
    Ok(parsed.hash_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_batches() {
        let body = br#"{"hash_ids":["h1","h2"]}"#;
        assert_eq!(
            BatchEvent::decode("cal_batch", body).unwrap(),
            BatchEvent::CalBatch(vec!["h1".to_string(), "h2".to_string()])
        );
        assert_eq!(
            BatchEvent::decode("btc_batch", body).unwrap(),
            BatchEvent::BtcBatch(vec!["h1".to_string(), "h2".to_string()])
        );
    }

    #[test]
    fn test_eth_and_unknown_ignore_body() {
        assert_eq!(BatchEvent::decode("eth", b"garbage").unwrap(), BatchEvent::EthPlaceholder);
        assert_eq!(
            BatchEvent::decode("anchor_ltc", b"garbage").unwrap(),
            BatchEvent::Unknown("anchor_ltc".to_string())
        );
        assert_eq!(BatchEvent::Unknown("x".to_string()).batch_type(), None);
    }

    #[test]
    fn test_malformed_body() {
        for body in [&b"not json"[..], &br#"{"ids":[]}"#[..], &[0xff, 0xfe][..]] {
            assert!(matches!(
                BatchEvent::decode("cal_batch", body),
                Err(ProcessError::Malformed(_))
            ));
        }
    }
}
