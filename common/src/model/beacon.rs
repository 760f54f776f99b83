use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One unparsed access-log line.
///
/// `seq` is the position of the line in the tailed file; queue order follows it,
/// but classification workers may finish lines out of order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub seq: u64,
    pub text: String,
}

impl RawLine {
    pub fn new(seq: u64, text: impl Into<String>) -> Self {
        Self {
            seq,
            text: text.into(),
        }
    }
}

/// Client timing report carried on a `/dig?` tracking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    /// Page the client was on when it reported.
    pub url: String,
    /// Server response time taken from the backtick-delimited log field.
    #[serde(with = "rust_decimal::serde::str")]
    pub response_time: Decimal,
    /// Raw `time` query parameter as sent by the client.
    pub client_timestamp: String,
}
