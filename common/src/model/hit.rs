use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Id stored for `home` hits; zero reads as "missing" in the key scheme.
pub const HOME_RESOURCE_ID: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Movie,
    List,
    Home,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Movie => "movie",
            ResourceType::List => "list",
            ResourceType::Home => "home",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A beacon after classification, ready for aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedHit {
    pub resource_type: ResourceType,
    pub resource_id: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub response_time: Decimal,
    pub client_timestamp: String,
    /// Wall-clock time the line was classified.
    pub ingested_at: DateTime<Local>,
}

impl ClassifiedHit {
    /// Builds a hit, forcing the home sentinel id for `home` pages.
    pub fn new(
        resource_type: ResourceType,
        resource_id: u64,
        response_time: Decimal,
        client_timestamp: impl Into<String>,
        ingested_at: DateTime<Local>,
    ) -> Self {
        let resource_id = match resource_type {
            ResourceType::Home => HOME_RESOURCE_ID,
            _ => resource_id,
        };
        Self {
            resource_type,
            resource_id,
            response_time,
            client_timestamp: client_timestamp.into(),
            ingested_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Max,
    Avg,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Max => "max",
            UpdateKind::Avg => "avg",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub kind: UpdateKind,
    pub hit: ClassifiedHit,
}

impl UpdateRequest {
    pub fn new(kind: UpdateKind, hit: ClassifiedHit) -> Self {
        Self { kind, hit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn home_hits_always_carry_sentinel_id() {
        let hit = ClassifiedHit::new(
            ResourceType::Home,
            0,
            Decimal::from_str("1.5").unwrap(),
            "",
            Local::now(),
        );
        assert_eq!(hit.resource_id, HOME_RESOURCE_ID);
    }

    #[test]
    fn movie_hits_keep_their_id() {
        let hit = ClassifiedHit::new(
            ResourceType::Movie,
            42,
            Decimal::from_str("1.5").unwrap(),
            "",
            Local::now(),
        );
        assert_eq!(hit.resource_id, 42);
    }

    #[test]
    fn update_request_serializes_kind_lowercase() {
        let hit = ClassifiedHit::new(
            ResourceType::List,
            7,
            Decimal::from_str("0.25").unwrap(),
            "1700000000",
            Local::now(),
        );
        let json = serde_json::to_value(UpdateRequest::new(UpdateKind::Avg, hit)).unwrap();
        assert_eq!(json["kind"], "avg");
        assert_eq!(json["hit"]["resource_type"], "list");
        assert_eq!(json["hit"]["response_time"], "0.25");
    }
}
