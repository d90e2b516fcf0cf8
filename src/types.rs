use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

/// Canonical availability record for one product at one retailer.
/// At most one exists per (sku, retailer_id); never deleted by this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub sku: String,
    pub retailer_id: String,
    pub name: String,
    pub brand: String,
    pub colorway: Option<String>,
    pub price: Option<f64>,
    pub status: ReleaseStatus,
    /// RFC3339 UTC instant.
    pub release_date: Option<chrono::DateTime<chrono::Utc>>,
    pub image_url: Option<String>,
    pub product_url: Option<String>,
    /// Current inventory by size/variant. None until a stock-bearing record arrives.
    pub live_stock: Option<StockMap>,
    /// Unix millis of the last live_stock overwrite.
    pub stock_updated_at: Option<i64>,
    /// Unix millis.
    pub created_at: i64,
    pub updated_at: i64,
}

/// Normalizer output: a Release minus the store-assigned timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseDraft {
    pub id: String,
    pub sku: String,
    pub retailer_id: String,
    pub name: String,
    pub brand: String,
    pub colorway: Option<String>,
    pub price: Option<f64>,
    pub status: ReleaseStatus,
    pub release_date: Option<chrono::DateTime<chrono::Utc>>,
    pub image_url: Option<String>,
    pub product_url: Option<String>,
    pub stock: Option<StockMap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStatus {
    Upcoming,
    Live,
    RaffleOpen,
    RaffleClosed,
    Restocked,
    SoldOut,
    Closed,
    Unknown,
}

impl ReleaseStatus {
    /// Map a raw adapter status string to the canonical enum.
    /// Unrecognized input degrades to Unknown — never an error.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "upcoming" | "announced" => ReleaseStatus::Upcoming,
            "live" | "available" | "released" | "in_stock" | "instock" | "active" => {
                ReleaseStatus::Live
            }
            "raffle" | "raffle_open" => ReleaseStatus::RaffleOpen,
            "raffle_closed" => ReleaseStatus::RaffleClosed,
            "restocked" | "restock" => ReleaseStatus::Restocked,
            "sold_out" | "soldout" | "oos" | "out_of_stock" => ReleaseStatus::SoldOut,
            "closed" | "ended" | "expired" => ReleaseStatus::Closed,
            _ => ReleaseStatus::Unknown,
        }
    }

    pub fn from_stored(s: &str) -> Self {
        match s {
            "UPCOMING" => ReleaseStatus::Upcoming,
            "LIVE" => ReleaseStatus::Live,
            "RAFFLE_OPEN" => ReleaseStatus::RaffleOpen,
            "RAFFLE_CLOSED" => ReleaseStatus::RaffleClosed,
            "RESTOCKED" => ReleaseStatus::Restocked,
            "SOLD_OUT" => ReleaseStatus::SoldOut,
            "CLOSED" => ReleaseStatus::Closed,
            _ => ReleaseStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReleaseStatus::Upcoming => "UPCOMING",
            ReleaseStatus::Live => "LIVE",
            ReleaseStatus::RaffleOpen => "RAFFLE_OPEN",
            ReleaseStatus::RaffleClosed => "RAFFLE_CLOSED",
            ReleaseStatus::Restocked => "RESTOCKED",
            ReleaseStatus::SoldOut => "SOLD_OUT",
            ReleaseStatus::Closed => "CLOSED",
            ReleaseStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------------

/// Inventory for one size/variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub total: u32,
    pub available: u32,
}

/// size/variant key → level. BTreeMap so serialized payloads have a stable
/// key order — snapshot equality compares canonical JSON.
pub type StockMap = BTreeMap<String, StockLevel>;

// ---------------------------------------------------------------------------
// Upsert classification
// ---------------------------------------------------------------------------

/// Three-way result of an upsert. Downstream counters and the notifier need
/// to distinguish "nothing happened" from "a write occurred".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    New,
    Updated,
    Duplicate,
}

impl std::fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpsertOutcome::New => "new",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Duplicate => "duplicate",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Mutation events — sent over mpsc from the ingest pipeline to the notifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    NewRelease,
    StatusChange,
    PriceChange,
    DateChange,
    Restock,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::NewRelease => "NEW_RELEASE",
            EventKind::StatusChange => "STATUS_CHANGE",
            EventKind::PriceChange => "PRICE_CHANGE",
            EventKind::DateChange => "DATE_CHANGE",
            EventKind::Restock => "RESTOCK",
        };
        write!(f, "{s}")
    }
}

/// Emitted whenever the upsert engine returns NEW/UPDATED or the stock differ
/// writes a snapshot. `fields` is the flat payload rules are evaluated against.
#[derive(Debug, Clone, Serialize)]
pub struct MutationEvent {
    pub kind: EventKind,
    pub release_id: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// Unix millis.
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// Notification priority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        };
        write!(f, "{s}")
    }
}

/// Fixed status → priority table, used when a matched rule carries no
/// priority of its own.
pub fn default_priority(status: ReleaseStatus) -> Priority {
    match status {
        ReleaseStatus::Live => Priority::Urgent,
        ReleaseStatus::Restocked | ReleaseStatus::RaffleOpen => Priority::High,
        ReleaseStatus::Upcoming => Priority::Medium,
        ReleaseStatus::RaffleClosed
        | ReleaseStatus::SoldOut
        | ReleaseStatus::Closed
        | ReleaseStatus::Unknown => Priority::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_vocabulary_maps_to_canonical_values() {
        assert_eq!(ReleaseStatus::from_raw("upcoming"), ReleaseStatus::Upcoming);
        assert_eq!(ReleaseStatus::from_raw("Available"), ReleaseStatus::Live);
        assert_eq!(ReleaseStatus::from_raw("in stock"), ReleaseStatus::Live);
        assert_eq!(ReleaseStatus::from_raw("raffle open"), ReleaseStatus::RaffleOpen);
        assert_eq!(ReleaseStatus::from_raw("SOLD OUT"), ReleaseStatus::SoldOut);
        assert_eq!(ReleaseStatus::from_raw("restock"), ReleaseStatus::Restocked);
    }

    #[test]
    fn unrecognized_status_degrades_to_unknown() {
        assert_eq!(ReleaseStatus::from_raw("weird value"), ReleaseStatus::Unknown);
        assert_eq!(ReleaseStatus::from_raw(""), ReleaseStatus::Unknown);
    }

    #[test]
    fn stored_status_round_trips_through_display() {
        for status in [
            ReleaseStatus::Upcoming,
            ReleaseStatus::Live,
            ReleaseStatus::RaffleOpen,
            ReleaseStatus::RaffleClosed,
            ReleaseStatus::Restocked,
            ReleaseStatus::SoldOut,
            ReleaseStatus::Closed,
            ReleaseStatus::Unknown,
        ] {
            assert_eq!(ReleaseStatus::from_stored(&status.to_string()), status);
        }
    }

    #[test]
    fn live_status_defaults_to_urgent_priority() {
        assert_eq!(default_priority(ReleaseStatus::Live), Priority::Urgent);
        assert_eq!(default_priority(ReleaseStatus::SoldOut), Priority::Low);
    }
}
