//! Maps heterogeneous raw adapter records into canonical `ReleaseDraft`s.
//! Pure and infallible by design: malformed fields degrade to None/UNKNOWN
//! instead of erroring, so one bad record can never abort a batch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::types::{ReleaseDraft, ReleaseStatus, StockLevel, StockMap};

/// lowercase keyword → canonical brand name.
const BRAND_TABLE: &[(&str, &str)] = &[
    ("nike", "Nike"),
    ("air jordan", "Nike"),
    ("jordan", "Nike"),
    ("adidas", "Adidas"),
    ("yeezy", "Adidas"),
    ("new balance", "New Balance"),
    ("asics", "ASICS"),
    ("reebok", "Reebok"),
    ("puma", "Puma"),
    ("vans", "Vans"),
    ("converse", "Converse"),
];

/// Why a raw record could not produce a draft. Deliberately short — almost
/// everything degrades rather than rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NotAnObject,
    MissingRetailer,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NotAnObject => write!(f, "record is not a JSON object"),
            RejectReason::MissingRetailer => write!(f, "record has no retailer_id"),
        }
    }
}

/// Normalize one raw adapter record. `retailer_hint` is the retailer the
/// adapter was invoked for; an explicit `retailer_id`/`retailer`/`source`
/// field on the record wins over it.
pub fn normalize(raw: &Value, retailer_hint: &str) -> Result<ReleaseDraft, RejectReason> {
    let obj = raw.as_object().ok_or(RejectReason::NotAnObject)?;

    let retailer_id = first_str(obj, &["retailer_id", "retailer", "source"])
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| retailer_hint.trim().to_ascii_lowercase());
    if retailer_id.is_empty() {
        return Err(RejectReason::MissingRetailer);
    }

    let name = first_str(obj, &["name", "shoe_name", "title", "product_name"])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let sku = first_str(obj, &["sku", "style_code", "styleCode"])
        .map(|s| s.trim().to_ascii_uppercase())
        .unwrap_or_default();

    let brand = normalize_brand(first_str(obj, &["brand", "vendor"]).as_deref());

    let status = first_str(obj, &["status"])
        .map(|s| ReleaseStatus::from_raw(&s))
        .unwrap_or(ReleaseStatus::Unknown);

    let id = first_str(obj, &["id"])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| derive_id(&retailer_id, &sku));

    Ok(ReleaseDraft {
        id,
        sku,
        retailer_id,
        name,
        brand,
        colorway: first_str(obj, &["colorway", "color"]).map(|s| s.trim().to_string()),
        price: obj
            .get("price")
            .or_else(|| obj.get("retail_price"))
            .and_then(parse_price),
        status,
        release_date: first_str(obj, &["release_date", "releaseDate", "launch_date"])
            .and_then(|s| parse_release_date(&s)),
        image_url: first_str(obj, &["image_url", "image", "imageUrl"]),
        product_url: first_str(obj, &["product_url", "url", "productUrl"]),
        stock: parse_stock(obj.get("stock").or_else(|| obj.get("sizes"))),
    })
}

/// Deterministic release id for records without an adapter-assigned one.
pub fn derive_id(retailer_id: &str, sku: &str) -> String {
    format!("{}:{}", retailer_id, sku.to_ascii_lowercase())
}

fn first_str(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn normalize_brand(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return "Unknown".to_string();
    };
    let lowered = raw.to_ascii_lowercase();
    for (keyword, canonical) in BRAND_TABLE {
        if lowered == *keyword {
            return canonical.to_string();
        }
    }
    raw.to_string()
}

/// Positive decimal from a number or a currency string ("$180", "1,299.00").
/// Anything else is None — price parsing never errors.
fn parse_price(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .replace(['$', '€', '£', ','], "")
            .trim()
            .parse::<f64>()
            .ok(),
        _ => None,
    }?;
    (parsed > 0.0 && parsed.is_finite()).then_some(parsed)
}

/// RFC3339 first, then the date-only and naive-datetime forms the source
/// feeds actually emit. Unparseable input degrades to None.
fn parse_release_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(ndt.and_utc());
    }
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(nd.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Accepts {"10.5": {"total": 12, "available": 3}, ...}. Entries that don't
/// fit the shape are dropped; an empty or absent map is None.
fn parse_stock(v: Option<&Value>) -> Option<StockMap> {
    let obj = v?.as_object()?;
    let mut map = StockMap::new();
    for (variant, level) in obj {
        let Some(level) = level.as_object() else { continue };
        let total = level.get("total").and_then(|v| v.as_u64());
        let available = level.get("available").and_then(|v| v.as_u64());
        if let (Some(total), Some(available)) = (total, available) {
            map.insert(
                variant.clone(),
                StockLevel {
                    total: total.min(u32::MAX as u64) as u32,
                    available: available.min(u32::MAX as u64) as u32,
                },
            );
        }
    }
    (!map.is_empty()).then_some(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_record_normalizes() {
        let raw = json!({
            "shoe_name": "  Air Max 1 '86  ",
            "style_code": "dq3989-100",
            "brand": "nike",
            "retail_price": "$150",
            "status": "upcoming",
            "release_date": "2026-03-26T09:00:00Z",
            "retailer_id": "SNKRS",
        });
        let draft = normalize(&raw, "fallback").unwrap();
        assert_eq!(draft.name, "Air Max 1 '86");
        assert_eq!(draft.sku, "DQ3989-100");
        assert_eq!(draft.brand, "Nike");
        assert_eq!(draft.retailer_id, "snkrs");
        assert_eq!(draft.price, Some(150.0));
        assert_eq!(draft.status, ReleaseStatus::Upcoming);
        assert!(draft.release_date.is_some());
        assert_eq!(draft.id, "snkrs:dq3989-100");
    }

    #[test]
    fn blank_name_defaults_to_unknown() {
        let raw = json!({"name": "   ", "sku": "abc", "retailer_id": "kith"});
        let draft = normalize(&raw, "").unwrap();
        assert_eq!(draft.name, "Unknown");
    }

    #[test]
    fn malformed_price_degrades_to_none() {
        for price in [json!("TBD"), json!("$"), json!(true), json!(-20), json!(0)] {
            let raw = json!({"name": "x", "price": price, "retailer_id": "r"});
            assert_eq!(normalize(&raw, "").unwrap().price, None);
        }
    }

    #[test]
    fn numeric_price_accepted() {
        let raw = json!({"name": "x", "price": 120, "retailer_id": "r"});
        assert_eq!(normalize(&raw, "").unwrap().price, Some(120.0));
    }

    #[test]
    fn unparseable_release_date_degrades_to_none() {
        let raw = json!({"name": "x", "release_date": "next tuesday", "retailer_id": "r"});
        assert_eq!(normalize(&raw, "").unwrap().release_date, None);
    }

    #[test]
    fn date_only_release_date_parses_to_midnight_utc() {
        let raw = json!({"name": "x", "release_date": "2026-04-01", "retailer_id": "r"});
        let dt = normalize(&raw, "").unwrap().release_date.unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-04-01T00:00:00+00:00");
    }

    #[test]
    fn unknown_brand_falls_back_to_raw_then_unknown() {
        let raw = json!({"name": "x", "brand": "Salomon", "retailer_id": "r"});
        assert_eq!(normalize(&raw, "").unwrap().brand, "Salomon");
        let raw = json!({"name": "x", "retailer_id": "r"});
        assert_eq!(normalize(&raw, "").unwrap().brand, "Unknown");
    }

    #[test]
    fn retailer_hint_used_when_record_has_none() {
        let raw = json!({"name": "x"});
        assert_eq!(normalize(&raw, "Footlocker").unwrap().retailer_id, "footlocker");
        assert_eq!(normalize(&raw, " "), Err(RejectReason::MissingRetailer));
    }

    #[test]
    fn non_object_record_is_rejected() {
        assert_eq!(normalize(&json!([1, 2]), "r"), Err(RejectReason::NotAnObject));
    }

    #[test]
    fn stock_map_parses_and_drops_malformed_entries() {
        let raw = json!({
            "name": "x",
            "retailer_id": "r",
            "sizes": {
                "9": {"total": 10, "available": 4},
                "10": "lots",
                "11": {"total": 2}
            }
        });
        let stock = normalize(&raw, "").unwrap().stock.unwrap();
        assert_eq!(stock.len(), 1);
        assert_eq!(stock["9"], StockLevel { total: 10, available: 4 });
    }

    #[test]
    fn missing_sku_yields_empty_string() {
        let raw = json!({"name": "x", "retailer_id": "r"});
        let draft = normalize(&raw, "").unwrap();
        assert_eq!(draft.sku, "");
        assert_eq!(draft.id, "r:");
    }
}
