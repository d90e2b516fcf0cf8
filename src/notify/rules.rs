//! Per-user rule evaluation: quiet hours → first matching rule → conditions →
//! throttle window. Pure decisions over an event payload; dispatch happens in
//! the transport layer.

use chrono::{TimeZone, Timelike, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{default_priority, EventKind, MutationEvent, Priority, ReleaseStatus};

// ---------------------------------------------------------------------------
// Rule model — owned by users, read-only here
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    #[serde(rename = "operator")]
    pub op: Operator,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRule {
    #[serde(rename = "type")]
    pub rule_type: EventKind,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub throttle_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Webhook,
    Email,
    Push,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Channel::Webhook => "webhook",
            Channel::Email => "email",
            Channel::Push => "push",
            Channel::Sms => "sms",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChannelToggles {
    #[serde(default)]
    pub webhook: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub sms: bool,
}

impl ChannelToggles {
    pub fn is_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Webhook => self.webhook,
            Channel::Email => self.email,
            Channel::Push => self.push,
            Channel::Sms => self.sms,
        }
    }
}

/// Local start/end hour-of-day in the user's timezone; [start, end) with
/// wrap past midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub user_id: String,
    #[serde(default)]
    pub rules: Vec<NotificationRule>,
    #[serde(default)]
    pub channels: ChannelToggles,
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Why an event did or did not reach dispatch for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Dispatch(Priority),
    NoMatchingRule,
    /// The first rule of the event's type exists but its conditions failed.
    /// Later rules of the same type are NOT consulted — first-match policy.
    ConditionsFailed,
    QuietHours,
    /// Matched, but inside the rule's throttle window.
    Throttled,
}

pub struct RuleEngine {
    /// (user_id, rule_type) → millis of last dispatched notification.
    last_sent: DashMap<(String, EventKind), i64>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self { last_sent: DashMap::new() }
    }

    pub fn evaluate(
        &self,
        prefs: &NotificationPreferences,
        event: &MutationEvent,
        now: i64,
    ) -> Verdict {
        if let Some(quiet) = &prefs.quiet_hours {
            if in_quiet_hours(quiet, event.timestamp) {
                return Verdict::QuietHours;
            }
        }

        // Only the first rule of the event's type is ever evaluated.
        let Some(rule) = prefs.rules.iter().find(|r| r.rule_type == event.kind) else {
            return Verdict::NoMatchingRule;
        };

        if !rule.conditions.iter().all(|c| condition_holds(c, &event.fields)) {
            return Verdict::ConditionsFailed;
        }

        if let Some(throttle_secs) = rule.throttle_seconds {
            let key = (prefs.user_id.clone(), event.kind);
            if let Some(last) = self.last_sent.get(&key) {
                if now - *last < (throttle_secs as i64) * 1000 {
                    return Verdict::Throttled;
                }
            }
        }
        self.last_sent
            .insert((prefs.user_id.clone(), event.kind), now);

        let priority = rule.priority.unwrap_or_else(|| {
            let status = event
                .fields
                .get("status")
                .and_then(|v| v.as_str())
                .map(ReleaseStatus::from_stored)
                .unwrap_or(ReleaseStatus::Unknown);
            default_priority(status)
        });
        Verdict::Dispatch(priority)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// An unknown timezone degrades to UTC rather than disabling the window.
fn in_quiet_hours(quiet: &QuietHours, event_ts_ms: i64) -> bool {
    let tz: chrono_tz::Tz = quiet.timezone.parse().unwrap_or(chrono_tz::UTC);
    let Some(instant) = Utc.timestamp_millis_opt(event_ts_ms).single() else {
        return false;
    };
    let hour = instant.with_timezone(&tz).hour();
    if quiet.start == quiet.end {
        // Empty [start, end) window.
        false
    } else if quiet.start < quiet.end {
        hour >= quiet.start && hour < quiet.end
    } else {
        hour >= quiet.start || hour < quiet.end
    }
}

fn condition_holds(cond: &Condition, fields: &serde_json::Map<String, Value>) -> bool {
    let Some(actual) = fields.get(&cond.field) else {
        return false;
    };
    match cond.op {
        Operator::Eq => json_eq(actual, &cond.value),
        Operator::Neq => !json_eq(actual, &cond.value),
        Operator::Gt => compare(actual, &cond.value).is_some_and(|o| o.is_gt()),
        Operator::Lt => compare(actual, &cond.value).is_some_and(|o| o.is_lt()),
        Operator::Gte => compare(actual, &cond.value).is_some_and(|o| o.is_ge()),
        Operator::Lte => compare(actual, &cond.value).is_some_and(|o| o.is_le()),
        Operator::Contains => contains(actual, &cond.value),
    }
}

/// Numbers compare numerically (so 120 == 120.0); everything else uses plain
/// JSON equality.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a.as_str(), b.as_str()) {
            (Some(x), Some(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}

/// Substring for strings, membership for arrays.
fn contains(actual: &Value, needle: &Value) -> bool {
    match actual {
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Array(items) => items.iter().any(|item| json_eq(item, needle)),
        _ => false,
    }
}
