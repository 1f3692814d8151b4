//! Domain records and push payloads consumed by dashboard views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A donation row as returned by the donations list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
    pub amount: f64,
    #[serde(default)]
    pub donor_name: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload of a `new_donation` push event.
///
/// The server only guarantees `amount`; views treat the event as an
/// invalidation signal and refetch rather than trusting the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDonationPayload {
    pub amount: f64,
    #[serde(default)]
    pub donation_id: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
}

/// Filter parameters for the donations list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DonationFilter {
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl DonationFilter {
    /// Query-string pairs for the non-empty fields, in a stable order.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let fields = [
            ("campaign_id", &self.campaign_id),
            ("status", &self.status),
            ("search", &self.search),
        ];
        for (key, value) in fields {
            if let Some(value) = value.as_deref().map(str::trim) {
                if !value.is_empty() {
                    pairs.push((key.to_string(), value.to_string()));
                }
            }
        }
        pairs
    }
}
