//! Common types used across the platform

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed time range for ledger queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}
