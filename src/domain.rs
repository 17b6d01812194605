//! Domain record descriptors.
//!
//! The flows that own todos, course schedules and club memberships render
//! them into fragment text here before enqueueing an indexing job. The
//! template strings are embedding inputs: changing one silently shifts
//! retrieval for every fragment of that kind until a full re-index, so
//! they stay byte-for-byte stable.

use serde::{Deserialize, Serialize};

use crate::indexer::IndexJob;

/// Fragments added directly, without a backing domain record.
pub const DEFAULT_SOURCE_KIND: &str = "manual";

/// A todo item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub name: String,
    pub description: Option<String>,
    pub deadline: Option<String>,
}

impl Todo {
    pub const SOURCE_KIND: &'static str = "todo";

    pub fn index_text(&self) -> String {
        format!(
            "Todo: {}. Description: {}. Deadline: {}",
            self.name,
            self.description.as_deref().unwrap_or(""),
            self.deadline.as_deref().unwrap_or("")
        )
    }

    pub fn index_job(&self, owner: Option<i64>, id: i64) -> IndexJob {
        IndexJob {
            owner,
            source_kind: Self::SOURCE_KIND.to_string(),
            source_id: Some(id.to_string()),
            text: self.index_text(),
        }
    }
}

/// One weekly course slot ("jadwal matkul").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSchedule {
    pub name: String,
    /// Day of week as written by the user (e.g. "Senin").
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    /// Credit units (SKS).
    pub credits: i32,
}

impl CourseSchedule {
    pub const SOURCE_KIND: &'static str = "jadwal_matkul";

    pub fn index_text(&self) -> String {
        format!(
            "Jadwal: {} pada {} {}-{}. SKS: {}",
            self.name, self.day, self.start_time, self.end_time, self.credits
        )
    }

    pub fn index_job(&self, owner: Option<i64>, id: i64) -> IndexJob {
        IndexJob {
            owner,
            source_kind: Self::SOURCE_KIND.to_string(),
            source_id: Some(id.to_string()),
            text: self.index_text(),
        }
    }
}

/// A student club membership ("UKM").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClubMembership {
    pub name: String,
    /// Role within the club (e.g. "anggota", "ketua").
    pub role: String,
    pub description: Option<String>,
}

impl ClubMembership {
    pub const SOURCE_KIND: &'static str = "ukm";

    pub fn index_text(&self) -> String {
        format!(
            "UKM: {}. Role: {}. {}",
            self.name,
            self.role,
            self.description.as_deref().unwrap_or("")
        )
    }

    pub fn index_job(&self, owner: Option<i64>, id: i64) -> IndexJob {
        IndexJob {
            owner,
            source_kind: Self::SOURCE_KIND.to_string(),
            source_id: Some(id.to_string()),
            text: self.index_text(),
        }
    }
}
