use serde::{Deserialize, Serialize};

use crate::domain::{
    Collection, CourseRef, FacilitatorId, ProgramRef, StudentId, StudentRef, TaskKind,
};

/// Pagination metadata returned by the listing API. Mirrors what the server
/// computes; clients replace their cursor wholesale from this on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_count: u64,
    pub per_page: u32,
    pub has_previous: bool,
    pub has_next: bool,
    /// 1-based index of the first row on this page, 0 when the set is empty.
    pub start_index: u64,
    /// 1-based index of the last row on this page, 0 when the set is empty.
    pub end_index: u64,
}

impl PageMeta {
    /// Summary line for the pagination footer ("Showing 11 to 20 of 57").
    pub fn summary(&self, item_label: &str) -> String {
        if self.total_count == 0 {
            format!("No {item_label} found")
        } else {
            format!(
                "Showing {} to {} of {}",
                self.start_index, self.end_index, self.total_count
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub pagination: PageMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub collection: Collection,
    pub page: u32,
    pub search: String,
    pub per_page: u32,
}

/// The `{success, message}` envelope every mutating action answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Serializable projection of a composed cover sheet. `replace_all` on the
/// composer consumes exactly this shape; `compose_document` produces it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverPageDocument {
    pub task_kind: TaskKind,
    pub group_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<String>,
    #[serde(default)]
    pub streams: Vec<String>,
    #[serde(default)]
    pub students: Vec<StudentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<ProgramRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<CourseRef>,
    #[serde(default)]
    pub question: String,
    pub show_roster_table: bool,
    /// Derived "<abbrev>: <course> - <facilitator>" label used for the saved
    /// pages list.
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub content: String,
}

// CRUD payloads for the registry screens. The server re-validates every
// field; these carry raw user input.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentUpsert {
    pub fullname: String,
    pub regnumber: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramUpsert {
    pub name: String,
    pub abbrev: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseUpsert {
    pub name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facilitator_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilitatorUpsert {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilitatorSummary {
    pub id: FacilitatorId,
    pub name: String,
}

/// Ids to hydrate into full student refs, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentLookupRequest {
    pub ids: Vec<StudentId>,
}
