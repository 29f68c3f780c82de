use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(StudentId);
id_newtype!(ProgramId);
id_newtype!(CourseId);
id_newtype!(FacilitatorId);
id_newtype!(QuestionId);
id_newtype!(PageId);

/// Server-paginated, server-searched collections exposed by the listing API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Students,
    Programs,
    Courses,
    Questions,
    Pages,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::Programs => "programs",
            Collection::Courses => "courses",
            Collection::Questions => "questions",
            Collection::Pages => "pages",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "students" => Ok(Collection::Students),
            "programs" => Ok(Collection::Programs),
            "courses" => Ok(Collection::Courses),
            "questions" => Ok(Collection::Questions),
            "pages" => Ok(Collection::Pages),
            other => Err(format!("unknown collection '{other}'")),
        }
    }
}

/// Typed reference carried alongside rendered rows so selection state never
/// round-trips through display markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRef {
    pub id: StudentId,
    pub fullname: String,
    pub regnumber: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRef {
    pub id: ProgramId,
    pub name: String,
    pub abbrev: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRef {
    pub id: CourseId,
    pub name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facilitator: Option<String>,
}

impl CourseRef {
    /// Display name for the facilitator column; absent facilitators render
    /// as "N/A".
    pub fn facilitator_label(&self) -> &str {
        self.facilitator.as_deref().unwrap_or("N/A")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub id: QuestionId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub id: PageId,
    pub title: String,
    pub created_at: chrono::NaiveDateTime,
}

/// Whether a cover sheet is built for a group or a single student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Group,
    Individual,
}

impl TaskKind {
    pub fn heading(&self) -> &'static str {
        match self {
            TaskKind::Group => "GROUP ASSIGNMENT",
            TaskKind::Individual => "INDIVIDUAL ASSIGNMENT",
        }
    }
}
