use std::sync::Arc;

use shared::{
    domain::{CourseRef, PageId, ProgramRef, StudentRef, TaskKind},
    protocol::{ActionOutcome, CoverPageDocument},
};
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    backends::CompositionBackend,
    error::{ComposeError, FetchError},
};

/// Everything the user has picked toward one cover page. Streams and
/// students keep insertion order; the document renders them in the order
/// they were chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverSelection {
    pub task_kind: TaskKind,
    pub group_number: u32,
    pub submission_date: Option<String>,
    pub streams: Vec<String>,
    pub students: Vec<StudentRef>,
    pub program: Option<ProgramRef>,
    pub course: Option<CourseRef>,
    pub question: String,
    pub show_roster_table: bool,
}

impl Default for CoverSelection {
    fn default() -> Self {
        Self {
            task_kind: TaskKind::Group,
            group_number: 1,
            submission_date: None,
            streams: Vec::new(),
            students: Vec::new(),
            program: None,
            course: None,
            question: String::new(),
            show_roster_table: true,
        }
    }
}

impl CoverSelection {
    fn is_blank(&self) -> bool {
        *self == Self::default()
    }
}

/// Where the composition session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Empty,
    InProgress,
    Saving,
    Saved,
}

struct ComposerState {
    selection: CoverSelection,
    phase: SessionPhase,
}

/// Joins stream names for display: one name stands alone, two are joined
/// with "&", three or more get commas with "&" before the last.
pub fn format_stream_list(streams: &[String]) -> String {
    match streams {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} & {second}"),
        [head @ .., last] => format!("{} & {last}", head.join(", ")),
    }
}

/// Aggregates the user's picks into a cover page document and drives the
/// save round trip.
pub struct CoverComposer {
    backend: Arc<dyn CompositionBackend>,
    inner: Mutex<ComposerState>,
}

impl CoverComposer {
    pub fn new(backend: Arc<dyn CompositionBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            inner: Mutex::new(ComposerState {
                selection: CoverSelection::default(),
                phase: SessionPhase::Empty,
            }),
        })
    }

    pub async fn selection(&self) -> CoverSelection {
        self.inner.lock().await.selection.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.phase
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.selection = CoverSelection::default();
        inner.phase = SessionPhase::Empty;
    }

    /// Adds or removes a student. Group mode accumulates in pick order;
    /// individual mode holds at most one student, so picking a second
    /// replaces the first and re-picking the current one clears it.
    pub async fn toggle_student(&self, student: StudentRef) {
        self.mutate(|selection| {
            if let Some(position) = selection.students.iter().position(|s| s.id == student.id) {
                selection.students.remove(position);
                return;
            }
            match selection.task_kind {
                TaskKind::Group => selection.students.push(student),
                TaskKind::Individual => selection.students = vec![student],
            }
        })
        .await;
    }

    /// Switching between group and individual work discards the roster;
    /// the two modes select under different rules.
    pub async fn set_task_kind(&self, kind: TaskKind) {
        self.mutate(|selection| {
            if selection.task_kind != kind {
                selection.task_kind = kind;
                selection.students.clear();
            }
        })
        .await;
    }

    /// Streams belong to a program, so changing program resets them.
    pub async fn set_program(&self, program: Option<ProgramRef>) {
        self.mutate(|selection| {
            if selection.program != program {
                selection.program = program;
                selection.streams.clear();
            }
        })
        .await;
    }

    pub async fn set_course(&self, course: Option<CourseRef>) {
        self.mutate(|selection| selection.course = course).await;
    }

    pub async fn toggle_stream(&self, name: &str) {
        self.mutate(|selection| {
            if let Some(position) = selection.streams.iter().position(|s| s == name) {
                selection.streams.remove(position);
            } else {
                selection.streams.push(name.to_string());
            }
        })
        .await;
    }

    pub async fn set_question(&self, question: &str) {
        self.mutate(|selection| selection.question = question.to_string())
            .await;
    }

    pub async fn set_group_number(&self, group_number: u32) {
        self.mutate(|selection| selection.group_number = group_number)
            .await;
    }

    pub async fn set_submission_date(&self, date: Option<String>) {
        self.mutate(|selection| selection.submission_date = date)
            .await;
    }

    pub async fn set_show_roster_table(&self, show: bool) {
        self.mutate(|selection| selection.show_roster_table = show)
            .await;
    }

    /// Replaces the whole selection, e.g. when recalling a saved page.
    pub async fn replace_all(&self, selection: CoverSelection) {
        let mut inner = self.inner.lock().await;
        inner.phase = if selection.is_blank() {
            SessionPhase::Empty
        } else {
            SessionPhase::InProgress
        };
        inner.selection = selection;
    }

    /// Program abbreviation plus the chosen streams, as printed under the
    /// page heading. Empty when no program is chosen.
    pub async fn class_label(&self) -> String {
        let inner = self.inner.lock().await;
        let Some(program) = &inner.selection.program else {
            return String::new();
        };
        let streams = format_stream_list(&inner.selection.streams);
        if streams.is_empty() {
            program.abbrev.clone()
        } else {
            format!("{}   {streams}", program.abbrev)
        }
    }

    /// Builds the document from the current selection without validating
    /// it; `save` is the gatekeeper.
    pub async fn compose_document(&self) -> CoverPageDocument {
        let inner = self.inner.lock().await;
        compose(&inner.selection)
    }

    /// Fetches a saved page and adopts it as the current selection. The
    /// session lands in progress so the recalled page is editable right away.
    pub async fn recall_page(&self, id: PageId) -> Result<(), FetchError> {
        let document = self.backend.load_page(id).await?;
        let mut inner = self.inner.lock().await;
        inner.selection = CoverSelection {
            task_kind: document.task_kind,
            group_number: document.group_number,
            submission_date: document.submission_date,
            streams: document.streams,
            students: document.students,
            program: document.program,
            course: document.course,
            question: document.question,
            show_roster_table: document.show_roster_table,
        };
        inner.phase = SessionPhase::InProgress;
        Ok(())
    }

    /// Saves the composed page. Selection problems fail before any request
    /// is made; a server rejection comes back as a normal outcome with
    /// `success == false`.
    pub async fn save(&self) -> Result<ActionOutcome, ComposeError> {
        let document = {
            let mut inner = self.inner.lock().await;
            if inner.phase == SessionPhase::Saving {
                return Err(ComposeError::SaveInProgress);
            }
            if inner.selection.students.is_empty() {
                return Err(ComposeError::InvalidSelection(
                    "Select at least one student.".into(),
                ));
            }
            if inner.selection.course.is_none() {
                return Err(ComposeError::InvalidSelection("Select a course.".into()));
            }
            inner.phase = SessionPhase::Saving;
            compose(&inner.selection)
        };

        let result = self.backend.save_page(&document).await;

        let mut inner = self.inner.lock().await;
        match result {
            Ok(outcome) => {
                if outcome.success {
                    info!(students = document.students.len(), "cover page saved");
                    inner.phase = SessionPhase::Saved;
                } else {
                    inner.phase = SessionPhase::InProgress;
                }
                Ok(outcome)
            }
            Err(error) => {
                inner.phase = SessionPhase::InProgress;
                Err(ComposeError::Fetch(error))
            }
        }
    }

    /// Stores a new question in the bank and adopts it for this page when
    /// the server accepts it.
    pub async fn save_question(&self, content: &str) -> Result<ActionOutcome, FetchError> {
        let outcome = self.backend.save_question(content).await?;
        if outcome.success {
            self.set_question(content.trim()).await;
        }
        Ok(outcome)
    }

    async fn mutate(&self, apply: impl FnOnce(&mut CoverSelection)) {
        let mut inner = self.inner.lock().await;
        apply(&mut inner.selection);
        inner.phase = if inner.selection.is_blank() {
            SessionPhase::Empty
        } else {
            SessionPhase::InProgress
        };
    }
}

/// Derives the printed title and assembles the wire document.
fn compose(selection: &CoverSelection) -> CoverPageDocument {
    let title = match (&selection.program, &selection.course) {
        (Some(program), Some(course)) => format!(
            "{}: {} - {}",
            program.abbrev,
            course.name,
            course.facilitator_label()
        ),
        (None, Some(course)) => format!("{} - {}", course.name, course.facilitator_label()),
        (Some(program), None) => program.name.clone(),
        (None, None) => "Untitled cover page".to_string(),
    };
    CoverPageDocument {
        task_kind: selection.task_kind,
        group_number: selection.group_number,
        submission_date: selection.submission_date.clone(),
        streams: selection.streams.clone(),
        students: selection.students.clone(),
        program: selection.program.clone(),
        course: selection.course.clone(),
        question: selection.question.clone(),
        show_roster_table: selection.show_roster_table,
        title,
    }
}

#[cfg(test)]
#[path = "tests/composer_tests.rs"]
mod tests;
