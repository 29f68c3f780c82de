use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{fs, path::Path, str::FromStr};

use shared::domain::{
    Collection, CourseId, CourseRef, FacilitatorId, PageId, PageSummary, ProgramId, ProgramRef,
    QuestionId, QuestionSummary, StudentId, StudentRef, TaskKind,
};
use shared::protocol::FacilitatorSummary;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Row-level form of a saved cover page. Student ids are stored as a JSON
/// array; hydration to full refs happens in the service layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPage {
    pub id: PageId,
    pub title: String,
    pub task_kind: TaskKind,
    pub group_number: u32,
    pub submission_date: Option<String>,
    pub streams: Vec<String>,
    pub student_ids: Vec<StudentId>,
    pub show_roster_table: bool,
    pub program_id: Option<ProgramId>,
    pub course_id: Option<CourseId>,
    pub question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPage {
    pub title: String,
    pub task_kind: TaskKind,
    pub group_number: u32,
    pub submission_date: Option<String>,
    pub streams: Vec<String>,
    pub student_ids: Vec<StudentId>,
    pub show_roster_table: bool,
    pub program_id: Option<ProgramId>,
    pub course_id: Option<CourseId>,
    pub question: Option<String>,
}

fn task_kind_to_str(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Group => "group",
        TaskKind::Individual => "individual",
    }
}

fn task_kind_from_str(raw: &str) -> TaskKind {
    match raw {
        "individual" => TaskKind::Individual,
        _ => TaskKind::Group,
    }
}

/// Builds a LIKE pattern for a contains-match, escaping the wildcards so a
/// literal "%" in the search box does not match everything.
fn like_pattern(search: &str) -> String {
    let escaped = search.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    // ── facilitators ──────────────────────────────────────────────────

    pub async fn create_facilitator(&self, name: &str) -> Result<FacilitatorId> {
        let rec = sqlx::query("INSERT INTO facilitators (name) VALUES (?) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(FacilitatorId(rec.get::<i64, _>(0)))
    }

    pub async fn update_facilitator(&self, id: FacilitatorId, name: &str) -> Result<bool> {
        let done = sqlx::query("UPDATE facilitators SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn delete_facilitator(&self, id: FacilitatorId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM facilitators WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn facilitator_name(&self, id: FacilitatorId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT name FROM facilitators WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn list_facilitators(&self) -> Result<Vec<FacilitatorSummary>> {
        let rows =
            sqlx::query("SELECT id, name FROM facilitators ORDER BY name COLLATE NOCASE ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|r| FacilitatorSummary {
                id: FacilitatorId(r.get::<i64, _>(0)),
                name: r.get::<String, _>(1),
            })
            .collect())
    }

    // ── programs ──────────────────────────────────────────────────────

    pub async fn create_program(&self, name: &str, abbrev: &str) -> Result<ProgramId> {
        let rec = sqlx::query("INSERT INTO programs (name, abbrev) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(abbrev)
            .fetch_one(&self.pool)
            .await?;
        Ok(ProgramId(rec.get::<i64, _>(0)))
    }

    pub async fn update_program(&self, id: ProgramId, name: &str, abbrev: &str) -> Result<bool> {
        let done = sqlx::query("UPDATE programs SET name = ?, abbrev = ? WHERE id = ?")
            .bind(name)
            .bind(abbrev)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn delete_program(&self, id: ProgramId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM programs WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn program_by_id(&self, id: ProgramId) -> Result<Option<ProgramRef>> {
        let row = sqlx::query("SELECT id, name, abbrev FROM programs WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(program_from_row))
    }

    pub async fn program_by_abbrev(&self, abbrev: &str) -> Result<Option<ProgramRef>> {
        let row = sqlx::query(
            "SELECT id, name, abbrev FROM programs WHERE abbrev = ? COLLATE NOCASE LIMIT 1",
        )
        .bind(abbrev)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(program_from_row))
    }

    pub async fn program_abbrev_taken(
        &self,
        abbrev: &str,
        exclude: Option<ProgramId>,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM programs WHERE abbrev = ? COLLATE NOCASE AND id != ?",
        )
        .bind(abbrev)
        .bind(exclude.map(|id| id.0).unwrap_or(-1))
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    // ── courses ───────────────────────────────────────────────────────

    pub async fn create_course(
        &self,
        name: &str,
        code: &str,
        facilitator_id: Option<FacilitatorId>,
    ) -> Result<CourseId> {
        let rec = sqlx::query(
            "INSERT INTO courses (name, code, facilitator_id) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(code)
        .bind(facilitator_id.map(|id| id.0))
        .fetch_one(&self.pool)
        .await?;
        Ok(CourseId(rec.get::<i64, _>(0)))
    }

    pub async fn update_course(
        &self,
        id: CourseId,
        name: &str,
        code: &str,
        facilitator_id: Option<FacilitatorId>,
    ) -> Result<bool> {
        let done = sqlx::query(
            "UPDATE courses SET name = ?, code = ?, facilitator_id = ? WHERE id = ?",
        )
        .bind(name)
        .bind(code)
        .bind(facilitator_id.map(|id| id.0))
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn delete_course(&self, id: CourseId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn course_by_id(&self, id: CourseId) -> Result<Option<CourseRef>> {
        let row = sqlx::query(
            "SELECT c.id, c.name, c.code, f.name
             FROM courses c
             LEFT JOIN facilitators f ON f.id = c.facilitator_id
             WHERE c.id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(course_from_row))
    }

    pub async fn course_by_code(&self, code: &str) -> Result<Option<CourseRef>> {
        let row = sqlx::query(
            "SELECT c.id, c.name, c.code, f.name
             FROM courses c
             LEFT JOIN facilitators f ON f.id = c.facilitator_id
             WHERE c.code = ? COLLATE NOCASE
             LIMIT 1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(course_from_row))
    }

    pub async fn course_code_taken(&self, code: &str, exclude: Option<CourseId>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM courses WHERE code = ? COLLATE NOCASE AND id != ?",
        )
        .bind(code)
        .bind(exclude.map(|id| id.0).unwrap_or(-1))
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    // ── students ──────────────────────────────────────────────────────

    pub async fn create_student(
        &self,
        fullname: &str,
        regnumber: &str,
        program_id: Option<ProgramId>,
    ) -> Result<StudentId> {
        let rec = sqlx::query(
            "INSERT INTO students (fullname, regnumber, program_id) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(fullname)
        .bind(regnumber)
        .bind(program_id.map(|id| id.0))
        .fetch_one(&self.pool)
        .await?;
        Ok(StudentId(rec.get::<i64, _>(0)))
    }

    pub async fn update_student(
        &self,
        id: StudentId,
        fullname: &str,
        regnumber: &str,
        program_id: Option<ProgramId>,
    ) -> Result<bool> {
        let done = sqlx::query(
            "UPDATE students SET fullname = ?, regnumber = ?, program_id = ? WHERE id = ?",
        )
        .bind(fullname)
        .bind(regnumber)
        .bind(program_id.map(|id| id.0))
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn delete_student(&self, id: StudentId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn student_by_id(&self, id: StudentId) -> Result<Option<StudentRef>> {
        let row = sqlx::query("SELECT id, fullname, regnumber FROM students WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(student_from_row))
    }

    pub async fn regnumber_taken(
        &self,
        regnumber: &str,
        exclude: Option<StudentId>,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM students WHERE regnumber = ? COLLATE NOCASE AND id != ?",
        )
        .bind(regnumber)
        .bind(exclude.map(|id| id.0).unwrap_or(-1))
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Hydrates refs in the order of the given ids; missing ids are skipped
    /// (a saved page may reference students deleted since).
    pub async fn students_by_ids(&self, ids: &[StudentId]) -> Result<Vec<StudentRef>> {
        let mut refs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(student) = self.student_by_id(*id).await? {
                refs.push(student);
            }
        }
        Ok(refs)
    }

    // ── questions ─────────────────────────────────────────────────────

    pub async fn insert_question(&self, content: &str) -> Result<QuestionId> {
        let rec = sqlx::query("INSERT INTO questions (content) VALUES (?) RETURNING id")
            .bind(content)
            .fetch_one(&self.pool)
            .await?;
        Ok(QuestionId(rec.get::<i64, _>(0)))
    }

    pub async fn question_exists(&self, content: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE content = ? COLLATE NOCASE")
                .bind(content)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn delete_question(&self, id: QuestionId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    // ── saved pages ───────────────────────────────────────────────────

    pub async fn insert_page(&self, page: &NewPage) -> Result<PageId> {
        let streams = serde_json::to_string(&page.streams)?;
        let student_ids =
            serde_json::to_string(&page.student_ids.iter().map(|id| id.0).collect::<Vec<_>>())?;
        let rec = sqlx::query(
            "INSERT INTO pages (title, task, group_number, submission_date, streams, student_ids,
                                show_roster, program_id, course_id, question)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&page.title)
        .bind(task_kind_to_str(page.task_kind))
        .bind(page.group_number as i64)
        .bind(page.submission_date.as_deref())
        .bind(streams)
        .bind(student_ids)
        .bind(page.show_roster_table)
        .bind(page.program_id.map(|id| id.0))
        .bind(page.course_id.map(|id| id.0))
        .bind(page.question.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(PageId(rec.get::<i64, _>(0)))
    }

    pub async fn page_by_id(&self, id: PageId) -> Result<Option<StoredPage>> {
        let row = sqlx::query(
            "SELECT id, title, task, group_number, submission_date, streams, student_ids,
                    show_roster, program_id, course_id, question
             FROM pages WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let streams: Vec<String> = serde_json::from_str(&row.get::<String, _>(5))
            .context("corrupt streams column on saved page")?;
        let raw_ids: Vec<i64> = serde_json::from_str(&row.get::<String, _>(6))
            .context("corrupt student_ids column on saved page")?;

        Ok(Some(StoredPage {
            id: PageId(row.get::<i64, _>(0)),
            title: row.get::<String, _>(1),
            task_kind: task_kind_from_str(&row.get::<String, _>(2)),
            group_number: row.get::<i64, _>(3) as u32,
            submission_date: row.get::<Option<String>, _>(4),
            streams,
            student_ids: raw_ids.into_iter().map(StudentId).collect(),
            show_roster_table: row.get::<bool, _>(7),
            program_id: row.get::<Option<i64>, _>(8).map(ProgramId),
            course_id: row.get::<Option<i64>, _>(9).map(CourseId),
            question: row.get::<Option<String>, _>(10),
        }))
    }

    pub async fn delete_page(&self, id: PageId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM pages WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    // ── paged listings ────────────────────────────────────────────────

    /// Count of rows matching the collection's search fields, the same
    /// fields the paged listing queries filter on.
    pub async fn count_collection(&self, collection: Collection, search: &str) -> Result<u64> {
        let pattern = like_pattern(search);
        let (sql, binds) = match collection {
            Collection::Students => (
                "SELECT COUNT(*) FROM students
                 WHERE fullname LIKE ? ESCAPE '\\' OR regnumber LIKE ? ESCAPE '\\'",
                2,
            ),
            Collection::Programs => (
                "SELECT COUNT(*) FROM programs
                 WHERE name LIKE ? ESCAPE '\\' OR abbrev LIKE ? ESCAPE '\\'",
                2,
            ),
            Collection::Courses => (
                "SELECT COUNT(*) FROM courses c
                 LEFT JOIN facilitators f ON f.id = c.facilitator_id
                 WHERE c.name LIKE ? ESCAPE '\\' OR c.code LIKE ? ESCAPE '\\'
                    OR COALESCE(f.name, '') LIKE ? ESCAPE '\\'",
                3,
            ),
            Collection::Questions => (
                "SELECT COUNT(*) FROM questions WHERE content LIKE ? ESCAPE '\\'",
                1,
            ),
            Collection::Pages => (
                "SELECT COUNT(*) FROM pages
                 WHERE title LIKE ? ESCAPE '\\' OR task LIKE ? ESCAPE '\\'",
                2,
            ),
        };

        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for _ in 0..binds {
            query = query.bind(&pattern);
        }
        let count = query.fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    pub async fn list_students_page(
        &self,
        search: &str,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<StudentRef>> {
        let rows = sqlx::query(
            "SELECT id, fullname, regnumber FROM students
             WHERE fullname LIKE ? ESCAPE '\\' OR regnumber LIKE ? ESCAPE '\\'
             ORDER BY fullname COLLATE NOCASE ASC
             LIMIT ? OFFSET ?",
        )
        .bind(like_pattern(search))
        .bind(like_pattern(search))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(student_from_row).collect())
    }

    pub async fn list_programs_page(
        &self,
        search: &str,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<ProgramRef>> {
        let rows = sqlx::query(
            "SELECT id, name, abbrev FROM programs
             WHERE name LIKE ? ESCAPE '\\' OR abbrev LIKE ? ESCAPE '\\'
             ORDER BY name COLLATE NOCASE ASC
             LIMIT ? OFFSET ?",
        )
        .bind(like_pattern(search))
        .bind(like_pattern(search))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(program_from_row).collect())
    }

    pub async fn list_courses_page(
        &self,
        search: &str,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<CourseRef>> {
        let rows = sqlx::query(
            "SELECT c.id, c.name, c.code, f.name
             FROM courses c
             LEFT JOIN facilitators f ON f.id = c.facilitator_id
             WHERE c.name LIKE ? ESCAPE '\\' OR c.code LIKE ? ESCAPE '\\'
                OR COALESCE(f.name, '') LIKE ? ESCAPE '\\'
             ORDER BY c.name COLLATE NOCASE ASC
             LIMIT ? OFFSET ?",
        )
        .bind(like_pattern(search))
        .bind(like_pattern(search))
        .bind(like_pattern(search))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(course_from_row).collect())
    }

    pub async fn list_questions_page(
        &self,
        search: &str,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<QuestionSummary>> {
        let rows = sqlx::query(
            "SELECT id, content FROM questions
             WHERE content LIKE ? ESCAPE '\\'
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(like_pattern(search))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| QuestionSummary {
                id: QuestionId(r.get::<i64, _>(0)),
                content: r.get::<String, _>(1),
            })
            .collect())
    }

    pub async fn list_pages_page(
        &self,
        search: &str,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<PageSummary>> {
        let rows = sqlx::query(
            "SELECT id, title, created_at FROM pages
             WHERE title LIKE ? ESCAPE '\\' OR task LIKE ? ESCAPE '\\'
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(like_pattern(search))
        .bind(like_pattern(search))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| PageSummary {
                id: PageId(r.get::<i64, _>(0)),
                title: r.get::<String, _>(1),
                created_at: r.get::<chrono::NaiveDateTime, _>(2),
            })
            .collect())
    }
}

fn student_from_row(row: sqlx::sqlite::SqliteRow) -> StudentRef {
    StudentRef {
        id: StudentId(row.get::<i64, _>(0)),
        fullname: row.get::<String, _>(1),
        regnumber: row.get::<String, _>(2),
    }
}

fn program_from_row(row: sqlx::sqlite::SqliteRow) -> ProgramRef {
    ProgramRef {
        id: ProgramId(row.get::<i64, _>(0)),
        name: row.get::<String, _>(1),
        abbrev: row.get::<String, _>(2),
    }
}

fn course_from_row(row: sqlx::sqlite::SqliteRow) -> CourseRef {
    CourseRef {
        id: CourseId(row.get::<i64, _>(0)),
        name: row.get::<String, _>(1),
        code: row.get::<String, _>(2),
        facilitator: row.get::<Option<String>, _>(3),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return Ok(());
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create parent directory '{}' for database url '{database_url}'",
                    parent.display()
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
