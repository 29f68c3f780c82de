use serde_json::Value;

use shared::{
    domain::{Collection, CourseId, FacilitatorId, PageId, ProgramId, QuestionId, StudentId},
    error::ApiError,
    protocol::{
        ActionOutcome, CourseUpsert, CoverPageDocument, FacilitatorUpsert, PageMeta, PageRequest,
        PageResult, ProgramUpsert, StudentUpsert,
    },
};
use storage::{NewPage, Storage};

pub const DEFAULT_PER_PAGE: u32 = 10;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// Clamps a requested page: non-positive pages land on 1, pages past the
/// end land on the last page, and an empty set still reports one (empty)
/// page.
fn clamp_page(requested: u32, total_count: u64, per_page: u32) -> (u32, u32) {
    let total_pages = if total_count == 0 {
        1
    } else {
        total_count.div_ceil(per_page as u64) as u32
    };
    let page = requested.clamp(1, total_pages);
    (page, total_pages)
}

fn page_meta(page: u32, total_pages: u32, total_count: u64, per_page: u32) -> PageMeta {
    let (start_index, end_index) = if total_count == 0 {
        (0, 0)
    } else {
        let start = (page as u64 - 1) * per_page as u64 + 1;
        let end = (page as u64 * per_page as u64).min(total_count);
        (start, end)
    };
    PageMeta {
        current_page: page,
        total_pages,
        total_count,
        per_page,
        has_previous: page > 1,
        has_next: page < total_pages,
        start_index,
        end_index,
    }
}

/// One listing endpoint serves every collection; items are serialized with
/// the collection's own row shape.
pub async fn paginate(
    ctx: &ApiContext,
    request: &PageRequest,
) -> Result<PageResult<Value>, ApiError> {
    let per_page = if request.per_page == 0 {
        DEFAULT_PER_PAGE
    } else {
        request.per_page
    };
    let search = request.search.trim();

    let total_count = ctx
        .storage
        .count_collection(request.collection, search)
        .await
        .map_err(internal)?;
    let (page, total_pages) = clamp_page(request.page, total_count, per_page);
    let offset = (page as u64 - 1) * per_page as u64;

    let items = match request.collection {
        Collection::Students => ctx
            .storage
            .list_students_page(search, per_page, offset)
            .await
            .map_err(internal)?
            .into_iter()
            .map(|row| serde_json::to_value(row).map_err(serialize))
            .collect::<Result<Vec<_>, _>>()?,
        Collection::Programs => ctx
            .storage
            .list_programs_page(search, per_page, offset)
            .await
            .map_err(internal)?
            .into_iter()
            .map(|row| serde_json::to_value(row).map_err(serialize))
            .collect::<Result<Vec<_>, _>>()?,
        Collection::Courses => ctx
            .storage
            .list_courses_page(search, per_page, offset)
            .await
            .map_err(internal)?
            .into_iter()
            .map(|row| serde_json::to_value(row).map_err(serialize))
            .collect::<Result<Vec<_>, _>>()?,
        Collection::Questions => ctx
            .storage
            .list_questions_page(search, per_page, offset)
            .await
            .map_err(internal)?
            .into_iter()
            .map(|row| serde_json::to_value(row).map_err(serialize))
            .collect::<Result<Vec<_>, _>>()?,
        Collection::Pages => ctx
            .storage
            .list_pages_page(search, per_page, offset)
            .await
            .map_err(internal)?
            .into_iter()
            .map(|row| serde_json::to_value(row).map_err(serialize))
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(PageResult {
        items,
        pagination: page_meta(page, total_pages, total_count, per_page),
    })
}

// ── questions ─────────────────────────────────────────────────────────

pub async fn save_question(ctx: &ApiContext, content: &str) -> Result<ActionOutcome, ApiError> {
    let content = content.trim();
    if content.len() < 5 {
        return Err(ApiError::validation("Question is too short."));
    }

    // A duplicate still reports success so repeated submits stay quiet.
    if ctx
        .storage
        .question_exists(content)
        .await
        .map_err(internal)?
    {
        return Ok(ActionOutcome::ok("Question saved successfully!"));
    }

    ctx.storage
        .insert_question(content)
        .await
        .map_err(internal)?;
    Ok(ActionOutcome::ok("Question saved successfully!"))
}

pub async fn delete_question(
    ctx: &ApiContext,
    id: QuestionId,
) -> Result<ActionOutcome, ApiError> {
    if ctx.storage.delete_question(id).await.map_err(internal)? {
        tracing::debug!(question = id.0, "question deleted");
        Ok(ActionOutcome::ok("Question deleted successfully!"))
    } else {
        Err(ApiError::not_found("Failed to delete question."))
    }
}

// ── cover pages ───────────────────────────────────────────────────────

pub async fn save_cover_page(
    ctx: &ApiContext,
    document: &CoverPageDocument,
) -> Result<ActionOutcome, ApiError> {
    let title = document.title.trim();
    if title.len() < 3 {
        return Err(ApiError::validation("Task name is too short"));
    }

    // Stale refs are tolerated; a page whose program or course vanished
    // since composition saves with NULL links.
    let program_id = match &document.program {
        Some(program) => ctx
            .storage
            .program_by_id(program.id)
            .await
            .map_err(internal)?
            .map(|p| p.id),
        None => None,
    };
    let course_id = match &document.course {
        Some(course) => ctx
            .storage
            .course_by_id(course.id)
            .await
            .map_err(internal)?
            .map(|c| c.id),
        None => None,
    };

    let question = match document.question.trim() {
        "" => None,
        q => Some(q.to_string()),
    };

    let new_page = NewPage {
        title: title.to_string(),
        task_kind: document.task_kind,
        group_number: document.group_number,
        submission_date: document.submission_date.clone(),
        streams: document.streams.clone(),
        student_ids: document.students.iter().map(|s| s.id).collect(),
        show_roster_table: document.show_roster_table,
        program_id,
        course_id,
        question,
    };

    let id = ctx.storage.insert_page(&new_page).await.map_err(internal)?;
    tracing::info!(page = id.0, students = new_page.student_ids.len(), "cover page saved");
    Ok(ActionOutcome::ok("Page saved successfully!"))
}

pub async fn load_page(ctx: &ApiContext, id: PageId) -> Result<CoverPageDocument, ApiError> {
    let stored = ctx
        .storage
        .page_by_id(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("Saved page not found."))?;

    let students = ctx
        .storage
        .students_by_ids(&stored.student_ids)
        .await
        .map_err(internal)?;
    let program = match stored.program_id {
        Some(pid) => ctx.storage.program_by_id(pid).await.map_err(internal)?,
        None => None,
    };
    let course = match stored.course_id {
        Some(cid) => ctx.storage.course_by_id(cid).await.map_err(internal)?,
        None => None,
    };

    Ok(CoverPageDocument {
        task_kind: stored.task_kind,
        group_number: stored.group_number,
        submission_date: stored.submission_date,
        streams: stored.streams,
        students,
        program,
        course,
        question: stored.question.unwrap_or_default(),
        show_roster_table: stored.show_roster_table,
        title: stored.title,
    })
}

pub async fn delete_page(ctx: &ApiContext, id: PageId) -> Result<ActionOutcome, ApiError> {
    if ctx.storage.delete_page(id).await.map_err(internal)? {
        Ok(ActionOutcome::ok("Page deleted successfully!"))
    } else {
        Err(ApiError::not_found("Failed to delete page."))
    }
}

// ── registry CRUD ─────────────────────────────────────────────────────

pub async fn create_student(
    ctx: &ApiContext,
    upsert: &StudentUpsert,
) -> Result<ActionOutcome, ApiError> {
    let (fullname, regnumber, program_id) = validate_student(ctx, upsert, None).await?;
    ctx.storage
        .create_student(&fullname, &regnumber, program_id)
        .await
        .map_err(internal)?;
    Ok(ActionOutcome::ok("New student added successfully!"))
}

pub async fn update_student(
    ctx: &ApiContext,
    id: StudentId,
    upsert: &StudentUpsert,
) -> Result<ActionOutcome, ApiError> {
    let (fullname, regnumber, program_id) = validate_student(ctx, upsert, Some(id)).await?;
    if ctx
        .storage
        .update_student(id, &fullname, &regnumber, program_id)
        .await
        .map_err(internal)?
    {
        Ok(ActionOutcome::ok("Student updated successfully!"))
    } else {
        Err(ApiError::not_found("Student not found."))
    }
}

pub async fn delete_student(ctx: &ApiContext, id: StudentId) -> Result<ActionOutcome, ApiError> {
    if ctx.storage.delete_student(id).await.map_err(internal)? {
        Ok(ActionOutcome::ok("Student deleted successfully!"))
    } else {
        Err(ApiError::not_found("Student not found."))
    }
}

async fn validate_student(
    ctx: &ApiContext,
    upsert: &StudentUpsert,
    exclude: Option<StudentId>,
) -> Result<(String, String, Option<ProgramId>), ApiError> {
    let fullname = upsert.fullname.trim().to_string();
    let regnumber = upsert.regnumber.trim().to_string();

    if fullname.len() < 3 {
        return Err(ApiError::validation(
            "Full name must have at least 3 characters.",
        ));
    }
    if regnumber.len() < 3 {
        return Err(ApiError::validation(
            "Registration number must have at least 3 characters.",
        ));
    }
    if ctx
        .storage
        .regnumber_taken(&regnumber, exclude)
        .await
        .map_err(internal)?
    {
        return Err(ApiError::validation(
            "This registration number already exists.",
        ));
    }

    let program_id = match upsert.program_id {
        Some(raw) => Some(
            ctx.storage
                .program_by_id(ProgramId(raw))
                .await
                .map_err(internal)?
                .ok_or_else(|| ApiError::validation("Selected program not found."))?
                .id,
        ),
        None => None,
    };

    Ok((fullname, regnumber, program_id))
}

pub async fn create_program(
    ctx: &ApiContext,
    upsert: &ProgramUpsert,
) -> Result<ActionOutcome, ApiError> {
    let (name, abbrev) = validate_program(ctx, upsert, None).await?;
    ctx.storage
        .create_program(&name, &abbrev)
        .await
        .map_err(internal)?;
    Ok(ActionOutcome::ok("New program added successfully!"))
}

pub async fn update_program(
    ctx: &ApiContext,
    id: ProgramId,
    upsert: &ProgramUpsert,
) -> Result<ActionOutcome, ApiError> {
    let (name, abbrev) = validate_program(ctx, upsert, Some(id)).await?;
    if ctx
        .storage
        .update_program(id, &name, &abbrev)
        .await
        .map_err(internal)?
    {
        Ok(ActionOutcome::ok("Program updated successfully!"))
    } else {
        Err(ApiError::not_found("Program not found."))
    }
}

pub async fn delete_program(ctx: &ApiContext, id: ProgramId) -> Result<ActionOutcome, ApiError> {
    if ctx.storage.delete_program(id).await.map_err(internal)? {
        Ok(ActionOutcome::ok("Program deleted successfully!"))
    } else {
        Err(ApiError::not_found("Program not found."))
    }
}

async fn validate_program(
    ctx: &ApiContext,
    upsert: &ProgramUpsert,
    exclude: Option<ProgramId>,
) -> Result<(String, String), ApiError> {
    let name = upsert.name.trim().to_string();
    let abbrev = upsert.abbrev.trim().to_string();

    if name.len() < 3 {
        return Err(ApiError::validation(
            "Program name must have at least 3 characters.",
        ));
    }
    if abbrev.len() < 2 {
        return Err(ApiError::validation(
            "Abbreviation must have at least 2 characters.",
        ));
    }
    if ctx
        .storage
        .program_abbrev_taken(&abbrev, exclude)
        .await
        .map_err(internal)?
    {
        return Err(ApiError::validation("This abbreviation already exists."));
    }

    Ok((name, abbrev))
}

pub async fn create_course(
    ctx: &ApiContext,
    upsert: &CourseUpsert,
) -> Result<ActionOutcome, ApiError> {
    let (name, code, facilitator_id) = validate_course(ctx, upsert, None).await?;
    ctx.storage
        .create_course(&name, &code, facilitator_id)
        .await
        .map_err(internal)?;
    Ok(ActionOutcome::ok("New course added successfully!"))
}

pub async fn update_course(
    ctx: &ApiContext,
    id: CourseId,
    upsert: &CourseUpsert,
) -> Result<ActionOutcome, ApiError> {
    let (name, code, facilitator_id) = validate_course(ctx, upsert, Some(id)).await?;
    if ctx
        .storage
        .update_course(id, &name, &code, facilitator_id)
        .await
        .map_err(internal)?
    {
        Ok(ActionOutcome::ok("Course updated successfully!"))
    } else {
        Err(ApiError::not_found("Course not found."))
    }
}

pub async fn delete_course(ctx: &ApiContext, id: CourseId) -> Result<ActionOutcome, ApiError> {
    if ctx.storage.delete_course(id).await.map_err(internal)? {
        Ok(ActionOutcome::ok("Course deleted successfully!"))
    } else {
        Err(ApiError::not_found("Course not found."))
    }
}

async fn validate_course(
    ctx: &ApiContext,
    upsert: &CourseUpsert,
    exclude: Option<CourseId>,
) -> Result<(String, String, Option<FacilitatorId>), ApiError> {
    let name = upsert.name.trim().to_string();
    let code = upsert.code.trim().to_string();

    if name.len() < 3 {
        return Err(ApiError::validation(
            "Course name must have at least 3 characters.",
        ));
    }
    if code.len() < 2 {
        return Err(ApiError::validation(
            "Course code must have at least 2 characters.",
        ));
    }
    if ctx
        .storage
        .course_code_taken(&code, exclude)
        .await
        .map_err(internal)?
    {
        return Err(ApiError::validation("This course code already exists."));
    }

    let facilitator_id = match upsert.facilitator_id {
        Some(raw) => {
            let id = FacilitatorId(raw);
            ctx.storage
                .facilitator_name(id)
                .await
                .map_err(internal)?
                .ok_or_else(|| ApiError::validation("Selected facilitator not found."))?;
            Some(id)
        }
        None => None,
    };

    Ok((name, code, facilitator_id))
}

pub async fn create_facilitator(
    ctx: &ApiContext,
    upsert: &FacilitatorUpsert,
) -> Result<ActionOutcome, ApiError> {
    let name = upsert.name.trim();
    if name.len() < 3 {
        return Err(ApiError::validation(
            "Facilitator name must have at least 3 characters.",
        ));
    }
    ctx.storage
        .create_facilitator(name)
        .await
        .map_err(internal)?;
    Ok(ActionOutcome::ok("New facilitator added successfully!"))
}

pub async fn update_facilitator(
    ctx: &ApiContext,
    id: FacilitatorId,
    upsert: &FacilitatorUpsert,
) -> Result<ActionOutcome, ApiError> {
    let name = upsert.name.trim();
    if name.len() < 3 {
        return Err(ApiError::validation(
            "Facilitator name must have at least 3 characters.",
        ));
    }
    if ctx
        .storage
        .update_facilitator(id, name)
        .await
        .map_err(internal)?
    {
        Ok(ActionOutcome::ok("Facilitator updated successfully!"))
    } else {
        Err(ApiError::not_found("Facilitator not found."))
    }
}

pub async fn delete_facilitator(
    ctx: &ApiContext,
    id: FacilitatorId,
) -> Result<ActionOutcome, ApiError> {
    if ctx
        .storage
        .delete_facilitator(id)
        .await
        .map_err(internal)?
    {
        Ok(ActionOutcome::ok("Facilitator deleted successfully!"))
    } else {
        Err(ApiError::not_found("Facilitator not found."))
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(err.to_string())
}

fn serialize(err: serde_json::Error) -> ApiError {
    ApiError::internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{domain::TaskKind, error::ErrorCode};

    async fn setup() -> ApiContext {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let facil = storage.create_facilitator("Dr. Mushi").await.expect("facilitator");
        let program = storage
            .create_program("Clinical Medicine", "CM")
            .await
            .expect("program");
        storage
            .create_course("Anatomy I", "CM 101", Some(facil))
            .await
            .expect("course");
        for n in 1..=25 {
            storage
                .create_student(
                    &format!("Student {n:02}"),
                    &format!("CM-{n:03}"),
                    Some(program),
                )
                .await
                .expect("student");
        }
        ApiContext { storage }
    }

    fn request(page: u32, search: &str) -> PageRequest {
        PageRequest {
            collection: Collection::Students,
            page,
            search: search.into(),
            per_page: 10,
        }
    }

    #[tokio::test]
    async fn paginate_reports_full_page_metadata() {
        let ctx = setup().await;
        let result = paginate(&ctx, &request(2, "")).await.expect("page");
        assert_eq!(result.items.len(), 10);
        let meta = result.pagination;
        assert_eq!(meta.current_page, 2);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.total_count, 25);
        assert!(meta.has_previous);
        assert!(meta.has_next);
        assert_eq!(meta.start_index, 11);
        assert_eq!(meta.end_index, 20);
    }

    #[tokio::test]
    async fn page_past_the_end_lands_on_last_page() {
        let ctx = setup().await;
        let result = paginate(&ctx, &request(99, "")).await.expect("page");
        assert_eq!(result.pagination.current_page, 3);
        assert_eq!(result.items.len(), 5);
        assert!(!result.pagination.has_next);
    }

    #[tokio::test]
    async fn page_zero_lands_on_first_page() {
        let ctx = setup().await;
        let result = paginate(&ctx, &request(0, "")).await.expect("page");
        assert_eq!(result.pagination.current_page, 1);
        assert!(!result.pagination.has_previous);
    }

    #[tokio::test]
    async fn empty_result_is_one_empty_page() {
        let ctx = setup().await;
        let result = paginate(&ctx, &request(1, "no such student")).await.expect("page");
        assert!(result.items.is_empty());
        let meta = result.pagination;
        assert_eq!(meta.total_pages, 1);
        assert_eq!(meta.total_count, 0);
        assert_eq!(meta.start_index, 0);
        assert_eq!(meta.end_index, 0);
        assert_eq!(meta.summary("students"), "No students found");
    }

    #[tokio::test]
    async fn short_question_is_rejected() {
        let ctx = setup().await;
        let err = save_question(&ctx, "  hi  ").await.expect_err("too short");
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(err.message, "Question is too short.");
    }

    #[tokio::test]
    async fn duplicate_question_reports_success_without_insert() {
        let ctx = setup().await;
        save_question(&ctx, "Describe the cardiac cycle.")
            .await
            .expect("first save");
        save_question(&ctx, "DESCRIBE THE CARDIAC CYCLE.")
            .await
            .expect("duplicate save");
        assert_eq!(
            ctx.storage
                .count_collection(Collection::Questions, "")
                .await
                .expect("count"),
            1
        );
    }

    #[tokio::test]
    async fn duplicate_regnumber_is_rejected() {
        let ctx = setup().await;
        let err = create_student(
            &ctx,
            &StudentUpsert {
                fullname: "New Student".into(),
                regnumber: "cm-001".into(),
                program_id: None,
            },
        )
        .await
        .expect_err("duplicate");
        assert_eq!(err.message, "This registration number already exists.");
    }

    #[tokio::test]
    async fn unknown_program_is_rejected() {
        let ctx = setup().await;
        let err = create_student(
            &ctx,
            &StudentUpsert {
                fullname: "New Student".into(),
                regnumber: "XX-999".into(),
                program_id: Some(404),
            },
        )
        .await
        .expect_err("unknown program");
        assert_eq!(err.message, "Selected program not found.");
    }

    #[tokio::test]
    async fn cover_page_round_trip() {
        let ctx = setup().await;
        let program = ctx
            .storage
            .program_by_abbrev("CM")
            .await
            .expect("lookup")
            .expect("program");
        let course = ctx
            .storage
            .course_by_code("CM 101")
            .await
            .expect("lookup")
            .expect("course");
        let students = ctx
            .storage
            .list_students_page("", 2, 0)
            .await
            .expect("students");

        let document = CoverPageDocument {
            task_kind: TaskKind::Group,
            group_number: 3,
            submission_date: Some("2026-04-10".into()),
            streams: vec!["A".into(), "B".into()],
            students: students.clone(),
            program: Some(program),
            course: Some(course),
            question: "<p>Draw the humerus.</p>".into(),
            show_roster_table: true,
            title: "CM: Anatomy I - Dr. Mushi".into(),
        };

        let outcome = save_cover_page(&ctx, &document).await.expect("save");
        assert!(outcome.success);

        let saved = ctx
            .storage
            .list_pages_page("", 10, 0)
            .await
            .expect("pages");
        assert_eq!(saved.len(), 1);
        let loaded = load_page(&ctx, saved[0].id).await.expect("load");
        assert_eq!(loaded, document);
    }

    #[tokio::test]
    async fn cover_page_save_tolerates_stale_refs() {
        let ctx = setup().await;
        let program = ctx
            .storage
            .program_by_abbrev("CM")
            .await
            .expect("lookup")
            .expect("program");
        ctx.storage
            .delete_program(program.id)
            .await
            .expect("delete");

        let document = CoverPageDocument {
            program: Some(program),
            title: "CM: orphaned".into(),
            ..CoverPageDocument::default()
        };
        save_cover_page(&ctx, &document).await.expect("save");

        let saved = ctx.storage.list_pages_page("", 10, 0).await.expect("pages");
        let loaded = load_page(&ctx, saved[0].id).await.expect("load");
        assert_eq!(loaded.program, None, "stale program stored as NULL");
    }

    #[tokio::test]
    async fn short_title_is_rejected_before_insert() {
        let ctx = setup().await;
        let document = CoverPageDocument {
            title: "ab".into(),
            ..CoverPageDocument::default()
        };
        let err = save_cover_page(&ctx, &document).await.expect_err("short");
        assert_eq!(err.message, "Task name is too short");
        assert_eq!(
            ctx.storage
                .count_collection(Collection::Pages, "")
                .await
                .expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn deleting_missing_page_is_not_found() {
        let ctx = setup().await;
        let err = delete_page(&ctx, PageId(404)).await.expect_err("missing");
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
