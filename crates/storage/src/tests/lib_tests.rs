use super::*;

async fn seeded() -> Storage {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let facil = storage.create_facilitator("Dr. Mushi").await.expect("facilitator");
    let program = storage.create_program("Clinical Medicine", "CM").await.expect("program");
    storage
        .create_course("Anatomy I", "CM 101", Some(facil))
        .await
        .expect("course");
    storage
        .create_course("Physiology", "CM 102", None)
        .await
        .expect("course");
    for (name, regno) in [
        ("Asha Juma", "CM-001"),
        ("Baraka Nyerere", "CM-002"),
        ("Chausiku Hamisi", "CM-003"),
    ] {
        storage
            .create_student(name, regno, Some(program))
            .await
            .expect("student");
    }
    storage
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("school_admin_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn lists_students_ordered_by_name() {
    let storage = seeded().await;
    let students = storage.list_students_page("", 10, 0).await.expect("page");
    let names: Vec<&str> = students.iter().map(|s| s.fullname.as_str()).collect();
    assert_eq!(names, vec!["Asha Juma", "Baraka Nyerere", "Chausiku Hamisi"]);
}

#[tokio::test]
async fn search_matches_name_or_regnumber() {
    let storage = seeded().await;

    let by_name = storage.list_students_page("bara", 10, 0).await.expect("page");
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].fullname, "Baraka Nyerere");

    let by_regno = storage.list_students_page("cm-003", 10, 0).await.expect("page");
    assert_eq!(by_regno.len(), 1);
    assert_eq!(by_regno[0].fullname, "Chausiku Hamisi");

    assert_eq!(
        storage
            .count_collection(Collection::Students, "cm-")
            .await
            .expect("count"),
        3
    );
}

#[tokio::test]
async fn like_wildcards_are_literal_in_search() {
    let storage = seeded().await;
    let hits = storage.list_students_page("%", 10, 0).await.expect("page");
    assert!(hits.is_empty(), "a literal %% should match nothing");
}

#[tokio::test]
async fn limit_and_offset_slice_the_collection() {
    let storage = seeded().await;
    let page = storage.list_students_page("", 2, 2).await.expect("page");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].fullname, "Chausiku Hamisi");
}

#[tokio::test]
async fn course_listing_carries_facilitator_label() {
    let storage = seeded().await;
    let courses = storage.list_courses_page("", 10, 0).await.expect("page");
    assert_eq!(courses.len(), 2);
    assert_eq!(courses[0].facilitator.as_deref(), Some("Dr. Mushi"));
    assert_eq!(courses[1].facilitator, None);
    assert_eq!(courses[1].facilitator_label(), "N/A");
}

#[tokio::test]
async fn course_search_reaches_facilitator_name() {
    let storage = seeded().await;
    let hits = storage.list_courses_page("mushi", 10, 0).await.expect("page");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].code, "CM 101");
}

#[tokio::test]
async fn regnumber_check_is_case_insensitive() {
    let storage = seeded().await;
    assert!(storage.regnumber_taken("cm-001", None).await.expect("check"));

    let students = storage.list_students_page("CM-001", 10, 0).await.expect("page");
    let own_id = students[0].id;
    assert!(!storage
        .regnumber_taken("CM-001", Some(own_id))
        .await
        .expect("check"));
}

#[tokio::test]
async fn question_round_trip_and_duplicate_check() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let id = storage
        .insert_question("<p>Describe the cardiac cycle.</p>")
        .await
        .expect("insert");
    assert!(storage
        .question_exists("<P>DESCRIBE THE CARDIAC CYCLE.</P>")
        .await
        .expect("exists"));
    assert!(storage.delete_question(id).await.expect("delete"));
    assert!(!storage.delete_question(id).await.expect("second delete"));
}

#[tokio::test]
async fn page_round_trip_preserves_json_columns() {
    let storage = seeded().await;
    let students = storage.list_students_page("", 10, 0).await.expect("page");
    let program = storage.program_by_abbrev("cm").await.expect("lookup").expect("program");
    let course = storage.course_by_code("cm 101").await.expect("lookup").expect("course");

    let new_page = NewPage {
        title: "CM: Anatomy I - Dr. Mushi".into(),
        task_kind: TaskKind::Group,
        group_number: 4,
        submission_date: Some("2026-03-02".into()),
        streams: vec!["A".into(), "C".into()],
        student_ids: vec![students[1].id, students[0].id],
        show_roster_table: true,
        program_id: Some(program.id),
        course_id: Some(course.id),
        question: Some("<p>Label the diagram.</p>".into()),
    };

    let id = storage.insert_page(&new_page).await.expect("insert");
    let stored = storage.page_by_id(id).await.expect("load").expect("found");

    assert_eq!(stored.streams, vec!["A".to_string(), "C".to_string()]);
    assert_eq!(stored.student_ids, vec![students[1].id, students[0].id]);
    assert_eq!(stored.task_kind, TaskKind::Group);
    assert_eq!(stored.group_number, 4);
    assert_eq!(stored.program_id, Some(program.id));

    let hydrated = storage.students_by_ids(&stored.student_ids).await.expect("refs");
    assert_eq!(hydrated[0].id, students[1].id, "id order is preserved");

    assert!(storage.delete_page(id).await.expect("delete"));
    assert!(storage.page_by_id(id).await.expect("load").is_none());
}

#[tokio::test]
async fn deleting_program_nulls_student_fk() {
    let storage = seeded().await;
    let program = storage.program_by_abbrev("CM").await.expect("lookup").expect("program");
    assert!(storage.delete_program(program.id).await.expect("delete"));
    // Students survive the program deletion.
    assert_eq!(
        storage
            .count_collection(Collection::Students, "")
            .await
            .expect("count"),
        3
    );
}

#[tokio::test]
async fn empty_collection_counts_zero() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert_eq!(
        storage
            .count_collection(Collection::Pages, "")
            .await
            .expect("count"),
        0
    );
    assert!(storage.list_pages_page("", 10, 0).await.expect("page").is_empty());
}
