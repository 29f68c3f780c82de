use shared::domain::Collection;
use storage::{NewPage, Storage};

/// End-to-end pass over the schema: seed the registry, save a cover page
/// referencing it, then confirm the page survives edits elsewhere.
#[tokio::test]
async fn saved_page_survives_registry_churn() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let facilitator = storage
        .create_facilitator("Dr. Mushi")
        .await
        .expect("facilitator");
    let program = storage
        .create_program("Clinical Medicine", "CM")
        .await
        .expect("program");
    let course = storage
        .create_course("Anatomy I", "CM 101", Some(facilitator))
        .await
        .expect("course");
    let asha = storage
        .create_student("Asha Juma", "CM-001", Some(program))
        .await
        .expect("asha");
    let baraka = storage
        .create_student("Baraka Nyerere", "CM-002", Some(program))
        .await
        .expect("baraka");

    let page = storage
        .insert_page(&NewPage {
            title: "CM: Anatomy I - Dr. Mushi".into(),
            task_kind: Default::default(),
            group_number: 2,
            submission_date: Some("2026-04-10".into()),
            streams: vec!["A".into(), "B".into()],
            student_ids: vec![baraka, asha],
            show_roster_table: true,
            program_id: Some(program),
            course_id: Some(course),
            question: Some("<p>Draw the humerus.</p>".into()),
        })
        .await
        .expect("page");

    // Renaming a student does not disturb the stored roster order.
    storage
        .update_student(asha, "Asha J. Mrema", "CM-001", Some(program))
        .await
        .expect("rename");

    let stored = storage
        .page_by_id(page)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(stored.student_ids, vec![baraka, asha]);

    let roster = storage
        .students_by_ids(&stored.student_ids)
        .await
        .expect("roster");
    assert_eq!(roster[1].fullname, "Asha J. Mrema");

    // Removing the facilitator keeps the course, with the label gone.
    storage
        .delete_facilitator(facilitator)
        .await
        .expect("delete facilitator");
    let course_ref = storage
        .course_by_id(course)
        .await
        .expect("lookup")
        .expect("course");
    assert_eq!(course_ref.facilitator_label(), "N/A");

    assert_eq!(
        storage
            .count_collection(Collection::Pages, "")
            .await
            .expect("count"),
        1
    );

    let listed = storage.list_pages_page("", 10, 0).await.expect("pages");
    assert_eq!(listed[0].id, page);
    assert_eq!(listed[0].title, "CM: Anatomy I - Dr. Mushi");
}
