use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{
    CollectionPager, CompositionBackend, HttpBackend, ListingBackend, RegistryBackend,
    RegistryController,
};
use shared::{
    domain::{Collection, PageId, StudentRef},
    protocol::StudentUpsert,
};

/// Command line front end for the cover page server, useful for poking at a
/// running instance without the web UI.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8088")]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one page of a collection.
    List {
        collection: Collection,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Register a student.
    AddStudent {
        fullname: String,
        regnumber: String,
        #[arg(long)]
        program_id: Option<i64>,
    },
    /// Delete students by id.
    DeleteStudents { ids: Vec<i64> },
    /// Add a question to the bank.
    SaveQuestion { content: String },
    /// Print a saved cover page.
    ShowPage { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();
    let backend = HttpBackend::new(&cli.server_url)?;

    match cli.command {
        Command::List {
            collection,
            page,
            search,
        } => {
            let pager = CollectionPager::<serde_json::Value>::new(
                collection,
                Arc::new(backend) as Arc<dyn ListingBackend<serde_json::Value>>,
            );
            pager.set_search_now(&search).await?;
            pager.go_to(page).await?;
            println!("{}", pager.summary(collection.as_str()).await);
            for item in pager.items().await {
                println!("{item}");
            }
        }
        Command::AddStudent {
            fullname,
            regnumber,
            program_id,
        } => {
            let shared_backend = Arc::new(backend);
            let pager = CollectionPager::<StudentRef>::new(
                Collection::Students,
                Arc::clone(&shared_backend) as Arc<dyn ListingBackend<StudentRef>>,
            );
            let controller = RegistryController::new(
                pager,
                shared_backend as Arc<dyn RegistryBackend<StudentRef>>,
            );
            let outcome = controller
                .create(&StudentUpsert {
                    fullname,
                    regnumber,
                    program_id,
                })
                .await?;
            println!("{}", outcome.message);
        }
        Command::DeleteStudents { ids } => {
            let shared_backend = Arc::new(backend);
            let pager = CollectionPager::<StudentRef>::new(
                Collection::Students,
                Arc::clone(&shared_backend) as Arc<dyn ListingBackend<StudentRef>>,
            );
            let controller = RegistryController::new(
                pager,
                shared_backend as Arc<dyn RegistryBackend<StudentRef>>,
            );
            for id in ids {
                controller.toggle_row(id).await;
            }
            let tally = controller.delete_selected().await?;
            println!("deleted {} row(s), {} refused", tally.deleted, tally.failed);
        }
        Command::SaveQuestion { content } => {
            let outcome = backend.save_question(&content).await?;
            println!("{}", outcome.message);
        }
        Command::ShowPage { id } => {
            let document = backend.load_page(PageId(id)).await?;
            println!("{}", document.title);
            println!("{}", document.task_kind.heading());
            for student in &document.students {
                println!("  {}  {}", student.regnumber, student.fullname);
            }
            if !document.question.is_empty() {
                println!("question: {}", document.question);
            }
        }
    }

    Ok(())
}
