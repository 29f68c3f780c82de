use anyhow::Result;
use clap::{Parser, Subcommand};
use shared::domain::{Collection, FacilitatorId, ProgramId};
use storage::Storage;

/// Maintenance commands that talk straight to the database, for seeding a
/// fresh install or fixing records without the server running.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/meddy.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    AddFacilitator {
        name: String,
    },
    AddProgram {
        name: String,
        abbrev: String,
    },
    AddCourse {
        name: String,
        code: String,
        #[arg(long)]
        facilitator_id: Option<i64>,
    },
    AddStudent {
        fullname: String,
        regnumber: String,
        #[arg(long)]
        program_id: Option<i64>,
    },
    AddQuestion {
        content: String,
    },
    /// Fill an empty database with a small demo registry.
    SeedDemo,
    /// Row counts for every collection.
    Stats,
}

async fn seed_demo(storage: &Storage) -> Result<()> {
    let facilitator = storage.create_facilitator("Dr. Mushi").await?;
    let program = storage.create_program("Clinical Medicine", "CM").await?;
    storage
        .create_course("Anatomy I", "CM 101", Some(facilitator))
        .await?;
    storage.create_course("Physiology", "CM 102", None).await?;
    for (fullname, regnumber) in [
        ("Asha Juma", "CM-001"),
        ("Baraka Nyerere", "CM-002"),
        ("Chausiku Hamisi", "CM-003"),
        ("Daudi Mwakasege", "CM-004"),
    ] {
        storage
            .create_student(fullname, regnumber, Some(program))
            .await?;
    }
    storage
        .insert_question("<p>Describe the cardiac cycle.</p>")
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::AddFacilitator { name } => {
            let id = storage.create_facilitator(&name).await?;
            println!("created facilitator id={}", id.0);
        }
        Command::AddProgram { name, abbrev } => {
            let id = storage.create_program(&name, &abbrev).await?;
            println!("created program id={}", id.0);
        }
        Command::AddCourse {
            name,
            code,
            facilitator_id,
        } => {
            let id = storage
                .create_course(&name, &code, facilitator_id.map(FacilitatorId))
                .await?;
            println!("created course id={}", id.0);
        }
        Command::AddStudent {
            fullname,
            regnumber,
            program_id,
        } => {
            let id = storage
                .create_student(&fullname, &regnumber, program_id.map(ProgramId))
                .await?;
            println!("created student id={}", id.0);
        }
        Command::AddQuestion { content } => {
            let id = storage.insert_question(&content).await?;
            println!("created question id={}", id.0);
        }
        Command::SeedDemo => {
            seed_demo(&storage).await?;
            println!("demo registry seeded");
        }
        Command::Stats => {
            for collection in [
                Collection::Students,
                Collection::Programs,
                Collection::Courses,
                Collection::Questions,
                Collection::Pages,
            ] {
                let count = storage.count_collection(collection, "").await?;
                println!("{collection}: {count}");
            }
        }
    }

    Ok(())
}
