use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::reorder::plan_reorder;
use shared::{
    domain::{ChapterId, CourseId, UserId},
    error::ApiException,
    validation::{validate_reorder_list, validate_title},
};
use storage::{ReorderOutcome, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/dashboard.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateCourse {
        owner_user_id: String,
        title: String,
    },
    ListCourses {
        owner_user_id: String,
    },
    CreateChapter {
        course_id: CourseId,
        title: String,
    },
    ListChapters {
        course_id: CourseId,
    },
    /// Rewrites positions so chapters display in the given order.
    Reorder {
        owner_user_id: String,
        course_id: CourseId,
        #[arg(required = true)]
        chapter_ids: Vec<ChapterId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateCourse {
            owner_user_id,
            title,
        } => {
            let title = validate_title(&title).map_err(ApiException::from)?;
            let course = storage
                .create_course(&UserId::new(owner_user_id), &title)
                .await?;
            println!("created course_id={}", course.course_id);
        }
        Command::ListCourses { owner_user_id } => {
            for course in storage
                .list_courses_for_owner(&UserId::new(owner_user_id))
                .await?
            {
                println!("{}\t{}", course.course_id, course.title);
            }
        }
        Command::CreateChapter { course_id, title } => {
            let title = validate_title(&title).map_err(ApiException::from)?;
            if storage.course(course_id).await?.is_none() {
                bail!("course {course_id} not found");
            }
            let chapter = storage.create_chapter(course_id, &title).await?;
            println!(
                "created chapter_id={} position={}",
                chapter.chapter_id, chapter.position
            );
        }
        Command::ListChapters { course_id } => {
            for chapter in storage.list_chapters(course_id).await? {
                println!("{}\t{}\t{}", chapter.position, chapter.chapter_id, chapter.title);
            }
        }
        Command::Reorder {
            owner_user_id,
            course_id,
            chapter_ids,
        } => {
            let current = storage.list_chapters(course_id).await?;
            let plan = plan_reorder(&current, &chapter_ids)?;
            if plan.is_noop() {
                println!("order unchanged");
                return Ok(());
            }
            validate_reorder_list(&plan.updates).map_err(ApiException::from)?;
            match storage
                .reorder_chapters(course_id, &UserId::new(owner_user_id), &plan.updates)
                .await?
            {
                ReorderOutcome::Applied { updated } => println!("updated {updated} chapters"),
                ReorderOutcome::CourseNotFound => bail!("course {course_id} not found"),
                ReorderOutcome::NotOwner => bail!("caller does not own course {course_id}"),
                ReorderOutcome::ForeignChapter(id) => {
                    bail!("chapter {id} does not belong to course {course_id}")
                }
            }
        }
    }

    Ok(())
}
