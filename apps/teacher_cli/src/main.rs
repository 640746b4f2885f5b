use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{
    format_price, view_state::CoursePanel, DashboardClient, DashboardEvent, NoticeLevel,
};
use shared::{
    domain::{AttachmentId, ChapterId, CourseId, UserId},
    protocol::{CourseDetail, UpdateCourseRequest},
};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8443")]
    server_url: String,
    #[arg(long)]
    user_id: String,
    /// Print the course as JSON instead of a listing.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateCourse {
        title: String,
    },
    Show {
        course_id: CourseId,
    },
    CreateChapter {
        course_id: CourseId,
        title: String,
    },
    /// Drags the chapter at display index FROM to display index TO.
    Move {
        course_id: CourseId,
        from: usize,
        to: usize,
    },
    Reorder {
        course_id: CourseId,
        #[arg(required = true)]
        chapter_ids: Vec<ChapterId>,
    },
    SetTitle {
        course_id: CourseId,
        title: String,
    },
    SetDescription {
        course_id: CourseId,
        description: String,
    },
    SetImage {
        course_id: CourseId,
        image_url: String,
    },
    SetPrice {
        course_id: CourseId,
        price: f64,
    },
    AddAttachment {
        course_id: CourseId,
        url: String,
    },
    DeleteAttachment {
        course_id: CourseId,
        attachment_id: AttachmentId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let client = DashboardClient::new(args.server_url, UserId::new(args.user_id))?;
    let mut events = client.subscribe_events();

    let result = run(&client, args.command, args.json).await;
    print_notices(&mut events);
    result
}

async fn run(client: &DashboardClient, command: Command, json: bool) -> Result<()> {
    match command {
        Command::CreateCourse { title } => {
            let course = client.create_course(&title).await?;
            println!("created course_id={}", course.course_id);
        }
        Command::Show { course_id } => {
            let detail = client.open_course(course_id).await?;
            print_course(&detail, json)?;
        }
        Command::CreateChapter { course_id, title } => {
            client.open_course(course_id).await?;
            client.toggle_chapter_creation();
            let chapter = client.create_chapter(&title).await?;
            println!(
                "created chapter_id={} position={}",
                chapter.chapter_id, chapter.position
            );
        }
        Command::Move { course_id, from, to } => {
            client.open_course(course_id).await?;
            client.move_chapter(from, to).await?;
            print_course(&client.refresh_course().await?, json)?;
        }
        Command::Reorder {
            course_id,
            chapter_ids,
        } => {
            client.open_course(course_id).await?;
            client.reorder_chapters(&chapter_ids).await?;
            print_course(&client.refresh_course().await?, json)?;
        }
        Command::SetTitle { course_id, title } => {
            let patch = UpdateCourseRequest {
                title: Some(title),
                ..Default::default()
            };
            save_panel(client, course_id, CoursePanel::Title, patch).await?;
        }
        Command::SetDescription {
            course_id,
            description,
        } => {
            let patch = UpdateCourseRequest {
                description: Some(description),
                ..Default::default()
            };
            save_panel(client, course_id, CoursePanel::Description, patch).await?;
        }
        Command::SetImage {
            course_id,
            image_url,
        } => {
            let patch = UpdateCourseRequest {
                image_url: Some(image_url),
                ..Default::default()
            };
            save_panel(client, course_id, CoursePanel::Image, patch).await?;
        }
        Command::SetPrice { course_id, price } => {
            let patch = UpdateCourseRequest {
                price: Some(price),
                ..Default::default()
            };
            save_panel(client, course_id, CoursePanel::Price, patch).await?;
        }
        Command::AddAttachment { course_id, url } => {
            client.open_course(course_id).await?;
            let attachment = client.add_attachment(&url).await?;
            println!(
                "added attachment_id={} name={}",
                attachment.attachment_id, attachment.name
            );
        }
        Command::DeleteAttachment {
            course_id,
            attachment_id,
        } => {
            client.open_course(course_id).await?;
            client.delete_attachment(attachment_id).await?;
        }
    }
    Ok(())
}

async fn save_panel(
    client: &DashboardClient,
    course_id: CourseId,
    panel: CoursePanel,
    patch: UpdateCourseRequest,
) -> Result<()> {
    client.open_course(course_id).await?;
    client.toggle_panel(panel);
    let course = client.update_course(panel, patch).await?;
    println!("{}  {}", course.title, format_price(course.price));
    Ok(())
}

fn print_course(detail: &CourseDetail, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(detail)?);
        return Ok(());
    }
    println!(
        "{} ({})  {}",
        detail.course.title,
        detail.course.course_id,
        format_price(detail.course.price)
    );
    for chapter in &detail.chapters {
        println!("  {:>3}  {}  {}", chapter.position, chapter.chapter_id, chapter.title);
    }
    for attachment in &detail.attachments {
        println!("  [file] {}  {}", attachment.attachment_id, attachment.name);
    }
    Ok(())
}

fn print_notices(events: &mut broadcast::Receiver<DashboardEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            DashboardEvent::Notice(notice) => match notice.level {
                NoticeLevel::Success => println!("{}", notice.text),
                NoticeLevel::Error => eprintln!("{}", notice.text),
            },
            other => debug!(?other, "dashboard event"),
        }
    }
}
