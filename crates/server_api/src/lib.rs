use shared::{
    domain::{Attachment, AttachmentId, Chapter, ChapterPosition, Course, CourseId, UserId},
    error::ApiError,
    protocol::{CourseDetail, UpdateCourseRequest},
    validation::{
        attachment_name_from_url, validate_attachment_url, validate_description,
        validate_image_url, validate_price, validate_reorder_list, validate_title,
    },
};
use storage::{ReorderOutcome, Storage};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn create_course(
    ctx: &ApiContext,
    user_id: &UserId,
    title: &str,
) -> Result<Course, ApiError> {
    let title = validate_title(title)?;
    let course = ctx
        .storage
        .create_course(user_id, &title)
        .await
        .map_err(internal)?;
    info!(course_id = %course.course_id, user_id = %user_id, "course created");
    Ok(course)
}

pub async fn get_course(
    ctx: &ApiContext,
    user_id: &UserId,
    course_id: CourseId,
) -> Result<CourseDetail, ApiError> {
    ensure_course_owner(ctx, course_id, user_id).await?;
    let course = ctx
        .storage
        .course(course_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("course not found"))?;
    let chapters = ctx
        .storage
        .list_chapters(course_id)
        .await
        .map_err(internal)?;
    let attachments = ctx
        .storage
        .list_attachments(course_id)
        .await
        .map_err(internal)?;
    Ok(CourseDetail {
        course,
        chapters,
        attachments,
    })
}

pub async fn update_course(
    ctx: &ApiContext,
    user_id: &UserId,
    course_id: CourseId,
    patch: UpdateCourseRequest,
) -> Result<Course, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::invalid_payload("no course fields to update"));
    }
    let patch = UpdateCourseRequest {
        title: patch.title.as_deref().map(validate_title).transpose()?,
        description: patch
            .description
            .as_deref()
            .map(validate_description)
            .transpose()?,
        image_url: patch
            .image_url
            .as_deref()
            .map(validate_image_url)
            .transpose()?,
        price: patch.price.map(validate_price).transpose()?,
    };

    ensure_course_owner(ctx, course_id, user_id).await?;
    ctx.storage
        .update_course(course_id, &patch)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("course not found"))
}

pub async fn create_chapter(
    ctx: &ApiContext,
    user_id: &UserId,
    course_id: CourseId,
    title: &str,
) -> Result<Chapter, ApiError> {
    let title = validate_title(title)?;
    ensure_course_owner(ctx, course_id, user_id).await?;
    let chapter = ctx
        .storage
        .create_chapter(course_id, &title)
        .await
        .map_err(internal)?;
    info!(
        course_id = %course_id,
        chapter_id = %chapter.chapter_id,
        position = chapter.position,
        "chapter created"
    );
    Ok(chapter)
}

/// Persists a bulk position update. Ownership and membership of every id are
/// checked inside the same transaction as the writes.
pub async fn reorder_chapters(
    ctx: &ApiContext,
    user_id: &UserId,
    course_id: CourseId,
    list: &[ChapterPosition],
) -> Result<(), ApiError> {
    validate_reorder_list(list)?;

    let outcome = ctx
        .storage
        .reorder_chapters(course_id, user_id, list)
        .await
        .map_err(internal)?;
    match outcome {
        ReorderOutcome::Applied { updated } => {
            info!(course_id = %course_id, user_id = %user_id, updated, "chapters reordered");
            Ok(())
        }
        ReorderOutcome::CourseNotFound => Err(ApiError::not_found("course not found")),
        ReorderOutcome::NotOwner => {
            warn!(course_id = %course_id, user_id = %user_id, "reorder by non-owner rejected");
            Err(ApiError::unauthorized("caller does not own this course"))
        }
        ReorderOutcome::ForeignChapter(chapter_id) => Err(ApiError::invalid_payload(format!(
            "chapter {chapter_id} does not belong to course {course_id}"
        ))),
    }
}

pub async fn add_attachment(
    ctx: &ApiContext,
    user_id: &UserId,
    course_id: CourseId,
    url: &str,
) -> Result<Attachment, ApiError> {
    let url = validate_attachment_url(url)?;
    ensure_course_owner(ctx, course_id, user_id).await?;
    let name = attachment_name_from_url(&url);
    ctx.storage
        .add_attachment(course_id, &name, &url)
        .await
        .map_err(internal)
}

pub async fn delete_attachment(
    ctx: &ApiContext,
    user_id: &UserId,
    course_id: CourseId,
    attachment_id: AttachmentId,
) -> Result<(), ApiError> {
    ensure_course_owner(ctx, course_id, user_id).await?;
    let deleted = ctx
        .storage
        .delete_attachment(course_id, attachment_id)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::not_found("attachment not found"));
    }
    Ok(())
}

async fn ensure_course_owner(
    ctx: &ApiContext,
    course_id: CourseId,
    user_id: &UserId,
) -> Result<(), ApiError> {
    let owner = ctx
        .storage
        .course_owner(course_id)
        .await
        .map_err(internal)?;
    let Some(owner) = owner else {
        return Err(ApiError::not_found("course not found"));
    };
    if &owner != user_id {
        return Err(ApiError::unauthorized("caller does not own this course"));
    }
    Ok(())
}

fn internal(err: anyhow::Error) -> ApiError {
    let detail = format!("{err:#}");
    error!(error = %detail, "storage failure");
    ApiError::storage("storage failure")
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
