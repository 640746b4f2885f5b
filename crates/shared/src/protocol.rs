use serde::{Deserialize, Serialize};

use crate::domain::{Attachment, Chapter, ChapterPosition, Course};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
}

/// Partial course update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateCourseRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl UpdateCourseRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.image_url.is_none()
            && self.price.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChapterRequest {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReorderChaptersRequest {
    pub list: Vec<ChapterPosition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAttachmentRequest {
    pub url: String,
}

/// Everything the course editor page renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseDetail {
    pub course: Course,
    /// Display order: position ascending, creation order on ties.
    pub chapters: Vec<Chapter>,
    /// Newest first.
    pub attachments: Vec<Attachment>,
}
