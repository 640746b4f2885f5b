//! Input rules shared by the server handlers and the client forms.

use std::collections::HashSet;

use crate::{domain::ChapterPosition, error::ApiError};

pub const MAX_TITLE_CHARS: usize = 200;

fn required(value: &str, message: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid_payload(message));
    }
    Ok(trimmed.to_string())
}

pub fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = required(title, "Title is required")?;
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::invalid_payload(format!(
            "Title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title)
}

pub fn validate_description(description: &str) -> Result<String, ApiError> {
    required(description, "Description is required")
}

pub fn validate_image_url(image_url: &str) -> Result<String, ApiError> {
    required(image_url, "Image is required")
}

pub fn validate_attachment_url(url: &str) -> Result<String, ApiError> {
    required(url, "Attachment url is required")
}

pub fn validate_price(price: f64) -> Result<f64, ApiError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ApiError::invalid_payload(
            "Price must be a non-negative number",
        ));
    }
    Ok(price)
}

/// Rejects payloads whose resulting order would be ambiguous.
pub fn validate_reorder_list(list: &[ChapterPosition]) -> Result<(), ApiError> {
    let mut ids = HashSet::with_capacity(list.len());
    let mut positions = HashSet::with_capacity(list.len());
    for entry in list {
        if entry.position < 0 {
            return Err(ApiError::invalid_payload(format!(
                "chapter {} has negative position {}",
                entry.id, entry.position
            )));
        }
        if !ids.insert(entry.id) {
            return Err(ApiError::invalid_payload(format!(
                "chapter {} appears more than once",
                entry.id
            )));
        }
        if !positions.insert(entry.position) {
            return Err(ApiError::invalid_payload(format!(
                "position {} is assigned more than once",
                entry.position
            )));
        }
    }
    Ok(())
}

/// Display name for an uploaded file: the last path segment of its url.
pub fn attachment_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(url)
        .to_string()
}
