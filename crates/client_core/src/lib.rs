use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Attachment, AttachmentId, Chapter, ChapterId, Course, CourseId, UserId},
    error::ApiError,
    protocol::{
        CourseDetail, CreateAttachmentRequest, CreateChapterRequest, CreateCourseRequest,
        ReorderChaptersRequest, UpdateCourseRequest,
    },
    validation::{
        validate_attachment_url, validate_description, validate_image_url, validate_price,
        validate_title,
    },
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

pub mod error;
pub mod reorder;
pub mod view_state;

pub use error::ClientError;
use reorder::{apply_plan, plan_move, plan_reorder, ReorderPlan, ReorderPlanError};
use view_state::{ChapterPanelMode, CourseEditorView, CoursePanel, EditMode, ReorderState};

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Header carrying the caller identity the server's auth layer trusts.
pub const CALLER_HEADER: &str = "x-user-id";

const GENERIC_FAILURE: &str = "Something went wrong";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Short user-facing message; rendering it is up to the embedding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    Notice(Notice),
    /// The server state changed; views should re-read the course.
    RefreshRequested { course_id: CourseId },
    ReorderStateChanged(ReorderState),
    CourseLoaded { course_id: CourseId },
}

#[derive(Default)]
struct BoardState {
    course: Option<CourseDetail>,
    view: CourseEditorView,
    reorder: ReorderState,
}

pub struct DashboardClient {
    http: Client,
    server_url: String,
    user_id: UserId,
    inner: Mutex<BoardState>,
    events: broadcast::Sender<DashboardEvent>,
}

/// Puts the board back to `Idle` however the reorder ends, including when the
/// request future is dropped mid-flight.
struct UpdatingGuard<'a> {
    client: &'a DashboardClient,
}

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        self.client.state().reorder = ReorderState::Idle;
        self.client
            .emit(DashboardEvent::ReorderStateChanged(ReorderState::Idle));
    }
}

impl DashboardClient {
    pub fn new(server_url: impl Into<String>, user_id: UserId) -> Result<Self> {
        let server_url = server_url.into();
        Url::parse(&server_url)?;
        let (events, _) = broadcast::channel(256);
        Ok(Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
            user_id,
            inner: Mutex::new(BoardState::default()),
            events,
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    pub fn course(&self) -> Option<CourseDetail> {
        self.state().course.clone()
    }

    pub fn chapters(&self) -> Vec<Chapter> {
        self.state()
            .course
            .as_ref()
            .map(|course| course.chapters.clone())
            .unwrap_or_default()
    }

    pub fn view(&self) -> CourseEditorView {
        self.state().view
    }

    pub fn reorder_state(&self) -> ReorderState {
        self.state().reorder
    }

    pub fn toggle_panel(&self, panel: CoursePanel) -> EditMode {
        self.state().view.toggle(panel)
    }

    pub fn toggle_chapter_creation(&self) -> ChapterPanelMode {
        self.state().view.toggle_chapters()
    }

    pub async fn create_course(&self, title: &str) -> Result<Course> {
        let title = validate_title(title).map_err(ClientError::Validation)?;
        let result = self
            .send_json(
                self.http
                    .post(self.url("/courses"))
                    .json(&CreateCourseRequest { title }),
            )
            .await;
        self.report("create_course", "Course created", result)
    }

    /// Loads a course into the board and resets every panel to its resting mode.
    pub async fn open_course(&self, course_id: CourseId) -> Result<CourseDetail> {
        let detail: CourseDetail = self
            .send_json(self.http.get(self.url(&format!("/courses/{course_id}"))))
            .await?;
        {
            let mut state = self.state();
            state.course = Some(detail.clone());
            state.view = CourseEditorView::default();
        }
        self.emit(DashboardEvent::CourseLoaded { course_id });
        Ok(detail)
    }

    /// Re-reads the authoritative course, keeping the current view modes.
    pub async fn refresh_course(&self) -> Result<CourseDetail> {
        let course_id = self.current_course_id()?;
        let detail: CourseDetail = self
            .send_json(self.http.get(self.url(&format!("/courses/{course_id}"))))
            .await?;
        {
            let mut state = self.state();
            if state
                .course
                .as_ref()
                .is_some_and(|current| current.course.course_id == course_id)
            {
                state.course = Some(detail.clone());
            }
        }
        debug!(course_id = %course_id, chapters = detail.chapters.len(), "course refreshed");
        Ok(detail)
    }

    /// Submits a complete new chapter order as reported by the list renderer.
    pub async fn reorder_chapters(&self, new_order: &[ChapterId]) -> Result<()> {
        let Some((course_id, plan, guard)) =
            self.begin_reorder(|chapters| plan_reorder(chapters, new_order))?
        else {
            return Ok(());
        };
        self.submit_reorder(course_id, plan, guard).await
    }

    /// Submits a single drag from display index `from` to display index `to`.
    pub async fn move_chapter(&self, from: usize, to: usize) -> Result<()> {
        let Some((course_id, plan, guard)) =
            self.begin_reorder(|chapters| plan_move(chapters, from, to))?
        else {
            return Ok(());
        };
        self.submit_reorder(course_id, plan, guard).await
    }

    pub async fn create_chapter(&self, title: &str) -> Result<Chapter> {
        let title = validate_title(title).map_err(ClientError::Validation)?;
        let course_id = self.current_course_id()?;
        let result: Result<Chapter> = self
            .send_json(
                self.http
                    .post(self.url(&format!("/courses/{course_id}/chapters")))
                    .json(&CreateChapterRequest { title }),
            )
            .await;
        let chapter = self.report("create_chapter", "Chapter created", result)?;
        {
            let mut state = self.state();
            if let Some(course) = state.course.as_mut() {
                course.chapters.push(chapter.clone());
            }
            state.view.finish_chapter_creation();
        }
        self.emit(DashboardEvent::RefreshRequested { course_id });
        Ok(chapter)
    }

    /// Saves one editor panel. The panel closes only when the server accepted it.
    pub async fn update_course(
        &self,
        panel: CoursePanel,
        patch: UpdateCourseRequest,
    ) -> Result<Course> {
        let patch = validated_patch(patch).map_err(ClientError::Validation)?;
        let course_id = self.current_course_id()?;
        let result: Result<Course> = self
            .send_json(
                self.http
                    .patch(self.url(&format!("/courses/{course_id}")))
                    .json(&patch),
            )
            .await;
        let course = self.report("update_course", "Course updated", result)?;
        {
            let mut state = self.state();
            if let Some(detail) = state.course.as_mut() {
                detail.course = course.clone();
            }
            state.view.close(panel);
        }
        self.emit(DashboardEvent::RefreshRequested { course_id });
        Ok(course)
    }

    pub async fn add_attachment(&self, url: &str) -> Result<Attachment> {
        let url = validate_attachment_url(url).map_err(ClientError::Validation)?;
        let course_id = self.current_course_id()?;
        let result: Result<Attachment> = self
            .send_json(
                self.http
                    .post(self.url(&format!("/courses/{course_id}/attachments")))
                    .json(&CreateAttachmentRequest { url }),
            )
            .await;
        let attachment = self.report("add_attachment", "Attachment added", result)?;
        {
            let mut state = self.state();
            if let Some(detail) = state.course.as_mut() {
                detail.attachments.insert(0, attachment.clone());
            }
            state.view.close(CoursePanel::Attachments);
        }
        self.emit(DashboardEvent::RefreshRequested { course_id });
        Ok(attachment)
    }

    pub async fn delete_attachment(&self, attachment_id: AttachmentId) -> Result<()> {
        let course_id = self.current_course_id()?;
        let result = self
            .send_empty(self.http.delete(self.url(&format!(
                "/courses/{course_id}/attachments/{attachment_id}"
            ))))
            .await;
        self.report("delete_attachment", "Attachment deleted", result)?;
        {
            let mut state = self.state();
            if let Some(detail) = state.course.as_mut() {
                detail
                    .attachments
                    .retain(|attachment| attachment.attachment_id != attachment_id);
            }
        }
        self.emit(DashboardEvent::RefreshRequested { course_id });
        Ok(())
    }

    fn begin_reorder(
        &self,
        plan: impl FnOnce(&[Chapter]) -> std::result::Result<ReorderPlan, ReorderPlanError>,
    ) -> Result<Option<(CourseId, ReorderPlan, UpdatingGuard<'_>)>> {
        let (course_id, plan) = {
            let mut state = self.state();
            if state.reorder == ReorderState::Updating {
                return Err(ClientError::Busy);
            }
            let course = state.course.as_ref().ok_or(ClientError::NotLoaded)?;
            let course_id = course.course.course_id;
            let plan = plan(&course.chapters)?;
            if plan.is_noop() {
                return Ok(None);
            }
            state.reorder = ReorderState::Updating;
            (course_id, plan)
        };
        let guard = UpdatingGuard { client: self };
        self.emit(DashboardEvent::ReorderStateChanged(ReorderState::Updating));
        Ok(Some((course_id, plan, guard)))
    }

    async fn submit_reorder(
        &self,
        course_id: CourseId,
        plan: ReorderPlan,
        _guard: UpdatingGuard<'_>,
    ) -> Result<()> {
        let body = ReorderChaptersRequest {
            list: plan.updates.clone(),
        };
        let result = self
            .send_empty(
                self.http
                    .put(self.url(&format!("/courses/{course_id}/chapters/reorder")))
                    .json(&body),
            )
            .await;
        self.report("reorder_chapters", "Chapters reordered", result)?;

        {
            let mut state = self.state();
            if let Some(detail) = state
                .course
                .as_mut()
                .filter(|detail| detail.course.course_id == course_id)
            {
                detail.chapters = apply_plan(&detail.chapters, &plan);
            }
        }
        info!(course_id = %course_id, updated = plan.updates.len(), "chapters reordered");
        self.emit(DashboardEvent::RefreshRequested { course_id });
        Ok(())
    }

    fn current_course_id(&self) -> Result<CourseId> {
        self.state()
            .course
            .as_ref()
            .map(|detail| detail.course.course_id)
            .ok_or(ClientError::NotLoaded)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server_url)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        self.send(request).await?;
        Ok(())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .header(CALLER_HEADER, self.user_id.as_str())
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().await?;
        match serde_json::from_slice::<ApiError>(&body) {
            Ok(err) => Err(ClientError::Api(err)),
            Err(_) => Err(ClientError::UnexpectedStatus(status.as_u16())),
        }
    }

    /// Logs the outcome and turns it into a notice. Errors are handed back untouched.
    fn report<T>(&self, operation: &'static str, success: &str, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.notify(NoticeLevel::Success, success),
            Err(err) => {
                warn!(operation, user_id = %self.user_id, error = %err, "dashboard request failed");
                self.notify(NoticeLevel::Error, GENERIC_FAILURE);
            }
        }
        result
    }

    fn notify(&self, level: NoticeLevel, text: &str) {
        self.emit(DashboardEvent::Notice(Notice {
            level,
            text: text.to_string(),
        }));
    }

    fn emit(&self, event: DashboardEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validated_patch(patch: UpdateCourseRequest) -> std::result::Result<UpdateCourseRequest, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::invalid_payload("Nothing to save"));
    }
    Ok(UpdateCourseRequest {
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
    })
}

/// `$1,234.50`, or "No price" for free/unpriced courses.
pub fn format_price(price: Option<f64>) -> String {
    let Some(price) = price.filter(|p| p.is_finite() && *p > 0.0) else {
        return "No price".to_string();
    };
    let cents = (price * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (index, digit) in dollars.chars().enumerate() {
        if index > 0 && (dollars.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("${grouped}.{:02}", cents % 100)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
