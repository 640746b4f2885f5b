use super::*;
use std::{net::TcpListener as StdTcpListener, sync::Arc};

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response as HttpResponse},
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use shared::{domain::ChapterPosition, error::ErrorCode};
use tokio::{net::TcpListener, sync::Notify};

const TEACHER: &str = "teacher-1";

#[derive(Clone)]
struct StubServer {
    detail: Arc<Mutex<CourseDetail>>,
    reorder_status: StatusCode,
    reorders: Arc<Mutex<Vec<(Option<String>, ReorderChaptersRequest)>>>,
    received: Arc<Notify>,
    release: Option<Arc<Notify>>,
}

impl StubServer {
    fn new(detail: CourseDetail) -> Self {
        Self {
            detail: Arc::new(Mutex::new(detail)),
            reorder_status: StatusCode::NO_CONTENT,
            reorders: Arc::new(Mutex::new(Vec::new())),
            received: Arc::new(Notify::new()),
            release: None,
        }
    }

    fn failing(detail: CourseDetail) -> Self {
        Self {
            reorder_status: StatusCode::INTERNAL_SERVER_ERROR,
            ..Self::new(detail)
        }
    }

    fn held(detail: CourseDetail, release: Arc<Notify>) -> Self {
        Self {
            release: Some(release),
            ..Self::new(detail)
        }
    }

    fn reorders(&self) -> Vec<(Option<String>, ReorderChaptersRequest)> {
        self.reorders.lock().unwrap().clone()
    }
}

async fn stub_get_course(State(stub): State<StubServer>) -> Json<CourseDetail> {
    Json(stub.detail.lock().unwrap().clone())
}

async fn stub_patch_course(
    State(stub): State<StubServer>,
    Json(patch): Json<UpdateCourseRequest>,
) -> Json<Course> {
    let mut detail = stub.detail.lock().unwrap();
    if let Some(title) = patch.title {
        detail.course.title = title;
    }
    if let Some(price) = patch.price {
        detail.course.price = Some(price);
    }
    Json(detail.course.clone())
}

async fn stub_create_chapter(
    State(stub): State<StubServer>,
    Json(request): Json<CreateChapterRequest>,
) -> Json<Chapter> {
    let mut detail = stub.detail.lock().unwrap();
    let chapter = chapter(detail.course.course_id, &request.title, detail.chapters.len() as i64);
    detail.chapters.push(chapter.clone());
    Json(chapter)
}

async fn stub_reorder(
    State(stub): State<StubServer>,
    headers: HeaderMap,
    Json(body): Json<ReorderChaptersRequest>,
) -> HttpResponse {
    let caller = headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    stub.reorders.lock().unwrap().push((caller, body));
    stub.received.notify_one();
    if let Some(release) = &stub.release {
        release.notified().await;
    }
    if stub.reorder_status.is_success() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            stub.reorder_status,
            Json(ApiError::storage("database unavailable")),
        )
            .into_response()
    }
}

async fn spawn_stub(stub: StubServer) -> String {
    let app = Router::new()
        .route("/courses/:course_id", get(stub_get_course).patch(stub_patch_course))
        .route("/courses/:course_id/chapters", post(stub_create_chapter))
        .route("/courses/:course_id/chapters/reorder", put(stub_reorder))
        .with_state(stub);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve stub");
    });
    format!("http://{addr}/")
}

fn chapter(course_id: CourseId, title: &str, position: i64) -> Chapter {
    Chapter {
        chapter_id: ChapterId::new(),
        course_id,
        title: title.to_string(),
        description: None,
        video_url: None,
        position,
        is_published: false,
        is_free: false,
        created_at: Utc::now(),
    }
}

fn fixture(titles: &[&str]) -> CourseDetail {
    let course_id = CourseId::new();
    let now = Utc::now();
    CourseDetail {
        course: Course {
            course_id,
            owner_id: UserId::new(TEACHER),
            title: "Rust for teachers".to_string(),
            description: None,
            image_url: None,
            price: None,
            is_published: false,
            created_at: now,
            updated_at: now,
        },
        chapters: titles
            .iter()
            .enumerate()
            .map(|(index, title)| chapter(course_id, title, index as i64))
            .collect(),
        attachments: Vec::new(),
    }
}

async fn opened_client(stub: &StubServer) -> DashboardClient {
    let url = spawn_stub(stub.clone()).await;
    let client = DashboardClient::new(url, UserId::new(TEACHER)).expect("client");
    let course_id = stub.detail.lock().unwrap().course.course_id;
    client.open_course(course_id).await.expect("open course");
    client
}

fn titles(client: &DashboardClient) -> Vec<String> {
    client
        .chapters()
        .into_iter()
        .map(|chapter| chapter.title)
        .collect()
}

fn drain(events: &mut broadcast::Receiver<DashboardEvent>) -> Vec<DashboardEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn notice(level: NoticeLevel, text: &str) -> DashboardEvent {
    DashboardEvent::Notice(Notice {
        level,
        text: text.to_string(),
    })
}

#[tokio::test]
async fn move_sends_only_shifted_chapters_and_updates_local_order() {
    let detail = fixture(&["A", "B", "C", "D"]);
    let course_id = detail.course.course_id;
    let a = detail.chapters[0].chapter_id;
    let b = detail.chapters[1].chapter_id;
    let stub = StubServer::new(detail);
    let client = opened_client(&stub).await;
    let mut events = client.subscribe_events();

    client.move_chapter(0, 1).await.expect("move");

    let sent = stub.reorders();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.as_deref(), Some(TEACHER));
    assert_eq!(
        sent[0].1.list,
        vec![
            ChapterPosition { id: b, position: 0 },
            ChapterPosition { id: a, position: 1 },
        ]
    );
    assert_eq!(titles(&client), ["B", "A", "C", "D"]);
    let positions: Vec<i64> = client.chapters().iter().map(|c| c.position).collect();
    assert_eq!(positions, [0, 1, 2, 3]);

    assert_eq!(
        drain(&mut events),
        vec![
            DashboardEvent::ReorderStateChanged(ReorderState::Updating),
            notice(NoticeLevel::Success, "Chapters reordered"),
            DashboardEvent::RefreshRequested { course_id },
            DashboardEvent::ReorderStateChanged(ReorderState::Idle),
        ]
    );
    assert_eq!(client.reorder_state(), ReorderState::Idle);
}

#[tokio::test]
async fn full_order_submission_matches_rendered_list() {
    let detail = fixture(&["A", "B", "C"]);
    let ids: Vec<ChapterId> = detail.chapters.iter().map(|c| c.chapter_id).collect();
    let stub = StubServer::new(detail);
    let client = opened_client(&stub).await;

    client
        .reorder_chapters(&[ids[1], ids[2], ids[0]])
        .await
        .expect("reorder");

    assert_eq!(titles(&client), ["B", "C", "A"]);
    assert_eq!(stub.reorders()[0].1.list.len(), 3);
}

#[tokio::test]
async fn server_failure_keeps_previous_order_and_reports_error() {
    let stub = StubServer::failing(fixture(&["A", "B", "C"]));
    let client = opened_client(&stub).await;
    let mut events = client.subscribe_events();

    let err = client.move_chapter(2, 0).await.expect_err("server fails");

    assert_eq!(
        err.api_error().map(|api| api.code),
        Some(ErrorCode::StorageError)
    );
    assert_eq!(titles(&client), ["A", "B", "C"]);
    let seen = drain(&mut events);
    assert!(seen.contains(&notice(NoticeLevel::Error, "Something went wrong")));
    assert!(!seen
        .iter()
        .any(|event| matches!(event, DashboardEvent::RefreshRequested { .. })));
    assert_eq!(
        seen.last(),
        Some(&DashboardEvent::ReorderStateChanged(ReorderState::Idle))
    );
    assert_eq!(client.reorder_state(), ReorderState::Idle);
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let closed = StdTcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = closed.local_addr().expect("addr");
    drop(closed);

    let client = DashboardClient::new(format!("http://{addr}"), UserId::new(TEACHER))
        .expect("client");
    client.state().course = Some(fixture(&["A", "B"]));

    let err = client.move_chapter(0, 1).await.expect_err("no server");

    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(titles(&client), ["A", "B"]);
    assert_eq!(client.reorder_state(), ReorderState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_reorder_while_updating_is_rejected() {
    let release = Arc::new(Notify::new());
    let stub = StubServer::held(fixture(&["A", "B", "C"]), release.clone());
    let client = Arc::new(opened_client(&stub).await);

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.move_chapter(0, 2).await })
    };
    stub.received.notified().await;

    assert_eq!(client.reorder_state(), ReorderState::Updating);
    let err = client.move_chapter(1, 0).await.expect_err("busy");
    assert!(matches!(err, ClientError::Busy));

    release.notify_one();
    first.await.expect("join").expect("first reorder");

    assert_eq!(stub.reorders().len(), 1);
    assert_eq!(titles(&client), ["B", "C", "A"]);
    assert_eq!(client.reorder_state(), ReorderState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_reorder_returns_to_idle() {
    let release = Arc::new(Notify::new());
    let stub = StubServer::held(fixture(&["A", "B"]), release);
    let client = Arc::new(opened_client(&stub).await);

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.move_chapter(0, 1).await })
    };
    stub.received.notified().await;
    pending.abort();
    let _ = pending.await;

    assert_eq!(client.reorder_state(), ReorderState::Idle);
    assert_eq!(titles(&client), ["A", "B"]);
}

#[tokio::test]
async fn dropping_on_same_index_sends_nothing() {
    let stub = StubServer::new(fixture(&["A", "B", "C"]));
    let client = opened_client(&stub).await;
    let mut events = client.subscribe_events();

    client.move_chapter(1, 1).await.expect("noop");

    assert!(stub.reorders().is_empty());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn invalid_move_is_rejected_locally() {
    let stub = StubServer::new(fixture(&["A", "B"]));
    let client = opened_client(&stub).await;

    let err = client.move_chapter(0, 5).await.expect_err("out of range");

    assert!(matches!(
        err,
        ClientError::InvalidOrder(ReorderPlanError::IndexOutOfRange { index: 5, len: 2 })
    ));
    assert!(stub.reorders().is_empty());
    assert_eq!(client.reorder_state(), ReorderState::Idle);
}

#[tokio::test]
async fn reorder_without_open_course_fails() {
    let client = DashboardClient::new("http://127.0.0.1:9", UserId::new(TEACHER)).expect("client");

    let err = client.move_chapter(0, 1).await.expect_err("nothing loaded");

    assert!(matches!(err, ClientError::NotLoaded));
}

#[tokio::test]
async fn create_chapter_appends_and_closes_creation_panel() {
    let stub = StubServer::new(fixture(&["A", "B", "C"]));
    let client = opened_client(&stub).await;
    assert_eq!(client.toggle_chapter_creation(), ChapterPanelMode::Creating);

    let blank = client.create_chapter("   ").await.expect_err("blank title");
    assert!(matches!(blank, ClientError::Validation(_)));
    assert_eq!(client.view().chapters(), ChapterPanelMode::Creating);

    let created = client.create_chapter("Ownership").await.expect("create");

    assert_eq!(created.position, 3);
    assert_eq!(titles(&client), ["A", "B", "C", "Ownership"]);
    assert_eq!(client.view().chapters(), ChapterPanelMode::Listing);
}

#[tokio::test]
async fn saved_price_closes_its_panel() {
    let stub = StubServer::new(fixture(&["A"]));
    let client = opened_client(&stub).await;
    assert_eq!(client.toggle_panel(CoursePanel::Price), EditMode::Editing);

    let negative = client
        .update_course(
            CoursePanel::Price,
            UpdateCourseRequest {
                price: Some(-1.0),
                ..Default::default()
            },
        )
        .await
        .expect_err("negative price");
    assert!(matches!(negative, ClientError::Validation(_)));
    assert_eq!(client.view().mode(CoursePanel::Price), EditMode::Editing);

    let course = client
        .update_course(
            CoursePanel::Price,
            UpdateCourseRequest {
                price: Some(49.5),
                ..Default::default()
            },
        )
        .await
        .expect("save price");

    assert_eq!(course.price, Some(49.5));
    assert_eq!(client.view().mode(CoursePanel::Price), EditMode::Viewing);
    assert_eq!(client.course().map(|detail| detail.course.price), Some(Some(49.5)));
}

#[test]
fn rejects_malformed_server_url() {
    let result = DashboardClient::new("not a url", UserId::new(TEACHER));
    assert!(matches!(result, Err(ClientError::InvalidServerUrl(_))));
}

#[test]
fn formats_prices_as_dollars() {
    assert_eq!(format_price(Some(1234.5)), "$1,234.50");
    assert_eq!(format_price(Some(9.99)), "$9.99");
    assert_eq!(format_price(Some(1_000_000.0)), "$1,000,000.00");
    assert_eq!(format_price(Some(0.0)), "No price");
    assert_eq!(format_price(None), "No price");
}
