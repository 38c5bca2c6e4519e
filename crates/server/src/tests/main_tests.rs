use std::time::Duration;

use axum::{body, body::Body, http::Request};
use client_core::{CatalogLoader, HttpPlaceStore, SelectionController, SelectionEvent};
use shared::domain::PlaceImage;
use tokio::sync::broadcast;
use tower::ServiceExt;

use super::*;

fn sample_place(id: &str) -> Place {
    Place {
        id: PlaceId::new(id),
        title: format!("Place {id}"),
        image: PlaceImage {
            src: format!("{id}.jpg"),
            alt: format!("A photo of place {id}"),
        },
        coordinates: None,
    }
}

async fn test_app() -> (Router, Storage) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    for id in ["p1", "p2"] {
        storage.upsert_place(&sample_place(id)).await.expect("seed");
    }
    let app = build_router(Arc::new(AppState {
        storage: storage.clone(),
    }));
    (app, storage)
}

fn put_user_places(places: Vec<Place>) -> Request<Body> {
    Request::put("/user-places")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_string(&UpdateUserPlacesRequest { places }).expect("json"),
        ))
        .expect("request")
}

async fn fetch_user_place_ids(app: &Router) -> Vec<String> {
    let request = Request::get("/user-places")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let dto: UserPlacesResponse = serde_json::from_slice(&bytes).expect("json");
    dto.places.into_iter().map(|p| p.id.0).collect()
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _storage) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(bytes.as_ref(), b"ok");
}

#[tokio::test]
async fn catalog_route_lists_the_seeded_places() {
    let (app, _storage) = test_app().await;
    let request = Request::get("/places").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let dto: CatalogResponse = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(dto.places.len(), 2);
}

#[tokio::test]
async fn user_places_put_replaces_the_whole_list() {
    let (app, _storage) = test_app().await;

    let response = app
        .clone()
        .oneshot(put_user_places(vec![sample_place("p2")]))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(fetch_user_place_ids(&app).await, ["p2"]);

    let response = app
        .clone()
        .oneshot(put_user_places(vec![sample_place("p1"), sample_place("p2")]))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(fetch_user_place_ids(&app).await, ["p1", "p2"]);
}

#[tokio::test]
async fn put_rejects_places_missing_from_the_catalog() {
    let (app, _storage) = test_app().await;

    let response = app
        .clone()
        .oneshot(put_user_places(vec![sample_place("ghost")]))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(fetch_user_place_ids(&app).await.is_empty());
}

#[tokio::test]
async fn put_rejects_duplicate_place_ids() {
    let (app, _storage) = test_app().await;

    let response = app
        .clone()
        .oneshot(put_user_places(vec![sample_place("p1"), sample_place("p1")]))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(fetch_user_place_ids(&app).await.is_empty());
}

async fn wait_for_sync(events: &mut broadcast::Receiver<SelectionEvent>) {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match events.recv().await.expect("event stream closed") {
                SelectionEvent::Synced => break,
                SelectionEvent::SyncFailed { message } => panic!("sync failed: {message}"),
                _ => {}
            }
        }
    })
    .await
    .expect("timed out waiting for a sync");
}

#[tokio::test]
async fn end_to_end_select_and_remove_flow_persists_across_clients() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let (app, _storage) = test_app().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let store = Arc::new(HttpPlaceStore::new(format!("http://{addr}")));
    let catalog = CatalogLoader::new(store.clone());
    catalog.initialize().await;
    assert!(catalog.error().await.is_none());
    let candidates = catalog.available_places().await;
    assert_eq!(candidates.len(), 2);

    let controller = SelectionController::new(store);
    controller.initialize().await;
    let mut events = controller.subscribe_events();

    controller.select(candidates[0].clone()).await;
    wait_for_sync(&mut events).await;
    controller.select(candidates[1].clone()).await;
    wait_for_sync(&mut events).await;

    let selected = controller.selected_places().await;
    assert_eq!(selected.len(), 2);
    assert_eq!(selected[0].id, candidates[1].id);

    controller.request_removal(candidates[0].id.clone()).await;
    controller.confirm_removal().await;
    wait_for_sync(&mut events).await;
    assert!(controller.sync_error().await.is_none());

    let fresh = SelectionController::new(Arc::new(HttpPlaceStore::new(format!("http://{addr}"))));
    fresh.initialize().await;
    let persisted = fresh.selected_places().await;
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].id, candidates[1].id);
}
