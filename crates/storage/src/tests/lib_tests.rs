use super::*;

fn place(id: &str) -> Place {
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

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn upserts_and_lists_the_catalog() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.upsert_place(&place("p1")).await.expect("insert");
    storage.upsert_place(&place("p2")).await.expect("insert");

    let catalog = storage.list_catalog().await.expect("catalog");
    assert_eq!(catalog.len(), 2);

    let mut renamed = place("p1");
    renamed.title = "Renamed".to_string();
    storage.upsert_place(&renamed).await.expect("upsert");

    let catalog = storage.list_catalog().await.expect("catalog");
    assert_eq!(catalog.len(), 2);
    let fetched = storage
        .catalog_place(&PlaceId::new("p1"))
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(fetched.title, "Renamed");
}

#[tokio::test]
async fn round_trips_coordinates() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let mut tower = place("eiffel");
    tower.coordinates = Some(GeoCoordinates {
        lat: 48.8584,
        lon: 2.2945,
    });
    storage.upsert_place(&tower).await.expect("insert");

    let fetched = storage
        .catalog_place(&PlaceId::new("eiffel"))
        .await
        .expect("lookup")
        .expect("present");
    let coordinates = fetched.coordinates.expect("coordinates");
    assert!((coordinates.lat - 48.8584).abs() < 1e-9);
    assert!((coordinates.lon - 2.2945).abs() < 1e-9);
}

#[tokio::test]
async fn replaces_the_selection_preserving_order() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    for id in ["p1", "p2", "p3"] {
        storage.upsert_place(&place(id)).await.expect("insert");
    }

    storage
        .replace_selected_places(&[PlaceId::new("p3"), PlaceId::new("p1")])
        .await
        .expect("replace");
    let selected = storage.selected_places().await.expect("selected");
    let ids: Vec<&str> = selected.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["p3", "p1"]);

    storage
        .replace_selected_places(&[PlaceId::new("p2")])
        .await
        .expect("replace");
    let selected = storage.selected_places().await.expect("selected");
    let ids: Vec<&str> = selected.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["p2"]);
}

#[tokio::test]
async fn rejects_selection_of_unknown_places() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.upsert_place(&place("p1")).await.expect("insert");

    let result = storage
        .replace_selected_places(&[PlaceId::new("p1"), PlaceId::new("ghost")])
        .await;
    assert!(result.is_err());

    let selected = storage.selected_places().await.expect("selected");
    assert!(selected.is_empty());
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("placelist_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}
