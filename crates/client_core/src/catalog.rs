use std::sync::Arc;

use shared::domain::Place;
use tokio::sync::Mutex;
use tracing::warn;

use crate::{error::FetchError, PlaceStore};

/// Loads the available-places catalog once per session. Construction puts
/// the loader in the loading state; `initialize` performs the fetch and is
/// guarded so repeated calls cannot re-issue it.
pub struct CatalogLoader {
    store: Arc<dyn PlaceStore>,
    inner: Mutex<CatalogState>,
}

struct CatalogState {
    places: Vec<Place>,
    error: Option<FetchError>,
    is_loading: bool,
    has_run: bool,
}

impl CatalogLoader {
    pub fn new(store: Arc<dyn PlaceStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(CatalogState {
                places: Vec::new(),
                error: None,
                is_loading: true,
                has_run: false,
            }),
        }
    }

    /// Fetches the catalog, at most once per loader. There is no automatic
    /// retry; a failure is terminal for the session.
    pub async fn initialize(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.has_run {
                return;
            }
            inner.has_run = true;
        }

        match self.store.fetch_catalog().await {
            Ok(places) => {
                let mut inner = self.inner.lock().await;
                inner.places = places;
                inner.is_loading = false;
            }
            Err(err) => {
                warn!(error = %err, "catalog fetch failed");
                let mut inner = self.inner.lock().await;
                inner.error = Some(FetchError::new(format!(
                    "could not fetch places, please try again later: {err}"
                )));
                inner.is_loading = false;
            }
        }
    }

    pub async fn available_places(&self) -> Vec<Place> {
        self.inner.lock().await.places.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.lock().await.is_loading
    }

    pub async fn error(&self) -> Option<FetchError> {
        self.inner.lock().await.error.clone()
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
