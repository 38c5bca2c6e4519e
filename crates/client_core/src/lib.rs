use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{Place, PlaceId},
    protocol::{CatalogResponse, UpdateUserPlacesRequest, UserPlacesResponse},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod catalog;
pub mod error;

pub use catalog::CatalogLoader;
pub use error::{FetchError, SyncError};

/// Remote persistence for the catalog and the user's selection. Pure
/// request/response; all list semantics live in [`SelectionController`].
#[async_trait]
pub trait PlaceStore: Send + Sync {
    async fn fetch_catalog(&self) -> Result<Vec<Place>>;
    async fn fetch_selected_places(&self) -> Result<Vec<Place>>;
    /// Full-list replace: `places` is the entire selection at send time,
    /// not a patch.
    async fn write_selected_places(&self, places: &[Place]) -> Result<()>;
}

pub struct MissingPlaceStore;

#[async_trait]
impl PlaceStore for MissingPlaceStore {
    async fn fetch_catalog(&self) -> Result<Vec<Place>> {
        Err(anyhow!("place store is unavailable"))
    }

    async fn fetch_selected_places(&self) -> Result<Vec<Place>> {
        Err(anyhow!("place store is unavailable"))
    }

    async fn write_selected_places(&self, _places: &[Place]) -> Result<()> {
        Err(anyhow!("place store is unavailable"))
    }
}

/// REST-backed store: `GET /places`, `GET /user-places`, `PUT /user-places`.
pub struct HttpPlaceStore {
    http: Client,
    base_url: String,
}

impl HttpPlaceStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PlaceStore for HttpPlaceStore {
    async fn fetch_catalog(&self) -> Result<Vec<Place>> {
        let response: CatalogResponse = self
            .http
            .get(format!("{}/places", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.places)
    }

    async fn fetch_selected_places(&self) -> Result<Vec<Place>> {
        let response: UserPlacesResponse = self
            .http
            .get(format!("{}/user-places", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.places)
    }

    async fn write_selected_places(&self, places: &[Place]) -> Result<()> {
        self.http
            .put(format!("{}/user-places", self.base_url))
            .json(&UpdateUserPlacesRequest {
                places: places.to_vec(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum SelectionEvent {
    /// The local selection changed: an optimistic mutation, a seed load, or
    /// a rollback.
    SelectionChanged { places: Vec<Place> },
    /// A reconciliation write was acknowledged by the store.
    Synced,
    /// A reconciliation write failed; its intent has been undone.
    SyncFailed { message: String },
}

/// Confirmation gate in front of the removal mutation. `request_removal`
/// opens it, `cancel_removal` and `confirm_removal` close it; only the
/// confirm path reaches the selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RemovalGate {
    #[default]
    Idle,
    AwaitingConfirmation {
        target: PlaceId,
    },
}

#[derive(Default)]
struct SelectionState {
    selected: Vec<Place>,
    gate: RemovalGate,
    sync_error: Option<SyncError>,
    load_error: Option<FetchError>,
    is_loading: bool,
    seeded: bool,
}

/// Undo data for one reconciliation write, captured when the intent is
/// issued and moved into that write's failure handler. A failed write takes
/// back its own contribution only; intents applied while it was in flight
/// stay applied.
enum WriteRollback {
    RemoveInserted(PlaceId),
    Reinsert { place: Place, index: usize },
}

/// Owns the selected-places list as the single source of truth. Every
/// mutation is applied to the in-memory list before the store round-trip
/// completes; the write runs in a background task and undoes the intent if
/// it fails.
pub struct SelectionController {
    store: Arc<dyn PlaceStore>,
    inner: Mutex<SelectionState>,
    events: broadcast::Sender<SelectionEvent>,
}

impl SelectionController {
    pub fn new(store: Arc<dyn PlaceStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            store,
            inner: Mutex::new(SelectionState::default()),
            events,
        })
    }

    /// Seeds the selection from the store. The fetch runs at most once per
    /// controller; later calls return immediately.
    pub async fn initialize(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.seeded {
                return;
            }
            inner.seeded = true;
            inner.is_loading = true;
        }

        match self.store.fetch_selected_places().await {
            Ok(places) => {
                let places = {
                    let mut inner = self.inner.lock().await;
                    inner.is_loading = false;
                    inner.selected = places;
                    inner.selected.clone()
                };
                let _ = self
                    .events
                    .send(SelectionEvent::SelectionChanged { places });
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch the stored selection");
                let mut inner = self.inner.lock().await;
                inner.is_loading = false;
                inner.load_error =
                    Some(FetchError::new(format!("failed to fetch your places: {err}")));
            }
        }
    }

    /// Adds `place` to the front of the selection. Selecting a place that
    /// is already present is a no-op and issues no write.
    pub async fn select(self: &Arc<Self>, place: Place) {
        let updated = {
            let mut inner = self.inner.lock().await;
            if inner.selected.iter().any(|p| p.id == place.id) {
                return;
            }
            inner.selected.insert(0, place.clone());
            inner.selected.clone()
        };
        let _ = self.events.send(SelectionEvent::SelectionChanged {
            places: updated.clone(),
        });
        self.spawn_write(updated, WriteRollback::RemoveInserted(place.id));
    }

    /// Opens the confirmation gate for `place_id` without touching the
    /// selection. A repeated request replaces the pending target.
    pub async fn request_removal(&self, place_id: PlaceId) {
        let mut inner = self.inner.lock().await;
        if !inner.selected.iter().any(|p| p.id == place_id) {
            warn!(%place_id, "removal requested for a place that is not selected");
            return;
        }
        inner.gate = RemovalGate::AwaitingConfirmation { target: place_id };
    }

    /// Closes the gate and discards the pending target.
    pub async fn cancel_removal(&self) {
        let mut inner = self.inner.lock().await;
        inner.gate = RemovalGate::Idle;
    }

    /// Removes the pending target from the selection and reconciles. If the
    /// target is no longer selected, closing the gate is all that happens.
    pub async fn confirm_removal(self: &Arc<Self>) {
        let (removed, index, updated) = {
            let mut inner = self.inner.lock().await;
            let target = match std::mem::take(&mut inner.gate) {
                RemovalGate::AwaitingConfirmation { target } => target,
                RemovalGate::Idle => return,
            };
            let Some(index) = inner.selected.iter().position(|p| p.id == target) else {
                info!(%target, "pending removal target vanished before confirmation");
                return;
            };
            let removed = inner.selected.remove(index);
            (removed, index, inner.selected.clone())
        };
        let _ = self.events.send(SelectionEvent::SelectionChanged {
            places: updated.clone(),
        });
        self.spawn_write(updated, WriteRollback::Reinsert { place: removed, index });
    }

    /// Clears the sync-error record unconditionally.
    pub async fn acknowledge_sync_error(&self) {
        let mut inner = self.inner.lock().await;
        inner.sync_error = None;
    }

    pub async fn selected_places(&self) -> Vec<Place> {
        self.inner.lock().await.selected.clone()
    }

    pub async fn sync_error(&self) -> Option<SyncError> {
        self.inner.lock().await.sync_error.clone()
    }

    pub async fn load_error(&self) -> Option<FetchError> {
        self.inner.lock().await.load_error.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.lock().await.is_loading
    }

    pub async fn is_removal_confirmation_open(&self) -> bool {
        matches!(
            self.inner.lock().await.gate,
            RemovalGate::AwaitingConfirmation { .. }
        )
    }

    pub async fn pending_removal(&self) -> Option<PlaceId> {
        match &self.inner.lock().await.gate {
            RemovalGate::AwaitingConfirmation { target } => Some(target.clone()),
            RemovalGate::Idle => None,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SelectionEvent> {
        self.events.subscribe()
    }

    fn spawn_write(self: &Arc<Self>, places: Vec<Place>, rollback: WriteRollback) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            match controller.store.write_selected_places(&places).await {
                Ok(()) => {
                    let _ = controller.events.send(SelectionEvent::Synced);
                }
                Err(err) => controller.roll_back(rollback, &err).await,
            }
        });
    }

    async fn roll_back(&self, rollback: WriteRollback, err: &anyhow::Error) {
        let message = err.to_string();
        warn!(%message, "selection write failed; undoing the intent");
        let places = {
            let mut inner = self.inner.lock().await;
            match rollback {
                WriteRollback::RemoveInserted(id) => {
                    inner.selected.retain(|p| p.id != id);
                }
                WriteRollback::Reinsert { place, index } => {
                    if !inner.selected.iter().any(|p| p.id == place.id) {
                        let index = index.min(inner.selected.len());
                        inner.selected.insert(index, place);
                    }
                }
            }
            if let RemovalGate::AwaitingConfirmation { target } = &inner.gate {
                if !inner.selected.iter().any(|p| p.id == *target) {
                    inner.gate = RemovalGate::Idle;
                }
            }
            inner.sync_error = Some(SyncError::new(message.clone()));
            inner.selected.clone()
        };
        let _ = self
            .events
            .send(SelectionEvent::SelectionChanged { places });
        let _ = self.events.send(SelectionEvent::SyncFailed { message });
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
