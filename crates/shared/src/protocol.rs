use serde::{Deserialize, Serialize};

use crate::domain::Place;

/// `GET /places` response: the full server-side catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub places: Vec<Place>,
}

/// `GET /user-places` response: the persisted selection, most recent first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPlacesResponse {
    pub places: Vec<Place>,
}

/// `PUT /user-places` body. Full-list replace semantics: the payload is the
/// entire selection as the client sees it, not a patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserPlacesRequest {
    pub places: Vec<Place>,
}
