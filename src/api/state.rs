use std::sync::Arc;

use crate::services::ContentSetService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub content_sets: Arc<ContentSetService>,
}

impl AppState {
    pub fn new(content_sets: ContentSetService) -> Self {
        Self {
            content_sets: Arc::new(content_sets),
        }
    }
}
