use crate::worksheet::PageComposer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Composer used by both render endpoints; carries the configured font.
    pub composer: PageComposer,
}
