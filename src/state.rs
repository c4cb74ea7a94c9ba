use std::sync::Arc;

use crate::config::GameConfig;
use crate::questions::QuestionGenerator;
use crate::session::SessionPeer;
use crate::store::{MemoryStore, SessionStore};
use crate::types::{ClientId, Role};

/// Shared server state handed to every route
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub generator: Arc<QuestionGenerator>,
    pub config: Arc<GameConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SessionStore>,
        generator: Arc<QuestionGenerator>,
        config: Arc<GameConfig>,
    ) -> Self {
        Self {
            store,
            generator,
            config,
        }
    }

    /// In-memory session with the fallback bank as the only question source
    pub fn offline(config: GameConfig) -> Self {
        let generator = Arc::new(QuestionGenerator::offline(&config));
        Self::new(Arc::new(MemoryStore::system()), generator, Arc::new(config))
    }

    /// A new peer acting on this server's session
    pub fn peer(&self, id: impl Into<ClientId>, role: Role) -> SessionPeer {
        SessionPeer::new(
            id,
            role,
            self.store.clone(),
            self.generator.clone(),
            self.config.clone(),
        )
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::offline(GameConfig::default())
    }
}
