use super::{SessionError, SessionPeer, SessionResult};
use crate::store::transact;
use crate::types::*;

const MAX_NAME_CHARS: usize = 24;

impl SessionPeer {
    /// Join the lobby (or rename) under this peer's id.
    /// Only ever writes this peer's own player record.
    pub async fn join(&self, name: &str) -> SessionResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidInput("Name cannot be empty".to_string()));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(SessionError::InvalidInput(format!(
                "Name must be at most {} characters",
                MAX_NAME_CHARS
            )));
        }

        let id = self.id.clone();
        let name = name.to_string();
        let max_players = self.config.max_players;
        transact(self.store.as_ref(), move |s| {
            if let Some(player) = s.players.get_mut(&id) {
                player.name = name.clone();
                return Ok(());
            }
            if s.players.len() >= max_players {
                return Err(SessionError::LobbyFull(max_players));
            }
            s.players.insert(
                id.clone(),
                Player {
                    name: name.clone(),
                    photo_url: None,
                },
            );
            Ok(())
        })
        .await??;

        tracing::info!("Player {} joined", self.id);
        Ok(())
    }

    /// Set or clear (empty url) this peer's photo
    pub async fn set_photo(&self, url: &str) -> SessionResult<()> {
        let id = self.id.clone();
        let url = Some(url.trim().to_string()).filter(|u| !u.is_empty());
        let joined = transact(self.store.as_ref(), move |s| match s.players.get_mut(&id) {
            Some(player) => {
                player.photo_url = url.clone();
                true
            }
            None => false,
        })
        .await?;

        if !joined {
            return Err(SessionError::InvalidState(
                "Join the game before setting a photo".to_string(),
            ));
        }
        Ok(())
    }
}
