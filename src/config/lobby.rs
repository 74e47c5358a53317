//! Default settings applied to every allocated lobby

use serde::{Deserialize, Serialize};

/// Defaults used when an allocation request does not override them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyDefaults {
    /// Remote server region code
    pub server_region: u32,
    /// Remote game mode code
    pub game_mode: u32,
    /// Length of generated join pass keys
    pub pass_key_length: usize,
    /// Whether spectating is allowed in created lobbies
    pub allow_spectating: bool,
}

impl Default for LobbyDefaults {
    fn default() -> Self {
        Self {
            server_region: 3,
            game_mode: 2,
            pass_key_length: 8,
            allow_spectating: true,
        }
    }
}
