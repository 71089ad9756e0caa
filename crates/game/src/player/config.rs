use serde::{Deserialize, Serialize};

/// Name and colours a local player joins with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    pub colors: [u8; 4],
}

impl Default for PlayerProfile {
    fn default() -> Self {
        Self {
            name: String::from("Player"),
            colors: [0, 1, 2, 3],
        }
    }
}
