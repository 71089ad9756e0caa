use std::fmt;

use crate::player::Player;

/// Stable handle to a roster entry. Survives removal of other players,
/// unlike the wire index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Dense, index-addressed player table.
///
/// Wire messages address players by position, so positions stay packed:
/// removing index `i` shifts every later player down by one.
#[derive(Debug, Clone)]
pub struct Roster {
    entries: Vec<(PlayerId, Player)>,
    capacity: usize,
    next_id: u32,
}

impl Roster {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    fn allocate_id(&mut self) -> PlayerId {
        let id = PlayerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Appends a player; `None` when full.
    pub fn push(&mut self, player: Player) -> Option<(PlayerId, usize)> {
        if self.is_full() {
            return None;
        }
        let id = self.allocate_id();
        self.entries.push((id, player));
        Some((id, self.entries.len() - 1))
    }

    /// Stores `player` at `index`, growing the roster with placeholder
    /// players if earlier joins were never seen.
    pub fn fill_to(&mut self, index: usize, player: Player) -> Option<PlayerId> {
        if index >= self.capacity {
            return None;
        }

        if let Some((id, slot)) = self.entries.get_mut(index) {
            *slot = player;
            return Some(*id);
        }

        while self.entries.len() < index {
            log::warn!("Filling missed join for player {}", self.entries.len());
            let id = self.allocate_id();
            self.entries.push((id, Player::new("", [0; 4], 0)));
        }

        let id = self.allocate_id();
        self.entries.push((id, player));
        Some(id)
    }

    pub fn remove(&mut self, index: usize) -> Option<(PlayerId, Player)> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn index_of(&self, id: PlayerId) -> Option<usize> {
        self.entries.iter().position(|(entry, _)| *entry == id)
    }

    pub fn id_at(&self, index: usize) -> Option<PlayerId> {
        self.entries.get(index).map(|(id, _)| *id)
    }

    pub fn get(&self, index: usize) -> Option<&Player> {
        self.entries.get(index).map(|(_, player)| player)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Player> {
        self.entries.get_mut(index).map(|(_, player)| player)
    }

    pub fn by_id(&self, id: PlayerId) -> Option<&Player> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, player)| player)
    }

    pub fn by_id_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.entries
            .iter_mut()
            .find(|(entry, _)| *entry == id)
            .map(|(_, player)| player)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.entries.iter().map(|(_, player)| player)
    }

    pub fn iter_with_ids(&self) -> impl Iterator<Item = (PlayerId, &Player)> {
        self.entries.iter().map(|(id, player)| (*id, player))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Credits one point to every player on `team`.
    pub fn add_team_score(&mut self, team: u8) {
        for (_, player) in self.entries.iter_mut().filter(|(_, p)| p.team == team) {
            player.team_score += 1;
        }
    }
}
