//! In-memory collaborators.
//!
//! Stand-ins for the game host's registries: the demo host runs on them,
//! and the test suites use them to observe exactly what the plugin did.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use discord_link_protocol::SteamId;

use crate::{PermissionStore, Player, PlayerDirectory, VerifyError};

// ---------------------------------------------------------------------------
// MemoryPermissionStore
// ---------------------------------------------------------------------------

/// A permission store backed by a map of group name → members.
///
/// [`set_available(false)`](Self::set_available) makes every call fail,
/// which is how tests simulate a broken host registry.
#[derive(Debug)]
pub struct MemoryPermissionStore {
    groups: RwLock<HashMap<String, HashSet<SteamId>>>,
    adds: AtomicUsize,
    available: AtomicBool,
}

impl MemoryPermissionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            adds: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Makes every subsequent call succeed (`true`) or fail (`false`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful `add_user_group` calls that inserted a member.
    pub fn add_count(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    /// Members of `group`, sorted. Empty if the group does not exist.
    pub fn members(&self, group: &str) -> Vec<SteamId> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        let mut members: Vec<SteamId> = groups
            .get(group)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    fn check(&self) -> Result<(), VerifyError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VerifyError::Store("store unavailable".into()))
        }
    }
}

impl Default for MemoryPermissionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionStore for MemoryPermissionStore {
    fn group_exists(&self, group: &str) -> Result<bool, VerifyError> {
        self.check()?;
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        Ok(groups.contains_key(group))
    }

    fn create_group(
        &self,
        group: &str,
        _title: &str,
        _rank: i32,
    ) -> Result<(), VerifyError> {
        self.check()?;
        let mut groups =
            self.groups.write().unwrap_or_else(PoisonError::into_inner);
        groups.entry(group.to_string()).or_default();
        Ok(())
    }

    fn user_has_group(
        &self,
        steam_id: &SteamId,
        group: &str,
    ) -> Result<bool, VerifyError> {
        self.check()?;
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        Ok(groups.get(group).is_some_and(|m| m.contains(steam_id)))
    }

    fn add_user_group(
        &self,
        steam_id: &SteamId,
        group: &str,
    ) -> Result<(), VerifyError> {
        self.check()?;
        let mut groups =
            self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let members = groups.get_mut(group).ok_or_else(|| {
            VerifyError::Store(format!("group {group:?} does not exist"))
        })?;
        if members.insert(steam_id.clone()) {
            self.adds.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryPlayerDirectory
// ---------------------------------------------------------------------------

/// A player handle that records every reply it receives.
///
/// Clones share state, so a test can keep one clone while the directory
/// hands out others.
#[derive(Debug, Clone)]
pub struct MemoryPlayer {
    id: SteamId,
    name: String,
    connected: Arc<AtomicBool>,
    replies: Arc<Mutex<Vec<String>>>,
}

impl MemoryPlayer {
    /// The player's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every reply sent to this player, oldest first.
    pub fn replies(&self) -> Vec<String> {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns the recorded replies.
    pub fn take_replies(&self) -> Vec<String> {
        std::mem::take(
            &mut *self.replies.lock().unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl Player for MemoryPlayer {
    fn id(&self) -> &SteamId {
        &self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn reply(&self, message: &str) {
        tracing::debug!(steam_id = %self.id, text = message, "reply");
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

/// A player directory backed by a map of id → player.
#[derive(Debug, Default)]
pub struct MemoryPlayerDirectory {
    players: RwLock<HashMap<SteamId, MemoryPlayer>>,
}

impl MemoryPlayerDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a player as connected, registering them on first sight.
    /// Returns a handle sharing state with the directory's copy.
    pub fn connect(
        &self,
        steam_id: impl Into<SteamId>,
        name: &str,
    ) -> MemoryPlayer {
        let steam_id = steam_id.into();
        let mut players =
            self.players.write().unwrap_or_else(PoisonError::into_inner);
        let player = players.entry(steam_id.clone()).or_insert_with(|| {
            MemoryPlayer {
                id: steam_id,
                name: name.to_string(),
                connected: Arc::new(AtomicBool::new(false)),
                replies: Arc::new(Mutex::new(Vec::new())),
            }
        });
        player.connected.store(true, Ordering::SeqCst);
        player.clone()
    }

    /// Marks a known player as offline. They stay in the directory.
    pub fn disconnect(&self, steam_id: &SteamId) {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(player) = players.get(steam_id) {
            player.connected.store(false, Ordering::SeqCst);
        }
    }
}

impl PlayerDirectory for MemoryPlayerDirectory {
    type Player = MemoryPlayer;

    fn find_player_by_id(
        &self,
        steam_id: &SteamId,
    ) -> Result<Option<MemoryPlayer>, VerifyError> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        Ok(players.get(steam_id).cloned())
    }
}
