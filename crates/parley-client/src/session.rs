use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;
use uuid::Uuid;

use parley_types::models::{Chat, Message, UserSummary};

/// Lifecycle of the session's chat-list projection.
///
/// The client holds no server-side durable cursor, so anything accumulated
/// while live is untrustworthy after a disconnect: `Stale` forces a fresh
/// snapshot before events are applied again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing fetched yet.
    Unknown,
    /// Snapshot applied, socket not yet confirmed.
    Loaded,
    /// Snapshot applied and streamed events flowing.
    Live,
    /// Connection lost; accumulated state may have gaps.
    Stale,
}

/// Identifies one history fetch so that a slow response for an older
/// selection cannot overwrite a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTag(u64);

/// Outcome of reconciling one inbound message event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// Chat existed; moved to front, latest-message cache replaced.
    Updated,
    /// Chat was unknown; its embedded snapshot was inserted at the front.
    InsertedChat,
    /// Same message id seen before; nothing changed.
    Duplicate,
    /// Session is not in a phase that accepts events.
    Ignored,
}

/// Per-session projection of the user's conversations.
///
/// Single-writer by design: the socket callback and user-selection actions
/// both run on one event loop, so no interior locking. A multi-threaded
/// embedding must serialize access (one actor per session).
pub struct Session {
    phase: SyncPhase,
    /// Most-recent-activity-first. Events move entries to the front instead
    /// of re-sorting the whole list.
    chats: VecDeque<Chat>,
    unread: HashMap<Uuid, u32>,
    selected: Option<Uuid>,
    /// Message ids already reconciled; duplicate deliveries are dropped here.
    seen_messages: HashSet<Uuid>,
    /// Visible message list of the selected conversation.
    open_messages: Vec<Message>,
    fetch_seq: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Unknown,
            chats: VecDeque::new(),
            unread: HashMap::new(),
            selected: None,
            seen_messages: HashSet::new(),
            open_messages: Vec::new(),
            fetch_seq: 0,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// (Re)initialize the chat list from a REST snapshot. Unread counters
    /// survive for chats still present; counters for vanished chats are
    /// dropped. This is the only way out of `Stale`.
    pub fn apply_chat_snapshot(&mut self, mut chats: Vec<Chat>) {
        chats.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        let present: HashSet<Uuid> = chats.iter().map(|c| c.id).collect();
        self.unread.retain(|id, _| present.contains(id));
        if let Some(selected) = self.selected {
            if !present.contains(&selected) {
                self.selected = None;
                self.open_messages.clear();
            }
        }
        self.chats = chats.into();
        self.phase = SyncPhase::Loaded;
    }

    /// The socket is confirmed; streamed events will be applied.
    pub fn mark_live(&mut self) {
        if self.phase == SyncPhase::Loaded {
            self.phase = SyncPhase::Live;
        }
    }

    /// The socket dropped. Events missed while disconnected are never
    /// redelivered, so the projection is untrustworthy until the next
    /// snapshot fetch.
    pub fn connection_lost(&mut self) {
        self.phase = SyncPhase::Stale;
    }

    /// Fold one inbound message event into the projection. Idempotent under
    /// duplicate delivery of the same message id.
    pub fn reconcile_incoming_message(&mut self, message: Message, chat: Chat) -> Reconcile {
        match self.phase {
            SyncPhase::Loaded | SyncPhase::Live => {}
            _ => return Reconcile::Ignored,
        }
        if !self.seen_messages.insert(message.id) {
            debug!("Duplicate delivery of message {}", message.id);
            return Reconcile::Duplicate;
        }

        let chat_id = message.chat_id;
        let outcome = match self.chats.iter().position(|c| c.id == chat_id) {
            Some(pos) => {
                // Move-to-front keeps the recency order without a re-sort.
                let mut entry = self.chats.remove(pos).unwrap();
                entry.latest_message = Some(message.clone());
                self.chats.push_front(entry);
                Reconcile::Updated
            }
            None => {
                // First inbound message of a brand-new chat: the event's
                // embedded chat snapshot stands in until the next fetch.
                let mut entry = chat;
                entry.latest_message = Some(message.clone());
                self.chats.push_front(entry);
                Reconcile::InsertedChat
            }
        };

        if self.selected == Some(chat_id) {
            // Selected conversation never accrues unread; the message goes
            // straight into the visible list instead.
            self.open_messages.push(message);
        } else {
            *self.unread.entry(chat_id).or_insert(0) += 1;
        }

        outcome
    }

    /// Select a conversation. Resets its unread counter locally (no network
    /// round-trip) and issues the tag the history response must carry.
    pub fn select_chat(&mut self, chat_id: Uuid) -> FetchTag {
        self.selected = Some(chat_id);
        self.unread.insert(chat_id, 0);
        self.open_messages.clear();
        self.fetch_seq += 1;
        FetchTag(self.fetch_seq)
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.open_messages.clear();
    }

    /// Apply a fetched history. Returns false when the response is stale —
    /// issued for an earlier selection — in which case it is discarded.
    pub fn apply_history(&mut self, tag: FetchTag, messages: Vec<Message>) -> bool {
        if tag.0 != self.fetch_seq || self.selected.is_none() {
            debug!("Discarding stale history response (tag {:?})", tag);
            return false;
        }

        self.open_messages.clear();
        for message in messages {
            // A live event may have raced ahead of the fetch; ids already
            // seen still belong in the ordered history, so only the visible
            // list is rebuilt while the seen-set just absorbs the ids.
            self.seen_messages.insert(message.id);
            self.open_messages.push(message);
        }
        true
    }

    /// Record a message the local user just sent (it is not echoed back by
    /// the event channel).
    pub fn record_own_message(&mut self, message: Message) {
        if !self.seen_messages.insert(message.id) {
            return;
        }
        let chat_id = message.chat_id;
        if let Some(pos) = self.chats.iter().position(|c| c.id == chat_id) {
            let mut entry = self.chats.remove(pos).unwrap();
            entry.latest_message = Some(message.clone());
            self.chats.push_front(entry);
        }
        if self.selected == Some(chat_id) {
            self.open_messages.push(message);
        }
    }

    pub fn remove_chat(&mut self, chat_id: Uuid) {
        self.chats.retain(|c| c.id != chat_id);
        self.unread.remove(&chat_id);
        if self.selected == Some(chat_id) {
            self.selected = None;
            self.open_messages.clear();
        }
    }

    // -- Accessors --

    pub fn chats(&self) -> impl Iterator<Item = &Chat> {
        self.chats.iter()
    }

    pub fn chat_order(&self) -> Vec<Uuid> {
        self.chats.iter().map(|c| c.id).collect()
    }

    pub fn unread_count(&self, chat_id: Uuid) -> u32 {
        self.unread.get(&chat_id).copied().unwrap_or(0)
    }

    pub fn selected_chat(&self) -> Option<Uuid> {
        self.selected
    }

    pub fn open_messages(&self) -> &[Message] {
        &self.open_messages
    }

    /// Group conversations, derived from the chat list.
    pub fn groups(&self) -> impl Iterator<Item = &Chat> {
        self.chats.iter().filter(|c| c.is_group_chat)
    }

    /// The peer of each direct conversation, derived from membership.
    pub fn direct_peers(&self, me: Uuid) -> Vec<&UserSummary> {
        self.chats
            .iter()
            .filter(|c| !c.is_group_chat)
            .filter_map(|c| c.users.iter().find(|u| u.id != me))
            .collect()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
