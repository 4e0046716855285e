pub mod id;

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{ AtomicI64, Ordering };

use self::id::random_id;
use crate::models::chat::Position;
use crate::models::message::{ MessageDraft, MessageId, MessageProps };

/// Messages further apart than this get a timestamp separator.
pub const TIME_GAP_MS: i64 = 5 * 60 * 1000;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self { now: Arc::new(AtomicI64::new(start)) }
    }

    pub fn set(&self, ts: i64) {
        self.now.store(ts, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: i64) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Ordered list of chat messages. Insertion order is display order; there is
/// no reordering operation.
pub struct MessageList {
    messages: Vec<MessageProps>,
    last_ts: i64,
    clock: Arc<dyn Clock>,
}

impl MessageList {
    pub fn new(initial: Vec<MessageDraft>) -> Self {
        Self::with_clock(initial, Arc::new(SystemClock))
    }

    pub fn with_clock(initial: Vec<MessageDraft>, clock: Arc<dyn Clock>) -> Self {
        let mut list = Self {
            messages: Vec::with_capacity(initial.len()),
            last_ts: 0,
            clock,
        };
        for draft in initial {
            let msg = list.make_msg(draft, None);
            list.messages.push(msg);
        }
        list
    }

    fn make_msg(&mut self, draft: MessageDraft, id: Option<MessageId>) -> MessageProps {
        let ts = draft.created_at.unwrap_or_else(|| self.clock.now_millis());
        let has_time = draft.has_time.unwrap_or(false) || ts - self.last_ts > TIME_GAP_MS;

        if has_time {
            self.last_ts = ts;
        }

        let id = draft.id
            .or(id)
            .unwrap_or_else(|| MessageId::Text(random_id(self.clock.now_millis())));

        MessageProps {
            id,
            role: draft.role,
            content_type: draft.content_type,
            content: draft.content,
            created_at: ts,
            position: draft.position.unwrap_or(Position::Left),
            has_time,
            status: draft.status,
            user: draft.user,
            error: draft.error,
        }
    }

    pub fn messages(&self) -> &[MessageProps] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&MessageProps> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Puts already-built messages in front of the list, untouched.
    pub fn prepend(&mut self, msgs: Vec<MessageProps>) {
        let mut combined = msgs;
        combined.append(&mut self.messages);
        self.messages = combined;
    }

    pub fn append(&mut self, draft: MessageDraft) -> MessageId {
        let msg = self.make_msg(draft, None);
        let id = msg.id.clone();
        self.messages.push(msg);
        id
    }

    /// Replaces the message with `id`. The replacement keeps `id` unless the
    /// draft carries its own.
    pub fn update(&mut self, id: &MessageId, draft: MessageDraft) -> bool {
        let Some(index) = self.messages.iter().position(|m| &m.id == id) else {
            return false;
        };
        let msg = self.make_msg(draft, Some(id.clone()));
        self.messages[index] = msg;
        true
    }

    pub fn delete(&mut self, id: &MessageId) -> bool {
        match self.messages.iter().position(|m| &m.id == id) {
            Some(index) => {
                self.messages.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self, list: Vec<MessageDraft>) {
        let mut messages = Vec::with_capacity(list.len());
        for draft in list {
            messages.push(self.make_msg(draft, None));
        }
        self.messages = messages;
    }
}

impl Default for MessageList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
