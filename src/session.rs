use log::{ error, info };
use std::error::Error;
use std::sync::Arc;

use crate::history::ConversationStore;
use crate::llm::chat::{ ChatClient, CompletionMessage };
use crate::messages::{ Clock, MessageList, SystemClock };
use crate::models::chat::{ ChatMessage, ContentType, Conversation, ConversationPatch, Role };
use crate::models::message::{ MessageDraft, MessageProps, MessageStatus };

pub const DEFAULT_TITLE: &str = "New chat";
const TITLE_MAX_CHARS: usize = 20;

/// Derives a conversation title from its first user message.
pub fn title_from(text: &str) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    if line.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    let mut title: String = line.chars().take(TITLE_MAX_CHARS).collect();
    if line.chars().count() > TITLE_MAX_CHARS {
        title.push('…');
    }
    title
}

/// One open conversation: the message list on screen, the record it is
/// saved to, and the backend that answers it.
pub struct ChatSession {
    chat_client: Arc<dyn ChatClient>,
    store: Arc<dyn ConversationStore>,
    messages: MessageList,
    clock: Arc<dyn Clock>,
    conversation_id: Option<i64>,
    title: String,
}

impl ChatSession {
    pub fn new(chat_client: Arc<dyn ChatClient>, store: Arc<dyn ConversationStore>) -> Self {
        Self::with_clock(chat_client, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        chat_client: Arc<dyn ChatClient>,
        store: Arc<dyn ConversationStore>,
        clock: Arc<dyn Clock>
    ) -> Self {
        Self {
            chat_client,
            store,
            messages: MessageList::with_clock(Vec::new(), Arc::clone(&clock)),
            clock,
            conversation_id: None,
            title: DEFAULT_TITLE.to_string(),
        }
    }

    pub fn messages(&self) -> &[MessageProps] {
        self.messages.messages()
    }

    pub fn conversation_id(&self) -> Option<i64> {
        self.conversation_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Starts over with an empty, unsaved conversation.
    pub fn new_conversation(&mut self) {
        self.conversation_id = None;
        self.title = DEFAULT_TITLE.to_string();
        self.messages.reset(Vec::new());
    }

    /// Loads a stored conversation. Returns false when the id is unknown.
    pub async fn open(&mut self, id: i64) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let Some(conversation) = self.store.get_by_id(id).await? else {
            return Ok(false);
        };
        let now = self.clock.now_millis();
        let drafts: Vec<MessageDraft> = conversation.messages
            .into_iter()
            .enumerate()
            .map(|(index, msg)| {
                let mut draft = MessageDraft::from(msg);
                draft.created_at = Some(now);
                if index == 0 {
                    draft.has_time = Some(true);
                }
                draft
            })
            .collect();
        self.messages.reset(drafts);
        self.conversation_id = Some(id);
        self.title = conversation.title;
        info!("Opened conversation {} ({} messages)", id, self.messages.len());
        Ok(true)
    }

    fn completion_messages(&self) -> Vec<CompletionMessage> {
        self.messages
            .messages()
            .iter()
            .filter(|m| !m.error)
            .map(|m| CompletionMessage::new(m.role.as_str(), m.content.clone()))
            .collect()
    }

    /// Sends `text`, records the reply and saves the conversation. A failed
    /// completion is recorded as an error-flagged assistant message rather
    /// than returned as an error; only persistence failures are errors.
    pub async fn send(&mut self, text: &str) -> Result<MessageProps, Box<dyn Error + Send + Sync>> {
        let text = text.trim();
        if text.is_empty() {
            return Err("Cannot send an empty message".into());
        }

        self.messages.append(MessageDraft::user(text).with_status(MessageStatus::Sent));
        let request = self.completion_messages();

        let reply_id = match self.chat_client.complete(&request).await {
            Ok(reply) => {
                let content_type = ContentType::detect(&reply.content);
                self.messages.append(
                    MessageDraft::assistant(reply.content)
                        .with_type(content_type)
                        .with_status(MessageStatus::Sent)
                )
            }
            Err(e) => {
                error!("Completion request failed: {}", e);
                self.messages.append(MessageDraft::assistant(e.to_string()).failed())
            }
        };

        self.persist().await?;

        self.messages
            .get(&reply_id)
            .cloned()
            .ok_or_else(|| "Reply vanished from the message list".into())
    }

    async fn persist(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let stored: Vec<ChatMessage> = self.messages.messages().iter().map(ChatMessage::from).collect();

        match self.conversation_id {
            Some(id) => {
                let updated = self.store.update(id, ConversationPatch::messages(stored.clone())).await?;
                if updated == 0 {
                    // Removed from under us (another process cleared it); save a fresh record.
                    let new_id = self.store.add(Conversation::new(self.title.clone(), stored)).await?;
                    self.conversation_id = Some(new_id);
                }
            }
            None => {
                let first_user = self.messages
                    .messages()
                    .iter()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                self.title = title_from(first_user);
                let id = self.store.add(Conversation::new(self.title.clone(), stored)).await?;
                info!("Saved new conversation {} '{}'", id, self.title);
                self.conversation_id = Some(id);
            }
        }
        Ok(())
    }

    /// Renames the current conversation. Unsaved conversations only change
    /// their in-memory title.
    pub async fn rename(&mut self, title: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let title = title.trim();
        if title.is_empty() {
            return Err("Title cannot be empty".into());
        }
        if let Some(id) = self.conversation_id {
            self.store.update(id, ConversationPatch::title(title)).await?;
        }
        self.title = title.to_string();
        Ok(())
    }

    /// Deletes the current conversation and starts a new one.
    pub async fn delete_current(&mut self) -> Result<Option<i64>, Box<dyn Error + Send + Sync>> {
        let removed = self.conversation_id;
        if let Some(id) = removed {
            self.store.remove(id).await?;
        }
        self.new_conversation();
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<Conversation>, Box<dyn Error + Send + Sync>> {
        self.store.get_all().await
    }

    pub async fn clear_all(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.store.clear_all().await?;
        self.new_conversation();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::history::MemoryConversationStore;
    use crate::messages::ManualClock;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with queued answers; an empty queue fails the call.
    pub struct ScriptedClient {
        pub replies: Mutex<Vec<Result<String, String>>>,
        pub seen: Mutex<Vec<Vec<CompletionMessage>>>,
    }

    impl ScriptedClient {
        pub fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .rev()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect()
                ),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(
            &self,
            messages: &[CompletionMessage]
        ) -> Result<CompletionMessage, Box<dyn Error + Send + Sync>> {
            self.seen.lock().unwrap().push(messages.to_vec());
            match self.replies.lock().unwrap().pop() {
                Some(Ok(content)) => Ok(CompletionMessage::new("assistant", content)),
                Some(Err(e)) => Err(e.into()),
                None => Err("no scripted reply".into()),
            }
        }

        fn get_model(&self) -> String {
            "scripted".into()
        }

        fn get_base_url(&self) -> Option<String> {
            None
        }
    }

    fn session_with(
        client: Arc<ScriptedClient>
    ) -> (ChatSession, Arc<MemoryConversationStore>) {
        let store = Arc::new(MemoryConversationStore::new());
        let session = ChatSession::with_clock(
            client,
            store.clone(),
            Arc::new(ManualClock::new(1_700_000_000_000))
        );
        (session, store)
    }

    #[test]
    fn titles_are_trimmed_to_twenty_chars() {
        assert_eq!(title_from("  short question "), "short question");
        assert_eq!(title_from("abcdefghijklmnopqrstuvwxyz"), "abcdefghijklmnopqrst…");
        assert_eq!(title_from("\n\n"), DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn first_send_creates_the_record() {
        let client = ScriptedClient::new(vec![Ok("# Hello\n\n- there")]);
        let (mut session, store) = session_with(client.clone());

        let reply = session.send("hi model").await.unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content_type, ContentType::Markdown);
        assert!(!reply.error);

        let id = session.conversation_id().unwrap();
        let stored = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.title, "hi model");
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[0].role, Role::User);

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0], vec![CompletionMessage::new("user", "hi model")]);
    }

    #[tokio::test]
    async fn later_sends_carry_history_and_update_the_same_record() {
        let client = ScriptedClient::new(vec![Ok("one"), Ok("two")]);
        let (mut session, store) = session_with(client.clone());

        session.send("first").await.unwrap();
        session.send("second").await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].messages.len(), 4);

        let seen = client.seen.lock().unwrap();
        let roles: Vec<&str> = seen[1].iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
    }

    #[tokio::test]
    async fn failed_completion_is_recorded_and_not_resent() {
        let client = ScriptedClient::new(vec![Err("503 from upstream"), Ok("recovered")]);
        let (mut session, store) = session_with(client.clone());

        let failed = session.send("hello").await.unwrap();
        assert!(failed.error);
        assert_eq!(failed.status, Some(MessageStatus::Fail));
        assert_eq!(failed.content, "503 from upstream");

        session.send("again").await.unwrap();
        let seen = client.seen.lock().unwrap();
        assert!(seen[1].iter().all(|m| m.content != "503 from upstream"));

        let stored = store.get_by_id(session.conversation_id().unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.messages[1].error, Some(true));
    }

    #[tokio::test]
    async fn blank_input_is_rejected() {
        let (mut session, store) = session_with(ScriptedClient::new(vec![]));
        assert!(session.send("   ").await.is_err());
        assert!(session.messages().is_empty());
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_rename_and_delete() {
        let client = ScriptedClient::new(vec![Ok("reply")]);
        let (mut session, store) = session_with(client);
        session.send("question").await.unwrap();
        let id = session.conversation_id().unwrap();

        session.new_conversation();
        assert!(session.messages().is_empty());
        assert!(!session.open(id + 1).await.unwrap());
        assert!(session.open(id).await.unwrap());
        assert_eq!(session.messages().len(), 2);
        assert!(session.messages()[0].has_time);

        session.rename("Renamed").await.unwrap();
        let stored = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.messages.len(), 2);

        assert_eq!(session.delete_current().await.unwrap(), Some(id));
        assert!(store.get_by_id(id).await.unwrap().is_none());
        assert_eq!(session.conversation_id(), None);
    }

    #[tokio::test]
    async fn clear_all_empties_the_store() {
        let client = ScriptedClient::new(vec![Ok("a")]);
        let (mut session, store) = session_with(client);
        session.send("q").await.unwrap();
        session.clear_all().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(session.list().await.unwrap().is_empty());
    }
}
