use async_trait::async_trait;
use crate::history::ConversationStore;
use crate::models::chat::{ ChatMessage, Conversation, ConversationPatch };
use std::collections::HashMap;
use std::error::Error;
use log::error;
use redis::{ Client, AsyncCommands, Script };
use serde::{ Serialize, Deserialize };

const BUMP_COUNTER: &str =
    r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if tonumber(ARGV[1]) > current then
    redis.call('SET', KEYS[1], ARGV[1])
end
return 1
";

#[derive(Serialize, Deserialize)]
struct StoredConversation {
    title: String,
    messages: Vec<ChatMessage>,
}

impl StoredConversation {
    fn into_conversation(self, id: i64) -> Conversation {
        Conversation {
            id: Some(id),
            title: self.title,
            messages: self.messages,
        }
    }
}

/// Conversations as JSON values in one Redis hash, ids from an `INCR` counter.
pub struct RedisConversationStore {
    client: Client,
    key_prefix: String,
}

impl RedisConversationStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn table_key(&self) -> String {
        format!("{}conversations", self.key_prefix)
    }

    fn counter_key(&self) -> String {
        format!("{}next_id", self.key_prefix)
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn get_all(&self) -> Result<Vec<Conversation>, Box<dyn Error + Send + Sync>> {
        let mut conn = self.get_connection().await?;
        let entries: HashMap<i64, String> = conn.hgetall(self.table_key()).await?;
        let mut conversations = Vec::with_capacity(entries.len());

        for (id, json_entry) in entries {
            match serde_json::from_str::<StoredConversation>(&json_entry) {
                Ok(stored) => conversations.push(stored.into_conversation(id)),
                Err(e) => {
                    error!("Error parsing conversation {}: {}", id, e);
                }
            }
        }
        conversations.sort_by_key(|c| c.id);

        Ok(conversations)
    }

    async fn add(&self, conversation: Conversation) -> Result<i64, Box<dyn Error + Send + Sync>> {
        let mut conn = self.get_connection().await?;
        let id = match conversation.id {
            Some(id) => {
                Script::new(BUMP_COUNTER)
                    .key(self.counter_key())
                    .arg(id)
                    .invoke_async::<_, i64>(&mut conn).await?;
                id
            }
            None => conn.incr(self.counter_key(), 1).await?,
        };

        let stored = StoredConversation {
            title: conversation.title,
            messages: conversation.messages,
        };
        let json = serde_json::to_string(&stored)?;
        let inserted: bool = conn.hset_nx(self.table_key(), id, json).await?;
        if !inserted {
            return Err(format!("Conversation {} already exists", id).into());
        }

        Ok(id)
    }

    async fn update(
        &self,
        id: i64,
        patch: ConversationPatch
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let mut conn = self.get_connection().await?;
        let existing: Option<String> = conn.hget(self.table_key(), id).await?;
        let Some(json_entry) = existing else {
            return Ok(0);
        };

        let mut conversation = serde_json
            ::from_str::<StoredConversation>(&json_entry)?
            .into_conversation(id);
        patch.apply(&mut conversation);

        let stored = StoredConversation {
            title: conversation.title,
            messages: conversation.messages,
        };
        let _: () = conn.hset(self.table_key(), id, serde_json::to_string(&stored)?).await?;
        Ok(1)
    }

    async fn remove(&self, id: i64) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.hdel(self.table_key(), id).await?;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Conversation>, Box<dyn Error + Send + Sync>> {
        let mut conn = self.get_connection().await?;
        let existing: Option<String> = conn.hget(self.table_key(), id).await?;
        match existing {
            Some(json_entry) => {
                let stored = serde_json::from_str::<StoredConversation>(&json_entry)?;
                Ok(Some(stored.into_conversation(id)))
            }
            None => Ok(None),
        }
    }

    async fn clear_all(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.del(self.table_key()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    /// Store on a fresh key prefix, or `None` when no Redis answers.
    async fn live_store() -> Option<RedisConversationStore> {
        let host = std::env::var("HISTORY_HOST")
            .or_else(|_| std::env::var("REDIS_URL"))
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let prefix = format!("chat-llm-test:{}:", uuid::Uuid::new_v4());
        let store = RedisConversationStore::new(&host, &prefix).ok()?;
        let mut conn = match store.get_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                eprintln!("Skipping Redis test, {} unreachable: {}", host, e);
                return None;
            }
        };
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        pong.ok().map(|_| store)
    }

    async fn drop_keys(store: &RedisConversationStore) {
        if let Ok(mut conn) = store.get_connection().await {
            let _: Result<i64, _> = conn.del(vec![store.table_key(), store.counter_key()]).await;
        }
    }

    fn sample(title: &str) -> Conversation {
        Conversation::new(
            title,
            vec![ChatMessage::new(Role::User, "hi"), ChatMessage::new(Role::Assistant, "hello")]
        )
    }

    #[tokio::test]
    async fn ids_increase_and_explicit_ids_bump_the_counter() {
        let Some(store) = live_store().await else {
            return;
        };

        assert_eq!(store.add(sample("one")).await.unwrap(), 1);
        assert_eq!(store.add(sample("two")).await.unwrap(), 2);

        let mut explicit = sample("explicit");
        explicit.id = Some(10);
        assert_eq!(store.add(explicit.clone()).await.unwrap(), 10);
        assert!(store.add(explicit).await.is_err());
        assert_eq!(store.add(sample("next")).await.unwrap(), 11);

        let mut lower = sample("lower");
        lower.id = Some(5);
        assert_eq!(store.add(lower).await.unwrap(), 5);
        assert_eq!(store.add(sample("after lower")).await.unwrap(), 12);

        let ids: Vec<_> = store
            .get_all().await
            .unwrap()
            .iter()
            .filter_map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 5, 10, 11, 12]);

        drop_keys(&store).await;
    }

    #[tokio::test]
    async fn title_and_messages_update_independently() {
        let Some(store) = live_store().await else {
            return;
        };
        let id = store.add(sample("before")).await.unwrap();

        assert_eq!(store.update(id, ConversationPatch::title("after")).await.unwrap(), 1);
        let renamed = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(renamed.title, "after");
        assert_eq!(renamed.messages, sample("x").messages);

        let replacement = vec![ChatMessage::new(Role::User, "only")];
        store.update(id, ConversationPatch::messages(replacement.clone())).await.unwrap();
        let replaced = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(replaced.title, "after");
        assert_eq!(replaced.messages, replacement);

        assert_eq!(store.update(id + 100, ConversationPatch::title("x")).await.unwrap(), 0);
        assert!(store.get_by_id(id + 100).await.unwrap().is_none());

        drop_keys(&store).await;
    }

    #[tokio::test]
    async fn clear_keeps_the_counter() {
        let Some(store) = live_store().await else {
            return;
        };
        let a = store.add(sample("a")).await.unwrap();
        store.add(sample("b")).await.unwrap();

        store.remove(a).await.unwrap();
        store.remove(a).await.unwrap();
        assert_eq!(store.get_all().await.unwrap().len(), 1);

        store.clear_all().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
        assert_eq!(store.add(sample("c")).await.unwrap(), 3);

        drop_keys(&store).await;
    }

    #[test]
    fn keys_share_the_prefix() {
        let store = RedisConversationStore::new("redis://127.0.0.1:6379", "chat-llm:").unwrap();
        assert_eq!(store.table_key(), "chat-llm:conversations");
        assert_eq!(store.counter_key(), "chat-llm:next_id");
    }

    #[test]
    fn stored_form_omits_the_id() {
        let stored = StoredConversation { title: "t".into(), messages: Vec::new() };
        let json = serde_json::to_value(&stored).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(stored.into_conversation(4).id, Some(4));
    }
}
