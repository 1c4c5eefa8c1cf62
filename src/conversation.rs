//! Conversation turn persistence.
//!
//! Two append-only writes per exchange: one user turn, one assistant
//! turn carrying sources and provenance metadata. A persisted turn is
//! never mutated.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::models::{ConversationTurn, Role, SourceRef};

/// Append-only store of conversation turns.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one turn to its conversation.
    async fn append_turn(&self, turn: &ConversationTurn) -> Result<()>;

    /// All turns of a conversation, oldest first.
    async fn history(&self, owner_id: &str, conversation_id: &str)
        -> Result<Vec<ConversationTurn>>;

    /// Ids of the owner's conversations, most recently active first.
    async fn list_conversations(&self, owner_id: &str) -> Result<Vec<String>>;
}

/// In-memory conversation store for tests and embedded use.
#[derive(Default)]
pub struct InMemoryConversationStore {
    turns: RwLock<HashMap<(String, String), Vec<ConversationTurn>>>,
    /// Append order of conversation ids per owner, for recency listing.
    order: RwLock<Vec<(String, String)>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append_turn(&self, turn: &ConversationTurn) -> Result<()> {
        let key = (turn.owner_id.clone(), turn.conversation_id.clone());
        let mut turns = self.turns.write().unwrap();
        turns.entry(key.clone()).or_default().push(turn.clone());
        let mut order = self.order.write().unwrap();
        order.retain(|k| *k != key);
        order.push(key);
        Ok(())
    }

    async fn history(
        &self,
        owner_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ConversationTurn>> {
        let turns = self.turns.read().unwrap();
        Ok(turns
            .get(&(owner_id.to_string(), conversation_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_conversations(&self, owner_id: &str) -> Result<Vec<String>> {
        let order = self.order.read().unwrap();
        Ok(order
            .iter()
            .rev()
            .filter(|(owner, _)| owner == owner_id)
            .map(|(_, id)| id.clone())
            .collect())
    }
}

/// SQLite-backed [`ConversationStore`] over `conversation_turns`.
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn append_turn(&self, turn: &ConversationTurn) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversation_turns
                (conversation_id, owner_id, role, content, sources_json, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&turn.conversation_id)
        .bind(&turn.owner_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(serde_json::to_string(&turn.sources)?)
        .bind(serde_json::to_string(&turn.metadata)?)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn history(
        &self,
        owner_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT conversation_id, owner_id, role, content, sources_json, metadata_json
            FROM conversation_turns
            WHERE owner_id = ? AND conversation_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(owner_id)
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ConversationTurn> {
                let role: String = row.get("role");
                let sources_json: String = row.get("sources_json");
                let metadata_json: String = row.get("metadata_json");
                let sources: Vec<SourceRef> = serde_json::from_str(&sources_json)?;
                let metadata: serde_json::Value = serde_json::from_str(&metadata_json)?;
                Ok(ConversationTurn {
                    conversation_id: row.get("conversation_id"),
                    owner_id: row.get("owner_id"),
                    role: match role.as_str() {
                        "assistant" => Role::Assistant,
                        _ => Role::User,
                    },
                    content: row.get("content"),
                    sources,
                    metadata,
                })
            })
            .collect()
    }

    async fn list_conversations(&self, owner_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT conversation_id, MAX(seq) AS last_seq
            FROM conversation_turns
            WHERE owner_id = ?
            GROUP BY conversation_id
            ORDER BY last_seq DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("conversation_id")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn turn(role: Role, content: &str) -> ConversationTurn {
        ConversationTurn {
            conversation_id: "c1".into(),
            owner_id: "u1".into(),
            role,
            content: content.into(),
            sources: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_memory_history_ordered() {
        let store = InMemoryConversationStore::new();
        store.append_turn(&turn(Role::User, "hi")).await.unwrap();
        store
            .append_turn(&turn(Role::Assistant, "hello"))
            .await
            .unwrap();

        let history = store.history("u1", "c1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[1].role, Role::Assistant);

        assert!(store.history("u2", "c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_list_by_recency() {
        let store = InMemoryConversationStore::new();
        let mut a = turn(Role::User, "first conversation");
        a.conversation_id = "c1".into();
        let mut b = turn(Role::User, "second conversation");
        b.conversation_id = "c2".into();

        store.append_turn(&a).await.unwrap();
        store.append_turn(&b).await.unwrap();
        // Activity in c1 moves it back to the front.
        store.append_turn(&a).await.unwrap();

        assert_eq!(
            store.list_conversations("u1").await.unwrap(),
            vec!["c1".to_string(), "c2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip_with_sources_and_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::connect(&tmp.path().join("db.sqlite")).await.unwrap();
        db::init_schema(&pool).await.unwrap();
        let store = SqliteConversationStore::new(pool);

        store.append_turn(&turn(Role::User, "question")).await.unwrap();

        let mut assistant = turn(Role::Assistant, "answer");
        assistant.sources = vec![SourceRef {
            source: "report.pdf".into(),
            content: "Q3 revenue rose".into(),
            relevance_score: 0.82,
        }];
        assistant.metadata = serde_json::json!({ "provenance": { "routing": { "model": "gpt-3.5-turbo" } } });
        store.append_turn(&assistant).await.unwrap();

        let history = store.history("u1", "c1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].sources.len(), 1);
        assert_eq!(history[1].sources[0].source, "report.pdf");
        assert_eq!(
            history[1].metadata["provenance"]["routing"]["model"],
            "gpt-3.5-turbo"
        );

        assert_eq!(
            store.list_conversations("u1").await.unwrap(),
            vec!["c1".to_string()]
        );
    }
}
