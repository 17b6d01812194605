//! Question answering orchestration.
//!
//! `QueryEngine` ties the provider, the activity store and the chat history
//! together: a question is embedded, its nearest fragments retrieved, the
//! augmented prompt sent for generation, and the exchange recorded. Every
//! external step can fail; a failure aborts the flow with its typed error
//! and leaves the chat history untouched, so a logged question always has
//! its answer next to it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::RetrievalConfig;
use crate::core::errors::EngineError;
use crate::domain::DEFAULT_SOURCE_KIND;
use crate::history::{ChatHistoryStore, ChatTurn};
use crate::llm::LlmProvider;
use crate::rag::prompt;
use crate::rag::{ActivityRecord, ActivityStore, NewActivity, RetrievedActivity, Retriever};

/// An incoming question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    /// Asking user, when resolved by the caller. Without one the answer is
    /// produced but not recorded.
    pub user: Option<i64>,
    pub question: String,
    /// Fragments to retrieve; the configured default when unset.
    pub top_k: Option<usize>,
}

/// The answer plus the fragments it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer: String,
    pub context: Vec<RetrievedActivity>,
}

pub struct QueryEngine {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn ActivityStore>,
    history: ChatHistoryStore,
    retriever: Retriever,
    retrieval: RetrievalConfig,
}

impl QueryEngine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn ActivityStore>,
        history: ChatHistoryStore,
        retrieval: RetrievalConfig,
    ) -> Self {
        let retriever = Retriever::new(provider.clone(), store.clone());
        Self {
            provider,
            store,
            history,
            retriever,
            retrieval,
        }
    }

    /// Answer a question from the stored activities.
    ///
    /// Validation, then retrieval, then generation, then - only for an
    /// identified user - one transactional user/assistant history write.
    /// Nothing is recorded when any step fails.
    pub async fn ask(&self, request: AskRequest) -> Result<AskOutcome, EngineError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(EngineError::Validation(
                "question must not be empty".to_string(),
            ));
        }

        let top_k = request.top_k.unwrap_or(self.retrieval.default_top_k);
        if top_k == 0 {
            return Err(EngineError::Validation(
                "top_k must be at least 1".to_string(),
            ));
        }
        let top_k = top_k.min(self.retrieval.max_top_k);

        let owner = if self.retrieval.owner_scoped {
            request.user
        } else {
            None
        };

        tracing::debug!(top_k, owner = ?owner, "answering question");

        let context = self.retriever.retrieve(question, top_k, owner).await?;
        let augmented = prompt::augment(question, &context);
        let answer = self.provider.generate(&augmented).await?;

        if let Some(user_id) = request.user {
            self.history
                .record_exchange(user_id, question, &answer)
                .await?;
        }

        tracing::info!(
            user = ?request.user,
            fragments = context.len(),
            "question answered"
        );

        Ok(AskOutcome { answer, context })
    }

    /// Embed and store a fragment right away, returning the stored record.
    ///
    /// The synchronous counterpart to the background pipeline, for callers
    /// that want the fragment searchable before they respond. A blank
    /// source kind becomes "manual".
    pub async fn add_activity(
        &self,
        mut activity: NewActivity,
    ) -> Result<ActivityRecord, EngineError> {
        if activity.text.trim().is_empty() {
            return Err(EngineError::Validation(
                "activity text must not be empty".to_string(),
            ));
        }

        if activity.source_kind.trim().is_empty() {
            activity.source_kind = DEFAULT_SOURCE_KIND.to_string();
        }

        let embeddings = self
            .provider
            .embed(std::slice::from_ref(&activity.text))
            .await?;
        let Some(embedding) = embeddings.into_iter().next() else {
            return Err(EngineError::EmbeddingService(
                "embedding response was empty".to_string(),
            ));
        };

        let record = self.store.insert(activity, embedding).await?;
        tracing::debug!(id = record.id, source_kind = %record.source_kind, "stored activity");
        Ok(record)
    }

    /// Remove a stored fragment. A missing id is `NotFound`.
    pub async fn delete_activity(&self, id: i64) -> Result<(), EngineError> {
        if self.store.delete_by_id(id).await? {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("activity {} not found", id)))
        }
    }

    /// Stored fragments in id order, optionally narrowed to one owner.
    pub async fn list_activities(
        &self,
        owner: Option<i64>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ActivityRecord>, EngineError> {
        match owner {
            Some(owner) => self.store.list_by_owner(owner, offset, limit).await,
            None => self.store.list(offset, limit).await,
        }
    }

    /// One user's conversation, oldest first.
    pub async fn chat_history(
        &self,
        user_id: i64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ChatTurn>, EngineError> {
        self.history.history(user_id, offset, limit).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::history::ChatRole;
    use crate::rag::SqliteActivityStore;

    struct ScriptedProvider {
        vectors: HashMap<String, Vec<f32>>,
        answer: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn health_check(&self) -> Result<bool, EngineError> {
            Ok(true)
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
            inputs
                .iter()
                .map(|input| {
                    self.vectors.get(input).cloned().ok_or_else(|| {
                        EngineError::EmbeddingService(format!("no vector for {:?}", input))
                    })
                })
                .collect()
        }

        async fn generate(&self, _prompt: &str) -> Result<String, EngineError> {
            self.answer.clone().ok_or_else(|| {
                EngineError::GenerationService("generation unavailable".to_string())
            })
        }
    }

    async fn stores() -> (Arc<SqliteActivityStore>, ChatHistoryStore) {
        let tag = uuid::Uuid::new_v4();
        let activities = SqliteActivityStore::with_path(
            std::env::temp_dir().join(format!("kawan-engine-activities-{}.db", tag)),
            3,
        )
        .await
        .unwrap();
        let history =
            ChatHistoryStore::with_path(std::env::temp_dir().join(format!("kawan-engine-chat-{}.db", tag)))
                .await
                .unwrap();
        (Arc::new(activities), history)
    }

    fn activity(owner: Option<i64>, kind: &str, text: &str) -> NewActivity {
        NewActivity {
            owner,
            source_kind: kind.to_string(),
            source_id: None,
            text: text.to_string(),
        }
    }

    /// The fixed three-fragment corpus plus a question vector pointing at
    /// the meeting fragment.
    async fn seeded_corpus(store: &SqliteActivityStore) {
        store
            .insert(
                activity(Some(1), "tugas", "Meeting with client at 10 AM on Monday."),
                vec![1.0, 0.0, 0.0],
            )
            .await
            .unwrap();
        store
            .insert(
                activity(Some(1), "jadwal", "Dentist appointment on Tuesday afternoon."),
                vec![0.0, 1.0, 0.0],
            )
            .await
            .unwrap();
        store
            .insert(
                activity(Some(1), "tugas", "Project deadline on Friday."),
                vec![0.0, 0.0, 1.0],
            )
            .await
            .unwrap();
    }

    fn meeting_vectors() -> HashMap<String, Vec<f32>> {
        HashMap::from([("When is my meeting?".to_string(), vec![0.9, 0.1, 0.0])])
    }

    fn engine_with(
        provider: ScriptedProvider,
        activities: Arc<SqliteActivityStore>,
        history: ChatHistoryStore,
        retrieval: RetrievalConfig,
    ) -> QueryEngine {
        QueryEngine::new(Arc::new(provider), activities, history, retrieval)
    }

    #[tokio::test]
    async fn ask_answers_from_nearest_fragment_and_records_the_exchange() {
        let (activities, history) = stores().await;
        seeded_corpus(&activities).await;

        let engine = engine_with(
            ScriptedProvider {
                vectors: meeting_vectors(),
                answer: Some("Your meeting is Monday at 10 AM.".to_string()),
            },
            activities,
            history.clone(),
            RetrievalConfig::default(),
        );

        let outcome = engine
            .ask(AskRequest {
                user: Some(1),
                question: "When is my meeting?".to_string(),
                top_k: Some(1),
            })
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Your meeting is Monday at 10 AM.");
        assert_eq!(outcome.context.len(), 1);
        assert_eq!(
            outcome.context[0].record.text,
            "Meeting with client at 10 AM on Monday."
        );

        let turns = history.history(1, 0, 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, ChatRole::User);
        assert_eq!(turns[0].message, "When is my meeting?");
        assert_eq!(turns[1].role, ChatRole::Assistant);
        assert_eq!(turns[1].message, "Your meeting is Monday at 10 AM.");
    }

    #[tokio::test]
    async fn generation_failure_leaves_history_untouched() {
        let (activities, history) = stores().await;
        seeded_corpus(&activities).await;

        let engine = engine_with(
            ScriptedProvider {
                vectors: meeting_vectors(),
                answer: None,
            },
            activities,
            history.clone(),
            RetrievalConfig::default(),
        );

        let err = engine
            .ask(AskRequest {
                user: Some(1),
                question: "When is my meeting?".to_string(),
                top_k: Some(2),
            })
            .await;

        assert!(matches!(err, Err(EngineError::GenerationService(_))));
        assert_eq!(history.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn anonymous_questions_are_answered_but_not_recorded() {
        let (activities, history) = stores().await;
        seeded_corpus(&activities).await;

        let engine = engine_with(
            ScriptedProvider {
                vectors: meeting_vectors(),
                answer: Some("Monday.".to_string()),
            },
            activities,
            history.clone(),
            RetrievalConfig::default(),
        );

        let outcome = engine
            .ask(AskRequest {
                user: None,
                question: "When is my meeting?".to_string(),
                top_k: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Monday.");
        assert_eq!(history.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_question_and_zero_top_k_are_rejected() {
        let (activities, history) = stores().await;

        let engine = engine_with(
            ScriptedProvider {
                vectors: HashMap::new(),
                answer: Some("unused".to_string()),
            },
            activities,
            history.clone(),
            RetrievalConfig::default(),
        );

        let err = engine
            .ask(AskRequest {
                user: Some(1),
                question: "   ".to_string(),
                top_k: None,
            })
            .await;
        assert!(matches!(err, Err(EngineError::Validation(_))));

        let err = engine
            .ask(AskRequest {
                user: Some(1),
                question: "hello?".to_string(),
                top_k: Some(0),
            })
            .await;
        assert!(matches!(err, Err(EngineError::Validation(_))));

        assert_eq!(history.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn requested_top_k_is_clamped_to_the_configured_maximum() {
        let (activities, history) = stores().await;
        seeded_corpus(&activities).await;

        let retrieval = RetrievalConfig {
            default_top_k: 2,
            max_top_k: 2,
            owner_scoped: false,
        };
        let engine = engine_with(
            ScriptedProvider {
                vectors: meeting_vectors(),
                answer: Some("Monday.".to_string()),
            },
            activities,
            history,
            retrieval,
        );

        let outcome = engine
            .ask(AskRequest {
                user: None,
                question: "When is my meeting?".to_string(),
                top_k: Some(50),
            })
            .await
            .unwrap();

        assert_eq!(outcome.context.len(), 2);
    }

    #[tokio::test]
    async fn owner_scoped_retrieval_only_sees_the_askers_fragments() {
        let (activities, history) = stores().await;
        activities
            .insert(activity(Some(1), "todo", "mine"), vec![1.0, 0.0, 0.0])
            .await
            .unwrap();
        activities
            .insert(activity(Some(2), "todo", "theirs"), vec![1.0, 0.0, 0.0])
            .await
            .unwrap();

        let retrieval = RetrievalConfig {
            owner_scoped: true,
            ..RetrievalConfig::default()
        };
        let engine = engine_with(
            ScriptedProvider {
                vectors: HashMap::from([("what do I have?".to_string(), vec![1.0, 0.0, 0.0])]),
                answer: Some("One todo.".to_string()),
            },
            activities,
            history,
            retrieval,
        );

        let outcome = engine
            .ask(AskRequest {
                user: Some(2),
                question: "what do I have?".to_string(),
                top_k: Some(10),
            })
            .await
            .unwrap();

        assert_eq!(outcome.context.len(), 1);
        assert_eq!(outcome.context[0].record.text, "theirs");
    }

    #[tokio::test]
    async fn add_activity_embeds_synchronously_and_grows_the_store() {
        let (activities, history) = stores().await;
        seeded_corpus(&activities).await;
        // Drop to the two-record baseline the scenario starts from.
        activities.delete_by_id(3).await.unwrap();
        assert_eq!(activities.count().await.unwrap(), 2);

        let text = "Final project submission deadline is Friday".to_string();
        let engine = engine_with(
            ScriptedProvider {
                vectors: HashMap::from([(text.clone(), vec![0.0, 0.5, 0.5])]),
                answer: Some("unused".to_string()),
            },
            activities.clone(),
            history,
            RetrievalConfig::default(),
        );

        let record = engine
            .add_activity(activity(Some(1), "tugas", &text))
            .await
            .unwrap();

        assert_eq!(activities.count().await.unwrap(), 3);
        assert_eq!(record.source_kind, "tugas");
        assert_eq!(record.embedding.len(), 3);
        assert!(record.embedding.iter().any(|c| *c != 0.0));
    }

    #[tokio::test]
    async fn add_activity_defaults_blank_source_kind_to_manual() {
        let (activities, history) = stores().await;

        let engine = engine_with(
            ScriptedProvider {
                vectors: HashMap::from([("remember this".to_string(), vec![1.0, 0.0, 0.0])]),
                answer: Some("unused".to_string()),
            },
            activities,
            history,
            RetrievalConfig::default(),
        );

        let record = engine
            .add_activity(activity(None, "  ", "remember this"))
            .await
            .unwrap();
        assert_eq!(record.source_kind, "manual");

        let err = engine.add_activity(activity(None, "todo", "   ")).await;
        assert!(matches!(err, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn delete_activity_maps_missing_ids_to_not_found() {
        let (activities, history) = stores().await;
        seeded_corpus(&activities).await;

        let engine = engine_with(
            ScriptedProvider {
                vectors: HashMap::new(),
                answer: Some("unused".to_string()),
            },
            activities.clone(),
            history,
            RetrievalConfig::default(),
        );

        engine.delete_activity(2).await.unwrap();
        assert_eq!(activities.count().await.unwrap(), 2);

        let err = engine.delete_activity(42).await;
        assert!(matches!(err, Err(EngineError::NotFound(_))));
        assert_eq!(activities.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn list_activities_and_chat_history_page_through_the_stores() {
        let (activities, history) = stores().await;
        seeded_corpus(&activities).await;
        activities
            .insert(activity(Some(2), "ukm", "UKM: Robotik. Role: anggota. "), vec![0.5, 0.5, 0.0])
            .await
            .unwrap();

        let engine = engine_with(
            ScriptedProvider {
                vectors: meeting_vectors(),
                answer: Some("Monday.".to_string()),
            },
            activities,
            history,
            RetrievalConfig::default(),
        );

        let all = engine.list_activities(None, 0, 10).await.unwrap();
        assert_eq!(all.len(), 4);

        let user_one = engine.list_activities(Some(1), 0, 10).await.unwrap();
        assert_eq!(user_one.len(), 3);

        let page = engine.list_activities(None, 2, 2).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4]);

        engine
            .ask(AskRequest {
                user: Some(1),
                question: "When is my meeting?".to_string(),
                top_k: Some(1),
            })
            .await
            .unwrap();

        let turns = engine.chat_history(1, 0, 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, ChatRole::User);
    }
}
