//! End-to-end pipeline tests over in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use briefly::chat::{ChatPipeline, ChatRequest};
use briefly::config::{ChunkingConfig, ConfidenceConfig, RetrievalConfig};
use briefly::conversation::{ConversationStore, InMemoryConversationStore};
use briefly::embedding::{Embedding, EmbeddingBatch, EmbeddingGateway};
use briefly::error::PipelineError;
use briefly::generation::{GenerationBackend, GenerationOutput, GenerationRequest};
use briefly::models::{SearchHit, VectorRecord};
use briefly::processor::{DocumentProcessor, IngestRequest};
use briefly::registry::{DocumentRegistry, InMemoryRegistry, InMemoryUsageSink};
use briefly::router::{Tier, UNSUPPORTED_MESSAGE};
use briefly::store::memory::InMemoryVectorStore;
use briefly::store::{SearchOptions, VectorStore};

/// Maps every text to the same direction so any stored chunk matches
/// any query with relevance 1.0.
struct AlignedGateway;

#[async_trait]
impl EmbeddingGateway for AlignedGateway {
    fn model_name(&self) -> &str {
        "fake-embed"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Ok(Embedding {
            vector: vec![1.0, 0.0, 0.0],
            model: "fake-embed".into(),
        })
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        Ok(EmbeddingBatch {
            embeddings: texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect(),
            model: "fake-embed".into(),
            dimensions: 3,
        })
    }
}

struct EchoBackend;

#[async_trait]
impl GenerationBackend for EchoBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        Ok(GenerationOutput {
            text: format!("answer via {}", request.model.as_str()),
            input_tokens: 50,
            output_tokens: 10,
        })
    }
}

/// Wraps a real store, counting delete calls and optionally failing
/// them.
struct CountingStore {
    inner: InMemoryVectorStore,
    delete_calls: AtomicUsize,
    fail_delete: bool,
}

impl CountingStore {
    fn new(fail_delete: bool) -> Self {
        Self {
            inner: InMemoryVectorStore::new(),
            delete_calls: AtomicUsize::new(0),
            fail_delete,
        }
    }
}

#[async_trait]
impl VectorStore for CountingStore {
    async fn add(&self, owner_id: &str, records: Vec<VectorRecord>) -> Result<()> {
        self.inner.add(owner_id, records).await
    }
    async fn search(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        self.inner.search(owner_id, query_vector, options).await
    }
    async fn delete_document(&self, owner_id: &str, document_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete {
            anyhow::bail!("simulated vector delete failure");
        }
        self.inner.delete_document(owner_id, document_id).await
    }
    async fn document_record_count(&self, owner_id: &str, document_id: &str) -> Result<usize> {
        self.inner.document_record_count(owner_id, document_id).await
    }
}

fn processor_with(store: Arc<dyn VectorStore>, registry: Arc<InMemoryRegistry>) -> DocumentProcessor {
    DocumentProcessor::new(
        Arc::new(AlignedGateway),
        store,
        registry,
        Arc::new(InMemoryUsageSink::new()),
        ChunkingConfig::default(),
        RetrievalConfig::default(),
    )
}

fn ingest_request(doc: &str, text: &str) -> IngestRequest {
    IngestRequest {
        owner_id: "u1".into(),
        document_id: doc.into(),
        document_name: format!("{}.txt", doc),
        text: text.into(),
        metadata: BTreeMap::new(),
    }
}

// 2500 characters of plain text produce exactly three vector
// records with deterministic ids.
#[tokio::test]
async fn ingest_2500_chars_produces_three_deterministic_records() {
    let store = Arc::new(InMemoryVectorStore::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let processor = processor_with(store.clone(), registry.clone());

    let text = "a".repeat(2500);
    processor
        .process_document(&ingest_request("doc1", &text))
        .await
        .unwrap();

    assert_eq!(store.document_record_count("u1", "doc1").await.unwrap(), 3);

    // The ids are addressable: re-ingesting collides and overwrites.
    processor
        .process_document(&ingest_request("doc1", &text))
        .await
        .unwrap();
    assert_eq!(store.document_record_count("u1", "doc1").await.unwrap(), 3);

    let hits = store
        .search(
            "u1",
            &[1.0, 0.0, 0.0],
            &SearchOptions {
                limit: 10,
                threshold: 0.0,
                file_ids: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.document_id == "doc1"));
}

// An unsupported query gets the fixed refusal with empty
// sources and a null routed model, on every tier and accuracy mode.
#[tokio::test]
async fn unsupported_query_refused_on_every_tier() {
    let pipeline = ChatPipeline::new(
        Arc::new(AlignedGateway),
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(InMemoryConversationStore::new()),
        Arc::new(EchoBackend),
        Arc::new(InMemoryUsageSink::new()),
        RetrievalConfig::default(),
        ConfidenceConfig::default(),
    );

    for tier in [Tier::Free, Tier::Pro, Tier::ProByok] {
        for accuracy_mode in [false, true] {
            let resp = pipeline
                .chat(&ChatRequest {
                    owner_id: "u1".into(),
                    message: "generate an image of my cat".into(),
                    conversation_id: None,
                    tier,
                    accuracy_mode,
                    has_byok_key: true,
                })
                .await
                .unwrap();

            assert_eq!(resp.response, UNSUPPORTED_MESSAGE);
            assert!(resp.sources.is_empty());
            assert!(resp.provenance.routing.model.is_none());
        }
    }
}

// A doc-grounded query with weak retrieval refuses even for a
// high tier with accuracy mode on.
#[tokio::test]
async fn weak_retrieval_refuses_high_tier_accuracy_mode() {
    let store = Arc::new(InMemoryVectorStore::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let processor = processor_with(store.clone(), registry);
    processor
        .process_document(&ingest_request("doc1", "quarterly planning notes"))
        .await
        .unwrap();

    // Low-relevance gateway for the query side only.
    struct SkewedGateway;
    #[async_trait]
    impl EmbeddingGateway for SkewedGateway {
        fn model_name(&self) -> &str {
            "fake-embed"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, _text: &str) -> Result<Embedding> {
            // Cosine against stored [1,0,0] is ~0.3.
            Ok(Embedding {
                vector: vec![0.3, 0.954, 0.0],
                model: "fake-embed".into(),
            })
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch> {
            Ok(EmbeddingBatch {
                embeddings: texts.iter().map(|_| vec![0.3, 0.954, 0.0]).collect(),
                model: "fake-embed".into(),
                dimensions: 3,
            })
        }
    }

    let pipeline = ChatPipeline::new(
        Arc::new(SkewedGateway),
        store,
        Arc::new(InMemoryConversationStore::new()),
        Arc::new(EchoBackend),
        Arc::new(InMemoryUsageSink::new()),
        RetrievalConfig::default(),
        ConfidenceConfig::default(),
    );

    let resp = pipeline
        .chat(&ChatRequest {
            owner_id: "u1".into(),
            message: "what do my notes say about planning?".into(),
            conversation_id: None,
            tier: Tier::Pro,
            accuracy_mode: true,
            has_byok_key: false,
        })
        .await
        .unwrap();

    assert!(!resp.provenance.routing.should_respond);
    assert!(resp.provenance.retrieval.performed);
    assert!(!resp.provenance.retrieval.is_sufficient);
    assert!(resp.sources.is_empty());
}

// Delete issues exactly one scoped vector delete, then the
// registry delete; a failing vector delete leaves the record intact.
#[tokio::test]
async fn delete_ordering_and_failure_isolation() {
    let store = Arc::new(CountingStore::new(false));
    let registry = Arc::new(InMemoryRegistry::new());
    let processor = processor_with(store.clone(), registry.clone());

    processor
        .process_document(&ingest_request("doc1", &"x".repeat(2500)))
        .await
        .unwrap();
    assert_eq!(store.document_record_count("u1", "doc1").await.unwrap(), 3);

    processor.delete_document("u1", "doc1").await.unwrap();
    assert_eq!(store.delete_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.document_record_count("u1", "doc1").await.unwrap(), 0);
    assert!(registry.get("u1", "doc1").await.unwrap().is_none());

    // Failing vector delete: error propagates, record survives.
    let failing = Arc::new(CountingStore::new(true));
    let registry = Arc::new(InMemoryRegistry::new());
    let processor = processor_with(failing.clone(), registry.clone());
    processor
        .process_document(&ingest_request("doc2", "short text"))
        .await
        .unwrap();

    let err = processor.delete_document("u1", "doc2").await.unwrap_err();
    assert!(matches!(err, PipelineError::VectorStore(_)));
    assert!(registry.get("u1", "doc2").await.unwrap().is_some());
}

// A doc-grounded answer must carry sources and a complete provenance
// trail that survives persistence.
#[tokio::test]
async fn grounded_answer_end_to_end() {
    let store = Arc::new(InMemoryVectorStore::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let processor = processor_with(store.clone(), registry);
    processor
        .process_document(&ingest_request("report", "Q3 revenue rose 12% year over year."))
        .await
        .unwrap();

    let conversations = Arc::new(InMemoryConversationStore::new());
    let pipeline = ChatPipeline::new(
        Arc::new(AlignedGateway),
        store,
        conversations.clone(),
        Arc::new(EchoBackend),
        Arc::new(InMemoryUsageSink::new()),
        RetrievalConfig::default(),
        ConfidenceConfig::default(),
    );

    let resp = pipeline
        .chat(&ChatRequest {
            owner_id: "u1".into(),
            message: "what does my document say about Q3 revenue?".into(),
            conversation_id: None,
            tier: Tier::Free,
            accuracy_mode: false,
            has_byok_key: false,
        })
        .await
        .unwrap();

    assert_eq!(resp.response, "answer via gpt-3.5-turbo");
    assert_eq!(resp.sources.len(), 1);
    assert_eq!(resp.sources[0].source, "report.txt");
    assert_eq!(resp.provenance.generation.output_tokens, 10);

    let history = conversations
        .history("u1", &resp.conversation_id)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[1].metadata["provenance"]["routing"]["model"],
        "gpt-3.5-turbo"
    );
}
