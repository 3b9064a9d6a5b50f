use super::prompt::{
    CONTEXT_SEPARATOR, NO_DOCUMENTS_FOUND, RETRIEVAL_ONLY_PREFIX, SYSTEM_PROMPT, format_context,
    preview,
};
use super::*;
use crate::embeddings::normalize;
use crate::llm::{ChatMessage, Role};
use std::fs;
use std::sync::Mutex as StdMutex;
use tempfile::TempDir;

const VOCABULARY: &[&str] = &["leave", "salary", "office", "parking"];

struct KeywordEmbedder;

impl KeywordEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| if lower.contains(word) { 1.0 } else { 0.0 })
            .collect();
        vector.push(0.1);
        normalize(vector)
    }
}

impl Embedder for KeywordEmbedder {
    fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| Self::vector(text)).collect())
    }

    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(Self::vector(text))
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

struct UnreachableEmbedder;

impl Embedder for UnreachableEmbedder {
    fn embed_documents(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Err(anyhow::anyhow!("connection refused"))
    }

    fn embed_query(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Err(anyhow::anyhow!("connection refused"))
    }

    fn model_name(&self) -> &str {
        "unreachable"
    }
}

/// Replies with a fixed text and records every conversation it receives
#[derive(Default)]
struct RecordingChatModel {
    conversations: StdMutex<Vec<Vec<ChatMessage>>>,
}

impl ChatModel for RecordingChatModel {
    fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        self.conversations
            .lock()
            .expect("lock should not be poisoned")
            .push(messages.to_vec());
        Ok("New employees get 5 days of annual leave.".to_string())
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

struct FailingChatModel;

impl ChatModel for FailingChatModel {
    fn complete(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("LLM request failed: HTTP 401"))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

fn knowledge_base() -> (TempDir, Config) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let knowledge = temp_dir.path().join("knowledge_docs");
    fs::create_dir_all(&knowledge).expect("should create knowledge dir");
    fs::write(
        knowledge.join("leave.md"),
        "Annual leave is 5 days for new employees.",
    )
    .expect("should write");
    fs::write(
        knowledge.join("salary.md"),
        "Salary is paid on the 10th of every month.",
    )
    .expect("should write");
    fs::write(
        knowledge.join("office.txt"),
        "The office opens at 9am. Parking is free.",
    )
    .expect("should write");

    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        top_k: 2,
        ..Config::default()
    };
    (temp_dir, config)
}

fn scored(content: &str) -> ScoredChunk {
    ScoredChunk {
        content: content.to_string(),
        source: "/kb/a.md".to_string(),
        filename: "a.md".to_string(),
        chunk_index: 0,
        score: 0.9,
    }
}

#[test]
fn context_joins_chunks() {
    let chunks = vec![scored("first"), scored("second")];
    assert_eq!(
        format_context(&chunks),
        format!("first{}second", CONTEXT_SEPARATOR)
    );
    assert_eq!(format_context(&[]), NO_DOCUMENTS_FOUND);
}

#[test]
fn preview_truncates_long_content() {
    let short = "a".repeat(200);
    assert_eq!(preview(&short), short);

    let long = "年".repeat(250);
    let cut = preview(&long);
    assert_eq!(cut, format!("{}...", "年".repeat(200)));
}

#[tokio::test]
async fn retrieval_only_without_chat_model() {
    let (_temp_dir, config) = knowledge_base();
    let pipeline = AnswerPipeline::new(config, Arc::new(KeywordEmbedder), None);

    let answer = pipeline
        .answer_question("How many days of annual leave?", None)
        .await
        .expect("answer should succeed");

    assert!(answer.retrieved_only);
    assert!(answer.answer.starts_with(RETRIEVAL_ONLY_PREFIX));
    assert!(answer.answer.contains("Annual leave is 5 days"));
    assert_eq!(answer.sources.len(), 2);
    assert_eq!(answer.sources[0].filename, "leave.md");
    assert!(answer.sources[0].source.ends_with("leave.md"));
}

#[tokio::test]
async fn top_k_limits_sources() {
    let (_temp_dir, config) = knowledge_base();
    let pipeline = AnswerPipeline::new(config, Arc::new(KeywordEmbedder), None);

    let answer = pipeline
        .answer_question("office parking", Some(1))
        .await
        .expect("answer should succeed");

    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].filename, "office.txt");

    let answer = pipeline
        .answer_question("office parking", Some(3))
        .await
        .expect("answer should succeed");
    assert_eq!(answer.sources.len(), 3);
}

#[tokio::test]
async fn long_sources_are_previewed() {
    let (temp_dir, config) = knowledge_base();
    let long_text = format!("Leave policy. {}", "x".repeat(300));
    fs::write(temp_dir.path().join("knowledge_docs").join("long.txt"), &long_text)
        .expect("should write");
    let pipeline = AnswerPipeline::new(config, Arc::new(KeywordEmbedder), None);

    let answer = pipeline
        .answer_question("leave", Some(3))
        .await
        .expect("answer should succeed");

    let long_source = answer
        .sources
        .iter()
        .find(|s| s.filename == "long.txt")
        .expect("long document should be retrieved");
    assert_eq!(long_source.content.chars().count(), 203);
    assert!(long_source.content.ends_with("..."));
}

#[tokio::test]
async fn generation_uses_reference_documents() {
    let (_temp_dir, config) = knowledge_base();
    let chat_model = Arc::new(RecordingChatModel::default());
    let pipeline = AnswerPipeline::new(
        config,
        Arc::new(KeywordEmbedder),
        Some(Arc::clone(&chat_model) as Arc<dyn ChatModel>),
    );

    let answer = pipeline
        .answer_question("How many days of annual leave?", None)
        .await
        .expect("answer should succeed");

    assert!(!answer.retrieved_only);
    assert_eq!(answer.answer, "New employees get 5 days of annual leave.");
    assert_eq!(answer.sources.len(), 2);

    let conversations = chat_model
        .conversations
        .lock()
        .expect("lock should not be poisoned");
    assert_eq!(conversations.len(), 1);
    let messages = &conversations[0];
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[0].content, SYSTEM_PROMPT);
    assert_eq!(messages[1].role, Role::User);
    assert!(messages[1].content.starts_with("[Reference documents]\nAnnual leave is 5 days"));
    assert!(messages[1].content.contains(CONTEXT_SEPARATOR));
    assert!(messages[1].content.contains("[Question] How many days of annual leave?"));
}

#[tokio::test]
async fn chat_model_failure_is_an_llm_error() {
    let (_temp_dir, config) = knowledge_base();
    let pipeline = AnswerPipeline::new(
        config,
        Arc::new(KeywordEmbedder),
        Some(Arc::new(FailingChatModel)),
    );

    let result = pipeline.answer_question("leave", None).await;

    assert!(matches!(result, Err(QaError::Llm(message)) if message.contains("401")));
}

#[tokio::test]
async fn empty_knowledge_base_reports_no_documents() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    let pipeline = AnswerPipeline::new(config, Arc::new(KeywordEmbedder), None);

    let answer = pipeline
        .answer_question("anything", None)
        .await
        .expect("answer should succeed");

    assert_eq!(
        answer.answer,
        format!("{}{}", RETRIEVAL_ONLY_PREFIX, NO_DOCUMENTS_FOUND)
    );
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn rebuild_picks_up_new_documents() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    let pipeline = AnswerPipeline::new(config, Arc::new(KeywordEmbedder), None);

    let before = pipeline
        .answer_question("salary", None)
        .await
        .expect("answer should succeed");
    assert!(before.sources.is_empty());

    fs::write(
        temp_dir.path().join("knowledge_docs").join("salary.md"),
        "Salary is paid on the 10th of every month.",
    )
    .expect("should write");

    let report = pipeline.rebuild_index().await.expect("rebuild should succeed");
    assert_eq!(report.status, "ok");
    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks, 1);

    let after = pipeline
        .answer_question("salary", None)
        .await
        .expect("answer should succeed");
    assert_eq!(after.sources.len(), 1);
    assert_eq!(after.sources[0].filename, "salary.md");
}

#[tokio::test]
async fn rebuild_reports_identical_counts() {
    let (_temp_dir, config) = knowledge_base();
    let pipeline = AnswerPipeline::new(config, Arc::new(KeywordEmbedder), None);

    let first = pipeline.rebuild_index().await.expect("rebuild should succeed");
    let second = pipeline.rebuild_index().await.expect("rebuild should succeed");

    assert_eq!(first, second);
    assert_eq!(first.documents, 3);
}

#[tokio::test]
async fn index_is_created_once() {
    let (_temp_dir, config) = knowledge_base();
    let pipeline = AnswerPipeline::new(config, Arc::new(KeywordEmbedder), None);

    let first = pipeline.ensure_index().await.expect("index should load");
    let second = pipeline.ensure_index().await.expect("index should load");

    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn warm_up_tolerates_embedding_failures() {
    let (_temp_dir, config) = knowledge_base();
    let pipeline = AnswerPipeline::new(config, Arc::new(UnreachableEmbedder), None);

    pipeline.warm_up().await;

    let result = pipeline.answer_question("leave", None).await;
    assert!(matches!(result, Err(QaError::Embedding(message)) if message.contains("connection refused")));
}

#[tokio::test]
async fn generation_runs_without_retrieved_documents() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    let chat_model = Arc::new(RecordingChatModel::default());
    let pipeline = AnswerPipeline::new(
        config,
        Arc::new(KeywordEmbedder),
        Some(Arc::clone(&chat_model) as Arc<dyn ChatModel>),
    );

    let answer = pipeline
        .answer_question("How many days of annual leave?", None)
        .await
        .expect("answer should succeed");

    assert!(!answer.retrieved_only);
    assert!(answer.sources.is_empty());
    assert_eq!(answer.answer, "New employees get 5 days of annual leave.");

    let conversations = chat_model
        .conversations
        .lock()
        .expect("lock should not be poisoned");
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0][0].content, SYSTEM_PROMPT);
    assert!(conversations[0][1].content.contains(NO_DOCUMENTS_FOUND));
}

#[tokio::test]
async fn score_threshold_can_drop_every_chunk() {
    let (_temp_dir, config) = knowledge_base();
    let config = Config {
        score_threshold: Some(0.99),
        ..config
    };

    let retrieval_only = AnswerPipeline::new(config.clone(), Arc::new(KeywordEmbedder), None);
    let answer = retrieval_only
        .answer_question("cafeteria menu", None)
        .await
        .expect("answer should succeed");
    assert!(answer.retrieved_only);
    assert!(answer.sources.is_empty());
    assert_eq!(
        answer.answer,
        format!("{}{}", RETRIEVAL_ONLY_PREFIX, NO_DOCUMENTS_FOUND)
    );

    let chat_model = Arc::new(RecordingChatModel::default());
    let generating = AnswerPipeline::new(
        config,
        Arc::new(KeywordEmbedder),
        Some(Arc::clone(&chat_model) as Arc<dyn ChatModel>),
    );
    let answer = generating
        .answer_question("cafeteria menu", None)
        .await
        .expect("answer should succeed");
    assert!(!answer.retrieved_only);
    assert!(answer.sources.is_empty());

    let conversations = chat_model
        .conversations
        .lock()
        .expect("lock should not be poisoned");
    assert_eq!(conversations.len(), 1);
    assert!(conversations[0][1].content.contains(NO_DOCUMENTS_FOUND));

    // Matching questions still pass the threshold
    drop(conversations);
    let answer = generating
        .answer_question("annual leave", None)
        .await
        .expect("answer should succeed");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].filename, "leave.md");
}
