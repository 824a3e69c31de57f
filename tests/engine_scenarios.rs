// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use tempfile::TempDir;

use vecsift::config::Config;
use vecsift::embedding::{
    EmbeddingGenerator, EmbeddingRecordStore, GeneratorConfig, Owner, OwnerStatus, OwnerSummary,
    SearchScope, SqliteStore, EMBEDDING_DIM,
};
use vecsift::{Engine, EngineError};

fn hashing_config(extra: &str) -> Config {
    Config::from_toml(&format!(
        "[embeddings]\nprovider = \"hashing\"\n{}",
        extra
    ))
    .unwrap()
}

fn open_engine(dir: &TempDir) -> Engine {
    Engine::open_at(&hashing_config(""), &dir.path().join("store.sqlite")).unwrap()
}

fn approved(owner: Owner, title: &str) -> OwnerSummary {
    OwnerSummary::new(owner, title).with_status(OwnerStatus::Approved)
}

#[tokio::test]
async fn create_then_search_returns_owner() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let q1 = Owner::question("O1");
    let text = "How do I register for classes?";

    engine
        .register_owner(&approved(q1.clone(), text), text)
        .await
        .unwrap();

    let hits = engine
        .search()
        .search("enrollment process", 5, 0.0)
        .await
        .unwrap();
    assert!(hits.iter().any(|hit| hit.record.owner == q1));
    for hit in &hits {
        assert!((0.0..=1.0).contains(&hit.score));
    }
}

#[tokio::test]
async fn recreate_moves_the_vector() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let q1 = Owner::question("O1");
    let text = "How do I register for classes?";
    engine
        .register_owner(&approved(q1.clone(), text), text)
        .await
        .unwrap();

    let score_for_o1 = |hits: Vec<vecsift::embedding::SearchHit>| {
        hits.into_iter()
            .find(|hit| hit.record.owner == q1)
            .map(|hit| hit.score)
            .unwrap_or(0.0)
    };

    let before = score_for_o1(
        engine
            .search()
            .search("register for classes", 5, 0.0)
            .await
            .unwrap(),
    );

    engine
        .lifecycle()
        .recreate(&q1, "How do I drop a class?")
        .await
        .unwrap();

    let after = score_for_o1(
        engine
            .search()
            .search("register for classes", 5, 0.0)
            .await
            .unwrap(),
    );
    assert!(before > 0.5, "before = {}", before);
    assert!(after < before, "after = {}, before = {}", after, before);

    let records = engine.lifecycle().records(&q1).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chunk_text, "How do I drop a class?");
}

#[tokio::test]
async fn blank_query_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    let err = engine.search().search("   ", 5, 0.7).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn out_of_range_parameters_are_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    assert!(engine.search().search("q", 0, 0.5).await.unwrap_err().is_invalid_input());
    assert!(engine.search().search("q", 51, 0.5).await.unwrap_err().is_invalid_input());
    assert!(engine.search().search("q", 5, 1.5).await.unwrap_err().is_invalid_input());
    assert!(engine.search().search("q", 5, -0.1).await.unwrap_err().is_invalid_input());
}

#[tokio::test]
async fn hidden_owners_never_appear() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let text = "tuition payment deadlines for the spring semester";

    let visible = Owner::question("visible");
    let pending = Owner::question("pending");
    let disabled = Owner::document("disabled");
    engine
        .register_owner(&approved(visible.clone(), "v"), text)
        .await
        .unwrap();
    engine
        .register_owner(
            &OwnerSummary::new(pending.clone(), "p").with_status(OwnerStatus::Pending),
            text,
        )
        .await
        .unwrap();
    engine
        .register_owner(&approved(disabled.clone(), "d"), text)
        .await
        .unwrap();
    engine
        .store()
        .set_owner_status(&disabled, OwnerStatus::Disabled)
        .unwrap();

    let hits = engine.search().search(text, 50, 0.0).await.unwrap();
    let owners: Vec<&Owner> = hits.iter().map(|hit| &hit.record.owner).collect();
    assert_eq!(owners, vec![&visible]);

    engine
        .store()
        .set_owner_status(&pending, OwnerStatus::Approved)
        .unwrap();
    let hits = engine.search().search(text, 50, 0.0).await.unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn results_are_ordered_and_above_threshold() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let texts = [
        ("a", "library opening hours on weekends"),
        ("b", "library opening hours"),
        ("c", "library card replacement"),
        ("d", "parking permits for students"),
    ];
    for (id, text) in texts {
        engine
            .register_owner(&approved(Owner::document(id), id), text)
            .await
            .unwrap();
    }

    let hits = engine
        .search()
        .search("library opening hours", 10, 0.2)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].record.owner, Owner::document("b"));
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(hits.iter().all(|hit| hit.score >= 0.2));
    assert!(hits.iter().all(|hit| hit.record.owner != Owner::document("d")));

    let top = engine
        .search()
        .search("library opening hours", 1, 0.0)
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
}

#[tokio::test]
async fn scoped_search_filters_by_kind() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let text = "graduation ceremony dress code";
    engine
        .register_owner(&approved(Owner::question("q"), "q"), text)
        .await
        .unwrap();
    engine
        .register_owner(&approved(Owner::document("d"), "d"), text)
        .await
        .unwrap();

    let questions = engine
        .search()
        .search_scoped(text, SearchScope::Questions, 10, 0.0)
        .await
        .unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].record.owner, Owner::question("q"));

    let documents = engine
        .search()
        .search_scoped(text, SearchScope::Documents, 10, 0.0)
        .await
        .unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].record.owner, Owner::document("d"));
}

#[tokio::test]
async fn failed_embedding_removes_the_owner() {
    let dir = TempDir::new().unwrap();
    let config = hashing_config("");
    let store = Arc::new(SqliteStore::open(dir.path().join("store.sqlite")).unwrap());
    let generator = Arc::new(EmbeddingGenerator::new(GeneratorConfig::default(), || {
        anyhow::bail!("model files missing")
    }));
    let engine = Engine::assemble(&config, store.clone(), generator).unwrap();

    let owner = Owner::question("q1");
    let err = engine
        .register_owner(&approved(owner.clone(), "t"), "some question text")
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::GenerationFailure(_)));
    assert!(store.owner(&owner).unwrap().is_none());
    assert!(store.records_for(&owner).unwrap().is_empty());
}

#[tokio::test]
async fn registering_an_existing_owner_keeps_its_embeddings() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let owner = Owner::question("q1");
    let summary = approved(owner.clone(), "Registration");
    let text = "How do I register for classes?";

    let created = engine.register_owner(&summary, text).await.unwrap();
    assert_eq!(created.len(), 1);

    let err = engine.register_owner(&summary, text).await.unwrap_err();
    assert!(err.is_invalid_input());

    let stored = engine.store().owner(&owner).unwrap().unwrap();
    assert_eq!(stored.status, OwnerStatus::Approved);
    let records = engine.lifecycle().records(&owner).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, created[0].id);

    let hits = engine
        .search()
        .search("register for classes", 5, 0.1)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn removing_an_owner_cascades_to_embeddings() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let owner = Owner::document("d1");
    engine
        .register_owner(&approved(owner.clone(), "d"), "campus map and building list")
        .await
        .unwrap();
    assert_eq!(engine.stats().unwrap().total_embeddings, 1);

    assert!(engine.store().remove_owner(&owner).unwrap());
    assert!(engine.lifecycle().records(&owner).unwrap().is_empty());
    assert_eq!(engine.stats().unwrap().total_embeddings, 0);
}

#[tokio::test]
async fn long_text_is_stored_as_ordered_chunks() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open_at(
        &hashing_config("[chunking]\nchunk_size = 120\noverlap = 20\n"),
        &dir.path().join("store.sqlite"),
    )
    .unwrap();
    let owner = Owner::document("handbook");
    let text = (0..40)
        .map(|i| format!("Section {} describes the academic policy.", i))
        .collect::<Vec<_>>()
        .join(" ");

    let created = engine
        .register_owner(&approved(owner.clone(), "Handbook"), &text)
        .await
        .unwrap();
    assert!(created.len() > 1);

    let stored = engine.lifecycle().records(&owner).unwrap();
    let indices: Vec<u32> = stored.iter().map(|r| r.chunk_index).collect();
    let expected: Vec<u32> = (0..created.len() as u32).collect();
    assert_eq!(indices, expected);
    assert!(stored.iter().all(|r| r.embedding.len() == EMBEDDING_DIM));

    let stats = engine.stats().unwrap();
    assert_eq!(stats.total_embeddings, created.len() as u64);
    assert_eq!(stats.owners_with_embeddings, 1);
    assert_eq!(stats.embedding_dimension, EMBEDDING_DIM);
}

#[tokio::test]
async fn concurrent_searches_share_one_engine() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine
        .register_owner(
            &approved(Owner::question("q"), "q"),
            "where is the financial aid office",
        )
        .await
        .unwrap();

    let search = engine.search();
    assert_eq!(
        search.search("financial aid office", 5, 0.1).await.unwrap().len(),
        1
    );
    let (a, b, c) = tokio::join!(
        search.search("financial aid office", 5, 0.1),
        search.search("financial aid", 5, 0.1),
        search.search("financial aid office", 5, 0.1),
    );
    assert_eq!(a.unwrap().len(), 1);
    assert_eq!(b.unwrap().len(), 1);
    assert_eq!(c.unwrap().len(), 1);
    assert!(engine.generator().cache_stats().hits >= 1);
}

#[tokio::test]
async fn store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let owner = Owner::question("q1");
    {
        let engine = open_engine(&dir);
        engine
            .register_owner(&approved(owner.clone(), "t"), "exam schedule for finals")
            .await
            .unwrap();
    }

    let engine = open_engine(&dir);
    let hits = engine
        .search()
        .search("exam schedule", 5, 0.1)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.owner, owner);
}
