//! Integration tests against a live Postgres + pgvector instance.
//! Ignored by default: set `PARLEY_TEST_DATABASE_URL` and run with
//! `cargo test -- --ignored` against a disposable database.

use parley_domain::model::{Conversation, JudgeCadence, Message, MessageRole, Participant};
use parley_persistence::{ConversationStore, PgStore};
use uuid::Uuid;

async fn store() -> PgStore {
    let url = std::env::var("PARLEY_TEST_DATABASE_URL")
        .expect("PARLEY_TEST_DATABASE_URL must be set to run ignored persistence tests");
    let store = PgStore::connect(&url, 5).await.expect("connect");
    store.migrate().await.expect("migrate");
    store
}

fn participant(index: u32, name: &str) -> Participant {
    Participant {
        index,
        name: name.into(),
        model: "local-stub/a".into(),
        system_prompt: "debate".into(),
        temperature: 0.7,
        max_output_tokens: 512,
    }
}

#[tokio::test]
#[ignore]
async fn create_and_fetch_conversation_round_trips() {
    let store = store().await;
    let convo = Conversation::new(
        "Is remote work good for productivity?".into(),
        vec![participant(0, "Pro"), participant(1, "Con")],
        4,
        10,
        5.0,
        None,
        JudgeCadence::default(),
    );

    store.create_conversation(&convo).await.unwrap();
    let fetched = store.get_conversation(convo.id).await.unwrap().unwrap();
    assert_eq!(fetched.topic, convo.topic);
    assert_eq!(fetched.participants.len(), 2);

    store.delete_conversation(convo.id).await.unwrap();
    assert!(store.get_conversation(convo.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn message_insertion_assigns_dense_sequence_numbers() {
    let store = store().await;
    let convo = Conversation::new(
        "Topic".into(),
        vec![participant(0, "A")],
        2,
        10,
        5.0,
        None,
        JudgeCadence::default(),
    );
    store.create_conversation(&convo).await.unwrap();

    let mut message = |content: &str| Message {
        id: Uuid::new_v4(),
        conversation_id: convo.id,
        participant_index: 0,
        participant_name: "A".into(),
        model: "local-stub/a".into(),
        role: MessageRole::Assistant,
        content: content.into(),
        sequence_number: 0,
        round_number: 0,
        turn_index: 0,
        input_tokens: 10,
        output_tokens: 10,
        response_time_ms: 100,
        created_at: chrono::Utc::now(),
    };

    let first = message("first");
    let seq0 = store.insert_message(&first).await.unwrap();
    let second = message("second");
    let seq1 = store.insert_message(&second).await.unwrap();

    assert_eq!(seq0, 0);
    assert_eq!(seq1, 1);

    let messages = store.list_messages(convo.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "first");
    assert_eq!(messages[1].content, "second");

    store.delete_conversation(convo.id).await.unwrap();
}
