//! Session behavior against scripted model clients.

use futures::StreamExt;
use pretty_assertions::assert_eq;
use std::sync::Arc;

use chat_session::mocks::MockModelClient;
use chat_session::{ChatError, ConversationSession, ExchangeReply, Role, Turn};

const SYSTEM: &str = "You are a helpful assistant.";

fn complete_session() -> (Arc<MockModelClient>, ConversationSession) {
    let client = Arc::new(MockModelClient::complete("test-model"));
    let session = ConversationSession::start(client.clone(), Some(SYSTEM));
    (client, session)
}

fn streaming_session() -> (Arc<MockModelClient>, ConversationSession) {
    let client = Arc::new(MockModelClient::streaming("test-model"));
    let session = ConversationSession::start(client.clone(), Some(SYSTEM));
    (client, session)
}

#[tokio::test]
async fn test_empty_input_appends_no_turns() {
    let (_, session) = complete_session();
    let before = session.history();

    for input in ["", "   ", "\n\t "] {
        let result = session.submit(input).await;
        assert!(matches!(result, Err(ChatError::EmptyInput)), "{input:?}");
    }

    assert_eq!(session.history(), before);
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_complete_exchange_appends_both_turns() {
    let (client, session) = complete_session();
    client.push_reply("Paris.");

    let reply = session.submit("Capital of France?").await.unwrap();
    match reply {
        ExchangeReply::Complete(text) => assert_eq!(text, "Paris."),
        ExchangeReply::Streaming(_) => panic!("expected a complete reply"),
    }

    let history = session.history();
    assert_eq!(
        history,
        vec![
            Turn::system(SYSTEM),
            Turn::user("Capital of France?"),
            Turn::assistant("Paris."),
        ]
    );
}

#[tokio::test]
async fn test_input_is_trimmed_before_appending() {
    let (client, session) = complete_session();
    client.push_reply("Hi.");

    session.submit("  hello  \n").await.unwrap();
    assert_eq!(session.history()[1], Turn::user("hello"));
}

#[tokio::test]
async fn test_client_receives_full_history_each_call() {
    let (client, session) = complete_session();
    client.push_reply("One.");
    client.push_reply("Two.");

    session.submit("first").await.unwrap();
    session.submit("second").await.unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].len(), 2); // system + first user turn
    assert_eq!(calls[1].len(), 4); // plus assistant + second user turn
    assert_eq!(calls[1][2], Turn::assistant("One."));
}

#[tokio::test]
async fn test_history_alternates_after_n_exchanges() {
    let (client, session) = complete_session();
    let n = 5;
    for i in 0..n {
        client.push_reply(format!("reply {i}"));
        session.submit(&format!("message {i}")).await.unwrap();
    }

    let history = session.history();
    assert_eq!(history.len(), 2 * n + 1);
    assert_eq!(history[0].role, Role::System);
    for pair in history[1..].chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
    }
}

#[tokio::test]
async fn test_failed_exchange_keeps_user_turn_and_session_usable() {
    let (client, session) = complete_session();
    client.push_error(ChatError::transport("connection reset"));

    let result = session.submit("hello").await;
    assert!(matches!(result, Err(ChatError::Transport { .. })));

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1], Turn::user("hello"));
    assert!(!session.is_busy());

    // The session accepts the next exchange normally.
    client.push_reply("Recovered.");
    session.submit("again").await.unwrap();
    assert_eq!(session.history().last().unwrap().content, "Recovered.");
}

#[tokio::test]
async fn test_fragments_concatenate_to_final_turn() {
    let (client, session) = streaming_session();
    client.push_fragments(&["The ", "weather ", "is ", "sunny."]);

    let reply = session.submit("Weather?").await.unwrap();
    let mut stream = match reply {
        ExchangeReply::Streaming(stream) => stream,
        ExchangeReply::Complete(_) => panic!("expected a stream"),
    };

    let mut collected = Vec::new();
    while let Some(fragment) = stream.next().await {
        collected.push(fragment.unwrap());
    }

    let joined: String = collected.iter().map(|f| f.text.as_str()).collect();
    assert_eq!(joined, "The weather is sunny.");
    assert!(collected.last().unwrap().is_last);
    assert!(collected[..collected.len() - 1].iter().all(|f| !f.is_last));

    let history = session.history();
    assert_eq!(history.last().unwrap(), &Turn::assistant(joined));
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_mid_stream_failure_records_truncated_turn() {
    let (client, session) = streaming_session();
    client.push_fragments_then_error(
        &["Hel", "lo "],
        ChatError::transport("connection reset"),
    );

    let reply = session.submit("hi").await.unwrap();
    let mut stream = match reply {
        ExchangeReply::Streaming(stream) => stream,
        ExchangeReply::Complete(_) => panic!("expected a stream"),
    };

    assert_eq!(stream.next().await.unwrap().unwrap().text, "Hel");
    assert_eq!(stream.next().await.unwrap().unwrap().text, "lo ");
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, ChatError::Transport { .. }));
    assert!(stream.next().await.is_none());

    let history = session.history();
    assert_eq!(history.last().unwrap(), &Turn::assistant_truncated("Hello "));
    assert_eq!(history[history.len() - 2], Turn::user("hi"));
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_failure_before_first_fragment_appends_no_assistant_turn() {
    let (client, session) = streaming_session();
    client.push_error(ChatError::transport("connection reset"));

    let reply = session.submit("hi").await.unwrap();
    let mut stream = match reply {
        ExchangeReply::Streaming(stream) => stream,
        ExchangeReply::Complete(_) => panic!("expected a stream"),
    };
    assert!(stream.next().await.unwrap().is_err());

    let history = session.history();
    assert_eq!(history.last().unwrap(), &Turn::user("hi"));
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_session_busy_while_stream_undrained() {
    let (client, session) = streaming_session();
    client.push_fragments(&["partial ", "reply"]);

    let reply = session.submit("first").await.unwrap();
    let mut stream = match reply {
        ExchangeReply::Streaming(stream) => stream,
        ExchangeReply::Complete(_) => panic!("expected a stream"),
    };
    assert!(session.is_busy());

    assert!(matches!(
        session.submit("second").await,
        Err(ChatError::SessionBusy)
    ));
    assert!(matches!(session.clear(), Err(ChatError::SessionBusy)));

    // The overlap attempt left no trace in the history.
    assert_eq!(session.history().len(), 2);

    // Consume one fragment, then drop: the partial text becomes a
    // truncated turn and the session is released.
    assert_eq!(stream.next().await.unwrap().unwrap().text, "partial ");
    drop(stream);

    assert!(!session.is_busy());
    assert_eq!(
        session.history().last().unwrap(),
        &Turn::assistant_truncated("partial ")
    );
}

#[tokio::test]
async fn test_dropped_stream_with_no_fragments_leaves_user_turn_only() {
    let (client, session) = streaming_session();
    client.push_fragments(&["never", " seen"]);

    let reply = session.submit("hi").await.unwrap();
    drop(reply);

    assert!(!session.is_busy());
    assert_eq!(session.history().last().unwrap(), &Turn::user("hi"));
}

#[tokio::test]
async fn test_clear_keeps_system_turn_and_is_idempotent() {
    let (client, session) = complete_session();
    client.push_reply("Hi.");
    session.submit("hello").await.unwrap();

    session.clear().unwrap();
    assert_eq!(session.history(), vec![Turn::system(SYSTEM)]);

    session.clear().unwrap();
    assert_eq!(session.history(), vec![Turn::system(SYSTEM)]);
}

#[tokio::test]
async fn test_clear_without_system_prompt_empties_history() {
    let client = Arc::new(MockModelClient::complete("test-model"));
    let session = ConversationSession::start(client.clone(), None);
    client.push_reply("Hi.");
    session.submit("hello").await.unwrap();

    session.clear().unwrap();
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_replace_client_rejected_while_busy() {
    let (client, session) = streaming_session();
    client.push_fragments(&["x"]);

    let reply = session.submit("hi").await.unwrap();
    let replacement = Arc::new(MockModelClient::complete("other-model"));
    assert!(matches!(
        session.replace_client(replacement.clone()),
        Err(ChatError::SessionBusy)
    ));

    drop(reply);
    session.replace_client(replacement.clone()).unwrap();

    replacement.push_reply("From the new client.");
    session.submit("again").await.unwrap();
    assert_eq!(replacement.calls().len(), 1);
}
