//! Full user turns through the router

use std::time::Duration;

use serde_json::json;

use mcp_router::conversation::{ConversationTurn, ToolCallRequest};
use mcp_router::error::{DispatchError, ModelInvocationError, RouterError};
use mcp_router::llm::{ModelReply, ToolChoice};

use crate::support::{connect_router, FakeConnector, FakeServer, ScriptedModel};

fn add(id: &str, a: i64, b: i64) -> ToolCallRequest {
    ToolCallRequest::new(id, "add", json!({"a": a, "b": b}))
}

#[tokio::test]
async fn test_add_with_one_server_unreachable() {
    let connector = FakeConnector::new().serve("calc", FakeServer::calc());
    let model = ScriptedModel::new(vec![
        Ok(ModelReply::tool_calls(vec![add("call_1", 2, 2)])),
        Ok(ModelReply::text("2 + 2 = 4")),
    ]);
    let mut router = connect_router(&["calc", "wiki"], &connector, &model).await;

    assert_eq!(router.manager().server_names(), vec!["calc"]);
    assert_eq!(router.manager().failures().len(), 1);
    assert_eq!(router.manager().failures()[0].endpoint, "wiki");

    let answer = router.handle_user_turn("what is 2+2?").await.unwrap();
    assert_eq!(answer, "2 + 2 = 4");

    let history = router.history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0], ConversationTurn::user("what is 2+2?"));
    assert_eq!(
        history[1],
        ConversationTurn::Assistant {
            content: None,
            tool_calls: vec![add("call_1", 2, 2)],
        }
    );
    assert_eq!(history[2], ConversationTurn::tool_result("call_1", "4"));
    assert_eq!(history[3], ConversationTurn::assistant("2 + 2 = 4"));

    let seen = model.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].tool_names, vec!["add", "subtract"]);
    assert_eq!(seen[0].tool_choice, ToolChoice::Auto);
    assert!(seen[1].tool_names.is_empty());
    assert_eq!(seen[1].tool_choice, ToolChoice::None);

    router.shutdown().await;
    assert_eq!(connector.closed(), vec!["calc"]);
}

#[tokio::test]
async fn test_unknown_tool_is_reported_to_model() {
    let connector = FakeConnector::new().serve("calc", FakeServer::calc());
    let model = ScriptedModel::new(vec![
        Ok(ModelReply::tool_calls(vec![ToolCallRequest::new(
            "call_1",
            "search",
            json!({"q": "rust"}),
        )])),
        Ok(ModelReply::text("I cannot search right now.")),
    ]);
    let mut router = connect_router(&["calc"], &connector, &model).await;

    let answer = router.handle_user_turn("search for rust").await.unwrap();
    assert_eq!(answer, "I cannot search right now.");
    assert_eq!(
        router.history()[2],
        ConversationTurn::tool_result("call_1", "Error: Tool search not found in active sessions.")
    );
}

#[tokio::test]
async fn test_no_reachable_servers() {
    let connector = FakeConnector::new();
    let model = ScriptedModel::new(vec![Ok(ModelReply::text("unused"))]);
    let mut router = connect_router(&["calc", "wiki"], &connector, &model).await;

    assert!(router.catalog().is_empty());
    assert_eq!(router.manager().failures().len(), 2);

    let err = router.handle_user_turn("hello").await.unwrap_err();
    assert!(matches!(err, RouterError::EmptyCatalog(_)));
    assert!(model.seen().is_empty());
    assert!(router.history().is_empty());
}

#[tokio::test]
async fn test_many_calls_answered_in_request_order() {
    let connector = FakeConnector::new().serve("calc", FakeServer::calc());
    let calls: Vec<_> = (0..5).map(|i| add(&format!("call_{}", i), i, 10)).collect();
    let model = ScriptedModel::new(vec![
        Ok(ModelReply::tool_calls(calls)),
        Ok(ModelReply::text("all summed")),
    ]);
    let mut router = connect_router(&["calc"], &connector, &model).await;

    router.handle_user_turn("add ten to 0..5").await.unwrap();

    let results: Vec<_> = router
        .history()
        .iter()
        .filter(|t| t.is_tool_result())
        .cloned()
        .collect();
    let expected: Vec<_> = (0..5)
        .map(|i| ConversationTurn::tool_result(format!("call_{}", i), (i + 10).to_string()))
        .collect();
    assert_eq!(results, expected);

    // user + assistant + 5 results
    assert_eq!(model.seen()[1].turns, 7);
}

#[tokio::test]
async fn test_results_keep_request_order_when_completion_differs() {
    let connector = FakeConnector::new()
        .serve(
            "archive",
            FakeServer::with_tools(&["lookup"]).with_delay(Duration::from_millis(100)),
        )
        .serve("calc", FakeServer::calc());
    let model = ScriptedModel::new(vec![
        Ok(ModelReply::tool_calls(vec![
            ToolCallRequest::new("c1", "lookup", json!({})),
            add("c2", 1, 1),
            add("c3", 2, 2),
            ToolCallRequest::new("c4", "subtract", json!({"a": 9, "b": 4})),
        ])),
        Ok(ModelReply::text("looked up and summed")),
    ]);
    let mut router = connect_router(&["archive", "calc"], &connector, &model).await;

    router.handle_user_turn("look up and add").await.unwrap();

    // The slow call was requested first but finished last
    assert_eq!(connector.completed(), vec!["add", "add", "subtract", "lookup"]);

    let results: Vec<_> = router
        .history()
        .iter()
        .filter(|t| t.is_tool_result())
        .cloned()
        .collect();
    assert_eq!(
        results,
        vec![
            ConversationTurn::tool_result("c1", "lookup from archive"),
            ConversationTurn::tool_result("c2", "2"),
            ConversationTurn::tool_result("c3", "4"),
            ConversationTurn::tool_result("c4", "5"),
        ]
    );
}

#[tokio::test]
async fn test_failed_call_does_not_abort_batch() {
    let connector = FakeConnector::new()
        .serve(
            "a",
            FakeServer::with_tools(&["slowfail"])
                .with_delay(Duration::from_millis(100))
                .failing("slowfail"),
        )
        .serve("b", FakeServer::with_tools(&["fast"]));
    let model = ScriptedModel::new(vec![
        Ok(ModelReply::tool_calls(vec![
            ToolCallRequest::new("c1", "slowfail", json!({})),
            ToolCallRequest::new("c2", "fast", json!({})),
            ToolCallRequest::new("c3", "ghost", json!({})),
        ])),
        Ok(ModelReply::text("fin")),
    ]);
    let mut router = connect_router(&["a", "b"], &connector, &model).await;

    let answer = router.handle_user_turn("try everything").await.unwrap();
    assert_eq!(answer, "fin");

    let history = router.history();
    assert_eq!(history.len(), 6);
    assert_eq!(
        history[2],
        ConversationTurn::tool_result(
            "c1",
            "Error executing tool slowfail: 'slowfail' reported an error: boom"
        )
    );
    assert_eq!(history[3], ConversationTurn::tool_result("c2", "fast from b"));
    assert_eq!(
        history[4],
        ConversationTurn::tool_result("c3", "Error: Tool ghost not found in active sessions.")
    );
    assert_eq!(history[5], ConversationTurn::assistant("fin"));

    // The follow-up saw every result and offered no tools
    let seen = model.seen();
    assert_eq!(seen[1].turns, 5);
    assert!(seen[1].tool_names.is_empty());
}

#[tokio::test]
async fn test_history_carries_across_turns() {
    let connector = FakeConnector::new().serve("calc", FakeServer::calc());
    let model = ScriptedModel::new(vec![
        Ok(ModelReply::text("hi there")),
        Ok(ModelReply::text("you said hello")),
    ]);
    let mut router = connect_router(&["calc"], &connector, &model).await;

    router.handle_user_turn("hello").await.unwrap();
    router.handle_user_turn("what did I say?").await.unwrap();

    assert_eq!(model.seen()[1].turns, 3);

    let json = serde_json::to_string(router.history()).unwrap();
    let parsed: Vec<ConversationTurn> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, router.history());

    router.clear_history();
    assert!(router.history().is_empty());
}

#[tokio::test]
async fn test_model_failure_surfaces_to_caller() {
    let connector = FakeConnector::new().serve("calc", FakeServer::calc());
    let model = ScriptedModel::new(vec![Err(ModelInvocationError::Status {
        status: 429,
        body: "quota exceeded".to_string(),
    })]);
    let mut router = connect_router(&["calc"], &connector, &model).await;

    let err = router.handle_user_turn("hello").await.unwrap_err();
    assert!(matches!(err, RouterError::Model(_)));
    assert_eq!(router.history(), &[ConversationTurn::user("hello")]);
}

#[tokio::test]
async fn test_direct_dispatch() {
    let connector = FakeConnector::new().serve("calc", FakeServer::calc());
    let model = ScriptedModel::default();
    let mut router = connect_router(&["calc"], &connector, &model).await;

    let text = router
        .dispatch("subtract", json!({"a": 10, "b": 3}))
        .await
        .unwrap();
    assert_eq!(text, "7");

    let err = router.dispatch("add", json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, DispatchError::Execution(_)));

    router.shutdown().await;
    let err = router.dispatch("add", json!({"a": 1, "b": 1})).await.unwrap_err();
    assert!(err.to_tool_result("add").starts_with("Error executing tool add:"));
}
