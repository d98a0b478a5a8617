//! Aggregation across several servers

use serde_json::json;

use mcp_router::conversation::ToolCallRequest;
use mcp_router::llm::ModelReply;

use crate::support::{connect_router, FakeConnector, FakeServer, ScriptedModel};

#[tokio::test]
async fn test_catalog_follows_config_order() {
    let connector = FakeConnector::new()
        .serve("calc", FakeServer::calc())
        .serve("wiki", FakeServer::with_tools(&["search", "summarize"]));
    let model = ScriptedModel::default();
    let mut router = connect_router(&["wiki", "calc"], &connector, &model).await;

    let names: Vec<_> = router.catalog().tools().iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["search", "summarize", "add", "subtract"]);
    assert_eq!(router.catalog().resolve("add").unwrap().server, "calc");
    assert_eq!(router.catalog().resolve("search").unwrap().server, "wiki");

    router.shutdown().await;
    assert_eq!(connector.closed(), vec!["calc", "wiki"]);
}

#[tokio::test]
async fn test_name_collision_keeps_first_server() {
    let connector = FakeConnector::new()
        .serve("first", FakeServer::with_tools(&["lookup", "alpha"]))
        .serve("second", FakeServer::with_tools(&["lookup", "beta"]));
    let model = ScriptedModel::new(vec![
        Ok(ModelReply::tool_calls(vec![ToolCallRequest::new(
            "call_1",
            "lookup",
            json!({}),
        )])),
        Ok(ModelReply::text("found it")),
    ]);
    let mut router = connect_router(&["first", "second"], &connector, &model).await;

    let names: Vec<_> = router.catalog().tools().iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["lookup", "alpha", "beta"]);
    assert_eq!(model.seen().len(), 0);

    router.handle_user_turn("look something up").await.unwrap();
    assert_eq!(
        router.history()[2],
        mcp_router::conversation::ConversationTurn::tool_result("call_1", "lookup from first")
    );

    let schemas = model.seen()[0].tool_names.clone();
    assert_eq!(schemas, vec!["lookup", "alpha", "beta"]);
}
