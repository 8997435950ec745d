//! MCP stdio protocol round trips
use mas_evolution::metrics::MemoryStorage;
use mas_evolution::{McpServer, ToolContext};
use serde_json::{json, Value};
use std::sync::Arc;

async fn exchange(server: &McpServer, messages: &[Value]) -> Vec<Value> {
    let input: String = messages.iter().map(|m| format!("{}\n", m)).collect();
    let mut output = Vec::new();
    server.serve(input.as_bytes(), &mut output).await.unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_session() {
    let server = McpServer::new(ToolContext::new(Arc::new(MemoryStorage::new())));

    let replies = exchange(
        &server,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {
                "name": "track_metrics",
                "arguments": {"skillName": "search", "success": true, "executionTime": 1.5}
            }}),
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {
                "name": "analyze_performance",
                "arguments": {"timeframe": "decade"}
            }}),
        ],
    )
    .await;

    assert_eq!(replies.len(), 4);
    assert_eq!(replies[0]["result"]["serverInfo"]["name"], "mas-evolution");

    let names: Vec<&str> = replies[1]["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"a_b_test"));

    let tracked = &replies[2]["result"];
    assert_eq!(tracked["isError"], false);
    let text = tracked["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("📊 Metrics Tracked"));
    assert!(text.contains("Execution Time: 1.5s"));

    assert_eq!(replies[3]["id"], 4);
    assert_eq!(replies[3]["result"]["isError"], true);
}

#[tokio::test]
async fn test_protocol_errors() {
    let server = McpServer::new(ToolContext::new(Arc::new(MemoryStorage::new())));

    let replies = exchange(
        &server,
        &[
            json!({"jsonrpc": "2.0", "id": "a", "method": "tools/call", "params": {"name": "nope"}}),
            json!({"jsonrpc": "2.0", "id": "b", "method": "prompts/list"}),
        ],
    )
    .await;

    assert_eq!(replies[0]["error"]["code"], -32602);
    assert_eq!(replies[1]["error"]["code"], -32601);
    assert_eq!(replies[1]["id"], "b");
}
