#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Loading and invoking tools against a mock MCP server.

use {
    mockito::{Matcher, Mock, ServerGuard},
    serde_json::{Value, json},
    toolbox_core::{
        AuthTokenGetter, AuthTokenGetters, BoundParams, BoundValue, Error, Protocol,
        ToolboxClient,
    },
};

fn rpc_result(result: Value) -> String {
    json!({"jsonrpc": "2.0", "id": "1", "result": result}).to_string()
}

fn method(name: &str) -> Matcher {
    Matcher::PartialJson(json!({"method": name}))
}

struct MockToolbox {
    server: ServerGuard,
    _mocks: Vec<Mock>,
}

impl MockToolbox {
    fn url(&self) -> String {
        self.server.url()
    }
}

/// Mock server exposing `list-rows`, `my-profile` and `ping`.
async fn toolbox_server() -> MockToolbox {
    let mut server = mockito::Server::new_async().await;
    let initialize = server
        .mock("POST", "/mcp/")
        .match_body(method("initialize"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "toolbox", "version": "0.9.0"}
        })))
        .create_async()
        .await;
    let initialized = server
        .mock("POST", "/mcp/")
        .match_body(method("notifications/initialized"))
        .with_status(202)
        .create_async()
        .await;
    let list = server
        .mock("POST", Matcher::Regex(r"^/mcp/(ops)?$".into()))
        .match_body(method("tools/list"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({
            "tools": [
                {
                    "name": "list-rows",
                    "description": "List the first rows of a table",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"num_rows": {"type": "string"}},
                        "required": ["num_rows"]
                    }
                },
                {
                    "name": "my-profile",
                    "description": "Profile of the signed-in user",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"user": {"type": "string"}},
                        "required": ["user"]
                    },
                    "_meta": {"toolbox/authParam": {"user": ["google"]}}
                },
                {
                    "name": "ping",
                    "inputSchema": {"type": "object", "properties": {}}
                }
            ]
        })))
        .create_async()
        .await;
    MockToolbox {
        server,
        _mocks: vec![initialize, initialized, list],
    }
}

fn google() -> AuthTokenGetters {
    AuthTokenGetters::from([(
        "google".to_string(),
        AuthTokenGetter::fixed("google-secret"),
    )])
}

#[tokio::test]
async fn bound_parameter_reaches_the_server() {
    let mut toolbox = toolbox_server().await;
    let call = toolbox
        .server
        .mock("POST", "/mcp/")
        .match_body(Matcher::PartialJson(json!({
            "method": "tools/call",
            "params": {"name": "list-rows", "arguments": {"num_rows": "3"}}
        })))
        .match_header("mcp-protocol-version", "2025-06-18")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({
            "content": [
                {"type": "text", "text": "{\"row\":1}"},
                {"type": "text", "text": "{\"row\":2}"},
                {"type": "text", "text": "{\"row\":3}"}
            ]
        })))
        .create_async()
        .await;

    let client = ToolboxClient::new(&toolbox.url()).unwrap();
    let tool = client
        .load_tool("list-rows", AuthTokenGetters::new(), BoundParams::new())
        .await
        .unwrap();

    let err = tool.invoke(json!({})).await.unwrap_err();
    let Error::ArgumentValidation(issues) = err else {
        panic!("expected validation failure, got {err:?}");
    };
    assert_eq!(issues.messages(), ["num_rows: Required"]);

    let bound = tool.bind_param("num_rows", "3").unwrap();
    let rows = bound.invoke(Value::Null).await.unwrap();
    assert_eq!(rows, r#"[{"row":1},{"row":2},{"row":3}]"#);
    call.assert_async().await;
}

#[tokio::test]
async fn auth_parameter_token_is_sent_as_header() {
    let mut toolbox = toolbox_server().await;
    let call = toolbox
        .server
        .mock("POST", "/mcp/")
        .match_body(method("tools/call"))
        .match_header("google_token", "google-secret")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({"content": [{"type": "text", "text": "alice"}]})))
        .create_async()
        .await;

    let client = ToolboxClient::new(&toolbox.url()).unwrap();
    let tool = client
        .load_tool("my-profile", AuthTokenGetters::new(), BoundParams::new())
        .await
        .unwrap();
    let err = tool.invoke(Value::Null).await.unwrap_err();
    assert!(matches!(err, Error::AuthRequired { ref sources } if sources == "google"));

    let tool = tool
        .add_auth_token_getter("google", AuthTokenGetter::fixed("google-secret"))
        .unwrap();
    assert!(tool.parameters().is_empty());
    assert_eq!(tool.invoke(Value::Null).await.unwrap(), "alice");
    call.assert_async().await;
}

#[tokio::test]
async fn toolset_binding_accounting() {
    let toolbox = toolbox_server().await;
    let client = ToolboxClient::new(&toolbox.url()).unwrap();

    let tools = client
        .load_toolset(Some("ops"), google(), BoundParams::new(), false)
        .await
        .unwrap();
    assert_eq!(tools.len(), 3);
    let profile = tools.iter().find(|t| t.name() == "my-profile").unwrap();
    assert_eq!(profile.auth_token_sources().collect::<Vec<_>>(), ["google"]);
    let ping = tools.iter().find(|t| t.name() == "ping").unwrap();
    assert_eq!(ping.description(), "");
    assert_eq!(ping.auth_token_sources().count(), 0);

    let err = client
        .load_toolset(Some("ops"), google(), BoundParams::new(), true)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "validation failed for tool 'list-rows': unused auth tokens: google"
    );

    let bound = BoundParams::from([("limit".to_string(), BoundValue::from(10_i64))]);
    let err = client
        .load_toolset(None, AuthTokenGetters::new(), bound, false)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "validation failed for toolset 'default': unused bound parameters: limit"
    );
}

#[tokio::test]
async fn rest_protocol_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let _manifest = server
        .mock("GET", "/api/tool/list-rows")
        .with_status(200)
        .with_body(
            json!({
                "serverVersion": "0.7.0",
                "tools": {"list-rows": {
                    "description": "List rows",
                    "parameters": [{"name": "num_rows", "type": "integer", "description": "How many"}]
                }}
            })
            .to_string(),
        )
        .create_async()
        .await;
    let invoke = server
        .mock("POST", "/api/tool/list-rows/invoke")
        .match_header("x-team", "data")
        .match_body(Matcher::Json(json!({"num_rows": 2})))
        .with_status(200)
        .with_body(r#"{"result": "row1,row2"}"#)
        .create_async()
        .await;

    let client = ToolboxClient::builder(&server.url())
        .protocol(Protocol::Toolbox)
        .client_header("X-Team", "data")
        .build()
        .unwrap();
    let tool = client
        .load_tool(
            "list-rows",
            AuthTokenGetters::new(),
            BoundParams::from([("num_rows".to_string(), BoundValue::from(2_i64))]),
        )
        .await
        .unwrap();
    assert_eq!(tool.invoke(Value::Null).await.unwrap(), "row1,row2");
    invoke.assert_async().await;
}
