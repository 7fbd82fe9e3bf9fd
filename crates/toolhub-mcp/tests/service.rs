//! Manager-level tests: registry intent and runtime effect kept in step.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{RecordingEmitter, StubFactory, eventually, fast_settings, temp_registry};
use serde_json::json;
use toolhub_core::{
    CallRequest, CallResult, McpEvent, McpServerConfig, McpServiceError, McpTransportKind,
    NoopEmitter, ServerRegistry,
};
use toolhub_mcp::McpService;
use toolhub_store::JsonFileRegistry;

struct Fixture {
    _dir: tempfile::TempDir,
    registry: Arc<JsonFileRegistry>,
    factory: StubFactory,
    emitter: Arc<RecordingEmitter>,
    service: McpService,
}

fn fixture() -> Fixture {
    let (dir, registry) = temp_registry();
    let factory = StubFactory::new();
    let emitter = Arc::new(RecordingEmitter::default());
    let service = McpService::new(
        registry.clone(),
        Arc::new(factory.clone()),
        emitter.clone(),
        fast_settings(),
    );
    Fixture {
        _dir: dir,
        registry,
        factory,
        emitter,
        service,
    }
}

fn cat(name: &str) -> McpServerConfig {
    McpServerConfig::local(name, vec!["cat".to_string()])
}

#[tokio::test]
async fn test_add_then_status_round_trip() {
    let fx = fixture();
    fx.service.add_server(cat("fs")).await.unwrap();

    let status = fx.service.get_server_status("fs").await.unwrap();
    assert!(status.enabled);
    assert!(status.connected);
    assert_eq!(status.tool_count, 2);
    assert_eq!(status.resource_count, 1);
    assert_eq!(status.prompt_count, 1);

    let events = fx.emitter.events();
    assert_eq!(
        events,
        [
            McpEvent::server_added("fs", McpTransportKind::Local),
            McpEvent::server_started("fs", 2),
        ]
    );
}

#[tokio::test]
async fn test_add_duplicate_is_rejected() {
    let fx = fixture();
    fx.service.add_server(cat("fs")).await.unwrap();
    let err = fx.service.add_server(cat("fs")).await.unwrap_err();
    assert!(matches!(err, McpServiceError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_add_invalid_config_is_rejected() {
    let fx = fixture();
    let err = fx
        .service
        .add_server(McpServerConfig::local("empty", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, McpServiceError::InvalidConfig(_)));

    let err = fx
        .service
        .add_server(McpServerConfig::network("web", McpTransportKind::Http, ""))
        .await
        .unwrap_err();
    assert!(matches!(err, McpServiceError::InvalidConfig(_)));
    assert!(fx.service.list_servers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_closes_connection_and_drops_status() {
    let fx = fixture();
    fx.service.add_server(cat("fs")).await.unwrap();
    fx.service.add_server(cat("git")).await.unwrap();
    assert_eq!(fx.factory.state.open_handles("fs"), 1);

    fx.service.remove_server("fs").await.unwrap();

    let names: Vec<String> = fx
        .service
        .list_server_statuses()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, ["git"]);
    assert_eq!(fx.factory.state.open_handles("fs"), 0);
    assert!(fx.emitter.events().contains(&McpEvent::server_removed("fs")));
}

#[tokio::test]
async fn test_disable_stops_and_enable_starts() {
    let fx = fixture();
    fx.service.add_server(cat("fs")).await.unwrap();

    let config = fx.service.disable_server("fs").await.unwrap();
    assert!(!config.enabled);
    let status = fx.service.get_server_status("fs").await.unwrap();
    assert!(!status.enabled);
    assert!(!status.connected);
    assert_eq!(status.tool_count, 0);
    assert_eq!(fx.factory.state.open_handles("fs"), 0);

    let snapshot = fx.service.enable_server("fs").await.unwrap();
    assert!(snapshot.state.is_connected());
    assert!(fx.service.get_server("fs").await.unwrap().enabled);
}

#[tokio::test]
async fn test_restart_reconnects_with_one_handle() {
    let fx = fixture();
    fx.service.add_server(cat("fs")).await.unwrap();

    fx.service.restart_server("fs").await.unwrap();
    assert_eq!(fx.factory.state.connects(), 2);
    assert_eq!(fx.factory.state.open_handles("fs"), 1);
}

#[tokio::test]
async fn test_update_restarts_enabled_server() {
    let fx = fixture();
    fx.service.add_server(cat("fs")).await.unwrap();

    let updated = cat("fs").with_description("files");
    fx.service.update_server(updated).await.unwrap();

    let status = fx.service.get_server_status("fs").await.unwrap();
    assert_eq!(status.description, "files");
    assert!(status.connected);
    assert_eq!(fx.factory.state.open_handles("fs"), 1);
}

#[tokio::test]
async fn test_update_unknown_server_is_not_found() {
    let fx = fixture();
    let err = fx.service.update_server(cat("ghost")).await.unwrap_err();
    assert!(matches!(err, McpServiceError::NotFound(_)));
    assert_eq!(fx.factory.state.connects(), 0);
}

#[tokio::test]
async fn test_call_tool_without_connection_is_not_connected() {
    let fx = fixture();
    let err = fx
        .service
        .call_tool("fs", "read_file", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, McpServiceError::NotConnected(_)));
    assert_eq!(fx.factory.state.calls(), 0);
}

#[tokio::test]
async fn test_call_tool_checks_required_arguments() {
    let fx = fixture();
    fx.service.add_server(cat("fs")).await.unwrap();

    let err = fx
        .service
        .call_tool("fs", "read_file", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, McpServiceError::Validation(ref msg) if msg.contains("path")));

    let err = fx
        .service
        .call_tool("fs", "delete_everything", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, McpServiceError::Validation(_)));
    assert_eq!(fx.factory.state.calls(), 0);

    let arguments = HashMap::from([("path".to_string(), json!("/tmp/a.txt"))]);
    let result = fx
        .service
        .call_tool("fs", "read_file", arguments)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.data.unwrap()["tool"], "read_file");
    assert_eq!(fx.factory.state.calls(), 1);
}

#[tokio::test]
async fn test_dispatch_routes_by_kind() {
    let fx = fixture();
    fx.service.add_server(cat("fs")).await.unwrap();

    let resource = fx
        .service
        .dispatch(CallRequest::resource("fs", "file:///workspace/README.md"))
        .await
        .unwrap();
    assert!(matches!(resource, CallResult::Resource(ref r) if r.contents.len() == 1));

    let arguments = HashMap::from([("topic".to_string(), json!(42))]);
    let prompt = fx
        .service
        .dispatch(CallRequest::prompt("fs", "summarize", arguments))
        .await
        .unwrap();
    let CallResult::Prompt(messages) = prompt else {
        panic!("expected prompt messages");
    };
    // Prompt arguments travel as strings.
    assert_eq!(messages.messages[0]["content"]["topic"], "42");
}

#[tokio::test]
async fn test_prompt_missing_argument_is_validation() {
    let fx = fixture();
    fx.service.add_server(cat("fs")).await.unwrap();

    let err = fx
        .service
        .get_prompt("fs", "summarize", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, McpServiceError::Validation(_)));
}

#[tokio::test]
async fn test_disabled_capability_rejects_calls() {
    let fx = fixture();
    let mut config = cat("fs");
    config.capabilities.resources = false;
    fx.service.add_server(config).await.unwrap();

    let err = fx
        .service
        .get_resource("fs", "file:///workspace/README.md")
        .await
        .unwrap_err();
    assert!(matches!(err, McpServiceError::Validation(_)));
    assert_eq!(fx.factory.state.calls(), 0);
}

#[tokio::test]
async fn test_initialize_starts_enabled_servers_and_reports_failures() {
    let fx = fixture();
    fx.factory.state.fail_program("missing-binary");

    let mut off = cat("off");
    off.enabled = false;
    fx.registry.add(cat("fs")).await.unwrap();
    fx.registry.add(off).await.unwrap();
    fx.registry
        .add(McpServerConfig::local(
            "broken",
            vec!["missing-binary".to_string()],
        ))
        .await
        .unwrap();

    let report = fx.service.initialize().await.unwrap();
    let outcome: Vec<(&str, bool)> = report
        .iter()
        .map(|(name, result)| (name.as_str(), result.is_ok()))
        .collect();
    assert_eq!(outcome, [("broken", false), ("fs", true)]);

    let statuses = fx.service.list_server_statuses().await.unwrap();
    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().any(|s| s.name == "fs" && s.connected));
    assert!(statuses.iter().any(|s| s.name == "off" && !s.connected));

    fx.service.shutdown().await;
    assert_eq!(fx.factory.state.open_handles("fs"), 0);
}

#[tokio::test]
async fn test_health_failure_and_recovery_visible_in_status() {
    let fx = fixture();
    fx.service.initialize().await.unwrap();
    fx.service.add_server(cat("fs")).await.unwrap();

    fx.factory.state.set_healthy(false);
    fx.service.controller().health_tick().await;
    assert!(!fx.service.get_server_status("fs").await.unwrap().connected);

    fx.factory.state.set_healthy(true);
    let service = &fx.service;
    let recovered = eventually(Duration::from_secs(5), || async move {
        service
            .get_server_status("fs")
            .await
            .is_ok_and(|s| s.connected && s.tool_count == 2)
    })
    .await;
    assert!(recovered);

    fx.service.shutdown().await;
}

#[tokio::test]
async fn test_failed_add_is_retried_by_health_cycle() {
    let fx = fixture();
    fx.factory.state.set_healthy(false);

    let err = fx.service.add_server(cat("fs")).await.unwrap_err();
    assert!(matches!(err, McpServiceError::Transport { .. }));
    let mut off = cat("off");
    off.enabled = false;
    fx.service.add_server(off).await.unwrap();

    let status = fx.service.get_server_status("fs").await.unwrap();
    assert!(status.enabled);
    assert!(!status.connected);

    fx.factory.state.set_healthy(true);
    fx.service.controller().health_tick().await;

    let service = &fx.service;
    let connected = eventually(Duration::from_secs(5), || async move {
        service
            .get_server_status("fs")
            .await
            .is_ok_and(|s| s.connected && s.tool_count == 2)
    })
    .await;
    assert!(connected, "failed start was never retried");
    assert!(!fx.service.get_server_status("off").await.unwrap().connected);
    assert_eq!(fx.factory.state.open_handles("fs"), 1);
    assert_eq!(fx.factory.state.open_handles("off"), 0);

    fx.service.shutdown().await;
    assert_eq!(fx.factory.state.open_handles("fs"), 0);
}

#[tokio::test]
async fn test_connection_probe_leaves_registry_untouched() {
    let fx = fixture();
    let tools = fx.service.test_connection(&cat("probe")).await.unwrap();

    assert_eq!(tools.len(), 2);
    assert!(fx.service.list_servers().await.unwrap().is_empty());
    assert_eq!(fx.factory.state.open_handles("probe"), 0);
    assert!(fx.service.list_all_tools().await.is_empty());
}

#[tokio::test]
async fn test_list_server_tools_requires_connection() {
    let fx = fixture();
    let err = fx.service.list_server_tools("fs").await.unwrap_err();
    assert!(matches!(err, McpServiceError::NotConnected(_)));

    fx.service.add_server(cat("fs")).await.unwrap();
    assert_eq!(fx.service.list_server_tools("fs").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_registry_validate_rejects_missing_command_or_url() {
    let (_dir, registry) = temp_registry();
    registry.add(cat("fs")).await.unwrap();
    registry
        .add(McpServerConfig::network(
            "web",
            McpTransportKind::Remote,
            "https://tools.example.com/mcp",
        ))
        .await
        .unwrap();
    assert!(registry.validate().await.is_ok());

    assert!(McpServerConfig::local("fs", Vec::new()).validate().is_err());
    for kind in [
        McpTransportKind::Remote,
        McpTransportKind::Sse,
        McpTransportKind::Http,
    ] {
        assert!(McpServerConfig::network("web", kind, "").validate().is_err());
    }
}

#[tokio::test]
async fn test_service_with_noop_emitter_is_independent() {
    let (_dir_a, registry_a) = temp_registry();
    let (_dir_b, registry_b) = temp_registry();
    let factory = StubFactory::new();

    let a = McpService::new(
        registry_a,
        Arc::new(factory.clone()),
        Arc::new(NoopEmitter::new()),
        fast_settings(),
    );
    let b = McpService::new(
        registry_b,
        Arc::new(factory.clone()),
        Arc::new(NoopEmitter::new()),
        fast_settings(),
    );

    a.add_server(cat("fs")).await.unwrap();
    assert!(a.get_server_status("fs").await.unwrap().connected);
    assert!(matches!(
        b.get_server_status("fs").await,
        Err(McpServiceError::NotFound(_))
    ));
}
