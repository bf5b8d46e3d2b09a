//! End-to-end tests for the publish tool through the tool system:
//! schema validation, normalization, bounded acknowledgment waits, and
//! transparent recovery after transport failures.

use kafka_publisher::config::{BrokerCredentials, Secret};
use kafka_publisher::testing::mocks::{MockProducerFactory, SendMode};
use kafka_publisher::tools::ToolConfig;
use kafka_publisher::{
    ConnectionRegistry, PublishError, PublishMessageTool, PublishRequest, ToolError, ToolSystem,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn sasl_credentials() -> BrokerCredentials {
    BrokerCredentials {
        bootstrap_servers: "b1:9092".to_string(),
        sasl_username: Some("u".to_string()),
        sasl_password: Some(Secret::from("p")),
        ..Default::default()
    }
}

async fn tool_system_with(
    factory: Arc<MockProducerFactory>,
    credentials: BrokerCredentials,
) -> ToolSystem {
    let registry = Arc::new(ConnectionRegistry::new(factory));
    let mut tool_system = ToolSystem::new(registry, credentials);
    let mut tool_configs = HashMap::new();
    tool_configs.insert(
        "publish_message".to_string(),
        ToolConfig::Simple("builtin".to_string()),
    );
    tool_system.initialize(&tool_configs).await.unwrap();
    tool_system
}

#[tokio::test]
async fn test_end_to_end_sasl_publish() {
    // Credentials carry only servers + SASL pair; the effective config must
    // gain SASL_SSL/PLAIN and the outcome must echo everything but the
    // password.
    let factory = Arc::new(MockProducerFactory::new());
    let tool_system = tool_system_with(factory.clone(), sasl_credentials()).await;

    let result = tool_system
        .execute_tool(
            "publish_message",
            &json!({"topic": "orders", "message": "hello", "key": "k1"}),
        )
        .await
        .unwrap();

    assert_eq!(result["success"], json!(true));
    assert_eq!(result["topic"], json!("orders"));
    assert_eq!(result["partition"], json!(0));
    assert_eq!(result["offset"], json!(42));
    assert_eq!(result["key"], json!("k1"));
    assert_eq!(result["security"]["protocol"], json!("SASL_SSL"));
    assert_eq!(result["security"]["mechanism"], json!("PLAIN"));
    assert_eq!(result["security"]["username"], json!("u"));
    assert!(result.get("sasl_password").is_none());

    let config = factory.last_config().unwrap();
    let client_config = config.to_client_config();
    assert_eq!(client_config.get("security.protocol").unwrap(), "SASL_SSL");
    assert_eq!(client_config.get("sasl.mechanism").unwrap(), "PLAIN");
}

#[tokio::test]
async fn test_empty_topic_fails_validation_before_any_connection() {
    let factory = Arc::new(MockProducerFactory::new());
    let tool_system = tool_system_with(factory.clone(), sasl_credentials()).await;

    let result = tool_system
        .execute_tool("publish_message", &json!({"topic": "", "message": "hi"}))
        .await;

    match result {
        Err(ToolError::ExecutionError(message)) => assert!(message.contains("topic")),
        other => panic!("expected ExecutionError, got {other:?}"),
    }
    assert_eq!(factory.constructions(), 0);
}

#[tokio::test]
async fn test_schema_rejects_unknown_parameters() {
    let factory = Arc::new(MockProducerFactory::new());
    let tool_system = tool_system_with(factory, sasl_credentials()).await;

    let result = tool_system
        .execute_tool(
            "publish_message",
            &json!({"topic": "orders", "message": "hi", "partition": 3}),
        )
        .await;
    assert!(matches!(result, Err(ToolError::ValidationError(_))));
}

#[tokio::test]
async fn test_missing_required_parameters_rejected_by_schema() {
    let factory = Arc::new(MockProducerFactory::new());
    let tool_system = tool_system_with(factory, sasl_credentials()).await;

    let result = tool_system
        .execute_tool("publish_message", &json!({"topic": "orders"}))
        .await;
    assert!(matches!(result, Err(ToolError::ValidationError(_))));
}

#[tokio::test]
async fn test_concurrent_publishes_share_one_producer() {
    let factory = Arc::new(MockProducerFactory::new());
    let registry = Arc::new(ConnectionRegistry::new(factory.clone()));
    let tool = Arc::new(PublishMessageTool::new(registry, sasl_credentials()));

    let mut handles = Vec::new();
    for i in 0..32 {
        let tool = tool.clone();
        handles.push(tokio::spawn(async move {
            let request = PublishRequest {
                topic: "orders".to_string(),
                message: format!("message-{i}"),
                ..Default::default()
            };
            tool.publish(&request).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // All 32 concurrent sends went through a single cached producer
    assert_eq!(factory.constructions(), 1);
    let producer = factory.last_producer().unwrap();
    assert_eq!(producer.sent_records().len(), 32);
}

#[tokio::test]
async fn test_recovery_after_transport_failure_needs_no_intervention() {
    let factory = Arc::new(MockProducerFactory::new());
    let registry = Arc::new(ConnectionRegistry::new(factory.clone()));
    let tool = PublishMessageTool::new(registry.clone(), sasl_credentials());

    let request = PublishRequest {
        topic: "orders".to_string(),
        message: "hello".to_string(),
        ..Default::default()
    };

    // Healthy warm-up send creates the producer
    tool.publish(&request).await.unwrap();
    assert_eq!(factory.constructions(), 1);

    // Simulated transport failure discards the producer...
    factory
        .last_producer()
        .unwrap()
        .set_send_mode(SendMode::FailEnqueue("connection lost".to_string()));
    let failed = tool.publish(&request).await;
    assert!(matches!(failed, Err(PublishError::Transport { .. })));

    // ...and the next publish succeeds against a fresh one, same registry
    // entry, no manual intervention.
    let outcome = tool.publish(&request).await.unwrap();
    assert!(outcome.success);
    assert_eq!(factory.constructions(), 2);
    assert_eq!(registry.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_publish_is_bounded() {
    let factory = Arc::new(MockProducerFactory::new());
    factory.set_default_send_mode(SendMode::NeverResolve);
    let registry = Arc::new(ConnectionRegistry::new(factory));
    let tool = PublishMessageTool::new(registry, sasl_credentials());

    let request = PublishRequest {
        topic: "orders".to_string(),
        message: "hello".to_string(),
        ..Default::default()
    };

    // A delivery callback that never fires must yield a failure no later
    // than the acknowledgment deadline, never a hang. Generous outer bound
    // so the test is stable on slow CI.
    let result = tokio::time::timeout(Duration::from_secs(10), tool.publish(&request)).await;
    let publish_result = result.expect("publish must not hang past its deadline");
    match publish_result {
        Err(PublishError::Delivery { reason, .. }) => {
            assert!(reason.contains("timed out or unacknowledged"));
        }
        other => panic!("expected Delivery, got {other:?}"),
    }
}

#[tokio::test]
async fn test_tool_shutdown_closes_connections() {
    let factory = Arc::new(MockProducerFactory::new());
    let registry = Arc::new(ConnectionRegistry::new(factory.clone()));
    let mut tool_system = ToolSystem::new(registry.clone(), sasl_credentials());
    let mut tool_configs = HashMap::new();
    tool_configs.insert(
        "publish_message".to_string(),
        ToolConfig::Simple("builtin".to_string()),
    );
    tool_system.initialize(&tool_configs).await.unwrap();

    tool_system
        .execute_tool(
            "publish_message",
            &json!({"topic": "orders", "message": "hello"}),
        )
        .await
        .unwrap();
    assert_eq!(registry.len(), 1);

    tool_system.shutdown().await.unwrap();
    assert!(registry.is_empty());
}
