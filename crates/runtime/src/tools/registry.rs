//! Registry of tool backends.
//!
//! The registry owns one connection per backend and publishes every
//! backend's tools under `<backend>__<tool>` names. Lookups and invocations
//! share a read lock; registration and removal take the write lock only for
//! the swap itself.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use mcp::{BackendConfig, Connector, JsonObject, RmcpConnector, ToolConnection, ToolDescriptor};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::retry::RetryPolicy;
use super::schema::{SEPARATOR, normalize_schema, qualified_name, split_qualified};
use super::{RegistryError, ToolError, ToolHost};
use crate::model::ToolSpec;

struct Entry<T> {
    connection: Arc<T>,
    descriptors: Vec<ToolDescriptor>,
    schemas: Vec<ToolSpec>,
}

struct State<T> {
    backends: HashMap<String, Entry<T>>,
    /// Backend names in first-registration order.
    order: Vec<String>,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        Self {
            backends: HashMap::new(),
            order: Vec::new(),
        }
    }
}

/// Holds connections to tool backends and routes calls to them.
pub struct ToolRegistry<C: Connector = RmcpConnector> {
    connector: C,
    retry: RetryPolicy,
    state: RwLock<State<C::Connection>>,
}

impl ToolRegistry<RmcpConnector> {
    /// A registry that connects over MCP.
    pub fn mcp() -> Self {
        Self::new(RmcpConnector)
    }
}

impl<C: Connector> ToolRegistry<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            retry: RetryPolicy::default(),
            state: RwLock::new(State::default()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Connect to a backend, discover its tools and publish them.
    ///
    /// On failure an existing registration under the same name is left
    /// untouched. On success it is replaced and its connection closed.
    pub async fn register(&self, config: &BackendConfig) -> Result<(), RegistryError> {
        validate(config)?;
        let name = config.name.as_str();

        let connection = self
            .connector
            .connect(config)
            .await
            .map_err(|source| RegistryError::Connect {
                backend: name.to_string(),
                source,
            })?;

        let descriptors = match connection.list_tools().await {
            Ok(descriptors) => descriptors,
            Err(source) => {
                connection.close().await;
                return Err(RegistryError::Connect {
                    backend: name.to_string(),
                    source,
                });
            }
        };

        let schemas: Vec<ToolSpec> = descriptors
            .iter()
            .map(|tool| ToolSpec {
                name: qualified_name(name, &tool.name),
                description: tool.description.clone(),
                schema: normalize_schema(&tool.input_schema),
            })
            .collect();
        let tool_count = schemas.len();

        let entry = Entry {
            connection: Arc::new(connection),
            descriptors,
            schemas,
        };

        let previous = {
            let mut state = self.state.write().await;
            let previous = state.backends.insert(name.to_string(), entry);
            if previous.is_none() {
                state.order.push(name.to_string());
            }
            previous
        };
        if let Some(previous) = previous {
            previous.connection.close().await;
            debug!(backend = %name, "closed previous connection");
        }

        info!(backend = %name, tools = tool_count, "registered backend");
        Ok(())
    }

    /// Register every backend concurrently.
    ///
    /// Each backend gets the retry policy's attempts, bounded by `deadline`.
    /// A failing backend never affects the others: whatever succeeded stays
    /// registered, and every failure is reported together.
    pub async fn register_all(
        &self,
        configs: &[BackendConfig],
        deadline: Instant,
    ) -> Result<(), RegistryError> {
        let registrations = configs.iter().map(|config| async move {
            let attempt = self.retry.run(
                &config.name,
                || self.register(config),
                RegistryError::is_retryable,
            );
            match tokio::time::timeout_at(deadline, attempt).await {
                Ok(result) => result,
                Err(_) => Err(RegistryError::DeadlineElapsed {
                    backend: config.name.clone(),
                }),
            }
        });

        let failures: Vec<RegistryError> = join_all(registrations)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        if failures.is_empty() {
            return Ok(());
        }
        for failure in &failures {
            error!(error = %failure, "backend registration failed");
        }
        Err(RegistryError::Registration { failures })
    }

    /// Close a backend's connection and forget its tools.
    ///
    /// Returns whether the backend was registered.
    pub async fn unregister(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            state.order.retain(|n| n != name);
            state.backends.remove(name)
        };

        match removed {
            Some(entry) => {
                entry.connection.close().await;
                info!(backend = %name, "unregistered backend");
                true
            }
            None => false,
        }
    }

    /// Names of the registered backends, in registration order.
    pub async fn servers(&self) -> Vec<String> {
        self.state.read().await.order.clone()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.state.read().await.backends.contains_key(name)
    }

    /// Published tool definitions for one backend.
    pub async fn schemas(&self, name: &str) -> Option<Vec<ToolSpec>> {
        let state = self.state.read().await;
        state.backends.get(name).map(|entry| entry.schemas.clone())
    }

    /// Raw tool metadata as the backend reported it.
    pub async fn descriptors(&self, name: &str) -> Option<Vec<ToolDescriptor>> {
        let state = self.state.read().await;
        state.backends.get(name).map(|entry| entry.descriptors.clone())
    }

    /// Close every connection and empty the registry.
    pub async fn shutdown(&self) {
        let entries: Vec<(String, Entry<C::Connection>)> = {
            let mut state = self.state.write().await;
            state.order.clear();
            state.backends.drain().collect()
        };
        for (name, entry) in entries {
            entry.connection.close().await;
            debug!(backend = %name, "closed backend");
        }
    }
}

impl<C: Connector> ToolHost for ToolRegistry<C> {
    async fn catalogue(&self) -> Vec<ToolSpec> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|name| state.backends.get(name))
            .flat_map(|entry| entry.schemas.iter().cloned())
            .collect()
    }

    async fn invoke(&self, name: &str, arguments: JsonObject) -> Result<String, ToolError> {
        let (backend, tool) = split_qualified(name)?;

        let connection = {
            let state = self.state.read().await;
            state
                .backends
                .get(backend)
                .map(|entry| Arc::clone(&entry.connection))
                .ok_or_else(|| ToolError::NotFound(backend.to_string()))?
        };

        match connection.call_tool(tool, arguments).await {
            Ok(result) => {
                let text = serde_json::to_string(&result)
                    .map_err(|e| ToolError::Execution(format!("serialize result: {e}")))?;
                debug!(backend = %backend, tool = %tool, bytes = text.len(), "tool call succeeded");
                Ok(text)
            }
            Err(e) => {
                warn!(backend = %backend, tool = %tool, error = %e, "tool call failed");
                Err(ToolError::Execution(e.to_string()))
            }
        }
    }
}

fn validate(config: &BackendConfig) -> Result<(), RegistryError> {
    if config.name.trim().is_empty() {
        return Err(RegistryError::Validation("backend name is empty".into()));
    }
    if config.name.contains(SEPARATOR) {
        return Err(RegistryError::Validation(format!(
            "backend name {:?} contains {SEPARATOR:?}",
            config.name
        )));
    }
    if config.endpoint.trim().is_empty() {
        return Err(RegistryError::Validation(format!(
            "backend {}: endpoint is empty",
            config.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    type Calls = Arc<Mutex<Vec<(String, String, JsonObject)>>>;

    /// Connects to any endpoint except those starting with `bad`, which
    /// always refuse, and `hang`, which never answer.
    #[derive(Default, Clone)]
    struct FakeConnector {
        attempts: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
        calls: Calls,
        closed: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    }

    impl FakeConnector {
        fn attempts(&self, backend: &str) -> Vec<Instant> {
            self.attempts
                .lock()
                .unwrap()
                .get(backend)
                .cloned()
                .unwrap_or_default()
        }

        fn closed_flags(&self) -> Vec<bool> {
            self.closed
                .lock()
                .unwrap()
                .iter()
                .map(|flag| flag.load(Ordering::SeqCst))
                .collect()
        }
    }

    struct FakeConnection {
        backend: String,
        tools: Vec<ToolDescriptor>,
        calls: Calls,
        closed: Arc<AtomicBool>,
    }

    impl ToolConnection for FakeConnection {
        async fn list_tools(&self) -> mcp::Result<Vec<ToolDescriptor>> {
            Ok(self.tools.clone())
        }

        async fn call_tool(&self, name: &str, arguments: JsonObject) -> mcp::Result<Value> {
            self.calls.lock().unwrap().push((
                self.backend.clone(),
                name.to_string(),
                arguments.clone(),
            ));
            if name == "explode" {
                return Err(mcp::Error::ToolCallFailed("backend exploded".into()));
            }
            Ok(json!({
                "content": [{"type": "text", "text": format!("{}:{name}", self.backend)}],
                "structuredContent": {"args": arguments, "nested": {"ok": true}},
            }))
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    impl Connector for FakeConnector {
        type Connection = FakeConnection;

        async fn connect(&self, config: &BackendConfig) -> mcp::Result<FakeConnection> {
            self.attempts
                .lock()
                .unwrap()
                .entry(config.name.clone())
                .or_default()
                .push(Instant::now());

            if config.endpoint.starts_with("bad") {
                return Err(mcp::Error::Connect("connection refused".into()));
            }
            if config.endpoint.starts_with("hang") {
                std::future::pending::<()>().await;
            }

            let tools = config
                .endpoint
                .split(',')
                .map(|tool| {
                    ToolDescriptor::new(tool, format!("{tool} tool")).with_schema(json!({
                        "$schema": "http://json-schema.org/draft-07/schema#",
                        "properties": {"city": {"type": "string"}},
                        "required": ["city"]
                    }))
                })
                .collect();
            let closed = Arc::new(AtomicBool::new(false));
            self.closed.lock().unwrap().push(Arc::clone(&closed));

            Ok(FakeConnection {
                backend: config.name.clone(),
                tools,
                calls: Arc::clone(&self.calls),
                closed,
            })
        }
    }

    fn registry() -> (ToolRegistry<FakeConnector>, FakeConnector) {
        let connector = FakeConnector::default();
        (ToolRegistry::new(connector.clone()), connector)
    }

    fn args(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn publishes_qualified_normalized_tools() {
        let (registry, _) = registry();
        registry
            .register(&BackendConfig::new("weather", "get_forecast,get_alerts"))
            .await
            .unwrap();

        let catalogue = registry.catalogue().await;
        let names: Vec<_> = catalogue.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["weather__get_forecast", "weather__get_alerts"]);
        assert_eq!(
            catalogue[0].schema,
            json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            })
        );

        let raw = registry.descriptors("weather").await.unwrap();
        assert!(raw[0].input_schema.contains_key("$schema"));
        assert_eq!(registry.schemas("weather").await.unwrap(), catalogue);
    }

    #[tokio::test]
    async fn invoke_routes_to_owning_backend() {
        let (registry, connector) = registry();
        registry
            .register(&BackendConfig::new("weather", "lookup"))
            .await
            .unwrap();
        registry
            .register(&BackendConfig::new("notion", "lookup"))
            .await
            .unwrap();

        let text = registry
            .invoke("notion__lookup", args(json!({"q": "todo"})))
            .await
            .unwrap();

        let calls = connector.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "notion");
        assert_eq!(calls[0].1, "lookup");

        // The whole structured result survives serialization.
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["content"][0]["text"], "notion:lookup");
        assert_eq!(parsed["structuredContent"]["args"]["q"], "todo");
        assert_eq!(parsed["structuredContent"]["nested"]["ok"], true);
    }

    #[tokio::test]
    async fn invoke_errors_are_in_band() {
        let (registry, _) = registry();
        registry
            .register(&BackendConfig::new("weather", "explode"))
            .await
            .unwrap();

        assert!(matches!(
            registry.invoke("weather", JsonObject::new()).await,
            Err(ToolError::Routing(_))
        ));
        assert_eq!(
            registry.invoke("redis__get", JsonObject::new()).await,
            Err(ToolError::NotFound("redis".into()))
        );

        let err = registry
            .invoke("weather__explode", JsonObject::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("tool_error: "));
        assert!(err.to_string().contains("backend exploded"));
    }

    #[tokio::test]
    async fn reregistration_replaces_and_closes_previous() {
        let (registry, connector) = registry();
        registry
            .register(&BackendConfig::new("weather", "old_tool"))
            .await
            .unwrap();
        registry
            .register(&BackendConfig::new("notion", "search"))
            .await
            .unwrap();
        registry
            .register(&BackendConfig::new("weather", "new_tool"))
            .await
            .unwrap();

        assert_eq!(connector.closed_flags(), [true, false, false]);
        assert_eq!(registry.servers().await, ["weather", "notion"]);
        let names: Vec<_> = registry
            .catalogue()
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["weather__new_tool", "notion__search"]);
    }

    #[tokio::test]
    async fn failed_reregistration_keeps_previous() {
        let (registry, connector) = registry();
        registry
            .register(&BackendConfig::new("weather", "get_forecast"))
            .await
            .unwrap();

        let err = registry
            .register(&BackendConfig::new("weather", "bad://host"))
            .await
            .unwrap_err();
        assert_eq!(err.backend(), Some("weather"));
        assert_eq!(connector.closed_flags(), [false]);
        assert!(registry.contains("weather").await);
        assert_eq!(registry.catalogue().await.len(), 1);
    }

    #[tokio::test]
    async fn catalogue_reads_through() {
        let (registry, _) = registry();
        assert!(registry.catalogue().await.is_empty());

        registry
            .register(&BackendConfig::new("redis", "get"))
            .await
            .unwrap();
        assert_eq!(registry.catalogue().await.len(), 1);

        assert!(registry.unregister("redis").await);
        assert!(registry.catalogue().await.is_empty());
    }

    #[tokio::test]
    async fn unregister_closes_and_forgets() {
        let (registry, connector) = registry();
        registry
            .register(&BackendConfig::new("weather", "get_forecast"))
            .await
            .unwrap();

        assert!(registry.unregister("weather").await);
        assert!(!registry.unregister("weather").await);
        assert_eq!(connector.closed_flags(), [true]);
        assert!(registry.servers().await.is_empty());
        assert!(registry.schemas("weather").await.is_none());
        assert!(registry.descriptors("weather").await.is_none());
    }

    #[tokio::test]
    async fn invalid_configs_are_rejected_without_connecting() {
        let (registry, connector) = registry();
        for config in [
            BackendConfig::new("", "get"),
            BackendConfig::new("weather", "  "),
            BackendConfig::new("my__backend", "get"),
        ] {
            assert!(matches!(
                registry.register(&config).await,
                Err(RegistryError::Validation(_))
            ));
        }
        assert!(connector.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn register_all_keeps_partial_success() {
        let (registry, connector) = registry();
        let configs = [
            BackendConfig::new("weather", "get_forecast"),
            BackendConfig::new("notion", "bad://notion.example"),
        ];

        let deadline = Instant::now() + Duration::from_secs(30);
        let err = registry.register_all(&configs, deadline).await.unwrap_err();

        assert!(err.to_string().contains("notion"));
        match &err {
            RegistryError::Registration { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].backend(), Some("notion"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.servers().await, ["weather"]);
        assert_eq!(connector.attempts("weather").len(), 1);

        // Exactly three attempts, with doubling backoff between them.
        let attempts = connector.attempts("notion");
        assert_eq!(attempts.len(), 3);
        let first_gap = attempts[1] - attempts[0];
        let second_gap = attempts[2] - attempts[1];
        assert!(first_gap >= Duration::from_millis(300), "{first_gap:?}");
        assert!(second_gap >= Duration::from_millis(600), "{second_gap:?}");
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn register_all_respects_deadline() {
        let (registry, _) = registry();
        let configs = [
            BackendConfig::new("weather", "get_forecast"),
            BackendConfig::new("redis", "hang"),
        ];

        let deadline = Instant::now() + Duration::from_secs(5);
        let err = registry.register_all(&configs, deadline).await.unwrap_err();

        match err {
            RegistryError::Registration { failures } => {
                assert!(matches!(
                    &failures[0],
                    RegistryError::DeadlineElapsed { backend } if backend == "redis"
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.servers().await, ["weather"]);
    }

    #[tokio::test]
    async fn register_all_succeeds_when_every_backend_does() {
        let (registry, _) = registry();
        let configs = [
            BackendConfig::new("weather", "get_forecast"),
            BackendConfig::new("redis", "get,set"),
        ];
        let deadline = Instant::now() + Duration::from_secs(5);
        registry.register_all(&configs, deadline).await.unwrap();
        assert_eq!(registry.catalogue().await.len(), 3);
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let (registry, connector) = registry();
        registry
            .register(&BackendConfig::new("weather", "a"))
            .await
            .unwrap();
        registry
            .register(&BackendConfig::new("notion", "b"))
            .await
            .unwrap();

        registry.shutdown().await;
        assert_eq!(connector.closed_flags(), [true, true]);
        assert!(registry.servers().await.is_empty());
    }
}
