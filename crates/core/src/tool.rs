//! Immutable, partially applied remote tools.
//!
//! A [`Tool`] carries everything needed to call one server-side tool: the
//! caller-facing parameters, the values bound ahead of time, the credential
//! providers it consumed and the transport. Binding more values or adding
//! credentials always yields a new `Tool`.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use {
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{
    auth::{self, AuthTokenGetter, AuthTokenGetters},
    convert::param_auth_map,
    error::{Error, Result},
    headers,
    manifest::{ParameterSchema, ToolSchema},
    schema::ArgumentValidator,
    traits::Transport,
    value::{BoundParams, BoundValue, ClientHeaders},
};

/// A tool together with what its construction consumed.
#[derive(Debug, Clone)]
pub struct Built {
    pub tool: Tool,
    /// Supplied bound parameter names the tool declares.
    pub used_bound: BTreeSet<String>,
    /// Supplied auth sources that satisfied at least one requirement.
    pub used_auth: BTreeSet<String>,
}

#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    /// Plain parameters not yet bound; the caller-facing surface.
    parameters: Vec<ParameterSchema>,
    validator: ArgumentValidator,
    bound_params: BoundParams,
    auth_token_getters: AuthTokenGetters,
    client_headers: Arc<ClientHeaders>,
    /// Auth-filled parameters still lacking a provider.
    remaining_auth_params: BTreeMap<String, Vec<String>>,
    /// Invocation sources, empty once any of them has a provider.
    remaining_auth_invocation: Vec<String>,
    transport: Arc<dyn Transport>,
}

impl Tool {
    /// Build a tool from its manifest entry.
    ///
    /// Only the bound values and credential providers this tool actually
    /// uses are attached; the rest are reported back through [`Built`] for
    /// the caller's unused-binding accounting.
    pub fn build(
        name: &str,
        schema: &ToolSchema,
        bound_params: &BoundParams,
        auth_token_getters: &AuthTokenGetters,
        transport: Arc<dyn Transport>,
        client_headers: Arc<ClientHeaders>,
    ) -> Result<Built> {
        let conflicts = headers::conflicting_sources(auth_token_getters.keys(), &client_headers);
        if !conflicts.is_empty() {
            return Err(Error::HeaderConflict {
                headers: conflicts.join(", "),
                tool: name.to_string(),
            });
        }

        let mut surface = Vec::new();
        let mut bound = BoundParams::new();
        for param in schema.parameters.iter().filter(|p| !p.is_auth_param()) {
            match bound_params.get(&param.name) {
                Some(value) => {
                    bound.insert(param.name.clone(), value.clone());
                },
                None => surface.push(param.clone()),
            }
        }

        let resolution = auth::resolve(
            &param_auth_map(&schema.parameters),
            &schema.auth_required,
            auth_token_getters.keys().map(String::as_str),
        );
        let getters: AuthTokenGetters = auth_token_getters
            .iter()
            .filter(|(source, _)| resolution.used.contains(*source))
            .map(|(source, getter)| (source.clone(), getter.clone()))
            .collect();

        debug!(
            tool = %name,
            bound = bound.len(),
            auth = getters.len(),
            satisfied = resolution.is_satisfied(),
            "built tool"
        );

        let used_bound = bound.keys().cloned().collect();
        let tool = Self {
            name: name.to_string(),
            description: schema.description.clone(),
            validator: ArgumentValidator::new(&surface),
            parameters: surface,
            bound_params: bound,
            auth_token_getters: getters,
            client_headers,
            remaining_auth_params: resolution.remaining_params,
            remaining_auth_invocation: resolution.remaining_invocation,
            transport,
        };

        Ok(Built {
            tool,
            used_bound,
            used_auth: resolution.used,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Parameters the caller still has to supply.
    pub fn parameters(&self) -> &[ParameterSchema] {
        &self.parameters
    }

    pub fn bound_parameter_names(&self) -> impl Iterator<Item = &str> {
        self.bound_params.keys().map(String::as_str)
    }

    pub fn auth_token_sources(&self) -> impl Iterator<Item = &str> {
        self.auth_token_getters.keys().map(String::as_str)
    }

    /// JSON Schema of the caller-facing arguments.
    pub fn input_schema(&self) -> Value {
        self.validator.json_schema()
    }

    /// Auth sources still missing, each listed once in first-seen order.
    pub fn required_auth_sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        let pending = self
            .remaining_auth_params
            .values()
            .flatten()
            .chain(&self.remaining_auth_invocation);
        for source in pending {
            if !sources.contains(source) {
                sources.push(source.clone());
            }
        }
        sources
    }

    /// Validate `args`, merge bound values and call the tool.
    ///
    /// Validation and outstanding auth requirements fail before any request
    /// is made. `args` may be `Value::Null` for tools without parameters.
    pub async fn invoke(&self, args: Value) -> Result<String> {
        let mut payload = self
            .validator
            .validate(&args)
            .map_err(Error::ArgumentValidation)?;

        let missing = self.required_auth_sources();
        if !missing.is_empty() {
            return Err(Error::AuthRequired {
                sources: missing.join(","),
            });
        }

        for (name, value) in &self.bound_params {
            payload.insert(name.clone(), value.resolve().await?);
        }
        payload.retain(|_, value| !value.is_null());

        let mut request_headers = headers::resolve_client_headers(&self.client_headers).await?;
        headers::add_auth_headers(&mut request_headers, &self.auth_token_getters).await?;
        headers::warn_if_insecure(self.transport.base_url(), &request_headers);

        debug!(tool = %self.name, args = payload.len(), "invoking tool");
        self.transport
            .tool_invoke(&self.name, payload, request_headers)
            .await
            .inspect_err(|e| warn!(tool = %self.name, error = %e, "tool invocation failed"))
    }

    pub fn bind_param(&self, name: &str, value: impl Into<BoundValue>) -> Result<Self> {
        self.bind_params(BoundParams::from([(name.to_string(), value.into())]))
    }

    /// A new tool with `params` bound. Every name must be an unbound plain
    /// parameter of this tool.
    pub fn bind_params(&self, params: BoundParams) -> Result<Self> {
        for name in params.keys() {
            if self.bound_params.contains_key(name) {
                return Err(Error::AlreadyBound {
                    param: name.clone(),
                    tool: self.name.clone(),
                });
            }
            if !self.parameters.iter().any(|p| &p.name == name) {
                return Err(Error::UnknownParameter {
                    param: name.clone(),
                    tool: self.name.clone(),
                });
            }
        }

        let mut tool = self.clone();
        tool.parameters.retain(|p| !params.contains_key(&p.name));
        tool.validator = ArgumentValidator::new(&tool.parameters);
        tool.bound_params.extend(params);
        Ok(tool)
    }

    pub fn add_auth_token_getter(&self, source: &str, getter: AuthTokenGetter) -> Result<Self> {
        self.add_auth_token_getters(AuthTokenGetters::from([(source.to_string(), getter)]))
    }

    /// A new tool with `getters` registered. Every source must satisfy at
    /// least one outstanding requirement.
    pub fn add_auth_token_getters(&self, getters: AuthTokenGetters) -> Result<Self> {
        let duplicates: Vec<String> = getters
            .keys()
            .filter(|source| self.auth_token_getters.contains_key(*source))
            .cloned()
            .collect();
        if !duplicates.is_empty() {
            return Err(Error::AuthAlreadyRegistered {
                sources: duplicates.join(", "),
                tool: self.name.clone(),
            });
        }

        let conflicts = headers::conflicting_sources(getters.keys(), &self.client_headers);
        if !conflicts.is_empty() {
            return Err(Error::HeaderConflict {
                headers: conflicts.join(", "),
                tool: self.name.clone(),
            });
        }

        let resolution = auth::resolve(
            &self.remaining_auth_params,
            &self.remaining_auth_invocation,
            getters.keys().map(String::as_str),
        );
        let unused: Vec<String> = getters
            .keys()
            .filter(|source| !resolution.used.contains(*source))
            .cloned()
            .collect();
        if !unused.is_empty() {
            return Err(Error::AuthUnused {
                sources: unused.join(", "),
                tool: self.name.clone(),
            });
        }

        let mut tool = self.clone();
        tool.auth_token_getters.extend(getters);
        tool.remaining_auth_params = resolution.remaining_params;
        tool.remaining_auth_invocation = resolution.remaining_invocation;
        Ok(tool)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("bound_params", &self.bound_params)
            .field("auth_token_sources", &self.auth_token_getters.keys())
            .field("remaining_auth_params", &self.remaining_auth_params)
            .field("remaining_auth_invocation", &self.remaining_auth_invocation)
            .field("base_url", &self.transport.base_url())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use {
        async_trait::async_trait,
        reqwest::header::HeaderMap,
        serde_json::{Map, json},
    };

    use {
        super::*,
        crate::{
            manifest::{Manifest, ParameterType},
            value::HeaderSource,
        },
    };

    type Call = (String, Map<String, Value>, HeaderMap);

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<Call>>,
        fail_with_status: Option<u16>,
    }

    impl RecordingTransport {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn base_url(&self) -> &str {
            "https://toolbox.test"
        }

        async fn tool_get(&self, tool_name: &str, _headers: HeaderMap) -> Result<Manifest> {
            Err(Error::ToolNotFound {
                name: tool_name.to_string(),
            })
        }

        async fn tools_list(
            &self,
            _toolset_name: Option<&str>,
            _headers: HeaderMap,
        ) -> Result<Manifest> {
            Err(Error::message("not used"))
        }

        async fn tool_invoke(
            &self,
            tool_name: &str,
            arguments: Map<String, Value>,
            headers: HeaderMap,
        ) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((tool_name.to_string(), arguments, headers));
            match self.fail_with_status {
                Some(status) => Err(Error::Http {
                    status,
                    body: "boom".into(),
                }),
                None => Ok("ok".into()),
            }
        }
    }

    fn schema() -> ToolSchema {
        ToolSchema {
            description: "Search the catalog".into(),
            parameters: vec![
                ParameterSchema::new("query", ParameterType::String),
                ParameterSchema::new("limit", ParameterType::Integer).optional(),
                ParameterSchema::new("region", ParameterType::String),
                ParameterSchema::new("user_id", ParameterType::String)
                    .with_auth_sources(["google", "github"]),
            ],
            auth_required: vec!["admin".into()],
        }
    }

    fn build(
        bound: BoundParams,
        getters: AuthTokenGetters,
        transport: Arc<RecordingTransport>,
    ) -> Result<Built> {
        Tool::build(
            "search",
            &schema(),
            &bound,
            &getters,
            transport,
            Arc::new(ClientHeaders::new()),
        )
    }

    fn getters(sources: &[&str]) -> AuthTokenGetters {
        sources
            .iter()
            .map(|s| ((*s).to_string(), AuthTokenGetter::fixed(format!("{s}-token"))))
            .collect()
    }

    #[test]
    fn build_partitions_parameters_and_reports_usage() {
        let transport = Arc::new(RecordingTransport::default());
        let bound = BoundParams::from([
            ("region".to_string(), BoundValue::from("eu")),
            ("user_id".to_string(), BoundValue::from("nope")),
            ("other".to_string(), BoundValue::from(1_i64)),
        ]);
        let built = build(bound, getters(&["github", "slack"]), transport).unwrap();

        let names: Vec<&str> = built.tool.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["query", "limit"]);
        assert_eq!(built.used_bound, BTreeSet::from(["region".to_string()]));
        assert_eq!(built.used_auth, BTreeSet::from(["github".to_string()]));
        assert_eq!(built.tool.bound_parameter_names().collect::<Vec<_>>(), ["region"]);
        assert_eq!(built.tool.auth_token_sources().collect::<Vec<_>>(), ["github"]);
        assert_eq!(built.tool.required_auth_sources(), ["admin"]);
        assert_eq!(built.tool.input_schema()["required"], json!(["query"]));
    }

    #[tokio::test]
    async fn invoke_merges_bound_values_and_auth_headers() {
        let transport = Arc::new(RecordingTransport::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let bound = BoundParams::from([(
            "region".to_string(),
            BoundValue::from_async(move || {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                async move { Ok(json!(format!("region-{n}"))) }
            }),
        )]);
        let tool = build(bound, getters(&["google", "admin"]), Arc::clone(&transport))
            .unwrap()
            .tool;

        tool.invoke(json!({"query": "rust", "limit": null, "stray": 1}))
            .await
            .unwrap();
        tool.invoke(json!({"query": "go"})).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        let (name, args, headers) = &calls[0];
        assert_eq!(name, "search");
        assert_eq!(
            Value::Object(args.clone()),
            json!({"query": "rust", "region": "region-0"})
        );
        assert_eq!(headers["google_token"], "google-token");
        assert_eq!(headers["admin_token"], "admin-token");
        assert_eq!(calls[1].1["region"], "region-1");
    }

    #[tokio::test]
    async fn validation_and_auth_fail_before_any_request() {
        let transport = Arc::new(RecordingTransport::default());
        let tool = build(BoundParams::new(), getters(&["google"]), Arc::clone(&transport))
            .unwrap()
            .tool;

        let err = tool.invoke(json!({"limit": "ten"})).await.unwrap_err();
        let Error::ArgumentValidation(issues) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(issues.messages(), [
            "query: Required",
            "limit: Expected integer, received string",
            "region: Required",
        ]);

        let err = tool
            .invoke(json!({"query": "q", "region": "us"}))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "one or more of the following authn services are required to invoke this tool: admin"
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn transport_errors_propagate_unchanged() {
        let transport = Arc::new(RecordingTransport {
            fail_with_status: Some(502),
            ..Default::default()
        });
        let tool = build(
            BoundParams::new(),
            getters(&["google", "admin"]),
            Arc::clone(&transport),
        )
        .unwrap()
        .tool;
        let err = tool
            .invoke(json!({"query": "q", "region": "us"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http { status: 502, ref body } if body == "boom"));
    }

    #[test]
    fn binding_rules() {
        let transport = Arc::new(RecordingTransport::default());
        let tool = build(BoundParams::new(), AuthTokenGetters::new(), transport)
            .unwrap()
            .tool;

        let bound = tool.bind_param("region", "eu").unwrap();
        assert_eq!(bound.parameters().len(), 2);
        assert_eq!(tool.parameters().len(), 3);
        assert!(tool.bound_parameter_names().next().is_none());

        let err = bound.bind_param("region", "us").unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot re-bind parameter: parameter 'region' is already bound in tool 'search'"
        );
        let err = tool.bind_param("user_id", "u1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to bind parameter: no parameter named 'user_id' in tool 'search'"
        );
        assert!(matches!(
            tool.bind_param("nope", 1_i64),
            Err(Error::UnknownParameter { .. })
        ));

        let many = tool
            .bind_params(BoundParams::from([
                ("query".to_string(), BoundValue::from("fixed")),
                ("limit".to_string(), BoundValue::from(5_i64)),
            ]))
            .unwrap();
        assert_eq!(many.parameters()[0].name, "region");
        assert_eq!(many.input_schema()["required"], json!(["region"]));
    }

    #[tokio::test]
    async fn adding_auth_getters() {
        let transport = Arc::new(RecordingTransport::default());
        let tool = build(BoundParams::new(), getters(&["google"]), Arc::clone(&transport))
            .unwrap()
            .tool;

        let err = tool
            .add_auth_token_getter("google", AuthTokenGetter::fixed("x"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "authentication source(s) `google` already registered in tool 'search'"
        );
        let err = tool.add_auth_token_getters(getters(&["github", "admin"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "authentication source(s) `github` unused by tool 'search'"
        );

        let ready = tool
            .add_auth_token_getter(
                "admin",
                AuthTokenGetter::from_async(|| async { Ok("root".to_string()) }),
            )
            .unwrap();
        assert!(ready.required_auth_sources().is_empty());
        assert_eq!(tool.required_auth_sources(), ["admin"]);

        ready
            .invoke(json!({"query": "q", "region": "us"}))
            .await
            .unwrap();
        assert_eq!(transport.calls()[0].2["admin_token"], "root");
    }

    #[test]
    fn auth_headers_may_not_shadow_client_headers() {
        let transport: Arc<dyn Transport> = Arc::new(RecordingTransport::default());
        let client_headers = Arc::new(ClientHeaders::from([(
            "admin_token".to_string(),
            HeaderSource::from("static"),
        )]));
        let err = Tool::build(
            "search",
            &schema(),
            &BoundParams::new(),
            &getters(&["admin"]),
            Arc::clone(&transport),
            Arc::clone(&client_headers),
        )
        .unwrap_err();
        assert!(matches!(err, Error::HeaderConflict { ref headers, .. } if headers == "admin_token"));

        let tool = Tool::build(
            "search",
            &schema(),
            &BoundParams::new(),
            &AuthTokenGetters::new(),
            transport,
            client_headers,
        )
        .unwrap()
        .tool;
        let err = tool
            .add_auth_token_getter("admin", AuthTokenGetter::fixed("t"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "client header(s) `admin_token` already registered in client, cannot register the \
             same headers on tool 'search'"
        );
    }
}
