//! OpenAI-compatible completion gateway (`POST {base_url}/chat/completions`).
//!
//! Capabilities are offered as function tools. Function names only allow
//! `[A-Za-z0-9_-]`, so `server.tool` travels as `server__tool` and is mapped
//! back through the table built for each request.

use crate::retry::RetryPolicy;
use async_trait::async_trait;
use concierge_application::{CompletionGateway, GatewayError};
use concierge_domain::{
    Capability, Completion, ConversationContext, Message, Role, ToolCallIntent, split_qualified,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_FUNCTION_NAME_LEN: usize = 64;

/// Connection settings for the gateway.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub model: String,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct OpenAiGateway {
    client: reqwest::Client,
    settings: OpenAiSettings,
}

impl OpenAiGateway {
    pub fn new(settings: OpenAiSettings) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| GatewayError::Other(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<ChatResponse, Attempt> {
        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.settings.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Attempt::Retry(GatewayError::Timeout)
            } else if e.is_connect() {
                Attempt::Retry(GatewayError::ConnectionError(e.to_string()))
            } else {
                Attempt::Fail(GatewayError::RequestFailed(e.to_string()))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = match serde_json::from_str::<ApiError>(&text) {
                Ok(error) => error.error.message,
                Err(_) => text,
            };
            let error = GatewayError::RequestFailed(format!("API error ({}): {}", status, message));
            return Err(if self.settings.retry.is_retryable_status(status.as_u16()) {
                Attempt::Retry(error)
            } else {
                Attempt::Fail(error)
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| Attempt::Fail(GatewayError::MalformedResponse(e.to_string())))
    }
}

#[async_trait]
impl CompletionGateway for OpenAiGateway {
    async fn complete(
        &self,
        context: &ConversationContext,
        tools: &[Capability],
    ) -> Result<Completion, GatewayError> {
        let (request, names) = build_request(&self.settings.model, context, tools);
        let policy = &self.settings.retry;

        let mut attempt = 0;
        let response = loop {
            match self.send_once(&request).await {
                Ok(response) => break response,
                Err(Attempt::Retry(error)) if attempt + 1 < policy.max_attempts => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Completion request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(Attempt::Retry(error)) | Err(Attempt::Fail(error)) => return Err(error),
            }
        };

        let completion = parse_response(response, &names)?;
        debug!(
            model = %self.settings.model,
            tool_calls = completion.intents().len(),
            "Completion received"
        );
        Ok(completion)
    }
}

enum Attempt {
    Retry(GatewayError),
    Fail(GatewayError),
}

// ==================== Wire types ====================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionSpec,
}

#[derive(Debug, Serialize)]
struct FunctionSpec {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    /// Some servers send `null` instead of omitting the field.
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ==================== Mapping ====================

/// `server.tool` → `server__tool`, with any other disallowed character
/// replaced by `_`.
fn encode_function_name(qualified_name: &str) -> String {
    let joined = match split_qualified(qualified_name) {
        Some((server, tool)) => format!("{}__{}", server, tool),
        None => qualified_name.to_string(),
    };
    joined
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FUNCTION_NAME_LEN)
        .collect()
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn wire_tool_call(intent: &ToolCallIntent) -> WireToolCall {
    WireToolCall {
        id: intent.id.clone(),
        kind: function_kind(),
        function: WireFunctionCall {
            name: encode_function_name(&intent.capability),
            arguments: intent.arguments_text(),
        },
    }
}

fn convert_message(message: &Message) -> ChatMessage {
    let content = if message.content.is_empty() && !message.tool_calls.is_empty() {
        None
    } else {
        Some(message.content.clone())
    };
    ChatMessage {
        role: role_name(message.role),
        content,
        tool_calls: message.tool_calls.iter().map(wire_tool_call).collect(),
        tool_call_id: message.tool_call_id.clone(),
    }
}

/// Build the request body and the function-name → qualified-name table.
fn build_request(
    model: &str,
    context: &ConversationContext,
    tools: &[Capability],
) -> (ChatRequest, HashMap<String, String>) {
    let mut names = HashMap::new();
    let mut specs = Vec::with_capacity(tools.len());
    for capability in tools {
        let name = encode_function_name(&capability.qualified_name);
        if names.contains_key(&name) {
            warn!(
                capability = %capability.qualified_name,
                function = %name,
                "Function name clash, not offering capability"
            );
            continue;
        }
        names.insert(name.clone(), capability.qualified_name.clone());
        specs.push(ToolSpec {
            kind: "function",
            function: FunctionSpec {
                name,
                description: capability.description.clone(),
                parameters: capability.input_schema.clone(),
            },
        });
    }

    let request = ChatRequest {
        model: model.to_string(),
        messages: context.messages().iter().map(convert_message).collect(),
        tools: specs,
    };
    (request, names)
}

fn parse_response(
    response: ChatResponse,
    names: &HashMap<String, String>,
) -> Result<Completion, GatewayError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::MalformedResponse("no choices returned".to_string()))?;
    let text = choice.message.content.unwrap_or_default();
    let calls = choice.message.tool_calls.unwrap_or_default();

    if calls.is_empty() {
        return Ok(Completion::Final(text));
    }

    let intents = calls
        .into_iter()
        .map(|call| {
            let capability = names
                .get(&call.function.name)
                .cloned()
                .unwrap_or_else(|| call.function.name.replacen("__", ".", 1));
            let raw = call.function.arguments;
            if raw.trim().is_empty() {
                return ToolCallIntent::new(call.id, capability, Value::Object(Default::default()));
            }
            match serde_json::from_str(&raw) {
                Ok(arguments) => ToolCallIntent::new(call.id, capability, arguments),
                Err(e) => {
                    debug!(capability = %capability, error = %e, "Tool call arguments are not JSON");
                    ToolCallIntent::unparseable(call.id, capability, raw, e.to_string())
                }
            }
        })
        .collect();

    Ok(Completion::ToolCalls { text, intents })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> ChatResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_function_name_encoding() {
        assert_eq!(encode_function_name("search.web"), "search__web");
        assert_eq!(encode_function_name("files.read.v2"), "files__read_v2");
        assert!(encode_function_name(&"x".repeat(100)).len() <= MAX_FUNCTION_NAME_LEN);
    }

    #[test]
    fn test_build_request_offers_tools() {
        let context =
            ConversationContext::for_request("be brief", &ConversationContext::new(), "hi");
        let tools = vec![
            Capability::new("search", "web", "Search the web").with_input_schema(json!({
                "type": "object",
                "properties": { "q": { "type": "string" } }
            })),
        ];
        let (request, names) = build_request("gpt-test", &context, &tools);
        let wire = serde_json::to_value(&request).unwrap();

        assert_eq!(wire["model"], "gpt-test");
        assert_eq!(wire["messages"][0]["role"], "system");
        assert_eq!(wire["messages"][1]["content"], "hi");
        assert_eq!(wire["tools"][0]["type"], "function");
        assert_eq!(wire["tools"][0]["function"]["name"], "search__web");
        assert_eq!(
            wire["tools"][0]["function"]["parameters"]["properties"]["q"]["type"],
            "string"
        );
        assert_eq!(names["search__web"], "search.web");
    }

    #[test]
    fn test_plain_request_has_no_tools_field() {
        let context = ConversationContext::for_request("", &ConversationContext::new(), "hi");
        let (request, _) = build_request("gpt-test", &context, &[]);
        let wire = serde_json::to_value(&request).unwrap();
        assert!(wire.get("tools").is_none());
    }

    #[test]
    fn test_tool_history_round_trip_shape() {
        let mut context = ConversationContext::new();
        context.push(Message::user("weather?"));
        context.push(Message::assistant_tool_calls(
            "",
            vec![ToolCallIntent::new("call_1", "weather.now", json!({ "city": "Oslo" }))],
        ));
        context.push(Message::tool_result("call_1", "{\"temp\":3}"));

        let (request, _) = build_request("m", &context, &[]);
        let wire = serde_json::to_value(&request).unwrap();
        let assistant = &wire["messages"][1];
        assert!(assistant["content"].is_null());
        assert_eq!(assistant["tool_calls"][0]["function"]["name"], "weather__now");
        assert_eq!(
            assistant["tool_calls"][0]["function"]["arguments"],
            "{\"city\":\"Oslo\"}"
        );
        assert_eq!(wire["messages"][2]["role"], "tool");
        assert_eq!(wire["messages"][2]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_parse_final_answer() {
        let completion = parse_response(
            response(json!({ "choices": [{ "message": { "content": "Hello!" } }] })),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(completion, Completion::Final("Hello!".to_string()));
    }

    #[test]
    fn test_parse_tool_calls_maps_names_back() {
        let names = HashMap::from([("files__read_v2".to_string(), "files.read.v2".to_string())]);
        let completion = parse_response(
            response(json!({ "choices": [{ "message": {
                "content": null,
                "tool_calls": [
                    { "id": "c1", "type": "function", "function": { "name": "files__read_v2", "arguments": "{\"path\":\"/a\"}" } },
                    { "id": "c2", "type": "function", "function": { "name": "search__web", "arguments": "" } }
                ]
            } }] })),
            &names,
        )
        .unwrap();

        let intents = completion.intents();
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].capability, "files.read.v2");
        assert_eq!(intents[0].arguments, json!({ "path": "/a" }));
        assert_eq!(intents[1].capability, "search.web");
        assert_eq!(intents[1].arguments, json!({}));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_response(response(json!({ "choices": [] })), &HashMap::new()),
            Err(GatewayError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_unparseable_arguments_keep_the_call() {
        let completion = parse_response(
            response(json!({ "choices": [{ "message": { "tool_calls": [
                { "id": "c1", "function": { "name": "alpha__search", "arguments": "{\"q\":\"ok\"}" } },
                { "id": "c2", "function": { "name": "alpha__search", "arguments": "{q: broken" } }
            ] } }] })),
            &HashMap::new(),
        )
        .unwrap();

        let intents = completion.intents();
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].arguments, json!({ "q": "ok" }));
        assert!(intents[0].arguments_error.is_none());
        assert_eq!(intents[1].capability, "alpha.search");
        assert!(intents[1].arguments_error.is_some());
        // Echoed back to the model exactly as it was sent
        assert_eq!(wire_tool_call(&intents[1]).function.arguments, "{q: broken");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_gateway_error() {
        let gateway = OpenAiGateway::new(OpenAiSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
            retry: RetryPolicy::no_retry(),
            ..Default::default()
        })
        .unwrap();
        let context = ConversationContext::for_request("", &ConversationContext::new(), "hi");
        assert!(gateway.complete(&context, &[]).await.is_err());
    }
}
