//! The turn state machine.

use chatloom_core::error::Result;
use chatloom_core::message::{Message, MessageToolCall, ThreadId};
use chatloom_core::provider::{Provider, ProviderRequest};
use chatloom_core::tool::{ToolCall, ToolRegistry};
use chatloom_core::CheckpointStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::stream_event::TurnEvent;

const ITERATION_CAP_MESSAGE: &str =
    "I've reached the maximum number of tool call iterations for this turn. \
     Please rephrase or break the request into smaller steps.";

/// The states a turn moves through.
///
/// `AwaitingModel` and `AwaitingTool` alternate while the model keeps
/// requesting tools; `Done` is terminal once a plain text reply arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingModel,
    AwaitingTool,
    Done,
}

/// Drives one user message through the model/tool loop to a final reply.
///
/// Persistence contract: the buffered user message is written together with
/// the first successful model response, so a failed first model call leaves
/// the thread exactly as it was. Tool results are written as soon as they
/// are produced, in call-issue order.
///
/// One turn at a time per thread: a turn runs to completion before the next
/// input for the same thread is accepted, so the multi-batch checkpoint
/// writes of a tool-using turn can never interleave with another turn's.
/// Distinct threads run concurrently without coordination.
pub struct TurnRunner {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn CheckpointStore>,
    max_iterations: u32,
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TurnRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            store,
            max_iterations: 25,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch (or create) the serialization lock for a thread.
    ///
    /// The map lock is held only for the lookup; the per-thread lock is
    /// held by the caller for the whole turn.
    async fn turn_lock(&self, thread_id: &ThreadId) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks
            .entry(thread_id.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Set the maximum number of model calls per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    fn request(&self, messages: Vec<Message>) -> ProviderRequest {
        let mut request = ProviderRequest::new(self.model.clone(), messages)
            .with_temperature(self.temperature)
            .with_tools(self.tools.definitions());
        request.max_tokens = self.max_tokens;
        request
    }

    /// Process one user message to completion and return the final reply.
    pub async fn run(&self, thread_id: &ThreadId, user_text: &str) -> Result<Message> {
        let lock = self.turn_lock(thread_id).await;
        let _turn = lock.lock().await;

        let mut messages = self.store.load(thread_id).await?;
        info!(thread = %thread_id, history = messages.len(), "Starting turn");

        // Buffered until the first model response lands
        let mut pending = vec![Message::user(user_text)];
        messages.extend(pending.iter().cloned());

        let mut iteration = 0;

        loop {
            let state = TurnState::AwaitingModel;
            iteration += 1;
            if iteration > self.max_iterations {
                warn!(thread = %thread_id, iteration, "Iteration cap reached");
                let capped = Message::assistant(ITERATION_CAP_MESSAGE);
                pending.push(capped.clone());
                self.store.append(thread_id, &pending).await?;
                return Ok(capped);
            }

            debug!(thread = %thread_id, state = ?state, iteration, "Calling model");
            let response = self.provider.complete(self.request(messages.clone())).await?;
            let assistant = response.message;

            pending.push(assistant.clone());
            self.store.append(thread_id, &pending).await?;
            pending.clear();
            messages.push(assistant.clone());

            if !assistant.has_tool_calls() {
                return Ok(assistant);
            }

            let state = TurnState::AwaitingTool;
            let calls = assistant.tool_calls.clone();
            debug!(thread = %thread_id, state = ?state, count = calls.len(), "Executing tools");

            let executed = self.execute_tools(&calls).await;
            let results: Vec<Message> = executed.into_iter().map(|e| e.message).collect();

            self.store.append(thread_id, &results).await?;
            messages.extend(results);
        }
    }

    /// Streaming variant: identical state machine and persistence, but the
    /// model responses arrive token by token and progress is reported as
    /// `TurnEvent`s on the channel.
    pub async fn run_stream(
        &self,
        thread_id: &ThreadId,
        user_text: &str,
        tx: mpsc::Sender<TurnEvent>,
    ) -> Result<()> {
        let result = self.run_stream_inner(thread_id, user_text, &tx).await;
        if let Err(ref e) = result {
            let _ = tx
                .send(TurnEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
        result
    }

    async fn run_stream_inner(
        &self,
        thread_id: &ThreadId,
        user_text: &str,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> Result<()> {
        let lock = self.turn_lock(thread_id).await;
        let _turn = lock.lock().await;

        let mut messages = self.store.load(thread_id).await?;
        info!(thread = %thread_id, history = messages.len(), "Starting streaming turn");

        let mut pending = vec![Message::user(user_text)];
        messages.extend(pending.iter().cloned());

        let mut iteration = 0;

        loop {
            iteration += 1;
            if iteration > self.max_iterations {
                warn!(thread = %thread_id, iteration, "Iteration cap reached");
                let capped = Message::assistant(ITERATION_CAP_MESSAGE);
                pending.push(capped.clone());
                self.store.append(thread_id, &pending).await?;
                let _ = tx
                    .send(TurnEvent::Chunk {
                        content: ITERATION_CAP_MESSAGE.into(),
                    })
                    .await;
                break;
            }

            let mut rx = self.provider.stream(self.request(messages.clone())).await?;

            let mut content = String::new();
            let mut tool_calls: Vec<MessageToolCall> = Vec::new();

            while let Some(chunk) = rx.recv().await {
                let chunk = chunk?;
                if let Some(text) = chunk.content {
                    if !text.is_empty() {
                        content.push_str(&text);
                        let _ = tx.send(TurnEvent::Chunk { content: text }).await;
                    }
                }
                if chunk.done {
                    tool_calls = chunk.tool_calls;
                    break;
                }
            }

            let mut assistant = Message::assistant(content);
            assistant.tool_calls = tool_calls.clone();

            pending.push(assistant.clone());
            self.store.append(thread_id, &pending).await?;
            pending.clear();
            messages.push(assistant);

            if tool_calls.is_empty() {
                break;
            }

            for tc in &tool_calls {
                let _ = tx
                    .send(TurnEvent::ToolCall {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        input: serde_json::from_str(&tc.arguments).unwrap_or_default(),
                    })
                    .await;
            }

            let executed = self.execute_tools(&tool_calls).await;
            let mut results = Vec::with_capacity(executed.len());
            for e in executed {
                let _ = tx
                    .send(TurnEvent::ToolResult {
                        id: e.message.tool_call_id.clone().unwrap_or_default(),
                        name: e.name,
                        output: e.message.content.clone(),
                        success: e.success,
                    })
                    .await;
                results.push(e.message);
            }

            self.store.append(thread_id, &results).await?;
            messages.extend(results);
        }

        let _ = tx
            .send(TurnEvent::Done {
                thread_id: thread_id.to_string(),
            })
            .await;
        Ok(())
    }

    /// Execute a batch of tool calls concurrently.
    ///
    /// Calls run as spawned tasks so a slow tool does not serialize the
    /// batch, but results are joined in call-issue order so the messages
    /// written back to the thread are deterministic. A panicking or failing
    /// tool becomes an error result the model can read; it never aborts
    /// the turn.
    async fn execute_tools(&self, calls: &[MessageToolCall]) -> Vec<ExecutedTool> {
        let mut handles = Vec::with_capacity(calls.len());
        for tc in calls {
            let registry = self.tools.clone();
            let call = ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                arguments: serde_json::from_str(&tc.arguments).unwrap_or_default(),
            };
            handles.push((
                tc.id.clone(),
                tc.name.clone(),
                tokio::spawn(async move { registry.execute(&call).await }),
            ));
        }

        let mut executed = Vec::with_capacity(handles.len());
        for (id, name, handle) in handles {
            let (output, success) = match handle.await {
                Ok(Ok(result)) => (result.output, result.success),
                Ok(Err(e)) => {
                    warn!(tool = %name, error = %e, "Tool execution failed");
                    (format!("Error: {e}"), false)
                }
                Err(join_err) => {
                    warn!(tool = %name, error = %join_err, "Tool task panicked");
                    (format!("Error: tool '{name}' panicked"), false)
                }
            };
            executed.push(ExecutedTool {
                message: Message::tool_result(&id, output),
                name,
                success,
            });
        }
        executed
    }
}

struct ExecutedTool {
    message: Message,
    name: String,
    success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatloom_checkpoint::InMemoryStore;
    use chatloom_core::error::{ProviderError, ToolError};
    use chatloom_core::message::Role;
    use chatloom_core::provider::ProviderResponse;
    use chatloom_core::tool::{Tool, ToolResult};
    use chatloom_tools::CalculatorTool;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider scripted with a fixed sequence of responses.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Message>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Message>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            let message = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 500,
                    message: "Script exhausted".into(),
                })?;
            Ok(ProviderResponse {
                message,
                model: "scripted-model".into(),
            })
        }
    }

    /// Provider that always fails.
    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    /// Provider that replies deterministically from the latest user message.
    struct EchoingProvider;

    #[async_trait]
    impl Provider for EchoingProvider {
        fn name(&self) -> &str {
            "echoing"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            let last = request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(ProviderResponse {
                message: Message::assistant(format!("reply: {last}")),
                model: "echoing-model".into(),
            })
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Takes a while to finish"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            Ok(ToolResult::ok("3"))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "panicking"
        }
        fn description(&self) -> &str {
            "Panics on execution"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            panic!("boom");
        }
    }

    fn assistant_with_calls(calls: Vec<MessageToolCall>) -> Message {
        let mut message = Message::assistant("");
        message.tool_calls = calls;
        message
    }

    fn calculator_call(id: &str, op: &str, a: f64, b: f64) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: "calculator".into(),
            arguments: serde_json::json!({
                "first_num": a, "second_num": b, "operation": op
            })
            .to_string(),
        }
    }

    fn calculator_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CalculatorTool));
        Arc::new(registry)
    }

    fn runner(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>) -> (TurnRunner, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let runner = TurnRunner::new(provider, "test-model", 0.0, tools, store.clone());
        (runner, store)
    }

    #[tokio::test]
    async fn plain_text_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant(
            "Hello there!",
        )]));
        let (runner, store) = runner(provider, Arc::new(ToolRegistry::new()));
        let thread = ThreadId::from("t1");

        let reply = runner.run(&thread, "Hi").await.unwrap();
        assert_eq!(reply.content, "Hello there!");

        let messages = store.load(&thread).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn division_round_trip() {
        // "What is 12 divided by 4?" with only the calculator bound
        let provider = Arc::new(ScriptedProvider::new(vec![
            assistant_with_calls(vec![calculator_call("call_1", "div", 12.0, 4.0)]),
            Message::assistant("12 divided by 4 is 3."),
        ]));
        let (runner, store) = runner(provider, calculator_registry());
        let thread = ThreadId::from("t1");

        let reply = runner.run(&thread, "What is 12 divided by 4?").await.unwrap();
        assert!(reply.content.contains('3'));

        let messages = store.load(&thread).await.unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].tool_calls.len(), 1);
        assert_eq!(messages[1].tool_calls[0].name, "calculator");
        assert_eq!(messages[2].role, Role::Tool);
        assert!(messages[2].content.contains("\"result\":3"));
        assert_eq!(messages[3].role, Role::Assistant);
        assert!(messages[3].content.contains('3'));
    }

    #[tokio::test]
    async fn first_model_failure_leaves_thread_unchanged() {
        let (runner, store) = runner(Arc::new(FailingProvider), Arc::new(ToolRegistry::new()));
        let thread = ThreadId::from("t1");

        let result = runner.run(&thread, "Hi").await;
        assert!(result.is_err());

        assert!(store.load(&thread).await.unwrap().is_empty());
        assert!(store.list_thread_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tool_results_written_in_call_issue_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            assistant_with_calls(vec![
                calculator_call("call_a", "add", 1.0, 2.0),
                calculator_call("call_b", "mul", 3.0, 4.0),
            ]),
            Message::assistant("3 and 12."),
        ]));
        let (runner, store) = runner(provider, calculator_registry());
        let thread = ThreadId::from("t1");

        runner.run(&thread, "Compute both").await.unwrap();

        let messages = store.load(&thread).await.unwrap();
        // user, assistant(calls), tool, tool, assistant
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_b"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            assistant_with_calls(vec![MessageToolCall {
                id: "call_1".into(),
                name: "frobnicate".into(),
                arguments: "{}".into(),
            }]),
            Message::assistant("That tool does not exist."),
        ]));
        let (runner, store) = runner(provider, calculator_registry());
        let thread = ThreadId::from("t1");

        let reply = runner.run(&thread, "Frobnicate please").await.unwrap();
        assert_eq!(reply.content, "That tool does not exist.");

        let messages = store.load(&thread).await.unwrap();
        assert_eq!(messages[2].role, Role::Tool);
        assert!(messages[2].content.contains("frobnicate"));
        assert!(messages[2].content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn panicking_tool_becomes_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(PanickingTool));

        let provider = Arc::new(ScriptedProvider::new(vec![
            assistant_with_calls(vec![MessageToolCall {
                id: "call_1".into(),
                name: "panicking".into(),
                arguments: "{}".into(),
            }]),
            Message::assistant("The tool crashed."),
        ]));
        let (runner, store) = runner(provider, Arc::new(registry));
        let thread = ThreadId::from("t1");

        let reply = runner.run(&thread, "Do it").await.unwrap();
        assert_eq!(reply.content, "The tool crashed.");

        let messages = store.load(&thread).await.unwrap();
        assert!(messages[2].content.contains("panicked"));
    }

    #[tokio::test]
    async fn iteration_cap_forces_final_message() {
        // Every response asks for another tool call
        let endless: Vec<Message> = (0..10)
            .map(|i| {
                assistant_with_calls(vec![calculator_call(
                    &format!("call_{i}"),
                    "add",
                    1.0,
                    1.0,
                )])
            })
            .collect();
        let provider = Arc::new(ScriptedProvider::new(endless));
        let (runner, store) = runner(provider, calculator_registry());
        let runner = runner.with_max_iterations(2);
        let thread = ThreadId::from("t1");

        let reply = runner.run(&thread, "Loop forever").await.unwrap();
        assert!(reply.content.contains("maximum number of tool call iterations"));

        let messages = store.load(&thread).await.unwrap();
        assert_eq!(messages.last().unwrap().content, reply.content);
    }

    #[tokio::test]
    async fn second_turn_sees_first_turn_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Message::assistant("First reply"),
            Message::assistant("Second reply"),
        ]));
        let (runner, store) = runner(provider, Arc::new(ToolRegistry::new()));
        let thread = ThreadId::from("t1");

        runner.run(&thread, "First").await.unwrap();
        runner.run(&thread, "Second").await.unwrap();

        let messages = store.load(&thread).await.unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content, "First");
        assert_eq!(messages[2].content, "Second");
    }

    #[tokio::test]
    async fn same_thread_turns_do_not_interleave() {
        // Turn A parks in a slow tool while turn B arrives on the same
        // thread. B must wait for A to finish, so A's tool result lands
        // directly after the call that issued it.
        let provider = Arc::new(ScriptedProvider::new(vec![
            assistant_with_calls(vec![MessageToolCall {
                id: "call_1".into(),
                name: "slow".into(),
                arguments: "{}".into(),
            }]),
            Message::assistant("The slow tool returned 3."),
            Message::assistant("Quick reply"),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SlowTool));
        let (runner, store) = runner(provider, Arc::new(registry));
        let runner = Arc::new(runner);
        let thread = ThreadId::from("t1");

        let first = {
            let runner = runner.clone();
            let thread = thread.clone();
            tokio::spawn(async move { runner.run(&thread, "Use the slow tool").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = {
            let runner = runner.clone();
            let thread = thread.clone();
            tokio::spawn(async move { runner.run(&thread, "Unrelated question").await })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let messages = store.load(&thread).await.unwrap();
        assert_eq!(messages.len(), 6);
        // Turn A is stored as one contiguous block
        assert_eq!(messages[0].content, "Use the slow tool");
        assert_eq!(messages[1].tool_calls.len(), 1);
        assert_eq!(messages[2].role, Role::Tool);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[3].content, "The slow tool returned 3.");
        // Turn B starts only after A completed
        assert_eq!(messages[4].content, "Unrelated question");
        assert_eq!(messages[5].content, "Quick reply");
    }

    #[tokio::test]
    async fn distinct_threads_run_concurrently_without_cross_talk() {
        let (runner, store) = runner(Arc::new(EchoingProvider), Arc::new(ToolRegistry::new()));
        let runner = Arc::new(runner);

        let mut handles = Vec::new();
        for t in 0..4 {
            let runner = runner.clone();
            handles.push(tokio::spawn(async move {
                let thread = ThreadId::from(&format!("thread-{t}"));
                for i in 0..5 {
                    runner
                        .run(&thread, &format!("thread-{t} msg {i}"))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for t in 0..4 {
            let thread = ThreadId::from(&format!("thread-{t}"));
            let messages = store.load(&thread).await.unwrap();
            assert_eq!(messages.len(), 10);
            for i in 0..5 {
                assert_eq!(messages[2 * i].content, format!("thread-{t} msg {i}"));
                assert_eq!(
                    messages[2 * i + 1].content,
                    format!("reply: thread-{t} msg {i}")
                );
            }
        }
    }

    #[tokio::test]
    async fn streaming_turn_emits_chunk_and_done() {
        // Default stream() wraps complete() into a single done chunk
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant(
            "Streamed reply",
        )]));
        let (runner, store) = runner(provider, Arc::new(ToolRegistry::new()));
        let thread = ThreadId::from("t1");

        let (tx, mut rx) = mpsc::channel(16);
        runner.run_stream(&thread, "Hi", tx).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(events.last(), Some(TurnEvent::Done { .. })));
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Chunk { content } => Some(content.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Streamed reply");

        // Same persistence contract as the non-streaming path
        let messages = store.load(&thread).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "Streamed reply");
    }

    #[tokio::test]
    async fn streaming_failure_emits_error_event() {
        let (runner, store) = runner(Arc::new(FailingProvider), Arc::new(ToolRegistry::new()));
        let thread = ThreadId::from("t1");

        let (tx, mut rx) = mpsc::channel(16);
        let result = runner.run_stream(&thread, "Hi", tx).await;
        assert!(result.is_err());

        let mut saw_error = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, TurnEvent::Error { .. }) {
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert!(store.load(&thread).await.unwrap().is_empty());
    }
}
