//! LLM-backed generator running the tool-calling loop

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::context::SourceContext;
use crate::llm::{CompletionRequest, CompletionResponse, ContentBlock, LlmClient, Message, StopReason, TokenUsage};
use crate::prompts::{FeedbackView, GeneratePromptContext, PromptLoader, SystemPromptContext};
use crate::tools::ToolExecutor;
use crate::tools::builtin::SearchInFileTool;

use super::{GenerationError, GenerationRequest, Generator, extract_artifact};

/// Generator that asks an `LlmClient` for the Dockerfile
pub struct LlmGenerator {
    llm: Arc<dyn LlmClient>,
    prompts: PromptLoader,
    max_turns: u32,
    max_tokens: u32,
}

impl LlmGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: PromptLoader, max_turns: u32, max_tokens: u32) -> Self {
        Self {
            llm,
            prompts,
            max_turns: max_turns.max(1),
            max_tokens,
        }
    }

    fn prompt_context(request: &GenerationRequest<'_>) -> GeneratePromptContext {
        let (size_bytes, content) = match request.context {
            SourceContext::Embedded { content, .. } => (content.len() as u64, Some(content.clone())),
            SourceContext::Searchable { size, .. } => (*size, None),
        };
        GeneratePromptContext {
            file_name: request.context.file_name().to_string(),
            language: request.context.language().to_string(),
            searchable: request.context.is_searchable(),
            size_bytes,
            content,
            input: request.example.input.clone(),
            expected_output: request.example.expected_output.clone(),
            iteration: request.iteration,
            max_iterations: request.max_iterations,
            feedback: request.feedback.map(|f| FeedbackView {
                kind: f.kind.to_string(),
                detail: f.detail.clone(),
            }),
            previous_artifact: request.previous_artifact.map(str::to_string),
        }
    }

    /// Run the conversation until the model stops asking for tools
    ///
    /// Returns the text of the final answer. Text produced before a tool call
    /// is scratch and discarded; text split by `MaxTokens` is concatenated.
    async fn run_tool_loop(
        &self,
        system_prompt: String,
        user_prompt: String,
        tools: &ToolExecutor,
    ) -> Result<String, GenerationError> {
        debug!(tool_count = tools.definitions().len(), "run_tool_loop: called");
        let tool_defs = tools.definitions();
        let mut messages = vec![Message::user(user_prompt)];
        let mut answer = String::new();
        let mut usage = TokenUsage::default();

        for turn in 1..=self.max_turns {
            debug!(turn, max_turns = self.max_turns, "run_tool_loop: turn start");
            let request = CompletionRequest {
                system_prompt: system_prompt.clone(),
                messages: messages.clone(),
                tools: tool_defs.clone(),
                max_tokens: self.max_tokens,
            };

            let response = self.llm.complete(request).await?;
            debug!(turn, stop_reason = ?response.stop_reason, "run_tool_loop: LLM response received");
            usage.add(&response.usage);
            messages.push(Self::build_assistant_message(&response));

            match response.stop_reason {
                StopReason::EndTurn | StopReason::StopSequence => {
                    if let Some(text) = &response.content {
                        answer.push_str(text);
                    }
                    info!(
                        turns = turn,
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        "Generation finished"
                    );
                    return Ok(answer);
                }
                StopReason::ToolUse if !response.tool_calls.is_empty() => {
                    debug!(turn, tool_count = response.tool_calls.len(), "run_tool_loop: LLM requested tool use");
                    answer.clear();
                    let results = tools.execute_all(&response.tool_calls).await;
                    let blocks = results
                        .iter()
                        .map(|(id, result)| ContentBlock::tool_result(id, &result.content, result.is_error))
                        .collect();
                    messages.push(Message::user_blocks(blocks));
                }
                StopReason::ToolUse => {
                    // Tool use without calls; treat whatever text came back as the answer
                    warn!(turn, "Model signalled tool use without any tool calls");
                    if let Some(text) = &response.content {
                        answer.push_str(text);
                    }
                    return Ok(answer);
                }
                StopReason::MaxTokens => {
                    debug!(turn, "run_tool_loop: LLM hit max tokens");
                    if let Some(text) = &response.content {
                        answer.push_str(text);
                    }
                    messages.push(Message::user(
                        "Continue from where you left off. Your previous response was truncated.",
                    ));
                }
            }
        }

        warn!("Max turns ({}) reached without a final answer", self.max_turns);
        Err(GenerationError::TurnLimit(self.max_turns))
    }

    fn build_assistant_message(response: &CompletionResponse) -> Message {
        let mut blocks = Vec::new();
        if let Some(text) = &response.content {
            blocks.push(ContentBlock::text(text));
        }
        for call in &response.tool_calls {
            blocks.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            });
        }
        Message::assistant_blocks(blocks)
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        debug!(
            iteration = request.iteration,
            searchable = request.context.is_searchable(),
            has_feedback = request.feedback.is_some(),
            "LlmGenerator::generate: called"
        );

        let mut tools = ToolExecutor::empty();
        if let Some(search) = &request.search {
            tools.add_tool(Box::new(SearchInFileTool::new(Arc::clone(search))));
        }

        let system_prompt = self
            .prompts
            .render(
                "system",
                &SystemPromptContext {
                    searchable: request.context.is_searchable(),
                },
            )
            .map_err(|e| GenerationError::Prompt(e.to_string()))?;
        let user_prompt = self
            .prompts
            .render("generate", &Self::prompt_context(&request))
            .map_err(|e| GenerationError::Prompt(e.to_string()))?;

        let response = self.run_tool_loop(system_prompt, user_prompt, &tools).await?;
        let artifact = extract_artifact(&response);
        if artifact.trim().is_empty() {
            debug!("LlmGenerator::generate: empty artifact after extraction");
            return Err(GenerationError::EmptyArtifact);
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{LanguageHint, SearchError, SearchQuery, SearchResult, SourceSearch};
    use crate::domain::ExampleUsage;
    use crate::llm::ToolCall;
    use crate::llm::client::mock::MockLlmClient;
    use crate::repair::{FailureKind, RepairFeedback};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex;

    const DOCKERFILE: &str = "FROM python:3.12-slim\nCOPY reverse.py /app/reverse.py\nCMD [\"python\", \"/app/reverse.py\"]\n";

    fn fenced_answer() -> CompletionResponse {
        CompletionResponse::text(format!("Here you go:\n```dockerfile\n{}```\nDone.", DOCKERFILE))
    }

    fn tool_use(pattern: &str) -> CompletionResponse {
        CompletionResponse {
            content: Some("Let me look at the imports.".to_string()),
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: "search_in_file".to_string(),
                input: json!({ "pattern": pattern }),
            }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::default(),
        }
    }

    fn embedded() -> SourceContext {
        SourceContext::Embedded {
            file_name: "reverse.py".to_string(),
            language: LanguageHint::Python,
            content: "import sys\nprint(' '.join(reversed(sys.stdin.read().split())))\n".to_string(),
        }
    }

    fn searchable() -> SourceContext {
        SourceContext::Searchable {
            path: PathBuf::from("/src/big.py"),
            file_name: "big.py".to_string(),
            size: 300_000,
            language: LanguageHint::Python,
        }
    }

    fn example() -> ExampleUsage {
        ExampleUsage::new("Hello world", "world Hello")
    }

    fn request<'a>(context: &'a SourceContext, example: &'a ExampleUsage) -> GenerationRequest<'a> {
        GenerationRequest {
            context,
            example,
            search: None,
            iteration: 1,
            max_iterations: 3,
            feedback: None,
            previous_artifact: None,
        }
    }

    fn generator(client: Arc<MockLlmClient>, max_turns: u32) -> LlmGenerator {
        LlmGenerator::new(client, PromptLoader::embedded_only(), max_turns, 4096)
    }

    /// Search stub that records the patterns it was asked for
    struct RecordingSearch {
        patterns: Mutex<Vec<String>>,
    }

    impl SourceSearch for RecordingSearch {
        fn search(&self, query: &SearchQuery) -> Result<SearchResult, SearchError> {
            self.patterns.lock().unwrap().push(query.pattern.clone());
            Ok(SearchResult::NoMatch)
        }
    }

    #[tokio::test]
    async fn test_embedded_generation_extracts_fence() {
        let client = Arc::new(MockLlmClient::new(vec![fenced_answer()]));
        let context = embedded();
        let example = example();

        let artifact = generator(client.clone(), 5).generate(request(&context, &example)).await.unwrap();

        assert_eq!(artifact, DOCKERFILE);
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_empty());
        assert!(requests[0].messages[0].text().contains("print(' '.join"));
    }

    #[tokio::test]
    async fn test_searchable_generation_uses_tool() {
        let client = Arc::new(MockLlmClient::new(vec![tool_use("^import"), fenced_answer()]));
        let search = Arc::new(RecordingSearch {
            patterns: Mutex::new(Vec::new()),
        });
        let context = searchable();
        let example = example();
        let mut req = request(&context, &example);
        req.search = Some(search.clone() as Arc<dyn SourceSearch>);

        let artifact = generator(client.clone(), 5).generate(req).await.unwrap();

        assert_eq!(artifact, DOCKERFILE);
        assert_eq!(*search.patterns.lock().unwrap(), vec!["^import".to_string()]);

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].tools[0].name, "search_in_file");
        assert!(!requests[0].messages[0].text().contains("import sys"));
        // Second turn carries the assistant tool call and the tool result
        assert_eq!(requests[1].messages.len(), 3);
        let crate::llm::MessageContent::Blocks(blocks) = &requests[1].messages[2].content else {
            panic!("expected tool result blocks");
        };
        assert!(matches!(
            &blocks[0],
            ContentBlock::ToolResult { tool_use_id, content, is_error: false }
                if tool_use_id == "call_1" && content == "No matches found."
        ));
    }

    #[tokio::test]
    async fn test_feedback_reaches_prompt() {
        let client = Arc::new(MockLlmClient::new(vec![fenced_answer()]));
        let context = embedded();
        let example = example();
        let feedback = RepairFeedback::new(FailureKind::Run, "ModuleNotFoundError: No module named 'yaml'");
        let mut req = request(&context, &example);
        req.iteration = 2;
        req.feedback = Some(&feedback);
        req.previous_artifact = Some("FROM python:3.12-alpine\n");

        generator(client.clone(), 5).generate(req).await.unwrap();

        let prompt = client.requests()[0].messages[0].text();
        assert!(prompt.contains("No module named 'yaml'"));
        assert!(prompt.contains("FROM python:3.12-alpine"));
        assert!(prompt.contains("run failure"));
    }

    #[tokio::test]
    async fn test_blank_response_is_empty_artifact() {
        let client = Arc::new(MockLlmClient::new(vec![CompletionResponse::text("```\n\n```")]));
        let context = embedded();
        let example = example();

        let result = generator(client, 5).generate(request(&context, &example)).await;
        assert!(matches!(result, Err(GenerationError::EmptyArtifact)));
    }

    #[tokio::test]
    async fn test_turn_limit() {
        let client = Arc::new(MockLlmClient::new(vec![tool_use("a"), tool_use("b"), tool_use("c")]));
        let search = Arc::new(RecordingSearch {
            patterns: Mutex::new(Vec::new()),
        });
        let context = searchable();
        let example = example();
        let mut req = request(&context, &example);
        req.search = Some(search as Arc<dyn SourceSearch>);

        let result = generator(client.clone(), 2).generate(req).await;
        assert!(matches!(result, Err(GenerationError::TurnLimit(2))));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_max_tokens_continuation_is_joined() {
        let first = CompletionResponse {
            content: Some("```dockerfile\nFROM python:3.12-slim\n".to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::MaxTokens,
            usage: TokenUsage::default(),
        };
        let second = CompletionResponse::text("CMD [\"python\"]\n```");
        let client = Arc::new(MockLlmClient::new(vec![first, second]));
        let context = embedded();
        let example = example();

        let artifact = generator(client.clone(), 5).generate(request(&context, &example)).await.unwrap();

        assert_eq!(artifact, "FROM python:3.12-slim\nCMD [\"python\"]\n");
        assert!(client.requests()[1].messages[2].text().contains("Continue from where you left off"));
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let client = Arc::new(MockLlmClient::new(vec![]));
        let context = embedded();
        let example = example();

        let result = generator(client, 5).generate(request(&context, &example)).await;
        assert!(matches!(result, Err(GenerationError::Llm(_))));
    }
}
