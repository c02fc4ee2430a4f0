//! Documentation Tools

use serde::Deserialize;
use serde_json::Value;

use super::{finish, parse_args, ToolOutcome};
use crate::docs::faq;
use crate::mcp::context::ToolContext;
use crate::mcp::registry::{McpRegistry, RegisteredTool, ToolBuilder, ToolCategory, ToolResult};

const MAX_SEARCH_RESULTS: usize = 20;

/// Register documentation tools with the registry
pub fn register_tools(registry: &mut McpRegistry) {
    registry.register_tool(ask_sage_docs_tool());
    registry.register_tool(sage_faq_tool());
    registry.register_tool(search_sage_docs_tool());
}

#[derive(Debug, Deserialize)]
struct AskParams {
    #[serde(default)]
    question: String,
}

fn ask_sage_docs_tool() -> RegisteredTool {
    ToolBuilder::new("ask_sage_docs")
        .description("Ask a question about SAGE and get FAQ answers plus the most relevant documentation sections")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "question": {"type": "string"}
            },
            "required": ["question"]
        }))
        .category(ToolCategory::Read)
        .build(ask_sage_docs_handler)
}

async fn ask_sage_docs_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: AskParams = parse_args(args)?;
    finish(ask_sage_docs(&ctx, params))
}

fn ask_sage_docs(ctx: &ToolContext, params: AskParams) -> ToolOutcome {
    let question = params.question.trim();
    if question.is_empty() {
        return Ok(format!(
            "Please provide a specific question about SAGE. {}",
            faq::list_topics()
        ));
    }
    Ok(faq::answer(&ctx.services.docs, question))
}

#[derive(Debug, Deserialize)]
struct FaqParams {
    #[serde(default)]
    topic: String,
}

fn sage_faq_tool() -> RegisteredTool {
    ToolBuilder::new("sage_faq")
        .description(format!(
            "Answers to frequently asked questions about SAGE. Available topics: {}",
            faq::topics().collect::<Vec<_>>().join(", ")
        ))
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "topic": {"type": "string", "description": "FAQ topic; empty lists the topics"}
            }
        }))
        .category(ToolCategory::Read)
        .build(sage_faq_handler)
}

async fn sage_faq_handler(_ctx: ToolContext, args: Value) -> ToolResult {
    let params: FaqParams = parse_args(args)?;
    let topic = params.topic.trim();
    if topic.is_empty() {
        return finish(Ok(faq::list_topics()));
    }
    finish(Ok(faq::lookup(topic).unwrap_or_else(|| {
        format!(
            "Topic '{}' not found. Available topics: {}",
            topic,
            faq::topics().collect::<Vec<_>>().join(", ")
        )
    })))
}

fn default_max_results() -> usize {
    5
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn search_sage_docs_tool() -> RegisteredTool {
    ToolBuilder::new("search_sage_docs")
        .description("Search the SAGE documentation for topics, commands or concepts")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "max_results": {"type": "integer", "minimum": 1, "maximum": MAX_SEARCH_RESULTS, "default": 5}
            },
            "required": ["query"]
        }))
        .category(ToolCategory::Read)
        .build(search_sage_docs_handler)
}

async fn search_sage_docs_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: SearchParams = parse_args(args)?;
    finish(search_sage_docs(&ctx, params))
}

fn search_sage_docs(ctx: &ToolContext, params: SearchParams) -> ToolOutcome {
    let query = params.query.trim();
    if query.is_empty() {
        return Ok(
            "Please provide a search query. Examples: 'pluginctl commands', 'data API', 'job submission'"
                .to_string(),
        );
    }
    let max = params.max_results.clamp(1, MAX_SEARCH_RESULTS);
    let hits = ctx.services.docs.search(query, max);
    if hits.is_empty() {
        return Ok(format!(
            "No documentation found for '{}'. Try different keywords or check the FAQ topics.",
            query
        ));
    }

    let mut parts = vec![format!("Documentation search results for '{}':\n", query)];
    for (i, hit) in hits.iter().enumerate() {
        parts.push(format!("**{}. {}** (relevance: {})", i + 1, hit.title, hit.score));
        parts.push(hit.preview.clone());
        parts.push(String::new());
    }
    Ok(parts.join("\n"))
}
