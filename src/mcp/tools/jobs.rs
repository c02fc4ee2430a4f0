//! Job Tools
//!
//! Submitting jobs to the edge scheduler and managing them afterwards.
//! Every tool here acts on the caller's behalf and needs credentials.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{
    finish, parse_args, plugins::plugin_recommendations, string_or_number, ToolFailure,
    ToolOutcome,
};
use crate::auth::SageCredentials;
use crate::data::parse_node_list;
use crate::jobs::models::{cron_rule, every_minutes};
use crate::jobs::templates::{self, TemplateKind};
use crate::jobs::{
    validate_job_id, JobError, JobSpec, PluginArguments, PluginSpec, RemoveMode,
    SelectorRequirements,
};
use crate::mcp::context::ToolContext;
use crate::mcp::registry::{
    Access, McpRegistry, RegisteredTool, ToolBuilder, ToolCategory, ToolResult,
};

/// Interval of the rule given to custom images submitted without one.
const DEFAULT_RULE_INTERVAL_MINS: u32 = 10;

/// Register job tools with the registry
pub fn register_tools(registry: &mut McpRegistry) {
    registry.register_tool(submit_sage_job_tool());
    registry.register_tool(submit_plugin_job_tool());
    registry.register_tool(submit_multi_plugin_job_tool());
    registry.register_tool(check_job_status_tool());
    registry.register_tool(force_remove_job_tool());
    registry.register_tool(suspend_job_tool());
}

fn job_tool(name: &str) -> ToolBuilder {
    ToolBuilder::new(name)
        .access(Access::Authenticated)
        .category(ToolCategory::Write)
}

impl From<JobError> for ToolFailure {
    fn from(e: JobError) -> Self {
        match e {
            JobError::Unauthenticated(message) => ToolFailure(format!(
                "❌ Authentication required: Please provide a valid SAGE token.\nError: {}",
                message
            )),
            other => ToolFailure(format!("❌ {}", other)),
        }
    }
}

/// Submits `job` and renders the scheduler's answer.
async fn submit(ctx: &ToolContext, credentials: &SageCredentials, job: JobSpec) -> ToolOutcome {
    let dry_run = ctx.settings.dry_run;
    info!(
        "Submitting job {} with {} plugin(s) to {} node(s){}",
        job.name,
        job.plugins.len(),
        job.nodes.len(),
        if dry_run { " (dry run)" } else { "" }
    );

    let outcome = ctx
        .services
        .scheduler
        .submit(credentials, &job, dry_run)
        .await
        .map_err(|e| match e {
            JobError::Unauthenticated(_) => ToolFailure::from(e),
            other => ToolFailure(format!("❌ Job submission failed:\n{}", other)),
        })?;

    let (verb, status) = if dry_run {
        ("validated", "Dry-run completed successfully!")
    } else {
        ("submitted", "Submitted")
    };
    let nodes = job.nodes.join(", ");
    Ok(match outcome.job_id {
        Some(id) => format!(
            "✅ Job {} successfully!\nJob ID: {}\nJob Name: {}\nNodes: {}\nStatus: {}\n\n\
             Use check_job_status({}) to monitor progress.",
            verb, id, job.name, nodes, status, id
        ),
        None => {
            warn!("Scheduler reply carried no job id: {}", outcome.raw);
            format!(
                "✅ Job {} successfully!\nResponse: {}\nJob Name: {}\nNodes: {}\nStatus: {}",
                verb, outcome.raw, job.name, nodes, status
            )
        }
    })
}

fn job_name(raw: &str) -> Result<&str, ToolFailure> {
    let name = raw.trim();
    if name.is_empty() {
        Err(ToolFailure("❌ job_name must not be empty".to_string()))
    } else {
        Ok(name)
    }
}

// ============================================================================
// submit_sage_job
// ============================================================================

#[derive(Debug, Deserialize)]
struct SubmitJobParams {
    job_name: String,
    #[serde(default)]
    nodes: String,
    #[serde(default)]
    plugin_image: String,
    #[serde(default)]
    plugin_args: String,
    #[serde(default)]
    science_rules: String,
    #[serde(default)]
    selector_requirements: String,
}

fn submit_sage_job_tool() -> RegisteredTool {
    job_tool("submit_sage_job")
        .description("Submit a job running a custom plugin image on SAGE nodes. Without plugin_image, the job name is treated as a task description and matching plugins are recommended. For ready-made plugins prefer submit_plugin_job or submit_multi_plugin_job")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "job_name": {"type": "string", "description": "Job name, or a task description when plugin_image is empty"},
                "nodes": {"type": "string", "description": "Comma separated node ids, e.g. W023,W027"},
                "plugin_image": {"type": "string", "description": "e.g. registry.sagecontinuum.org/theone/imagesampler:0.3.1"},
                "plugin_args": {"type": "string", "description": "JSON object or comma separated key=value pairs"},
                "science_rules": {"type": "string", "description": "One rule per line; defaults to running every 10 minutes"},
                "selector_requirements": {"type": "string", "description": "JSON object, e.g. {\"resource.gpu\": \"true\"} or {\"gpu\": true}"}
            },
            "required": ["job_name"]
        }))
        .build(submit_sage_job_handler)
}

async fn submit_sage_job_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: SubmitJobParams = parse_args(args)?;
    let credentials = ctx.require_credentials()?.clone();
    finish(submit_sage_job(&ctx, &credentials, params).await)
}

async fn submit_sage_job(
    ctx: &ToolContext,
    credentials: &SageCredentials,
    params: SubmitJobParams,
) -> ToolOutcome {
    let name = job_name(&params.job_name)?;
    let image = params.plugin_image.trim();
    if image.is_empty() {
        let mut out = plugin_recommendations(ctx, name).await?;
        out.push_str("\n\n💡 TIP: For easier job submission, try:\n");
        out.push_str("• submit_plugin_job(plugin_type, job_name, nodes, plugin_args)\n");
        out.push_str("• submit_multi_plugin_job(job_name, nodes, plugins_config)\n");
        out.push_str("\nThese tools handle all the configuration automatically!");
        return Ok(out);
    }

    let nodes = parse_node_list(&params.nodes).map_err(JobError::from)?;
    let plugin = PluginSpec::new(name, image)
        .args(PluginArguments::parse(&params.plugin_args)?)
        .selector(SelectorRequirements::parse_json(&params.selector_requirements)?);

    let rules: Vec<String> = params
        .science_rules
        .lines()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect();
    let mut job = JobSpec::new(name, nodes).plugin(plugin);
    if rules.is_empty() {
        job = job.rule(cron_rule(name, &every_minutes(DEFAULT_RULE_INTERVAL_MINS)));
    } else {
        job.science_rules = rules;
    }
    submit(ctx, credentials, job).await
}

// ============================================================================
// submit_plugin_job
// ============================================================================

#[derive(Debug, Deserialize)]
struct PluginJobParams {
    plugin_type: String,
    job_name: String,
    nodes: String,
    #[serde(default)]
    plugin_args: Value,
}

fn submit_plugin_job_tool() -> RegisteredTool {
    job_tool("submit_plugin_job")
        .description(format!(
            "Submit a job from a ready-made plugin template. Available types: {}. \
             Camera and lidar templates need device credentials in plugin_args",
            TemplateKind::names()
        ))
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "plugin_type": {"type": "string", "description": "Template name, e.g. image_sampler"},
                "job_name": {"type": "string"},
                "nodes": {"type": "string", "description": "Comma separated node ids"},
                "plugin_args": {
                    "description": "Template parameters as a JSON object (or a JSON string), e.g. {\"interval_mins\": 15}",
                    "type": ["object", "string", "null"]
                }
            },
            "required": ["plugin_type", "job_name", "nodes"]
        }))
        .build(submit_plugin_job_handler)
}

async fn submit_plugin_job_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: PluginJobParams = parse_args(args)?;
    let credentials = ctx.require_credentials()?.clone();
    finish(submit_plugin_job(&ctx, &credentials, params).await)
}

/// Template arguments may arrive as an object or as JSON text.
fn template_args(raw: Value) -> Result<Value, ToolFailure> {
    match raw {
        Value::String(text) if text.trim().is_empty() => Ok(Value::Null),
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| ToolFailure(format!("❌ plugin_args is not valid JSON: {}", e))),
        other => Ok(other),
    }
}

async fn submit_plugin_job(
    ctx: &ToolContext,
    credentials: &SageCredentials,
    params: PluginJobParams,
) -> ToolOutcome {
    let kind = TemplateKind::parse(&params.plugin_type).ok_or_else(|| {
        ToolFailure(format!(
            "❌ Unknown plugin type '{}'. Available types: {}",
            params.plugin_type,
            TemplateKind::names()
        ))
    })?;
    let name = job_name(&params.job_name)?;
    let nodes = parse_node_list(&params.nodes).map_err(JobError::from)?;
    let args = template_args(params.plugin_args)?;
    let job = templates::build(kind, name, nodes, &args)?;
    submit(ctx, credentials, job).await
}

// ============================================================================
// submit_multi_plugin_job
// ============================================================================

#[derive(Debug, Deserialize)]
struct MultiPluginJobParams {
    job_name: String,
    nodes: String,
    plugins_config: String,
}

fn submit_multi_plugin_job_tool() -> RegisteredTool {
    job_tool("submit_multi_plugin_job")
        .description("Submit a job running several plugin templates together. plugins_config is a JSON array such as [{\"plugin_type\": \"cloud_cover\", \"args\": {\"interval_mins\": 10}}, {\"plugin_type\": \"solar_irradiance\"}] or a preset such as {\"preset\": \"ml_suite\", \"cloud_cover_interval\": 10}")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "job_name": {"type": "string"},
                "nodes": {"type": "string", "description": "Comma separated node ids"},
                "plugins_config": {"type": "string", "description": "JSON array of {plugin_type, args} or a preset object"}
            },
            "required": ["job_name", "nodes", "plugins_config"]
        }))
        .build(submit_multi_plugin_job_handler)
}

async fn submit_multi_plugin_job_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: MultiPluginJobParams = parse_args(args)?;
    let credentials = ctx.require_credentials()?.clone();
    finish(submit_multi_plugin_job(&ctx, &credentials, params).await)
}

async fn submit_multi_plugin_job(
    ctx: &ToolContext,
    credentials: &SageCredentials,
    params: MultiPluginJobParams,
) -> ToolOutcome {
    let name = job_name(&params.job_name)?;
    let nodes = parse_node_list(&params.nodes).map_err(JobError::from)?;
    let job = templates::build_multi(name, nodes, &params.plugins_config)?;
    submit(ctx, credentials, job).await
}

// ============================================================================
// check_job_status / force_remove_job / suspend_job
// ============================================================================

#[derive(Debug, Deserialize)]
struct JobIdParams {
    #[serde(deserialize_with = "string_or_number")]
    job_id: String,
}

fn job_id_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "job_id": {"type": ["string", "integer"], "description": "Job id returned at submission"}
        },
        "required": ["job_id"]
    })
}

fn check_job_status_tool() -> RegisteredTool {
    // Polling status must not eat into the budget for submissions.
    job_tool("check_job_status")
        .category(ToolCategory::Read)
        .description("Check the status of a submitted SAGE job")
        .input_schema(job_id_schema())
        .build(check_job_status_handler)
}

async fn check_job_status_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: JobIdParams = parse_args(args)?;
    let credentials = ctx.require_credentials()?.clone();
    finish(check_job_status(&ctx, &credentials, params).await)
}

async fn check_job_status(
    ctx: &ToolContext,
    credentials: &SageCredentials,
    params: JobIdParams,
) -> ToolOutcome {
    let id = validate_job_id(&params.job_id)?;
    let raw = ctx
        .services
        .scheduler
        .status(credentials, id)
        .await
        .map_err(|e| ToolFailure(format!("❌ Error checking job status:\n{}", e)))?;

    let body = match serde_json::from_str::<Value>(&raw) {
        Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(raw),
        Err(_) => raw,
    };
    Ok(format!("📊 Job Status (ID: {}):\n{}", id, body))
}

fn force_remove_job_tool() -> RegisteredTool {
    job_tool("force_remove_job")
        .description("Force remove a job from the scheduler")
        .input_schema(job_id_schema())
        .build(force_remove_job_handler)
}

async fn force_remove_job_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: JobIdParams = parse_args(args)?;
    let credentials = ctx.require_credentials()?.clone();
    finish(remove_job(&ctx, &credentials, params, RemoveMode::Force).await)
}

fn suspend_job_tool() -> RegisteredTool {
    job_tool("suspend_job")
        .description("Suspend a job; it stays known to the scheduler and can be resumed")
        .input_schema(job_id_schema())
        .build(suspend_job_handler)
}

async fn suspend_job_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: JobIdParams = parse_args(args)?;
    let credentials = ctx.require_credentials()?.clone();
    finish(remove_job(&ctx, &credentials, params, RemoveMode::Suspend).await)
}

async fn remove_job(
    ctx: &ToolContext,
    credentials: &SageCredentials,
    params: JobIdParams,
    mode: RemoveMode,
) -> ToolOutcome {
    let id = validate_job_id(&params.job_id)?;
    info!("Job {}: {:?} requested by {}", id, mode, ctx.caller());

    let result = ctx.services.scheduler.remove(credentials, id, mode).await;
    match (mode, result) {
        (RemoveMode::Force, Ok(output)) => Ok(format!(
            "✅ Job {} removed successfully!\nOutput: {}",
            id, output
        )),
        (RemoveMode::Suspend, Ok(output)) => Ok(format!(
            "⏸️ Job {} suspended successfully!\nOutput: {}",
            id, output
        )),
        (RemoveMode::Force, Err(e)) => Err(ToolFailure(format!(
            "❌ Error removing job {}:\n{}",
            id, e
        ))),
        (RemoveMode::Suspend, Err(e)) => Err(ToolFailure(format!(
            "❌ Error suspending job {}:\n{}",
            id, e
        ))),
    }
}
