//! MCP Prompts
//!
//! Canned conversation starters for common SAGE tasks.

use super::protocol::PromptMessage;
use super::registry::{McpRegistry, PromptBuilder, RegisteredPrompt};

/// Register all prompts with the registry
pub fn register_all_prompts(registry: &mut McpRegistry) {
    for &(name, description, text) in PROMPTS {
        registry.register_prompt(static_prompt(name, description, text));
    }
}

/// Prompts without arguments that expand to a single user message.
const PROMPTS: &[(&str, &str, &str)] = &[
    (
        "summarize_temperature_anomalies",
        "Analyze temperature anomalies",
        "Can you summarize any temperature anomalies from the past hour?",
    ),
    (
        "suggest_image_sampler_cron",
        "Help writing a cron science rule",
        "Help me write a scienceRule cron expression for the image-sampler plugin \
         that samples every 10 minutes between 6am and 6pm.",
    ),
    (
        "suggest_environmental_job",
        "Set up an environmental monitoring job",
        "I want to monitor environmental conditions (temperature, humidity, pressure) \
         across all nodes. What kind of job should I set up?",
    ),
    (
        "getting_started_guide",
        "Walkthrough for new SAGE users: account, data access and first steps",
        "I'm new to SAGE and want to get started. Can you walk me through:\n\
         1. How to create an account and get access\n\
         2. How to explore available data and sensors\n\
         3. How to access data using the Python client\n\
         4. How to submit my first job\n\
         5. How to monitor job status and results\n\n\
         Please provide step-by-step instructions with examples.",
    ),
    (
        "plugin_development_guide",
        "Guide for creating custom SAGE plugins (edge apps)",
        "I want to create a custom SAGE plugin (edge app). Please guide me through:\n\
         1. Plugin architecture and requirements\n\
         2. Setting up the development environment\n\
         3. Using the cookiecutter template\n\
         4. PyWaggle integration for sensors and data publishing\n\
         5. Docker container setup and Dockerfile best practices\n\
         6. Testing with pluginctl on development nodes\n\
         7. Publishing to the Edge Code Repository (ECR)\n\
         8. Job submission and scheduling\n\n\
         Include code examples and common troubleshooting tips.",
    ),
    (
        "data_analysis_guide",
        "Guide for accessing, querying and analyzing SAGE data",
        "I want to work with SAGE data for analysis. Please help me understand:\n\
         1. What types of data are available (sensors, measurements, etc.)\n\
         2. How to use the Python sage-data-client for queries\n\
         3. How to filter data by time, location, and sensor type\n\
         4. How to access uploaded files (images, audio)\n\
         5. How to work with protected data and authentication\n\
         6. Best practices for data analysis and visualization\n\
         7. How to set up triggers and real-time monitoring\n\n\
         Provide practical examples with code snippets.",
    ),
    (
        "troubleshooting_guide",
        "Troubleshooting help for common SAGE issues",
        "I'm having issues with SAGE and need troubleshooting help. Please provide guidance for:\n\
         1. Plugin/edge app development issues (build failures, runtime errors)\n\
         2. Job submission and scheduling problems\n\
         3. Data access and query issues\n\
         4. Node access and SSH connection problems\n\
         5. ECR submission and publication issues\n\
         6. Common error messages and their solutions\n\
         7. How to get help and contact support\n\n\
         Include diagnostic commands and debugging techniques.",
    ),
];

fn static_prompt(name: &str, description: &str, text: &'static str) -> RegisteredPrompt {
    PromptBuilder::new(name, description).build(move |_args| Ok(vec![PromptMessage::user(text)]))
}
