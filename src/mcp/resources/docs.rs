//! Documentation Resources

use crate::docs::faq;
use crate::mcp::context::ToolContext;
use crate::mcp::protocol::{McpError, ResourceContent};
use crate::mcp::registry::{
    McpRegistry, RegisteredResource, ResourceBuilder, ResourceRequest, ResourceResult,
};

/// Register documentation resources with the registry
pub fn register_resources(registry: &mut McpRegistry) {
    registry.register_resource(faq_resource());
}

// ============================================================================
// docs://faq/{topic}
// ============================================================================

fn faq_resource() -> RegisteredResource {
    ResourceBuilder::new("docs://faq/{topic}", "SAGE FAQ")
        .description(format!(
            "Answer to a frequently asked question. Topics: {}",
            faq::topics().collect::<Vec<_>>().join(", ")
        ))
        .mime_type("text/markdown")
        .build(faq_handler)
}

async fn faq_handler(_ctx: ToolContext, request: ResourceRequest) -> ResourceResult {
    let answer = request
        .param("topic")
        .and_then(faq::lookup)
        .ok_or_else(|| McpError::ResourceNotFound(request.uri.clone()))?;
    Ok(vec![ResourceContent::text(request.uri, "text/markdown", answer)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::test_support::Fixture;

    #[tokio::test]
    async fn test_faq_resource() {
        let mut registry = McpRegistry::new();
        register_resources(&mut registry);
        assert_eq!(registry.get_resource_templates().len(), 1);

        let (resource, request) = registry.find_resource("docs://faq/sensors").unwrap();
        let contents = (resource.handler)(Fixture::new().context(), request)
            .await
            .unwrap();
        assert!(contents[0].text.starts_with("**What sensors are available in SAGE?**"));

        let (resource, request) = registry.find_resource("docs://faq/weather").unwrap();
        let err = (resource.handler)(Fixture::new().context(), request)
            .await
            .unwrap_err();
        assert_eq!(err, McpError::ResourceNotFound("docs://faq/weather".to_string()));
    }
}
