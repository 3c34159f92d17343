//! System operations module
//!
//! All operations for system-level functionality.

use super::*;
use beemflow_core_macros::{operation, operation_group};
use schemars::JsonSchema;

#[operation_group(system)]
pub mod system {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Empty input (no parameters required)")]
    pub struct EmptyInput {}

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for retrieving OAuth provider configuration")]
    pub struct GetOAuthProviderInput {
        #[schemars(description = "Name of the OAuth provider")]
        pub name: String,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for triggering system-wide cron")]
    pub struct SystemCronInput {
        #[schemars(description = "Shared secret; required when CRON_SECRET is configured")]
        pub secret: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[schemars(description = "Input for triggering a workflow cron")]
    pub struct WorkflowCronInput {
        #[schemars(description = "Name of the workflow to trigger")]
        pub workflow: String,
        #[schemars(description = "Shared secret; required when CRON_SECRET is configured")]
        pub secret: Option<String>,
    }

    /// Show BeemFlow specification
    #[operation(
        name = "spec",
        input = EmptyInput,
        http = "GET /spec",
        cli = "spec",
        description = "Show BeemFlow specification"
    )]
    pub struct Spec {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Spec {
        type Input = EmptyInput;
        type Output = Value;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            // Read the SPEC.md file from docs directory
            let spec_content = include_str!("../../docs/SPEC.md");

            Ok(serde_json::json!({
                "name": "BeemFlow",
                "version": env!("CARGO_PKG_VERSION"),
                "description": "GitHub Actions for every business process",
                "spec": spec_content
            }))
        }
    }

    /// Root greeting
    #[operation(name = "root", input = EmptyInput, http = "GET /", description = "Root greeting")]
    pub struct Root {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for Root {
        type Input = EmptyInput;
        type Output = String;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            Ok("Hi, I'm BeemBeem! :D".to_string())
        }
    }

    /// Get registry index
    #[operation(name = "registry_index", input = EmptyInput, description = "Get registry index")]
    pub struct RegistryIndex {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for RegistryIndex {
        type Input = EmptyInput;
        type Output = Value;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            let entries = self.deps.registry_manager.list_all_servers().await?;

            // Separate tools and MCP servers
            let tools: Vec<_> = entries
                .iter()
                .filter(|e| e.entry_type == "tool")
                .cloned()
                .collect();

            let mcp_servers: Vec<_> = entries
                .iter()
                .filter(|e| e.entry_type == "mcp_server")
                .cloned()
                .collect();

            Ok(serde_json::json!({
                "version": "1.0.0",
                "runtime": "beemflow",
                "tools": tools,
                "mcp_servers": mcp_servers,
                "stats": {
                    "total_tools": tools.len(),
                    "total_mcp_servers": mcp_servers.len()
                }
            }))
        }
    }

    /// Get OAuth provider configuration
    #[operation(
        name = "get_oauth_provider",
        input = GetOAuthProviderInput,
        description = "Get OAuth provider configuration"
    )]
    pub struct GetOAuthProvider {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for GetOAuthProvider {
        type Input = GetOAuthProviderInput;
        type Output = Value;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            // Get OAuth provider from registry
            let provider_entry = self
                .deps
                .registry_manager
                .get_server(&input.name)
                .await?
                .ok_or_else(|| not_found("OAuth provider", &input.name))?;

            if provider_entry.entry_type != "oauth_provider" {
                return Err(type_mismatch(
                    &input.name,
                    "OAuth provider",
                    &provider_entry.entry_type,
                ));
            }

            Ok(serde_json::to_value(provider_entry)?)
        }
    }

    /// Triggers all workflows with schedule.cron
    #[operation(
        name = "system_cron",
        input = SystemCronInput,
        http = "POST /cron",
        description = "Triggers all workflows with schedule.cron"
    )]
    pub struct SystemCron {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for SystemCron {
        type Input = SystemCronInput;
        type Output = Value;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            if !self.deps.cron_manager.check_secret(input.secret.as_deref()) {
                return Err(crate::BeemFlowError::auth("invalid or missing cron secret"));
            }

            let result = self.deps.cron_manager.check_and_execute_cron_flows().await?;
            Ok(serde_json::to_value(result)?)
        }
    }

    /// Triggers a specific workflow
    #[operation(
        name = "workflow_cron",
        input = WorkflowCronInput,
        http = "POST /cron/{workflow}",
        description = "Triggers a specific workflow"
    )]
    pub struct WorkflowCron {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for WorkflowCron {
        type Input = WorkflowCronInput;
        type Output = Value;

        async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
            if !self.deps.cron_manager.check_secret(input.secret.as_deref()) {
                return Err(crate::BeemFlowError::auth("invalid or missing cron secret"));
            }

            let result = self
                .deps
                .cron_manager
                .check_and_execute_one(&input.workflow)
                .await?;
            Ok(serde_json::to_value(result)?)
        }
    }

    /// Generate OpenAPI 3.0 specification from all operations
    #[operation(
        name = "generate_openapi",
        input = EmptyInput,
        http = "GET /openapi.json",
        cli = "openapi",
        description = "Generate OpenAPI 3.0 specification from all operations"
    )]
    pub struct GenerateOpenAPI {
        pub deps: Arc<Dependencies>,
    }

    #[async_trait]
    impl Operation for GenerateOpenAPI {
        type Input = EmptyInput;
        type Output = Value;

        async fn execute(&self, _input: Self::Input) -> Result<Self::Output> {
            // Get all operation metadata
            let registry = OperationRegistry::new((*self.deps).clone());
            let metadata = registry.get_all_metadata();

            // Build paths object and collect unique groups for tags
            let mut paths = serde_json::Map::new();
            let mut groups = std::collections::HashSet::new();

            for (op_name, meta) in metadata {
                groups.insert(meta.group);
                // Skip operations without HTTP endpoints
                if meta.http_method.is_none() || meta.http_path.is_none() {
                    continue;
                }

                let method = meta.http_method.unwrap().to_lowercase();
                let path = meta.http_path.unwrap();

                // Get or create path item
                let path_item = paths
                    .entry(path.to_string())
                    .or_insert_with(|| serde_json::json!({}))
                    .as_object_mut()
                    .unwrap();

                // Extract path parameters
                let parameters = extract_path_parameters(path);

                // Create operation object
                let operation = serde_json::json!({
                    "summary": meta.description,
                    "operationId": op_name,
                    "tags": [meta.group],
                    "parameters": parameters,
                    "requestBody": {
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "properties": {},
                                    "additionalProperties": true
                                }
                            }
                        }
                    },
                    "responses": {
                        "200": {
                            "description": "Successful response",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object"
                                    }
                                }
                            }
                        },
                        "400": {
                            "description": "Bad request",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "$ref": "#/components/schemas/Error"
                                    }
                                }
                            }
                        },
                        "404": {
                            "description": "Not found",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "$ref": "#/components/schemas/Error"
                                    }
                                }
                            }
                        },
                        "500": {
                            "description": "Internal server error",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "$ref": "#/components/schemas/Error"
                                    }
                                }
                            }
                        }
                    }
                });

                path_item.insert(method, operation);
            }

            // Convert groups to tags with auto-generated descriptions
            let mut tags: Vec<_> = groups
                .into_iter()
                .map(|group| {
                    serde_json::json!({
                        "name": group,
                        "description": format!("{} operations", group)
                    })
                })
                .collect();
            tags.sort_by(|a, b| {
                a.get("name")
                    .and_then(|v| v.as_str())
                    .cmp(&b.get("name").and_then(|v| v.as_str()))
            });

            // Build full OpenAPI spec
            Ok(serde_json::json!({
                "openapi": "3.0.0",
                "info": {
                    "title": "BeemFlow API",
                    "version": env!("CARGO_PKG_VERSION"),
                    "description": "GitHub Actions for every business process - Complete REST API for workflow orchestration",
                    "contact": {
                        "name": "BeemFlow",
                        "url": "https://github.com/beemflow/beemflow"
                    }
                },
                "servers": [
                    {
                        "url": "http://localhost:3000",
                        "description": "Local development server"
                    }
                ],
                "paths": paths,
                "components": {
                    "schemas": {
                        "Error": {
                            "type": "object",
                            "properties": {
                                "error": {
                                    "type": "object",
                                    "properties": {
                                        "type": {
                                            "type": "string",
                                            "description": "Error type"
                                        },
                                        "message": {
                                            "type": "string",
                                            "description": "Error message"
                                        },
                                        "status": {
                                            "type": "integer",
                                            "description": "HTTP status code"
                                        }
                                    },
                                    "required": ["type", "message", "status"]
                                }
                            },
                            "required": ["error"]
                        }
                    }
                },
                "tags": tags
            }))
        }
    }
}

/// Extract path parameters from a path template
fn extract_path_parameters(path: &str) -> Vec<Value> {
    let mut params = Vec::new();

    for part in path.split('/') {
        if part.starts_with('{') && part.ends_with('}') {
            let param_name = &part[1..part.len() - 1];
            params.push(serde_json::json!({
                "name": param_name,
                "in": "path",
                "required": true,
                "schema": {
                    "type": "string"
                },
                "description": format!("The {}", param_name)
            }));
        }
    }

    params
}
