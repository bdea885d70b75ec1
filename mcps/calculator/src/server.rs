use mcp_common::{
    async_trait, invalid_params, json_success, EmbeddableError, EmbeddableMcp, EmbeddableResult,
    McpError, ServerConfigFile,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo, Tool},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const DESCRIPTION: &str = "Calculator - add, subtract, multiply and divide two numbers.";

#[derive(Clone)]
pub struct CalculatorServer {
    settings: CalculatorSettings,
    tool_router: ToolRouter<Self>,
}

/// Contents of `<config dir>/calculator/config.json`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculatorSettings {
    /// Round results to this many decimal places
    #[serde(default)]
    pub decimal_places: Option<u32>,
}

impl CalculatorSettings {
    /// Load saved settings, falling back to defaults on any failure
    pub fn load() -> Self {
        match ServerConfigFile::for_server("calculator").and_then(|file| file.load()) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Using default settings: {:#}", e);
                Self::default()
            }
        }
    }

    fn round(&self, value: f64) -> f64 {
        match self.decimal_places {
            Some(places) => {
                let factor = 10f64.powi(places.min(15) as i32);
                (value * factor).round() / factor
            }
            None => value,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct BinaryOpParams {
    #[schemars(description = "Left operand")]
    pub a: f64,
    #[schemars(description = "Right operand")]
    pub b: f64,
}

#[tool_router]
impl CalculatorServer {
    pub fn new() -> Self {
        Self::with_settings(CalculatorSettings::load())
    }

    pub fn with_settings(settings: CalculatorSettings) -> Self {
        Self {
            settings,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Add two numbers")]
    async fn add(
        &self,
        Parameters(params): Parameters<BinaryOpParams>,
    ) -> Result<CallToolResult, McpError> {
        self.answer("add", params, params.a + params.b)
    }

    #[tool(description = "Subtract b from a")]
    async fn subtract(
        &self,
        Parameters(params): Parameters<BinaryOpParams>,
    ) -> Result<CallToolResult, McpError> {
        self.answer("subtract", params, params.a - params.b)
    }

    #[tool(description = "Multiply two numbers")]
    async fn multiply(
        &self,
        Parameters(params): Parameters<BinaryOpParams>,
    ) -> Result<CallToolResult, McpError> {
        self.answer("multiply", params, params.a * params.b)
    }

    #[tool(description = "Divide a by b. b must not be zero")]
    async fn divide(
        &self,
        Parameters(params): Parameters<BinaryOpParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.b == 0.0 {
            tracing::warn!("Rejected division of {} by zero", params.a);
            return Err(invalid_params("Division by zero: b must not be 0"));
        }
        self.answer("divide", params, params.a / params.b)
    }
}

impl CalculatorServer {
    /// Wrap a computed value, rejecting overflow to infinity
    fn answer(
        &self,
        op: &str,
        params: BinaryOpParams,
        result: f64,
    ) -> Result<CallToolResult, McpError> {
        if !result.is_finite() {
            return Err(invalid_params(format!(
                "{} of {} and {} is not a finite number",
                op, params.a, params.b
            )));
        }
        let result = self.settings.round(result);
        tracing::info!("{}({}, {}) = {}", op, params.a, params.b, result);
        json_success(&json!({ "result": result }))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for CalculatorServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(DESCRIPTION.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

impl Default for CalculatorServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddableMcp for CalculatorServer {
    fn server_name(&self) -> &str {
        "calculator"
    }

    fn server_description(&self) -> Option<&str> {
        Some(DESCRIPTION)
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult> {
        let op = match name {
            "add" | "subtract" | "multiply" | "divide" => name,
            _ => return Err(EmbeddableError::ToolNotFound(name.to_string())),
        };
        let params = Parameters(serde_json::from_value::<BinaryOpParams>(params)?);

        let result = match op {
            "add" => self.add(params).await,
            "subtract" => self.subtract(params).await,
            "multiply" => self.multiply(params).await,
            _ => self.divide(params).await,
        };
        result.map_err(Into::into)
    }
}
