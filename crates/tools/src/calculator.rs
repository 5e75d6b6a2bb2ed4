//! Arithmetic tool operating on two numbers and an operation tag.
//!
//! Faults surface as structured error payloads so the model can read them
//! and recover; they never abort the turn.

use async_trait::async_trait;
use chatloom_core::error::ToolError;
use chatloom_core::tool::{Tool, ToolResult};

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform a basic arithmetic operation on two numbers. \
         Supported operations: add, sub, mul, div."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "first_num": {
                    "type": "number",
                    "description": "The first operand"
                },
                "second_num": {
                    "type": "number",
                    "description": "The second operand"
                },
                "operation": {
                    "type": "string",
                    "enum": ["add", "sub", "mul", "div"],
                    "description": "The operation to perform"
                }
            },
            "required": ["first_num", "second_num", "operation"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let first_num = arguments["first_num"]
            .as_f64()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'first_num' argument".into()))?;
        let second_num = arguments["second_num"]
            .as_f64()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'second_num' argument".into()))?;
        let operation = arguments["operation"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'operation' argument".into()))?;

        let result = match operation {
            "add" => first_num + second_num,
            "sub" => first_num - second_num,
            "mul" => first_num * second_num,
            "div" => {
                if second_num == 0.0 {
                    let payload =
                        serde_json::json!({ "error": "Division by zero is not allowed" });
                    return Ok(ToolResult::error(payload.to_string()).with_data(payload));
                }
                first_num / second_num
            }
            other => {
                let payload =
                    serde_json::json!({ "error": format!("unsupported operation '{other}'") });
                return Ok(ToolResult::error(payload.to_string()).with_data(payload));
            }
        };

        let payload = serde_json::json!({
            "first_num": first_num,
            "second_num": second_num,
            "operation": operation,
            "result": result,
        });

        Ok(ToolResult::ok(payload.to_string()).with_data(payload))
    }
}
