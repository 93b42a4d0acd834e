//! Dispatch of model-requested tool calls.
//!
//! Calls execute sequentially so provider load stays bounded and result
//! order stays deterministic. Every failure is absorbed into a tagged
//! [`ToolOutcome`]; nothing propagates past the registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};

use parley_core::config::ToolsConfig;

use crate::datetime::now_ist;
use crate::outcome::ToolOutcome;
use crate::providers::SearchProvider;
use crate::schema;

/// One tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Raw JSON argument object as the model produced it.
    pub arguments: String,
}

pub struct ToolRegistry {
    provider: Arc<dyn SearchProvider>,
    config: ToolsConfig,
}

impl ToolRegistry {
    pub fn new(provider: Arc<dyn SearchProvider>, config: ToolsConfig) -> Self {
        Self { provider, config }
    }

    /// Execute requested calls in order.
    ///
    /// The prompt asks the model for at most one call per tool name; a
    /// duplicate name is skipped with a warning rather than re-invoked.
    pub async fn execute_all(&self, calls: &[ToolInvocation]) -> Vec<ToolOutcome> {
        let mut seen = HashSet::new();
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            if !seen.insert(call.name.clone()) {
                warn!(tool = %call.name, "Duplicate tool call skipped");
                continue;
            }
            outcomes.push(self.execute(call).await);
        }
        outcomes
    }

    /// Execute a single call, converting any failure into a tagged outcome.
    pub async fn execute(&self, call: &ToolInvocation) -> ToolOutcome {
        info!(tool = %call.name, args = %call.arguments, "Executing tool");
        let started = Instant::now();

        let args: Value = match serde_json::from_str(arg_text(&call.arguments)) {
            Ok(v) => v,
            Err(e) => {
                return ToolOutcome::failure(
                    &call.name,
                    &call.id,
                    format!("invalid arguments for {}: {}", call.name, e),
                    elapsed_ms(started),
                );
            }
        };

        let result = self.dispatch(&call.name, &args).await;
        let elapsed = elapsed_ms(started);

        match result {
            Ok(payload) => {
                info!(tool = %call.name, elapsed_ms = elapsed, "Tool completed");
                ToolOutcome::success(&call.name, &call.id, payload, elapsed)
            }
            Err(e) => {
                warn!(tool = %call.name, elapsed_ms = elapsed, error = %e, "Tool failed");
                ToolOutcome::failure(&call.name, &call.id, e.to_string(), elapsed)
            }
        }
    }

    async fn dispatch(&self, name: &str, args: &Value) -> parley_core::Result<Value> {
        match name {
            schema::TOOL_GET_BIO => {
                let subject = required_str(args, "subject", name)?;
                let bio = self.provider.bio(subject).await?;
                Ok(Value::String(bio))
            }
            schema::TOOL_SEARCH_IMAGES => {
                let subject = required_str(args, "subject", name)?;
                let max = optional_count(args, "max_results", self.config.max_image_results);
                let hits = self.provider.images(subject, max).await?;
                Ok(serde_json::to_value(hits)?)
            }
            schema::TOOL_GET_NEWS => {
                let topic = required_str(args, "topic", name)?;
                let max = optional_count(args, "max_items", self.config.max_news_items);
                let items = self.provider.news(topic, max).await?;
                Ok(serde_json::to_value(items)?)
            }
            schema::TOOL_WEB_SEARCH => {
                let query = required_str(args, "query", name)?;
                let num = optional_count(args, "num_results", self.config.num_web_results);
                let hits = self.provider.web(query, num).await?;
                Ok(serde_json::to_value(hits)?)
            }
            schema::TOOL_GET_DATETIME => Ok(serde_json::to_value(now_ist())?),
            other => Err(parley_core::ParleyError::Tool(format!(
                "Unknown tool: {}",
                other
            ))),
        }
    }
}

fn arg_text(raw: &str) -> &str {
    if raw.trim().is_empty() {
        "{}"
    } else {
        raw
    }
}

fn required_str<'a>(args: &'a Value, field: &str, tool: &str) -> parley_core::Result<&'a str> {
    args[field].as_str().ok_or_else(|| {
        parley_core::ParleyError::Tool(format!("missing '{}' argument for {}", field, tool))
    })
}

fn optional_count(args: &Value, field: &str, default: u32) -> usize {
    args[field]
        .as_u64()
        .map(|n| n as usize)
        .unwrap_or(default as usize)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// =============================================================================
// Tests
// =============================================================================
