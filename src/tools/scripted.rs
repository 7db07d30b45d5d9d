//! Scripted tool for tests and offline runs
//!
//! Replays queued responses in order. The last queued response repeats once
//! the queue is down to one entry; a responder closure takes over when the
//! queue is empty.

use super::{field_has_content, value_has_content, Tool};
use crate::error::OrchestrationError;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Value(Value),
    /// Value plus a message, e.g. to carry the completion marker.
    Message(Value, String),
    Failure(String),
    Delayed(Duration, Box<ScriptedResponse>),
}

type Responder = dyn Fn(&ToolInput) -> ScriptedResponse + Send + Sync;

pub struct ScriptedTool {
    name: String,
    description: String,
    required_field: Option<String>,
    script: Mutex<VecDeque<ScriptedResponse>>,
    responder: Option<Box<Responder>>,
    calls: Mutex<Vec<ToolInput>>,
}

impl ScriptedTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required_field: None,
            script: Mutex::new(VecDeque::new()),
            responder: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then(mut self, response: ScriptedResponse) -> Self {
        self.script.get_mut().push_back(response);
        self
    }

    pub fn then_value(self, value: Value) -> Self {
        self.then(ScriptedResponse::Value(value))
    }

    pub fn then_message(self, value: Value, message: impl Into<String>) -> Self {
        self.then(ScriptedResponse::Message(value, message.into()))
    }

    pub fn then_error(self, message: impl Into<String>) -> Self {
        self.then(ScriptedResponse::Failure(message.into()))
    }

    pub fn then_delayed(self, delay: Duration, value: Value) -> Self {
        self.then(ScriptedResponse::Delayed(
            delay,
            Box::new(ScriptedResponse::Value(value)),
        ))
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ToolInput) -> ScriptedResponse + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Only values with content under `field` count as usable.
    pub fn requiring(mut self, field: impl Into<String>) -> Self {
        self.required_field = Some(field.into());
        self
    }

    pub async fn calls(&self) -> Vec<ToolInput> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    async fn next_response(&self, input: &ToolInput) -> Option<ScriptedResponse> {
        let mut script = self.script.lock().await;
        match script.len() {
            0 => self.responder.as_ref().map(|responder| responder(input)),
            1 if self.responder.is_none() => script.front().cloned(),
            _ => script.pop_front(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn has_content(&self, data: &Value) -> bool {
        match &self.required_field {
            Some(field) => field_has_content(data, field),
            None => value_has_content(data),
        }
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        self.calls.lock().await.push(input.clone());

        let mut response = self.next_response(input).await.ok_or_else(|| {
            OrchestrationError::ToolError(format!("{}: script exhausted", self.name))
        })?;

        loop {
            match response {
                ScriptedResponse::Value(value) => return Ok(ToolOutput::new(value)),
                ScriptedResponse::Message(value, message) => {
                    return Ok(ToolOutput::new(value).with_message(message))
                }
                ScriptedResponse::Failure(message) => {
                    return Err(OrchestrationError::ToolError(message))
                }
                ScriptedResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
            }
        }
    }
}
