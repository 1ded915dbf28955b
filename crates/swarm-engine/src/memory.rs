//! Shared per-run memory: context, reasoning trace, confidence scores.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the append-only audit log. Insertion order is meaningful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: String,
    pub agent: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Mutable context shared across one workflow execution.
///
/// Owned exclusively by the engine for the run's lifetime; its final
/// contents are copied into the `WorkflowResult` and the instance is
/// dropped. Context keys are set or overwritten, never deleted.
#[derive(Debug, Default)]
pub struct AgentMemory {
    context: HashMap<String, Value>,
    reasoning_trace: Vec<TraceEntry>,
    confidence_scores: HashMap<String, f64>,
}

impl AgentMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the context before the first step runs.
    pub fn with_context(context: HashMap<String, Value>) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn context(&self) -> &HashMap<String, Value> {
        &self.context
    }

    pub fn record_trace(&mut self, step: impl Into<String>, agent: impl Into<String>, payload: Value) {
        self.reasoning_trace.push(TraceEntry {
            step: step.into(),
            agent: agent.into(),
            payload,
            timestamp: Utc::now(),
        });
    }

    pub fn reasoning_trace(&self) -> &[TraceEntry] {
        &self.reasoning_trace
    }

    /// Record a step's confidence, clamped to `[0, 1]`.
    pub fn set_confidence(&mut self, step: impl Into<String>, confidence: f64) {
        self.confidence_scores
            .insert(step.into(), confidence.clamp(0.0, 1.0));
    }

    pub fn confidence(&self, step: &str) -> Option<f64> {
        self.confidence_scores.get(step).copied()
    }

    /// Arithmetic mean over the given steps' reported confidences.
    ///
    /// Steps that never reported a confidence do not contribute; if none of
    /// them reported, the aggregate is 0.0.
    pub fn mean_confidence<'a>(&self, steps: impl IntoIterator<Item = &'a str>) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for step in steps {
            if let Some(score) = self.confidence_scores.get(step) {
                sum += score;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }
}
