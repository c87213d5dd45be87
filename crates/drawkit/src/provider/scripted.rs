//! In-memory provider for pipeline tests.

use super::{ModelCall, Provider};
use drawkit_core::generation::ModelReply;
use drawkit_core::DiagramError;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ModelReply, DiagramError>>>,
    repeat: Option<ModelReply>,
    delay: Option<Duration>,
    calls: Mutex<Vec<ModelCall>>,
}

impl ScriptedProvider {
    /// Replies are handed out in order; running out is a provider error.
    pub fn new(replies: Vec<Result<ModelReply, DiagramError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            repeat: None,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same reply.
    pub fn always(reply: ModelReply) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, call: &ModelCall) -> Result<ModelReply, DiagramError> {
        self.calls.lock().unwrap().push(call.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reply) = &self.repeat {
            return Ok(reply.clone());
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(DiagramError::Provider("script exhausted".to_string())))
    }
}
