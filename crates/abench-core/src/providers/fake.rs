//! Scripted providers for tests and offline dry runs.

use crate::model::{Assessment, AssessmentLabel, Role, Transcript};
use crate::providers::chat::ChatClient;
use crate::providers::golden::GoldenClient;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One scripted outcome per assistant id.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Complete immediately with this answer text.
    Text(String),
    /// Fail with this error message.
    Fail(String),
    /// Never complete; the caller's timeout fires.
    Hang,
}

#[derive(Default)]
pub struct ScriptedChatClient {
    replies: HashMap<String, ScriptedReply>,
    calls: AtomicUsize,
}

impl ScriptedChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, assistant_id: &str, reply: ScriptedReply) -> Self {
        self.replies.insert(assistant_id.to_string(), reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn transcript(assistant_id: &str, question: &str, text: &str, call: usize) -> Transcript {
        Transcript {
            id: format!("msg_{}_{}", assistant_id, call),
            chat_id: format!("chat_{}_{}", assistant_id, call),
            text: Some(text.to_string()),
            original_text: None,
            role: Role::Assistant,
            debug_info: None,
            completed_at: Some(Utc::now()),
            created_at: Some(Utc::now()),
            updated_at: None,
            references: vec![],
            assessment: vec![Assessment {
                label: AssessmentLabel::Green,
                explanation: Some(format!("scripted answer for: {}", question)),
            }],
        }
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn send_message(
        &self,
        assistant_id: &str,
        question: &str,
    ) -> anyhow::Result<Transcript> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.replies.get(assistant_id) {
            Some(ScriptedReply::Text(text)) => {
                Ok(Self::transcript(assistant_id, question, text, call))
            }
            Some(ScriptedReply::Fail(msg)) => anyhow::bail!("{}", msg),
            Some(ScriptedReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("scripted hang outlived the test timeout")
            }
            None => Ok(Self::transcript(assistant_id, question, "ok", call)),
        }
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

pub struct FakeGoldenClient {
    pub answer: String,
    pub fail: bool,
    calls: AtomicUsize,
}

impl FakeGoldenClient {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: String::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GoldenClient for FakeGoldenClient {
    async fn generate(&self, question: &str, _model: &str) -> anyhow::Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("golden generation unavailable");
        }
        if self.answer.is_empty() {
            Ok(format!("golden #{} for: {}", n + 1, question))
        } else {
            Ok(self.answer.clone())
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake-golden"
    }
}
