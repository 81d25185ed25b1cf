//! Scripted classifier for exercising the orchestrator without a model.

use async_trait::async_trait;
use inspect_shared::AnalysisOutcome;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::encoding::EncodedImage;
use crate::inference::{InferError, Inferer};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Pass,
    Defect(&'static str),
    Fail(&'static str),
    Panic,
}

#[derive(Default)]
pub(crate) struct ScriptedInferer {
    script: HashMap<String, (Duration, Reply)>,
    finished: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedInferer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(self, file_name: &str, reply: Reply) -> Self {
        self.on_after(file_name, Duration::ZERO, reply)
    }

    pub(crate) fn on_after(mut self, file_name: &str, delay: Duration, reply: Reply) -> Self {
        self.script.insert(file_name.to_string(), (delay, reply));
        self
    }

    /// Names and completion instants, in completion order.
    pub(crate) fn finished(&self) -> Vec<(String, Instant)> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl Inferer for ScriptedInferer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, image: &EncodedImage) -> Result<AnalysisOutcome, InferError> {
        let (delay, reply) = self
            .script
            .get(&image.file_name)
            .cloned()
            .unwrap_or((Duration::ZERO, Reply::Pass));

        tokio::time::sleep(delay).await;
        self.finished
            .lock()
            .unwrap()
            .push((image.file_name.clone(), Instant::now()));

        match reply {
            Reply::Pass => Ok(AnalysisOutcome::pass(0.93)?),
            Reply::Defect(label) => Ok(AnalysisOutcome::defect(0.88, label)?),
            Reply::Fail(message) => Err(InferError::Unavailable(message.to_string())),
            Reply::Panic => panic!("scripted panic for {}", image.file_name),
        }
    }
}
