//! In-memory stand-ins for the browser, the reasoning agent and the
//! user-data endpoint.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apply_agent::brain::{Brain, ReasoningAgent};
use apply_agent::config::RunSettings;
use apply_agent::hands::{BrowserProvider, PageDriver};
use apply_agent::jobs::{Job, JobStatus, JobTracker};
use apply_agent::orchestrator::Orchestrator;
use apply_agent::types::{UserRecord, WebElement};
use apply_agent::user_data::UserDataSource;
use apply_agent::{PilotError, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

pub const MODAL: &str = "#paperApplyModal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Navigate(String),
    Fill(String, String),
    Click(String),
    Close,
}

pub type ActionLog = Arc<Mutex<Vec<Action>>>;

/// What the fake page shows. Clicking one of `modal_openers` makes the
/// dialog (with `modal` elements) visible; clicking a `modal_closers` entry
/// hides it again. Selectors in `detached` are extracted but gone by the
/// time they are filled or clicked.
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    pub page: Vec<WebElement>,
    pub modal: Vec<WebElement>,
    pub modal_openers: Vec<String>,
    pub modal_closers: Vec<String>,
    pub detached: Vec<String>,
}

pub struct FakePage {
    script: PageScript,
    modal_open: Mutex<bool>,
    log: ActionLog,
}

impl FakePage {
    fn visible(&self) -> Vec<WebElement> {
        let mut elements = self.script.page.clone();
        if *self.modal_open.lock().unwrap() {
            elements.extend(self.script.modal.clone());
        }
        elements
    }

    fn has(&self, selector: &str) -> bool {
        if self.script.detached.iter().any(|s| s == selector) {
            return false;
        }
        self.visible()
            .iter()
            .filter_map(WebElement::id)
            .any(|id| format!("#{id}") == selector)
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.log.lock().unwrap().push(Action::Navigate(url.to_string()));
        Ok(())
    }

    async fn query_visible(&self, scope: Option<&str>, _selector: &str) -> Result<Vec<WebElement>> {
        match scope {
            None => Ok(self.script.page.clone()),
            Some(MODAL) if *self.modal_open.lock().unwrap() => Ok(self.script.modal.clone()),
            Some(_) => Ok(Vec::new()),
        }
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        if selector == MODAL && *self.modal_open.lock().unwrap() {
            Ok(())
        } else {
            Err(PilotError::ExtractionTimeout {
                scope: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        if !self.has(selector) {
            return Err(PilotError::MissingTarget {
                selector: selector.to_string(),
                reason: "no such element".to_string(),
            });
        }
        self.log
            .lock()
            .unwrap()
            .push(Action::Fill(selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        if !self.has(selector) {
            return Err(PilotError::MissingTarget {
                selector: selector.to_string(),
                reason: "no such element".to_string(),
            });
        }
        self.log.lock().unwrap().push(Action::Click(selector.to_string()));
        if self.script.modal_openers.iter().any(|s| s == selector) {
            *self.modal_open.lock().unwrap() = true;
        } else if self.script.modal_closers.iter().any(|s| s == selector) {
            *self.modal_open.lock().unwrap() = false;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.lock().unwrap().push(Action::Close);
        Ok(())
    }
}

/// Hands out a fresh `FakePage` per run. With a gate set, `open_page`
/// waits until the gate is notified.
pub struct FakeBrowser {
    script: PageScript,
    log: ActionLog,
    gate: Option<Arc<Notify>>,
}

impl FakeBrowser {
    pub fn new(script: PageScript) -> Self {
        Self {
            script,
            log: ActionLog::default(),
            gate: None,
        }
    }

    pub fn gated(script: PageScript, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(script)
        }
    }

    pub fn log(&self) -> ActionLog {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl BrowserProvider for FakeBrowser {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(Box::new(FakePage {
            script: self.script.clone(),
            modal_open: Mutex::new(false),
            log: Arc::clone(&self.log),
        }))
    }

    async fn shutdown(&self) {}
}

/// Answers prompts from a queue, then with `fallback` if one is set.
#[derive(Default)]
pub struct ScriptedAgent {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAgent {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn repeating(reply: &str) -> Self {
        Self {
            fallback: Some(reply.to_string()),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

#[async_trait]
impl ReasoningAgent for ScriptedAgent {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        next.or_else(|| self.fallback.clone())
            .ok_or_else(|| PilotError::UpstreamUnavailable {
                service: "scripted agent",
                reason: "no reply left".to_string(),
            })
    }
}

pub struct StaticUserData(pub UserRecord);

#[async_trait]
impl UserDataSource for StaticUserData {
    async fn fetch(&self) -> Result<UserRecord> {
        Ok(self.0.clone())
    }
}

pub fn ana() -> UserRecord {
    match json!({ "name": "Ana", "age": 30 }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

pub fn settings() -> RunSettings {
    RunSettings {
        modal_timeout: Duration::from_millis(50),
        ..RunSettings::default()
    }
}

pub fn orchestrator(
    browser: FakeBrowser,
    agent: ScriptedAgent,
    settings: RunSettings,
) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        Arc::new(browser),
        Brain::new(Arc::new(agent)),
        Arc::new(StaticUserData(ana())),
        Arc::new(JobTracker::new()),
        settings,
    ))
}

/// Start a run and wait for it to finish.
pub async fn run_to_end(orchestrator: &Arc<Orchestrator>, url: &str) -> Job {
    let ticket = orchestrator.start_run(url).await;
    ticket.task.await.unwrap();
    let job = orchestrator.jobs().get(&ticket.job_id).await.unwrap();
    assert!(job.status == JobStatus::Complete || job.status == JobStatus::Error);
    job
}

pub fn actions_without_navigation(log: &ActionLog) -> Vec<Action> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|a| !matches!(a, Action::Navigate(_) | Action::Close))
        .cloned()
        .collect()
}
