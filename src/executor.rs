//! Plays action chains against a live page.
//!
//! Each scope (the page, or a dialog opened by a click) runs the same cycle:
//! extract, filter, ask the agent, build chains, then execute in the order
//! fill inputs -> click additional-action buttons -> click submit. Every
//! additional-action click is assumed to open the dialog at
//! `RunSettings::modal_selector`, which is handled as a nested scope before
//! the next outer button.

use std::fmt;

use async_recursion::async_recursion;
use tracing::{debug, info, warn};

use crate::brain::Brain;
use crate::chain::{self, ButtonPlan};
use crate::config::RunSettings;
use crate::dom;
use crate::error::{PilotError, Result};
use crate::filter;
use crate::hands::PageDriver;
use crate::prompt;
use crate::types::{ActionStep, Scope, UserRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopePhase {
    Idle,
    FillingInputs,
    ClickingAdditionalActions,
    Submitting,
    Done,
}

/// Something the run tolerated but the caller should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunWarning {
    /// The scope had buttons but the agent marked none of them `submit`.
    NoSubmitIdentified { scope: String },
    /// More than one `submit`; only the first in page order was clicked.
    ExtraSubmitsSkipped { scope: String, ids: Vec<String> },
    FillTargetMissing { selector: String },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::NoSubmitIdentified { scope } => {
                write!(f, "NoSubmitIdentified: no submit button identified in {scope}")
            }
            RunWarning::ExtraSubmitsSkipped { scope, ids } => {
                write!(f, "skipped extra submit buttons in {scope}: {}", ids.join(", "))
            }
            RunWarning::FillTargetMissing { selector } => {
                write!(f, "field {selector} disappeared before it could be filled")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub scopes: usize,
    pub fills: usize,
    pub clicks: usize,
    pub warnings: Vec<RunWarning>,
}

impl RunReport {
    /// Human-readable outcome stored as the job result.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Automation finished: {} field(s) filled, {} button(s) clicked across {} scope(s).",
            self.fills, self.clicks, self.scopes
        );
        if !self.warnings.is_empty() {
            let warnings: Vec<String> = self.warnings.iter().map(ToString::to_string).collect();
            summary.push_str(" Warnings: ");
            summary.push_str(&warnings.join("; "));
        }
        summary
    }
}

/// Chains compiled for one scope before any of them runs.
struct ScopePlan {
    inputs: Vec<ActionStep>,
    buttons: ButtonPlan,
    had_buttons: bool,
}

pub struct ActionExecutor<'a> {
    page: &'a dyn PageDriver,
    brain: &'a Brain,
    user: &'a UserRecord,
    settings: &'a RunSettings,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(
        page: &'a dyn PageDriver,
        brain: &'a Brain,
        user: &'a UserRecord,
        settings: &'a RunSettings,
    ) -> Self {
        Self {
            page,
            brain,
            user,
            settings,
        }
    }

    /// Run the top-level page scope (and every dialog it opens). The page
    /// must already be navigated.
    pub async fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::default();
        self.run_scope(Scope::Page, 0, &mut report).await?;
        Ok(report)
    }

    async fn plan_scope(&self, scope: &Scope) -> Result<ScopePlan> {
        let elements =
            dom::extract_elements(self.page, scope, self.settings.modal_timeout).await?;
        let valid = filter::valid_elements(&elements, &self.settings.trigger_id);
        let inputs = filter::input_fields(&valid);
        let buttons = filter::buttons(&valid);

        let input_chain = if inputs.is_empty() {
            Vec::new()
        } else {
            let prompt = prompt::field_mapping_prompt(&inputs, self.user);
            let reply = self.brain.ask_json(&prompt).await?;
            let mapping = chain::field_mapping(reply)?;
            chain::build_input_chain(&inputs, &mapping)
        };

        let button_plan = if buttons.is_empty() {
            ButtonPlan::default()
        } else {
            let prompt = prompt::button_classification_prompt(&buttons);
            let reply = self.brain.ask_json(&prompt).await?;
            chain::build_button_chain(&buttons, reply)?
        };

        debug!(
            %scope,
            fills = input_chain.len(),
            additional = button_plan.additional.len(),
            submit = button_plan.submit.is_some(),
            "scope planned"
        );
        Ok(ScopePlan {
            inputs: input_chain,
            buttons: button_plan,
            had_buttons: !buttons.is_empty(),
        })
    }

    #[async_recursion]
    async fn run_scope(&self, scope: Scope, depth: usize, report: &mut RunReport) -> Result<()> {
        if depth > self.settings.max_depth {
            return Err(PilotError::RecursionLimitExceeded {
                limit: self.settings.max_depth,
            });
        }

        let mut phase = ScopePhase::Idle;
        let plan = self.plan_scope(&scope).await?;
        report.scopes += 1;

        enter(&scope, &mut phase, ScopePhase::FillingInputs);
        for step in &plan.inputs {
            let ActionStep::Fill { selector, value } = step else {
                continue;
            };
            match self.page.fill(selector, value).await {
                Ok(()) => {
                    debug!(%scope, selector = %selector, "filled");
                    report.fills += 1;
                }
                Err(PilotError::MissingTarget { selector, reason }) => {
                    warn!(%scope, selector = %selector, reason = %reason, "fill target missing, skipping");
                    report.warnings.push(RunWarning::FillTargetMissing { selector });
                }
                Err(e) => return Err(e),
            }
        }

        enter(&scope, &mut phase, ScopePhase::ClickingAdditionalActions);
        for step in &plan.buttons.additional {
            self.page.click(step.selector()).await?;
            report.clicks += 1;
            info!(%scope, selector = step.selector(), depth, "clicked additional action, entering dialog");

            let dialog = Scope::Modal(self.settings.modal_selector.clone());
            self.run_scope(dialog, depth + 1, report).await?;
        }

        enter(&scope, &mut phase, ScopePhase::Submitting);
        match &plan.buttons.submit {
            Some(step) => {
                self.page.click(step.selector()).await?;
                report.clicks += 1;
                info!(%scope, selector = step.selector(), "clicked submit");
            }
            None if plan.had_buttons => {
                warn!(%scope, "no submit button identified, not submitting");
                report.warnings.push(RunWarning::NoSubmitIdentified {
                    scope: scope.to_string(),
                });
            }
            None => {}
        }
        if !plan.buttons.extra_submits.is_empty() {
            warn!(%scope, skipped = ?plan.buttons.extra_submits, "agent marked several submit buttons");
            report.warnings.push(RunWarning::ExtraSubmitsSkipped {
                scope: scope.to_string(),
                ids: plan.buttons.extra_submits.clone(),
            });
        }

        enter(&scope, &mut phase, ScopePhase::Done);
        Ok(())
    }
}

fn enter(scope: &Scope, phase: &mut ScopePhase, next: ScopePhase) {
    debug!(%scope, from = ?*phase, to = ?next, "scope phase");
    *phase = next;
}
