//! Scripted lifecycle runs for `mapctl`.
//!
//! A script is a comma separated list of steps. Each step is a word
//! (`mount`, `unmount`, `clear`, `refresh`, `visible`, `hidden`, `teardown`),
//! several words joined with `+` to run them concurrently, or `sleep:<ms>`.
//!
//! `visible`, `hidden` and `teardown` are page signals: they are emitted to the
//! attached listeners and the resulting dispatch runs in the background, so
//! follow them with a `sleep` to let it finish.

use std::time::Duration;

use futures_util::future::join_all;
use lifecycle::{
    ExternalSignal, HeadlessBackend, ManualSignals, MapSession, Outcome, Trigger, Visibility,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Trigger(Trigger),
    Signal(ExternalSignal),
}

impl Action {
    pub fn parse(word: &str) -> Option<Action> {
        Some(match word {
            "visible" => Action::Signal(ExternalSignal::Visibility(Visibility::Visible)),
            "hidden" => Action::Signal(ExternalSignal::Visibility(Visibility::Hidden)),
            "teardown" | "pagehide" => Action::Signal(ExternalSignal::PageHide),
            other => Action::Trigger(Trigger::parse(other)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Run(Vec<Action>),
    Sleep(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Dispatched(Outcome),
    /// Emitted to `listeners` registered listeners.
    Signalled {
        signal: ExternalSignal,
        listeners: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub step: String,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unrecognized script step: {:?}", self.step)
    }
}

impl std::error::Error for ScriptError {}

pub fn parse_script(script: &str) -> Result<Vec<Step>, ScriptError> {
    let mut steps = Vec::new();
    for raw in script.split(',') {
        let step = raw.trim();
        if step.is_empty() {
            continue;
        }
        let bad = || ScriptError {
            step: step.to_string(),
        };
        if let Some(ms) = step.strip_prefix("sleep:") {
            let ms: u64 = ms.parse().map_err(|_| bad())?;
            steps.push(Step::Sleep(Duration::from_millis(ms)));
            continue;
        }
        let actions = step
            .split('+')
            .map(|word| Action::parse(word.trim()).ok_or_else(bad))
            .collect::<Result<Vec<_>, _>>()?;
        steps.push(Step::Run(actions));
    }
    Ok(steps)
}

/// Run `steps` in order; actions within one step run concurrently. Must be
/// polled inside a `LocalSet`, since signal dispatches are spawned.
pub async fn run_script(
    session: &MapSession<HeadlessBackend>,
    signals: &ManualSignals,
    steps: &[Step],
) -> Vec<Report> {
    let mut reports = Vec::new();
    for step in steps {
        match step {
            Step::Sleep(d) => tokio::time::sleep(*d).await,
            Step::Run(actions) => {
                let mut runs = Vec::new();
                for action in actions {
                    match *action {
                        Action::Signal(signal) => {
                            let listeners = signals.emit(signal);
                            reports.push(Report::Signalled { signal, listeners });
                        }
                        Action::Trigger(trigger) => runs.push(session.dispatch(trigger)),
                    }
                }
                reports.extend(join_all(runs).await.into_iter().map(Report::Dispatched));
            }
        }
    }
    reports
}
