// Module: Step hook
// One JSON line per finished step; pipe it into jq or a file for offline
// analysis of individual requests.

use super::Hook;
use crate::result::StepResult;

#[derive(Default)]
pub struct StepHook;

impl StepHook {
    pub fn new() -> Self {
        Self
    }
}

impl Hook for StepHook {
    fn on_step_end(&self, res: &StepResult) {
        if let Ok(line) = serde_json::to_string(res) {
            println!("{line}");
        }
    }
}
