// Module: Debug hook
// Prints an indented lifecycle tree with the spec/result payloads, for
// watching a run unfold directory by directory.

use std::sync::Mutex;

use serde_json::Value;

use super::Hook;
use crate::i18n::I18n;
use crate::result::{PlanResult, StepResult, TestResult, UnitResult};

pub struct DebugHook {
    padding_to_add: String,
    padding: Mutex<String>,
    i18n: I18n,
}

impl DebugHook {
    pub fn new(args: &Value, i18n: I18n) -> Self {
        let padding_to_add = args
            .get("padding")
            .and_then(|v| v.as_str())
            .unwrap_or("  ")
            .to_string();
        Self {
            padding_to_add,
            padding: Mutex::new(String::new()),
            i18n,
        }
    }

    fn enter(&self, line: &str) {
        let mut padding = self.padding.lock().expect("padding lock");
        println!("{padding}{line}");
        padding.push_str(&self.padding_to_add);
    }

    fn leave(&self, line: &str) {
        let mut padding = self.padding.lock().expect("padding lock");
        let keep = padding.len().saturating_sub(self.padding_to_add.len());
        padding.truncate(keep);
        println!("{padding}{line}");
    }

    fn object(&self, title: &str, value: &Value) {
        let padding = self.padding.lock().expect("padding lock").clone();
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        for line in format!("{title}: {text}").lines() {
            println!("{padding}{line}");
        }
    }
}

impl Hook for DebugHook {
    fn on_test_start(&self, info: &Value) {
        let name = info.get("name").and_then(|v| v.as_str()).unwrap_or("");
        self.enter(&format!("{} {}", self.i18n.title("test"), name));
    }

    fn on_test_end(&self, res: &TestResult) {
        self.leave(&format!("{} {}", self.i18n.title("test"), res.name));
    }

    fn on_plan_start(&self, info: &Value) {
        let name = info.get("name").and_then(|v| v.as_str()).unwrap_or("");
        self.enter(&format!("{} {}", self.i18n.title("plan"), name));
        self.object("PlanInfo", info);
    }

    fn on_plan_end(&self, res: &PlanResult) {
        self.leave(&format!("{} {}", self.i18n.title("plan"), res.name));
    }

    fn on_unit_start(&self, info: &Value) {
        let name = info.get("name").and_then(|v| v.as_str()).unwrap_or("");
        self.enter(&format!("{} {}", self.i18n.title("unit"), name));
        self.object("UnitInfo", info);
    }

    fn on_unit_end(&self, res: &UnitResult) {
        self.leave(&format!("{} {}", self.i18n.title("unit"), res.name));
        if let Ok(value) = serde_json::to_value(res) {
            self.object("UnitResult", &value);
        }
    }

    fn on_step_start(&self, _info: &Value) {}

    fn on_step_end(&self, _res: &StepResult) {}

    fn on_exit(&self, _res: &TestResult) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_padding_grows_and_shrinks() {
        let hook = DebugHook::new(&json!({"padding": ">>"}), I18n::default());
        hook.on_test_start(&json!({"name": "outer"}));
        assert_eq!(*hook.padding.lock().unwrap(), ">>");
        hook.on_test_start(&json!({"name": "inner"}));
        assert_eq!(*hook.padding.lock().unwrap(), ">>>>");
        hook.on_test_end(&TestResult::new("id", "/d", "inner", ""));
        hook.on_test_end(&TestResult::new("id", "/d", "outer", ""));
        assert_eq!(*hook.padding.lock().unwrap(), "");
    }
}
