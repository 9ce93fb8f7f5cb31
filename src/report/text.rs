//! # Text reporter
//!
//! Indented tree mirroring the result hierarchy, one summary line per unit:
//!
//! ```text
//! Test root
//!   Plan search-bench
//!     Unit Group Index: 0, Seconds: 60, Times: 0
//!       Unit query Parallel: 8, Limit: 0, Total: 48210, Rate: 99.98%, QPS: 803, ResTime: 9.9ms
//!   Test root
//! ```
//!
//! Labels come through the i18n table so the same layout renders in any
//! configured language.

use serde_json::Value;

use super::{fmt_duration, Reporter};
use crate::i18n::I18n;
use crate::result::{PlanResult, TestResult, UnitGroup, UnitResult};

pub struct TextReporter {
    padding_to_add: String,
    i18n: I18n,
}

impl TextReporter {
    pub fn new(args: &Value, i18n: I18n) -> Self {
        let padding_to_add = args
            .get("padding")
            .and_then(|v| v.as_str())
            .unwrap_or("  ")
            .to_string();
        Self {
            padding_to_add,
            i18n,
        }
    }

    fn indent(&self, lines: Vec<String>) -> Vec<String> {
        lines
            .into_iter()
            .map(|line| format!("{}{}", self.padding_to_add, line))
            .collect()
    }

    fn err_lines(&self, err: &str) -> Vec<String> {
        format!("{} {}", self.i18n.title("err"), err)
            .lines()
            .map(|line| format!("{}{}", self.padding_to_add, line))
            .collect()
    }

    fn format_test(&self, res: &TestResult) -> Vec<String> {
        let header = format!("{} {}", self.i18n.title("test"), res.name);
        let mut lines = vec![header.clone()];
        if res.is_err {
            lines.extend(self.err_lines(&res.err));
            return lines;
        }
        for plan in &res.plans {
            lines.extend(self.indent(self.format_plan(plan)));
        }
        for sub_test in &res.sub_tests {
            lines.extend(self.indent(self.format_test(sub_test)));
        }
        lines.push(header);
        lines
    }

    fn format_plan(&self, res: &PlanResult) -> Vec<String> {
        let mut lines = vec![format!("{} {}", self.i18n.title("plan"), res.name)];
        if res.is_err {
            lines.extend(self.err_lines(&res.err));
            return lines;
        }
        for group in &res.unit_groups {
            lines.extend(self.indent(self.format_unit_group(group)));
        }
        lines
    }

    fn format_unit_group(&self, res: &UnitGroup) -> Vec<String> {
        let mut lines = vec![format!(
            "{} {}: {}, {}: {}, {}: {}",
            self.i18n.title("unitGroup"),
            self.i18n.title("idx"),
            res.idx,
            self.i18n.title("seconds"),
            res.seconds,
            self.i18n.title("times"),
            res.times,
        )];
        for unit in &res.units {
            lines.extend(self.indent(self.format_unit(unit)));
        }
        lines
    }

    fn format_unit(&self, res: &UnitResult) -> Vec<String> {
        if res.is_err {
            let mut lines = vec![format!("{} {}", self.i18n.title("unit"), res.name)];
            lines.extend(self.err_lines(&res.err));
            return lines;
        }
        // Rate truncated to two decimals so 0.99995 prints 99.99, not 100.
        let rate = (res.rate * 10_000.0).trunc() / 100.0;
        let mut lines = vec![format!(
            "{} {} {}: {}, {}: {}, {}: {}, {}: {}%, {}: {}, {}: {}",
            self.i18n.title("unit"),
            res.name,
            self.i18n.title("parallel"),
            res.parallel,
            self.i18n.title("limit"),
            res.limit,
            self.i18n.title("total"),
            res.total,
            self.i18n.title("rate"),
            rate,
            self.i18n.title("qps"),
            res.qps as u64,
            self.i18n.title("resTime"),
            fmt_duration(res.res_time),
        )];
        if !res.quantile.is_empty() {
            let mut entries: Vec<(f64, String)> = res
                .quantile
                .iter()
                .map(|(k, v)| (k.parse::<f64>().unwrap_or(0.0), fmt_duration(*v)))
                .collect();
            entries.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            let quantiles = entries
                .into_iter()
                .map(|(k, v)| format!("{}{}: {}", self.i18n.title("quantileShort"), k, v))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("{}{}", self.padding_to_add, quantiles));
        }
        lines
    }
}

impl Reporter for TextReporter {
    fn report(&self, res: &TestResult) -> String {
        let mut lines = self.format_test(res);
        let verdict = if tree_ok(res) { "succ" } else { "fail" };
        lines.push(format!(
            "{} {}",
            self.i18n.title("summary"),
            self.i18n.status(verdict)
        ));
        lines.join("\n")
    }
}

/// A run is clean when no node of the tree carries an error.
fn tree_ok(res: &TestResult) -> bool {
    if res.is_err {
        return false;
    }
    let plans_ok = res.plans.iter().all(|plan| {
        !plan.is_err
            && plan
                .unit_groups
                .iter()
                .all(|group| group.units.iter().all(|unit| !unit.is_err))
    });
    plans_ok && res.sub_tests.iter().all(tree_ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{StepResult, SubStepResult};
    use serde_json::json;
    use std::time::Duration;

    fn sample_tree() -> TestResult {
        let mut unit = crate::result::UnitResult::new("query", 4, 0, 0, 100, None, 0);
        for _ in 0..10 {
            let mut step = StepResult::new();
            step.add_sub_step_result(SubStepResult {
                req: json!({}),
                res: json!({}),
                name: "step-0".to_string(),
                code: "OK".to_string(),
                success: true,
                elapse: Duration::from_millis(5),
            });
            unit.add_step_result(step);
        }
        unit.summary();

        let mut group = UnitGroup::new(0, 0, 100, None);
        group.add_unit_result(unit);
        let mut plan = PlanResult::new("bench", "bench");
        plan.add_unit_group(group);
        let mut root = TestResult::new("id", "/tmp/t", "root", "");
        root.add_plan_result(plan);
        root.add_sub_test_result(TestResult::new("id", "/tmp/t/a", "a", ""));
        root
    }

    #[test]
    fn test_tree_layout() {
        let reporter = TextReporter::new(&json!({}), I18n::new(Some("en"), None));
        let out = reporter.report(&sample_tree());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Test root");
        assert_eq!(lines[1], "  Plan bench");
        assert!(lines[2].starts_with("    Unit Group Index: 0"));
        assert!(lines[3].contains("Unit query"));
        assert!(lines[3].contains("Total: 10"));
        assert!(lines[3].contains("Rate: 100%"));
        assert_eq!(lines[lines.len() - 2], "Test root");
        assert_eq!(*lines.last().unwrap(), "Summary SUCCESS");
    }

    #[test]
    fn test_verdict_fail_on_any_error_node() {
        let mut tree = sample_tree();
        tree.sub_tests[0].set_err("boom");
        let reporter = TextReporter::new(&json!({}), I18n::new(Some("en"), None));
        let out = reporter.report(&tree);
        assert!(out.ends_with("Summary FAIL"));
    }

    #[test]
    fn test_error_test_prints_err_and_stops() {
        let mut root = TestResult::new("id", "/tmp/t", "broken", "");
        root.set_err("config file corrupt\nline 2");
        let reporter = TextReporter::new(&json!({}), I18n::new(Some("en"), None));
        let out = reporter.report(&root);
        assert!(out.contains("Test broken"));
        assert!(out.contains("Err config file corrupt"));
        assert!(out.contains("  line 2"));
    }

    #[test]
    fn test_quantile_line_sorted_numerically() {
        let mut tree = sample_tree();
        let unit = &mut tree.plans[0].unit_groups[0].units[0];
        unit.quantile.clear();
        unit.quantile
            .insert("99.9".to_string(), Duration::from_millis(30));
        unit.quantile
            .insert("80".to_string(), Duration::from_millis(10));
        let reporter = TextReporter::new(&json!({}), I18n::new(Some("en"), None));
        let out = reporter.report(&tree);
        let qline = out.lines().find(|l| l.contains("Q80")).unwrap();
        let p80 = qline.find("Q80").unwrap();
        let p999 = qline.find("Q99.9").unwrap();
        assert!(p80 < p999);
    }
}
