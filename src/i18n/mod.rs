// Module: I18n
// Label table used by the text reporter and the debug hook.

use serde_json::{json, Map, Value};

use crate::config::deep_merge;

fn default_table() -> Value {
    json!({
        "title": {
            "test": "Test",
            "plan": "Plan",
            "unitGroup": "Unit Group",
            "unit": "Unit",
            "step": "Step",
            "err": "Err",
            "idx": "Index",
            "seconds": "Seconds",
            "times": "Times",
            "parallel": "Parallel",
            "limit": "Limit",
            "success": "Success",
            "total": "Total",
            "elapse": "Elapse",
            "rate": "Rate",
            "resTime": "ResTime",
            "qps": "QPS",
            "code": "Code",
            "summary": "Summary",
            "quantile": "Quantile",
            "quantileShort": "Q",
            "monitor": "Monitor",
        },
        "status": {
            "fail": "FAIL",
            "succ": "SUCCESS",
        },
    })
}

fn zh_table() -> Value {
    json!({
        "title": {
            "test": "测试",
            "plan": "计划",
            "unitGroup": "单元组",
            "unit": "单元",
            "step": "步骤",
            "err": "错误",
            "idx": "序列",
            "seconds": "测试时间",
            "times": "测试次数",
            "parallel": "并发",
            "limit": "限流",
            "success": "成功",
            "total": "总共",
            "elapse": "耗时",
            "rate": "成功率",
            "resTime": "响应时间",
            "qps": "QPS",
            "code": "错误码",
            "summary": "汇总",
            "quantile": "分位数",
            "quantileShort": "Q",
            "monitor": "监测",
        },
        "status": {
            "fail": "失败",
            "succ": "成功",
        },
    })
}

/// Resolved label table: defaults ⊕ language table ⊕ caller overrides.
#[derive(Debug, Clone)]
pub struct I18n {
    labels: Map<String, Value>,
}

impl I18n {
    /// `lang` falls back to the `LANG` environment variable (`zh_CN.UTF-8`
    /// selects `zh`); unknown languages keep the defaults.
    pub fn new(lang: Option<&str>, overrides: Option<&Map<String, Value>>) -> Self {
        let lang = lang
            .map(|l| l.to_string())
            .or_else(|| {
                std::env::var("LANG")
                    .ok()
                    .and_then(|l| l.split(&['_', '.'][..]).next().map(|s| s.to_string()))
            })
            .unwrap_or_default();

        let mut labels = default_table().as_object().cloned().expect("table object");
        if lang == "zh" {
            let zh = zh_table().as_object().cloned().expect("table object");
            deep_merge(&mut labels, &zh);
        }
        if let Some(overrides) = overrides {
            deep_merge(&mut labels, overrides);
        }
        Self { labels }
    }

    fn lookup(&self, section: &str, key: &str) -> String {
        self.labels
            .get(section)
            .and_then(|s| s.get(key))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| key.to_string())
    }

    pub fn title(&self, key: &str) -> String {
        self.lookup("title", key)
    }

    pub fn status(&self, key: &str) -> String {
        self.lookup("status", key)
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new(Some(""), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_labels() {
        let i18n = I18n::new(Some("en"), None);
        assert_eq!(i18n.title("test"), "Test");
        assert_eq!(i18n.title("unitGroup"), "Unit Group");
        assert_eq!(i18n.status("fail"), "FAIL");
    }

    #[test]
    fn test_zh_labels_overlay_defaults() {
        let i18n = I18n::new(Some("zh"), None);
        assert_eq!(i18n.title("test"), "测试");
        assert_eq!(i18n.title("qps"), "QPS");
    }

    #[test]
    fn test_overrides_win() {
        let overrides = json!({"title": {"test": "Scenario"}})
            .as_object()
            .cloned()
            .unwrap();
        let i18n = I18n::new(Some("en"), Some(&overrides));
        assert_eq!(i18n.title("test"), "Scenario");
        assert_eq!(i18n.title("plan"), "Plan");
    }

    #[test]
    fn test_unknown_key_falls_back_to_key() {
        let i18n = I18n::new(Some("en"), None);
        assert_eq!(i18n.title("nonexistent"), "nonexistent");
    }
}
