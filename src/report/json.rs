// Module: JSON reporter
// Emits the stable wire format; the output of `run --reporter json` feeds
// straight back into `format`.

use super::Reporter;
use crate::result::TestResult;

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(&self, res: &TestResult) -> String {
        serde_json::to_string_pretty(res).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_report_round_trips() {
        let res = TestResult::new("id", "/tmp/t", "root", "");
        let out = JsonReporter.report(&res);
        let back: TestResult = serde_json::from_str(&out).unwrap();
        assert_eq!(back.name, "root");
        assert_eq!(back.id, "id");
    }
}
