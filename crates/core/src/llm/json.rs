use crate::domain::contract::LlmRiskReport;
use crate::domain::report::Scenario;
use crate::error::ReportError;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

/// Parse the model's raw text into validated scenarios plus the verbatim
/// narrative. Every failure surfaces as `MalformedResponse`; nothing is
/// coerced or defaulted.
pub fn parse_report(text: &str) -> anyhow::Result<(Vec<Scenario>, String)> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<LlmRiskReport>(&json_str)
        .map_err(|e| malformed(format!("model output is not valid report JSON: {e}")))?;
    parsed
        .validate_and_into_parts()
        .map_err(|e| malformed(format!("{e:#}")))
}

fn malformed(detail: String) -> anyhow::Error {
    anyhow::Error::new(ReportError::MalformedResponse(detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_report_json() -> String {
        json!({
            "narrative": "Turnover hit a record while the index closed lower; distribution risk dominates.",
            "scenarios": [
                {"label": "base", "probability": 0.6, "narrative": "range-bound with fading volume"},
                {"label": "optimistic", "probability": 0.25, "narrative": "heavyweights recover on new inflows"},
                {"label": "pessimistic", "probability": 0.15, "narrative": "support breaks and selling accelerates"}
            ]
        })
        .to_string()
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn parse_report_accepts_valid_json() {
        let (scenarios, narrative) = parse_report(&valid_report_json()).unwrap();
        assert_eq!(scenarios.len(), 3);
        assert_eq!(scenarios[0].label, "base");
        assert!(narrative.contains("distribution risk"));
    }

    #[test]
    fn parse_report_accepts_fenced_output() {
        let fenced = format!("```json\n{}\n```", valid_report_json());
        let (scenarios, _) = parse_report(&fenced).unwrap();
        assert_eq!(scenarios.len(), 3);
    }

    #[test]
    fn missing_scenarios_is_malformed() {
        let body = json!({"narrative": "only prose"}).to_string();
        let err = parse_report(&body).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReportError>(),
            Some(ReportError::MalformedResponse(_))
        ));
    }

    #[test]
    fn non_json_output_is_malformed() {
        let err = parse_report("The market looks risky today.").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReportError>(),
            Some(ReportError::MalformedResponse(_))
        ));
    }

    #[test]
    fn out_of_range_probability_is_malformed() {
        let body = json!({
            "narrative": "x",
            "scenarios": [{"label": "base", "probability": 1.2, "narrative": "y"}]
        })
        .to_string();
        let err = parse_report(&body).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReportError>(),
            Some(ReportError::MalformedResponse(_))
        ));
    }
}
