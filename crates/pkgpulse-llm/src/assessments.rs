//! The seven qualitative assessments: prompt construction and typed
//! extraction. Every prompt demands a JSON-only reply against a fixed shape.

use crate::client::{extract_json, LlmClient};
use crate::error::Result;
use pkgpulse_core::{
    ChangelogAssessment, CommunicationAssessment, GovernanceAssessment, MaintenanceAssessment,
    ReadmeAssessment, SecurityAssessment, SentimentAssessment,
};
use serde_json::Value;

fn get_u8(data: &Value, key: &str, default: u8) -> u8 {
    data.get(key)
        .and_then(Value::as_u64)
        .map(|v| v.min(10) as u8)
        .unwrap_or(default)
}

fn get_str(data: &Value, key: &str, default: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn get_bool(data: &Value, key: &str) -> bool {
    data.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn get_string_list(data: &Value, key: &str) -> Vec<String> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn get_list(data: &Value, key: &str) -> Vec<Value> {
    data.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn clip(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl LlmClient {
    pub async fn assess_readme(
        &self,
        readme: &str,
        package: &str,
        ecosystem: &str,
    ) -> Result<ReadmeAssessment> {
        let prompt = format!(
            r#"Analyze this README for a software package. Score each dimension 1-10:

1. CLARITY: Can a new user understand what this package does within 30 seconds?
2. INSTALLATION: Are installation instructions clear and complete?
3. QUICK_START: Is there a quick example showing basic usage?
4. EXAMPLES: Are there enough examples for common use cases?
5. CONFIGURATION: If configurable, is configuration documented?
6. TROUBLESHOOTING: Are common problems and solutions documented?

Package ecosystem: {ecosystem}
Package name: {package}
README content:
{}

Respond in JSON only:
{{
  "clarity": <1-10>,
  "installation": <1-10>,
  "quick_start": <1-10>,
  "examples": <1-10>,
  "configuration": <1-10>,
  "troubleshooting": <1-10>,
  "overall": <1-10>,
  "summary": "<one sentence summary of doc quality>",
  "top_issue": "<biggest documentation problem, or null if none>"
}}"#,
            clip(readme, 8000)
        );

        let data = extract_json(&self.generate(&prompt, false).await?)?;
        Ok(ReadmeAssessment {
            clarity: get_u8(&data, "clarity", 5),
            installation: get_u8(&data, "installation", 5),
            quick_start: get_u8(&data, "quick_start", 5),
            examples: get_u8(&data, "examples", 5),
            configuration: get_u8(&data, "configuration", 5),
            troubleshooting: get_u8(&data, "troubleshooting", 5),
            overall: get_u8(&data, "overall", 5),
            summary: get_str(&data, "summary", ""),
            top_issue: data
                .get("top_issue")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    pub async fn assess_security(
        &self,
        code_samples: &str,
        package: &str,
        ecosystem: &str,
    ) -> Result<SecurityAssessment> {
        let prompt = format!(
            r#"Analyze this code sample for security concerns. This is from the {ecosystem} package "{package}".

Focus on:
1. INJECTION_RISKS: eval/exec, shell commands with user input, SQL string concatenation
2. INPUT_VALIDATION: Are external inputs validated before use?
3. SECRETS_HANDLING: Hardcoded credentials, API keys, tokens?
4. ERROR_EXPOSURE: Do error handlers leak stack traces or paths?
5. DANGEROUS_DEFAULTS: Insecure default configuration?

Code files:
{}

Respond in JSON only:
{{
  "injection_risks": [{{"file": "...", "line": <n>, "severity": "high|medium|low", "description": "..."}}],
  "input_validation_score": <1-10>,
  "secrets_found": [{{"file": "...", "line": <n>, "type": "..."}}],
  "overall_security_score": <1-10>,
  "critical_findings": ["..."],
  "summary": "<one sentence security assessment>"
}}"#,
            clip(code_samples, 10000)
        );

        let data = extract_json(&self.generate(&prompt, false).await?)?;
        Ok(SecurityAssessment {
            overall_score: get_u8(&data, "overall_security_score", 5),
            injection_risks: get_list(&data, "injection_risks"),
            input_validation_score: get_u8(&data, "input_validation_score", 5),
            secrets_found: get_list(&data, "secrets_found"),
            critical_findings: get_string_list(&data, "critical_findings"),
            summary: get_str(&data, "summary", ""),
        })
    }

    pub async fn assess_sentiment(
        &self,
        issues: &[Value],
        package: &str,
        ecosystem: &str,
    ) -> Result<SentimentAssessment> {
        let issues_json =
            serde_json::to_string_pretty(&issues[..issues.len().min(20)]).unwrap_or_default();
        let prompt = format!(
            r#"Analyze these recent issues for a software project. Assess overall community health.

Package: {package} ({ecosystem})
Issues:
{}

Respond in JSON only:
{{
  "sentiment": "<positive|neutral|negative|mixed>",
  "frustration_level": <1-10>,
  "maintainer_responsiveness": "<active|moderate|slow|unresponsive>",
  "common_complaints": ["<issue1>", "<issue2>"],
  "praise_themes": ["<theme1>", "<theme2>"],
  "abandonment_signals": <true|false>,
  "summary": "<one sentence community health summary>"
}}"#,
            clip(&issues_json, 8000)
        );

        let data = extract_json(&self.generate(&prompt, true).await?)?;
        Ok(SentimentAssessment {
            sentiment: get_str(&data, "sentiment", "neutral"),
            frustration_level: get_u8(&data, "frustration_level", 5),
            maintainer_responsiveness: get_str(&data, "maintainer_responsiveness", "moderate"),
            common_complaints: get_string_list(&data, "common_complaints"),
            praise_themes: get_string_list(&data, "praise_themes"),
            abandonment_signals: get_bool(&data, "abandonment_signals"),
            summary: get_str(&data, "summary", ""),
        })
    }

    pub async fn assess_communication(
        &self,
        comments: &[String],
        package: &str,
        ecosystem: &str,
    ) -> Result<CommunicationAssessment> {
        let comments_text = comments[..comments.len().min(30)].join("\n---\n");
        let prompt = format!(
            r#"Analyze these maintainer responses in issues and pull requests.

Package: {package} ({ecosystem})
Maintainer comments:
{}

Assess:
1. HELPFULNESS: Do responses actually help resolve issues?
2. CLARITY: Are explanations clear to users of varying skill levels?
3. PATIENCE: How are repeated or basic questions handled?
4. TECHNICAL_DEPTH: Do they explain the "why" behind decisions?
5. WELCOMINGNESS: Are new contributors encouraged?

Respond in JSON only:
{{
  "helpfulness": <1-10>,
  "clarity": <1-10>,
  "patience": <1-10>,
  "technical_depth": <1-10>,
  "welcomingness": <1-10>,
  "communication_style": "<exemplary|good|adequate|poor|hostile>",
  "red_flags": ["..."],
  "summary": "<one sentence assessment>"
}}"#,
            clip(&comments_text, 8000)
        );

        let data = extract_json(&self.generate(&prompt, true).await?)?;
        Ok(CommunicationAssessment {
            helpfulness: get_u8(&data, "helpfulness", 5),
            clarity: get_u8(&data, "clarity", 5),
            patience: get_u8(&data, "patience", 5),
            technical_depth: get_u8(&data, "technical_depth", 5),
            welcomingness: get_u8(&data, "welcomingness", 5),
            communication_style: get_str(&data, "communication_style", "adequate"),
            red_flags: get_string_list(&data, "red_flags"),
            summary: get_str(&data, "summary", ""),
        })
    }

    /// The maintenance assessment receives structured activity numbers, not
    /// free-form content.
    pub async fn assess_maintenance(
        &self,
        figures: &Value,
        package: &str,
        ecosystem: &str,
    ) -> Result<MaintenanceAssessment> {
        let prompt = format!(
            r#"Based on this repository activity data, assess the maintenance status:

Package: {package} ({ecosystem})
Activity data:
{}

Respond in JSON only:
{{
  "status": "<actively-maintained|maintained|minimal-maintenance|stale|abandoned>",
  "confidence": <1-10>,
  "concerns": ["<concern1>", "<concern2>"],
  "positive_signals": ["<signal1>", "<signal2>"],
  "summary": "<one sentence maintenance assessment>"
}}"#,
            serde_json::to_string_pretty(figures).unwrap_or_default()
        );

        let data = extract_json(&self.generate(&prompt, true).await?)?;
        Ok(MaintenanceAssessment {
            status: get_str(&data, "status", "maintained"),
            confidence: get_u8(&data, "confidence", 5),
            concerns: get_string_list(&data, "concerns"),
            positive_signals: get_string_list(&data, "positive_signals"),
            summary: get_str(&data, "summary", ""),
        })
    }

    pub async fn assess_changelog(
        &self,
        changelog: &str,
        package: &str,
        ecosystem: &str,
    ) -> Result<ChangelogAssessment> {
        let prompt = format!(
            r#"Analyze this changelog for the {ecosystem} package "{package}".

Assess:
1. BREAKING_CHANGES: Are breaking changes clearly marked?
2. MIGRATION_GUIDES: Are upgrade paths explained?
3. CATEGORIZATION: Are changes grouped (features, fixes, etc.)?
4. COMPLETENESS: Does it appear comprehensive?
5. CLARITY: Is it understandable to users?

CHANGELOG content (most recent entries):
{}

Respond in JSON only:
{{
  "breaking_changes_marked": <true|false>,
  "has_migration_guides": <true|false>,
  "well_categorized": <true|false>,
  "appears_complete": <true|false>,
  "clarity_score": <1-10>,
  "overall_score": <1-10>,
  "summary": "<one sentence assessment>"
}}"#,
            clip(changelog, 6000)
        );

        let data = extract_json(&self.generate(&prompt, true).await?)?;
        Ok(ChangelogAssessment {
            breaking_changes_marked: get_bool(&data, "breaking_changes_marked"),
            has_migration_guides: get_bool(&data, "has_migration_guides"),
            well_categorized: get_bool(&data, "well_categorized"),
            appears_complete: get_bool(&data, "appears_complete"),
            clarity_score: get_u8(&data, "clarity_score", 5),
            overall_score: get_u8(&data, "overall_score", 5),
            summary: get_str(&data, "summary", ""),
        })
    }

    pub async fn assess_governance(
        &self,
        governance_docs: &str,
        package: &str,
        ecosystem: &str,
    ) -> Result<GovernanceAssessment> {
        let prompt = format!(
            r#"Analyze the governance documentation for the {ecosystem} package "{package}".

Documents provided:
{}

Assess:
1. SUCCESSION: Is there a plan if the primary maintainer leaves?
2. DECISION_MAKING: Is the decision process documented?
3. CONTRIBUTOR_PATH: Is there a path from contributor to maintainer?
4. MULTIPLE_MAINTAINERS: Does it indicate multiple people with merge rights?

Respond in JSON only:
{{
  "has_succession_plan": <true|false>,
  "decision_process_documented": <true|false>,
  "contributor_ladder_exists": <true|false>,
  "indicates_multiple_maintainers": <true|false>,
  "bus_factor_risk": "<low|medium|high>",
  "summary": "<one sentence assessment>"
}}"#,
            clip(governance_docs, 6000)
        );

        let data = extract_json(&self.generate(&prompt, true).await?)?;
        Ok(GovernanceAssessment {
            has_succession_plan: get_bool(&data, "has_succession_plan"),
            decision_process_documented: get_bool(&data, "decision_process_documented"),
            contributor_ladder_exists: get_bool(&data, "contributor_ladder_exists"),
            indicates_multiple_maintainers: get_bool(&data, "indicates_multiple_maintainers"),
            bus_factor_risk: get_str(&data, "bus_factor_risk", "unknown"),
            summary: get_str(&data, "summary", ""),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply(json: &str) -> Value {
        serde_json::json!({"response": format!("```json\n{json}\n```")})
    }

    #[tokio::test]
    async fn readme_assessment_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply(
                r#"{"clarity": 9, "installation": 8, "quick_start": 7, "examples": 6,
                    "configuration": 5, "troubleshooting": 4, "overall": 7,
                    "summary": "solid docs", "top_issue": null}"#,
            )))
            .mount(&server)
            .await;

        let client = LlmClient::with_base_url(server.uri(), "big", "fast");
        let assessment = client.assess_readme("# readme", "pkg", "npm").await.unwrap();
        assert_eq!(assessment.clarity, 9);
        assert_eq!(assessment.overall, 7);
        assert_eq!(assessment.top_issue, None);
    }

    #[tokio::test]
    async fn missing_fields_fall_back_to_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(reply(r#"{"status": "stale"}"#)),
            )
            .mount(&server)
            .await;

        let client = LlmClient::with_base_url(server.uri(), "big", "fast");
        let figures = serde_json::json!({"commits_last_6mo": 0});
        let assessment = client
            .assess_maintenance(&figures, "pkg", "npm")
            .await
            .unwrap();
        assert_eq!(assessment.status, "stale");
        assert_eq!(assessment.confidence, 5);
    }

    #[tokio::test]
    async fn non_json_reply_fails_that_assessment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"response": "I cannot answer in JSON, sorry."}),
            ))
            .mount(&server)
            .await;

        let client = LlmClient::with_base_url(server.uri(), "big", "fast");
        assert!(client.assess_readme("# readme", "pkg", "npm").await.is_err());
    }
}
