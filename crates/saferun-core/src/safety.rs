//! Dangerous-command analysis.
//!
//! Classifies a shell command string against four ordered rule families
//! (file deletion, database modification, credential exposure, network
//! exposure) and produces a [`SafetyAnalysis`] with a risk level, a
//! recommendation, and — for blocked commands — a safer rewrite.
//!
//! `analyze` never fails: a rule whose pattern does not compile simply does
//! not match, and an unclassifiable command is reported as safe. This trades
//! false negatives for availability; the analyzer is a best-effort net, not
//! a security boundary.

use regex::Regex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Analysis types
// ---------------------------------------------------------------------------

/// Rule family a violation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    FileDeletion,
    DbModification,
    CredentialExposure,
    NetworkExposure,
}

/// Severity of a matched rule. Ordered so "worst severity" is a plain `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Overall risk of a command, derived from the worst violation severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// What the caller should do with the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Allow,
    Warn,
    Block,
}

/// One matched unsafe pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Rule family that fired.
    pub kind: ViolationKind,
    /// Severity of the matched rule.
    pub severity: Severity,
    /// Human-readable explanation.
    pub description: String,
    /// The matched rule pattern, kept for audit.
    pub pattern: String,
}

/// Result of analyzing one command string. Constructed fresh per call,
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyAnalysis {
    /// Whether the command matched no unsafe pattern.
    pub safe: bool,
    /// Violations in rule-family order (empty when safe).
    pub violations: Vec<Violation>,
    /// Worst severity across all violations (`Low` when none fired).
    pub risk_level: RiskLevel,
    /// Allow, warn, or block.
    pub recommendation: Recommendation,
    /// Safer rewrite of the command; always present when blocked.
    pub alternative: Option<String>,
}

impl SafetyAnalysis {
    /// Whether the recommendation is `Block`.
    pub fn blocked(&self) -> bool {
        self.recommendation == Recommendation::Block
    }

    /// Whether any violation is destructive (file deletion or database
    /// modification). Destructive commands require explicit confirmation
    /// even at `Warn` level.
    pub fn destructive(&self) -> bool {
        self.violations.iter().any(|v| {
            matches!(
                v.kind,
                ViolationKind::FileDeletion | ViolationKind::DbModification
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

struct SafetyRule {
    kind: ViolationKind,
    severity: Severity,
    pattern: &'static str,
    description: &'static str,
}

/// Ordered rule families. Within a family the first matching rule wins, so a
/// command contributes at most one violation per family and `rm -rf` is
/// reported as recursive-force deletion rather than also as plain force
/// deletion.
const RULES: &[&[SafetyRule]] = &[
    // File deletion
    &[
        SafetyRule {
            kind: ViolationKind::FileDeletion,
            severity: Severity::Critical,
            pattern: r"(?i)\brm\s+-[a-z]*r[a-z]*f|\brm\s+-[a-z]*f[a-z]*r",
            description: "recursive force deletion without confirmation",
        },
        SafetyRule {
            kind: ViolationKind::FileDeletion,
            severity: Severity::High,
            pattern: r"(?i)\brm\s+-[a-z]*f",
            description: "force deletion without confirmation",
        },
        SafetyRule {
            kind: ViolationKind::FileDeletion,
            severity: Severity::Critical,
            pattern: r"(?i)\b(shred|mkfs)\b",
            description: "irreversible disk-level destruction",
        },
    ],
    // Database modification
    &[
        SafetyRule {
            kind: ViolationKind::DbModification,
            severity: Severity::Critical,
            pattern: r"(?i)\bdrop\s+(table|database|schema)\b",
            description: "drops a table, schema, or entire database",
        },
        SafetyRule {
            kind: ViolationKind::DbModification,
            severity: Severity::High,
            pattern: r"(?i)\btruncate\s+table\b",
            description: "truncates a table without backup",
        },
        SafetyRule {
            kind: ViolationKind::DbModification,
            severity: Severity::High,
            pattern: r"(?i)\bdelete\s+from\s+\S+\s*;?\s*$",
            description: "DELETE without a WHERE clause",
        },
    ],
    // Credential exposure
    &[
        SafetyRule {
            kind: ViolationKind::CredentialExposure,
            severity: Severity::Critical,
            pattern: r"AKIA[0-9A-Z]{16}",
            description: "AWS access key id embedded in command",
        },
        SafetyRule {
            kind: ViolationKind::CredentialExposure,
            severity: Severity::High,
            pattern: r#"(?i)\b(password|passwd|pwd|api[_-]?key|secret[_-]?key|access[_-]?token)\s*[=:]\s*['"]?[^\s'"$]+"#,
            description: "secret value inlined in command text",
        },
        SafetyRule {
            kind: ViolationKind::CredentialExposure,
            severity: Severity::High,
            pattern: r"(?i)\bcurl\b.*\s-u\s+\S+:\S+",
            description: "credentials passed on the curl command line",
        },
        SafetyRule {
            kind: ViolationKind::CredentialExposure,
            severity: Severity::Medium,
            pattern: r"(?i)\bcat\b.*(\.env\b|id_rsa\b|credentials\b)",
            description: "prints a credentials file to stdout",
        },
    ],
    // Network exposure
    &[
        SafetyRule {
            kind: ViolationKind::NetworkExposure,
            severity: Severity::Critical,
            pattern: r"(?i)\bcurl\b[^|]*\|\s*(ba|z)?sh\b|\bwget\b[^|]*\|\s*(ba|z)?sh\b",
            description: "pipes a remote script directly into a shell",
        },
        SafetyRule {
            kind: ViolationKind::NetworkExposure,
            severity: Severity::Critical,
            pattern: r"(?i)\bufw\s+disable\b|\biptables\s+(-F|--flush)\b",
            description: "disables or flushes the firewall",
        },
        SafetyRule {
            kind: ViolationKind::NetworkExposure,
            severity: Severity::High,
            pattern: r"0\.0\.0\.0",
            description: "binds a service to all network interfaces",
        },
        SafetyRule {
            kind: ViolationKind::NetworkExposure,
            severity: Severity::Medium,
            pattern: r"(?i)\bnc\b\s+(-[a-z]+\s+)*-?l",
            description: "opens a raw listening socket",
        },
    ],
];

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Pattern-based command classifier. Stateless; cheap to construct and share.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyAnalyzer;

impl SafetyAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Classify a command string. Pure, side-effect free, and infallible:
    /// a rule that cannot be evaluated counts as not matched.
    pub fn analyze(&self, command: &str) -> SafetyAnalysis {
        let mut violations = Vec::new();

        for family in RULES {
            for rule in *family {
                let matched = Regex::new(rule.pattern)
                    .map(|re| re.is_match(command))
                    .unwrap_or(false);
                if matched {
                    violations.push(Violation {
                        kind: rule.kind,
                        severity: rule.severity,
                        description: rule.description.to_string(),
                        pattern: rule.pattern.to_string(),
                    });
                    // First match wins within a family.
                    break;
                }
            }
        }

        let worst = violations.iter().map(|v| v.severity).max();
        let risk_level = match worst {
            None => RiskLevel::Low,
            Some(Severity::Low) => RiskLevel::Low,
            Some(Severity::Medium) => RiskLevel::Medium,
            Some(Severity::High) => RiskLevel::High,
            Some(Severity::Critical) => RiskLevel::Critical,
        };

        let high_count = violations
            .iter()
            .filter(|v| v.severity == Severity::High)
            .count();

        // Policy: one high-severity violation warns; more than one blocks.
        let recommendation = match risk_level {
            RiskLevel::Critical => Recommendation::Block,
            RiskLevel::High if high_count > 1 => Recommendation::Block,
            RiskLevel::High | RiskLevel::Medium => Recommendation::Warn,
            RiskLevel::Low => Recommendation::Allow,
        };

        let alternative = if recommendation == Recommendation::Block {
            Some(suggest_alternative(command))
        } else {
            None
        };

        SafetyAnalysis {
            safe: violations.is_empty(),
            violations,
            risk_level,
            recommendation,
            alternative,
        }
    }
}

/// Produce a safer rewrite of a blocked command.
///
/// Applies a small set of per-pattern textual substitutions and falls back
/// to a generic review comment when no specific rewrite applies.
pub fn suggest_alternative(command: &str) -> String {
    // Force/recursive deletion -> interactive deletion.
    if let Ok(re) = Regex::new(r"(?i)(\brm\s+)-[a-z]*[rf][a-z]*") {
        if re.is_match(command) {
            return re.replace_all(command, "${1}-i").into_owned();
        }
    }

    // Wildcard bind -> loopback.
    if command.contains("0.0.0.0") {
        return command.replace("0.0.0.0", "127.0.0.1");
    }

    // Inline secret -> environment-variable placeholder.
    if let Ok(re) =
        Regex::new(r#"(?i)\b(password|passwd|pwd|api[_-]?key|secret[_-]?key|access[_-]?token)(\s*[=:]\s*)['"]?[^\s'"$]+['"]?"#)
    {
        if re.is_match(command) {
            return re
                .replace_all(command, "${1}${2}\"$$SECRET_FROM_ENV\"")
                .into_owned();
        }
    }

    // Pipe-to-shell -> download, inspect, then run.
    if let Ok(re) = Regex::new(r"(?i)\|\s*(ba|z)?sh\b") {
        if re.is_match(command) {
            let fetch = re.replace_all(command, "").into_owned();
            return format!("{} -o script.sh && less script.sh", fetch.trim_end());
        }
    }

    // Destructive SQL -> wrap in a reviewable transaction.
    if let Ok(re) = Regex::new(r"(?i)\b(drop|truncate|delete)\b") {
        if re.is_match(command) {
            return format!("-- run inside a transaction and verify first:\nBEGIN; {command}; ROLLBACK;");
        }
    }

    format!("# review and modify before running: {command}")
}
