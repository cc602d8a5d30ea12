//! Safety gate for generated SQL.
//!
//! Classifies a candidate statement as allowed or denied before it reaches
//! the execution sandbox. The check is syntactic: a statement must start
//! with `SELECT` and must not mention any mutating or DDL keyword as a
//! whole word, anywhere. Keywords inside string literals or comments are
//! also rejected; read-only statements that quote those words are denied.

use std::sync::LazyLock;

use regex::Regex;

/// Mutating and DDL keywords that are never allowed.
pub const DENIED_KEYWORDS: [&str; 10] = [
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "CREATE", "TRUNCATE", "REPLACE", "GRANT",
    "REVOKE",
];

static DENIED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", DENIED_KEYWORDS.join("|"))).unwrap()
});

static SELECT_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^SELECT\b").unwrap());

/// Decision made by the safety gate about a candidate statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyDecision {
    /// The statement may be executed.
    Allow,
    /// The statement must not be executed.
    Deny { reason: String },
}

impl SafetyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SafetyDecision::Allow)
    }
}

/// Read-only SQL classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlSafetyGate;

impl SqlSafetyGate {
    pub fn new() -> Self {
        Self
    }

    /// Classify a candidate statement.
    pub fn classify(&self, sql: &str) -> SafetyDecision {
        let normalized = normalize(sql);

        if normalized.is_empty() {
            return SafetyDecision::Deny {
                reason: "Empty SQL statement".to_string(),
            };
        }

        if let Some(m) = DENIED_RE.find(normalized) {
            return SafetyDecision::Deny {
                reason: format!(
                    "SQL contains a forbidden operation ({}); only SELECT queries are allowed",
                    m.as_str().to_ascii_uppercase()
                ),
            };
        }

        if !SELECT_PREFIX_RE.is_match(normalized) {
            return SafetyDecision::Deny {
                reason: "Only SELECT statements are allowed".to_string(),
            };
        }

        SafetyDecision::Allow
    }
}

/// Trim surrounding whitespace and a single trailing statement separator.
fn normalize(sql: &str) -> &str {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SqlSafetyGate {
        SqlSafetyGate::new()
    }

    #[test]
    fn test_simple_select_allowed() {
        assert_eq!(
            gate().classify("SELECT region, SUM(amount) FROM orders GROUP BY region;"),
            SafetyDecision::Allow
        );
        assert!(gate().classify("  select * from products  ").is_allowed());
    }

    #[test]
    fn test_empty_denied() {
        assert!(!gate().classify("").is_allowed());
        assert!(!gate().classify("   ;  ").is_allowed());
    }

    #[test]
    fn test_every_denied_keyword_at_start() {
        for kw in DENIED_KEYWORDS {
            let sql = format!("{} TABLE orders;", kw);
            assert!(!gate().classify(&sql).is_allowed(), "{} should be denied", kw);
            let lower = sql.to_lowercase();
            assert!(!gate().classify(&lower).is_allowed(), "{} should be denied", lower);
        }
    }

    #[test]
    fn test_denied_keyword_anywhere() {
        let decision = gate().classify("SELECT * FROM orders; DROP TABLE orders;");
        match decision {
            SafetyDecision::Deny { reason } => assert!(reason.contains("DROP")),
            SafetyDecision::Allow => panic!("expected deny"),
        }
        assert!(!gate()
            .classify("SELECT * FROM t WHERE id IN (SELECT id FROM u) UNION SELECT 1; delete from t")
            .is_allowed());
    }

    #[test]
    fn test_keyword_must_be_whole_word() {
        assert!(gate()
            .classify("SELECT created_at, updated_by FROM orders")
            .is_allowed());
        assert!(gate().classify("SELECT dropped FROM inserts_log").is_allowed());
    }

    #[test]
    fn test_keyword_in_literal_is_denied() {
        // Conservative on purpose: the check does not parse literals.
        assert!(!gate()
            .classify("SELECT * FROM notes WHERE body = 'please update me'")
            .is_allowed());
    }

    #[test]
    fn test_non_select_denied() {
        assert!(!gate().classify("PRAGMA table_info(orders)").is_allowed());
        assert!(!gate()
            .classify("WITH t AS (SELECT 1) SELECT * FROM t")
            .is_allowed());
        assert!(!gate().classify("SELECTION FROM x").is_allowed());
    }

    #[test]
    fn test_only_one_trailing_separator_removed() {
        assert!(gate().classify("SELECT 1;").is_allowed());
        assert!(gate().classify("SELECT 1;;").is_allowed());
    }
}
