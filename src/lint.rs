//! Style lint pass over source text.
//!
//! Runs independently of [`crate::scanner`] and reports two warning kinds:
//! numeric literals outside comment lines, and out-of-line member function
//! definitions whose body exceeds a line budget. Only lines that *start*
//! with `//` are treated as comments; block comments and trailing comments
//! are not recognized.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::scanner::matching_brace;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+\.[0-9]+f?|[1-9][0-9]*").expect("number regex"));
static MEMBER_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\w+\s+\w+::\w+\([^)]*\)\s*(?:const)?\s*\{").expect("member definition regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LintKind {
    MagicNumber,
    LongFunction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintIssue {
    #[serde(rename = "type")]
    pub kind: LintKind,
    pub line: usize,
    pub message: String,
    pub severity: &'static str,
    /// The trimmed source line the issue points at.
    pub context: String,
}

/// Run every check over `text`. Issues are ordered by check, then position.
pub fn check(text: &str, long_function_lines: usize) -> Vec<LintIssue> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut issues = magic_numbers(text, &lines);
    issues.extend(long_functions(text, &lines, long_function_lines));
    issues
}

fn line_index(text: &str, offset: usize) -> usize {
    text[..offset].bytes().filter(|b| *b == b'\n').count()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn magic_numbers(text: &str, lines: &[&str]) -> Vec<LintIssue> {
    let mut issues = Vec::new();

    for m in NUMBER.find_iter(text) {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        if before.is_some_and(is_word_char) {
            continue;
        }
        let is_decimal = m.as_str().contains('.');
        let bad_follower = match after {
            Some(c) if is_word_char(c) => true,
            Some('.') => !is_decimal,
            _ => false,
        };
        if bad_follower {
            continue;
        }

        let idx = line_index(text, m.start());
        let context = lines.get(idx).map(|l| l.trim()).unwrap_or_default();
        if context.starts_with("//") {
            continue;
        }
        issues.push(LintIssue {
            kind: LintKind::MagicNumber,
            line: idx + 1,
            message: format!(
                "Magic number {} found. Consider using a named constant.",
                m.as_str()
            ),
            severity: "warning",
            context: context.to_string(),
        });
    }

    issues
}

fn long_functions(text: &str, lines: &[&str], max_lines: usize) -> Vec<LintIssue> {
    let mut issues = Vec::new();

    for m in MEMBER_DEFINITION.find_iter(text) {
        let open = m.end() - 1;
        let Some(close) = matching_brace(text, open) else {
            continue;
        };
        let body_lines = text[open + 1..close].split('\n').count();
        if body_lines <= max_lines {
            continue;
        }
        let idx = line_index(text, m.start());
        issues.push(LintIssue {
            kind: LintKind::LongFunction,
            line: idx + 1,
            message: format!(
                "Function is {} lines long. Consider refactoring.",
                body_lines
            ),
            severity: "warning",
            context: lines
                .get(idx)
                .map(|l| l.trim().to_string())
                .unwrap_or_default(),
        });
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magic(text: &str) -> Vec<String> {
        check(text, 50)
            .into_iter()
            .filter(|i| i.kind == LintKind::MagicNumber)
            .map(|i| i.message)
            .collect()
    }

    #[test]
    fn flags_integer_and_decimal_literals() {
        let found = magic("Health = 100;\nSpeed = 1.5f;\n");
        assert_eq!(
            found,
            vec![
                "Magic number 100 found. Consider using a named constant.",
                "Magic number 1.5f found. Consider using a named constant.",
            ]
        );
    }

    #[test]
    fn ignores_identifiers_zero_and_comment_lines() {
        assert!(magic("int Var2 = 0;\nFVector3f V;\n").is_empty());
        assert!(magic("  // retry 3 times\n").is_empty());
    }

    #[test]
    fn trailing_comment_is_still_scanned() {
        let issues = check("Ammo = 30; // clip\n", 50);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line, 1);
        assert_eq!(issues[0].context, "Ammo = 30; // clip");
        assert_eq!(issues[0].severity, "warning");
    }

    #[test]
    fn long_member_function_is_reported() {
        let mut text = String::from("void AHero::Tick(float Delta)\n{\n");
        for _ in 0..60 {
            text.push_str("    Step();\n");
        }
        text.push_str("}\n");

        let issues: Vec<LintIssue> = check(&text, 50)
            .into_iter()
            .filter(|i| i.kind == LintKind::LongFunction)
            .collect();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line, 1);
        assert_eq!(
            issues[0].message,
            "Function is 62 lines long. Consider refactoring."
        );
        assert_eq!(issues[0].context, "void AHero::Tick(float Delta)");
    }

    #[test]
    fn short_member_function_passes() {
        let text = "void AHero::Jump() {\n    Super::Jump();\n}\n";
        assert!(check(text, 50)
            .iter()
            .all(|i| i.kind != LintKind::LongFunction));
    }
}
