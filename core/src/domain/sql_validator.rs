// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Regex-only, parse-free gate over a single `SELECT` statement.
//!
//! This is a deliberate simplification, not a limitation awaiting a fix: the
//! supported query shape is narrow enough that a full parser would enlarge
//! the trusted base for no real benefit. The validator is fail-closed at
//! every step — on any ambiguity it rejects rather than guesses. A statement
//! is either fully accepted or fully rejected; there is no partial pass.
//!
//! Nothing here echoes the input back in its rejection reason. Reasons are a
//! closed, sanitized set so a caller can never learn more about *why* a
//! query failed than the category allows (in particular, an ORDER BY column
//! rejected for not being in the allowlist looks identical to one rejected
//! because it does not exist).

use std::collections::{HashMap, HashSet};

use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    NotASelect,
    Comment,
    MultiStatement,
    UnbalancedQuotes,
    Backtick,
    InvalidIdentifier,
    DeniedKeyword,
    NoFromClause,
    AliasConflict,
    UnresolvedQualifier,
    MultipleOrderBy,
    ParenthesesInOrderBy,
    TooManySortKeys,
    InvalidSortKey,
    ColumnNotAllowed,
}

impl ValidationReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::NotASelect => "NOT_A_SELECT",
            Self::Comment => "COMMENT_NOT_ALLOWED",
            Self::MultiStatement => "MULTI_STATEMENT",
            Self::UnbalancedQuotes => "UNBALANCED_QUOTES",
            Self::Backtick => "BACKTICK_NOT_ALLOWED",
            Self::InvalidIdentifier => "INVALID_IDENTIFIER",
            Self::DeniedKeyword => "DENIED_KEYWORD",
            Self::NoFromClause => "NO_FROM_CLAUSE",
            Self::AliasConflict => "ALIAS_CONFLICT",
            Self::UnresolvedQualifier => "UNRESOLVED_QUALIFIER",
            Self::MultipleOrderBy => "MULTIPLE_ORDER_BY",
            Self::ParenthesesInOrderBy => "PARENTHESES_IN_ORDER_BY",
            Self::TooManySortKeys => "TOO_MANY_SORT_KEYS",
            Self::InvalidSortKey => "INVALID_SORT_KEY",
            Self::ColumnNotAllowed => "COLUMN_NOT_ALLOWED",
        }
    }
}

static DENIED_KEYWORDS: &[&str] = &[
    "DROP", "ALTER", "DELETE", "INSERT", "UPDATE", "CREATE", "GRANT", "REVOKE", "EXEC", "UNION",
    "INTO",
];

static CLAUSE_BOUNDARY_WORDS: &[&str] = &[
    "on", "where", "inner", "left", "right", "full", "outer", "cross", "join", "group", "order",
    "having", "limit", "union", "and", "or", "asc", "desc", "as",
];

static MALFORMED_IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9]+[A-Za-z_][A-Za-z0-9_]*\b").unwrap());

static MULTI_STATEMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r";\s*\S").unwrap());

static TABLE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:from|join)\s+((?:[A-Za-z_][A-Za-z0-9_]*\.){0,2}[A-Za-z_][A-Za-z0-9_]*)(?:\s+(?:as\s+)?([A-Za-z_][A-Za-z0-9_]*))?",
    )
    .unwrap()
});

static ORDER_BY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\border\s+by\b").unwrap());

static SORT_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*((?:[A-Za-z_][A-Za-z0-9_]*\.){1,2}[A-Za-z_][A-Za-z0-9_]*)\s+(asc|desc)\s*$")
        .unwrap()
});

struct TableBinding {
    /// `schema.table` (or `table`) as written, case preserved.
    fq_name: String,
    /// Lowercased alias, if any.
    alias: Option<String>,
}

pub struct StaticSqlValidator;

impl StaticSqlValidator {
    /// `allowed_order_by_columns` holds fully-qualified `schema.table.column`
    /// strings the caller (the tool descriptor) permits for this query.
    pub fn validate(
        sql: &str,
        allowed_order_by_columns: &HashSet<String>,
    ) -> Result<(), ValidationReason> {
        Self::normalize_and_reject(sql)?;
        let bindings = Self::extract_table_bindings(sql)?;
        Self::validate_order_by(sql, &bindings, allowed_order_by_columns)?;
        Ok(())
    }

    fn normalize_and_reject(sql: &str) -> Result<(), ValidationReason> {
        let trimmed = sql.trim_start();
        if !trimmed.to_ascii_uppercase().starts_with("SELECT") {
            return Err(ValidationReason::NotASelect);
        }
        if sql.contains("--") || sql.contains("/*") || sql.contains('#') {
            return Err(ValidationReason::Comment);
        }
        if MULTI_STATEMENT_RE.is_match(sql) {
            return Err(ValidationReason::MultiStatement);
        }
        if sql.matches('\'').count() % 2 != 0 || sql.matches('"').count() % 2 != 0 {
            return Err(ValidationReason::UnbalancedQuotes);
        }
        if sql.contains('`') {
            return Err(ValidationReason::Backtick);
        }
        if MALFORMED_IDENTIFIER_RE.is_match(sql) {
            return Err(ValidationReason::InvalidIdentifier);
        }
        let upper = sql.to_ascii_uppercase();
        for keyword in DENIED_KEYWORDS {
            if word_boundary_contains(&upper, keyword) {
                return Err(ValidationReason::DeniedKeyword);
            }
        }
        Ok(())
    }

    fn extract_table_bindings(sql: &str) -> Result<Vec<TableBinding>, ValidationReason> {
        let mut bindings = Vec::new();
        let mut seen_aliases: HashMap<String, ()> = HashMap::new();

        for caps in TABLE_REF_RE.captures_iter(sql) {
            let fq_name = caps.get(1).unwrap().as_str().to_string();
            let alias = caps.get(2).map(|m| m.as_str().to_string()).filter(|a| {
                !CLAUSE_BOUNDARY_WORDS.contains(&a.to_ascii_lowercase().as_str())
            });

            if let Some(ref alias) = alias {
                let key = alias.to_ascii_lowercase();
                if seen_aliases.insert(key, ()).is_some() {
                    return Err(ValidationReason::AliasConflict);
                }
            }

            bindings.push(TableBinding { fq_name, alias });
        }

        if bindings.is_empty() {
            return Err(ValidationReason::NoFromClause);
        }

        Ok(bindings)
    }

    fn validate_order_by(
        sql: &str,
        bindings: &[TableBinding],
        allowed_order_by_columns: &HashSet<String>,
    ) -> Result<(), ValidationReason> {
        let occurrences = ORDER_BY_RE.find_iter(sql).count();
        if occurrences == 0 {
            return Ok(());
        }
        if occurrences > 1 {
            return Err(ValidationReason::MultipleOrderBy);
        }

        let marker = ORDER_BY_RE.find(sql).unwrap();
        let clause = sql[marker.end()..].trim_end_matches(|c: char| c == ';' || c.is_whitespace());

        if clause.contains('(') || clause.contains(')') {
            return Err(ValidationReason::ParenthesesInOrderBy);
        }

        let keys: Vec<&str> = clause.split(',').collect();
        if keys.len() > 2 {
            return Err(ValidationReason::TooManySortKeys);
        }

        for key in keys {
            let caps = SORT_KEY_RE
                .captures(key)
                .ok_or(ValidationReason::InvalidSortKey)?;
            let path = caps.get(1).unwrap().as_str();

            let fq_column = Self::resolve_qualified_column(path, bindings)
                .ok_or(ValidationReason::UnresolvedQualifier)?;

            if !allowed_order_by_columns.contains(&fq_column) {
                return Err(ValidationReason::ColumnNotAllowed);
            }
        }

        Ok(())
    }

    /// Resolve a dotted `qualifier(.qualifier).column` path against the
    /// table bindings into a fully-qualified `schema.table.column`, or
    /// `None` if the qualifier is not bound by any FROM/JOIN clause.
    fn resolve_qualified_column(path: &str, bindings: &[TableBinding]) -> Option<String> {
        let parts: Vec<&str> = path.split('.').collect();
        let (qualifier, column) = match parts.len() {
            2 => (parts[0].to_string(), parts[1]),
            3 => (format!("{}.{}", parts[0], parts[1]), parts[2]),
            _ => return None,
        };

        if parts.len() == 2 {
            // Qualifier might be an alias, or a single-component table name
            // bound without a schema.
            let alias_match = bindings
                .iter()
                .find(|b| b.alias.as_deref() == Some(qualifier.to_ascii_lowercase().as_str()));
            if let Some(binding) = alias_match {
                return Some(format!("{}.{}", binding.fq_name, column));
            }
            let bare_match = bindings.iter().find(|b| b.fq_name == qualifier);
            if let Some(binding) = bare_match {
                return Some(format!("{}.{}", binding.fq_name, column));
            }
            return None;
        }

        // Three-part path: qualifier must equal a bound schema.table exactly.
        bindings
            .iter()
            .find(|b| b.fq_name == qualifier)
            .map(|binding| format!("{}.{}", binding.fq_name, column))
    }
}

fn word_boundary_contains(haystack_upper: &str, word: &str) -> bool {
    let bytes = haystack_upper.as_bytes();
    let word_bytes = word.as_bytes();
    let mut start = 0;
    while let Some(pos) = haystack_upper[start..].find(word) {
        let idx = start + pos;
        let before_ok = idx == 0 || !bytes[idx - 1].is_ascii_alphanumeric() && bytes[idx - 1] != b'_';
        let after = idx + word_bytes.len();
        let after_ok = after >= bytes.len()
            || (!bytes[after].is_ascii_alphanumeric() && bytes[after] != b'_');
        if before_ok && after_ok {
            return true;
        }
        start = idx + 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow(cols: &[&str]) -> HashSet<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accepts_simple_allowed_query() {
        let sql = "SELECT u.id FROM public.users u ORDER BY u.id ASC";
        assert!(StaticSqlValidator::validate(sql, &allow(&["public.users.id"])).is_ok());
    }

    #[test]
    fn rejects_when_not_select() {
        let sql = "UPDATE public.users SET x = 1";
        assert_eq!(
            StaticSqlValidator::validate(sql, &HashSet::new()).unwrap_err(),
            ValidationReason::NotASelect
        );
    }

    #[test]
    fn rejects_line_comment() {
        let sql = "SELECT u.id FROM public.users u -- drop everything\nORDER BY u.id ASC";
        assert_eq!(
            StaticSqlValidator::validate(sql, &allow(&["public.users.id"])).unwrap_err(),
            ValidationReason::Comment
        );
    }

    #[test]
    fn rejects_block_comment() {
        let sql = "SELECT u.id /* sneaky */ FROM public.users u";
        assert_eq!(
            StaticSqlValidator::validate(sql, &HashSet::new()).unwrap_err(),
            ValidationReason::Comment
        );
    }

    #[test]
    fn rejects_hash_comment() {
        let sql = "SELECT u.id FROM public.users u # comment";
        assert_eq!(
            StaticSqlValidator::validate(sql, &HashSet::new()).unwrap_err(),
            ValidationReason::Comment
        );
    }

    #[test]
    fn rejects_multi_statement() {
        let sql = "SELECT u.id FROM public.users u; DROP TABLE public.users";
        assert_eq!(
            StaticSqlValidator::validate(sql, &HashSet::new()).unwrap_err(),
            ValidationReason::MultiStatement
        );
    }

    #[test]
    fn allows_trailing_semicolon() {
        let sql = "SELECT u.id FROM public.users u;";
        assert!(StaticSqlValidator::validate(sql, &HashSet::new()).is_ok());
    }

    #[test]
    fn rejects_unbalanced_quotes() {
        let sql = "SELECT u.id FROM public.users u WHERE u.name = 'unterminated";
        assert_eq!(
            StaticSqlValidator::validate(sql, &HashSet::new()).unwrap_err(),
            ValidationReason::UnbalancedQuotes
        );
    }

    #[test]
    fn rejects_backtick() {
        let sql = "SELECT `u`.id FROM public.users u";
        assert_eq!(
            StaticSqlValidator::validate(sql, &HashSet::new()).unwrap_err(),
            ValidationReason::Backtick
        );
    }

    #[test]
    fn rejects_identifier_starting_with_digit() {
        let sql = "SELECT u.id FROM public.1users u";
        assert_eq!(
            StaticSqlValidator::validate(sql, &HashSet::new()).unwrap_err(),
            ValidationReason::InvalidIdentifier
        );
    }

    #[test]
    fn rejects_denied_keyword() {
        let sql = "SELECT u.id FROM public.users u WHERE u.id IN (SELECT id FROM x) UNION SELECT 1";
        assert_eq!(
            StaticSqlValidator::validate(sql, &HashSet::new()).unwrap_err(),
            ValidationReason::DeniedKeyword
        );
    }

    #[test]
    fn rejects_duplicate_alias_case_insensitive() {
        let sql = "SELECT u.id FROM public.users u JOIN public.orders U ON u.id = U.id";
        assert_eq!(
            StaticSqlValidator::validate(sql, &HashSet::new()).unwrap_err(),
            ValidationReason::AliasConflict
        );
    }

    #[test]
    fn rejects_order_by_on_unbound_alias() {
        let sql = "SELECT u.id FROM public.users u ORDER BY o.id ASC";
        assert_eq!(
            StaticSqlValidator::validate(sql, &allow(&["public.orders.id"])).unwrap_err(),
            ValidationReason::UnresolvedQualifier
        );
    }

    #[test]
    fn rejects_second_order_by() {
        let sql = "SELECT u.id FROM public.users u ORDER BY u.id ASC ORDER BY u.id DESC";
        assert_eq!(
            StaticSqlValidator::validate(sql, &allow(&["public.users.id"])).unwrap_err(),
            ValidationReason::MultipleOrderBy
        );
    }

    #[test]
    fn rejects_three_sort_keys() {
        let sql = "SELECT u.id FROM public.users u ORDER BY u.id ASC, u.a ASC, u.b DESC";
        assert_eq!(
            StaticSqlValidator::validate(
                sql,
                &allow(&["public.users.id", "public.users.a", "public.users.b"])
            )
            .unwrap_err(),
            ValidationReason::TooManySortKeys
        );
    }

    #[test]
    fn rejects_implicit_direction() {
        let sql = "SELECT u.id FROM public.users u ORDER BY u.id";
        assert_eq!(
            StaticSqlValidator::validate(sql, &allow(&["public.users.id"])).unwrap_err(),
            ValidationReason::InvalidSortKey
        );
    }

    #[test]
    fn rejects_nulls_first() {
        let sql = "SELECT u.id FROM public.users u ORDER BY u.id ASC NULLS FIRST";
        assert_eq!(
            StaticSqlValidator::validate(sql, &allow(&["public.users.id"])).unwrap_err(),
            ValidationReason::InvalidSortKey
        );
    }

    #[test]
    fn rejects_parentheses_in_order_by() {
        let sql = "SELECT u.id FROM public.users u ORDER BY (u.id) ASC";
        assert_eq!(
            StaticSqlValidator::validate(sql, &allow(&["public.users.id"])).unwrap_err(),
            ValidationReason::ParenthesesInOrderBy
        );
    }

    #[test]
    fn rejects_bare_column_without_qualifier() {
        let sql = "SELECT u.id FROM public.users u ORDER BY id ASC";
        assert_eq!(
            StaticSqlValidator::validate(sql, &allow(&["public.users.id"])).unwrap_err(),
            ValidationReason::InvalidSortKey
        );
    }

    #[test]
    fn rejects_column_not_in_allowlist_without_revealing_existence() {
        let sql = "SELECT u.id FROM public.users u ORDER BY u.secret_col DESC";
        assert_eq!(
            StaticSqlValidator::validate(sql, &allow(&["public.users.id"])).unwrap_err(),
            ValidationReason::ColumnNotAllowed
        );
    }

    #[test]
    fn resolves_join_alias_and_allows_two_keys() {
        let sql = "SELECT u.id FROM public.users u JOIN public.orders o ON o.user_id = u.id ORDER BY u.id ASC, o.created_at DESC";
        assert!(StaticSqlValidator::validate(
            sql,
            &allow(&["public.users.id", "public.orders.created_at"])
        )
        .is_ok());
    }

    #[test]
    fn rejection_is_stable_across_runs() {
        let sql = "SELECT u.id FROM public.users u ORDER BY u.secret DESC";
        let allowed = allow(&["public.users.id"]);
        let first = StaticSqlValidator::validate(sql, &allowed);
        let second = StaticSqlValidator::validate(sql, &allowed);
        assert_eq!(first, second);
    }
}
