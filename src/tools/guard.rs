//! Statement guard for the query tool.
//!
//! Every statement passes through [`classify`] before it reaches a database
//! connection. The check is a prefix test plus a whole-word denylist scan, not
//! a parser: it rejects anything that does not start with `SELECT`, mentions a
//! mutating or DDL keyword anywhere, or carries a second statement after a
//! semicolon.
//!
//! [`GuardMode::LiteralAware`] runs the same rules over sqlparser tokens so
//! that keywords inside string literals, quoted identifiers and comments are
//! ignored. Conservative mode stays the default.

use clap::ValueEnum;
use sqlparser::dialect::{GenericDialect, PostgreSqlDialect};
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::error::{GatewayError, GatewayResult};
use crate::models::PlaceholderStyle;

/// Keywords that reject a statement wherever they appear as a whole word.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE",
];

const SELECT_KEYWORD: &str = "SELECT";

/// Why a statement was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    EmptyStatement,
    NotASelect,
    /// Holds the keyword in upper case.
    ForbiddenKeyword(String),
    MultipleStatements,
    ParameterMismatch { expected: usize, supplied: usize },
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyStatement => "EMPTY_STATEMENT",
            Self::NotASelect => "NOT_A_SELECT",
            Self::ForbiddenKeyword(_) => "FORBIDDEN_KEYWORD",
            Self::MultipleStatements => "MULTIPLE_STATEMENTS",
            Self::ParameterMismatch { .. } => "PARAMETER_MISMATCH",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::EmptyStatement => "Provide a SELECT statement",
            Self::NotASelect => "Only read-only SELECT statements can be executed",
            Self::ForbiddenKeyword(_) => {
                "Remove data-modifying or DDL keywords; this server is read-only"
            }
            Self::MultipleStatements => "Send one statement per call without a second ';' clause",
            Self::ParameterMismatch { .. } => {
                "Supply exactly one parameter per placeholder ($1, $2, ...)"
            }
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyStatement => write!(f, "statement is empty"),
            Self::NotASelect => write!(f, "only SELECT statements are allowed"),
            Self::ForbiddenKeyword(keyword) => write!(f, "forbidden keyword {}", keyword),
            Self::MultipleStatements => write!(f, "multiple statements are not allowed"),
            Self::ParameterMismatch { expected, supplied } => write!(
                f,
                "statement expects {} parameter(s) but {} were supplied",
                expected, supplied
            ),
        }
    }
}

/// Outcome of classifying a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementVerdict {
    Safe,
    Rejected(RejectionReason),
}

impl StatementVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }

    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            Self::Safe => None,
            Self::Rejected(reason) => Some(reason),
        }
    }
}

/// How the denylist and semicolon rules see the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum GuardMode {
    /// Raw text scan; keywords inside literals still reject.
    #[default]
    Conservative,
    /// Token scan; literals, quoted identifiers and comments are skipped.
    LiteralAware,
}

impl std::fmt::Display for GuardMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conservative => write!(f, "conservative"),
            Self::LiteralAware => write!(f, "literal-aware"),
        }
    }
}

/// Classify a statement with the conservative rules.
///
/// # Examples
///
/// ```
/// use postgres_mcp_server::tools::guard::{classify, RejectionReason, StatementVerdict};
///
/// assert_eq!(classify("SELECT * FROM users"), StatementVerdict::Safe);
/// assert_eq!(
///     classify("  "),
///     StatementVerdict::Rejected(RejectionReason::EmptyStatement)
/// );
/// assert_eq!(
///     classify("SELECT * FROM users; SELECT * FROM orders"),
///     StatementVerdict::Rejected(RejectionReason::MultipleStatements)
/// );
/// ```
pub fn classify(sql: &str) -> StatementVerdict {
    match check_conservative(sql) {
        Ok(()) => StatementVerdict::Safe,
        Err(reason) => StatementVerdict::Rejected(reason),
    }
}

/// Statement guard bound to a [`GuardMode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementGuard {
    mode: GuardMode,
}

impl StatementGuard {
    pub fn new(mode: GuardMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    pub fn classify(&self, sql: &str) -> StatementVerdict {
        let checked = match self.mode {
            GuardMode::Conservative => check_conservative(sql),
            GuardMode::LiteralAware => check_literal_aware(sql),
        };
        match checked {
            Ok(()) => StatementVerdict::Safe,
            Err(reason) => StatementVerdict::Rejected(reason),
        }
    }

    /// Classify the statement, then check its placeholders against the
    /// supplied parameter count.
    pub fn validate(
        &self,
        sql: &str,
        supplied: usize,
        style: PlaceholderStyle,
    ) -> GatewayResult<()> {
        if let StatementVerdict::Rejected(reason) = self.classify(sql) {
            return Err(GatewayError::rejected(reason));
        }
        check_parameters(sql, supplied, style).map_err(GatewayError::rejected)
    }
}

// =========================================================================
// Conservative rules
// =========================================================================

fn check_conservative(sql: &str) -> Result<(), RejectionReason> {
    let trimmed = check_prefix(sql)?;
    if let Some(keyword) = find_forbidden_word(trimmed) {
        return Err(RejectionReason::ForbiddenKeyword(keyword));
    }
    if has_trailing_statement(trimmed) {
        return Err(RejectionReason::MultipleStatements);
    }
    Ok(())
}

/// Empty and prefix checks shared by both modes. Returns the trimmed text.
fn check_prefix(sql: &str) -> Result<&str, RejectionReason> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(RejectionReason::EmptyStatement);
    }
    let starts_with_select = trimmed
        .get(..SELECT_KEYWORD.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(SELECT_KEYWORD));
    let boundary = trimmed
        .get(SELECT_KEYWORD.len()..)
        .and_then(|rest| rest.chars().next())
        .is_none_or(|c| !is_identifier_char(c));
    if starts_with_select && boundary {
        Ok(trimmed)
    } else {
        Err(RejectionReason::NotASelect)
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn forbidden_keyword(word: &str) -> Option<&'static str> {
    FORBIDDEN_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| keyword.eq_ignore_ascii_case(word))
}

/// First denylisted whole word in statement order.
fn find_forbidden_word(text: &str) -> Option<String> {
    text.split(|c: char| !is_word_char(c))
        .filter(|word| !word.is_empty())
        .find_map(forbidden_keyword)
        .map(str::to_string)
}

/// A `;` followed by anything other than whitespace.
fn has_trailing_statement(text: &str) -> bool {
    text.match_indices(';')
        .any(|(idx, _)| !text[idx + 1..].trim().is_empty())
}

// =========================================================================
// Literal-aware rules
// =========================================================================

fn check_literal_aware(sql: &str) -> Result<(), RejectionReason> {
    check_prefix(sql)?;
    let dialect = PostgreSqlDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::debug!(error = %e, "Tokenizer failed, using conservative rules");
            return check_conservative(sql);
        }
    };

    for token in &tokens {
        if let Token::Word(word) = token {
            if word.quote_style.is_none() {
                if let Some(keyword) = forbidden_keyword(&word.value) {
                    return Err(RejectionReason::ForbiddenKeyword(keyword.to_string()));
                }
            }
        }
    }

    let mut after_semicolon = false;
    for token in &tokens {
        match token {
            Token::SemiColon => after_semicolon = true,
            Token::Whitespace(_) | Token::EOF => {}
            _ if after_semicolon => return Err(RejectionReason::MultipleStatements),
            _ => {}
        }
    }
    Ok(())
}

// =========================================================================
// Parameter alignment
// =========================================================================

/// Number of positional parameters the statement binds.
///
/// Placeholders inside string literals and comments are not counted. If the
/// statement cannot be tokenized a plain text scan is used instead.
pub fn expected_parameters(sql: &str, style: PlaceholderStyle) -> usize {
    let dialect = GenericDialect {};
    let placeholders: Vec<String> = match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => tokens
            .into_iter()
            .filter_map(|token| match token {
                Token::Placeholder(p) => Some(p),
                _ => None,
            })
            .collect(),
        Err(_) => scan_placeholders(sql),
    };

    let mut highest = 0usize;
    for placeholder in &placeholders {
        match style {
            PlaceholderStyle::Dollar => {
                if let Some(index) = numbered(placeholder, '$') {
                    highest = highest.max(index);
                }
            }
            PlaceholderStyle::Question => {
                if placeholder == "?" {
                    // A bare `?` takes the next index after the largest seen.
                    highest += 1;
                } else if let Some(index) =
                    numbered(placeholder, '?').or_else(|| numbered(placeholder, '$'))
                {
                    highest = highest.max(index);
                }
            }
        }
    }
    highest
}

fn numbered(placeholder: &str, prefix: char) -> Option<usize> {
    placeholder.strip_prefix(prefix)?.parse().ok()
}

/// Textual fallback for [`expected_parameters`].
fn scan_placeholders(sql: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut chars = sql.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != '$' && c != '?' {
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(idx, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            end = idx + d.len_utf8();
            chars.next();
        }
        found.push(sql[start..end].to_string());
    }
    found
}

/// Reject when the supplied parameter count differs from the placeholders.
pub fn check_parameters(
    sql: &str,
    supplied: usize,
    style: PlaceholderStyle,
) -> Result<(), RejectionReason> {
    let expected = expected_parameters(sql, style);
    if expected == supplied {
        Ok(())
    } else {
        Err(RejectionReason::ParameterMismatch { expected, supplied })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(sql: &str) -> Option<RejectionReason> {
        classify(sql).rejection().cloned()
    }

    // =========================================================================
    // Prefix and empty checks
    // =========================================================================

    #[test]
    fn test_empty_statement() {
        assert_eq!(rejected(""), Some(RejectionReason::EmptyStatement));
        assert_eq!(rejected("   \n\t"), Some(RejectionReason::EmptyStatement));
    }

    #[test]
    fn test_select_is_safe() {
        assert!(classify("SELECT * FROM users").is_safe());
        assert!(classify("  select id from users  ").is_safe());
        assert!(classify("SeLeCt 1").is_safe());
        assert!(classify("SELECT").is_safe());
        assert!(classify("SELECT(1)").is_safe());
        assert!(classify("SELECT*FROM users").is_safe());
    }

    #[test]
    fn test_not_a_select() {
        assert_eq!(rejected("WITH x AS (SELECT 1) SELECT * FROM x"), Some(RejectionReason::NotASelect));
        assert_eq!(rejected("SHOW TABLES"), Some(RejectionReason::NotASelect));
        assert_eq!(rejected("SELECTED_ROWS"), Some(RejectionReason::NotASelect));
        assert_eq!(rejected("SELECT_1"), Some(RejectionReason::NotASelect));
        assert_eq!(rejected("(SELECT 1)"), Some(RejectionReason::NotASelect));
    }

    #[test]
    fn test_prefix_checked_before_keywords() {
        assert_eq!(rejected("DROP TABLE users"), Some(RejectionReason::NotASelect));
    }

    // =========================================================================
    // Denylist
    // =========================================================================

    #[test]
    fn test_each_forbidden_keyword_rejected() {
        for keyword in FORBIDDEN_KEYWORDS {
            let sql = format!("SELECT * FROM t WHERE x = 1 {}", keyword.to_lowercase());
            assert_eq!(
                rejected(&sql),
                Some(RejectionReason::ForbiddenKeyword(keyword.to_string())),
                "{}",
                sql
            );
        }
    }

    #[test]
    fn test_keyword_inside_literal_rejected_conservatively() {
        assert_eq!(
            rejected("SELECT * FROM logs WHERE action = 'delete'"),
            Some(RejectionReason::ForbiddenKeyword("DELETE".to_string()))
        );
    }

    #[test]
    fn test_keyword_must_be_whole_word() {
        assert!(classify("SELECT update_time, created_at FROM t").is_safe());
        assert!(classify("SELECT dropped, insertions FROM stats").is_safe());
        assert!(classify("SELECT executed_at FROM jobs").is_safe());
    }

    #[test]
    fn test_first_keyword_reported() {
        assert_eq!(
            rejected("SELECT 1 FROM t WHERE a = 'grant' OR b = 'drop'"),
            Some(RejectionReason::ForbiddenKeyword("GRANT".to_string()))
        );
    }

    #[test]
    fn test_keyword_adjacent_to_punctuation() {
        assert_eq!(
            rejected("SELECT * FROM t,delete"),
            Some(RejectionReason::ForbiddenKeyword("DELETE".to_string()))
        );
    }

    // =========================================================================
    // Multiple statements
    // =========================================================================

    #[test]
    fn test_multiple_statements() {
        assert_eq!(
            rejected("SELECT * FROM users; SELECT * FROM orders"),
            Some(RejectionReason::MultipleStatements)
        );
        assert_eq!(rejected("SELECT 1;SELECT 2"), Some(RejectionReason::MultipleStatements));
    }

    #[test]
    fn test_trailing_semicolon_allowed() {
        assert!(classify("SELECT 1;").is_safe());
        assert!(classify("SELECT 1;   \n").is_safe());
    }

    #[test]
    fn test_injection_after_semicolon_rejected() {
        let verdict = classify("SELECT 1; DROP TABLE users");
        assert!(matches!(
            verdict,
            StatementVerdict::Rejected(
                RejectionReason::ForbiddenKeyword(_) | RejectionReason::MultipleStatements
            )
        ));
    }

    #[test]
    fn test_classify_idempotent() {
        for sql in ["", "SELECT 1", "SELECT 1; SELECT 2", "DELETE FROM t"] {
            assert_eq!(classify(sql), classify(sql));
        }
    }

    // =========================================================================
    // Literal-aware mode
    // =========================================================================

    #[test]
    fn test_literal_aware_ignores_string_literals() {
        let guard = StatementGuard::new(GuardMode::LiteralAware);
        assert!(guard.classify("SELECT * FROM logs WHERE action = 'delete'").is_safe());
        assert!(guard.classify("SELECT 'DROP TABLE users' AS note").is_safe());
        assert!(guard.classify("SELECT 'a; b' AS s").is_safe());
    }

    #[test]
    fn test_literal_aware_ignores_quoted_identifiers_and_comments() {
        let guard = StatementGuard::new(GuardMode::LiteralAware);
        assert!(guard.classify(r#"SELECT "update" FROM t"#).is_safe());
        assert!(guard.classify("SELECT 1 -- delete later").is_safe());
        assert!(guard.classify("SELECT 1 /* drop */").is_safe());
    }

    #[test]
    fn test_literal_aware_still_rejects_real_keywords() {
        let guard = StatementGuard::new(GuardMode::LiteralAware);
        assert_eq!(
            guard.classify("SELECT 1; DROP TABLE users").rejection(),
            Some(&RejectionReason::ForbiddenKeyword("DROP".to_string()))
        );
        assert_eq!(
            guard.classify("SELECT 1; SELECT 2").rejection(),
            Some(&RejectionReason::MultipleStatements)
        );
        assert_eq!(
            guard.classify("INSERT INTO t VALUES (1)").rejection(),
            Some(&RejectionReason::NotASelect)
        );
    }

    #[test]
    fn test_literal_aware_falls_back_on_tokenizer_error() {
        let guard = StatementGuard::new(GuardMode::LiteralAware);
        // Unterminated literal cannot be tokenized.
        assert_eq!(
            guard.classify("SELECT 'delete").rejection(),
            Some(&RejectionReason::ForbiddenKeyword("DELETE".to_string()))
        );
    }

    #[test]
    fn test_default_mode_is_conservative() {
        let guard = StatementGuard::default();
        assert_eq!(guard.mode(), GuardMode::Conservative);
        assert!(!guard.classify("SELECT 'delete'").is_safe());
    }

    // =========================================================================
    // Parameter alignment
    // =========================================================================

    #[test]
    fn test_expected_parameters_dollar() {
        assert_eq!(expected_parameters("SELECT 1", PlaceholderStyle::Dollar), 0);
        assert_eq!(
            expected_parameters("SELECT * FROM t WHERE a = $1 AND b = $2", PlaceholderStyle::Dollar),
            2
        );
        assert_eq!(
            expected_parameters("SELECT * FROM t WHERE a = $1 OR b = $1", PlaceholderStyle::Dollar),
            1
        );
    }

    #[test]
    fn test_expected_parameters_question() {
        assert_eq!(
            expected_parameters("SELECT * FROM t WHERE a = ? AND b = ?", PlaceholderStyle::Question),
            2
        );
        assert_eq!(
            expected_parameters("SELECT * FROM t WHERE a = ?2 AND b = ?1", PlaceholderStyle::Question),
            2
        );
    }

    #[test]
    fn test_placeholder_in_literal_not_counted() {
        assert_eq!(
            expected_parameters("SELECT '$1' AS x WHERE a = $1", PlaceholderStyle::Dollar),
            1
        );
    }

    #[test]
    fn test_check_parameters_mismatch() {
        assert_eq!(
            check_parameters("SELECT * FROM t WHERE id = $1", 0, PlaceholderStyle::Dollar),
            Err(RejectionReason::ParameterMismatch {
                expected: 1,
                supplied: 0
            })
        );
        assert_eq!(
            check_parameters("SELECT 1", 2, PlaceholderStyle::Dollar),
            Err(RejectionReason::ParameterMismatch {
                expected: 0,
                supplied: 2
            })
        );
        assert!(check_parameters("SELECT $1", 1, PlaceholderStyle::Dollar).is_ok());
    }

    #[test]
    fn test_scan_placeholders_fallback() {
        assert_eq!(scan_placeholders("a = $1 and b = ?3 and c = ?"), vec!["$1", "?3", "?"]);
    }

    #[test]
    fn test_validate_combines_checks() {
        let guard = StatementGuard::default();
        let err = guard
            .validate("DELETE FROM t", 0, PlaceholderStyle::Dollar)
            .unwrap_err();
        assert_eq!(err.code(), "NOT_A_SELECT");
        let err = guard
            .validate("SELECT * FROM t WHERE id = $1", 0, PlaceholderStyle::Dollar)
            .unwrap_err();
        assert_eq!(err.code(), "PARAMETER_MISMATCH");
        assert!(guard.validate("SELECT $1::int", 1, PlaceholderStyle::Dollar).is_ok());
    }
}
