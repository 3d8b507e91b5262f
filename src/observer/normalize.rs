//! SQL shape normalization.
//!
//! Maps a raw SQL string to a structural pattern by folding literals:
//! every maximal run of decimal digits and every quoted string literal
//! becomes a single `?`. Two queries that differ only in such literals
//! normalize identically, which is what lets the observer group the
//! per-row lookups of an N+1 storm into one bucket.

const PLACEHOLDER: char = '?';

/// Normalize a SQL string to its structural pattern.
pub fn normalize(sql: &str) -> String {
    let mut pattern = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            quote @ ('\'' | '"') => {
                consume_literal(&mut chars, quote);
                pattern.push(PLACEHOLDER);
            }
            digit if digit.is_ascii_digit() => {
                while chars.peek().is_some_and(char::is_ascii_digit) {
                    chars.next();
                }
                pattern.push(PLACEHOLDER);
            }
            other => pattern.push(other),
        }
    }

    pattern
}

/// Consume a quoted literal body including its closing quote. A doubled
/// quote inside the literal is the SQL escape for the quote character
/// itself and does not terminate it. An unterminated literal runs to the
/// end of the string.
fn consume_literal(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, quote: char) {
    while let Some(ch) = chars.next() {
        if ch == quote {
            if chars.peek() == Some(&quote) {
                chars.next();
                continue;
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_literals_fold_to_one_pattern() {
        assert_eq!(
            normalize("SELECT * FROM t WHERE id = 17"),
            normalize("SELECT * FROM t WHERE id = 42")
        );
    }

    #[test]
    fn digit_runs_become_single_placeholder() {
        assert_eq!(
            normalize("SELECT * FROM t WHERE id = 123456"),
            "SELECT * FROM t WHERE id = ?"
        );
    }

    #[test]
    fn string_literals_fold_to_one_pattern() {
        assert_eq!(
            normalize("SELECT * FROM users WHERE email = 'a@example.com'"),
            normalize("SELECT * FROM users WHERE email = 'b@example.com'")
        );
        assert_eq!(
            normalize("SELECT * FROM users WHERE email = 'a@example.com'"),
            "SELECT * FROM users WHERE email = ?"
        );
    }

    #[test]
    fn doubled_quote_escape_stays_inside_the_literal() {
        assert_eq!(
            normalize("SELECT 1 FROM t WHERE name = 'O''Brien' AND x = 2"),
            "SELECT ? FROM t WHERE name = ? AND x = ?"
        );
    }

    #[test]
    fn double_quoted_literals_fold_too() {
        assert_eq!(
            normalize(r#"SELECT "col1" FROM t WHERE a = 5"#),
            "SELECT ? FROM t WHERE a = ?"
        );
    }

    #[test]
    fn digits_inside_identifiers_fold() {
        // A maximal digit run folds wherever it appears; `t1` and `t2`
        // normalize to the same shape.
        assert_eq!(normalize("SELECT * FROM t1"), normalize("SELECT * FROM t2"));
    }

    #[test]
    fn unterminated_literal_consumes_to_end() {
        assert_eq!(normalize("SELECT 'oops"), "SELECT ?");
    }

    #[test]
    fn structurally_different_queries_stay_distinct() {
        assert_ne!(
            normalize("SELECT * FROM orders WHERE id = 1"),
            normalize("SELECT * FROM invoices WHERE id = 1")
        );
    }
}
