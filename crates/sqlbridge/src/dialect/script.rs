//! SQL script splitting.
//!
//! A single left-to-right scan that cuts a script at `;` terminators.
//! Terminators inside `'…'` literals (with `''` and `\'` escapes), `"…"`
//! and `` `…` `` identifiers, `--` line comments and `/* */` block
//! comments do not end a statement.

use std::ops::Range;

/// One statement cut out of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStatement {
    /// Trimmed statement text without its terminator.
    pub text: String,
    /// Byte range of the untrimmed fragment in the script.
    pub range: Range<usize>,
    /// The statement returns rows (`SELECT` or `SHOW`).
    pub is_query: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    SingleQuote,
    DoubleQuote,
    Backtick,
    LineComment,
    BlockComment,
}

/// Split `script` into executable statements.
///
/// Fragments holding only whitespace or comments are dropped. The last
/// fragment is emitted even without a terminator.
pub fn split(script: &str) -> Vec<ScriptStatement> {
    let bytes = script.as_bytes();
    let mut statements = Vec::new();
    let mut state = State::Code;
    let mut from = 0;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match c {
                b'\'' => state = State::SingleQuote,
                b'"' => state = State::DoubleQuote,
                b'`' => state = State::Backtick,
                b'-' if next == Some(b'-') => {
                    state = State::LineComment;
                    i += 1;
                }
                b'/' if next == Some(b'*') => {
                    state = State::BlockComment;
                    i += 1;
                }
                b';' => {
                    push_fragment(script, from..i, &mut statements);
                    from = i + 1;
                }
                _ => {}
            },
            State::SingleQuote => match c {
                b'\\' => i += 1,
                b'\'' if next == Some(b'\'') => i += 1,
                b'\'' => state = State::Code,
                _ => {}
            },
            State::DoubleQuote => {
                if c == b'"' {
                    state = State::Code;
                }
            }
            State::Backtick => {
                if c == b'`' {
                    state = State::Code;
                }
            }
            State::LineComment => {
                if c == b'\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == b'*' && next == Some(b'/') {
                    state = State::Code;
                    i += 1;
                }
            }
        }
        i += 1;
    }

    if from < bytes.len() {
        push_fragment(script, from..bytes.len(), &mut statements);
    }
    statements
}

fn push_fragment(script: &str, range: Range<usize>, out: &mut Vec<ScriptStatement>) {
    let fragment = &script[range.clone()];
    let code = strip_comments(fragment);
    let code = code.trim();
    if code.is_empty() {
        return;
    }

    let head = code.to_ascii_uppercase();
    out.push(ScriptStatement {
        text: fragment.trim().to_string(),
        range,
        is_query: head.starts_with("SELECT") || head.starts_with("SHOW"),
    });
}

/// Remove `--` and `/* */` comments that sit outside literals and quoted identifiers.
///
/// A line comment's terminating newline is kept.
pub fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut state = State::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                }
                _ => {
                    state = match c {
                        '\'' => State::SingleQuote,
                        '"' => State::DoubleQuote,
                        '`' => State::Backtick,
                        _ => State::Code,
                    };
                    out.push(c);
                }
            },
            State::SingleQuote => {
                out.push(c);
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    }
                    '\'' if chars.peek() == Some(&'\'') => {
                        chars.next();
                        out.push('\'');
                    }
                    '\'' => state = State::Code,
                    _ => {}
                }
            }
            State::DoubleQuote | State::Backtick => {
                out.push(c);
                if (state == State::DoubleQuote && c == '"') || (state == State::Backtick && c == '`') {
                    state = State::Code;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(script: &str) -> Vec<String> {
        split(script).into_iter().map(|s| s.text).collect()
    }

    #[test]
    fn test_split_basic() {
        assert_eq!(
            texts("CREATE TABLE t (a INT);\nINSERT INTO t VALUES (1);\nSELECT * FROM t"),
            vec![
                "CREATE TABLE t (a INT)",
                "INSERT INTO t VALUES (1)",
                "SELECT * FROM t"
            ]
        );
    }

    #[test]
    fn test_terminator_inside_literal() {
        assert_eq!(texts("SELECT 'a;b'"), vec!["SELECT 'a;b'"]);
        assert_eq!(texts("SELECT 'it''s;here'; SELECT 2"), vec!["SELECT 'it''s;here'", "SELECT 2"]);
        assert_eq!(texts(r"SELECT 'back\';slash'; SELECT 3"), vec![r"SELECT 'back\';slash'", "SELECT 3"]);
    }

    #[test]
    fn test_terminator_inside_identifiers_and_comments() {
        assert_eq!(texts("SELECT \"a;b\" FROM t"), vec!["SELECT \"a;b\" FROM t"]);
        assert_eq!(texts("SELECT `a;b` FROM t"), vec!["SELECT `a;b` FROM t"]);
        assert_eq!(
            texts("SELECT 1 -- one; two\n; SELECT 2"),
            vec!["SELECT 1 -- one; two", "SELECT 2"]
        );
        assert_eq!(texts("SELECT /* ; */ 1"), vec!["SELECT /* ; */ 1"]);
    }

    #[test]
    fn test_empty_fragments_dropped() {
        assert!(split("").is_empty());
        assert!(split(" ;\n; \t").is_empty());
        assert!(split("-- only a comment\n;").is_empty());
        assert_eq!(texts("SELECT 1;;"), vec!["SELECT 1"]);
    }

    #[test]
    fn test_query_flag_and_range() {
        let script = "-- header\nshow tables; update t set a = 1";
        let statements = split(script);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].is_query);
        assert!(!statements[1].is_query);
        assert_eq!(&script[statements[1].range.clone()], " update t set a = 1");
    }

    #[test]
    fn test_strip_comments() {
        assert_eq!(strip_comments("SELECT 1 -- c\nFROM t"), "SELECT 1 \nFROM t");
        assert_eq!(strip_comments("SELECT /* x */1"), "SELECT 1");
        assert_eq!(strip_comments("SELECT '--no' FROM t"), "SELECT '--no' FROM t");
        assert_eq!(strip_comments("SELECT '/*no*/'"), "SELECT '/*no*/'");
    }

    fn statement() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-zA-Z0-9 ,=()]{1,20}",
            "[a-z]{1,5} '[a-z;]{0,5}'",
            "[a-z]{1,5} \"[a-z;]{0,5}\"",
        ]
        .prop_filter("non-blank", |s| !s.trim().is_empty())
    }

    proptest! {
        #[test]
        fn test_split_then_join_reconstructs(parts in prop::collection::vec(statement(), 1..6)) {
            let script = parts.join(";");
            let rejoined = split(&script)
                .into_iter()
                .map(|s| s.text)
                .collect::<Vec<_>>()
                .join(";");
            let expected = parts.iter().map(|p| p.trim()).collect::<Vec<_>>().join(";");
            prop_assert_eq!(rejoined, expected);
        }

        #[test]
        fn test_single_literal_never_split(body in "[a-z;]{0,20}") {
            let script = format!("SELECT '{}'", body);
            prop_assert_eq!(split(&script).len(), 1);
        }
    }
}
