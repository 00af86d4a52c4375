use std::error::Error as StdError;
use std::fmt::Display;

use unicode_width::UnicodeWidthStr;

/// Format a database error with its chain of causes.
pub fn format_db_error<E>(e: &E) -> String
where
    E: Display + StdError,
{
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        // tokio-rusqlite wraps the rusqlite error and repeats its message.
        if !msg.contains(&cause_msg) {
            msg = format!("{}: {}", msg, cause_msg);
        }
        source = cause.source();
    }
    msg
}

/// Terminal display width of a string.
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Collapse a statement onto one line for logs and status messages.
pub fn one_line(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "no such table: t")
        }
    }

    impl StdError for Inner {}

    #[derive(Debug)]
    struct Outer(Inner);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "prepare failed")
        }
    }

    impl StdError for Outer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_format_db_error_includes_cause() {
        assert_eq!(format_db_error(&Outer(Inner)), "prepare failed: no such table: t");
        assert_eq!(format_db_error(&Inner), "no such table: t");
    }

    #[test]
    fn test_display_width() {
        assert_eq!(display_width("abc"), 3);
        assert_eq!(display_width("日本"), 4);
        assert_eq!(display_width(""), 0);
    }

    #[test]
    fn test_one_line() {
        assert_eq!(one_line("select *\n  from t\twhere x=1"), "select * from t where x=1");
    }
}
