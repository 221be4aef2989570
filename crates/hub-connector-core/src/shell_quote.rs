//! POSIX shell quoting. Every user-controlled string that crosses a shell
//! boundary (prompt text, file paths, chat names) must go through `quote`
//! before being interpolated into a generated script (§9).

/// Single-quote `s` for `sh -c`, escaping embedded single quotes the
/// standard way: close the quote, emit an escaped quote, reopen.
pub fn quote(s: &str) -> String {
    if !s.is_empty() && s.bytes().all(is_safe_unquoted) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

fn is_safe_unquoted(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'/' | b':' | b'@' | b'%' | b'+' | b'=')
}

/// Quote a sequence of arguments and join with spaces.
pub fn quote_args<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|a| quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a container-relative path to start with `/`, as required for
/// paths the hub hands to the container CLI.
pub fn normalize_container_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_safe_strings_unquoted() {
        assert_eq!(quote("hello-world_1.2/3"), "hello-world_1.2/3");
    }

    #[test]
    fn quotes_strings_with_spaces() {
        assert_eq!(quote("hello world"), "'hello world'");
    }

    #[test]
    fn escapes_embedded_single_quotes() {
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn empty_string_is_quoted() {
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn normalizes_relative_paths() {
        assert_eq!(normalize_container_path("work/repo"), "/work/repo");
        assert_eq!(normalize_container_path("/work/repo"), "/work/repo");
    }
}
