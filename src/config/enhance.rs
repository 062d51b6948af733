//! Environment expansion for options files.
//!
//! Rule strings are regular expressions, so a `$` that does not start a
//! variable name is kept as-is and `$$` always yields a literal `$`.
//! A bare `$VAR` name must start with a letter or `_`; a literal `$`
//! followed by a letter (as in `^hk$x`) has to be written `$$`.

use std::iter::Peekable;
use std::str::Chars;

/// Expand `${VAR}`, `${VAR:-default}` and `$VAR` in `input`.
/// Undefined variables expand to an empty string.
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                expand_braced(&mut chars, &mut out);
            }
            _ => {
                let name = take_var_name(&mut chars);
                if name.is_empty() {
                    out.push('$');
                } else if let Ok(val) = std::env::var(&name) {
                    out.push_str(&val);
                }
            }
        }
    }
    out
}

fn expand_braced(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    let mut body = String::new();
    let mut closed = false;
    for c in chars.by_ref() {
        if c == '}' {
            closed = true;
            break;
        }
        body.push(c);
    }
    if !closed {
        // unterminated, keep the text untouched
        out.push_str("${");
        out.push_str(&body);
        return;
    }
    match body.split_once(":-") {
        Some((name, default)) => match std::env::var(name) {
            Ok(val) if !val.is_empty() => out.push_str(&val),
            _ => out.push_str(default),
        },
        None => {
            if let Ok(val) = std::env::var(&body) {
                out.push_str(&val);
            }
        }
    }
}

fn take_var_name(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut name = String::new();
    match chars.peek() {
        Some(&c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return name,
    }
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_braced_var() {
        std::env::set_var("SBM_TEST_SUB_NAME", "airport");
        assert_eq!(expand_env_vars("name: ${SBM_TEST_SUB_NAME}"), "name: airport");
        std::env::remove_var("SBM_TEST_SUB_NAME");
    }

    #[test]
    fn expand_bare_var() {
        std::env::set_var("SBM_TEST_BACKEND_PORT", "3001");
        assert_eq!(
            expand_env_vars("http://127.0.0.1:$SBM_TEST_BACKEND_PORT/api"),
            "http://127.0.0.1:3001/api"
        );
        std::env::remove_var("SBM_TEST_BACKEND_PORT");
    }

    #[test]
    fn expand_default_when_unset() {
        std::env::remove_var("SBM_TEST_MISSING");
        assert_eq!(expand_env_vars("${SBM_TEST_MISSING:-collection}"), "collection");
    }

    #[test]
    fn expand_undefined_is_empty() {
        std::env::remove_var("SBM_TEST_UNDEFINED");
        assert_eq!(expand_env_vars("[${SBM_TEST_UNDEFINED}]"), "[]");
    }

    #[test]
    fn regex_anchors_survive() {
        assert_eq!(expand_env_vars("^hk$|^us$"), "^hk$|^us$");
        assert_eq!(expand_env_vars("cost $$5"), "cost $5");
    }

    #[test]
    fn unterminated_brace_kept() {
        assert_eq!(expand_env_vars("a ${OPEN"), "a ${OPEN");
    }

    #[test]
    fn dollar_before_digit_kept() {
        assert_eq!(expand_env_vars("^a$1"), "^a$1");
        assert_eq!(expand_env_vars("hk$|^jp$9"), "hk$|^jp$9");
    }

    #[test]
    fn escaped_dollar_before_letter() {
        assert_eq!(expand_env_vars("^hk$$x"), "^hk$x");
    }
}
