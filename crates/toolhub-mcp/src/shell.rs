//! Launch-command tokenizer for local tool servers.
//!
//! Splits a command string into an argv vector with shell-like quoting and
//! escapes, then expands `$NAME` / `${NAME}` through a fixed allow-list.
//! Names outside the allow-list expand to the empty string so a registry
//! entry can never read arbitrary process environment.
//!
//! Parsing is pure and total: malformed input degrades to literal text.

use crate::env::{EnvProvider, SystemEnv};

/// `PATH` value handed to expansions, independent of the host environment.
pub const SAFE_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// `SHELL` value handed to expansions.
pub const SAFE_SHELL: &str = "/bin/sh";

/// Tokenize `command` using the process environment for `HOME` and `USER`.
pub fn parse(command: &str) -> Vec<String> {
    parse_with(command, &SystemEnv)
}

/// Tokenize `command` with an injected environment.
pub fn parse_with(command: &str, env: &dyn EnvProvider) -> Vec<String> {
    tokenize(command)
        .into_iter()
        .map(|token| expand(&token, env))
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Distinguishes `""` (an empty argument) from no token at all.
    let mut in_token = false;
    let mut quote = Quote::None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                in_token = true;
                match chars.next() {
                    Some(escaped) => push_escape(&mut current, escaped),
                    None => current.push('\\'),
                }
            }
            '\'' if quote == Quote::None => {
                quote = Quote::Single;
                in_token = true;
            }
            '"' if quote == Quote::None => {
                quote = Quote::Double;
                in_token = true;
            }
            '\'' if quote == Quote::Single => quote = Quote::None,
            '"' if quote == Quote::Double => quote = Quote::None,
            c if c.is_whitespace() && quote == Quote::None => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    // An unterminated quote leaves the remainder as one literal token.
    if in_token {
        tokens.push(current);
    }
    tokens
}

fn push_escape(out: &mut String, escaped: char) {
    match escaped {
        'n' => out.push('\n'),
        't' => out.push('\t'),
        'r' => out.push('\r'),
        '\\' | '"' | '\'' => out.push(escaped),
        other => {
            out.push('\\');
            out.push(other);
        }
    }
}

fn expand(token: &str, env: &dyn EnvProvider) -> String {
    let mut out = String::with_capacity(token.len());
    let mut rest = token;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) if is_name(&braced[..end]) => {
                    out.push_str(&lookup(&braced[..end], env));
                    rest = &braced[end + 1..];
                }
                // `${` without a closing brace, or a malformed name, stays literal.
                _ => {
                    out.push('$');
                    rest = after;
                }
            }
            continue;
        }

        let name_len = after
            .char_indices()
            .take_while(|&(i, c)| {
                c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit())
            })
            .count();
        if name_len == 0 {
            out.push('$');
            rest = after;
        } else {
            out.push_str(&lookup(&after[..name_len], env));
            rest = &after[name_len..];
        }
    }

    out.push_str(rest);
    out
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn lookup(name: &str, env: &dyn EnvProvider) -> String {
    match name {
        "HOME" | "USER" => env.get_lossy(name),
        "PATH" => SAFE_PATH.to_string(),
        "SHELL" => SAFE_SHELL.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MockEnv;

    fn env() -> MockEnv {
        MockEnv::new()
            .with_var("HOME", "/home/dev")
            .with_var("USER", "dev")
            .with_var("SECRET_TOKEN", "hunter2")
    }

    fn p(command: &str) -> Vec<String> {
        parse_with(command, &env())
    }

    #[test]
    fn test_quoted_phrase_and_unknown_variable() {
        assert_eq!(
            p(r#"echo "hello world" $UNKNOWNVAR"#),
            vec!["echo", "hello world", ""]
        );
    }

    #[test]
    fn test_empty_and_blank_input() {
        assert!(p("").is_empty());
        assert!(p("   \t ").is_empty());
    }

    #[test]
    fn test_whitespace_splitting() {
        assert_eq!(
            p("  npx   -y\t@scope/server "),
            vec!["npx", "-y", "@scope/server"]
        );
    }

    #[test]
    fn test_single_quotes_keep_whitespace() {
        assert_eq!(p("grep 'a  b' file"), vec!["grep", "a  b", "file"]);
    }

    #[test]
    fn test_adjacent_quotes_join_one_token() {
        assert_eq!(p(r#"--name="my server"'s'"#), vec!["--name=my servers"]);
    }

    #[test]
    fn test_quoted_empty_string_is_a_token() {
        assert_eq!(p(r#"cmd "" ''"#), vec!["cmd", "", ""]);
    }

    #[test]
    fn test_escape_sequences() {
        assert_eq!(p(r"a\tb"), vec!["a\tb"]);
        assert_eq!(p(r#""line\nbreak""#), vec!["line\nbreak"]);
        assert_eq!(p(r"one\ two"), vec![r"one\ two"]);
        assert_eq!(p(r#"say \"hi\""#), vec!["say", "\"hi\""]);
        assert_eq!(p(r"back\\slash"), vec![r"back\slash"]);
        assert_eq!(p(r"trailing\"), vec![r"trailing\"]);
    }

    #[test]
    fn test_unterminated_quote_is_literal_rest() {
        assert_eq!(
            p(r#"echo "unterminated rest  here"#),
            vec!["echo", "unterminated rest  here"]
        );
        assert_eq!(p("echo 'it"), vec!["echo", "it"]);
    }

    #[test]
    fn test_allow_listed_expansion() {
        assert_eq!(p("$HOME/bin"), vec!["/home/dev/bin"]);
        assert_eq!(p("${USER}-cache"), vec!["dev-cache"]);
        assert_eq!(p("$PATH"), vec![SAFE_PATH]);
        assert_eq!(p("${SHELL}"), vec![SAFE_SHELL]);
    }

    #[test]
    fn test_non_allow_listed_names_never_leak() {
        assert_eq!(p("--token=$SECRET_TOKEN"), vec!["--token="]);
        assert_eq!(p("${SECRET_TOKEN}"), vec![""]);
    }

    #[test]
    fn test_missing_allow_listed_var_expands_empty() {
        assert_eq!(parse_with("$HOME", &MockEnv::new()), vec![""]);
    }

    #[test]
    fn test_dollar_without_name_is_literal() {
        assert_eq!(p("cost $5 $"), vec!["cost", "$5", "$"]);
        assert_eq!(p("${HOME"), vec!["${HOME"]);
        assert_eq!(p("${}"), vec!["${}"]);
    }
}
