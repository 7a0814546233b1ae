//! Shell-style tokenizer for terminal input lines.
//!
//! Rules:
//! - runs of whitespace separate tokens
//! - `"…"` and `'…'` keep embedded whitespace; quoted and bare fragments that
//!   touch form one token (`a"b c"` is `ab c`)
//! - inside double quotes `\"` and `\'` produce a literal quote; every other
//!   backslash is kept as-is
//! - an unterminated quote runs to the end of the line
//! - `--name=value`, or `--name value`, is a flag; `--name` followed by
//!   another `--flag` or by nothing is the boolean flag `true`

use std::collections::BTreeMap;

/// A tokenized command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// First token, empty for blank input
    pub command: String,
    /// Every token including the command name
    pub argv: Vec<String>,
    /// Per `argv` entry, whether any part of the token was quoted
    pub quoted: Vec<bool>,
    /// Non-flag arguments after the command name
    pub positionals: Vec<String>,
    /// `--name` → value
    pub flags: BTreeMap<String, String>,
}

impl Invocation {
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// Tokens after the command name, flags included.
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or(&[])
    }

    /// Whether `args()[index]` is the bare shell operator `op`.
    pub fn is_operator(&self, index: usize, op: &str) -> bool {
        self.args().get(index).is_some_and(|arg| arg == op)
            && !self.quoted.get(index + 1).copied().unwrap_or(false)
    }

    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).map(String::as_str)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positionals.get(index).map(String::as_str)
    }

    /// Drop the first positional, treating it as a sub-command name.
    ///
    /// `spl-token mint X 5` becomes `mint X 5` with command `mint`.
    pub fn shift(&self) -> Invocation {
        let mut positionals = self.positionals.clone();
        let command = if positionals.is_empty() {
            String::new()
        } else {
            positionals.remove(0)
        };

        let mut argv = self.args().to_vec();
        let mut quoted = self.quoted.get(1..).unwrap_or(&[]).to_vec();
        if let Some(index) = argv.iter().position(|arg| *arg == command) {
            argv.remove(index);
            if index < quoted.len() {
                quoted.remove(index);
            }
        }
        argv.insert(0, command.clone());
        quoted.insert(0, false);

        Invocation {
            command,
            argv,
            quoted,
            positionals,
            flags: self.flags.clone(),
        }
    }

    /// Replace the command name, keeping the arguments.
    pub fn renamed(&self, command: &str) -> Invocation {
        let mut argv = self.argv.clone();
        if let Some(first) = argv.first_mut() {
            *first = command.to_string();
        }
        Invocation {
            command: command.to_string(),
            argv,
            quoted: self.quoted.clone(),
            positionals: self.positionals.clone(),
            flags: self.flags.clone(),
        }
    }
}

/// Split a line into tokens.
pub fn split(line: &str) -> Vec<String> {
    split_marked(line).into_iter().map(|(token, _)| token).collect()
}

/// Split a line into tokens, marking those with a quoted fragment.
fn split_marked(line: &str) -> Vec<(String, bool)> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut has_token = false;
    let mut was_quoted = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else if q == '"' && c == '\\' && matches!(chars.peek(), Some('"') | Some('\'')) {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                } else {
                    current.push(c);
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                    has_token = true;
                    was_quoted = true;
                } else if c.is_whitespace() {
                    if has_token {
                        tokens.push((std::mem::take(&mut current), was_quoted));
                        has_token = false;
                        was_quoted = false;
                    }
                } else {
                    current.push(c);
                    has_token = true;
                }
            }
        }
    }

    if has_token {
        tokens.push((current, was_quoted));
    }
    tokens
}

/// Tokenize a line and classify its arguments.
pub fn tokenize(line: &str) -> Invocation {
    let (argv, quoted): (Vec<String>, Vec<bool>) = split_marked(line).into_iter().unzip();
    let Some(command) = argv.first().cloned() else {
        return Invocation::default();
    };

    let mut positionals = Vec::new();
    let mut flags = BTreeMap::new();
    let rest = &argv[1..];
    let mut i = 0;

    while i < rest.len() {
        let token = &rest[i];
        match token.strip_prefix("--").filter(|name| !name.is_empty()) {
            Some(body) => {
                if let Some((name, value)) = body.split_once('=') {
                    flags.insert(name.to_string(), value.to_string());
                } else {
                    let value = rest
                        .get(i + 1)
                        .filter(|next| !next.starts_with("--"))
                        .cloned();
                    match value {
                        Some(value) => {
                            flags.insert(body.to_string(), value);
                            i += 1;
                        }
                        None => {
                            flags.insert(body.to_string(), "true".to_string());
                        }
                    }
                }
            }
            None => positionals.push(token.clone()),
        }
        i += 1;
    }

    Invocation {
        command,
        argv,
        quoted,
        positionals,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let inv = tokenize("   ");
        assert!(inv.is_empty());
        assert_eq!(inv.command, "");
        assert!(inv.positionals.is_empty());
    }

    #[test]
    fn test_whitespace_runs() {
        let inv = tokenize("  transfer   ABC\t 1.5 ");
        assert_eq!(inv.command, "transfer");
        assert_eq!(inv.positionals, vec!["ABC", "1.5"]);
    }

    #[test]
    fn test_unquoted_rejoin_round_trip() {
        for line in ["echo a b c", "airdrop 2 XYZ", "ls", "program show abc def"] {
            let inv = tokenize(line);
            let rejoined = inv.argv.join(" ");
            assert_eq!(tokenize(&rejoined).positionals, inv.positionals);
            assert_eq!(rejoined, line);
        }
    }

    #[test]
    fn test_quoted_argument_is_one_positional() {
        let inv = tokenize(r#"echo "hello big world" 'single quoted'"#);
        assert_eq!(inv.positionals, vec!["hello big world", "single quoted"]);
    }

    #[test]
    fn test_escaped_quote_in_double_quotes() {
        let inv = tokenize(r#"echo "say \"hi\" now""#);
        assert_eq!(inv.positionals, vec![r#"say "hi" now"#]);

        let inv = tokenize(r#"echo "path\to""#);
        assert_eq!(inv.positionals, vec![r"path\to"]);
    }

    #[test]
    fn test_backslash_literal_in_single_quotes() {
        let inv = tokenize(r#"echo 'a\'"#);
        assert_eq!(inv.positionals, vec![r"a\"]);
    }

    #[test]
    fn test_unterminated_quote_runs_to_end() {
        let inv = tokenize(r#"echo "never closed  here"#);
        assert_eq!(inv.positionals, vec!["never closed  here"]);
    }

    #[test]
    fn test_adjacent_fragments_join() {
        assert_eq!(split(r#"a"b c"d"#), vec!["ab cd"]);
        assert_eq!(split(r#"echo """#), vec!["echo", ""]);
    }

    #[test]
    fn test_quoted_operator_is_literal() {
        let inv = tokenize(r#"echo ">" x > out.txt '>>'"#);
        assert_eq!(inv.quoted, vec![false, true, false, false, false, true]);
        assert!(!inv.is_operator(0, ">"));
        assert!(inv.is_operator(2, ">"));
        assert!(!inv.is_operator(4, ">>"));
        assert!(!inv.is_operator(9, ">"));
    }

    #[test]
    fn test_flags() {
        let inv = tokenize("config set --url devnet --commitment=finalized extra");
        assert_eq!(inv.positionals, vec!["set", "extra"]);
        assert_eq!(inv.flag("url"), Some("devnet"));
        assert_eq!(inv.flag("commitment"), Some("finalized"));

        let inv = tokenize("keygen new --force --outfile a.json");
        assert_eq!(inv.flag("force"), Some("true"));
        assert_eq!(inv.flag("outfile"), Some("a.json"));
        assert_eq!(inv.positionals, vec!["new"]);

        let inv = tokenize("balance --lamports");
        assert_eq!(inv.flag("lamports"), Some("true"));
    }

    #[test]
    fn test_shift_sub_command() {
        let inv = tokenize("spl-token mint MINT 5 --decimals 2").shift();
        assert_eq!(inv.command, "mint");
        assert_eq!(inv.positionals, vec!["MINT", "5"]);
        assert_eq!(inv.argv[0], "mint");
        assert_eq!(inv.flag("decimals"), Some("2"));
    }
}
