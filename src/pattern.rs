//! Channel-name pattern matching for `getChannels`/`watchChannels`.
//!
//! A pattern is either a glob string (`*` and `?` wildcards, the common
//! case — e.g. `"worker-*"`) or an anchored regular expression. Glob is
//! translated to an anchored `regex::Regex` once at registration time so
//! matching a name against many monitors stays a cheap `Regex::is_match`.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Glob,
    Regexp,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn compile(source: &str, kind: PatternKind) -> Result<Self, regex::Error> {
        let anchored = match kind {
            PatternKind::Glob => glob_to_anchored_regex(source),
            PatternKind::Regexp => anchor(source),
        };
        let regex = Regex::new(&anchored)?;
        Ok(Pattern { source: source.to_owned(), regex })
    }

    /// A literal channel name is also a valid pattern matching only itself.
    pub fn literal(name: &str) -> Self {
        Pattern::compile(name, PatternKind::Regexp).unwrap_or_else(|_| Pattern {
            source: name.to_owned(),
            regex: Regex::new(&regex::escape(name)).expect("escaped literal always compiles"),
        })
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

fn anchor(pattern: &str) -> String {
    format!("^(?:{pattern})$")
}

fn glob_to_anchored_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    out
}
