//! GAS Listing Extraction
//!
//! Slices one function out of a compiler-generated GAS listing so it can be
//! used as a stand-alone assembly candidate.

use std::sync::OnceLock;

use regex::Regex;

/// One function cut out of a full listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionAsm {
    /// Directives from the first `.globl` up to the function start
    pub preamble: String,
    /// The function itself, exported, with comments stripped
    pub body: String,
    /// Everything after `.cfi_endproc`
    pub postamble: String,
}

impl FunctionAsm {
    /// Preamble and body, ready to be assembled on their own
    pub fn standalone(&self) -> String {
        format!("{}{}", self.preamble, self.body)
    }
}

/// Extract `name` from `listing`.
///
/// Returns `None` when the listing has no `@function` entry for `name`.
pub fn extract_function(listing: &str, name: &str) -> Option<FunctionAsm> {
    let mut preamble = Vec::new();
    let mut body = Vec::new();
    let mut postamble = Vec::new();
    let mut in_preamble = false;
    let mut state = Section::Before;

    for line in listing.lines() {
        match state {
            Section::Inside => body.push(line),
            Section::After => postamble.push(line),
            Section::Before => {
                let mut tokens = line.split_whitespace();
                if matches!(tokens.next(), Some(".globl") | Some(".global")) {
                    in_preamble = true;
                }
                if in_preamble {
                    preamble.push(line);
                }
                if starts_function(line, name) {
                    state = Section::Inside;
                }
            }
        }
        if state == Section::Inside && line.split_whitespace().any(|t| t == ".cfi_endproc") {
            state = Section::After;
        }
    }

    if body.is_empty() {
        return None;
    }

    let mut function = vec![format!(".globl {name}"), format!(".type {name}, @function")];
    function.extend(body.iter().filter_map(|line| strip_comment(line)));
    let mut body = function.join("\n");
    body.push('\n');
    body.push_str(&constant_definitions(&body, listing));

    Some(FunctionAsm {
        preamble: join_lines(&preamble),
        body,
        postamble: join_lines(&postamble),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Before,
    Inside,
    After,
}

fn starts_function(line: &str, name: &str) -> bool {
    let mut tokens = line
        .split([' ', '\t', ','])
        .filter(|t| !t.is_empty());
    let mut has_name = false;
    let mut has_kind = false;
    for token in tokens.by_ref() {
        has_name |= token == name;
        has_kind |= token == "@function";
    }
    has_name && has_kind
}

fn strip_comment(line: &str) -> Option<String> {
    let code = line.split('#').next().unwrap_or_default();
    if code.trim().is_empty() {
        None
    } else {
        Some(code.trim_end().to_string())
    }
}

/// `.LCn: <data>` lines for every local constant `body` references
fn constant_definitions(body: &str, listing: &str) -> String {
    static LC_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: this regex literal is guaranteed to compile
    let re = LC_RE.get_or_init(|| Regex::new(r"\.LC[0-9]+").unwrap());

    let lines: Vec<&str> = listing.lines().collect();
    let mut seen = Vec::new();
    let mut out = String::new();
    for symbol in re.find_iter(body).map(|m| m.as_str()) {
        if seen.contains(&symbol) {
            continue;
        }
        seen.push(symbol);
        let label = format!("{symbol}:");
        let definition = lines
            .iter()
            .position(|line| line.trim() == label)
            .and_then(|i| lines.get(i + 1));
        if let Some(data) = definition {
            out.push_str(&format!("{symbol}: {}\n", data.trim()));
        }
    }
    out
}

fn join_lines(lines: &[&str]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
