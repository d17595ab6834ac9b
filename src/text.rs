use regex::Regex;

/// Characters that change meaning inside chat markdown.
const MARKDOWN_SENSITIVE: &[char] = &['\\', '*', '_', '~', '`', '|', '>'];

/// Escape markdown-sensitive characters by prefixing each with a backslash.
///
/// Not idempotent: the inserted backslashes are themselves sensitive, so a
/// second pass escapes them again. Callers apply this exactly once, at
/// record construction.
pub fn sanitize_markdown(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if MARKDOWN_SENSITIVE.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Strips recognized emote tokens (`token` + numeric suffix, any case) from
/// message text. Built once at startup from the warm-loaded token set and
/// handed to the components that need it.
pub struct EmoteStripper {
    pattern: Option<Regex>,
}

impl EmoteStripper {
    pub fn new<S: AsRef<str>>(tokens: &[S]) -> Self {
        let alternation: Vec<String> = tokens
            .iter()
            .map(|t| regex::escape(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        if alternation.is_empty() {
            return EmoteStripper { pattern: None };
        }
        let source = format!(r"(?i)\b(?:{})\d+\b", alternation.join("|"));
        EmoteStripper {
            // The alternation is built from escaped literals; it always
            // compiles unless the token list was empty, handled above.
            pattern: Regex::new(&source).ok(),
        }
    }

    pub fn strip(&self, input: &str) -> String {
        match &self.pattern {
            Some(re) => re.replace_all(input, "").into_owned(),
            None => input.to_string(),
        }
    }
}

/// Full message cleanup: emote removal, then markdown escaping, then trim.
pub fn clean_message(input: &str, stripper: &EmoteStripper) -> String {
    sanitize_markdown(&stripper.strip(input)).trim().to_string()
}
