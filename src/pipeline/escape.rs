//! Markdown escaping of literal page text.
//!
//! Two passes, both driven by [`EscapingPolicy`]:
//!
//! * [`escape_inline`] rewrites characters that are significant anywhere in
//!   a line (`*`, `_`, `|`, `$`, …). Replacements are applied by longest
//!   match, left to right, and the output is never rescanned, so a `\`
//!   inserted by one rule is not escaped again by the `\` rule.
//! * [`escape_line_start`] rewrites block markers that only matter at the
//!   beginning of a line (`#`, `>`, `-`, `+`, `=`, `12.`). It runs on the
//!   fully rendered line, after emphasis markers have been added.

use crate::rules::EscapingPolicy;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_ORDERED_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,9})([.)])(\s|$)").unwrap());

/// Escape literal text so it renders as itself.
///
/// Line breaks and tabs inside a recognised run are folded to spaces: a run
/// is always part of exactly one output line.
pub fn escape_inline(text: &str, policy: &EscapingPolicy) -> String {
    let mut rules: Vec<(&str, &str)> = policy
        .inline
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));

    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut rest = text;
    'scan: while let Some(c) = rest.chars().next() {
        for (seq, replacement) in &rules {
            if rest.starts_with(seq) {
                out.push_str(replacement);
                rest = &rest[seq.len()..];
                continue 'scan;
            }
        }
        match c {
            '\n' | '\r' | '\t' => out.push(' '),
            _ => out.push(c),
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Escape a block marker at the start of a rendered line.
pub fn escape_line_start(line: &str, policy: &EscapingPolicy) -> String {
    let mut prefixes: Vec<(&str, &str)> = policy
        .line_start
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));

    for (seq, replacement) in prefixes {
        if let Some(rest) = line.strip_prefix(seq) {
            return format!("{replacement}{rest}");
        }
    }

    if policy.ordered_lists {
        if let Some(caps) = RE_ORDERED_LIST.captures(line) {
            let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
            return format!("{}\\{}{}{}", &caps[1], &caps[2], &caps[3], &line[whole..]);
        }
    }

    line.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> EscapingPolicy {
        EscapingPolicy::default()
    }

    #[test]
    fn asterisk_bound_word_is_escaped() {
        assert_eq!(escape_inline("a *literal* word", &policy()), r"a \*literal\* word");
    }

    #[test]
    fn backslash_is_not_double_escaped() {
        assert_eq!(escape_inline(r"C:\temp_dir", &policy()), r"C:\\temp\_dir");
    }

    #[test]
    fn table_pipes_links_and_dollars() {
        assert_eq!(escape_inline("| pipe |", &policy()), r"\| pipe \|");
        assert_eq!(escape_inline("![x](y)", &policy()), r"!\[x\](y)");
        assert_eq!(escape_inline("costs $5", &policy()), r"costs \$5");
    }

    #[test]
    fn ampersand_never_starts_an_entity() {
        assert_eq!(
            escape_inline("Use &copy; and &amp; literally", &policy()),
            r"Use \&copy; and \&amp; literally"
        );
    }

    #[test]
    fn control_whitespace_folds_to_space() {
        assert_eq!(escape_inline("a\tb\nc", &policy()), "a b c");
    }

    #[test]
    fn non_ascii_passes_through() {
        assert_eq!(escape_inline("naïve café — ok", &policy()), "naïve café — ok");
    }

    #[test]
    fn longest_match_wins() {
        let mut p = policy();
        p.inline.insert("**".into(), "\\*\\*".into());
        p.inline.insert("->".into(), "→".into());
        assert_eq!(escape_inline("a->b", &p), "a→b");
    }

    #[test]
    fn list_and_heading_markers_at_line_start() {
        assert_eq!(escape_line_start("- item", &policy()), r"\- item");
        assert_eq!(escape_line_start("+ item", &policy()), r"\+ item");
        assert_eq!(escape_line_start("# not a heading", &policy()), r"\# not a heading");
        assert_eq!(escape_line_start("> quote", &policy()), r"\> quote");
        assert_eq!(escape_line_start("===", &policy()), r"\===");
    }

    #[test]
    fn ordered_list_delimiter_is_escaped() {
        assert_eq!(escape_line_start("1986. A fine year", &policy()), r"1986\. A fine year");
        assert_eq!(escape_line_start("2) second", &policy()), r"2\) second");
        assert_eq!(escape_line_start("3.", &policy()), r"3\.");
        assert_eq!(escape_line_start("3.14 is pi", &policy()), "3.14 is pi");
    }

    #[test]
    fn mid_line_markers_are_left_alone() {
        assert_eq!(escape_line_start("a - b # c", &policy()), "a - b # c");
    }
}
