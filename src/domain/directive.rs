//! Directive grammar: call-style template directives and legacy `require()` statements.
//!
//! Call-style: `<%=include("a.js")%>`, `<%=includeAfter("a.js")%>`,
//! `<%=includeLater("a.js")%>`, `<%=insert("a.js")%>`, `<%=insertOnce("a.js")%>`.
//!
//! Legacy: `require("before:a.js")`, `require("after:a.js")`, `require("later:a.js")`,
//! `require("insert:a.js")`, `require("insertOnce:a.js")`, one per line.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Inline `/* ... */` comments allowed around a directive argument.
const COMMENT: &str = r"(?:\s*/\*.*?\*/\s*)*";

/// Position of an included file relative to its includer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DirectiveKind {
    /// Resolved immediately, output placed before the includer.
    #[default]
    Before,
    /// Resolved once the nearest non-inserted ancestor's body is done.
    After,
    /// Resolved when the root document closes.
    Later,
    /// Substituted inline at the call site, every time.
    Insert,
    /// Substituted inline at the call site, first occurrence only.
    InsertOnce,
}

impl DirectiveKind {
    pub const ALL: [DirectiveKind; 5] = [
        DirectiveKind::Before,
        DirectiveKind::After,
        DirectiveKind::Later,
        DirectiveKind::Insert,
        DirectiveKind::InsertOnce,
    ];

    /// Name used as the `position` of a file and as the legacy `require` type.
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveKind::Before => "before",
            DirectiveKind::After => "after",
            DirectiveKind::Later => "later",
            DirectiveKind::Insert => "insert",
            DirectiveKind::InsertOnce => "insertOnce",
        }
    }

    /// Name of the template function implementing this kind.
    pub fn call_name(&self) -> &'static str {
        match self {
            DirectiveKind::Before => "include",
            DirectiveKind::After => "includeAfter",
            DirectiveKind::Later => "includeLater",
            DirectiveKind::Insert => "insert",
            DirectiveKind::InsertOnce => "insertOnce",
        }
    }

    pub fn from_call_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.call_name() == name)
    }

    pub fn from_require_type(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// One-letter marker used by the tree string rendering.
    pub fn tree_sign(&self) -> char {
        match self {
            DirectiveKind::Before => '-',
            DirectiveKind::After => '+',
            DirectiveKind::Later => '>',
            DirectiveKind::Insert => 'i',
            DirectiveKind::InsertOnce => 'I',
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, DirectiveKind::Insert | DirectiveKind::InsertOnce)
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, DirectiveKind::After | DirectiveKind::Later)
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DirectiveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_require_type(s)
            .or_else(|| Self::from_call_name(s))
            .ok_or_else(|| format!("unknown directive kind: {s}"))
    }
}

/// One directive occurrence found in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveMatch {
    /// Byte span of the whole match, comments included
    pub span: Range<usize>,
    pub kind: DirectiveKind,
    /// Quoted argument, without quotes
    pub path: String,
    /// Comment lines directly preceding the directive
    pub leading_comments: String,
    /// Comments inside the call parentheses
    pub inner_comments: String,
    /// `require("type:path")` form rather than `<%=call("path")%>`
    pub legacy: bool,
}

fn build_require_regex(kind: Option<DirectiveKind>) -> Regex {
    let pattern = match kind {
        Some(kind) => {
            let t = kind.as_str();
            format!(
                r#"(?P<separator>^|\r?\n)[ \t]*require\s*\(\s*(?P<lead>{COMMENT})(?:"{t}[ \t]*:[ \t]*(?P<dq>[^"\r\n]*)"|'{t}[ \t]*:[ \t]*(?P<sq>[^'\r\n]*)')(?P<trail>{COMMENT})\s*\)[ \t]*;?[ \t]*"#
            )
        }
        None => format!(
            r#"(?P<separator>^|\r?\n)[ \t]*require\s*\((?P<require>\s*(?P<lead>{COMMENT})(?:"(?P<dq>[^"\r\n]*)"|'(?P<sq>[^'\r\n]*)')(?P<trail>{COMMENT})\s*)\)[ \t]*;?[ \t]*"#
        ),
    };
    Regex::new(&pattern).expect("require regex is valid")
}

static REQUIRE_ALL: Lazy<Regex> = Lazy::new(|| build_require_regex(None));

static REQUIRE_TYPED: Lazy<Vec<(DirectiveKind, Regex)>> = Lazy::new(|| {
    // insert kinds first: their rewrite must not be shadowed by the untyped form
    [
        DirectiveKind::Insert,
        DirectiveKind::InsertOnce,
        DirectiveKind::Before,
        DirectiveKind::After,
        DirectiveKind::Later,
    ]
    .into_iter()
    .map(|k| (k, build_require_regex(Some(k))))
    .collect()
});

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?P<comments>(?:[ \t]*(?:/\*(?s:.*?)\*/|//[^\r\n]*)[ \t]*\r?\n?)*)<%=\s*(?P<name>includeAfter|includeLater|include|insertOnce|insert)\s*\((?P<lead>{COMMENT})(?:"(?P<dq>[^"\r\n]*)"|'(?P<sq>[^'\r\n]*)')(?P<trail>{COMMENT})(?:\s*,[^)]*)?\s*\)\s*%>"#
    ))
    .expect("directive regex is valid")
});

static INCLUDES: Lazy<Regex> = Lazy::new(|| {
    let include = format!(
        r#"include(?:After|Later)?\s*\(\s*{COMMENT}(?:"[^"\r\n]*"|'[^'\r\n]*'){COMMENT}\s*\)"#
    );
    Regex::new(&format!(
        r#"\s*(?P<comments>(?:\s*(?:/\*(?s:.*?)\*/\s*|//[^\r\n]*\r?\n))*)(?P<include>(?:\s*<%=\s*{include}\s*%>)+\s*)"#
    ))
    .expect("includes regex is valid")
});

static PLAIN_INCLUDE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"=\s*include\s*\(").expect("include call regex is valid"));

static PRAGMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(?:"use strict"|'use strict')\s*;?\s*\r?\n?"#).expect("pragma regex is valid")
});

fn quoted(caps: &Captures<'_>) -> (char, String) {
    match (caps.name("dq"), caps.name("sq")) {
        (Some(m), _) => ('"', m.as_str().to_string()),
        (None, Some(m)) => ('\'', m.as_str().to_string()),
        (None, None) => ('"', String::new()),
    }
}

fn group(caps: &Captures<'_>, name: &str) -> String {
    caps.name(name).map(|m| m.as_str().to_string()).unwrap_or_default()
}

/// Rewrite legacy `require("type:path")` statements into call-style directives.
///
/// `require("insert:a.js")` becomes `<%=insert("a.js")%>`. With `rewrite_all`,
/// every remaining `require(...)` statement becomes an `include` keeping its
/// argument verbatim.
pub fn rewrite_requires(src: &str, rewrite_all: bool) -> String {
    let mut out = src.to_string();
    for (kind, re) in REQUIRE_TYPED.iter() {
        out = re
            .replace_all(&out, |caps: &Captures<'_>| {
                let (quote, url) = quoted(caps);
                format!(
                    "{}<%={}({quote}{url}{quote})%>",
                    group(caps, "separator"),
                    kind.call_name()
                )
            })
            .into_owned();
    }

    if !rewrite_all {
        return out;
    }
    REQUIRE_ALL
        .replace_all(&out, |caps: &Captures<'_>| {
            format!(
                "{}<%=include({})%>",
                group(caps, "separator"),
                group(caps, "require")
            )
        })
        .into_owned()
}

/// Lazily yields the call-style directives of a text, in textual order.
pub fn find_directives(src: &str) -> impl Iterator<Item = DirectiveMatch> + '_ {
    DIRECTIVE.captures_iter(src).filter_map(|caps| {
        let whole = caps.get(0)?;
        let kind = DirectiveKind::from_call_name(caps.name("name")?.as_str())?;
        let (_, path) = quoted(&caps);
        Some(DirectiveMatch {
            span: whole.range(),
            kind,
            path,
            leading_comments: group(&caps, "comments"),
            inner_comments: format!("{}{}", group(&caps, "lead"), group(&caps, "trail"))
                .trim()
                .to_string(),
            legacy: false,
        })
    })
}

/// Lazily yields the legacy `require("type:path")` statements of a text.
///
/// Untyped requires are reported as `before`, the kind they are rewritten to.
pub fn find_requires(src: &str) -> impl Iterator<Item = DirectiveMatch> + '_ {
    REQUIRE_ALL.captures_iter(src).filter_map(|caps| {
        let whole = caps.get(0)?;
        let (_, raw) = quoted(&caps);
        let (kind, path) = match raw.split_once(':') {
            Some((t, rest)) => match DirectiveKind::from_require_type(t.trim()) {
                Some(kind) => (kind, rest.trim_start().to_string()),
                None => (DirectiveKind::Before, raw.clone()),
            },
            None => (DirectiveKind::Before, raw.clone()),
        };
        let separator = caps.name("separator").map(|m| m.len()).unwrap_or(0);
        Some(DirectiveMatch {
            span: whole.start() + separator..whole.end(),
            kind,
            path,
            leading_comments: String::new(),
            inner_comments: format!("{}{}", group(&caps, "lead"), group(&caps, "trail"))
                .trim()
                .to_string(),
            legacy: true,
        })
    })
}

/// Result of peeling the leading directive run off a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadingSplit {
    /// Directive groups of the leading run, in order
    pub includes: Vec<String>,
    /// Comments that preceded each directive group
    pub comments: Vec<String>,
    /// Remaining source, mid-body `include` calls rewritten to `includeLater`
    pub body: String,
    /// Byte offset in the original source where the leading run ends
    pub index: usize,
}

impl LeadingSplit {
    /// Number of line feeds carried by the peeled directives.
    pub fn include_line_feeds(&self) -> usize {
        self.includes
            .iter()
            .map(|inc| inc.matches('\n').count())
            .sum()
    }
}

/// Separate the contiguous run of comment+directive groups at the start of a source.
///
/// Only a run starting at the very beginning (after whitespace and comments) is
/// peeled. Directive groups further down are left in place; the plain `include`
/// calls among them become `includeLater`, so a file cannot reorder text it has
/// already emitted.
pub fn split_leading_directives(src: &str) -> LeadingSplit {
    let mut split = LeadingSplit::default();
    let mut body = String::new();
    let mut cursor = 0;
    let mut in_leading_run = true;

    for caps in INCLUDES.captures_iter(src) {
        let (Some(whole), Some(include)) = (caps.get(0), caps.name("include")) else {
            continue;
        };

        if in_leading_run && whole.start() == split.index {
            split.comments.push(group(&caps, "comments"));
            split.includes.push(include.as_str().to_string());
            split.index = whole.end();
            cursor = whole.end();
            continue;
        }
        in_leading_run = false;

        body.push_str(&src[cursor..include.start()]);
        body.push_str(&PLAIN_INCLUDE_CALL.replace_all(include.as_str(), "=includeLater("));
        cursor = whole.end();
    }

    body.push_str(&src[cursor..]);
    split.body = body;
    split
}

/// A leading `"use strict";` pragma cut off a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pragma {
    /// Text to put back in the rebuilt source (empty when removed)
    pub displayed: String,
    /// Pragma as found in the source (empty when absent)
    pub original: String,
    /// Source without the pragma
    pub source: String,
}

pub fn cut_pragma(src: &str, remove: bool) -> Pragma {
    match PRAGMA.find(src) {
        Some(m) => Pragma {
            displayed: if remove {
                String::new()
            } else {
                m.as_str().to_string()
            },
            original: m.as_str().to_string(),
            source: src[m.end()..].to_string(),
        },
        None => Pragma {
            source: src.to_string(),
            ..Pragma::default()
        },
    }
}

/// Remove the leading blank lines when there are at least `count` of them.
pub fn strip_leading_blank_lines(src: &str, count: usize) -> String {
    if count == 0 {
        return src.to_string();
    }
    match Regex::new(&format!(r"^(?:\s*\r?\n){{{count}}}")) {
        Ok(re) => re.replace(src, "").into_owned(),
        Err(_) => src.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"require("insert:a.js");"#, r#"<%=insert("a.js")%>"#)]
    #[case(r#"require("insertOnce: a.js");"#, r#"<%=insertOnce("a.js")%>"#)]
    #[case(r#"require("before:a.js")"#, r#"<%=include("a.js")%>"#)]
    #[case(r#"require('after:a.js');"#, r#"<%=includeAfter('a.js')%>"#)]
    #[case(r#"  require( "later : a.js" /*x*/ );"#, r#"<%=includeLater("a.js")%>"#)]
    fn test_rewrite_typed_requires(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(rewrite_requires(input, false), expected);
    }

    #[test]
    fn given_untyped_require_when_rewrite_all_then_becomes_include() {
        let src = "require(\"b.js\" /*note*/);\nvar x = 1;";
        assert_eq!(
            rewrite_requires(src, true),
            "<%=include(\"b.js\" /*note*/)%>\nvar x = 1;"
        );
        assert_eq!(rewrite_requires(src, false), src);
    }

    #[test]
    fn given_require_mid_line_when_rewriting_then_left_alone() {
        let src = "var fs = require(\"fs\");";
        assert_eq!(rewrite_requires(src, true), src);
    }

    #[test]
    fn given_consecutive_requires_when_rewriting_then_keeps_line_structure() {
        let src = "require(\"a.js\");\nrequire(\"after:b.js\");\nbody();";
        assert_eq!(
            rewrite_requires(src, true),
            "<%=include(\"a.js\")%>\n<%=includeAfter(\"b.js\")%>\nbody();"
        );
    }

    #[test]
    fn given_mixed_directives_when_finding_then_yields_in_order() {
        let src = "// lib\n<%=include(\"a.js\")%>\ncode();\n<%= insertOnce( /*c*/ 'b.js' ) %>";
        let found: Vec<_> = find_directives(src).collect();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, DirectiveKind::Before);
        assert_eq!(found[0].path, "a.js");
        assert_eq!(found[0].leading_comments, "// lib\n");
        assert_eq!(found[1].kind, DirectiveKind::InsertOnce);
        assert_eq!(found[1].path, "b.js");
        assert_eq!(found[1].inner_comments, "/*c*/");
        assert!(!found[1].legacy);
    }

    #[test]
    fn given_legacy_requires_when_finding_then_reports_kind_and_path() {
        let src = "require(\"later: g.js\");\nrequire(\"h.js\");";
        let found: Vec<_> = find_requires(src).collect();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, DirectiveKind::Later);
        assert_eq!(found[0].path, "g.js");
        assert_eq!(found[1].kind, DirectiveKind::Before);
        assert!(found[1].legacy);
    }

    #[test]
    fn given_leading_includes_when_splitting_then_peels_them() {
        let src = "/* header */\n<%=include(\"a.js\")%>\n<%=include(\"b.js\")%>\n\ncode();\n";
        let split = split_leading_directives(src);

        assert_eq!(split.includes.len(), 1);
        assert!(split.includes[0].contains("a.js"));
        assert!(split.includes[0].contains("b.js"));
        assert_eq!(split.comments, vec!["/* header */\n".to_string()]);
        assert_eq!(split.body, "code();\n");
        assert_eq!(split.include_line_feeds(), 3);
    }

    #[test]
    fn given_mid_body_include_when_splitting_then_rewritten_as_later() {
        let src = "<%=include(\"a.js\")%>\ncode();\n<%=include(\"c.js\")%>\n<%=includeAfter(\"d.js\")%>\nmore();";
        let split = split_leading_directives(src);

        assert_eq!(split.includes.len(), 1);
        assert!(split.body.contains("<%=includeLater(\"c.js\")%>"));
        assert!(split.body.contains("<%=includeAfter(\"d.js\")%>"));
        assert!(split.body.starts_with("code();"));
        assert!(split.body.ends_with("more();"));
    }

    #[test]
    fn given_body_first_when_splitting_then_nothing_is_peeled() {
        let src = "code();\n<%=include(\"a.js\")%>\n";
        let split = split_leading_directives(src);

        assert!(split.includes.is_empty());
        assert_eq!(split.index, 0);
        assert_eq!(split.body, "code();\n<%=includeLater(\"a.js\")%>\n");
    }

    #[rstest]
    #[case("\"use strict\";\nvar a;", true, "", "var a;")]
    #[case("'use strict';\nvar a;", false, "'use strict';\n", "var a;")]
    #[case("var a;", true, "", "var a;")]
    fn test_cut_pragma(
        #[case] src: &str,
        #[case] remove: bool,
        #[case] displayed: &str,
        #[case] rest: &str,
    ) {
        let pragma = cut_pragma(src, remove);
        assert_eq!(pragma.displayed, displayed);
        assert_eq!(pragma.source, rest);
    }

    #[test]
    fn given_blank_lines_when_stripping_count_then_requires_that_many() {
        assert_eq!(strip_leading_blank_lines("\n\nx", 2), "x");
        assert_eq!(strip_leading_blank_lines("  \n\tx", 1), "\tx");
        assert_eq!(strip_leading_blank_lines("\nx", 2), "\nx");
        assert_eq!(strip_leading_blank_lines("a\n", 1), "a\n");
        assert_eq!(strip_leading_blank_lines("x", 0), "x");
    }

    #[test]
    fn given_kind_names_when_parsing_then_roundtrips() {
        for kind in DirectiveKind::ALL {
            assert_eq!(kind.as_str().parse::<DirectiveKind>(), Ok(kind));
            assert_eq!(DirectiveKind::from_call_name(kind.call_name()), Some(kind));
        }
        assert!("sideways".parse::<DirectiveKind>().is_err());
    }
}
