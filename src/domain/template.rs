//! Template evaluation seam and the built-in directive template engine.
//!
//! Syntax understood by [`DirectiveTemplate`]:
//!
//! ```text
//! <%= expr %>            interpolate
//! <% expr; expr %>       evaluate, discard
//! expr := "str" | 'str' | 42 | name | $.name | call(expr, ...)
//! ```
//!
//! `/* ... */` comments may appear wherever whitespace may.

use std::fmt;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_till, take_until};
use nom::character::complete::{alpha1, alphanumeric1, char, digit1, multispace1};
use nom::combinator::{map, map_res, opt, recognize, value};
use nom::multi::{many0, many0_count, separated_list0};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;

use crate::domain::directive::DirectiveKind;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::record::FileRecord;

/// What a template sees of the file it is rendering and of the resolver.
pub trait TemplateScope {
    fn record(&self) -> &FileRecord;

    /// Files finalized so far.
    fn inserted(&self) -> usize;

    /// Resolve a directive met during evaluation; returns the text to splice.
    fn invoke(
        &mut self,
        kind: DirectiveKind,
        path: &str,
        args: Option<String>,
        sink: Option<String>,
    ) -> DomainResult<String>;

    fn global(&self, name: &str) -> Option<String>;

    fn set_global(&mut self, name: &str, value: String);

    /// Value handed back to the inserting file through its sink.
    fn set_output(&mut self, value: String);

    fn debug(&self, msg: &str);
}

/// Renders a rebuilt file, calling back into the scope for every directive.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, source: &str, scope: &mut dyn TemplateScope) -> DomainResult<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Ident(String),
    Global(String),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Output(Expr),
    Code(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Str(String),
    Int(i64),
}

impl Value {
    fn into_opt_string(self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
        }
    }
}

fn comment(input: &str) -> IResult<&str, &str> {
    delimited(tag("/*"), take_until("*/"), tag("*/"))(input)
}

fn ws(input: &str) -> IResult<&str, ()> {
    value((), many0_count(alt((multispace1, comment))))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn string_literal(input: &str) -> IResult<&str, Expr> {
    map(
        alt((
            delimited(char('"'), take_till(|c| c == '"'), char('"')),
            delimited(char('\''), take_till(|c| c == '\''), char('\'')),
        )),
        |s: &str| Expr::Str(s.to_string()),
    )(input)
}

fn integer(input: &str) -> IResult<&str, Expr> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| {
        s.parse::<i64>().map(Expr::Int)
    })(input)
}

fn global(input: &str) -> IResult<&str, Expr> {
    map(preceded(tag("$."), identifier), |name| {
        Expr::Global(name.to_string())
    })(input)
}

fn call_or_identifier(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    let (input, args) = opt(preceded(
        pair(ws, char('(')),
        terminated(
            separated_list0(char(','), delimited(ws, expr, ws)),
            pair(ws, char(')')),
        ),
    ))(input)?;
    let expr = match args {
        Some(args) => Expr::Call(name.to_string(), args),
        None => Expr::Ident(name.to_string()),
    };
    Ok((input, expr))
}

pub fn expr(input: &str) -> IResult<&str, Expr> {
    alt((string_literal, integer, global, call_or_identifier))(input)
}

fn output_tag(input: &str) -> IResult<&str, Segment<'_>> {
    map(
        delimited(
            tag("<%="),
            delimited(ws, expr, tuple((ws, opt(char(';')), ws))),
            tag("%>"),
        ),
        Segment::Output,
    )(input)
}

fn code_tag(input: &str) -> IResult<&str, Segment<'_>> {
    map(
        delimited(
            pair(tag("<%"), ws),
            many0(terminated(expr, tuple((ws, opt(char(';')), ws)))),
            tag("%>"),
        ),
        Segment::Code,
    )(input)
}

/// Split a template into literal text and tags.
pub fn parse_template(src: &str) -> Result<Vec<Segment<'_>>, String> {
    let mut segments = Vec::new();
    let mut rest = src;

    while !rest.is_empty() {
        let Some(pos) = rest.find("<%") else {
            segments.push(Segment::Text(rest));
            break;
        };
        if pos > 0 {
            segments.push(Segment::Text(&rest[..pos]));
        }
        let tail = &rest[pos..];
        match alt((output_tag, code_tag))(tail) {
            Ok((remaining, segment)) => {
                segments.push(segment);
                rest = remaining;
            }
            Err(_) => {
                let offset = src.len() - tail.len();
                let line = src[..offset].matches('\n').count() + 1;
                return Err(format!("invalid template tag at line {line}"));
            }
        }
    }
    Ok(segments)
}

/// Built-in engine for the directive template syntax.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectiveTemplate;

impl DirectiveTemplate {
    pub fn new() -> Self {
        Self
    }

    fn render_with(
        &self,
        source: &str,
        scope: &mut dyn TemplateScope,
        args: Option<&str>,
    ) -> DomainResult<String> {
        let segments = parse_template(source)
            .map_err(|msg| DomainError::template(scope.record().cwd_path.clone(), msg))?;

        let mut out = String::with_capacity(source.len());
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Output(expr) => {
                    let value = self.eval(&expr, scope, args)?;
                    out.push_str(&value.to_string());
                }
                Segment::Code(statements) => {
                    for statement in &statements {
                        self.eval(statement, scope, args)?;
                    }
                }
            }
        }
        Ok(out)
    }

    fn eval(
        &self,
        expr: &Expr,
        scope: &mut dyn TemplateScope,
        args: Option<&str>,
    ) -> DomainResult<Value> {
        match expr {
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Global(name) => Ok(scope.global(name).map_or(Value::Null, Value::Str)),
            Expr::Ident(name) => self.lookup(name, scope, args),
            Expr::Call(name, params) => {
                let mut values = Vec::with_capacity(params.len());
                for param in params {
                    values.push(self.eval(param, scope, args)?);
                }
                self.call(name, values, scope)
            }
        }
    }

    fn lookup(
        &self,
        name: &str,
        scope: &mut dyn TemplateScope,
        args: Option<&str>,
    ) -> DomainResult<Value> {
        match (name, args) {
            ("args", Some(args)) => Ok(Value::Str(args.to_string())),
            ("args", None) => Ok(scope.record().args.clone().map_or(Value::Null, Value::Str)),
            ("inserted", _) => Ok(Value::Int(scope.inserted() as i64)),
            _ => scope.record().field(name).map(Value::Str).ok_or_else(|| {
                DomainError::template(
                    scope.record().cwd_path.clone(),
                    format!("{name} is not defined"),
                )
            }),
        }
    }

    fn call(
        &self,
        name: &str,
        values: Vec<Value>,
        scope: &mut dyn TemplateScope,
    ) -> DomainResult<Value> {
        let mut values = values.into_iter();
        let mut next = || values.next().unwrap_or(Value::Null);

        if let Some(kind) = DirectiveKind::from_call_name(name) {
            let path = next().to_string();
            let (args, sink) = if kind.is_insert() {
                (next().into_opt_string(), next().into_opt_string())
            } else {
                (None, None)
            };
            return scope.invoke(kind, &path, args, sink).map(Value::Str);
        }

        match name {
            "debug" => {
                scope.debug(&next().to_string());
                Ok(Value::Null)
            }
            "set" => {
                let key = next().to_string();
                scope.set_global(&key, next().to_string());
                Ok(Value::Null)
            }
            "output" => {
                scope.set_output(next().to_string());
                Ok(Value::Null)
            }
            "tplContext" => {
                let snippet_name = next().to_string();
                let args = next().into_opt_string();
                let snippet = scope.global(&snippet_name).ok_or_else(|| {
                    DomainError::template(
                        scope.record().cwd_path.clone(),
                        format!("no template context named {snippet_name}"),
                    )
                })?;
                self.render_with(&snippet, scope, args.as_deref())
                    .map(Value::Str)
            }
            _ => Err(DomainError::template(
                scope.record().cwd_path.clone(),
                format!("{name} is not a function"),
            )),
        }
    }
}

impl TemplateEngine for DirectiveTemplate {
    fn render(&self, source: &str, scope: &mut dyn TemplateScope) -> DomainResult<String> {
        self.render_with(source, scope, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;

    struct RecordingScope {
        record: FileRecord,
        globals: BTreeMap<String, String>,
        calls: Vec<(DirectiveKind, String, Option<String>, Option<String>)>,
        output: Option<String>,
    }

    impl RecordingScope {
        fn new() -> Self {
            Self {
                record: FileRecord::new(
                    "a.js",
                    Path::new("/p/lib/a.js"),
                    Path::new("/p"),
                    "",
                    DirectiveKind::Before,
                    None,
                ),
                globals: BTreeMap::new(),
                calls: Vec::new(),
                output: None,
            }
        }
    }

    impl TemplateScope for RecordingScope {
        fn record(&self) -> &FileRecord {
            &self.record
        }

        fn inserted(&self) -> usize {
            3
        }

        fn invoke(
            &mut self,
            kind: DirectiveKind,
            path: &str,
            args: Option<String>,
            sink: Option<String>,
        ) -> DomainResult<String> {
            self.calls.push((kind, path.to_string(), args, sink));
            Ok(format!("[{path}]"))
        }

        fn global(&self, name: &str) -> Option<String> {
            self.globals.get(name).cloned()
        }

        fn set_global(&mut self, name: &str, value: String) {
            self.globals.insert(name.to_string(), value);
        }

        fn set_output(&mut self, value: String) {
            self.output = Some(value);
        }

        fn debug(&self, _msg: &str) {}
    }

    #[test]
    fn given_directive_calls_when_rendering_then_invokes_scope_in_order() {
        let mut scope = RecordingScope::new();
        let out = DirectiveTemplate
            .render(
                "x<%=include(\"b.js\")%>y<%= insert( /*c*/ 'i.js', 7, \"sink\" ) %>z",
                &mut scope,
            )
            .unwrap();

        assert_eq!(out, "x[b.js]y[i.js]z");
        assert_eq!(scope.calls[0].0, DirectiveKind::Before);
        assert_eq!(
            scope.calls[1],
            (
                DirectiveKind::Insert,
                "i.js".to_string(),
                Some("7".to_string()),
                Some("sink".to_string())
            )
        );
    }

    #[test]
    fn given_record_identifiers_when_rendering_then_interpolated() {
        let mut scope = RecordingScope::new();
        let out = DirectiveTemplate
            .render("<%= path %>|<%= dir %>|<%= position %>|<%= inserted %>", &mut scope)
            .unwrap();

        assert_eq!(
            out,
            format!(
                "{}|lib|before|3",
                Path::new("lib").join("a.js").to_string_lossy()
            )
        );
    }

    #[test]
    fn given_code_tag_when_rendering_then_globals_set_and_nothing_emitted() {
        let mut scope = RecordingScope::new();
        let out = DirectiveTemplate
            .render("a<% set(\"name\", \"v\"); output($.name) %>b<%= $.name %>", &mut scope)
            .unwrap();

        assert_eq!(out, "abv");
        assert_eq!(scope.output.as_deref(), Some("v"));
    }

    #[test]
    fn given_snippet_when_tpl_context_then_renders_with_args() {
        let mut scope = RecordingScope::new();
        scope
            .globals
            .insert("banner".into(), "/* <%= args %> by <%= path %> */".into());

        let out = DirectiveTemplate
            .render("<%= tplContext(\"banner\", \"v1\") %>", &mut scope)
            .unwrap();

        assert_eq!(
            out,
            format!(
                "/* v1 by {} */",
                Path::new("lib").join("a.js").to_string_lossy()
            )
        );
    }

    #[test]
    fn given_unknown_function_when_rendering_then_template_error() {
        let mut scope = RecordingScope::new();
        let err = DirectiveTemplate
            .render("<%= frobnicate() %>", &mut scope)
            .unwrap_err();

        assert!(matches!(err, DomainError::Template { .. }));
        assert!(err.to_string().contains("frobnicate is not a function"));
    }

    #[test]
    fn given_unclosed_tag_when_parsing_then_reports_line() {
        let err = parse_template("a\nb\n<%= include(\"x\"").unwrap_err();
        assert_eq!(err, "invalid template tag at line 3");
    }

    #[test]
    fn given_plain_text_when_parsing_then_single_segment() {
        assert_eq!(
            parse_template("var a = 1 % 2;").unwrap(),
            vec![Segment::Text("var a = 1 % 2;")]
        );
    }
}
