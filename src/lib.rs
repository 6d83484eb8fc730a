//! sniff: a source-file inclusion preprocessor.
//!
//! Files pull in other files with template directives
//! (`<%=include("a.js")%>`, `includeAfter`, `includeLater`, `insert`,
//! `insertOnce`) or legacy `require("type:path")` statements. The
//! [`application::Includer`] resolves them into one output and records the
//! dependency tree as a [`domain::DependencyMap`].

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
