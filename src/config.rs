//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/sniff/sniff.toml`
//! 3. Local config: `<project_dir>/.sniff.toml` (or the file given with `--config`)
//! 4. Environment variables: `SNIFF_*` prefix

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::util::path::expand_env_vars;

/// Letters allowed in `insert_surrounder_flags`: header, separator, footer.
pub const SURROUNDER_FLAGS: &str = "hsf";

/// When to put a `"use strict";` pragma on outputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PragmaPolicy {
    Always(bool),
    /// Only for files with one of these extensions (e.g. `".js"`)
    Extensions(Vec<String>),
}

impl Default for PragmaPolicy {
    fn default() -> Self {
        PragmaPolicy::Extensions(vec![".js".into()])
    }
}

impl PragmaPolicy {
    pub fn applies_to(&self, path: &str) -> bool {
        match self {
            PragmaPolicy::Always(on) => *on,
            PragmaPolicy::Extensions(exts) => exts.iter().any(|ext| {
                let ext = if ext.starts_with('.') {
                    ext.clone()
                } else {
                    format!(".{ext}")
                };
                path.ends_with(&ext)
            }),
        }
    }

    /// Parse the env var form: `true`, `false` or a comma separated extension list.
    fn parse(raw: &str) -> Self {
        match raw.trim() {
            "true" => PragmaPolicy::Always(true),
            "false" => PragmaPolicy::Always(false),
            list => PragmaPolicy::Extensions(
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            ),
        }
    }

    /// Extension lists union (with `!ext` negation); anything involving a bool replaces.
    fn merge(&self, overlay: &PragmaPolicy) -> Self {
        match (self, overlay) {
            (PragmaPolicy::Extensions(base), PragmaPolicy::Extensions(over)) => {
                PragmaPolicy::Extensions(merge_array(base, over))
            }
            (_, over) => over.clone(),
        }
    }
}

/// Merge arrays with union semantics and negation support.
///
/// ```ignore
/// merge_array(&[".js"], &[".mjs"])         // → [".js", ".mjs"]
/// merge_array(&[".js"], &["!.js", ".ts"])  // → [".ts"]
/// ```
pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
    let mut result: HashSet<String> = base.iter().cloned().collect();

    for pattern in overlay {
        if let Some(negated) = pattern.strip_prefix('!') {
            result.remove(negated);
        } else {
            result.insert(pattern.clone());
        }
    }

    let mut vec: Vec<String> = result.into_iter().collect();
    vec.sort();
    vec
}

/// Raw settings for intermediate parsing (`None` = not specified, inherit).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub source_dir: Option<String>,
    pub remove_leading_pragma: Option<bool>,
    pub force_output_pragma: Option<PragmaPolicy>,
    pub rewrite_all_unknown_requires: Option<bool>,
    pub trim_output: Option<bool>,
    pub header: Option<String>,
    pub separator: Option<String>,
    pub footer: Option<String>,
    pub insert_surrounder_flags: Option<String>,
    pub copy_destination_dir: Option<String>,
    pub globals: Option<BTreeMap<String, String>>,
    pub verbosity: Option<u8>,
    pub text_encoding: Option<String>,
}

/// Unified configuration for sniff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Source root, relative to the project root
    pub source_dir: String,
    /// Drop the leading `"use strict";` of every file
    pub remove_leading_pragma: bool,
    /// Re-add a pragma on the root output and on copies
    pub force_output_pragma: PragmaPolicy,
    /// Turn untyped `require()` statements into `include`
    pub rewrite_all_unknown_requires: bool,
    /// Trim every file body and the assembled output
    pub trim_output: bool,
    pub header: String,
    /// Emitted before every file but the first one
    pub separator: String,
    pub footer: String,
    /// Which of header (`h`), separator (`s`), footer (`f`) apply to inserted files
    pub insert_surrounder_flags: String,
    /// Mirror every processed file below this directory (`""` = off)
    pub copy_destination_dir: String,
    /// 0 silent, 1 normal, 2 detailed
    pub verbosity: u8,
    /// WHATWG encoding label of source files
    pub text_encoding: String,
    /// Template globals, read as `$.name`
    pub globals: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_dir: String::new(),
            remove_leading_pragma: true,
            force_output_pragma: PragmaPolicy::default(),
            rewrite_all_unknown_requires: true,
            trim_output: true,
            header: String::new(),
            separator: "\n".into(),
            footer: String::new(),
            insert_surrounder_flags: String::new(),
            copy_destination_dir: String::new(),
            verbosity: 1,
            text_encoding: "utf-8".into(),
            globals: BTreeMap::new(),
        }
    }
}

/// Get the XDG config directory for sniff.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "sniff").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("sniff.toml"))
}

/// Get the path to the local config file of a project.
pub fn local_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".sniff.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        self.source_dir = expand_env_vars(&self.source_dir);
        self.copy_destination_dir = expand_env_vars(&self.copy_destination_dir);
    }

    /// Merge a local config onto self: scalars replace, extension lists and
    /// globals union.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        let mut merged = self.apply_global(overlay);
        merged.force_output_pragma = overlay
            .force_output_pragma
            .as_ref()
            .map(|o| self.force_output_pragma.merge(o))
            .unwrap_or_else(|| self.force_output_pragma.clone());
        if let Some(globals) = &overlay.globals {
            merged.globals = self.globals.clone();
            merged
                .globals
                .extend(globals.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    /// Apply a global config onto defaults; everything specified replaces.
    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            source_dir: global
                .source_dir
                .clone()
                .unwrap_or_else(|| self.source_dir.clone()),
            remove_leading_pragma: global
                .remove_leading_pragma
                .unwrap_or(self.remove_leading_pragma),
            force_output_pragma: global
                .force_output_pragma
                .clone()
                .unwrap_or_else(|| self.force_output_pragma.clone()),
            rewrite_all_unknown_requires: global
                .rewrite_all_unknown_requires
                .unwrap_or(self.rewrite_all_unknown_requires),
            trim_output: global.trim_output.unwrap_or(self.trim_output),
            header: global.header.clone().unwrap_or_else(|| self.header.clone()),
            separator: global
                .separator
                .clone()
                .unwrap_or_else(|| self.separator.clone()),
            footer: global.footer.clone().unwrap_or_else(|| self.footer.clone()),
            insert_surrounder_flags: global
                .insert_surrounder_flags
                .clone()
                .unwrap_or_else(|| self.insert_surrounder_flags.clone()),
            copy_destination_dir: global
                .copy_destination_dir
                .clone()
                .unwrap_or_else(|| self.copy_destination_dir.clone()),
            globals: global
                .globals
                .clone()
                .unwrap_or_else(|| self.globals.clone()),
            verbosity: global.verbosity.unwrap_or(self.verbosity),
            text_encoding: global
                .text_encoding
                .clone()
                .unwrap_or_else(|| self.text_encoding.clone()),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `project_dir` - Optional project directory holding `.sniff.toml`
    /// * `config_file` - Explicit local config file, used instead of `.sniff.toml`
    ///
    /// # Precedence (lowest to highest)
    /// 1. Compiled defaults
    /// 2. Global config (replaces defaults)
    /// 3. Local config (scalars replace, extension lists and globals union)
    /// 4. Environment variables: `SNIFF_*` prefix (replace)
    pub fn load(
        project_dir: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.apply_global(&raw);
            }
        }

        let local_path = match (config_file, project_dir) {
            (Some(file), _) => Some(file.to_path_buf()),
            (None, Some(project)) => Some(local_config_path(project)),
            (None, None) => None,
        };
        if let Some(local_path) = local_path {
            if config_file.is_some() || local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();
        current.validate()?;

        Ok(current)
    }

    /// Apply SNIFF_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("SNIFF")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("source_dir") {
            settings.source_dir = val;
        }
        if let Ok(val) = config.get_bool("remove_leading_pragma") {
            settings.remove_leading_pragma = val;
        }
        if let Ok(val) = config.get_string("force_output_pragma") {
            settings.force_output_pragma = PragmaPolicy::parse(&val);
        }
        if let Ok(val) = config.get_bool("rewrite_all_unknown_requires") {
            settings.rewrite_all_unknown_requires = val;
        }
        if let Ok(val) = config.get_bool("trim_output") {
            settings.trim_output = val;
        }
        if let Ok(val) = config.get_string("header") {
            settings.header = val;
        }
        if let Ok(val) = config.get_string("separator") {
            settings.separator = val;
        }
        if let Ok(val) = config.get_string("footer") {
            settings.footer = val;
        }
        if let Ok(val) = config.get_string("insert_surrounder_flags") {
            settings.insert_surrounder_flags = val;
        }
        if let Ok(val) = config.get_string("copy_destination_dir") {
            settings.copy_destination_dir = val;
        }
        if let Ok(val) = config.get::<HashMap<String, String>>("globals") {
            settings.globals.extend(val);
        }
        if let Ok(val) = config.get_int("verbosity") {
            settings.verbosity = val.clamp(0, 2) as u8;
        }
        if let Ok(val) = config.get_string("text_encoding") {
            settings.text_encoding = val;
        }

        Ok(settings)
    }

    /// Reject values the resolver cannot work with.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        if encoding_rs::Encoding::for_label(self.text_encoding.as_bytes()).is_none() {
            return Err(ApplicationError::Config {
                message: format!("unknown text encoding: {}", self.text_encoding),
            });
        }
        if let Some(bad) = self
            .insert_surrounder_flags
            .to_lowercase()
            .chars()
            .find(|c| !SURROUNDER_FLAGS.contains(*c))
        {
            return Err(ApplicationError::Config {
                message: format!(
                    "invalid insert surrounder flag '{bad}', expected a subset of \"{SURROUNDER_FLAGS}\""
                ),
            });
        }
        Ok(())
    }

    /// Surrounder flag check, case-insensitive.
    pub fn insert_surrounder(&self, flag: char) -> bool {
        self.insert_surrounder_flags
            .to_lowercase()
            .contains(flag.to_ascii_lowercase())
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# sniff configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/sniff/sniff.toml   (defines your baseline)
#   Local:  <project_dir>/.sniff.toml    (project-specific additions)
#   Env:    SNIFF_* environment variables (explicit overrides)
#
# Local config UNIONS force_output_pragma extension lists and globals with
# the global config; "!ext" removes an inherited extension.

# Source root, relative to the project directory
# source_dir = "src"

# Drop the leading "use strict"; of every file
# remove_leading_pragma = true

# Put "use strict"; back on outputs: true, false or a list of extensions
# force_output_pragma = [".js"]

# Turn untyped require("x.js") statements into includes
# rewrite_all_unknown_requires = true

# Trim file bodies and assembled output
# trim_output = true

# Text around every file (template syntax allowed)
# header = ""
# separator = "\n"
# footer = ""

# Surrounders applied to inserted files: any of "h", "s", "f"
# insert_surrounder_flags = ""

# Mirror every processed file below this directory
# copy_destination_dir = ""

# 0 silent, 1 normal, 2 detailed
# verbosity = 1

# Encoding of source files (WHATWG label)
# text_encoding = "utf-8"

[globals]
# Template globals, read as $.name
# version = "1.0.0"
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn given_defaults_when_created_then_match_documented_values() {
        let settings = Settings::default();
        assert!(settings.remove_leading_pragma);
        assert!(settings.rewrite_all_unknown_requires);
        assert!(settings.trim_output);
        assert_eq!(settings.separator, "\n");
        assert_eq!(settings.verbosity, 1);
        assert_eq!(settings.text_encoding, "utf-8");
        assert_eq!(
            settings.force_output_pragma,
            PragmaPolicy::Extensions(vec![".js".into()])
        );
        assert!(settings.validate().is_ok());
    }

    #[rstest]
    #[case(PragmaPolicy::Always(true), "a.css", true)]
    #[case(PragmaPolicy::Always(false), "a.js", false)]
    #[case(PragmaPolicy::Extensions(vec![".js".into()]), "lib/a.js", true)]
    #[case(PragmaPolicy::Extensions(vec!["js".into()]), "a.js", true)]
    #[case(PragmaPolicy::Extensions(vec![".js".into()]), "a.json", false)]
    fn test_pragma_policy_applies(
        #[case] policy: PragmaPolicy,
        #[case] path: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(policy.applies_to(path), expected);
    }

    #[rstest]
    #[case("true", PragmaPolicy::Always(true))]
    #[case("false", PragmaPolicy::Always(false))]
    #[case(".js, .mjs", PragmaPolicy::Extensions(vec![".js".into(), ".mjs".into()]))]
    fn test_pragma_policy_parse(#[case] raw: &str, #[case] expected: PragmaPolicy) {
        assert_eq!(PragmaPolicy::parse(raw), expected);
    }

    #[test]
    fn test_merge_array_negation() {
        let base = vec![".js".to_string(), ".mjs".to_string()];
        let overlay = vec!["!.js".to_string(), ".ts".to_string()];
        assert_eq!(
            merge_array(&base, &overlay),
            vec![".mjs".to_string(), ".ts".to_string()]
        );
    }

    #[test]
    fn given_local_overlay_when_merging_then_scalars_replace_and_globals_union() {
        let mut base = Settings::default();
        base.globals.insert("a".into(), "1".into());
        let overlay = RawSettings {
            trim_output: Some(false),
            header: Some("/* h */".into()),
            force_output_pragma: Some(PragmaPolicy::Extensions(vec![".mjs".into()])),
            globals: Some(BTreeMap::from([("b".to_string(), "2".to_string())])),
            ..RawSettings::default()
        };

        let merged = base.merge_with(&overlay);

        assert!(!merged.trim_output);
        assert_eq!(merged.header, "/* h */");
        assert_eq!(merged.separator, "\n");
        assert_eq!(
            merged.force_output_pragma,
            PragmaPolicy::Extensions(vec![".js".into(), ".mjs".into()])
        );
        assert_eq!(merged.globals.len(), 2);
    }

    #[test]
    fn given_global_overlay_when_applied_then_lists_replace() {
        let global = RawSettings {
            force_output_pragma: Some(PragmaPolicy::Extensions(vec![".mjs".into()])),
            globals: Some(BTreeMap::from([("b".to_string(), "2".to_string())])),
            ..RawSettings::default()
        };
        let mut base = Settings::default();
        base.globals.insert("a".into(), "1".into());

        let applied = base.apply_global(&global);

        assert_eq!(
            applied.force_output_pragma,
            PragmaPolicy::Extensions(vec![".mjs".into()])
        );
        assert_eq!(applied.globals.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[rstest]
    #[case("latin1", "", true)]
    #[case("klingon", "", false)]
    #[case("utf-8", "HS", true)]
    #[case("utf-8", "hx", false)]
    fn test_validate(#[case] encoding: &str, #[case] flags: &str, #[case] ok: bool) {
        let settings = Settings {
            text_encoding: encoding.into(),
            insert_surrounder_flags: flags.into(),
            ..Settings::default()
        };
        assert_eq!(settings.validate().is_ok(), ok);
    }

    #[test]
    fn given_tilde_in_copy_dir_when_expand_paths_then_expands_to_home() {
        let mut settings = Settings {
            copy_destination_dir: "~/out".into(),
            ..Settings::default()
        };

        settings.expand_paths();

        let home = std::env::var("HOME").expect("HOME should be set");
        assert!(settings.copy_destination_dir.starts_with(&home));
    }

    #[test]
    fn given_settings_when_serialized_then_toml_round_trips() {
        let settings = Settings::default();
        let toml = settings.to_toml().expect("serialize");
        let back: Settings = toml::from_str(&toml).expect("parse");
        assert_eq!(back, settings);
        assert!(Settings::template().contains("[globals]"));
    }
}
