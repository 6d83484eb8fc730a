use std::path::{Component, Path, PathBuf};

pub trait PathExt {
    /// Lexically resolve `.` and `..` components without touching the filesystem.
    fn normalized(&self) -> PathBuf;
    /// True when the normalized path lies inside (or equals) `root`.
    fn is_within(&self, root: &Path) -> bool;
    fn to_string_lossy_owned(&self) -> String;
}

impl PathExt for Path {
    fn normalized(&self) -> PathBuf {
        let mut out = PathBuf::new();
        for component in self.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => match out.components().next_back() {
                    Some(Component::Normal(_)) => {
                        out.pop();
                    }
                    // `/..` stays `/`
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                    _ => out.push(".."),
                },
                other => out.push(other.as_os_str()),
            }
        }
        out
    }

    fn is_within(&self, root: &Path) -> bool {
        self.normalized().starts_with(root.normalized())
    }

    fn to_string_lossy_owned(&self) -> String {
        self.to_string_lossy().into_owned()
    }
}

/// Path of `path` relative to `base` as display text, `""` for the base itself.
pub fn relative_display(path: &Path, base: &Path) -> String {
    pathdiff::diff_paths(path, base)
        .map(|p| p.to_string_lossy_owned())
        .unwrap_or_else(|| path.to_string_lossy_owned())
}

/// Parent directory of a relative display path, `"."` when there is none.
pub fn display_dir(path: &str) -> String {
    match Path::new(path).parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy_owned(),
        _ => ".".to_string(),
    }
}

/// Expand `~`, `$VAR` and `${VAR}`; the input is kept when expansion fails.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Backslashes to forward slashes, for URLs.
pub fn to_url_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Directive argument naming a path from the source root (`/a.js`, `\a.js`).
pub fn is_source_rooted(arg: &str) -> bool {
    arg.starts_with('/') || arg.starts_with('\\')
}
