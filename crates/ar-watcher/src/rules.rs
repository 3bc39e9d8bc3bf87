//! Gitignore-style include and exclude rules.
//!
//! A target opts into monitoring by placing a rule file in its working
//! directory. Each file is compiled once into a [`RuleMatcher`]; the pair of
//! them forms a [`PatternSet`] which classifies every changed path.
//!
//! # Examples
//!
//! ```
//! use ar_watcher::RuleMatcher;
//! use camino::Utf8Path;
//!
//! // A missing rule file degrades to a constant answer.
//! let include = RuleMatcher::compile(Utf8Path::new("/nonexistent/.autorestart_includes"), true);
//! assert!(include.matches(Utf8Path::new("/nonexistent/app.py"), false));
//! ```

use std::fmt;

use ar_core::WatchConfig;
use camino::{Utf8Path, Utf8PathBuf};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use crate::WatchError;

/// A compiled rule file.
///
/// Matching is evaluated against the path relative to the rule file's
/// directory. A path matches when it or any of its parent directories
/// matches, and the last matching rule wins.
#[derive(Debug, Clone)]
pub enum RuleMatcher {
    /// No usable rule file: every path yields the same answer.
    Constant(bool),
    /// Rules compiled from a file.
    Rules {
        /// Directory the rules are anchored at.
        root: Utf8PathBuf,
        /// The compiled rules.
        rules: Gitignore,
    },
}

impl RuleMatcher {
    /// Compiles the rule file at `rule_file`.
    ///
    /// A missing file yields [`RuleMatcher::Constant`] with `default`. An
    /// unreadable file does the same after a warning. Malformed lines are
    /// skipped with a warning and the remaining rules still apply.
    pub fn compile(rule_file: &Utf8Path, default: bool) -> Self {
        if !rule_file.is_file() {
            return Self::Constant(default);
        }

        match try_compile(rule_file) {
            Ok(matcher) => matcher,
            Err(error) => {
                warn!(path = %rule_file, %error, default, "Cannot read rule file, using default");
                Self::Constant(default)
            }
        }
    }

    /// Returns `true` if `path` is matched by these rules.
    ///
    /// `path` may be absolute (it must then lie under the rule file's
    /// directory to match) or relative to that directory. The rule
    /// directory itself never matches.
    #[must_use]
    pub fn matches(&self, path: &Utf8Path, is_dir: bool) -> bool {
        match self {
            Self::Constant(answer) => *answer,
            Self::Rules { root, rules } => {
                let relative = if path.is_absolute() {
                    match path.strip_prefix(root) {
                        Ok(relative) => relative,
                        Err(_) => return false,
                    }
                } else {
                    path
                };
                if relative.as_str().is_empty() {
                    return false;
                }
                rules
                    .matched_path_or_any_parents(relative.as_std_path(), is_dir)
                    .is_ignore()
            }
        }
    }

    /// Returns `true` if no rule file was compiled.
    #[inline]
    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    /// Number of compiled rules; zero for a constant matcher.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        match self {
            Self::Constant(_) => 0,
            Self::Rules { rules, .. } => rules.len(),
        }
    }
}

fn try_compile(rule_file: &Utf8Path) -> Result<RuleMatcher, WatchError> {
    let root = rule_file.parent().unwrap_or(Utf8Path::new("")).to_owned();
    let mut builder = GitignoreBuilder::new(root.as_std_path());

    if let Some(error) = builder.add(rule_file.as_std_path()) {
        if error.is_io() {
            return Err(WatchError::rules(rule_file, error));
        }
        report_malformed(rule_file, &error);
    }

    let rules = builder
        .build()
        .map_err(|error| WatchError::rules(rule_file, error))?;
    debug!(
        path = %rule_file,
        rules = rules.len(),
        "Compiled rule file"
    );
    Ok(RuleMatcher::Rules { root, rules })
}

fn report_malformed(rule_file: &Utf8Path, error: &ignore::Error) {
    match error {
        ignore::Error::Partial(errors) => {
            for error in errors {
                warn!(path = %rule_file, %error, "Skipping malformed rule");
            }
        }
        error => warn!(path = %rule_file, %error, "Skipping malformed rule"),
    }
}

/// Outcome of classifying a changed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The change counts towards a restart.
    Included,
    /// A file not matched by the include rules.
    ExcludedByIncludes,
    /// A path matched by the exclude rules.
    ExcludedByExcludes,
}

impl Decision {
    /// Returns `true` for [`Decision::Included`].
    #[inline]
    #[must_use]
    pub const fn is_included(self) -> bool {
        matches!(self, Self::Included)
    }

    /// Short label used in logs and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Included => "included",
            Self::ExcludedByIncludes => "not included",
            Self::ExcludedByExcludes => "excluded",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The include and exclude rules of one working directory.
#[derive(Debug, Clone)]
pub struct PatternSet {
    include: RuleMatcher,
    exclude: RuleMatcher,
}

impl PatternSet {
    /// Builds a set from already compiled matchers.
    #[must_use]
    pub fn new(include: RuleMatcher, exclude: RuleMatcher) -> Self {
        Self { include, exclude }
    }

    /// Compiles both rule files of `working_dir`.
    ///
    /// A missing include file includes everything; a missing exclude file
    /// excludes nothing.
    pub fn load(working_dir: &Utf8Path, config: &WatchConfig) -> Self {
        Self {
            include: RuleMatcher::compile(&config.includes_path(working_dir), true),
            exclude: RuleMatcher::compile(&config.excludes_path(working_dir), false),
        }
    }

    /// Returns `true` if `working_dir` carries at least one rule file.
    #[must_use]
    pub fn is_opted_in(working_dir: &Utf8Path, config: &WatchConfig) -> bool {
        config.includes_path(working_dir).exists() || config.excludes_path(working_dir).exists()
    }

    /// The include matcher.
    #[inline]
    pub fn include(&self) -> &RuleMatcher {
        &self.include
    }

    /// The exclude matcher.
    #[inline]
    pub fn exclude(&self) -> &RuleMatcher {
        &self.exclude
    }

    /// Whether the tree walk should enter `dir`.
    #[inline]
    #[must_use]
    pub fn should_descend(&self, dir: &Utf8Path) -> bool {
        !self.exclude.matches(dir, true)
    }

    /// Classifies a changed path.
    ///
    /// Directories bypass the include rules. Anything matched by the exclude
    /// rules is excluded regardless of kind.
    #[must_use]
    pub fn classify(&self, path: &Utf8Path, is_dir: bool) -> Decision {
        if !is_dir && !self.include.matches(path, false) {
            Decision::ExcludedByIncludes
        } else if self.exclude.matches(path, is_dir) {
            Decision::ExcludedByExcludes
        } else {
            Decision::Included
        }
    }
}
