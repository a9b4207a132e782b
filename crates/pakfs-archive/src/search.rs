//! Entry name search.

use std::borrow::Cow;

use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};

use crate::archive::Archive;
use crate::entry::Entry;
use crate::{Error, Result};

/// How search filters are matched against entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Shell glob over the full path. `*` also matches `/`.
    #[default]
    Pattern,
    /// Regular expression, matched anywhere in the path.
    Regex,
    /// The name starts with the filter.
    Prefix,
    /// The name ends with the filter.
    Suffix,
    /// The name equals the filter.
    Exact,
    /// The name with its final extension removed equals the filter.
    ExactStem,
}

/// One compiled filter.
enum Matcher {
    Glob(Pattern),
    Regex(Regex),
    Text(String),
}

struct Query {
    mode: SearchMode,
    case_insensitive: bool,
    matchers: Vec<Matcher>,
}

impl Query {
    fn new<S: AsRef<str>>(filters: &[S], mode: SearchMode, case_insensitive: bool) -> Result<Self> {
        let matchers = filters
            .iter()
            .map(|filter| {
                let filter = filter.as_ref().replace('\\', "/");
                compile(filter, mode, case_insensitive)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            mode,
            case_insensitive,
            matchers,
        })
    }

    fn matches(&self, name: &str) -> bool {
        let fold_case = self.case_insensitive
            && !matches!(self.mode, SearchMode::Pattern | SearchMode::Regex);
        let name = normalize(name, fold_case);
        let options = MatchOptions {
            case_sensitive: !self.case_insensitive,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        self.matchers.iter().any(|matcher| match (matcher, self.mode) {
            (Matcher::Glob(pattern), _) => pattern.matches_with(&name, options),
            (Matcher::Regex(regex), _) => regex.is_match(&name),
            (Matcher::Text(text), SearchMode::Prefix) => name.starts_with(text.as_str()),
            (Matcher::Text(text), SearchMode::Suffix) => name.ends_with(text.as_str()),
            (Matcher::Text(text), SearchMode::ExactStem) => strip_extension(&name) == text.as_str(),
            (Matcher::Text(text), _) => name == text.as_str(),
        })
    }
}

fn compile(filter: String, mode: SearchMode, case_insensitive: bool) -> Result<Matcher> {
    let invalid = |message: String| Error::InvalidPattern {
        pattern: filter.clone(),
        message,
    };

    match mode {
        SearchMode::Pattern => Pattern::new(&filter)
            .map(Matcher::Glob)
            .map_err(|e| invalid(e.to_string())),
        SearchMode::Regex => RegexBuilder::new(&filter)
            .case_insensitive(case_insensitive)
            .build()
            .map(Matcher::Regex)
            .map_err(|e| invalid(e.to_string())),
        _ if case_insensitive => Ok(Matcher::Text(filter.to_lowercase())),
        _ => Ok(Matcher::Text(filter)),
    }
}

fn normalize(name: &str, fold_case: bool) -> Cow<'_, str> {
    if fold_case {
        Cow::Owned(name.replace('\\', "/").to_lowercase())
    } else if name.contains('\\') {
        Cow::Owned(name.replace('\\', "/"))
    } else {
        Cow::Borrowed(name)
    }
}

/// Drop the final extension of the last path component.
fn strip_extension(name: &str) -> &str {
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    match name[file_start..].rfind('.') {
        Some(dot) if dot > 0 => &name[..file_start + dot],
        _ => name,
    }
}

impl Archive {
    /// Find entries whose names match any of `filters`.
    ///
    /// Results are in listing order and include flattened entries.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pakfs_archive::{Archive, SearchMode};
    ///
    /// let archive = Archive::open("Data.p4k")?;
    /// for entry in archive.search(&["Data/Libs/*.xml"], SearchMode::Pattern, true)? {
    ///     println!("{}", entry.name());
    /// }
    /// # Ok::<(), pakfs_archive::Error>(())
    /// ```
    pub fn search<S: AsRef<str>>(
        &self,
        filters: &[S],
        mode: SearchMode,
        case_insensitive: bool,
    ) -> Result<Vec<&Entry>> {
        let query = Query::new(filters, mode, case_insensitive)?;
        Ok(self.iter().filter(|e| query.matches(e.name())).collect())
    }
}
