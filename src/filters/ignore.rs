use regex::{Regex, RegexBuilder};
use std::{any::type_name, borrow::Cow, error::Error as StdError, fmt, sync::Arc};

/// Class name used for type-erased errors, e.g. `Box<dyn Error>` created from a string.
pub const PLAIN_ERROR_CLASS: &str = "Error";

/// Predicate deciding whether an error belongs to a category.
pub type CategoryPredicate = Arc<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// A raised error together with its class name.
///
/// The class name is the fully qualified Rust type name of the error. References and `Box<T>`
/// resolve to `T`.
#[derive(Clone, Copy)]
pub struct ErrorRef<'a> {
    class: &'static str,
    error: &'a (dyn StdError + 'static),
}

impl<'a> ErrorRef<'a> {
    /// Wrap a statically typed error.
    pub fn new<E: StdError + 'static>(error: &'a E) -> Self {
        ErrorRef {
            class: class_name(type_name::<E>()),
            error,
        }
    }

    /// Wrap a type-erased error.
    ///
    /// Common standard library errors are recognized by downcasting; everything else gets the
    /// class [`PLAIN_ERROR_CLASS`].
    pub fn from_dyn(error: &'a (dyn StdError + 'static)) -> Self {
        ErrorRef {
            class: dyn_class_name(error),
            error,
        }
    }

    /// Fully qualified class name.
    pub fn class(&self) -> &'static str {
        self.class
    }

    /// The wrapped error.
    pub fn error(&self) -> &'a (dyn StdError + 'static) {
        self.error
    }
}

impl fmt::Debug for ErrorRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorRef")
            .field("class", &self.class)
            .field("error", &self.error)
            .finish()
    }
}

fn class_name(mut name: &'static str) -> &'static str {
    loop {
        if let Some(rest) = name.strip_prefix("&mut ") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('&') {
            name = rest;
        } else if let Some(inner) = name
            .strip_prefix("alloc::boxed::Box<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            name = inner;
        } else {
            break;
        }
    }
    if name.starts_with("dyn ") {
        PLAIN_ERROR_CLASS
    } else {
        name
    }
}

fn probe<T: StdError + 'static>(error: &(dyn StdError + 'static)) -> Option<&'static str> {
    error.is::<T>().then(type_name::<T>)
}

fn dyn_class_name(error: &(dyn StdError + 'static)) -> &'static str {
    probe::<std::io::Error>(error)
        .or_else(|| probe::<std::fmt::Error>(error))
        .or_else(|| probe::<std::num::ParseIntError>(error))
        .or_else(|| probe::<std::num::ParseFloatError>(error))
        .or_else(|| probe::<std::str::Utf8Error>(error))
        .or_else(|| probe::<std::string::FromUtf8Error>(error))
        .or_else(|| probe::<serde_json::Error>(error))
        .unwrap_or(PLAIN_ERROR_CLASS)
}

fn is_type<T: StdError + 'static>(error: &(dyn StdError + 'static)) -> bool {
    error.is::<T>()
}

/// A rule that suppresses matching errors before a notice is built.
#[derive(Clone)]
pub enum IgnorePattern {
    /// Matches a class name exactly, as a `::` path suffix, or as a case-insensitive regular
    /// expression. Invalid expressions only use the first two checks.
    Name(String),
    /// Matches the class name against a regular expression.
    Regex(Regex),
    /// Matches every error for which the predicate returns true.
    Category {
        /// Shown in debug output.
        name: Cow<'static, str>,
        /// Capability check.
        predicate: CategoryPredicate,
    },
    /// Matches errors of exactly one runtime type. Values are not compared.
    InstanceType {
        /// Class name of the type.
        name: &'static str,
        /// Type identity check.
        matches: fn(&(dyn StdError + 'static)) -> bool,
    },
}

impl IgnorePattern {
    /// Pattern matching a class name, see [`IgnorePattern::Name`].
    pub fn name(name: impl Into<String>) -> Self {
        IgnorePattern::Name(name.into())
    }

    /// Pattern matching the class name against `regex`.
    pub fn regex(regex: Regex) -> Self {
        IgnorePattern::Regex(regex)
    }

    /// Pattern matching a category of errors.
    ///
    /// ```
    /// use checkend::filters::IgnorePattern;
    ///
    /// let timeouts = IgnorePattern::category("io timeouts", |error| {
    ///     error
    ///         .downcast_ref::<std::io::Error>()
    ///         .map_or(false, |error| error.kind() == std::io::ErrorKind::TimedOut)
    /// });
    /// ```
    pub fn category<F>(name: impl Into<Cow<'static, str>>, predicate: F) -> Self
    where
        F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        IgnorePattern::Category {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Pattern matching every error of type `T`.
    pub fn of_type<T: StdError + 'static>() -> Self {
        IgnorePattern::InstanceType {
            name: class_name(type_name::<T>()),
            matches: is_type::<T>,
        }
    }

    /// Pattern matching every error with the same type as `instance`.
    pub fn instance_of<T: StdError + 'static>(_instance: &T) -> Self {
        Self::of_type::<T>()
    }
}

impl fmt::Debug for IgnorePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnorePattern::Name(name) => f.debug_tuple("Name").field(name).finish(),
            IgnorePattern::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
            IgnorePattern::Category { name, .. } => f.debug_tuple("Category").field(name).finish(),
            IgnorePattern::InstanceType { name, .. } => {
                f.debug_tuple("InstanceType").field(name).finish()
            }
        }
    }
}

impl From<&str> for IgnorePattern {
    fn from(name: &str) -> Self {
        IgnorePattern::Name(name.into())
    }
}

impl From<String> for IgnorePattern {
    fn from(name: String) -> Self {
        IgnorePattern::Name(name)
    }
}

impl From<Regex> for IgnorePattern {
    fn from(regex: Regex) -> Self {
        IgnorePattern::Regex(regex)
    }
}

#[derive(Clone)]
enum Matcher {
    Name { name: String, regex: Option<Regex> },
    Regex(Regex),
    Predicate(CategoryPredicate),
    Type(fn(&(dyn StdError + 'static)) -> bool),
}

impl Matcher {
    fn matches(&self, error: &ErrorRef<'_>) -> bool {
        match self {
            Matcher::Name { name, regex } => {
                let class = error.class();
                class == name.as_str()
                    || class
                        .strip_suffix(name.as_str())
                        .map_or(false, |prefix| prefix.ends_with("::"))
                    || regex.as_ref().map_or(false, |regex| regex.is_match(class))
            }
            Matcher::Regex(regex) => regex.is_match(error.class()),
            Matcher::Predicate(predicate) => predicate(error.error()),
            Matcher::Type(matches) => matches(error.error()),
        }
    }
}

impl From<IgnorePattern> for Matcher {
    fn from(pattern: IgnorePattern) -> Self {
        match pattern {
            IgnorePattern::Name(name) => {
                let regex = RegexBuilder::new(&name).case_insensitive(true).build().ok();
                Matcher::Name { name, regex }
            }
            IgnorePattern::Regex(regex) => Matcher::Regex(regex),
            IgnorePattern::Category { predicate, .. } => Matcher::Predicate(predicate),
            IgnorePattern::InstanceType { matches, .. } => Matcher::Type(matches),
        }
    }
}

/// Decides whether an error must never become a notice.
#[derive(Clone, Default)]
pub struct IgnoreFilter {
    patterns: Vec<IgnorePattern>,
    matchers: Vec<Matcher>,
}

impl IgnoreFilter {
    /// Create a filter. Regular expressions are compiled once here.
    pub fn new<I>(patterns: I) -> Self
    where
        I: IntoIterator<Item = IgnorePattern>,
    {
        let patterns: Vec<_> = patterns.into_iter().collect();
        let matchers = patterns.iter().cloned().map(Matcher::from).collect();
        IgnoreFilter { patterns, matchers }
    }

    /// Returns true if the error should not be reported. A missing error is always ignored.
    pub fn should_ignore(&self, error: Option<&ErrorRef<'_>>) -> bool {
        match error {
            None => true,
            Some(error) => self.matchers.iter().any(|matcher| matcher.matches(error)),
        }
    }
}

impl fmt::Debug for IgnoreFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreFilter")
            .field("patterns", &self.patterns)
            .finish()
    }
}
