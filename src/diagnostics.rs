use std::fmt::Display;

pub(crate) const LOG_TARGET: &str = "checkend";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    Error,
    Warning,
    Debug,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Debug => "debug",
        }
    }
}

/// Line-oriented diagnostics: `[Checkend] [level] message`.
///
/// Lines are handed to `tracing` so the application decides where they end up. Debug lines, and
/// lines logged with [`Logger::verbose`], are dropped unless debug mode is on.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Logger {
    debug: bool,
}

impl Logger {
    pub(crate) fn new(debug: bool) -> Self {
        Logger { debug }
    }

    #[cfg_attr(not(feature = "reqwest"), allow(dead_code))]
    pub(crate) fn warning(&self, message: impl Display) {
        self.log(Level::Warning, message);
    }

    pub(crate) fn debug(&self, message: impl Display) {
        self.log(Level::Debug, message);
    }

    /// Logs at `level`, but only in debug mode.
    pub(crate) fn verbose(&self, level: Level, message: impl Display) {
        if self.debug {
            self.log(level, message);
        }
    }

    pub(crate) fn log(&self, level: Level, message: impl Display) {
        let Some(line) = self.render(level, message) else {
            return;
        };
        match level {
            Level::Error => tracing::error!(target: LOG_TARGET, "{}", line),
            Level::Warning => tracing::warn!(target: LOG_TARGET, "{}", line),
            Level::Debug => tracing::debug!(target: LOG_TARGET, "{}", line),
        }
    }

    fn render(&self, level: Level, message: impl Display) -> Option<String> {
        if level == Level::Debug && !self.debug {
            return None;
        }
        Some(format!("[Checkend] [{}] {}", level.as_str(), message))
    }
}
