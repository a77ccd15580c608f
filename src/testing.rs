use crate::models::Notice;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Captures notices in memory instead of sending them.
///
/// While capture is on, every notice that passes the ignore filter and the before-notify hooks
/// is recorded here and nothing goes over the network.
///
/// ```
/// use checkend::{Checkend, Config, NotifyOptions};
///
/// # fn main() -> Result<(), checkend::Error> {
/// let checkend = Checkend::new(Config::new("key").with_enabled(true).with_async_send(false))?;
/// checkend.testing().setup();
///
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "boom");
/// checkend.notify(&error, NotifyOptions::new());
///
/// assert_eq!(1, checkend.testing().notice_count());
/// assert_eq!("boom", checkend.testing().last_notice().unwrap().message());
/// checkend.testing().teardown();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Testing {
    notices: Mutex<Option<Vec<Notice>>>,
}

impl Testing {
    /// Turn capture on and forget previously captured notices.
    pub fn setup(&self) {
        *self.lock() = Some(Vec::new());
    }

    /// Turn capture off and forget captured notices.
    pub fn teardown(&self) {
        *self.lock() = None;
    }

    /// Whether capture is on.
    pub fn is_enabled(&self) -> bool {
        self.lock().is_some()
    }

    /// All captured notices, oldest first.
    pub fn notices(&self) -> Vec<Notice> {
        self.lock().as_deref().map(<[Notice]>::to_vec).unwrap_or_default()
    }

    /// Most recently captured notice.
    pub fn last_notice(&self) -> Option<Notice> {
        self.lock().as_deref().and_then(<[Notice]>::last).cloned()
    }

    /// First captured notice.
    pub fn first_notice(&self) -> Option<Notice> {
        self.lock().as_deref().and_then(<[Notice]>::first).cloned()
    }

    /// Number of captured notices.
    pub fn notice_count(&self) -> usize {
        self.lock().as_ref().map_or(0, Vec::len)
    }

    /// Whether anything was captured.
    pub fn has_notices(&self) -> bool {
        self.notice_count() > 0
    }

    /// Forget captured notices but keep capture on.
    pub fn clear_notices(&self) {
        if let Some(notices) = self.lock().as_mut() {
            notices.clear();
        }
    }

    /// Record the notice if capture is on, otherwise hand it back.
    pub(crate) fn try_record(&self, notice: Notice) -> Result<(), Notice> {
        match self.lock().as_mut() {
            Some(notices) => {
                notices.push(notice);
                Ok(())
            }
            None => Err(notice),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Vec<Notice>>> {
        self.notices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
