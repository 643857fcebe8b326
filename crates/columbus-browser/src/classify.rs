//! Host error text to [`BrowserError`] tags. Nothing downstream of this
//! module looks at error strings.

use columbus_core::errors::BrowserError;

/// Substrings that mark a transient tab-strip race.
const TAB_EDITING_PATTERNS: &[&str] = &[
    "tabs cannot be edited right now",
    "user may be dragging a tab",
    "dragging",
];

const FULLSCREEN_PATTERNS: &[&str] = &["fullscreen", "full screen", "full-screen"];

const TAB_MISSING_PATTERNS: &[&str] = &[
    "no target with given id",
    "no tab with id",
    "target closed",
    "no session with given id",
    "session with given id not found",
];

const WINDOW_MISSING_PATTERNS: &[&str] = &[
    "browser window not found",
    "no window with id",
    "no browser window",
];

/// Classify raw host error text. `subject` names the tab or window the call
/// was about and is carried into the not-found variants.
pub fn classify_host_error(message: &str, subject: Subject<'_>) -> BrowserError {
    let lower = message.to_ascii_lowercase();
    let has = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if has(TAB_EDITING_PATTERNS) {
        BrowserError::TabEditingBlocked(message.to_string())
    } else if has(FULLSCREEN_PATTERNS) {
        BrowserError::Fullscreen(message.to_string())
    } else if has(WINDOW_MISSING_PATTERNS) {
        match subject {
            Subject::Window(id) => BrowserError::WindowNotFound(id),
            _ => BrowserError::Host(message.to_string()),
        }
    } else if has(TAB_MISSING_PATTERNS) {
        match subject {
            Subject::Tab(id) => BrowserError::TabNotFound(id.clone()),
            _ => BrowserError::Host(message.to_string()),
        }
    } else {
        BrowserError::Host(message.to_string())
    }
}

/// What a failed host call was operating on.
#[derive(Clone, Copy, Debug)]
pub enum Subject<'a> {
    Tab(&'a columbus_core::ids::TabId),
    Window(columbus_core::ids::WindowId),
    None,
}
