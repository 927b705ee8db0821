// src/services/display_service.rs
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use crate::utils::markup::{Banner, StatusBadge};

/// The page a tracker renders into.
///
/// Stands in for the document: badges marked `parcel-status`, the
/// `trackingTimeline` container, the `data-user-authenticated` marker and the
/// body that in-page banners are appended to.
pub trait DisplaySurface: Send + Sync {
    /// Writes `badge` to every status badge, returning how many were updated.
    fn apply_status_badge(&self, badge: &StatusBadge) -> usize;

    fn has_timeline(&self) -> bool;

    /// Replaces the whole timeline container contents.
    fn replace_timeline(&self, markup: &str);

    fn is_user_authenticated(&self) -> bool;

    fn insert_banner(&self, banner: &Banner);

    /// Removes the banner if it is still shown. Returns false when it was
    /// already dismissed.
    fn remove_banner(&self, banner_id: &str) -> bool;
}

#[derive(Debug, Default, Clone)]
pub struct PageState {
    pub badges: Vec<StatusBadge>,
    pub timeline: Option<String>,
    pub banners: Vec<Banner>,
    pub authenticated: bool,
}

/// In-memory page. Holds whatever was last rendered into it.
#[derive(Debug, Default)]
pub struct PageSurface {
    state: Mutex<PageState>,
}

impl PageSurface {
    pub fn new(badge_count: usize, with_timeline: bool, authenticated: bool) -> Self {
        let badge = StatusBadge {
            text: String::new(),
            class_name: "parcel-status".to_string(),
        };

        Self {
            state: Mutex::new(PageState {
                badges: vec![badge; badge_count],
                timeline: with_timeline.then(String::new),
                banners: Vec::new(),
                authenticated,
            }),
        }
    }

    pub fn snapshot(&self) -> PageState {
        self.lock().clone()
    }

    /// User dismissal through the banner's close button.
    pub fn dismiss_banner(&self, banner_id: &str) -> bool {
        self.remove_banner(banner_id)
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DisplaySurface for PageSurface {
    fn apply_status_badge(&self, badge: &StatusBadge) -> usize {
        let mut state = self.lock();
        for existing in state.badges.iter_mut() {
            *existing = badge.clone();
        }
        state.badges.len()
    }

    fn has_timeline(&self) -> bool {
        self.lock().timeline.is_some()
    }

    fn replace_timeline(&self, markup: &str) {
        if let Some(timeline) = self.lock().timeline.as_mut() {
            *timeline = markup.to_string();
        }
    }

    fn is_user_authenticated(&self) -> bool {
        self.lock().authenticated
    }

    fn insert_banner(&self, banner: &Banner) {
        self.lock().banners.push(banner.clone());
    }

    fn remove_banner(&self, banner_id: &str) -> bool {
        let mut state = self.lock();
        let before = state.banners.len();
        state.banners.retain(|b| b.id != banner_id);
        state.banners.len() != before
    }
}

/// Terminal rendering for the CLI: prints each update to stdout.
#[derive(Debug)]
pub struct StdoutSurface {
    authenticated: bool,
}

impl StdoutSurface {
    pub fn new(authenticated: bool) -> Self {
        Self { authenticated }
    }

    fn print(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", text) {
            tracing::warn!(error = %e, "Failed to write to stdout");
        }
    }
}

impl DisplaySurface for StdoutSurface {
    fn apply_status_badge(&self, badge: &StatusBadge) -> usize {
        self.print(&format!("[{}] {}", badge.class_name, badge.text));
        1
    }

    fn has_timeline(&self) -> bool {
        true
    }

    fn replace_timeline(&self, markup: &str) {
        self.print(markup);
    }

    fn is_user_authenticated(&self) -> bool {
        self.authenticated
    }

    fn insert_banner(&self, banner: &Banner) {
        match banner.markup() {
            Ok(markup) => self.print(&markup),
            Err(e) => tracing::warn!(banner_id = %banner.id, error = %e, "Failed to render banner"),
        }
    }

    fn remove_banner(&self, _banner_id: &str) -> bool {
        true
    }
}
