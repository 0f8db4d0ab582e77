//! Presentation surface driven by the session (overlay panel).

use tracing::{debug, info};

/// Where the conversation is shown
#[cfg_attr(test, mockall::automock)]
pub trait Presenter: Send {
    /// Bring the surface on screen
    fn show(&mut self);

    /// Take the surface off screen
    fn hide(&mut self);

    /// Resize to fit `height` points of content plus chrome
    fn update_height(&mut self, height: f64);
}

/// Presenter that only logs; used when no overlay window is available
#[derive(Debug, Default)]
pub struct LogPresenter {
    visible: bool,
    last_height: Option<f64>,
}

impl LogPresenter {
    /// Whether `show` was called more recently than `hide`
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Last height passed to `update_height`
    #[must_use]
    pub const fn last_height(&self) -> Option<f64> {
        self.last_height
    }
}

impl Presenter for LogPresenter {
    fn show(&mut self) {
        if !self.visible {
            info!("overlay shown");
        }
        self.visible = true;
    }

    fn hide(&mut self) {
        if self.visible {
            info!("overlay hidden");
        }
        self.visible = false;
    }

    fn update_height(&mut self, height: f64) {
        debug!(height, "overlay height");
        self.last_height = Some(height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_presenter_tracks_visibility() {
        let mut presenter = LogPresenter::default();
        assert!(!presenter.is_visible());
        presenter.show();
        presenter.show();
        assert!(presenter.is_visible());
        presenter.hide();
        assert!(!presenter.is_visible());
    }

    #[test]
    fn test_log_presenter_keeps_last_height() {
        let mut presenter = LogPresenter::default();
        assert_eq!(presenter.last_height(), None);
        presenter.update_height(136.0);
        presenter.update_height(180.0);
        assert_eq!(presenter.last_height(), Some(180.0));
    }
}
