//! Where the chat UI opens.
//!
//! The user picks an [`OpenMode`]; each launch resolves it against the
//! current tab to a concrete [`LaunchSurface`]:
//!
//! | Mode | Controllable tab | Surface tried, in order |
//! |------|------------------|-------------------------|
//! | any | no | window |
//! | `window` | yes | window |
//! | `sidepanel` | yes | side panel (if supported), overlay, window |
//! | `overlay` | yes | overlay, window |
//!
//! Attaching to the current tab ignores the mode and tries side panel,
//! overlay and window in turn.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::identifiers::TabId;
use crate::relay::TabInfo;
use crate::settings::SettingsStore;

// ============================================================================
// Constants
// ============================================================================

/// Store key of the open-mode preference.
pub const OPEN_MODE_KEY: &str = "openMode";

/// Popup window width.
pub const WINDOW_WIDTH: u32 = 480;

/// Popup window height.
pub const WINDOW_HEIGHT: u32 = 900;

// ============================================================================
// OpenMode
// ============================================================================

/// Preferred surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    /// Browser side panel.
    #[default]
    #[serde(rename = "sidepanel")]
    SidePanel,
    /// Standalone popup window.
    Window,
    /// Overlay injected into the page.
    Overlay,
}

impl OpenMode {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SidePanel => "sidepanel",
            Self::Window => "window",
            Self::Overlay => "overlay",
        }
    }

    /// Reads the stored preference, defaulting to [`OpenMode::SidePanel`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn load(store: &dyn SettingsStore) -> Result<Self> {
        let Some(value) = store.get(OPEN_MODE_KEY)? else {
            return Ok(Self::default());
        };
        Ok(serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(error = %e, "Stored open mode unreadable, using default");
            Self::default()
        }))
    }

    /// Stores the preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn save(self, store: &dyn SettingsStore) -> Result<()> {
        store.set(OPEN_MODE_KEY, serde_json::to_value(self)?)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LaunchSurface
// ============================================================================

/// Surface the UI actually opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchSurface {
    /// Side panel of the tab.
    #[serde(rename = "sidepanel")]
    SidePanel,
    /// In-page overlay.
    Overlay,
    /// Popup window.
    Window,
}

/// First surface to try for `mode`.
#[must_use]
pub fn decide_launch(mode: OpenMode, controllable: bool, side_panel_supported: bool) -> LaunchSurface {
    match mode {
        _ if !controllable => LaunchSurface::Window,
        OpenMode::Window => LaunchSurface::Window,
        OpenMode::SidePanel if side_panel_supported => LaunchSurface::SidePanel,
        OpenMode::SidePanel | OpenMode::Overlay => LaunchSurface::Overlay,
    }
}

/// Answer to an attach request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachReply {
    /// `false` when there was no tab to attach to.
    pub ok: bool,
    /// Surface opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<LaunchSurface>,
}

impl From<Option<LaunchSurface>> for AttachReply {
    fn from(surface: Option<LaunchSurface>) -> Self {
        Self {
            ok: surface.is_some(),
            mode: surface,
        }
    }
}

// ============================================================================
// Launcher
// ============================================================================

/// Browser operations that open the UI.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Whether the browser has a side panel.
    fn side_panel_supported(&self) -> bool;

    /// Opens the side panel for `tab`.
    async fn open_side_panel(&self, tab: TabId) -> Result<()>;

    /// Asks `tab`'s content script to show the overlay.
    async fn open_overlay(&self, tab: TabId) -> Result<()>;

    /// Opens a popup window.
    async fn open_window(&self, width: u32, height: u32) -> Result<()>;
}

// ============================================================================
// LaunchController
// ============================================================================

/// Resolves launches against the stored preference.
pub struct LaunchController<L> {
    launcher: L,
    store: Arc<dyn SettingsStore>,
}

impl<L: Launcher> LaunchController<L> {
    /// Creates a controller reading the preference from `store`.
    #[must_use]
    pub fn new(launcher: L, store: Arc<dyn SettingsStore>) -> Self {
        Self { launcher, store }
    }

    /// The launcher.
    #[inline]
    #[must_use]
    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Current preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn open_mode(&self) -> Result<OpenMode> {
        OpenMode::load(self.store.as_ref())
    }

    /// Changes the preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set_open_mode(&self, mode: OpenMode) -> Result<()> {
        debug!(%mode, "Open mode changed");
        mode.save(self.store.as_ref())
    }

    /// Opens the UI for `tab` according to the preference.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the preference fails or the final window
    /// fallback cannot be opened.
    pub async fn launch(&self, tab: &TabInfo) -> Result<LaunchSurface> {
        let mode = self.open_mode()?;
        let first = decide_launch(
            mode,
            tab.is_controllable(),
            self.launcher.side_panel_supported(),
        );
        debug!(tab = %tab.id, %mode, surface = ?first, "Launching UI");

        if first == LaunchSurface::SidePanel {
            match self.launcher.open_side_panel(tab.id).await {
                Ok(()) => return Ok(LaunchSurface::SidePanel),
                Err(e) => debug!(tab = %tab.id, error = %e, "Side panel failed"),
            }
        }

        if first != LaunchSurface::Window {
            match self.launcher.open_overlay(tab.id).await {
                Ok(()) => return Ok(LaunchSurface::Overlay),
                Err(e) => debug!(tab = %tab.id, error = %e, "Overlay failed"),
            }
        }

        self.open_window().await
    }

    /// Attaches the UI to the active tab, whatever the preference.
    ///
    /// Returns `None` when there is no active tab.
    ///
    /// # Errors
    ///
    /// Returns an error if the final window fallback cannot be opened.
    pub async fn attach_to_current_tab(&self, tab: Option<&TabInfo>) -> Result<Option<LaunchSurface>> {
        let Some(tab) = tab else {
            debug!("No active tab to attach to");
            return Ok(None);
        };
        let controllable = tab.is_controllable();

        if controllable && self.launcher.side_panel_supported() {
            match self.launcher.open_side_panel(tab.id).await {
                Ok(()) => return Ok(Some(LaunchSurface::SidePanel)),
                Err(e) => debug!(tab = %tab.id, error = %e, "Side panel failed"),
            }
        }

        if controllable {
            match self.launcher.open_overlay(tab.id).await {
                Ok(()) => return Ok(Some(LaunchSurface::Overlay)),
                Err(e) => debug!(tab = %tab.id, error = %e, "Overlay failed"),
            }
        }

        self.open_window().await.map(Some)
    }

    async fn open_window(&self) -> Result<LaunchSurface> {
        self.launcher.open_window(WINDOW_WIDTH, WINDOW_HEIGHT).await?;
        Ok(LaunchSurface::Window)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::json;

    use crate::error::Error;
    use crate::settings::MemoryStore;

    #[derive(Default)]
    struct FakeLauncher {
        side_panel: bool,
        side_panel_fails: bool,
        overlay_fails: bool,
        opened: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Launcher for FakeLauncher {
        fn side_panel_supported(&self) -> bool {
            self.side_panel
        }

        async fn open_side_panel(&self, _tab: TabId) -> Result<()> {
            self.opened.lock().push("sidepanel");
            if self.side_panel_fails {
                return Err(Error::delivery("side panel unavailable"));
            }
            Ok(())
        }

        async fn open_overlay(&self, _tab: TabId) -> Result<()> {
            self.opened.lock().push("overlay");
            if self.overlay_fails {
                return Err(Error::delivery("Receiving end does not exist."));
            }
            Ok(())
        }

        async fn open_window(&self, width: u32, height: u32) -> Result<()> {
            assert_eq!((width, height), (WINDOW_WIDTH, WINDOW_HEIGHT));
            self.opened.lock().push("window");
            Ok(())
        }
    }

    fn controller(launcher: FakeLauncher, mode: OpenMode) -> LaunchController<FakeLauncher> {
        let store = Arc::new(MemoryStore::new());
        let controller = LaunchController::new(launcher, store);
        controller.set_open_mode(mode).unwrap();
        controller
    }

    fn tab(url: &str) -> TabInfo {
        TabInfo::active(TabId::new(7).unwrap(), url)
    }

    #[test]
    fn test_decide_launch() {
        use LaunchSurface::*;

        assert_eq!(decide_launch(OpenMode::SidePanel, false, true), Window);
        assert_eq!(decide_launch(OpenMode::Window, true, true), Window);
        assert_eq!(decide_launch(OpenMode::SidePanel, true, true), SidePanel);
        assert_eq!(decide_launch(OpenMode::SidePanel, true, false), Overlay);
        assert_eq!(decide_launch(OpenMode::Overlay, true, true), Overlay);
    }

    #[test]
    fn test_open_mode_storage() {
        let store = MemoryStore::new();
        assert_eq!(OpenMode::load(&store).unwrap(), OpenMode::SidePanel);

        OpenMode::Overlay.save(&store).unwrap();
        assert_eq!(store.get(OPEN_MODE_KEY).unwrap(), Some(json!("overlay")));
        assert_eq!(OpenMode::load(&store).unwrap(), OpenMode::Overlay);

        store.set(OPEN_MODE_KEY, json!("floating")).unwrap();
        assert_eq!(OpenMode::load(&store).unwrap(), OpenMode::SidePanel);
    }

    #[tokio::test]
    async fn test_uncontrollable_tab_opens_window() {
        let c = controller(
            FakeLauncher {
                side_panel: true,
                ..Default::default()
            },
            OpenMode::SidePanel,
        );
        let surface = c.launch(&tab("chrome://settings")).await.unwrap();
        assert_eq!(surface, LaunchSurface::Window);
        assert_eq!(*c.launcher().opened.lock(), vec!["window"]);
    }

    #[tokio::test]
    async fn test_side_panel_failure_falls_to_overlay() {
        let c = controller(
            FakeLauncher {
                side_panel: true,
                side_panel_fails: true,
                ..Default::default()
            },
            OpenMode::SidePanel,
        );
        let surface = c.launch(&tab("https://shop.test")).await.unwrap();
        assert_eq!(surface, LaunchSurface::Overlay);
        assert_eq!(*c.launcher().opened.lock(), vec!["sidepanel", "overlay"]);
    }

    #[tokio::test]
    async fn test_overlay_failure_falls_to_window() {
        let c = controller(
            FakeLauncher {
                overlay_fails: true,
                ..Default::default()
            },
            OpenMode::Overlay,
        );
        let surface = c.launch(&tab("https://shop.test")).await.unwrap();
        assert_eq!(surface, LaunchSurface::Window);
        assert_eq!(*c.launcher().opened.lock(), vec!["overlay", "window"]);
    }

    #[tokio::test]
    async fn test_attach_ignores_window_preference() {
        let c = controller(
            FakeLauncher {
                side_panel: true,
                ..Default::default()
            },
            OpenMode::Window,
        );
        let surface = c.attach_to_current_tab(Some(&tab("https://shop.test"))).await.unwrap();
        assert_eq!(surface, Some(LaunchSurface::SidePanel));
    }

    #[tokio::test]
    async fn test_attach_without_tab() {
        let c = controller(FakeLauncher::default(), OpenMode::SidePanel);
        let surface = c.attach_to_current_tab(None).await.unwrap();
        assert_eq!(surface, None);
        assert!(c.launcher().opened.lock().is_empty());

        let reply = AttachReply::from(surface);
        assert_eq!(serde_json::to_value(reply).unwrap(), json!({"ok": false}));
        assert_eq!(
            serde_json::to_value(AttachReply::from(Some(LaunchSurface::SidePanel))).unwrap(),
            json!({"ok": true, "mode": "sidepanel"})
        );
    }

    #[tokio::test]
    async fn test_attach_uncontrollable_opens_window() {
        let c = controller(
            FakeLauncher {
                side_panel: true,
                ..Default::default()
            },
            OpenMode::SidePanel,
        );
        let surface = c.attach_to_current_tab(Some(&tab("about:blank"))).await.unwrap();
        assert_eq!(surface, Some(LaunchSurface::Window));
        assert_eq!(*c.launcher().opened.lock(), vec!["window"]);
    }
}
