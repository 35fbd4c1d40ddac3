//! Light/dark theme preference.
//!
//! Resolution order: explicit stored preference, then the operating-system
//! scheme, then light. Once a preference has been stored (via `apply` or
//! `toggle`), OS scheme changes are ignored until the stored key is cleared.

use crate::store::PrefStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Preference store key holding the explicit theme choice.
pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    /// Returns the opposite theme.
    pub fn flipped(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{}'", other)),
        }
    }
}

/// Source of the operating-system color scheme.
pub trait SystemScheme: Send + Sync {
    /// Returns the current OS scheme, or `None` when it cannot be determined.
    fn current(&self) -> Option<Theme>;
}

/// Headless stand-in for the OS scheme signal: reads `TOOLPASS_SYSTEM_SCHEME`.
pub struct EnvSystemScheme;

impl SystemScheme for EnvSystemScheme {
    fn current(&self) -> Option<Theme> {
        std::env::var("TOOLPASS_SYSTEM_SCHEME")
            .ok()
            .and_then(|v| v.parse().ok())
    }
}

/// Reads, applies, and persists the theme preference.
pub struct ThemeController {
    store: Arc<dyn PrefStore>,
    system: Arc<dyn SystemScheme>,
    /// Last theme actually applied in this process, if any.
    active: Mutex<Option<Theme>>,
}

impl ThemeController {
    pub fn new(store: Arc<dyn PrefStore>, system: Arc<dyn SystemScheme>) -> Self {
        Self {
            store,
            system,
            active: Mutex::new(None),
        }
    }

    /// Returns the stored preference, else the OS scheme, else light.
    pub fn preference(&self) -> Theme {
        if let Some(saved) = self.store.get(THEME_KEY) {
            match saved.parse() {
                Ok(theme) => return theme,
                Err(e) => tracing::warn!("Ignoring stored theme: {}", e),
            }
        }
        self.system.current().unwrap_or(Theme::Light)
    }

    /// Applies `theme` and persists it as the explicit preference.
    pub fn apply(&self, theme: Theme) {
        self.store.set(THEME_KEY, &theme.to_string());
        *self.active.lock().unwrap() = Some(theme);
    }

    /// Flips the current preference, applies and returns the new theme.
    pub fn toggle(&self) -> Theme {
        let next = self.preference().flipped();
        self.apply(next);
        next
    }

    /// Returns the theme currently in effect.
    pub fn active(&self) -> Theme {
        let active = *self.active.lock().unwrap();
        active.unwrap_or_else(|| self.preference())
    }

    /// Reacts to an OS scheme change notification.
    ///
    /// The new scheme is applied only while no explicit preference is stored;
    /// it is never persisted, so a later stored choice always takes precedence.
    pub fn system_scheme_changed(&self, scheme: Theme) {
        if self.store.get(THEME_KEY).is_some() {
            tracing::debug!("OS scheme changed to {} but an explicit preference is set", scheme);
            return;
        }
        *self.active.lock().unwrap() = Some(scheme);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPrefStore;

    struct FixedScheme(Option<Theme>);

    impl SystemScheme for FixedScheme {
        fn current(&self) -> Option<Theme> {
            self.0
        }
    }

    fn controller(system: Option<Theme>) -> ThemeController {
        ThemeController::new(
            Arc::new(MemoryPrefStore::new()),
            Arc::new(FixedScheme(system)),
        )
    }

    #[test]
    fn test_defaults_to_light_without_signal() {
        assert_eq!(controller(None).preference(), Theme::Light);
    }

    #[test]
    fn test_os_preference_used_when_nothing_stored() {
        assert_eq!(controller(Some(Theme::Dark)).preference(), Theme::Dark);
    }

    #[test]
    fn test_stored_preference_wins_over_os() {
        let ctl = controller(Some(Theme::Dark));
        ctl.apply(Theme::Light);
        assert_eq!(ctl.preference(), Theme::Light);
    }

    #[test]
    fn test_toggle_flips_and_persists() {
        let ctl = controller(None);
        assert_eq!(ctl.toggle(), Theme::Dark);
        assert_eq!(ctl.preference(), Theme::Dark);
        assert_eq!(ctl.toggle(), Theme::Light);
        assert_eq!(ctl.active(), Theme::Light);
    }

    #[test]
    fn test_os_change_applies_only_without_stored_preference() {
        let ctl = controller(None);
        ctl.system_scheme_changed(Theme::Dark);
        assert_eq!(ctl.active(), Theme::Dark);

        // After one explicit toggle, OS flips no longer change the theme.
        let applied = ctl.toggle();
        ctl.system_scheme_changed(applied.flipped());
        assert_eq!(ctl.active(), applied);
    }

    #[test]
    fn test_corrupt_stored_value_falls_back() {
        let store = Arc::new(MemoryPrefStore::new());
        store.set(THEME_KEY, "blue");
        let ctl = ThemeController::new(store, Arc::new(FixedScheme(Some(Theme::Dark))));
        assert_eq!(ctl.preference(), Theme::Dark);
    }
}
