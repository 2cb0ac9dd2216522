use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::storage::{StorageClient, StorageError};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThemeKind {
    #[default]
    Light,
    Dark,
}

impl ThemeKind {
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    pub fn palette(self) -> &'static Palette {
        match self {
            Self::Light => &LIGHT,
            Self::Dark => &DARK,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Palette {
    pub bg: &'static str,
    pub card: &'static str,
    pub card_border: &'static str,
    pub text: &'static str,
    pub text_secondary: &'static str,
    pub text_tertiary: &'static str,
    pub text_subtle: &'static str,
    pub accent: &'static str,
    pub accent_mint: &'static str,
    pub shadow_color: &'static str,
    pub input_bg: &'static str,
    pub input_border: &'static str,
}

static LIGHT: Palette = Palette {
    bg: "#F7F8FA",
    card: "#FFFFFF",
    card_border: "#EDEDED",
    text: "#1A1A1A",
    text_secondary: "#707070",
    text_tertiary: "#A8A8A8",
    text_subtle: "#9A9A9A",
    accent: "#4A6CF7",
    accent_mint: "#A8E6CF",
    shadow_color: "rgba(0,0,0,0.05)",
    input_bg: "#FFFFFF",
    input_border: "#EDEDED",
};

static DARK: Palette = Palette {
    bg: "#0D0D0D",
    card: "#1A1A1A",
    card_border: "rgba(255,255,255,0.08)",
    text: "#FFFFFF",
    text_secondary: "#B3B3B3",
    text_tertiary: "#888888",
    text_subtle: "#757575",
    accent: "#3A7AFE",
    accent_mint: "#5EDBBB",
    shadow_color: "transparent",
    input_bg: "#1F1F1F",
    input_border: "rgba(255,255,255,0.1)",
};

/// What the UI reads to style itself.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ThemeView {
    pub theme: ThemeKind,
    pub colors: &'static Palette,
}

pub struct ThemeSettings {
    storage: Arc<dyn StorageClient>,
    current: RwLock<ThemeKind>,
}

impl ThemeSettings {
    /// An unreadable stored theme falls back to light rather than failing startup.
    pub async fn load(storage: Arc<dyn StorageClient>) -> Self {
        let theme = match storage.get_theme().await {
            Ok(theme) => theme.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "stored theme unreadable; using light");
                ThemeKind::default()
            }
        };
        Self {
            storage,
            current: RwLock::new(theme),
        }
    }

    pub async fn current(&self) -> ThemeView {
        let theme = *self.current.read().await;
        ThemeView {
            theme,
            colors: theme.palette(),
        }
    }

    /// Flip light/dark. The in-memory theme only changes once the write lands.
    pub async fn toggle(&self) -> Result<ThemeView, StorageError> {
        let mut current = self.current.write().await;
        let next = current.toggled();
        self.storage.set_theme(next).await?;
        *current = next;
        info!(theme = ?next, "theme changed");
        Ok(ThemeView {
            theme: next,
            colors: next.palette(),
        })
    }

    /// Drop back to the default after a data reset.
    pub async fn reset(&self) {
        *self.current.write().await = ThemeKind::default();
    }
}
