//! Local nutrition tracking core: profile-derived daily targets, a four-slot
//! meal plan persisted on every change, and Gemini-backed meal suggestions,
//! served to the UI over a small HTTP API.

pub mod app;
pub mod config;
pub mod meals;
pub mod nutrition;
pub mod recommend;
pub mod settings;
pub mod state;
pub mod storage;
