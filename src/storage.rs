//! Key-value persistence for the profile, the meal plan, the AI credential
//! and the theme. Each call is atomic for its key.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::meals::model::MealPlan;
use crate::nutrition::PersonalInfo;
use crate::settings::theme::ThemeKind;

const PERSONAL_INFO_KEY: &str = "personal_info";
const MEAL_PLAN_KEY: &str = "meal_plan";
const API_KEY_KEY: &str = "gemini_api_key";
const THEME_KEY: &str = "theme";
const SETUP_COMPLETE_KEY: &str = "setup_complete";

const ALL_KEYS: [&str; 5] = [
    PERSONAL_INFO_KEY,
    MEAL_PLAN_KEY,
    API_KEY_KEY,
    THEME_KEY,
    SETUP_COMPLETE_KEY,
];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored record {key} is malformed: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub has_personal_info: bool,
    pub has_meals: bool,
    pub has_api_key: bool,
    pub is_first_time: bool,
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn get_personal_info(&self) -> Result<Option<PersonalInfo>, StorageError>;
    /// Saving a profile also completes first-run setup; `None` removes it.
    async fn set_personal_info(&self, info: Option<&PersonalInfo>) -> Result<(), StorageError>;
    async fn get_meal_plan(&self) -> Result<Option<MealPlan>, StorageError>;
    async fn set_meal_plan(&self, plan: &MealPlan) -> Result<(), StorageError>;
    async fn get_api_key(&self) -> Result<Option<String>, StorageError>;
    async fn set_api_key(&self, key: Option<&str>) -> Result<(), StorageError>;
    async fn get_theme(&self) -> Result<Option<ThemeKind>, StorageError>;
    async fn set_theme(&self, theme: ThemeKind) -> Result<(), StorageError>;
    async fn storage_stats(&self) -> Result<StorageStats, StorageError>;
    /// Removes every key and resets first-run state.
    async fn clear_all(&self) -> Result<(), StorageError>;
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    #[serde(with = "time::serde::rfc3339")]
    saved_at: OffsetDateTime,
    value: T,
}

/// One JSON document per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::Io {
                key: dir.display().to_string(),
                source,
            })?;
        debug!(dir = %dir.display(), "file storage opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let bytes = match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    key: key.into(),
                    source,
                })
            }
        };
        let envelope: Envelope<T> =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::Malformed {
                key: key.into(),
                source,
            })?;
        Ok(Some(envelope.value))
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let envelope = Envelope {
            saved_at: OffsetDateTime::now_utc(),
            value,
        };
        let bytes = serde_json::to_vec_pretty(&envelope).map_err(|source| StorageError::Malformed {
            key: key.into(),
            source,
        })?;

        // write-then-rename keeps the previous document intact if we die mid-write
        let path = self.path(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        let io_err = |source| StorageError::Io {
            key: key.into(),
            source,
        };
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        debug!(key, "stored");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.into(),
                source,
            }),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        tokio::fs::try_exists(self.path(key))
            .await
            .map_err(|source| StorageError::Io {
                key: key.into(),
                source,
            })
    }
}

#[async_trait]
impl StorageClient for FileStorage {
    async fn get_personal_info(&self) -> Result<Option<PersonalInfo>, StorageError> {
        self.read(PERSONAL_INFO_KEY).await
    }

    async fn set_personal_info(&self, info: Option<&PersonalInfo>) -> Result<(), StorageError> {
        match info {
            // marker before profile, so a failed call never leaves the new profile stored
            Some(info) => {
                self.write(SETUP_COMPLETE_KEY, &true).await?;
                self.write(PERSONAL_INFO_KEY, info).await
            }
            None => self.remove(PERSONAL_INFO_KEY).await,
        }
    }

    async fn get_meal_plan(&self) -> Result<Option<MealPlan>, StorageError> {
        self.read(MEAL_PLAN_KEY).await
    }

    async fn set_meal_plan(&self, plan: &MealPlan) -> Result<(), StorageError> {
        self.write(MEAL_PLAN_KEY, plan).await
    }

    async fn get_api_key(&self) -> Result<Option<String>, StorageError> {
        self.read(API_KEY_KEY).await
    }

    async fn set_api_key(&self, key: Option<&str>) -> Result<(), StorageError> {
        match key {
            Some(key) => self.write(API_KEY_KEY, key).await,
            None => self.remove(API_KEY_KEY).await,
        }
    }

    async fn get_theme(&self) -> Result<Option<ThemeKind>, StorageError> {
        self.read(THEME_KEY).await
    }

    async fn set_theme(&self, theme: ThemeKind) -> Result<(), StorageError> {
        self.write(THEME_KEY, &theme).await
    }

    async fn storage_stats(&self) -> Result<StorageStats, StorageError> {
        let has_meals = match self.get_meal_plan().await {
            Ok(plan) => plan.is_some_and(|p| p.has_any_food()),
            Err(e) => {
                warn!(error = %e, "meal plan unreadable while collecting stats");
                false
            }
        };
        Ok(StorageStats {
            has_personal_info: self.exists(PERSONAL_INFO_KEY).await?,
            has_meals,
            has_api_key: self.exists(API_KEY_KEY).await?,
            is_first_time: !self.exists(SETUP_COMPLETE_KEY).await?,
        })
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        for key in ALL_KEYS {
            self.remove(key).await?;
        }
        debug!(dir = %self.dir.display(), "storage cleared");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    personal_info: Option<PersonalInfo>,
    meal_plan: Option<MealPlan>,
    api_key: Option<String>,
    theme: Option<ThemeKind>,
    setup_complete: bool,
}

/// In-process storage. Nothing survives a restart; used for ephemeral runs
/// and tests, where writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful write calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn begin_write(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn get_personal_info(&self) -> Result<Option<PersonalInfo>, StorageError> {
        Ok(self.inner.lock().await.personal_info.clone())
    }

    async fn set_personal_info(&self, info: Option<&PersonalInfo>) -> Result<(), StorageError> {
        self.begin_write()?;
        let mut inner = self.inner.lock().await;
        inner.personal_info = info.cloned();
        if info.is_some() {
            inner.setup_complete = true;
        }
        Ok(())
    }

    async fn get_meal_plan(&self) -> Result<Option<MealPlan>, StorageError> {
        Ok(self.inner.lock().await.meal_plan.clone())
    }

    async fn set_meal_plan(&self, plan: &MealPlan) -> Result<(), StorageError> {
        self.begin_write()?;
        self.inner.lock().await.meal_plan = Some(plan.clone());
        Ok(())
    }

    async fn get_api_key(&self) -> Result<Option<String>, StorageError> {
        Ok(self.inner.lock().await.api_key.clone())
    }

    async fn set_api_key(&self, key: Option<&str>) -> Result<(), StorageError> {
        self.begin_write()?;
        self.inner.lock().await.api_key = key.map(str::to_string);
        Ok(())
    }

    async fn get_theme(&self) -> Result<Option<ThemeKind>, StorageError> {
        Ok(self.inner.lock().await.theme)
    }

    async fn set_theme(&self, theme: ThemeKind) -> Result<(), StorageError> {
        self.begin_write()?;
        self.inner.lock().await.theme = Some(theme);
        Ok(())
    }

    async fn storage_stats(&self) -> Result<StorageStats, StorageError> {
        let inner = self.inner.lock().await;
        Ok(StorageStats {
            has_personal_info: inner.personal_info.is_some(),
            has_meals: inner.meal_plan.as_ref().is_some_and(MealPlan::has_any_food),
            has_api_key: inner.api_key.is_some(),
            is_first_time: !inner.setup_complete,
        })
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        self.begin_write()?;
        *self.inner.lock().await = MemoryInner::default();
        Ok(())
    }
}
