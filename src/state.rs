use anyhow::Context;

use crate::config::AppConfig;
use crate::meals::services::MealPlanState;
use crate::recommend::{GeminiClient, RecommendationTransport, Recommender};
use crate::settings::theme::ThemeSettings;
use crate::storage::{FileStorage, StorageClient};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
    pub meal_plan: Arc<MealPlanState>,
    pub recommender: Arc<Recommender>,
    pub theme: Arc<ThemeSettings>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let storage = FileStorage::open(config.data_dir.clone())
            .await
            .with_context(|| format!("opening data dir {}", config.data_dir.display()))?;
        let storage = Arc::new(storage) as Arc<dyn StorageClient>;
        let transport = GeminiClient::new(&config.gemini).context("building Gemini client")?;
        let transport = Arc::new(transport) as Arc<dyn RecommendationTransport>;
        tracing::info!(
            data_dir = %config.data_dir.display(),
            model = %config.gemini.model,
            default_key = config.gemini.api_key.is_some(),
            "state initialised"
        );

        Ok(Self::from_parts(config, storage, transport).await)
    }

    /// Hydrates the meal plan and theme from `storage` and wires the
    /// recommender to `transport`.
    pub async fn from_parts(
        config: Arc<AppConfig>,
        storage: Arc<dyn StorageClient>,
        transport: Arc<dyn RecommendationTransport>,
    ) -> Self {
        let meal_plan = Arc::new(MealPlanState::hydrate(storage.clone()).await);
        let theme = Arc::new(ThemeSettings::load(storage.clone()).await);
        let recommender = Arc::new(Recommender::new(
            storage.clone(),
            meal_plan.clone(),
            transport,
            config.gemini.api_key.clone(),
        ));
        Self {
            config,
            storage,
            meal_plan,
            recommender,
            theme,
        }
    }

    /// In-memory state for tests; the transport decides what "Gemini" says.
    #[cfg(test)]
    pub async fn fake(
        transport: Arc<dyn RecommendationTransport>,
        default_key: Option<&str>,
    ) -> Self {
        let storage = Arc::new(crate::storage::MemoryStorage::new()) as Arc<dyn StorageClient>;
        Self::fake_with_storage(transport, default_key, storage).await
    }

    #[cfg(test)]
    pub async fn fake_with_storage(
        transport: Arc<dyn RecommendationTransport>,
        default_key: Option<&str>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        use crate::config::GeminiConfig;

        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            data_dir: "unused".into(),
            gemini: GeminiConfig {
                api_key: default_key.map(str::to_string),
                ..GeminiConfig::default()
            },
        });
        Self::from_parts(config, storage, transport).await
    }
}
