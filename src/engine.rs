//! The process-wide engine: configuration, storage pool, spatial stores,
//! model bundles, plugin registry, and the prediction cache, constructed
//! once at startup and shared behind an `Arc`.

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::features::realtime::{default_registry, DataSourcePlugin};
use crate::features::FeatureContext;
use crate::model::ensemble::ModelSet;
use crate::routes::predict::PredictResponse;
use crate::serving::cache::PredictionCache;
use crate::spatial::{GarageIndex, MeterIndex, SpotIndex};

pub struct Engine {
    pub config: AppConfig,
    pub pool: SqlitePool,
    pub spot_index: SpotIndex,
    pub meter_index: MeterIndex,
    pub garage_index: GarageIndex,
    pub models: ModelSet,
    pub cache: PredictionCache<PredictResponse>,
    pub plugins: Vec<Box<dyn DataSourcePlugin>>,
}

impl Engine {
    /// Build the engine: bulk-load the spatial stores, then the model
    /// artifacts. Model absence degrades to fallbacks and never aborts
    /// startup.
    pub async fn build(config: AppConfig, pool: SqlitePool) -> Result<Self, sqlx::Error> {
        let mut spot_index = SpotIndex::new();
        spot_index.load(&pool).await?;

        let mut meter_index = MeterIndex::new();
        meter_index.load(&pool).await?;

        let mut garage_index = GarageIndex::new();
        garage_index.load(&pool).await?;

        let models = ModelSet::load(&config.model.artifacts_dir);
        let cache = PredictionCache::new(config.serving.cache_ttl_seconds);
        let plugins = default_registry();

        Ok(Self {
            config,
            pool,
            spot_index,
            meter_index,
            garage_index,
            models,
            cache,
            plugins,
        })
    }

    /// The feature-extraction view of the engine.
    pub fn feature_context(&self) -> FeatureContext<'_> {
        FeatureContext {
            pool: &self.pool,
            config: &self.config,
            meters: &self.meter_index,
            garages: &self.garage_index,
        }
    }
}
