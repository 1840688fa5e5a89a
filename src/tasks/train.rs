use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{info, instrument};

use super::{Duty, DutyKind};
use crate::collectors::Acquisition;
use crate::config::{AugmentationConfig, PipelineConfig, TrainingConfig};
use crate::error::{EngineError, EngineResult};
use crate::models::{ModelArtifact, ModelManager};
use crate::pipeline::{self, RunMode, augment};

/// One training run over the historical window
pub struct TrainDuty {
    acquisition: Arc<Acquisition>,
    manager: Arc<ModelManager>,
    filter: PipelineConfig,
    augmentation: Option<AugmentationConfig>,
    training: TrainingConfig,
    data_dir: PathBuf,
    /// Set in checkpoint mode, where the filtered frame is persisted
    checkpoint_dir: Option<PathBuf>,
}

impl TrainDuty {
    pub fn new(
        acquisition: Arc<Acquisition>,
        manager: Arc<ModelManager>,
        filter: PipelineConfig,
        augmentation: Option<AugmentationConfig>,
        training: TrainingConfig,
    ) -> Self {
        Self {
            acquisition,
            manager,
            filter,
            augmentation,
            training,
            data_dir: PathBuf::from("."),
            checkpoint_dir: None,
        }
    }

    /// Directory for scalers and, when `checkpoint` is set, filtered frames.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>, checkpoint: bool) -> Self {
        self.data_dir = data_dir.into();
        self.checkpoint_dir = checkpoint.then(|| self.data_dir.clone());
        self
    }

    #[instrument(skip(self), fields(method = %self.training.method, export = %self.training.export))]
    pub async fn train(&self) -> EngineResult<ModelArtifact> {
        let raw = self.acquisition.training_frame().await?;
        info!("training frame: {} rows x {} columns", raw.len(), raw.width());

        let filtered = pipeline::apply(
            raw,
            &self.filter,
            None,
            RunMode::Train,
            None,
            self.checkpoint_dir.as_deref(),
        )?;
        let mut frame = filtered.frame;
        let encoder = filtered.encoder;

        // the label column is neither scaled nor aggregated
        let target = match &self.training.target {
            Some(column) => Some(frame.remove_column(column).ok_or_else(|| {
                EngineError::Config(format!("target column '{column}' not found"))
            })?),
            None => None,
        };
        let mut frame = augment::for_training(frame, self.augmentation.as_ref(), &self.data_dir)?;
        if let Some(target) = target {
            frame.push_column(target.name, target.cells)?;
        }

        let manager = self.manager.clone();
        let training = self.training.clone();
        tokio::task::spawn_blocking(move || {
            let artifact = manager.train(&frame, &training)?;
            manager.save_encoder(&artifact.method, &artifact.name, encoder.as_ref())?;
            Ok::<_, EngineError>(artifact)
        })
        .await
        .map_err(|e| EngineError::Task(format!("training task: {e}")))?
    }
}

impl Duty for TrainDuty {
    fn kind(&self) -> DutyKind {
        DutyKind::Train
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, EngineResult<()>> {
        async move {
            let artifact = self.train().await?;
            info!(
                "trained {} model '{}' on {} features",
                artifact.method,
                artifact.name,
                artifact.features.len()
            );
            Ok(())
        }
        .boxed()
    }
}
