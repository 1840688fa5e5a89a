//! Engine wiring
//!
//! [`Engine`] owns the pieces every duty shares (configuration, backend and
//! sink), checks the environment once at startup and turns the enabled
//! modes into duties for the [`Supervisor`].

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::backend::{ElasticsearchBackend, MonitoringBackend, ReplayBackend};
use crate::collectors::Acquisition;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::ModelManager;
use crate::models::explain::DeviationExplainer;
use crate::point::ThresholdEvaluator;
use crate::report::grafana::GrafanaAnnotator;
use crate::report::{AnomalySink, ReportingSink};
use crate::tasks::{DetectDuty, PointDuty, Supervisor, TrainDuty};
use crate::util::parse_duration;

/// Interval key the monitoring platform reports for system metrics
pub const SYSTEM_INTERVAL: &str = "System";

pub struct Engine {
    config: Arc<Config>,
    backend: Arc<dyn MonitoringBackend>,
    sink: Arc<dyn AnomalySink>,
}

impl Engine {
    /// Build the production backend and sink from `config`.
    pub fn from_config(config: Arc<Config>) -> EngineResult<Self> {
        let backend: Arc<dyn MonitoringBackend> = match &config.connector.elasticsearch {
            Some(es) => Arc::new(ElasticsearchBackend::new(es)?),
            // local training data only
            None => Arc::new(ReplayBackend::default()),
        };

        let mut sink = ReportingSink::new(&config.connector)?;
        if let Some(grafana) = &config.connector.grafana {
            sink = sink.with_annotator(GrafanaAnnotator::new(grafana)?);
        }

        Ok(Self::with_parts(config, backend, Arc::new(sink)))
    }

    pub fn with_parts(
        config: Arc<Config>,
        backend: Arc<dyn MonitoringBackend>,
        sink: Arc<dyn AnomalySink>,
    ) -> Self {
        Self {
            config,
            backend,
            sink,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Startup checks. Returns the resolved node list.
    #[instrument(skip(self))]
    pub async fn init(&self) -> EngineResult<Vec<String>> {
        match self.backend.health().await {
            Ok(health) => info!("monitoring backend health: {health}"),
            Err(e) => warn!("monitoring backend health unavailable: {e}"),
        }

        self.check_intervals().await?;
        let nodes = self.resolve_nodes().await?;

        if self.config.connector.reset_index {
            self.sink.reset_index().await?;
        }
        Ok(nodes)
    }

    async fn check_intervals(&self) -> EngineResult<()> {
        let controlled = self
            .config
            .connector
            .elasticsearch
            .as_ref()
            .is_some_and(|es| es.control.is_some());
        let intervals = self.backend.interval().await?;
        debug!("collection intervals: {intervals:?}");

        let Some(system) = intervals.get(SYSTEM_INTERVAL).copied() else {
            if controlled {
                return Err(EngineError::Config(format!(
                    "control endpoint reports no {SYSTEM_INTERVAL} interval"
                )));
            }
            return Ok(());
        };

        let qinterval = parse_duration(&self.config.query.qinterval)?;
        if qinterval.as_secs() < system {
            warn!(
                "qinterval {} is shorter than the {system}s system collection interval",
                self.config.query.qinterval
            );
        }
        Ok(())
    }

    async fn resolve_nodes(&self) -> EngineResult<Vec<String>> {
        let registered = self.backend.node_list().await?;
        let desired = &self.config.query.nodes;
        if desired.is_empty() {
            info!("using all {} registered nodes", registered.len());
            return Ok(registered);
        }

        if let Some(unknown) = desired.iter().find(|node| !registered.contains(node)) {
            return Err(EngineError::Config(format!(
                "node '{unknown}' is not registered with the monitoring backend"
            )));
        }
        Ok(desired.clone())
    }

    /// One duty per enabled mode.
    pub fn build_supervisor(&self, nodes: Vec<String>) -> EngineResult<Supervisor> {
        let config = &self.config;
        let mode = &config.mode;
        let delay = parse_duration(&mode.delay)?;
        let acquisition = Arc::new(Acquisition::new(config, self.backend.clone(), nodes));

        let mut manager = ModelManager::new(&config.paths.models_dir);
        if config.detection.as_ref().is_some_and(|d| d.explain) {
            manager = manager.with_explainer(Arc::new(DeviationExplainer));
        }
        let manager = Arc::new(manager);

        let mut supervisor = Supervisor::new(mode.executor);

        if mode.point {
            let evaluator = ThresholdEvaluator::from_config(&config.point)?;
            supervisor.add(Box::new(PointDuty::new(
                acquisition.clone(),
                evaluator,
                self.sink.clone(),
                config.point.window.clone(),
                delay,
            )));
        }

        if mode.train {
            let training = config
                .training
                .clone()
                .ok_or_else(|| EngineError::Config("train mode needs a training section".into()))?;
            let duty = TrainDuty::new(
                acquisition.clone(),
                manager.clone(),
                config.filter.clone(),
                config.augmentation.clone(),
                training,
            )
            .with_data_dir(&config.paths.data_dir, mode.checkpoint);
            supervisor.add(Box::new(duty));
        }

        if mode.detect {
            let detection = config.detection.clone().ok_or_else(|| {
                EngineError::Config("detect mode needs a detection section".into())
            })?;
            let duty = DetectDuty::new(
                acquisition,
                manager,
                self.sink.clone(),
                config.filter.clone(),
                detection,
                delay,
            )
            .with_augmentation(config.augmentation.clone())
            .with_data_dir(&config.paths.data_dir, mode.checkpoint);
            supervisor.add(Box::new(duty));
        }

        Ok(supervisor)
    }

    /// Initialise, start every enabled duty and wait for them.
    ///
    /// Ctrl-C halts the duties; the run then ends without error.
    pub async fn run(&self) -> EngineResult<()> {
        let nodes = self.init().await?;
        let running = self.build_supervisor(nodes)?.start();
        info!("started {} duties", running.handles().len());

        let halt = running.halt_signal();
        let finished = running.wait();
        tokio::pin!(finished);

        tokio::select! {
            result = &mut finished => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, halting duties");
                halt.halt();
                finished.await
            }
        }
    }
}
