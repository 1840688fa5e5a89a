use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info, instrument};

use super::{Duty, DutyKind, settle};
use crate::AnomalyBatch;
use crate::collectors::Acquisition;
use crate::error::EngineResult;
use crate::point::ThresholdEvaluator;
use crate::report::{AnomalySink, Channel};

/// Method name carried by point anomaly batches
pub const POINT_METHOD: &str = "point";

/// Threshold checks over the latest system window
pub struct PointDuty {
    acquisition: Arc<Acquisition>,
    evaluator: ThresholdEvaluator,
    sink: Arc<dyn AnomalySink>,
    window: String,
    delay: Duration,
}

impl PointDuty {
    pub fn new(
        acquisition: Arc<Acquisition>,
        evaluator: ThresholdEvaluator,
        sink: Arc<dyn AnomalySink>,
        window: impl Into<String>,
        delay: Duration,
    ) -> Self {
        Self {
            acquisition,
            evaluator,
            sink,
            window: window.into(),
            delay,
        }
    }

    /// One acquisition and evaluation; returns the number of reported
    /// anomalies.
    #[instrument(skip(self), fields(window = %self.window))]
    pub async fn cycle(&self) -> EngineResult<usize> {
        let frame = self.acquisition.point_frame(&self.window).await?;
        let anomalies = self.evaluator.evaluate_all(&frame);
        if anomalies.is_empty() {
            debug!("no point anomalies in {} rows", frame.len());
            return Ok(0);
        }

        let count = anomalies.len();
        let batch = AnomalyBatch::new(POINT_METHOD, &self.window).with_anomalies(anomalies);
        self.sink.report(batch, Channel::Store).await?;
        Ok(count)
    }

    async fn run_loop(self) -> EngineResult<()> {
        info!(
            "point detection over {} windows, every {:?}",
            self.window, self.delay
        );
        loop {
            settle(DutyKind::Point, self.cycle().await.map(|_| ()))?;
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Duty for PointDuty {
    fn kind(&self) -> DutyKind {
        DutyKind::Point
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, EngineResult<()>> {
        (*self).run_loop().boxed()
    }
}
