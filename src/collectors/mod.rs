//! Acquisition collectors
//!
//! A [`Collector`] turns a [`Domain`] and a [`DomainQuery`] into one merged
//! [`MetricFrame`]. Every domain follows the same shape:
//!
//! ```text
//! for kind in domain:
//!     per node (node list order) → query → flatten → suffix columns → stash
//!     load stashed node frames → outer join            (node axis)
//! outer join kind frames on the time index             (subtype axis)
//! stash + load merged domain frame (System.csv, Merged_DFS.csv, ...)
//! ```
//!
//! Intermediate frames go through a [`FrameStore`]. In checkpoint mode the
//! store passes frames through in memory; otherwise it writes each frame to
//! a CSV in the data directory and hands back the file, which the merge step
//! reads again. Both stores feed the same code path, so both modes produce
//! the same merged frame.
//!
//! Empty aggregations and transport failures of a single node are skipped
//! with a log entry. A domain whose merged frame ends up without rows fails
//! with [`EngineError::EmptyResult`].

pub mod catalog;
pub mod cep;
pub mod mapreduce;
pub mod user_query;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::backend::MonitoringBackend;
use crate::config::Config;
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::formatter;
use crate::frame::{MetricFrame, TIME_INDEX, csv_io};
use crate::query::{self, DomainQuery, MetricField};

use catalog::{MetricKind, Scope};

/// File holding the join of several domains
pub const FINAL_MERGE: &str = "Final_Merge.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    System,
    Dfs,
    ResourceManager,
    NodeManager,
    MapReduce,
    Stream,
    Cassandra,
    MongoDb,
    UserQuery,
    Cep,
}

impl Domain {
    /// Checkpoint file of the merged domain frame
    pub fn merged_file(&self) -> &'static str {
        match self {
            Domain::System => "System.csv",
            Domain::Dfs => "Merged_DFS.csv",
            Domain::ResourceManager => "Merged_Cluster.csv",
            Domain::NodeManager => "Merged_NM.csv",
            Domain::MapReduce => "Merged_MR.csv",
            Domain::Stream => "Spark.csv",
            Domain::Cassandra => "Merged_Cassandra.csv",
            Domain::MongoDb => "Merged_Mongo.csv",
            Domain::UserQuery => "query_response.csv",
            Domain::Cep => "CEP.csv",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::System => "system",
            Domain::Dfs => "dfs",
            Domain::ResourceManager => "resourcemanager",
            Domain::NodeManager => "nodemanager",
            Domain::MapReduce => "mapreduce",
            Domain::Stream => "stream",
            Domain::Cassandra => "cassandra",
            Domain::MongoDb => "mongodb",
            Domain::UserQuery => "userquery",
            Domain::Cep => "cep",
        };
        write!(f, "{name}")
    }
}

/// A frame handed to a [`FrameStore`]
#[derive(Debug, Clone)]
pub enum StoredFrame {
    Memory(MetricFrame),
    File(PathBuf),
}

/// Where intermediate frames live between collection and merge
pub trait FrameStore: Send + Sync {
    fn stash(&self, name: &str, frame: MetricFrame) -> EngineResult<StoredFrame>;

    fn load(&self, stored: StoredFrame) -> EngineResult<MetricFrame>;

    fn roundtrip(&self, name: &str, frame: MetricFrame) -> EngineResult<MetricFrame> {
        let stored = self.stash(name, frame)?;
        self.load(stored)
    }
}

/// Checkpoint mode: frames stay in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryFrameStore;

impl FrameStore for MemoryFrameStore {
    fn stash(&self, _name: &str, frame: MetricFrame) -> EngineResult<StoredFrame> {
        Ok(StoredFrame::Memory(frame))
    }

    fn load(&self, stored: StoredFrame) -> EngineResult<MetricFrame> {
        match stored {
            StoredFrame::Memory(frame) => Ok(frame),
            StoredFrame::File(path) => csv_io::read_csv(&path),
        }
    }
}

/// File mode: every frame is written to `dir` and read back on load
#[derive(Debug, Clone)]
pub struct CsvFrameStore {
    dir: PathBuf,
}

impl CsvFrameStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FrameStore for CsvFrameStore {
    fn stash(&self, name: &str, frame: MetricFrame) -> EngineResult<StoredFrame> {
        let path = self.dir.join(name);
        csv_io::write_csv(&frame, &path)?;
        Ok(StoredFrame::File(path))
    }

    fn load(&self, stored: StoredFrame) -> EngineResult<MetricFrame> {
        match stored {
            StoredFrame::Memory(frame) => Ok(frame),
            StoredFrame::File(path) => csv_io::read_csv(&path),
        }
    }
}

pub fn frame_store(checkpoint: bool, data_dir: &Path) -> Arc<dyn FrameStore> {
    if checkpoint {
        Arc::new(MemoryFrameStore)
    } else {
        Arc::new(CsvFrameStore::new(data_dir))
    }
}

/// Turn a transport failure of one sub-query into a skipped contribution.
fn skip_transient<T>(result: EngineResult<Option<T>>, what: &str) -> EngineResult<Option<T>> {
    match result {
        Err(e) if e.kind() == ErrorKind::TransientAcquisition => {
            warn!("{what}: {e}, skipping");
            Ok(None)
        }
        other => other,
    }
}

pub struct Collector {
    backend: Arc<dyn MonitoringBackend>,
    query_dir: PathBuf,
}

impl Collector {
    pub fn new(backend: Arc<dyn MonitoringBackend>, query_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            query_dir: query_dir.into(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn MonitoringBackend> {
        &self.backend
    }

    /// Fetch one domain as a merged frame.
    #[instrument(skip(self, query, store), fields(nodes = query.nodes.len()))]
    pub async fn fetch(
        &self,
        domain: Domain,
        query: &DomainQuery,
        store: &dyn FrameStore,
    ) -> EngineResult<MetricFrame> {
        let frame = match domain {
            Domain::MapReduce => mapreduce::collect(self, query, store).await?,
            Domain::UserQuery => user_query::collect(self, &self.query_dir, query).await?,
            Domain::Cep => cep::collect(self, query).await?,
            _ => self.collect_kinds(catalog::kinds(domain), query, store).await?,
        };

        let frame = store.roundtrip(domain.merged_file(), frame)?;
        if frame.is_empty() {
            return Err(EngineError::EmptyResult(format!("{domain} acquisition")));
        }
        debug!("{domain}: {} rows, {} columns", frame.len(), frame.width());
        Ok(frame)
    }

    /// Fetch several domains and join them on the time index.
    pub async fn acquire(
        &self,
        domains: &[Domain],
        query: &DomainQuery,
        store: &dyn FrameStore,
    ) -> EngineResult<MetricFrame> {
        if let [domain] = domains {
            return self.fetch(*domain, query, store).await;
        }

        let mut merged = MetricFrame::new(TIME_INDEX);
        for domain in domains {
            let frame = self.fetch(*domain, query, store).await?;
            merged = merged.outer_join(&frame)?;
        }
        store.roundtrip(FINAL_MERGE, merged)
    }

    async fn collect_kinds(
        &self,
        kinds: &[MetricKind],
        query: &DomainQuery,
        store: &dyn FrameStore,
    ) -> EngineResult<MetricFrame> {
        let mut merged = MetricFrame::new(TIME_INDEX);
        for kind in kinds {
            let frame = self.collect_kind(kind, query, store).await?;
            merged = merged.outer_join(&frame)?;
        }
        Ok(merged)
    }

    /// Collect one metric kind, node by node for per-node kinds.
    pub(crate) async fn collect_kind(
        &self,
        kind: &MetricKind,
        query: &DomainQuery,
        store: &dyn FrameStore,
    ) -> EngineResult<MetricFrame> {
        if kind.scope == Scope::Cluster {
            return match self.histogram(kind.query, kind.fields, query).await? {
                Some(frame) => store.roundtrip(&format!("{}.csv", kind.name), frame),
                None => {
                    info!("{}: empty aggregation", kind.name);
                    Ok(MetricFrame::new(TIME_INDEX))
                }
            };
        }

        let mut stored = Vec::with_capacity(query.nodes.len());
        for node in &query.nodes {
            let result = self.histogram(&kind.query_for(node), kind.fields, query).await;
            match skip_transient(result, &format!("{} on {node}", kind.name))? {
                Some(mut frame) => {
                    frame.rename_columns(|column| format!("{column}_{node}"));
                    stored.push(store.stash(&format!("{}_{node}.csv", kind.name), frame)?);
                }
                None => info!("{}: no data for node {node}, skipping", kind.name),
            }
        }

        let mut merged = MetricFrame::new(TIME_INDEX);
        for frame in stored {
            merged = merged.outer_join(&store.load(frame)?)?;
        }
        Ok(merged)
    }

    /// Run one histogram query; `None` when the aggregation came back empty.
    pub(crate) async fn histogram(
        &self,
        query_string: &str,
        fields: &[MetricField],
        query: &DomainQuery,
    ) -> EngineResult<Option<MetricFrame>> {
        let body = query::histogram(query_string, query, fields);
        let response = self.backend.agg_query(&body).await?;
        if formatter::is_empty_aggregation(&response) {
            return Ok(None);
        }
        formatter::histogram_frame(&response, fields).map(Some)
    }

    pub(crate) async fn search(&self, body: &Value) -> EngineResult<Value> {
        self.backend.agg_query(body).await
    }
}

/// Data source of the duties: resolved nodes, selected domains and the
/// frame store implied by the checkpoint mode.
pub struct Acquisition {
    collector: Collector,
    domains: Vec<Domain>,
    nodes: Vec<String>,
    from: Option<i64>,
    to: Option<i64>,
    window: String,
    qinterval: String,
    size: u32,
    local: Option<PathBuf>,
    store: Arc<dyn FrameStore>,
}

impl Acquisition {
    pub fn new(config: &Config, backend: Arc<dyn MonitoringBackend>, nodes: Vec<String>) -> Self {
        Self {
            collector: Collector::new(backend, config.paths.query_dir.clone()),
            domains: config.query.domains.clone(),
            nodes,
            from: config.query.from,
            to: config.query.to,
            window: config.query.interval.clone(),
            qinterval: config.query.qinterval.clone(),
            size: config.query.size,
            local: config.connector.local.clone(),
            store: frame_store(config.mode.checkpoint, &config.paths.data_dir),
        }
    }

    pub fn qinterval(&self) -> &str {
        &self.qinterval
    }

    /// Historical frame for training, from local data when configured.
    #[instrument(skip(self))]
    pub async fn training_frame(&self) -> EngineResult<MetricFrame> {
        if let Some(local) = &self.local {
            info!("training on local data {}", local.display());
            return self.collector.backend().local_data(local).await;
        }

        let (Some(from), Some(to)) = (self.from, self.to) else {
            return Err(EngineError::Config(
                "training needs query.from and query.to".into(),
            ));
        };
        let query = DomainQuery::historical(from, to, &self.qinterval, self.size, self.nodes.clone());
        self.collector
            .acquire(&self.domains, &query, self.store.as_ref())
            .await
    }

    /// Rolling window ending now, for detection.
    #[instrument(skip(self))]
    pub async fn live_frame(&self) -> EngineResult<MetricFrame> {
        let query = DomainQuery::live(&self.window, &self.qinterval, self.size, self.nodes.clone());
        self.collector
            .acquire(&self.domains, &query, self.store.as_ref())
            .await
    }

    /// Short system window for point checks, always kept in memory.
    #[instrument(skip(self))]
    pub async fn point_frame(&self, window: &str) -> EngineResult<MetricFrame> {
        let query = DomainQuery::live(window, &self.qinterval, self.size, self.nodes.clone());
        self.collector
            .fetch(Domain::System, &query, &MemoryFrameStore)
            .await
    }
}
