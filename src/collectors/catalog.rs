//! Metric kinds per domain
//!
//! Query strings use `{node}` and `{process}` placeholders. Column names must
//! be unique within a domain once the node suffix is applied.

use super::Domain;
use crate::query::MetricField;

macro_rules! metric {
    ($column:literal, $field:literal) => {
        MetricField {
            column: $column,
            field: $field,
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One query for the whole cluster
    Cluster,
    /// One query per node, columns suffixed with `_{node}`
    PerNode,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricKind {
    pub name: &'static str,
    pub query: &'static str,
    pub scope: Scope,
    pub fields: &'static [MetricField],
}

impl MetricKind {
    pub fn query_for(&self, node: &str) -> String {
        self.query.replace("{node}", node)
    }
}

const fn kind(
    name: &'static str,
    query: &'static str,
    scope: Scope,
    fields: &'static [MetricField],
) -> MetricKind {
    MetricKind {
        name,
        query,
        scope,
        fields,
    }
}

pub const SYSTEM: &[MetricKind] = &[
    kind(
        "load",
        r#"collectd_type:"load" AND host:"{node}""#,
        Scope::PerNode,
        &[
            metric!("shortterm", "shortterm"),
            metric!("midterm", "midterm"),
            metric!("longterm", "longterm"),
        ],
    ),
    kind(
        "memory",
        r#"collectd_type:"memory" AND host:"{node}""#,
        Scope::PerNode,
        &[
            metric!("cached", "cached"),
            metric!("buffered", "buffered"),
            metric!("used", "used"),
            metric!("free", "free"),
        ],
    ),
    kind(
        "interface",
        r#"plugin:"interface" AND collectd_type:"if_octets" AND host:"{node}""#,
        Scope::PerNode,
        &[metric!("rx", "rx"), metric!("tx", "tx")],
    ),
    kind(
        "packets",
        r#"plugin:"interface" AND collectd_type:"if_packets" AND host:"{node}""#,
        Scope::PerNode,
        &[metric!("packets_rx", "rx"), metric!("packets_tx", "tx")],
    ),
];

pub const DFS: &[MetricKind] = &[
    kind(
        "dfs",
        r#"serviceType:"dfs" AND serviceMetrics:"RpcActivity""#,
        Scope::Cluster,
        &[
            metric!("CallQueueLength", "CallQueueLength"),
            metric!("NumOpenConnections", "NumOpenConnections"),
            metric!("RpcProcessingTimeAvgTime", "RpcProcessingTimeAvgTime"),
            metric!("RpcQueueTimeAvgTime", "RpcQueueTimeAvgTime"),
        ],
    ),
    kind(
        "dfsfs",
        r#"serviceType:"dfs" AND serviceMetrics:"FSNamesystem""#,
        Scope::Cluster,
        &[
            metric!("BlocksTotal", "BlocksTotal"),
            metric!("CapacityRemaining", "CapacityRemaining"),
            metric!("FilesTotal", "FilesTotal"),
        ],
    ),
    kind(
        "fsop",
        r#"serviceType:"dfs" AND serviceMetrics:"NameNodeActivity""#,
        Scope::Cluster,
        &[
            metric!("CreateFileOps", "CreateFileOps"),
            metric!("FilesCreated", "FilesCreated"),
            metric!("GetListingOps", "GetListingOps"),
        ],
    ),
    kind(
        "datanode",
        r#"serviceType:"dfs" AND serviceMetrics:"DataNodeActivity" AND hostname:"{node}""#,
        Scope::PerNode,
        &[
            metric!("BytesRead", "BytesRead"),
            metric!("BytesWritten", "BytesWritten"),
            metric!("ReadBlockOpNumOps", "ReadBlockOpNumOps"),
        ],
    ),
];

pub const RESOURCE_MANAGER: &[MetricKind] = &[
    kind(
        "cluster",
        r#"serviceType:"yarn" AND serviceMetrics:"ClusterMetrics""#,
        Scope::Cluster,
        &[
            metric!("NumActiveNMs", "NumActiveNMs"),
            metric!("NumLostNMs", "NumLostNMs"),
        ],
    ),
    kind(
        "queue",
        r#"serviceType:"yarn" AND serviceMetrics:"QueueMetrics""#,
        Scope::Cluster,
        &[
            metric!("AppsRunning", "AppsRunning"),
            metric!("AppsPending", "AppsPending"),
            metric!("AllocatedMB", "AllocatedMB"),
        ],
    ),
    kind(
        "jvm_rm",
        r#"serviceType:"yarn" AND serviceMetrics:"JvmMetrics" AND ProcessName:"ResourceManager""#,
        Scope::Cluster,
        &[
            metric!("rm_GcCount", "GcCount"),
            metric!("rm_MemHeapUsedM", "MemHeapUsedM"),
        ],
    ),
];

pub const NODE_MANAGER: &[MetricKind] = &[
    kind(
        "nm",
        r#"serviceType:"yarn" AND serviceMetrics:"NodeManagerMetrics" AND hostname:"{node}""#,
        Scope::PerNode,
        &[
            metric!("ContainersLaunched", "ContainersLaunched"),
            metric!("ContainersFailed", "ContainersFailed"),
            metric!("AllocatedGB", "AllocatedGB"),
        ],
    ),
    kind(
        "jvm_nm",
        r#"serviceType:"yarn" AND serviceMetrics:"JvmMetrics" AND ProcessName:"NodeManager" AND hostname:"{node}""#,
        Scope::PerNode,
        &[
            metric!("nm_GcCount", "GcCount"),
            metric!("nm_MemHeapUsedM", "MemHeapUsedM"),
        ],
    ),
    kind(
        "shuffle",
        r#"serviceType:"yarn" AND serviceMetrics:"ShuffleMetrics" AND hostname:"{node}""#,
        Scope::PerNode,
        &[
            metric!("ShuffleConnections", "ShuffleConnections"),
            metric!("ShuffleOutputBytes", "ShuffleOutputBytes"),
        ],
    ),
];

/// Process discovery on one node, answered with hits carrying `ProcessName`
pub const MR_DISCOVERY: &str = r#"serviceType:"mapreduce" AND hostname:"{node}""#;

/// JVM metrics of one discovered process
pub const MR_PROCESS: MetricKind = kind(
    "jvm_mr",
    r#"serviceType:"mapreduce" AND serviceMetrics:"JvmMetrics" AND hostname:"{node}" AND ProcessName:"{process}""#,
    Scope::PerNode,
    &[
        metric!("GcCount", "GcCount"),
        metric!("GcTimeMillis", "GcTimeMillis"),
        metric!("MemHeapUsedM", "MemHeapUsedM"),
    ],
);

pub const MR_APP: MetricKind = kind(
    "mrapp",
    r#"serviceType:"mapreduce" AND serviceMetrics:"MRAppMetrics""#,
    Scope::Cluster,
    &[
        metric!("JobsRunning", "JobsRunning"),
        metric!("MapsRunning", "MapsRunning"),
        metric!("ReducesRunning", "ReducesRunning"),
    ],
);

pub const STREAM: &[MetricKind] = &[kind(
    "spark",
    r#"serviceType:"spark""#,
    Scope::Cluster,
    &[
        metric!("driver_memUsed_MB", "driver_BlockManager_memory_memUsed_MB"),
        metric!("driver_activeJobs", "driver_DAGScheduler_job_activeJobs"),
        metric!("driver_runningStages", "driver_DAGScheduler_stage_runningStages"),
    ],
)];

pub const CASSANDRA: &[MetricKind] = &[
    kind(
        "cassandra_counters",
        r#"plugin:"GenericJMX" AND plugin_instance:"cassandra" AND collectd_type:"counter" AND host:"{node}""#,
        Scope::PerNode,
        &[metric!("ReadCount", "ReadCount"), metric!("WriteCount", "WriteCount")],
    ),
    kind(
        "cassandra_gauges",
        r#"plugin:"GenericJMX" AND plugin_instance:"cassandra" AND collectd_type:"gauge" AND host:"{node}""#,
        Scope::PerNode,
        &[
            metric!("ReadLatency", "ReadLatency"),
            metric!("WriteLatency", "WriteLatency"),
            metric!("PendingTasks", "PendingTasks"),
        ],
    ),
];

pub const MONGODB: &[MetricKind] = &[
    kind(
        "mongo_counters",
        r#"plugin:"mongodb" AND collectd_type:"total_operations" AND host:"{node}""#,
        Scope::PerNode,
        &[
            metric!("opcounters_insert", "insert"),
            metric!("opcounters_query", "query"),
            metric!("opcounters_update", "update"),
        ],
    ),
    kind(
        "mongo_gauges",
        r#"plugin:"mongodb" AND collectd_type:"memory" AND host:"{node}""#,
        Scope::PerNode,
        &[
            metric!("mem_resident", "resident"),
            metric!("mem_virtual", "virtual"),
        ],
    ),
];

/// Kind tables of the domains collected through plain histograms
pub fn kinds(domain: Domain) -> &'static [MetricKind] {
    match domain {
        Domain::System => SYSTEM,
        Domain::Dfs => DFS,
        Domain::ResourceManager => RESOURCE_MANAGER,
        Domain::NodeManager => NODE_MANAGER,
        Domain::Stream => STREAM,
        Domain::Cassandra => CASSANDRA,
        Domain::MongoDb => MONGODB,
        Domain::MapReduce | Domain::UserQuery | Domain::Cep => &[],
    }
}
