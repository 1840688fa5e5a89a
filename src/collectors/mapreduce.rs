//! Map/reduce collection
//!
//! Process names are data dependent: each node is first searched for the
//! distinct `ProcessName`s active in the window, then one histogram query is
//! issued per `(node, process)` pair. No cap is placed on the number of
//! processes; a busy cluster produces a wide frame.

use tracing::{debug, info};

use super::catalog::{MR_APP, MR_DISCOVERY, MR_PROCESS};
use super::{Collector, FrameStore, skip_transient};
use crate::error::EngineResult;
use crate::formatter;
use crate::frame::{MetricFrame, TIME_INDEX};
use crate::query::{self, DomainQuery};

async fn discover(
    collector: &Collector,
    node: &str,
    query: &DomainQuery,
) -> EngineResult<Vec<String>> {
    let body = query::process_discovery(&MR_DISCOVERY.replace("{node}", node), query);
    let response = collector.search(&body).await?;
    Ok(formatter::distinct_source_values(
        formatter::hits(&response)?,
        "ProcessName",
    ))
}

pub(super) async fn collect(
    collector: &Collector,
    query: &DomainQuery,
    store: &dyn FrameStore,
) -> EngineResult<MetricFrame> {
    let mut merged = MetricFrame::new(TIME_INDEX);

    for node in &query.nodes {
        let discovered = discover(collector, node, query).await.map(Some);
        let processes = skip_transient(discovered, &format!("process discovery on {node}"))?
            .unwrap_or_default();
        if processes.is_empty() {
            info!("no map/reduce processes on {node}, skipping");
            continue;
        }
        debug!("{node}: processes {processes:?}");

        for process in processes {
            let query_string = MR_PROCESS
                .query_for(node)
                .replace("{process}", &process);
            let result = collector
                .histogram(&query_string, MR_PROCESS.fields, query)
                .await;

            match skip_transient(result, &format!("{process} on {node}"))? {
                Some(mut frame) => {
                    frame.rename_columns(|column| format!("{column}_{node}_{process}"));
                    let name = format!("{}_{node}_{process}.csv", MR_PROCESS.name);
                    let stored = store.stash(&name, frame)?;
                    merged = merged.outer_join(&store.load(stored)?)?;
                }
                None => info!("{process} on {node}: empty aggregation, skipping"),
            }
        }
    }

    let app = collector.collect_kind(&MR_APP, query, store).await?;
    merged.outer_join(&app)
}
