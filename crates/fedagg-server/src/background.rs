//! Background refresh of scheduled aggregators.

use crate::config::ScheduleConfig;
use fedagg_core::{AggregatorRegistry, RefreshSummary};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

/// Starts one refresh task per schedule.
pub fn spawn_schedules(
    registry: Arc<AggregatorRegistry>,
    schedules: &[ScheduleConfig],
) -> Vec<JoinHandle<()>> {
    schedules
        .iter()
        .cloned()
        .map(|schedule| tokio::spawn(start_refresh_task(Arc::clone(&registry), schedule)))
        .collect()
}

/// Refreshes every aggregator tagged with the schedule's tag once per
/// interval, indefinitely.
pub async fn start_refresh_task(registry: Arc<AggregatorRegistry>, schedule: ScheduleConfig) {
    if schedule.interval_secs == 0 {
        tracing::warn!(tag = %schedule.tag, "refresh schedule disabled (interval=0)");
        return;
    }

    let interval = Duration::from_secs(schedule.interval_secs);
    tracing::info!(
        tag = %schedule.tag,
        interval_secs = schedule.interval_secs,
        "starting refresh schedule"
    );

    loop {
        sleep(interval).await;
        refresh_tag(&registry, &schedule.tag).await;
    }
}

/// Runs one refresh pass over the aggregators tagged `tag`.
pub async fn refresh_tag(registry: &AggregatorRegistry, tag: &str) -> RefreshSummary {
    let ids = registry.ids_for_tag(tag);
    if ids.is_empty() {
        tracing::debug!(tag, "no aggregators scheduled for tag");
        return RefreshSummary::default();
    }

    let summary = registry.refresh(&ids).await;
    if summary.is_success() {
        tracing::info!(tag, count = summary.refreshed.len(), "scheduled refresh finished");
    } else {
        tracing::error!(
            tag,
            refreshed = summary.refreshed.len(),
            failed = summary.failed.len(),
            "scheduled refresh finished with failures"
        );
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedagg_cache::{CacheStore, FileCacheStore};
    use fedagg_types::{AggregatorConfig, SigningConfig};
    use std::collections::BTreeMap;

    fn registry(dir: &std::path::Path) -> AggregatorRegistry {
        let tagged = |tag: &str| AggregatorConfig {
            cron_tag: Some(tag.to_string()),
            cache_generated_secs: Some(3600),
            ..AggregatorConfig::default()
        };
        let broken = AggregatorConfig {
            sign: Some(SigningConfig {
                private_key: "missing.key".into(),
                private_key_pass: None,
                certificate: None,
                algorithm: None,
            }),
            ..tagged("nightly")
        };
        let aggregators: BTreeMap<String, AggregatorConfig> = [
            ("a".to_string(), tagged("hourly")),
            ("b".to_string(), tagged("hourly")),
            ("c".to_string(), broken),
        ]
        .into_iter()
        .collect();
        let store: Arc<dyn CacheStore> = Arc::new(FileCacheStore::new(dir));
        AggregatorRegistry::new(aggregators, store).with_cert_dir(dir)
    }

    #[tokio::test]
    async fn refreshes_only_matching_tag() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        let summary = refresh_tag(&registry, "hourly").await;
        assert_eq!(summary.refreshed, ["a", "b"]);
        assert!(summary.is_success());

        let summary = refresh_tag(&registry, "weekly").await;
        assert!(summary.refreshed.is_empty() && summary.is_success());
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let summary = refresh_tag(&registry(dir.path()), "nightly").await;
        assert!(!summary.is_success());
        assert_eq!(summary.failed[0].0, "c");
    }

    #[tokio::test]
    async fn zero_interval_disables_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let schedule = ScheduleConfig {
            tag: "hourly".into(),
            interval_secs: 0,
        };
        // Returns instead of looping forever.
        start_refresh_task(Arc::new(registry(dir.path())), schedule).await;
    }
}
