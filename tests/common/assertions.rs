//! Custom test assertions for integration tests

use std::path::Path;
use std::time::Duration;
use extract_archive::{Event, ExtractionManager};
use tokio::sync::broadcast;

/// Collect events until the predicate matches or the timeout expires
///
/// The matching event is included in the result.
pub async fn collect_events_until<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    stop_predicate: F,
) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut collected = Vec::new();

    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let should_stop = stop_predicate(&event);
            collected.push(event);
            if should_stop {
                break;
            }
        }
    })
    .await;

    collected
}

/// Wait until no drain is running and the pending queue is empty
pub async fn wait_until_idle(manager: &ExtractionManager, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, async {
        loop {
            let queue_empty = manager.queue().is_empty().await.unwrap_or(false);
            if !manager.is_draining() && queue_empty {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Assert that files exist in a directory
pub fn assert_files_exist(dir: &Path, expected_files: &[&str]) {
    for filename in expected_files {
        let path = dir.join(filename);
        assert!(
            path.exists(),
            "Expected file '{}' to exist in {:?}",
            filename,
            dir
        );
    }
}

/// Assert that files are gone from a directory
pub fn assert_files_missing(dir: &Path, files: &[&str]) {
    for filename in files {
        let path = dir.join(filename);
        assert!(
            !path.exists(),
            "Expected file '{}' to be removed from {:?}",
            filename,
            dir
        );
    }
}

/// Names of the given events, in order
pub fn event_names(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(Event::name).collect()
}
