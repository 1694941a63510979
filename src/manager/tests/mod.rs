use super::*;
use crate::manager::test_helpers::{
    Harness, Script, ScriptedExtractor, drain_events, event_names, harness, harness_with_store,
};
use crate::types::{Event, FileId, FileStatus, PackageId};


fn scripted_harness(
    configure: impl FnOnce(&mut Config),
    extractor: &ScriptedExtractor,
) -> Harness {
    harness(configure, vec![Arc::new(extractor.clone())])
}

/// Activate the manager and wait for the resumption drain
async fn activate(h: &Harness) {
    if let Some(handle) = h.manager.activate().await {
        handle.await.unwrap();
    }
}
