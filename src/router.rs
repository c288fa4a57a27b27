//! Log router: dispatches configured sources to the right adapter family
//! and merges everything into one chronological event stream.

use crate::adapters::{AdapterRegistry, AppLogFormat, ApplicationLogAdapter};
use crate::models::{ExecutionEvent, LogSourceCollection};
use crate::{Result, TriageError};
use std::path::Path;
use tracing::{debug, info, warn};

/// Events routed for one analysis invocation.
#[derive(Debug, Clone)]
pub struct RoutedEvents {
    pub events: Vec<ExecutionEvent>,
    /// Name of the adapter that parsed the first automation source.
    pub framework: String,
    pub has_application_logs: bool,
}

pub struct LogRouter {
    registry: AdapterRegistry,
    app_adapter: ApplicationLogAdapter,
}

impl LogRouter {
    pub fn new() -> Self {
        Self {
            registry: AdapterRegistry::new(),
            app_adapter: ApplicationLogAdapter::new(),
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Route every configured source. Fails fast when no automation source
    /// is configured; application sources are additive and never fail.
    pub fn route(
        &self,
        collection: &LogSourceCollection,
        framework: Option<&str>,
    ) -> Result<RoutedEvents> {
        if collection.automation.is_empty() {
            return Err(TriageError::Configuration(
                "at least one automation log source is required".to_string(),
            ));
        }

        let mut events = Vec::new();
        let mut detected_framework: Option<String> = None;

        for source in &collection.automation {
            let raw = match std::fs::read_to_string(&source.path) {
                Ok(raw) => raw,
                Err(e) => {
                    // Unreadable automation input: empty contribution, the
                    // analyzer will classify UNKNOWN downstream.
                    warn!(path = %source.path.display(), error = %e, "Automation log unreadable");
                    continue;
                }
            };

            let adapter = match framework {
                Some(name) => self.registry.by_name(name).ok_or_else(|| {
                    TriageError::Configuration(format!("unknown framework adapter: {name}"))
                })?,
                None => self.registry.detect(&raw),
            };
            debug!(path = %source.path.display(), adapter = adapter.name(), "Routing automation source");
            if detected_framework.is_none() {
                detected_framework = Some(adapter.name().to_string());
            }
            events.extend(adapter.parse(&raw));
        }

        let mut has_application_logs = false;
        for source in &collection.application {
            match self.read_application(&source.path) {
                Some(raw) => {
                    let service = source.service_name.as_deref().unwrap_or("application");
                    let parsed = self.app_adapter.parse(&raw, service, AppLogFormat::Auto);
                    if !parsed.is_empty() {
                        has_application_logs = true;
                    }
                    events.extend(parsed);
                }
                None => continue,
            }
        }

        merge_by_timestamp(&mut events);

        Ok(RoutedEvents {
            events,
            framework: detected_framework.unwrap_or_else(|| "generic".to_string()),
            has_application_logs,
        })
    }

    /// Missing or unreadable application logs are logged and skipped,
    /// never an error.
    fn read_application(&self, path: &Path) -> Option<String> {
        if !path.exists() {
            info!(path = %path.display(), "Application log not found, skipping");
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(raw) => Some(raw),
            Err(e) => {
                info!(path = %path.display(), error = %e, "Application log unreadable, skipping");
                None
            }
        }
    }
}

impl Default for LogRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable chronological merge. Ties and unparseable timestamps keep their
/// arrival order so identical inputs always produce identical streams.
fn merge_by_timestamp(events: &mut [ExecutionEvent]) {
    events.sort_by_key(|e| {
        e.timestamp_utc()
            .map(|t| t.timestamp_millis())
            .unwrap_or(i64::MIN)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogSource, SourceKind};
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_no_automation_sources_is_a_configuration_error() {
        let router = LogRouter::new();
        let result = router.route(&LogSourceCollection::default(), None);
        assert!(matches!(result, Err(TriageError::Configuration(_))));
    }

    #[test]
    fn test_missing_application_log_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let automation = write_file(&dir, "run.log", "ERROR timeout waiting for page\n");

        let collection = LogSourceCollection {
            automation: vec![LogSource {
                path: automation,
                kind: SourceKind::Automation,
                service_name: None,
            }],
            application: vec![LogSource {
                path: dir.path().join("missing-service.log"),
                kind: SourceKind::Application,
                service_name: Some("svc".to_string()),
            }],
        };

        let routed = LogRouter::new().route(&collection, None).unwrap();
        assert!(!routed.has_application_logs);
        assert!(!routed.events.is_empty());
    }

    #[test]
    fn test_events_are_merged_chronologically() {
        let dir = tempfile::tempdir().unwrap();
        let automation = write_file(
            &dir,
            "run.log",
            "2024-01-15 10:00:05 ERROR assertion failed\n",
        );
        let application = write_file(
            &dir,
            "svc.log",
            "2024-01-15 10:00:01,000 ERROR [main] svc.Api - upstream exploded\n",
        );

        let collection = LogSourceCollection {
            automation: vec![LogSource {
                path: automation,
                kind: SourceKind::Automation,
                service_name: None,
            }],
            application: vec![LogSource {
                path: application,
                kind: SourceKind::Application,
                service_name: Some("svc".to_string()),
            }],
        };

        let routed = LogRouter::new().route(&collection, Some("generic")).unwrap();
        assert!(routed.has_application_logs);
        assert!(routed.events.len() >= 2);
        let first_ts = routed.events.first().unwrap().timestamp_utc().unwrap();
        let last_ts = routed.events.last().unwrap().timestamp_utc().unwrap();
        assert!(first_ts <= last_ts);
    }

    #[test]
    fn test_unknown_named_framework_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let automation = write_file(&dir, "run.log", "ERROR x\n");
        let collection = LogSourceCollection::automation_paths(vec![automation]);
        let result = LogRouter::new().route(&collection, Some("definitely-not-real"));
        assert!(matches!(result, Err(TriageError::Configuration(_))));
    }
}
