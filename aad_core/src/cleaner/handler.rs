use std::io::Write;

use chrono::{DateTime, Utc};

use super::dto::RunSummary;
use crate::error::CleanerResult;
use crate::graph::client::DirectoryService;
use crate::graph::dto::ApplicationRecord;
use crate::helpers::config::CleanerConfig;
use crate::retention::dto::{RetentionTrace, RetentionVerdict};
use crate::retention::handler::evaluate;

/// Walks the application registrations once, printing a verdict per
/// application and deleting stale ones unless running report-only.
pub struct Cleaner<D> {
    directory: D,
    config: CleanerConfig,
}

impl<D: DirectoryService> Cleaner<D> {
    pub fn new(directory: D, config: CleanerConfig) -> Self {
        Self { directory, config }
    }

    /// Runs a single pass. Listing failures abort the run; sign-in lookup
    /// and delete failures only affect the application concerned.
    pub async fn run<W: Write>(&self, now: DateTime<Utc>, out: &mut W) -> CleanerResult<RunSummary> {
        if self.config.report_only {
            log::info!("Running in report-only mode, nothing will be deleted");
        }

        let applications = self
            .directory
            .list_applications(&self.config.app_filter)
            .await
            .inspect_err(|e| log::error!("Error getting applications: {}", e))?;

        let mut summary = RunSummary {
            listed: applications.len(),
            ..Default::default()
        };

        for app in &applications {
            let sign_ins = match self.directory.latest_sign_ins(&app.app_id).await {
                Ok(sign_ins) => sign_ins,
                Err(e) => {
                    log::error!(
                        "Error getting sign-ins of application {} (appId={}): {}",
                        app.display_name(),
                        app.app_id,
                        e
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            let verdict = evaluate(app, sign_ins.len(), now);
            summary.evaluated += 1;

            let trace = RetentionTrace {
                display_name: app.display_name(),
                verdict,
            };
            writeln!(out, "{}", trace)?;

            if verdict.will_delete {
                summary.marked_for_deletion += 1;
                if !self.config.report_only {
                    self.delete(app, &verdict, &mut summary).await;
                }
            }
        }

        out.flush()?;
        log::info!("Run finished: {}", summary);
        Ok(summary)
    }

    async fn delete(&self, app: &ApplicationRecord, verdict: &RetentionVerdict, summary: &mut RunSummary) {
        log::debug!("Deleting application {} with id={}: {:?}", app.display_name(), app.id, verdict);

        match self.directory.delete_application(&app.id).await {
            Ok(()) => {
                log::info!("Deleted application {} with id={}", app.display_name(), app.id);
                summary.deleted += 1;
            }
            Err(e) => {
                log::error!(
                    "Was not able to delete application {} with id={}: {}",
                    app.display_name(),
                    app.id,
                    e
                );
                summary.delete_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CleanerError;
    use crate::graph::client::GraphClient;
    use crate::graph::dto::SignInRecord;
    use async_trait::async_trait;
    use chrono::{Months, TimeZone};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn months_ago(months: u32) -> DateTime<Utc> {
        now().checked_sub_months(Months::new(months)).unwrap()
    }

    fn app(id: &str, name: &str, created: DateTime<Utc>, tags: &[&str]) -> ApplicationRecord {
        ApplicationRecord {
            id: id.to_string(),
            app_id: format!("app-{}", id),
            display_name: Some(name.to_string()),
            created_date_time: Some(created),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn config(report_only: bool) -> CleanerConfig {
        CleanerConfig {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            report_only,
            app_filter: "displayName eq 'demo'".to_string(),
            graph_base_url: "http://localhost".to_string(),
            authority_host: "http://localhost".to_string(),
        }
    }

    fn transport_error(body: &str) -> CleanerError {
        CleanerError::Graph {
            status: StatusCode::BAD_GATEWAY,
            body: body.to_string(),
        }
    }

    #[derive(Default)]
    struct FakeDirectory {
        applications: Vec<ApplicationRecord>,
        fail_listing: bool,
        sign_in_counts: HashMap<String, usize>,
        failing_sign_ins: HashSet<String>,
        failing_deletes: HashSet<String>,
        sign_in_lookups: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
    }

    impl FakeDirectory {
        fn with_applications(applications: Vec<ApplicationRecord>) -> Self {
            Self {
                applications,
                ..Default::default()
            }
        }

        fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<'a> DirectoryService for &'a FakeDirectory {
        async fn list_applications(&self, _filter: &str) -> CleanerResult<Vec<ApplicationRecord>> {
            if self.fail_listing {
                return Err(transport_error("listing unavailable"));
            }
            Ok(self.applications.clone())
        }

        async fn latest_sign_ins(&self, app_id: &str) -> CleanerResult<Vec<SignInRecord>> {
            self.sign_in_lookups.lock().unwrap().push(app_id.to_string());
            if self.failing_sign_ins.contains(app_id) {
                return Err(transport_error("connection reset"));
            }
            let count = self.sign_in_counts.get(app_id).copied().unwrap_or(0);
            Ok((0..count)
                .map(|_| SignInRecord {
                    app_id: Some(app_id.to_string()),
                    created_date_time: Some(now()),
                })
                .collect())
        }

        async fn delete_application(&self, id: &str) -> CleanerResult<()> {
            if self.failing_deletes.contains(id) {
                return Err(transport_error("delete refused"));
            }
            self.deleted.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    async fn run_with(directory: &FakeDirectory, report_only: bool) -> (CleanerResult<RunSummary>, String) {
        let cleaner = Cleaner::new(directory, config(report_only));
        let mut out = Vec::new();
        let result = cleaner.run(now(), &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_stale_application_is_deleted_once() {
        let directory = FakeDirectory::with_applications(vec![app("1", "stale", months_ago(5), &[])]);

        let (result, output) = run_with(&directory, false).await;
        let summary = result.unwrap();

        assert_eq!(
            output,
            "DisplayName=stale isOlderThanThreeMonths=true hasSignIns=false hasNotExpired=false willBeDeleted=true\n"
        );
        assert_eq!(directory.deleted(), vec!["1"]);
        assert_eq!(summary.deleted, 1);
    }

    #[tokio::test]
    async fn test_report_only_never_deletes() {
        let directory = FakeDirectory::with_applications(vec![app("1", "stale", months_ago(5), &[])]);

        let (result, output) = run_with(&directory, true).await;
        let summary = result.unwrap();

        assert!(output.contains("willBeDeleted=true"));
        assert!(directory.deleted().is_empty());
        assert_eq!(summary.marked_for_deletion, 1);
        assert_eq!(summary.deleted, 0);
    }

    #[tokio::test]
    async fn test_recent_application_is_kept() {
        let directory = FakeDirectory::with_applications(vec![app("1", "fresh", months_ago(1), &[])]);

        for report_only in [false, true] {
            let (result, output) = run_with(&directory, report_only).await;
            result.unwrap();
            assert!(output.contains("isOlderThanThreeMonths=false"));
            assert!(output.contains("willBeDeleted=false"));
        }
        assert!(directory.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_signed_in_application_is_kept() {
        let mut directory =
            FakeDirectory::with_applications(vec![app("1", "active", months_ago(5), &[])]);
        directory.sign_in_counts.insert("app-1".to_string(), 1);

        let (result, output) = run_with(&directory, false).await;
        result.unwrap();

        assert!(output.contains("hasSignIns=true"));
        assert!(output.contains("willBeDeleted=false"));
        assert!(directory.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_expiry_tag_protects_application() {
        let directory = FakeDirectory::with_applications(vec![app(
            "1",
            "protected",
            months_ago(12),
            &["expireOn : 2999-01-01"],
        )]);

        let (result, output) = run_with(&directory, false).await;
        result.unwrap();

        assert!(output.contains("hasNotExpired=true willBeDeleted=false"));
        assert!(directory.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_failure_skips_only_that_application() {
        let mut directory = FakeDirectory::with_applications(vec![
            app("1", "broken", months_ago(5), &[]),
            app("2", "stale", months_ago(5), &[]),
        ]);
        directory.failing_sign_ins.insert("app-1".to_string());

        let (result, output) = run_with(&directory, false).await;
        let summary = result.unwrap();

        assert!(!output.contains("DisplayName=broken"));
        assert_eq!(output.lines().count(), 1);
        assert!(output.starts_with("DisplayName=stale"));
        assert_eq!(directory.deleted(), vec!["2"]);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.evaluated, 1);
    }

    #[tokio::test]
    async fn test_delete_failure_does_not_stop_the_run() {
        let mut directory = FakeDirectory::with_applications(vec![
            app("1", "first", months_ago(5), &[]),
            app("2", "second", months_ago(5), &[]),
        ]);
        directory.failing_deletes.insert("1".to_string());

        let (result, output) = run_with(&directory, false).await;
        let summary = result.unwrap();

        assert_eq!(output.lines().count(), 2);
        assert_eq!(directory.deleted(), vec!["2"]);
        assert_eq!(summary.delete_failures, 1);
        assert_eq!(summary.deleted, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_without_output() {
        let directory = FakeDirectory {
            fail_listing: true,
            ..Default::default()
        };

        let (result, output) = run_with(&directory, false).await;

        assert!(matches!(result, Err(CleanerError::Graph { .. })));
        assert!(output.is_empty());
        assert!(directory.sign_in_lookups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_applications_processed_in_listing_order() {
        let directory = FakeDirectory::with_applications(vec![
            app("1", "alpha", months_ago(1), &[]),
            app("2", "beta", months_ago(5), &[]),
            app("3", "gamma", months_ago(2), &[]),
        ]);

        let (result, output) = run_with(&directory, true).await;
        result.unwrap();

        let names: Vec<&str> = output
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        assert_eq!(names, vec!["DisplayName=alpha", "DisplayName=beta", "DisplayName=gamma"]);
        assert_eq!(
            *directory.sign_in_lookups.lock().unwrap(),
            vec!["app-1", "app-2", "app-3"]
        );
    }

    #[tokio::test]
    async fn test_run_against_graph_endpoints() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "expires_in": 3600,
                "access_token": "graph-token"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/beta/applications"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {
                        "id": "obj-old",
                        "appId": "client-old",
                        "displayName": "old-app",
                        "createdDateTime": "2025-01-10T09:00:00Z",
                        "tags": []
                    },
                    {
                        "id": "obj-new",
                        "appId": "client-new",
                        "displayName": "new-app",
                        "createdDateTime": "2025-05-20T09:00:00Z",
                        "tags": []
                    }
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/beta/auditLogs/signIns"))
            .and(query_param("$top", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/beta/applications/obj-old"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/beta/applications/obj-new"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = config(false);
        config.graph_base_url = format!("{}/beta", server.uri());
        config.authority_host = server.uri();

        let client = GraphClient::new(&config).unwrap();
        let cleaner = Cleaner::new(client, config);
        let mut out = Vec::new();
        let summary = cleaner.run(now(), &mut out).await.unwrap();

        let output = String::from_utf8(out).unwrap();
        assert!(output.contains("DisplayName=old-app isOlderThanThreeMonths=true"));
        assert!(output.contains("DisplayName=new-app isOlderThanThreeMonths=false"));
        assert_eq!(summary.deleted, 1);
    }
}
