use std::path::Path;

use mailtrawl::report::merge_into_records;
use mailtrawl::{CompanyRecord, Engine, EngineConfig, Fetcher};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body.to_string())
        .insert_header("content-type", "text/html")
}

fn company(name: &str, website: Option<&str>) -> CompanyRecord {
    CompanyRecord {
        name: name.to_string(),
        website: website.map(str::to_string),
        city: "Paris".to_string(),
        industry: "services".to_string(),
        row: 0,
    }
}

fn test_config(output_dir: &Path) -> EngineConfig {
    EngineConfig {
        output_dir: output_dir.to_path_buf(),
        workers: 4,
        ..Default::default()
    }
}

fn engine_for(server: &MockServer, domain: &str, output_dir: &Path) -> Engine {
    let fetcher = Fetcher::new().unwrap().with_rewrite(domain, &server.uri());
    Engine::new(test_config(output_dir))
        .unwrap()
        .with_fetcher(fetcher)
}

#[tokio::test]
async fn test_end_to_end_discovery_with_affinity_filtering() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><body>
            <p>Contact: contact@acme.com</p>
            <div class="banner">Powered by us. Questions? support@platformhost.io</div>
            </body></html>"#,
        ))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server, "acme.com", dir.path());
    let summary = engine
        .run(vec![company("Acme", Some("acme.com"))])
        .await
        .unwrap();

    assert_eq!(summary.total_processed, 1);
    let result = &summary.results[0];
    assert_eq!(result.emails, vec!["contact@acme.com"]);
    assert!(result.success);
    assert!(result.discovery_method.as_str().starts_with("web_"));
    assert_eq!(result.domain.as_deref(), Some("acme.com"));
    assert_eq!(summary.total_emails, 1);
    assert_eq!(summary.success_count, 1);
}

#[tokio::test]
async fn test_spam_pattern_email_yields_not_found() {
    let server = MockServer::start().await;
    // A generated-looking local part (16+ hex chars) is the only address
    // anywhere on the site.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            "<html><body>a1b2c3d4e5f60789@acme.com</body></html>",
        ))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server, "acme.com", dir.path());
    let summary = engine
        .run(vec![company("Acme", Some("acme.com"))])
        .await
        .unwrap();

    let result = &summary.results[0];
    assert!(!result.success);
    assert!(result.emails.is_empty());
    assert_eq!(result.discovery_method.as_str(), "not_found");
}

#[tokio::test]
async fn test_early_exit_skips_remaining_candidates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html><body>contact@acme.com</body></html>"))
        .mount(&server)
        .await;
    // The main page succeeds, so no contact-page candidate may be fetched.
    Mock::given(method("GET"))
        .and(path("/contact"))
        .respond_with(html("<html><body>direction@acme.com</body></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server, "acme.com", dir.path());
    let summary = engine
        .run(vec![company("Acme", Some("acme.com"))])
        .await
        .unwrap();

    assert_eq!(summary.results[0].emails, vec!["contact@acme.com"]);
    server.verify().await;
}

#[tokio::test]
async fn test_missing_website_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server, "acme.com", dir.path());
    let summary = engine
        .run(vec![
            company("NoSite", Some("")),
            company("NullSite", None),
        ])
        .await
        .unwrap();

    assert_eq!(summary.total_processed, 2);
    for result in &summary.results {
        assert_eq!(result.discovery_method.as_str(), "no_domain");
        assert!(result.pages_accessed.is_empty());
    }
    server.verify().await;
}

#[tokio::test]
async fn test_resume_skips_processed_companies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html><body>contact@acme.com</body></html>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let companies = vec![
        company("Acme", Some("acme.com")),
        company("NoSite", None),
    ];

    let engine = engine_for(&server, "acme.com", dir.path());
    let first = engine.run(companies.clone()).await.unwrap();
    assert_eq!(first.total_processed, 2);
    assert_eq!(first.total_emails, 1);

    // Second run with resume: everything is already in the checkpoint.
    let fetcher = Fetcher::new().unwrap().with_rewrite("acme.com", &server.uri());
    let config = EngineConfig {
        resume: true,
        ..test_config(dir.path())
    };
    let engine = Engine::new(config).unwrap().with_fetcher(fetcher);
    let second = engine.run(companies).await.unwrap();

    assert_eq!(second.total_processed, 0);
    // Cumulative email count carries over from the first run's checkpoint.
    assert_eq!(second.total_emails, 1);

    // Checkpointed results ride along so reports after a restart still
    // cover companies processed before it.
    assert!(second
        .prior_results
        .iter()
        .any(|r| r.company_name == "Acme" && r.emails == vec!["contact@acme.com"]));

    let rows = vec![json!({"name": "Acme", "website": "acme.com"})];
    let mut all_results = second.prior_results.clone();
    all_results.extend(second.results.clone());
    let merged = merge_into_records(&rows, &all_results);
    assert_eq!(merged[0]["emails_found"], "contact@acme.com");
    assert_eq!(merged[0]["success"], true);
}

#[tokio::test]
async fn test_sitemap_fallback_end_to_end() {
    let server = MockServer::start().await;

    // Every planned page is empty; only a sitemap-discovered page has the
    // address.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html><body>rien ici</body></html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nSitemap: https://acme.com/sitemap.xml\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    "<urlset><url><loc>https://acme.com/nous-joindre</loc></url></urlset>",
                )
                .insert_header("content-type", "application/xml"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nous-joindre"))
        .respond_with(html("<html><body>accueil@acme.com</body></html>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_for(&server, "acme.com", dir.path());
    let summary = engine
        .run(vec![company("Acme", Some("acme.com"))])
        .await
        .unwrap();

    let result = &summary.results[0];
    assert_eq!(result.emails, vec!["accueil@acme.com"]);
    assert_eq!(result.discovery_method.as_str(), "sitemap");
    assert!(result
        .pages_accessed
        .iter()
        .any(|p| p.ends_with("/nous-joindre")));
}

#[tokio::test]
async fn test_wall_clock_budget_stops_dispatch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            html("<html><body>contact@acme.com</body></html>")
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        output_dir: dir.path().to_path_buf(),
        workers: 1,
        // 360 ms: enough for the first company, never for all five.
        max_hours: Some(0.0001),
        ..Default::default()
    };
    let fetcher = Fetcher::new().unwrap().with_rewrite("acme.com", &server.uri());
    let engine = Engine::new(config).unwrap().with_fetcher(fetcher);

    let companies: Vec<CompanyRecord> = (0..5)
        .map(|i| company(&format!("Acme {}", i), Some("acme.com")))
        .collect();
    let summary = engine.run(companies).await.unwrap();

    // Dispatch stopped at the budget, in-flight work drained, and what
    // completed was still flushed to a checkpoint.
    assert!(summary.total_processed >= 1);
    assert!(summary.total_processed < 5);
    assert_eq!(summary.results.len(), summary.total_processed);

    let checkpoints = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("progress_batch_")
        })
        .count();
    assert_eq!(checkpoints, 1);
}

#[tokio::test]
async fn test_concurrency_stays_within_worker_bound() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        output_dir: dir.path().to_path_buf(),
        workers: 50,
        ..Default::default()
    };
    let engine = Engine::new(config).unwrap();

    let companies: Vec<CompanyRecord> = (0..1000)
        .map(|i| company(&format!("Company {}", i), None))
        .collect();
    let summary = engine.run(companies).await.unwrap();

    assert_eq!(summary.total_processed, 1000);
    assert!(summary.peak_concurrency <= 50);
}
