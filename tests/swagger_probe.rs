//! Swagger probing against mocked services
//!
//! Each test points a `service` upstream at a wiremock server (or at a port
//! nobody listens on) and checks the annotations, error handling and
//! skip-cache behaviour of the prober.

use function_discovery::discovery::{Discovery, Outcome, Registry, SwaggerDiscovery};
use function_discovery::model::{
    Upstream, ANNOTATION_SERVICE_TYPE, ANNOTATION_SWAGGER_URL, UPSTREAM_TYPE_SERVICE,
};
use function_discovery::resolver::SpecResolver;
use function_discovery::{DiscoveryError, TransientPolicy};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_upstream(port: u16) -> Upstream {
    Upstream::new("default", "petstore", UPSTREAM_TYPE_SERVICE)
        .with_spec("hosts", json!([{ "addr": "127.0.0.1", "port": port }]))
}

fn prober(candidates: &[&str], retries: u32, policy: TransientPolicy) -> SwaggerDiscovery {
    SwaggerDiscovery::new(
        reqwest::Client::new(),
        Arc::new(SpecResolver),
        candidates.iter().map(|s| s.to_string()).collect(),
        retries,
        policy,
    )
}

/// A local port with no listener
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    port
}

async fn mount_status(server: &MockServer, uri: &str, status: u16, hits: u64) {
    Mock::given(method("GET"))
        .and(path(uri))
        .respond_with(ResponseTemplate::new(status))
        .expect(hits)
        .mount(server)
        .await;
}

mod detection {
    use super::*;

    /// First default URI answering 200 wins and nothing after it is queried
    #[tokio::test]
    async fn test_swagger_json_annotates_and_stops() {
        let server = MockServer::start().await;
        mount_status(&server, "/swagger.json", 200, 1).await;
        mount_status(&server, "/swagger/docs/v1", 200, 0).await;
        mount_status(&server, "/swagger/docs/v2", 200, 0).await;
        mount_status(&server, "/v1/swagger", 200, 0).await;

        let port = server.address().port();
        let outcome = prober(&[], 0, TransientPolicy::RouteOnly)
            .discover(&service_upstream(port))
            .await
            .expect("probe should succeed");

        let Outcome::Updated(updated) = outcome else {
            panic!("expected the upstream to be annotated");
        };
        assert_eq!(updated.annotations[ANNOTATION_SERVICE_TYPE], "swagger");
        assert_eq!(
            updated.annotations[ANNOTATION_SWAGGER_URL],
            format!("http://127.0.0.1:{}/swagger.json", port)
        );
        assert!(updated.is_swagger());
    }

    #[tokio::test]
    async fn test_candidate_uris_are_tried_before_defaults() {
        let server = MockServer::start().await;
        mount_status(&server, "/api/openapi", 200, 1).await;
        mount_status(&server, "/swagger.json", 200, 0).await;

        let port = server.address().port();
        let outcome = prober(&["/api/openapi"], 0, TransientPolicy::RouteOnly)
            .discover(&service_upstream(port))
            .await
            .unwrap();

        let Outcome::Updated(updated) = outcome else {
            panic!("expected the upstream to be annotated");
        };
        assert!(updated.annotations[ANNOTATION_SWAGGER_URL].ends_with("/api/openapi"));
    }

    /// Every URI answered but none with 200: not swagger, not an error
    #[tokio::test]
    async fn test_no_200_means_not_swagger() {
        let server = MockServer::start().await;
        mount_status(&server, "/swagger.json", 404, 1).await;
        mount_status(&server, "/swagger/docs/v1", 500, 1).await;
        mount_status(&server, "/swagger/docs/v2", 401, 1).await;
        mount_status(&server, "/v1/swagger", 404, 1).await;

        let strategy = prober(&[], 0, TransientPolicy::RouteOnly);
        let upstream = service_upstream(server.address().port());
        let outcome = strategy.discover(&upstream).await.unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert!(strategy.skip_cache().is_empty());
    }

    #[tokio::test]
    async fn test_annotated_upstream_is_not_probed_again() {
        let server = MockServer::start().await;
        mount_status(&server, "/swagger.json", 200, 1).await;

        let strategy = Arc::new(prober(&[], 0, TransientPolicy::RouteOnly));
        let registry = Registry::new().with(strategy.clone());
        let upstream = service_upstream(server.address().port());

        let first = registry.dispatch(&upstream).await;
        let annotated = first.updated.expect("annotated on first pass");

        let second = registry.dispatch(&annotated).await;
        assert!(second.ran.is_empty());
        assert!(second.updated.is_none());
    }

    #[tokio::test]
    async fn test_upstream_without_address_is_not_applicable() {
        let strategy = prober(&[], 0, TransientPolicy::RouteOnly);
        let upstream = Upstream::new("default", "empty", UPSTREAM_TYPE_SERVICE)
            .with_spec("hosts", json!([]));

        assert_eq!(strategy.discover(&upstream).await.unwrap(), Outcome::Unchanged);
        assert!(strategy.skip_cache().is_empty());
    }
}

mod failures {
    use super::*;

    /// Connection refused is permanent under the default policy
    #[tokio::test]
    async fn test_refused_connection_is_skip_cached() {
        let strategy = Arc::new(prober(&[], 2, TransientPolicy::RouteOnly));
        let upstream = service_upstream(closed_port());

        let outcome = strategy.discover(&upstream).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert!(strategy.skip_cache().contains(&upstream.key()));
        assert!(strategy.is_skipped(&upstream));

        // Monotonic: later dispatches never run the strategy again
        let registry = Registry::new().with(strategy.clone());
        let dispatch = registry.dispatch(&upstream).await;
        assert!(dispatch.ran.is_empty());
        assert!(strategy.skip_cache().contains(&upstream.key()));
    }

    /// Under the network policy the same failure stays eligible
    #[tokio::test]
    async fn test_refused_connection_is_transient_under_network_policy() {
        let strategy = prober(&[], 1, TransientPolicy::Network);
        let upstream = service_upstream(closed_port());

        let err = strategy
            .discover(&upstream)
            .await
            .expect_err("transient failure should surface");

        assert!(matches!(err, DiscoveryError::Probe { .. }));
        assert!(err.is_transient(TransientPolicy::Network));
        assert!(!strategy.skip_cache().contains(&upstream.key()));
        assert!(!strategy.is_skipped(&upstream));
    }

    #[tokio::test]
    async fn test_resolve_error_is_skip_cached() {
        let strategy = prober(&[], 0, TransientPolicy::Network);
        let upstream = Upstream::new("default", "broken", UPSTREAM_TYPE_SERVICE)
            .with_spec("hosts", json!([{ "addr": "127.0.0.1" }]));

        let outcome = strategy.discover(&upstream).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert!(strategy.skip_cache().contains(&upstream.key()));
    }
}
