//! AWS upstream handling
//!
//! Adapter between upstreams and the Lambda poller. The poller itself never
//! sees an [`Upstream`]; these conversions keep it that way.

use super::{AccessToken, Lambda, Poller, Region, RegionUpdater};
use crate::discovery::{Discovery, Outcome};
use crate::error::DiscoveryError;
use crate::model::{Function, Upstream, UpstreamKey, UPSTREAM_TYPE_AWS};
use crate::store::UpstreamStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Spec field holding the AWS region name
pub const SPEC_REGION: &str = "region";
/// Function spec field holding the Lambda name
pub const FUNCTION_NAME: &str = "function_name";
/// Function spec field holding the Lambda qualifier
pub const FUNCTION_QUALIFIER: &str = "qualifier";

/// Registers `aws` upstreams with the poller and releases them on deletion
pub struct AwsDiscovery {
    poller: Arc<Poller>,
    token: AccessToken,
}

impl AwsDiscovery {
    pub fn new(poller: Arc<Poller>, token: AccessToken) -> Self {
        Self { poller, token }
    }
}

#[async_trait]
impl Discovery for AwsDiscovery {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn supports(&self, upstream: &Upstream) -> bool {
        upstream.upstream_type == UPSTREAM_TYPE_AWS
    }

    async fn discover(&self, upstream: &Upstream) -> Result<Outcome, DiscoveryError> {
        let region = to_region(upstream, &self.token)
            .map_err(|e| DiscoveryError::fetch(upstream.key(), e))?;
        self.poller.add_update_region(region).await;
        Ok(Outcome::Unchanged)
    }

    async fn release(&self, key: &UpstreamKey) {
        self.poller.remove_region(&key.to_string()).await;
    }
}

/// Writes a region's Lambdas back into its upstream
pub struct StoreRegionUpdater {
    store: Arc<dyn UpstreamStore>,
}

impl StoreRegionUpdater {
    pub fn new(store: Arc<dyn UpstreamStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RegionUpdater for StoreRegionUpdater {
    async fn update(&self, region: &Region) -> Result<()> {
        let key: UpstreamKey = region.id.parse()?;
        let upstream = self
            .store
            .get(&key)
            .await
            .with_context(|| format!("Unable to update upstream {}", key))?;

        let Some(mut upstream) = upstream else {
            tracing::info!("Upstream {} not found, will not update", key);
            return Ok(());
        };

        upstream.functions = to_functions(&region.lambdas);
        tracing::info!("Updating upstream {} with {} lambdas", key, region.lambdas.len());
        self.store.update(&upstream).await?;
        Ok(())
    }
}

pub fn to_region(upstream: &Upstream, token: &AccessToken) -> Result<Region> {
    let name = upstream
        .spec_str(SPEC_REGION)
        .ok_or_else(|| anyhow!("upstream {} has no spec.{}", upstream.key(), SPEC_REGION))?;

    Ok(Region {
        id: upstream.key().to_string(),
        name: name.to_string(),
        token: token.clone(),
        lambdas: to_lambdas(&upstream.functions),
    })
}

/// Functions lacking a name or qualifier are ignored
pub fn to_lambdas(functions: &[Function]) -> Vec<Lambda> {
    functions
        .iter()
        .filter_map(|f| {
            let name = f.spec.get(FUNCTION_NAME)?.as_str()?;
            let qualifier = f.spec.get(FUNCTION_QUALIFIER)?.as_str()?;
            Some(Lambda::new(name, qualifier))
        })
        .collect()
}

pub fn to_functions(lambdas: &[Lambda]) -> Vec<Function> {
    lambdas
        .iter()
        .map(|l| {
            Function::new(l.to_string())
                .with_spec(FUNCTION_NAME, l.name.as_str())
                .with_spec(FUNCTION_QUALIFIER, l.qualifier.as_str())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::LambdaFetcher;
    use crate::store::MemoryStore;

    struct NoLambdas;

    #[async_trait]
    impl LambdaFetcher for NoLambdas {
        async fn fetch(&self, _region: &str, _token: &AccessToken) -> Result<Vec<Lambda>> {
            Ok(vec![])
        }
    }

    fn aws_upstream() -> Upstream {
        Upstream::new("default", "lambdas", UPSTREAM_TYPE_AWS)
            .with_spec(SPEC_REGION, "us-east-1")
            .with_functions(to_functions(&[Lambda::new("foo", "v1")]))
    }

    #[test]
    fn test_function_names_use_name_and_qualifier() {
        let functions = to_functions(&[Lambda::new("foo", "$LATEST")]);
        assert_eq!(functions[0].name, "foo:$LATEST");
        assert_eq!(to_lambdas(&functions), vec![Lambda::new("foo", "$LATEST")]);
    }

    #[test]
    fn test_functions_without_lambda_spec_are_ignored() {
        let functions = vec![Function::new("stray"), Function::new("half").with_spec(FUNCTION_NAME, "half")];
        assert!(to_lambdas(&functions).is_empty());
    }

    #[test]
    fn test_to_region_requires_region_name() {
        let us = Upstream::new("default", "lambdas", UPSTREAM_TYPE_AWS);
        assert!(to_region(&us, &AccessToken::default()).is_err());

        let region = to_region(&aws_upstream(), &AccessToken::default()).unwrap();
        assert_eq!(region.id, "default/lambdas");
        assert_eq!(region.name, "us-east-1");
        assert_eq!(region.lambdas, vec![Lambda::new("foo", "v1")]);
    }

    #[tokio::test]
    async fn test_discover_registers_and_release_removes_region() {
        let store = Arc::new(MemoryStore::new());
        let poller = Arc::new(Poller::new(
            Arc::new(NoLambdas),
            Arc::new(StoreRegionUpdater::new(store)),
        ));
        let strategy = AwsDiscovery::new(Arc::clone(&poller), AccessToken::default());

        let outcome = strategy.discover(&aws_upstream()).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(poller.region_count().await, 1);

        strategy.release(&UpstreamKey::new("default", "lambdas")).await;
        assert_eq!(poller.region_count().await, 0);
    }

    #[tokio::test]
    async fn test_updater_writes_functions_into_upstream() {
        let store = MemoryStore::new();
        store.create(aws_upstream()).await.unwrap();
        let updater = StoreRegionUpdater::new(Arc::new(store.clone()));

        let mut region = to_region(&aws_upstream(), &AccessToken::default()).unwrap();
        region.lambdas.push(Lambda::new("bar", "v2"));
        updater.update(&region).await.unwrap();

        let stored = store
            .get(&UpstreamKey::new("default", "lambdas"))
            .await
            .unwrap()
            .unwrap();
        let names: Vec<_> = stored.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["foo:v1", "bar:v2"]);
    }

    #[tokio::test]
    async fn test_updater_ignores_deleted_upstream() {
        let updater = StoreRegionUpdater::new(Arc::new(MemoryStore::new()));
        let region = to_region(&aws_upstream(), &AccessToken::default()).unwrap();
        assert!(updater.update(&region).await.is_ok());
    }
}
