use anyhow::Result;
use async_trait::async_trait;

use index::QueryBundle;

/// Rewrites a query before it reaches retrieval
#[async_trait]
pub trait QueryTransform: Send + Sync {
    async fn transform(&self, query_bundle: QueryBundle) -> Result<QueryBundle>;

    async fn run(&self, query_str: &str) -> Result<QueryBundle> {
        self.transform(QueryBundle::new(query_str)).await
    }
}

pub struct IdentityQueryTransform;

#[async_trait]
impl QueryTransform for IdentityQueryTransform {
    async fn transform(&self, query_bundle: QueryBundle) -> Result<QueryBundle> {
        Ok(query_bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identity_keeps_bundle() {
        let bundle = QueryBundle::with_embedding_strs("q", vec!["e".to_string()]);
        let out = IdentityQueryTransform.transform(bundle.clone()).await.unwrap();
        assert_eq!(out, bundle);

        assert_eq!(IdentityQueryTransform.run("plain").await.unwrap(), QueryBundle::new("plain"));
    }
}
