use serde::{Deserialize, Serialize};

use super::deployment::{Deployment, DeploymentStatus};

/// Uniform list filter. Filtering is applied first, pagination last.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub namespace: Option<String>,
    pub status: Option<DeploymentStatus>,
    /// 0 means unbounded.
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Filter {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_status(mut self, status: DeploymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Exact-match on namespace and status; unset criteria match everything.
    pub fn matches(&self, deployment: &Deployment) -> bool {
        let namespace_ok = self
            .namespace
            .as_deref()
            .map_or(true, |ns| ns.is_empty() || ns == deployment.namespace);
        let status_ok = self.status.map_or(true, |status| status == deployment.status);
        namespace_ok && status_ok
    }

    /// Offset past the end yields an empty page, never an error.
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        if self.offset >= items.len() {
            return Vec::new();
        }
        let iter = items.into_iter().skip(self.offset);
        if self.limit == 0 {
            iter.collect()
        } else {
            iter.take(self.limit).collect()
        }
    }

    pub fn apply(&self, deployments: Vec<Deployment>) -> Vec<Deployment> {
        let matching = deployments
            .into_iter()
            .filter(|d| self.matches(d))
            .collect::<Vec<_>>();
        self.paginate(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(limit: usize, offset: usize) -> Vec<i32> {
        Filter::default().page(limit, offset).paginate(vec![1, 2, 3, 4, 5])
    }

    #[test]
    fn test_pagination_rules() {
        assert_eq!(page(0, 0), vec![1, 2, 3, 4, 5]);
        assert_eq!(page(2, 0), vec![1, 2]);
        assert_eq!(page(10, 2), vec![3, 4, 5]);
        assert_eq!(page(2, 1), vec![2, 3]);
        assert!(page(10, 10).is_empty());
        assert!(page(0, 5).is_empty());
    }

    #[test]
    fn test_pagination_empty_input() {
        let empty: Vec<i32> = Vec::new();
        assert!(Filter::default().paginate(empty).is_empty());
    }
}
