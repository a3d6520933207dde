//! Namespace mapping from organization IDs

use std::sync::Arc;

/// Pure function deriving a storage namespace from an organization ID
pub type NamespaceMapper = Arc<dyn Fn(i64) -> String + Send + Sync>;

/// Default on-prem mapping: org 1 lives in `default`, others in `org-<id>`
pub fn org_namespace(org_id: i64) -> String {
    if org_id == 1 {
        "default".to_string()
    } else {
        format!("org-{}", org_id)
    }
}

/// Mapper for the deployment: every org shares the stack namespace when a
/// stack ID is configured
pub fn namespace_mapper(stack_id: Option<&str>) -> NamespaceMapper {
    match stack_id.filter(|s| !s.is_empty()) {
        Some(stack) => {
            let namespace = format!("stacks-{}", stack);
            Arc::new(move |_| namespace.clone())
        }
        None => Arc::new(org_namespace),
    }
}
