//! Uniform error taxonomy shared across the graph, replication pipeline and
//! shard router. Mirrors the cross-cluster error kinds rather than growing a
//! class hierarchy: everything the core can fail with is one flat enum.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("invalid argument '{parameter}': {message}")]
    InvalidArgument { parameter: String, message: String },

    #[error("{resource} '{id}' not found")]
    NotFound { resource: &'static str, id: String },

    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("adding group edge '{from}' -> '{to}' would create a cycle")]
    WouldCreateCycle { from: String, to: String },

    #[error("event cache is empty")]
    CacheEmpty,

    #[error("event '{prior_event_id}' is not in the cache")]
    EventNotCached { prior_event_id: Uuid },

    #[error("persistent storage is empty")]
    PersistentStorageEmpty,

    #[error("reader refresh failed")]
    ReaderRefreshFailed { #[source] source: Box<AccessError> },

    #[error("service unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AccessError>;

impl AccessError {
    pub fn invalid_argument(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        AccessError::InvalidArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        AccessError::NotFound { resource, id: id.into() }
    }

    pub fn already_exists(kind: &'static str, id: impl Into<String>) -> Self {
        AccessError::AlreadyExists { kind, id: id.into() }
    }

    /// Stable short code used on the wire (`WireError::code`) and as the key
    /// into the HTTP/gRPC status mapping table maintained by the external
    /// REST/gRPC façade.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::InvalidArgument { .. } => "InvalidArgument",
            AccessError::NotFound { .. } => "NotFound",
            AccessError::AlreadyExists { .. } => "AlreadyExists",
            AccessError::WouldCreateCycle { .. } => "WouldCreateCycle",
            AccessError::CacheEmpty => "CacheEmpty",
            AccessError::EventNotCached { .. } => "EventNotCached",
            AccessError::PersistentStorageEmpty => "PersistentStorageEmpty",
            AccessError::ReaderRefreshFailed { .. } => "ReaderRefreshFailed",
            AccessError::ServiceUnavailable { .. } => "ServiceUnavailable",
            AccessError::Internal(_) => "Internal",
        }
    }

    /// True for the transport-level faults the exception handling policy in
    /// spec.md §5/§7 says are worth retrying. Domain errors are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccessError::ServiceUnavailable { .. } | AccessError::EventNotCached { .. })
    }

    /// Convert to the wire envelope `{code, message, target, attributes, innerError}`
    /// from spec.md §6/§7, truncating the `innerError` chain at `max_inner_depth`
    /// (`None` means unbounded, the default).
    pub fn to_wire(&self, max_inner_depth: Option<usize>) -> WireError {
        self.to_wire_at_depth(max_inner_depth, 0)
    }

    fn to_wire_at_depth(&self, max_depth: Option<usize>, depth: usize) -> WireError {
        let mut attributes = Vec::new();
        let (target, inner) = match self {
            AccessError::InvalidArgument { parameter, .. } => {
                attributes.push(("parameter".to_string(), parameter.clone()));
                (Some(parameter.clone()), None)
            }
            AccessError::NotFound { resource, id } => {
                attributes.push(("resource".to_string(), resource.to_string()));
                attributes.push(("id".to_string(), id.clone()));
                (Some(id.clone()), None)
            }
            AccessError::AlreadyExists { kind, id } => {
                attributes.push(("kind".to_string(), kind.to_string()));
                attributes.push(("id".to_string(), id.clone()));
                (Some(id.clone()), None)
            }
            AccessError::WouldCreateCycle { from, to } => {
                attributes.push(("from".to_string(), from.clone()));
                attributes.push(("to".to_string(), to.clone()));
                (None, None)
            }
            AccessError::EventNotCached { prior_event_id } => {
                attributes.push(("priorEventId".to_string(), prior_event_id.to_string()));
                (None, None)
            }
            AccessError::ReaderRefreshFailed { source } => {
                let inner = if max_depth.map_or(true, |d| depth < d) {
                    Some(Box::new(source.to_wire_at_depth(max_depth, depth + 1)))
                } else {
                    None
                };
                (None, inner)
            }
            _ => (None, None),
        };
        WireError {
            code: self.code(),
            message: self.to_string(),
            target,
            attributes,
            inner,
        }
    }
}

/// Wire-shaped error, independent of any specific transport. The REST façade
/// serializes this directly as `{error: {...}}`; the gRPC façade packs it
/// into a status detail. Neither transport is implemented here.
#[derive(Debug, Clone, PartialEq)]
pub struct WireError {
    pub code: &'static str,
    pub message: String,
    pub target: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub inner: Option<Box<WireError>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_resource_and_id_as_attributes() {
        let err = AccessError::not_found("User", "alice");
        let wire = err.to_wire(None);
        assert_eq!(wire.code, "NotFound");
        assert!(wire.attributes.contains(&("resource".to_string(), "User".to_string())));
        assert!(wire.attributes.contains(&("id".to_string(), "alice".to_string())));
    }

    #[test]
    fn inner_chain_truncates_at_configured_depth() {
        let leaf = AccessError::CacheEmpty;
        let wrapped = AccessError::ReaderRefreshFailed { source: Box::new(leaf) };
        let wire = wrapped.to_wire(Some(0));
        assert!(wire.inner.is_none());

        let wire_unbounded = wrapped.to_wire(None);
        assert!(wire_unbounded.inner.is_some());
    }

    #[test]
    fn cache_empty_and_service_unavailable_are_not_equally_retryable() {
        assert!(!AccessError::CacheEmpty.is_retryable());
        assert!(AccessError::ServiceUnavailable { reason: "storage outage".into() }.is_retryable());
    }
}
