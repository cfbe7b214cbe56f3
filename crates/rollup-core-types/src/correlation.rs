//! Correlation types for request tracking
//!
//! A `RequestContext` is minted at every public engine operation and carried
//! into the job records it creates, so asynchronous chunk logs can be tied
//! back to the call that dispatched them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! correlation_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Fresh time-ordered id (UUIDv7)
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

correlation_id!(
    /// One public engine call
    RequestId
);

correlation_id!(
    /// Shared by every request that belongs to one asynchronous run
    TraceId
);

/// Correlation data threaded through one engine call
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub trace_id: Option<TraceId>,
    /// Calling surface, e.g. `ADMIN_PAGE` or `SCHEDULER`
    pub invocation: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    pub fn with_invocation(mut self, invocation: impl Into<String>) -> Self {
        self.invocation = Some(invocation.into());
        self
    }

    /// Invocation tag for log fields; empty when the caller gave none
    pub fn invocation_or_default(&self) -> &str {
        self.invocation.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_display_as_their_text() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_str());
        assert_ne!(TraceId::new(), TraceId::new());
    }

    #[test]
    fn test_context_defaults() {
        let ctx = RequestContext::new();
        assert!(!ctx.request_id.as_str().is_empty());
        assert!(ctx.trace_id.is_none());
        assert_eq!(ctx.invocation_or_default(), "");
    }

    #[test]
    fn test_context_carries_invocation_and_trace() {
        let trace = TraceId::from("trace-1".to_string());
        let ctx = RequestContext::new()
            .with_trace_id(trace.clone())
            .with_invocation("FULL_RECALC");
        assert_eq!(ctx.trace_id, Some(trace));
        assert_eq!(ctx.invocation_or_default(), "FULL_RECALC");
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = RequestId::from("req-42".to_string());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"req-42\"");
        let back: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
