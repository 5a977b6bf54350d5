use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates supported `EngineError` values.
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("channel identity is already linked to worker {0}")]
    AlreadyLinkedOther(i64),
    #[error("worker {0} is already linked to another channel identity")]
    TargetAlreadyLinked(i64),
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("no records in the requested window")]
    NoData,
    #[error("transport delivery failed: {0}")]
    TransportDeliveryFailure(String),
    #[error("could not parse value: {0}")]
    ParseFailure(String),
    #[error("worker {0} has no linked channel identity")]
    Unlinked(i64),
    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Stable machine-readable code used in admin responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyLinkedOther(_) => "already_linked_other",
            EngineError::TargetAlreadyLinked(_) => "target_already_linked",
            EngineError::InvalidRange(_) => "invalid_range",
            EngineError::NoData => "no_data",
            EngineError::TransportDeliveryFailure(_) => "transport_delivery_failure",
            EngineError::ParseFailure(_) => "parse_failure",
            EngineError::Unlinked(_) => "unlinked",
            EngineError::Store(_) => "store_error",
        }
    }

    pub fn worker_not_found(worker_id: i64) -> Self {
        EngineError::NotFound(format!("worker {worker_id}"))
    }

    pub fn record_not_found(record_id: i64) -> Self {
        EngineError::NotFound(format!("hours record {record_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_error_codes_are_stable() {
        assert_eq!(EngineError::worker_not_found(42).code(), "not_found");
        assert_eq!(EngineError::NoData.code(), "no_data");
        assert_eq!(
            EngineError::InvalidRange("start after end".to_string()).code(),
            "invalid_range"
        );
        assert_eq!(
            EngineError::worker_not_found(42).to_string(),
            "not found: worker 42"
        );
    }
}
