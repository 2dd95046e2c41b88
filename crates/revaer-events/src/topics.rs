//! Event topic identifiers used across transports.

/// Machine-friendly discriminator for SSE consumers.
#[must_use]
pub const fn event_kind(event: &crate::payloads::Event) -> &'static str {
    event.kind()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::Event;

    #[test]
    fn event_kind_matches_payload() {
        assert_eq!(event_kind(&Event::JobQueued { job_id: 1 }), "job_queued");
        assert_eq!(
            event_kind(&Event::HealthChanged {
                degraded: vec!["x".into()]
            }),
            "health_changed"
        );
    }
}
