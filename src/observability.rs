use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("chatterbox.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter =
    Counter::new("chatterbox.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("chatterbox.client.request_duration_seconds");

pub(crate) static SESSION_SUBMITS: Counter = Counter::new("chatterbox.session.submits");
pub(crate) static SESSION_REJECTED: Counter = Counter::new("chatterbox.session.rejected");
pub(crate) static SESSION_REPLIES: Counter = Counter::new("chatterbox.session.replies");
pub(crate) static SESSION_FAILURES: Counter = Counter::new("chatterbox.session.failures");
pub(crate) static SESSION_STALE_RESPONSES: Counter =
    Counter::new("chatterbox.session.stale_responses");
pub(crate) static SESSION_RESETS: Counter = Counter::new("chatterbox.session.resets");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&SESSION_SUBMITS);
    collector.register_counter(&SESSION_REJECTED);
    collector.register_counter(&SESSION_REPLIES);
    collector.register_counter(&SESSION_FAILURES);
    collector.register_counter(&SESSION_STALE_RESPONSES);
    collector.register_counter(&SESSION_RESETS);
}

#[cfg(test)]
mod tests {
    use biometrics::Sensor;

    use super::*;

    #[test]
    fn counters_click() {
        register_biometrics(Collector::new());
        let before = SESSION_RESETS.read();
        SESSION_RESETS.click();
        assert!(SESSION_RESETS.read() > before);
    }
}
