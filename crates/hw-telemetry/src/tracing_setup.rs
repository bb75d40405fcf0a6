use uuid::Uuid;

/// Generate an OpenTelemetry-compatible trace ID (32 hex characters).
pub fn generate_trace_id() -> String {
    // A UUID without hyphens is exactly 32 hex chars (128 bits).
    Uuid::new_v4().as_simple().to_string()
}

/// Generate a span ID (16 hex characters).
pub fn generate_span_id() -> String {
    Uuid::new_v4().as_simple().to_string()[..16].to_string()
}

/// Create the root span for one CLI command, returning the span and its
/// trace ID for logging correlation.
///
/// `session` is recorded when the command targets a single session.
pub fn create_operation_span(command: &str, session: Option<&str>) -> (tracing::Span, String) {
    let trace_id = generate_trace_id();
    let span_id = generate_span_id();
    let span = tracing::info_span!(
        "command",
        trace_id = %trace_id,
        span_id = %span_id,
        command = %command,
        session = tracing::field::Empty,
    );
    if let Some(session) = session {
        span.record("session", session);
    }
    (span, trace_id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
