use tokio::sync::mpsc;

/// Noteworthy things the engine did or refused to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    Calibrated {
        /// Heading offset applied to the raw device orientation (degrees).
        heading_offset: f32,
        /// Compass-to-world heading divergence, 0 when no compass was available.
        heading_divergence: f32,
    },
    HeadingDrift {
        relative: f32,
        absolute: f32,
        correction: f32,
        smoothed_drift: f32,
    },
    /// Tracked samples stopped arriving; running on dead reckoning only.
    TrackingStale { age_ms: f64 },
    /// Every sensor feed was dropped.
    FeedDisconnected,
    /// A sensor sample contained non-finite values and was (partly) ignored.
    RejectedInput { source: &'static str },
}

/// Receives engine diagnostics. Injected at construction instead of a global log hook.
pub trait DiagnosticsSink: Send {
    fn record(&mut self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn record(&mut self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::Calibrated {
                heading_offset,
                heading_divergence,
            } => tracing::info!(heading_offset, heading_divergence, "Heading calibrated"),
            Diagnostic::HeadingDrift {
                relative,
                absolute,
                correction,
                smoothed_drift,
            } => tracing::trace!(relative, absolute, correction, smoothed_drift, "Heading drift"),
            Diagnostic::TrackingStale { age_ms } => {
                tracing::warn!(age_ms, "Tracked samples are stale, dead reckoning only")
            }
            Diagnostic::FeedDisconnected => tracing::warn!("All sensor feeds dropped"),
            Diagnostic::RejectedInput { source } => {
                tracing::debug!(source, "Ignoring non-finite sensor input")
            }
        }
    }
}

impl DiagnosticsSink for mpsc::UnboundedSender<Diagnostic> {
    fn record(&mut self, diagnostic: Diagnostic) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.send(diagnostic);
    }
}
