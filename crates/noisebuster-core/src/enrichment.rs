//! Ambient conditions attached to noise events
//!
//! The sampling loop asks an [`EnrichmentProvider`] for the current weather
//! every time a window's peak is raised, so the conditions stored with an
//! event describe the loudest moment rather than the window boundary.

use serde::Serialize;
use thiserror::Error;

/// Errors raised by enrichment lookups
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("Enrichment unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed enrichment response: {0}")]
    Malformed(String),
}

/// Weather snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Conditions {
    /// Temperature in °C
    pub temperature: Option<f64>,
    /// Short description, e.g. "light rain"
    pub description: Option<String>,
    /// Rain plus snow over the last hour, in mm
    pub precipitation: f64,
}

/// Source of ambient conditions
pub trait EnrichmentProvider: Send {
    fn fetch(&mut self) -> Result<Conditions, EnrichmentError>;
}

/// Provider used when enrichment is disabled; always empty conditions
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

impl EnrichmentProvider for NoEnrichment {
    fn fetch(&mut self) -> Result<Conditions, EnrichmentError> {
        Ok(Conditions::default())
    }
}

impl<P: EnrichmentProvider + ?Sized> EnrichmentProvider for Box<P> {
    fn fetch(&mut self) -> Result<Conditions, EnrichmentError> {
        (**self).fetch()
    }
}

/// Fetch conditions, degrading any failure to empty conditions
pub fn fetch_or_default(provider: &mut dyn EnrichmentProvider) -> Conditions {
    match provider.fetch() {
        Ok(conditions) => conditions,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to get weather data, continuing without it");
            Conditions::default()
        }
    }
}
