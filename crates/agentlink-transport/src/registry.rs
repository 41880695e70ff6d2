use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::connection::Connection;
use crate::connector::{Connector, PipeConnector, TcpConnector, PIPE_SCHEME, TCP_SCHEME};
use crate::error::{Result, TransportError};

/// Scheme-keyed table of connectors, populated at startup.
#[derive(Default, Clone)]
pub struct TransportRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl TransportRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `namedpipe` and `tcp` connectors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PIPE_SCHEME, Arc::new(PipeConnector));
        registry.register(TCP_SCHEME, Arc::new(TcpConnector::default()));
        registry
    }

    /// Associate `scheme` with `connector`, returning any connector it replaces.
    ///
    /// Schemes are case-insensitive, matching URI parsing.
    pub fn register(
        &mut self,
        scheme: &str,
        connector: Arc<dyn Connector>,
    ) -> Option<Arc<dyn Connector>> {
        self.connectors
            .insert(scheme.to_ascii_lowercase(), connector)
    }

    /// Parse `uri` and open a connection with the matching connector.
    pub fn connect(&self, uri: &str) -> Result<Connection> {
        let parsed = Url::parse(uri).map_err(|err| TransportError::InvalidUri {
            uri: uri.to_string(),
            reason: err.to_string(),
        })?;
        let connector = self
            .connectors
            .get(parsed.scheme())
            .ok_or_else(|| TransportError::UnknownScheme(parsed.scheme().to_string()))?;

        debug!(scheme = parsed.scheme(), connector = connector.name(), "connecting");
        connector.connect(&parsed)
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.connectors.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Whether a connector is registered for `scheme`.
    pub fn contains(&self, scheme: &str) -> bool {
        self.connectors.contains_key(&scheme.to_ascii_lowercase())
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
