//! Service configuration.
//!
//! [`ServiceConfig`] is plain data: build it with [`ServiceConfigBuilder`] or
//! deserialize it from JSON. Missing JSON fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::error::CrmResult;

/// Default number of records per page when a query does not say.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
/// Default system-wide cap on records per page.
pub const MAX_PAGE_SIZE: usize = 5000;

/// Tunables of the organization service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Records per page when a query gives no page size.
    pub default_page_size: usize,
    /// Upper bound on any page or row cap.
    pub max_page_size: usize,
    /// Stamp `<type>id`, `createdon`, `modifiedon`, `ownerid` and `statecode`.
    pub auto_attributes: bool,
    /// Reject queries referencing attributes no stored record of the type holds.
    pub validate_attributes: bool,
}

impl ServiceConfig {
    /// Creates a new builder starting from the defaults.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::new()
    }

    /// Parses a configuration from JSON.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = ServiceConfig::from_json(r#"{ "default_page_size": 50 }"#)?;
    /// assert_eq!(config.max_page_size, 5000);
    /// ```
    pub fn from_json(text: &str) -> CrmResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Effective page size for a requested count (zero selects the default).
    pub fn page_size(&self, requested: usize) -> usize {
        let size = if requested == 0 {
            self.default_page_size
        } else {
            requested
        };

        size.min(self.max_page_size).max(1)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            auto_attributes: true,
            validate_attributes: true,
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    /// Creates a builder starting from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default page size.
    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.config.default_page_size = size;
        self
    }

    /// Sets the maximum page size.
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.config.max_page_size = size;
        self
    }

    /// Enables or disables automatic attributes.
    pub fn with_auto_attributes(mut self, enabled: bool) -> Self {
        self.config.auto_attributes = enabled;
        self
    }

    /// Enables or disables attribute validation of queries.
    pub fn with_attribute_validation(mut self, enabled: bool) -> Self {
        self.config.validate_attributes = enabled;
        self
    }

    /// Builds and returns the configuration.
    pub fn build(self) -> ServiceConfig {
        self.config
    }
}
