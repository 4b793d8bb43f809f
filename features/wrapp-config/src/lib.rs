//! Wrapp Config reads the settings a module carries in its symbolic name header.
//!
//! A module declares itself with a header such as
//! `com.acme.orders; version=1.2; timeout-milliseconds:=5000; wait-for-dependencies:=false`.
//! The name comes first, `name=value` pairs are attributes and `name:=value` pairs are directives.
//!
//! Wrapp Config is split into two parts:
//! 1. Directives: parsing a header into [`directives::PathElement`]s
//! 2. Config: turning the directives of the first element into a [`config::ContainerConfig`]
//!
//! # Examples
//!
//! ```rust
//! use wrapp_config::{config::ContainerConfig, directives::parse_header};
//!
//! let elements = parse_header("com.acme.orders; timeout-milliseconds:=250").unwrap();
//! assert_eq!(elements[0].directive("timeout-milliseconds"), Some("250"));
//!
//! let config = ContainerConfig::from_element(&elements[0]).unwrap();
//! assert_eq!(config.timeout.as_millis(), 250);
//! assert!(config.wait_for_dependencies);
//! ```

pub mod config;
pub mod directives;
pub mod errors;

pub use config::ContainerConfig;
pub use errors::{ConfigError, HeaderError};
