//! Configuration loading, message ingress and wiring of the tool security stack.

pub mod bootstrap;
pub mod config;
pub mod ingress;

pub use bootstrap::{AppBuilder, resolve_config_path};
pub use config::Config;
pub use ingress::{IngressGate, IngressRejection};
