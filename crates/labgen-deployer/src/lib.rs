//! Backend translation and bundle generation for labgen.
//!
//! Provides:
//! - Translators for the single-host (docker compose) and cluster
//!   (docker swarm) backends
//! - Reverse-proxy, hostname mapping and deploy script rendering
//! - Bundle assembly per target unit and atomic bundle writes
//! - The concurrent [`Generator`]

pub mod bundle;
pub mod compose;
pub mod generator;
pub mod hosts;
pub mod overrides;
pub mod proxy;
pub mod script;
pub mod swarm;
pub mod volumes;
pub mod writer;

pub use bundle::{Bundle, BundleFile, Unit, assemble, build_bundles, translator_for};
pub use compose::SingleHostTranslator;
pub use generator::{GenerationReport, Generator, UnitReport, UnitStatus};
pub use hosts::HostnameMapping;
pub use proxy::{ProxyConfig, ProxyFragment, ProxyRenderer};
pub use script::DeployScript;
pub use swarm::ClusterTranslator;
pub use writer::{BundleWriter, FsBundleWriter};
