//! Resolution of dotted plugin references from configuration
//! (`plugins: [dotted.reference, ...]`) against a compile-time table —
//! the "narrow, documented dynamic-loading boundary" SPEC_FULL.md §4.6
//! calls for in place of `importlib`-style reflection. No plugins ship
//! with this crate beyond the built-in logging passthrough; a project
//! embedding `cdcflow-providers` extends `resolve_plugin` to add its own.

use std::sync::Arc;

use async_trait::async_trait;
use cdcflow_core::plugin::{Plugin, PluginChain, PluginSlot};
use cdcflow_core::CoreError;
use cdcflow_domain::Event;

use crate::error::ProviderError;

/// Logs `pre_event`/`post_event` at debug level, mirroring
/// `original_source/meilisync/plugin.py`'s base `Plugin` class (which is
/// itself a no-op transform used mainly for its logging side effect).
pub struct LoggingPlugin;

#[async_trait]
impl Plugin for LoggingPlugin {
    async fn pre_event(&self, event: Event) -> Result<Event, CoreError> {
        tracing::debug!(table = %event.table, event_type = ?event.event_type, "pre_event");
        Ok(event)
    }

    async fn post_event(&self, event: Event) -> Result<Event, CoreError> {
        tracing::debug!(table = %event.table, event_type = ?event.event_type, "post_event");
        Ok(event)
    }
}

/// Resolves one dotted reference to a chain slot. `is_global` in the
/// original Python model becomes the construction choice baked into each
/// arm here.
fn resolve_plugin(name: &str) -> Result<PluginSlot, ProviderError> {
    match name {
        "cdcflow.plugins.logging" => Ok(PluginSlot::Global(Arc::new(LoggingPlugin) as Arc<dyn Plugin>)),
        other => Err(ProviderError::UnknownPlugin(other.to_string())),
    }
}

/// Resolves an ordered list of dotted references into a `PluginChain`.
pub fn build_chain(names: &[String]) -> Result<PluginChain, ProviderError> {
    let slots = names.iter().map(|n| resolve_plugin(n)).collect::<Result<Vec<_>, _>>()?;
    Ok(PluginChain::new(slots))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_plugin_name_is_rejected() {
        let err = resolve_plugin("not.a.real.plugin").unwrap_err();
        assert!(matches!(err, ProviderError::UnknownPlugin(n) if n == "not.a.real.plugin"));
    }

    #[test]
    fn builtin_logging_plugin_resolves() {
        let chain = build_chain(&["cdcflow.plugins.logging".to_string()]).unwrap();
        assert!(!chain.is_empty());
    }

    #[test]
    fn empty_plugin_list_builds_empty_chain() {
        let chain = build_chain(&[]).unwrap();
        assert!(chain.is_empty());
    }
}
