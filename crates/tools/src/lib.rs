//! Built-in commerce tools for the assistant worker.
//!
//! Tools: product detail, order detail, shipping tracking, product
//! availability. All of them read the static sample catalog in [`catalog`].

pub mod catalog;
pub mod commerce;

use std::sync::Arc;

use {
    supportbot_agents::{RegistryError, ToolRegistry},
    tracing::info,
};

/// Register every built-in tool.
pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(commerce::ProductDetailTool))?;
    registry.register(Arc::new(commerce::OrderDetailTool))?;
    registry.register(Arc::new(commerce::ShippingTrackingTool))?;
    registry.register(Arc::new(commerce::ProductAvailabilityTool))?;
    info!(count = registry.len(), "built-in tools registered");
    Ok(())
}

/// A registry holding only the built-in tools.
pub fn builtin_registry() -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_four_tools_in_name_order() {
        let registry = builtin_registry().unwrap();
        let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec![
            "get_order_detail",
            "get_product_availability",
            "get_product_detail",
            "get_shipping_tracking",
        ]);
    }

    #[test]
    fn registering_twice_fails() {
        let mut registry = builtin_registry().unwrap();
        assert!(register_builtin_tools(&mut registry).is_err());
    }
}
