use {
    anyhow::Result,
    async_trait::async_trait,
    serde_json::{Map, Value, json},
    tracing::debug,
};

use supportbot_agents::AgentTool;

use crate::catalog::{self, Product};

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing '{key}' parameter"))
}

fn product_json(p: &Product) -> Value {
    let mut obj = Map::new();
    obj.insert("id".into(), json!(p.id));
    obj.insert("name".into(), json!(p.name));
    obj.insert("price".into(), json!(p.price));
    obj.insert("stock".into(), json!(p.stock));
    for (k, v) in p.specs {
        obj.insert((*k).into(), json!(v));
    }
    obj.insert("description".into(), json!(p.description));
    Value::Object(obj)
}

// ── Product detail ───────────────────────────────────────────────────────────

pub struct ProductDetailTool;

#[async_trait]
impl AgentTool for ProductDetailTool {
    fn name(&self) -> &str {
        "get_product_detail"
    }

    fn description(&self) -> &str {
        "Look up product details: name, price, specs and stock."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "product_id": {
                    "type": "string",
                    "description": "Product id, e.g. 30001, 30002, 30003"
                }
            },
            "required": ["product_id"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let id = str_param(&params, "product_id")?;
        debug!(product_id = id, "product lookup");
        Ok(match catalog::product(id) {
            Some(p) => product_json(p),
            None => json!({ "error": "product not found" }),
        })
    }
}

// ── Order detail ─────────────────────────────────────────────────────────────

pub struct OrderDetailTool;

#[async_trait]
impl AgentTool for OrderDetailTool {
    fn name(&self) -> &str {
        "get_order_detail"
    }

    fn description(&self) -> &str {
        "Look up an order: status, items, amount and shipping."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "order_id": {
                    "type": "string",
                    "description": "Order number, e.g. 20240101001"
                }
            },
            "required": ["order_id"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let id = str_param(&params, "order_id")?;
        debug!(order_id = id, "order lookup");
        match catalog::order(id) {
            Some(order) => Ok(serde_json::to_value(order)?),
            None => Ok(json!({ "error": "order not found" })),
        }
    }
}

// ── Shipping tracking ────────────────────────────────────────────────────────

pub struct ShippingTrackingTool;

#[async_trait]
impl AgentTool for ShippingTrackingTool {
    fn name(&self) -> &str {
        "get_shipping_tracking"
    }

    fn description(&self) -> &str {
        "Track an order's shipment: current location, progress and estimated delivery."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "order_id": {
                    "type": "string",
                    "description": "Order number"
                }
            },
            "required": ["order_id"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let id = str_param(&params, "order_id")?;
        let tracking_no = catalog::order(id)
            .and_then(|o| o.tracking_no)
            .unwrap_or(catalog::DEFAULT_TRACKING_NO);
        let estimated = (chrono::Local::now() + chrono::Duration::days(1))
            .format("%Y-%m-%d")
            .to_string();
        let latest = catalog::TRACKING_EVENTS.first();
        Ok(json!({
            "order_id": id,
            "tracking_no": tracking_no,
            "carrier": catalog::CARRIER,
            "current_location": latest.map(|e| e.location),
            "status": "in transit",
            "estimated_delivery": estimated,
            "tracking_info": catalog::TRACKING_EVENTS,
        }))
    }
}

// ── Product availability ─────────────────────────────────────────────────────

pub struct ProductAvailabilityTool;

#[async_trait]
impl AgentTool for ProductAvailabilityTool {
    fn name(&self) -> &str {
        "get_product_availability"
    }

    fn description(&self) -> &str {
        "Check product stock and delivery options for a region."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "product_id": {
                    "type": "string",
                    "description": "Product id"
                },
                "region": {
                    "type": "string",
                    "description": "Delivery region, e.g. Beijing, Shanghai, Guangzhou"
                }
            },
            "required": ["product_id"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let id = str_param(&params, "product_id")?;
        let region = params
            .get("region")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .unwrap_or(catalog::DEFAULT_REGION);
        let stock = catalog::product(id).map(|p| p.stock).unwrap_or(0);
        Ok(json!({
            "product_id": id,
            "stock": stock,
            "available": stock > 0,
            "region": region,
            "estimated_delivery": if stock > 0 { "tomorrow" } else { "unavailable" },
            "shipping_fee": 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[tokio::test]
    async fn product_detail_flattens_specs() {
        let v = ProductDetailTool
            .execute(json!({"product_id": "30002"}))
            .await
            .unwrap();
        assert_eq!(v["name"], "MacBook Pro 16\"");
        assert_eq!(v["chip"], "M3 Max");
        assert_eq!(v["stock"], 45);
    }

    #[rstest]
    #[case("get_product_detail", json!({"product_id": "99999"}), "product not found")]
    #[case("get_order_detail", json!({"order_id": "1"}), "order not found")]
    #[tokio::test]
    async fn unknown_ids_return_error_data(
        #[case] tool: &str,
        #[case] params: Value,
        #[case] message: &str,
    ) {
        let result = match tool {
            "get_product_detail" => ProductDetailTool.execute(params).await,
            _ => OrderDetailTool.execute(params).await,
        };
        assert_eq!(result.unwrap()["error"], message);
    }

    #[tokio::test]
    async fn order_detail_found() {
        let v = OrderDetailTool
            .execute(json!({"order_id": "20240101001"}))
            .await
            .unwrap();
        assert_eq!(v["status"], "shipped");
        assert_eq!(v["tracking_no"], "SF1234567890");
    }

    #[tokio::test]
    async fn pending_order_has_no_tracking_number() {
        let v = OrderDetailTool
            .execute(json!({"order_id": "20240101002"}))
            .await
            .unwrap();
        assert!(v.get("tracking_no").is_none());
    }

    #[tokio::test]
    async fn tracking_lists_events() {
        let v = ShippingTrackingTool
            .execute(json!({"order_id": "20240101001"}))
            .await
            .unwrap();
        assert_eq!(v["carrier"], "SF Express");
        assert_eq!(v["tracking_info"].as_array().unwrap().len(), 3);
        assert!(v["estimated_delivery"].as_str().is_some());
    }

    #[tokio::test]
    async fn availability_defaults_region() {
        let v = ProductAvailabilityTool
            .execute(json!({"product_id": "30001"}))
            .await
            .unwrap();
        assert_eq!(v["region"], "Beijing");
        assert_eq!(v["available"], true);

        let v = ProductAvailabilityTool
            .execute(json!({"product_id": "30003", "region": "Shanghai"}))
            .await
            .unwrap();
        assert_eq!(v["region"], "Shanghai");
    }

    #[tokio::test]
    async fn missing_parameter_is_an_error() {
        assert!(ProductDetailTool.execute(json!({})).await.is_err());
    }
}
