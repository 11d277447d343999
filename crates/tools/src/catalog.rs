//! Static sample data standing in for the product and order databases.

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub price: f64,
    pub stock: u32,
    /// Free-form spec sheet (color, storage, chip, ...).
    pub specs: &'static [(&'static str, &'static str)],
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub order_id: &'static str,
    pub status: &'static str,
    pub product: &'static str,
    pub quantity: u32,
    pub total_amount: f64,
    pub create_time: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_time: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_no: Option<&'static str>,
    pub address: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingEvent {
    pub time: &'static str,
    pub location: &'static str,
    pub status: &'static str,
}

pub const PRODUCTS: &[Product] = &[
    Product {
        id: "30001",
        name: "iPhone 15 Pro Max",
        price: 9999.00,
        stock: 128,
        specs: &[("color", "Natural Titanium"), ("storage", "256GB")],
        description: "A17 Pro chip, titanium design, Action button",
    },
    Product {
        id: "30002",
        name: "MacBook Pro 16\"",
        price: 19999.00,
        stock: 45,
        specs: &[("chip", "M3 Max"), ("memory", "32GB"), ("storage", "1TB SSD")],
        description: "Pro performance for creators",
    },
    Product {
        id: "30003",
        name: "AirPods Pro 2",
        price: 1999.00,
        stock: 320,
        specs: &[("features", "Active noise cancellation, adaptive audio, spatial audio")],
        description: "Next-generation noise-cancelling earbuds",
    },
];

pub const ORDERS: &[Order] = &[
    Order {
        order_id: "20240101001",
        status: "shipped",
        product: "iPhone 15 Pro Max",
        quantity: 1,
        total_amount: 9999.00,
        create_time: "2024-01-01 10:30:00",
        ship_time: Some("2024-01-01 15:00:00"),
        tracking_no: Some("SF1234567890"),
        address: "No. 1 Example Road, Chaoyang District, Beijing",
    },
    Order {
        order_id: "20240101002",
        status: "awaiting shipment",
        product: "AirPods Pro 2",
        quantity: 2,
        total_amount: 3998.00,
        create_time: "2024-01-02 14:20:00",
        ship_time: None,
        tracking_no: None,
        address: "No. 2 Example Road, Pudong New Area, Shanghai",
    },
];

pub const CARRIER: &str = "SF Express";
pub const DEFAULT_TRACKING_NO: &str = "SF1234567890";
pub const DEFAULT_REGION: &str = "Beijing";

pub const TRACKING_EVENTS: &[TrackingEvent] = &[
    TrackingEvent {
        time: "2024-01-02 08:00:00",
        location: "Beijing sorting center",
        status: "delivered",
    },
    TrackingEvent {
        time: "2024-01-01 20:30:00",
        location: "Beijing transit hub",
        status: "in transit",
    },
    TrackingEvent {
        time: "2024-01-01 15:00:00",
        location: "Beijing warehouse",
        status: "shipped",
    },
];

pub fn product(id: &str) -> Option<&'static Product> {
    PRODUCTS.iter().find(|p| p.id == id)
}

pub fn order(id: &str) -> Option<&'static Order> {
    ORDERS.iter().find(|o| o.order_id == id)
}
