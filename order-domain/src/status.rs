use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Forward-only order lifecycle. Transitions obey the partial order
/// `PendingShipment < Shipped < Delivered`; there is no back-edge and no
/// transition out of `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    PendingShipment,
    Shipped,
    Delivered,
}

impl OrderStatus {
    /// The exact label used on the wire and in the `status` column —
    /// `"Pending Shipment"` for the first state, bare enum names otherwise.
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::PendingShipment => "Pending Shipment",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
        }
    }

    /// `order.<label lowercased, spaces -> underscores>`, used as the
    /// derived eventType recorded against a status-change marker.
    pub fn derived_event_type(&self) -> String {
        format!("order.{}", self.label().to_lowercase().replace(' ', "_"))
    }

    /// Whether `self -> next` is a permitted transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::PendingShipment, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        OrderStatus::from_str(&raw).map_err(de::Error::custom)
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending Shipment" => Ok(OrderStatus::PendingShipment),
            "Shipped" => Ok(OrderStatus::Shipped),
            "Delivered" => Ok(OrderStatus::Delivered),
            other => Err(format!("unrecognized order status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_partial_order() {
        assert!(OrderStatus::PendingShipment.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::PendingShipment.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::PendingShipment));
    }

    #[test]
    fn derived_event_type_lowercases_and_strips_spaces() {
        assert_eq!(OrderStatus::Shipped.derived_event_type(), "order.shipped");
        assert_eq!(OrderStatus::Delivered.derived_event_type(), "order.delivered");
        assert_eq!(
            OrderStatus::PendingShipment.derived_event_type(),
            "order.pending_shipment"
        );
    }

    #[test]
    fn round_trips_through_label() {
        for status in [
            OrderStatus::PendingShipment,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            assert_eq!(OrderStatus::from_str(status.label()).unwrap(), status);
        }
    }
}
