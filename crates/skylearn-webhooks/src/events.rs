//! The fixed catalog of webhook event types.
//!
//! The catalog is extensible only by adding new names; existing names are
//! never redefined. Subscriptions may only register events drawn from it.

use serde::{Deserialize, Serialize};

/// An event type in the webhook catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PaymentSuccess,
    PaymentFailed,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCancelled,
    SubscriptionRenewed,
    EnrollmentCreated,
    EnrollmentUpdated,
    RefundProcessed,
    UserCreated,
    CoursePurchased,
}

impl EventType {
    /// All catalog entries.
    #[must_use]
    pub fn all() -> &'static [EventType] {
        &[
            EventType::PaymentSuccess,
            EventType::PaymentFailed,
            EventType::SubscriptionCreated,
            EventType::SubscriptionUpdated,
            EventType::SubscriptionCancelled,
            EventType::SubscriptionRenewed,
            EventType::EnrollmentCreated,
            EventType::EnrollmentUpdated,
            EventType::RefundProcessed,
            EventType::UserCreated,
            EventType::CoursePurchased,
        ]
    }

    /// The wire name for this event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PaymentSuccess => "payment_success",
            EventType::PaymentFailed => "payment_failed",
            EventType::SubscriptionCreated => "subscription_created",
            EventType::SubscriptionUpdated => "subscription_updated",
            EventType::SubscriptionCancelled => "subscription_cancelled",
            EventType::SubscriptionRenewed => "subscription_renewed",
            EventType::EnrollmentCreated => "enrollment_created",
            EventType::EnrollmentUpdated => "enrollment_updated",
            EventType::RefundProcessed => "refund_processed",
            EventType::UserCreated => "user_created",
            EventType::CoursePurchased => "course_purchased",
        }
    }

    /// Parse a wire name into a catalog entry.
    #[must_use]
    pub fn parse(s: &str) -> Option<EventType> {
        match s {
            "payment_success" => Some(EventType::PaymentSuccess),
            "payment_failed" => Some(EventType::PaymentFailed),
            "subscription_created" => Some(EventType::SubscriptionCreated),
            "subscription_updated" => Some(EventType::SubscriptionUpdated),
            "subscription_cancelled" => Some(EventType::SubscriptionCancelled),
            "subscription_renewed" => Some(EventType::SubscriptionRenewed),
            "enrollment_created" => Some(EventType::EnrollmentCreated),
            "enrollment_updated" => Some(EventType::EnrollmentUpdated),
            "refund_processed" => Some(EventType::RefundProcessed),
            "user_created" => Some(EventType::UserCreated),
            "course_purchased" => Some(EventType::CoursePurchased),
            _ => None,
        }
    }

    /// Human-readable description, for admin-facing listings.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            EventType::PaymentSuccess => "Payment completed successfully",
            EventType::PaymentFailed => "Payment failed",
            EventType::SubscriptionCreated => "New subscription created",
            EventType::SubscriptionUpdated => "Subscription updated",
            EventType::SubscriptionCancelled => "Subscription cancelled",
            EventType::SubscriptionRenewed => "Subscription renewed",
            EventType::EnrollmentCreated => "User enrolled in course",
            EventType::EnrollmentUpdated => "User enrollment updated",
            EventType::RefundProcessed => "Refund processed",
            EventType::UserCreated => "New user account created",
            EventType::CoursePurchased => "Course purchased",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
