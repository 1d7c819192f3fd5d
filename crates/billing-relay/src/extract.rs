//! Ordered-Fallback Field Extraction
//!
//! Stripe puts the same fact in different places depending on the object
//! (checkout session, subscription, invoice) and on how much was expanded.
//! Every field is read through a declared list of dot paths; the first
//! non-empty value wins.

use serde_json::Value;

use crate::record::PeriodBound;
use crate::webhook::EventClass;

/// Customer email, in preference order
pub const EMAIL_PATHS: &[&str] = &[
    "customer_details.email",
    "customer_email",
    "email",
    "receipt_email",
    "charges.data.0.receipt_email",
    "charges.data.0.billing_details.email",
    "customer.email",
];

/// Customer display name, in preference order
pub const NAME_PATHS: &[&str] = &[
    "customer_details.name",
    "customer_name",
    "billing_details.name",
    "charges.data.0.billing_details.name",
    "customer.name",
    "shipping.name",
];

/// Stripe customer id; `customer` is either an id or an expanded object
pub const CUSTOMER_ID_PATHS: &[&str] = &["customer", "customer.id"];

/// Paths that differ by event object type
#[derive(Debug)]
pub struct ClassPaths {
    pub subscription_id: &'static [&'static str],
    pub price_id: &'static [&'static str],
    pub status: &'static [&'static str],
    pub period_start: &'static [&'static str],
    pub period_end: &'static [&'static str],
}

const CHECKOUT_PATHS: ClassPaths = ClassPaths {
    subscription_id: &["subscription", "subscription.id"],
    price_id: &[
        "subscription.items.data.0.price.id",
        "line_items.data.0.price.id",
        "metadata.price_id",
    ],
    // subscription status outranks the session's payment status
    status: &["subscription.status", "payment_status", "status"],
    period_start: &[
        "subscription.current_period_start",
        "subscription.items.data.0.current_period_start",
    ],
    period_end: &[
        "subscription.current_period_end",
        "subscription.items.data.0.current_period_end",
    ],
};

const SUBSCRIPTION_PATHS: ClassPaths = ClassPaths {
    subscription_id: &["id"],
    price_id: &["items.data.0.price.id", "plan.id"],
    status: &["status"],
    period_start: &["current_period_start", "items.data.0.current_period_start"],
    period_end: &["current_period_end", "items.data.0.current_period_end"],
};

const INVOICE_PATHS: ClassPaths = ClassPaths {
    subscription_id: &[
        "subscription",
        "subscription.id",
        "parent.subscription_details.subscription",
        "lines.data.0.subscription",
    ],
    price_id: &[
        "lines.data.0.price.id",
        "lines.data.0.pricing.price_details.price",
        "lines.data.0.plan.id",
    ],
    status: &["status"],
    period_start: &["lines.data.0.period.start", "period_start"],
    period_end: &["lines.data.0.period.end", "period_end"],
};

impl EventClass {
    /// Declared lookup paths for this object type
    pub fn paths(self) -> &'static ClassPaths {
        match self {
            EventClass::Checkout => &CHECKOUT_PATHS,
            EventClass::Subscription => &SUBSCRIPTION_PATHS,
            EventClass::Invoice => &INVOICE_PATHS,
        }
    }
}

/// Walk a dot path; numeric segments index into arrays
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// First path holding a non-blank string
pub fn first_text<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a str> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()))
}

/// First path holding epoch seconds or a non-blank date string
pub fn first_period(value: &Value, paths: &[&str]) -> Option<PeriodBound> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(|v| match v {
            Value::Number(n) => n.as_i64().map(PeriodBound::Epoch),
            Value::String(s) if !s.trim().is_empty() => Some(PeriodBound::Iso(s.trim().to_string())),
            _ => None,
        })
}

pub fn customer_email(object: &Value) -> Option<String> {
    first_text(object, EMAIL_PATHS).map(str::to_string)
}

pub fn customer_name(object: &Value) -> Option<String> {
    first_text(object, NAME_PATHS).map(str::to_string)
}

pub fn customer_id(object: &Value) -> Option<String> {
    first_text(object, CUSTOMER_ID_PATHS).map(str::to_string)
}

pub fn subscription_id(object: &Value, class: EventClass) -> Option<String> {
    first_text(object, class.paths().subscription_id).map(str::to_string)
}

pub fn price_id(object: &Value, class: EventClass) -> Option<String> {
    first_text(object, class.paths().price_id).map(str::to_string)
}

pub fn status(object: &Value, class: EventClass) -> Option<String> {
    first_text(object, class.paths().status).map(str::to_string)
}

pub fn period_start(object: &Value, class: EventClass) -> Option<PeriodBound> {
    first_period(object, class.paths().period_start)
}

pub fn period_end(object: &Value, class: EventClass) -> Option<PeriodBound> {
    first_period(object, class.paths().period_end)
}
