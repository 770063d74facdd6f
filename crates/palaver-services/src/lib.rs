//! HTTP implementations of the services Palaver flows call out to
//!
//! [`HttpWebhookService`] dispatches `call_webhook` and `call_resthook`
//! requests. [`HttpClassificationService`] classifies input against an NLU
//! server. [`CatalogAirtimeService`] prices airtime transfers against a
//! provider's product catalog.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Webhook dispatch over reqwest
pub mod webhooks;

/// NLU classification over reqwest
pub mod classification;

/// Catalog priced airtime transfers
pub mod airtime;

/// Error types
pub mod error;

mod http;

pub use airtime::{AirtimeProvider, CatalogAirtimeService, HttpAirtimeProvider, ProductCatalog};
pub use classification::HttpClassificationService;
pub use error::ServiceError;
pub use webhooks::HttpWebhookService;
