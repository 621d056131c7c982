//! # checkout-runtime
//!
//! HTTP implementations of the checkout seams, plus the `checkout-client`
//! binary that drives a whole purchase from the command line.
//!
//! ```text
//! checkout-client stage a.jpg b.png ──▶ FileKeyValueStore ──▶ POST /api/checkout
//!                                                                  │ pay
//! checkout-client resume <return url> ◀────────────────────────────┘
//!        │
//!        ├─▶ HttpOrderGateway   GET /api/orders/session/{id}, PUT .../status
//!        └─▶ HttpUploadSink     POST /api/orders/{id}/files (multipart)
//! ```

pub mod api;
pub mod config;
pub mod files;
pub mod gateway;
pub mod redirect;
pub mod sink;

pub use api::{CheckoutApi, CheckoutLink, CheckoutRequest};
pub use config::ServerConfig;
pub use files::{content_type_for_path, read_staging_file};
pub use gateway::HttpOrderGateway;
pub use redirect::session_id_from_return_url;
pub use sink::HttpUploadSink;
