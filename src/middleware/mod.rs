//! Request middleware.

pub mod auth;
pub mod company;
pub mod metrics;
pub mod request_id;

pub use auth::{auth_middleware, AuthUser};
pub use company::{company_middleware, TenantContext, REFRESH_COMPANY_HEADER};
pub use metrics::metrics_middleware;
pub use request_id::{request_id_middleware, RequestId, REQUEST_ID_HEADER};
