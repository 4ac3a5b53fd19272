//! Public types for the Mimir API.

mod request;
mod response;

pub use request::InvocationRequest;
pub use response::{FinishReason, InvocationResponse, Usage};
