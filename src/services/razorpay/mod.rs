mod client;
mod orders;
mod signature;

pub use client::{GatewayError, OrderGateway, RazorpayClient};
pub use orders::*;
pub use signature::*;
