pub mod checkout;
pub mod flow;
pub mod razorpay;

pub use checkout::CheckoutService;
pub use flow::{CheckoutFlow, FlowError, GatewayCallback};
