pub mod checkout;
pub mod health;
pub mod webhooks;

pub use checkout::*;
pub use health::*;
pub use webhooks::*;
