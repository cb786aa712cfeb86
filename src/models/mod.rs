pub mod order;
pub mod payment_record;

pub use order::*;
pub use payment_record::*;
