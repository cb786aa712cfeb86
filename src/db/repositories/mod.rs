pub mod order_repo;
pub mod payment_record_repo;

pub use order_repo::{NewOrder, OrderRepository};
pub use payment_record_repo::{NewPaymentRecord, PaymentRecordRepository};
