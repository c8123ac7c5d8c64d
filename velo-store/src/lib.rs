pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod email;
pub mod events;
pub mod memory;
pub mod notification_repo;
pub mod stripe;

pub use booking_repo::PgBookingStore;
pub use database::DbClient;
pub use email::LogEmailSink;
pub use events::EventProducer;
pub use memory::InMemoryBookingStore;
pub use notification_repo::PgNotificationSink;
pub use stripe::StripeAdapter;
