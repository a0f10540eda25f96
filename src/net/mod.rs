pub mod protocol;
pub mod outbox;
pub mod server_info;
