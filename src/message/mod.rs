//! Application messages carried in frame payloads

pub mod values_message;
