pub mod attachment_service;
pub mod inbox;
pub mod messaging_service;
pub mod permission;
pub mod realtime;
