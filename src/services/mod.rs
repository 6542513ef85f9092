pub mod conversation_service;
pub mod message_service;
pub mod pusher;
pub mod user_service;
