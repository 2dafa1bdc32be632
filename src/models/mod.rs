pub mod broadcast;
pub mod comm_log;
pub mod interview;
pub mod message;
pub mod notification;
pub mod recipient;
pub mod reminder;
pub mod template;
