pub mod audience_service;
pub mod broadcast_service;
pub mod dispatch_service;
pub mod inbox_service;
pub mod notify_service;
pub mod reminder_service;
pub mod template_service;
