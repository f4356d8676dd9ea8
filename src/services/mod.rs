pub mod ai_service;
pub mod credential_service;
pub mod dashboard_service;
pub mod identity_service;
pub mod lifecycle_service;
pub mod match_service;
pub mod notification_service;
pub mod registry_service;
pub mod reply_service;
pub mod resume_service;
pub mod task_service;
