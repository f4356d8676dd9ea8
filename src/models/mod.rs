pub mod admin;
pub mod application;
pub mod availability;
pub mod candidate;
pub mod dashboard;
pub mod email_log;
pub mod interview;
pub mod interview_link;
pub mod job;
pub mod score;
pub mod task;
