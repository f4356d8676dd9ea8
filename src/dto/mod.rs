pub mod auth_dto;
pub mod inbound_dto;
pub mod intake_dto;
pub mod interview_dto;
pub mod score_dto;
pub mod task_dto;
