pub mod health_dto;
pub mod portal_dto;
