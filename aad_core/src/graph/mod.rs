pub mod auth;
pub mod client;
pub mod dto;
pub mod pagination;
