pub mod auth_service;
pub mod mailer;
pub mod sweeper;
pub mod token_service;
