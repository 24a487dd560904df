//! HTTP routes.

pub mod auth;
pub mod health;

pub use auth::{
    CallbackQuery, RedirectQuery, auth_routes, callback_handler, check_handler, login_handler,
    logout_handler,
};
pub use health::health_routes;
