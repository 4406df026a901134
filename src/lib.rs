pub mod config;
pub mod db;
pub mod error;
pub mod mailer;
pub mod router;
pub mod state;

pub mod crypto {
    pub mod password;
    pub mod token;
}

pub mod models {
    pub mod session;
    pub mod token;
    pub mod user;
}

pub mod repositories {
    pub mod session;
    pub mod token;
    pub mod user;
}

pub mod services {
    pub mod admin;
    pub mod auth;
    pub mod lifecycle;
    pub mod tokens;
}

pub mod jobs {
    pub mod scheduler;
    pub mod suspension_sweeper;
    pub mod token_sweeper;
}

pub mod handlers {
    pub mod account;
    pub mod admin;
    pub mod auth;
    pub mod cookies;
    pub mod health;
    pub mod sessions;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod auth;
}
