//! Server-side session authentication: signed session cookies, a revocable
//! session store, cached role resolution and per-route authorization.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

pub mod crypto {
    pub mod token;
}

pub mod kv;

pub mod models {
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod session;
    pub mod user;
}

pub mod services {
    pub mod auth;
    pub mod auth_version;
    pub mod providers;
    pub mod role_cache;
    pub mod session_limit;
}

pub mod handlers {
    pub mod admin;
    pub mod auth;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod config;
    pub mod cookies;
}

pub mod validation {
    pub mod auth;
}
