//! Token broker: issues short-lived, delegated cloud-storage access tokens on
//! behalf of Kerberos-authenticated principals.

pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod providers;

pub mod cache {
    pub mod local;
    pub mod remote;
    pub mod memory;
    pub mod redis;
    pub mod fetcher;
}

pub mod crypto {
    pub mod aes;
    pub mod kek;
    pub mod envelope;
    pub mod password;
    pub mod session_token;
}

pub mod models {
    pub mod access_token;
    pub mod session;
}

pub mod repositories {
    pub mod store;
    pub mod memory;
    pub mod postgres;
}

pub mod services {
    pub mod auth;
    pub mod access_token;
    pub mod session;
}

pub mod handlers {
    pub mod broker;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod broker;
}
