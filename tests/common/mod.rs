#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use token_broker::cache::memory::MemoryRemoteCache;
use token_broker::cache::remote::RemoteCache;
use token_broker::config::Config;
use token_broker::crypto::envelope::AeadEnvelopeBackend;
use token_broker::providers::DevelopmentProvider;
use token_broker::repositories::memory::MemoryDatabase;
use token_broker::state::AppState;

pub const MASTER_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
pub const SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

pub fn config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("ENCRYPTION_MASTER_KEY".into(), MASTER_KEY.into());
    vars.insert("PROXY_USERS".into(), "hive@EXAMPLE.COM".into());
    vars.insert("USER_MAPPING_DOMAIN".into(), "example.com".into());
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_source(|key| vars.get(key).cloned()).expect("test config")
}

pub fn state_with(config: Config, database: MemoryDatabase, remote: Arc<dyn RemoteCache>) -> AppState {
    let encryption = Arc::new(AeadEnvelopeBackend::new(&config.master_key).expect("master key"));
    let provider = Arc::new(DevelopmentProvider::new(
        Duration::from_secs(3600),
        vec!["blocked@example.com".to_string()],
    ));
    AppState::with_backends(config, Arc::new(database), remote, encryption, provider)
}

pub fn state(overrides: &[(&str, &str)]) -> AppState {
    state_with(
        config(overrides),
        MemoryDatabase::new(),
        Arc::new(MemoryRemoteCache::new()),
    )
}
