use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "d_database_url")]
    pub database_url: String,
    #[serde(default = "d_pool_size")]
    pub pool_size: u32,
    #[serde(default = "d_true")]
    pub migrate_on_startup: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_url: d_database_url(),
            pool_size: d_pool_size(),
            migrate_on_startup: true,
        }
    }
}

fn d_database_url() -> String {
    "postgres://localhost/parley".into()
}
fn d_pool_size() -> u32 {
    10
}
fn d_true() -> bool {
    true
}
