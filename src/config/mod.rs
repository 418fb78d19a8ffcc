//! 网关配置：YAML 文件加环境变量覆盖。
//!
//! Configuration is read once at startup from an optional YAML file, then
//! environment variables override individual values. Secrets in the file may
//! be written as `${VAR}` placeholders.

mod loader;
mod schema;

pub use loader::{apply_env_overrides, load_config, parse_yaml, validate_config};
pub use schema::*;

use crate::Result;
use std::path::Path;
use std::time::Duration;

impl GatewayConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        loader::load_config(path)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.server.http_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_seconds)
    }
}
