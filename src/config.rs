use anyhow::Result;
use std::env;
use std::path::PathBuf;

/// Immutable service configuration, built once at startup and handed to
/// each component at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub version: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub redis: RedisConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub result_dir: PathBuf,
    /// Upload size cap in bytes.
    pub max_file_size: u64,
    /// Allowed upload extensions, lowercase, with leading dot.
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// List key the server pushes jobs onto and workers drain.
    pub queue_key: String,
    /// Prefix for per-task state records in the result store.
    pub task_key_prefix: String,
    /// Prefix for worker heartbeat registry keys.
    pub worker_key_prefix: String,
    /// TTL applied to task state records.
    pub task_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            app_name: env::var("APP_NAME")
                .unwrap_or_else(|_| "Background Image Processor".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()?,
            },
            storage: StorageConfig {
                upload_dir: env::var("UPLOAD_DIR")
                    .unwrap_or_else(|_| "uploads".to_string())
                    .into(),
                result_dir: env::var("RESULT_DIR")
                    .unwrap_or_else(|_| "result_images".to_string())
                    .into(),
                max_file_size: env::var("MAX_FILE_SIZE")
                    .unwrap_or_else(|_| (10 * 1024 * 1024).to_string())
                    .parse()?,
                allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                    .unwrap_or_else(|_| ".jpg,.jpeg,.png,.bmp,.tiff".to_string())
                    .split(',')
                    .map(normalize_extension)
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
                queue_key: env::var("QUEUE_KEY")
                    .unwrap_or_else(|_| "contour:queue".to_string()),
                task_key_prefix: env::var("TASK_KEY_PREFIX")
                    .unwrap_or_else(|_| "contour:task:".to_string()),
                worker_key_prefix: env::var("WORKER_KEY_PREFIX")
                    .unwrap_or_else(|_| "contour:worker:".to_string()),
                task_ttl_secs: env::var("TASK_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()?,
            },
        })
    }
}

/// Lowercases and trims an extension, ensuring a single leading dot.
fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('.').to_lowercase();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(".{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("jpg"), ".jpg");
        assert_eq!(normalize_extension(".PNG "), ".png");
        assert_eq!(normalize_extension("  "), "");
    }
}
