use std::env;
use std::path::PathBuf;

pub const MIB: usize = 1024 * 1024;
const KIB: usize = 1024;

/// Byte count as shown in limit messages: "15MB", "1.5MB", "512KB", "100 bytes".
pub fn size_label(bytes: usize) -> String {
    if bytes >= MIB {
        if bytes % MIB == 0 {
            format!("{}MB", bytes / MIB)
        } else {
            format!("{:.1}MB", bytes as f64 / MIB as f64)
        }
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Process-wide configuration, grouped the same way the environment variables are.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub drive: DriveConfig,
    pub validation: ValidationConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port (default: 8080)
    pub port: u16,

    /// Environment name: "development", "production", "test" (default: "development")
    pub environment: String,

    /// Allowed CORS origin, "*" for any (default: "*")
    pub frontend_url: String,

    /// Derive the client address from X-Forwarded-For / X-Real-IP (default: true)
    pub trust_proxy: bool,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum size of a single uploaded file in bytes (default: 15 MB)
    pub max_file_size: usize,

    /// Maximum number of files in one request (default: 20)
    pub max_files: usize,

    /// Maximum number of non-file form fields in one request (default: 50)
    pub max_parts: usize,

    /// Directory holding staged payloads (default: "./uploads")
    pub temp_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct DriveConfig {
    /// Inline service account JSON
    pub service_account_json: Option<String>,

    /// Path to a service account credentials file
    pub credentials_file: Option<PathBuf>,

    /// Folder that receives the per-request folders; drive root when unset
    pub parent_folder_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub min_image_count: usize,
    pub max_image_count: usize,
    /// Never above 1: a request carries at most one voice note.
    pub max_audio_count: usize,
    pub allowed_image_types: Vec<String>,
    pub allowed_audio_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per window for every /api route (default: 100 per 15 minutes)
    pub api_max_requests: u32,
    pub api_window_secs: u64,

    /// Uploads per window for POST /api/upload (default: 20 per hour)
    pub upload_max_requests: u32,
    pub upload_window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            environment: "development".to_string(),
            frontend_url: "*".to_string(),
            trust_proxy: true,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 15 * MIB, // 15 MB
            max_files: 20,
            max_parts: 50,
            temp_dir: PathBuf::from("./uploads"),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_image_count: 8,
            max_image_count: 20,
            max_audio_count: 1,
            allowed_image_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
            ],
            allowed_audio_types: vec![
                "audio/mpeg".to_string(),
                "audio/wav".to_string(),
                "audio/m4a".to_string(),
                "audio/ogg".to_string(),
                "audio/webm".to_string(),
            ],
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api_max_requests: 100,
            api_window_secs: 15 * 60,
            upload_max_requests: 20,
            upload_window_secs: 60 * 60,
        }
    }
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl UploadConfig {
    /// Whole multipart body ceiling: every file at its maximum plus 1 MB of framing.
    pub fn max_body_size(&self) -> usize {
        self.max_file_size
            .saturating_mul(self.max_files)
            .saturating_add(MIB)
    }
}

impl ValidationConfig {
    pub fn is_allowed_image(&self, media_type: &str) -> bool {
        self.allowed_image_types.iter().any(|t| t == media_type)
    }

    pub fn is_allowed_audio(&self, media_type: &str) -> bool {
        self.allowed_audio_types.iter().any(|t| t == media_type)
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let server = ServerConfig {
            port: parse_var("PORT").unwrap_or(default.server.port),
            environment: env::var("APP_ENV")
                .or_else(|_| env::var("NODE_ENV"))
                .unwrap_or(default.server.environment),
            frontend_url: env::var("FRONTEND_URL").unwrap_or(default.server.frontend_url),
            trust_proxy: env::var("TRUST_PROXY")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.server.trust_proxy),
        };

        let upload = UploadConfig {
            max_file_size: parse_var("MAX_FILE_SIZE").unwrap_or(default.upload.max_file_size),
            max_files: parse_var("MAX_FILES").unwrap_or(default.upload.max_files),
            max_parts: parse_var("MAX_PARTS").unwrap_or(default.upload.max_parts),
            temp_dir: env::var("UPLOAD_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload.temp_dir),
        };

        let drive = DriveConfig {
            service_account_json: non_empty_var("GOOGLE_SERVICE_ACCOUNT"),
            credentials_file: non_empty_var("GOOGLE_CREDENTIALS").map(PathBuf::from),
            parent_folder_id: non_empty_var("GOOGLE_DRIVE_PARENT_FOLDER_ID"),
        };

        let validation = ValidationConfig {
            min_image_count: parse_var("MIN_IMAGE_COUNT")
                .unwrap_or(default.validation.min_image_count),
            max_image_count: parse_var("MAX_IMAGE_COUNT")
                .unwrap_or(default.validation.max_image_count),
            max_audio_count: parse_var::<usize>("MAX_AUDIO_COUNT")
                .unwrap_or(default.validation.max_audio_count)
                .min(1),
            allowed_image_types: list_var("ALLOWED_IMAGE_TYPES")
                .unwrap_or(default.validation.allowed_image_types),
            allowed_audio_types: list_var("ALLOWED_AUDIO_TYPES")
                .unwrap_or(default.validation.allowed_audio_types),
        };

        let rate_limit = RateLimitConfig {
            api_max_requests: parse_var("API_RATE_LIMIT_MAX")
                .unwrap_or(default.rate_limit.api_max_requests),
            api_window_secs: parse_var("API_RATE_LIMIT_WINDOW_SECS")
                .unwrap_or(default.rate_limit.api_window_secs),
            upload_max_requests: parse_var("UPLOAD_RATE_LIMIT_MAX")
                .unwrap_or(default.rate_limit.upload_max_requests),
            upload_window_secs: parse_var("UPLOAD_RATE_LIMIT_WINDOW_SECS")
                .unwrap_or(default.rate_limit.upload_window_secs),
        };

        Self {
            server,
            upload,
            drive,
            validation,
            rate_limit,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn list_var(key: &str) -> Option<Vec<String>> {
    let items: Vec<String> = env::var(key)
        .ok()?
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}
