/// Service class names used for limiter labels, metric labels and log fields.
/// Each class has its own rate limiter.
pub const DIRECTORY_SERVICE: &str = "directory";
pub const CONTENT_SERVICE: &str = "content";
pub const PROFILE_SERVICE: &str = "profile";

// Conservative admission budgets (requests per window)
pub const DEFAULT_DIRECTORY_MAX_REQUESTS: u32 = 15;
pub const DEFAULT_CONTENT_MAX_REQUESTS: u32 = 10;
pub const DEFAULT_PROFILE_MAX_REQUESTS: u32 = 5;
pub const DEFAULT_WINDOW_MS: u64 = 1000;

// Pipeline pacing
pub const DEFAULT_BATCH_SIZE: usize = 2;
pub const DEFAULT_PACING_DELAY_MS: u64 = 100;

// Directory listing shape
pub const DEFAULT_MAX_RESULTS: u32 = 100;
pub const DEFAULT_ORDER_BY: &str = "email";
pub const DEFAULT_CUSTOMER: &str = "my_customer";
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

// Upstream endpoints
pub const DEFAULT_DIRECTORY_BASE_URL: &str = "https://admin.googleapis.com";
pub const DEFAULT_CONTENT_BASE_URL: &str = "https://www.googleapis.com";
pub const DEFAULT_PROFILE_BASE_URL: &str = "https://gmail.googleapis.com";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

