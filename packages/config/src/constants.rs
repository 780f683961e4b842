// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Sparkbox

// API Server Configuration
pub const SPARKBOX_API_HOST: &str = "SPARKBOX_API_HOST";
pub const SPARKBOX_API_PORT: &str = "SPARKBOX_API_PORT";

// Storage
pub const SPARKBOX_DATABASE_URL: &str = "SPARKBOX_DATABASE_URL";

// Session Lifecycle
pub const SPARKBOX_SESSION_TIMEOUT_SECS: &str = "SPARKBOX_SESSION_TIMEOUT_SECS";
pub const SPARKBOX_INTERPRETER_TEMPLATE: &str = "SPARKBOX_INTERPRETER_TEMPLATE";
pub const SPARKBOX_DEFAULT_SERVICE_PORT: &str = "SPARKBOX_DEFAULT_SERVICE_PORT";
pub const SPARKBOX_KILL_ON_SHUTDOWN: &str = "SPARKBOX_KILL_ON_SHUTDOWN";

// Docker Provider
pub const SPARKBOX_DOCKER_PUBLIC_HOST: &str = "SPARKBOX_DOCKER_PUBLIC_HOST";
pub const SPARKBOX_TEMPLATES_PATH: &str = "SPARKBOX_TEMPLATES_PATH";

// Analytics
pub const POSTHOG_API_KEY: &str = "POSTHOG_API_KEY";
pub const POSTHOG_HOST: &str = "POSTHOG_HOST";
