//! Application configuration management.
//!
//! Configuration is read from environment variables with the `envy` crate,
//! after an optional `.env` file has been loaded.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `JWT_SECRET` (required): HMAC secret used to sign bearer tokens
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `JWT_EXPIRY_HOURS` (optional): token lifetime, defaults to 8
/// - `CORS_ALLOWED_ORIGIN` (optional): dashboard origin; any origin when unset
/// - `EXPORT_MAX_ROWS` (optional): largest export accepted, defaults to 50000
/// - `PDF_FONT_DIR` / `PDF_FONT_NAME` (optional): font family used for PDF exports
/// - `ZOHO_API_BASE`, `ZOHO_ORG_ID`, `ZOHO_WORKSPACE_ID`, `ZOHO_VIEW_NAME`,
///   `ZOHO_OAUTH_TOKEN` (optional): Zoho Analytics data source
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub jwt_secret: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_jwt_expiry_hours")]
    pub jwt_expiry_hours: i64,

    #[serde(default)]
    pub cors_allowed_origin: Option<String>,

    #[serde(default = "default_export_max_rows")]
    pub export_max_rows: i64,

    #[serde(default = "default_pdf_font_dir")]
    pub pdf_font_dir: String,

    #[serde(default = "default_pdf_font_name")]
    pub pdf_font_name: String,

    #[serde(default)]
    pub zoho_api_base: Option<String>,

    #[serde(default)]
    pub zoho_org_id: Option<String>,

    #[serde(default)]
    pub zoho_workspace_id: Option<String>,

    #[serde(default = "default_zoho_view_name")]
    pub zoho_view_name: String,

    #[serde(default)]
    pub zoho_oauth_token: Option<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

/// Thirty days.
const MAX_JWT_EXPIRY_HOURS: i64 = 720;

fn default_jwt_expiry_hours() -> i64 {
    8
}

fn default_export_max_rows() -> i64 {
    50_000
}

fn default_pdf_font_dir() -> String {
    "./fonts".to_string()
}

fn default_pdf_font_name() -> String {
    "LiberationSans".to_string()
}

fn default_zoho_view_name() -> String {
    "Revenue Master View".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, a value cannot
    /// be parsed into its expected type, or a value is out of range.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks that serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_JWT_EXPIRY_HOURS).contains(&self.jwt_expiry_hours) {
            anyhow::bail!(
                "JWT_EXPIRY_HOURS must be between 1 and {}, got {}",
                MAX_JWT_EXPIRY_HOURS,
                self.jwt_expiry_hours
            );
        }
        Ok(())
    }

    /// Whether every setting needed to query Zoho Analytics is present.
    pub fn zoho_enabled(&self) -> bool {
        self.zoho_api_base.is_some()
            && self.zoho_org_id.is_some()
            && self.zoho_workspace_id.is_some()
            && self.zoho_oauth_token.is_some()
    }
}
