use crate::configuration::Configuration;
use clap::Parser;

/// Settings taken from the command line, the environment or a `.env` file.
#[derive(Debug, Clone, Parser)]
#[command(name = "gym_slot_ledger", about = "Capacity safe gym slot booking service")]
pub struct ConfigurationHandler {
    /// Password expected in the `x-admin-password` header of admin requests
    #[arg(long, env = "ADMIN_PASSWORD")]
    admin_password: String,

    /// PostgreSQL connection URL. Without it bookings are kept in memory only
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "PORT", default_value = "3000")]
    port: String,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            tracing::debug!(%err, "No .env file loaded");
        }
        Self::parse()
    }
}

impl Configuration for ConfigurationHandler {
    fn admin_password(&self) -> String {
        self.admin_password.clone()
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn port(&self) -> String {
        self.port.clone()
    }
}
